//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools the streaming core shells out to (ffmpeg, ffprobe, dovi_tool)
//! and provides lookup methods for the rest of the workspace.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe", "dovi_tool"];

/// A discovered external tool. Execution timeouts live on
/// [`crate::command::ToolCommand`], not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `--version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the [`ph_core::config::ToolsConfig`] supplies
    /// a custom path **and** that path exists, it is used directly.
    /// Otherwise [`which::which`] is used to locate the tool in `PATH`.
    /// Tools that are not found are silently omitted from the registry;
    /// every capability that depends on them will probe `false`.
    pub fn discover(tools_config: &ph_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                "dovi_tool" => tools_config.dovi_tool_path.as_deref(),
                _ => None,
            };

            let resolved = if let Some(p) = custom_path {
                if p.exists() {
                    Some(p.to_path_buf())
                } else {
                    // Custom path does not exist; fall back to PATH.
                    which::which(name).ok()
                }
            } else {
                which::which(name).ok()
            };

            if let Some(path) = resolved {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                );
            }
        }

        Self { tools }
    }

    /// Build an empty registry (no tools found). Useful for tests.
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Build a registry from explicit (name, path) pairs without touching
    /// `PATH`. Paths are not checked for existence.
    pub fn from_parts(parts: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        let tools = parts
            .into_iter()
            .map(|(name, path)| (name.clone(), ToolConfig { name, path }))
            .collect();
        Self { tools }
    }

    /// Return the [`ToolConfig`] for the given tool if it was discovered.
    pub fn get(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    /// Return a reference to the [`ToolConfig`] for the given tool, or a
    /// [`ph_core::Error::Tool`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> ph_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| ph_core::Error::Tool {
            tool: name.to_string(),
            message: format!("{name} not found; is it installed and in PATH?"),
        })
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| {
                if let Some(cfg) = self.tools.get(name) {
                    let version = detect_version(name, &cfg.path);
                    ToolInfo {
                        name: name.to_string(),
                        available: true,
                        version,
                        path: Some(cfg.path.clone()),
                    }
                } else {
                    ToolInfo {
                        name: name.to_string(),
                        available: false,
                        version: None,
                        path: None,
                    }
                }
            })
            .collect()
    }

    /// Detected version line for a discovered tool.
    pub fn version_line(&self, name: &str) -> Option<String> {
        let cfg = self.tools.get(name)?;
        detect_version(name, &cfg.path)
    }

    /// Parse the ffmpeg release version (e.g. `7.1.2`) out of its banner.
    ///
    /// Returns `None` when ffmpeg is missing or reports an unparseable
    /// version (git builds like `N-112874-g…` resolve to `None`, which the
    /// Dolby Vision gate treats as "below threshold").
    pub fn ffmpeg_version(&self) -> Option<semver::Version> {
        let line = self.version_line("ffmpeg")?;
        parse_ffmpeg_version(&line)
    }

    /// Iterate over all registered tool configs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolConfig)> {
        self.tools.iter()
    }
}

/// Run `<tool> --version` (or `-version` for ffmpeg/ffprobe) and return the
/// first line of stdout.
fn detect_version(name: &str, path: &PathBuf) -> Option<String> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

/// Extract a semver version from an ffmpeg banner line such as
/// `ffmpeg version 7.1.2-0ubuntu1 Copyright (c) 2000-2024 …`.
fn parse_ffmpeg_version(line: &str) -> Option<semver::Version> {
    let raw = line.split_whitespace().nth(2)?;
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    // Pad "7" or "7.1" out to full semver.
    let parts: Vec<&str> = numeric.split('.').filter(|s| !s.is_empty()).collect();
    let version = match parts.len() {
        0 => return None,
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => parts[..3].join("."),
    };

    semver::Version::parse(&version).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ph_core::config::ToolsConfig;

    #[test]
    fn discover_with_default_config() {
        let cfg = ToolsConfig::default();
        let registry = ToolRegistry::discover(&cfg);
        // We cannot guarantee any tool is installed in CI,
        // but the call itself must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::empty();
        let result = registry.require("ffmpeg");
        assert!(result.is_err());
    }

    #[test]
    fn check_all_returns_known_tools() {
        let registry = ToolRegistry::empty();
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"ffmpeg"));
        assert!(names.contains(&"ffprobe"));
        assert!(names.contains(&"dovi_tool"));
        assert!(infos.iter().all(|i| !i.available));
    }

    #[test]
    fn from_parts_resolves() {
        let registry = ToolRegistry::from_parts([(
            "ffmpeg".to_string(),
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg"),
        )]);
        assert!(registry.require("ffmpeg").is_ok());
        assert!(registry.require("ffprobe").is_err());
    }

    #[test]
    fn tool_config_serialization() {
        let cfg = ToolConfig {
            name: "ffmpeg".to_string(),
            path: PathBuf::from("/usr/bin/ffmpeg"),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("ffmpeg"));
        let back: ToolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "ffmpeg");
        assert_eq!(back.path, PathBuf::from("/usr/bin/ffmpeg"));
    }

    #[test]
    fn parse_release_banner() {
        let v =
            parse_ffmpeg_version("ffmpeg version 7.1.2-0ubuntu1 Copyright (c) 2000-2024").unwrap();
        assert_eq!(v.major, 7);
        assert_eq!(v.minor, 1);
    }

    #[test]
    fn parse_short_banner() {
        let v = parse_ffmpeg_version("ffmpeg version 6.0 Copyright").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (6, 0, 0));
    }

    #[test]
    fn parse_git_banner_is_none() {
        assert!(parse_ffmpeg_version("ffmpeg version N-112874-ga1b2c3 Copyright").is_none());
    }
}
