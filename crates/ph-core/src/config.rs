//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, tools, probing and sessions. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub probe: ProbeConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit (async, embedded, etc.).
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.probe.test_timeout_secs == 0 {
            warnings.push("probe.test_timeout_secs is 0; every capability test will fail".into());
        }

        if self.session.heartbeat_timeout_secs == 0 {
            warnings.push(
                "session.heartbeat_timeout_secs is 0; sessions will be reclaimed immediately"
                    .into(),
            );
        }

        if self.session.segment_duration_secs == 0 {
            warnings.push("session.segment_duration_secs is 0; using 1s segments".into());
        }

        if self.session.seek_ahead_secs == 0 {
            warnings.push(
                "session.seek_ahead_secs is 0; every forward seek restarts the encoder".into(),
            );
        }

        for (name, path) in [
            ("tools.ffmpeg_path", &self.tools.ffmpeg_path),
            ("tools.ffprobe_path", &self.tools.ffprobe_path),
            ("tools.dovi_tool_path", &self.tools.dovi_tool_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!("{name} '{}' does not exist", p.display()));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8096,
        }
    }
}

/// Paths to external CLI tools. `None` means "search PATH".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub dovi_tool_path: Option<PathBuf>,
}

/// Capability probing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Upper bound for a single capability test. Exceeding it marks that
    /// one capability unsupported without failing the rest of the probe.
    pub test_timeout_secs: u64,
    /// Run the full capability probe at server startup.
    pub probe_on_start: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            test_timeout_secs: 10,
            probe_on_start: true,
        }
    }
}

/// Streaming session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root directory for per-session transcode output.
    pub data_dir: PathBuf,
    /// Seconds without a heartbeat before a session is reclaimed.
    pub heartbeat_timeout_secs: u64,
    /// How often the reclamation sweep runs.
    pub sweep_interval_secs: u64,
    /// Target HLS segment duration.
    pub segment_duration_secs: u32,
    /// Upper bound for an epoch's encoder to produce its first segment.
    pub startup_timeout_secs: u64,
    /// A seek landing at most this far ahead of the encoder's current
    /// position is served by the running epoch; beyond it the epoch is
    /// restarted at the target.
    pub seek_ahead_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/playhead/sessions"),
            heartbeat_timeout_secs: 60,
            sweep_interval_secs: 30,
            segment_duration_secs: 4,
            startup_timeout_secs: 30,
            seek_ahead_secs: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8096);
        assert_eq!(cfg.probe.test_timeout_secs, 10);
        assert!(cfg.probe.probe_on_start);
        assert_eq!(cfg.session.heartbeat_timeout_secs, 60);
        assert_eq!(cfg.session.segment_duration_secs, 4);
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn zero_probe_timeout_warns() {
        let mut cfg = Config::default();
        cfg.probe.test_timeout_secs = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("test_timeout_secs")));
    }

    #[test]
    fn missing_tool_path_warns() {
        let mut cfg = Config::default();
        cfg.tools.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("ffmpeg_path")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"server": {"port": 9090}, "session": {"seek_ahead_secs": 45}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.session.seek_ahead_secs, 45);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.server.port, 8096);
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None);
        assert_eq!(cfg.server.port, 8096);
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.server.port, 8096);
    }
}
