//! Builder for executing external tool invocations with a bounded timeout.
//!
//! Two execution modes exist because callers differ on what "failure" means:
//! capability probes interpret a non-zero exit themselves ([`ToolCommand::output`]),
//! while pipeline steps require success ([`ToolCommand::execute`]). In both
//! modes a timeout kills the child; an invocation can never hang the caller.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Command;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use ph_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> ph_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("quiet")
///     .arg("-print_format").arg("json")
///     .arg("-show_format")
///     .arg("/path/to/video.mkv")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run the command and capture its output, regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns [`ph_core::Error::Tool`] only if the process cannot be
    /// spawned or exceeds the timeout. A non-zero exit status is *not* an
    /// error here; the caller inspects [`ToolOutput::status`].
    pub async fn output(&self) -> ph_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // If the timeout cancels wait_with_output, the child must not be
        // left running.
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ph_core::Error::Tool {
            tool: program_name.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(ph_core::Error::Tool {
                tool: program_name,
                message: format!("I/O error waiting for process: {e}"),
            }),
            Err(_elapsed) => Err(ph_core::Error::Tool {
                tool: program_name,
                message: format!("timed out after {:?}", self.timeout),
            }),
        }
    }

    /// Run the command, requiring a successful exit.
    ///
    /// # Errors
    ///
    /// Everything [`ToolCommand::output`] reports, plus
    /// [`ph_core::Error::Tool`] when the process exits non-zero (message
    /// includes trimmed stderr).
    pub async fn execute(&self) -> ph_core::Result<ToolOutput> {
        let output = self.output().await?;

        if !output.status.success() {
            return Err(ph_core::Error::Tool {
                tool: self.program_name(),
                message: format!(
                    "exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                ),
            });
        }

        Ok(output)
    }
}
