//! FFmpeg command wrapper utilities

use crate::probe::ProbeMode;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

/// Poll interval while waiting on a child with a deadline.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Only the tail of stderr is kept in errors; ffmpeg prints a banner first.
const MAX_STDERR_CHARS: usize = 2048;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("{0} not found in system PATH")]
    NotInstalled(String),

    #[error("Command failed with exit code {}: -=[{command}]=-", .status.map_or("signal".to_string(), |c| c.to_string()))]
    ExecutionFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out after {}s: -=[{command}]=-", .timeout.as_secs_f64())]
    TimedOut { command: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Combined stdout + stderr lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().chain(self.stderr.lines())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Allow overwriting the output file (`-y`).
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("-i".to_string());
        self.args.push(path.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Shell-quoted rendering of the full invocation, for logs and errors.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| shell_quote(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run without inspecting the exit status.
    pub fn run(&self, runner: &dyn ToolRunner) -> Result<ToolOutput, FfmpegError> {
        debug!("Running: {}", self.command_line());
        runner.run(self)
    }

    /// Run and treat any non-zero exit as failure.
    pub fn execute(&self, runner: &dyn ToolRunner) -> Result<ToolOutput, FfmpegError> {
        let output = self.run(runner)?;

        if !output.success() {
            let command = self.command_line();
            error!("Command failed with exit code {:?}: {}", output.status, command);
            return Err(FfmpegError::ExecutionFailed {
                command,
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(output)
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FfmpegCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Seam between command construction and process spawning.
pub trait ToolRunner: Send + Sync {
    fn run(&self, command: &FfmpegCommand) -> Result<ToolOutput, FfmpegError>;
}

/// Spawns real processes, optionally killing them after a deadline.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ToolRunner for SystemRunner {
    fn run(&self, command: &FfmpegCommand) -> Result<ToolOutput, FfmpegError> {
        let mut child = Command::new(command.program())
            .args(command.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    FfmpegError::NotInstalled(command.program().display().to_string())
                }
                _ => FfmpegError::Io(e),
            })?;

        // Drain both pipes concurrently so a chatty child never blocks on a full pipe
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.timeout {
            Some(timeout) => wait_with_deadline(&mut child, timeout),
            None => child.wait().map(Some),
        };

        let stdout = stdout.map(collect).unwrap_or_default();
        let stderr = stderr.map(collect).unwrap_or_default();

        match status? {
            Some(status) => Ok(ToolOutput {
                status: status.code(),
                stdout,
                stderr,
            }),
            None => Err(FfmpegError::TimedOut {
                command: command.command_line(),
                timeout: self.timeout.unwrap_or_default(),
            }),
        }
    }
}

/// Static configuration for locating and driving the external tools.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Upper bound for each subprocess; `None` waits forever.
    pub timeout: Option<Duration>,
    pub probe_mode: ProbeMode,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout: None,
            probe_mode: ProbeMode::Structured,
        }
    }
}

/// Tool configuration bundled with the runner that executes commands.
#[derive(Clone)]
pub struct Toolchain {
    config: ToolConfig,
    runner: Arc<dyn ToolRunner>,
}

impl Toolchain {
    pub fn new(config: ToolConfig) -> Self {
        let runner = Arc::new(SystemRunner::with_timeout(config.timeout));
        Self { config, runner }
    }

    pub fn with_runner(config: ToolConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }

    pub fn ffmpeg(&self) -> FfmpegCommand {
        FfmpegCommand::with_program(&self.config.ffmpeg)
    }

    pub fn ffprobe(&self) -> FfmpegCommand {
        FfmpegCommand::with_program(&self.config.ffprobe)
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new(ToolConfig::default())
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Check whether `program` can be spawned at all.
pub fn is_installed(program: impl AsRef<Path>) -> bool {
    Command::new(program.as_ref())
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            debug!("Pipe read stopped early: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// `Ok(None)` means the deadline passed and the child was killed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    let count = trimmed.chars().count();
    if count <= MAX_STDERR_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - MAX_STDERR_CHARS).collect()
}

fn shell_quote(part: &str) -> String {
    let safe = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_argument_order() {
        let cmd = FfmpegCommand::new()
            .overwrite()
            .input("/media/in.avi")
            .args(["-c:v", "libx264"])
            .output("/tmp/out.mp4");

        assert_eq!(cmd.program(), Path::new("ffmpeg"));
        assert_eq!(
            cmd.get_args(),
            ["-y", "-i", "/media/in.avi", "-c:v", "libx264", "/tmp/out.mp4"]
        );
    }

    #[test]
    fn test_command_line_quotes_unsafe_parts() {
        let cmd = FfmpegCommand::new()
            .input("/media/my clip.avi")
            .output("/tmp/it's.mp4");

        assert_eq!(
            cmd.command_line(),
            r"ffmpeg -i '/media/my clip.avi' '/tmp/it'\''s.mp4'"
        );
        assert_eq!(cmd.to_string(), cmd.command_line());
    }

    #[test]
    fn test_stderr_tail_keeps_the_end() {
        let long = format!("{}END", "x".repeat(MAX_STDERR_CHARS * 2));
        let tail = stderr_tail(&long);
        assert_eq!(tail.chars().count(), MAX_STDERR_CHARS);
        assert!(tail.ends_with("END"));
    }

    #[test]
    fn test_missing_program_is_not_installed() {
        let cmd = FfmpegCommand::with_program("definitely-not-a-real-ffmpeg-binary");
        let err = cmd.run(&SystemRunner::new()).unwrap_err();
        assert!(matches!(err, FfmpegError::NotInstalled(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_both_streams() {
        let output = FfmpegCommand::with_program("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .run(&SystemRunner::new())
            .unwrap();

        assert_eq!(output.status, Some(3));
        assert!(!output.success());
        assert_eq!(output.lines().collect::<Vec<_>>(), ["out", "err"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_rejects_any_nonzero_status() {
        let err = FfmpegCommand::with_program("sh")
            .args(["-c", "exit 2"])
            .execute(&SystemRunner::new())
            .unwrap_err();

        match err {
            FfmpegError::ExecutionFailed { command, status, .. } => {
                assert_eq!(status, Some(2));
                assert_eq!(command, "sh -c 'exit 2'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_kills_on_timeout() {
        let runner = SystemRunner::with_timeout(Some(Duration::from_millis(100)));
        let start = Instant::now();
        let err = FfmpegCommand::with_program("sleep")
            .arg("5")
            .run(&runner)
            .unwrap_err();

        assert!(matches!(err, FfmpegError::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
