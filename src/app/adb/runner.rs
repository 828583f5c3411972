use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::error::AppError;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// stdout followed by stderr, the text every parser consumes.
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            return self.stdout.clone();
        }
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        let mut text = self.stdout.clone();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&self.stderr);
        text
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::dependency(format!("Failed to spawn {program}: {err}"), trace_id))?;

    // Both pipes must be drained while waiting, a full pipe buffer would stall the child.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain(stdout);
    let stderr_handle = drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(AppError::timeout(
                        format!("Command timed out after {} ms", timeout.as_millis()),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

/// Text-in/text-out access to a device shell. Parsers only ever see the returned text.
pub trait ShellGateway: Send + Sync {
    fn shell(&self, command: &str, trace_id: &str) -> Result<String, AppError>;
}

#[derive(Debug, Clone)]
pub struct AdbShell {
    pub program: String,
    pub serial: Option<String>,
    pub timeout: Duration,
}

impl AdbShell {
    pub fn new(program: impl Into<String>, serial: Option<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            serial: serial.filter(|value| !value.trim().is_empty()),
            timeout,
        }
    }

    fn base_args(&self) -> Vec<String> {
        match &self.serial {
            Some(serial) => vec!["-s".to_string(), serial.clone()],
            None => Vec::new(),
        }
    }

    /// Runs a host-side adb command (`devices -l`, `forward ...`).
    pub fn host(&self, args: &[&str], trace_id: &str) -> Result<CommandOutput, AppError> {
        let mut full = self.base_args();
        full.extend(args.iter().map(|arg| arg.to_string()));
        run_command_with_timeout(&self.program, &full, self.timeout, trace_id)
    }

    /// Streams a long-running shell command line by line.
    pub fn stream(&self, command: &str, trace_id: &str) -> Result<LineStream, AppError> {
        let mut args = self.base_args();
        args.push("shell".to_string());
        args.push(command.to_string());
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                AppError::dependency(format!("Failed to spawn {}: {err}", self.program), trace_id)
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
        Ok(LineStream::new(child, stdout))
    }
}

impl ShellGateway for AdbShell {
    fn shell(&self, command: &str, trace_id: &str) -> Result<String, AppError> {
        let mut args = self.base_args();
        args.push("shell".to_string());
        args.push(command.to_string());
        let output = run_command_with_timeout(&self.program, &args, self.timeout, trace_id)?;
        if output.exit_code.unwrap_or_default() != 0 {
            debug!(
                trace_id = %trace_id,
                command = %command,
                exit_code = ?output.exit_code,
                "adb shell exited non-zero"
            );
        }
        Ok(output.combined())
    }
}

/// Lines of a running child process. Dropping the stream kills the child.
pub struct LineStream {
    child: Child,
    reader: BufReader<ChildStdout>,
}

impl LineStream {
    fn new(child: Child, stdout: ChildStdout) -> Self {
        Self {
            child,
            reader: BufReader::new(stdout),
        }
    }
}

impl Iterator for LineStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
