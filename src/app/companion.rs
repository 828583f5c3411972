use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::app::adb::runner::AdbShell;
use crate::app::config::CompanionSettings;
use crate::app::error::AppError;

/// `adb forward tcp:<port> tcp:<port>` arguments.
pub fn forward_args(port: u16) -> Vec<String> {
    let endpoint = format!("tcp:{port}");
    vec!["forward".to_string(), endpoint.clone(), endpoint]
}

pub fn remove_forward_args(port: u16) -> Vec<String> {
    vec![
        "forward".to_string(),
        "--remove".to_string(),
        format!("tcp:{port}"),
    ]
}

/// Sets up the port forward to the on-device companion process, replacing any stale one.
pub fn ensure_forward(shell: &AdbShell, port: u16, trace_id: &str) -> Result<(), AppError> {
    let remove = remove_forward_args(port);
    let remove: Vec<&str> = remove.iter().map(String::as_str).collect();
    // Fails when no forward exists yet.
    let removed = shell
        .host(&remove, trace_id)
        .map(|output| output.exit_code == Some(0))
        .unwrap_or(false);
    debug!(trace_id = %trace_id, port, removed, "cleared previous companion forward");

    let args = forward_args(port);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = shell.host(&args, trace_id)?;
    if output.exit_code != Some(0) {
        return Err(AppError::dependency(
            format!("adb forward failed: {}", output.combined().trim()),
            trace_id,
        ));
    }
    Ok(())
}

/// Line-delimited request/response client for the companion socket.
pub struct CompanionClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    trace_id: String,
}

impl CompanionClient {
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration, trace_id: &str) -> Result<Self, AppError> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|err| AppError::validation(format!("Invalid companion address: {err}"), trace_id))?
            .collect();
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(stream, timeout, trace_id),
                Err(err) => last_error = Some(format!("{addr}: {err}")),
            }
        }
        Err(AppError::dependency(
            format!(
                "Failed to connect to companion: {}",
                last_error.unwrap_or_else(|| "no address resolved".to_string())
            ),
            trace_id,
        ))
    }

    pub fn connect_local(settings: &CompanionSettings, trace_id: &str) -> Result<Self, AppError> {
        Self::connect(
            ("127.0.0.1", settings.port),
            Duration::from_millis(settings.connect_timeout_ms),
            trace_id,
        )
    }

    fn from_stream(stream: TcpStream, timeout: Duration, trace_id: &str) -> Result<Self, AppError> {
        let io_error = |err: std::io::Error| AppError::system(format!("Companion socket setup failed: {err}"), trace_id);
        stream.set_read_timeout(Some(timeout)).map_err(io_error)?;
        stream.set_write_timeout(Some(timeout)).map_err(io_error)?;
        stream.set_nodelay(true).map_err(io_error)?;
        let writer = stream.try_clone().map_err(io_error)?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            trace_id: trace_id.to_string(),
        })
    }

    /// Sends one line and waits for one line back. The trailing newline is stripped.
    pub fn request(&mut self, line: &str) -> Result<String, AppError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.contains('\n') {
            return Err(AppError::validation(
                "Companion requests must be a single line",
                &self.trace_id,
            ));
        }
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|err| self.io_error("write", err))?;

        let mut response = String::new();
        let read = self
            .reader
            .read_line(&mut response)
            .map_err(|err| self.io_error("read", err))?;
        if read == 0 {
            return Err(AppError::dependency(
                "Companion closed the connection",
                &self.trace_id,
            ));
        }
        debug!(trace_id = %self.trace_id, bytes = read, "companion response");
        Ok(response.trim_end_matches(['\r', '\n']).to_string())
    }

    fn io_error(&self, op: &str, err: std::io::Error) -> AppError {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                AppError::timeout(format!("Companion {op} timed out"), &self.trace_id)
            }
            _ => AppError::dependency(format!("Companion {op} failed: {err}"), &self.trace_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn forward_arguments() {
        assert_eq!(forward_args(8888), vec!["forward", "tcp:8888", "tcp:8888"]);
        assert_eq!(remove_forward_args(8888), vec!["forward", "--remove", "tcp:8888"]);
    }

    #[cfg(unix)]
    fn fake_adb(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("adb");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path.to_string_lossy().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn ensure_forward_removes_stale_forward_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("calls.log");
        let body = format!(
            r#"echo "$*" >> '{}'
if [ "$4" = "--remove" ]; then echo "error: listener 'tcp:8888' not found" >&2; exit 1; fi"#,
            log.display()
        );
        let program = fake_adb(dir.path(), &body);
        let shell = AdbShell::new(program, Some("emulator-5554".to_string()), Duration::from_secs(5));

        ensure_forward(&shell, 8888, "trace").expect("forward");
        let calls = std::fs::read_to_string(&log).expect("log");
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(
            calls,
            vec![
                "-s emulator-5554 forward --remove tcp:8888",
                "-s emulator-5554 forward tcp:8888 tcp:8888",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failed_forward_is_a_dependency_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let program = fake_adb(dir.path(), "echo 'error: no devices/emulators found' >&2; exit 1");
        let shell = AdbShell::new(program, None, Duration::from_secs(5));
        let err = ensure_forward(&shell, 8888, "trace").expect_err("forward");
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(err.error.contains("no devices"));
    }

    #[test]
    fn request_round_trips_a_line() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut writer = stream;
            for _ in 0..2 {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read");
                writer
                    .write_all(format!("echo:{}\n", line.trim()).as_bytes())
                    .expect("write");
            }
        });

        let mut client = CompanionClient::connect(addr, Duration::from_secs(2), "trace").expect("connect");
        assert_eq!(client.request("ping").expect("ping"), "echo:ping");
        assert_eq!(client.request("top_activity\n").expect("second"), "echo:top_activity");
        server.join().expect("server");

        let err = client.request("after close").expect_err("closed");
        assert!(err.code == "ERR_DEPENDENCY" || err.code == "ERR_TIMEOUT");
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(300));
            drop(stream);
        });

        let mut client = CompanionClient::connect(addr, Duration::from_millis(100), "trace").expect("connect");
        let err = client.request("ping").expect_err("timeout");
        assert_eq!(err.code, "ERR_TIMEOUT");
        server.join().expect("server");
    }

    #[test]
    fn multi_line_requests_are_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let mut client = CompanionClient::connect(addr, Duration::from_secs(1), "trace").expect("connect");
        let err = client.request("a\nb").expect_err("multi-line");
        assert_eq!(err.code, "ERR_VALIDATION");
    }

    #[test]
    fn refused_connection_is_a_dependency_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let err = CompanionClient::connect(addr, Duration::from_millis(200), "trace")
            .err()
            .expect("refused");
        assert_eq!(err.code, "ERR_DEPENDENCY");
    }
}
