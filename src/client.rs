//! HTTP-over-Unix-socket client for talking to a running daemon.
//!
//! Used by short-lived `check` / `stop` invocations. A request carries a
//! deadline because `GET /check` legitimately blocks while a cycle is in
//! flight; the socket read timeout bounds that wait.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DaemonError, Result};
use crate::socket::{socket_exists, socket_path_for_workspace};

/// Default timeout for quick exchanges like `stop`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to the daemon serving a particular workspace.
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    pub fn new(workspace: &Path) -> Result<Self> {
        Ok(Self {
            socket_path: socket_path_for_workspace(workspace)?,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether a daemon appears to be serving this workspace.
    pub fn is_server_running(&self) -> bool {
        socket_exists(&self.socket_path)
    }

    /// Fetch the latest check result. Blocks (up to `timeout`) while a
    /// check is in progress. Returns the raw body and whether the server
    /// signalled errors via status 500.
    pub fn check(&self, format: &str, timeout: Duration) -> Result<(String, bool)> {
        let target = if format.is_empty() || format == "human" {
            "/check".to_string()
        } else {
            format!("/check?format={format}")
        };
        let response = self.request("GET", &target, timeout)?;
        Ok((response.body, response.status == 500))
    }

    /// Ask the daemon to shut down gracefully.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        let response = self.request("POST", "/stop", timeout)?;
        if response.status != 200 {
            return Err(DaemonError::UnexpectedStatus {
                status: response.status,
            });
        }
        Ok(())
    }

    fn request(&self, method: &str, target: &str, timeout: Duration) -> Result<HttpResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        write!(
            stream,
            "{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )?;
        stream.flush()?;

        let mut raw = String::new();
        stream.read_to_string(&mut raw)?;
        parse_response(&raw)
    }
}

struct HttpResponse {
    status: u16,
    body: String,
}

fn parse_response(raw: &str) -> Result<HttpResponse> {
    let (head, body) = raw
        .split_once("\r\n\r\n")
        .ok_or_else(|| DaemonError::BadResponse {
            message: "missing header terminator".to_string(),
        })?;

    let status_line = head.lines().next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| DaemonError::BadResponse {
            message: format!("bad status line: {status_line}"),
        })?;

    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_ok() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "hello\n");
    }

    #[test]
    fn test_parse_response_error_status() {
        let raw = "HTTP/1.1 500 Internal Server Error\r\n\r\nbad\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_parse_response_empty_body() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.body, "");
    }

    #[test]
    fn test_parse_response_malformed() {
        assert!(parse_response("garbage").is_err());
        assert!(parse_response("HTTP/1.1 abc\r\n\r\n").is_err());
    }

    #[test]
    fn test_client_reports_no_server_for_unused_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new(dir.path()).unwrap();
        assert!(!client.is_server_running());
        assert!(client.check("human", Duration::from_millis(200)).is_err());
    }
}
