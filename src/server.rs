//! HTTP-over-Unix-socket request server.
//!
//! Exposes the latest check snapshot at `GET /check` (blocking while a
//! cycle is in flight) and a shutdown channel at `POST /stop`. One
//! accept loop, one thread per in-flight request; the protocol is plain
//! HTTP/1.1 with `Connection: close` on every response.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{DaemonError, Result};
use crate::interpreter::format_human;
use crate::runner::Runner;

/// Serves check results over a per-workspace Unix socket.
pub struct CheckServer {
    socket_path: PathBuf,
    runner: Arc<Runner>,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    accept_handle: Option<thread::JoinHandle<()>>,
    // Dropping the sender closes the channel; that close *is* the
    // shutdown signal, so the slot is never sent on.
    shutdown_tx: Arc<Mutex<Option<Sender<()>>>>,
    shutdown_rx: Receiver<()>,
}

impl CheckServer {
    pub fn new(socket_path: PathBuf, runner: Arc<Runner>) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        Self {
            socket_path,
            runner,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            accept_handle: None,
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
            shutdown_rx,
        }
    }

    /// Becomes readable (disconnected) once a client has requested
    /// shutdown via `POST /stop`.
    pub fn shutdown_requested(&self) -> Receiver<()> {
        self.shutdown_rx.clone()
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Bind the socket and start accepting. A stale socket file from an
    /// unclean shutdown is removed first.
    pub fn start(&mut self) -> Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path).map_err(|source| DaemonError::Bind {
            path: self.socket_path.clone(),
            source,
        })?;

        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let in_flight = Arc::clone(&self.in_flight);
        let runner = Arc::clone(&self.runner);
        let shutdown_tx = Arc::clone(&self.shutdown_tx);

        self.accept_handle = Some(thread::spawn(move || {
            for stream in listener.incoming() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let runner = Arc::clone(&runner);
                        let shutdown_tx = Arc::clone(&shutdown_tx);
                        let in_flight = Arc::clone(&in_flight);
                        in_flight.fetch_add(1, Ordering::SeqCst);
                        thread::spawn(move || {
                            if let Err(e) = handle_connection(stream, &runner, &shutdown_tx) {
                                tracing::debug!("connection error: {e}");
                            }
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => tracing::warn!("accept error: {e}"),
                }
            }
        }));

        Ok(())
    }

    /// Stop accepting, wait up to `drain_deadline` for in-flight
    /// requests, and remove the socket file. The file is removed even
    /// when draining times out.
    pub fn stop(&mut self, drain_deadline: Duration) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        // The accept loop only re-checks its flag on a new connection.
        let _ = UnixStream::connect(&self.socket_path);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }

        let deadline = Instant::now() + drain_deadline;
        while self.in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let drained = self.in_flight.load(Ordering::SeqCst) == 0;

        let _ = std::fs::remove_file(&self.socket_path);

        if drained {
            Ok(())
        } else {
            Err(DaemonError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "requests still in flight at shutdown deadline",
            )))
        }
    }
}

// ============================================================================
// Request handling
// ============================================================================

fn handle_connection(
    stream: UnixStream,
    runner: &Arc<Runner>,
    shutdown_tx: &Arc<Mutex<Option<Sender<()>>>>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");

    // Drain headers; neither endpoint takes a body.
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        if header == "\r\n" || header == "\n" {
            break;
        }
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    match (method, path) {
        ("GET", "/check") => handle_check(stream, runner, query),
        ("POST", "/stop") => handle_stop(stream, shutdown_tx),
        _ => write_response(
            stream,
            404,
            "Not Found",
            "text/plain; charset=utf-8",
            "not found\n",
        ),
    }
}

fn handle_check(stream: UnixStream, runner: &Arc<Runner>, query: Option<&str>) -> io::Result<()> {
    // Blocks while a check cycle is in flight.
    let event = runner.latest_completed();

    let (status, reason) = if event.error_count > 0 {
        (500, "Internal Server Error")
    } else {
        (200, "OK")
    };

    match format_param(query) {
        "json" => {
            let body = serde_json::to_string(&event)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            write_response(
                stream,
                status,
                reason,
                "application/json; charset=utf-8",
                &body,
            )
        }
        _ => write_response(
            stream,
            status,
            reason,
            "text/plain; charset=utf-8",
            &format_human(&event),
        ),
    }
}

fn handle_stop(
    stream: UnixStream,
    shutdown_tx: &Arc<Mutex<Option<Sender<()>>>>,
) -> io::Result<()> {
    write_response(stream, 200, "OK", "text/plain; charset=utf-8", "")?;
    // Close the channel only after the response is on the wire, so the
    // client sees its 200 before teardown begins.
    let shutdown_tx = Arc::clone(shutdown_tx);
    thread::spawn(move || {
        shutdown_tx.lock().take();
    });
    Ok(())
}

fn format_param(query: Option<&str>) -> &str {
    let Some(query) = query else {
        return "human";
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("format=") {
            if !value.is_empty() {
                return value;
            }
        }
    }
    "human"
}

fn write_response(
    mut stream: UnixStream,
    status: u16,
    reason: &str,
    content_type: &str,
    body: &str,
) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(body.as_bytes())?;
    stream.flush()
}

// ============================================================================
// Tests
// ============================================================================
