//! Minimal HTTP surface over the monitor.
//!
//! Exposes the three consumer operations (`/count`, `/detections`,
//! `/stream`) plus `/health`. This layer only forwards; counting, recovery,
//! and streaming semantics all live in the core. Authentication, persistence,
//! and settings management belong to the surrounding service and are not
//! handled here.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::detect::Detection;
use crate::monitor::CrowdMonitor;
use crate::stream::STREAM_CONTENT_TYPE;

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8642".to_string(),
        }
    }
}

/// Handle for a running API server thread.
#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    monitor: CrowdMonitor,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, monitor: CrowdMonitor) -> Self {
        Self { cfg, monitor }
    }

    /// Bind and serve on a background thread. Every connection gets its own
    /// handler thread, so long-lived stream clients do not starve count
    /// queries.
    pub fn spawn(self) -> Result<ApiHandle> {
        let listener = TcpListener::bind(self.cfg.addr.as_str())?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let monitor = self.monitor.clone();
        let join = std::thread::spawn(move || {
            run_api(listener, monitor, shutdown_thread);
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, monitor: CrowdMonitor, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let monitor = monitor.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &monitor, &shutdown) {
                        log::warn!("api request failed: {err:#}");
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => {
                log::error!("api accept failed: {err}");
                break;
            }
        }
    }
}

#[derive(Serialize)]
struct CountResponse {
    count: usize,
    alert: bool,
    detections: Vec<Detection>,
}

#[derive(Serialize)]
struct DetectionsResponse {
    detections: Vec<Detection>,
}

fn handle_connection(
    mut stream: TcpStream,
    monitor: &CrowdMonitor,
    shutdown: &AtomicBool,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }

    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/count" => {
            let count = monitor.count();
            let body = serde_json::to_vec(&CountResponse {
                count,
                alert: count >= monitor.config().detection.crowd_threshold,
                detections: monitor.detections(),
            })?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        "/detections" => {
            let body = serde_json::to_vec(&DetectionsResponse {
                detections: monitor.detections(),
            })?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        "/stream" => stream_response(stream, monitor, shutdown),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

/// Forward the multipart frame stream until the client disconnects or the
/// server shuts down. The underlying iterator never ends on its own.
fn stream_response(
    mut stream: TcpStream,
    monitor: &CrowdMonitor,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {STREAM_CONTENT_TYPE}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(header.as_bytes())?;

    for chunk in monitor.stream() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if stream.write_all(&chunk).is_err() {
            // Client went away; this consumer simply ends.
            break;
        }
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
