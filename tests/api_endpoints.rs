//! HTTP surface tests: the endpoints only forward what the core publishes.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use crowdwatch::api::{ApiConfig, ApiServer};
use crowdwatch::{CrowdMonitor, CrowdwatchConfig};

fn mock_config() -> CrowdwatchConfig {
    let mut config = CrowdwatchConfig::default();
    config.camera.mock = true;
    config.detection.model_graph = "/nonexistent/model.onnx".into();
    config.detection.model_labels = "/nonexistent/model.labels".into();
    config.api_addr = "127.0.0.1:0".to_string();
    config
}

fn get(addr: std::net::SocketAddr, path: &str) -> Result<(String, String)> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

#[test]
fn health_count_and_detections_respond() -> Result<()> {
    let config = mock_config();
    let monitor = CrowdMonitor::new(config.clone());
    let api = ApiServer::new(
        ApiConfig {
            addr: config.api_addr.clone(),
        },
        monitor.clone(),
    )
    .spawn()?;

    let (headers, body) = get(api.addr, "/health")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    assert_eq!(body, r#"{"status":"ok"}"#);

    let (headers, body) = get(api.addr, "/count")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    let value: Value = serde_json::from_str(&body)?;
    // Degraded mode: zero people, never alerting.
    assert_eq!(value["count"], 0);
    assert_eq!(value["alert"], false);
    assert!(value["detections"].as_array().unwrap().is_empty());

    let (_, body) = get(api.addr, "/detections")?;
    let value: Value = serde_json::from_str(&body)?;
    assert!(value["detections"].as_array().unwrap().is_empty());

    let (headers, _) = get(api.addr, "/missing")?;
    assert!(headers.starts_with("HTTP/1.1 404"));

    api.stop()?;
    monitor.stop();
    Ok(())
}

#[test]
fn stream_endpoint_serves_multipart_frames() -> Result<()> {
    let config = mock_config();
    let monitor = CrowdMonitor::new(config.clone());
    let api = ApiServer::new(
        ApiConfig {
            addr: config.api_addr.clone(),
        },
        monitor.clone(),
    )
    .spawn()?;

    let mut stream = TcpStream::connect(api.addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(stream, "GET /stream HTTP/1.1\r\nHost: localhost\r\n\r\n")?;

    // Read enough to cover the response header and at least one chunk.
    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    while collected.len() < 16 * 1024 {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
        let text = String::from_utf8_lossy(&collected);
        if text.contains("--frame\r\nContent-Type: image/jpeg") {
            break;
        }
    }
    drop(stream);

    let text = String::from_utf8_lossy(&collected);
    assert!(text.starts_with("HTTP/1.1 200"));
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(text.contains("--frame\r\nContent-Type: image/jpeg"));

    api.stop()?;
    monitor.stop();
    Ok(())
}
