//! Local status API.
//!
//! Read-only view of the kiosk for a companion display or an operator:
//! - `GET /health`
//! - `GET /status`: current message, lockout and session counters (JSON)
//! - `GET /relatorio/{semanal|mensal}`: proxies the backend report as an
//!   `.xlsx` attachment; refused with 423 while the kiosk is locked.
//!
//! Connections from non-loopback peers are rejected when bound to loopback.

use crate::reports::{ReportKind, ReportSource};
use crate::status::StatusBoard;
use anyhow::{anyhow, Result};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 8192;
const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8798".to_string(),
        }
    }
}

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

/// Ask a running kiosk daemon whether report actions are enabled.
///
/// Returns `Ok(None)` when nothing answers at `addr`.
pub fn daemon_report_actions(addr: &str, timeout: Duration) -> Result<Option<bool>> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let response = match agent.get(&format!("http://{}/status", addr)).call() {
        Ok(response) => response,
        Err(ureq::Error::Transport(err)) => {
            log::debug!("no kiosk daemon at {}: {}", addr, err);
            return Ok(None);
        }
        Err(ureq::Error::Status(code, _)) => {
            return Err(anyhow!("kiosk daemon at {} answered HTTP {}", addr, code));
        }
    };
    let snapshot: serde_json::Value = response.into_json()?;
    snapshot
        .get("report_actions_enabled")
        .and_then(serde_json::Value::as_bool)
        .map(Some)
        .ok_or_else(|| anyhow!("kiosk daemon status lacks report_actions_enabled"))
}

pub struct StatusApi {
    cfg: ApiConfig,
    board: StatusBoard,
    reports: Arc<dyn ReportSource>,
}

impl StatusApi {
    pub fn new(cfg: ApiConfig, board: StatusBoard, reports: Arc<dyn ReportSource>) -> Self {
        Self {
            cfg,
            board,
            reports,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &self.board, self.reports.as_ref(), shutdown_thread)
            {
                log::error!("status api stopped: {}", err);
            }
        });
        log::info!("status api listening on http://{}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    board: &StatusBoard,
    reports: &dyn ReportSource,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, board, reports) {
                    log::warn!("status api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    board: &StatusBoard,
    reports: &dyn ReportSource,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    if request.path == "/health" {
        return write_json_response(&mut stream, 200, r#"{"status":"ok"}"#);
    }
    if request.path == "/status" {
        let payload = serde_json::to_vec(&board.snapshot())?;
        return write_response(&mut stream, 200, "application/json", &[], &payload);
    }
    if let Some(kind) = request.path.strip_prefix("/relatorio/") {
        let kind: ReportKind = match kind.parse() {
            Ok(kind) => kind,
            Err(_) => {
                return write_json_response(&mut stream, 404, r#"{"error":"unknown_report"}"#)
            }
        };
        return serve_report(&mut stream, kind, board, reports);
    }
    write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)
}

fn serve_report(
    stream: &mut TcpStream,
    kind: ReportKind,
    board: &StatusBoard,
    reports: &dyn ReportSource,
) -> Result<()> {
    if !board.report_actions_enabled() {
        return write_json_response(stream, 423, r#"{"error":"locked"}"#);
    }
    match reports.fetch_report(kind) {
        Ok(bytes) if !bytes.is_empty() => {
            log::info!("report {} served ({} bytes)", kind, bytes.len());
            let disposition = format!("attachment; filename=\"{}\"", kind.file_name());
            write_response(
                stream,
                200,
                XLSX_CONTENT_TYPE,
                &[("Content-Disposition", disposition.as_str())],
                &bytes,
            )
        }
        Ok(_) => {
            log::warn!("report {} came back empty", kind);
            write_json_response(stream, 502, r#"{"error":"report_failed"}"#)
        }
        Err(err) => {
            log::warn!("report {} failed: {}", kind, err);
            write_json_response(stream, 502, r#"{"error":"report_failed"}"#)
        }
    }
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
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
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
    write_response(stream, status, "application/json", &[], body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        423 => "HTTP/1.1 423 Locked",
        502 => "HTTP/1.1 502 Bad Gateway",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    for (name, value) in extra_headers {
        header.push_str(&format!("{}: {}\r\n", name, value));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
