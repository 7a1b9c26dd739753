use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::service::cache::ContentAddressedCache;
use crate::service::checkin::{CheckinOrchestrator, CheckinRequest};
use crate::service::cleanup::CleanupScheduler;
use crate::service::speech::is_tts_file_name;
use crate::shared::error::{CheckinError, UploadError};

const MAX_HEADER_BYTES: usize = 64 * 1024;
const BODY_READ_TIMEOUT: Duration = Duration::from_secs(30);
const BODY_DISCARD_TIMEOUT: Duration = Duration::from_secs(5);
const AUDIO_CACHE_CONTROL: &str = "public, max-age=3600";
const UPLOAD_PREFIX: &str = "checkin_";

/// Everything a connection handler needs. Cheap to clone.
#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: Arc<CheckinOrchestrator>,
    pub scheduler: Arc<CleanupScheduler>,
    pub cache: Arc<ContentAddressedCache>,
    pub audio_dir: PathBuf,
    /// Path prefix generated audio is served under, without trailing slash.
    pub audio_url_prefix: String,
    pub upload_dir: PathBuf,
    pub upload_max_bytes: u64,
    pub io_timeout: Duration,
}

struct Request {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    /// Body bytes that arrived together with the headers.
    body_prefix: Vec<u8>,
}

/// Running server. [`shutdown`](Self::shutdown) stops accepting and waits for
/// in-flight requests; [`abort`](Self::abort) drops everything at once.
pub struct ServerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub async fn shutdown(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            log::warn!("[http] server task ended abnormally: {}", e);
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Binds `bind` and serves until shut down.
pub async fn spawn_checkin_server(bind: &str, state: HttpState) -> std::io::Result<ServerHandle> {
    let listener = TcpListener::bind(bind).await?;
    log::info!("[http] listening on {}", bind);
    Ok(spawn_checkin_server_with_listener(listener, state))
}

pub fn spawn_checkin_server_with_listener(listener: TcpListener, state: HttpState) -> ServerHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        if let Err(e) = run_with_listener(listener, state, stop_rx).await {
            log::error!("[http] server error: {:?}", e);
        }
    });
    ServerHandle {
        stop_tx: Some(stop_tx),
        task,
    }
}

async fn run_with_listener(
    listener: TcpListener,
    state: HttpState,
    mut stop_rx: oneshot::Receiver<()>,
) -> std::io::Result<()> {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            accepted = listener.accept() => {
                let (mut socket, _) = accepted?;
                let state = state.clone();
                connections.spawn(async move {
                    if let Err(e) = handle_conn(&mut socket, &state).await {
                        log::debug!("[http] connection error: {}", e);
                    }
                });
            }
            // reap finished connections
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    if !connections.is_empty() {
        log::info!("[http] waiting for {} in-flight connection(s)", connections.len());
    }
    while connections.join_next().await.is_some() {}
    log::info!("[http] server stopped");
    Ok(())
}

/// Deletes `checkin_*` uploads left behind by a previous process. Returns how many went.
pub async fn sweep_stale_uploads(upload_dir: &Path) -> usize {
    let mut dir = match tokio::fs::read_dir(upload_dir).await {
        Ok(dir) => dir,
        Err(_) => return 0,
    };
    let mut removed = 0;
    while let Ok(Some(entry)) = dir.next_entry().await {
        let name = entry.file_name();
        let is_upload = name
            .to_str()
            .is_some_and(|name| name.starts_with(UPLOAD_PREFIX));
        if is_upload && tokio::fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        log::info!("[http] removed {} stale upload(s) from {}", removed, upload_dir.display());
    }
    removed
}

async fn handle_conn(socket: &mut TcpStream, state: &HttpState) -> std::io::Result<()> {
    let Some(request) = read_request_head(socket).await? else {
        return Ok(());
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/ping") => {
            let body = json!({
                "pong": true,
                "message": "Check-in API server is running",
                "timestamp": now_rfc3339(),
            });
            respond_json(socket, &request, 200, &body).await
        }
        ("GET", "/api/health") => {
            let body = json!({
                "status": "healthy",
                "service": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": now_rfc3339(),
                "cache": state.cache.stats().await,
                "cleanup": state.scheduler.status().await,
            });
            respond_json(socket, &request, 200, &body).await
        }
        ("POST", "/api/checkin") => handle_checkin(socket, state, request).await,
        ("GET" | "HEAD", path) if path.starts_with(&format!("{}/", state.audio_url_prefix)) => {
            serve_audio(socket, state, &request).await
        }
        _ => {
            let body = json!({ "success": false, "error": "Route not found" });
            respond_json(socket, &request, 404, &body).await
        }
    }
}

async fn read_request_head(socket: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut buf = vec![0u8; 4096];
    let mut read_len = 0usize;
    let header_end = loop {
        let n = socket.read(&mut buf[read_len..]).await?;
        if n == 0 {
            return Ok(None);
        }
        read_len += n;
        if let Some(pos) = buf[..read_len].windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if read_len > MAX_HEADER_BYTES {
            write_response_with_headers(socket, 431, "Request Header Fields Too Large", &[], b"", 0, true).await?;
            return Ok(None);
        }
        if read_len == buf.len() {
            buf.resize(buf.len() + 4096, 0);
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]);
    let mut lines = head.lines();
    let Some(first_line) = lines.next() else {
        return Ok(None);
    };
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("");
    let (path, query) = split_target(target);

    let mut headers = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok(Some(Request {
        method,
        path,
        query,
        headers,
        body_prefix: buf[header_end + 4..read_len].to_vec(),
    }))
}

async fn handle_checkin(socket: &mut TcpStream, state: &HttpState, request: Request) -> std::io::Result<()> {
    let content_len: u64 = request
        .headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if content_len > state.upload_max_bytes {
        let max_mb = state.upload_max_bytes / (1024 * 1024);
        discard_body(socket, &request.body_prefix, content_len).await;
        return respond_error(socket, &request, CheckinError::from(UploadError::TooLarge { max_mb })).await;
    }
    if content_len == 0 {
        return respond_error(socket, &request, UploadError::MissingFile.into()).await;
    }
    let Some(ext) = request
        .headers
        .get("content-type")
        .and_then(|ct| extension_for_content_type(ct))
    else {
        discard_body(socket, &request.body_prefix, content_len).await;
        return respond_error(socket, &request, UploadError::UnsupportedFormat.into()).await;
    };

    let temp_path = state
        .upload_dir
        .join(format!("{}{}.{}", UPLOAD_PREFIX, Uuid::new_v4().simple(), ext));
    let spooled = tokio::time::timeout(
        BODY_READ_TIMEOUT,
        spool_body(socket, &request.body_prefix, content_len, &temp_path),
    )
    .await;
    match spooled {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            log::warn!("[http] upload spool failed: {}", e);
            return respond_error(socket, &request, CheckinError::Internal(e.to_string())).await;
        }
        Err(_) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            log::warn!("[http] upload body timed out");
            let body = json!({ "success": false, "error": "Upload timed out", "timestamp": now_rfc3339() });
            return respond_json(socket, &request, 408, &body).await;
        }
    }

    let checkin = CheckinRequest {
        audio_path: Some(temp_path),
        mode_param: request.query.get("mode").cloned(),
        mode_header: request.headers.get("x-coaching-mode").cloned(),
        tts_param: request.query.get("tts").cloned(),
    };
    match state.orchestrator.process(checkin).await {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(body) => respond_json(socket, &request, 200, &body).await,
            Err(e) => respond_error(socket, &request, CheckinError::Internal(e.to_string())).await,
        },
        Err(err) => respond_error(socket, &request, err).await,
    }
}

async fn spool_body(socket: &mut TcpStream, prefix: &[u8], content_len: u64, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;
    let take = prefix.len().min(content_len as usize);
    file.write_all(&prefix[..take]).await?;
    let mut remaining = content_len - take as u64;
    let mut chunk = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let want = chunk.len().min(remaining as usize);
        let n = socket.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "client closed before sending the full body",
            ));
        }
        file.write_all(&chunk[..n]).await?;
        remaining -= n as u64;
    }
    file.flush().await
}

/// Reads and drops a rejected body so the client sees the response instead of a reset.
async fn discard_body(socket: &mut TcpStream, prefix: &[u8], content_len: u64) {
    let mut remaining = content_len.saturating_sub(prefix.len() as u64);
    let mut chunk = vec![0u8; 64 * 1024];
    let drained = tokio::time::timeout(BODY_DISCARD_TIMEOUT, async {
        while remaining > 0 {
            let want = chunk.len().min(remaining as usize);
            match socket.read(&mut chunk[..want]).await {
                Ok(0) | Err(_) => break,
                Ok(n) => remaining -= n as u64,
            }
        }
    })
    .await;
    if drained.is_err() {
        log::debug!("[http] gave up draining rejected upload body");
    }
}

async fn serve_audio(socket: &mut TcpStream, state: &HttpState, request: &Request) -> std::io::Result<()> {
    let is_head = request.method == "HEAD";
    let range_value = request.headers.get("range").map(|v| v.as_str());
    let name = request
        .path
        .strip_prefix(&format!("{}/", state.audio_url_prefix))
        .unwrap_or("");
    if !is_tts_file_name(name) {
        log_audio_response(404, &request.path, range_value);
        return write_response(socket, 404, "Not Found", b"").await;
    }
    let file_path = state.audio_dir.join(name);

    let meta = match tokio::time::timeout(state.io_timeout, tokio::fs::metadata(&file_path)).await {
        Ok(Ok(meta)) => meta,
        Ok(Err(_)) => {
            log_audio_response(404, &request.path, range_value);
            return write_response(socket, 404, "Not Found", b"").await;
        }
        Err(_) => {
            log_audio_response(504, &request.path, range_value);
            return write_response(socket, 504, "Gateway Timeout", b"").await;
        }
    };
    let total_len = meta.len();
    if total_len == 0 {
        log_audio_response(404, &request.path, range_value);
        return write_response(socket, 404, "Not Found", b"").await;
    }

    if let Some(range) = range_value {
        let Ok((start, end)) = parse_range(range, total_len) else {
            log_audio_response(416, &request.path, range_value);
            let headers = [
                ("Accept-Ranges", "bytes".to_string()),
                ("Content-Range", format!("bytes */{}", total_len)),
            ];
            return write_response_with_headers(socket, 416, "Range Not Satisfiable", &headers, b"", 0, true)
                .await;
        };
        let chunk_len = end - start + 1;
        let headers = [
            ("Content-Type", "audio/mpeg".to_string()),
            ("Accept-Ranges", "bytes".to_string()),
            ("Cache-Control", AUDIO_CACHE_CONTROL.to_string()),
            ("Content-Range", format!("bytes {}-{}/{}", start, end, total_len)),
        ];
        if is_head {
            log_audio_response(206, &request.path, range_value);
            return write_response_with_headers(socket, 206, "Partial Content", &headers, &[], chunk_len, false)
                .await;
        }
        let read_res = tokio::time::timeout(state.io_timeout, async {
            let mut file = tokio::fs::File::open(&file_path).await?;
            file.seek(SeekFrom::Start(start)).await?;
            let mut buf = vec![0u8; chunk_len as usize];
            file.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        })
        .await;
        match read_res {
            Ok(Ok(bytes)) => {
                log_audio_response(206, &request.path, range_value);
                write_response_with_headers(socket, 206, "Partial Content", &headers, &bytes, chunk_len, true).await
            }
            Ok(Err(_)) => {
                log_audio_response(404, &request.path, range_value);
                write_response(socket, 404, "Not Found", b"").await
            }
            Err(_) => {
                log_audio_response(504, &request.path, range_value);
                write_response(socket, 504, "Gateway Timeout", b"").await
            }
        }
    } else {
        let headers = [
            ("Content-Type", "audio/mpeg".to_string()),
            ("Accept-Ranges", "bytes".to_string()),
            ("Cache-Control", AUDIO_CACHE_CONTROL.to_string()),
        ];
        if is_head {
            log_audio_response(200, &request.path, range_value);
            return write_response_with_headers(socket, 200, "OK", &headers, &[], total_len, false).await;
        }
        match tokio::time::timeout(state.io_timeout, tokio::fs::read(&file_path)).await {
            Ok(Ok(bytes)) => {
                log_audio_response(200, &request.path, range_value);
                write_response_with_headers(socket, 200, "OK", &headers, &bytes, bytes.len() as u64, true).await
            }
            Ok(Err(_)) => {
                log_audio_response(404, &request.path, range_value);
                write_response(socket, 404, "Not Found", b"").await
            }
            Err(_) => {
                log_audio_response(504, &request.path, range_value);
                write_response(socket, 504, "Gateway Timeout", b"").await
            }
        }
    }
}

async fn respond_error(socket: &mut TcpStream, request: &Request, err: CheckinError) -> std::io::Result<()> {
    let status = err.status_code();
    if status >= 500 {
        log::error!("[http] {} {} failed: {}", request.method, request.path, err);
    }
    let body = json!({
        "success": false,
        "error": err.public_message(),
        "timestamp": now_rfc3339(),
    });
    respond_json(socket, request, status, &body).await
}

async fn respond_json(socket: &mut TcpStream, request: &Request, status: u16, body: &Value) -> std::io::Result<()> {
    log::info!("[http] {} {} status={}", request.method, request.path, status);
    let bytes = body.to_string().into_bytes();
    let headers = [("Content-Type", "application/json".to_string())];
    write_response_with_headers(socket, status, reason_phrase(status), &headers, &bytes, bytes.len() as u64, true)
        .await
}

async fn write_response(socket: &mut TcpStream, status: u16, reason: &str, body: &[u8]) -> std::io::Result<()> {
    let headers = [("Content-Type", "text/plain".to_string())];
    write_response_with_headers(socket, status, reason, &headers, body, body.len() as u64, true).await
}

async fn write_response_with_headers(
    socket: &mut TcpStream,
    status: u16,
    reason: &str,
    headers: &[(&str, String)],
    body: &[u8],
    content_len: u64,
    write_body: bool,
) -> std::io::Result<()> {
    let mut resp = Vec::new();
    resp.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", status, reason).as_bytes());
    for (name, value) in headers {
        resp.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    resp.extend_from_slice(format!("Content-Length: {content_len}\r\n").as_bytes());
    resp.extend_from_slice(b"Connection: close\r\n\r\n");
    if write_body {
        resp.extend_from_slice(body);
    }
    socket.write_all(&resp).await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

/// Maps an upload's Content-Type to the extension it is spooled under.
pub fn extension_for_content_type(value: &str) -> Option<&'static str> {
    let mime = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match mime.as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Some("m4a"),
        _ => None,
    }
}

/// Query keys and values are percent-decoded, with `+` read as a space.
fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let params = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    (path.to_string(), params)
}

/// Single `bytes=start-[end]` range; the end is clamped to the file length.
fn parse_range(value: &str, total_len: u64) -> Result<(u64, u64), ()> {
    let range_set = value.trim().strip_prefix("bytes=").ok_or(())?;
    if range_set.contains(',') {
        return Err(());
    }
    let (start_str, end_str) = range_set.split_once('-').ok_or(())?;
    if start_str.is_empty() {
        return Err(());
    }
    let start: u64 = start_str.parse().map_err(|_| ())?;
    if start >= total_len {
        return Err(());
    }
    let end = if end_str.is_empty() {
        total_len - 1
    } else {
        end_str.parse::<u64>().map_err(|_| ())?
    };
    if end < start {
        return Err(());
    }
    Ok((start, end.min(total_len - 1)))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn log_audio_response(status: u16, path: &str, range: Option<&str>) {
    log::info!(
        "[http] audio_access status={} path={} range={}",
        status,
        path,
        range.unwrap_or("-")
    );
}
