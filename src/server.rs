use std::sync::Arc;

use anyhow::{anyhow, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::coordinator::{Caller, Coordinator};
use crate::types::{Role, SubmitRequest, SubmitResponse};

const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Minimal HTTP front for the coordinator: one short-lived connection per
/// request, JSON in and out.
pub struct CoordinatorServer {
    coordinator: Arc<Coordinator>,
}

impl CoordinatorServer {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn serve(&self, bind_addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        log::info!("coordinator listening on {}", listener.local_addr()?);

        loop {
            let (socket, peer) = listener.accept().await?;
            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move {
                if let Err(err) = handle_connection(socket, &coordinator).await {
                    log::debug!("connection from {peer}: {err:#}");
                }
            });
        }
    }
}

async fn handle_connection(mut socket: TcpStream, coordinator: &Coordinator) -> anyhow::Result<()> {
    let response = match read_request(&mut socket).await {
        Ok(request) => route(&request, coordinator),
        Err(err) => error_response(400, &format!("malformed request: {err}")),
    };
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

struct Request {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    body: Vec<u8>,
}

async fn read_request(socket: &mut TcpStream) -> anyhow::Result<Request> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            bail!("connection closed before headers were complete");
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            bail!("headers too large");
        }
    };

    let head = std::str::from_utf8(&buf[..header_end])?;
    let mut lines = head.lines();
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?.to_string();
    let target = parts.next().ok_or_else(|| anyhow!("missing request target"))?;

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse()?;
            }
        }
    }
    if content_length > MAX_REQUEST_BYTES {
        bail!("body too large");
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            bail!("connection closed before body was complete");
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query(query)),
        None => (target.to_string(), Vec::new()),
    };

    Ok(Request {
        method,
        path,
        query,
        body,
    })
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn route(request: &Request, coordinator: &Coordinator) -> String {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/template") => {
            let caller = match parse_caller(&request.query) {
                Ok(caller) => caller,
                Err(message) => return error_response(400, &message),
            };
            let template = coordinator.template(caller.as_ref());
            json_or_500(&*template)
        }
        ("POST", "/submit") => {
            let submission: SubmitRequest = match serde_json::from_slice(&request.body) {
                Ok(submission) => submission,
                Err(err) => return error_response(400, &format!("invalid submission: {err}")),
            };
            if submission.miner_id.is_empty() || submission.miner_id.len() > 64 {
                return error_response(400, "miner_id must be 1..=64 characters");
            }
            let status = coordinator.submit(&submission);
            json_or_500(&SubmitResponse { status })
        }
        ("GET", "/stats") => json_or_500(&coordinator.stats()),
        ("GET", "/health") => json_or_500(&coordinator.health()),
        _ => error_response(404, "not found"),
    }
}

/// A poll that names a miner must name it coherently; a poll with no
/// miner_id at all is anonymous and fine.
fn parse_caller(query: &[(String, String)]) -> Result<Option<Caller>, String> {
    let get = |key: &str| query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

    let Some(miner_id) = get("miner_id") else {
        return Ok(None);
    };
    if miner_id.is_empty() || miner_id.len() > 64 {
        return Err("miner_id must be 1..=64 characters".to_string());
    }
    let role = match get("role") {
        Some(raw) => raw.parse::<Role>().map_err(|err| err.to_string())?,
        None => Role::Sequential,
    };
    let attempts = match get("attempts") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("attempts must be an integer, got '{raw}'"))?,
        None => 0,
    };
    Ok(Some(Caller {
        miner_id: miner_id.to_string(),
        role,
        attempts,
    }))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn json_or_500<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json_response(200, &json),
        Err(_) => error_response(500, "internal server error"),
    }
}

fn json_response(status: u16, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason(status),
        body.len(),
        body
    )
}

fn error_response(status: u16, message: &str) -> String {
    let body = match serde_json::to_string(message) {
        Ok(quoted) => format!("{{\"error\": {quoted}}}"),
        Err(_) => "{\"error\": \"internal server error\"}".to_string(),
    };
    json_response(status, &body)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}
