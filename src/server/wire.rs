//! Minimal HTTP/1.1 request reader and response writer.

use anyhow::anyhow;
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_HEADER_COUNT: usize = 128;
pub(crate) const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
#[error("request body exceeds configured limit of {limit} bytes")]
pub(crate) struct RequestBodyTooLarge {
    limit: usize,
}

/// A request read off the socket, body fully buffered.
#[derive(Debug, Clone)]
pub(crate) struct ParsedRequest {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub query: HashMap<String, String>,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        header_value(&self.headers, name)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

pub(crate) async fn read_http_request<S>(stream: &mut S) -> anyhow::Result<ParsedRequest>
where
    S: AsyncRead + Unpin,
{
    let (raw_head, mut body) = read_message_head(stream).await?;

    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADER_COUNT];
    let mut req = httparse::Request::new(&mut header_storage);
    let status = req.parse(&raw_head)?;
    if status.is_partial() {
        return Err(anyhow!("partial HTTP request"));
    }

    let method = req.method.unwrap_or("GET").to_ascii_uppercase();
    let target = req.path.unwrap_or("/");
    let version = format!("HTTP/1.{}", req.version.unwrap_or(1));
    let headers = headers_from_httparse(req.headers)
        .into_iter()
        .collect::<HashMap<String, String>>();

    if header_value(&headers, "transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
    {
        return Err(anyhow!("chunked request bodies are not supported"));
    }

    let content_length = header_value(&headers, "content-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BODY_BYTES {
        return Err(RequestBodyTooLarge {
            limit: MAX_REQUEST_BODY_BYTES,
        }
        .into());
    }
    if body.len() < content_length {
        let rest = read_exact_body(stream, content_length - body.len()).await?;
        body.extend_from_slice(&rest);
    }
    // Pipelined bytes past the declared body are dropped.
    body.truncate(content_length);

    let (path, query) = split_target(target);

    Ok(ParsedRequest {
        method,
        path,
        query,
        version,
        headers,
        body,
    })
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let without_fragment = target.split('#').next().unwrap_or(target);
    match without_fragment.split_once('?') {
        Some((path, raw_query)) => {
            let query = url::form_urlencoded::parse(raw_query.as_bytes())
                .into_owned()
                .collect();
            (path.to_string(), query)
        }
        None => (without_fragment.to_string(), HashMap::new()),
    }
}

async fn read_message_head<S>(stream: &mut S) -> anyhow::Result<(Vec<u8>, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(2048);
    let mut temp = [0u8; 4096];

    loop {
        let bytes_read = stream.read(&mut temp).await?;
        if bytes_read == 0 {
            break;
        }
        buffer.extend_from_slice(&temp[..bytes_read]);

        if let Some(pos) = find_header_end(&buffer) {
            let remaining = buffer.split_off(pos);
            return Ok((buffer, remaining));
        }

        if buffer.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("HTTP headers exceed allowed size"));
        }
    }

    Err(anyhow!("connection closed before headers completed"))
}

async fn read_exact_body<S>(stream: &mut S, expected_len: usize) -> anyhow::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut body = Vec::with_capacity(expected_len);
    let mut remaining = expected_len;

    while remaining > 0 {
        let mut chunk = vec![0u8; remaining.min(8192)];
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(anyhow!("connection closed while reading request body"));
        }
        body.extend_from_slice(&chunk[..read]);
        remaining -= read;
    }

    Ok(body)
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn headers_from_httparse(headers: &[httparse::Header]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|h| {
            let name = h.name.to_string();
            let value = String::from_utf8_lossy(h.value).to_string();
            (name, value)
        })
        .collect()
}

pub(crate) fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

fn reason_phrase(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}

/// Response assembled by a route or the static handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(value.to_string().into_bytes())
    }

    pub fn text(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status)
            .with_header("Content-Type", content_type)
            .with_body(body.into())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Serialize status line, headers and body. `head_only` omits the body
    /// but keeps its length.
    pub(crate) async fn write_to<W>(
        &self,
        stream: &mut W,
        keep_alive: bool,
        head_only: bool,
    ) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str(if keep_alive {
            "Connection: keep-alive\r\n\r\n"
        } else {
            "Connection: close\r\n\r\n"
        });
        stream.write_all(head.as_bytes()).await?;
        if !head_only {
            stream.write_all(&self.body).await?;
        }
        stream.flush().await?;
        Ok(())
    }
}

pub(crate) async fn respond_with_status<W>(
    stream: &mut W,
    code: u16,
    message: &str,
    body: &str,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body_bytes = body.as_bytes();
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\nContent-Type: text/plain\r\n\r\n{}",
        code,
        message,
        body_bytes.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}
