//! Local site server
//!
//! Serves the exported page from a static root, rewriting HTML on the way
//! out, and hosts the form submission API on the same listener.

pub mod middleware;
pub mod routes;
mod wire;

pub use wire::HttpResponse;

use crate::api::server_api::is_running_internal;
use crate::rewriter::Rewriter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use wire::{read_http_request, respond_with_status, ParsedRequest, RequestBodyTooLarge};

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
img-src 'self' data: https://framerusercontent.com; \
script-src 'self' https://framerusercontent.com 'unsafe-inline' 'unsafe-eval'; \
style-src 'self' 'unsafe-inline'; \
font-src 'self' data: https://framerusercontent.com; \
connect-src 'self' https://framerusercontent.com; \
frame-src 'self';";

/// Script the injector looks for before inserting anything.
pub const BOOTSTRAP_MARKER: &str = "local-asset-rewriter.js";

const DEFAULT_INJECT_SCRIPTS: [&str; 3] = [
    "/large-lifecycle-826295.framer.app/js/error-suppressor.js",
    "/large-lifecycle-826295.framer.app/js/local-asset-rewriter.js",
    "/large-lifecycle-826295.framer.app/js/form-handler.js",
];

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_address: String,
    /// Directory the exported site is served from
    pub static_root: PathBuf,
    /// Directory holding the submissions database; `None` disables the form API
    pub storage_path: Option<String>,
    /// JSON rule set replacing the built-in classification rules
    pub rules_path: Option<PathBuf>,
    pub content_security_policy: String,
    /// Origin allowed to call the API cross-origin
    pub frontend_origin: String,
    /// `<script src>` values injected after `<head>`
    pub inject_scripts: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "127.0.0.1".to_string(),
            static_root: PathBuf::from("."),
            storage_path: None,
            rules_path: None,
            content_security_policy: DEFAULT_CONTENT_SECURITY_POLICY.to_string(),
            frontend_origin: format!("http://localhost:{}", DEFAULT_PORT),
            inject_scripts: DEFAULT_INJECT_SCRIPTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Shared per-listener state.
pub(crate) struct ServerState {
    pub config: ServerConfig,
    pub rewriter: Option<Arc<Rewriter>>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let rewriter = Rewriter::global();
        if rewriter.is_none() {
            tracing::warn!("Markup rewriter unavailable; HTML will be served untouched");
        }
        Self { config, rewriter }
    }
}

/// Run the server until the running flag is cleared.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        "Site server listening on {} (root {:?})",
        addr,
        config.static_root
    );
    let state = Arc::new(ServerState::new(config));

    loop {
        if !is_running_internal() {
            break;
        }

        // Use accept with timeout so we can check cancellation periodically
        let accept_result =
            tokio::time::timeout(tokio::time::Duration::from_millis(500), listener.accept()).await;

        match accept_result {
            Ok(Ok((socket, peer_addr))) => {
                tracing::debug!("Connection from {}", peer_addr);
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, state).await {
                        let err_str = e.to_string().to_lowercase();
                        if err_str.contains("broken pipe") || err_str.contains("connection reset") {
                            tracing::debug!("Connection closed by client: {}", e);
                        } else {
                            tracing::error!("Error handling connection: {}", e);
                        }
                    }
                });
            }
            Ok(Err(e)) => tracing::error!("Accept error: {}", e),
            Err(_) => continue,
        }
    }

    tracing::info!("Site server stopped");
    Ok(())
}

/// Keep-alive idle timeout in seconds
const KEEP_ALIVE_TIMEOUT_SECS: u64 = 30;

/// Determine if connection should be kept alive based on HTTP version and headers
fn should_keep_alive(version: &str, headers: &HashMap<String, String>) -> bool {
    let connection_header = wire::header_value(headers, "connection");
    match connection_header.as_deref() {
        Some(v) if v.eq_ignore_ascii_case("close") => false,
        Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
        None => version.contains("1.1"),
        Some(_) => version.contains("1.1"),
    }
}

/// Handle a client connection with keep-alive support
pub(crate) async fn handle_connection<S>(
    mut socket: S,
    state: Arc<ServerState>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut request_number: u32 = 0;

    loop {
        request_number += 1;

        let parsed_request = match tokio::time::timeout(
            tokio::time::Duration::from_secs(KEEP_ALIVE_TIMEOUT_SECS),
            read_http_request(&mut socket),
        )
        .await
        {
            Ok(Ok(req)) => req,
            Ok(Err(err)) => {
                // Later failures are the client closing an idle connection.
                if request_number == 1 {
                    tracing::warn!("Failed to parse request: {err}");
                    let (code, message) = if err.downcast_ref::<RequestBodyTooLarge>().is_some() {
                        (413, "Payload Too Large")
                    } else {
                        (400, "Bad Request")
                    };
                    let _ = respond_with_status(
                        &mut socket,
                        code,
                        message,
                        "Unable to parse HTTP request",
                    )
                    .await;
                }
                break;
            }
            Err(_) => {
                tracing::debug!("Keep-alive timeout after {} requests", request_number - 1);
                break;
            }
        };

        let keep_alive = should_keep_alive(&parsed_request.version, &parsed_request.headers);
        let response = dispatch(&state, &parsed_request).await;
        tracing::debug!(
            method = %parsed_request.method,
            path = %parsed_request.path,
            status = response.status,
            "request served"
        );
        response
            .write_to(&mut socket, keep_alive, parsed_request.method == "HEAD")
            .await?;

        if !keep_alive {
            break;
        }
    }

    Ok(())
}

async fn dispatch(state: &ServerState, request: &ParsedRequest) -> HttpResponse {
    if routes::is_api_path(&request.path) {
        return routes::handle(&state.config, request).await;
    }
    match request.method.as_str() {
        "GET" | "HEAD" => middleware::serve(state, &request.path).await,
        _ => HttpResponse::text(405, "text/plain", "Method Not Allowed")
            .with_header("Allow", "GET, HEAD"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleSet;
    use tempfile::tempdir;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn state_for(root: PathBuf) -> Arc<ServerState> {
        let config = ServerConfig {
            static_root: root,
            ..ServerConfig::default()
        };
        Arc::new(ServerState {
            config,
            rewriter: Some(Arc::new(Rewriter::new(RuleSet::default()).unwrap())),
        })
    }

    async fn exchange(state: Arc<ServerState>, raw: &str) -> String {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server, state));
        client.write_all(raw.as_bytes()).await.unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        task.await.unwrap().unwrap();
        out
    }

    #[test]
    fn keep_alive_follows_version_and_header() {
        let mut headers = HashMap::new();
        assert!(should_keep_alive("HTTP/1.1", &headers));
        assert!(!should_keep_alive("HTTP/1.0", &headers));
        headers.insert("Connection".to_string(), "close".to_string());
        assert!(!should_keep_alive("HTTP/1.1", &headers));
    }

    #[tokio::test]
    async fn root_serves_rewritten_index() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.html"),
            "<html><head><meta http-equiv=\"Content-Security-Policy\" content=\"x\"></head>\
             <body><img src=\"https://framerusercontent.com/images/a.png?scale=2\"></body></html>",
        )
        .unwrap();

        let raw = exchange(
            state_for(dir.path().to_path_buf()),
            "GET /?utm=1 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
        assert!(raw.contains("Content-Security-Policy: default-src 'self';"));
        assert!(raw.contains("src=\"/framerusercontent.com/images/a.png\""));
        assert!(raw.contains(BOOTSTRAP_MARKER));
        assert!(!raw.contains("http-equiv"));
    }

    #[tokio::test]
    async fn keep_alive_serves_two_requests_on_one_connection() {
        let dir = tempdir().unwrap();
        let raw = exchange(
            state_for(dir.path().to_path_buf()),
            "GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n\
             GET /missing.png HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(raw.matches("HTTP/1.1 ").count(), 2);
        assert!(raw.contains("HTTP/1.1 200 OK"));
        assert!(raw.contains("HTTP/1.1 404 Not Found"));
    }

    #[tokio::test]
    async fn garbage_gets_bad_request() {
        let dir = tempdir().unwrap();
        let raw = exchange(state_for(dir.path().to_path_buf()), "\x01\x02 nonsense\r\n\r\n").await;
        assert!(raw.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[tokio::test]
    async fn non_get_on_static_paths_is_rejected() {
        let dir = tempdir().unwrap();
        let raw = exchange(
            state_for(dir.path().to_path_buf()),
            "DELETE /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 405 Method Not Allowed"));
    }
}
