//! HTML rewrite middleware and static file handler.
//!
//! `.html` responses get the markup-level pass and the bootstrap injector;
//! everything else is streamed from the static root as-is. A failing
//! rewrite serves the original file.

use super::{HttpResponse, ServerConfig, ServerState, BOOTSTRAP_MARKER};
use crate::guard::fail_open;
use crate::rewriter::Rewriter;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use url::Url;

/// Map a request path (query already removed) to the file it names.
pub fn target_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        "/index.html".to_string()
    } else if path.ends_with('/') {
        format!("{}index.html", path)
    } else {
        path.to_string()
    }
}

fn has_parent_segment(path: &str) -> bool {
    path.to_ascii_lowercase()
        .replace("%2e", ".")
        .split(['/', '\\'])
        .any(|segment| segment == "..")
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Markup pass plus bootstrap injection. Returns the input unchanged if
/// either step fails.
pub fn render_html(rewriter: &Rewriter, config: &ServerConfig, html: &str) -> String {
    fail_open(
        "middleware.rewrite_html",
        || {
            let rewritten = rewriter.rewrite_html(html);
            Ok::<_, std::convert::Infallible>(rewriter.inject_bootstrap(
                &rewritten,
                &config.inject_scripts,
                BOOTSTRAP_MARKER,
            ))
        },
        || html.to_string(),
    )
}

enum Resolved {
    File(PathBuf),
    Forbidden,
    Missing,
}

async fn resolve_file(root: &Path, target: &str) -> Resolved {
    if has_parent_segment(target) {
        return Resolved::Forbidden;
    }
    let root = match tokio::fs::canonicalize(root).await {
        Ok(root) => root,
        Err(err) => {
            tracing::warn!("Static root {:?} unavailable: {}", root, err);
            return Resolved::Missing;
        }
    };
    // Percent-decoding goes through the file URL of the root.
    let candidate = Url::from_directory_path(&root)
        .ok()
        .and_then(|base| base.join(target.trim_start_matches('/')).ok())
        .and_then(|url| url.to_file_path().ok());
    let candidate = match candidate {
        Some(candidate) => candidate,
        None => return Resolved::Forbidden,
    };
    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(resolved) => resolved,
        Err(_) => return Resolved::Missing,
    };
    if !resolved.starts_with(&root) {
        return Resolved::Forbidden;
    }
    match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_file() => Resolved::File(resolved),
        _ => Resolved::Missing,
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::text(404, "text/plain; charset=utf-8", "Not Found")
}

/// Serve `path` from the static root.
pub(crate) async fn serve(state: &ServerState, path: &str) -> HttpResponse {
    let config = &state.config;
    let target = target_path(path);
    let file = match resolve_file(&config.static_root, &target).await {
        Resolved::File(file) => file,
        Resolved::Forbidden => {
            tracing::warn!("Refusing path outside static root: {}", path);
            return HttpResponse::text(403, "text/plain; charset=utf-8", "Forbidden");
        }
        Resolved::Missing => return not_found(),
    };

    let content_type = content_type_for(&file);
    let bytes = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return not_found(),
        Err(err) => {
            tracing::error!("Failed to read {:?}: {}", file, err);
            return HttpResponse::text(500, "text/plain; charset=utf-8", "Internal Server Error");
        }
    };

    if !target.ends_with(".html") {
        return HttpResponse::text(200, content_type, bytes);
    }

    let rewritten = match (&state.rewriter, std::str::from_utf8(&bytes)) {
        (Some(rewriter), Ok(html)) => Some(render_html(rewriter, config, html).into_bytes()),
        _ => None,
    };
    HttpResponse::text(200, "text/html; charset=utf-8", rewritten.unwrap_or(bytes))
        .with_header("Content-Security-Policy", &config.content_security_policy)
}
