use crate::context::Context;
use crate::error::{ServerError, ServerResult};
use crate::handler::{Handler, HandlerFuture};
use crate::http::Response;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Serves files from a directory, using the route's wildcard as the
/// relative path. Anything resolving outside the directory is a 404.
#[derive(Clone)]
pub struct StaticFiles {
    root: Arc<PathBuf>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }
}

impl Handler for StaticFiles {
    fn call(&self, ctx: Context) -> HandlerFuture {
        let root = Arc::clone(&self.root);
        Box::pin(async move {
            let relative = ctx.wildcard().unwrap_or_default().to_string();
            serve(&root, &relative).await
        })
    }
}

async fn serve(root: &Path, relative: &str) -> ServerResult<Response> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| ServerError::NotFound)?;
    let path = tokio::fs::canonicalize(root.join(relative.trim_start_matches('/')))
        .await
        .map_err(|_| ServerError::NotFound)?;
    if !path.starts_with(&root) {
        tracing::debug!(path = %path.display(), "static path escapes its root");
        return Err(ServerError::NotFound);
    }

    let metadata = tokio::fs::metadata(&path).await?;
    if !metadata.is_file() {
        return Err(ServerError::NotFound);
    }
    let contents = tokio::fs::read(&path).await?;

    let mut response = Response::new(200);
    response
        .header("Content-Type", content_type(&path))
        .header("Cache-Control", "public, max-age=31536000");

    let modified = metadata.modified().ok();
    if let Some(modified) = modified {
        response.header("Last-Modified", httpdate::fmt_http_date(modified));
    }
    response.header("ETag", etag(&metadata, modified));
    response.body(contents);
    Ok(response)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

// Size plus modification time; cheap and stable across restarts.
fn etag(metadata: &Metadata, modified: Option<SystemTime>) -> String {
    let secs = modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("\"{}-{}\"", metadata.len(), secs)
}
