use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::net::TcpListener;

pub const DEFAULT_PORT: u16 = 4173;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("server stopped: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
enum FileError {
    Forbidden,
    NotFound,
    Internal(String),
}

impl IntoResponse for FileError {
    fn into_response(self) -> Response {
        match self {
            FileError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            FileError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            FileError::Internal(message) => {
                tracing::error!("failed to serve file: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

/// Router serving `root`: directories map to `index.html`, anything
/// unresolved falls back to the root `index.html`.
pub fn router(root: impl Into<PathBuf>) -> Router {
    Router::new()
        .fallback(serve_path)
        .with_state(Arc::new(root.into()))
}

pub async fn serve(root: PathBuf, port: u16) -> Result<(), ServeError> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|source| ServeError::Bind { port, source })?;
    tracing::info!(root = %root.display(), "serving on http://localhost:{port}");
    axum::serve(listener, router(root)).await?;
    Ok(())
}

async fn serve_path(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    match resolve(&root, uri.path()).await {
        Ok((path, bytes)) => {
            ([(header::CONTENT_TYPE, content_type_for(&path))], bytes).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn resolve(root: &Path, request_path: &str) -> Result<(PathBuf, Vec<u8>), FileError> {
    let decoded = percent_decode(request_path).ok_or(FileError::Forbidden)?;
    let mut path = safe_join(root, &decoded).ok_or(FileError::Forbidden)?;
    if tokio::fs::metadata(&path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
    {
        path = path.join("index.html");
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((path, bytes)),
        Err(err) if is_missing(&err) => {
            let index = root.join("index.html");
            match tokio::fs::read(&index).await {
                Ok(bytes) => Ok((index, bytes)),
                Err(err) if is_missing(&err) => Err(FileError::NotFound),
                Err(err) => Err(FileError::Internal(err.to_string())),
            }
        }
        Err(err) => Err(FileError::Internal(format!("{}: {err}", path.display()))),
    }
}

fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Joins a URL path onto `root`. `None` when `..` would climb above it.
pub fn safe_join(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in request_path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other if other.contains('\0') || other.contains(':') => return None,
            other => segments.push(other),
        }
    }
    let mut path = root.to_path_buf();
    path.extend(segments);
    Some(path)
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt" | "gs") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Decodes `%XX` escapes; `None` when the decoded bytes are not UTF-8.
fn percent_decode(raw: &str) -> Option<String> {
    percent_encoding::percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
