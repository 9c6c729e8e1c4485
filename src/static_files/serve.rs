//! Static resource resolution and transfer.
//!
//! # Responsibilities
//! - Resolve a request path to a regular file under the static root
//! - Apply the index fallback for paths with no known content type
//! - Answer conditional GETs with 304
//! - Send cache headers and the file body
//!
//! # Design Decisions
//! - Every transfer streams the file; memory per request is one chunk
//! - Plaintext uses large chunks; encrypted transfers use the configured
//!   `chunk_size` and log progress per chunk

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::config::StaticFilesConfig;
use crate::http::response::{self, insert_date, parse_http_date, unix_seconds};
use crate::static_files::mime::{content_type_for, DEFAULT_CONTENT_TYPE};
use crate::static_files::sanitize::{sanitize_uri, SanitizeError};

/// Read size for plaintext transfers.
const PLAINTEXT_CHUNK_SIZE: usize = 64 * 1024;

/// How the response body reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Encrypted,
}

/// A file that passed sanitization and existence checks.
#[derive(Debug, Clone)]
pub struct StaticResource {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub size: u64,
    pub modified: SystemTime,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),

    #[error("not found")]
    NotFound,

    #[error("not a regular file")]
    NotRegular,
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveError::Sanitize(SanitizeError::Decode) => StatusCode::BAD_REQUEST,
            ResolveError::Sanitize(SanitizeError::Rejected(_)) => StatusCode::FORBIDDEN,
            ResolveError::NotFound => StatusCode::NOT_FOUND,
            ResolveError::NotRegular => StatusCode::FORBIDDEN,
        }
    }
}

pub struct StaticFiles {
    root: PathBuf,
    index: String,
    cache_seconds: u64,
    chunk_size: usize,
    transport: Transport,
}

impl StaticFiles {
    pub fn new(config: &StaticFilesConfig, transport: Transport) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            index: config.index.clone(),
            cache_seconds: config.cache_seconds,
            chunk_size: config.chunk_size.max(1),
            transport,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Sanitize `uri` and check what it names.
    pub async fn resolve(&self, uri: &str) -> Result<StaticResource, ResolveError> {
        let path = sanitize_uri(uri, &self.root)?;
        let resource = self.inspect(path).await?;

        if resource.content_type != DEFAULT_CONTENT_TYPE {
            return Ok(resource);
        }
        tracing::debug!(path = %uri, index = %self.index, "No known content type, serving index");
        let index = sanitize_uri(&self.index, &self.root)?;
        self.inspect(index).await
    }

    async fn inspect(&self, path: PathBuf) -> Result<StaticResource, ResolveError> {
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(_) => return Err(ResolveError::NotFound),
        };
        if metadata.is_dir() {
            return Err(ResolveError::NotFound);
        }
        if !metadata.is_file() {
            return Err(ResolveError::NotRegular);
        }
        if !self.contains(&path).await {
            // A symlink pointing outside the root.
            return Err(ResolveError::NotRegular);
        }

        Ok(StaticResource {
            content_type: content_type_for(&path),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            path,
        })
    }

    async fn contains(&self, path: &Path) -> bool {
        match (
            tokio::fs::canonicalize(&self.root).await,
            tokio::fs::canonicalize(path).await,
        ) {
            (Ok(root), Ok(resolved)) => resolved.starts_with(root),
            _ => false,
        }
    }

    /// Full GET handling for a static path.
    pub async fn serve(&self, uri: &str, request_headers: &HeaderMap, keep_alive: bool) -> Response {
        let resource = match self.resolve(uri).await {
            Ok(resource) => resource,
            Err(e) => {
                tracing::debug!(path = %uri, error = %e, "Static resolution failed");
                return response::error(e.status());
            }
        };

        if is_not_modified(request_headers, resource.modified) {
            tracing::debug!(path = %uri, "Not modified");
            return response::not_modified();
        }

        let body = match self.body(&resource).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(path = %resource.path.display(), error = %e, "Failed to open static file");
                return response::error(StatusCode::NOT_FOUND);
            }
        };

        let mut response = Response::new(body);
        self.set_headers(response.headers_mut(), &resource, keep_alive);
        response
    }

    fn set_headers(&self, headers: &mut HeaderMap, resource: &StaticResource, keep_alive: bool) {
        let now = SystemTime::now();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(resource.size));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(resource.content_type),
        );
        insert_date(headers, header::DATE, now);
        insert_date(
            headers,
            header::EXPIRES,
            now + Duration::from_secs(self.cache_seconds),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("private, max-age={}", self.cache_seconds)) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        insert_date(headers, header::LAST_MODIFIED, resource.modified);
        headers.insert(
            header::CONNECTION,
            HeaderValue::from_static(if keep_alive { "keep-alive" } else { "close" }),
        );
    }

    async fn body(&self, resource: &StaticResource) -> std::io::Result<Body> {
        let file = tokio::fs::File::open(&resource.path).await?;
        let path = resource.path.display().to_string();
        let total = resource.size;
        let (capacity, progress) = match self.transport {
            Transport::Plain => (PLAINTEXT_CHUNK_SIZE, false),
            Transport::Encrypted => (self.chunk_size, true),
        };
        if total == 0 {
            tracing::debug!(path = %path, bytes = 0, "Transfer complete");
        }

        let mut sent = 0u64;
        let stream = ReaderStream::with_capacity(file, capacity).map(move |chunk| {
            match &chunk {
                Ok(bytes) => {
                    sent += bytes.len() as u64;
                    if progress {
                        tracing::trace!(path = %path, progress = sent, total, "Transfer progress");
                    }
                    if sent >= total {
                        tracing::debug!(path = %path, bytes = sent, "Transfer complete");
                    }
                }
                Err(e) => tracing::warn!(path = %path, sent, error = %e, "Transfer aborted"),
            }
            chunk
        });
        Ok(Body::from_stream(stream))
    }
}

/// `If-Modified-Since` equal to the file's mtime, compared in whole seconds.
fn is_not_modified(headers: &HeaderMap, modified: SystemTime) -> bool {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .and_then(parse_http_date)
        .is_some_and(|since| since == unix_seconds(modified))
}
