//! Request path sanitization.
//!
//! A request path is accepted only if, after percent-decoding, it is rooted,
//! has no segment starting or ending with `.`, and contains none of the
//! characters `<`, `>`, `&`, `"`. Accepted paths are rebuilt segment by
//! segment under the static root, so the result never escapes it.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("path is not valid percent-encoded UTF-8")]
    Decode,

    #[error("path rejected: {0}")]
    Rejected(&'static str),
}

const FORBIDDEN_CHARS: [char; 6] = ['<', '>', '&', '"', '\\', '\0'];

/// Map a request path onto a file path under `root`.
pub fn sanitize_uri(uri: &str, root: &Path) -> Result<PathBuf, SanitizeError> {
    let decoded = urlencoding::decode(uri).map_err(|_| SanitizeError::Decode)?;

    if decoded.is_empty() {
        return Err(SanitizeError::Rejected("empty"));
    }
    if !decoded.starts_with('/') {
        return Err(SanitizeError::Rejected("not rooted"));
    }
    if decoded.contains("/.") || decoded.contains("./") || decoded.ends_with('.') {
        return Err(SanitizeError::Rejected("dot segment"));
    }
    if decoded.contains(&FORBIDDEN_CHARS[..]) {
        return Err(SanitizeError::Rejected("insecure character"));
    }

    let mut path = root.to_path_buf();
    for segment in decoded.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    Ok(path)
}
