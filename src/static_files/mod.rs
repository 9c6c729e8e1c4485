//! Static file subsystem.
//!
//! # Data Flow
//! ```text
//! GET <path>
//!     → sanitize.rs (decode, reject unsafe paths, join under root)
//!     → serve.rs (metadata checks, index fallback, conditional GET)
//!     → mime.rs (content type by extension)
//!     → 200 with cache headers | 304 | 400 | 403 | 404
//! ```
//!
//! # Design Decisions
//! - No resolved path ever leaves the static root, including through symlinks
//! - Every error response closes the connection

pub mod mime;
pub mod sanitize;
pub mod serve;

pub use mime::{content_type_for, DEFAULT_CONTENT_TYPE};
pub use sanitize::{sanitize_uri, SanitizeError};
pub use serve::{ResolveError, StaticFiles, StaticResource, Transport};
