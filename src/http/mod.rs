//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, dispatch)
//!         non-GET            → 403
//!         "/"                → 302 to the index document
//!         Upgrade: websocket → channel handshake → session task
//!         otherwise          → static file server
//!     → response.rs (error/redirect/304/426 builders, HTTP dates)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, GatewayServer, ServerError};
