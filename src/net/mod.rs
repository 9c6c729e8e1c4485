//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plaintext: axum::serve on a bound TcpListener
//!     → encrypted: tls.rs (PEM → rustls) → axum_server::bind_rustls
//!     → Hand off to HTTP layer (http::server dispatch)
//! ```
//!
//! # Design Decisions
//! - TLS is optional and selected by the presence of `listener.tls`
//! - The same router serves both transports

pub mod tls;

pub use tls::load_tls_config;
