//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → sections cloned into the subsystems that own them
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BroadcasterConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    QuoteSourceConfig, StaticFilesConfig, TimeoutConfig, TlsConfig, WebSocketConfig,
};
pub use validation::{validate_config, ValidationError};
