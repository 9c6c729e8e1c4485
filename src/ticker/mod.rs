//! Ticker subscription subsystem.
//!
//! # Data Flow
//! ```text
//! completed channel message
//!     → command.rs (parse add/remove, build reply)
//!     → registry.rs (per-session copy-on-write symbol sets)
//!
//! every interval:
//!     broadcaster.rs reads registry
//!     → quote_source.rs (one batched fetch for the symbol union)
//!     → per-session filtered broadcast queued on each session's outbound handle
//! ```

pub mod broadcaster;
pub mod command;
pub mod quote_source;
pub mod registry;

pub use broadcaster::Broadcaster;
pub use command::{process_message, TickerRequest, TickerResponse};
pub use quote_source::{QuoteSnapshot, QuoteSource, QuoteSourceError, YahooQuoteSource};
pub use registry::{Delivery, SubscriptionRegistry};
