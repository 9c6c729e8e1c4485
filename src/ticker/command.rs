//! Channel message shapes and the command processor.

use serde::{Deserialize, Serialize};

use crate::channel::session::SessionId;
use crate::observability::metrics;
use crate::ticker::quote_source::QuoteSnapshot;
use crate::ticker::registry::SubscriptionRegistry;

pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_UNRECOGNIZED: &str = "Failed. Command not recognized.";

/// Inbound `{"command": ..., "tickerSymbol": ...}` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerRequest {
    pub command: Option<String>,
    pub ticker_symbol: Option<String>,
}

/// Outbound reply or broadcast. `tickerData` is only present on broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerResponse {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker_data: Option<QuoteSnapshot>,
}

impl TickerResponse {
    pub fn success() -> Self {
        Self {
            result: RESULT_SUCCESS.to_string(),
            ticker_data: None,
        }
    }

    pub fn unrecognized() -> Self {
        Self {
            result: RESULT_UNRECOGNIZED.to_string(),
            ticker_data: None,
        }
    }

    pub fn broadcast(snapshot: QuoteSnapshot) -> Self {
        Self {
            result: RESULT_SUCCESS.to_string(),
            ticker_data: Some(snapshot),
        }
    }

    pub fn to_json(&self) -> String {
        // Only string keys and values; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A recognized command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Remove(String),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Add(_) => "add",
            Command::Remove(_) => "remove",
        }
    }
}

impl TickerRequest {
    /// Interpret the request. Unknown commands and missing symbols are `None`.
    pub fn command(&self) -> Option<Command> {
        let symbol = self.ticker_symbol.as_deref().filter(|s| !s.is_empty())?;
        match self.command.as_deref()? {
            "add" => Some(Command::Add(symbol.to_string())),
            "remove" => Some(Command::Remove(symbol.to_string())),
            _ => None,
        }
    }
}

/// Apply one completed channel message to the registry and build the reply.
///
/// Failures are ordinary replies; nothing here terminates the session.
pub fn process_message(registry: &SubscriptionRegistry, session: SessionId, text: &str) -> TickerResponse {
    let command = match serde_json::from_str::<TickerRequest>(text) {
        Ok(request) => request.command(),
        Err(e) => {
            tracing::debug!(session_id = %session, error = %e, "Unparsable channel message");
            None
        }
    };

    let Some(command) = command else {
        tracing::info!(session_id = %session, "Command not recognized");
        metrics::record_command("unknown", false);
        return TickerResponse::unrecognized();
    };

    match &command {
        Command::Add(symbol) => {
            let added = registry.subscribe(session, symbol);
            tracing::info!(session_id = %session, symbol = %symbol, added, "Subscribed");
        }
        Command::Remove(symbol) => {
            let removed = registry.unsubscribe(session, symbol);
            tracing::info!(session_id = %session, symbol = %symbol, removed, "Unsubscribed");
        }
    }
    metrics::record_command(command.name(), true);
    TickerResponse::success()
}
