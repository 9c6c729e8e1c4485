//! Subscription registry.
//!
//! Maps each live session to its outbound handle and its own symbol set.
//! Sessions mutate their set from their connection task while the broadcaster
//! reads every set from its own task, so each set is a copy-on-write
//! `ArcSwap<Vec<String>>`: writers publish a new vector with `rcu`, readers
//! load a consistent snapshot without taking a lock.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use crate::channel::frame::Frame;
use crate::channel::session::{Outbound, SessionId};

/// One session's subscriptions and the handle used to reach it.
pub struct SessionSubscriptions {
    outbound: Outbound,
    symbols: ArcSwap<Vec<String>>,
}

impl SessionSubscriptions {
    fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            symbols: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append `symbol` unless already present. Returns true if it was added.
    pub fn add(&self, symbol: &str) -> bool {
        let previous = self.symbols.rcu(|current| {
            if current.iter().any(|s| s == symbol) {
                Arc::clone(current)
            } else {
                let mut next = Vec::with_capacity(current.len() + 1);
                next.extend(current.iter().cloned());
                next.push(symbol.to_string());
                Arc::new(next)
            }
        });
        !previous.iter().any(|s| s == symbol)
    }

    /// Remove `symbol` if present. Returns true if it was removed.
    pub fn remove(&self, symbol: &str) -> bool {
        let previous = self.symbols.rcu(|current| {
            if current.iter().any(|s| s == symbol) {
                Arc::new(current.iter().filter(|s| *s != symbol).cloned().collect())
            } else {
                Arc::clone(current)
            }
        });
        previous.iter().any(|s| s == symbol)
    }

    /// Current symbols, in first-subscribed order.
    pub fn symbols(&self) -> Arc<Vec<String>> {
        self.symbols.load_full()
    }

    /// Queue a frame for this session without waiting for queue space.
    pub fn offer(&self, frame: Frame) -> Delivery {
        match self.outbound.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Outcome of offering a frame to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The session is not draining its queue; the frame was dropped.
    Full,
    /// The session has ended.
    Closed,
}

/// A session picked up by a broadcast tick, with the symbols it held then.
pub struct BroadcastTarget {
    pub session: SessionId,
    pub subscriptions: Arc<SessionSubscriptions>,
    pub symbols: Arc<Vec<String>>,
}

/// Process-wide registry of live sessions and what they watch.
#[derive(Default)]
pub struct SubscriptionRegistry {
    sessions: DashMap<SessionId, Arc<SessionSubscriptions>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a session with an empty symbol set.
    pub fn register(&self, session: SessionId, outbound: Outbound) {
        self.sessions
            .insert(session, Arc::new(SessionSubscriptions::new(outbound)));
        tracing::debug!(session_id = %session, sessions = self.sessions.len(), "Session registered");
    }

    /// Forget a session and its symbols.
    pub fn unregister(&self, session: SessionId) -> bool {
        let removed = self.sessions.remove(&session).is_some();
        if removed {
            tracing::debug!(session_id = %session, sessions = self.sessions.len(), "Session unregistered");
        }
        removed
    }

    /// Add a symbol to a session's set. Returns true if the set changed.
    pub fn subscribe(&self, session: SessionId, symbol: &str) -> bool {
        match self.get(session) {
            Some(subs) => subs.add(symbol),
            None => {
                tracing::warn!(session_id = %session, symbol, "Subscribe for unknown session");
                false
            }
        }
    }

    /// Remove a symbol from a session's set. Absence is not an error.
    pub fn unsubscribe(&self, session: SessionId, symbol: &str) -> bool {
        self.get(session).is_some_and(|subs| subs.remove(symbol))
    }

    /// Symbols held by one session.
    pub fn symbols(&self, session: SessionId) -> Vec<String> {
        self.get(session)
            .map(|subs| subs.symbols().as_ref().clone())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot every session with a non-empty set.
    ///
    /// Arcs are cloned out so no shard lock is held while frames are sent.
    pub fn broadcast_targets(&self) -> Vec<BroadcastTarget> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                let symbols = entry.value().symbols();
                (!symbols.is_empty()).then(|| BroadcastTarget {
                    session: *entry.key(),
                    subscriptions: Arc::clone(entry.value()),
                    symbols,
                })
            })
            .collect()
    }

    fn get(&self, session: SessionId) -> Option<Arc<SessionSubscriptions>> {
        self.sessions.get(&session).map(|r| Arc::clone(r.value()))
    }
}

/// Sorted, de-duplicated union of the targets' symbols.
pub fn union_of(targets: &[BroadcastTarget]) -> Vec<String> {
    targets
        .iter()
        .flat_map(|t| t.symbols.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
