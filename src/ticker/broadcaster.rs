//! Periodic quote broadcaster.
//!
//! # Responsibilities
//! - Every interval, collect the symbols of all live sessions
//! - Fetch one batched snapshot for the union
//! - Send each session only the quotes it subscribed to
//!
//! # Design Decisions
//! - Fixed cadence measured from tick start; missed ticks are skipped
//! - Fetch failures never stop the loop; they are logged and counted,
//!   and the tick proceeds with an empty snapshot
//! - Shutdown is a broadcast signal observed between ticks
//! - A session that is not draining its queue misses ticks instead of
//!   accumulating them

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::channel::frame::Frame;
use crate::observability::metrics;
use crate::ticker::command::TickerResponse;
use crate::ticker::quote_source::{QuoteSnapshot, QuoteSource};
use crate::ticker::registry::{union_of, Delivery, SubscriptionRegistry};

pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn QuoteSource>,
    interval: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn QuoteSource>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            interval,
        }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Quote broadcaster starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Quote broadcaster received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One broadcast round. Returns the number of sessions a frame was queued for.
    pub async fn tick(&self) -> usize {
        let targets = self.registry.broadcast_targets();
        if targets.is_empty() {
            return 0;
        }

        let symbols = union_of(&targets);
        let snapshot = self.fetch(&symbols).await;

        let mut delivered = 0;
        for target in &targets {
            let data: QuoteSnapshot = target
                .symbols
                .iter()
                .filter_map(|s| snapshot.get(s).map(|price| (s.clone(), price.clone())))
                .collect();
            let json = TickerResponse::broadcast(data).to_json();

            match target.subscriptions.offer(Frame::text(json)) {
                Delivery::Queued => delivered += 1,
                Delivery::Full => {
                    tracing::warn!(session_id = %target.session, "Session queue full, dropping broadcast");
                    metrics::record_broadcast_dropped();
                }
                Delivery::Closed => {
                    tracing::debug!(session_id = %target.session, "Broadcast target already closed");
                }
            }
        }

        metrics::record_broadcast(delivered);
        tracing::debug!(
            sessions = delivered,
            symbols = symbols.len(),
            quotes = snapshot.len(),
            "Broadcast tick complete"
        );
        delivered
    }

    async fn fetch(&self, symbols: &[String]) -> QuoteSnapshot {
        let started = Instant::now();
        let result = self.source.fetch(symbols).await;
        metrics::record_quote_fetch(started);

        match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, symbols = ?symbols, "Quote fetch failed");
                metrics::record_quote_fetch_failure(e.reason());
                QuoteSnapshot::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::session::SessionId;
    use crate::ticker::quote_source::QuoteSourceError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeSource {
        quotes: QuoteSnapshot,
        fail: bool,
        requests: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl QuoteSource for FakeSource {
        async fn fetch(&self, symbols: &[String]) -> Result<QuoteSnapshot, QuoteSourceError> {
            self.requests.lock().unwrap().push(symbols.to_vec());
            if self.fail {
                return Err(QuoteSourceError::Status(503));
            }
            Ok(self.quotes.clone())
        }
    }

    fn quotes(pairs: &[(&str, &str)]) -> QuoteSnapshot {
        pairs
            .iter()
            .map(|(s, p)| (s.to_string(), p.to_string()))
            .collect()
    }

    fn text_of(frame: Frame) -> String {
        match frame {
            Frame::Text { payload, .. } => String::from_utf8(payload.to_vec()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_registry_skips_fetch() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, _rx) = mpsc::channel(8);
        registry.register(SessionId::new(), tx);

        let source = Arc::new(FakeSource::default());
        let broadcaster = Broadcaster::new(registry, source.clone(), Duration::from_secs(2));

        assert_eq!(broadcaster.tick().await, 0);
        assert!(source.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_batched_fetch_per_tick_filtered_per_session() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (a, b) = (SessionId::new(), SessionId::new());
        registry.register(a, tx_a);
        registry.register(b, tx_b);
        registry.subscribe(a, "XYZ");
        registry.subscribe(b, "GOOG");
        registry.subscribe(b, "XYZ");

        let source = Arc::new(FakeSource {
            quotes: quotes(&[("XYZ", "12.34"), ("GOOG", "540.11")]),
            ..Default::default()
        });
        let broadcaster = Broadcaster::new(registry, source.clone(), Duration::from_secs(2));

        assert_eq!(broadcaster.tick().await, 2);
        assert_eq!(*source.requests.lock().unwrap(), vec![vec!["GOOG".to_string(), "XYZ".to_string()]]);

        assert_eq!(
            text_of(rx_a.try_recv().unwrap()),
            r#"{"result":"success","tickerData":{"XYZ":"12.34"}}"#
        );
        assert_eq!(
            text_of(rx_b.try_recv().unwrap()),
            r#"{"result":"success","tickerData":{"GOOG":"540.11","XYZ":"12.34"}}"#
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_absorbed() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let id = SessionId::new();
        registry.register(id, tx);
        registry.subscribe(id, "XYZ");

        let source = Arc::new(FakeSource {
            fail: true,
            ..Default::default()
        });
        let broadcaster = Broadcaster::new(registry, source.clone(), Duration::from_secs(2));

        assert_eq!(broadcaster.tick().await, 1);
        assert_eq!(broadcaster.tick().await, 1);
        assert_eq!(source.requests.lock().unwrap().len(), 2);
        assert_eq!(
            text_of(rx.try_recv().unwrap()),
            r#"{"result":"success","tickerData":{}}"#
        );
    }

    #[tokio::test]
    async fn closed_sessions_are_not_counted() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        let id = SessionId::new();
        registry.register(id, tx);
        registry.subscribe(id, "XYZ");
        drop(rx);

        let source = Arc::new(FakeSource::default());
        let broadcaster = Broadcaster::new(registry, source, Duration::from_secs(2));
        assert_eq!(broadcaster.tick().await, 0);
    }

    #[tokio::test]
    async fn stalled_session_misses_ticks() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, mut rx) = mpsc::channel(1);
        let id = SessionId::new();
        registry.register(id, tx);
        registry.subscribe(id, "XYZ");

        let source = Arc::new(FakeSource {
            quotes: quotes(&[("XYZ", "12.34")]),
            ..Default::default()
        });
        let broadcaster = Broadcaster::new(registry, source.clone(), Duration::from_secs(2));

        assert_eq!(broadcaster.tick().await, 1);
        assert_eq!(broadcaster.tick().await, 0);
        assert_eq!(broadcaster.tick().await, 0);
        assert_eq!(source.requests.lock().unwrap().len(), 3);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(broadcaster.tick().await, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let source = Arc::new(FakeSource::default());
        let broadcaster = Broadcaster::new(registry, source, Duration::from_millis(10));

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(broadcaster.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("broadcaster did not stop")
            .unwrap();
    }
}
