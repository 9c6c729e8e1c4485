//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with one dispatching fallback handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Serve plaintext via `axum::serve` or TLS via `axum-server`
//! - Start the quote broadcaster alongside the listener
//! - Hand upgraded connections to channel sessions

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    response::Response,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::channel::handshake::{self, HandshakeError};
use crate::channel::session::{run_session, SessionLimits};
use crate::config::{GatewayConfig, WebSocketConfig};
use crate::http::request::{request_id_of, MakeRequestUuidV4};
use crate::http::response;
use crate::net::tls::load_tls_config;
use crate::observability::metrics;
use crate::static_files::{StaticFiles, Transport};
use crate::ticker::{Broadcaster, QuoteSource, QuoteSourceError, SubscriptionRegistry, YahooQuoteSource};

/// Grace period for in-flight TLS connections after shutdown is requested.
const TLS_DRAIN_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load TLS certificate: {0}")]
    Tls(#[source] std::io::Error),

    #[error("invalid bind address {0:?}")]
    Address(String),

    #[error("quote source: {0}")]
    QuoteSource(#[from] QuoteSourceError),
}

/// Application state injected into the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub static_files: Arc<StaticFiles>,
    pub registry: Arc<SubscriptionRegistry>,
    pub websocket: WebSocketConfig,
}

pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
    source: Arc<dyn QuoteSource>,
}

impl GatewayServer {
    /// Build the server with the configured Yahoo-style quote source.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let timeout = Duration::from_secs(config.broadcaster.fetch_timeout_secs);
        let source = Arc::new(YahooQuoteSource::new(&config.quote_source, timeout)?);
        Ok(Self::with_quote_source(config, source))
    }

    pub fn with_quote_source(config: GatewayConfig, source: Arc<dyn QuoteSource>) -> Self {
        let transport = if config.is_encrypted() {
            Transport::Encrypted
        } else {
            Transport::Plain
        };
        let state = AppState {
            static_files: Arc::new(StaticFiles::new(&config.static_files, transport)),
            registry: Arc::new(SubscriptionRegistry::new()),
            websocket: config.websocket.clone(),
        };
        Self {
            config,
            state,
            source,
        }
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.state.registry.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id_of(request),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        self.config.timeouts.request_secs,
                    ))),
            )
    }

    fn spawn_broadcaster(&self, shutdown: &broadcast::Receiver<()>) {
        if !self.config.broadcaster.enabled {
            tracing::info!("Quote broadcaster disabled");
            return;
        }
        let broadcaster = Broadcaster::new(
            self.state.registry.clone(),
            self.source.clone(),
            Duration::from_millis(self.config.broadcaster.interval_ms),
        );
        tokio::spawn(broadcaster.run(shutdown.resubscribe()));
    }

    /// Bind the configured address and serve on the configured transport.
    pub async fn serve(self, shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let bind = &self.config.listener.bind_address;
        let addr: SocketAddr = bind
            .parse()
            .map_err(|_| ServerError::Address(bind.clone()))?;

        match self.config.listener.tls.clone() {
            Some(tls) => {
                let rustls = load_tls_config(&tls).await.map_err(ServerError::Tls)?;
                self.run_tls(addr, rustls, shutdown).await
            }
            None => {
                let listener = TcpListener::bind(addr).await?;
                self.run(listener, shutdown).await
            }
        }
    }

    /// Run the plaintext server on an already-bound listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            channel_path = %self.config.websocket.path,
            static_root = %self.state.static_files.root().display(),
            transport = ?self.state.static_files.transport(),
            "HTTP server starting"
        );

        self.spawn_broadcaster(&shutdown);
        let app = self.build_router();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the TLS server.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(
            address = %addr,
            channel_path = %self.config.websocket.path,
            static_root = %self.state.static_files.root().display(),
            transport = ?self.state.static_files.transport(),
            "HTTPS server starting"
        );

        self.spawn_broadcaster(&shutdown);
        let app = self.build_router();

        let handle = axum_server::Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTPS server received shutdown signal");
            signal.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Protocol demultiplexer: every request enters here.
async fn dispatch(State(state): State<AppState>, mut request: Request) -> Response {
    let response = route(&state, &mut request).await;
    metrics::record_http_response(response.status().as_u16());
    response
}

async fn route(state: &AppState, request: &mut Request) -> Response {
    if request.method() != Method::GET {
        tracing::debug!(method = %request.method(), "Method not allowed");
        return response::error(StatusCode::FORBIDDEN);
    }

    let path = request.uri().path().to_string();
    if path == "/" {
        return response::redirect(state.static_files.index());
    }

    if handshake::is_upgrade_request(request.headers()) {
        return upgrade(state, request);
    }

    if let Some(response) = handle_rest(request) {
        return response;
    }

    let keep_alive = response::is_keep_alive(request.version(), request.headers());
    state
        .static_files
        .serve(&path, request.headers(), keep_alive)
        .await
}

/// Extension point for REST endpoints. None are defined.
fn handle_rest(_request: &Request) -> Option<Response> {
    None
}

/// Complete the channel handshake and hand the connection to a session task.
fn upgrade(state: &AppState, request: &mut Request) -> Response {
    let accept = match handshake::accept_key(request.headers()) {
        Ok(accept) => accept,
        Err(HandshakeError::UnsupportedVersion(version)) => {
            tracing::warn!(version = ?version, "Unsupported channel version");
            return response::unsupported_version();
        }
        Err(e @ HandshakeError::MissingKey) => {
            tracing::warn!(error = %e, "Malformed upgrade request");
            return response::error(StatusCode::BAD_REQUEST);
        }
    };

    if request.uri().path() != state.websocket.path {
        tracing::debug!(
            path = %request.uri().path(),
            expected = %state.websocket.path,
            "Upgrade on non-channel path"
        );
    }

    let on_upgrade = hyper::upgrade::on(request);
    let registry = state.registry.clone();
    let limits = SessionLimits::from(&state.websocket);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => run_session(TokioIo::new(upgraded), registry, limits).await,
            Err(e) => tracing::warn!(error = %e, "Connection upgrade failed"),
        }
    });

    handshake::switching_protocols(&accept)
}
