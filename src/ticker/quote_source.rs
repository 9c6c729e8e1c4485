//! External quote provider.
//!
//! The broadcaster depends only on [`QuoteSource`]; the Yahoo-style YQL
//! client below is the production implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::QuoteSourceConfig;

/// Symbol → last trade price, produced once per broadcast tick. May hold
/// fewer entries than were requested.
pub type QuoteSnapshot = BTreeMap<String, String>;

/// Failures while fetching a quote batch.
#[derive(Debug, Error)]
pub enum QuoteSourceError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote source returned HTTP {0}")]
    Status(u16),

    #[error("unparsable quote response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid quote source URL: {0}")]
    Url(#[from] url::ParseError),
}

impl QuoteSourceError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            QuoteSourceError::Http(e) if e.is_timeout() => "timeout",
            QuoteSourceError::Http(_) => "transport",
            QuoteSourceError::Status(_) => "status",
            QuoteSourceError::Parse(_) => "parse",
            QuoteSourceError::Url(_) => "url",
        }
    }
}

/// Looks up prices for a batch of symbols.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, symbols: &[String]) -> Result<QuoteSnapshot, QuoteSourceError>;
}

/// Batched quote lookup against a YQL `yahoo.finance.quotes` endpoint.
pub struct YahooQuoteSource {
    client: reqwest::Client,
    base_url: Url,
    env: String,
}

impl YahooQuoteSource {
    pub fn new(config: &QuoteSourceConfig, timeout: Duration) -> Result<Self, QuoteSourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
            env: config.env.clone(),
        })
    }

    /// Build the one-request-per-tick query URL for `symbols`.
    pub fn query_url(&self, symbols: &[String]) -> Url {
        let quoted = symbols
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(",");
        let query = format!("select * from yahoo.finance.quotes where symbol in ({quoted})");

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("env", &self.env)
            .append_pair("format", "json");
        url
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteSource {
    async fn fetch(&self, symbols: &[String]) -> Result<QuoteSnapshot, QuoteSourceError> {
        let url = self.query_url(symbols);
        tracing::trace!(url = %url, "Fetching quotes");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(QuoteSourceError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_quotes(&body)
    }
}

#[derive(Deserialize)]
struct Envelope {
    query: Query,
}

#[derive(Deserialize)]
struct Query {
    results: Option<Results>,
}

#[derive(Deserialize)]
struct Results {
    quote: OneOrMany<serde_json::Value>,
}

/// The provider returns a bare object for one symbol and an array otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawQuote {
    symbol: String,
    last_trade_price_only: Option<String>,
}

/// Normalize either response shape into one flat snapshot. Quotes without a
/// price are left out, as are malformed entries; only an unreadable envelope
/// is an error.
pub fn parse_quotes(body: &str) -> Result<QuoteSnapshot, QuoteSourceError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    let Some(results) = envelope.query.results else {
        return Ok(QuoteSnapshot::new());
    };

    let quotes = match results.quote {
        OneOrMany::Many(quotes) => quotes,
        OneOrMany::One(quote) => vec![quote],
    };

    Ok(quotes
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawQuote>(value) {
            Ok(quote) => quote.last_trade_price_only.map(|price| (quote.symbol, price)),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed quote entry");
                None
            }
        })
        .collect())
}
