//! Secondary venue data feed.
//!
//! End-of-day style feed used as a fallback when Yahoo is down. It
//! serves settlement price and open interest only: no two-sided quotes
//! and no implied volatility, so `has_quoted_iv()` is false and the
//! screener solves IV from the close and skips spread filtering.

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::types::{EngineError, OptionQuote, OptionRight};

use super::{resilient_call, CallResult, OptionsDataSource, RetryPolicy};

pub struct VenueClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl VenueClient {
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build venue HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            policy,
        })
    }

    async fn get(&self, url: &str) -> CallResult<String> {
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => return CallResult::Transient(format!("request error: {e}")),
        };
        let status = resp.status();
        match status.as_u16() {
            200..=299 => match resp.text().await {
                Ok(body) => CallResult::Ok(body),
                Err(e) => CallResult::Transient(format!("body read error: {e}")),
            },
            429 | 500 | 502 | 503 | 504 => CallResult::Transient(format!("status {status}")),
            _ => CallResult::Fatal(EngineError::DataUnavailable {
                provider: "venue".into(),
                message: format!("unexpected status {status} for {url}"),
            }),
        }
    }

    async fn fetch(&self, url: &str, what: &str) -> Result<Vec<VenueContract>, EngineError> {
        let body = resilient_call(&self.policy, what, || self.get(url), || async { Ok(()) })
            .await?;
        let envelope: VenueEnvelope =
            serde_json::from_str(&body).map_err(|e| EngineError::DataUnavailable {
                provider: "venue".into(),
                message: format!("payload unparseable: {e}"),
            })?;
        Ok(envelope.contracts)
    }
}

#[async_trait]
impl OptionsDataSource for VenueClient {
    async fn fetch_chain(
        &self,
        underlying: &str,
        _as_of: NaiveDate,
    ) -> Result<Vec<OptionQuote>, EngineError> {
        let url = format!(
            "{}/options/{}",
            self.base_url,
            urlencoding::encode(underlying)
        );
        let contracts = self.fetch(&url, "venue.chain").await?;
        let quotes: Vec<OptionQuote> = contracts
            .into_iter()
            .filter_map(|c| c.into_quote(underlying))
            .collect();
        debug!(underlying, contracts = quotes.len(), "fetched venue chain");
        Ok(quotes)
    }

    async fn fetch_quote(&self, contract_symbol: &str) -> Result<OptionQuote, EngineError> {
        let url = format!(
            "{}/options/contract/{}",
            self.base_url,
            urlencoding::encode(contract_symbol)
        );
        let contracts = self.fetch(&url, "venue.quote").await?;
        contracts
            .into_iter()
            .next()
            .and_then(|c| {
                let underlying = c.underlying.clone();
                c.into_quote(&underlying)
            })
            .ok_or_else(|| EngineError::DataUnavailable {
                provider: "venue".into(),
                message: format!("no contract returned for {contract_symbol}"),
            })
    }

    fn has_quoted_iv(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "venue"
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VenueEnvelope {
    contracts: Vec<VenueContract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenueContract {
    symbol: String,
    underlying: String,
    strike: f64,
    /// ISO date, e.g. "2026-03-20"
    expiration: String,
    right: String,
    close: Option<f64>,
    open_interest: Option<u32>,
    volume: Option<u32>,
}

impl VenueContract {
    /// Contracts with no settlement price or an unparseable field are
    /// dropped rather than failing the whole chain.
    fn into_quote(self, underlying: &str) -> Option<OptionQuote> {
        let expiration = NaiveDate::parse_from_str(&self.expiration, "%Y-%m-%d").ok()?;
        let right: OptionRight = self.right.parse().ok()?;
        let close = self.close.filter(|c| *c > 0.0)?;
        Some(OptionQuote {
            contract_symbol: self.symbol,
            underlying: underlying.to_string(),
            strike: self.strike,
            expiration,
            right,
            bid: None,
            ask: None,
            last_price: close,
            implied_volatility: None,
            open_interest: self.open_interest.unwrap_or(0),
            volume: self.volume.unwrap_or(0),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(symbol: &str, close: Option<f64>, right: &str) -> VenueContract {
        VenueContract {
            symbol: symbol.to_string(),
            underlying: "AAPL".to_string(),
            strike: 150.0,
            expiration: "2026-03-20".to_string(),
            right: right.to_string(),
            close,
            open_interest: Some(800),
            volume: Some(55),
        }
    }

    #[test]
    fn test_contract_converts() {
        let quote = raw("AAPL260320C00150000", Some(5.0), "call")
            .into_quote("AAPL")
            .unwrap();
        assert_eq!(quote.right, OptionRight::Call);
        assert_eq!(quote.last_price, 5.0);
        assert_eq!(quote.bid, None);
        assert_eq!(quote.ask, None);
        assert_eq!(quote.implied_volatility, None);
        assert_eq!(quote.open_interest, 800);
    }

    #[test]
    fn test_contract_without_close_dropped() {
        assert!(raw("X", None, "put").into_quote("AAPL").is_none());
        assert!(raw("X", Some(0.0), "put").into_quote("AAPL").is_none());
    }

    #[test]
    fn test_bad_right_dropped() {
        assert!(raw("X", Some(1.0), "straddle").into_quote("AAPL").is_none());
    }

    #[test]
    fn test_envelope_parses() {
        let body = r#"{
            "contracts": [{
                "symbol": "AAPL260320P00150000",
                "underlying": "AAPL",
                "strike": 150.0,
                "expiration": "2026-03-20",
                "right": "put",
                "close": 3.25,
                "openInterest": 640,
                "volume": 12
            }]
        }"#;
        let envelope: VenueEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.contracts.len(), 1);
        let quote = envelope
            .contracts
            .into_iter()
            .next()
            .unwrap()
            .into_quote("AAPL")
            .unwrap();
        assert_eq!(quote.right, OptionRight::Put);
        assert_eq!(quote.last_price, 3.25);
    }
}
