//! Yahoo Finance options client.
//!
//! Yahoo's query endpoints require a session cookie plus a matching
//! "crumb" token; both are fetched lazily and cached behind an RwLock so
//! concurrent fetches share one session. A 401/403 response invalidates
//! the session and the retry wrapper re-authenticates exactly once per
//! call.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info};

use crate::types::{EngineError, OptionQuote, OptionRight};

use super::{resilient_call, CallResult, OptionsDataSource, RetryPolicy};

const COOKIE_URL: &str = "https://fc.yahoo.com/";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const CHAIN_URL: &str = "https://query1.finance.yahoo.com/v7/finance/options";
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Expirations further out than this are not fetched; nothing downstream
/// looks at them.
const MAX_EXPIRY_HORIZON_DAYS: i64 = 90;

struct Session {
    cookie: String,
    crumb: String,
}

pub struct YahooClient {
    http: reqwest::Client,
    session: tokio::sync::RwLock<Option<Session>>,
    policy: RetryPolicy,
}

impl YahooClient {
    pub fn new(policy: RetryPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build Yahoo HTTP client")?;
        Ok(Self {
            http,
            session: tokio::sync::RwLock::new(None),
            policy,
        })
    }

    /// Fetch a fresh cookie + crumb pair and replace the cached session.
    async fn refresh_session(&self) -> Result<(), EngineError> {
        let cookie_resp = self
            .http
            .get(COOKIE_URL)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| session_err(format!("cookie request failed: {e}")))?;

        let cookie = cookie_resp
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
            .ok_or_else(|| session_err("no session cookie in response".to_string()))?;

        let crumb = self
            .http
            .get(CRUMB_URL)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| session_err(format!("crumb request failed: {e}")))?
            .text()
            .await
            .map_err(|e| session_err(format!("crumb body unreadable: {e}")))?;

        if crumb.is_empty() || crumb.contains('{') {
            return Err(session_err(format!("crumb rejected: {crumb:.40}")));
        }

        info!("yahoo session refreshed");
        *self.session.write().await = Some(Session { cookie, crumb });
        Ok(())
    }

    /// One authenticated GET, classified for the retry loop. A missing
    /// session surfaces as `AuthExpired` so the re-auth hook builds it.
    async fn authed_get(&self, url: &str) -> CallResult<String> {
        let (cookie, crumb) = {
            let guard = self.session.read().await;
            match guard.as_ref() {
                Some(s) => (s.cookie.clone(), s.crumb.clone()),
                None => return CallResult::AuthExpired("no cached session".into()),
            }
        };

        let sep = if url.contains('?') { '&' } else { '?' };
        let full = format!("{url}{sep}crumb={}", urlencoding::encode(&crumb));

        let resp = match self
            .http
            .get(&full)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::COOKIE, &cookie)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return CallResult::Transient(format!("request error: {e}")),
        };

        let status = resp.status();
        match status.as_u16() {
            200..=299 => match resp.text().await {
                Ok(body) => CallResult::Ok(body),
                Err(e) => CallResult::Transient(format!("body read error: {e}")),
            },
            401 | 403 => CallResult::AuthExpired(format!("status {status}")),
            429 | 500 | 502 | 503 | 504 => CallResult::Transient(format!("status {status}")),
            _ => CallResult::Fatal(EngineError::DataUnavailable {
                provider: "yahoo".into(),
                message: format!("unexpected status {status} for {url}"),
            }),
        }
    }

    async fn chain_page(
        &self,
        underlying: &str,
        date: Option<i64>,
    ) -> Result<ChainEntry, EngineError> {
        let base = match date {
            Some(epoch) => format!(
                "{CHAIN_URL}/{}?date={epoch}",
                urlencoding::encode(underlying)
            ),
            None => format!("{CHAIN_URL}/{}", urlencoding::encode(underlying)),
        };

        let body = resilient_call(
            &self.policy,
            "yahoo.chain",
            || self.authed_get(&base),
            || self.refresh_session(),
        )
        .await?;

        let envelope: ChainEnvelope = serde_json::from_str(&body).map_err(|e| {
            EngineError::DataUnavailable {
                provider: "yahoo".into(),
                message: format!("chain payload for {underlying} unparseable: {e}"),
            }
        })?;

        envelope
            .option_chain
            .result
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::DataUnavailable {
                provider: "yahoo".into(),
                message: format!("empty chain result for {underlying}"),
            })
    }
}

fn session_err(message: String) -> EngineError {
    EngineError::DataUnavailable {
        provider: "yahoo".into(),
        message,
    }
}

#[async_trait]
impl OptionsDataSource for YahooClient {
    async fn fetch_chain(
        &self,
        underlying: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<OptionQuote>, EngineError> {
        // The bare endpoint returns the nearest expiry plus the full list
        // of expiration timestamps; each further expiry is its own page.
        let first = self.chain_page(underlying, None).await?;
        let horizon = as_of + chrono::Duration::days(MAX_EXPIRY_HORIZON_DAYS);

        let mut quotes = Vec::new();
        for expiry in &first.options {
            collect_contracts(underlying, expiry, &mut quotes);
        }
        let fetched_dates = page_expirations(&first);

        for epoch in first.expiration_dates {
            let date = epoch_to_date(epoch)?;
            if date <= as_of || date > horizon {
                continue;
            }
            if fetched_dates.contains(&epoch) {
                continue;
            }
            let page = self.chain_page(underlying, Some(epoch)).await?;
            for expiry in &page.options {
                collect_contracts(underlying, expiry, &mut quotes);
            }
        }

        debug!(
            underlying,
            contracts = quotes.len(),
            "fetched option chain"
        );
        Ok(quotes)
    }

    async fn fetch_quote(&self, contract_symbol: &str) -> Result<OptionQuote, EngineError> {
        let (underlying, expiration, right, strike) = parse_occ_symbol(contract_symbol)?;
        let url = format!(
            "{QUOTE_URL}?symbols={}",
            urlencoding::encode(contract_symbol)
        );

        let body = resilient_call(
            &self.policy,
            "yahoo.quote",
            || self.authed_get(&url),
            || self.refresh_session(),
        )
        .await?;

        let envelope: QuoteEnvelope = serde_json::from_str(&body).map_err(|e| {
            EngineError::DataUnavailable {
                provider: "yahoo".into(),
                message: format!("quote payload for {contract_symbol} unparseable: {e}"),
            }
        })?;

        let raw = envelope
            .quote_response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::DataUnavailable {
                provider: "yahoo".into(),
                message: format!("no quote returned for {contract_symbol}"),
            })?;

        let last_price = raw.regular_market_price.ok_or_else(|| {
            EngineError::DataUnavailable {
                provider: "yahoo".into(),
                message: format!("{contract_symbol} has no market price"),
            }
        })?;

        Ok(OptionQuote {
            contract_symbol: contract_symbol.to_string(),
            underlying,
            strike,
            expiration,
            right,
            bid: sanitize_side(raw.bid),
            ask: sanitize_side(raw.ask),
            last_price,
            implied_volatility: None,
            open_interest: raw.open_interest.unwrap_or(0),
            volume: raw.regular_market_volume.unwrap_or(0),
        })
    }

    fn has_quoted_iv(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

// ---------------------------------------------------------------------------
// Wire types and conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChainEnvelope {
    #[serde(rename = "optionChain")]
    option_chain: ChainResult,
}

#[derive(Debug, Deserialize)]
struct ChainResult {
    result: Vec<ChainEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainEntry {
    #[serde(default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<ChainExpiry>,
}

#[derive(Debug, Deserialize)]
struct ChainExpiry {
    #[serde(default)]
    calls: Vec<RawContract>,
    #[serde(default)]
    puts: Vec<RawContract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContract {
    contract_symbol: String,
    strike: f64,
    expiration: i64,
    bid: Option<f64>,
    ask: Option<f64>,
    last_price: Option<f64>,
    implied_volatility: Option<f64>,
    open_interest: Option<u32>,
    volume: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResult,
}

#[derive(Debug, Deserialize)]
struct QuoteResult {
    result: Vec<RawQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    #[allow(dead_code)]
    symbol: String,
    regular_market_price: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    regular_market_volume: Option<u32>,
    open_interest: Option<u32>,
}

/// Expiry epochs already served by a page, from calls and puts alike;
/// a one-sided page must still suppress the per-date refetch.
fn page_expirations(entry: &ChainEntry) -> Vec<i64> {
    entry
        .options
        .iter()
        .flat_map(|e| e.calls.iter().chain(e.puts.iter()))
        .map(|c| c.expiration)
        .collect()
}

/// Yahoo reports a dead side as 0.0 rather than omitting it.
fn sanitize_side(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

fn epoch_to_date(epoch: i64) -> Result<NaiveDate, EngineError> {
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| EngineError::DataUnavailable {
            provider: "yahoo".into(),
            message: format!("bad expiration timestamp {epoch}"),
        })
}

fn collect_contracts(underlying: &str, expiry: &ChainExpiry, out: &mut Vec<OptionQuote>) {
    let sides = [
        (OptionRight::Call, &expiry.calls),
        (OptionRight::Put, &expiry.puts),
    ];
    for (right, contracts) in sides {
        for raw in contracts {
            let Ok(expiration) = epoch_to_date(raw.expiration) else {
                continue;
            };
            out.push(OptionQuote {
                contract_symbol: raw.contract_symbol.clone(),
                underlying: underlying.to_string(),
                strike: raw.strike,
                expiration,
                right,
                bid: sanitize_side(raw.bid),
                ask: sanitize_side(raw.ask),
                last_price: raw.last_price.unwrap_or(0.0),
                // Yahoo encodes "no IV" as a near-zero placeholder
                implied_volatility: raw.implied_volatility.filter(|v| *v > 1e-4),
                open_interest: raw.open_interest.unwrap_or(0),
                volume: raw.volume.unwrap_or(0),
            });
        }
    }
}

/// Split an OCC-style contract symbol (e.g. `AAPL260320C00150000`) into
/// underlying, expiration, right, and strike.
pub fn parse_occ_symbol(
    symbol: &str,
) -> Result<(String, NaiveDate, OptionRight, f64), EngineError> {
    let bad = || EngineError::InvalidInput(format!("malformed contract symbol: {symbol}"));

    // Root is everything before the trailing 15 chars (yymmdd + C/P + strike8)
    if symbol.len() < 16 {
        return Err(bad());
    }
    let (root, tail) = symbol.split_at(symbol.len() - 15);
    if root.is_empty() || !root.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(bad());
    }

    let (date_part, rest) = tail.split_at(6);
    let expiration =
        NaiveDate::parse_from_str(&format!("20{date_part}"), "%Y%m%d").map_err(|_| bad())?;

    let right = match rest.as_bytes()[0] {
        b'C' => OptionRight::Call,
        b'P' => OptionRight::Put,
        _ => return Err(bad()),
    };

    let strike_milli: u64 = rest[1..].parse().map_err(|_| bad())?;
    Ok((
        root.to_string(),
        expiration,
        right,
        strike_milli as f64 / 1000.0,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_occ_call() {
        let (root, exp, right, strike) = parse_occ_symbol("AAPL260320C00150000").unwrap();
        assert_eq!(root, "AAPL");
        assert_eq!(exp, NaiveDate::from_ymd_opt(2026, 3, 20).unwrap());
        assert_eq!(right, OptionRight::Call);
        assert!((strike - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_occ_put_fractional_strike() {
        let (root, _, right, strike) = parse_occ_symbol("F260115P00012500").unwrap();
        assert_eq!(root, "F");
        assert_eq!(right, OptionRight::Put);
        assert!((strike - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_occ_rejects_garbage() {
        for sym in ["", "AAPL", "AAPL260320X00150000", "AAPL26032C000150000"] {
            assert!(parse_occ_symbol(sym).is_err(), "accepted {sym:?}");
        }
    }

    #[test]
    fn test_sanitize_side_drops_zero() {
        assert_eq!(sanitize_side(Some(0.0)), None);
        assert_eq!(sanitize_side(Some(-1.0)), None);
        assert_eq!(sanitize_side(None), None);
        assert_eq!(sanitize_side(Some(4.9)), Some(4.9));
    }

    #[test]
    fn test_chain_payload_parses() {
        let body = r#"{
            "optionChain": {
                "result": [{
                    "expirationDates": [1774310400, 1776729600],
                    "options": [{
                        "calls": [{
                            "contractSymbol": "AAPL260320C00150000",
                            "strike": 150.0,
                            "expiration": 1774310400,
                            "bid": 4.9,
                            "ask": 5.1,
                            "lastPrice": 5.0,
                            "impliedVolatility": 0.32,
                            "openInterest": 1500,
                            "volume": 120
                        }],
                        "puts": [{
                            "contractSymbol": "AAPL260320P00150000",
                            "strike": 150.0,
                            "expiration": 1774310400,
                            "bid": 0.0,
                            "ask": 3.2,
                            "lastPrice": 3.1,
                            "impliedVolatility": 0.00001,
                            "openInterest": 900,
                            "volume": 45
                        }]
                    }]
                }]
            }
        }"#;

        let envelope: ChainEnvelope = serde_json::from_str(body).unwrap();
        let entry = &envelope.option_chain.result[0];
        assert_eq!(entry.expiration_dates.len(), 2);

        let mut quotes = Vec::new();
        collect_contracts("AAPL", &entry.options[0], &mut quotes);
        assert_eq!(quotes.len(), 2);

        let call = &quotes[0];
        assert_eq!(call.right, OptionRight::Call);
        assert_eq!(call.bid, Some(4.9));
        assert_eq!(call.implied_volatility, Some(0.32));

        // Zero bid and placeholder IV both sanitized away
        let put = &quotes[1];
        assert_eq!(put.bid, None);
        assert_eq!(put.implied_volatility, None);
        assert_eq!(put.ask, Some(3.2));
    }

    #[test]
    fn test_page_expirations_sees_puts_only_page() {
        let body = r#"{
            "optionChain": {
                "result": [{
                    "expirationDates": [1774310400],
                    "options": [{
                        "calls": [],
                        "puts": [{
                            "contractSymbol": "AAPL260320P00150000",
                            "strike": 150.0,
                            "expiration": 1774310400,
                            "bid": 3.0,
                            "ask": 3.2,
                            "lastPrice": 3.1,
                            "impliedVolatility": 0.30,
                            "openInterest": 900,
                            "volume": 45
                        }]
                    }]
                }]
            }
        }"#;
        let envelope: ChainEnvelope = serde_json::from_str(body).unwrap();
        let entry = &envelope.option_chain.result[0];
        // The expiry must count as fetched even with an empty calls side,
        // otherwise the per-date loop refetches it and duplicates puts.
        assert_eq!(page_expirations(entry), vec![1774310400]);
    }

    #[test]
    fn test_quote_payload_parses() {
        let body = r#"{
            "quoteResponse": {
                "result": [{
                    "symbol": "AAPL260320C00150000",
                    "regularMarketPrice": 5.05,
                    "bid": 4.95,
                    "ask": 5.15,
                    "regularMarketVolume": 210,
                    "openInterest": 1600
                }]
            }
        }"#;
        let envelope: QuoteEnvelope = serde_json::from_str(body).unwrap();
        let raw = &envelope.quote_response.result[0];
        assert_eq!(raw.regular_market_price, Some(5.05));
        assert_eq!(raw.open_interest, Some(1600));
    }
}
