//! Alpaca trading API client.
//!
//! Covers the two endpoints the engine needs: order submission and the
//! open-positions list. Credentials go out as headers on every request;
//! the paper/live distinction is just the base URL.

use anyhow::Context;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{EngineError, PositionSide};

use super::{BrokerExecution, BrokerPosition, OrderAck, OrderKind, OrderRequest, OrderSide};

const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_BASE_URL: &str = "https://api.alpaca.markets";

pub struct AlpacaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    api_secret: SecretString,
}

impl AlpacaClient {
    pub fn new(api_key: SecretString, api_secret: SecretString, paper: bool) -> anyhow::Result<Self> {
        let base_url = if paper { PAPER_BASE_URL } else { LIVE_BASE_URL };
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build Alpaca HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key,
            api_secret,
        })
    }

    /// Base-URL override for tests and proxies.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("APCA-API-KEY-ID", self.api_key.expose_secret())
            .header("APCA-API-SECRET-KEY", self.api_secret.expose_secret())
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<String, EngineError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| EngineError::Broker(format!("{what}: body read error: {e}")))?;
        if !status.is_success() {
            return Err(EngineError::Broker(format!(
                "{what} failed with status {status}: {body:.300}"
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl BrokerExecution for AlpacaClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, EngineError> {
        let url = format!("{}/v2/orders", self.base_url);
        let payload = WireOrder::from_request(order);

        let resp = self
            .authed(self.http.post(&url).json(&payload))
            .send()
            .await
            .map_err(|e| EngineError::Broker(format!("order submit: {e}")))?;
        let body = Self::check(resp, "order submit").await?;

        let ack: WireOrderAck = serde_json::from_str(&body)
            .map_err(|e| EngineError::Broker(format!("order ack unparseable: {e}")))?;
        info!(
            contract = %order.contract_symbol,
            side = %order.side,
            qty = order.qty,
            order_id = %ack.id,
            status = %ack.status,
            "order accepted"
        );
        Ok(OrderAck {
            order_id: ack.id,
            status: ack.status,
        })
    }

    async fn list_open_positions(&self) -> Result<Vec<BrokerPosition>, EngineError> {
        let url = format!("{}/v2/positions", self.base_url);
        let resp = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| EngineError::Broker(format!("positions list: {e}")))?;
        let body = Self::check(resp, "positions list").await?;

        let wire: Vec<WirePosition> = serde_json::from_str(&body)
            .map_err(|e| EngineError::Broker(format!("positions payload unparseable: {e}")))?;
        wire.into_iter().map(WirePosition::into_position).collect()
    }

    fn name(&self) -> &str {
        "alpaca"
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Alpaca serializes all numerics as strings.
#[derive(Debug, Serialize)]
struct WireOrder {
    symbol: String,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
    client_order_id: String,
}

impl WireOrder {
    fn from_request(order: &OrderRequest) -> Self {
        let (order_type, limit_price) = match order.kind {
            OrderKind::Limit(price) => ("limit", Some(format!("{price:.2}"))),
            OrderKind::Market => ("market", None),
        };
        Self {
            symbol: order.contract_symbol.clone(),
            qty: order.qty.to_string(),
            side: order.side,
            order_type,
            time_in_force: "day",
            limit_price,
            client_order_id: order.client_order_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireOrderAck {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    symbol: String,
    qty: String,
    avg_entry_price: String,
    side: String,
}

impl WirePosition {
    fn into_position(self) -> Result<BrokerPosition, EngineError> {
        let qty: f64 = self
            .qty
            .parse()
            .map_err(|_| EngineError::Broker(format!("bad qty {:?} for {}", self.qty, self.symbol)))?;
        let avg_entry_price: f64 = self.avg_entry_price.parse().map_err(|_| {
            EngineError::Broker(format!(
                "bad avg_entry_price {:?} for {}",
                self.avg_entry_price, self.symbol
            ))
        })?;
        let side = match self.side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            other => {
                return Err(EngineError::Broker(format!(
                    "unknown position side {other:?} for {}",
                    self.symbol
                )))
            }
        };
        Ok(BrokerPosition {
            contract_symbol: self.symbol,
            qty: qty.abs().round() as u32,
            avg_entry_price,
            side,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
