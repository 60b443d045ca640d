//! Order execution abstraction.

pub mod alpaca;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{EngineError, PositionSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    /// Day limit at the given price.
    Limit(f64),
    Market,
}

/// A single-leg option order. All orders are day orders.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub contract_symbol: String,
    pub side: OrderSide,
    pub qty: u32,
    pub kind: OrderKind,
    /// Correlation id threaded through logs and broker order ids.
    pub client_order_id: String,
}

/// Broker acknowledgement of an accepted order.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
}

/// An open position as the broker reports it.
#[derive(Debug, Clone)]
pub struct BrokerPosition {
    pub contract_symbol: String,
    pub qty: u32,
    pub avg_entry_price: f64,
    pub side: PositionSide,
}

/// Order routing and position inspection.
#[async_trait]
pub trait BrokerExecution: Send + Sync {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, EngineError>;

    /// All currently open positions, options and otherwise.
    async fn list_open_positions(&self) -> Result<Vec<BrokerPosition>, EngineError>;

    fn name(&self) -> &str;

    async fn submit_limit_order(
        &self,
        contract_symbol: &str,
        side: OrderSide,
        qty: u32,
        limit_price: f64,
        client_order_id: String,
    ) -> Result<OrderAck, EngineError> {
        self.submit_order(&OrderRequest {
            contract_symbol: contract_symbol.to_string(),
            side,
            qty,
            kind: OrderKind::Limit(limit_price),
            client_order_id,
        })
        .await
    }

    async fn submit_market_order(
        &self,
        contract_symbol: &str,
        side: OrderSide,
        qty: u32,
        client_order_id: String,
    ) -> Result<OrderAck, EngineError> {
        self.submit_order(&OrderRequest {
            contract_symbol: contract_symbol.to_string(),
            side,
            qty,
            kind: OrderKind::Market,
            client_order_id,
        })
        .await
    }
}
