//! Market-data source abstraction.
//!
//! Two sources are wired in: Yahoo ([`yahoo::YahooClient`], the primary,
//! with full quotes and quoted IV) and a minimal secondary venue feed
//! ([`venue::VenueClient`]) that only carries close price and open
//! interest. The screener asks `has_quoted_iv()` to decide whether it
//! can trust quoted vols or must solve them itself.

pub mod retry;
pub mod venue;
pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{EngineError, OptionQuote};

pub use retry::{resilient_call, CallResult, RetryPolicy};

/// An options data provider.
///
/// Implementations must be safe to call concurrently; the monitor and
/// the signal pipeline may hit the same client from different tasks.
#[async_trait]
pub trait OptionsDataSource: Send + Sync {
    /// Fetch the full chain for `underlying`, all expirations the source
    /// serves. `as_of` anchors DTE computation for the caller.
    async fn fetch_chain(
        &self,
        underlying: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<OptionQuote>, EngineError>;

    /// Fetch a single contract quote by its OCC-style symbol.
    async fn fetch_quote(&self, contract_symbol: &str) -> Result<OptionQuote, EngineError>;

    /// Whether quotes from this source carry a usable implied volatility
    /// and two-sided bid/ask. Sources that don't get IV solved locally
    /// and skip spread-based filtering.
    fn has_quoted_iv(&self) -> bool;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}
