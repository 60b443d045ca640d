//! Persisted exit-target store.
//!
//! One JSON file holding a map of contract symbol to [`ExitTarget`].
//! Every mutation is a load-modify-save under a single async mutex, so
//! the pipeline registering a new target and the monitor removing a hit
//! one never interleave. Reads of a missing or corrupt file degrade to
//! an empty map with a warning; losing targets is recoverable (the
//! reconcile pass re-detects closed positions), losing the process to a
//! parse error is not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::types::{EngineError, ExitTarget};

pub struct TargetStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TargetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add or replace the target for its contract symbol.
    pub async fn register(&self, target: ExitTarget) -> Result<(), EngineError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await;
        info!(contract = %target.contract_symbol, "registering exit target");
        map.insert(target.contract_symbol.clone(), target);
        self.write_map(&map).await
    }

    /// Remove and return the target for `contract_symbol`, if tracked.
    pub async fn remove(
        &self,
        contract_symbol: &str,
    ) -> Result<Option<ExitTarget>, EngineError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await;
        let removed = map.remove(contract_symbol);
        if removed.is_some() {
            self.write_map(&map).await?;
            info!(contract = contract_symbol, "removed exit target");
        }
        Ok(removed)
    }

    /// Snapshot of all tracked targets, ordered by contract symbol.
    pub async fn load_all(&self) -> Vec<ExitTarget> {
        let _guard = self.lock.lock().await;
        self.read_map().await.into_values().collect()
    }

    async fn read_map(&self) -> BTreeMap<String, ExitTarget> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "target store unreadable, treating as empty");
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "target store corrupt, treating as empty");
                BTreeMap::new()
            }
        }
    }

    /// Write to a sibling temp file then rename, so a crash mid-write
    /// never leaves a half-written store behind.
    async fn write_map(&self, map: &BTreeMap<String, ExitTarget>) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| EngineError::Persistence(format!("serialize failed: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| EngineError::Persistence(format!("write {} failed: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| {
                EngineError::Persistence(format!("rename to {} failed: {e}", self.path.display()))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> TargetStore {
        let path = std::env::temp_dir().join(format!(
            "crassus-targets-{}.json",
            uuid::Uuid::new_v4().simple()
        ));
        TargetStore::new(path)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let store = temp_store();
        assert!(store.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_and_load() {
        let store = temp_store();
        store
            .register(ExitTarget::sample("AAPL260320C00150000", 6.00, 4.50))
            .await
            .unwrap();
        store
            .register(ExitTarget::sample("MSFT260320C00400000", 3.00, 2.00))
            .await
            .unwrap();

        let all = store.load_all().await;
        assert_eq!(all.len(), 2);
        // BTreeMap ordering by symbol
        assert_eq!(all[0].contract_symbol, "AAPL260320C00150000");
        assert_eq!(all[1].contract_symbol, "MSFT260320C00400000");
    }

    #[tokio::test]
    async fn test_register_replaces_existing() {
        let store = temp_store();
        store
            .register(ExitTarget::sample("AAPL260320C00150000", 6.00, 4.50))
            .await
            .unwrap();
        store
            .register(ExitTarget::sample("AAPL260320C00150000", 7.00, 4.00))
            .await
            .unwrap();

        let all = store.load_all().await;
        assert_eq!(all.len(), 1);
        assert!((all[0].take_profit_price - 7.00).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = temp_store();
        store
            .register(ExitTarget::sample("AAPL260320C00150000", 6.00, 4.50))
            .await
            .unwrap();

        let removed = store.remove("AAPL260320C00150000").await.unwrap();
        assert!(removed.is_some());
        assert!(store.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_untracked_is_noop() {
        let store = temp_store();
        let removed = store.remove("NOPE").await.unwrap();
        assert!(removed.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_to_empty() {
        let store = temp_store();
        tokio::fs::write(store.path(), "{not json at all")
            .await
            .unwrap();
        assert!(store.load_all().await.is_empty());

        // And the store recovers on the next write
        store
            .register(ExitTarget::sample("AAPL260320C00150000", 6.00, 4.50))
            .await
            .unwrap();
        assert_eq!(store.load_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let store = temp_store();
        store
            .register(ExitTarget::sample("AAPL260320C00150000", 6.00, 4.50))
            .await
            .unwrap();

        let reopened = TargetStore::new(store.path().to_path_buf());
        assert_eq!(reopened.load_all().await.len(), 1);
    }
}
