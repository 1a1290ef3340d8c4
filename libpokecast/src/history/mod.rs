//! Publish history abstraction and backends
//!
//! A history store answers one question, "has this id been published?",
//! and records new ids after a successful post. Backends are chosen once,
//! at construction time, from [`HistoryConfig`].
//!
//! # Examples
//!
//! ```no_run
//! use libpokecast::config::{HistoryConfig, LocalHistoryConfig};
//! use libpokecast::history::open_history;
//! use libpokecast::types::CandidateId;
//!
//! # async fn example() -> libpokecast::Result<()> {
//! let config = HistoryConfig::Local(LocalHistoryConfig {
//!     path: "~/.local/share/pokecast/published_pokemon.txt".to_string(),
//! });
//! let history = open_history(&config).await?;
//!
//! if !history.exists(CandidateId::new(25)).await? {
//!     history.record(CandidateId::new(25)).await?;
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::types::CandidateId;

pub mod local;
pub mod object;

pub use local::LocalHistory;
pub use object::ObjectHistory;

/// Membership store for published candidate ids
///
/// Implementations must make `record` idempotent: recording an id that is
/// already present succeeds and leaves `exists` true.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Whether `id` has already been published
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Lookup` when the backend cannot answer. Callers
    /// treat that as "not yet published".
    async fn exists(&self, id: CandidateId) -> std::result::Result<bool, HistoryError>;

    /// Durably mark `id` as published
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Write` if the id could not be persisted.
    async fn record(&self, id: CandidateId) -> std::result::Result<(), HistoryError>;

    /// Backend name used in logs ("local", "s3", "gcs", ...)
    fn name(&self) -> &str;
}

/// Build the history backend selected by `config`
///
/// # Errors
///
/// Returns `HistoryError::Load` if a local history file exists but cannot be
/// read, or `HistoryError::Backend` if an object-store client cannot be built.
pub async fn open_history(config: &HistoryConfig) -> Result<Box<dyn HistoryStore>> {
    let store: Box<dyn HistoryStore> = match config {
        HistoryConfig::Local(local) => {
            let path = crate::config::expand_path(&local.path)?;
            Box::new(LocalHistory::load(path).await?)
        }
        HistoryConfig::S3(s3) => Box::new(ObjectHistory::s3(s3)?),
        HistoryConfig::Gcs(gcs) => Box::new(ObjectHistory::gcs(gcs)?),
    };

    tracing::debug!(backend = store.name(), "Opened publish history");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalHistoryConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_local_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("published.txt");
        std::fs::write(&path, "1\n2\n").unwrap();

        let config = HistoryConfig::Local(LocalHistoryConfig {
            path: path.to_str().unwrap().to_string(),
        });
        let history = open_history(&config).await.unwrap();

        assert_eq!(history.name(), "local");
        assert!(history.exists(CandidateId::new(2)).await.unwrap());
        assert!(!history.exists(CandidateId::new(3)).await.unwrap());
    }
}
