//! Service facade
//!
//! The operations a front end needs, without any transport attached.

use repograde_storage::RepositoryId;
use tracing::info;

use crate::error::Result;
use crate::orchestrator::{AggregationOrchestrator, AggregationReport};
use crate::rank::cached_rank;
use crate::record::{cached_document, RepositoryRecord};
use crate::source::{validate, ValidatedRepository};

/// Rank-only answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Badge {
    Rank(String),
    Unavailable,
}

impl Badge {
    pub fn as_str(&self) -> &str {
        match self {
            Badge::Rank(rank) => rank,
            Badge::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone)]
pub struct RepositoryService {
    orchestrator: AggregationOrchestrator,
    required_language: String,
}

impl RepositoryService {
    pub fn new(
        orchestrator: AggregationOrchestrator,
        required_language: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            required_language: required_language.into(),
        }
    }

    pub fn orchestrator(&self) -> &AggregationOrchestrator {
        &self.orchestrator
    }

    /// Aggregate the repository, fetching only what is not cached
    pub async fn project(&self, id: &RepositoryId) -> Result<AggregationReport> {
        self.orchestrator.aggregate(id).await
    }

    /// Drop everything cached for `id`, then aggregate from scratch
    ///
    /// The cache is left alone when validation fails.
    pub async fn refresh(&self, id: &RepositoryId) -> Result<AggregationReport> {
        let validated = self.validate(id).await?;
        let removed = self.record(id).clear_cache().await?;
        info!("Refreshing {} ({} cached keys dropped)", id, removed);
        self.orchestrator.aggregate_validated(id, validated).await
    }

    /// Rank letter from the cached score only; never calls a producer
    pub async fn badge(&self, id: &RepositoryId) -> Result<Badge> {
        let store = self.orchestrator.context().store.as_ref();
        Ok(match cached_rank(store, id).await? {
            Some(rank) => Badge::Rank(rank),
            None => Badge::Unavailable,
        })
    }

    pub async fn is_cached(&self, id: &RepositoryId) -> Result<bool> {
        self.record(id).is_cached().await
    }

    pub async fn validate(&self, id: &RepositoryId) -> Result<ValidatedRepository> {
        validate(
            self.orchestrator.context().source.as_ref(),
            id,
            &self.required_language,
        )
        .await
    }

    /// Raw file from the source host, `None` when absent
    pub async fn file_content(&self, id: &RepositoryId, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .orchestrator
            .context()
            .source
            .file_content(id, path)
            .await?)
    }

    /// Stored document for `id`, with unavailable markers for missing keys
    pub async fn cached_document(&self, id: &RepositoryId) -> Result<serde_json::Value> {
        cached_document(self.orchestrator.context().store.as_ref(), id).await
    }

    /// Lazy record bound to this service's collaborators
    pub fn record(&self, id: &RepositoryId) -> RepositoryRecord {
        RepositoryRecord::new(id.clone(), self.orchestrator.context().clone())
    }
}
