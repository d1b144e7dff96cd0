use async_trait::async_trait;
use repograde_storage::{Category, RepositoryId};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::CategoryValue;

/// Producer failure, as reported by the gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProducerError {
    /// Repository has no applicable source; never retried
    #[error("Repository cannot be analyzed: {0}")]
    Validation(String),

    #[error("Producer timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No producer for category {0}")]
    Unsupported(Category),

    #[error("Producer returned {got} when {expected} was requested")]
    Mismatch { expected: Category, got: Category },
}

/// Per-call parameters
#[derive(Debug, Clone)]
pub struct FetchParams {
    /// Active linter allow-list (lint messages only)
    pub linters: Vec<String>,
    /// Time budget the producer may spend
    pub budget: Duration,
    /// Fired when the caller stops waiting for this result
    pub cancel: CancellationToken,
}

impl FetchParams {
    pub fn new(linters: Vec<String>, budget: Duration) -> Self {
        Self {
            linters,
            budget,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Gateway to the external analysis producers
///
/// One call per primary category. Calls are stateless and idempotent; the
/// gateway itself never retries.
#[async_trait]
pub trait ProducerGateway: Send + Sync {
    async fn fetch(
        &self,
        id: &RepositoryId,
        category: Category,
        params: &FetchParams,
    ) -> Result<CategoryValue, ProducerError>;
}

/// Fetch one category and check the producer answered with the right variant
pub async fn fetch_checked(
    gateway: &dyn ProducerGateway,
    id: &RepositoryId,
    category: Category,
    params: &FetchParams,
) -> Result<CategoryValue, ProducerError> {
    if !category.is_primary() {
        return Err(ProducerError::Unsupported(category));
    }
    let value = gateway.fetch(id, category, params).await?;
    if value.category() != category {
        return Err(ProducerError::Mismatch {
            expected: category,
            got: value.category(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WrongVariant;

    #[async_trait]
    impl ProducerGateway for WrongVariant {
        async fn fetch(
            &self,
            _id: &RepositoryId,
            _category: Category,
            _params: &FetchParams,
        ) -> Result<CategoryValue, ProducerError> {
            Ok(CategoryValue::Imports(vec![]))
        }
    }

    #[tokio::test]
    async fn test_mismatched_variant_is_rejected() {
        let id = RepositoryId::default_branch("github.com/org/project");
        let params = FetchParams::new(vec![], Duration::from_secs(1));

        let err = fetch_checked(&WrongVariant, &id, Category::CodeStats, &params)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProducerError::Mismatch {
                expected: Category::CodeStats,
                got: Category::Imports
            }
        );

        let ok = fetch_checked(&WrongVariant, &id, Category::Imports, &params).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_derived_categories_are_not_produced() {
        let id = RepositoryId::default_branch("github.com/org/project");
        let params = FetchParams::new(vec![], Duration::from_secs(1));

        let err = fetch_checked(&WrongVariant, &id, Category::Score, &params)
            .await
            .unwrap_err();
        assert_eq!(err, ProducerError::Unsupported(Category::Score));
    }
}
