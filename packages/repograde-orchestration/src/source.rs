//! Source-hosting provider port
//!
//! Only used to check that a repository exists and carries code in the
//! expected language, to read its metadata, and to fetch raw files.

use async_trait::async_trait;
use repograde_storage::RepositoryId;
use thiserror::Error;

use crate::error::Result;
use crate::model::Metadata;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Source host request failed: {0}")]
    Transport(String),
}

/// Whole-request failure: the repository cannot be analyzed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Repository {0} not found")]
    NotFound(String),

    #[error("Repository {repository} doesn't contain {language} code")]
    NoApplicableSource { repository: String, language: String },
}

/// What the host knows about a repository
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryInfo {
    pub exists: bool,
    pub primary_language: Option<String>,
    /// Canonical web URL, e.g. `https://github.com/Org/Project`
    pub canonical_url: Option<String>,
    pub metadata: Metadata,
}

impl RepositoryInfo {
    pub fn language_matches(&self, required: &str) -> bool {
        self.primary_language
            .as_deref()
            .is_some_and(|language| language.contains(required))
    }
}

/// A repository that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRepository {
    /// Canonical name without protocol (`github.com/Org/Project`)
    pub canonical_name: String,
    pub metadata: Metadata,
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn inspect(&self, id: &RepositoryId) -> std::result::Result<RepositoryInfo, SourceError>;

    /// Raw file content at `path`, `None` when absent
    async fn file_content(
        &self,
        id: &RepositoryId,
        path: &str,
    ) -> std::result::Result<Option<Vec<u8>>, SourceError>;
}

/// Check the repository exists and contains `required_language` code
pub async fn validate(
    host: &dyn SourceHost,
    id: &RepositoryId,
    required_language: &str,
) -> Result<ValidatedRepository> {
    let info = host.inspect(id).await?;
    if !info.exists {
        return Err(ValidationError::NotFound(id.name().to_string()).into());
    }
    if !info.language_matches(required_language) {
        return Err(ValidationError::NoApplicableSource {
            repository: id.name().to_string(),
            language: required_language.to_string(),
        }
        .into());
    }

    let canonical_name = info
        .canonical_url
        .as_deref()
        .map(strip_protocol)
        .unwrap_or_else(|| id.name().to_string());

    Ok(ValidatedRepository {
        canonical_name,
        metadata: info.metadata,
    })
}

fn strip_protocol(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .to_string()
}
