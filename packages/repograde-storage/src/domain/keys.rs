//! Key scheme for cached repository data
//!
//! Every `(name, branch)` pair owns exactly eight keys, one per [`Category`]:
//!
//! ```text
//! <name>-<branch>-<category>
//! github.com/org/project--imports        (default branch)
//! github.com/org/project-main-score
//! ```
//!
//! The separator is `-`, so a literal `-` (and the escape byte `%`) inside a
//! name or branch is percent-escaped. Identifiers without those bytes map to
//! the plain form above; with them the mapping stays injective and the
//! identifier prefix never matches another identifier's keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StorageError};

const SEPARATOR: char = '-';

/// Repository identifier: `(name, branch)`
///
/// `name` includes host, owner and project (`github.com/org/project`).
/// An empty `branch` means the default branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId {
    name: String,
    branch: String,
}

impl RepositoryId {
    pub fn new(name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branch: branch.into(),
        }
    }

    /// Identifier on the default branch
    pub fn default_branch(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Prefix shared by the eight keys of this identifier (and no other)
    pub fn key_prefix(&self) -> Vec<u8> {
        format!(
            "{}{}{}{}",
            escape(&self.name),
            SEPARATOR,
            escape(&self.branch),
            SEPARATOR
        )
        .into_bytes()
    }

    /// The full, fixed set of keys owned by this identifier
    pub fn cache_keys(&self) -> Vec<CacheKey> {
        Category::ALL
            .iter()
            .map(|category| CacheKey::new(self, *category))
            .collect()
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.branch.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.branch)
        }
    }
}

/// Independently cacheable slice of repository data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Imports,
    CodeStats,
    TestResults,
    LintMessages,
    Score,
    Metadata,
    #[serde(rename = "date")]
    LastUpdate,
    ExecutionTime,
}

impl Category {
    /// All categories, in load order
    pub const ALL: [Category; 8] = [
        Category::Imports,
        Category::CodeStats,
        Category::LintMessages,
        Category::TestResults,
        Category::Score,
        Category::Metadata,
        Category::LastUpdate,
        Category::ExecutionTime,
    ];

    /// Categories produced by external analysis producers
    pub const PRIMARY: [Category; 4] = [
        Category::Imports,
        Category::CodeStats,
        Category::TestResults,
        Category::LintMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Imports => "imports",
            Category::CodeStats => "codestats",
            Category::TestResults => "testresults",
            Category::LintMessages => "lintmessages",
            Category::Score => "score",
            Category::Metadata => "metadata",
            Category::LastUpdate => "date",
            Category::ExecutionTime => "executiontime",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| StorageError::config(format!("Invalid category: {}", s)))
    }

    pub fn is_primary(&self) -> bool {
        Category::PRIMARY.contains(self)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque store key for one `(name, branch, category)` triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Vec<u8>);

impl CacheKey {
    pub fn new(id: &RepositoryId, category: Category) -> Self {
        let mut key = id.key_prefix();
        key.extend_from_slice(category.as_str().as_bytes());
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for CacheKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            SEPARATOR => out.push_str("%2D"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_key_format() {
        let id = RepositoryId::new("github.com/org/project", "main");
        let key = CacheKey::new(&id, Category::Imports);
        assert_eq!(key.as_bytes(), b"github.com/org/project-main-imports");
    }

    #[test]
    fn test_default_branch_key_format() {
        let id = RepositoryId::default_branch("github.com/org/project");
        let key = CacheKey::new(&id, Category::LastUpdate);
        assert_eq!(key.to_string(), "github.com/org/project--date");
    }

    #[test]
    fn test_dashes_are_escaped() {
        let id = RepositoryId::new("github.com/org/my-project", "feature-x");
        let key = CacheKey::new(&id, Category::Score);
        assert_eq!(key.to_string(), "github.com/org/my%2Dproject-feature%2Dx-score");
    }

    #[test]
    fn test_split_ambiguity_resolved() {
        let a = RepositoryId::new("github.com/o/p-x", "y");
        let b = RepositoryId::new("github.com/o/p", "x-y");
        assert_ne!(
            CacheKey::new(&a, Category::Imports),
            CacheKey::new(&b, Category::Imports)
        );
    }

    #[test]
    fn test_prefix_does_not_cover_other_identifiers() {
        let short = RepositoryId::new("github.com/o/p", "x");
        let long = RepositoryId::default_branch("github.com/o/p-x");
        let prefix = short.key_prefix();
        for key in long.cache_keys() {
            assert!(!key.as_bytes().starts_with(&prefix));
        }
    }

    #[test]
    fn test_eight_distinct_keys() {
        let id = RepositoryId::default_branch("github.com/org/project");
        let keys: std::collections::HashSet<_> = id.cache_keys().into_iter().collect();
        assert_eq!(keys.len(), 8);
        for key in &keys {
            assert!(key.as_bytes().starts_with(&id.key_prefix()));
        }
    }

    #[test]
    fn test_category_roundtrip() {
        for category in Category::ALL {
            assert_eq!(Category::from_str(category.as_str()).unwrap(), category);
        }
        assert!(Category::from_str("loc").is_err());
    }

    #[test]
    fn test_category_serde_matches_key_names() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn test_primary_categories() {
        assert!(Category::Imports.is_primary());
        assert!(Category::LintMessages.is_primary());
        assert!(!Category::Score.is_primary());
        assert!(!Category::LastUpdate.is_primary());
    }

    #[test]
    fn test_display_identifier() {
        assert_eq!(RepositoryId::default_branch("a/b/c").to_string(), "a/b/c");
        assert_eq!(RepositoryId::new("a/b/c", "dev").to_string(), "a/b/c@dev");
    }
}
