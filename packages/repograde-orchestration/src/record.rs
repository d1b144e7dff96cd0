//! Repository record
//!
//! In-memory aggregate for one `(name, branch)` pair. Each category getter
//! fills exactly one field: store first, then the producer (or the rank
//! engine, source host or clock for derived categories), then writes the
//! value back. The store stays the only durable owner of the data.

use chrono::{DateTime, Utc};
use repograde_storage::{
    clear_repository, is_fully_cached, CacheKey, Category, KeyedStore, RepositoryId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{CategoryError, OrchestratorError, Result};
use crate::model::{
    normalize, CategoryValue, CodeStats, ExecutionTime, Imports, LintMessages, Metadata, Score,
    TestResults,
};
use crate::producer::{fetch_checked, FetchParams, ProducerGateway};
use crate::rank::{RankEngine, RankInputs};
use crate::source::SourceHost;

/// Collaborators shared by every record of a process
#[derive(Clone)]
pub struct RecordContext {
    pub store: Arc<dyn KeyedStore>,
    pub producers: Arc<dyn ProducerGateway>,
    pub source: Arc<dyn SourceHost>,
    pub rank: RankEngine,
    /// Linter allow-list passed to the lint producer
    pub linters: Vec<String>,
    /// Budget handed to each producer call
    pub producer_budget: Duration,
}

/// The eight category slots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordData {
    pub imports: Option<Imports>,
    pub code_stats: Option<CodeStats>,
    pub test_results: Option<TestResults>,
    pub lint_messages: Option<LintMessages>,
    pub score: Option<Score>,
    pub metadata: Option<Metadata>,
    pub last_update: Option<DateTime<Utc>>,
    pub execution_time: Option<ExecutionTime>,
}

impl RecordData {
    pub fn set(&mut self, value: CategoryValue) {
        match value {
            CategoryValue::Imports(v) => self.imports = Some(v),
            CategoryValue::CodeStats(v) => self.code_stats = Some(v),
            CategoryValue::TestResults(v) => self.test_results = Some(v),
            CategoryValue::LintMessages(v) => self.lint_messages = Some(v),
            CategoryValue::Score(v) => self.score = Some(v),
            CategoryValue::Metadata(v) => self.metadata = Some(v),
            CategoryValue::LastUpdate(v) => self.last_update = Some(v),
            CategoryValue::ExecutionTime(v) => self.execution_time = Some(v),
        }
    }

    pub fn get(&self, category: Category) -> Option<CategoryValue> {
        match category {
            Category::Imports => self.imports.clone().map(CategoryValue::Imports),
            Category::CodeStats => self.code_stats.clone().map(CategoryValue::CodeStats),
            Category::TestResults => self.test_results.clone().map(CategoryValue::TestResults),
            Category::LintMessages => self.lint_messages.clone().map(CategoryValue::LintMessages),
            Category::Score => self.score.clone().map(CategoryValue::Score),
            Category::Metadata => self.metadata.clone().map(CategoryValue::Metadata),
            Category::LastUpdate => self.last_update.map(CategoryValue::LastUpdate),
            Category::ExecutionTime => self.execution_time.map(CategoryValue::ExecutionTime),
        }
    }

    pub fn has(&self, category: Category) -> bool {
        match category {
            Category::Imports => self.imports.is_some(),
            Category::CodeStats => self.code_stats.is_some(),
            Category::TestResults => self.test_results.is_some(),
            Category::LintMessages => self.lint_messages.is_some(),
            Category::Score => self.score.is_some(),
            Category::Metadata => self.metadata.is_some(),
            Category::LastUpdate => self.last_update.is_some(),
            Category::ExecutionTime => self.execution_time.is_some(),
        }
    }

    pub fn rank_inputs(&self) -> RankInputs<'_> {
        RankInputs {
            code_stats: self.code_stats.as_ref(),
            imports: self.imports.as_ref(),
            test_results: self.test_results.as_ref(),
            lint_messages: self.lint_messages.as_ref(),
        }
    }
}

#[derive(Clone)]
pub struct RepositoryRecord {
    id: RepositoryId,
    ctx: RecordContext,
    started_at: Instant,
    data: RecordData,
    errors: BTreeMap<Category, CategoryError>,
}

impl std::fmt::Debug for RepositoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRecord")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl RepositoryRecord {
    /// Empty record; nothing is read until a getter asks for it
    pub fn new(id: RepositoryId, ctx: RecordContext) -> Self {
        Self {
            id,
            ctx,
            started_at: Instant::now(),
            data: RecordData::default(),
            errors: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Per-category failure markers
    pub fn errors(&self) -> &BTreeMap<Category, CategoryError> {
        &self.errors
    }

    /// All eight keys exist in the store
    pub async fn is_cached(&self) -> Result<bool> {
        Ok(is_fully_cached(self.ctx.store.as_ref(), &self.id).await?)
    }

    /// All four primary categories are present in memory
    ///
    /// Empty imports or lint maps still count; only test results must
    /// differ from their default.
    pub fn is_loaded(&self) -> bool {
        let data = &self.data;
        data.imports.is_some()
            && data.code_stats.is_some()
            && data.lint_messages.is_some()
            && data
                .test_results
                .as_ref()
                .is_some_and(|v| v != &TestResults::default())
    }

    /// Remove every key of this identifier from the store
    pub async fn clear_cache(&self) -> Result<usize> {
        let removed = clear_repository(self.ctx.store.as_ref(), &self.id).await?;
        debug!("Cleared {} cached keys for {}", removed, self.id);
        Ok(removed)
    }

    pub async fn imports(&mut self) -> Result<&Imports> {
        self.ensure(Category::Imports).await?;
        self.data.imports.as_ref().ok_or_else(|| missing(Category::Imports))
    }

    pub async fn code_stats(&mut self) -> Result<&CodeStats> {
        self.ensure(Category::CodeStats).await?;
        self.data.code_stats.as_ref().ok_or_else(|| missing(Category::CodeStats))
    }

    pub async fn test_results(&mut self) -> Result<&TestResults> {
        self.ensure(Category::TestResults).await?;
        self.data.test_results.as_ref().ok_or_else(|| missing(Category::TestResults))
    }

    pub async fn lint_messages(&mut self) -> Result<&LintMessages> {
        self.ensure(Category::LintMessages).await?;
        self.data.lint_messages.as_ref().ok_or_else(|| missing(Category::LintMessages))
    }

    pub async fn score(&mut self) -> Result<&Score> {
        self.ensure(Category::Score).await?;
        self.data.score.as_ref().ok_or_else(|| missing(Category::Score))
    }

    pub async fn metadata(&mut self) -> Result<&Metadata> {
        self.ensure(Category::Metadata).await?;
        self.data.metadata.as_ref().ok_or_else(|| missing(Category::Metadata))
    }

    pub async fn last_update(&mut self) -> Result<DateTime<Utc>> {
        self.ensure(Category::LastUpdate).await?;
        self.data.last_update.ok_or_else(|| missing(Category::LastUpdate))
    }

    pub async fn execution_time(&mut self) -> Result<ExecutionTime> {
        self.ensure(Category::ExecutionTime).await?;
        self.data.execution_time.ok_or_else(|| missing(Category::ExecutionTime))
    }

    /// Populate all eight categories in load order, stopping at the first failure
    pub async fn load(&mut self) -> Result<()> {
        for category in Category::ALL {
            self.ensure(category).await?;
        }
        Ok(())
    }

    /// Category map for output; absent categories are `null`
    pub fn as_map(&self) -> Result<BTreeMap<&'static str, serde_json::Value>> {
        let mut map = BTreeMap::new();
        for category in Category::ALL {
            let value = match self.data.get(category) {
                Some(value) => value.to_json()?,
                None => serde_json::Value::Null,
            };
            map.insert(category.as_str(), value);
        }
        Ok(map)
    }

    pub(crate) fn apply(&mut self, value: CategoryValue) {
        self.errors.remove(&value.category());
        self.data.set(value);
    }

    pub(crate) fn set_error(&mut self, category: Category, error: CategoryError) {
        self.errors.insert(category, error);
    }

    pub(crate) fn context(&self) -> &RecordContext {
        &self.ctx
    }

    /// Cached value of one category
    ///
    /// Store failures propagate. Bytes that no longer decode are logged and
    /// reported as a miss so the caller re-fetches instead of spreading
    /// corruption.
    pub async fn cached(&self, category: Category) -> Result<Option<CategoryValue>> {
        let key = CacheKey::new(&self.id, category);
        let Some(bytes) = self.ctx.store.get(key.as_bytes()).await? else {
            return Ok(None);
        };
        match CategoryValue::decode(category, &bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_decode_failure() => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write one value back; failures are logged and swallowed
    pub(crate) async fn persist(&self, value: &CategoryValue) -> bool {
        let key = CacheKey::new(&self.id, value.category());
        let result = match value.encode() {
            Ok(bytes) => self.ctx.store.put(key.as_bytes(), &bytes).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not persist {}: {}", key, e);
                false
            }
        }
    }

    async fn ensure(&mut self, category: Category) -> Result<()> {
        if self.data.has(category) {
            return Ok(());
        }
        if let Some(value) = self.cached(category).await? {
            self.data.set(value);
            return Ok(());
        }

        let value = self.produce(category).await?;
        self.persist(&value).await;
        self.apply(value);
        Ok(())
    }

    /// Compute a category that is not cached
    async fn produce(&self, category: Category) -> Result<CategoryValue> {
        match category {
            Category::Imports
            | Category::CodeStats
            | Category::TestResults
            | Category::LintMessages => {
                let params = FetchParams::new(self.ctx.linters.clone(), self.ctx.producer_budget);
                debug!("Fetching {} for {} from producer", category, self.id);
                let value =
                    fetch_checked(self.ctx.producers.as_ref(), &self.id, category, &params).await?;
                Ok(normalize(value, &self.ctx.linters))
            }
            Category::Score => Ok(CategoryValue::Score(
                self.ctx.rank.score(&self.data.rank_inputs())?,
            )),
            Category::Metadata => {
                let info = self.ctx.source.inspect(&self.id).await?;
                Ok(CategoryValue::Metadata(info.metadata))
            }
            Category::LastUpdate => Ok(CategoryValue::LastUpdate(Utc::now())),
            Category::ExecutionTime => Ok(CategoryValue::ExecutionTime(
                ExecutionTime::from_duration(self.started_at.elapsed()),
            )),
        }
    }
}

fn missing(category: Category) -> OrchestratorError {
    OrchestratorError::missing_data(format!("{} not available", category))
}

/// Output document built from the store alone
///
/// Absent or undecodable categories become an explicit `unavailable` marker.
pub async fn cached_document(
    store: &dyn KeyedStore,
    id: &RepositoryId,
) -> Result<serde_json::Value> {
    let mut document = serde_json::Map::new();
    for category in Category::ALL {
        let key = CacheKey::new(id, category);
        let entry = match store.get(key.as_bytes()).await? {
            Some(bytes) => match CategoryValue::decode(category, &bytes) {
                Ok(value) => value.to_json()?,
                Err(e) => CategoryError::Store(e.to_string()).to_document(),
            },
            None => CategoryError::MissingData(format!("{} unavailable", category)).to_document(),
        };
        document.insert(category.as_str().to_string(), entry);
    }
    Ok(serde_json::Value::Object(document))
}
