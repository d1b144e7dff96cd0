use chrono::Utc;
use futures::future::join_all;
use repograde_storage::{Category, RepositoryId};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CategoryError, Result};
use crate::model::{normalize, CategoryValue, ExecutionTime};
use crate::producer::{fetch_checked, FetchParams, ProducerError};
use crate::record::{RecordContext, RepositoryRecord};
use crate::refresh::{Refresh, RefreshState, RefreshStateMachine};
use crate::source::{validate, ValidatedRepository};

/// Default bound on the whole collection stage
pub const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(300);

type CategoryResult = std::result::Result<CategoryValue, CategoryError>;

/// Aggregation orchestrator
///
/// Fans out one producer call per uncached primary category, folds the
/// results into a [`RepositoryRecord`], scores it when complete, and writes
/// everything it obtained back to the store.
#[derive(Clone)]
pub struct AggregationOrchestrator {
    ctx: RecordContext,
    collection_timeout: Duration,
    required_language: String,
}

impl AggregationOrchestrator {
    pub fn new(
        ctx: RecordContext,
        collection_timeout: Duration,
        required_language: String,
    ) -> Self {
        Self {
            ctx,
            collection_timeout,
            required_language,
        }
    }

    pub fn context(&self) -> &RecordContext {
        &self.ctx
    }

    pub fn collection_timeout(&self) -> Duration {
        self.collection_timeout
    }

    /// Build (or complete) the record for `id`
    ///
    /// Only a validation failure fails the call; every other problem is
    /// attached to the affected category in the report.
    pub async fn aggregate(&self, id: &RepositoryId) -> Result<AggregationReport> {
        let validated = validate(self.ctx.source.as_ref(), id, &self.required_language).await?;
        self.aggregate_validated(id, validated).await
    }

    /// Same as [`aggregate`](Self::aggregate) for a repository the caller
    /// has already validated against the source host
    pub async fn aggregate_validated(
        &self,
        id: &RepositoryId,
        validated: ValidatedRepository,
    ) -> Result<AggregationReport> {
        let started = Instant::now();
        let mut record = RepositoryRecord::new(id.clone(), self.ctx.clone());
        let mut pending = Vec::new();
        let mut cached = Vec::new();
        for category in Category::PRIMARY {
            match record.cached(category).await {
                Ok(Some(value)) => {
                    record.apply(value);
                    cached.push(category);
                }
                Ok(None) => pending.push(category),
                Err(e) => {
                    warn!("Cache read for {} {} failed: {}", id, category, e);
                    record.set_error(category, CategoryError::from(&e));
                }
            }
        }

        let mut sm = RefreshStateMachine::new(Refresh::new_dispatched(
            id.clone(),
            pending.clone(),
            cached.clone(),
        ));
        let run_id = sm.refresh().id;
        info!(
            "Refresh {}: {} dispatched ({} to fetch, {} cached)",
            run_id,
            id,
            pending.len(),
            cached.len()
        );

        // Collecting
        sm.collect()?;
        let results = self.collect(run_id, id, &pending).await;

        // Merged
        let mut fetched = Vec::new();
        for (category, result) in results {
            match result {
                Ok(value) => {
                    record.apply(value);
                    fetched.push(category);
                }
                Err(error) => {
                    warn!("Refresh {}: {} failed: {}", run_id, category, error);
                    record.set_error(category, error);
                }
            }
        }
        let mut failed: Vec<Category> = Category::PRIMARY
            .into_iter()
            .filter(|category| record.errors().contains_key(category))
            .collect();
        sm.merge(failed.clone())?;
        // Derived keys are only rewritten when a primary changed in this run
        let refreshed = !fetched.is_empty();

        // Scored
        if failed.is_empty() && !refreshed && reuse(&mut record, Category::Score).await {
            if let Some(score) = &record.data().score {
                sm.score(score.rank.clone())?;
                debug!("Refresh {}: {} kept cached score {}", run_id, id, score.rank);
            }
        } else if failed.is_empty() {
            match self.ctx.rank.score(&record.data().rank_inputs()) {
                Ok(score) => {
                    sm.score(score.rank.clone())?;
                    info!("Refresh {}: {} scored {} ({})", run_id, id, score.value, score.rank);
                    record.apply(CategoryValue::Score(score));
                    fetched.push(Category::Score);
                }
                Err(e) => record.set_error(Category::Score, CategoryError::from(&e)),
            }
        } else {
            let missing: Vec<&str> = failed.iter().map(|c| c.as_str()).collect();
            record.set_error(
                Category::Score,
                CategoryError::MissingData(format!(
                    "score requires all primary categories, missing: {}",
                    missing.join(", ")
                )),
            );
        }

        if refreshed || !reuse(&mut record, Category::Metadata).await {
            record.apply(CategoryValue::Metadata(validated.metadata));
            fetched.push(Category::Metadata);
        }
        let timestamps_kept = !refreshed
            && reuse(&mut record, Category::LastUpdate).await
            && reuse(&mut record, Category::ExecutionTime).await;
        if !timestamps_kept {
            record.apply(CategoryValue::LastUpdate(Utc::now()));
            record.apply(CategoryValue::ExecutionTime(ExecutionTime::from_duration(
                started.elapsed(),
            )));
            fetched.extend([Category::LastUpdate, Category::ExecutionTime]);
        }

        // Persisted
        let values: Vec<CategoryValue> = fetched
            .iter()
            .filter_map(|category| record.data().get(*category))
            .collect();
        let writes = join_all(values.iter().map(|value| record.persist(value))).await;
        let persist_failures = writes.iter().filter(|ok| !**ok).count();
        if persist_failures > 0 {
            warn!(
                "Refresh {}: {} of {} writes for {} failed",
                run_id,
                persist_failures,
                writes.len(),
                id
            );
        }

        if record.errors().contains_key(&Category::Score) {
            failed.push(Category::Score);
            sm.fail(failed)?;
            warn!("Refresh {}: {} finished with partial failure", run_id, id);
        } else {
            sm.persist(persist_failures)?;
            info!(
                "Refresh {}: {} persisted in {:?}",
                run_id,
                id,
                started.elapsed()
            );
        }

        let refresh = sm.into_refresh();
        Ok(AggregationReport {
            run_id,
            id: id.clone(),
            canonical_name: validated.canonical_name,
            state: refresh.state,
            record,
            fetched,
            persist_failures,
        })
    }

    /// Run the pending producer calls concurrently under the collection bound
    ///
    /// Every task reports through one channel. When the bound elapses the
    /// remaining tasks are cancelled and their categories marked as timed out.
    async fn collect(
        &self,
        run_id: Uuid,
        id: &RepositoryId,
        pending: &[Category],
    ) -> BTreeMap<Category, CategoryResult> {
        let mut results = BTreeMap::new();
        if pending.is_empty() {
            return results;
        }

        let deadline = tokio::time::Instant::now() + self.collection_timeout;
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<(Category, CategoryResult)>(pending.len());

        let mut handles = Vec::with_capacity(pending.len());
        for &category in pending {
            let tx = tx.clone();
            let producers = self.ctx.producers.clone();
            let linters = self.ctx.linters.clone();
            let params = FetchParams::new(linters.clone(), self.ctx.producer_budget)
                .with_cancel(cancel.child_token());
            let id = id.clone();

            handles.push(tokio::spawn(async move {
                debug!("Fetching {} for {}", category, id);
                let fetch = fetch_checked(producers.as_ref(), &id, category, &params);
                let result = match tokio::time::timeout(params.budget, fetch).await {
                    Ok(result) => result,
                    Err(_) => Err(ProducerError::Timeout(format!(
                        "{} exceeded its {}ms budget",
                        category,
                        params.budget.as_millis()
                    ))),
                };
                let result = result
                    .map(|value| normalize(value, &linters))
                    .map_err(CategoryError::from);
                // The receiver is gone once the collection bound has elapsed
                let _ = tx.send((category, result)).await;
            }));
        }
        drop(tx);

        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((category, result))) => {
                    results.insert(category, result);
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    warn!(
                        "Refresh {}: collection bound of {}ms elapsed, cancelling {} task(s)",
                        run_id,
                        self.collection_timeout.as_millis(),
                        pending.len() - results.len()
                    );
                    cancel.cancel();
                    for handle in &handles {
                        handle.abort();
                    }
                    break;
                }
            }
        }

        for &category in pending {
            results.entry(category).or_insert_with(|| {
                if timed_out {
                    Err(CategoryError::Timeout(format!(
                        "no result after {}ms",
                        self.collection_timeout.as_millis()
                    )))
                } else {
                    Err(CategoryError::Aborted(
                        "task ended without reporting a result".to_string(),
                    ))
                }
            });
        }
        results
    }
}

/// Apply the stored value of `category` to `record`, if one decodes
async fn reuse(record: &mut RepositoryRecord, category: Category) -> bool {
    match record.cached(category).await {
        Ok(Some(value)) => {
            record.apply(value);
            true
        }
        Ok(None) => false,
        Err(e) => {
            debug!("Stored {} for {} not reusable: {}", category, record.id(), e);
            false
        }
    }
}

/// Outcome of one aggregation run
#[derive(Debug, Clone)]
pub struct AggregationReport {
    pub run_id: Uuid,
    pub id: RepositoryId,
    /// Canonical repository name as reported by the source host
    pub canonical_name: String,
    pub state: RefreshState,
    pub record: RepositoryRecord,
    /// Categories obtained (not read from cache) in this run
    pub fetched: Vec<Category>,
    pub persist_failures: usize,
}

impl AggregationReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.state, RefreshState::Persisted { .. })
    }

    pub fn error(&self, category: Category) -> Option<&CategoryError> {
        self.record.errors().get(&category)
    }

    /// Output document with a value or an error marker for every category
    pub fn to_document(&self) -> Result<serde_json::Value> {
        let mut document = serde_json::Map::new();
        for category in Category::ALL {
            let entry = match (self.record.data().get(category), self.error(category)) {
                (Some(value), _) => value.to_json()?,
                (None, Some(error)) => error.to_document(),
                (None, None) => {
                    CategoryError::MissingData(format!("{} unavailable", category)).to_document()
                }
            };
            document.insert(category.as_str().to_string(), entry);
        }
        Ok(serde_json::Value::Object(document))
    }
}
