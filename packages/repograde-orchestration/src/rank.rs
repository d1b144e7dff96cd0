//! Rank engine
//!
//! Pure scoring over the four primary categories. Code stats, imports and
//! test results are required; lint messages are advisory and their weight
//! is redistributed when absent.
//!
//! The score is cached under its own key, so "what is the current rank"
//! never needs the other categories once a score exists.

use async_trait::async_trait;
use parking_lot::Mutex;
use repograde_storage::{codec, CacheKey, Category, KeyedStore, RepositoryId, StorageError};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::model::{stats, CodeStats, Imports, LintMessages, Score, ScoreDetail, TestResults};

const WEIGHT_TESTS: f64 = 0.40;
const WEIGHT_IMPORTS: f64 = 0.15;
const WEIGHT_CODE_STATS: f64 = 0.20;
const WEIGHT_LINT: f64 = 0.25;

/// Letter thresholds, highest first
const RANKS: [(f64, &str); 8] = [
    (90.0, "A+"),
    (80.0, "A"),
    (70.0, "B+"),
    (60.0, "B"),
    (50.0, "C+"),
    (40.0, "C"),
    (30.0, "D"),
    (20.0, "E"),
];
const LOWEST_RANK: &str = "F";

/// Borrowed view of the categories the engine reads
#[derive(Debug, Clone, Copy, Default)]
pub struct RankInputs<'a> {
    pub code_stats: Option<&'a CodeStats>,
    pub imports: Option<&'a Imports>,
    pub test_results: Option<&'a TestResults>,
    pub lint_messages: Option<&'a LintMessages>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RankEngine;

impl RankEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute `{score, rank}`; deterministic in its inputs
    pub fn score(&self, inputs: &RankInputs<'_>) -> Result<Score> {
        let (Some(code_stats), Some(imports), Some(test_results)) =
            (inputs.code_stats, inputs.imports, inputs.test_results)
        else {
            return Err(OrchestratorError::missing_data(format!(
                "Not enough data to calculate the rank (missing: {})",
                missing_required(inputs).join(", ")
            )));
        };

        let loc = code_stats.get(stats::LOC).copied().unwrap_or(0);
        let mut details = vec![
            ScoreDetail {
                name: Category::TestResults.as_str().to_string(),
                score: tests_score(test_results),
                weight: WEIGHT_TESTS,
            },
            ScoreDetail {
                name: Category::Imports.as_str().to_string(),
                score: imports_score(imports),
                weight: WEIGHT_IMPORTS,
            },
            ScoreDetail {
                name: Category::CodeStats.as_str().to_string(),
                score: code_stats_score(code_stats),
                weight: WEIGHT_CODE_STATS,
            },
        ];
        if let Some(lint) = inputs.lint_messages {
            details.push(ScoreDetail {
                name: Category::LintMessages.as_str().to_string(),
                score: lint_score(lint, loc),
                weight: WEIGHT_LINT,
            });
        }

        let total_weight: f64 = details.iter().map(|d| d.weight).sum();
        let weighted: f64 = details.iter().map(|d| d.score * d.weight).sum();
        let value = round2(weighted / total_weight);

        Ok(Score {
            value,
            rank: rank_for(value).to_string(),
            details,
        })
    }
}

fn missing_required(inputs: &RankInputs<'_>) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if inputs.code_stats.is_none() {
        missing.push(Category::CodeStats.as_str());
    }
    if inputs.imports.is_none() {
        missing.push(Category::Imports.as_str());
    }
    if inputs.test_results.is_none() {
        missing.push(Category::TestResults.as_str());
    }
    missing
}

fn tests_score(results: &TestResults) -> f64 {
    0.5 * results.mean_coverage()
        + 0.3 * results.success_ratio() * 100.0
        + 0.2 * results.checklist.pass_ratio() * 100.0
}

fn imports_score(imports: &Imports) -> f64 {
    100.0 - (4.0 * imports.len() as f64).min(60.0)
}

fn code_stats_score(code_stats: &CodeStats) -> f64 {
    let loc = code_stats.get(stats::LOC).copied().unwrap_or(0);
    if loc == 0 {
        return 0.0;
    }
    let cloc = code_stats.get(stats::CLOC).copied().unwrap_or(0);
    let comments = (cloc as f64 / loc as f64 * 500.0).min(100.0);
    let has_tests = code_stats.get(stats::TEST).copied().unwrap_or(0) > 0;
    (comments + if has_tests { 20.0 } else { 0.0 }).min(100.0)
}

fn lint_score(lint: &LintMessages, loc: u64) -> f64 {
    let findings: usize = lint.values().map(Vec::len).sum();
    if findings == 0 {
        return 100.0;
    }
    if loc == 0 {
        return 0.0;
    }
    let per_kloc = findings as f64 * 1000.0 / loc as f64;
    100.0 - (10.0 * per_kloc).min(100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Letter for a numeric score
pub fn rank_for(value: f64) -> &'static str {
    RANKS
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, rank)| *rank)
        .unwrap_or(LOWEST_RANK)
}

/// Rank letter from the stored score alone
///
/// Reads the single score key; `Ok(None)` when no usable score is stored.
pub async fn cached_rank(store: &dyn KeyedStore, id: &RepositoryId) -> Result<Option<String>> {
    let key = CacheKey::new(id, Category::Score);
    let Some(bytes) = store.get(key.as_bytes()).await? else {
        return Ok(None);
    };
    match codec::decode::<Score>(&bytes) {
        Ok(score) => {
            debug!("Cached rank for {}: {}", id, score.rank);
            Ok(Some(score.rank))
        }
        Err(e) if e.is_decode_failure() => {
            warn!("Ignoring undecodable score {}: {}", key, e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Remote score cache
// ═══════════════════════════════════════════════════════════════════════════

/// Remote field holding line counts
pub const REMOTE_LOC: &str = "loc";
/// Remote field holding imports
pub const REMOTE_IMPORTS: &str = "imports";
/// Remote field holding test results
pub const REMOTE_TEST: &str = "test";
/// Remote field the rank letter is written back to
pub const REMOTE_RANK: &str = "rank";

/// Hash-per-repository remote cache (Redis-like `HGET`/`HSET`)
///
/// Values are gzip compressed and may carry a status envelope.
#[async_trait]
pub trait RemoteScoreCache: Send + Sync {
    async fn hget(
        &self,
        repository: &str,
        field: &str,
    ) -> repograde_storage::Result<Option<Vec<u8>>>;

    async fn hset(
        &self,
        repository: &str,
        field: &str,
        value: Vec<u8>,
    ) -> repograde_storage::Result<()>;
}

/// In-process [`RemoteScoreCache`]
#[derive(Default)]
pub struct MemoryScoreCache {
    fields: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryScoreCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteScoreCache for MemoryScoreCache {
    async fn hget(
        &self,
        repository: &str,
        field: &str,
    ) -> repograde_storage::Result<Option<Vec<u8>>> {
        Ok(self
            .fields
            .lock()
            .get(&(repository.to_string(), field.to_string()))
            .cloned())
    }

    async fn hset(
        &self,
        repository: &str,
        field: &str,
        value: Vec<u8>,
    ) -> repograde_storage::Result<()> {
        self.fields
            .lock()
            .insert((repository.to_string(), field.to_string()), value);
        Ok(())
    }
}

async fn remote_field(
    cache: &dyn RemoteScoreCache,
    repository: &str,
    field: &str,
) -> Result<Vec<u8>> {
    cache.hget(repository, field).await?.ok_or_else(|| {
        OrchestratorError::missing_data(format!(
            "Not enough data to calculate the rank ({} has no {})",
            repository, field
        ))
    })
}

/// Score a repository from the remote cache and write the rank back
///
/// Lint data is not kept remotely, so the advisory weight is dropped.
pub async fn remote_score(
    engine: &RankEngine,
    cache: &dyn RemoteScoreCache,
    repository: &str,
) -> Result<Score> {
    let code_stats: CodeStats =
        codec::decode_remote(&remote_field(cache, repository, REMOTE_LOC).await?)?;
    let imports: Imports =
        codec::decode_remote(&remote_field(cache, repository, REMOTE_IMPORTS).await?)?;
    let test_results: TestResults =
        codec::decode_remote(&remote_field(cache, repository, REMOTE_TEST).await?)?;

    let score = engine.score(&RankInputs {
        code_stats: Some(&code_stats),
        imports: Some(&imports),
        test_results: Some(&test_results),
        lint_messages: None,
    })?;

    let rank = codec::gzip_compress(score.rank.as_bytes())?;
    cache.hset(repository, REMOTE_RANK, rank).await?;
    Ok(score)
}

/// Rank letter previously written by [`remote_score`]
pub async fn remote_rank(cache: &dyn RemoteScoreCache, repository: &str) -> Result<String> {
    let bytes = remote_field(cache, repository, REMOTE_RANK).await?;
    let raw = codec::gzip_decompress(&bytes)?;
    String::from_utf8(raw).map_err(|e| {
        StorageError::serialization(format!("Rank is not UTF-8: {}", e))
            .with_source(e)
            .into()
    })
}
