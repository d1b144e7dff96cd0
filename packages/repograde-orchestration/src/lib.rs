/*
 * Repograde Orchestration - Repository Quality Aggregation
 *
 * Fans out to analysis producers, caches every data category under its own
 * key and derives a letter rank from the complete set.
 *
 * Architecture:
 * - Repository Record (lazy, store-backed)
 * - Aggregation Orchestrator (bounded concurrent collection)
 * - Refresh State Machine
 * - Rank Engine (deterministic policy)
 * - Service facade + CLI
 */

// Public modules
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod producer;
pub mod rank;
pub mod record;
pub mod refresh;
pub mod service;
pub mod source;

// Re-exports
pub use config::{ConfigError, ServiceConfig};
pub use error::{CategoryError, ErrorCategory, OrchestratorError, Result};
pub use model::{
    CategoryValue, Checklist, ChecklistItem, CodeStats, ExecutionTime, Imports, LintFinding,
    LintMessages, Metadata, PackageResult, Score, ScoreDetail, TestResults,
};
pub use orchestrator::{AggregationOrchestrator, AggregationReport, DEFAULT_COLLECTION_TIMEOUT};
pub use producer::{FetchParams, ProducerError, ProducerGateway};
pub use rank::{cached_rank, rank_for, MemoryScoreCache, RankEngine, RankInputs, RemoteScoreCache};
pub use record::{cached_document, RecordContext, RecordData, RepositoryRecord};
pub use refresh::{Refresh, RefreshState, RefreshStateMachine};
pub use service::{Badge, RepositoryService};
pub use source::{
    RepositoryInfo, SourceError, SourceHost, ValidatedRepository, ValidationError,
};
