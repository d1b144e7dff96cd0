use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use repograde_storage::{Category, RepositoryId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Refresh state (one per aggregation request)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefreshState {
    Dispatched {
        dispatched_at: DateTime<Utc>,
        pending: Vec<Category>,
        cached: Vec<Category>,
    },
    Collecting {
        started_at: DateTime<Utc>,
        pending: Vec<Category>,
    },
    Merged {
        merged_at: DateTime<Utc>,
        failed: Vec<Category>,
    },
    Scored {
        scored_at: DateTime<Utc>,
        rank: String,
    },
    Persisted {
        persisted_at: DateTime<Utc>,
        duration_ms: u64,
        write_failures: usize,
    },
    PartialFailure {
        finished_at: DateTime<Utc>,
        duration_ms: u64,
        failed: Vec<Category>,
    },
}

impl RefreshState {
    pub fn state_name(&self) -> &'static str {
        match self {
            RefreshState::Dispatched { .. } => "dispatched",
            RefreshState::Collecting { .. } => "collecting",
            RefreshState::Merged { .. } => "merged",
            RefreshState::Scored { .. } => "scored",
            RefreshState::Persisted { .. } => "persisted",
            RefreshState::PartialFailure { .. } => "partial_failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefreshState::Persisted { .. } | RefreshState::PartialFailure { .. }
        )
    }
}

impl std::fmt::Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.state_name())
    }
}

/// One aggregation run
#[derive(Debug, Clone)]
pub struct Refresh {
    pub id: Uuid,
    pub repository: RepositoryId,
    pub state: RefreshState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refresh {
    pub fn new_dispatched(
        repository: RepositoryId,
        pending: Vec<Category>,
        cached: Vec<Category>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repository,
            state: RefreshState::Dispatched {
                dispatched_at: now,
                pending,
                cached,
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// Milliseconds since dispatch
    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.created_at).num_milliseconds().max(0) as u64
    }
}

/// Refresh state machine for transitions
pub struct RefreshStateMachine {
    refresh: Refresh,
}

impl RefreshStateMachine {
    pub fn new(refresh: Refresh) -> Self {
        Self { refresh }
    }

    pub fn refresh(&self) -> &Refresh {
        &self.refresh
    }

    pub fn into_refresh(self) -> Refresh {
        self.refresh
    }

    /// Transition: DISPATCHED → COLLECTING
    pub fn collect(&mut self) -> Result<()> {
        match &self.refresh.state {
            RefreshState::Dispatched { pending, .. } => {
                let now = Utc::now();
                self.refresh.state = RefreshState::Collecting {
                    started_at: now,
                    pending: pending.clone(),
                };
                self.refresh.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid("collecting")),
        }
    }

    /// Transition: COLLECTING → MERGED
    pub fn merge(&mut self, failed: Vec<Category>) -> Result<()> {
        match &self.refresh.state {
            RefreshState::Collecting { .. } => {
                let now = Utc::now();
                self.refresh.state = RefreshState::Merged {
                    merged_at: now,
                    failed,
                };
                self.refresh.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid("merged")),
        }
    }

    /// Transition: MERGED → SCORED (only with a clean merge)
    pub fn score(&mut self, rank: String) -> Result<()> {
        match &self.refresh.state {
            RefreshState::Merged { failed, .. } if failed.is_empty() => {
                let now = Utc::now();
                self.refresh.state = RefreshState::Scored {
                    scored_at: now,
                    rank,
                };
                self.refresh.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid("scored")),
        }
    }

    /// Transition: SCORED → PERSISTED
    pub fn persist(&mut self, write_failures: usize) -> Result<()> {
        match &self.refresh.state {
            RefreshState::Scored { .. } => {
                let now = Utc::now();
                self.refresh.state = RefreshState::Persisted {
                    persisted_at: now,
                    duration_ms: self.refresh.elapsed_ms(),
                    write_failures,
                };
                self.refresh.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid("persisted")),
        }
    }

    /// Transition: MERGED | SCORED → PARTIAL_FAILURE
    pub fn fail(&mut self, failed: Vec<Category>) -> Result<()> {
        match &self.refresh.state {
            RefreshState::Merged { .. } | RefreshState::Scored { .. } => {
                let now = Utc::now();
                self.refresh.state = RefreshState::PartialFailure {
                    finished_at: now,
                    duration_ms: self.refresh.elapsed_ms(),
                    failed,
                };
                self.refresh.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid("partial_failure")),
        }
    }

    fn invalid(&self, to: &str) -> OrchestratorError {
        OrchestratorError::InvalidStateTransition {
            from: self.refresh.state.state_name().to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> RefreshStateMachine {
        let refresh = Refresh::new_dispatched(
            RepositoryId::default_branch("github.com/org/project"),
            vec![Category::Imports, Category::TestResults],
            vec![Category::CodeStats, Category::LintMessages],
        );
        RefreshStateMachine::new(refresh)
    }

    #[test]
    fn test_happy_path_ends_persisted() {
        let mut sm = machine();

        sm.collect().unwrap();
        sm.merge(vec![]).unwrap();
        sm.score("B+".to_string()).unwrap();
        sm.persist(0).unwrap();

        assert!(sm.refresh().state.is_terminal());
        assert!(matches!(
            sm.refresh().state,
            RefreshState::Persisted {
                write_failures: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_merge_cannot_be_scored() {
        let mut sm = machine();
        sm.collect().unwrap();
        sm.merge(vec![Category::TestResults]).unwrap();

        let err = sm.score("A".to_string()).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidStateTransition { .. }));

        sm.fail(vec![Category::TestResults, Category::Score]).unwrap();
        match &sm.refresh().state {
            RefreshState::PartialFailure { failed, .. } => {
                assert_eq!(failed, &vec![Category::TestResults, Category::Score]);
            }
            other => panic!("Expected PartialFailure, got {}", other),
        }
    }

    #[test]
    fn test_persisted_requires_scored() {
        let mut sm = machine();
        assert!(sm.persist(0).is_err());

        sm.collect().unwrap();
        assert!(sm.collect().is_err());
        sm.merge(vec![]).unwrap();
        assert!(sm.persist(0).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut sm = machine();
        sm.collect().unwrap();
        sm.merge(vec![Category::Imports]).unwrap();
        sm.fail(vec![Category::Imports]).unwrap();

        assert!(sm.fail(vec![]).is_err());
        assert!(sm.collect().is_err());
        assert_eq!(sm.refresh().state.state_name(), "partial_failure");
    }

    #[test]
    fn test_state_serde_is_tagged() {
        let sm = machine();
        let json = serde_json::to_value(&sm.refresh().state).unwrap();
        assert_eq!(json["type"], "dispatched");
        assert_eq!(json["pending"][0], "imports");
    }
}
