//! Repository data categories
//!
//! Wire names follow the analysis producers' JSON (`checklist.Passed[].Desc`,
//! `packages[].execution_time`, ...), so payloads decode without adapters.

use chrono::{DateTime, Utc};
use repograde_storage::{codec, Category, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Distinct third-party import path prefixes, sorted
pub type Imports = Vec<String>;

/// Line counts per language/category label (`loc`, `cloc`, `ncloc`, `test`, ...)
pub type CodeStats = BTreeMap<String, u64>;

/// Findings keyed by linter name
pub type LintMessages = BTreeMap<String, Vec<LintFinding>>;

/// Labels the rank engine reads from [`CodeStats`]
pub mod stats {
    pub const LOC: &str = "loc";
    pub const CLOC: &str = "cloc";
    pub const TEST: &str = "test";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Desc")]
    pub desc: String,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    #[serde(rename = "Failed", default)]
    pub failed: Vec<ChecklistItem>,
    #[serde(rename = "Passed", default)]
    pub passed: Vec<ChecklistItem>,
}

impl Checklist {
    /// Share of passed assertions, `0.0` when the checklist is empty
    pub fn pass_ratio(&self) -> f64 {
        let total = self.failed.len() + self.passed.len();
        if total == 0 {
            0.0
        } else {
            self.passed.len() as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageResult {
    pub name: String,
    pub success: bool,
    /// Coverage percentage, `0.0..=100.0`
    pub coverage: f64,
    /// Seconds
    pub execution_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    #[serde(default)]
    pub checklist: Checklist,
    #[serde(default)]
    pub packages: Vec<PackageResult>,
}

impl TestResults {
    pub fn mean_coverage(&self) -> f64 {
        if self.packages.is_empty() {
            return 0.0;
        }
        self.packages.iter().map(|p| p.coverage).sum::<f64>() / self.packages.len() as f64
    }

    pub fn success_ratio(&self) -> f64 {
        if self.packages.is_empty() {
            return 0.0;
        }
        let passed = self.packages.iter().filter(|p| p.success).count();
        passed as f64 / self.packages.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintFinding {
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub image: String,
    pub description: String,
    pub stars: u64,
    pub last_push: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetail {
    pub name: String,
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    pub rank: String,
    #[serde(default)]
    pub details: Vec<ScoreDetail>,
}

/// Wall-clock duration of the refresh that produced the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTime {
    pub milliseconds: u64,
}

impl ExecutionTime {
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            milliseconds: duration.as_millis() as u64,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.milliseconds)
    }
}

impl fmt::Display for ExecutionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.milliseconds as f64 / 1000.0)
    }
}

/// One category's value, tagged by category
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CategoryValue {
    Imports(Imports),
    CodeStats(CodeStats),
    TestResults(TestResults),
    LintMessages(LintMessages),
    Score(Score),
    Metadata(Metadata),
    LastUpdate(DateTime<Utc>),
    ExecutionTime(ExecutionTime),
}

impl CategoryValue {
    pub fn category(&self) -> Category {
        match self {
            CategoryValue::Imports(_) => Category::Imports,
            CategoryValue::CodeStats(_) => Category::CodeStats,
            CategoryValue::TestResults(_) => Category::TestResults,
            CategoryValue::LintMessages(_) => Category::LintMessages,
            CategoryValue::Score(_) => Category::Score,
            CategoryValue::Metadata(_) => Category::Metadata,
            CategoryValue::LastUpdate(_) => Category::LastUpdate,
            CategoryValue::ExecutionTime(_) => Category::ExecutionTime,
        }
    }

    /// Stored representation: the inner value as a JSON document
    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        codec::encode(self)
    }

    pub fn decode(category: Category, bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(match category {
            Category::Imports => CategoryValue::Imports(codec::decode(bytes)?),
            Category::CodeStats => CategoryValue::CodeStats(codec::decode(bytes)?),
            Category::TestResults => CategoryValue::TestResults(codec::decode(bytes)?),
            Category::LintMessages => CategoryValue::LintMessages(codec::decode(bytes)?),
            Category::Score => CategoryValue::Score(codec::decode(bytes)?),
            Category::Metadata => CategoryValue::Metadata(codec::decode(bytes)?),
            Category::LastUpdate => CategoryValue::LastUpdate(codec::decode(bytes)?),
            Category::ExecutionTime => CategoryValue::ExecutionTime(codec::decode(bytes)?),
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value, StorageError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Collapse imports sharing their first three path segments
///
/// One repository is one dependency: `host.com/org/a/sub1` and
/// `host.com/org/a/sub2` both become `host.com/org/a`. Shorter paths are kept
/// as is. The result is sorted and distinct.
pub fn dedupe_imports<S: AsRef<str>>(raw: &[S]) -> Imports {
    raw.iter()
        .map(|import| {
            let import = import.as_ref();
            let segments: Vec<&str> = import.splitn(4, '/').collect();
            if segments.len() >= 3 && segments[..3].iter().all(|s| !s.is_empty()) {
                segments[..3].join("/")
            } else {
                import.to_string()
            }
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Drop findings from linters outside the allow-list
pub fn filter_lint_messages(raw: LintMessages, linters: &[String]) -> LintMessages {
    raw.into_iter()
        .filter(|(linter, _)| linters.iter().any(|allowed| allowed == linter))
        .collect()
}

/// Apply the per-category normalization to a freshly produced value
pub fn normalize(value: CategoryValue, linters: &[String]) -> CategoryValue {
    match value {
        CategoryValue::Imports(imports) => CategoryValue::Imports(dedupe_imports(&imports)),
        CategoryValue::LintMessages(messages) => {
            CategoryValue::LintMessages(filter_lint_messages(messages, linters))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn sample_test_results() -> TestResults {
        TestResults {
            checklist: Checklist {
                failed: vec![ChecklistItem {
                    category: "minimumCriteria".to_string(),
                    desc: "Has a README".to_string(),
                    name: "hasReadme".to_string(),
                }],
                passed: vec![
                    ChecklistItem {
                        category: "minimumCriteria".to_string(),
                        desc: "Is formatted".to_string(),
                        name: "isFormatted".to_string(),
                    },
                    ChecklistItem {
                        category: "goodPractices".to_string(),
                        desc: "Has tests".to_string(),
                        name: "hasTests".to_string(),
                    },
                ],
            },
            packages: vec![
                PackageResult {
                    name: "github.com/org/project".to_string(),
                    success: true,
                    coverage: 80.0,
                    execution_time: 1.25,
                },
                PackageResult {
                    name: "github.com/org/project/sub".to_string(),
                    success: false,
                    coverage: 40.0,
                    execution_time: 0.5,
                },
            ],
        }
    }

    fn roundtrip(value: CategoryValue) {
        let bytes = value.encode().unwrap();
        let back = CategoryValue::decode(value.category(), &bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_roundtrip_every_category() {
        let mut lint = LintMessages::new();
        lint.insert(
            "golint".to_string(),
            vec![LintFinding {
                path: "main.go".to_string(),
                line: 12,
                column: 3,
                severity: "warning".to_string(),
                message: "exported function should have comment".to_string(),
            }],
        );
        let mut stats = CodeStats::new();
        stats.insert("loc".to_string(), 1200);
        stats.insert("test".to_string(), 300);

        roundtrip(CategoryValue::Imports(vec!["github.com/pkg/errors".to_string()]));
        roundtrip(CategoryValue::CodeStats(stats));
        roundtrip(CategoryValue::TestResults(sample_test_results()));
        roundtrip(CategoryValue::LintMessages(lint));
        roundtrip(CategoryValue::Score(Score {
            value: 72.5,
            rank: "B+".to_string(),
            details: vec![ScoreDetail {
                name: "tests".to_string(),
                score: 68.0,
                weight: 0.4,
            }],
        }));
        roundtrip(CategoryValue::Metadata(Metadata {
            image: "https://avatars.example/u/1".to_string(),
            description: "A project".to_string(),
            stars: 42,
            last_push: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }));
        roundtrip(CategoryValue::LastUpdate(
            Utc.with_ymd_and_hms(2024, 3, 2, 8, 30, 0).unwrap(),
        ));
        roundtrip(CategoryValue::ExecutionTime(ExecutionTime { milliseconds: 4321 }));
    }

    #[test]
    fn test_roundtrip_empty_values() {
        roundtrip(CategoryValue::Imports(vec![]));
        roundtrip(CategoryValue::CodeStats(CodeStats::new()));
        roundtrip(CategoryValue::TestResults(TestResults::default()));
        roundtrip(CategoryValue::LintMessages(LintMessages::new()));
    }

    #[test]
    fn test_decode_producer_wire_format() {
        let raw = br#"{
            "checklist": {"Passed": [{"Category": "c", "Desc": "d", "Name": "n"}]},
            "packages": [{"name": "p", "success": true, "coverage": 55.5, "execution_time": 0.1}]
        }"#;
        let value = CategoryValue::decode(Category::TestResults, raw).unwrap();
        let CategoryValue::TestResults(results) = value else {
            panic!("Expected TestResults");
        };
        assert!(results.checklist.failed.is_empty());
        assert_eq!(results.checklist.passed[0].desc, "d");
        assert_eq!(results.packages[0].coverage, 55.5);
    }

    #[test]
    fn test_decode_wrong_shape_is_serialization_error() {
        let err = CategoryValue::decode(Category::CodeStats, br#"["not", "a", "map"]"#).unwrap_err();
        assert!(err.is_decode_failure());
    }

    #[test]
    fn test_dedupe_imports_law() {
        let raw = ["host.com/org/a/sub1", "host.com/org/a/sub2", "other.com/pkg"];
        let deduped = dedupe_imports(&raw);
        assert_eq!(deduped.len(), 2);

        let set: HashSet<&str> = deduped.iter().map(String::as_str).collect();
        assert_eq!(set, HashSet::from(["host.com/org/a", "other.com/pkg"]));
    }

    #[test]
    fn test_dedupe_imports_keeps_exact_three_segments() {
        let deduped = dedupe_imports(&["github.com/pkg/errors", "github.com/pkg/errors"]);
        assert_eq!(deduped, vec!["github.com/pkg/errors".to_string()]);
    }

    #[test]
    fn test_filter_lint_messages() {
        let mut raw = LintMessages::new();
        raw.insert("golint".to_string(), vec![]);
        raw.insert("megacheck".to_string(), vec![]);

        let filtered = filter_lint_messages(raw, &["golint".to_string(), "vet".to_string()]);
        assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["golint"]);
    }

    #[test]
    fn test_test_results_ratios() {
        let results = sample_test_results();
        assert!((results.mean_coverage() - 60.0).abs() < f64::EPSILON);
        assert!((results.success_ratio() - 0.5).abs() < f64::EPSILON);
        assert!((results.checklist.pass_ratio() - 2.0 / 3.0).abs() < 1e-9);

        let empty = TestResults::default();
        assert_eq!(empty.mean_coverage(), 0.0);
        assert_eq!(empty.success_ratio(), 0.0);
        assert_eq!(empty.checklist.pass_ratio(), 0.0);
    }

    #[test]
    fn test_execution_time_display() {
        let et = ExecutionTime::from_duration(Duration::from_millis(1500));
        assert_eq!(et.to_string(), "1.500s");
        assert_eq!(et.as_duration(), Duration::from_millis(1500));
    }
}
