//! Types for run results and the run-level reduction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compare::ComparisonOutcome;
use crate::error::VisionResult;

/// Result of testing a single route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTestOutcome {
    /// Route that was tested
    pub route: String,

    /// Screenshot name used for baseline identity
    pub screenshot_name: String,

    /// Whether the route passed
    pub passed: bool,

    /// Comparison details, absent when no comparison ran
    pub comparison: Option<ComparisonOutcome>,

    /// Execution error, absent when the route ran to a verdict
    pub error: Option<String>,

    /// Whether this run created the baseline (bootstrap case)
    pub baseline_created: bool,

    /// Path of the baseline image compared against (or created)
    pub baseline_path: Option<PathBuf>,

    /// Path of the captured actual image
    pub actual_path: Option<PathBuf>,

    /// Path of the rendered diff artifact, when one was produced
    pub diff_path: Option<PathBuf>,
}

impl RouteTestOutcome {
    /// A route that failed to execute. An execution error is always a
    /// failure, even when no comparison ran.
    pub fn failed(route: &str, screenshot_name: &str, error: String) -> Self {
        Self {
            route: route.to_string(),
            screenshot_name: screenshot_name.to_string(),
            passed: false,
            comparison: None,
            error: Some(error),
            baseline_created: false,
            baseline_path: None,
            actual_path: None,
            diff_path: None,
        }
    }

    /// A first-ever run for this key: the capture became the baseline and
    /// the route passes with no comparison.
    pub fn bootstrap(
        route: &str,
        screenshot_name: &str,
        baseline_path: PathBuf,
        actual_path: Option<PathBuf>,
    ) -> Self {
        Self {
            route: route.to_string(),
            screenshot_name: screenshot_name.to_string(),
            passed: true,
            comparison: None,
            error: None,
            baseline_created: true,
            baseline_path: Some(baseline_path),
            actual_path,
            diff_path: None,
        }
    }

    /// A route that ran to a comparison verdict
    pub fn compared(
        route: &str,
        screenshot_name: &str,
        comparison: ComparisonOutcome,
        baseline_path: PathBuf,
        actual_path: Option<PathBuf>,
        diff_path: Option<PathBuf>,
    ) -> Self {
        Self {
            route: route.to_string(),
            screenshot_name: screenshot_name.to_string(),
            passed: comparison.matches,
            comparison: Some(comparison),
            error: None,
            baseline_created: false,
            baseline_path: Some(baseline_path),
            actual_path,
            diff_path,
        }
    }
}

/// Result of a complete visual regression run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Changeset under test
    pub changeset: u64,

    /// URL the application was tested against
    pub test_url: String,

    /// Overall verdict: every route passed and at least one route ran
    pub passed: bool,

    /// Number of routes tested
    pub total_tests: usize,

    /// Number of passing routes
    pub passed_tests: usize,

    /// Number of failing routes
    pub failed_tests: usize,

    /// Per-route outcomes in classifier order (not completion order)
    pub results: Vec<RouteTestOutcome>,

    /// When the run started
    #[serde(with = "chrono::serde::ts_seconds")]
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the whole fan-out in milliseconds
    pub duration_ms: u64,

    /// Path of the persisted report, when one was written
    pub report_path: Option<PathBuf>,
}

impl RunResult {
    /// Persist the result as pretty JSON
    pub fn write_report(&self, path: &Path) -> VisionResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Reduce per-route outcomes into the run-level result.
///
/// Zero routes tested is a failure state, not a vacuous success. Duration is
/// the wall-clock span of the fan-out, not the sum of per-route durations.
pub fn aggregate(
    changeset: u64,
    test_url: &str,
    results: Vec<RouteTestOutcome>,
    started_at: DateTime<Utc>,
    duration: Duration,
) -> RunResult {
    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    RunResult {
        changeset,
        test_url: test_url.to_string(),
        passed: total_tests > 0 && passed_tests == total_tests,
        total_tests,
        passed_tests,
        failed_tests: total_tests - passed_tests,
        results,
        started_at,
        duration_ms: duration.as_millis() as u64,
        report_path: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn passing(route: &str) -> RouteTestOutcome {
        RouteTestOutcome {
            route: route.to_string(),
            screenshot_name: route.trim_matches('/').to_string(),
            passed: true,
            comparison: None,
            error: None,
            baseline_created: true,
            baseline_path: None,
            actual_path: None,
            diff_path: None,
        }
    }

    #[test]
    fn test_zero_routes_is_failure() {
        let result = aggregate(1, "http://localhost", Vec::new(), Utc::now(), Duration::ZERO);
        assert!(!result.passed);
        assert_eq!(result.total_tests, 0);
        assert_eq!(result.failed_tests, 0);
    }

    #[test]
    fn test_all_passing() {
        let outcomes = vec![passing("/a"), passing("/b"), passing("/c")];
        let result = aggregate(1, "http://localhost", outcomes, Utc::now(), Duration::ZERO);

        assert!(result.passed);
        assert_eq!(result.total_tests, 3);
        assert_eq!(result.passed_tests, 3);
        assert_eq!(result.failed_tests, 0);
    }

    #[test]
    fn test_single_failure_fails_run() {
        let mut outcomes = vec![passing("/a"), passing("/b")];
        outcomes.push(RouteTestOutcome::failed("/c", "c", "tab crashed".into()));

        let result = aggregate(1, "http://localhost", outcomes, Utc::now(), Duration::ZERO);
        assert!(!result.passed);
        assert_eq!(result.failed_tests, 1);
        assert_eq!(result.results[2].error.as_deref(), Some("tab crashed"));
    }

    #[test]
    fn test_result_order_is_preserved() {
        let outcomes = vec![passing("/b"), passing("/a")];
        let result = aggregate(1, "http://localhost", outcomes, Utc::now(), Duration::ZERO);
        let order: Vec<&str> = result.results.iter().map(|r| r.route.as_str()).collect();
        assert_eq!(order, vec!["/b", "/a"]);
    }

    #[test]
    fn test_report_serde_camel_case() {
        let result = aggregate(
            9,
            "http://localhost:3000",
            vec![passing("/home")],
            Utc::now(),
            Duration::from_millis(1234),
        );

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"testUrl\""));
        assert!(json.contains("\"totalTests\""));
        assert!(json.contains("\"durationMs\":1234"));
        assert!(json.contains("\"baselineCreated\":true"));

        let parsed: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert!(parsed.passed);
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let result = aggregate(2, "http://localhost", vec![passing("/a")], Utc::now(), Duration::ZERO);

        result.write_report(&path).unwrap();
        let parsed: RunResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.changeset, 2);
    }
}
