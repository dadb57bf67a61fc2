//! Route classification: input shaping, validation and default-filling.
//!
//! The semantic judgment (does this file change visually affect that route?)
//! is delegated to an [`AnalysisProvider`]. This module owns everything
//! around that call:
//! - bounding the diff and deduplicating changed files before the call
//! - dropping recommended routes that are absent from the known inventory
//! - filling defaults for missing priority and wait strategy
//! - enforcing login-flow completeness when any route requires auth
//!
//! Given identical provider output, post-processing is deterministic and
//! order-preserving.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::classifier::provider::AnalysisProvider;
use crate::classifier::types::{
    AnalysisRequest, ChangesetContext, Classification, RouteRecommendation, RouteSuggestion,
    WaitStrategy,
};
use crate::config;
use crate::error::{VisionError, VisionResult};

/// Classify a changeset into validated route recommendations.
///
/// Provider unavailability or malformed output fails the whole run: there is
/// no safe partial substitute for "what should be tested".
pub fn classify(
    provider: &dyn AnalysisProvider,
    context: &ChangesetContext,
) -> VisionResult<Classification> {
    let request = shape_request(context);
    debug!(
        changeset = context.changeset,
        files = request.changed_files.len(),
        routes = request.known_routes.len(),
        "requesting change analysis"
    );

    let analysis = provider.analyze(&request).map_err(|err| match err {
        VisionError::Classification(_) => err,
        other => VisionError::Classification(other.to_string()),
    })?;

    let routes = validate_routes(&analysis.routes, &context.known_routes);

    let auth_needed = routes.iter().any(|r| r.auth_required);
    if auth_needed {
        match &analysis.login_flow {
            Some(flow) if flow.is_complete() => {}
            Some(_) => {
                return Err(VisionError::Classification(
                    "auth-requiring routes recommended but login flow is incomplete".to_string(),
                ));
            }
            None => {
                return Err(VisionError::Classification(
                    "auth-requiring routes recommended but no login flow was provided".to_string(),
                ));
            }
        }
    }

    debug!(
        changeset = context.changeset,
        accepted = routes.len(),
        suggested = analysis.routes.len(),
        "classification complete"
    );

    Ok(Classification {
        changes: analysis.changes,
        routes,
        login_flow: analysis.login_flow.filter(|_| auth_needed),
        confidence: analysis.confidence.clamp(0.0, 1.0),
        reasoning: analysis.reasoning,
    })
}

/// Shape the raw changeset into the bounded request sent to the provider
fn shape_request(context: &ChangesetContext) -> AnalysisRequest {
    AnalysisRequest {
        diff: bound_diff(&context.diff, config::get().ai.max_diff_bytes),
        changed_files: dedup_preserving(&context.changed_files),
        known_routes: context.known_routes.clone(),
        project_context: context.project_context.clone(),
    }
}

/// Truncate a diff to at most `max_bytes`, on a char boundary
fn bound_diff(diff: &str, max_bytes: usize) -> String {
    if diff.len() <= max_bytes {
        return diff.to_string();
    }
    let mut cut = max_bytes;
    while cut > 0 && !diff.is_char_boundary(cut) {
        cut -= 1;
    }
    warn!(
        original = diff.len(),
        bounded = cut,
        "diff exceeds analysis bound, truncating"
    );
    format!("{}\n... [diff truncated]", &diff[..cut])
}

/// Deduplicate paths, keeping first occurrences in order
fn dedup_preserving(files: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    files
        .iter()
        .filter(|f| seen.insert(f.as_str()))
        .cloned()
        .collect()
}

/// Validate suggestions against the route inventory and fill defaults.
///
/// Unknown routes are dropped with a logged discrepancy, never a hard
/// failure. Duplicate suggestions keep their first occurrence.
fn validate_routes(
    suggestions: &[RouteSuggestion],
    known_routes: &[String],
) -> Vec<RouteRecommendation> {
    let inventory: HashSet<&str> = known_routes.iter().map(String::as_str).collect();
    let mut accepted = HashSet::new();
    let mut routes = Vec::new();

    for suggestion in suggestions {
        let route = suggestion.route.trim();
        if route.is_empty() {
            warn!("dropping suggestion with empty route");
            continue;
        }
        if !inventory.contains(route) {
            warn!(route, "dropping route absent from the known inventory");
            continue;
        }
        if !accepted.insert(route.to_string()) {
            debug!(route, "dropping duplicate route suggestion");
            continue;
        }

        routes.push(RouteRecommendation {
            route: route.to_string(),
            rationale: suggestion.rationale.clone(),
            priority: suggestion.priority.unwrap_or_default(),
            auth_required: suggestion.auth_required,
            wait: resolve_wait(suggestion),
        });
    }

    routes
}

/// Resolve a suggestion's wait strategy, defaulting to `networkidle`
fn resolve_wait(suggestion: &RouteSuggestion) -> WaitStrategy {
    match suggestion.wait.as_deref().map(str::trim) {
        Some("networkidle") | None => WaitStrategy::NetworkIdle,
        Some("domcontentloaded") => WaitStrategy::DomContentLoaded,
        Some("load") => WaitStrategy::Load,
        Some("custom") => match suggestion.custom_wait.as_deref().map(str::trim) {
            Some(expr) if !expr.is_empty() => WaitStrategy::Custom(expr.to_string()),
            _ => {
                warn!(
                    route = %suggestion.route,
                    "custom wait without an expression, using networkidle"
                );
                WaitStrategy::NetworkIdle
            }
        },
        Some(other) => {
            warn!(
                route = %suggestion.route,
                wait = other,
                "unknown wait strategy, using networkidle"
            );
            WaitStrategy::NetworkIdle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::types::{AiAnalysis, LoginFlowDescriptor, Priority};

    struct StubProvider {
        analysis: AiAnalysis,
    }

    impl AnalysisProvider for StubProvider {
        fn analyze(&self, _request: &AnalysisRequest) -> VisionResult<AiAnalysis> {
            Ok(self.analysis.clone())
        }
    }

    struct FailingProvider;

    impl AnalysisProvider for FailingProvider {
        fn analyze(&self, _request: &AnalysisRequest) -> VisionResult<AiAnalysis> {
            Err(VisionError::Io(std::io::Error::other("connection refused")))
        }
    }

    fn suggestion(route: &str) -> RouteSuggestion {
        RouteSuggestion {
            route: route.to_string(),
            rationale: String::new(),
            priority: None,
            auth_required: false,
            wait: None,
            custom_wait: None,
        }
    }

    fn context(known_routes: &[&str]) -> ChangesetContext {
        ChangesetContext::new(
            42,
            "diff --git a/src/App.vue b/src/App.vue",
            vec!["src/App.vue".into()],
            known_routes.iter().map(|r| r.to_string()).collect(),
        )
    }

    fn complete_login_flow() -> LoginFlowDescriptor {
        LoginFlowDescriptor {
            login_url: "https://app.test/login".into(),
            username_selector: "#user".into(),
            password_selector: "#pass".into(),
            submit_selector: "#submit".into(),
            success_indicator: ".dashboard".into(),
            expected_url: None,
        }
    }

    #[test]
    fn test_unknown_routes_are_dropped() {
        let provider = StubProvider {
            analysis: AiAnalysis {
                changes: vec![],
                routes: vec![suggestion("/home"), suggestion("/hallucinated")],
                login_flow: None,
                confidence: 0.9,
                reasoning: String::new(),
            },
        };

        let result = classify(&provider, &context(&["/home", "/about"])).unwrap();
        assert_eq!(result.routes.len(), 1);
        assert_eq!(result.routes[0].route, "/home");
    }

    #[test]
    fn test_defaults_filled() {
        let provider = StubProvider {
            analysis: AiAnalysis {
                changes: vec![],
                routes: vec![suggestion("/home")],
                login_flow: None,
                confidence: 1.5,
                reasoning: String::new(),
            },
        };

        let result = classify(&provider, &context(&["/home"])).unwrap();
        assert_eq!(result.routes[0].priority, Priority::Medium);
        assert_eq!(result.routes[0].wait, WaitStrategy::NetworkIdle);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let mut second = suggestion("/home");
        second.priority = Some(Priority::Low);
        let mut first = suggestion("/home");
        first.priority = Some(Priority::High);

        let provider = StubProvider {
            analysis: AiAnalysis {
                changes: vec![],
                routes: vec![first, second],
                login_flow: None,
                confidence: 0.5,
                reasoning: String::new(),
            },
        };

        let result = classify(&provider, &context(&["/home"])).unwrap();
        assert_eq!(result.routes.len(), 1);
        assert_eq!(result.routes[0].priority, Priority::High);
    }

    #[test]
    fn test_auth_without_login_flow_is_hard_error() {
        let mut auth_route = suggestion("/account");
        auth_route.auth_required = true;

        let provider = StubProvider {
            analysis: AiAnalysis {
                changes: vec![],
                routes: vec![auth_route],
                login_flow: None,
                confidence: 0.9,
                reasoning: String::new(),
            },
        };

        let err = classify(&provider, &context(&["/account"])).unwrap_err();
        assert!(matches!(err, VisionError::Classification(_)));
    }

    #[test]
    fn test_auth_with_complete_login_flow() {
        let mut auth_route = suggestion("/account");
        auth_route.auth_required = true;

        let provider = StubProvider {
            analysis: AiAnalysis {
                changes: vec![],
                routes: vec![auth_route],
                login_flow: Some(complete_login_flow()),
                confidence: 0.9,
                reasoning: String::new(),
            },
        };

        let result = classify(&provider, &context(&["/account"])).unwrap();
        assert!(result.login_flow.is_some());
    }

    #[test]
    fn test_provider_failure_becomes_classification_error() {
        let err = classify(&FailingProvider, &context(&["/home"])).unwrap_err();
        assert!(matches!(err, VisionError::Classification(_)));
        assert!(err.is_run_fatal());
    }

    #[test]
    fn test_custom_wait_resolution() {
        let mut custom = suggestion("/dashboard");
        custom.wait = Some("custom".into());
        custom.custom_wait = Some("() => window.chartsReady".into());

        let mut custom_missing_expr = suggestion("/reports");
        custom_missing_expr.wait = Some("custom".into());

        assert_eq!(
            resolve_wait(&custom),
            WaitStrategy::Custom("() => window.chartsReady".into())
        );
        assert_eq!(resolve_wait(&custom_missing_expr), WaitStrategy::NetworkIdle);
    }

    #[test]
    fn test_bound_diff_char_boundary() {
        let diff = "héllo".repeat(100);
        let bounded = bound_diff(&diff, 7);
        assert!(bounded.starts_with("héllo"));
        assert!(bounded.ends_with("[diff truncated]"));
    }

    #[test]
    fn test_dedup_preserving_order() {
        let files = vec![
            "src/a.ts".to_string(),
            "src/b.ts".to_string(),
            "src/a.ts".to_string(),
        ];
        assert_eq!(dedup_preserving(&files), vec!["src/a.ts", "src/b.ts"]);
    }
}
