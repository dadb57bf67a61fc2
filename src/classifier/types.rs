// Core types for changeset classification

use serde::{Deserialize, Serialize};

/// The change under test: one pull request / changeset.
///
/// Immutable input to classification; built once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesetContext {
    /// Changeset / pull request number
    pub changeset: u64,

    /// Unified diff body
    pub diff: String,

    /// Paths of changed files
    pub changed_files: Vec<String>,

    /// Known route inventory of the application under test
    pub known_routes: Vec<String>,

    /// Optional free-text project context for the analysis service
    pub project_context: Option<String>,
}

impl ChangesetContext {
    /// Create a context for a changeset
    pub fn new(
        changeset: u64,
        diff: impl Into<String>,
        changed_files: Vec<String>,
        known_routes: Vec<String>,
    ) -> Self {
        Self {
            changeset,
            diff: diff.into(),
            changed_files,
            known_routes,
            project_context: None,
        }
    }

    /// Attach free-text project context
    pub fn with_project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }
}

/// Category of a changed source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    Component,
    Store,
    Util,
    Route,
    Layout,
    Style,
    Other,
}

impl Default for ChangeCategory {
    fn default() -> Self {
        ChangeCategory::Other
    }
}

// Manual implementation so unrecognized categories from the analysis
// service deserialize as Other instead of failing the whole payload.
impl<'de> Deserialize<'de> for ChangeCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(match name.as_str() {
            "component" => ChangeCategory::Component,
            "store" => ChangeCategory::Store,
            "util" => ChangeCategory::Util,
            "route" => ChangeCategory::Route,
            "layout" => ChangeCategory::Layout,
            "style" => ChangeCategory::Style,
            _ => ChangeCategory::Other,
        })
    }
}

/// Classification of one changed source unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualChange {
    /// Changed file path
    pub file: String,

    /// Change category
    #[serde(default)]
    pub category: ChangeCategory,

    /// Whether the change has visual impact
    #[serde(default)]
    pub visual_impact: bool,

    /// Free-text rationale from the analysis service
    #[serde(default)]
    pub rationale: String,

    /// Identifiers of affected UI elements, if known
    #[serde(default)]
    pub affected_elements: Vec<String>,
}

/// Testing priority of a recommended route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Scheduling rank: lower runs earlier under priority-first scheduling
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Page-readiness condition to satisfy before capturing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    NetworkIdle,
    DomContentLoaded,
    Load,
    /// Custom wait expression, evaluated by the capture capability
    Custom(String),
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::NetworkIdle
    }
}

/// A validated route to test, with execution hints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecommendation {
    /// Route path within the application
    pub route: String,

    /// Why this route was recommended
    pub rationale: String,

    /// Testing priority (informational unless priority-first scheduling is on)
    pub priority: Priority,

    /// Whether the route requires an authenticated session
    pub auth_required: bool,

    /// Wait strategy applied before capture
    pub wait: WaitStrategy,
}

/// Login-flow descriptor shared by all auth-requiring routes in a run.
///
/// All five required fields must be non-empty whenever any recommended route
/// requires authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginFlowDescriptor {
    /// URL of the login page
    #[serde(default)]
    pub login_url: String,

    /// CSS selector for the username field
    #[serde(default)]
    pub username_selector: String,

    /// CSS selector for the password field
    #[serde(default)]
    pub password_selector: String,

    /// CSS selector for the submit control
    #[serde(default)]
    pub submit_selector: String,

    /// Selector or condition indicating a successful login
    #[serde(default)]
    pub success_indicator: String,

    /// Expected URL after login, if any
    #[serde(default)]
    pub expected_url: Option<String>,
}

impl LoginFlowDescriptor {
    /// Whether all required fields are present
    pub fn is_complete(&self) -> bool {
        !self.login_url.is_empty()
            && !self.username_selector.is_empty()
            && !self.password_selector.is_empty()
            && !self.submit_selector.is_empty()
            && !self.success_indicator.is_empty()
    }
}

/// Raw route suggestion as returned by the analysis service.
///
/// Priority and wait strategy may be absent; classification fills defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSuggestion {
    /// Suggested route path
    pub route: String,

    /// Why this route was suggested
    #[serde(default)]
    pub rationale: String,

    /// Suggested priority, if any
    #[serde(default)]
    pub priority: Option<Priority>,

    /// Whether the route requires authentication
    #[serde(default)]
    pub auth_required: bool,

    /// Wait strategy name (`networkidle`, `domcontentloaded`, `load`, `custom`)
    #[serde(default)]
    pub wait: Option<String>,

    /// Custom wait expression when `wait` is `custom`
    #[serde(default)]
    pub custom_wait: Option<String>,
}

/// Raw output of the analysis service, prior to validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    /// Per-file change classifications
    #[serde(default)]
    pub changes: Vec<VisualChange>,

    /// Suggested routes to test
    #[serde(default)]
    pub routes: Vec<RouteSuggestion>,

    /// Login flow, when any suggested route requires auth
    #[serde(default)]
    pub login_flow: Option<LoginFlowDescriptor>,

    /// Self-reported confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,

    /// Free-text reasoning
    #[serde(default)]
    pub reasoning: String,
}

/// Shaped input handed to the analysis capability
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    /// Diff text, bounded to the configured size
    pub diff: String,

    /// Deduplicated changed file paths
    pub changed_files: Vec<String>,

    /// Known route inventory
    pub known_routes: Vec<String>,

    /// Optional project context
    pub project_context: Option<String>,
}

/// Validated classification result consumed by the coordinator
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    /// Per-file change classifications
    pub changes: Vec<VisualChange>,

    /// Validated, default-filled route recommendations in suggestion order
    pub routes: Vec<RouteRecommendation>,

    /// Login flow shared by auth-requiring routes
    pub login_flow: Option<LoginFlowDescriptor>,

    /// Confidence clamped into [0, 1]
    pub confidence: f64,

    /// Free-text reasoning from the analysis service
    pub reasoning: String,
}
