//! Web Vision - changeset-aware visual regression testing for web applications.
//!
//! This crate provides:
//! - AI-assisted route classification for code-review changesets
//! - Versioned baseline screenshot storage per changeset/route/viewport
//! - Deterministic pixel comparison with rendered diff artifacts
//! - Concurrent route execution with partial-failure isolation
//! - Run-level aggregation into a serializable report
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use web_vision::{
//!     ChangesetContext, Coordinator, FsBaselineStore, HttpAnalysisProvider, MockBrowser,
//!     RunConfig, classify,
//! };
//!
//! let context = ChangesetContext::new(
//!     1421,
//!     "diff --git a/src/Cart.vue b/src/Cart.vue",
//!     vec!["src/Cart.vue".to_string()],
//!     vec!["/cart".to_string(), "/checkout".to_string()],
//! );
//!
//! let classification = classify(&HttpAnalysisProvider::default(), &context).unwrap();
//!
//! let coordinator = Coordinator::new(
//!     Arc::new(MockBrowser::new()),
//!     Arc::new(FsBaselineStore::from_config()),
//!     RunConfig::new(1421, "http://localhost:3000"),
//! );
//! let result = coordinator.run(&classification).unwrap();
//! println!("passed: {} ({}/{})", result.passed, result.passed_tests, result.total_tests);
//! ```

pub mod baseline;
pub mod classifier;
pub mod compare;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod report;
pub mod session;

// Re-export error types
pub use error::{VisionError, VisionResult};

// Re-export classifier types and entry points
pub use classifier::{
    AnalysisProvider, ChangesetContext, Classification, HttpAnalysisProvider,
    LoginFlowDescriptor, Priority, RouteRecommendation, VisualChange, WaitStrategy, classify,
};

// Re-export baseline storage
pub use baseline::{BaselineManifest, BaselineRecord, BaselineStore, FsBaselineStore, Viewport};

// Re-export the comparator
pub use compare::{ComparisonOutcome, compare, write_diff_artifact};

// Re-export the execution coordinator
pub use coordinator::{
    CancelToken, CaptureCapability, CaptureRequest, Coordinator, MockBrowser, PixelCanvas,
    RouteState, RunConfig, SessionHandle,
};

// Re-export run results and aggregation
pub use report::{RouteTestOutcome, RunResult, aggregate};

// Re-export session management
pub use session::{Session, cleanup_old_sessions, list_sessions};
