//! Execution coordination: concurrent route fan-out with partial-failure
//! isolation.
//!
//! Each route runs through the state machine
//! `Pending -> (LoggingIn -> LoggedIn)? -> Navigating -> Waiting ->
//! Capturing -> Comparing -> {Passed, Failed}` on a bounded pool of worker
//! threads. Login happens at most once per run behind a shared barrier;
//! unauthenticated routes never wait on it. Workers claim schedule positions
//! from an atomic cursor and deliver outcomes tagged with their result slot
//! over a channel, so the final result order is the classifier order no
//! matter how workers interleave.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::baseline::{BaselineStore, Viewport, sanitize_route};
use crate::classifier::{Classification, LoginFlowDescriptor, RouteRecommendation};
use crate::compare;
use crate::config;
use crate::coordinator::capture::{CaptureCapability, CaptureRequest, SessionHandle};
use crate::error::{VisionError, VisionResult};
use crate::report::{self, RouteTestOutcome, RunResult};
use crate::session::{ArtifactKind, Session};

/// Shareable cancellation handle for a run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. In-flight routes stop at their next checkpoint;
    /// no new route executions are started.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-route execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Pending,
    LoggingIn,
    LoggedIn,
    Navigating,
    Waiting,
    Capturing,
    Comparing,
    Passed,
    Failed,
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RouteState::Pending => "pending",
            RouteState::LoggingIn => "logging-in",
            RouteState::LoggedIn => "logged-in",
            RouteState::Navigating => "navigating",
            RouteState::Waiting => "waiting",
            RouteState::Capturing => "capturing",
            RouteState::Comparing => "comparing",
            RouteState::Passed => "passed",
            RouteState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Configuration for one visual regression run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Changeset under test
    pub changeset: u64,

    /// Base URL of the application under test
    pub test_url: String,

    /// Viewport for every capture in the run
    pub viewport: Viewport,

    /// Diff threshold (0.0 - 1.0)
    pub threshold: f64,

    /// Maximum concurrent route executions
    pub max_concurrent: usize,

    /// Per-route execution ceiling (login excluded)
    pub route_timeout: Duration,

    /// Schedule high-priority routes first instead of classifier order.
    /// Result order is unaffected either way.
    pub priority_first: bool,
}

impl RunConfig {
    /// Create a run configuration with defaults from the environment config
    pub fn new(changeset: u64, test_url: impl Into<String>) -> Self {
        let cfg = config::get();
        Self {
            changeset,
            test_url: test_url.into(),
            viewport: Viewport::new(cfg.run.viewport_width, cfg.run.viewport_height),
            threshold: cfg.run.threshold,
            max_concurrent: cfg.run.max_concurrent,
            route_timeout: Duration::from_secs(cfg.run.route_timeout),
            priority_first: false,
        }
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn route_timeout(mut self, timeout: Duration) -> Self {
        self.route_timeout = timeout;
        self
    }

    pub fn priority_first(mut self, priority_first: bool) -> Self {
        self.priority_first = priority_first;
        self
    }
}

/// Drives a classified changeset through capture, comparison and aggregation
pub struct Coordinator {
    capture: Arc<dyn CaptureCapability>,
    store: Arc<dyn BaselineStore>,
    config: RunConfig,
    cancel: CancelToken,
}

impl Coordinator {
    /// Create a coordinator over the given capabilities
    pub fn new(
        capture: Arc<dyn CaptureCapability>,
        store: Arc<dyn BaselineStore>,
        config: RunConfig,
    ) -> Self {
        Self {
            capture,
            store,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token for cancelling this coordinator's run from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute every classified route and aggregate the outcomes.
    ///
    /// Per-route failures are isolated into their outcomes; only
    /// classification-level input problems, manifest corruption and
    /// cancellation abort the run without a result.
    pub fn run(&self, classification: &Classification) -> VisionResult<RunResult> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let routes = &classification.routes;

        info!(
            changeset = self.config.changeset,
            routes = routes.len(),
            workers = self.config.max_concurrent,
            "starting visual regression run"
        );

        if routes.is_empty() {
            warn!("no routes recommended for testing, reporting failure");
            return Ok(report::aggregate(
                self.config.changeset,
                &self.config.test_url,
                Vec::new(),
                started_at,
                clock.elapsed(),
            ));
        }

        if self.cancel.is_cancelled() {
            return Err(VisionError::Cancelled);
        }

        let session = Session::for_changeset(self.config.changeset).keep(true);
        session.init()?;

        let schedule = build_schedule(routes, self.config.priority_first);
        let login_flow = classification.login_flow.as_ref();
        let login_barrier: OnceLock<Result<SessionHandle, String>> = OnceLock::new();
        let cursor = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let fatal: Mutex<Option<VisionError>> = Mutex::new(None);
        let workers = self.config.max_concurrent.clamp(1, routes.len());
        let (tx, rx) = mpsc::channel::<(usize, RouteTestOutcome)>();

        thread::scope(|scope| {
            for worker in 0..workers {
                let tx = tx.clone();
                let schedule = &schedule;
                let login_barrier = &login_barrier;
                let cursor = &cursor;
                let abort = &abort;
                let fatal = &fatal;
                let session = &session;

                scope.spawn(move || {
                    debug!(worker, "route worker started");
                    loop {
                        if abort.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                            break;
                        }
                        let position = cursor.fetch_add(1, Ordering::SeqCst);
                        if position >= schedule.len() {
                            break;
                        }
                        let slot = schedule[position];
                        let recommendation = &routes[slot];

                        match self.execute_route(
                            recommendation,
                            login_flow,
                            login_barrier,
                            session,
                            abort,
                        ) {
                            Ok(outcome) => {
                                if tx.send((slot, outcome)).is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(
                                    kind = err.kind(),
                                    "run-fatal error, stopping remaining routes"
                                );
                                let mut slotted =
                                    fatal.lock().unwrap_or_else(|poison| poison.into_inner());
                                if slotted.is_none() {
                                    *slotted = Some(err);
                                }
                                abort.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                    debug!(worker, "route worker finished");
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<RouteTestOutcome>> = routes.iter().map(|_| None).collect();
        for (slot, outcome) in rx {
            slots[slot] = Some(outcome);
        }

        let fatal = fatal
            .into_inner()
            .unwrap_or_else(|poison| poison.into_inner());
        if let Some(err) = fatal {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            info!("run cancelled before completion");
            return Err(VisionError::Cancelled);
        }

        let outcomes: Vec<RouteTestOutcome> = slots.into_iter().flatten().collect();
        let mut result = report::aggregate(
            self.config.changeset,
            &self.config.test_url,
            outcomes,
            started_at,
            clock.elapsed(),
        );

        let report_path = session.report_path();
        match result.write_report(&report_path) {
            Ok(()) => result.report_path = Some(report_path),
            Err(err) => warn!(error = %err, "failed to persist run report"),
        }

        info!(
            changeset = result.changeset,
            passed = result.passed,
            total = result.total_tests,
            failed = result.failed_tests,
            duration_ms = result.duration_ms,
            "run complete"
        );
        Ok(result)
    }

    /// Execute one route through the capture/compare state machine.
    ///
    /// Returns `Err` only for run-fatal conditions; every route-level
    /// failure is folded into the returned outcome.
    fn execute_route(
        &self,
        recommendation: &RouteRecommendation,
        login_flow: Option<&LoginFlowDescriptor>,
        login_barrier: &OnceLock<Result<SessionHandle, String>>,
        session: &Session,
        abort: &AtomicBool,
    ) -> Result<RouteTestOutcome, VisionError> {
        let route = recommendation.route.as_str();
        let screenshot_name = sanitize_route(route);
        let deadline = Instant::now() + self.config.route_timeout;
        let trace = |state: RouteState| debug!(route, state = %state, "route state");
        let fail = |err: &VisionError| {
            trace(RouteState::Failed);
            RouteTestOutcome::failed(route, &screenshot_name, err.to_string())
        };

        trace(RouteState::Pending);

        let browser_session = if recommendation.auth_required {
            trace(RouteState::LoggingIn);
            let login = login_barrier.get_or_init(|| match login_flow {
                Some(flow) => {
                    info!(url = %flow.login_url, "establishing shared login session");
                    self.capture.login(flow).map_err(|e| match e {
                        VisionError::Login(message) => message,
                        other => other.to_string(),
                    })
                }
                None => Err("no login flow available for auth-requiring route".to_string()),
            });
            match login {
                Ok(handle) => {
                    trace(RouteState::LoggedIn);
                    Some(handle.clone())
                }
                Err(message) => {
                    return Ok(fail(&VisionError::Login(message.clone())));
                }
            }
        } else {
            None
        };

        if let Err(err) = self.checkpoint(abort, deadline) {
            return Ok(fail(&err));
        }

        trace(RouteState::Navigating);
        let request = CaptureRequest {
            route,
            url: join_url(&self.config.test_url, route),
            viewport: self.config.viewport,
            wait: &recommendation.wait,
            session: browser_session.as_ref(),
        };

        trace(RouteState::Waiting);
        let actual = match self.capture.capture(&request) {
            Ok(bytes) => bytes,
            Err(err) => return Ok(fail(&err)),
        };
        trace(RouteState::Capturing);

        if let Err(err) = self.checkpoint(abort, deadline) {
            return Ok(fail(&err));
        }

        let actual_path = match session.write_artifact(route, ArtifactKind::Actual, &actual) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(route, error = %err, "failed to persist actual capture");
                None
            }
        };

        trace(RouteState::Comparing);
        let baseline = match self.resolve_baseline(route, &screenshot_name) {
            Ok(record) => record,
            Err(err) if err.is_run_fatal() => return Err(err),
            Err(err) => return Ok(fail(&err)),
        };

        match baseline {
            None => {
                // Bootstrap: first run for this key anywhere, the capture
                // becomes the baseline and no comparison is possible.
                info!(route, "no prior baseline, storing capture as new baseline");
                let record = match self.store.capture(
                    self.config.changeset,
                    route,
                    &screenshot_name,
                    self.config.viewport,
                    &actual,
                ) {
                    Ok(record) => record,
                    Err(err) if err.is_run_fatal() => return Err(err),
                    Err(err) => return Ok(fail(&err)),
                };
                trace(RouteState::Passed);
                Ok(RouteTestOutcome::bootstrap(
                    route,
                    &screenshot_name,
                    record.path,
                    actual_path,
                ))
            }
            Some(record) => {
                let baseline_bytes = match self.store.load_image(&record) {
                    Ok(bytes) => bytes,
                    Err(err) if err.is_run_fatal() => return Err(err),
                    Err(err) => return Ok(fail(&err)),
                };

                let outcome =
                    match compare::compare(&baseline_bytes, &actual, self.config.threshold) {
                        Ok(outcome) => outcome,
                        Err(err) => return Ok(fail(&err)),
                    };

                let diff_path = if outcome.matches {
                    None
                } else {
                    let path = session.artifact_path(route, ArtifactKind::Diff);
                    match compare::write_diff_artifact(&baseline_bytes, &actual, &path) {
                        Ok(()) => Some(path),
                        Err(err) => {
                            warn!(route, error = %err, "failed to render diff artifact");
                            None
                        }
                    }
                };

                trace(if outcome.matches {
                    RouteState::Passed
                } else {
                    RouteState::Failed
                });
                Ok(RouteTestOutcome::compared(
                    route,
                    &screenshot_name,
                    outcome,
                    record.path,
                    actual_path,
                    diff_path,
                ))
            }
        }
    }

    /// Resolve the baseline for a key: current changeset first, then the
    /// most recent prior changeset.
    fn resolve_baseline(
        &self,
        route: &str,
        screenshot_name: &str,
    ) -> VisionResult<Option<crate::baseline::BaselineRecord>> {
        if let Some(record) = self.store.lookup(
            self.config.changeset,
            route,
            screenshot_name,
            self.config.viewport,
        )? {
            return Ok(Some(record));
        }
        self.store.lookup_prior(
            self.config.changeset,
            route,
            screenshot_name,
            self.config.viewport,
        )
    }

    /// Cancellation and deadline check between execution steps
    fn checkpoint(&self, abort: &AtomicBool, deadline: Instant) -> Result<(), VisionError> {
        if abort.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return Err(VisionError::Cancelled);
        }
        if Instant::now() > deadline {
            return Err(VisionError::Timeout {
                seconds: self.config.route_timeout.as_secs(),
            });
        }
        Ok(())
    }
}

/// Build the execution schedule over result slots.
///
/// Classifier order by default; a stable sort by priority rank when
/// priority-first scheduling is requested, so ties keep classifier order.
fn build_schedule(routes: &[RouteRecommendation], priority_first: bool) -> Vec<usize> {
    let mut schedule: Vec<usize> = (0..routes.len()).collect();
    if priority_first {
        schedule.sort_by_key(|&slot| routes[slot].priority.rank());
    }
    schedule
}

/// Join a base test URL and a route path
fn join_url(base: &str, route: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}
