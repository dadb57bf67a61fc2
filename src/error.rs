//! Error taxonomy for the visual regression engine.
//!
//! One closed sum type covers every failure domain. The variant is the kind
//! discriminator; `is_run_fatal` separates errors that abort the whole run
//! from errors that fail a single route.

/// Result type for engine operations
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur during a visual regression run
#[derive(Debug)]
pub enum VisionError {
    /// Change classification unavailable or malformed (fatal to the run)
    Classification(String),

    /// Shared login flow failed (fatal to all auth-requiring routes)
    Login(String),

    /// Navigation to a route failed (fatal to that route only)
    Navigation { route: String, message: String },

    /// Screenshot capture failed (fatal to that route only)
    Capture { route: String, message: String },

    /// A route execution exceeded its time ceiling
    Timeout { seconds: u64 },

    /// Reading or writing one route's baseline failed
    BaselineStore(String),

    /// A baseline manifest is unreadable or corrupt (fatal to the run)
    ManifestCorrupt(String),

    /// Pixel comparison could not produce a verdict
    Comparison(String),

    /// The run was cancelled externally
    Cancelled,

    /// I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(serde_json::Error),
}

impl VisionError {
    /// Short stable name for the failure domain, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            VisionError::Classification(_) => "classification",
            VisionError::Login(_) => "login",
            VisionError::Navigation { .. } => "navigation",
            VisionError::Capture { .. } => "capture",
            VisionError::Timeout { .. } => "timeout",
            VisionError::BaselineStore(_) => "baseline_store",
            VisionError::ManifestCorrupt(_) => "manifest_corrupt",
            VisionError::Comparison(_) => "comparison",
            VisionError::Cancelled => "cancelled",
            VisionError::Io(_) => "io",
            VisionError::Serialization(_) => "serialization",
        }
    }

    /// Whether this error aborts the remaining run.
    ///
    /// Everything else is caught at the route-execution boundary and recorded
    /// in that route's outcome.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            VisionError::Classification(_)
                | VisionError::ManifestCorrupt(_)
                | VisionError::Cancelled
        )
    }
}

impl std::fmt::Display for VisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionError::Classification(msg) => write!(f, "Classification failed: {}", msg),
            VisionError::Login(msg) => write!(f, "Login failed: {}", msg),
            VisionError::Navigation { route, message } => {
                write!(f, "Navigation to '{}' failed: {}", route, message)
            }
            VisionError::Capture { route, message } => {
                write!(f, "Capture of '{}' failed: {}", route, message)
            }
            VisionError::Timeout { seconds } => {
                write!(f, "Route execution timed out after {}s", seconds)
            }
            VisionError::BaselineStore(msg) => write!(f, "Baseline store error: {}", msg),
            VisionError::ManifestCorrupt(msg) => write!(f, "Baseline manifest corrupt: {}", msg),
            VisionError::Comparison(msg) => write!(f, "Comparison error: {}", msg),
            VisionError::Cancelled => write!(f, "Run cancelled"),
            VisionError::Io(err) => write!(f, "I/O error: {}", err),
            VisionError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for VisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VisionError::Io(err) => Some(err),
            VisionError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VisionError {
    fn from(err: std::io::Error) -> Self {
        VisionError::Io(err)
    }
}

impl From<serde_json::Error> for VisionError {
    fn from(err: serde_json::Error) -> Self {
        VisionError::Serialization(err)
    }
}

impl From<image::ImageError> for VisionError {
    fn from(err: image::ImageError) -> Self {
        VisionError::Io(std::io::Error::other(err.to_string()))
    }
}
