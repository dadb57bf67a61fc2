//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Web Vision, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults suitable for a local review loop
//! - Cached global access via `config::get()`
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEB_VISION_AI_ENDPOINT` | Change-analysis API endpoint URL | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `WEB_VISION_AI_MODEL` | Model name for change analysis | `qwen3` |
//! | `WEB_VISION_AI_MAX_TOKENS` | Maximum tokens in analysis response | `2000` |
//! | `WEB_VISION_AI_TIMEOUT` | Analysis response timeout in seconds | `120` |
//! | `WEB_VISION_AI_CONNECT_TIMEOUT` | Analysis connection timeout in seconds | `10` |
//! | `WEB_VISION_MAX_DIFF_BYTES` | Diff size bound sent to the analysis service | `60000` |
//! | `WEB_VISION_BASELINE_DIR` | Root directory for baseline storage | `./baselines` |
//! | `WEB_VISION_SESSION_DIR` | Base directory for run artifacts | `/tmp/web-vision` |
//! | `WEB_VISION_MAX_CONCURRENT` | Maximum concurrent route executions | `4` |
//! | `WEB_VISION_ROUTE_TIMEOUT` | Per-route execution ceiling in seconds | `45` |
//! | `WEB_VISION_THRESHOLD` | Default diff threshold (0.0 - 1.0) | `0.01` |
//! | `WEB_VISION_VIEWPORT` | Default viewport preset or WxH | `desktop` |
//!
//! # Example
//!
//! ```bash
//! # Point at a hosted analysis endpoint
//! export WEB_VISION_AI_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! export WEB_VISION_AI_MODEL="llama3"
//!
//! # Keep baselines on a shared volume
//! export WEB_VISION_BASELINE_DIR="/var/lib/web-vision/baselines"
//! ```

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default change-analysis API endpoint
pub const DEFAULT_AI_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default analysis model name
pub const DEFAULT_AI_MODEL: &str = "qwen3";

/// Default max tokens for analysis responses
pub const DEFAULT_AI_MAX_TOKENS: u32 = 2000;

/// Default analysis connection timeout (seconds)
pub const DEFAULT_AI_CONNECT_TIMEOUT: u64 = 10;

/// Default analysis response timeout (seconds)
pub const DEFAULT_AI_TIMEOUT: u64 = 120;

/// Default bound on diff bytes sent to the analysis service
pub const DEFAULT_MAX_DIFF_BYTES: usize = 60_000;

/// Default baseline storage root
pub const DEFAULT_BASELINE_DIR: &str = "./baselines";

/// Default session base directory
pub const DEFAULT_SESSION_DIR: &str = "/tmp/web-vision";

/// Default maximum concurrent route executions
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default per-route execution ceiling (seconds)
pub const DEFAULT_ROUTE_TIMEOUT: u64 = 45;

/// Default diff threshold
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// Default viewport preset
pub const DEFAULT_VIEWPORT: &str = "desktop";

/// Default viewport width (pixels)
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1920;

/// Default viewport height (pixels)
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1080;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the analysis endpoint
pub const ENV_AI_ENDPOINT: &str = "WEB_VISION_AI_ENDPOINT";

/// Environment variable for the analysis model
pub const ENV_AI_MODEL: &str = "WEB_VISION_AI_MODEL";

/// Environment variable for analysis max tokens
pub const ENV_AI_MAX_TOKENS: &str = "WEB_VISION_AI_MAX_TOKENS";

/// Environment variable for the analysis connection timeout
pub const ENV_AI_CONNECT_TIMEOUT: &str = "WEB_VISION_AI_CONNECT_TIMEOUT";

/// Environment variable for the analysis response timeout
pub const ENV_AI_TIMEOUT: &str = "WEB_VISION_AI_TIMEOUT";

/// Environment variable for the diff size bound
pub const ENV_MAX_DIFF_BYTES: &str = "WEB_VISION_MAX_DIFF_BYTES";

/// Environment variable for the baseline root
pub const ENV_BASELINE_DIR: &str = "WEB_VISION_BASELINE_DIR";

/// Environment variable for the session directory
pub const ENV_SESSION_DIR: &str = "WEB_VISION_SESSION_DIR";

/// Environment variable for the concurrency limit
pub const ENV_MAX_CONCURRENT: &str = "WEB_VISION_MAX_CONCURRENT";

/// Environment variable for the per-route timeout
pub const ENV_ROUTE_TIMEOUT: &str = "WEB_VISION_ROUTE_TIMEOUT";

/// Environment variable for the diff threshold
pub const ENV_THRESHOLD: &str = "WEB_VISION_THRESHOLD";

/// Environment variable for the default viewport
pub const ENV_VIEWPORT: &str = "WEB_VISION_VIEWPORT";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Web Vision
#[derive(Debug, Clone)]
pub struct Config {
    /// Change-analysis service configuration
    pub ai: AiSettings,
    /// Storage configuration
    pub storage: StorageSettings,
    /// Run execution configuration
    pub run: RunSettings,
}

/// Change-analysis service settings
#[derive(Debug, Clone)]
pub struct AiSettings {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Response timeout (seconds)
    pub response_timeout: u64,
    /// Diff size bound (bytes)
    pub max_diff_bytes: usize,
}

/// Storage-related settings
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Root directory for baseline storage
    pub baseline_dir: String,
    /// Base directory for run artifact sessions
    pub session_dir: String,
}

/// Run execution settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Maximum concurrent route executions
    pub max_concurrent: usize,
    /// Per-route execution ceiling (seconds)
    pub route_timeout: u64,
    /// Default diff threshold (0.0 - 1.0)
    pub threshold: f64,
    /// Default viewport width
    pub viewport_width: u32,
    /// Default viewport height
    pub viewport_height: u32,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            ai: AiSettings::from_env(),
            storage: StorageSettings::from_env(),
            run: RunSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            ai: AiSettings::defaults(),
            storage: StorageSettings::defaults(),
            run: RunSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AiSettings {
    /// Create analysis settings from environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_AI_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_AI_ENDPOINT.to_string()),
            model: env::var(ENV_AI_MODEL).unwrap_or_else(|_| DEFAULT_AI_MODEL.to_string()),
            max_tokens: env::var(ENV_AI_MAX_TOKENS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_AI_MAX_TOKENS),
            connect_timeout: env::var(ENV_AI_CONNECT_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_AI_CONNECT_TIMEOUT),
            response_timeout: env::var(ENV_AI_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_AI_TIMEOUT),
            max_diff_bytes: env::var(ENV_MAX_DIFF_BYTES)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_DIFF_BYTES),
        }
    }

    /// Create analysis settings with defaults
    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            max_tokens: DEFAULT_AI_MAX_TOKENS,
            connect_timeout: DEFAULT_AI_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_AI_TIMEOUT,
            max_diff_bytes: DEFAULT_MAX_DIFF_BYTES,
        }
    }
}

impl StorageSettings {
    /// Create storage settings from environment variables
    pub fn from_env() -> Self {
        Self {
            baseline_dir: env::var(ENV_BASELINE_DIR)
                .unwrap_or_else(|_| DEFAULT_BASELINE_DIR.to_string()),
            session_dir: env::var(ENV_SESSION_DIR)
                .unwrap_or_else(|_| DEFAULT_SESSION_DIR.to_string()),
        }
    }

    /// Create storage settings with defaults
    pub fn defaults() -> Self {
        Self {
            baseline_dir: DEFAULT_BASELINE_DIR.to_string(),
            session_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}

impl RunSettings {
    /// Create run settings from environment variables
    pub fn from_env() -> Self {
        let viewport =
            env::var(ENV_VIEWPORT).unwrap_or_else(|_| DEFAULT_VIEWPORT.to_string());
        let (width, height) = parse_viewport(&viewport)
            .unwrap_or((DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT));

        Self {
            max_concurrent: env::var(ENV_MAX_CONCURRENT)
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
            route_timeout: env::var(ENV_ROUTE_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ROUTE_TIMEOUT),
            threshold: env::var(ENV_THRESHOLD)
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|t| (0.0..=1.0).contains(t))
                .unwrap_or(DEFAULT_THRESHOLD),
            viewport_width: width,
            viewport_height: height,
        }
    }

    /// Create run settings with hardcoded defaults
    pub fn defaults() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            route_timeout: DEFAULT_ROUTE_TIMEOUT,
            threshold: DEFAULT_THRESHOLD,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a viewport string into (width, height)
/// Supports: "desktop" (1920x1080), "laptop" (1366x768), "tablet" (768x1024),
/// "mobile" (375x667), or "WxH"
pub fn parse_viewport(size: &str) -> Option<(u32, u32)> {
    match size.to_lowercase().as_str() {
        "desktop" => Some((1920, 1080)),
        "laptop" => Some((1366, 768)),
        "tablet" => Some((768, 1024)),
        "mobile" => Some((375, 667)),
        custom => {
            let parts: Vec<&str> = custom.split('x').collect();
            if parts.len() == 2 {
                let w = parts[0].parse().ok()?;
                let h = parts[1].parse().ok()?;
                Some((w, h))
            } else {
                None
            }
        }
    }
}

/// Get the analysis endpoint (convenience function)
pub fn ai_endpoint() -> String {
    get().ai.endpoint.clone()
}

/// Get the analysis model (convenience function)
pub fn ai_model() -> String {
    get().ai.model.clone()
}

/// Get the baseline storage root (convenience function)
pub fn baseline_dir() -> String {
    get().storage.baseline_dir.clone()
}

/// Get the session base directory (convenience function)
pub fn session_base_dir() -> String {
    get().storage.session_dir.clone()
}

/// Get the default diff threshold (convenience function)
pub fn default_threshold() -> f64 {
    get().run.threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_viewport_presets() {
        assert_eq!(parse_viewport("desktop"), Some((1920, 1080)));
        assert_eq!(parse_viewport("laptop"), Some((1366, 768)));
        assert_eq!(parse_viewport("tablet"), Some((768, 1024)));
        assert_eq!(parse_viewport("mobile"), Some((375, 667)));
    }

    #[test]
    fn test_parse_viewport_custom() {
        assert_eq!(parse_viewport("1280x720"), Some((1280, 720)));
        assert_eq!(parse_viewport("800x600"), Some((800, 600)));
    }

    #[test]
    fn test_parse_viewport_invalid() {
        assert_eq!(parse_viewport("invalid"), None);
        assert_eq!(parse_viewport("1280"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.ai.endpoint, DEFAULT_AI_ENDPOINT);
        assert_eq!(config.ai.model, DEFAULT_AI_MODEL);
        assert_eq!(config.storage.baseline_dir, DEFAULT_BASELINE_DIR);
        assert_eq!(config.run.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert!((config.run.threshold - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
    }
}
