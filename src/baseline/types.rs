// Core types for baseline storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Browser window dimensions during capture.
///
/// Part of every baseline identity key: baselines are never compared across
/// differing viewports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Create a viewport
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Viewport from the configured default
    pub fn from_config() -> Self {
        let cfg = crate::config::get();
        Self {
            width: cfg.run.viewport_width,
            height: cfg.run.viewport_height,
        }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A stored reference screenshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineRecord {
    /// Changeset the baseline was captured under
    pub changeset: u64,

    /// Route the baseline belongs to
    pub route: String,

    /// Screenshot name within the route
    pub screenshot_name: String,

    /// Path of the stored image
    pub path: PathBuf,

    /// Capture timestamp
    #[serde(with = "chrono::serde::ts_seconds")]
    pub captured_at: DateTime<Utc>,

    /// Viewport the capture was taken at
    pub viewport: Viewport,
}

impl BaselineRecord {
    /// Whether this record occupies the given identity key
    pub fn matches_key(&self, route: &str, screenshot_name: &str, viewport: Viewport) -> bool {
        self.route == route
            && self.screenshot_name == screenshot_name
            && self.viewport == viewport
    }
}

/// Per-changeset index of baseline records.
///
/// Created on first capture, appended to per route, and rewritten atomically
/// so an interrupted capture cannot corrupt previously recorded entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineManifest {
    /// Changeset this manifest indexes
    pub changeset: u64,

    /// URL the application was tested against
    pub test_url: Option<String>,

    /// Timestamp of the most recent capture
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,

    /// All live baseline records for this changeset
    pub records: Vec<BaselineRecord>,
}

impl BaselineManifest {
    /// Create an empty manifest for a changeset
    pub fn new(changeset: u64) -> Self {
        Self {
            changeset,
            test_url: None,
            updated_at: Utc::now(),
            records: Vec::new(),
        }
    }

    /// Insert a record, superseding any existing record at the same key.
    ///
    /// Returns true when an existing record was superseded.
    pub fn upsert(&mut self, record: BaselineRecord) -> bool {
        let before = self.records.len();
        self.records.retain(|r| {
            !r.matches_key(&record.route, &record.screenshot_name, record.viewport)
        });
        let superseded = self.records.len() != before;
        self.updated_at = record.captured_at;
        self.records.push(record);
        superseded
    }

    /// Find the live record at a key
    pub fn find(
        &self,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
    ) -> Option<&BaselineRecord> {
        self.records
            .iter()
            .find(|r| r.matches_key(route, screenshot_name, viewport))
    }

    /// Enumerate the route -> screenshot-name mapping recorded so far
    pub fn route_screenshots(&self) -> Vec<(String, String)> {
        self.records
            .iter()
            .map(|r| (r.route.clone(), r.screenshot_name.clone()))
            .collect()
    }
}
