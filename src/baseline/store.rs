//! Filesystem-backed baseline storage.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<changeset>/manifest.json
//! <root>/<changeset>/<sanitized route>/<name>_<WxH>.png
//! ```
//!
//! The manifest is rewritten through a temp file + rename so an interrupted
//! capture never corrupts previously recorded entries, and a manifest entry
//! is only written after its image write has succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};

use crate::baseline::types::{BaselineManifest, BaselineRecord, Viewport};
use crate::config;
use crate::error::{VisionError, VisionResult};

/// Manifest filename within a changeset directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Trait for baseline persistence backends
///
/// Implementations must serialize concurrent writes to the same key rather
/// than corrupt their index.
pub trait BaselineStore: Send + Sync {
    /// Store a baseline, superseding any existing record at the same key
    fn capture(
        &self,
        changeset: u64,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
        image: &[u8],
    ) -> VisionResult<BaselineRecord>;

    /// Look up the live baseline at a key within a changeset
    fn lookup(
        &self,
        changeset: u64,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
    ) -> VisionResult<Option<BaselineRecord>>;

    /// Resolve the most recent baseline for a key from any *other* changeset.
    ///
    /// Ordering: capture timestamp descending, ties broken by changeset id
    /// descending.
    fn lookup_prior(
        &self,
        current_changeset: u64,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
    ) -> VisionResult<Option<BaselineRecord>>;

    /// Read the stored image for a record
    fn load_image(&self, record: &BaselineRecord) -> VisionResult<Vec<u8>>;
}

/// Baseline store rooted at a directory on the local filesystem
pub struct FsBaselineStore {
    root: PathBuf,
    test_url: Option<String>,
    write_lock: Mutex<()>,
}

impl FsBaselineStore {
    /// Create a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            test_url: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store rooted at the configured baseline directory
    pub fn from_config() -> Self {
        Self::new(config::baseline_dir())
    }

    /// Record the test URL on manifests written by this store
    pub fn with_test_url(mut self, url: impl Into<String>) -> Self {
        self.test_url = Some(url.into());
        self
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn changeset_dir(&self, changeset: u64) -> PathBuf {
        self.root.join(changeset.to_string())
    }

    fn manifest_path(&self, changeset: u64) -> PathBuf {
        self.changeset_dir(changeset).join(MANIFEST_FILE)
    }

    fn image_path(
        &self,
        changeset: u64,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
    ) -> PathBuf {
        self.changeset_dir(changeset)
            .join(sanitize_route(route))
            .join(format!("{}_{}.png", screenshot_name, viewport))
    }

    /// Load a changeset's manifest. Missing manifest means no baselines yet;
    /// an unreadable or unparseable manifest is fatal to the run.
    fn load_manifest(&self, changeset: u64) -> VisionResult<Option<BaselineManifest>> {
        let path = self.manifest_path(changeset);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).map_err(|e| {
            VisionError::ManifestCorrupt(format!("{}: {}", path.display(), e))
        })?;
        let manifest = serde_json::from_str(&data).map_err(|e| {
            VisionError::ManifestCorrupt(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(manifest))
    }

    /// Persist a manifest atomically (temp file + rename)
    fn store_manifest(&self, manifest: &BaselineManifest) -> VisionResult<()> {
        let path = self.manifest_path(manifest.changeset);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(manifest)
            .map_err(|e| VisionError::BaselineStore(format!("manifest encode: {}", e)))?;
        fs::write(&tmp, data)
            .map_err(|e| VisionError::BaselineStore(format!("manifest write: {}", e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| VisionError::BaselineStore(format!("manifest rename: {}", e)))?;
        Ok(())
    }

    /// Enumerate changeset directories under the root
    fn list_changesets(&self) -> VisionResult<Vec<u64>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut changesets = Vec::new();
        for entry in fs::read_dir(&self.root)
            .map_err(|e| VisionError::BaselineStore(format!("store root: {}", e)))?
        {
            let entry =
                entry.map_err(|e| VisionError::BaselineStore(format!("store root: {}", e)))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            {
                changesets.push(id);
            }
        }
        changesets.sort_unstable();
        Ok(changesets)
    }
}

impl BaselineStore for FsBaselineStore {
    fn capture(
        &self,
        changeset: u64,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
        image: &[u8],
    ) -> VisionResult<BaselineRecord> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| VisionError::BaselineStore("store lock poisoned".to_string()))?;

        let mut manifest = self
            .load_manifest(changeset)?
            .unwrap_or_else(|| BaselineManifest::new(changeset));
        if manifest.test_url.is_none() {
            manifest.test_url = self.test_url.clone();
        }

        let path = self.image_path(changeset, route, screenshot_name, viewport);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| VisionError::BaselineStore(format!("image dir: {}", e)))?;
        }
        fs::write(&path, image)
            .map_err(|e| VisionError::BaselineStore(format!("image write: {}", e)))?;

        let record = BaselineRecord {
            changeset,
            route: route.to_string(),
            screenshot_name: screenshot_name.to_string(),
            path,
            captured_at: Utc::now(),
            viewport,
        };

        let superseded = manifest.upsert(record.clone());
        self.store_manifest(&manifest)?;

        if superseded {
            info!(route, name = screenshot_name, %viewport, "superseded existing baseline");
        } else {
            debug!(route, name = screenshot_name, %viewport, "stored new baseline");
        }

        Ok(record)
    }

    fn lookup(
        &self,
        changeset: u64,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
    ) -> VisionResult<Option<BaselineRecord>> {
        Ok(self
            .load_manifest(changeset)?
            .and_then(|m| m.find(route, screenshot_name, viewport).cloned()))
    }

    fn lookup_prior(
        &self,
        current_changeset: u64,
        route: &str,
        screenshot_name: &str,
        viewport: Viewport,
    ) -> VisionResult<Option<BaselineRecord>> {
        let mut candidates = Vec::new();
        for changeset in self.list_changesets()? {
            if changeset == current_changeset {
                continue;
            }
            if let Some(manifest) = self.load_manifest(changeset)? {
                if let Some(record) = manifest.find(route, screenshot_name, viewport) {
                    candidates.push(record.clone());
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.captured_at
                .cmp(&a.captured_at)
                .then(b.changeset.cmp(&a.changeset))
        });

        Ok(candidates.into_iter().next())
    }

    fn load_image(&self, record: &BaselineRecord) -> VisionResult<Vec<u8>> {
        fs::read(&record.path).map_err(|e| {
            VisionError::BaselineStore(format!("baseline image {}: {}", record.path.display(), e))
        })
    }
}

/// Sanitize a route path for use as a directory name
pub fn sanitize_route(route: &str) -> String {
    let trimmed = route.trim_matches('/');
    if trimmed.is_empty() {
        return "root".to_string();
    }
    trimmed
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
