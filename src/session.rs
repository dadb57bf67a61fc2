//! Session management for organized run artifact handling.
//!
//! Provides centralized management of run artifact directories with:
//! - Unique per-run directories under a configurable base location
//! - Deterministic artifact paths per route (actual and diff images)
//! - Automatic cleanup unless explicitly preserved
//! - Stale-session sweeping

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::baseline::sanitize_route;
use crate::config;

/// Kind of image artifact a run produces for a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The freshly captured screenshot
    Actual,
    /// The rendered difference image
    Diff,
}

impl ArtifactKind {
    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Actual => "actual",
            ArtifactKind::Diff => "diff",
        }
    }
}

/// A run artifact session with organized file management
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this session
    pub dir: PathBuf,
    /// Whether to keep files after the session ends
    pub keep: bool,
}

impl Session {
    /// Create a new session with a unique ID
    pub fn new() -> Self {
        let id = generate_session_id();
        let dir = PathBuf::from(config::session_base_dir()).join(&id);

        Self {
            id,
            dir,
            keep: false,
        }
    }

    /// Create a session named after a changeset
    pub fn for_changeset(changeset: u64) -> Self {
        let id = format!("pr{}_{}", changeset, generate_timestamp_suffix());
        let dir = PathBuf::from(config::session_base_dir()).join(&id);

        Self {
            id,
            dir,
            keep: false,
        }
    }

    /// Create a session in a specific directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_session_id);

        Self {
            id,
            dir,
            keep: true, // User-specified directories are kept by default
        }
    }

    /// Set whether to keep files after the session ends
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Initialize the session directory
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_path = self.dir.join(".session.json");
        fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        Ok(())
    }

    /// Artifact path for a route
    pub fn artifact_path(&self, route: &str, kind: ArtifactKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.png", sanitize_route(route), kind.suffix()))
    }

    /// Write an artifact for a route and return its path
    pub fn write_artifact(
        &self,
        route: &str,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        let path = self.artifact_path(route, kind);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Path of the run report within the session
    pub fn report_path(&self) -> PathBuf {
        self.dir.join("report.json")
    }

    /// List all PNG artifacts in the session
    pub fn list_artifacts(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    artifacts.push(path);
                }
            }
        }
        artifacts.sort();
        Ok(artifacts)
    }

    /// Clean up the session directory
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("run_{}_{}", timestamp, pid)
}

/// Generate a timestamp suffix
fn generate_timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Clean up sessions older than the specified duration
pub fn cleanup_old_sessions(max_age: std::time::Duration) -> std::io::Result<usize> {
    let base = PathBuf::from(config::session_base_dir());
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in fs::read_dir(&base)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(age) = now.duration_since(modified) {
                        if age > max_age && fs::remove_dir_all(&path).is_ok() {
                            cleaned += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(cleaned)
}

/// List all existing sessions
pub fn list_sessions() -> std::io::Result<Vec<PathBuf>> {
    let base = PathBuf::from(config::session_base_dir());
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(&base)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert!(session.id.starts_with("run_"));
        assert!(!session.keep);
    }

    #[test]
    fn test_session_for_changeset() {
        let session = Session::for_changeset(512);
        assert!(session.id.starts_with("pr512_"));
    }

    #[test]
    fn test_artifact_paths() {
        let session = Session::new();
        assert!(
            session
                .artifact_path("/checkout", ArtifactKind::Actual)
                .ends_with("checkout_actual.png")
        );
        assert!(
            session
                .artifact_path("/admin/users", ArtifactKind::Diff)
                .ends_with("admin_users_diff.png")
        );
        assert!(session.report_path().ends_with("report.json"));
    }

    #[test]
    fn test_write_and_list_artifacts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let session = Session::in_dir(tmp.path().join("pr1_test"));
        session.init().unwrap();

        session
            .write_artifact("/home", ArtifactKind::Actual, b"png")
            .unwrap();
        session
            .write_artifact("/home", ArtifactKind::Diff, b"png")
            .unwrap();

        let artifacts = session.list_artifacts().unwrap();
        assert_eq!(artifacts.len(), 2);
    }

    #[test]
    fn test_cleanup_respects_keep() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("pr2_test");

        let session = Session::in_dir(&dir).keep(false);
        session.init().unwrap();
        assert!(dir.exists());
        session.cleanup().unwrap();
        assert!(!dir.exists());
    }
}
