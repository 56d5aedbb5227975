//! Durable daemon state: the last announced item and the last heartbeat.
//!
//! Both records live in small files so they survive restarts.  Every
//! operation here is best-effort: reads fail open (nothing seen yet, heartbeat
//! due) and writes log their failure and carry on.  Nothing in this module
//! returns an error to the caller.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// On-disk shape of the dedup record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PollState {
    /// Older deployments wrote the id under `video_id` or `last_video_id`.
    #[serde(alias = "video_id", alias = "last_video_id")]
    last_item_id: Option<String>,
}

/// Single writer of the persisted state files.
pub struct StateStore {
    item_path: PathBuf,
    heartbeat_path: PathBuf,
}

impl StateStore {
    pub fn new(item_path: impl Into<PathBuf>, heartbeat_path: impl Into<PathBuf>) -> Self {
        Self {
            item_path: item_path.into(),
            heartbeat_path: heartbeat_path.into(),
        }
    }

    /// Read the id of the last processed item.
    ///
    /// Returns `None` when the file is missing, unreadable or malformed.
    pub fn load_last_item_id(&self) -> Option<String> {
        let raw = match fs::read_to_string(&self.item_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.item_path.display(), "no state file yet");
                return None;
            }
            Err(e) => {
                warn!(path = %self.item_path.display(), error = %e, "failed to read state file, assuming nothing seen");
                return None;
            }
        };

        match serde_json::from_str::<PollState>(&raw) {
            Ok(state) => state.last_item_id.filter(|id| !id.trim().is_empty()),
            Err(e) => {
                warn!(path = %self.item_path.display(), error = %e, "state file is malformed, assuming nothing seen");
                None
            }
        }
    }

    /// Persist `id` as the last processed item.
    pub fn save_last_item_id(&self, id: &str) {
        let state = PollState {
            last_item_id: Some(id.to_string()),
        };
        let result = serde_json::to_string(&state)
            .map_err(io::Error::from)
            .and_then(|json| write_atomic(&self.item_path, &json));

        match result {
            Ok(()) => debug!(item_id = %id, "saved last item id"),
            Err(e) => {
                error!(path = %self.item_path.display(), item_id = %id, error = %e, "failed to save last item id")
            }
        }
    }

    /// Whether a heartbeat is due, measured against the wall clock.
    pub fn should_emit_heartbeat(&self, interval_hours: u32) -> bool {
        self.should_emit_heartbeat_at(interval_hours, Utc::now())
    }

    /// Whether a heartbeat is due at `now`.
    ///
    /// True when no timestamp is recorded, when it cannot be read, or when at
    /// least `interval_hours` have passed since it.
    pub fn should_emit_heartbeat_at(&self, interval_hours: u32, now: DateTime<Utc>) -> bool {
        let raw = match fs::read_to_string(&self.heartbeat_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                warn!(path = %self.heartbeat_path.display(), error = %e, "failed to read heartbeat file, treating heartbeat as due");
                return true;
            }
        };

        let Some(last) = parse_timestamp(raw.trim()) else {
            warn!(path = %self.heartbeat_path.display(), "heartbeat file is malformed, treating heartbeat as due");
            return true;
        };

        let elapsed = now.signed_duration_since(last);
        if elapsed < chrono::Duration::zero() {
            warn!(last = %last, "heartbeat timestamp is in the future, treating heartbeat as due");
            return true;
        }
        elapsed >= chrono::Duration::hours(i64::from(interval_hours))
    }

    /// Record that a heartbeat went out now.
    pub fn mark_heartbeat_emitted(&self) {
        self.mark_heartbeat_emitted_at(Utc::now());
    }

    pub fn mark_heartbeat_emitted_at(&self, now: DateTime<Utc>) {
        if let Err(e) = write_atomic(&self.heartbeat_path, &now.to_rfc3339()) {
            error!(path = %self.heartbeat_path.display(), error = %e, "failed to record heartbeat");
        }
    }
}

/// Accepts RFC 3339 and the naive UTC ISO form older deployments wrote.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Write through a sibling temp file so a crash never leaves a torn record.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(
            dir.path().join("last_video.json"),
            dir.path().join("last_heartbeat.txt"),
        )
    }

    // -- last item id --------------------------------------------------------

    #[test]
    fn missing_file_loads_as_absent() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).load_last_item_id(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save_last_item_id("abc123");
        assert_eq!(store.load_last_item_id().as_deref(), Some("abc123"));

        store.save_last_item_id("xyz789");
        assert_eq!(store.load_last_item_id().as_deref(), Some("xyz789"));
    }

    #[test]
    fn state_survives_a_new_store_instance() {
        let dir = TempDir::new().unwrap();
        store(&dir).save_last_item_id("abc123");
        assert_eq!(store(&dir).load_last_item_id().as_deref(), Some("abc123"));
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        store(&dir).save_last_item_id("abc123");
        assert!(!dir.path().join("last_video.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_loads_as_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("last_video.json"), "{not json").unwrap();
        assert_eq!(store(&dir).load_last_item_id(), None);
    }

    #[test]
    fn blank_id_loads_as_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("last_video.json"), r#"{"last_item_id": "  "}"#).unwrap();
        assert_eq!(store(&dir).load_last_item_id(), None);
    }

    #[test]
    fn legacy_key_is_read() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("last_video.json"), r#"{"video_id": "old42"}"#).unwrap();
        assert_eq!(store(&dir).load_last_item_id().as_deref(), Some("old42"));
    }

    #[test]
    fn bot_era_key_is_read() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("last_video.json"), r#"{"last_video_id": "old43"}"#).unwrap();
        assert_eq!(store(&dir).load_last_item_id().as_deref(), Some("old43"));
    }

    #[test]
    fn failed_rename_cleans_up_temp_file() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory in the way makes the rename fail.
        let blocker = dir.path().join("last_video.json");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        store(&dir).save_last_item_id("abc123");

        assert!(!dir.path().join("last_video.json.tmp").exists());
        assert!(blocker.is_dir());
    }

    #[test]
    fn save_creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(
            dir.path().join("state/last_video.json"),
            dir.path().join("state/last_heartbeat.txt"),
        );
        store.save_last_item_id("abc123");
        assert_eq!(store.load_last_item_id().as_deref(), Some("abc123"));
    }

    #[test]
    fn unwritable_path_does_not_panic() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        fs::create_dir(dir.path().join("last_video.json")).unwrap();
        let store = store(&dir);
        store.save_last_item_id("abc123");
        assert_eq!(store.load_last_item_id(), None);
    }

    // -- heartbeat -----------------------------------------------------------

    #[test]
    fn heartbeat_due_without_record() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).should_emit_heartbeat(24));
    }

    #[test]
    fn heartbeat_gated_by_interval() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let t0 = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();

        store.mark_heartbeat_emitted_at(t0);
        assert!(!store.should_emit_heartbeat_at(24, t0));
        assert!(!store.should_emit_heartbeat_at(24, t0 + chrono::Duration::hours(23)));
        assert!(store.should_emit_heartbeat_at(24, t0 + chrono::Duration::hours(24)));
        assert!(store.should_emit_heartbeat_at(24, t0 + chrono::Duration::hours(30)));
    }

    #[test]
    fn heartbeat_not_due_right_after_wall_clock_mark() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.mark_heartbeat_emitted();
        assert!(!store.should_emit_heartbeat(24));
    }

    #[test]
    fn malformed_heartbeat_is_due() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("last_heartbeat.txt"), "yesterday-ish").unwrap();
        assert!(store(&dir).should_emit_heartbeat(24));
    }

    #[test]
    fn future_heartbeat_is_due() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        store.mark_heartbeat_emitted_at(now + chrono::Duration::days(3));
        assert!(store.should_emit_heartbeat_at(24, now));
    }

    #[test]
    fn naive_legacy_heartbeat_is_parsed() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("last_heartbeat.txt"),
            "2026-10-01T08:00:00.123456\n",
        )
        .unwrap();
        let store = store(&dir);
        let t0 = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        assert!(!store.should_emit_heartbeat_at(24, t0 + chrono::Duration::hours(1)));
        assert!(store.should_emit_heartbeat_at(24, t0 + chrono::Duration::hours(25)));
    }
}
