use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::NamedTempFile;

use crate::error::{BeaconError, Result};

use super::{
    is_valid_session_id, system_time_epoch, Heartbeat, LifecycleRecord, RecordRead,
    StampedLifecycle,
};

static RE_HEARTBEAT_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]{0,127})\.json$").unwrap());

static RE_LIFECYCLE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.([A-Za-z0-9][A-Za-z0-9._-]{0,127})\.state$").unwrap());

const LOCK_POLL: Duration = Duration::from_millis(20);

/// The shared directory written by the probe and the hook dispatcher.
///
/// Layout, keyed by session id:
/// - `<id>.json` heartbeat
/// - `.<id>.state` lifecycle record
/// - `.<id>.lock` advisory lock serializing lifecycle writers
///
/// Every write goes through a temporary file in the same directory and a
/// rename, so readers never observe a partial record.
#[derive(Debug, Clone)]
pub struct SessionDir {
    root: PathBuf,
}

/// Exclusive per-session lock, released on drop
#[derive(Debug)]
pub struct SessionLock {
    file: File,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl SessionDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".agent-beacon")
            .join("sessions")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed. Failure here is the one fatal
    /// condition for the registry.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| BeaconError::SessionDir {
            path: self.root.clone(),
            source,
        })
    }

    pub fn heartbeat_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    pub fn lifecycle_path(&self, id: &str) -> PathBuf {
        self.root.join(format!(".{id}.state"))
    }

    pub fn lock_path(&self, id: &str) -> PathBuf {
        self.root.join(format!(".{id}.lock"))
    }

    /// Session id encoded in a heartbeat file name
    pub fn heartbeat_file_id(file_name: &str) -> Option<&str> {
        RE_HEARTBEAT_FILE
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|id| is_valid_session_id(id))
    }

    /// Whether a changed path can affect a session's status
    pub fn is_record_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| {
                Self::heartbeat_file_id(name).is_some() || RE_LIFECYCLE_FILE.is_match(name)
            })
            .unwrap_or(false)
    }

    /// Ids of every heartbeat file present, in no particular order.
    pub async fn list_session_ids(&self) -> Result<Vec<String>> {
        let dir_error = |source| BeaconError::SessionDir {
            path: self.root.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(dir_error)?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(Self::heartbeat_file_id) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    pub async fn read_heartbeat(&self, id: &str) -> RecordRead<Heartbeat> {
        match tokio::fs::read_to_string(self.heartbeat_path(id)).await {
            Ok(raw) => Heartbeat::parse(&raw, id),
            Err(e) if e.kind() == ErrorKind::NotFound => RecordRead::Absent,
            Err(e) => RecordRead::Malformed(e.to_string()),
        }
    }

    pub async fn read_lifecycle(&self, id: &str) -> RecordRead<StampedLifecycle> {
        let path = self.lifecycle_path(id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return RecordRead::Absent,
            Err(e) => return RecordRead::Malformed(e.to_string()),
        };
        let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => return RecordRead::Malformed(e.to_string()),
        };
        stamp(&raw, system_time_epoch(modified))
    }

    /// Blocking variant used by the hook dispatcher while it holds the lock.
    pub fn read_lifecycle_blocking(&self, id: &str) -> RecordRead<StampedLifecycle> {
        let path = self.lifecycle_path(id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return RecordRead::Absent,
            Err(e) => return RecordRead::Malformed(e.to_string()),
        };
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => stamp(&raw, system_time_epoch(modified)),
            Err(e) => RecordRead::Malformed(e.to_string()),
        }
    }

    pub fn write_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        let id = checked_id(&heartbeat.session_id)?;
        let json = serde_json::to_vec_pretty(heartbeat)?;
        self.write_atomic(&self.heartbeat_path(id), &json)
    }

    pub fn write_lifecycle(&self, id: &str, record: &LifecycleRecord) -> Result<()> {
        let id = checked_id(id)?;
        let json = record.to_json()?;
        self.write_atomic(&self.lifecycle_path(id), json.as_bytes())
    }

    /// Remove every file belonging to `id`. Missing files are not an error.
    pub async fn remove_session(&self, id: &str) -> Result<()> {
        let mut first_error = None;
        for path in [
            self.heartbeat_path(id),
            self.lifecycle_path(id),
            self.lock_path(id),
        ] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Take the exclusive lifecycle lock for `id`, waiting at most `timeout`.
    pub fn lock_session(&self, id: &str, timeout: Duration) -> Result<SessionLock> {
        let id = checked_id(id)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(id))?;

        let contended = fs2::lock_contended_error().kind();
        let deadline = Instant::now() + timeout;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(SessionLock { file }),
                Err(e) if e.kind() == contended => {
                    if Instant::now() >= deadline {
                        return Err(BeaconError::LockTimeout(id.to_string()));
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.write_all(contents)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn stamp(raw: &str, written_at: f64) -> RecordRead<StampedLifecycle> {
    match LifecycleRecord::parse(raw) {
        RecordRead::Present(record) => RecordRead::Present(StampedLifecycle { record, written_at }),
        RecordRead::Malformed(reason) => RecordRead::Malformed(reason),
        RecordRead::Absent => RecordRead::Absent,
    }
}

fn checked_id(id: &str) -> Result<&str> {
    if is_valid_session_id(id) {
        Ok(id)
    } else {
        Err(BeaconError::InvalidSessionId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{now_epoch, LifecycleState};

    fn heartbeat(id: &str) -> Heartbeat {
        Heartbeat {
            session_id: id.to_string(),
            last_updated: now_epoch(),
            ..Heartbeat::default()
        }
    }

    #[test]
    fn test_file_name_patterns() {
        assert_eq!(SessionDir::heartbeat_file_id("abc-1.json"), Some("abc-1"));
        assert_eq!(SessionDir::heartbeat_file_id(".abc.state"), None);
        assert_eq!(SessionDir::heartbeat_file_id(".tmpX1y2.json"), None);
        assert_eq!(SessionDir::heartbeat_file_id("notes.txt"), None);
        assert!(SessionDir::is_record_file(Path::new("/x/.abc.state")));
        assert!(SessionDir::is_record_file(Path::new("/x/abc.json")));
        assert!(!SessionDir::is_record_file(Path::new("/x/.abc.lock")));
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path());
        dir.write_heartbeat(&heartbeat("one")).unwrap();
        dir.write_heartbeat(&heartbeat("two")).unwrap();
        dir.write_lifecycle("one", &LifecycleRecord::with_state(LifecycleState::Idle))
            .unwrap();
        std::fs::write(tmp.path().join("README.md"), "hi").unwrap();

        let mut ids = dir.list_session_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_fatal_for_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path().join("missing"));
        assert!(matches!(
            dir.list_session_ids().await,
            Err(BeaconError::SessionDir { .. })
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_round_trip_carries_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path());
        assert_eq!(dir.read_lifecycle("abc").await, RecordRead::Absent);

        let before = now_epoch() - 5.0;
        dir.write_lifecycle("abc", &LifecycleRecord::with_state(LifecycleState::Working))
            .unwrap();
        let stamped = dir.read_lifecycle("abc").await.present().unwrap();
        assert_eq!(stamped.record.state, Some(LifecycleState::Working));
        assert!(stamped.written_at > before);
    }

    #[tokio::test]
    async fn test_remove_session_tolerates_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path());
        dir.write_heartbeat(&heartbeat("abc")).unwrap();

        dir.remove_session("abc").await.unwrap();
        dir.remove_session("abc").await.unwrap();
        assert!(!dir.heartbeat_path("abc").exists());
    }

    #[test]
    fn test_writers_reject_unsafe_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path());
        assert!(matches!(
            dir.write_lifecycle("../x", &LifecycleRecord::default()),
            Err(BeaconError::InvalidSessionId(_))
        ));
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path());

        let held = dir.lock_session("abc", Duration::from_millis(50)).unwrap();
        assert!(matches!(
            dir.lock_session("abc", Duration::from_millis(50)),
            Err(BeaconError::LockTimeout(_))
        ));
        drop(held);
        assert!(dir.lock_session("abc", Duration::from_millis(50)).is_ok());
    }
}
