use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use engine_logging::{engine_error, engine_info, engine_warn};
use lexplan_core::SessionSnapshot;
use tempfile::NamedTempFile;

/// Key under which the session snapshot lives in the durable store. One file
/// per key; this store has exactly one.
const STORE_KEY: &str = "advancedAnalysisState";

/// File-backed durable store for the session snapshot. Single writer: only
/// the runtime dispatch loop touches it.
pub(crate) struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(format!("{STORE_KEY}.json"))
    }

    /// Loads the persisted snapshot. Anything unreadable, unparsable or
    /// carrying a stale schema version is removed and treated as absent;
    /// this never fails the caller.
    pub(crate) fn load(&self) -> Option<SessionSnapshot> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return None;
            }
            Err(err) => {
                engine_warn!("failed to read session state from {:?}: {}", path, err);
                return None;
            }
        };

        let snapshot: SessionSnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                engine_warn!("discarding corrupt session state at {:?}: {}", path, err);
                self.clear();
                return None;
            }
        };

        if !snapshot.is_current_version() {
            engine_info!(
                "discarding session state with schema version {}",
                snapshot.version
            );
            self.clear();
            return None;
        }

        engine_info!("restored session state from {:?}", path);
        Some(snapshot)
    }

    /// Writes the whole snapshot atomically (temp file, then rename).
    /// Failures are logged, never propagated.
    pub(crate) fn save(&self, snapshot: &SessionSnapshot) {
        if let Err(err) = ensure_dir(&self.dir) {
            engine_error!("failed to prepare state dir {:?}: {}", self.dir, err);
            return;
        }
        let content = match serde_json::to_string_pretty(snapshot) {
            Ok(text) => text,
            Err(err) => {
                engine_error!("failed to serialize session state: {}", err);
                return;
            }
        };
        if let Err(err) = write_atomically(&self.dir, &self.path(), &content) {
            engine_error!("failed to write session state to {:?}: {}", self.dir, err);
        }
    }

    /// Removes the persisted snapshot, if any.
    pub(crate) fn clear(&self) {
        match fs::remove_file(self.path()) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => engine_warn!("failed to clear session state: {}", err),
        }
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_atomically(dir: &Path, target: &Path, content: &str) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|err| err.error)?;
    Ok(())
}
