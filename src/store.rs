use log::warn;
use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use crate::error::Error;
use crate::fingerprint::FingerprintRecord;
use crate::snapshot::{ResourceIdentity, Snapshot};

/// Durable storage of the last-known fingerprint record, one JSON document
/// per watched resource, keyed by [`ResourceIdentity::storage_key`].
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Default location: `<data_dir>/pagewatch`.
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagewatch")
    }

    fn record_path(&self, identity: &ResourceIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", identity.storage_key()))
    }

    fn snapshot_path(&self, identity: &ResourceIdentity) -> PathBuf {
        self.dir
            .join(format!("{}.snapshot.json", identity.storage_key()))
    }

    /// Reads the current record, if any. A missing file is absent; any other
    /// read or parse failure is logged and treated as absent, so a corrupted
    /// state file rebaselines the monitor instead of failing the run.
    pub fn load(&self, identity: &ResourceIdentity) -> Option<FingerprintRecord> {
        let path = self.record_path(identity);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to read state file {}: {e}", path.display());
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("corrupted state file {}: {e}", path.display());
                None
            }
        }
    }

    /// Replaces the current record. Durable before returning.
    pub fn save(&self, identity: &ResourceIdentity, record: &FingerprintRecord) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.record_path(identity), &bytes)
    }

    /// Writes the last successful raw snapshot as a debug artifact.
    pub fn save_debug_snapshot(
        &self,
        identity: &ResourceIdentity,
        snapshot: &Snapshot,
    ) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.snapshot_path(identity), &bytes)
    }

    /// Best-effort delete of the record and debug artifact. Absence is not an
    /// error.
    pub fn clear(&self, identity: &ResourceIdentity) {
        for path in [self.record_path(identity), self.snapshot_path(identity)] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("failed to remove state file {}: {e}", path.display());
                }
            }
        }
    }
}

// Write to a temp file, fsync, then rename over the final path, so a torn
// record is never observable by a subsequent load.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let temp_path = path.with_extension("json.tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
