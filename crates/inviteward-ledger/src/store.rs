//! Durable ledger storage.
//!
//! The ledger is small, so it is always loaded and saved whole. The file
//! store writes a sibling temp file, syncs it, then renames it over the
//! real one so a crash mid-save leaves the previous ledger intact.

use crate::error::{Error, Result};
use crate::ledger::Ledger;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Load/save-whole-map persistence.
pub trait LedgerStore: Send + Sync {
    /// Load the full ledger. A store that was never written yields an empty ledger.
    fn load(&self) -> Result<Ledger>;

    /// Replace the stored ledger with `ledger`.
    fn save(&self, ledger: &Ledger) -> Result<()>;
}

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by `path`. The file is created on first save.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> Result<Ledger> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Ledger::new()),
            Err(e) => return Err(e.into()),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Ledger::new());
        }

        let mut ledger: Ledger = serde_json::from_slice(&data)?;
        let repaired = ledger.repair();
        if repaired > 0 {
            tracing::warn!(path = ?self.path, repaired, "Repaired inconsistent ledger entries");
        }
        Ok(ledger)
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.temp_path();
        let json = serde_json::to_vec_pretty(ledger)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Storage(format!("failed to replace {:?}: {}", self.path, e))
        })?;
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
    saves: Mutex<usize>,
    fail_saves: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing ledger.
    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            ..Self::default()
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// Snapshot of what was last saved.
    pub fn stored(&self) -> Ledger {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Ledger> {
        Ok(self.stored())
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        if *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(Error::Storage("save disabled".into()));
        }
        *self.ledger.lock().unwrap_or_else(|e| e.into_inner()) = ledger.clone();
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

impl<S: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Ledger> {
        (**self).load()
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        (**self).save(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("invite_data.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn load_drops_member_listed_under_two_inviters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invite_data.json");
        fs::write(&path, r#"{"1": {"users": ["7"]}, "2": {"users": ["7"]}}"#).unwrap();

        let mut ledger = JsonFileStore::new(&path).load().unwrap();
        ledger.release(UserId(7));

        assert_eq!(ledger.total_for(UserId(1)), 0);
        assert_eq!(ledger.total_for(UserId(2)), 0);
        assert_eq!(ledger.owner_of(UserId(7)), None);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("invite_data.json"));

        let mut ledger = Ledger::new();
        ledger.credit(UserId(1), UserId(100));
        ledger.credit(UserId(1), UserId(101));
        ledger.credit(UserId(2), UserId(200));

        store.save(&ledger).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, ledger);

        // Saving what was loaded changes nothing
        store.save(&loaded).unwrap();
        assert_eq!(store.load().unwrap(), ledger);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("invite_data.json"));
        store.save(&Ledger::new()).unwrap();

        assert!(store.path().exists());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/data/ledger.json"));
        store.save(&Ledger::new()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invite_data.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(Error::Serialization(_))));
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryStore::new();
        store.save(&Ledger::new()).unwrap();
        store.set_fail_saves(true);
        assert!(store.save(&Ledger::new()).is_err());
        assert_eq!(store.save_count(), 1);
    }
}
