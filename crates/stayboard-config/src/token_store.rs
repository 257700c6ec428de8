// Durable terminal storage on disk.
//
// A flat TOML table of string keys. Every write replaces the whole file
// through a temp file in the same directory, so a crash mid-write leaves
// either the old or the new contents.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use stayboard_core::{CoreError, LocalStorage};
use tracing::debug;

type Table = BTreeMap<String, String>;

/// File-backed [`LocalStorage`].
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

fn storage_err(path: &Path, err: impl std::fmt::Display) -> CoreError {
    CoreError::Storage {
        message: format!("{}: {err}", path.display()),
    }
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<Table, CoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => toml::from_str(&raw).map_err(|e| storage_err(&self.path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(storage_err(&self.path, e)),
        }
    }

    fn write_table(&self, table: &Table) -> Result<(), CoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| storage_err(dir, e))?;

        let body = toml::to_string(table).map_err(|e| storage_err(&self.path, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| storage_err(dir, e))?;
        tmp.write_all(body.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| storage_err(tmp.path(), e))?;
        restrict_permissions(tmp.path()).map_err(|e| storage_err(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| storage_err(&self.path, e.error))?;
        debug!(path = %self.path.display(), "terminal storage written");
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut Table) -> bool) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.read_table()?;
        if f(&mut table) {
            self.write_table(&table)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl LocalStorage for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.read_table()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.modify(|table| {
            table.insert(key.to_owned(), value.to_owned()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.modify(|table| table.remove(key).is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use stayboard_core::DEVICE_TOKEN_KEY;

    #[test]
    fn token_survives_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("terminal.toml");

        FileTokenStore::new(&path)
            .set(DEVICE_TOKEN_KEY, "123456")
            .unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(
            reopened.get(DEVICE_TOKEN_KEY).unwrap().as_deref(),
            Some("123456")
        );
    }

    #[test]
    fn remove_leaves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("terminal.toml"));
        store.set(DEVICE_TOKEN_KEY, "123456").unwrap();
        store.set("surface", "lobby").unwrap();

        store.remove(DEVICE_TOKEN_KEY).unwrap();
        store.remove(DEVICE_TOKEN_KEY).unwrap();
        assert_eq!(store.get(DEVICE_TOKEN_KEY).unwrap(), None);
        assert_eq!(store.get("surface").unwrap().as_deref(), Some("lobby"));
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.toml"));
        assert_eq!(store.get(DEVICE_TOKEN_KEY).unwrap(), None);
        store.remove(DEVICE_TOKEN_KEY).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terminal.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        let store = FileTokenStore::new(&path);
        assert!(matches!(
            store.get(DEVICE_TOKEN_KEY),
            Err(CoreError::Storage { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("terminal.toml"));
        store.set(DEVICE_TOKEN_KEY, "123456").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
