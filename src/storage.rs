//! Key-value storage for the two client-side values the dashboard keeps:
//! the viewer's referral code and the preferred destination token.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::debug;

use crate::error::Error;

pub const REFERRAL_CODE_KEY: &str = "ref";
pub const PREFERRED_TOKEN_KEY: &str = "dexAddress";

pub trait KeyValueStore: Send + Sync + 'static {
    /// Prepares the backing storage. Safe to call more than once.
    fn init(&self) -> Result<(), Error>;

    fn read(&self, key: &str) -> Result<Option<String>, Error>;

    fn write(&self, key: &str, value: &str) -> Result<(), Error>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        let entries = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| Error::StoreError(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::StoreError(e.to_string()))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Flat JSON object on disk, rewritten in full on every write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<String, String>, Error> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let data = fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn init(&self) -> Result<(), Error> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| Error::StoreError(e.to_string()))?;

        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        debug!("Creating store at {}", self.path.display());
        self.save(&HashMap::new())
    }

    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| Error::StoreError(e.to_string()))?;
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| Error::StoreError(e.to_string()))?;
        let mut entries = self.load()?;
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "refswap-{}-{}.json",
            name,
            std::process::id()
        ))
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::with_entries(&[(REFERRAL_CODE_KEY, "abc")]);

        assert_eq!(
            store.read(REFERRAL_CODE_KEY).unwrap(),
            Some(String::from("abc"))
        );
        assert_eq!(store.read(PREFERRED_TOKEN_KEY).unwrap(), None);

        store.write(PREFERRED_TOKEN_KEY, "Bonk1").unwrap();
        assert_eq!(
            store.read(PREFERRED_TOKEN_KEY).unwrap(),
            Some(String::from("Bonk1"))
        );
    }

    #[test]
    fn test_file_store_persists_between_instances() {
        let path = temp_path("persist");
        let _ = fs::remove_file(&path);

        let store = FileStore::new(&path);
        store.init().unwrap();
        assert_eq!(store.read(REFERRAL_CODE_KEY).unwrap(), None);
        store.write(REFERRAL_CODE_KEY, "abc").unwrap();

        let reopened = FileStore::new(&path);
        reopened.init().unwrap();
        assert_eq!(
            reopened.read(REFERRAL_CODE_KEY).unwrap(),
            Some(String::from("abc"))
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_store_reads_missing_file_as_empty() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);

        let store = FileStore::new(&path);
        assert_eq!(store.read(REFERRAL_CODE_KEY).unwrap(), None);
    }
}
