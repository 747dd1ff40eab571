// Durable local storage: file locking, atomic writes and the key/value store
// that holds the export checkpoint between invocations.
//
// ⚠️ VERSION BUMP REQUIRED:
// Changes to the on-disk layout of `StoreFile` require incrementing
// STORE_VERSION below so old files are rejected instead of misread.
use crate::context::AppContext;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const STORE_VERSION: u32 = 1;

pub struct LocalStorage;

impl LocalStorage {
    fn get_lock_path(file_path: &Path) -> PathBuf {
        let mut lock_path = file_path.to_path_buf();
        if let Some(ext) = lock_path.extension() {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".lock");
            lock_path.set_extension(new_ext);
        } else {
            lock_path.set_extension("lock");
        }
        lock_path
    }

    /// Run `f` while holding an exclusive advisory lock next to `file_path`.
    pub fn with_lock<F, T>(file_path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock_path = Self::get_lock_path(file_path);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {:?}", lock_path))?;

        file.lock_exclusive()?;
        let result = f();
        FileExt::unlock(&file)?;
        result
    }

    /// Atomic write: Write to .tmp file then rename
    pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}

/// String key/value persistence that survives process restarts.
///
/// Values are opaque strings; callers serialize structured data themselves.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;

    /// Write several entries. Implementations that can do so apply them in one step.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct StoreFile {
    #[serde(default)]
    version: u32,
    entries: BTreeMap<String, String>,
}

/// `KeyValueStore` backed by a single JSON file.
///
/// Every operation is lock -> load -> modify -> atomic write -> unlock, so a
/// crash mid-write leaves the previous contents intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the store at the context's state path.
    pub fn open(ctx: &dyn AppContext) -> Result<Self> {
        Ok(Self::new(ctx.get_state_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_internal(path: &Path) -> Result<StoreFile> {
        if !path.exists() {
            return Ok(StoreFile {
                version: STORE_VERSION,
                entries: BTreeMap::new(),
            });
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {:?}", path))?;
        let file: StoreFile = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse state file {:?}", path))?;
        if file.version != STORE_VERSION {
            anyhow::bail!(
                "State file {:?} has version {}, expected {}",
                path,
                file.version,
                STORE_VERSION
            );
        }
        Ok(file)
    }

    fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        LocalStorage::with_lock(&self.path, || {
            let mut file = Self::load_internal(&self.path)?;
            f(&mut file.entries);
            file.version = STORE_VERSION;
            let json = serde_json::to_string_pretty(&file)?;
            LocalStorage::atomic_write(&self.path, json)?;
            Ok(())
        })
    }

    /// Remove the backing file entirely, including unreadable leftovers.
    pub fn wipe(&self) -> Result<()> {
        LocalStorage::with_lock(&self.path, || {
            if self.path.exists() {
                fs::remove_file(&self.path)
                    .with_context(|| format!("Failed to remove {:?}", self.path))?;
            }
            Ok(())
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        LocalStorage::with_lock(&self.path, || {
            let file = Self::load_internal(&self.path)?;
            Ok(file.entries.get(key).cloned())
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|entries| {
            entries.remove(key);
        })
    }

    fn set_many(&self, pairs: &[(&str, String)]) -> Result<()> {
        self.modify(|entries| {
            for (key, value) in pairs {
                entries.insert(key.to_string(), value.clone());
            }
        })
    }

    fn delete_many(&self, keys: &[&str]) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
    }
}

/// In-process store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}
