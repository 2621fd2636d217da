use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

pub type StoreResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Durable string-keyed value store, scoped to one profile.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read `key`, returning `default` when it has never been written.
    async fn get(&self, key: &str, default: Value) -> StoreResult<Value>;

    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;
}

/// A flat JSON object on disk.
///
/// Every `set` rereads the file, updates one key, and replaces the file via a
/// temp-file rename while holding an exclusive lock on `<file>.lock`. If
/// another process holds the lock the write fails immediately. File access
/// runs on the blocking pool.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store.json".into());
    name.push(".lock");
    path.with_file_name(name)
}

fn read_all(path: &Path) -> StoreResult<BTreeMap<String, Value>> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(text) => serde_json::from_str(&text)
            .map_err(|err| format!("invalid {}: {err}", path.display()).into()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

fn acquire_lock(path: &Path) -> StoreResult<fs::File> {
    use fs2::FileExt;

    let lock_path = lock_path(path);
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| format!("{} is locked by another process", path.display()))?;
    Ok(file)
}

fn write_key(path: &Path, key: &str, value: Value) -> StoreResult<()> {
    let _lock = acquire_lock(path)?;
    let mut entries = read_all(path)?;
    entries.insert(key.to_string(), value);

    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("store path has no parent"))?;
    fs::create_dir_all(parent)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, serde_json::to_vec_pretty(&entries)?)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str, default: Value) -> StoreResult<Value> {
        let path = self.path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> StoreResult<Value> {
            let mut entries = read_all(&path)?;
            Ok(entries.remove(&key).unwrap_or(default))
        })
        .await?
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let path = self.path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || write_key(&path, &key, value)).await?
    }
}

/// Process-local store; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str, default: Value) -> StoreResult<Value> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| "memory store lock poisoned")?;
        Ok(guard.get(key).cloned().unwrap_or(default))
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| "memory store lock poisoned")?;
        guard.insert(key.to_string(), value);
        Ok(())
    }
}
