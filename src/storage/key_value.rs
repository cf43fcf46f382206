use std::{
    any::Any,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;

/// Interface of the underlying store. Values are strings, a missing key is `None`, and removing a
/// missing key is not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Takes the advisory lock `name` without waiting. `None` means it is held elsewhere.
    async fn try_lock(&self, name: &str) -> Result<Option<StoreLock>>;
}

/// Advisory lock taken through [KeyValueStore::try_lock]. Released on drop.
pub struct StoreLock {
    _guard: Box<dyn Any + Send + Sync>,
}

impl StoreLock {
    pub fn new(guard: impl Any + Send + Sync) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

#[async_trait]
impl<T> KeyValueStore for T
where
    T: Deref + Send + Sync,
    T::Target: KeyValueStore,
{
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.deref().get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.deref().set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.deref().remove(key).await
    }

    async fn try_lock(&self, name: &str) -> Result<Option<StoreLock>> {
        self.deref().try_lock(name).await
    }
}

/// The main realization of [KeyValueStore]. Every key is a file inside `dir`. Files are locked
/// while they are read or written, so several processes can share the directory.
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys become file names, anything that could escape the directory is refused.
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            || key.starts_with('.')
        {
            return Err(anyhow!("Illegal storage key {key:?}"));
        }
        Ok(self.dir.join(key))
    }

    async fn read(path: &Path) -> std::result::Result<String, std::io::Error> {
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut content = String::new();
        let result = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        result.map(|_| content)
    }

    async fn write(path: &Path, value: &str) -> std::result::Result<(), std::io::Error> {
        // Truncation happens after acquiring the lock, otherwise a reader could see an empty file.
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;
        file.lock_exclusive()?;
        let result = async {
            file.set_len(0).await?;
            file.write_all(value.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;
        file.unlock_async().await?;
        result
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        debug!("Reading {path:?}");
        match Self::read(&path).await {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)?,
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        debug!("Writing {path:?}");
        Self::write(&path, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        debug!("Removing {path:?}");
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)?,
        }
    }

    async fn try_lock(&self, name: &str) -> Result<Option<StoreLock>> {
        let path = self.path_for(&format!("{name}.lock"))?;
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Locked {path:?}");
                // Closing the file releases the lock.
                Ok(Some(StoreLock::new(file.into_std().await)))
            }
            Err(e) if e.kind() == fs4::lock_contended_error().kind() => {
                debug!("{path:?} is locked elsewhere");
                Ok(None)
            }
            Err(e) => Err(e)?,
        }
    }
}

/// Store kept entirely in memory. Nothing survives the process.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: tokio::sync::Mutex<std::collections::HashMap<String, String>>,
    locks: std::sync::Arc<std::sync::Mutex<std::collections::HashSet<String>>>,
}

#[cfg(test)]
struct MemoryLock {
    locks: std::sync::Arc<std::sync::Mutex<std::collections::HashSet<String>>>,
    name: String,
}

#[cfg(test)]
impl Drop for MemoryLock {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(&self.name);
        }
    }
}

#[cfg(test)]
#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn try_lock(&self, name: &str) -> Result<Option<StoreLock>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| anyhow!("Lock table is poisoned"))?;
        if !locks.insert(name.to_owned()) {
            return Ok(None);
        }
        Ok(Some(StoreLock::new(MemoryLock {
            locks: self.locks.clone(),
            name: name.to_owned(),
        })))
    }
}
