//! Storage abstractions for persisting engine state.
//!
//! The engine treats persistence as an opaque key-value store of byte blobs.
//! Missing keys read as empty collections and malformed blobs are discarded,
//! so a storage hiccup never turns into a failed authorization request.

#[cfg(feature = "audit")]
use log::warn;

use crate::error::{Error, Result};
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// Trait for loading and saving named blobs.
pub trait Storage: Send + Sync {
    /// Load the blob stored under `key`, or `None` if absent.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous value.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).save(key, bytes)
    }
}

/// Load and decode a JSON value, falling back to `T::default()` when the key is
/// absent, unreadable or malformed.
pub fn load_json_or_default<T>(storage: &dyn Storage, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match storage.load(key) {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|_e| {
            #[cfg(feature = "audit")]
            warn!("Discarding malformed data stored under '{key}': {_e}");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(_e) => {
            #[cfg(feature = "audit")]
            warn!("Failed to load '{key}', starting empty: {_e}");
            T::default()
        }
    }
}

/// Encode a value as JSON and save it.
pub fn save_json<T>(storage: &dyn Storage, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    storage.save(key, &bytes)
}

/// In-memory storage implementation using DashMap for thread safety.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    blobs: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance.
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(DashMap::new()),
        }
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).map(|blob| blob.clone()))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// File-based storage implementation (requires persistence feature).
#[cfg(feature = "persistence")]
pub mod file_storage {
    use super::*;
    use std::{
        fs,
        io::ErrorKind,
        path::{Path, PathBuf},
        sync::Mutex,
    };

    /// File-based storage that keeps one JSON file per key inside a directory.
    #[derive(Debug)]
    pub struct FileStorage {
        directory: PathBuf,
        // Serializes writers so a save never interleaves with another save.
        write_lock: Mutex<()>,
    }

    impl FileStorage {
        /// Create a new file storage rooted at `directory`, creating it if needed.
        pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
            let directory = directory.as_ref().to_path_buf();
            fs::create_dir_all(&directory).map_err(|e| {
                Error::Storage(format!("Failed to create storage directory: {e}"))
            })?;

            Ok(Self {
                directory,
                write_lock: Mutex::new(()),
            })
        }

        /// Get the storage directory.
        pub fn directory(&self) -> &Path {
            &self.directory
        }

        fn path_for(&self, key: &str) -> Result<PathBuf> {
            let valid = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(Error::Storage(format!("Invalid storage key '{key}'")));
            }
            Ok(self.directory.join(format!("{key}.json")))
        }
    }

    impl Storage for FileStorage {
        fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let path = self.path_for(key)?;
            match fs::read(&path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::Storage(format!(
                    "Failed to read '{}': {e}",
                    path.display()
                ))),
            }
        }

        fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
            let path = self.path_for(key)?;
            let _guard = self
                .write_lock
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            let staging = path.with_extension("json.tmp");
            fs::write(&staging, bytes)
                .and_then(|_| fs::rename(&staging, &path))
                .map_err(|e| Error::Storage(format!("Failed to write '{}': {e}", path.display())))
        }
    }
}

#[cfg(feature = "persistence")]
pub use file_storage::FileStorage;
