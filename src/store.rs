//! Locked JSON document store backing the pool, workflow, and budget state.
//!
//! Every invocation of foreman is a short-lived process mutating shared
//! files, so each mutation runs as a read-modify-write cycle under an OS
//! advisory lock (`fs2`) held for the full cycle. Lock files live in a
//! separate `locks/` directory so locking never touches the documents
//! themselves.
//!
//! Loads validate the embedded schema version and reject structurally
//! invalid state with `StoreError::Corrupt` instead of proceeding past it.

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::errors::StoreError;

/// A document type with an embedded schema version.
pub trait Persisted {
    /// Current schema version for this document type.
    const VERSION: u32;

    /// The version recorded in a loaded value.
    fn version(&self) -> u32;
}

/// Handle to one persisted JSON document plus its advisory lock file.
#[derive(Debug)]
pub struct Document<T> {
    path: PathBuf,
    lock_path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> Document<T>
where
    T: Serialize + DeserializeOwned + Persisted,
{
    pub fn new(path: PathBuf, locks_dir: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        Self {
            lock_path: locks_dir.join(format!("{file_name}.lock")),
            path,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Open the lock file and block until the exclusive lock is held.
    /// The lock is released when the returned handle is dropped.
    fn acquire_lock(&self) -> Result<File, StoreError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| self.io_err(e))?;
        lock_file.lock_exclusive().map_err(|e| self.io_err(e))?;
        Ok(lock_file)
    }

    /// Read and validate the document without taking the lock.
    fn read_value(&self) -> Result<Option<T>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        let value: T = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        if value.version() != T::VERSION {
            return Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: format!(
                    "unsupported schema version {} (expected {})",
                    value.version(),
                    T::VERSION
                ),
            });
        }
        Ok(Some(value))
    }

    fn write_value(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let content = serde_json::to_string_pretty(value).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: format!("serialization failed: {e}"),
        })?;
        fs::write(&self.path, content).map_err(|e| self.io_err(e))
    }

    /// Load the document under the lock. Missing file is `None`, not an
    /// error; callers decide whether that is tolerable.
    pub fn load(&self) -> Result<Option<T>, StoreError> {
        let _lock = self.acquire_lock()?;
        self.read_value()
    }

    /// Overwrite the document under the lock.
    pub fn store(&self, value: &T) -> Result<(), StoreError> {
        let _lock = self.acquire_lock()?;
        self.write_value(value)
    }

    /// Run a read-modify-write cycle with the lock held throughout.
    ///
    /// The closure receives the current state (or `None`) and returns the
    /// state to persist plus a result value. Returning `None` leaves the
    /// file untouched, which keeps failed mutations from clobbering state.
    pub fn update<R, E>(
        &self,
        f: impl FnOnce(Option<T>) -> Result<(Option<T>, R), E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let _lock = self.acquire_lock()?;
        let current = self.read_value()?;
        let (next, result) = f(current)?;
        if let Some(value) = next {
            self.write_value(&value)?;
        }
        Ok(result)
    }

    /// Delete the document under the lock. Idempotent.
    pub fn remove(&self) -> Result<(), StoreError> {
        let _lock = self.acquire_lock()?;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestDoc {
        version: u32,
        counter: u32,
    }

    impl Persisted for TestDoc {
        const VERSION: u32 = 1;

        fn version(&self) -> u32 {
            self.version
        }
    }

    fn make_doc(dir: &Path) -> Document<TestDoc> {
        Document::new(dir.join("test.json"), &dir.join("locks"))
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        assert!(doc.load().unwrap().is_none());
        assert!(!doc.exists());
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());

        let value = TestDoc {
            version: 1,
            counter: 7,
        };
        doc.store(&value).unwrap();

        assert!(doc.exists());
        assert_eq!(doc.load().unwrap(), Some(value));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        fs::write(doc.path(), "{ not json }").unwrap();

        let err = doc.load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_load_rejects_version_mismatch() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        fs::write(doc.path(), r#"{"version": 99, "counter": 1}"#).unwrap();

        let err = doc.load().unwrap_err();
        match err {
            StoreError::Corrupt { reason, .. } => {
                assert!(reason.contains("99"));
            }
            other => panic!("Expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_update_creates_from_none() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());

        let created: Result<bool, StoreError> = doc.update(|current| {
            assert!(current.is_none());
            Ok((
                Some(TestDoc {
                    version: 1,
                    counter: 0,
                }),
                true,
            ))
        });
        assert!(created.unwrap());
        assert_eq!(doc.load().unwrap().unwrap().counter, 0);
    }

    #[test]
    fn test_update_mutates_existing() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        doc.store(&TestDoc {
            version: 1,
            counter: 1,
        })
        .unwrap();

        let result: Result<u32, StoreError> = doc.update(|current| {
            let mut value = current.unwrap();
            value.counter += 1;
            let counter = value.counter;
            Ok((Some(value), counter))
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(doc.load().unwrap().unwrap().counter, 2);
    }

    #[test]
    fn test_update_returning_none_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        doc.store(&TestDoc {
            version: 1,
            counter: 5,
        })
        .unwrap();

        let _: Result<(), StoreError> = doc.update(|_| Ok((None, ())));
        assert_eq!(doc.load().unwrap().unwrap().counter, 5);
    }

    #[test]
    fn test_update_error_propagates_without_write() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        doc.store(&TestDoc {
            version: 1,
            counter: 5,
        })
        .unwrap();

        let result: Result<(), StoreError> = doc.update(|_| {
            Err(StoreError::Corrupt {
                path: doc.path().to_path_buf(),
                reason: "simulated".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(doc.load().unwrap().unwrap().counter, 5);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        doc.store(&TestDoc {
            version: 1,
            counter: 1,
        })
        .unwrap();

        doc.remove().unwrap();
        assert!(!doc.exists());
        doc.remove().unwrap();
    }

    #[test]
    fn test_lock_file_created_alongside() {
        let dir = tempdir().unwrap();
        let doc = make_doc(dir.path());
        doc.store(&TestDoc {
            version: 1,
            counter: 1,
        })
        .unwrap();
        assert!(dir.path().join("locks/test.json.lock").exists());
    }
}
