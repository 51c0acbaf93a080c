use std::fs;
use std::io::Write;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::BatchError;

/// Destination for fetched resources, addressed by storage key.
pub trait StorageSink: Send + Sync {
    /// Creates the destination if it is missing. Safe to call repeatedly.
    fn ensure(&self) -> Result<(), BatchError> {
        Ok(())
    }

    /// Rejects keys this sink can never store, before anything is fetched.
    fn check_key(&self, _key: &str) -> Result<(), BatchError> {
        Ok(())
    }

    fn exists(&self, key: &str) -> bool;

    /// Either the whole payload lands under `key` or nothing does.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BatchError>;
}

/// Stores each key as a file relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: Utf8PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn key_path(&self, key: &str) -> Result<Utf8PathBuf, BatchError> {
        let relative = Utf8Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Utf8Component::Normal(_)));
        if !is_plain {
            return Err(BatchError::Write {
                key: key.to_string(),
                message: "storage key must be a relative path without '..'".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl StorageSink for DirectorySink {
    fn ensure(&self) -> Result<(), BatchError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| BatchError::Filesystem(format!("create {}: {err}", self.root)))
    }

    fn check_key(&self, key: &str) -> Result<(), BatchError> {
        self.key_path(key).map(|_| ())
    }

    fn exists(&self, key: &str) -> bool {
        self.key_path(key)
            .map(|path| path.as_std_path().is_file())
            .unwrap_or(false)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BatchError> {
        let write_err = |message: String| BatchError::Write {
            key: key.to_string(),
            message,
        };
        let path = self.key_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| write_err("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path()).map_err(|err| write_err(err.to_string()))?;

        let mut temp = Builder::new()
            .prefix(".dated-fetch")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        temp.write_all(bytes)
            .map_err(|err| write_err(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| write_err(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| write_err(err.error.to_string()))?;
        Ok(())
    }
}
