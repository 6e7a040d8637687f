use std::path::{Component, Path, PathBuf};

use super::repository::{DocumentStorage, StorageError};

/// Reads document bytes from a directory tree. Locations are relative to the root;
/// absolute paths and `..` segments are refused.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(location.trim_start_matches("./"));
        let escapes = relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if escapes || location.trim().is_empty() {
            return Err(StorageError::OutsideRoot(location.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

impl DocumentStorage for FilesystemStorage {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(location)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(location.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}
