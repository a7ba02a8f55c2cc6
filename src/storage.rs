//! Process-wide model storage location.
//!
//! The directory the local backend loads model weights from is shared by the
//! whole process. It is written once when a session is created, before that
//! session issues any backend call, and is read by the backend whenever it has
//! to resolve a model identifier. There is no teardown.

use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

lazy_static! {
    static ref STORAGE_LOCATION: StorageLocation = StorageLocation::new();
}

/// A guarded slot holding the model storage directory.
///
/// Writes are compared against the current value so that re-applying the same
/// location is a no-op.
#[derive(Debug, Default)]
pub struct StorageLocation {
    path: Mutex<Option<PathBuf>>,
}

impl StorageLocation {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage location.
    ///
    /// Returns `true` if the stored value changed. Empty paths and the value
    /// already held are ignored.
    pub fn set(&self, path: &Path) -> bool {
        if path.as_os_str().is_empty() {
            return false;
        }

        let mut current = self.lock();
        if current.as_deref() == Some(path) {
            return false;
        }
        if let Some(previous) = current.as_deref() {
            warn!(
                "Replacing model directory {} with {}",
                previous.display(),
                path.display()
            );
        }
        *current = Some(path.to_path_buf());
        info!("Model directory set to: {}", path.display());
        true
    }

    /// The current storage location, if one was set
    pub fn get(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PathBuf>> {
        // the slot only ever holds a plain value, so a poisoned lock is still usable
        self.path.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Set the process-wide model storage location.
///
/// Returns `true` if the value was written.
pub fn set_storage_location(path: &Path) -> bool {
    STORAGE_LOCATION.set(path)
}

/// The process-wide model storage location, if one was set
pub fn storage_location() -> Option<PathBuf> {
    STORAGE_LOCATION.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let slot = StorageLocation::new();
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_set_once_per_value() {
        let slot = StorageLocation::new();

        assert!(slot.set(Path::new("/srv/models")));
        assert!(!slot.set(Path::new("/srv/models")));
        assert_eq!(slot.get(), Some(PathBuf::from("/srv/models")));
    }

    #[test]
    fn test_empty_path_is_ignored() {
        let slot = StorageLocation::new();
        assert!(!slot.set(Path::new("")));
        assert_eq!(slot.get(), None);

        slot.set(Path::new("/srv/models"));
        assert!(!slot.set(Path::new("")));
        assert_eq!(slot.get(), Some(PathBuf::from("/srv/models")));
    }

    #[test]
    fn test_replace_with_different_value() {
        let slot = StorageLocation::new();
        slot.set(Path::new("/srv/models"));

        assert!(slot.set(Path::new("/data/weights")));
        assert_eq!(slot.get(), Some(PathBuf::from("/data/weights")));
    }
}
