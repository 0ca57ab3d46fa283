//! Advisory lock over the reference store.
//!
//! Reference-mutating critical sections (reserve shadow branch, write
//! snapshot, write metadata record, stamp commit trailer) are serialised
//! across CLI invocations by an exclusive file lock in the shared common
//! directory. Released on drop.

use entire_core::{layout, Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

pub struct StateLock {
    _file: File,
}

impl StateLock {
    /// Try to acquire the lock (non-blocking). Fails with
    /// `LockUnavailable` when another process holds it.
    pub fn acquire(common_dir: &Path) -> Result<Self> {
        let path = layout::state_lock_path(common_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| Error::LockUnavailable(path.display().to_string()))?;

        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_drop() {
        let tmp = std::env::temp_dir().join(format!("entire_lock_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let lock = StateLock::acquire(&tmp).unwrap();
        // Second acquire must fail while the first is held
        assert!(matches!(
            StateLock::acquire(&tmp),
            Err(Error::LockUnavailable(_))
        ));
        drop(lock);
        // After drop, acquisition succeeds again
        let _lock2 = StateLock::acquire(&tmp).unwrap();

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
