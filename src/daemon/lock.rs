//! Advisory singleton lock: one watchdog instance per host.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::core::errors::{Result, WatchdogError};

/// Exclusively-held advisory lock on a well-known path. Held for the
/// process lifetime; releasing removes the file.
#[derive(Debug)]
pub struct SingletonLock {
    lock: Flock<File>,
    path: PathBuf,
}

impl SingletonLock {
    /// Acquire non-blockingly. A held lock is a fatal startup condition,
    /// not something to wait out.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| WatchdogError::io(parent, e))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| WatchdogError::io(path, e))?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                let mut handle: &File = &lock;
                let _ = handle.set_len(0);
                let _ = writeln!(handle, "{}", std::process::id());
                Ok(Self {
                    lock,
                    path: path.to_path_buf(),
                })
            }
            Err((_, _)) => Err(WatchdogError::AlreadyRunning {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Remove the file, then let the lock drop.
    pub fn release(self) {
        let _ = std::fs::remove_file(&self.path);
        drop(self.lock);
    }
}

#[cfg(test)]
mod tests {
    use super::SingletonLock;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nwd.lock");
        let lock = SingletonLock::acquire(&path).expect("first acquire");
        let err = SingletonLock::acquire(&path).unwrap_err();
        assert_eq!(err.code(), "NWD-3101");
        lock.release();
        assert!(!path.exists(), "release removes the lock file");
        SingletonLock::acquire(&path).expect("free again").release();
    }

    #[test]
    fn acquire_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run").join("nwd.lock");
        SingletonLock::acquire(&path).expect("acquire with new parent").release();
    }
}
