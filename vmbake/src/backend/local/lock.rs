//! Per-image build lock.
//!
//! Uses file locking (flock) so only one build of a given image name runs at
//! a time, across processes. Builds of different names use different lock
//! files and never contend.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::{BackendError, BackendResult};

/// A lock guard that holds an exclusive lock on one image name.
///
/// The lock is automatically released when this guard is dropped,
/// or when the process exits/crashes.
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Attempt to acquire the build lock at `lock_path` without blocking.
    ///
    /// Fails with `AlreadyExists` if another build of `name` holds it.
    pub fn acquire(lock_path: &Path, name: &str) -> BackendResult<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackendError::Storage(format!("failed to create locks dir: {}", e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| BackendError::Storage(format!("failed to open lock file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

            if result != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Err(BackendError::AlreadyExists(format!(
                        "a build of image '{}' is already running (lock: {})",
                        name,
                        lock_path.display()
                    )));
                } else {
                    return Err(BackendError::Storage(format!(
                        "failed to acquire build lock: {}",
                        err
                    )));
                }
            }
        }

        #[cfg(not(unix))]
        {
            compile_error!("build locks are only implemented for unix hosts");
        }

        tracing::debug!(lock_path = %lock_path.display(), image = name, "Acquired build lock");

        Ok(BuildLock {
            file,
            path: lock_path.to_path_buf(),
        })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        // Released by the OS when the file closes; unlock explicitly anyway
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }

        tracing::debug!(lock_path = %self.path.display(), "Released build lock");
    }
}
