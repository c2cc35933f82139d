//! Data directory lock
//!
//! A PID file in the data directory keeps a second `caseta` instance from
//! opening the same sled database. A lock left behind by a dead process is
//! reclaimed on startup.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".caseta.lock";

    /// Acquire the lock for `data_dir`, creating the directory if needed.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::holder_pid(&lock_path) {
                Some(pid) if Self::is_caseta_process(pid) && pid != std::process::id() => {
                    bail!(
                        "Another caseta instance (PID {pid}) is using {}. \
                         Stop it, or remove {} if it is stale.",
                        data_dir.display(),
                        lock_path.display()
                    );
                }
                _ => {
                    tracing::info!(path = %lock_path.display(), "Removing stale lock file");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
            }
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n"))
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
        tracing::debug!(pid, path = %lock_path.display(), "Acquired data directory lock");

        Ok(Self { lock_path, owned: true })
    }

    fn holder_pid(lock_path: &Path) -> Option<u32> {
        fs::read_to_string(lock_path).ok()?.trim().parse().ok()
    }

    #[cfg(unix)]
    fn is_caseta_process(pid: u32) -> bool {
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("caseta"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_caseta_process(_pid: u32) -> bool {
        true
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock (called automatically on drop)
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "Failed to remove lock file");
            }
            self.owned = false;
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_written_and_released() {
        let dir = tempdir().unwrap();
        let path = {
            let lock = ProcessLock::acquire(dir.path()).unwrap();
            let pid: u32 = fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
            assert_eq!(pid, std::process::id());
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_lock_reclaimed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ProcessLock::LOCK_FILE_NAME), "999999999\n").unwrap();
        let lock = ProcessLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());
    }
}
