//! Advisory lock for the server's version store
//!
//! Held from the moment a session starts reading the store until its
//! reconcile step finishes. The lock file carries the owning PID so a
//! stale lock can be diagnosed and removed by hand.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

const LOCK_FILE: &str = ".lock";

/// RAII lock guard; the lock file is removed on drop.
#[derive(Debug)]
pub struct StoreLock {
	path: PathBuf,
}

impl StoreLock {
	pub fn acquire(dir: &Path) -> Result<Self, SyncError> {
		let path = dir.join(LOCK_FILE);
		let mut options = fs::OpenOptions::new();
		options.write(true).create_new(true);
		match options.open(&path) {
			Ok(mut file) => {
				use std::io::Write;
				let _ = write!(file, "{}", std::process::id());
				Ok(StoreLock { path })
			}
			Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
				let holder = fs::read_to_string(&path).unwrap_or_default();
				Err(SyncError::LockFailed {
					message: format!(
						"another session holds {} (pid {}); delete the file if it is stale",
						path.display(),
						holder.trim()
					),
				})
			}
			Err(e) => Err(e.into()),
		}
	}
}

impl Drop for StoreLock {
	fn drop(&mut self) {
		let _ = fs::remove_file(&self.path);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_lock_file_records_pid() {
		let tmp = TempDir::new().unwrap();
		let lock = StoreLock::acquire(tmp.path()).unwrap();
		let content = fs::read_to_string(&lock.path).unwrap();
		assert_eq!(content, std::process::id().to_string());
	}

	#[test]
	fn test_lock_released_on_drop() {
		let tmp = TempDir::new().unwrap();
		let path = {
			let lock = StoreLock::acquire(tmp.path()).unwrap();
			lock.path.clone()
		};
		assert!(!path.exists());
		// And it can be taken again.
		let _again = StoreLock::acquire(tmp.path()).unwrap();
	}

	#[test]
	fn test_second_acquire_fails_while_held() {
		let tmp = TempDir::new().unwrap();
		let _lock = StoreLock::acquire(tmp.path()).unwrap();
		match StoreLock::acquire(tmp.path()) {
			Err(SyncError::LockFailed { message }) => {
				assert!(message.contains("stale"));
			}
			other => panic!("expected lock failure, got {:?}", other),
		}
	}
}

// vim: ts=4
