//! Stat cache for incremental scanning
//!
//! Maps repo-relative path bytes to the fingerprint of the last scan so an
//! unchanged (size, mtime) pair skips re-hashing. The cache is strictly
//! advisory: any open, read, or decode failure degrades to a full rehash,
//! never to a wrong answer.

use redb::{ReadableDatabase, TableDefinition};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tracing::debug;

use crate::types::{Checksum, RepoPath};

/// Fingerprint of one file at scan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
	pub checksum: [u8; 20],
	pub size: u64,
	pub mtime: f64,
}

/// Key: repo-relative path bytes. Value: bincode-encoded `CacheEntry`.
const FILES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("files");

pub struct StatCache {
	db: redb::Database,
}

impl StatCache {
	/// Open the cache database, recreating it from scratch if the file is
	/// unreadable. Returns `None` only when no database can be had at all,
	/// in which case the scan simply runs uncached.
	pub fn open(db_path: &Path) -> Option<Self> {
		let db = match redb::Database::create(db_path) {
			Ok(db) => db,
			Err(e) => {
				debug!("stat cache at {} unusable ({}), rebuilding", db_path.display(), e);
				let _ = std::fs::remove_file(db_path);
				redb::Database::create(db_path).ok()?
			}
		};
		let cache = StatCache { db };
		match cache.ensure_table() {
			Ok(()) => Some(cache),
			Err(e) => {
				debug!("stat cache table setup failed: {}", e);
				None
			}
		}
	}

	fn ensure_table(&self) -> Result<(), Box<dyn Error>> {
		let write_txn = self.db.begin_write()?;
		let _ = write_txn.open_table(FILES_TABLE)?;
		write_txn.commit()?;
		Ok(())
	}

	/// Cached checksum for `path`, valid only on an exact (size, mtime)
	/// match. Every failure mode is a miss.
	pub fn lookup(&self, path: &RepoPath, size: u64, mtime: f64) -> Option<Checksum> {
		let read_txn = self.db.begin_read().ok()?;
		let table = read_txn.open_table(FILES_TABLE).ok()?;
		let guard = table.get(path.as_bytes()).ok()??;
		let entry: CacheEntry = match bincode::deserialize(guard.value()) {
			Ok(entry) => entry,
			Err(e) => {
				debug!("undecodable cache entry for {}: {}", path, e);
				return None;
			}
		};
		if entry.size == size && entry.mtime == mtime {
			Some(Checksum::from_digest(entry.checksum))
		} else {
			None
		}
	}

	/// Replace the whole table with this scan's entries. One write
	/// transaction, so readers see either the old cache or the new one.
	pub fn replace(&self, entries: &[(RepoPath, CacheEntry)]) -> Result<(), Box<dyn Error>> {
		let write_txn = self.db.begin_write()?;
		write_txn.delete_table(FILES_TABLE)?;
		{
			let mut table = write_txn.open_table(FILES_TABLE)?;
			for (path, entry) in entries {
				let bytes = bincode::serialize(entry)?;
				table.insert(path.as_bytes(), bytes.as_slice())?;
			}
		}
		write_txn.commit()?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::TempDir;

	fn entry(sum_byte: u8, size: u64, mtime: f64) -> CacheEntry {
		CacheEntry { checksum: [sum_byte; 20], size, mtime }
	}

	#[test]
	fn test_lookup_requires_exact_stat_match() {
		let tmp = TempDir::new().unwrap();
		let cache = StatCache::open(&tmp.path().join("cache")).unwrap();

		let path = RepoPath::from("dir/file.txt");
		cache.replace(&[(path.clone(), entry(7, 100, 1234.5))]).unwrap();

		assert_eq!(cache.lookup(&path, 100, 1234.5), Some(Checksum::from_digest([7; 20])));
		assert_eq!(cache.lookup(&path, 101, 1234.5), None);
		assert_eq!(cache.lookup(&path, 100, 1234.6), None);
		assert_eq!(cache.lookup(&RepoPath::from("other"), 100, 1234.5), None);
	}

	#[test]
	fn test_replace_drops_stale_entries() {
		let tmp = TempDir::new().unwrap();
		let cache = StatCache::open(&tmp.path().join("cache")).unwrap();

		let old = RepoPath::from("old.txt");
		let new = RepoPath::from("new.txt");
		cache.replace(&[(old.clone(), entry(1, 10, 1.0))]).unwrap();
		cache.replace(&[(new.clone(), entry(2, 20, 2.0))]).unwrap();

		assert_eq!(cache.lookup(&old, 10, 1.0), None);
		assert_eq!(cache.lookup(&new, 20, 2.0), Some(Checksum::from_digest([2; 20])));
	}

	#[test]
	fn test_corrupt_database_is_rebuilt() {
		let tmp = TempDir::new().unwrap();
		let db_path = tmp.path().join("cache");
		std::fs::write(&db_path, b"this is not a redb file").unwrap();

		let cache = StatCache::open(&db_path).expect("corrupt cache must be rebuilt");
		assert_eq!(cache.lookup(&RepoPath::from("x"), 1, 1.0), None);
	}

	#[test]
	fn test_missing_parent_directory_degrades_to_no_cache() {
		let tmp = TempDir::new().unwrap();
		assert!(StatCache::open(&tmp.path().join("no/such/dir/cache")).is_none());
	}
}

// vim: ts=4
