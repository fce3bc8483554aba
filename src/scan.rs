//! Repository scanner
//!
//! Walks the working tree and produces one `FileItem` per non-skipped
//! regular file, reusing checksums from the stat cache whenever a file's
//! (size, mtime) pair is unchanged. Ignore rules apply to every path
//! component; a matched directory prunes its whole subtree. The top-level
//! private directory is always pruned.

use sha1::{Digest, Sha1};
use std::ffi::OsStr;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

use crate::cache::{CacheEntry, StatCache};
use crate::error::SyncError;
use crate::ignore::IgnoreFilter;
use crate::types::{Checksum, FileItem, Manifest, RepoPath};
use crate::util::CHUNK_SIZE;
use crate::{CACHE_FILE, IGNORE_FILE, PRIVATE_DIR};

pub struct Scanner {
	root: PathBuf,
	filter: IgnoreFilter,
	cache: Option<StatCache>,
}

impl Scanner {
	/// Set up a scanner for `root`: load ignore rules from the repo's
	/// ignore file (if any) and open the stat cache under the private
	/// directory.
	pub fn new(root: &Path) -> Result<Self, SyncError> {
		let ignore_path = root.join(IGNORE_FILE);
		let filter = if ignore_path.is_file() {
			IgnoreFilter::parse(&fs::read_to_string(&ignore_path)?)?
		} else {
			IgnoreFilter::empty()
		};
		let cache = StatCache::open(&root.join(PRIVATE_DIR).join(CACHE_FILE));
		if cache.is_none() {
			debug!("scanning {} without a stat cache", root.display());
		}
		Ok(Scanner { root: root.to_path_buf(), filter, cache })
	}

	/// Walk the tree. On success the stat cache is replaced with this
	/// scan's fingerprints in a single transaction.
	pub fn scan(&self) -> Result<Manifest, SyncError> {
		let mut bag = Manifest::new();
		let mut fresh: Vec<(RepoPath, CacheEntry)> = Vec::new();
		let mut dirs: Vec<(PathBuf, Vec<u8>)> = vec![(self.root.clone(), Vec::new())];

		while let Some((dir, prefix)) = dirs.pop() {
			for entry in fs::read_dir(&dir)? {
				let entry = entry?;
				let name = entry.file_name();
				let name_text = name.to_string_lossy();
				if prefix.is_empty() && name_text == PRIVATE_DIR {
					continue;
				}
				if self.filter.skip(&name_text) {
					continue;
				}

				let mut rel = prefix.clone();
				if !rel.is_empty() {
					rel.push(b'/');
				}
				rel.extend_from_slice(&name_bytes(&name));

				let file_type = entry.file_type()?;
				if file_type.is_dir() {
					dirs.push((entry.path(), rel));
				} else if file_type.is_file() {
					let meta = entry.metadata()?;
					let size = meta.len();
					let mtime = meta
						.modified()?
						.duration_since(UNIX_EPOCH)
						.map(|d| d.as_secs_f64())
						.unwrap_or(0.0);
					let path = RepoPath::new(rel);

					let checksum = match self
						.cache
						.as_ref()
						.and_then(|c| c.lookup(&path, size, mtime))
					{
						Some(cached) => cached,
						None => hash_file(&entry.path(), size)?,
					};

					fresh.push((
						path.clone(),
						CacheEntry { checksum: *checksum.as_bytes(), size, mtime },
					));
					bag.insert(FileItem { path, checksum, size, mtime: Some(mtime) });
				}
				// Symlinks and special files are not synchronized.
			}
		}

		if let Some(cache) = &self.cache {
			if let Err(e) = cache.replace(&fresh) {
				debug!("stat cache update failed: {}", e);
			}
		}
		Ok(bag)
	}
}

/// SHA-1 the file in 64 KiB chunks. A byte count that disagrees with the
/// stat size means the tree changed under the scan, which is fatal.
fn hash_file(path: &Path, expect_size: u64) -> Result<Checksum, SyncError> {
	let mut file = fs::File::open(path)?;
	let mut hasher = Sha1::new();
	let mut buf = vec![0u8; CHUNK_SIZE];
	let mut total: u64 = 0;
	loop {
		let n = file.read(&mut buf)?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
		total += n as u64;
	}
	if total != expect_size {
		return Err(SyncError::integrity(format!(
			"{} changed size during scan: stat says {} bytes, read {}",
			path.display(),
			expect_size,
			total
		)));
	}
	Ok(Checksum::from_digest(hasher.finalize().into()))
}

#[cfg(unix)]
fn name_bytes(name: &OsStr) -> Vec<u8> {
	use std::os::unix::ffi::OsStrExt;
	name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn name_bytes(name: &OsStr) -> Vec<u8> {
	name.to_string_lossy().into_owned().into_bytes()
}


// vim: ts=4
