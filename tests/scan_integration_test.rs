//! Scanner behavior against real trees: ignore rules, stat-cache reuse,
//! and cache invalidation.

use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tempfile::TempDir;

use packrat::cache::{CacheEntry, StatCache};
use packrat::scan::Scanner;
use packrat::types::{Checksum, Manifest, RepoPath};
use packrat::util::hash;
use packrat::{CACHE_FILE, IGNORE_FILE, PRIVATE_DIR};

fn write(root: &Path, rel: &str, data: &[u8]) {
	let path = root.join(rel);
	fs::create_dir_all(path.parent().unwrap()).unwrap();
	fs::write(path, data).unwrap();
}

fn pin_mtime(path: &Path, secs: i64) {
	filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn scan(root: &Path) -> Manifest {
	Scanner::new(root).unwrap().scan().unwrap()
}

/// The stat pair exactly as the scanner computes it.
fn stat_pair(path: &Path) -> (u64, f64) {
	let meta = fs::metadata(path).unwrap();
	let mtime =
		meta.modified().unwrap().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
	(meta.len(), mtime)
}

#[test]
fn test_ignore_rules_filter_the_scan() {
	let tmp = TempDir::new().unwrap();
	write(tmp.path(), IGNORE_FILE, b"*.tmp\n");
	write(tmp.path(), "x.tmp", b"scratch");
	write(tmp.path(), "y.txt", b"keep");

	let bag = scan(tmp.path());
	assert!(bag.get(&RepoPath::from("y.txt")).is_some());
	assert!(bag.get(&RepoPath::from("x.tmp")).is_none());
	// The rule file itself is ordinary repository content.
	assert!(bag.get(&RepoPath::from(IGNORE_FILE)).is_some());
}

#[test]
fn test_warm_scan_equals_cold_scan() {
	let tmp = TempDir::new().unwrap();
	fs::create_dir(tmp.path().join(PRIVATE_DIR)).unwrap();
	write(tmp.path(), "a.txt", b"alpha");
	write(tmp.path(), "dir/b.txt", b"beta");
	pin_mtime(&tmp.path().join("a.txt"), 1_700_000_000);
	pin_mtime(&tmp.path().join("dir/b.txt"), 1_700_000_100);

	let cold = scan(tmp.path());
	let warm = scan(tmp.path());

	assert_eq!(cold, warm);
	for (c, w) in cold.iter().zip(warm.iter()) {
		assert_eq!(c.mtime, w.mtime);
		assert_eq!(c.checksum, w.checksum);
	}
}

#[test]
fn test_warm_scan_reuses_cached_checksums() {
	let tmp = TempDir::new().unwrap();
	fs::create_dir(tmp.path().join(PRIVATE_DIR)).unwrap();
	write(tmp.path(), "a.txt", b"alpha");
	pin_mtime(&tmp.path().join("a.txt"), 1_700_000_000);

	// Prime the cache, then poison the stored checksum while keeping the
	// (size, mtime) pair intact. A cache hit is then observable.
	scan(tmp.path());
	let (size, mtime) = stat_pair(&tmp.path().join("a.txt"));
	let poison = [9u8; 20];
	{
		let cache = StatCache::open(&tmp.path().join(PRIVATE_DIR).join(CACHE_FILE)).unwrap();
		cache
			.replace(&[(RepoPath::from("a.txt"), CacheEntry { checksum: poison, size, mtime })])
			.unwrap();
	}

	let bag = scan(tmp.path());
	assert_eq!(
		bag.get(&RepoPath::from("a.txt")).unwrap().checksum,
		Checksum::from_digest(poison),
		"scanner did not consult the stat cache"
	);
}

#[test]
fn test_touched_file_invalidates_cache_entry() {
	let tmp = TempDir::new().unwrap();
	fs::create_dir(tmp.path().join(PRIVATE_DIR)).unwrap();
	write(tmp.path(), "a.txt", b"alpha");
	pin_mtime(&tmp.path().join("a.txt"), 1_700_000_000);
	scan(tmp.path());

	// Same size, new mtime: the cached checksum must not be trusted.
	write(tmp.path(), "a.txt", b"aleph");
	pin_mtime(&tmp.path().join("a.txt"), 1_700_000_500);

	let bag = scan(tmp.path());
	assert_eq!(bag.get(&RepoPath::from("a.txt")).unwrap().checksum, hash(b"aleph"));
}

#[test]
fn test_scan_without_private_dir_is_uncached_but_correct() {
	let tmp = TempDir::new().unwrap();
	write(tmp.path(), "a.txt", b"alpha");

	let first = scan(tmp.path());
	let second = scan(tmp.path());
	assert_eq!(first, second);
	assert_eq!(first.get(&RepoPath::from("a.txt")).unwrap().checksum, hash(b"alpha"));
}
