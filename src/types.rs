//! Core value types: checksums, repository paths, file items, manifests.

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::path;
use std::str::FromStr;

/// SHA-1 content checksum. Rendered as 40 lowercase hex characters
/// everywhere it leaves the process (wire, version-index, blob names).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum([u8; 20]);

impl Checksum {
	pub fn from_digest(bytes: [u8; 20]) -> Self {
		Checksum(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; 20] {
		&self.0
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}
}

impl fmt::Display for Checksum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl fmt::Debug for Checksum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Checksum({})", self.to_hex())
	}
}

impl FromStr for Checksum {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, String> {
		if s.len() != 40 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
			return Err(format!("invalid checksum: {:?}", s));
		}
		let bytes = hex::decode(s).map_err(|e| format!("invalid checksum {:?}: {}", s, e))?;
		let mut sum = [0u8; 20];
		sum.copy_from_slice(&bytes);
		Ok(Checksum(sum))
	}
}

impl Serialize for Checksum {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Checksum {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(de::Error::custom)
	}
}

/// Repository-relative path: slash-separated bytes, no leading slash,
/// case-sensitive. Paths are raw POSIX bytes; when they cross a text
/// boundary (wire messages, version-index) each byte is encoded as one
/// Unicode code point <= 0xFF so non-UTF-8 names survive the round trip.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoPath(Vec<u8>);

impl RepoPath {
	pub fn new(bytes: Vec<u8>) -> Self {
		RepoPath(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// One code point per byte, the inverse of `from_latin1`.
	pub fn to_latin1(&self) -> String {
		self.0.iter().map(|&b| b as char).collect()
	}

	pub fn from_latin1(s: &str) -> Result<Self, String> {
		let mut bytes = Vec::with_capacity(s.len());
		for c in s.chars() {
			let cp = c as u32;
			if cp > 0xFF {
				return Err(format!("path code point U+{:04X} out of byte range", cp));
			}
			bytes.push(cp as u8);
		}
		Ok(RepoPath(bytes))
	}

	/// A path is clean when it can be safely joined below a root:
	/// relative, slash-separated, and free of empty / `.` / `..` segments.
	pub fn is_clean(&self) -> bool {
		!self.0.is_empty()
			&& self.0.split(|&b| b == b'/').all(|seg| !seg.is_empty() && seg != b"." && seg != b"..")
	}

	/// Convert to a native relative path for filesystem access.
	#[cfg(unix)]
	pub fn to_native(&self) -> path::PathBuf {
		use std::os::unix::ffi::OsStrExt;
		path::PathBuf::from(std::ffi::OsStr::from_bytes(&self.0))
	}

	#[cfg(not(unix))]
	pub fn to_native(&self) -> path::PathBuf {
		path::PathBuf::from(String::from_utf8_lossy(&self.0).into_owned())
	}
}

impl fmt::Display for RepoPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&String::from_utf8_lossy(&self.0))
	}
}

impl fmt::Debug for RepoPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RepoPath({:?})", String::from_utf8_lossy(&self.0))
	}
}

impl From<&str> for RepoPath {
	fn from(s: &str) -> Self {
		RepoPath(s.as_bytes().to_vec())
	}
}

impl Serialize for RepoPath {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_latin1())
	}
}

impl<'de> Deserialize<'de> for RepoPath {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		RepoPath::from_latin1(&s).map_err(de::Error::custom)
	}
}

/// Metadata for one regular file. `mtime` is only present when the item
/// came from a live filesystem scan; it never takes part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileItem {
	#[serde(rename = "pth")]
	pub path: RepoPath,

	#[serde(rename = "hsh")]
	pub checksum: Checksum,

	#[serde(rename = "sz")]
	pub size: u64,

	#[serde(rename = "mt", skip_serializing_if = "Option::is_none", default)]
	pub mtime: Option<f64>,
}

impl PartialEq for FileItem {
	fn eq(&self, other: &Self) -> bool {
		// Identity is (path, checksum, size); mtime is advisory.
		self.path == other.path && self.checksum == other.checksum && self.size == other.size
	}
}

impl Eq for FileItem {}

/// One snapshot of the tree: a set of `FileItem`s with unique paths,
/// iterated in bytewise path order. Doubles as the by-path lookup table
/// for the merge and the ordered source for the version-index codec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
	items: BTreeMap<RepoPath, FileItem>,
}

impl Manifest {
	pub fn new() -> Self {
		Manifest { items: BTreeMap::new() }
	}

	/// Insert an item under its path. Returns the previously stored item
	/// if the path was already present.
	pub fn insert(&mut self, item: FileItem) -> Option<FileItem> {
		self.items.insert(item.path.clone(), item)
	}

	pub fn get(&self, path: &RepoPath) -> Option<&FileItem> {
		self.items.get(path)
	}

	pub fn contains_path(&self, path: &RepoPath) -> bool {
		self.items.contains_key(path)
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Items in ascending path order.
	pub fn iter(&self) -> btree_map::Values<'_, RepoPath, FileItem> {
		self.items.values()
	}

	pub fn paths(&self) -> btree_map::Keys<'_, RepoPath, FileItem> {
		self.items.keys()
	}
}

impl<'a> IntoIterator for &'a Manifest {
	type Item = &'a FileItem;
	type IntoIter = btree_map::Values<'a, RepoPath, FileItem>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn item(path: &str, sum: &str, size: u64, mtime: Option<f64>) -> FileItem {
		FileItem { path: path.into(), checksum: sum.parse().unwrap(), size, mtime }
	}

	const SUM_A: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
	const SUM_B: &str = "356a192b7913b04c54574d18c28d46e6395428ab";

	#[test]
	fn test_checksum_roundtrip() {
		let sum: Checksum = SUM_A.parse().unwrap();
		assert_eq!(sum.to_hex(), SUM_A);
		assert_eq!(sum.to_hex().parse::<Checksum>().unwrap(), sum);
	}

	#[test]
	fn test_checksum_rejects_malformed() {
		assert!("".parse::<Checksum>().is_err());
		assert!("da39a3".parse::<Checksum>().is_err());
		// Uppercase is not the canonical form.
		assert!(SUM_A.to_uppercase().parse::<Checksum>().is_err());
		assert!("zz39a3ee5e6b4b0d3255bfef95601890afd80709".parse::<Checksum>().is_err());
	}

	#[test]
	fn test_repo_path_latin1_roundtrip() {
		let path = RepoPath::new(vec![b'a', b'/', 0x00, 0x7F, 0x80, 0xFF]);
		let encoded = path.to_latin1();
		assert_eq!(RepoPath::from_latin1(&encoded).unwrap(), path);
	}

	#[test]
	fn test_repo_path_rejects_wide_code_points() {
		assert!(RepoPath::from_latin1("caf\u{0100}").is_err());
	}

	#[test]
	fn test_repo_path_cleanliness() {
		assert!(RepoPath::from("a/b.txt").is_clean());
		assert!(!RepoPath::from("").is_clean());
		assert!(!RepoPath::from("/etc/passwd").is_clean());
		assert!(!RepoPath::from("a//b").is_clean());
		assert!(!RepoPath::from("a/../b").is_clean());
		assert!(!RepoPath::from("./a").is_clean());
	}

	#[test]
	fn test_file_item_equality_ignores_mtime() {
		let a = item("a.txt", SUM_A, 3, Some(1000.5));
		let b = item("a.txt", SUM_A, 3, None);
		assert_eq!(a, b);

		let c = item("a.txt", SUM_B, 3, Some(1000.5));
		assert_ne!(a, c);
	}

	#[test]
	fn test_manifest_orders_by_path_bytes() {
		let mut bag = Manifest::new();
		bag.insert(item("b", SUM_A, 1, None));
		bag.insert(item("a/z", SUM_A, 1, None));
		bag.insert(item("a.txt", SUM_A, 1, None));

		let order: Vec<String> = bag.iter().map(|i| i.path.to_string()).collect();
		assert_eq!(order, vec!["a.txt", "a/z", "b"]);
	}

	#[test]
	fn test_manifest_insert_reports_duplicate() {
		let mut bag = Manifest::new();
		assert!(bag.insert(item("a", SUM_A, 1, None)).is_none());
		let old = bag.insert(item("a", SUM_B, 2, None));
		assert_eq!(old.unwrap().checksum.to_hex(), SUM_A);
		assert_eq!(bag.len(), 1);
	}

	#[test]
	fn test_manifest_equality_ignores_mtime() {
		let mut x = Manifest::new();
		x.insert(item("a", SUM_A, 1, Some(5.0)));
		let mut y = Manifest::new();
		y.insert(item("a", SUM_A, 1, None));
		assert_eq!(x, y);
	}
}

// vim: ts=4
