//! Version-index codec
//!
//! Text, line-oriented, one file item per line in ascending path-byte
//! order:
//!
//! ```text
//! "<checksum>" <size, right-justified to 10 columns> "<path>"
//! ```
//!
//! Checksum and path are JSON-quoted; the path string carries one code
//! point per byte so non-UTF-8 names survive the round trip. Items read
//! back with `mtime` unset.

use crate::error::IndexError;
use crate::types::{Checksum, FileItem, Manifest, RepoPath};

/// Parse one index line.
pub fn parse_line(line: &str) -> Result<FileItem, IndexError> {
	let rest = line.trim_end();
	if !rest.starts_with('"') {
		return Err(IndexError::new(line, "missing checksum"));
	}
	// The checksum is bare hex, so the next quote must terminate it.
	let close = match rest[1..].find('"') {
		Some(i) => i + 1,
		None => return Err(IndexError::new(line, "unterminated checksum")),
	};
	let checksum: Checksum =
		rest[1..close].parse().map_err(|e: String| IndexError::new(line, e))?;

	let after = &rest[close + 1..];
	let path_start = match after.find('"') {
		Some(i) => i,
		None => return Err(IndexError::new(line, "missing path")),
	};
	let size_field = after[..path_start].trim();
	if size_field.is_empty() {
		return Err(IndexError::new(line, "missing size"));
	}
	let size: u64 = size_field
		.parse()
		.map_err(|_| IndexError::new(line, format!("bad size {:?}", size_field)))?;

	let path_text: String = serde_json::from_str(&after[path_start..])
		.map_err(|e| IndexError::new(line, format!("bad path string: {}", e)))?;
	let path = RepoPath::from_latin1(&path_text).map_err(|e| IndexError::new(line, e))?;

	Ok(FileItem { path, checksum, size, mtime: None })
}

/// Format one item as an index line, without the trailing LF.
pub fn format_line(item: &FileItem) -> String {
	let quoted_path = serde_json::Value::String(item.path.to_latin1()).to_string();
	format!("\"{}\" {:>10} {}", item.checksum, item.size, quoted_path)
}

/// Lazily parse index lines.
pub fn parse_lines<'a>(contents: &'a str) -> impl Iterator<Item = Result<FileItem, IndexError>> + 'a {
	contents.lines().map(parse_line)
}

/// Parse a whole index file into a manifest, rejecting duplicate paths.
pub fn parse_manifest(contents: &str) -> Result<Manifest, IndexError> {
	let mut bag = Manifest::new();
	for parsed in parse_lines(contents) {
		let item = parsed?;
		let line = format_line(&item);
		if bag.insert(item).is_some() {
			return Err(IndexError::new(&line, "duplicate path"));
		}
	}
	Ok(bag)
}

/// Render a manifest as index text. `Manifest` iterates in path order, so
/// the output ordering is globally fixed.
pub fn format_manifest(bag: &Manifest) -> String {
	let mut out = String::new();
	for item in bag {
		out.push_str(&format_line(item));
		out.push('\n');
	}
	out
}


// vim: ts=4
