//! Ignore rules: compile the repo's ignore file into a name predicate
//!
//! Three rule shapes, applied to individual path components during the
//! walk: `*suffix` (component equals or ends with suffix), `prefix*`
//! (component starts with prefix), and a bare literal (exact match).
//! Matching a directory component prunes its whole subtree.

use glob::Pattern;

use crate::error::SyncError;

pub struct IgnoreFilter {
	rules: Vec<Pattern>,
}

impl IgnoreFilter {
	/// A filter that skips nothing.
	pub fn empty() -> Self {
		IgnoreFilter { rules: Vec::new() }
	}

	/// Compile newline-delimited rules. Lines are trimmed; empty lines are
	/// skipped (a trimmed-empty rule could only match the empty component,
	/// which never occurs).
	pub fn parse(contents: &str) -> Result<Self, SyncError> {
		let mut rules = Vec::new();
		for raw in contents.lines() {
			let line = raw.trim();
			if line.is_empty() {
				continue;
			}
			let glob = if let Some(suffix) = line.strip_prefix('*') {
				format!("*{}", Pattern::escape(suffix))
			} else if let Some(prefix) = line.strip_suffix('*') {
				format!("{}*", Pattern::escape(prefix))
			} else {
				Pattern::escape(line)
			};
			let pattern = Pattern::new(&glob)
				.map_err(|e| SyncError::usage(format!("bad ignore rule {:?}: {}", line, e)))?;
			rules.push(pattern);
		}
		Ok(IgnoreFilter { rules })
	}

	/// True iff any rule matches this path component.
	pub fn skip(&self, name: &str) -> bool {
		self.rules.iter().any(|r| r.matches(name))
	}
}


// vim: ts=4
