//! Three-way manifest merge
//!
//! Reconciles a common ancestor snapshot with the client's current scan and
//! the server's latest snapshot. Pure: no I/O, deterministic in its three
//! inputs, mtime never consulted.
//!
//! For a path absent from the ancestor:
//!
//! ```text
//!             | server absent | server present |
//! client abs. |  (no path)    |  take server   |
//! client pres.|  take client  |  conflict *    |
//! ```
//!
//! For a path present in the ancestor ("unchanged" means equal to the
//! ancestor item by (path, checksum, size)):
//!
//! ```text
//!             | server unchanged | server removed | server changed |
//! unchanged   |    take old      |     drop       |  take server   |
//! removed     |    drop          |     drop       |  take server   |
//! changed     |    take client   |  take client   |  conflict *    |
//! ```
//!
//! `*` conflict: the client item enters the merged manifest, the server
//! item is reported in the conflict set for out-of-band handling.

use std::collections::BTreeSet;

use crate::types::{FileItem, Manifest, RepoPath};

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
	pub merged: Manifest,

	/// Server-side items that lost their path to a client-side change,
	/// in path order.
	pub conflicts: Vec<FileItem>,
}

pub fn merge(ancestor: &Manifest, client: &Manifest, server: &Manifest) -> MergeOutcome {
	let mut merged = Manifest::new();
	let mut conflicts = Vec::new();

	let mut paths: BTreeSet<&RepoPath> = BTreeSet::new();
	paths.extend(ancestor.paths());
	paths.extend(client.paths());
	paths.extend(server.paths());

	for path in paths {
		let old = ancestor.get(path);
		let client_item = client.get(path);
		let server_item = server.get(path);

		match old {
			None => {
				// Path born after the ancestor. Both sides absent cannot
				// occur: the path came from the union of the three inputs.
				if let Some(c) = client_item {
					merged.insert(c.clone());
					if let Some(s) = server_item {
						conflicts.push(s.clone());
					}
				} else if let Some(s) = server_item {
					merged.insert(s.clone());
				}
			}
			Some(o) => match (client_item, server_item) {
				(Some(c), Some(s)) if c == o && s == o => {
					merged.insert(o.clone());
				}
				(Some(c), None) if c == o => {
					// Removed on server, untouched on client: drop.
				}
				(Some(c), Some(s)) if c == o => {
					// Changed on server only.
					merged.insert(s.clone());
				}
				(None, Some(s)) if s == o => {
					// Removed on client, untouched on server: drop.
				}
				(None, None) => {
					// Removed on both sides.
				}
				(None, Some(s)) => {
					// Client deleted, server changed: the change wins.
					merged.insert(s.clone());
				}
				(Some(c), Some(s)) if s == o => {
					// Changed on client only.
					merged.insert(c.clone());
				}
				(Some(c), None) => {
					// Server deleted, client changed: the change wins.
					merged.insert(c.clone());
				}
				(Some(c), Some(s)) => {
					// Changed on both sides.
					merged.insert(c.clone());
					conflicts.push(s.clone());
				}
			},
		}
	}

	MergeOutcome { merged, conflicts }
}


// vim: ts=4
