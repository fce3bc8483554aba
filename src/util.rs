//! Small helpers shared across the crate

use sha1::{Digest, Sha1};

use crate::types::Checksum;

/// Files are hashed and streamed in chunks of this size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-1 of a complete in-memory buffer.
pub fn hash(buf: &[u8]) -> Checksum {
	let mut hasher = Sha1::new();
	hasher.update(buf);
	Checksum::from_digest(hasher.finalize().into())
}


// vim: ts=4
