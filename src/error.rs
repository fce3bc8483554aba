//! Error types for packrat sync sessions

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for a sync session. Every failure in a session funnels
/// into one of these; the server additionally forwards its own failures to
/// the peer as an `error` message before closing.
#[derive(Debug)]
pub enum SyncError {
	/// Unexpected tag or payload for the current protocol state
	Protocol { message: String },

	/// Hash mismatch, size mismatch, or a short byte stream
	Integrity { message: String },

	/// Malformed version-index content (nested)
	Index(IndexError),

	/// Filesystem or transport failure
	Io(io::Error),

	/// The peer closed the channel mid-session
	Disconnected,

	/// Failure reported by the remote server
	Remote { report: String },

	/// Another session holds the store lock
	LockFailed { message: String },

	/// Bad invocation: missing root, malformed remote spec
	Usage { message: String },
}

impl SyncError {
	pub fn protocol(message: impl Into<String>) -> Self {
		SyncError::Protocol { message: message.into() }
	}

	pub fn integrity(message: impl Into<String>) -> Self {
		SyncError::Integrity { message: message.into() }
	}

	pub fn usage(message: impl Into<String>) -> Self {
		SyncError::Usage { message: message.into() }
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Protocol { message } => write!(f, "Protocol error: {}", message),
			SyncError::Integrity { message } => write!(f, "Integrity error: {}", message),
			SyncError::Index(e) => write!(f, "Version-index error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Disconnected => write!(f, "Channel closed unexpectedly"),
			SyncError::Remote { report } => write!(f, "Remote error:\n{}", report),
			SyncError::LockFailed { message } => write!(f, "Lock acquisition failed: {}", message),
			SyncError::Usage { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Io(e) => Some(e),
			SyncError::Index(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<IndexError> for SyncError {
	fn from(e: IndexError) -> Self {
		SyncError::Index(e)
	}
}

/// Structural error in a version-index file: the offending line plus a
/// description of what was wrong with it.
#[derive(Debug)]
pub struct IndexError {
	pub line: String,
	pub message: String,
}

impl IndexError {
	pub fn new(line: &str, message: impl Into<String>) -> Self {
		IndexError { line: line.to_string(), message: message.into() }
	}
}

impl fmt::Display for IndexError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} in line {:?}", self.message, self.line)
	}
}

impl Error for IndexError {}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_display_carries_context() {
		let e = SyncError::protocol("unexpected tag 'bye'");
		assert_eq!(e.to_string(), "Protocol error: unexpected tag 'bye'");

		let e = SyncError::from(IndexError::new("garbage", "missing checksum"));
		assert!(e.to_string().contains("garbage"));
		assert!(e.to_string().contains("missing checksum"));
	}

	#[test]
	fn test_io_conversion() {
		let e: SyncError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
		match e {
			SyncError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::NotFound),
			other => panic!("expected Io, got {:?}", other),
		}
	}
}

// vim: ts=4
