//! Tracing setup for the two process roles.
//!
//! The client logs to stderr. The serve entry point must keep stdout and
//! stdin clean for the protocol, so it appends to the store's debug log
//! instead. Levels are controlled with `RUST_LOG` either way:
//!
//! ```bash
//! RUST_LOG=packrat=trace packrat sync ./tree host:/srv/tree
//! ```

use std::path::Path;
use std::sync::Mutex;

use crate::error::SyncError;

/// Stderr subscriber for client-side runs. Info level by default.
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

/// Append-mode subscriber for serve mode, writing to `debug.log` in the
/// server root. Debug level by default; this is the server's only
/// diagnostic channel.
pub fn init_server_log(log_path: &Path) -> Result<(), SyncError> {
	let file = std::fs::OpenOptions::new().append(true).create(true).open(log_path)?;
	tracing_subscriber::fmt()
		.with_ansi(false)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
		)
		.with_writer(Mutex::new(file))
		.init();
	Ok(())
}

// vim: ts=4
