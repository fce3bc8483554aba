//! Transport bootstrap: spawn the serving process and wire its stdio
//!
//! A remote spec of the form `host:path` runs `packrat serve path` on the
//! host over ssh; anything else is treated as a local store path and
//! served by a child of this binary. Either way the channel rides on the
//! child's stdin/stdout.

use std::process::Stdio;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::channel::Channel;
use crate::error::SyncError;

pub struct Remote {
	pub child: Child,
	pub channel: Channel<ChildStdout, ChildStdin>,
}

pub async fn connect(spec: &str) -> Result<Remote, SyncError> {
	let mut command = match split_remote_spec(spec) {
		Some((host, dir)) => {
			info!("connecting to {} : {}", host, dir);
			let mut c = Command::new("ssh");
			c.arg(host).arg("packrat").arg("serve").arg(dir);
			c
		}
		None => {
			let mut c = Command::new(std::env::current_exe()?);
			c.arg("serve").arg(spec);
			c
		}
	};
	command.stdin(Stdio::piped()).stdout(Stdio::piped());

	let mut child = command.spawn()?;
	let send = child
		.stdin
		.take()
		.ok_or_else(|| SyncError::usage("child stdin unavailable".to_string()))?;
	let recv = child
		.stdout
		.take()
		.ok_or_else(|| SyncError::usage("child stdout unavailable".to_string()))?;
	Ok(Remote { child, channel: Channel::new(recv, send) })
}

/// `host:path` splits at the first colon; specs that start like a path
/// (`/`, `.`, `~`) are always local, as are colon-less specs.
fn split_remote_spec(spec: &str) -> Option<(&str, &str)> {
	if spec.starts_with('/') || spec.starts_with('.') || spec.starts_with('~') {
		return None;
	}
	let colon = spec.find(':')?;
	let (host, dir) = (&spec[..colon], &spec[colon + 1..]);
	if host.is_empty() || dir.is_empty() {
		return None;
	}
	Some((host, dir))
}


// vim: ts=4
