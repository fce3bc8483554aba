//! Client sync driver
//!
//! Two modes, selected by local state: a root without a private directory
//! gets an initial checkout of the server's latest version; an existing
//! checkout scans, uploads what the server lacks, and applies whatever the
//! server's reconcile sends back. The new version number is persisted in
//! `last_sync` only after the server commits.

use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::channel::{Channel, Message};
use crate::error::SyncError;
use crate::scan::Scanner;
use crate::types::{FileItem, Manifest};
use crate::{LAST_SYNC_FILE, PRIVATE_DIR};

/// Counters for one sync session, reported to the caller.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
	/// The client's new last_sync version.
	pub version: u64,

	/// Blobs uploaded to the server.
	pub files_sent: usize,

	/// Files written into the working tree.
	pub files_received: usize,

	/// Files deleted from the working tree.
	pub files_removed: usize,
}

pub struct Client<R, W> {
	root: PathBuf,
	channel: Channel<R, W>,
}

impl<R, W> Client<R, W>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	pub fn new(root: &Path, channel: Channel<R, W>) -> Self {
		Client { root: root.to_path_buf(), channel }
	}

	/// Run one full sync session, ending with quit/bye.
	pub async fn sync(&mut self) -> Result<SyncReport, SyncError> {
		let report = if self.root.is_dir() {
			if !self.private_dir().is_dir() {
				return Err(SyncError::usage(format!(
					"{} exists but is not a packrat checkout (missing {})",
					self.root.display(),
					PRIVATE_DIR
				)));
			}
			self.merge_session().await?
		} else {
			tokio::fs::create_dir_all(self.private_dir()).await?;
			self.checkout_session().await?
		};

		self.channel.send(&Message::Quit).await?;
		match self.recv().await? {
			Message::Bye => Ok(report),
			other => Err(SyncError::protocol(format!("expected bye, got {}", other.tag()))),
		}
	}

	/// Receive one message, surfacing a forwarded server failure as such.
	async fn recv(&mut self) -> Result<Message, SyncError> {
		match self.channel.recv().await? {
			Message::Error { msg } => Err(SyncError::Remote { report: msg }),
			msg => Ok(msg),
		}
	}

	/// First sync into a fresh root: stream the latest version to disk.
	async fn checkout_session(&mut self) -> Result<SyncReport, SyncError> {
		self.channel.send(&Message::StreamLatestVersion).await?;

		let version = match self.recv().await? {
			Message::VersionNumber { ver } => ver,
			other => {
				return Err(SyncError::protocol(format!(
					"expected version_number, got {}",
					other.tag()
				)))
			}
		};
		self.write_last_sync(version).await?;
		info!("checking out version {}", version);

		let mut report = SyncReport { version, ..Default::default() };
		loop {
			match self.recv().await? {
				Message::Done => break,
				Message::FileBegin(item) => {
					self.receive_file(&item).await?;
					report.files_received += 1;
				}
				other => {
					return Err(SyncError::protocol(format!(
						"expected file_begin or done, got {}",
						other.tag()
					)))
				}
			}
		}
		Ok(report)
	}

	/// Regular sync: scan, upload missing blobs, apply the reconcile.
	async fn merge_session(&mut self) -> Result<SyncReport, SyncError> {
		let base = self.read_last_sync().await?;
		self.channel.send(&Message::Sync { ver: base }).await?;
		match self.recv().await? {
			Message::WaitingForFiles => {}
			other => {
				return Err(SyncError::protocol(format!(
					"expected waiting_for_files, got {}",
					other.tag()
				)))
			}
		}

		// Hashing is CPU-bound; keep it off the protocol task.
		let root = self.root.clone();
		let scanned = tokio::task::spawn_blocking(move || -> Result<Manifest, SyncError> {
			Scanner::new(&root)?.scan()
		})
		.await
		.map_err(|e| SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
		info!("scanned {} files at base version {}", scanned.len(), base);

		let mut report = SyncReport::default();
		for item in &scanned {
			self.channel.send(&Message::FileMeta(item.clone())).await?;
			match self.recv().await? {
				Message::Continue => {}
				Message::Data { hsh } => {
					if hsh != item.checksum {
						return Err(SyncError::protocol(format!(
							"server requested blob {} after {} announced {}",
							hsh, item.path, item.checksum
						)));
					}
					debug!("uploading {} ({} bytes)", item.path, item.size);
					let mut file =
						tokio::fs::File::open(self.root.join(item.path.to_native())).await?;
					self.channel.send_stream(&mut file, item.size).await?;
					report.files_sent += 1;
				}
				other => {
					return Err(SyncError::protocol(format!(
						"expected continue or data, got {}",
						other.tag()
					)))
				}
			}
		}
		self.channel.send(&Message::Done).await?;

		loop {
			match self.recv().await? {
				Message::FileBegin(item) => {
					self.receive_file(&item).await?;
					report.files_received += 1;
				}
				Message::FileRemove(item) => {
					if !item.path.is_clean() {
						return Err(SyncError::protocol(format!(
							"refusing unsafe removal path from server: {}",
							item.path
						)));
					}
					debug!("removing {}", item.path);
					tokio::fs::remove_file(self.root.join(item.path.to_native())).await?;
					report.files_removed += 1;
				}
				Message::SyncComplete { ver } => {
					if ver < base {
						return Err(SyncError::protocol(format!(
							"sync_complete version {} is below base {}",
							ver, base
						)));
					}
					self.write_last_sync(ver).await?;
					report.version = ver;
					break;
				}
				other => {
					return Err(SyncError::protocol(format!(
						"expected file_begin, file_remove or sync_complete, got {}",
						other.tag()
					)))
				}
			}
		}
		Ok(report)
	}

	/// Write one incoming file: temp in the target directory, stream the
	/// blob bytes into it, rename into place.
	async fn receive_file(&mut self, item: &FileItem) -> Result<(), SyncError> {
		if !item.path.is_clean() {
			return Err(SyncError::protocol(format!(
				"refusing unsafe path from server: {}",
				item.path
			)));
		}
		let target = self.root.join(item.path.to_native());
		if let Some(parent) = target.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let tmp = tmp_path(&target);
		let mut file = tokio::fs::File::create(&tmp).await?;
		let received = self.channel.recv_stream(&mut file, item.size).await;
		drop(file);
		if let Err(e) = received {
			let _ = tokio::fs::remove_file(&tmp).await;
			return Err(e);
		}
		tokio::fs::rename(&tmp, &target).await?;
		debug!("wrote {} ({} bytes)", item.path, item.size);
		Ok(())
	}

	fn private_dir(&self) -> PathBuf {
		self.root.join(PRIVATE_DIR)
	}

	fn last_sync_path(&self) -> PathBuf {
		self.private_dir().join(LAST_SYNC_FILE)
	}

	async fn read_last_sync(&self) -> Result<u64, SyncError> {
		let path = self.last_sync_path();
		let text = tokio::fs::read_to_string(&path).await?;
		text.trim()
			.parse()
			.map_err(|_| SyncError::integrity(format!("corrupt {}: {:?}", path.display(), text)))
	}

	async fn write_last_sync(&self, version: u64) -> Result<(), SyncError> {
		tokio::fs::write(self.last_sync_path(), format!("{}\n", version)).await?;
		Ok(())
	}
}

fn tmp_path(target: &Path) -> PathBuf {
	let mut name = target.file_name().unwrap_or_default().to_os_string();
	name.push(".packrat-tmp");
	target.with_file_name(name)
}


// vim: ts=4
