//! Server sync driver
//!
//! Runs one client session end-to-end over the framed channel. The store
//! under the server root is append-only: blobs land in the pool under
//! their checksum, and every reconcile that changes the tree writes a new
//! immutable version-index. Failures are forwarded to the peer as an
//! `error` message before the channel closes.

use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::channel::{Channel, Message};
use crate::error::SyncError;
use crate::index;
use crate::lock::StoreLock;
use crate::merge::merge;
use crate::pool::BlobPool;
use crate::types::Manifest;
use crate::{OBJECTS_DIR, VERSIONS_DIR};

pub struct Server {
	root: PathBuf,
	pool: BlobPool,
}

impl Server {
	/// Open an initialized store.
	pub fn open(root: &Path) -> Result<Self, SyncError> {
		if !root.is_dir() {
			return Err(SyncError::usage(format!("no such server root: {}", root.display())));
		}
		if !root.join(VERSIONS_DIR).is_dir() {
			return Err(SyncError::usage(format!(
				"{} is not a packrat store (run `packrat init` first)",
				root.display()
			)));
		}
		let pool = BlobPool::open(&root.join(OBJECTS_DIR))?;
		Ok(Server { root: root.to_path_buf(), pool })
	}

	/// Initialize a store: blob pool, versions directory, and the empty
	/// version 0.
	pub fn init(root: &Path) -> Result<(), SyncError> {
		if root.join(OBJECTS_DIR).exists() || root.join(VERSIONS_DIR).exists() {
			return Err(SyncError::usage(format!("{} is already initialized", root.display())));
		}
		std::fs::create_dir_all(root)?;
		std::fs::create_dir(root.join(OBJECTS_DIR))?;
		std::fs::create_dir(root.join(VERSIONS_DIR))?;
		std::fs::write(root.join(VERSIONS_DIR).join("0"), b"")?;
		Ok(())
	}

	/// Run one session, reporting any failure to the peer before closing.
	pub async fn serve<R, W>(&self, channel: &mut Channel<R, W>) -> Result<(), SyncError>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		match self.session(channel).await {
			Ok(()) => Ok(()),
			Err(e) => {
				warn!("session failed: {}", e);
				let _ = channel.send(&Message::Error { msg: e.to_string() }).await;
				Err(e)
			}
		}
	}

	async fn session<R, W>(&self, channel: &mut Channel<R, W>) -> Result<(), SyncError>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		match channel.recv().await? {
			Message::Sync { ver } => self.merge_session(channel, ver).await,
			Message::StreamLatestVersion => self.checkout_session(channel).await,
			other => Err(SyncError::protocol(format!(
				"expected sync or stream_latest_version, got {}",
				other.tag()
			))),
		}
	}

	/// Initial checkout: stream every file of the latest version.
	async fn checkout_session<R, W>(&self, channel: &mut Channel<R, W>) -> Result<(), SyncError>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let _lock = StoreLock::acquire(&self.versions_dir())?;
		let latest = self.latest_version()?;
		let bag = self.load_manifest(latest).await?;
		debug!("initial checkout of version {} ({} files)", latest, bag.len());

		channel.send(&Message::VersionNumber { ver: latest }).await?;
		for item in &bag {
			channel.send(&Message::FileBegin(item.clone())).await?;
			let mut blob = self.pool.read(&item.checksum).await?;
			channel.send_stream(&mut blob, item.size).await?;
		}
		channel.send(&Message::Done).await?;
		self.expect_quit(channel).await
	}

	/// Merge-mode session against a client that has synced before.
	async fn merge_session<R, W>(
		&self,
		channel: &mut Channel<R, W>,
		base: u64,
	) -> Result<(), SyncError>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let _lock = StoreLock::acquire(&self.versions_dir())?;
		let latest = self.latest_version()?;
		if base > latest {
			return Err(SyncError::protocol(format!(
				"client base version {} is ahead of latest version {}",
				base, latest
			)));
		}
		let server_bag = self.load_manifest(latest).await?;
		debug!("sync at version {}, client base is {}", latest, base);

		channel.send(&Message::WaitingForFiles).await?;

		// Receive the client's scan, pulling every blob the pool lacks.
		// Strictly request/response: each file_meta gets continue or data.
		let mut client_bag = Manifest::new();
		loop {
			match channel.recv().await? {
				Message::Done => break,
				Message::FileMeta(item) => {
					if !item.path.is_clean() {
						return Err(SyncError::protocol(format!(
							"unsafe path in client scan: {}",
							item.path
						)));
					}
					let checksum = item.checksum;
					let size = item.size;
					let path = item.path.clone();
					if client_bag.insert(item).is_some() {
						return Err(SyncError::protocol(format!(
							"duplicate path in client scan: {}",
							path
						)));
					}
					if self.pool.contains(&checksum) {
						channel.send(&Message::Continue).await?;
					} else {
						debug!("fetching blob {} for {} ({} bytes)", checksum, path, size);
						channel.send(&Message::Data { hsh: checksum }).await?;
						let mut writer = self.pool.write(checksum).await?;
						channel.recv_stream(&mut writer, size).await?;
						writer.commit().await?;
					}
				}
				other => {
					return Err(SyncError::protocol(format!(
						"expected file_meta or done, got {}",
						other.tag()
					)))
				}
			}
		}

		// Reconcile. An up-to-date client replaces the tree outright; an
		// outdated one goes through the three-way merge against its
		// ancestor version.
		let new_bag = if base == latest {
			client_bag.clone()
		} else {
			let ancestor =
				if base == 0 { Manifest::new() } else { self.load_manifest(base).await? };
			let outcome = merge(&ancestor, &client_bag, &server_bag);
			for lost in &outcome.conflicts {
				// A conflict always has a client-side winner at the path.
				match client_bag.get(&lost.path) {
					Some(kept) => warn!(
						"conflict at {}: keeping client copy {} ({} bytes), server copy was {} ({} bytes)",
						lost.path, kept.checksum, kept.size, lost.checksum, lost.size
					),
					None => warn!(
						"conflict at {}: server copy {} ({} bytes) lost",
						lost.path, lost.checksum, lost.size
					),
				}
			}
			outcome.merged
		};

		let current = if new_bag == server_bag {
			debug!("tree unchanged, staying at version {}", latest);
			latest
		} else {
			let next = latest + 1;
			self.write_version(next, &new_bag).await?;
			debug!("created version {} ({} files)", next, new_bag.len());
			next
		};

		// Bring the client's tree up to the reconciled manifest.
		for item in &client_bag {
			if !new_bag.contains_path(&item.path) {
				debug!("asking client to remove {}", item.path);
				channel.send(&Message::FileRemove(item.clone())).await?;
			}
		}
		for item in &new_bag {
			if client_bag.get(&item.path) != Some(item) {
				debug!("sending {} ({}, {} bytes)", item.path, item.checksum, item.size);
				channel.send(&Message::FileBegin(item.clone())).await?;
				let mut blob = self.pool.read(&item.checksum).await?;
				channel.send_stream(&mut blob, item.size).await?;
			}
		}

		channel.send(&Message::SyncComplete { ver: current }).await?;
		self.expect_quit(channel).await
	}

	async fn expect_quit<R, W>(&self, channel: &mut Channel<R, W>) -> Result<(), SyncError>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		match channel.recv().await? {
			Message::Quit => {
				channel.send(&Message::Bye).await?;
				Ok(())
			}
			other => Err(SyncError::protocol(format!("expected quit, got {}", other.tag()))),
		}
	}

	fn versions_dir(&self) -> PathBuf {
		self.root.join(VERSIONS_DIR)
	}

	/// Latest version is the largest integer filename in the versions
	/// directory; lock and temp files simply fail the parse.
	fn latest_version(&self) -> Result<u64, SyncError> {
		let mut latest = None;
		for entry in std::fs::read_dir(self.versions_dir())? {
			let entry = entry?;
			if let Ok(n) = entry.file_name().to_string_lossy().parse::<u64>() {
				latest = Some(latest.map_or(n, |m: u64| m.max(n)));
			}
		}
		latest.ok_or_else(|| {
			SyncError::usage(format!("no versions under {}", self.versions_dir().display()))
		})
	}

	async fn load_manifest(&self, version: u64) -> Result<Manifest, SyncError> {
		let path = self.versions_dir().join(version.to_string());
		let text = tokio::fs::read_to_string(&path).await?;
		Ok(index::parse_manifest(&text)?)
	}

	/// Versions are immutable once written: build the index next to its
	/// final name and rename it into place.
	async fn write_version(&self, version: u64, bag: &Manifest) -> Result<(), SyncError> {
		use tokio::io::AsyncWriteExt;

		let final_path = self.versions_dir().join(version.to_string());
		if final_path.exists() {
			return Err(SyncError::integrity(format!(
				"version {} already exists; refusing to overwrite",
				version
			)));
		}
		let tmp_path =
			self.versions_dir().join(format!("{}.{}.tmp", version, std::process::id()));
		let mut file = tokio::fs::File::create(&tmp_path).await?;
		file.write_all(index::format_manifest(bag).as_bytes()).await?;
		file.sync_all().await?;
		drop(file);
		tokio::fs::rename(&tmp_path, &final_path).await?;
		Ok(())
	}
}


// vim: ts=4
