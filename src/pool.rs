//! Content-addressed blob pool
//!
//! A directory of immutable files named by their SHA-1. Writers stream to a
//! temp file in the same directory and reach the final name only through
//! fsync-then-rename, so readers can never observe a partial blob.

use sha1::{Digest, Sha1};
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::SyncError;
use crate::types::Checksum;

pub struct BlobPool {
	dir: PathBuf,
}

impl BlobPool {
	/// Open an existing pool directory.
	pub fn open(dir: &Path) -> Result<Self, SyncError> {
		if !dir.is_dir() {
			return Err(SyncError::usage(format!("not a blob pool directory: {}", dir.display())));
		}
		Ok(BlobPool { dir: dir.to_path_buf() })
	}

	fn blob_path(&self, checksum: &Checksum) -> PathBuf {
		self.dir.join(checksum.to_hex())
	}

	/// Membership is filesystem existence of the final name.
	pub fn contains(&self, checksum: &Checksum) -> bool {
		self.blob_path(checksum).is_file()
	}

	/// Streaming read of a pooled blob. Content is not re-verified here;
	/// insertion already checked it.
	pub async fn read(&self, checksum: &Checksum) -> Result<tokio::fs::File, SyncError> {
		let path = self.blob_path(checksum);
		match tokio::fs::File::open(&path).await {
			Ok(f) => Ok(f),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				Err(SyncError::integrity(format!("blob {} not in pool", checksum)))
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Begin inserting a blob. The returned writer hashes everything it is
	/// fed; `commit` refuses bytes that do not match `checksum`, so a bad
	/// upload can never occupy a blob name.
	pub async fn write(&self, checksum: Checksum) -> Result<BlobWriter, SyncError> {
		let final_path = self.blob_path(&checksum);
		let tmp_path =
			self.dir.join(format!("{}.{}.tmp", checksum.to_hex(), std::process::id()));
		let file = tokio::fs::File::create(&tmp_path).await?;
		Ok(BlobWriter { file, hasher: Sha1::new(), checksum, tmp_path, final_path, committed: false })
	}
}

/// Scoped writer for one blob insertion. Dropping it without `commit`
/// unlinks the temp file.
pub struct BlobWriter {
	file: tokio::fs::File,
	hasher: Sha1,
	checksum: Checksum,
	tmp_path: PathBuf,
	final_path: PathBuf,
	committed: bool,
}

impl BlobWriter {
	/// Verify, fsync, and rename into place.
	pub async fn commit(mut self) -> Result<(), SyncError> {
		self.file.flush().await?;
		let received = Checksum::from_digest(mem::take(&mut self.hasher).finalize().into());
		if received != self.checksum {
			return Err(SyncError::integrity(format!(
				"blob upload hash mismatch: expected {}, received {}",
				self.checksum, received
			)));
		}
		self.file.sync_all().await?;
		tokio::fs::rename(&self.tmp_path, &self.final_path).await?;
		self.committed = true;
		Ok(())
	}
}

impl Drop for BlobWriter {
	fn drop(&mut self) {
		if !self.committed {
			let _ = std::fs::remove_file(&self.tmp_path);
		}
	}
}

impl AsyncWrite for BlobWriter {
	fn poll_write(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<io::Result<usize>> {
		let this = self.get_mut();
		match Pin::new(&mut this.file).poll_write(cx, buf) {
			Poll::Ready(Ok(n)) => {
				this.hasher.update(&buf[..n]);
				Poll::Ready(Ok(n))
			}
			other => other,
		}
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.get_mut().file).poll_flush(cx)
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
	}
}


// vim: ts=4
