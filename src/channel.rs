//! Framed message channel over a duplex byte transport
//!
//! One message is one LF-terminated JSON line, tagged on `cmd`. A raw byte
//! stream of known length may follow a message (blob transfer); it carries
//! no tag and no delimiter of its own. Both sync drivers are strictly
//! request/response, so a single owner drives both directions.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::SyncError;
use crate::types::{Checksum, FileItem};
use crate::util::CHUNK_SIZE;

/// Every message either side may put on the wire.
///
/// Field names are kept short on purpose: metadata lines dominate the
/// traffic of a large tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Message {
	/// Client opens a merge-mode session at its last synced version.
	#[serde(alias = "merge")]
	Sync { ver: u64 },

	/// Client opens an initial checkout.
	StreamLatestVersion,

	/// Server announces the version an initial checkout will deliver.
	VersionNumber { ver: u64 },

	/// Server is ready to receive the client's scan.
	WaitingForFiles,

	/// One scanned file, client to server.
	FileMeta(FileItem),

	/// End of the meta stream (client) or of a checkout (server).
	Done,

	/// Server wants the blob for this checksum; bytes follow from client.
	Data { hsh: Checksum },

	/// Server already holds the announced blob.
	Continue,

	/// A file the client must write; blob bytes follow from server.
	FileBegin(FileItem),

	/// A file the client must delete.
	FileRemove(FileItem),

	/// Sync finished; payload is the client's new last_sync version.
	SyncComplete { ver: u64 },

	Quit,
	Bye,

	/// Fatal server-side failure, forwarded before the channel closes.
	Error { msg: String },
}

impl Message {
	/// Short tag for diagnostics and protocol errors.
	pub fn tag(&self) -> &'static str {
		match self {
			Message::Sync { .. } => "sync",
			Message::StreamLatestVersion => "stream_latest_version",
			Message::VersionNumber { .. } => "version_number",
			Message::WaitingForFiles => "waiting_for_files",
			Message::FileMeta(_) => "file_meta",
			Message::Done => "done",
			Message::Data { .. } => "data",
			Message::Continue => "continue",
			Message::FileBegin(_) => "file_begin",
			Message::FileRemove(_) => "file_remove",
			Message::SyncComplete { .. } => "sync_complete",
			Message::Quit => "quit",
			Message::Bye => "bye",
			Message::Error { .. } => "error",
		}
	}
}

/// Framed channel over any async byte transport pair: child stdio in
/// production, an in-process duplex pipe in tests.
pub struct Channel<R, W> {
	recv: BufReader<R>,
	send: W,
}

impl<R, W> Channel<R, W>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	pub fn new(recv: R, send: W) -> Self {
		Channel { recv: BufReader::new(recv), send }
	}

	/// Transmit one message and flush it to the transport.
	pub async fn send(&mut self, msg: &Message) -> Result<(), SyncError> {
		let mut line = serde_json::to_string(msg)
			.map_err(|e| SyncError::protocol(format!("unencodable message: {}", e)))?;
		line.push('\n');
		self.send.write_all(line.as_bytes()).await?;
		self.send.flush().await?;
		Ok(())
	}

	/// Block until one message is available.
	pub async fn recv(&mut self) -> Result<Message, SyncError> {
		let mut line = String::new();
		let n = self.recv.read_line(&mut line).await?;
		if n == 0 {
			return Err(SyncError::Disconnected);
		}
		let trimmed = line.trim();
		json5::from_str(trimmed)
			.map_err(|e| SyncError::protocol(format!("bad message {:?}: {}", trimmed, e)))
	}

	/// Transmit exactly `len` bytes from `reader`. A reader that runs dry
	/// early (a file truncated between stat and send) is an integrity error.
	pub async fn send_stream<S>(&mut self, reader: &mut S, len: u64) -> Result<(), SyncError>
	where
		S: AsyncRead + Unpin,
	{
		let mut limited = reader.take(len);
		let copied = tokio::io::copy(&mut limited, &mut self.send).await?;
		if copied != len {
			return Err(SyncError::integrity(format!(
				"short stream: sent {} of {} bytes",
				copied, len
			)));
		}
		self.send.flush().await?;
		Ok(())
	}

	/// Receive exactly `len` bytes into `writer`, failing if the peer
	/// closes early.
	pub async fn recv_stream<T>(&mut self, writer: &mut T, len: u64) -> Result<(), SyncError>
	where
		T: AsyncWrite + Unpin,
	{
		let mut buf = vec![0u8; CHUNK_SIZE];
		let mut remaining = len;
		while remaining > 0 {
			let want = remaining.min(buf.len() as u64) as usize;
			let n = self.recv.read(&mut buf[..want]).await?;
			if n == 0 {
				return Err(SyncError::integrity(format!(
					"peer closed with {} of {} stream bytes missing",
					remaining, len
				)));
			}
			writer.write_all(&buf[..n]).await?;
			remaining -= n as u64;
		}
		writer.flush().await?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::types::RepoPath;

	type TestChannel =
		Channel<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>;

	fn pair() -> (TestChannel, TestChannel) {
		let (a, b) = tokio::io::duplex(4 * 1024);
		let (ar, aw) = tokio::io::split(a);
		let (br, bw) = tokio::io::split(b);
		(Channel::new(ar, aw), Channel::new(br, bw))
	}

	fn sample_item() -> FileItem {
		FileItem {
			path: RepoPath::new(vec![b'd', b'i', b'r', b'/', 0xE9, b'.', b't', b'x', b't']),
			checksum: "a9993e364706816aba3e25717850c26c9cd0d89d".parse().unwrap(),
			size: 3,
			mtime: Some(1700000000.25),
		}
	}

	#[tokio::test]
	async fn test_message_roundtrip() {
		let (mut left, mut right) = pair();

		let messages = vec![
			Message::Sync { ver: 7 },
			Message::StreamLatestVersion,
			Message::VersionNumber { ver: 3 },
			Message::WaitingForFiles,
			Message::FileMeta(sample_item()),
			Message::Done,
			Message::Data { hsh: "a9993e364706816aba3e25717850c26c9cd0d89d".parse().unwrap() },
			Message::Continue,
			Message::FileBegin(sample_item()),
			Message::FileRemove(sample_item()),
			Message::SyncComplete { ver: 8 },
			Message::Quit,
			Message::Bye,
			Message::Error { msg: "boom".to_string() },
		];

		for msg in messages {
			left.send(&msg).await.unwrap();
			let got = right.recv().await.unwrap();
			assert_eq!(got, msg);
		}
	}

	#[tokio::test]
	async fn test_merge_tag_is_accepted_as_sync() {
		// A peer speaking the older tag must still be understood.
		let mut handwritten = Channel::new(
			std::io::Cursor::new(b"{\"cmd\":\"merge\",\"ver\":5}\n".to_vec()),
			Vec::new(),
		);
		assert_eq!(handwritten.recv().await.unwrap(), Message::Sync { ver: 5 });
	}

	#[tokio::test]
	async fn test_mtime_absent_on_wire_when_none() {
		let mut sink = Vec::new();
		{
			let mut ch = Channel::new(std::io::Cursor::new(Vec::new()), &mut sink);
			let mut item = sample_item();
			item.mtime = None;
			ch.send(&Message::FileMeta(item)).await.unwrap();
		}
		let line = String::from_utf8(sink).unwrap();
		assert!(!line.contains("\"mt\""), "unexpected mtime field in {}", line);
	}

	#[tokio::test]
	async fn test_stream_follows_message() {
		let (mut left, mut right) = pair();
		let payload = b"hello blob bytes".to_vec();

		let sender = async {
			left.send(&Message::Data {
				hsh: "a9993e364706816aba3e25717850c26c9cd0d89d".parse().unwrap(),
			})
			.await
			.unwrap();
			left.send_stream(&mut std::io::Cursor::new(payload.clone()), payload.len() as u64)
				.await
				.unwrap();
			left.send(&Message::Done).await.unwrap();
			left
		};
		let receiver = async {
			let msg = right.recv().await.unwrap();
			assert_eq!(msg.tag(), "data");
			let mut got = Vec::new();
			right.recv_stream(&mut got, 16).await.unwrap();
			assert_eq!(got, b"hello blob bytes");
			assert_eq!(right.recv().await.unwrap(), Message::Done);
			right
		};
		let _ = tokio::join!(sender, receiver);
	}

	#[tokio::test]
	async fn test_recv_stream_fails_on_early_close() {
		let (mut left, mut right) = pair();
		left.send_stream(&mut std::io::Cursor::new(b"abc".to_vec()), 3).await.unwrap();
		drop(left);

		let mut got = Vec::new();
		match right.recv_stream(&mut got, 10).await {
			Err(SyncError::Integrity { .. }) => {}
			other => panic!("expected integrity error, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_send_stream_fails_on_short_reader() {
		let (mut left, _right) = pair();
		let err = left.send_stream(&mut std::io::Cursor::new(b"ab".to_vec()), 5).await;
		match err {
			Err(SyncError::Integrity { .. }) => {}
			other => panic!("expected integrity error, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_recv_on_closed_channel_is_disconnect() {
		let (left, mut right) = pair();
		drop(left);
		match right.recv().await {
			Err(SyncError::Disconnected) => {}
			other => panic!("expected disconnect, got {:?}", other),
		}
	}
}

// vim: ts=4
