//! # packrat - versioned directory synchronizer
//!
//! Packrat keeps a directory tree in sync between a client host and a
//! server host over a framed message stream (normally a child process
//! reached through ssh). The server is a pack rat: every reconcile that
//! changes the tree becomes a new immutable numbered version backed by a
//! content-addressed blob pool, and a client that diverged since its last
//! sync is reconciled through a three-way merge against the version it
//! last saw.
//!
//! The moving parts, leaves first: the framed [`channel`], the blob
//! [`pool`], the [`ignore`] filter and stat [`cache`] feeding the
//! [`scan`]ner, the version-[`index`] codec, the pure three-way [`merge`],
//! and the [`server`] and [`client`] drivers on top.

#![deny(unsafe_code)]

pub mod cache;
pub mod channel;
pub mod client;
pub mod connect;
pub mod error;
pub mod ignore;
pub mod index;
pub mod lock;
pub mod logging;
pub mod merge;
pub mod pool;
pub mod scan;
pub mod server;
pub mod types;
pub mod util;

/// Client-side private directory, always skipped by the scanner.
pub const PRIVATE_DIR: &str = ".packrat";

/// Optional ignore-rule file at the client repo root.
pub const IGNORE_FILE: &str = ".packratignore";

/// Stat cache file inside the private directory.
pub const CACHE_FILE: &str = "cache";

/// Ancestor pointer inside the private directory.
pub const LAST_SYNC_FILE: &str = "last_sync";

/// Blob pool directory in the server root.
pub const OBJECTS_DIR: &str = "objects";

/// Version-index directory in the server root.
pub const VERSIONS_DIR: &str = "versions";

/// Server diagnostic log file.
pub const DEBUG_LOG: &str = "debug.log";

pub use channel::{Channel, Message};
pub use client::{Client, SyncReport};
pub use error::SyncError;
pub use merge::{merge, MergeOutcome};
pub use server::Server;
pub use types::{Checksum, FileItem, Manifest, RepoPath};

// vim: ts=4
