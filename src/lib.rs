//! # bowdb
//!
//! Typed record buckets over an embedded, transactional key-value engine:
//! - Named buckets, each isolated in its own 2-byte key namespace
//! - Records mapped to keys and values through serde and a `Record` impl
//! - Auto-generated `Id` keys for records written without one
//! - Snapshot iteration over a bucket or a key prefix
//! - Write-Ahead Logging (WAL) and crash recovery underneath
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                            Db                                │
//! │        (metadata document, bucket id allocator, codec)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ bucket(name)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Bucket / Iter / Subscription                 │
//! │           (key codec + record mapping + value codec)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ transactions, snapshots, sequences
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Engine                              │
//! └─────────────────────┬───────────────────────────────────────┘
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │ (versioned) │
//!   └─────────────┘          └──────┬──────┘
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTable)  │
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use bowdb::{record, Db};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Arrow {
//!     id: String,
//!     length: u32,
//! }
//! record!(Arrow, key = id: String);
//!
//! fn main() -> bowdb::Result<()> {
//!     let db = Db::open_path("./arrows_db")?;
//!     let arrows = db.bucket("arrows");
//!     arrows.put(&Arrow { id: "123".into(), length: 10 })?;
//!
//!     let mut arrow = Arrow::default();
//!     arrows.get("123", &mut arrow)?;
//!     assert_eq!(arrow.length, 10);
//!
//!     db.close()
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod id;
pub mod record;
pub mod codec;
pub mod meta;

pub mod db;
pub mod bucket;
pub mod iter;
pub mod watch;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Error, Result};
pub use config::{Config, WalSyncStrategy};
pub use key::{DecodeKey, EncodeKey};
pub use id::Id;
pub use record::{extract_key, inject_key, Record};
pub use codec::{Codec, Format};
pub use db::Db;
pub use bucket::Bucket;
pub use iter::Iter;
pub use watch::{Event, Subscription};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of bowdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
