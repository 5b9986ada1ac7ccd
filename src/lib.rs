//! # Yuna
//!
//! Dict-like, self-describing tables over LMDB:
//! - Per-table serialization (str, JSON, MessagePack) and compression
//!   (LZ4, zlib, Zstandard), chosen once and recorded in the file
//! - A name and version stamped into every file and checked on open
//! - Get / put / delete / containment / iteration, one LMDB transaction each
//! - Repacking to shrink a file to the size of its live data
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Database                            │
//! │        (open / create / new_table / close / repack)         │
//! └───────────┬──────────────────────────────────┬──────────────┘
//!             │                                  │
//!             ▼                                  ▼
//!   ┌──────────────────┐               ┌──────────────────┐
//!   │  Metadata Record │               │      Table       │
//!   │ (name, version,  │               │ (get / put / …)  │
//!   │   descriptors)   │               └────────┬─────────┘
//!   └────────┬─────────┘                        │
//!            │                         ┌────────▼─────────┐
//!            │                         │  Codec Pipeline  │
//!            │                         │ serialize→compress│
//!            │                         └────────┬─────────┘
//!            ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                LMDB environment (via heed)                  │
//! │     unnamed db: metadata          named dbs: one per table  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use yuna::{CompressFormat, Database, SerializeFormat};
//!
//! # fn main() -> yuna::Result<()> {
//! let mut db = Database::create("inventory.ydb", Some("inventory"), Some(1))?;
//! let items = db.new_table("items", SerializeFormat::Json, CompressFormat::Lz4)?;
//! items.put("apple", &serde_json::json!({"count": 3}))?;
//! let apple: Option<serde_json::Value> = items.get("apple")?;
//! assert!(apple.is_some());
//! db.close()?;
//!
//! // Fails with an identity mismatch: the file is named "inventory"
//! assert!(Database::open_or_create("inventory.ydb", false, Some("orders"), None).is_err());
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod meta;
pub mod table;
pub mod reserved;
pub mod database;
pub mod repack;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use codec::{CodecRegistry, CompressFormat, KeyFormat, SerializeFormat};
pub use config::{Config, SafetyMode};
pub use database::{Database, TableSpec};
pub use error::{Result, YunaError};
pub use meta::{Metadata, TableDescriptor};
pub use repack::{repack_file, RepackReport};
pub use reserved::Reserved;
pub use table::Table;

/// Dynamic value type stored in tables
pub use serde_json::Value;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Yuna
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
