//! Configuration for Yuna
//!
//! Centralized configuration with sensible defaults.

use std::sync::Arc;

use crate::codec::CodecRegistry;

/// Default limit on the number of named tables in one file
pub const DEFAULT_MAX_TABLES: u32 = 100;

/// Default LMDB map size: one tebibyte. The file only grows as data is
/// written; `yuna-repack` shrinks it back down.
pub const DEFAULT_MAX_DB_FILE_SIZE: usize = 1 << 40;

/// Extension tried when a path given to `open` does not exist as-is
pub const FILE_EXTENSION: &str = "ydb";

/// Configuration used to open or create a Yuna database
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// On open: the name the file must carry. On create: the name stamped
    /// into the file.
    pub name: Option<String>,

    /// On open: the version the file must carry. On create: the version
    /// stamped into the file.
    pub version: Option<i64>,

    // -------------------------------------------------------------------------
    // LMDB Environment
    // -------------------------------------------------------------------------
    /// Create a fresh file, replacing anything already at the path
    pub create: bool,

    /// Open without write access
    pub read_only: bool,

    /// Durability settings for the environment
    pub safety_mode: SafetyMode,

    /// Single data file (`NO_SUB_DIR`) instead of a directory holding
    /// `data.mdb` and `lock.mdb`
    pub single_file: bool,

    /// Maximum number of named tables
    pub max_tables: u32,

    /// LMDB map size in bytes
    pub max_db_file_size: usize,

    // -------------------------------------------------------------------------
    // Codecs
    // -------------------------------------------------------------------------
    /// Codecs available to tables in this database
    pub registry: Arc<CodecRegistry>,
}

/// How hard LMDB works to keep the file safe across crashes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMode {
    /// Full ACID: every commit is synced
    Acid,

    /// No sync, no meta sync, writable map, async flushes. Fastest, and only
    /// suitable for building a file that will later be opened read-only.
    Unsafe,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            version: None,
            create: false,
            read_only: false,
            safety_mode: SafetyMode::Acid,
            single_file: true,
            max_tables: DEFAULT_MAX_TABLES,
            max_db_file_size: DEFAULT_MAX_DB_FILE_SIZE,
            registry: Arc::new(CodecRegistry::default()),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the expected (open) or stamped (create) database name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Set the expected (open) or stamped (create) database version
    pub fn version(mut self, version: i64) -> Self {
        self.config.version = Some(version);
        self
    }

    /// Create a new file instead of opening an existing one
    pub fn create(mut self, create: bool) -> Self {
        self.config.create = create;
        self
    }

    /// Open the file read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the durability mode
    pub fn safety_mode(mut self, mode: SafetyMode) -> Self {
        self.config.safety_mode = mode;
        self
    }

    /// Use a single data file (true) or an LMDB directory (false)
    pub fn single_file(mut self, single_file: bool) -> Self {
        self.config.single_file = single_file;
        self
    }

    /// Set the maximum number of named tables
    pub fn max_tables(mut self, count: u32) -> Self {
        self.config.max_tables = count;
        self
    }

    /// Set the LMDB map size (in bytes)
    pub fn max_db_file_size(mut self, size: usize) -> Self {
        self.config.max_db_file_size = size;
        self
    }

    /// Use a custom codec registry
    pub fn registry(mut self, registry: Arc<CodecRegistry>) -> Self {
        self.config.registry = registry;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
