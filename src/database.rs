//! Database Module
//!
//! The environment handle: owns one LMDB environment and every table in it.
//!
//! ## Lifecycle
//! ```text
//!   open / create ──▶ Open ──close()──▶ Closed   (terminal)
//! ```
//!
//! On open:
//! 1. Open the LMDB environment
//! 2. Read the metadata record (`NoMetadata` / `CorruptMetadata`)
//! 3. Check the expected name and version (`IdentityMismatch`)
//! 4. Open one [`Table`] per descriptor, resolving its codecs
//!
//! Nothing is reachable until all four steps succeed. Dropping an open
//! handle closes it.

use std::fs;
use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Env, EnvFlags, EnvOpenOptions, RoTxn};

use crate::codec::{CompressFormat, KeyFormat, SerializeFormat};
use crate::config::{Config, SafetyMode, FILE_EXTENSION};
use crate::error::{Result, YunaError};
use crate::meta::{self, Metadata, ReservedDb, TableDescriptor, META_KEY};
use crate::reserved::Reserved;
use crate::table::Table;

/// Everything needed to create a table
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub serialize: SerializeFormat,
    pub compress: CompressFormat,
    /// Table-local schema version, stored alongside the descriptor
    pub version: Option<i64>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, serialize: SerializeFormat) -> Self {
        Self {
            name: name.into(),
            serialize,
            compress: CompressFormat::None,
            version: None,
        }
    }

    pub fn compress(mut self, compress: CompressFormat) -> Self {
        self.compress = compress;
        self
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }
}

/// An open (or closed) Yuna database
pub struct Database {
    /// Path the environment was opened from (after extension fallback)
    path: PathBuf,

    /// Settings used to open the environment; reused by repack
    config: Config,

    /// `None` once closed
    state: Option<OpenState>,
}

/// Everything that only exists while the environment is open
struct OpenState {
    env: Env,
    reserved: ReservedDb,
    metadata: Metadata,
    /// Same order as `metadata.tables`
    tables: Vec<Table>,
}

impl Database {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Open or create a database according to `config`.
    ///
    /// With `config.create`, any existing file at `path` is replaced and the
    /// config's name/version are stamped into the new file. Otherwise the
    /// file must already be a Yuna database, and if the config carries a
    /// name or version the file must match it.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        if config.create {
            return Self::create_with(path.as_ref(), config);
        }

        let path = resolve_path(path.as_ref())?;
        let env = open_env(&path, &config, config.read_only)?;

        let rtxn = env.read_txn()?;
        let reserved = meta::reserved_db(&env, &rtxn)?;
        let metadata = meta::read_in(&rtxn, reserved, &path)?;
        meta::validate(&metadata, config.name.as_deref(), config.version)?;

        let tables = build_tables(&env, &rtxn, &config, &metadata, &[], &path)?;
        // Database handles opened in a read transaction stay valid only once
        // it commits.
        rtxn.commit()?;

        tracing::info!(
            path = %path.display(),
            name = ?metadata.name,
            version = ?metadata.version,
            tables = tables.len(),
            read_only = config.read_only,
            "opened database"
        );

        Ok(Self {
            path,
            config,
            state: Some(OpenState {
                env,
                reserved,
                metadata,
                tables,
            }),
        })
    }

    /// Create a new database file, replacing anything at `path`
    pub fn create(path: impl AsRef<Path>, name: Option<&str>, version: Option<i64>) -> Result<Self> {
        let config = Config {
            name: name.map(str::to_string),
            version,
            create: true,
            ..Config::default()
        };
        Self::create_with(path.as_ref(), config)
    }

    /// Open an existing file (`create == false`) or create a new one
    pub fn open_or_create(
        path: impl AsRef<Path>,
        create: bool,
        name: Option<&str>,
        version: Option<i64>,
    ) -> Result<Self> {
        let config = Config {
            name: name.map(str::to_string),
            version,
            create,
            ..Config::default()
        };
        Self::open(path, config)
    }

    /// Open an existing file without write access
    pub fn open_read_only(
        path: impl AsRef<Path>,
        name: Option<&str>,
        version: Option<i64>,
    ) -> Result<Self> {
        let config = Config {
            name: name.map(str::to_string),
            version,
            read_only: true,
            ..Config::default()
        };
        Self::open(path, config)
    }

    /// Open, run `f`, and close, whatever `f` returns.
    ///
    /// An error from `f` takes precedence over an error from closing.
    pub fn scoped<R>(
        path: impl AsRef<Path>,
        config: Config,
        f: impl FnOnce(&mut Database) -> Result<R>,
    ) -> Result<R> {
        let mut db = Self::open(path, config)?;
        let result = f(&mut db);
        let closed = db.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    fn create_with(path: &Path, mut config: Config) -> Result<Self> {
        // Creating implies writing.
        config.read_only = false;

        remove_existing(path, config.single_file)?;
        if config.single_file {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        } else {
            fs::create_dir_all(path)?;
        }

        let env = open_env(path, &config, false)?;
        let metadata = Metadata::new(config.name.clone(), config.version);

        let mut wtxn = env.write_txn()?;
        let reserved = env.create_database::<Bytes, Bytes>(&mut wtxn, None)?;
        meta::write_in(&mut wtxn, reserved, &metadata)?;
        wtxn.commit()?;

        tracing::info!(
            path = %path.display(),
            name = ?metadata.name,
            version = ?metadata.version,
            "created database"
        );

        Ok(Self {
            path: path.to_path_buf(),
            config,
            state: Some(OpenState {
                env,
                reserved,
                metadata,
                tables: Vec::new(),
            }),
        })
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Create a table with the given value formats
    pub fn new_table(
        &mut self,
        name: &str,
        serialize: SerializeFormat,
        compress: CompressFormat,
    ) -> Result<&Table> {
        self.new_table_with(TableSpec::new(name, serialize).compress(compress))
    }

    /// Create a table from a full spec.
    ///
    /// The stored record is re-read inside the write transaction, so tables
    /// added or dropped through another handle since this one was opened are
    /// kept and show up here afterwards. The LMDB database and the updated
    /// record are written in that one transaction: either both exist
    /// afterwards or neither does.
    pub fn new_table_with(&mut self, spec: TableSpec) -> Result<&Table> {
        let Self { path, config, state } = self;
        let state = state.as_mut().ok_or(YunaError::Closed)?;

        if spec.name.is_empty() {
            return Err(YunaError::Config("table name cannot be empty".to_string()));
        }
        if spec.name == META_KEY {
            return Err(YunaError::Config(format!(
                "'{}' is reserved and cannot be used as a table name",
                META_KEY
            )));
        }

        // Resolve codecs before touching the file.
        config.registry.pipeline(spec.serialize, spec.compress)?;

        let mut wtxn = state.env.write_txn()?;
        let mut metadata = meta::read_in(&wtxn, state.reserved, path)?;
        if metadata.table(&spec.name).is_some() {
            return Err(YunaError::DuplicateTable(spec.name));
        }

        let descriptor = TableDescriptor {
            name: spec.name,
            key_format: KeyFormat::Str,
            serialize: spec.serialize,
            compress: spec.compress,
            version: spec.version,
        };
        state
            .env
            .create_database::<Bytes, Bytes>(&mut wtxn, Some(&descriptor.name))?;
        metadata.tables.push(descriptor.clone());
        meta::write_in(&mut wtxn, state.reserved, &metadata)?;

        let tables = build_tables(&state.env, &wtxn, config, &metadata, &state.tables, path)?;
        wtxn.commit()?;

        tracing::info!(
            table = %descriptor.name,
            serialize = %descriptor.serialize,
            compress = %descriptor.compress,
            tables = tables.len(),
            "created table"
        );

        state.metadata = metadata;
        state.tables = tables;
        state
            .tables
            .iter()
            .find(|t| t.name() == descriptor.name)
            .ok_or(YunaError::NoSuchTable(descriptor.name))
    }

    /// Remove a table's contents and its descriptor.
    ///
    /// The named LMDB database itself stays in the file, empty and without a
    /// descriptor, so its name still appears in [`Reserved`] listings.
    /// Creating a table with the same name later reuses it.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let Self { path, config, state } = self;
        let state = state.as_mut().ok_or(YunaError::Closed)?;

        let mut wtxn = state.env.write_txn()?;
        let mut metadata = meta::read_in(&wtxn, state.reserved, path)?;
        if metadata.table(name).is_none() {
            return Err(YunaError::NoSuchTable(name.to_string()));
        }
        metadata.tables.retain(|t| t.name != name);

        if let Some(db) = state
            .env
            .open_database::<Bytes, Bytes>(&wtxn, Some(name))?
        {
            db.clear(&mut wtxn)?;
        }
        meta::write_in(&mut wtxn, state.reserved, &metadata)?;

        let tables = build_tables(&state.env, &wtxn, config, &metadata, &state.tables, path)?;
        wtxn.commit()?;

        state.metadata = metadata;
        state.tables = tables;
        tracing::info!(table = %name, "dropped table");
        Ok(())
    }

    /// Reload the table set from the stored record, picking up tables other
    /// handles have created or dropped since this one was opened
    pub fn refresh(&mut self) -> Result<()> {
        let Self { path, config, state } = self;
        let state = state.as_mut().ok_or(YunaError::Closed)?;

        let rtxn = state.env.read_txn()?;
        let metadata = meta::read_in(&rtxn, state.reserved, path)?;
        let tables = build_tables(&state.env, &rtxn, config, &metadata, &state.tables, path)?;
        rtxn.commit()?;

        tracing::debug!(tables = tables.len(), "refreshed table set");
        state.metadata = metadata;
        state.tables = tables;
        Ok(())
    }

    /// Borrow an open table by name
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.state()?
            .tables
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| YunaError::NoSuchTable(name.to_string()))
    }

    /// All open tables, in creation order
    pub fn tables(&self) -> Result<&[Table]> {
        Ok(&self.state()?.tables)
    }

    /// Table names, in creation order
    pub fn table_names(&self) -> Result<Vec<&str>> {
        Ok(self.state()?.metadata.table_names())
    }

    /// The reserved (unnamed) LMDB table
    pub fn reserved(&self) -> Result<Reserved<'_>> {
        let state = self.state()?;
        Ok(Reserved::new(&state.env, state.reserved))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// The metadata record as of open / the last table change
    pub fn metadata(&self) -> Result<&Metadata> {
        Ok(&self.state()?.metadata)
    }

    /// Read the metadata record back from the file
    pub fn stored_metadata(&self) -> Result<Metadata> {
        meta::read(&self.state()?.env, &self.path)
    }

    pub fn name(&self) -> Result<Option<&str>> {
        Ok(self.state()?.metadata.name.as_deref())
    }

    pub fn version(&self) -> Result<Option<i64>> {
        Ok(self.state()?.metadata.version)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush everything to disk. Useful after writing in unsafe mode.
    pub fn sync(&self) -> Result<()> {
        self.state()?.env.force_sync()?;
        Ok(())
    }

    /// Flush and release the environment. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        let OpenState { env, tables, .. } = state;

        // Tables hold environment handles; release them first so the
        // environment can actually close.
        drop(tables);

        let synced = if self.config.read_only {
            Ok(())
        } else {
            env.force_sync()
        };
        env.prepare_for_closing().wait();

        tracing::info!(path = %self.path.display(), "closed database");
        synced?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Path of the environment
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn state(&self) -> Result<&OpenState> {
        self.state.as_ref().ok_or(YunaError::Closed)
    }

    fn state_mut(&mut self) -> Result<&mut OpenState> {
        self.state.as_mut().ok_or(YunaError::Closed)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to close database");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("metadata", &self.state.as_ref().map(|s| &s.metadata))
            .finish()
    }
}

// =============================================================================
// Environment Helpers
// =============================================================================

/// One [`Table`] per descriptor, in descriptor order.
///
/// Tables in `current` whose descriptor is unchanged are reused; the rest are
/// opened inside `txn`. Handles opened here only stay valid once `txn`
/// commits.
fn build_tables(
    env: &Env,
    txn: &RoTxn,
    config: &Config,
    metadata: &Metadata,
    current: &[Table],
    path: &Path,
) -> Result<Vec<Table>> {
    let mut tables = Vec::with_capacity(metadata.tables.len());
    for descriptor in &metadata.tables {
        if let Some(table) = current.iter().find(|t| t.descriptor() == descriptor) {
            tables.push(table.clone());
            continue;
        }

        let db = env
            .open_database::<Bytes, Bytes>(txn, Some(&descriptor.name))?
            .ok_or_else(|| YunaError::CorruptMetadata {
                path: path.to_path_buf(),
                reason: format!("table '{}' is listed but missing from the file", descriptor.name),
            })?;
        let pipeline = config
            .registry
            .pipeline(descriptor.serialize, descriptor.compress)?;
        tables.push(Table::new(env.clone(), db, descriptor.clone(), pipeline));
    }
    Ok(tables)
}

/// Find the file to open: `path` itself, or `path.ydb` if only that exists
pub(crate) fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if path.extension().map_or(true, |ext| ext != FILE_EXTENSION) {
        let mut with_ext = path.as_os_str().to_owned();
        with_ext.push(".");
        with_ext.push(FILE_EXTENSION);
        let with_ext = PathBuf::from(with_ext);
        if with_ext.exists() {
            return Ok(with_ext);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no such Yuna DB file: {}", path.display()),
    )
    .into())
}

/// Open the LMDB environment at `path`
pub(crate) fn open_env(path: &Path, config: &Config, read_only: bool) -> Result<Env> {
    let mut flags = EnvFlags::empty();
    if config.single_file {
        flags |= EnvFlags::NO_SUB_DIR;
    }
    if read_only {
        flags |= EnvFlags::READ_ONLY;
    } else if config.safety_mode == SafetyMode::Unsafe {
        flags |= EnvFlags::NO_META_SYNC | EnvFlags::NO_SYNC | EnvFlags::WRITE_MAP | EnvFlags::MAP_ASYNC;
    }

    let mut options = EnvOpenOptions::new();
    options
        .map_size(config.max_db_file_size)
        .max_dbs(config.max_tables);

    // SAFETY: Yuna never hands out references into the memory map that
    // outlive a transaction, and each path is opened by at most one live
    // `Database` in this process (heed refuses a second open).
    let env = unsafe {
        options.flags(flags);
        options.open(path)?
    };
    Ok(env)
}

/// Remove whatever is at `path` (file or directory), plus the lock file LMDB
/// leaves next to single-file environments. Missing paths are fine.
fn remove_existing(path: &Path, single_file: bool) -> Result<()> {
    match fs::metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if single_file {
        let lock = lock_path(path);
        if lock.exists() {
            fs::remove_file(lock)?;
        }
    }
    Ok(())
}

/// LMDB's lock file for a single-file environment
pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push("-lock");
    PathBuf::from(lock)
}
