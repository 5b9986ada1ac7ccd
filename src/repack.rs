//! Repack
//!
//! LMDB files never shrink on their own: deleted and overwritten entries
//! leave free pages behind. Repacking asks LMDB for a compacting copy of the
//! live pages and moves it over the original.
//!
//! ```text
//!   file.ydb ──copy (compact)──▶ file.ydb.repack ──rename──▶ file.ydb
//! ```
//!
//! The environment must not be open while this runs.

use std::fs;
use std::path::{Path, PathBuf};

use heed::CompactionOption;

use crate::config::Config;
use crate::database::{open_env, resolve_path, Database};
use crate::error::{Result, YunaError};

/// File sizes observed around a repack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepackReport {
    /// Size of the data file before repacking (bytes)
    pub before: u64,
    /// Size of the data file after repacking (bytes)
    pub after: u64,
}

impl Database {
    /// Rewrite this database's file to minimum size.
    ///
    /// The handle must be closed first; an open handle fails with
    /// `AlreadyOpen`.
    pub fn repack(&self) -> Result<RepackReport> {
        if self.is_open() {
            return Err(YunaError::AlreadyOpen(self.path().to_path_buf()));
        }
        repack_file(self.path(), self.config())
    }
}

/// Rewrite the Yuna file at `path` to minimum size.
///
/// LMDB and I/O failures are returned as-is; on failure the original file is
/// left untouched.
pub fn repack_file(path: impl AsRef<Path>, config: &Config) -> Result<RepackReport> {
    let path = resolve_path(path.as_ref())?;
    let data_file = if config.single_file {
        path.clone()
    } else {
        path.join("data.mdb")
    };
    let before = fs::metadata(&data_file)?.len();

    let tmp = repack_tmp_path(&data_file);
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }

    let env = open_env(&path, config, true)?;
    let copied = env.copy_to_file(&tmp, CompactionOption::Enabled);
    env.prepare_for_closing().wait();

    let file = match copied {
        Ok(file) => file,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
    };
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, &data_file)?;
    let after = fs::metadata(&data_file)?.len();

    tracing::info!(path = %path.display(), before, after, "repacked database");
    Ok(RepackReport { before, after })
}

fn repack_tmp_path(data_file: &Path) -> PathBuf {
    let mut tmp = data_file.as_os_str().to_owned();
    tmp.push(".repack");
    PathBuf::from(tmp)
}
