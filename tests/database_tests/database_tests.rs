//! Tests for Database
//!
//! These tests verify:
//! - Create / open / close lifecycle
//! - Identity (name / version) checks on open
//! - Metadata durability across reopen
//! - Missing, foreign and corrupt files
//! - Table management (new, duplicate, drop, lookup)
//! - Scoped use and read-only mode
//! - Table changes made by another process on the same file

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{EnvFlags, EnvOpenOptions};
use serde_json::{json, Value};
use tempfile::TempDir;
use yuna::meta::META_KEY;
use yuna::{
    CodecRegistry, CompressFormat, Config, Database, SerializeFormat, TableSpec, YunaError,
};

// =============================================================================
// Helper Functions
// =============================================================================

const TEST_MAP_SIZE: usize = 64 * 1024 * 1024;

fn create_config(name: Option<&str>, version: Option<i64>) -> Config {
    Config {
        name: name.map(str::to_string),
        version,
        create: true,
        max_db_file_size: TEST_MAP_SIZE,
        ..Config::default()
    }
}

fn open_config(name: Option<&str>, version: Option<i64>) -> Config {
    Config {
        create: false,
        ..create_config(name, version)
    }
}

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("yuna_test.ydb");
    (temp_dir, path)
}

fn create_and_close(path: &Path, name: Option<&str>, version: Option<i64>) {
    let mut db = Database::open(path, create_config(name, version)).unwrap();
    db.close().unwrap();
}

/// Write raw entries into the unnamed database of a plain LMDB file
fn write_plain_lmdb(path: &Path, entries: &[(&[u8], &[u8])]) {
    let env = unsafe {
        let mut options = EnvOpenOptions::new();
        options.map_size(TEST_MAP_SIZE).max_dbs(4);
        options.flags(EnvFlags::NO_SUB_DIR);
        options.open(path).unwrap()
    };
    let mut wtxn = env.write_txn().unwrap();
    let db = env
        .create_database::<Bytes, Bytes>(&mut wtxn, None)
        .unwrap();
    for (key, value) in entries {
        db.put(&mut wtxn, key, value).unwrap();
    }
    wtxn.commit().unwrap();
    env.prepare_for_closing().wait();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_create_writes_identity() {
    let (_temp, path) = setup_temp_path();

    let db = Database::open(&path, create_config(Some("test"), Some(1))).unwrap();

    assert!(path.exists());
    assert!(db.is_open());
    assert_eq!(db.name().unwrap(), Some("test"));
    assert_eq!(db.version().unwrap(), Some(1));
    assert!(db.table_names().unwrap().is_empty());
}

#[test]
fn test_create_then_reopen_empty() {
    let (_temp, path) = setup_temp_path();
    create_and_close(&path, None, None);

    let db = Database::open(&path, open_config(None, None)).unwrap();
    assert_eq!(db.name().unwrap(), None);
    assert_eq!(db.version().unwrap(), None);
    assert!(db.tables().unwrap().is_empty());
}

#[test]
fn test_create_replaces_existing_file() {
    let (_temp, path) = setup_temp_path();
    {
        let mut db = Database::open(&path, create_config(Some("old"), None)).unwrap();
        db.new_table("t", SerializeFormat::Json, CompressFormat::None)
            .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path, create_config(Some("new"), None)).unwrap();
    assert_eq!(db.name().unwrap(), Some("new"));
    assert!(db.table_names().unwrap().is_empty());
}

#[test]
fn test_close_is_idempotent() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();

    db.close().unwrap();
    db.close().unwrap();
    assert!(!db.is_open());
}

#[test]
fn test_operations_after_close_fail() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();
    db.new_table("t", SerializeFormat::Json, CompressFormat::None)
        .unwrap();
    db.close().unwrap();

    assert!(matches!(db.table("t").unwrap_err(), YunaError::Closed));
    assert!(matches!(db.metadata().unwrap_err(), YunaError::Closed));
    assert!(matches!(
        db.new_table("u", SerializeFormat::Json, CompressFormat::None)
            .unwrap_err(),
        YunaError::Closed
    ));
}

#[test]
fn test_open_or_create() {
    let (_temp, path) = setup_temp_path();

    let mut db = Database::open_or_create(&path, true, Some("app"), Some(4)).unwrap();
    db.new_table("t", SerializeFormat::Str, CompressFormat::None)
        .unwrap()
        .put("k", "v")
        .unwrap();
    db.close().unwrap();

    let db = Database::open_or_create(&path, false, Some("app"), Some(4)).unwrap();
    assert_eq!(
        db.table("t").unwrap().get::<String>("k").unwrap(),
        Some("v".to_string())
    );
}

#[test]
fn test_drop_closes_database() {
    let (_temp, path) = setup_temp_path();
    {
        let mut db = Database::open(&path, create_config(None, None)).unwrap();
        db.new_table("t", SerializeFormat::Json, CompressFormat::None)
            .unwrap()
            .put("k", &json!(1))
            .unwrap();
        // dropped without close()
    }

    let db = Database::open(&path, open_config(None, None)).unwrap();
    assert_eq!(
        db.table("t").unwrap().get::<Value>("k").unwrap(),
        Some(json!(1))
    );
}

// =============================================================================
// Identity Tests
// =============================================================================

#[test]
fn test_name_mismatch_message() {
    let (_temp, path) = setup_temp_path();
    create_and_close(&path, Some("foo"), Some(2));

    let err = Database::open(&path, open_config(Some("bar"), None)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "LMDB file 'name' mismatch: expected 'bar', got 'foo'"
    );
}

#[test]
fn test_version_mismatch_message() {
    let (_temp, path) = setup_temp_path();
    create_and_close(&path, Some("foo"), Some(2));

    let err = Database::open(&path, open_config(None, Some(3))).unwrap_err();
    assert!(matches!(
        err,
        YunaError::IdentityMismatch { field: "version", .. }
    ));
    assert_eq!(
        err.to_string(),
        "LMDB file 'version' mismatch: expected '3', got '2'"
    );
}

#[test]
fn test_matching_identity_opens() {
    let (_temp, path) = setup_temp_path();
    create_and_close(&path, Some("foo"), Some(2));

    Database::open(&path, open_config(Some("foo"), Some(2))).unwrap();
    Database::open(&path, open_config(Some("foo"), None)).unwrap();
    Database::open(&path, open_config(None, Some(2))).unwrap();
    Database::open(&path, open_config(None, None)).unwrap();
}

#[test]
fn test_expected_name_on_unnamed_file() {
    let (_temp, path) = setup_temp_path();
    create_and_close(&path, None, None);

    let err = Database::open(&path, open_config(Some("foo"), None)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "LMDB file 'name' mismatch: expected 'foo', got '<unset>'"
    );
}

// =============================================================================
// Metadata Durability Tests
// =============================================================================

#[test]
fn test_tables_survive_reopen_in_order() {
    let (_temp, path) = setup_temp_path();
    {
        let mut db = Database::open(&path, create_config(Some("test"), Some(1))).unwrap();
        db.new_table("zeta", SerializeFormat::Json, CompressFormat::Lz4)
            .unwrap();
        db.new_table("alpha", SerializeFormat::MsgPack, CompressFormat::Zstd)
            .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path, open_config(Some("test"), Some(1))).unwrap();
    let tables = &db.metadata().unwrap().tables;
    assert_eq!(tables.len(), 2);

    assert_eq!(tables[0].name, "zeta");
    assert_eq!(tables[0].serialize, SerializeFormat::Json);
    assert_eq!(tables[0].compress, CompressFormat::Lz4);

    assert_eq!(tables[1].name, "alpha");
    assert_eq!(tables[1].serialize, SerializeFormat::MsgPack);
    assert_eq!(tables[1].compress, CompressFormat::Zstd);

    assert_eq!(db.table_names().unwrap(), vec!["zeta", "alpha"]);
    assert_eq!(db.stored_metadata().unwrap(), *db.metadata().unwrap());
}

#[test]
fn test_values_survive_reopen() {
    let (_temp, path) = setup_temp_path();
    {
        let mut db = Database::open(&path, create_config(None, None)).unwrap();
        let table = db
            .new_table("t", SerializeFormat::Json, CompressFormat::Zlib)
            .unwrap();
        table.put("foo", &json!({"f": 0, "o": 1})).unwrap();
        table.put("bar", &json!({"b": 9, "a": 8, "r": 7})).unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path, open_config(None, None)).unwrap();
    let table = db.table("t").unwrap();
    assert_eq!(table.get::<Value>("foo").unwrap(), Some(json!({"f": 0, "o": 1})));
    assert_eq!(
        table.get::<Value>("bar").unwrap(),
        Some(json!({"b": 9, "a": 8, "r": 7}))
    );
}

#[test]
fn test_table_version_persisted() {
    let (_temp, path) = setup_temp_path();
    {
        let mut db = Database::open(&path, create_config(None, None)).unwrap();
        db.new_table_with(TableSpec::new("t", SerializeFormat::Json).version(5))
            .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path, open_config(None, None)).unwrap();
    assert_eq!(db.table("t").unwrap().descriptor().version, Some(5));
}

// =============================================================================
// Missing / Foreign / Corrupt File Tests
// =============================================================================

#[test]
fn test_open_missing_file() {
    let (_temp, path) = setup_temp_path();

    let err = Database::open(&path, open_config(None, None)).unwrap_err();
    match err {
        YunaError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_open_adds_file_extension() {
    let temp_dir = TempDir::new().unwrap();
    create_and_close(&temp_dir.path().join("data.ydb"), Some("ext"), None);

    let db = Database::open(temp_dir.path().join("data"), open_config(Some("ext"), None)).unwrap();
    assert_eq!(db.path(), temp_dir.path().join("data.ydb"));
}

#[test]
fn test_open_foreign_lmdb_file() {
    let (_temp, path) = setup_temp_path();
    write_plain_lmdb(&path, &[(b"someone", b"else's data")]);

    let err = Database::open(&path, open_config(None, None)).unwrap_err();
    assert!(matches!(err, YunaError::NoMetadata(_)));
    assert!(err.to_string().contains("not a Yuna DB file"));
}

#[test]
fn test_open_corrupt_metadata() {
    let (_temp, path) = setup_temp_path();
    write_plain_lmdb(&path, &[(META_KEY.as_bytes(), b"{\"tables\": 17")]);

    let err = Database::open(&path, open_config(None, None)).unwrap_err();
    assert!(matches!(err, YunaError::CorruptMetadata { .. }));
}

#[test]
fn test_open_unknown_codec_tag() {
    let (_temp, path) = setup_temp_path();
    let record = br#"{"yuna_version": 1, "tables": [{"name": "t", "serialize": "json", "compress": "brotli"}]}"#;
    write_plain_lmdb(&path, &[(META_KEY.as_bytes(), record)]);

    let err = Database::open(&path, open_config(None, None)).unwrap_err();
    assert_eq!(err.to_string(), "'brotli': unknown compression format");
}

#[test]
fn test_open_with_codec_missing_from_registry() {
    let (_temp, path) = setup_temp_path();
    {
        let mut db = Database::open(&path, create_config(None, None)).unwrap();
        db.new_table("t", SerializeFormat::Json, CompressFormat::Zstd)
            .unwrap();
        db.close().unwrap();
    }

    let mut registry = CodecRegistry::empty();
    registry.register_serialize(
        SerializeFormat::Json,
        |v| Ok(serde_json::to_vec(v)?),
        |b| Ok(serde_json::from_slice(b)?),
    );
    let config = Config {
        registry: Arc::new(registry),
        ..open_config(None, None)
    };

    let err = Database::open(&path, config).unwrap_err();
    assert!(matches!(
        err,
        YunaError::UnknownCodec { kind: "compression", ref tag } if tag == "zstd"
    ));
}

// =============================================================================
// Table Management Tests
// =============================================================================

#[test]
fn test_duplicate_table() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();

    db.new_table("t", SerializeFormat::Json, CompressFormat::None)
        .unwrap();
    let err = db
        .new_table("t", SerializeFormat::Str, CompressFormat::Lz4)
        .unwrap_err();
    assert!(matches!(err, YunaError::DuplicateTable(ref name) if name == "t"));

    // The original configuration is untouched
    assert_eq!(
        db.table("t").unwrap().descriptor().serialize,
        SerializeFormat::Json
    );
    assert_eq!(db.table_names().unwrap(), vec!["t"]);
}

#[test]
fn test_new_table_with_unregistered_codec_writes_nothing() {
    let (_temp, path) = setup_temp_path();
    let config = Config {
        registry: Arc::new(CodecRegistry::empty()),
        ..create_config(None, None)
    };
    let mut db = Database::open(&path, config).unwrap();

    let err = db
        .new_table("t", SerializeFormat::Json, CompressFormat::None)
        .unwrap_err();
    assert!(matches!(err, YunaError::UnknownCodec { .. }));
    assert!(db.stored_metadata().unwrap().tables.is_empty());
}

#[test]
fn test_invalid_table_names() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();

    assert!(db
        .new_table("", SerializeFormat::Json, CompressFormat::None)
        .is_err());
    assert!(db
        .new_table(META_KEY, SerializeFormat::Json, CompressFormat::None)
        .is_err());
}

#[test]
fn test_no_such_table() {
    let (_temp, path) = setup_temp_path();
    let db = Database::open(&path, create_config(None, None)).unwrap();

    assert!(matches!(
        db.table("missing").unwrap_err(),
        YunaError::NoSuchTable(_)
    ));
}

#[test]
fn test_drop_table() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();
    db.new_table("a26", SerializeFormat::Str, CompressFormat::Lz4)
        .unwrap()
        .put("a", "1")
        .unwrap();
    db.new_table("keep", SerializeFormat::Json, CompressFormat::None)
        .unwrap();

    db.drop_table("a26").unwrap();
    assert_eq!(db.table_names().unwrap(), vec!["keep"]);
    assert!(db.table("a26").is_err());
    assert!(matches!(
        db.drop_table("a26").unwrap_err(),
        YunaError::NoSuchTable(_)
    ));

    // Recreating the name gives an empty table with the new formats
    let table = db
        .new_table("a26", SerializeFormat::Json, CompressFormat::None)
        .unwrap();
    assert!(table.is_empty().unwrap());
    db.close().unwrap();

    let db = Database::open(&path, open_config(None, None)).unwrap();
    assert_eq!(db.table_names().unwrap(), vec!["keep", "a26"]);
}

// =============================================================================
// Scoped Use Tests
// =============================================================================

#[test]
fn test_scoped_closes_on_success() {
    let (_temp, path) = setup_temp_path();

    let count = Database::scoped(&path, create_config(None, None), |db| {
        let table = db.new_table("t", SerializeFormat::Json, CompressFormat::None)?;
        table.put("k", &json!(1))?;
        table.len()
    })
    .unwrap();
    assert_eq!(count, 1);

    // Reopening works because the scope released the environment
    Database::open(&path, open_config(None, None)).unwrap();
}

#[test]
fn test_scoped_closes_on_error() {
    let (_temp, path) = setup_temp_path();

    let result: yuna::Result<String> = Database::scoped(&path, create_config(None, None), |db| {
        let table = db.new_table("t", SerializeFormat::Str, CompressFormat::None)?;
        table.put("present", "yes")?;
        table.get_strict("absent")
    });
    assert!(matches!(result.unwrap_err(), YunaError::KeyNotFound { .. }));

    let db = Database::open(&path, open_config(None, None)).unwrap();
    assert_eq!(
        db.table("t").unwrap().get::<String>("present").unwrap(),
        Some("yes".to_string())
    );
}

// =============================================================================
// Read-only / Layout Tests
// =============================================================================

#[test]
fn test_read_only_rejects_writes() {
    let (_temp, path) = setup_temp_path();
    {
        let mut db = Database::open(&path, create_config(Some("ro"), None)).unwrap();
        db.new_table("t", SerializeFormat::Json, CompressFormat::None)
            .unwrap()
            .put("k", &json!("v"))
            .unwrap();
        db.close().unwrap();
    }

    let db = Database::open_read_only(&path, Some("ro"), None).unwrap();
    let table = db.table("t").unwrap();
    assert_eq!(table.get::<Value>("k").unwrap(), Some(json!("v")));
    assert!(table.put("k", &json!("w")).is_err());
    assert_eq!(table.get::<Value>("k").unwrap(), Some(json!("v")));
}

#[test]
fn test_directory_layout() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dbdir");
    let config = Config {
        single_file: false,
        ..create_config(Some("dir"), None)
    };
    {
        let mut db = Database::open(&path, config.clone()).unwrap();
        db.new_table("t", SerializeFormat::Json, CompressFormat::None)
            .unwrap()
            .put("k", &json!(true))
            .unwrap();
        db.close().unwrap();
    }
    assert!(path.join("data.mdb").exists());

    let db = Database::open(
        &path,
        Config {
            create: false,
            ..config
        },
    )
    .unwrap();
    assert_eq!(
        db.table("t").unwrap().get::<Value>("k").unwrap(),
        Some(json!(true))
    );
}

// =============================================================================
// Cross-process Tests
// =============================================================================
//
// heed refuses to open the same file twice in one process, so the second
// handle lives in a child: this test binary re-run with only
// `child_process_worker` selected and the job passed through the environment.

const CHILD_DB_ENV: &str = "YUNA_TEST_CHILD_DB";
const CHILD_ACTION_ENV: &str = "YUNA_TEST_CHILD_ACTION";

/// Does nothing in a normal test run; does the requested job in a child
#[test]
fn child_process_worker() {
    let Ok(path) = std::env::var(CHILD_DB_ENV) else {
        return;
    };
    let action = std::env::var(CHILD_ACTION_ENV).unwrap();

    let mut db = Database::open(&path, open_config(None, None)).unwrap();
    match action.as_str() {
        "add" => {
            db.new_table("other", SerializeFormat::Json, CompressFormat::None)
                .unwrap()
                .put("from", "child")
                .unwrap();
        }
        "drop" => db.drop_table("other").unwrap(),
        other => panic!("unknown child action {}", other),
    }
    db.close().unwrap();
}

fn run_in_child(path: &Path, action: &str) {
    let status = Command::new(std::env::current_exe().unwrap())
        .args(["child_process_worker", "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_DB_ENV, path)
        .env(CHILD_ACTION_ENV, action)
        .status()
        .unwrap();
    assert!(status.success(), "child '{}' failed: {}", action, status);
}

#[test]
fn test_new_table_keeps_table_added_by_other_process() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();

    run_in_child(&path, "add");
    db.new_table("mine", SerializeFormat::Json, CompressFormat::None)
        .unwrap();

    assert_eq!(db.table_names().unwrap(), vec!["other", "mine"]);
    assert_eq!(
        db.table("other").unwrap().get::<String>("from").unwrap(),
        Some("child".to_string())
    );
    db.close().unwrap();

    let db = Database::open(&path, open_config(None, None)).unwrap();
    assert_eq!(db.table_names().unwrap(), vec!["other", "mine"]);
}

#[test]
fn test_new_table_duplicate_of_table_added_by_other_process() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();

    run_in_child(&path, "add");
    let err = db
        .new_table("other", SerializeFormat::Str, CompressFormat::None)
        .unwrap_err();
    assert!(matches!(err, YunaError::DuplicateTable(ref name) if name == "other"));

    // The child's configuration survives
    db.refresh().unwrap();
    assert_eq!(
        db.table("other").unwrap().descriptor().serialize,
        SerializeFormat::Json
    );
}

#[test]
fn test_drop_table_keeps_table_added_by_other_process() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();
    db.new_table("keep", SerializeFormat::Json, CompressFormat::None)
        .unwrap();
    db.new_table("gone", SerializeFormat::Json, CompressFormat::None)
        .unwrap();

    run_in_child(&path, "add");
    db.drop_table("gone").unwrap();

    assert_eq!(db.table_names().unwrap(), vec!["keep", "other"]);
    db.close().unwrap();

    let db = Database::open(&path, open_config(None, None)).unwrap();
    assert_eq!(db.table_names().unwrap(), vec!["keep", "other"]);
}

#[test]
fn test_drop_table_dropped_by_other_process() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();

    run_in_child(&path, "add");
    db.refresh().unwrap();
    assert!(db.table("other").is_ok());

    run_in_child(&path, "drop");
    assert!(matches!(
        db.drop_table("other").unwrap_err(),
        YunaError::NoSuchTable(_)
    ));
}

#[test]
fn test_refresh_follows_other_process() {
    let (_temp, path) = setup_temp_path();
    let mut db = Database::open(&path, create_config(None, None)).unwrap();
    db.new_table("mine", SerializeFormat::Json, CompressFormat::None)
        .unwrap()
        .put("k", &json!(1))
        .unwrap();

    run_in_child(&path, "add");
    db.refresh().unwrap();
    assert_eq!(db.table_names().unwrap(), vec!["mine", "other"]);
    assert_eq!(
        db.table("mine").unwrap().get::<Value>("k").unwrap(),
        Some(json!(1))
    );

    run_in_child(&path, "drop");
    db.refresh().unwrap();
    assert_eq!(db.table_names().unwrap(), vec!["mine"]);
    assert!(db.table("other").is_err());
}
