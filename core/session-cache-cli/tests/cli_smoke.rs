use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn run(home: &Path, db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_validator-sessions"))
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env_remove("VALIDATOR_SESSION_CACHE_DB")
        .env_remove("VALIDATOR_SESSION_CACHE_LOG_DIR")
        .arg("--db")
        .arg(db)
        .args(args)
        .output()
        .expect("Failed to run validator-sessions")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

const FIRST: &[&str] = &[
    "--suite",
    "basic_suite",
    "--validator",
    "basic_name",
    "--option",
    "ig_version=1",
    "--option",
    "us_core_version=4",
];

const FIRST_REVERSED: &[&str] = &[
    "--suite",
    "basic_suite",
    "--validator",
    "basic_name",
    "--option",
    "us_core_version=4",
    "--option",
    "ig_version=1",
];

fn with(command: &'static str, context: &[&'static str], extra: &[&'static str]) -> Vec<String> {
    std::iter::once(command)
        .chain(context.iter().copied())
        .chain(extra.iter().copied())
        .map(str::to_string)
        .collect()
}

fn run_vec(home: &Path, db: &Path, args: Vec<String>) -> Output {
    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run(home, db, &refs)
}

#[test]
fn record_lookup_list_and_count() {
    let home = TempDir::new().expect("temp home");
    let db = home.path().join("sessions.db");

    let miss = run_vec(home.path(), &db, with("lookup", FIRST, &[]));
    assert_eq!(miss.status.code(), Some(2));
    assert!(stdout(&miss).is_empty());

    let record = run_vec(
        home.path(),
        &db,
        with("record", FIRST, &["--session-id", "V1"]),
    );
    assert!(record.status.success(), "{record:?}");

    let hit = run_vec(home.path(), &db, with("lookup", FIRST_REVERSED, &[]));
    assert_eq!(hit.status.code(), Some(0));
    assert_eq!(stdout(&hit), "V1");

    let kept = run_vec(
        home.path(),
        &db,
        with("record", FIRST_REVERSED, &["--session-id", "V2", "--if-absent"]),
    );
    assert!(kept.status.success());
    assert_eq!(stdout(&kept), "V1");

    let count = run(home.path(), &db, &["count"]);
    assert_eq!(stdout(&count), "1");

    let list = run(home.path(), &db, &["list"]);
    let line = stdout(&list);
    let value: serde_json::Value = serde_json::from_str(&line).expect("json line");
    assert_eq!(value["validator_session_id"], "V1");
    assert_eq!(value["test_suite_id"], "basic_suite");
    assert_eq!(value["suite_options"]["us_core_version"], "4");
}

#[test]
fn key_is_order_independent_and_needs_no_database() {
    let home = TempDir::new().expect("temp home");
    let db = home.path().join("never-created").join("sessions.db");

    let a = run_vec(home.path(), &db, with("key", FIRST, &[]));
    let b = run_vec(home.path(), &db, with("key", FIRST_REVERSED, &[]));
    assert!(a.status.success());
    assert_eq!(stdout(&a), stdout(&b));
    assert!(!db.exists());
}

#[test]
fn blank_suite_is_rejected() {
    let home = TempDir::new().expect("temp home");
    let db = home.path().join("sessions.db");

    let output = run(
        home.path(),
        &db,
        &["lookup", "--suite", "", "--validator", "basic_name"],
    );
    assert_eq!(output.status.code(), Some(1));
}
