//! CLI contract tests.

use std::fs;
use std::path::PathBuf;

fn main_source() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/main.rs");
    let source_result = fs::read_to_string(&path);
    assert!(source_result.is_ok());
    match source_result {
        Ok(source) => source,
        Err(err) => panic!("main source should load from {}: {err}", path.display()),
    }
}

#[test]
fn main_defines_primary_subcommands() {
    let source = main_source();
    assert!(source.contains("Start"));
    assert!(source.contains("Config"));
}

#[test]
fn start_is_the_default_subcommand() {
    let source = main_source();
    assert!(source.contains("unwrap_or(Command::Start)"));
}

#[test]
fn main_wires_graceful_shutdown() {
    let source = main_source();
    assert!(source.contains("ctrl_c"));
    assert!(source.contains("shutdown_tx.send(true)"));
    assert!(source.contains("session.stop()"));
}
