//! Tests for `src/logging.rs`.

use otpgate::logging::LoggingGuard;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_production_creates_the_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // The global subscriber can only be installed once per process; this
    // binary keeps exactly one test that calls init, so the call is safe.
    let guard = otpgate::logging::init_production(&logs_dir).expect("init logging");
    assert!(logs_dir.exists(), "logs directory should be created");
    drop(guard);
}
