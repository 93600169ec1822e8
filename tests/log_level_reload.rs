use mysql_s3_backup::observability::{init_logging, reload_log_level, LogFormat, Rotation};
use tracing::Level;

// One test per file: the subscriber is process-global.
#[test]
fn test_reload_changes_and_restores_level() {
    unsafe { std::env::remove_var("RUST_LOG") };
    init_logging("info", None, Rotation::Never, LogFormat::Text).unwrap();

    assert!(tracing::enabled!(Level::INFO));
    assert!(!tracing::enabled!(Level::DEBUG));

    reload_log_level(Some("debug")).unwrap();
    assert!(tracing::enabled!(Level::DEBUG));

    reload_log_level(None).unwrap();
    assert!(tracing::enabled!(Level::INFO));
    assert!(!tracing::enabled!(Level::DEBUG));

    assert!(reload_log_level(Some("mysql_s3_backup=loud")).is_err());
    assert!(!tracing::enabled!(Level::DEBUG));
}
