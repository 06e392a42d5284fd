use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Route connector and test events to the test writer.
///
/// Integration tests link `neptune_connector` as an external crate, and
/// `#[traced_test]` only captures events from the crate under test, so the
/// connector's own logging would be filtered out. Call this at the start of
/// each test instead. Only the first call in a process installs the
/// subscriber.
pub fn tracing_logger() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("neptune_connector=trace,server_connector_tests=trace"));
    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(env_filter)
        .with_thread_ids(true)
        .with_test_writer()
        .finish();

    // tests in one binary share the process, so all but the first call fail
    let _result = tracing::subscriber::set_global_default(subscriber);
}
