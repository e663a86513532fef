/// Development helper: initialize a tracing subscriber when `RUST_LOG` is set.
///
/// Tests, benches and demos call `singlesock::dev_tracing::init_tracing()` to see
/// the `[OWNED]`, `[WORKER]`, `[POLLER]`, `[PROXY]` and `[INPROC]` events. This
/// is a no-op when `RUST_LOG` is not set or a global subscriber is already
/// installed, so calling it from every test is fine.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}
