use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Setup tracing + log integration.
///
/// The library logs through `log`; this bridges those records into a
/// stderr-bound tracing subscriber filtered by `RUST_LOG` (default `warn`).
pub fn setup_logging() {
    if LogTracer::init().is_err() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
