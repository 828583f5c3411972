use tracing_subscriber::EnvFilter;

use crate::app::config::LoggingSettings;

pub fn init_logging(settings: &LoggingSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Probe output goes to stdout, so logs always go to stderr.
    if settings.json || !cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}
