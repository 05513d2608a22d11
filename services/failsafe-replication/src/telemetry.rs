use failsafe_core::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = fmt().with_env_filter(env_filter).with_target(false);

    if config.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
