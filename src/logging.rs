use tracing_subscriber::EnvFilter;

use crate::error::AppError;

const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` wins over the configured filter, which wins over `info`.
/// Output goes to stderr so stdout stays free for the run summary.
pub fn init_tracing(configured_filter: Option<&str>, json: bool) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_filter.unwrap_or(DEFAULT_FILTER)))
        .map_err(|e| AppError::Config(format!("invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| AppError::General(format!("failed to install tracing subscriber: {e}")))
}
