//! Logging setup for hosts embedding the agent

use crate::config::GeneralConfig;
use crate::error::{ShelfError, ShelfResult};
use tracing_subscriber::EnvFilter;

/// Build the log filter: quiet = warn, verbose = debug, otherwise info.
///
/// `RUST_LOG` wins when set so hosts can narrow it further.
pub fn filter(general: &GeneralConfig, quiet: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    match (quiet, general.verbose) {
        (true, _) => EnvFilter::new("shelf=warn"),
        (false, false) => EnvFilter::new("shelf=info"),
        (false, true) => EnvFilter::new("shelf=debug"),
    }
}

/// Install the global tracing subscriber
pub fn init(general: &GeneralConfig, quiet: bool) -> ShelfResult<()> {
    let filter = filter(general, quiet);

    let result = match general.log_format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
        "text" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .try_init(),
        other => {
            return Err(ShelfError::ConfigInvalid {
                path: "config.toml".into(),
                reason: format!("unknown log_format '{}', expected text or json", other),
            })
        }
    };

    result.map_err(|e| ShelfError::Internal(format!("installing tracing subscriber: {}", e)))
}
