/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Initializes the logger with the `env_logger` crate.
///
/// The level is taken from `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_FILTER`]. Frame hex dumps are logged under the `hart::frame`
/// target, so `RUST_LOG=info,hart::frame=debug` shows the wire traffic
/// without the MAC transitions. Calling it again is a no-op.
pub fn init_logger() {
    if init_logger_with_default(DEFAULT_LOG_FILTER).is_err() {
        log::debug!("logger already installed");
    }
}

/// Initializes the logger with `default_filter` unless `RUST_LOG` is set.
///
/// Returns an error if a logger is already installed.
pub fn init_logger_with_default(default_filter: &str) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init_logger();
        assert!(init_logger_with_default("debug").is_err());
        // no panic on a repeated call
        init_logger();
    }
}
