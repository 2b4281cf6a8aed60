//! Tracing subscriber setup.
//!
//! The core crate only emits events; binaries and test harnesses call
//! [`init_logging`] once to see them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a global subscriber at `level` ("info", "barwise_core=debug", ...).
///
/// `RUST_LOG` wins over `level` when set. Returns false if a subscriber was
/// already installed or the filter did not parse.
pub fn init_logging(level: &str) -> bool {
    let filter = match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level)) {
        Ok(filter) => filter,
        Err(_) => return false,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        // Whichever call wins the race, at most one install succeeds.
        let first = init_logging("warn");
        let second = init_logging("warn");
        assert!(!(first && second));
    }
}
