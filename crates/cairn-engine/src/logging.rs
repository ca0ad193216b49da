//! Tracing subscriber setup.
//!
//! The engine logs through `tracing`; hosts call [`init_tracing`] once at
//! startup. `RUST_LOG` overrides `default_directive` when set.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `RUST_LOG` or, if unset or
/// unparsable, by `default_directive` (e.g. `"warn"` or `"cairn_engine=debug"`).
///
/// Returns `false` if a global subscriber was already installed, which makes
/// repeated calls from tests harmless.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let _ = init_tracing("warn");
        assert!(!init_tracing("debug"));
    }
}
