//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::config::EnvelopeConfig;
use crate::error::{Error, Result};

/// Install a JSON `tracing` subscriber filtered by `log_level`
///
/// `RUST_LOG` is not consulted; an unparsable level falls back to `info`.
///
/// # Errors
///
/// Returns [`Error::Observability`] if a global subscriber is already set.
pub fn init_tracing(config: &EnvelopeConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| Error::Observability(err.to_string()))?;

    tracing::info!(
        camel_case = config.camel_case,
        use_feedback = config.use_feedback,
        "Tracing initialized for acton-envelope"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = EnvelopeConfig::default();
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(Error::Observability(_))
        ));
    }
}
