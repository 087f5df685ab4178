///
/// CLI error types.
///
/// Config problems plus whatever the primitives report while starting up.
///

use std::path::PathBuf;
use thiserror::Error;

use mt_dining::DiningError;
use mt_pool::PoolError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Dining(#[from] DiningError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConfigError::Io {
            path: PathBuf::from("/tmp/mt.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("Failed to read config"));
        assert!(err.to_string().contains("/tmp/mt.toml"));

        let err = ConfigError::Invalid("philosophers must be at least 1".to_string());
        assert!(err.to_string().contains("Invalid config"));
        assert!(err.to_string().contains("at least 1"));

        let err = CliError::from(DiningError::NoSeats);
        assert!(err.to_string().contains("at least one seat"));

        let err = CliError::from(PoolError::ShutDown);
        assert!(err.to_string().contains("shut down"));
    }
}
