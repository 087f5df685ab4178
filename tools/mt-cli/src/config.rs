///
/// # Run Configuration
///
/// Settings for both demos can live in a TOML file. Every field is
/// optional and falls back to the defaults below; command-line flags are
/// applied on top of whatever the file provides.
///
/// ## Example mt.toml
///
/// ```toml
/// [dinner]
/// philosophers = 5
/// think_ms = 15
/// eat_ms = 10
/// jitter_ms = 5
/// meals = 20
/// seed = 42
///
/// [pool]
/// workers = 4
/// tasks = 32
/// ```
///

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use mt_dining::DinnerConfig;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub dinner: DinnerSection,
    pub pool: PoolSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DinnerSection {
    pub philosophers: usize,
    pub think_ms: u64,
    pub eat_ms: u64,
    pub jitter_ms: u64,
    pub meals: Option<u64>,
    pub seed: Option<u64>,
}

impl Default for DinnerSection {
    fn default() -> Self {
        let defaults = DinnerConfig::default();
        Self {
            philosophers: defaults.philosophers,
            think_ms: defaults.think.as_millis() as u64,
            eat_ms: defaults.eat.as_millis() as u64,
            jitter_ms: defaults.jitter.as_millis() as u64,
            meals: defaults.meals,
            seed: defaults.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSection {
    pub workers: usize,
    pub tasks: usize,
    /// Make every n-th task panic to show that workers survive it; 0 disables
    pub panic_every: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            workers: 4,
            tasks: 16,
            panic_every: 0,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dinner.philosophers == 0 {
            return Err(ConfigError::Invalid(
                "dinner.philosophers must be at least 1".to_string(),
            ));
        }
        if self.pool.workers == 0 {
            return Err(ConfigError::Invalid(
                "pool.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl DinnerSection {
    pub fn to_dinner_config(&self) -> DinnerConfig {
        DinnerConfig {
            philosophers: self.philosophers,
            think: Duration::from_millis(self.think_ms),
            eat: Duration::from_millis(self.eat_ms),
            jitter: Duration::from_millis(self.jitter_ms),
            meals: self.meals,
            seed: self.seed,
        }
    }
}
