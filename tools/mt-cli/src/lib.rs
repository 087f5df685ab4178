///
/// mt-cli - Command-line driver library
///
/// Holds everything the `mt` binary does besides argument parsing:
///
/// - config: TOML run configuration and validation
/// - commands: the `dine` and `pool` subcommands
/// - errors: config and startup errors
///

pub mod commands;
pub mod config;
pub mod errors;

pub use config::{Config, DinnerSection, PoolSection};
pub use errors::{CliError, ConfigError};
