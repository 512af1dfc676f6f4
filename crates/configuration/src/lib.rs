use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod postgres;

// Re-export the core types to provide a clean public API.
pub use postgres::{
    DEFAULT_CONN_MAX_IDLE_TIME, DEFAULT_CONN_MAX_LIFETIME, DEFAULT_MAX_IDLE_CONNS,
    DEFAULT_MAX_OPEN_CONNS, DEFAULT_PING_TIMEOUT, DEFAULT_SSL_MODE, PASSWORD_MASK,
    PostgresDatabase,
};

/// Prefix of the environment variables read by [`load_database_config`], e.g. `POSTGRES_HOST`.
pub const ENV_PREFIX: &str = "POSTGRES";

/// Loads the database configuration for the current process.
///
/// Sources are layered, later ones winning: the defaults of [`PostgresDatabase`],
/// an optional `database.toml` in the working directory, then `POSTGRES_*`
/// environment variables (`POSTGRES_HOST`, `POSTGRES_MAX_OPEN_CONNS`, ...).
pub fn load_database_config() -> Result<PostgresDatabase, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("database").required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;

    let config = builder.try_deserialize::<PostgresDatabase>()?;
    tracing::debug!(url = %config.public_connection_string(), "Loaded database configuration.");

    Ok(config)
}

/// Same layering as [`load_database_config`], with an explicit file and env prefix.
pub fn load_database_config_from(
    file: &Path,
    env_prefix: &str,
) -> Result<PostgresDatabase, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(file).required(false))
        .add_source(config::Environment::with_prefix(env_prefix).try_parsing(true))
        .build()?;

    Ok(builder.try_deserialize::<PostgresDatabase>()?)
}
