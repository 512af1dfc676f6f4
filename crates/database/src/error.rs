use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("{0}")]
    InvalidConfig(String),

    #[error("failed to connect to database {target} within {timeout_secs}s: {source}")]
    Connect {
        target: String,
        timeout_secs: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("error configuring TLS for {target}: {source}")]
    Tls {
        target: String,
        #[source]
        source: native_tls::Error,
    },

    #[error("error creating connection pool for {target}: {source}")]
    PoolBuild {
        target: String,
        #[source]
        source: deadpool_postgres::BuildError,
    },

    #[error("failed to apply database option: {0}")]
    ApplyOption(#[source] Box<DatabaseError>),

    #[error("database ping failed: {0}")]
    Ping(#[source] sqlx::Error),

    #[error("database ping cancelled")]
    Cancelled,

    #[error("database connection pool exhausted: {open}/{max} connections")]
    PoolExhausted { open: u32, max: u32 },

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("invalid migration {kind} name {name:?}")]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("unable to create migration schema {schema}: {source}")]
    CreateSchema {
        schema: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unable to create migration table {table}: {source}")]
    CreateTable {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unable to get absolute path for migrations {shown}: {source}", shown = .path.display())]
    ResolvePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to load migrations from {url}: {source}")]
    Source {
        url: String,
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    #[error("unable to acquire migration lock: {0}")]
    Lock(#[source] sqlx::Error),

    #[error("database is dirty at version {version}, repair it and reset the tracking table before migrating")]
    Dirty { version: i64 },

    #[error("migration failed at {version}/{description}: {source}")]
    Apply {
        version: i64,
        description: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unable to get migration version: {0}")]
    Version(#[source] sqlx::Error),
}
