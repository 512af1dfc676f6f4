use crate::error::DatabaseError;
use crate::migrations::{MigrationSettings, run_migrations};
use configuration::PostgresDatabase;
use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod, Runtime};
use postgres_native_tls::MakeTlsConnector;
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound applied to every configured pool size.
const MAX_POOL_SIZE: u32 = i32::MAX as u32;

/// What to do once both handles are open.
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    /// Apply migrations from this directory before handing out the manager.
    pub migrations: Option<MigrationSettings>,
}

impl ManagerOptions {
    /// Run the migrations in `path`, tracked in `public.schema_migrations`.
    pub fn with_migrations(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            migrations: Some(MigrationSettings::new(path)),
        }
    }

    /// Run the migrations in `path`, tracked in `<schema>.<table>`.
    pub fn with_migrations_in_schema(
        path: impl Into<std::path::PathBuf>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            migrations: Some(MigrationSettings::in_schema(path, schema, table)),
        }
    }
}

/// Snapshot of the generic pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_open_connections: u32,
    pub open_connections: u32,
    pub in_use: u32,
    pub idle: u32,
}

/// Owns the live connections to one PostgreSQL database.
///
/// Two pools share the same configuration:
///
/// - [`Manager::pool`], a `sqlx` pool for ordinary queries.
/// - [`Manager::batch_pool`], a `deadpool-postgres` pool of `tokio-postgres` clients
///   for pipelined, `COPY` and other binary-protocol heavy work.
///
/// A `Manager` only exists once both pools are open and the database answered a
/// ping. Construction either succeeds completely or releases everything it opened.
/// Clones share the same pools.
#[derive(Clone)]
pub struct Manager {
    pool: PgPool,
    batch_pool: Pool,
    config: Arc<PostgresDatabase>,
}

impl Manager {
    /// Connects without running migrations.
    pub async fn connect(config: PostgresDatabase) -> Result<Self, DatabaseError> {
        Self::connect_with(config, ManagerOptions::default()).await
    }

    /// Validates `config`, opens both pools, checks the database is reachable within
    /// `config.ping_timeout` seconds, then applies `options`.
    pub async fn connect_with(
        config: PostgresDatabase,
        options: ManagerOptions,
    ) -> Result<Self, DatabaseError> {
        let ssl_mode = validate(&config)?;
        let max_open = pool_limit(config.max_open_conns);
        let pool = generic_pool(&config, ssl_mode, max_open);

        if let Err(source) = probe(&pool, config.ping_timeout_duration()).await {
            pool.close().await;
            return Err(DatabaseError::Connect {
                target: config.public_connection_string(),
                timeout_secs: config.ping_timeout,
                source,
            });
        }

        let batch_pool = match build_batch_pool(&config, ssl_mode, max_open) {
            Ok(batch_pool) => batch_pool,
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        };

        let manager = Self {
            pool,
            batch_pool,
            config: Arc::new(config),
        };

        if let Some(migrations) = options.migrations {
            if let Err(e) = run_migrations(
                &manager.pool,
                &migrations.path,
                &migrations.schema,
                &migrations.table,
            )
            .await
            {
                manager.close().await;
                return Err(DatabaseError::ApplyOption(Box::new(e.into())));
            }
        }

        tracing::info!(
            url = %manager.public_connection_string(),
            max_open,
            "Connected to database."
        );
        Ok(manager)
    }

    /// The generic `sqlx` pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The `tokio-postgres` pool for batch and streaming operations.
    pub fn batch_pool(&self) -> &Pool {
        &self.batch_pool
    }

    pub fn config(&self) -> &PostgresDatabase {
        &self.config
    }

    /// Round-trips to the database, giving up as soon as `cancel` fires.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), DatabaseError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DatabaseError::Cancelled),
            result = ping_once(&self.pool) => result.map_err(DatabaseError::Ping),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let open = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX).min(open);
        PoolStats {
            max_open_connections: pool_limit(self.config.max_open_conns),
            open_connections: open,
            in_use: open - idle,
            idle,
        }
    }

    /// Healthy means the ping succeeds and the generic pool still has room to open
    /// another connection.
    pub async fn health(&self, cancel: &CancellationToken) -> Result<(), DatabaseError> {
        self.ping(cancel).await?;

        let stats = self.stats();
        if stats.open_connections >= stats.max_open_connections {
            return Err(DatabaseError::PoolExhausted {
                open: stats.open_connections,
                max: stats.max_open_connections,
            });
        }

        Ok(())
    }

    /// Closes the batch pool, then the generic pool. Calling it again is harmless.
    pub async fn close(&self) {
        self.batch_pool.close();
        self.pool.close().await;
        tracing::debug!(url = %self.public_connection_string(), "Closed database connections.");
    }

    pub fn public_connection_string(&self) -> String {
        self.config.public_connection_string()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("url", &self.public_connection_string())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Rejects a record that cannot possibly connect, before any I/O happens.
fn validate(config: &PostgresDatabase) -> Result<PgSslMode, DatabaseError> {
    if config.host.is_empty() {
        return Err(DatabaseError::InvalidConfig("host cannot be empty".into()));
    }
    if config.database.is_empty() {
        return Err(DatabaseError::InvalidConfig(
            "database name cannot be empty".into(),
        ));
    }
    if config.user.is_empty() {
        return Err(DatabaseError::InvalidConfig("user cannot be empty".into()));
    }

    // Same default as libpq when no mode is given.
    if config.ssl_mode.is_empty() {
        return Ok(PgSslMode::Prefer);
    }
    config.ssl_mode.parse::<PgSslMode>().map_err(|_| {
        DatabaseError::InvalidConfig(format!("unsupported sslmode {:?}", config.ssl_mode))
    })
}

/// Zero means "no limit", which is still capped to what a 32-bit signed size holds.
fn pool_limit(configured: u32) -> u32 {
    if configured == 0 {
        MAX_POOL_SIZE
    } else {
        configured.min(MAX_POOL_SIZE)
    }
}

// No idle floor: sqlx would hold `min_connections` open forever, and `health`
// counts them. Idle connections are reaped after `conn_max_idle_time`.
fn generic_pool(config: &PostgresDatabase, ssl_mode: PgSslMode, max_open: u32) -> PgPool {
    PgPoolOptions::new()
        .max_connections(max_open)
        .min_connections(0)
        .max_lifetime(config.conn_max_lifetime_duration())
        .idle_timeout(config.conn_max_idle_time_duration())
        .acquire_timeout(config.ping_timeout_duration())
        .connect_lazy_with(connect_options(config, ssl_mode))
}

// Built field by field rather than from the URL so passwords containing `@`, `#`
// or `/` reach the server unchanged.
fn connect_options(config: &PostgresDatabase, ssl_mode: PgSslMode) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password)
        .ssl_mode(ssl_mode)
}

async fn ping_once(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

async fn probe(pool: &PgPool, timeout: Duration) -> Result<(), sqlx::Error> {
    tokio::time::timeout(timeout, ping_once(pool))
        .await
        .map_err(|_| sqlx::Error::PoolTimedOut)?
}

fn build_batch_pool(
    config: &PostgresDatabase,
    ssl_mode: PgSslMode,
    max_size: u32,
) -> Result<Pool, DatabaseError> {
    let (pg_ssl_mode, verify_certs, verify_hostname) = match ssl_mode {
        PgSslMode::Disable => (tokio_postgres::config::SslMode::Disable, false, false),
        PgSslMode::Allow | PgSslMode::Prefer => {
            (tokio_postgres::config::SslMode::Prefer, false, false)
        }
        PgSslMode::Require => (tokio_postgres::config::SslMode::Require, false, false),
        PgSslMode::VerifyCa => (tokio_postgres::config::SslMode::Require, true, false),
        PgSslMode::VerifyFull => (tokio_postgres::config::SslMode::Require, true, true),
    };

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!verify_certs)
        .danger_accept_invalid_hostnames(!verify_hostname)
        .build()
        .map_err(|source| DatabaseError::Tls {
            target: config.public_connection_string(),
            source,
        })?;

    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(config.host.as_str())
        .port(config.port)
        .dbname(config.database.as_str())
        .user(config.user.as_str())
        .password(config.password.as_str())
        .ssl_mode(pg_ssl_mode)
        .connect_timeout(config.ping_timeout_duration());

    let mut manager_config = ManagerConfig::default();
    manager_config.recycling_method = RecyclingMethod::Fast;
    let manager = deadpool_postgres::Manager::from_config(
        pg_config,
        MakeTlsConnector::new(connector),
        manager_config,
    );

    Pool::builder(manager)
        .max_size(max_size as usize)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(config.ping_timeout_duration()))
        .create_timeout(Some(config.ping_timeout_duration()))
        .build()
        .map_err(|source| DatabaseError::PoolBuild {
            target: config.public_connection_string(),
            source,
        })
}
