//! Versioned SQL migrations tracked in `<schema>.<table>`.
//!
//! Migration files live in one directory and are named
//! `<version>_<description>.up.sql` / `<version>_<description>.down.sql`, for example
//! `000001_create_users_table.up.sql`. Only `up` files are applied here.
//!
//! The tracking table holds a single row `(version, dirty)`: `dirty` is set before a
//! migration starts and cleared once it has committed, so a crash in between leaves
//! the database flagged for an operator to look at.

use crate::error::MigrationError;
use sqlx::migrate::{Migration, Migrator};
use sqlx::{Connection, PgConnection, PgPool};
use std::path::{Path, PathBuf};

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_TABLE: &str = "schema_migrations";

/// Longest identifier PostgreSQL keeps without truncating.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Where to find migrations and where to record them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    pub path: PathBuf,
    pub schema: String,
    pub table: String,
}

impl MigrationSettings {
    /// Migrations from `path`, tracked in `public.schema_migrations`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::in_schema(path, DEFAULT_SCHEMA, DEFAULT_TABLE)
    }

    pub fn in_schema(
        path: impl Into<PathBuf>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

/// What a migration run did, and where it left the tracking table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Number of migrations applied by this run. Zero when nothing was pending.
    pub applied: usize,
    /// Last recorded version, `None` if no migration was ever applied.
    pub version: Option<i64>,
    pub dirty: bool,
}

/// Applies every pending `up` migration found in `path`, in version order.
///
/// Empty `schema` and `table` fall back to [`DEFAULT_SCHEMA`] and [`DEFAULT_TABLE`].
/// The schema and the tracking table are created when missing. Having nothing to
/// apply is not an error.
///
/// Runs are serialized across processes with an advisory lock on the tracking
/// table. A tracking row left dirty by an interrupted run stops the migration.
pub async fn run_migrations(
    pool: &PgPool,
    path: impl AsRef<Path>,
    schema: &str,
    table: &str,
) -> Result<MigrationReport, MigrationError> {
    let schema = if schema.is_empty() { DEFAULT_SCHEMA } else { schema };
    let table = if table.is_empty() { DEFAULT_TABLE } else { table };
    validate_identifier("schema", schema)?;
    validate_identifier("table", table)?;

    let path = path.as_ref();
    let absolute = std::path::absolute(path).map_err(|source| MigrationError::ResolvePath {
        path: path.to_path_buf(),
        source,
    })?;
    let url = source_url(&absolute);
    tracing::debug!(source = %url, "Loading migrations.");

    let migrator = Migrator::new(absolute)
        .await
        .map_err(|source| MigrationError::Source {
            url: url.clone(),
            source,
        })?;

    let mut conn = pool.acquire().await.map_err(MigrationError::Lock)?;
    let lock_key = format!("{schema}.{table}");
    sqlx::query("SELECT pg_advisory_lock(hashtext(current_database() || ':' || $1)::bigint)")
        .bind(&lock_key)
        .execute(&mut *conn)
        .await
        .map_err(MigrationError::Lock)?;

    let result = migrate_locked(&mut *conn, &migrator, schema, table).await;

    if let Err(e) = sqlx::query(
        "SELECT pg_advisory_unlock(hashtext(current_database() || ':' || $1)::bigint)",
    )
    .bind(&lock_key)
    .execute(&mut *conn)
    .await
    {
        // A lock we cannot release must not go back into the pool.
        tracing::warn!(error = %e, lock = %lock_key, "Failed to release migration lock.");
        drop(conn.detach());
    }

    let report = result?;
    match report.version {
        None => tracing::debug!("No migrations applied yet."),
        Some(version) => tracing::debug!(
            version,
            dirty = report.dirty,
            applied = report.applied,
            tracking_table = %lock_key,
            "Migrations applied successfully."
        ),
    }

    Ok(report)
}

/// Everything that must happen while holding the migration lock, including the
/// DDL: concurrent `CREATE ... IF NOT EXISTS` still collide in the catalogs.
async fn migrate_locked(
    conn: &mut PgConnection,
    migrator: &Migrator,
    schema: &str,
    table: &str,
) -> Result<MigrationReport, MigrationError> {
    let tracking_table = format!("\"{schema}\".\"{table}\"");

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
        .execute(&mut *conn)
        .await
        .map_err(|source| MigrationError::CreateSchema {
            schema: schema.to_string(),
            source,
        })?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {tracking_table} (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)"
    ))
    .execute(&mut *conn)
    .await
    .map_err(|source| MigrationError::CreateTable {
        table: format!("{schema}.{table}"),
        source,
    })?;

    let applied = apply_pending(conn, migrator, &tracking_table).await?;

    let (version, dirty) = match read_version(conn, &tracking_table).await? {
        Some((version, dirty)) => (Some(version), dirty),
        None => (None, false),
    };

    Ok(MigrationReport {
        applied,
        version,
        dirty,
    })
}

async fn apply_pending(
    conn: &mut PgConnection,
    migrator: &Migrator,
    tracking_table: &str,
) -> Result<usize, MigrationError> {
    let current = read_version(conn, tracking_table).await?;
    if let Some((version, true)) = current {
        return Err(MigrationError::Dirty { version });
    }
    let current = current.map(|(version, _)| version);

    let mut pending: Vec<&Migration> = migrator
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .filter(|m| current.is_none_or(|v| m.version > v))
        .collect();
    pending.sort_by_key(|m| m.version);

    for migration in &pending {
        let apply_err = |source| MigrationError::Apply {
            version: migration.version,
            description: migration.description.to_string(),
            source,
        };

        set_version(conn, tracking_table, migration.version, true)
            .await
            .map_err(apply_err)?;
        execute(conn, migration).await.map_err(apply_err)?;
        set_version(conn, tracking_table, migration.version, false)
            .await
            .map_err(apply_err)?;

        tracing::info!(
            version = migration.version,
            description = %migration.description,
            "Applied migration."
        );
    }

    Ok(pending.len())
}

async fn execute(conn: &mut PgConnection, migration: &Migration) -> Result<(), sqlx::Error> {
    if migration.no_tx {
        sqlx::raw_sql(&migration.sql).execute(&mut *conn).await?;
        return Ok(());
    }

    let mut tx = conn.begin().await?;
    sqlx::raw_sql(&migration.sql).execute(&mut *tx).await?;
    tx.commit().await
}

async fn set_version(
    conn: &mut PgConnection,
    tracking_table: &str,
    version: i64,
    dirty: bool,
) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;
    sqlx::query(&format!("DELETE FROM {tracking_table}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!(
        "INSERT INTO {tracking_table} (version, dirty) VALUES ($1, $2)"
    ))
    .bind(version)
    .bind(dirty)
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

async fn read_version(
    conn: &mut PgConnection,
    tracking_table: &str,
) -> Result<Option<(i64, bool)>, MigrationError> {
    sqlx::query_as::<_, (i64, bool)>(&format!(
        "SELECT version, dirty FROM {tracking_table} LIMIT 1"
    ))
    .fetch_optional(&mut *conn)
    .await
    .map_err(MigrationError::Version)
}

/// `file://` locator for an absolute path, always with forward slashes.
fn source_url(absolute: &Path) -> String {
    let normalized = absolute.to_string_lossy().replace('\\', "/");
    format!("file://{normalized}")
}

// Names are interpolated quoted into DDL, so only plain lowercase identifiers are
// accepted: they name the same object quoted or unquoted.
fn validate_identifier(kind: &'static str, name: &str) -> Result<(), MigrationError> {
    let mut chars = name.chars();
    let valid = name.len() <= MAX_IDENTIFIER_LEN
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(MigrationError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_public_schema_migrations() {
        let settings = MigrationSettings::new("migrations");
        assert_eq!(settings.path, PathBuf::from("migrations"));
        assert_eq!(settings.schema, "public");
        assert_eq!(settings.table, "schema_migrations");
    }

    #[test]
    fn identifiers() {
        for ok in ["public", "etl_migrations", "_private", "schema2"] {
            assert!(validate_identifier("schema", ok).is_ok(), "{ok}");
        }
        for bad in ["", "1schema", "with space", "quo\"te", "semi;colon", "dash-ed"] {
            assert!(validate_identifier("schema", bad).is_err(), "{bad:?}");
        }
        assert!(validate_identifier("table", &"a".repeat(63)).is_ok());
        assert!(validate_identifier("table", &"a".repeat(64)).is_err());
    }

    #[test]
    fn mixed_case_identifiers_are_rejected() {
        // Unquoted, `Schema2` would fold to `schema2`; quoted it would not.
        for bad in ["Schema2", "PUBLIC", "schema_Migrations"] {
            let err = validate_identifier("table", bad).unwrap_err();
            assert!(
                matches!(err, MigrationError::InvalidIdentifier { kind: "table", .. }),
                "{bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn runner_can_be_spawned() {
        // Never connects: the identifier is rejected first.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy_with(sqlx::postgres::PgConnectOptions::new());
        let handle = tokio::spawn(async move {
            run_migrations(&pool, PathBuf::from("migrations"), "bad name", "").await
        });

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MigrationError::InvalidIdentifier { kind: "schema", .. }));
    }

    #[test]
    fn source_url_uses_forward_slashes() {
        assert_eq!(
            source_url(Path::new("/srv/app/migrations")),
            "file:///srv/app/migrations"
        );
        assert_eq!(
            source_url(Path::new(r"C:\app\migrations")),
            "file://C:/app/migrations"
        );
    }

    #[tokio::test]
    async fn migration_files_are_discovered_in_version_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, sql) in [
            ("000002_add_email.up.sql", "ALTER TABLE users ADD COLUMN email TEXT;"),
            ("000002_add_email.down.sql", "ALTER TABLE users DROP COLUMN email;"),
            ("000001_create_users_table.up.sql", "CREATE TABLE users (id BIGINT);"),
            ("000001_create_users_table.down.sql", "DROP TABLE users;"),
        ] {
            std::fs::write(dir.path().join(name), sql).unwrap();
        }

        let migrator = Migrator::new(dir.path().to_path_buf()).await.unwrap();
        let ups: Vec<(i64, String)> = migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| (m.version, m.description.to_string()))
            .collect();

        assert_eq!(
            ups,
            vec![
                (1, "create users table".to_string()),
                (2, "add email".to_string()),
            ]
        );
    }
}
