use crate::container::{PostgresContainer, TEST_DB_NAME, TEST_DB_PASSWORD, TEST_DB_USER};
use crate::error::TestUtilsError;
use crate::paths::find_migrations_dir;
use configuration::PostgresDatabase;
use database::{DEFAULT_SCHEMA, DEFAULT_TABLE, Manager, ManagerOptions, MigrationSettings};
use std::path::{Path, PathBuf};

const TEST_MAX_OPEN_CONNS: u32 = 5;
const TEST_MAX_IDLE_CONNS: u32 = 2;
const TEST_PING_TIMEOUT_SECS: u64 = 10;

/// How [`setup_test_manager`] prepares the database.
///
/// Empty strings fall back to the migration defaults.
#[derive(Debug, Clone, Default)]
pub struct TestManagerOptions {
    /// Defaults to the closest `migrations` directory above the calling test.
    pub migrations_path: Option<PathBuf>,
    pub skip_migrations: bool,
    pub migrations_schema: String,
    pub migrations_table: String,
}

impl TestManagerOptions {
    pub fn without_migrations() -> Self {
        Self {
            skip_migrations: true,
            ..Default::default()
        }
    }

    fn migration_settings(&self, caller_dir: &Path) -> MigrationSettings {
        let path = self
            .migrations_path
            .clone()
            .unwrap_or_else(|| find_migrations_dir(caller_dir));
        let schema = non_empty_or(&self.migrations_schema, DEFAULT_SCHEMA);
        let table = non_empty_or(&self.migrations_table, DEFAULT_TABLE);
        MigrationSettings::in_schema(path, schema, table)
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

/// Releases what [`setup_test_manager`] created. Must be awaited by the test.
#[derive(Debug)]
#[must_use = "the container keeps running until the teardown is awaited"]
pub struct Teardown {
    manager: Manager,
    container: PostgresContainer,
}

impl Teardown {
    /// Closes the manager, then removes the container. Failures are logged only.
    pub async fn run(self) {
        self.manager.close().await;
        let id = self.container.id().to_string();
        if let Err(e) = self.container.terminate().await {
            tracing::warn!(container = %id, error = %e, "Failed to terminate test container.");
        }
    }
}

/// Record pointing at a running test container, sized small for tests.
pub fn test_database_config(container: &PostgresContainer) -> PostgresDatabase {
    let mut config = PostgresDatabase::new(
        container.host(),
        container.port(),
        TEST_DB_NAME,
        TEST_DB_USER,
        TEST_DB_PASSWORD,
    );
    config.max_open_conns = TEST_MAX_OPEN_CONNS;
    config.max_idle_conns = TEST_MAX_IDLE_CONNS;
    config.ping_timeout = TEST_PING_TIMEOUT_SECS;
    config
}

/// Starts a PostGIS container and connects a [`Manager`] to it, applying migrations
/// unless `options.skip_migrations` is set.
///
/// `caller_dir` is where the migrations search starts; use the
/// [`setup_test_manager!`](crate::setup_test_manager!) macro to pass the calling
/// file's directory.
pub async fn setup_test_manager(
    caller_dir: &Path,
    options: TestManagerOptions,
) -> Result<(Manager, Teardown), TestUtilsError> {
    let container = PostgresContainer::start().await?;
    let config = test_database_config(&container);

    let manager_options = if options.skip_migrations {
        ManagerOptions::default()
    } else {
        let migrations = options.migration_settings(caller_dir);
        tracing::debug!(path = %migrations.path.display(), "Using test migrations.");
        ManagerOptions {
            migrations: Some(migrations),
        }
    };

    let manager = match Manager::connect_with(config, manager_options).await {
        Ok(manager) => manager,
        Err(e) => {
            if let Err(terminate_err) = container.terminate().await {
                tracing::warn!(error = %terminate_err, "Failed to terminate test container.");
            }
            return Err(e.into());
        }
    };

    let teardown = Teardown {
        manager: manager.clone(),
        container,
    };
    Ok((manager, teardown))
}

/// [`setup_test_manager`] with the calling file's directory.
#[macro_export]
macro_rules! setup_test_manager {
    () => {
        $crate::setup_test_manager!($crate::TestManagerOptions::default())
    };
    ($options:expr) => {
        $crate::manager::setup_test_manager(&$crate::caller_dir!(), $options)
    };
}
