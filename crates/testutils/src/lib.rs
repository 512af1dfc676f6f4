//! Fixtures for integration tests that need a real PostgreSQL.
//!
//! ```ignore
//! #[tokio::test]
//! async fn users_table_exists() {
//!     let (manager, teardown) = testutils::setup_test_manager!().await.unwrap();
//!     // ... use manager.pool() ...
//!     teardown.run().await;
//! }
//! ```
//!
//! Containers need a reachable Docker daemon. Tests built on them are usually marked
//! `#[ignore]` and run with `cargo test -- --ignored`.

pub mod container;
pub mod env;
pub mod error;
pub mod manager;
pub mod paths;

pub use container::PostgresContainer;
pub use env::{missing_vars, setup_test_env};
pub use error::TestUtilsError;
pub use manager::{Teardown, TestManagerOptions, setup_test_manager, test_database_config};
pub use paths::{find_migrations_dir, project_root, test_data_file_path};

#[doc(hidden)]
pub use tracing;
