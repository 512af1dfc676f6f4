//! # Database Crate
//!
//! Connection lifecycle for a single PostgreSQL database, shared by every service
//! that talks to one.
//!
//! ## Architectural Principles
//!
//! - **All-or-nothing construction:** [`Manager::connect_with`] validates the
//!   configuration, opens both pools, pings the server and applies migrations. Any
//!   failure closes whatever was already open before the error is returned.
//! - **Two pools, one config:** a `sqlx` pool for everyday queries and a
//!   `deadpool-postgres` pool for batch work, sized from the same record.
//! - **Nothing hidden:** no retries, no swallowed errors. Every failure comes back
//!   with the password-masked connection string or the failing migration step.
//!
//! ## Public API
//!
//! - `Manager`: the connection manager (`connect`, `ping`, `stats`, `health`, `close`).
//! - `ManagerOptions`: what to do after connecting (migrations).
//! - `run_migrations`: apply the `up` migrations of a directory, tracked in `<schema>.<table>`.
//! - `DatabaseError` / `MigrationError`: the errors returned by this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod migrations;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{Manager, ManagerOptions, PoolStats};
pub use error::{DatabaseError, MigrationError};
pub use migrations::{
    DEFAULT_SCHEMA, DEFAULT_TABLE, MigrationReport, MigrationSettings, run_migrations,
};
pub use tokio_util::sync::CancellationToken;
