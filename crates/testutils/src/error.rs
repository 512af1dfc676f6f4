use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestUtilsError {
    #[error("Docker request failed: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Container exited before PostgreSQL was ready")]
    ContainerExited,

    #[error("PostgreSQL was not ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("Container port {0} is not published on the host")]
    PortNotMapped(&'static str),

    #[error(transparent)]
    Database(#[from] database::DatabaseError),
}
