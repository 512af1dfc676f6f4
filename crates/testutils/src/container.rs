use crate::error::TestUtilsError;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::time::Duration;

pub const POSTGIS_IMAGE: &str = "postgis/postgis:15-3.3";
pub const TEST_DB_NAME: &str = "testdb";
pub const TEST_DB_USER: &str = "testuser";
pub const TEST_DB_PASSWORD: &str = "testpass";

/// Printed once by the temporary server that runs the init scripts and once by the
/// real server afterwards. Only the second one means the database is usable.
pub const READY_MARKER: &str = "database system is ready to accept connections";
pub const READY_OCCURRENCES: usize = 2;
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

const POSTGRES_PORT: &str = "5432/tcp";

/// A throwaway PostGIS server running in Docker.
///
/// Nothing is cleaned up on drop: call [`PostgresContainer::terminate`].
#[derive(Debug)]
pub struct PostgresContainer {
    docker: Docker,
    id: String,
    host: String,
    port: u16,
    connection_string: String,
}

impl PostgresContainer {
    /// Starts [`POSTGIS_IMAGE`] with the `testdb` / `testuser` / `testpass` credentials.
    pub async fn start() -> Result<Self, TestUtilsError> {
        Self::start_image(POSTGIS_IMAGE).await
    }

    /// Starts any image that follows the official `postgres` image conventions.
    pub async fn start_image(image: &str) -> Result<Self, TestUtilsError> {
        let docker = Docker::connect_with_local_defaults()?;
        pull_if_missing(&docker, image).await?;

        let config = Config {
            image: Some(image.to_string()),
            env: Some(vec![
                format!("POSTGRES_DB={TEST_DB_NAME}"),
                format!("POSTGRES_USER={TEST_DB_USER}"),
                format!("POSTGRES_PASSWORD={TEST_DB_PASSWORD}"),
            ]),
            exposed_ports: Some(HashMap::from([(POSTGRES_PORT.to_string(), HashMap::new())])),
            host_config: Some(HostConfig {
                // An empty host port lets Docker pick a free one.
                port_bindings: Some(HashMap::from([(
                    POSTGRES_PORT.to_string(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(String::new()),
                    }]),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;
        let id = created.id;

        let port = match boot(&docker, &id).await {
            Ok(port) => port,
            Err(e) => {
                if let Err(remove_err) = remove(&docker, &id).await {
                    tracing::warn!(container = %id, error = %remove_err, "Failed to remove container after a failed start.");
                }
                return Err(e);
            }
        };

        let host = docker_host();
        let connection_string = format!(
            "postgres://{TEST_DB_USER}:{TEST_DB_PASSWORD}@{host}:{port}/{TEST_DB_NAME}?sslmode=disable"
        );
        tracing::info!(container = %id, %host, port, image, "PostgreSQL container is ready.");

        Ok(Self {
            docker,
            id,
            host,
            port,
            connection_string,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host port mapped to the container's 5432.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Force-removes the container and its anonymous volumes.
    pub async fn terminate(self) -> Result<(), TestUtilsError> {
        remove(&self.docker, &self.id).await?;
        tracing::debug!(container = %self.id, "Terminated PostgreSQL container.");
        Ok(())
    }
}

async fn pull_if_missing(docker: &Docker, image: &str) -> Result<(), TestUtilsError> {
    if docker.inspect_image(image).await.is_ok() {
        return Ok(());
    }

    tracing::info!(image, "Pulling image.");
    docker
        .create_image(
            Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        )
        .try_collect::<Vec<_>>()
        .await?;
    Ok(())
}

/// Starts the container, waits for readiness and returns the published port.
async fn boot(docker: &Docker, id: &str) -> Result<u16, TestUtilsError> {
    docker
        .start_container(id, None::<StartContainerOptions<String>>)
        .await?;

    tokio::time::timeout(STARTUP_TIMEOUT, wait_until_ready(docker, id))
        .await
        .map_err(|_| TestUtilsError::StartupTimeout(STARTUP_TIMEOUT))??;

    mapped_port(docker, id).await
}

async fn wait_until_ready(docker: &Docker, id: &str) -> Result<(), TestUtilsError> {
    let logs = docker.logs(
        id,
        Some(LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        }),
    );
    tokio::pin!(logs);

    // Kept whole so a marker split across two frames is still found.
    let mut output = String::new();
    while let Some(frame) = logs.next().await {
        output.push_str(&frame?.to_string());
        if output.matches(READY_MARKER).count() >= READY_OCCURRENCES {
            return Ok(());
        }
    }

    Err(TestUtilsError::ContainerExited)
}

async fn mapped_port(docker: &Docker, id: &str) -> Result<u16, TestUtilsError> {
    let inspect = docker
        .inspect_container(id, None::<InspectContainerOptions>)
        .await?;

    inspect
        .network_settings
        .and_then(|settings| settings.ports)
        .and_then(|ports| ports.get(POSTGRES_PORT).cloned().flatten())
        .and_then(|bindings| {
            bindings
                .iter()
                .find_map(|b| b.host_port.as_deref()?.parse::<u16>().ok())
        })
        .ok_or(TestUtilsError::PortNotMapped(POSTGRES_PORT))
}

async fn remove(docker: &Docker, id: &str) -> Result<(), TestUtilsError> {
    docker
        .remove_container(
            id,
            Some(RemoveContainerOptions {
                force: true,
                v: true,
                ..Default::default()
            }),
        )
        .await?;
    Ok(())
}

/// Host on which published ports are reachable: the `DOCKER_HOST` machine for a
/// remote daemon, `localhost` otherwise.
fn docker_host() -> String {
    std::env::var("DOCKER_HOST")
        .ok()
        .and_then(|value| host_from_docker_url(&value))
        .unwrap_or_else(|| "localhost".to_string())
}

fn host_from_docker_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("tcp://")?;
    let host = rest.split([':', '/']).next()?;
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_host_from_url() {
        assert_eq!(
            host_from_docker_url("tcp://10.0.0.5:2376"),
            Some("10.0.0.5".to_string())
        );
        assert_eq!(
            host_from_docker_url("tcp://docker.internal"),
            Some("docker.internal".to_string())
        );
        assert_eq!(host_from_docker_url("unix:///var/run/docker.sock"), None);
        assert_eq!(host_from_docker_url("tcp://"), None);
    }
}
