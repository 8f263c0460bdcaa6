// SPDX-License-Identifier: MIT OR Apache-2.0
//! Container runtime seam and its Docker implementation.

use crate::models::ContainerStatus;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, InspectNetworkOptions, ListContainersOptionsBuilder,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptionsBuilder,
};
use dm_error::{ErrorCode, MeshError};
use std::collections::HashMap;
use tracing::info;

/// Label identifying the owning session on every dry-run container.
pub const SESSION_LABEL: &str = "dryrun.session_id";
/// Label carrying the mounted repository name.
pub const REPO_LABEL: &str = "dryrun.repo_name";
/// Discovery-type label applied to all dry-run containers.
pub const TYPE_LABEL: &str = "discovery.type";

/// Everything needed to run one workload container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Network to attach.
    pub network: String,
    /// Host path bind-mounted read-only at `/app/<repo>`.
    pub host_repo_path: String,
    /// Repository name (mount point suffix and label value).
    pub repo_name: String,
    /// Owning session id.
    pub session_id: String,
}

/// The subset of container operations the orchestrator needs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the shared network exists.
    async fn network_exists(&self, name: &str) -> Result<bool, MeshError>;

    /// Run a detached, idling workload container. Returns the container id.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, MeshError>;

    /// All containers labelled with the session id, running or not.
    async fn list_session_containers(
        &self,
        session_id: &str,
    ) -> Result<Vec<ContainerStatus>, MeshError>;

    /// Stop (with timeout) and remove one container.
    async fn stop_and_remove(&self, container_id: &str, timeout_s: i32) -> Result<(), MeshError>;

    /// Whether the daemon answers a ping.
    async fn ping(&self) -> bool;
}

fn docker_err(e: bollard::errors::Error) -> MeshError {
    MeshError::new(ErrorCode::Internal, e.to_string())
}

/// [`ContainerRuntime`] over the host Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect with the daemon's local defaults (socket or pipe).
    pub fn connect() -> Result<Self, MeshError> {
        let docker = Docker::connect_with_local_defaults().map_err(docker_err)?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn network_exists(&self, name: &str) -> Result<bool, MeshError> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(docker_err(e)),
        }
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, MeshError> {
        let labels = HashMap::from([
            (SESSION_LABEL.to_string(), spec.session_id.clone()),
            (REPO_LABEL.to_string(), spec.repo_name.clone()),
            (TYPE_LABEL.to_string(), "code-repo".to_string()),
        ]);
        let host_config = HostConfig {
            network_mode: Some(spec.network.clone()),
            binds: Some(vec![format!(
                "{}:/app/{}:ro",
                spec.host_repo_path, spec.repo_name
            )]),
            ..Default::default()
        };
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            // Keep the container idling so collectors can scan the mount.
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptionsBuilder::default()
            .name(&spec.name)
            .build();
        let created = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(docker_err)?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await
            .map_err(docker_err)?;

        info!(container_id = %short_id(&created.id), name = %spec.name, "container started");
        Ok(created.id)
    }

    async fn list_session_containers(
        &self,
        session_id: &str,
    ) -> Result<Vec<ContainerStatus>, MeshError> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{SESSION_LABEL}={session_id}")],
        )]);
        let options = ListContainersOptionsBuilder::default()
            .all(true)
            .filters(&filters)
            .build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(docker_err)?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerStatus {
                container_id: short_id(c.id.as_deref().unwrap_or_default()),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                status: c.state.map(|s| s.to_string()).unwrap_or_default(),
                image: c.image.unwrap_or_default(),
            })
            .collect())
    }

    async fn stop_and_remove(&self, container_id: &str, timeout_s: i32) -> Result<(), MeshError> {
        let stop_options = StopContainerOptionsBuilder::default().t(timeout_s).build();
        match self
            .docker
            .stop_container(container_id, Some(stop_options))
            .await
        {
            Ok(())
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(()),
            Err(e) => return Err(docker_err(e)),
        }
        match self
            .docker
            .remove_container(container_id, None::<RemoveContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(docker_err(e)),
        }
    }

    async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

/// First 12 characters of a container id.
pub fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}
