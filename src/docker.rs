//! Docker/Podman API runtime backed by bollard

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use common::constants::{DOCKER_CONNECT_TIMEOUT_SECS, KEEPALIVE_COMMAND, TRANSIENT_LABEL};
use common::retry::{is_retryable_docker_error, retry_async_when};
use common::ContainerError;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::runner::{ContainerRuntime, ExecOutput};

/// Connection to a Docker-compatible daemon (Docker or Podman)
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `address` (`unix://`, `tcp://` or `http://`) and ping it
    pub async fn connect(address: &str) -> Result<Self, ContainerError> {
        let unreachable = |message: String| ContainerError::RuntimeUnreachable {
            address: address.to_string(),
            message,
        };

        let docker = match address.strip_prefix("unix://") {
            Some(path) => {
                Docker::connect_with_unix(path, DOCKER_CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            None => {
                Docker::connect_with_http(address, DOCKER_CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
        }
        .map_err(|e| unreachable(e.to_string()))?;

        retry_async_when(|| docker.ping(), is_retryable_docker_error)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        info!(address, "Connected to container runtime");

        Ok(DockerRuntime { docker })
    }

    async fn ensure_image(&self, image: &str) -> Result<(), bollard::errors::Error> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "Image already present");
            return Ok(());
        }

        let reference = with_default_tag(image);
        info!(image = %reference, "Pulling image");
        retry_async_when(|| self.pull(&reference), is_retryable_docker_error).await
    }

    async fn pull(&self, reference: &str) -> Result<(), bollard::errors::Error> {
        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };

        let mut progress = std::pin::pin!(self.docker.create_image(Some(options), None, None));
        while let Some(info) = progress.next().await {
            if let Some(status) = info?.status {
                debug!(image = reference, status = %status, "Pull progress");
            }
        }

        Ok(())
    }

    async fn create(&self, image: &str) -> Result<String, bollard::errors::Error> {
        self.ensure_image(image).await?;

        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(KEEPALIVE_COMMAND.iter().map(|s| s.to_string()).collect()),
            labels: Some(HashMap::from([(
                TRANSIENT_LABEL.to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        for warning in &created.warnings {
            warn!(container = %created.id, warning = %warning, "Runtime warning on create");
        }

        Ok(created.id)
    }

    async fn run_exec(&self, id: &str, command: &str) -> Result<ExecOutput, bollard::errors::Error> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", command]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = ExecOutput::default();

        if let StartExecResults::Attached { output: mut stream, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        output.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        output.exit_code = self.docker.inspect_exec(&exec.id).await?.exit_code;
        Ok(output)
    }

    async fn force_remove(&self, id: &str) -> Result<(), bollard::errors::Error> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, image: &str) -> Result<String, ContainerError> {
        self.create(image)
            .await
            .map_err(|e| ContainerError::Creation {
                image: image.to_string(),
                message: e.to_string(),
            })
    }

    async fn start_container(&self, id: &str) -> Result<(), ContainerError> {
        Ok(self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?)
    }

    async fn exec(&self, id: &str, command: &str) -> Result<ExecOutput, ContainerError> {
        self.run_exec(id, command)
            .await
            .map_err(|e| ContainerError::Execution {
                exit_code: None,
                message: e.to_string(),
            })
    }

    async fn remove_container(&self, id: &str) -> Result<(), ContainerError> {
        Ok(self.force_remove(id).await?)
    }
}

/// The pull API fetches every tag when none is given
fn with_default_tag(image: &str) -> String {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if image.contains('@') || last_segment.contains(':') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}
