//! Transient container queries
//!
//! `ContainerRunner` creates a container, runs one command in it and removes
//! it again. Every container that was created is removed: after the
//! command finishes, fails or times out, and from a background task if the
//! query future is dropped half way (removal included).

use std::future::Future;
use std::time::Duration;

use common::ContainerError;
use tracing::{debug, warn};

/// Output of a command run inside a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
}

/// What the checker needs from a Docker- or Podman-compatible runtime
///
/// Implementations are cheap handles (cloning shares the connection) so a
/// clone can finish cleanup after the caller has gone away.
pub trait ContainerRuntime: Clone + Send + Sync + 'static {
    /// Pull `image` if needed and create a long-lived container, returning its id
    fn create_container(
        &self,
        image: &str,
    ) -> impl Future<Output = Result<String, ContainerError>> + Send;

    /// Start a container returned by `create_container`
    fn start_container(&self, id: &str) -> impl Future<Output = Result<(), ContainerError>> + Send;

    /// Run a shell command inside a running container
    fn exec(
        &self,
        id: &str,
        command: &str,
    ) -> impl Future<Output = Result<ExecOutput, ContainerError>> + Send;

    /// Force-remove a container
    fn remove_container(&self, id: &str) -> impl Future<Output = Result<(), ContainerError>> + Send;
}

/// Removes its container when dropped unless it was released first
struct ContainerGuard<R: ContainerRuntime> {
    runtime: R,
    id: Option<String>,
}

impl<R: ContainerRuntime> ContainerGuard<R> {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Remove the container now; if this is cancelled, `Drop` tries again
    async fn release(mut self) {
        if let Some(id) = self.id.clone() {
            remove_logged(&self.runtime, &id).await;
            self.id = None;
        }
    }
}

impl<R: ContainerRuntime> Drop for ContainerGuard<R> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = self.runtime.clone();
                handle.spawn(async move {
                    remove_logged(&runtime, &id).await;
                });
            }
            Err(_) => warn!(container = %id, "No async runtime left, container was not removed"),
        }
    }
}

async fn remove_logged<R: ContainerRuntime>(runtime: &R, id: &str) {
    match runtime.remove_container(id).await {
        Ok(()) => debug!(container = %id, "Removed transient container"),
        Err(e) => warn!(container = %id, error = %e, "Failed to remove transient container"),
    }
}

pub struct ContainerRunner<R: ContainerRuntime> {
    runtime: R,
}

impl<R: ContainerRuntime> ContainerRunner<R> {
    pub fn new(runtime: R) -> Self {
        ContainerRunner { runtime }
    }

    /// Run `command` in a fresh container from `image` and return its stdout
    ///
    /// The timeout covers image pull, container start and the command.
    pub async fn run_query(
        &self,
        image: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ContainerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let timed_out = || ContainerError::Timeout {
            timeout_secs: timeout.as_secs(),
        };

        let id = match tokio::time::timeout_at(deadline, self.runtime.create_container(image)).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(creation_error(image, e)),
            Err(_) => return Err(timed_out()),
        };

        // The guard owns the id before start is awaited
        let guard = ContainerGuard {
            runtime: self.runtime.clone(),
            id: Some(id),
        };

        let outcome = tokio::time::timeout_at(deadline, async {
            self.runtime
                .start_container(guard.id())
                .await
                .map_err(|e| creation_error(image, e))?;
            debug!(container = %guard.id(), image, command, "Running query");
            self.runtime
                .exec(guard.id(), command)
                .await
                .map_err(execution_error)
        })
        .await;

        guard.release().await;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(timed_out()),
        };

        if output.exit_code != Some(0) {
            let message = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(ContainerError::Execution {
                exit_code: output.exit_code,
                message,
            });
        }

        if !output.stderr.trim().is_empty() {
            debug!(image, stderr = %output.stderr.trim(), "Query wrote to stderr");
        }

        Ok(output.stdout)
    }
}

fn creation_error(image: &str, error: ContainerError) -> ContainerError {
    match error {
        ContainerError::Creation { .. } | ContainerError::Timeout { .. } => error,
        other => ContainerError::Creation {
            image: image.to_string(),
            message: other.to_string(),
        },
    }
}

fn execution_error(error: ContainerError) -> ContainerError {
    match error {
        ContainerError::Execution { .. } | ContainerError::Timeout { .. } => error,
        other => ContainerError::Execution {
            exit_code: None,
            message: other.to_string(),
        },
    }
}
