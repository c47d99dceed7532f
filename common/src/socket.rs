//! Container runtime socket discovery
//!
//! Candidates are tried in order and the first one that yields an address wins:
//! explicit env vars, then Docker sockets (rootless before rootful) when a
//! `docker` binary is installed, then the same for Podman.

use std::env;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::constants::{
    env as env_keys, DOCKER_ROOTFUL_SOCKET, DOCKER_ROOTLESS_SOCKET, PODMAN_ROOTFUL_SOCKET,
    PODMAN_ROOTLESS_SOCKET,
};
use crate::error::DiscoveryError;

/// One place a runtime endpoint might be found
#[derive(Debug, Clone, PartialEq)]
pub enum SocketCandidate {
    /// An environment variable holding a full address
    Env(&'static str),
    /// A unix socket file belonging to `runtime`
    Socket { runtime: &'static str, path: PathBuf },
}

impl SocketCandidate {
    fn describe(&self) -> String {
        match self {
            SocketCandidate::Env(key) => format!("${}", key),
            SocketCandidate::Socket { path, .. } => path.display().to_string(),
        }
    }

    fn resolve(&self) -> Option<String> {
        match self {
            SocketCandidate::Env(key) => env::var(key).ok().filter(|v| !v.trim().is_empty()),
            SocketCandidate::Socket { runtime, path } => {
                if path.exists() {
                    debug!(runtime, path = %path.display(), "Found runtime socket");
                    Some(unix_address(path))
                } else {
                    None
                }
            }
        }
    }
}

/// Build the default candidate list for this host
pub fn default_candidates() -> Vec<SocketCandidate> {
    let mut candidates = vec![
        SocketCandidate::Env(env_keys::DOCKER_HOST),
        SocketCandidate::Env(env_keys::CONTAINER_HOST),
    ];

    let runtime_dir = user_runtime_dir();

    if let Ok(path) = which::which("docker") {
        debug!(path = %path.display(), "Found docker binary");
        if let Some(dir) = &runtime_dir {
            candidates.push(SocketCandidate::Socket {
                runtime: "docker",
                path: dir.join(DOCKER_ROOTLESS_SOCKET),
            });
        }
        candidates.push(SocketCandidate::Socket {
            runtime: "docker",
            path: PathBuf::from(DOCKER_ROOTFUL_SOCKET),
        });
    }

    if let Ok(path) = which::which("podman") {
        debug!(path = %path.display(), "Found podman binary");
        if let Some(dir) = &runtime_dir {
            candidates.push(SocketCandidate::Socket {
                runtime: "podman",
                path: dir.join(PODMAN_ROOTLESS_SOCKET),
            });
        }
        candidates.push(SocketCandidate::Socket {
            runtime: "podman",
            path: PathBuf::from(PODMAN_ROOTFUL_SOCKET),
        });
    }

    candidates
}

/// Return the address of the first candidate that resolves
pub fn discover_socket_with(candidates: &[SocketCandidate]) -> Result<String, DiscoveryError> {
    for candidate in candidates {
        if let Some(address) = candidate.resolve() {
            info!(address = %address, source = %candidate.describe(), "Using container runtime socket");
            return Ok(address);
        }
    }

    Err(DiscoveryError::NotFound {
        tried: candidates.iter().map(SocketCandidate::describe).collect(),
    })
}

/// Locate a usable container runtime endpoint on this host
pub fn discover_socket() -> Result<String, DiscoveryError> {
    discover_socket_with(&default_candidates())
}

/// Normalize a user supplied address; bare paths become `unix://` addresses
pub fn normalize_address(input: &str) -> Result<String, DiscoveryError> {
    let input = input.trim();
    if input.starts_with('/') {
        return Ok(unix_address(Path::new(input)));
    }

    let supported = ["unix://", "tcp://", "http://"];
    if supported.iter().any(|scheme| input.starts_with(scheme)) {
        Ok(input.to_string())
    } else {
        Err(DiscoveryError::InvalidAddress(input.to_string()))
    }
}

fn unix_address(path: &Path) -> String {
    format!("unix://{}", path.display())
}

/// `$XDG_RUNTIME_DIR`, falling back to `/run/user/<uid>`
fn user_runtime_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var(env_keys::XDG_RUNTIME_DIR) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }

    std::fs::metadata("/proc/self")
        .ok()
        .map(|meta| PathBuf::from(format!("/run/user/{}", meta.uid())))
}
