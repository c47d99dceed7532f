//! Structured error types for the pinup workspace
//!
//! Each enum maps to one failure class of a scan. Only `ParseError`,
//! `DiscoveryError` and `ContainerError::RuntimeUnreachable` abort a run;
//! everything else is recorded per stage or per package.

use thiserror::Error;

/// Errors raised while splitting a Containerfile into stages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no FROM instruction found")]
    NoStages,

    #[error("invalid Containerfile: {message}")]
    Syntax { message: String },

    #[error("line {line}: stage '{name}' is referenced before it is declared")]
    UnresolvedStage { name: String, line: usize },
}

/// No package manager driver matches a base image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported base image '{image}': cannot determine package manager")]
pub struct UnsupportedImageError {
    pub image: String,
}

/// Package manager output could not be understood
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized {driver} output: {message}")]
pub struct DriverParseError {
    pub driver: String,
    pub message: String,
}

/// Errors related to transient container queries
#[derive(Error, Debug)]
pub enum ContainerError {
    #[cfg(feature = "docker")]
    #[error("container API error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("failed to create container from '{image}': {message}")]
    Creation { image: String, message: String },

    #[error("command failed in container (exit code {exit_code:?}): {message}")]
    Execution {
        exit_code: Option<i64>,
        message: String,
    },

    #[error("container query timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("container runtime unreachable at {address}: {message}")]
    RuntimeUnreachable { address: String, message: String },
}

/// Errors raised while locating the container runtime socket
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no container runtime socket found (tried: {})", tried.join(", "))]
    NotFound { tried: Vec<String> },

    #[error("unsupported socket address '{0}'")]
    InvalidAddress(String),
}

/// General application errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to read {path}: {source}")]
    ReadContainerfile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_lists_candidates() {
        let err = DiscoveryError::NotFound {
            tried: vec!["$DOCKER_HOST".to_string(), "/var/run/docker.sock".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "no container runtime socket found (tried: $DOCKER_HOST, /var/run/docker.sock)"
        );
    }

    #[test]
    fn test_parse_error_converts_to_app_error() {
        let err: AppError = ParseError::NoStages.into();
        assert!(matches!(err, AppError::Parse(ParseError::NoStages)));
        assert_eq!(err.to_string(), "no FROM instruction found");
    }
}
