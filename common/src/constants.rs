//! Common constants used across the pinup workspace

// Timeouts
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300; // 5 minutes, includes image pull
pub const DOCKER_CONNECT_TIMEOUT_SECS: u64 = 120;

// Retry configuration
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const RETRY_MIN_DELAY_MS: u64 = 100;
pub const RETRY_MAX_DELAY_MS: u64 = 30000; // 30 seconds

// Scan defaults
pub const DEFAULT_CONTAINERFILE: &str = "Containerfile";
pub const DEFAULT_JOBS: usize = 1;

// Transient containers
pub const TRANSIENT_LABEL: &str = "pinup.transient";
pub const KEEPALIVE_COMMAND: [&str; 2] = ["sleep", "infinity"];

// Well-known runtime sockets (rootless paths are relative to the user runtime dir)
pub const DOCKER_ROOTLESS_SOCKET: &str = "docker.sock";
pub const DOCKER_ROOTFUL_SOCKET: &str = "/var/run/docker.sock";
pub const PODMAN_ROOTLESS_SOCKET: &str = "podman/podman.sock";
pub const PODMAN_ROOTFUL_SOCKET: &str = "/var/run/podman/podman.sock";

// Environment variable names
pub mod env {
    // Runtime endpoint
    pub const PINUP_SOCKET: &str = "PINUP_SOCKET";
    pub const DOCKER_HOST: &str = "DOCKER_HOST";
    pub const CONTAINER_HOST: &str = "CONTAINER_HOST";
    pub const XDG_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";

    // Scan behaviour
    pub const PINUP_TIMEOUT_SECS: &str = "PINUP_TIMEOUT_SECS";
    pub const PINUP_JOBS: &str = "PINUP_JOBS";
    pub const PINUP_VERBOSITY: &str = "PINUP_VERBOSITY";
}
