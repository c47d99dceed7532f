use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

pub mod constants;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod socket;

pub use error::{
    AppError, ContainerError, DiscoveryError, DriverParseError, ParseError, Result,
    UnsupportedImageError,
};
pub use socket::{discover_socket, normalize_address};

pub fn dotenv_init() {
    let _ = dotenv();
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (a tracing directive such as
/// "warn") applies. Logs go to stderr so stdout only carries the report.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
