mod dnf;

pub use dnf::DnfDriver;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use common::{DriverParseError, UnsupportedImageError};
use tracing::debug;

use crate::types::PackageManager;

/// Package-manager specific knowledge needed to check pinned versions
///
/// Any type implementing this trait can sit behind `Box<dyn
/// PackageManagerDriver>` in the registry; adding a package manager means
/// adding an implementation and a `PackageManager` variant.
pub trait PackageManagerDriver: Send + Sync {
    /// Which package manager this driver speaks for
    fn package_manager(&self) -> PackageManager;

    /// Split an install argument into `(name, version)` if it is a pin
    fn parse_pin(&self, token: &str) -> Option<(String, String)>;

    /// Shell command printing the latest available version of each package
    fn build_query_command(&self, packages: &BTreeSet<String>) -> String;

    /// Parse the query command output into package -> latest version
    fn parse_query_output(&self, raw: &str) -> Result<HashMap<String, String>, DriverParseError>;

    /// Version ordering; plain string order unless the manager knows better
    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &'static str {
        self.package_manager().name()
    }
}

/// Factory function to get the driver for a package manager
pub fn get_driver(pm: &PackageManager) -> Box<dyn PackageManagerDriver> {
    match pm {
        PackageManager::Dnf => Box::new(DnfDriver),
    }
}

/// Lookup table from base images and install binaries to drivers
///
/// Built once at startup and shared read-only for the whole run.
pub struct DriverRegistry {
    drivers: Vec<Box<dyn PackageManagerDriver>>,
}

impl DriverRegistry {
    /// Registry with every supported package manager
    pub fn new() -> Self {
        Self::with_drivers(PackageManager::all().iter().map(get_driver).collect())
    }

    pub fn with_drivers(drivers: Vec<Box<dyn PackageManagerDriver>>) -> Self {
        DriverRegistry { drivers }
    }

    /// Pick the driver whose OS family appears in the image reference
    pub fn resolve_driver(
        &self,
        base_image: &str,
    ) -> Result<&dyn PackageManagerDriver, UnsupportedImageError> {
        let image = base_image.to_lowercase();
        // Only the repository part names the distro; registries and tags can
        // contain anything ("registry.example.com:5000/team/fedora:39")
        let repository = repository_name(&image);

        let driver = self.drivers.iter().find(|driver| {
            driver
                .package_manager()
                .os_family_tokens()
                .iter()
                .any(|token| repository.contains(token))
        });

        match driver {
            Some(driver) => {
                debug!(
                    image = base_image,
                    manager = driver.package_manager().display_name(),
                    "Resolved package manager"
                );
                Ok(&**driver)
            }
            None => Err(UnsupportedImageError {
                image: base_image.to_string(),
            }),
        }
    }

    /// Driver whose install command is `binary` (path prefix ignored)
    pub fn driver_for_binary(&self, binary: &str) -> Option<&dyn PackageManagerDriver> {
        let binary = binary.rsplit('/').next().unwrap_or(binary);
        self.drivers
            .iter()
            .find(|driver| {
                driver
                    .package_manager()
                    .install_binaries()
                    .iter()
                    .any(|known| *known == binary)
            })
            .map(|driver| &**driver)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `registry:port/path/name:tag@digest` -> `path/name`
fn repository_name(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);

    let (registry_len, remainder) = match without_digest.split_once('/') {
        Some((first, rest)) if first.contains(['.', ':']) || first == "localhost" => {
            (first.len() + 1, rest)
        }
        _ => (0, without_digest),
    };

    let name_len = match remainder.rfind(':') {
        Some(pos) if !remainder[pos..].contains('/') => pos,
        _ => remainder.len(),
    };

    &without_digest[registry_len..registry_len + name_len]
}
