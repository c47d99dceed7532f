use serde::Serialize;

/// Where a stage gets its filesystem from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseImage {
    /// An image reference pulled from a registry, e.g. `fedora:35`
    External(String),
    /// An earlier stage of the same Containerfile, by index
    Stage(usize),
}

/// A raw physical line of the Containerfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub number: usize,
    pub text: String,
}

/// One RUN instruction, possibly spread over several physical lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    /// Line the instruction starts on
    pub line: usize,
    /// Shell text per physical line, or exec-form elements, each with the
    /// line it sits on
    pub segments: Vec<(usize, String)>,
}

impl RunCommand {
    /// The arguments joined into one logical line
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|(_, text)| text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One `FROM ... [AS name]` section of a Containerfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub index: usize,
    pub name: Option<String>,
    pub base: BaseImage,
    /// Line of the FROM instruction
    pub line: usize,
    /// Every physical line after FROM up to the next stage
    pub lines: Vec<SourceLine>,
    pub runs: Vec<RunCommand>,
}

impl Stage {
    /// Name for reports: `builder` or `#1`
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{}", self.index),
        }
    }
}

/// A package installed with an exact version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedPackage {
    pub stage_index: usize,
    pub package: String,
    pub version: String,
    /// Physical line the pin appears on
    pub line: usize,
}

/// Outcome of checking one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    UpToDate,
    UpdateAvailable,
    Unknown,
    Error,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::UpToDate => "up-to-date",
            UpdateStatus::UpdateAvailable => "update-available",
            UpdateStatus::Unknown => "unknown",
            UpdateStatus::Error => "error",
        }
    }

    pub fn all() -> [UpdateStatus; 4] {
        [
            UpdateStatus::UpToDate,
            UpdateStatus::UpdateAvailable,
            UpdateStatus::Unknown,
            UpdateStatus::Error,
        ]
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub stage_index: usize,
    pub stage_name: Option<String>,
    pub package: String,
    pub pinned_version: String,
    pub latest_version: Option<String>,
    pub status: UpdateStatus,
    pub line: usize,
    /// Why the status is `error` or `unknown`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Package manager types we support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Dnf,
}

impl PackageManager {
    /// Short tag used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Dnf => "dnf",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            PackageManager::Dnf => "DNF (Fedora/RHEL)",
        }
    }

    /// Image name fragments that identify an OS family using this manager
    pub fn os_family_tokens(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Dnf => &["fedora", "centos", "rhel", "rockylinux", "almalinux", "ubi"],
        }
    }

    /// Binaries whose `install` sub-command this manager understands
    pub fn install_binaries(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Dnf => &["dnf", "dnf5", "microdnf", "yum"],
        }
    }

    /// All supported package managers (for detection)
    pub fn all() -> Vec<PackageManager> {
        vec![PackageManager::Dnf]
    }
}
