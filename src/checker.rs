//! Scan orchestration
//!
//! Parse stages, detect pins, query each pinned stage in a transient
//! container and classify every pin. Stage failures are recorded in the
//! report; only unreadable or unparsable input aborts a scan.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use common::constants::{DEFAULT_JOBS, DEFAULT_QUERY_TIMEOUT_SECS};
use common::{
    metrics, AppError, ContainerError, DriverParseError, ParseError, Result, UnsupportedImageError,
};
use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::docker::DockerRuntime;
use crate::drivers::{DriverRegistry, PackageManagerDriver};
use crate::parser::{parse, resolve_base_image};
use crate::pins::PinDetector;
use crate::report::{FileReport, StageReport};
use crate::runner::{ContainerRunner, ContainerRuntime};
use crate::types::{PinnedPackage, Stage, UpdateResult, UpdateStatus};

/// Why a pinned stage could not be fully checked
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedImageError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Output(#[from] DriverParseError),
}

impl StageError {
    /// Status given to every pin of a stage that failed this way
    pub fn status(&self) -> UpdateStatus {
        match self {
            StageError::Output(_) => UpdateStatus::Unknown,
            _ => UpdateStatus::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Per-query limit, image pull included
    pub timeout: Duration,
    /// Stage queries in flight at once
    pub jobs: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions {
            timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            jobs: DEFAULT_JOBS,
        }
    }
}

pub struct UpdateChecker<R: ContainerRuntime> {
    runner: ContainerRunner<R>,
    registry: DriverRegistry,
    options: CheckOptions,
}

impl<R: ContainerRuntime> UpdateChecker<R> {
    pub fn new(runtime: R, registry: DriverRegistry, options: CheckOptions) -> Self {
        UpdateChecker {
            runner: ContainerRunner::new(runtime),
            registry,
            options,
        }
    }

    pub async fn check_file(&self, path: &Path) -> Result<FileReport> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AppError::ReadContainerfile {
                path: path.display().to_string(),
                source,
            })?;

        info!(path = %path.display(), "Checking Containerfile");
        let stages = self.check_text(&text).await?;

        Ok(FileReport {
            path: path.display().to_string(),
            stages,
        })
    }

    /// Check every stage of a Containerfile, in stage order
    pub async fn check_text(&self, text: &str) -> Result<Vec<StageReport>, ParseError> {
        let stages = parse(text)?;
        let detector = PinDetector::new(&self.registry);

        let work: Vec<(&Stage, Vec<PinnedPackage>)> = stages
            .iter()
            .map(|stage| (stage, detector.detect_pins(stage)))
            .collect();

        let reports: Vec<StageReport> = stream::iter(work)
            .map(|(stage, pins)| self.check_stage(&stages, stage, pins))
            .buffered(self.options.jobs.max(1))
            .collect()
            .await;

        for status in UpdateStatus::all() {
            let count = reports
                .iter()
                .flat_map(|report| &report.results)
                .filter(|result| result.status == status)
                .count();
            if count > 0 {
                metrics::record_pin_results(status.as_str(), count);
            }
        }

        Ok(reports)
    }

    async fn check_stage(&self, stages: &[Stage], stage: &Stage, pins: Vec<PinnedPackage>) -> StageReport {
        let image = resolve_base_image(stages, stage.index).to_string();
        let mut report = StageReport {
            index: stage.index,
            name: stage.name.clone(),
            image,
            line: stage.line,
            skipped: false,
            error: None,
            results: Vec::new(),
        };

        if pins.is_empty() {
            debug!(stage = %stage.label(), "No pinned packages, skipping");
            metrics::record_stage_skipped();
            report.skipped = true;
            return report;
        }

        let driver = match self.registry.resolve_driver(&report.image) {
            Ok(driver) => driver,
            Err(e) => return fail_stage(report, stage, &pins, e.into()),
        };

        let latest = self.latest_versions(driver, &report.image, &pins).await;
        match latest {
            Ok(latest) => {
                report.results = pins
                    .iter()
                    .map(|pin| classify(driver, stage, pin, latest.get(&pin.package)))
                    .collect();
                report
            }
            Err(e) => fail_stage(report, stage, &pins, e),
        }
    }

    async fn latest_versions(
        &self,
        driver: &dyn PackageManagerDriver,
        image: &str,
        pins: &[PinnedPackage],
    ) -> Result<HashMap<String, String>, StageError> {
        let names: BTreeSet<String> = pins.iter().map(|pin| pin.package.clone()).collect();
        let command = driver.build_query_command(&names);

        let started = Instant::now();
        let outcome = self.runner.run_query(image, &command, self.options.timeout).await;
        let duration = started.elapsed().as_secs_f64();
        metrics::record_container_query(driver.name(), outcome.is_ok(), duration);

        let raw = outcome?;
        debug!(image, driver = driver.name(), duration_secs = duration, "Query finished");

        Ok(driver.parse_query_output(&raw)?)
    }
}

impl UpdateChecker<DockerRuntime> {
    /// Connect to the runtime at `socket` and check each Containerfile in turn
    ///
    /// The first unreadable or unparsable file aborts the run.
    pub async fn run(
        paths: &[PathBuf],
        socket: &str,
        options: CheckOptions,
    ) -> Result<Vec<FileReport>> {
        let runtime = DockerRuntime::connect(socket).await?;
        let checker = UpdateChecker::new(runtime, DriverRegistry::new(), options);

        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            reports.push(checker.check_file(path).await?);
        }
        Ok(reports)
    }
}

fn classify(
    driver: &dyn PackageManagerDriver,
    stage: &Stage,
    pin: &PinnedPackage,
    latest: Option<&String>,
) -> UpdateResult {
    let (status, detail) = match latest {
        None => (
            UpdateStatus::Unknown,
            Some(format!("{} not found in repositories", pin.package)),
        ),
        Some(latest) if driver.compare_versions(latest, &pin.version).is_gt() => {
            (UpdateStatus::UpdateAvailable, None)
        }
        Some(_) => (UpdateStatus::UpToDate, None),
    };

    UpdateResult {
        stage_index: stage.index,
        stage_name: stage.name.clone(),
        package: pin.package.clone(),
        pinned_version: pin.version.clone(),
        latest_version: latest.cloned(),
        status,
        line: pin.line,
        detail,
    }
}

fn fail_stage(mut report: StageReport, stage: &Stage, pins: &[PinnedPackage], error: StageError) -> StageReport {
    let status = error.status();
    let message = error.to_string();
    warn!(stage = %stage.label(), image = %report.image, error = %message, "Stage check failed");

    report.results = pins
        .iter()
        .map(|pin| UpdateResult {
            stage_index: stage.index,
            stage_name: stage.name.clone(),
            package: pin.package.clone(),
            pinned_version: pin.version.clone(),
            latest_version: None,
            status,
            line: pin.line,
            detail: Some(message.clone()),
        })
        .collect();
    report.error = Some(message);
    report
}
