/// End-to-end tests for the scan pipeline against an in-memory runtime

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::drivers::DriverRegistry;
    use crate::report::StageReport;
    use crate::runner::fake::{Behavior, FakeRuntime};
    use crate::runner::ExecOutput;
    use crate::types::UpdateStatus;
    use common::{AppError, ContainerError, ParseError};
    use tokio_test::assert_ok;

    fn checker(runtime: &FakeRuntime) -> UpdateChecker<FakeRuntime> {
        UpdateChecker::new(runtime.clone(), DriverRegistry::new(), CheckOptions::default())
    }

    fn failed_exec(stderr: &str) -> ExecOutput {
        ExecOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
        }
    }

    fn statuses(report: &StageReport) -> Vec<(String, UpdateStatus)> {
        report
            .results
            .iter()
            .map(|r| (r.package.clone(), r.status))
            .collect()
    }

    #[tokio::test]
    async fn test_stage_without_pins_starts_no_container() {
        let runtime = FakeRuntime::new();
        let text = "FROM fedora:35\nRUN dnf install -y curl make\nCOPY . /src";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        assert_eq!(reports.len(), 1);
        assert!(reports[0].skipped);
        assert!(reports[0].results.is_empty());
        assert!(runtime.created().is_empty());
        assert!(runtime.executed().is_empty());
    }

    #[tokio::test]
    async fn test_single_stage_classification() {
        let runtime = FakeRuntime::new().stdout("fedora:35", "python3=3.9.18\nnginx=1.20.1\n");
        let text = "FROM fedora:35\nRUN dnf install -y python3=3.9.5 nginx=1.20.1";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        let results = &reports[0].results;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].package, "python3");
        assert_eq!(results[0].line, 2);
        assert_eq!(results[0].latest_version.as_deref(), Some("3.9.18"));
        assert_eq!(results[0].status, UpdateStatus::UpdateAvailable);
        assert_eq!(results[1].package, "nginx");
        assert_eq!(results[1].line, 2);
        assert_eq!(results[1].status, UpdateStatus::UpToDate);

        // One query per stage, covering every pinned name
        let executed = runtime.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].1.ends_with("nginx python3"));
    }

    #[tokio::test]
    async fn test_child_stage_queries_parent_image() {
        let runtime = FakeRuntime::new().stdout("fedora:35", "curl=7.79.1\nmake=4.3\n");
        let text = "FROM fedora:35 AS builder\nRUN dnf install -y curl=7.76.1\nFROM builder\nRUN dnf install -y make=4.3";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].image, "fedora:35");
        assert_eq!(reports[1].heading(), "Stage 1 fedora:35");
        assert_eq!(
            statuses(&reports[0]),
            vec![("curl".to_string(), UpdateStatus::UpdateAvailable)]
        );
        assert_eq!(
            statuses(&reports[1]),
            vec![("make".to_string(), UpdateStatus::UpToDate)]
        );
        assert_eq!(reports[1].results[0].line, 4);

        let created = runtime.created();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|id| id.starts_with("fedora:35#")));
    }

    #[tokio::test]
    async fn test_failed_query_only_affects_its_stage() {
        let runtime = FakeRuntime::new()
            .stdout("fedora:35", "curl=7.76.1\n")
            .on(
                "centos:stream9",
                Behavior::FailExec("Error: Failed to download metadata for repo".to_string()),
            );
        let text = "\
FROM fedora:35 AS a
RUN dnf install -y curl=7.76.1
FROM centos:stream9 AS b
RUN dnf install -y make=4.3 jq=1.6
";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        assert_eq!(
            statuses(&reports[0]),
            vec![("curl".to_string(), UpdateStatus::UpToDate)]
        );
        assert!(reports[0].error.is_none());

        assert!(reports[1]
            .results
            .iter()
            .all(|r| r.status == UpdateStatus::Error && r.latest_version.is_none()));
        assert_eq!(reports[1].results.len(), 2);
        let error = reports[1].error.as_deref().unwrap();
        assert!(error.contains("Failed to download metadata"));
        assert_eq!(reports[1].results[0].detail.as_deref(), Some(error));
    }

    #[tokio::test]
    async fn test_unrecognized_output_is_unknown() {
        let runtime = FakeRuntime::new().stdout("fedora:35", "Last metadata expiration check: 0:01:02 ago\n");
        let text = "FROM fedora:35\nRUN dnf install -y curl=7.76.1 make=4.3";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        assert!(reports[0]
            .results
            .iter()
            .all(|r| r.status == UpdateStatus::Unknown));
        assert!(reports[0].error.as_deref().unwrap().contains("unrecognized dnf output"));
    }

    #[tokio::test]
    async fn test_package_missing_from_output_is_unknown() {
        let runtime = FakeRuntime::new().stdout("fedora:35", "curl=7.79.1\n");
        let text = "FROM fedora:35\nRUN dnf install -y curl=7.76.1 not-a-package=1.0";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        assert_eq!(
            statuses(&reports[0]),
            vec![
                ("curl".to_string(), UpdateStatus::UpdateAvailable),
                ("not-a-package".to_string(), UpdateStatus::Unknown),
            ]
        );
        assert!(reports[0].error.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_image_is_error_without_container() {
        let runtime = FakeRuntime::new();
        let text = "FROM debian:bookworm\nRUN dnf install -y curl=7.76.1";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        assert_eq!(reports[0].results[0].status, UpdateStatus::Error);
        assert!(reports[0].error.as_deref().unwrap().contains("unsupported base image"));
        assert!(runtime.created().is_empty());
    }

    #[tokio::test]
    async fn test_every_created_container_is_removed_once() {
        let runtime = FakeRuntime::new()
            .stdout("fedora:35", "curl=7.79.1\n")
            .on("centos:stream9", Behavior::FailExec("boom".to_string()))
            .on("rockylinux:9", Behavior::FailCreate("pull access denied".to_string()))
            .on(
                "almalinux:9",
                Behavior::Output(failed_exec("No match for argument")),
            );
        let text = "\
FROM fedora:35
RUN dnf install -y curl=7.76.1
FROM centos:stream9
RUN dnf install -y curl=7.76.1
FROM rockylinux:9
RUN dnf install -y curl=7.76.1
FROM almalinux:9
RUN dnf install -y curl=7.76.1
FROM fedora:35
RUN echo nothing pinned
";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);
        assert_eq!(reports.len(), 5);

        let mut created = runtime.created();
        let mut removed = runtime.removed();
        created.sort();
        removed.sort();
        assert_eq!(created.len(), 3);
        assert_eq!(created, removed);
    }

    #[tokio::test]
    async fn test_parallel_jobs_keep_stage_order() {
        let runtime = FakeRuntime::new()
            .stdout("fedora:35", "curl=7.79.1\n")
            .stdout("centos:stream9", "make=4.3\n")
            .stdout("ubi9/ubi", "jq=1.6\n");
        let options = CheckOptions {
            jobs: 3,
            ..CheckOptions::default()
        };
        let checker = UpdateChecker::new(runtime.clone(), DriverRegistry::new(), options);
        let text = "\
FROM fedora:35
RUN dnf install -y curl=7.79.1
FROM centos:stream9
RUN dnf install -y make=4.3
FROM ubi9/ubi
RUN microdnf install -y jq=1.5
";

        let reports = assert_ok!(checker.check_text(text).await);

        let order: Vec<usize> = reports.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(reports[2].results[0].status, UpdateStatus::UpdateAvailable);
        assert_eq!(runtime.removed().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_stage_is_error() {
        let runtime = FakeRuntime::new().on("fedora:35", Behavior::Hang);
        let options = CheckOptions {
            timeout: Duration::from_secs(10),
            ..CheckOptions::default()
        };
        let checker = UpdateChecker::new(runtime.clone(), DriverRegistry::new(), options);

        let reports = assert_ok!(
            checker
                .check_text("FROM fedora:35\nRUN dnf install -y curl=7.76.1")
                .await
        );

        assert_eq!(reports[0].results[0].status, UpdateStatus::Error);
        assert_eq!(
            reports[0].error.as_deref(),
            Some("container query timed out after 10s")
        );
        assert_eq!(runtime.removed().len(), 1);
    }

    #[tokio::test]
    async fn test_byte_order_mark_is_ignored() {
        let runtime = FakeRuntime::new().stdout("fedora:35", "curl=7.79.1\n");
        let text = "\u{feff}FROM fedora:35\nRUN dnf install -y curl=7.76.1\n";

        let reports = assert_ok!(checker(&runtime).check_text(text).await);

        assert_eq!(
            statuses(&reports[0]),
            vec![("curl".to_string(), UpdateStatus::UpdateAvailable)]
        );
        assert_eq!(reports[0].results[0].line, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_start_times_out_and_is_removed() {
        let runtime = FakeRuntime::new().on("fedora:35", Behavior::SlowStart);
        let options = CheckOptions {
            timeout: Duration::from_secs(5),
            ..CheckOptions::default()
        };
        let checker = UpdateChecker::new(runtime.clone(), DriverRegistry::new(), options);

        let reports = assert_ok!(
            checker
                .check_text("FROM fedora:35\nRUN dnf install -y curl=7.76.1")
                .await
        );

        assert_eq!(reports[0].results[0].status, UpdateStatus::Error);
        assert_eq!(runtime.created(), runtime.removed());
        assert_eq!(runtime.removed().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_aborts() {
        let runtime = FakeRuntime::new();

        let err = checker(&runtime).check_text("RUN dnf install -y curl=7.76.1").await.unwrap_err();

        assert_eq!(err, ParseError::NoStages);
        assert!(runtime.created().is_empty());
    }

    #[tokio::test]
    async fn test_check_file() {
        let runtime = FakeRuntime::new().stdout("fedora:35", "curl=7.79.1\n");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Containerfile");
        std::fs::write(&path, "FROM fedora:35\nRUN dnf install -y curl=7.76.1\n").unwrap();

        let report = assert_ok!(checker(&runtime).check_file(&path).await);

        assert_eq!(report.path, path.display().to_string());
        assert_eq!(report.count(UpdateStatus::UpdateAvailable), 1);
    }

    #[tokio::test]
    async fn test_check_missing_file() {
        let runtime = FakeRuntime::new();
        let dir = tempfile::tempdir().unwrap();

        let err = checker(&runtime)
            .check_file(&dir.path().join("Containerfile"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ReadContainerfile { .. }));
    }

    #[tokio::test]
    async fn test_run_without_runtime_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Containerfile");
        std::fs::write(&path, "FROM fedora:35\n").unwrap();
        let socket = format!("unix://{}", dir.path().join("missing.sock").display());

        let err = UpdateChecker::<DockerRuntime>::run(&[path], &socket, CheckOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Container(ContainerError::RuntimeUnreachable { .. })
        ));
    }

    #[test]
    fn test_default_containerfile() {
        let args = Args::parse_from(["pinup"]);
        assert_eq!(args.containerfiles(), vec![PathBuf::from("Containerfile")]);

        let args = Args::parse_from(["pinup", "a/Containerfile", "-f", "b/Dockerfile"]);
        assert_eq!(
            args.containerfiles(),
            vec![PathBuf::from("a/Containerfile"), PathBuf::from("b/Dockerfile")]
        );
    }

    #[test]
    fn test_verbosity_flag() {
        let args = Args::parse_from(["pinup", "--verbosity", "DEBUG"]);
        assert_eq!(args.verbosity, Verbosity::Debug);
        assert_eq!(args.verbosity.directive(), "debug");
        assert_eq!(Verbosity::Warning.directive(), "warn");
    }
}
