//! Scan results grouped by file and stage, and their text/JSON rendering

use clap::ValueEnum;
use serde::Serialize;

use crate::types::{UpdateResult, UpdateStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Everything learned about one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub index: usize,
    pub name: Option<String>,
    /// Image the stage was queried with (parent chains resolved)
    pub image: String,
    pub line: usize,
    /// No pins, so no container was started
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub results: Vec<UpdateResult>,
}

impl StageReport {
    /// `Stage 0 (builder) fedora:35`
    pub fn heading(&self) -> String {
        match &self.name {
            Some(name) => format!("Stage {} ({}) {}", self.index, name, self.image),
            None => format!("Stage {} {}", self.index, self.image),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: String,
    pub stages: Vec<StageReport>,
}

impl FileReport {
    pub fn results(&self) -> impl Iterator<Item = &UpdateResult> {
        self.stages.iter().flat_map(|stage| stage.results.iter())
    }

    pub fn count(&self, status: UpdateStatus) -> usize {
        self.results().filter(|r| r.status == status).count()
    }
}

pub fn render(reports: &[FileReport], format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(reports)),
        OutputFormat::Json => serde_json::to_string_pretty(reports),
    }
}

pub fn render_text(reports: &[FileReport]) -> String {
    let mut lines = Vec::new();

    for report in reports {
        lines.push(format!("📄 {}", report.path));

        for stage in &report.stages {
            lines.push(format!("  {} (line {})", stage.heading(), stage.line));

            if stage.skipped {
                lines.push("    no pinned packages".to_string());
                continue;
            }
            if let Some(error) = &stage.error {
                lines.push(format!("    ⚠️  {}", error));
            }
            lines.extend(result_table(&stage.results));
        }

        lines.push(summary(report));
        lines.push(String::new());
    }

    lines.join("\n")
}

fn result_table(results: &[UpdateResult]) -> Vec<String> {
    let header = ["PACKAGE", "PINNED", "LATEST", "STATUS", "LINE"];
    let rows: Vec<[String; 5]> = results
        .iter()
        .map(|r| {
            let latest = match (&r.latest_version, r.status) {
                (Some(latest), _) => latest.clone(),
                (None, UpdateStatus::Error) => "error".to_string(),
                (None, _) => "unknown".to_string(),
            };
            [
                r.package.clone(),
                r.pinned_version.clone(),
                latest,
                r.status.to_string(),
                r.line.to_string(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: [&str; 5]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        format!("    {}", padded.join("  ").trim_end())
    };

    let mut lines = vec![format_row(header)];
    for row in &rows {
        lines.push(format_row([&row[0], &row[1], &row[2], &row[3], &row[4]]));
    }
    lines
}

fn summary(report: &FileReport) -> String {
    let available = report.count(UpdateStatus::UpdateAvailable);
    let unknown = report.count(UpdateStatus::Unknown);
    let errors = report.count(UpdateStatus::Error);
    let total = report.results().count();

    if total == 0 {
        return "  ✅ No pinned packages found".to_string();
    }

    let mut summary = if available > 0 {
        format!("  📦 {} of {} pinned packages have updates", available, total)
    } else {
        format!("  ✅ {} pinned packages checked, none outdated", total)
    };
    if unknown > 0 {
        summary.push_str(&format!(", {} unknown", unknown));
    }
    if errors > 0 {
        summary.push_str(&format!(", {} errors", errors));
    }
    summary
}
