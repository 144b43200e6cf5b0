//! Human readable rendering of a run report

use comfy_table::{presets::UTF8_FULL, Table};
use shipyard_schema::{DistReport, StepStatus};

/// Wrapper that Displays a report as a few tables
pub struct ReportSummary<'a>(pub &'a DistReport);

impl std::fmt::Display for ReportSummary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let report = self.0;
        let kind = if report.nightly {
            " (nightly)"
        } else if report.prerelease {
            " (pre-release)"
        } else {
            ""
        };
        writeln!(
            f,
            "{} {}-{}{kind} from {}@{}",
            report.app_name, report.version, report.iteration, report.branch, report.commit
        )?;

        if report.artifacts.is_empty() {
            let cells = report
                .matrix
                .iter()
                .map(|c| format!("{}/{}", c.platform, c.arch))
                .collect::<Vec<_>>();
            writeln!(f, "matrix: {}", cells.join(", "))?;
            for bin in &report.binaries {
                writeln!(f, "  {}", bin.path)?;
            }
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Artifact", "Target", "Checksum", "Signed", "Uploaded"]);
        for artifact in &report.artifacts {
            let signed = report
                .signatures
                .iter()
                .find(|s| s.artifact == artifact.name)
                .map(|s| status_str(s.status))
                .unwrap_or("-");
            let uploaded = report
                .uploads
                .iter()
                .find(|u| u.file == artifact.name)
                .map(|u| status_str(u.status))
                .unwrap_or("-");
            let checksum = artifact
                .checksum
                .as_ref()
                .map(|c| format!("{}:{}", c.style, c.value))
                .unwrap_or_default();
            let target = format!("{}/{}", artifact.platform, artifact.arch);
            table.add_row(vec![
                artifact.path.as_str(),
                target.as_str(),
                checksum.as_str(),
                signed,
                uploaded,
            ]);
        }
        write!(f, "{table}")
    }
}

fn status_str(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Done => "yes",
        StepStatus::Skipped => "skipped",
        StepStatus::TimedOut => "timed out",
        StepStatus::Failed => "failed",
    }
}
