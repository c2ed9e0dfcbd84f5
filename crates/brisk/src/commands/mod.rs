//! CLI command implementations.

pub mod build;
pub mod dev;

use brisk_pipeline::BuildReport;

/// Log the outcome of a build run.
fn log_report(report: &BuildReport) {
    for output in &report.outputs {
        tracing::debug!("{}: {} file(s)", output.step, output.files.len());
    }

    if report.is_success() {
        tracing::info!(
            "Built {} file(s) in {}ms",
            report.files_written(),
            report.duration_ms
        );
    } else {
        tracing::warn!(
            "Build finished in {}ms with {} failed step(s)",
            report.duration_ms,
            report.failures.len()
        );
    }
}
