//! One-shot build command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use brisk_pipeline::{BuildGraph, ConsoleReporter, Scope};

use crate::config::ConfigFile;

/// Run every step once. Fails if any step failed.
pub async fn run(config: &ConfigFile, dest: Option<PathBuf>) -> Result<()> {
    let build_config = config.build_config(dest);
    tracing::info!(
        "Building {} into {}",
        build_config.source_dir.display(),
        build_config.output_dir.display()
    );

    let reporter = Arc::new(ConsoleReporter::new(config.notify.beep.unwrap_or(false)));
    let graph = BuildGraph::standard(&build_config, reporter);
    let report = graph.run(&Scope::full()).await?;

    super::log_report(&report);

    if !report.is_success() {
        let failed: Vec<_> = report.failures.iter().map(|f| f.step.name()).collect();
        bail!("Build failed: {}", failed.join(", "));
    }

    tracing::info!("Output: {}", build_config.output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use std::fs;
    use tempfile::tempdir;

    fn config_for(root: &std::path::Path) -> ConfigFile {
        ConfigFile {
            paths: PathsConfig {
                source: root.join("src"),
                dest: root.join("docs"),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn builds_into_configured_destination() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src/scss")).unwrap();
        fs::write(temp.path().join("src/scss/main.scss"), "p { margin: 0; }").unwrap();

        run(&config_for(temp.path()), None).await.unwrap();

        assert!(temp.path().join("docs/css/production.css").exists());
    }

    #[tokio::test]
    async fn failed_step_fails_the_command() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src/js")).unwrap();
        fs::write(temp.path().join("src/js/app.js"), "var a;").unwrap();

        // No scss/main.scss: the styles step fails.
        let err = run(&config_for(temp.path()), None).await.unwrap_err();

        assert!(err.to_string().contains("styles"));
        assert!(temp.path().join("docs/js/production.js").exists());
    }
}
