//! Development command: build, watch and serve.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use brisk_pipeline::{BuildGraph, ConsoleReporter, Scope};
use brisk_server::{FileWatcher, PreviewConfig, PreviewServer, ReloadHub, WatchLoop};

use crate::config::ConfigFile;

/// Command-line overrides for `dev`.
#[derive(Debug, Default)]
pub struct DevOptions {
    pub dest: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub no_open: bool,
}

/// Build once, then rebuild on changes and serve until Ctrl-C.
pub async fn run(config: &ConfigFile, options: DevOptions) -> Result<()> {
    let build_config = config.build_config(options.dest);
    if !build_config.source_dir.exists() {
        tracing::warn!(
            "Source directory {} does not exist",
            build_config.source_dir.display()
        );
    }

    let reporter = Arc::new(ConsoleReporter::new(config.notify.beep.unwrap_or(true)));
    let graph = BuildGraph::standard(&build_config, reporter);

    // Step failures are reported but never stop the dev loop.
    let report = graph.run(&Scope::full()).await?;
    super::log_report(&report);

    // The whole tree, so step directories created later are covered.
    // ChangeSet drops paths outside them.
    let source = &graph.paths().source;
    let source = source.canonicalize().unwrap_or_else(|_| source.clone());
    let (watcher, events) = FileWatcher::new(&[source]).context("Failed to start file watcher")?;

    let hub = ReloadHub::new();
    let watch = tokio::spawn(WatchLoop::new(graph, hub.clone()).run(events));

    let preview = PreviewConfig {
        root: build_config.output_dir,
        host: options.host.unwrap_or_else(|| config.server.host.clone()),
        port: options.port.unwrap_or(config.server.port),
        open: config.server.open && !options.no_open,
    };
    PreviewServer::new(preview, hub)
        .serve(shutdown_signal())
        .await
        .context("Preview server failed")?;

    // Closing the event stream ends the watch loop after any running build.
    drop(watcher);
    watch.await.context("Watch loop panicked")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
