//! The watch loop: batches change events, rebuilds, signals browsers.

use std::path::PathBuf;
use std::time::Duration;

use brisk_pipeline::{BuildGraph, BuildReport, Scope, StepKind};
use tokio::sync::mpsc;

use crate::changes::ChangeSet;
use crate::watcher::WatchEvent;
use crate::websocket::{ReloadHub, ReloadMessage};

/// Quiet period that closes a batch of events.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Rebuilds on source changes, one run at a time.
///
/// Events that arrive while a build runs stay queued and are drained into
/// a single batch once it finishes.
pub struct WatchLoop {
    graph: BuildGraph,
    hub: ReloadHub,
    source_root: PathBuf,
    debounce: Duration,
}

impl WatchLoop {
    pub fn new(graph: BuildGraph, hub: ReloadHub) -> Self {
        let source = &graph.paths().source;
        // Watcher events carry canonical paths.
        let source_root = source.canonicalize().unwrap_or_else(|_| source.clone());

        Self {
            graph,
            hub,
            source_root,
            debounce: DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Process events until the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<WatchEvent>) {
        while let Some(first) = events.recv().await {
            let mut changes = ChangeSet::new();
            changes.insert(&first);
            let open = self.collect_batch(&mut events, &mut changes).await;

            self.rebuild(&changes).await;

            if !open {
                break;
            }
        }

        tracing::debug!("Watch loop stopped");
    }

    /// Add events to `changes` until the debounce period passes without
    /// one. Returns false once the channel has closed.
    async fn collect_batch(
        &self,
        events: &mut mpsc::Receiver<WatchEvent>,
        changes: &mut ChangeSet,
    ) -> bool {
        loop {
            match tokio::time::timeout(self.debounce, events.recv()).await {
                Ok(Some(event)) => changes.insert(&event),
                Ok(None) => return false,
                Err(_) => return true,
            }
        }
    }

    /// Run the steps affected by `changes`, then notify browsers.
    ///
    /// Returns the message sent, if a build ran.
    pub async fn rebuild(&self, changes: &ChangeSet) -> Option<ReloadMessage> {
        let scope = changes.scope(&self.source_root);
        if scope.is_empty() {
            tracing::debug!("Ignoring {} change(s) outside any step", changes.len());
            return None;
        }

        for path in changes.paths() {
            tracing::debug!("Changed: {}", path.display());
        }
        tracing::info!(
            "Rebuilding {}",
            scope.kinds().map(StepKind::name).collect::<Vec<_>>().join(", ")
        );

        match self.graph.run(&scope).await {
            Ok(report) => Some(self.after_build(&scope, &report)),
            Err(e) => {
                tracing::error!("{}", e);
                None
            }
        }
    }

    /// Post-build hook: log the outcome and send the refresh signal.
    fn after_build(&self, scope: &Scope, report: &BuildReport) -> ReloadMessage {
        if report.is_success() {
            tracing::info!(
                "Rebuilt {} file(s) in {}ms",
                report.files_written(),
                report.duration_ms
            );
        } else {
            tracing::warn!(
                "Rebuild finished with {} failed step(s)",
                report.failures.len()
            );
        }

        let msg = reload_message(scope, report);
        tracing::debug!("Sending {:?} to {} client(s)", msg, self.hub.subscriber_count());
        self.hub.send(msg.clone());
        msg
    }
}

/// `Css` when only the styles step ran and it succeeded, `Reload` otherwise.
pub fn reload_message(scope: &Scope, report: &BuildReport) -> ReloadMessage {
    let styles_only = scope.kinds().eq([StepKind::Styles]);

    if styles_only && report.is_success() {
        ReloadMessage::Css
    } else {
        ReloadMessage::Reload
    }
}
