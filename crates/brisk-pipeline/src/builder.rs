//! The build graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::assets::StylesStep;
use crate::html::HtmlStep;
use crate::images::ImagesStep;
use crate::report::ErrorReporter;
use crate::scripts::{CopyStep, ScriptsStep};
use crate::step::{Scope, StepKind, StepOutput, StepScope, TransformStep};

/// Configuration for a build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source tree root
    pub source_dir: PathBuf,

    /// Destination tree root
    pub output_dir: PathBuf,

    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,

    /// Marker prefix of include directives
    pub include_prefix: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            output_dir: PathBuf::from("docs"),
            browsers: vec!["last 2 versions".to_string()],
            include_prefix: brisk_include::DEFAULT_PREFIX.to_string(),
        }
    }
}

/// The fixed source and destination layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl SitePaths {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }

    /// `src/html`, also the include base directory.
    pub fn html_dir(&self) -> PathBuf {
        self.source.join("html")
    }

    pub fn scss_dir(&self) -> PathBuf {
        self.source.join("scss")
    }

    /// The single Sass entry point.
    pub fn scss_entry(&self) -> PathBuf {
        self.scss_dir().join("main.scss")
    }

    pub fn js_dir(&self) -> PathBuf {
        self.source.join("js")
    }

    /// Scripts copied verbatim rather than concatenated.
    pub fn vendor_dir(&self) -> PathBuf {
        self.js_dir().join("vendor")
    }

    pub fn img_dir(&self) -> PathBuf {
        self.source.join("img")
    }

    pub fn favicon_dir(&self) -> PathBuf {
        self.img_dir().join("favicon")
    }

    pub fn dest_css(&self) -> PathBuf {
        self.dest.join("css").join("production.css")
    }

    pub fn dest_js(&self) -> PathBuf {
        self.dest.join("js").join("production.js")
    }

    pub fn dest_vendor_dir(&self) -> PathBuf {
        self.dest.join("js").join("vendor")
    }

    pub fn dest_img_dir(&self) -> PathBuf {
        self.dest.join("img")
    }
}

/// A step that failed during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: StepKind,
    pub message: String,
}

/// Result of one build graph run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Steps that succeeded
    pub outputs: Vec<StepOutput>,

    /// Steps that failed
    pub failures: Vec<StepFailure>,

    /// Total build time in milliseconds
    pub duration_ms: u64,
}

impl BuildReport {
    /// Whether every step that ran succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of destination files written.
    pub fn files_written(&self) -> usize {
        self.outputs.iter().map(|o| o.files.len()).sum()
    }
}

/// Errors that abort a whole build run.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Build task panicked: {0}")]
    Panicked(String),
}

/// Runs transform steps side by side and aggregates their results.
///
/// Cloning is cheap; clones share the step list and reporter.
#[derive(Clone)]
pub struct BuildGraph {
    paths: SitePaths,
    steps: Arc<Vec<Box<dyn TransformStep>>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl BuildGraph {
    /// Create a graph over an explicit set of steps.
    pub fn new(
        paths: SitePaths,
        steps: Vec<Box<dyn TransformStep>>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            paths,
            steps: Arc::new(steps),
            reporter,
        }
    }

    /// The six standard steps for `config`.
    pub fn standard(config: &BuildConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        let steps: Vec<Box<dyn TransformStep>> = vec![
            Box::new(HtmlStep::new(&config.include_prefix)),
            Box::new(StylesStep::new(config.browsers.clone())),
            Box::new(ScriptsStep),
            Box::new(CopyStep::vendor()),
            Box::new(CopyStep::favicon()),
            Box::new(ImagesStep::new()),
        ];

        Self::new(
            SitePaths::new(&config.source_dir, &config.output_dir),
            steps,
            reporter,
        )
    }

    pub fn paths(&self) -> &SitePaths {
        &self.paths
    }

    /// Run the steps selected by `scope` without blocking the async runtime.
    pub async fn run(&self, scope: &Scope) -> Result<BuildReport, BuildError> {
        let graph = self.clone();
        let scope = scope.clone();

        tokio::task::spawn_blocking(move || graph.run_blocking(&scope))
            .await
            .map_err(|e| BuildError::Panicked(e.to_string()))
    }

    /// Run the steps selected by `scope` on the rayon pool and wait for all
    /// of them.
    pub fn run_blocking(&self, scope: &Scope) -> BuildReport {
        let start = Instant::now();

        let selected: Vec<(&dyn TransformStep, &StepScope)> = self
            .steps
            .iter()
            .filter_map(|step| scope.get(step.kind()).map(|s| (step.as_ref(), s)))
            .collect();

        tracing::debug!(
            "Running {} step(s): {}",
            selected.len(),
            selected
                .iter()
                .map(|(step, _)| step.kind().name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let results: Vec<Result<StepOutput, StepFailure>> = selected
            .par_iter()
            .map(|(step, step_scope)| {
                let kind = step.kind();
                let started = Instant::now();
                match step.run(&self.paths, step_scope) {
                    Ok(output) => {
                        tracing::debug!(
                            "Step {} wrote {} file(s) in {}ms",
                            kind,
                            output.files.len(),
                            started.elapsed().as_millis()
                        );
                        Ok(output)
                    }
                    Err(e) => {
                        self.reporter.report(&e, kind);
                        Err(StepFailure {
                            step: kind,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect();

        let mut report = BuildReport::default();
        for result in results {
            match result {
                Ok(output) => report.outputs.push(output),
                Err(failure) => report.failures.push(failure),
            }
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        report
    }
}

/// Path of `path` relative to `root`, or `path` itself when outside it.
pub(crate) fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::report::tests::RecordingReporter;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_site(root: &Path) {
        write(root, "src/html/index.html", "<body>@@include('partials/hello.html')</body>");
        write(root, "src/html/partials/hello.html", "HELLO");
        write(root, "src/scss/_vars.scss", "$main: #333;");
        write(
            root,
            "src/scss/main.scss",
            "@import 'vars';\n.box { color: $main; .inner { user-select: none; } }",
        );
        write(root, "src/js/x.js", "var x=1;");
        write(root, "src/js/y.js", "var y=2;");
        write(root, "src/js/vendor/a.js", "var a=1;");
        write(root, "src/img/favicon/favicon.ico", "ICO");
        write(root, "src/img/logo.svg", "<svg xmlns=\"http://www.w3.org/2000/svg\">\n  <!-- logo -->\n  <rect width=\"1\" height=\"1\"/>\n</svg>\n");
    }

    fn graph(root: &Path, reporter: Arc<RecordingReporter>) -> BuildGraph {
        let config = BuildConfig {
            source_dir: root.join("src"),
            output_dir: root.join("dist"),
            ..Default::default()
        };
        BuildGraph::standard(&config, reporter)
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        crate::fs::walk_files(dir)
            .into_iter()
            .map(|p| (p.clone(), fs::read(&p).unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn builds_complete_site() {
        let temp = tempdir().unwrap();
        sample_site(temp.path());
        let reporter = Arc::new(RecordingReporter::default());

        let report = graph(temp.path(), reporter.clone())
            .run(&Scope::full())
            .await
            .unwrap();

        assert!(report.is_success(), "{:?}", report.failures);
        assert!(reporter.reports().is_empty());

        let dist = temp.path().join("dist");
        let html = fs::read_to_string(dist.join("index.html")).unwrap();
        assert!(html.contains("<body>HELLO</body>"));
        assert!(!dist.join("partials").exists());

        let css = fs::read_to_string(dist.join("css/production.css")).unwrap();
        assert!(css.contains(".box{color:#333}"));
        assert!(css.contains("user-select:none"));

        assert_eq!(
            fs::read_to_string(dist.join("js/production.js")).unwrap(),
            "var x=1;\nvar y=2;"
        );
        assert_eq!(
            fs::read_to_string(dist.join("js/vendor/a.js")).unwrap(),
            "var a=1;"
        );
        assert_eq!(fs::read_to_string(dist.join("favicon.ico")).unwrap(), "ICO");
        assert!(dist.join("img/logo.svg").exists());
        assert_eq!(report.outputs.len(), 6);
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let temp = tempdir().unwrap();
        sample_site(temp.path());
        let graph = graph(temp.path(), Arc::new(RecordingReporter::default()));

        graph.run_blocking(&Scope::full());
        let first = snapshot(&temp.path().join("dist"));
        graph.run_blocking(&Scope::full());
        let second = snapshot(&temp.path().join("dist"));

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn failing_step_keeps_previous_output_and_spares_siblings() {
        let temp = tempdir().unwrap();
        sample_site(temp.path());
        let reporter = Arc::new(RecordingReporter::default());
        let graph = graph(temp.path(), reporter.clone());

        graph.run_blocking(&Scope::full());
        let css_path = temp.path().join("dist/css/production.css");
        let good_css = fs::read(&css_path).unwrap();

        write(temp.path(), "src/scss/main.scss", ".box { color: red;");
        write(temp.path(), "src/js/x.js", "var x=3;");
        let report = graph.run_blocking(&Scope::full());

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, StepKind::Styles);
        assert_eq!(fs::read(&css_path).unwrap(), good_css);
        assert!(fs::read_to_string(temp.path().join("dist/js/production.js"))
            .unwrap()
            .starts_with("var x=3;"));

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, StepKind::Styles);
    }

    #[test]
    fn runs_only_selected_steps() {
        let temp = tempdir().unwrap();
        sample_site(temp.path());
        let graph = graph(temp.path(), Arc::new(RecordingReporter::default()));

        let report = graph.run_blocking(&Scope::of([StepKind::Scripts]));

        assert_eq!(report.outputs.len(), 1);
        assert!(temp.path().join("dist/js/production.js").exists());
        assert!(!temp.path().join("dist/index.html").exists());
    }

    #[test]
    fn derives_fixed_layout() {
        let paths = SitePaths::new("src", "docs");

        assert_eq!(paths.scss_entry(), PathBuf::from("src/scss/main.scss"));
        assert_eq!(paths.favicon_dir(), PathBuf::from("src/img/favicon"));
        assert_eq!(paths.dest_css(), PathBuf::from("docs/css/production.css"));
        assert_eq!(paths.dest_vendor_dir(), PathBuf::from("docs/js/vendor"));
    }
}
