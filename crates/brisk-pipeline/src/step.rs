//! The transform step abstraction.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use brisk_include::IncludeError;

use crate::builder::SitePaths;

/// The six transform steps of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepKind {
    Html,
    Styles,
    Scripts,
    Vendor,
    Favicon,
    Images,
}

impl StepKind {
    /// Every step, in reporting order.
    pub const ALL: [StepKind; 6] = [
        StepKind::Html,
        StepKind::Styles,
        StepKind::Scripts,
        StepKind::Vendor,
        StepKind::Favicon,
        StepKind::Images,
    ];

    /// Stable lowercase name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            StepKind::Html => "html",
            StepKind::Styles => "styles",
            StepKind::Scripts => "scripts",
            StepKind::Vendor => "vendor",
            StepKind::Favicon => "favicon",
            StepKind::Images => "images",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which inputs of a step should be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepScope {
    /// Every input of the step
    All,

    /// Only these inputs, relative to the step's source directory.
    ///
    /// Steps whose output depends on all inputs at once treat this as `All`.
    Only(Vec<PathBuf>),
}

/// The steps selected for one build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    steps: BTreeMap<StepKind, StepScope>,
}

impl Scope {
    /// Every step over every input.
    pub fn full() -> Self {
        Self::of(StepKind::ALL)
    }

    /// The given steps over every input.
    pub fn of(kinds: impl IntoIterator<Item = StepKind>) -> Self {
        Self {
            steps: kinds.into_iter().map(|k| (k, StepScope::All)).collect(),
        }
    }

    /// Add a step, widening to `All` when it is already selected.
    pub fn include(&mut self, kind: StepKind, scope: StepScope) {
        match self.steps.entry(kind) {
            Entry::Vacant(slot) => {
                slot.insert(scope);
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), scope) {
                (StepScope::Only(existing), StepScope::Only(more)) => {
                    for path in more {
                        if !existing.contains(&path) {
                            existing.push(path);
                        }
                    }
                }
                (existing, _) => *existing = StepScope::All,
            },
        }
    }

    /// Scope for `kind`, if selected.
    pub fn get(&self, kind: StepKind) -> Option<&StepScope> {
        self.steps.get(&kind)
    }

    /// Whether `kind` is selected.
    pub fn contains(&self, kind: StepKind) -> bool {
        self.steps.contains_key(&kind)
    }

    /// Selected steps.
    pub fn kinds(&self) -> impl Iterator<Item = StepKind> + '_ {
        self.steps.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// What a successful step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Step that ran
    pub step: StepKind,

    /// Destination files written
    pub files: Vec<PathBuf>,

    /// Total bytes written
    pub bytes: u64,
}

impl StepOutput {
    pub(crate) fn new(step: StepKind) -> Self {
        Self {
            step,
            files: Vec::new(),
            bytes: 0,
        }
    }

    pub(crate) fn record(&mut self, path: PathBuf, len: usize) {
        self.files.push(path);
        self.bytes += len as u64;
    }
}

/// Errors a transform step can fail with.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Include(#[from] IncludeError),

    #[error("Entry stylesheet not found: {}", .0.display())]
    MissingEntry(PathBuf),

    #[error("Sass compilation failed: {0}")]
    Sass(String),

    #[error("CSS processing failed: {0}")]
    Css(String),

    #[error("Failed to compress image {}: {message}", .path.display())]
    Image { path: PathBuf, message: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A stateless operation from a fixed set of source files to a fixed set
/// of destination files.
///
/// A step writes nothing unless all of its transformations succeed, so a
/// failure leaves the previous output in place.
pub trait TransformStep: Send + Sync {
    /// Which step this is.
    fn kind(&self) -> StepKind;

    /// Run the step over `scope`.
    fn run(&self, paths: &SitePaths, scope: &StepScope) -> Result<StepOutput, StepError>;
}
