//! Transform steps and build graph for brisk.
//!
//! Each step turns a fixed slice of the source tree into a fixed slice of the
//! destination tree. The build graph runs the steps side by side and reports
//! failures through one shared [`ErrorReporter`].

pub mod assets;
pub mod builder;
pub mod fs;
pub mod html;
pub mod images;
pub mod report;
pub mod scripts;
pub mod step;

pub use builder::{BuildConfig, BuildError, BuildGraph, BuildReport, SitePaths, StepFailure};
pub use images::ImageKind;
pub use report::{ConsoleReporter, ErrorReporter};
pub use step::{Scope, StepError, StepKind, StepOutput, StepScope, TransformStep};
