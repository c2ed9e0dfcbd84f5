//! Include directive resolution for HTML sources.
//!
//! Expands `@@include('file.html')` style markers by splicing in the contents of
//! other files, with optional JSON variables substituted into the included text.

pub mod directive;
pub mod includer;

pub use directive::{Directive, DirectiveScanner, IncludeKind};
pub use includer::{IncludeError, Includer, DEFAULT_PREFIX, MAX_DEPTH};
