//! Script concatenation and verbatim copy steps.

use std::path::PathBuf;

use crate::builder::{relative_to, SitePaths};
use crate::fs;
use crate::step::{StepError, StepKind, StepOutput, StepScope, TransformStep};

/// Separator placed between concatenated scripts.
const SEPARATOR: &[u8] = b"\n";

/// Concatenates every non-vendor script into `js/production.js`.
pub struct ScriptsStep;

impl TransformStep for ScriptsStep {
    fn kind(&self) -> StepKind {
        StepKind::Scripts
    }

    fn run(&self, paths: &SitePaths, _scope: &StepScope) -> Result<StepOutput, StepError> {
        let vendor = paths.vendor_dir();
        let sources = fs::walk_files_except(&paths.js_dir(), Some(vendor.as_path()));

        let mut output = StepOutput::new(StepKind::Scripts);
        if sources.is_empty() {
            return Ok(output);
        }

        let mut bundle = Vec::new();
        for (i, source) in sources.iter().enumerate() {
            if i > 0 {
                bundle.extend_from_slice(SEPARATOR);
            }
            bundle.extend_from_slice(&fs::read(source)?);
        }

        let dest = paths.dest_js();
        fs::write(&dest, &bundle)?;
        output.record(dest, bundle.len());
        Ok(output)
    }
}

/// Copies a source subtree into the destination byte for byte.
pub struct CopyStep {
    kind: StepKind,
    source: fn(&SitePaths) -> PathBuf,
    dest: fn(&SitePaths) -> PathBuf,
}

impl CopyStep {
    /// `js/vendor/**` into `<dest>/js/vendor/`.
    pub fn vendor() -> Self {
        Self {
            kind: StepKind::Vendor,
            source: SitePaths::vendor_dir,
            dest: SitePaths::dest_vendor_dir,
        }
    }

    /// `img/favicon/**` into the destination root.
    pub fn favicon() -> Self {
        Self {
            kind: StepKind::Favicon,
            source: SitePaths::favicon_dir,
            dest: |paths: &SitePaths| paths.dest.clone(),
        }
    }
}

impl TransformStep for CopyStep {
    fn kind(&self) -> StepKind {
        self.kind
    }

    fn run(&self, paths: &SitePaths, _scope: &StepScope) -> Result<StepOutput, StepError> {
        let source_root = (self.source)(paths);
        let dest_root = (self.dest)(paths);

        let files = fs::walk_files(&source_root)
            .into_iter()
            .map(|path| {
                let contents = fs::read(&path)?;
                Ok((dest_root.join(relative_to(&path, &source_root)), contents))
            })
            .collect::<Result<Vec<_>, StepError>>()?;

        let mut output = StepOutput::new(self.kind);
        for (dest, contents) in files {
            fs::write(&dest, &contents)?;
            output.record(dest, contents.len());
        }

        Ok(output)
    }
}
