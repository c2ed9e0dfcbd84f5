//! Stylesheet pipeline: Sass compilation, vendor prefixing and minification.

use std::path::Path;

use lightningcss::stylesheet::{
    MinifyOptions, ParserOptions, PrinterOptions, StyleAttribute, StyleSheet,
};
use lightningcss::targets::{Browsers, Targets};

use crate::builder::SitePaths;
use crate::fs::{self, format_size};
use crate::step::{StepError, StepKind, StepOutput, StepScope, TransformStep};

/// CSS processing utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// Compile a Sass entry file and its imports to compressed CSS.
    pub fn compile_sass(entry: &Path) -> Result<String, StepError> {
        let options = grass::Options::default().style(grass::OutputStyle::Compressed);
        grass::from_path(entry, &options).map_err(|e| StepError::Sass(e.to_string()))
    }

    /// Resolve browserslist queries into lightningcss targets.
    pub fn targets(queries: &[String]) -> Result<Targets, StepError> {
        let browsers = Browsers::from_browserslist(queries)
            .map_err(|e| StepError::Css(format!("invalid browser list: {}", e)))?;

        Ok(Targets {
            browsers,
            ..Targets::default()
        })
    }

    /// Add vendor prefixes for `targets` and minify.
    pub fn prefix_and_minify(css: &str, targets: Targets) -> Result<String, String> {
        let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| format!("CSS parse error: {}", e))?;

        stylesheet
            .minify(MinifyOptions {
                targets,
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                targets,
                ..Default::default()
            })
            .map_err(|e| format!("CSS print error: {}", e))?;

        Ok(printed.code)
    }

    /// Minify CSS using lightningcss.
    pub fn minify_css(css: &str) -> Result<String, String> {
        let stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| format!("CSS parse error: {}", e))?;

        let minified = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        Ok(minified.code)
    }

    /// Minify the declarations of a `style="..."` attribute.
    pub fn minify_declarations(declarations: &str) -> Result<String, String> {
        let attribute = StyleAttribute::parse(declarations, ParserOptions::default())
            .map_err(|e| format!("CSS parse error: {}", e))?;

        let minified = attribute
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        Ok(minified.code)
    }
}

/// Compiles `scss/main.scss` into `css/production.css`.
pub struct StylesStep {
    browsers: Vec<String>,
}

impl StylesStep {
    pub fn new(browsers: Vec<String>) -> Self {
        Self { browsers }
    }
}

impl TransformStep for StylesStep {
    fn kind(&self) -> StepKind {
        StepKind::Styles
    }

    fn run(&self, paths: &SitePaths, _scope: &StepScope) -> Result<StepOutput, StepError> {
        let entry = paths.scss_entry();
        if !entry.is_file() {
            return Err(StepError::MissingEntry(entry));
        }

        let compiled = AssetPipeline::compile_sass(&entry)?;
        let targets = AssetPipeline::targets(&self.browsers)?;
        let css = AssetPipeline::prefix_and_minify(&compiled, targets).map_err(StepError::Css)?;

        let dest = paths.dest_css();
        fs::write(&dest, &css)?;
        tracing::info!("{} {}", dest.display(), format_size(css.len() as u64));

        let mut output = StepOutput::new(StepKind::Styles);
        output.record(dest, css.len());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn last_two_versions() -> Targets {
        AssetPipeline::targets(&["last 2 versions".to_string()]).unwrap()
    }

    #[test]
    fn minifies_css() {
        let css = r#"
.button {
    background-color: blue;
    padding: 10px;
}
        "#;

        let minified = AssetPipeline::minify_css(css).unwrap();

        assert!(!minified.contains('\n'));
        assert!(minified.contains(".button"));
    }

    #[test]
    fn adds_vendor_prefixes() {
        let css = ".a { user-select: none; }";

        let out = AssetPipeline::prefix_and_minify(css, last_two_versions()).unwrap();

        assert!(out.contains("-webkit-user-select:none"));
        assert!(out.contains("user-select:none"));
    }

    #[test]
    fn minifies_style_attribute() {
        let out = AssetPipeline::minify_declarations("color : red ;  margin: 0px ").unwrap();
        assert_eq!(out, "color:red;margin:0");
    }

    #[test]
    fn compiles_sass_with_imports() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("_colors.scss"), "$brand: #ff0000;").unwrap();
        std::fs::write(
            temp.path().join("main.scss"),
            "@import 'colors';\nnav { a { color: $brand; } }",
        )
        .unwrap();

        let css = AssetPipeline::compile_sass(&temp.path().join("main.scss")).unwrap();

        assert!(css.contains("nav a"));
        assert!(css.contains("red") || css.contains("#ff0000") || css.contains("#f00"));
    }

    #[test]
    fn rejects_unbalanced_braces() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("main.scss"), ".a { color: red;").unwrap();

        let err = AssetPipeline::compile_sass(&temp.path().join("main.scss")).unwrap_err();

        assert!(matches!(err, StepError::Sass(_)));
    }

    #[test]
    fn step_writes_production_css() {
        let temp = tempdir().unwrap();
        let paths = SitePaths::new(temp.path().join("src"), temp.path().join("out"));
        std::fs::create_dir_all(paths.scss_dir()).unwrap();
        std::fs::write(paths.scss_entry(), "body { margin: 0; }").unwrap();

        let step = StylesStep::new(vec!["last 2 versions".to_string()]);
        let output = step.run(&paths, &StepScope::All).unwrap();

        assert_eq!(output.files, vec![paths.dest_css()]);
        assert_eq!(
            std::fs::read_to_string(paths.dest_css()).unwrap(),
            "body{margin:0}"
        );
    }

    #[test]
    fn step_requires_entry_file() {
        let temp = tempdir().unwrap();
        let paths = SitePaths::new(temp.path().join("src"), temp.path().join("out"));

        let err = StylesStep::new(vec![])
            .run(&paths, &StepScope::All)
            .unwrap_err();

        assert!(matches!(err, StepError::MissingEntry(_)));
        assert!(!paths.dest_css().exists());
    }
}
