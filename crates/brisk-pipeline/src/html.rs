//! HTML step: include expansion followed by light minification.

use std::borrow::Cow;

use brisk_include::Includer;
use regex::{Captures, Regex};

use crate::assets::AssetPipeline;
use crate::builder::SitePaths;
use crate::fs;
use crate::step::{StepError, StepKind, StepOutput, StepScope, TransformStep};

/// Renders every top-level `html/*.html` file into the destination root.
pub struct HtmlStep {
    includer: Includer,
    minifier: HtmlMinifier,
}

impl HtmlStep {
    pub fn new(include_prefix: &str) -> Self {
        Self {
            includer: Includer::new(include_prefix),
            minifier: HtmlMinifier::new(),
        }
    }
}

impl TransformStep for HtmlStep {
    fn kind(&self) -> StepKind {
        StepKind::Html
    }

    fn run(&self, paths: &SitePaths, _scope: &StepScope) -> Result<StepOutput, StepError> {
        let base = paths.html_dir();
        let mut rendered = Vec::new();

        for source in fs::list_files_with_extension(&base, "html") {
            let html = self.includer.render_file(&source, &base)?;
            let html = self.minifier.minify(&html);

            let name = source.file_name().unwrap_or_default();
            rendered.push((paths.dest.join(name), html));
        }

        let mut output = StepOutput::new(StepKind::Html);
        for (dest, html) in rendered {
            fs::write(&dest, &html)?;
            output.record(dest, html.len());
        }

        Ok(output)
    }
}

const EMPTY_REMOVABLE: [&str; 6] = ["class", "id", "style", "title", "lang", "dir"];

const SCRIPT_TYPES: [&str; 4] = [
    "text/javascript",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
];

/// A parsed attribute, keeping its original text.
struct Attribute<'a> {
    raw: &'a str,
    name: &'a str,
    value: Option<&'a str>,
    quote: Option<char>,
}

/// Conservative HTML cleanup.
///
/// Removes redundant and empty attributes, default `type` attributes on
/// scripts and stylesheets, and comment wrappers inside scripts and styles,
/// and minifies inline CSS. Comments, whitespace and the contents of
/// `<textarea>` and `<title>` are kept, and names are never case-folded.
pub struct HtmlMinifier {
    blocks: Regex,
    tag: Regex,
    attribute: Regex,
}

impl HtmlMinifier {
    pub fn new() -> Self {
        Self {
            blocks: Regex::new(
                r"(?is)(<!--.*?-->)|(<script\b[^>]*>)(.*?)(</script\s*>)|(<style\b[^>]*>)(.*?)(</style\s*>)|(<textarea\b[^>]*>)(.*?</textarea\s*>)|(<title\b[^>]*>)(.*?</title\s*>)",
            )
            .expect("block pattern is a valid regex"),
            tag: Regex::new(
                r#"<([A-Za-z][\w:-]*)((?:\s+[^\s"'<>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(/?)>"#,
            )
            .expect("tag pattern is a valid regex"),
            attribute: Regex::new(
                r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
            )
            .expect("attribute pattern is a valid regex"),
        }
    }

    /// Minify a complete document.
    pub fn minify(&self, html: &str) -> String {
        let mut output = String::with_capacity(html.len());
        let mut last = 0;

        for caps in self.blocks.captures_iter(html) {
            let Some(whole) = caps.get(0) else { continue };
            output.push_str(&self.minify_markup(&html[last..whole.start()]));
            last = whole.end();

            if let Some(comment) = caps.get(1) {
                output.push_str(comment.as_str());
            } else if let (Some(open), Some(body), Some(close)) = (caps.get(2), caps.get(3), caps.get(4)) {
                output.push_str(&self.minify_markup(open.as_str()));
                output.push_str(strip_comment_wrapper(body.as_str()));
                output.push_str(close.as_str());
            } else if let (Some(open), Some(body), Some(close)) = (caps.get(5), caps.get(6), caps.get(7)) {
                output.push_str(&self.minify_markup(open.as_str()));
                let css = strip_comment_wrapper(body.as_str());
                match AssetPipeline::minify_css(css) {
                    Ok(minified) => output.push_str(&minified),
                    Err(_) => output.push_str(css),
                }
                output.push_str(close.as_str());
            } else if let (Some(open), Some(text)) = (
                caps.get(8).or_else(|| caps.get(10)),
                caps.get(9).or_else(|| caps.get(11)),
            ) {
                // Shown as literal text
                output.push_str(&self.minify_markup(open.as_str()));
                output.push_str(text.as_str());
            }
        }

        output.push_str(&self.minify_markup(&html[last..]));
        output
    }

    /// Rewrite the start tags in a stretch of plain markup.
    fn minify_markup<'a>(&self, markup: &'a str) -> Cow<'a, str> {
        self.tag
            .replace_all(markup, |caps: &Captures| self.rewrite_tag(caps))
    }

    fn rewrite_tag(&self, caps: &Captures) -> String {
        let original = &caps[0];
        let name = &caps[1];
        let attrs_text = caps.get(2).map_or("", |m| m.as_str());
        let self_closing = !caps[3].is_empty();

        let attributes: Vec<Attribute> = self
            .attribute
            .captures_iter(attrs_text)
            .filter_map(|a| {
                let raw = a.get(0)?.as_str();
                let (value, quote) = if let Some(v) = a.get(2) {
                    (Some(v.as_str()), Some('"'))
                } else if let Some(v) = a.get(3) {
                    (Some(v.as_str()), Some('\''))
                } else {
                    (a.get(4).map(|v| v.as_str()), None)
                };
                Some(Attribute {
                    raw,
                    name: a.get(1)?.as_str(),
                    value,
                    quote,
                })
            })
            .collect();

        let has_src = attributes.iter().any(|a| a.name == "src");
        let mut changed = false;
        let mut kept: Vec<Cow<str>> = Vec::with_capacity(attributes.len());

        for attr in &attributes {
            if is_redundant(name, attr, has_src) || is_empty_removable(attr) {
                changed = true;
                continue;
            }

            if attr.name == "style" {
                if let Some(minified) = minify_style_attribute(attr) {
                    if minified != attr.raw {
                        changed = true;
                        kept.push(Cow::Owned(minified));
                        continue;
                    }
                }
            }

            kept.push(Cow::Borrowed(attr.raw));
        }

        if !changed {
            return original.to_string();
        }

        let mut tag = format!("<{}", name);
        for attr in kept {
            tag.push(' ');
            tag.push_str(&attr);
        }
        if self_closing {
            tag.push('/');
        }
        tag.push('>');
        tag
    }
}

impl Default for HtmlMinifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Attributes whose value is the element's default.
fn is_redundant(tag: &str, attr: &Attribute, has_src: bool) -> bool {
    let value = attr.value.map(|v| v.trim().to_ascii_lowercase());
    let value = value.as_deref();

    match (tag, attr.name) {
        ("script", "language") => value.is_some_and(|v| v.starts_with("javascript")),
        ("script", "charset") => !has_src,
        ("script", "type") => value.is_some_and(|v| v.is_empty() || SCRIPT_TYPES.contains(&v)),
        ("style", "type") | ("link", "type") => value == Some("text/css"),
        ("style", "media") | ("link", "media") => value == Some("all"),
        ("form", "method") => value == Some("get"),
        ("input", "type") => value == Some("text"),
        ("area", "shape") => value == Some("rect"),
        _ => false,
    }
}

/// Empty attributes that carry no meaning.
fn is_empty_removable(attr: &Attribute) -> bool {
    let Some(value) = attr.value else {
        return false;
    };
    if !value.trim().is_empty() {
        return false;
    }

    EMPTY_REMOVABLE.contains(&attr.name) || is_event_handler(attr.name)
}

fn is_event_handler(name: &str) -> bool {
    name.len() > 2 && name.starts_with("on") && name[2..].bytes().all(|b| b.is_ascii_lowercase())
}

fn minify_style_attribute(attr: &Attribute) -> Option<String> {
    let value = attr.value?;
    let quote = attr.quote.unwrap_or('"');
    let minified = AssetPipeline::minify_declarations(value).ok()?;
    if minified.contains(quote) {
        return None;
    }
    Some(format!("style={quote}{minified}{quote}"))
}

/// Drop a `<!-- ... -->` wrapper around script or style contents.
fn strip_comment_wrapper(body: &str) -> &str {
    let trimmed = body.trim();
    match trimmed
        .strip_prefix("<!--")
        .and_then(|rest| rest.strip_suffix("-->"))
    {
        Some(inner) => inner,
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn minify(html: &str) -> String {
        HtmlMinifier::new().minify(html)
    }

    #[test]
    fn removes_default_type_attributes() {
        assert_eq!(
            minify(r#"<script type="text/javascript" src="a.js"></script>"#),
            r#"<script src="a.js"></script>"#
        );
        assert_eq!(
            minify(r#"<link rel="stylesheet" type="text/css" href="a.css">"#),
            r#"<link rel="stylesheet" href="a.css">"#
        );
    }

    #[test]
    fn keeps_non_default_script_types() {
        let html = r#"<script type="module" src="a.js"></script>"#;
        assert_eq!(minify(html), html);
    }

    #[test]
    fn removes_redundant_and_empty_attributes() {
        assert_eq!(
            minify(r#"<form method="get" class="" action="/s"><input type="text" id=" " name="q" onclick=""></form>"#),
            r#"<form action="/s"><input name="q"></form>"#
        );
    }

    #[test]
    fn keeps_empty_attributes_that_matter() {
        let html = r#"<img src="a.png" alt=""><input value="">"#;
        assert_eq!(minify(html), html);
    }

    #[test]
    fn minifies_inline_css() {
        assert_eq!(
            minify("<style type=\"text/css\">\n  body {\n    margin: 0px;\n  }\n</style>"),
            "<style>body{margin:0}</style>"
        );
        assert_eq!(
            minify(r#"<div style="color : red ; "></div>"#),
            r#"<div style="color:red"></div>"#
        );
    }

    #[test]
    fn strips_comment_wrappers_in_scripts() {
        assert_eq!(
            minify("<script>\n<!--\nvar a = 1;\n-->\n</script>"),
            "<script>\nvar a = 1;\n</script>"
        );
    }

    #[test]
    fn leaves_comments_and_case_alone() {
        let html = "<!-- keep <input type=\"text\"> -->\n<svg viewBox=\"0 0 1 1\"><clipPath id=\"c\"/></svg>";
        assert_eq!(minify(html), html);
    }

    #[test]
    fn does_not_touch_script_contents() {
        let html = r#"<script>var s = '<div class="">';</script>"#;
        assert_eq!(minify(html), html);
    }

    #[test]
    fn textarea_and_title_text_is_literal() {
        let textarea = r#"<textarea><form method="get"></textarea>"#;
        assert_eq!(minify(textarea), textarea);

        let title = r#"<TITLE>Use <input type="text" class=""></TITLE>"#;
        assert_eq!(minify(title), title);

        assert_eq!(
            minify(r#"<textarea class="" rows="3"><p id=""></textarea><p id=""></p>"#),
            r#"<textarea rows="3"><p id=""></textarea><p></p>"#
        );
    }

    #[test]
    fn step_renders_top_level_pages() {
        let temp = tempdir().unwrap();
        let paths = SitePaths::new(temp.path().join("src"), temp.path().join("out"));
        let html_dir = paths.html_dir();
        std::fs::create_dir_all(html_dir.join("partials")).unwrap();
        std::fs::write(html_dir.join("partials/head.html"), "<title>@@title</title>").unwrap();
        std::fs::write(
            html_dir.join("about.html"),
            r#"<head>@@include('partials/head.html', {"title": "About"})</head><p class="">hi</p>"#,
        )
        .unwrap();

        let output = HtmlStep::new("@@").run(&paths, &StepScope::All).unwrap();

        assert_eq!(output.files, vec![paths.dest.join("about.html")]);
        assert_eq!(
            std::fs::read_to_string(paths.dest.join("about.html")).unwrap(),
            "<head><title>About</title></head><p>hi</p>"
        );
        assert!(!paths.dest.join("partials").exists());
    }

    #[test]
    fn step_writes_nothing_when_an_include_is_missing() {
        let temp = tempdir().unwrap();
        let paths = SitePaths::new(temp.path().join("src"), temp.path().join("out"));
        std::fs::create_dir_all(paths.html_dir()).unwrap();
        std::fs::write(paths.html_dir().join("a.html"), "ok").unwrap();
        std::fs::write(paths.html_dir().join("b.html"), "@@include('missing.html')").unwrap();

        let err = HtmlStep::new("@@").run(&paths, &StepScope::All).unwrap_err();

        assert!(matches!(err, StepError::Include(_)));
        assert!(!paths.dest.join("a.html").exists());
    }
}
