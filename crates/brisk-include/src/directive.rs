//! Include directive scanning.

use std::ops::Range;

use regex::Regex;
use serde_json::{Map, Value};

/// Which form of include directive was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `@@include(...)`: always inserted
    Include,

    /// `@@include_once(...)`: inserted the first time a file is seen
    IncludeOnce,
}

/// A single include directive found in a source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Directive form
    pub kind: IncludeKind,

    /// Target path as written
    pub path: String,

    /// Variables passed to the included file
    pub context: Option<Map<String, Value>>,

    /// Byte range of the whole directive in the source
    pub span: Range<usize>,
}

/// A directive that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveError {
    /// Byte offset where the directive starts
    pub offset: usize,

    /// What went wrong
    pub message: String,
}

/// Finds include directives for a given prefix.
#[derive(Debug, Clone)]
pub struct DirectiveScanner {
    pattern: Regex,
}

impl DirectiveScanner {
    /// Create a scanner for directives starting with `prefix` (usually `@@`).
    pub fn new(prefix: &str) -> Self {
        let pattern = format!(r"{}(include_once|include)\s*\(", regex::escape(prefix));
        Self {
            pattern: Regex::new(&pattern).expect("include pattern is a valid regex"),
        }
    }

    /// Find every directive in `source`, in order of appearance.
    pub fn find_all(&self, source: &str) -> Result<Vec<Directive>, DirectiveError> {
        let mut directives = Vec::new();
        let mut pos = 0;

        while let Some(caps) = self.pattern.captures_at(source, pos) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(pos..pos);
            let kind = match caps.get(1).map(|m| m.as_str()) {
                Some("include_once") => IncludeKind::IncludeOnce,
                _ => IncludeKind::Include,
            };

            let (path, context, end) =
                parse_arguments(source, whole.end).map_err(|message| DirectiveError {
                    offset: whole.start,
                    message,
                })?;

            directives.push(Directive {
                kind,
                path,
                context,
                span: whole.start..end,
            });
            pos = end;
        }

        Ok(directives)
    }
}

/// Parse `'path' [, { json }] )` starting right after the opening parenthesis.
///
/// Returns the path, optional context object and the offset just past `)`.
fn parse_arguments(
    source: &str,
    start: usize,
) -> Result<(String, Option<Map<String, Value>>, usize), String> {
    let mut pos = skip_whitespace(source, start);

    let quote = match source[pos..].chars().next() {
        Some(c @ ('\'' | '"')) => c,
        Some(c) => return Err(format!("expected a quoted path, found '{}'", c)),
        None => return Err("unexpected end of input".to_string()),
    };
    pos += 1;

    let close = source[pos..]
        .find(quote)
        .ok_or_else(|| "unterminated path string".to_string())?;
    let path = source[pos..pos + close].to_string();
    if path.trim().is_empty() {
        return Err("empty include path".to_string());
    }
    pos = skip_whitespace(source, pos + close + 1);

    let mut context = None;
    if source[pos..].starts_with(',') {
        pos = skip_whitespace(source, pos + 1);
        if !source[pos..].starts_with('{') {
            return Err("expected a JSON object after ','".to_string());
        }
        let end = matching_brace(source, pos)?;
        let object: Map<String, Value> = serde_json::from_str(&source[pos..end])
            .map_err(|e| format!("invalid JSON context: {}", e))?;
        context = Some(object);
        pos = skip_whitespace(source, end);
    }

    if !source[pos..].starts_with(')') {
        return Err("expected ')' to close the directive".to_string());
    }

    Ok((path, context, pos + 1))
}

fn skip_whitespace(source: &str, pos: usize) -> usize {
    let rest = &source[pos..];
    pos + (rest.len() - rest.trim_start().len())
}

/// Offset just past the `}` matching the `{` at `open`.
fn matching_brace(source: &str, open: usize) -> Result<usize, String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in source[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(open + i + 1);
                }
            }
            _ => {}
        }
    }

    Err("unterminated JSON context".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(source: &str) -> Vec<Directive> {
        DirectiveScanner::new("@@").find_all(source).unwrap()
    }

    #[test]
    fn finds_simple_include() {
        let source = "<body>@@include('header.html')</body>";
        let found = scan(source);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, IncludeKind::Include);
        assert_eq!(found[0].path, "header.html");
        assert_eq!(found[0].context, None);
        assert_eq!(&source[found[0].span.clone()], "@@include('header.html')");
    }

    #[test]
    fn accepts_double_quotes_and_spacing() {
        let found = scan(r#"@@include ( "partials/nav.html" )"#);
        assert_eq!(found[0].path, "partials/nav.html");
    }

    #[test]
    fn parses_context_object() {
        let found = scan(r#"@@include('card.html', { "title": "A } brace", "n": {"x": 1} })"#);
        let context = found[0].context.as_ref().unwrap();

        assert_eq!(context["title"], Value::String("A } brace".to_string()));
        assert_eq!(context["n"]["x"], Value::from(1));
    }

    #[test]
    fn distinguishes_include_once() {
        let found = scan("@@include_once('a.html') @@include('b.html')");

        assert_eq!(found[0].kind, IncludeKind::IncludeOnce);
        assert_eq!(found[1].kind, IncludeKind::Include);
        assert_eq!(found[1].path, "b.html");
    }

    #[test]
    fn honours_custom_prefix() {
        let found = DirectiveScanner::new("##")
            .find_all("@@include('no.html') ##include('yes.html')")
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "yes.html");
    }

    #[test]
    fn rejects_unterminated_path() {
        let err = DirectiveScanner::new("@@")
            .find_all("text @@include('broken.html)")
            .unwrap_err();

        assert_eq!(err.offset, 5);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = DirectiveScanner::new("@@")
            .find_all("@@include('a.html', { title: 1 })")
            .unwrap_err();

        assert!(err.message.contains("invalid JSON"));
    }

    #[test]
    fn rejects_missing_close_paren() {
        let err = DirectiveScanner::new("@@")
            .find_all("@@include('a.html' oops")
            .unwrap_err();

        assert!(err.message.contains("')'"));
    }
}
