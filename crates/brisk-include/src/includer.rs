//! Include resolution.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::directive::{DirectiveScanner, IncludeKind};

/// Marker prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "@@";

/// Maximum include nesting depth.
pub const MAX_DEPTH: usize = 32;

/// Errors that can occur while expanding includes.
#[derive(Debug, thiserror::Error)]
pub enum IncludeError {
    #[error("{}:{line}: include target not found: {}", .file.display(), .target.display())]
    Missing {
        file: PathBuf,
        line: usize,
        target: PathBuf,
    },

    #[error("{}:{line}: malformed include directive: {message}", .file.display())]
    Malformed {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Include cycle detected: {} includes itself", .target.display())]
    Cycle { target: PathBuf },

    #[error("Includes nested deeper than {max} levels at {}", .target.display())]
    TooDeep { target: PathBuf, max: usize },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Bookkeeping for one top-level document.
#[derive(Default)]
struct RenderState {
    /// Files currently being expanded, outermost first
    stack: Vec<PathBuf>,

    /// Every file included so far
    seen: HashSet<PathBuf>,
}

/// Expands include directives relative to a base directory.
#[derive(Debug, Clone)]
pub struct Includer {
    scanner: DirectiveScanner,
    variable: Regex,
}

impl Includer {
    /// Create an includer for the given marker prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let variable = format!(
            r"{}([A-Za-z_$][\w$]*(?:\.[\w$]+)*)",
            regex::escape(&prefix)
        );

        Self {
            scanner: DirectiveScanner::new(&prefix),
            variable: Regex::new(&variable).expect("variable pattern is a valid regex"),
        }
    }

    /// Read `path` and expand its includes against `base_dir`.
    pub fn render_file(&self, path: &Path, base_dir: &Path) -> Result<String, IncludeError> {
        let source = fs::read_to_string(path).map_err(|source| IncludeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.render_str(&source, path, base_dir)
    }

    /// Expand the includes of `source`, which was read from `origin`.
    pub fn render_str(
        &self,
        source: &str,
        origin: &Path,
        base_dir: &Path,
    ) -> Result<String, IncludeError> {
        let mut state = RenderState::default();
        let origin_key = fs::canonicalize(origin).unwrap_or_else(|_| origin.to_path_buf());
        state.stack.push(origin_key);

        self.expand(source, origin, base_dir, &Map::new(), &mut state)
    }

    fn expand(
        &self,
        source: &str,
        origin: &Path,
        base_dir: &Path,
        context: &Map<String, Value>,
        state: &mut RenderState,
    ) -> Result<String, IncludeError> {
        let directives = self
            .scanner
            .find_all(source)
            .map_err(|e| IncludeError::Malformed {
                file: origin.to_path_buf(),
                line: line_at(source, e.offset),
                message: e.message,
            })?;

        if directives.is_empty() {
            return Ok(source.to_string());
        }

        let mut output = String::with_capacity(source.len());
        let mut last = 0;

        for directive in directives {
            output.push_str(&source[last..directive.span.start]);
            last = directive.span.end;

            let target = base_dir.join(&directive.path);
            let key = match fs::canonicalize(&target) {
                Ok(key) => key,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(IncludeError::Missing {
                        file: origin.to_path_buf(),
                        line: line_at(source, directive.span.start),
                        target,
                    });
                }
                Err(err) => {
                    return Err(IncludeError::Read {
                        path: target,
                        source: err,
                    })
                }
            };

            let first_time = state.seen.insert(key.clone());
            if directive.kind == IncludeKind::IncludeOnce && !first_time {
                continue;
            }

            if state.stack.contains(&key) {
                return Err(IncludeError::Cycle { target });
            }
            if state.stack.len() > MAX_DEPTH {
                return Err(IncludeError::TooDeep {
                    target,
                    max: MAX_DEPTH,
                });
            }

            let text = fs::read_to_string(&key).map_err(|source| IncludeError::Read {
                path: target.clone(),
                source,
            })?;

            let mut merged = context.clone();
            if let Some(own) = directive.context {
                merged.extend(own);
            }
            let text = self.substitute(&text, &merged);

            state.stack.push(key);
            let expanded = self.expand(&text, &target, base_dir, &merged, state)?;
            state.stack.pop();

            output.push_str(&expanded);
        }

        output.push_str(&source[last..]);
        Ok(output)
    }

    /// Replace `@@name` (or `@@a.b`) with values from `context`.
    ///
    /// Unknown names and the include keywords are left untouched.
    fn substitute(&self, text: &str, context: &Map<String, Value>) -> String {
        if context.is_empty() {
            return text.to_string();
        }

        self.variable
            .replace_all(text, |caps: &Captures| {
                let name = &caps[1];
                if name == "include" || name == "include_once" {
                    return caps[0].to_string();
                }
                match lookup(context, name) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl Default for Includer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Resolve a dotted name like `page.title` in a JSON object.
fn lookup<'a>(context: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let mut parts = name.split('.');
    let mut current = context.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// 1-based line number of a byte offset.
fn line_at(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}
