//! Placeholder substitution for release templates
//!
//! Template files use `$NAME` or `${NAME}` placeholders, with `$$` for a
//! literal dollar sign. Substitution is strict: every placeholder in the
//! template must have a value.

use crate::core::pattern::compiled;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Error types for template rendering
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("No value for template placeholder '{0}'")]
    MissingValue(String),

    #[error("Invalid placeholder at line {line}, column {column}")]
    InvalidPlaceholder { line: usize, column: usize },

    #[error("Invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn placeholder_regex() -> Result<&'static Regex, regex::Error> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    compiled(
        &PLACEHOLDER,
        r"\$(?:(?P<escaped>\$)|(?P<named>[_a-zA-Z][_a-zA-Z0-9]*)|\{(?P<braced>[_a-zA-Z][_a-zA-Z0-9]*)\}|(?P<invalid>))",
    )
}

/// A text template with named placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Read a template from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(source))
    }

    /// Replace every placeholder with its value
    ///
    /// Values the template never references are ignored.
    pub fn substitute(&self, values: &HashMap<&str, String>) -> Result<String, TemplateError> {
        let mut rendered = String::with_capacity(self.source.len());
        let mut last = 0;

        for caps in placeholder_regex()?.captures_iter(&self.source) {
            let Some(whole) = caps.get(0) else { continue };
            rendered.push_str(&self.source[last..whole.start()]);
            last = whole.end();

            if caps.name("escaped").is_some() {
                rendered.push('$');
                continue;
            }

            let name = caps.name("named").or_else(|| caps.name("braced"));
            match name {
                Some(name) => {
                    let value = values
                        .get(name.as_str())
                        .ok_or_else(|| TemplateError::MissingValue(name.as_str().to_string()))?;
                    rendered.push_str(value);
                }
                None => {
                    let (line, column) = self.position(whole.start());
                    return Err(TemplateError::InvalidPlaceholder { line, column });
                }
            }
        }

        rendered.push_str(&self.source[last..]);
        Ok(rendered)
    }

    /// 1-based line and character column of a byte offset
    fn position(&self, offset: usize) -> (usize, usize) {
        let before = &self.source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |nl| nl + 1);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }
}

/// Render each item as `"item",` on its own line
pub fn quoted_lines<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("\"{}\",", item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render items as `"a", "b"`
pub fn quoted_csv<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("\"{}\"", item.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}
