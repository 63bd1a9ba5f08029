//! Template rendering
//!
//! Templates use `{{ key }}` placeholders. Every placeholder must resolve to a
//! variable; substituted values are inserted verbatim and never re-scanned,
//! so a value containing `{{ ... }}` is left alone.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::Vars;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Errors raised while rendering a template
#[derive(Error, Debug)]
pub enum TemplateError {
    /// A placeholder names a variable missing from the mapping
    #[error("undefined template variable '{name}'")]
    Undefined {
        /// Name of the missing variable.
        name: String,
    },

    /// The template file could not be read
    #[error("cannot read template {}: {source}", path.display())]
    Read {
        /// Path of the template file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Where a template's text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Template text held in memory
    Inline(String),
    /// Template read from disk; see [`Template::load`]
    File(PathBuf),
}

impl Template {
    /// Creates an in-memory template
    pub fn inline(source: impl Into<String>) -> Self {
        Self::Inline(source.into())
    }

    /// Creates a file-backed template
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Reads a file template into memory
    ///
    /// Inline templates are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Read`] when the file cannot be read.
    pub async fn load(&self) -> Result<Self, TemplateError> {
        match self {
            Self::Inline(_) => Ok(self.clone()),
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(Self::Inline)
                .map_err(|source| TemplateError::Read {
                    path: path.clone(),
                    source,
                }),
        }
    }

    /// Template text; reads a file template synchronously
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Read`] when a file template cannot be read.
    pub fn source(&self) -> Result<std::borrow::Cow<'_, str>, TemplateError> {
        match self {
            Self::Inline(text) => Ok(std::borrow::Cow::Borrowed(text)),
            Self::File(path) => read(path).map(std::borrow::Cow::Owned),
        }
    }

    /// Renders the template with `vars`
    ///
    /// # Errors
    ///
    /// Fails when the template cannot be loaded or names an undefined variable.
    pub fn render(&self, vars: &Vars) -> Result<String, TemplateError> {
        render(&self.source()?, vars)
    }
}

fn read(path: &Path) -> Result<String, TemplateError> {
    std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Substitutes every `{{ key }}` in `source` with its value from `vars`.
///
/// # Errors
///
/// Returns [`TemplateError::Undefined`] for the first placeholder with no value.
///
/// # Example
///
/// ```rust
/// use batchline::block::{Vars, render};
///
/// let vars = Vars::from([("sample".to_string(), "s1".to_string())]);
/// assert_eq!(render("echo {{ sample }}", &vars).unwrap(), "echo s1");
/// ```
pub fn render(source: &str, vars: &Vars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(source) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let name = caps.get(1).map_or("", |m| m.as_str());
        let value = vars.get(name).ok_or_else(|| TemplateError::Undefined {
            name: name.to_string(),
        })?;

        out.push_str(&source[last..whole.start]);
        out.push_str(value);
        last = whole.end;
    }

    out.push_str(&source[last..]);
    Ok(out)
}
