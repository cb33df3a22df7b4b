//! Translates manifest failures into actionable diagnostics.
//!
//! [`ManifestSource`] retains the YAML content and [`ManifestName`] labels
//! its origin. [`map_yaml_error`] and [`map_data_error`] turn parser and
//! deserialisation failures into [`miette`] diagnostics with stable codes.
//
// Module-level suppression for version-dependent lint false positives from
// miette/thiserror derive macros. FIXME: remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::graph::GraphError;
use crate::target::UnflavouredTarget;

mod yaml;

pub use yaml::map_yaml_error;

/// YAML source content for a manifest.
///
/// ```
/// use kasane::manifest::ManifestSource;
/// let source = ManifestSource::from("targets: []");
/// assert_eq!(source.as_str(), "targets: []");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestSource(String);

impl ManifestSource {
    /// Wrap a source buffer.
    #[must_use]
    pub fn new(src: impl Into<String>) -> Self {
        Self(src.into())
    }

    /// The source text.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ManifestSource {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ManifestSource {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// Display name of a manifest, usually its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestName(String);

impl ManifestName {
    /// Wrap a label.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The label.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ManifestName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ManifestName {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ManifestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Error raised while loading a graph manifest.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    /// The manifest could not be parsed or does not have the expected shape.
    #[error("{message}")]
    #[diagnostic(code(kasane::manifest::parse))]
    Parse {
        /// Diagnostic reported by the parser.
        #[source]
        #[diagnostic_source]
        source: Box<dyn Diagnostic + Send + Sync + 'static>,
        /// Summary naming the manifest.
        message: String,
    },
    /// A target sets a field its kind does not accept.
    #[error("`{target}`: {kind} does not accept `{field}`")]
    #[diagnostic(
        code(kasane::manifest::unsupported_argument),
        help("remove `{field}` or declare the target with a kind that accepts it")
    )]
    UnsupportedArgument {
        /// The offending target.
        target: UnflavouredTarget,
        /// Its declared kind.
        kind: &'static str,
        /// The rejected field.
        field: &'static str,
    },
    /// The declared targets do not form a valid graph.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

impl ManifestError {
    /// Wrap a parser diagnostic for the manifest `name`.
    #[must_use]
    pub fn parse(source: Box<dyn Diagnostic + Send + Sync + 'static>, name: &ManifestName) -> Self {
        Self::Parse {
            source,
            message: format!("failed to parse manifest `{name}`"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(kasane::manifest::structure))]
struct DataDiagnostic {
    #[source]
    source: serde_json::Error,
    message: String,
}

/// Map a structural error into a diagnostic without a source span.
#[must_use]
pub fn map_data_error(
    err: serde_json::Error,
    name: &ManifestName,
) -> Box<dyn Diagnostic + Send + Sync + 'static> {
    let message = format!("manifest `{name}` has an invalid structure: {err}");
    Box::new(DataDiagnostic {
        source: err,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result, ensure};
    use serde_json::Value;

    #[test]
    fn map_data_error_carries_name_and_code() -> Result<()> {
        let name = ManifestName::new("kasane.yml");
        let err = serde_json::from_str::<Value>("{\"key\":}")
            .expect_err("expected serde_json parse error");
        let diag = map_data_error(err, &name);
        ensure!(
            diag.to_string().contains("`kasane.yml`"),
            "message should name the manifest: {diag}"
        );
        let code = diag
            .code()
            .map(|c| c.to_string())
            .context("structure diagnostic should expose a code")?;
        ensure!(code == "kasane::manifest::structure", "unexpected code {code}");
        Ok(())
    }

    #[test]
    fn parse_error_wraps_inner_diagnostic() -> Result<()> {
        let name = ManifestName::new("example");
        let err = serde_json::from_str::<Value>("not json").expect_err("parse failure");
        let wrapped = ManifestError::parse(map_data_error(err, &name), &name);
        ensure!(
            wrapped.to_string() == "failed to parse manifest `example`",
            "unexpected outer message: {wrapped}"
        );
        let inner = match &wrapped {
            ManifestError::Parse { source, .. } => source
                .code()
                .map(|c| c.to_string())
                .context("inner diagnostic should have a code")?,
            other => anyhow::bail!("unexpected variant {other:?}"),
        };
        ensure!(inner == "kasane::manifest::structure", "unexpected inner code {inner}");
        Ok(())
    }
}
