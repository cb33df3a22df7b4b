//! Parsing of the canonical target text form.

// Module-level suppression for version-dependent lint false positives from
// miette/thiserror derive macros. FIXME: remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::{collections::BTreeSet, str::FromStr};

use miette::Diagnostic;
use thiserror::Error;

use super::{BuildTarget, Flavour, UnflavouredTarget};

/// Errors raised when a target or flavour name is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum TargetParseError {
    /// The base path does not start with `//`.
    #[error("target `{input}` must start with `//`")]
    #[diagnostic(code(kasane::target::missing_prefix))]
    MissingPrefix {
        /// The rejected input.
        input: String,
    },
    /// No `:` separates the base path from the short name.
    #[error("target `{input}` is missing a `:name` component")]
    #[diagnostic(code(kasane::target::missing_name))]
    MissingName {
        /// The rejected input.
        input: String,
    },
    /// The short name is empty or contains reserved characters.
    #[error("target `{input}` has an invalid short name")]
    #[diagnostic(
        code(kasane::target::invalid_name),
        help("short names must be non-empty and must not contain `:` or `#`")
    )]
    InvalidName {
        /// The rejected input.
        input: String,
    },
    /// A `#` was present but no flavours followed it.
    #[error("target `{input}` has an empty flavour list")]
    #[diagnostic(code(kasane::target::empty_flavours))]
    EmptyFlavourList {
        /// The rejected input.
        input: String,
    },
    /// A flavour name contains characters outside `[A-Za-z0-9_.-]`.
    #[error("invalid flavour name `{flavour}`")]
    #[diagnostic(
        code(kasane::target::invalid_flavour),
        help("flavour names may only contain ASCII letters, digits, `_`, `.` and `-`")
    )]
    InvalidFlavour {
        /// The rejected flavour name.
        flavour: String,
    },
}

impl FromStr for UnflavouredTarget {
    type Err = TargetParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.contains('#') {
            return Err(TargetParseError::InvalidName {
                input: input.to_owned(),
            });
        }
        if !input.starts_with("//") {
            return Err(TargetParseError::MissingPrefix {
                input: input.to_owned(),
            });
        }
        let (base, name) = input
            .rsplit_once(':')
            .ok_or_else(|| TargetParseError::MissingName {
                input: input.to_owned(),
            })?;
        Self::new(base, name)
    }
}

impl FromStr for BuildTarget {
    type Err = TargetParseError;

    /// Parse `//path:name` optionally followed by `#flavour,flavour`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((head, tail)) = input.split_once('#') else {
            return input.parse::<UnflavouredTarget>().map(Self::of);
        };
        let unflavoured = head.parse::<UnflavouredTarget>()?;
        if tail.is_empty() {
            return Err(TargetParseError::EmptyFlavourList {
                input: input.to_owned(),
            });
        }
        let flavours = tail
            .split(',')
            .map(Flavour::new)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            unflavoured,
            flavours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("//app:lib")]
    #[case("//app/core:lib#infer")]
    #[case("//:top#a,b,c")]
    #[case("//third-party/zlib:zlib#linux-x86_64,shared")]
    fn canonical_text_round_trips(#[case] raw: &str) {
        let target: BuildTarget = raw.parse().expect("parse");
        assert_eq!(target.to_string(), raw);
    }

    #[rstest]
    fn flavours_are_rendered_sorted() {
        let target: BuildTarget = "//app:lib#zeta,alpha".parse().expect("parse");
        assert_eq!(target.to_string(), "//app:lib#alpha,zeta");
    }

    #[rstest]
    #[case("app:lib", TargetParseError::MissingPrefix { input: "app:lib".into() })]
    #[case("//app", TargetParseError::MissingName { input: "//app".into() })]
    #[case("//app:", TargetParseError::InvalidName { input: "//app:".into() })]
    #[case("//app:lib#", TargetParseError::EmptyFlavourList { input: "//app:lib#".into() })]
    #[case("//app:lib#a,,b", TargetParseError::InvalidFlavour { flavour: String::new() })]
    #[case("//app:lib#a b", TargetParseError::InvalidFlavour { flavour: "a b".into() })]
    fn malformed_targets_are_rejected(#[case] raw: &str, #[case] expected: TargetParseError) {
        let err = raw.parse::<BuildTarget>().expect_err("should fail");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn unflavoured_rejects_flavour_suffix() {
        let err = "//app:lib#x"
            .parse::<UnflavouredTarget>()
            .expect_err("should fail");
        assert!(matches!(err, TargetParseError::InvalidName { .. }));
    }
}
