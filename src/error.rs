//! Error types for rule derivation.
//!
//! Errors fall into two groups. User errors describe bad input: a target that
//! does not exist or a flavour combination a rule kind cannot build. Internal
//! errors describe broken invariants inside the derivation logic; callers
//! should abort the current request and report them as bugs.
//! [`DeriveError::is_internal`] tells the two apart.

// Module-level suppression for version-dependent lint false positives from
// miette/thiserror derive macros. The unused_assignments lint fires in some
// Rust versions but not others. FIXME: remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::flavour::FlavourError;
use crate::registry::RuleId;
use crate::target::{BuildTarget, Flavour, UnflavouredTarget};

/// Result alias used throughout the derivation engine.
pub type Result<T, E = DeriveError> = std::result::Result<T, E>;

/// Failures raised while resolving or deriving rules.
#[derive(Debug, Error, Diagnostic)]
pub enum DeriveError {
    /// The target graph has no node for the requested target.
    #[error("no rule found for target `{target}`")]
    #[diagnostic(
        code(kasane::derive::no_such_rule),
        help("check the target name and that it is declared in the graph manifest")
    )]
    NoSuchRule {
        /// The missing target.
        target: UnflavouredTarget,
    },

    /// The rule kind cannot build the requested flavour combination.
    #[error("{kind} rule `{target}` does not support flavours: {flavours}")]
    #[diagnostic(code(kasane::derive::unsupported_flavours))]
    UnsupportedFlavours {
        /// Requested target.
        target: BuildTarget,
        /// Rule kind of the target node.
        kind: &'static str,
        /// Unsupported flavours, comma separated.
        flavours: String,
    },

    /// A platform flavour or name is not configured.
    #[error("unknown platform `{flavour}`")]
    #[diagnostic(
        code(kasane::derive::unknown_platform),
        help("declare the platform under `toolchain.platforms`")
    )]
    UnknownPlatform {
        /// Platform flavour that failed to resolve.
        flavour: Flavour,
    },

    /// A supported-platforms pattern failed to compile.
    #[error("invalid supported platforms pattern `{pattern}` on `{target}`")]
    #[diagnostic(code(kasane::derive::invalid_pattern))]
    InvalidPattern {
        /// Target declaring the pattern.
        target: UnflavouredTarget,
        /// The pattern text.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Two sources of one target map to the same capture identity.
    #[error("sources `{first}` and `{second}` of `{target}` share the capture `{capture}`")]
    #[diagnostic(
        code(kasane::derive::capture_collision),
        help("rename one of the sources so their paths differ after sanitising")
    )]
    CaptureCollision {
        /// Target declaring both sources.
        target: UnflavouredTarget,
        /// Capture identity both sources map to.
        capture: BuildTarget,
        /// Source already captured under that identity.
        first: Utf8PathBuf,
        /// Source that collided with it.
        second: Utf8PathBuf,
    },

    /// A flavour domain check failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Flavour(#[from] FlavourError),

    /// A registered rule is not of the kind its caller expected.
    #[error("expected `{target}` to be a {expected} rule but found {actual}")]
    #[diagnostic(code(kasane::internal::rule_kind_mismatch))]
    RuleKindMismatch {
        /// Target of the registered rule.
        target: BuildTarget,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually registered.
        actual: &'static str,
    },

    /// A constructor returned a rule for a different target than its key.
    #[error("constructor for `{requested}` produced a rule for `{produced}`")]
    #[diagnostic(code(kasane::internal::target_mismatch))]
    TargetMismatch {
        /// Registry key being constructed.
        requested: BuildTarget,
        /// Target carried by the produced rule.
        produced: BuildTarget,
    },

    /// Constructing a rule required the same rule again.
    #[error("derivation of `{target}` requires itself")]
    #[diagnostic(code(kasane::internal::cyclic_derivation))]
    CyclicDerivation {
        /// The re-entered target.
        target: BuildTarget,
    },

    /// A stage handler received a target without one of its stage flavours.
    #[error("`{target}` reached the {stage} pipeline without a {stage} flavour")]
    #[diagnostic(code(kasane::internal::missing_stage_flavour))]
    MissingStageFlavour {
        /// Offending target.
        target: BuildTarget,
        /// Stage domain name.
        stage: String,
    },

    /// A rule handle does not refer to a registered rule.
    #[error("rule handle {id} is not registered")]
    #[diagnostic(code(kasane::internal::unknown_rule))]
    UnknownRule {
        /// The dangling handle.
        id: RuleId,
    },
}

impl DeriveError {
    /// Whether the error reports a broken invariant rather than bad input.
    ///
    /// ```
    /// use kasane::error::DeriveError;
    ///
    /// let err = DeriveError::NoSuchRule {
    ///     target: "//app:missing".parse().expect("parse"),
    /// };
    /// assert!(!err.is_internal());
    /// ```
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        match self {
            Self::Flavour(err) => err.is_internal(),
            Self::RuleKindMismatch { .. }
            | Self::TargetMismatch { .. }
            | Self::CyclicDerivation { .. }
            | Self::MissingStageFlavour { .. }
            | Self::UnknownRule { .. } => true,
            Self::NoSuchRule { .. }
            | Self::UnsupportedFlavours { .. }
            | Self::UnknownPlatform { .. }
            | Self::InvalidPattern { .. }
            | Self::CaptureCollision { .. } => false,
        }
    }
}
