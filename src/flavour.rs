//! Closed flavour domains.
//!
//! A [`FlavourDomain`] names a closed set of flavours and maps each to a
//! typed value. Derivation stages, platforms and link modes each own one.
//! Membership is checked by lookup, never by pattern matching on names.
//!
//! ```
//! use kasane::flavour::FlavourDomain;
//! use kasane::target::{BuildTarget, Flavour};
//!
//! let domain = FlavourDomain::new(
//!     "Colours",
//!     [(Flavour::from_static("red"), 1), (Flavour::from_static("blue"), 2)],
//! );
//! let target: BuildTarget = "//app:lib#red".parse().expect("parse");
//! assert_eq!(domain.value_of(&target).expect("lookup"), Some(1));
//! assert_eq!(domain.strip(&target).to_string(), "//app:lib");
//! ```

// Module-level suppression for version-dependent lint false positives from
// miette/thiserror derive macros. FIXME: remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use indexmap::IndexMap;
use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

use crate::target::{BuildTarget, Flavour};

/// Types that map onto exactly one flavour.
pub trait FlavourConvertible {
    /// The flavour representing this value.
    fn flavour(&self) -> Flavour;
}

/// Errors raised by flavour domain checks.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum FlavourError {
    /// The flavour is not a member of the domain it was offered to.
    #[error("flavour `{flavour}` is not a member of {domain}")]
    #[diagnostic(code(kasane::flavour::invalid))]
    Invalid {
        /// Rejected flavour.
        flavour: Flavour,
        /// Domain name.
        domain: String,
    },
    /// Appending would leave more than one flavour from an exclusive domain.
    #[error("target `{target}` would carry mutually exclusive {domain}: {flavours}")]
    #[diagnostic(code(kasane::flavour::mutually_exclusive))]
    MutuallyExclusive {
        /// Target the flavours were appended to.
        target: BuildTarget,
        /// Domain name.
        domain: String,
        /// Conflicting flavours, comma separated.
        flavours: String,
    },
    /// The target already carries more than one flavour of an exclusive domain.
    #[error("target `{target}` carries more than one of {domain}: {flavours}")]
    #[diagnostic(code(kasane::flavour::ambiguous))]
    Ambiguous {
        /// Offending target.
        target: BuildTarget,
        /// Domain name.
        domain: String,
        /// Conflicting flavours, comma separated.
        flavours: String,
    },
    /// A stage found one of its own flavours on a target that must be clean.
    #[error("unexpected {domain} flavour `{flavour}` on `{target}`")]
    #[diagnostic(code(kasane::flavour::unexpected))]
    Unexpected {
        /// Offending target.
        target: BuildTarget,
        /// Domain name.
        domain: String,
        /// The flavour that should not be present.
        flavour: Flavour,
    },
}

impl FlavourError {
    /// Whether the error signals a bug in derivation logic rather than bad
    /// input.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Unexpected { .. })
    }
}

/// A named, closed set of flavours with associated values.
#[derive(Debug, Clone)]
pub struct FlavourDomain<T> {
    name: String,
    values: IndexMap<Flavour, T>,
    exclusive: bool,
}

impl<T: Clone> FlavourDomain<T> {
    /// Create a mutually exclusive domain from `(flavour, value)` pairs.
    #[must_use]
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = (Flavour, T)>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().collect(),
            exclusive: true,
        }
    }

    /// Create a domain from values that know their own flavour.
    #[must_use]
    pub fn from_values(name: impl Into<String>, values: impl IntoIterator<Item = T>) -> Self
    where
        T: FlavourConvertible,
    {
        Self::new(name, values.into_iter().map(|v| (v.flavour(), v)))
    }

    /// Allow targets to carry several flavours of this domain at once.
    #[must_use]
    pub fn allowing_combinations(mut self) -> Self {
        self.exclusive = false;
        self
    }

    /// The domain's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether at most one member may appear on a target.
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Member flavours in declaration order.
    pub fn flavours(&self) -> impl Iterator<Item = &Flavour> {
        self.values.keys()
    }

    /// Member values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.values.values()
    }

    /// Whether `flavour` belongs to the domain.
    #[must_use]
    pub fn contains(&self, flavour: &Flavour) -> bool {
        self.values.contains_key(flavour)
    }

    /// Look up the value for a member flavour.
    ///
    /// # Errors
    ///
    /// Returns [`FlavourError::Invalid`] when `flavour` is not a member.
    pub fn value(&self, flavour: &Flavour) -> Result<&T, FlavourError> {
        self.values.get(flavour).ok_or_else(|| FlavourError::Invalid {
            flavour: flavour.clone(),
            domain: self.name.clone(),
        })
    }

    /// The value selected by `target`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`FlavourError::Ambiguous`] when an exclusive domain finds
    /// more than one of its flavours on the target.
    pub fn value_of(&self, target: &BuildTarget) -> Result<Option<T>, FlavourError> {
        let present: Vec<&Flavour> = self.members_on(target).collect();
        match present.as_slice() {
            [] => Ok(None),
            [only] => Ok(self.values.get(*only).cloned()),
            [first, ..] if !self.exclusive => Ok(self.values.get(*first).cloned()),
            many => Err(FlavourError::Ambiguous {
                target: target.clone(),
                domain: self.name.clone(),
                flavours: many.iter().join(","),
            }),
        }
    }

    /// Remove every member flavour from `target`. Idempotent.
    #[must_use]
    pub fn strip(&self, target: &BuildTarget) -> BuildTarget {
        target.without_flavours(self.values.keys())
    }

    /// Append member flavours to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FlavourError::Invalid`] for a non-member flavour and
    /// [`FlavourError::MutuallyExclusive`] when an exclusive domain would end
    /// up with more than one member on the target.
    pub fn with_flavours(
        &self,
        target: &BuildTarget,
        flavours: &[Flavour],
    ) -> Result<BuildTarget, FlavourError> {
        for flavour in flavours {
            self.value(flavour)?;
        }
        let next = target.with_appended_flavours(flavours.iter().cloned());
        if self.exclusive {
            let members: Vec<&Flavour> = self.members_on(&next).collect();
            if members.len() > 1 {
                return Err(FlavourError::MutuallyExclusive {
                    target: target.clone(),
                    domain: self.name.clone(),
                    flavours: members.iter().join(","),
                });
            }
        }
        Ok(next)
    }

    /// Append the flavour of a typed member value.
    ///
    /// # Errors
    ///
    /// See [`FlavourDomain::with_flavours`].
    pub fn with_value(&self, target: &BuildTarget, value: &T) -> Result<BuildTarget, FlavourError>
    where
        T: FlavourConvertible,
    {
        self.with_flavours(target, &[value.flavour()])
    }

    /// Fail if `target` carries any member flavour.
    ///
    /// Derivation stages call this on identities that must be clean of their
    /// own flavours before new ones are appended.
    ///
    /// # Errors
    ///
    /// Returns [`FlavourError::Unexpected`] naming the first offending
    /// flavour.
    pub fn assert_absent(&self, target: &BuildTarget) -> Result<(), FlavourError> {
        match self.members_on(target).next() {
            None => Ok(()),
            Some(flavour) => Err(FlavourError::Unexpected {
                target: target.clone(),
                domain: self.name.clone(),
                flavour: flavour.clone(),
            }),
        }
    }

    fn members_on<'a>(&'a self, target: &'a BuildTarget) -> impl Iterator<Item = &'a Flavour> {
        target.flavours().iter().filter(|f| self.values.contains_key(*f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Stage {
        One,
        Two,
    }

    impl FlavourConvertible for Stage {
        fn flavour(&self) -> Flavour {
            match self {
                Self::One => Flavour::from_static("stage-one"),
                Self::Two => Flavour::from_static("stage-two"),
            }
        }
    }

    #[fixture]
    fn stages() -> FlavourDomain<Stage> {
        FlavourDomain::from_values("Stage flavours", [Stage::One, Stage::Two])
    }

    fn target(raw: &str) -> BuildTarget {
        raw.parse().expect("valid target")
    }

    #[rstest]
    fn value_of_absent_is_none(stages: FlavourDomain<Stage>) {
        assert_eq!(stages.value_of(&target("//a:b#other")).expect("lookup"), None);
    }

    #[rstest]
    fn value_of_reports_ambiguity(stages: FlavourDomain<Stage>) {
        let err = stages
            .value_of(&target("//a:b#stage-one,stage-two"))
            .expect_err("ambiguous");
        assert!(matches!(err, FlavourError::Ambiguous { .. }));
    }

    #[rstest]
    fn with_flavours_rejects_non_members(stages: FlavourDomain<Stage>) {
        let err = stages
            .with_flavours(&target("//a:b"), &[Flavour::from_static("nope")])
            .expect_err("invalid");
        assert!(matches!(err, FlavourError::Invalid { .. }));
    }

    #[rstest]
    fn with_flavours_rejects_second_stage(stages: FlavourDomain<Stage>) {
        let err = stages
            .with_value(&target("//a:b#stage-one"), &Stage::Two)
            .expect_err("exclusive");
        assert!(matches!(err, FlavourError::MutuallyExclusive { .. }));
    }

    #[rstest]
    fn reappending_same_flavour_is_allowed(stages: FlavourDomain<Stage>) {
        let once = stages
            .with_value(&target("//a:b"), &Stage::One)
            .expect("append");
        let twice = stages.with_value(&once, &Stage::One).expect("append");
        assert_eq!(once, twice);
    }

    #[rstest]
    fn combinable_domain_accepts_several(stages: FlavourDomain<Stage>) {
        let open = stages.allowing_combinations();
        let both = open
            .with_flavours(
                &target("//a:b"),
                &[Stage::One.flavour(), Stage::Two.flavour()],
            )
            .expect("append");
        assert_eq!(open.value_of(&both).expect("lookup"), Some(Stage::One));
    }

    #[rstest]
    #[case("//a:b")]
    #[case("//a:b#stage-two")]
    #[case("//a:b#linux,stage-one")]
    fn strip_after_append_matches_strip(stages: FlavourDomain<Stage>, #[case] raw: &str) {
        let id = target(raw);
        let appended = id.with_appended_flavours([Stage::One.flavour()]);
        assert_eq!(stages.strip(&appended), stages.strip(&id));
        assert_eq!(stages.strip(&stages.strip(&id)), stages.strip(&id));
    }

    #[rstest]
    fn assert_absent_flags_stage_flavour(stages: FlavourDomain<Stage>) {
        assert!(stages.assert_absent(&target("//a:b#linux")).is_ok());
        let err = stages
            .assert_absent(&target("//a:b#stage-two"))
            .expect_err("unexpected");
        assert!(err.is_internal());
    }
}
