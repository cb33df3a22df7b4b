//! Build target identities and flavour tags.
//!
//! A [`BuildTarget`] couples an [`UnflavouredTarget`] (`//path:name`) with an
//! ordered set of [`Flavour`] tags. Flavours select a variant of the rule
//! behind the base target (a platform, an analysis stage, a shared link)
//! without duplicating the target definition. The canonical text form is
//! `//path:name#flavour1,flavour2` with flavours sorted by name.
//!
//! ```
//! use kasane::target::{BuildTarget, Flavour};
//!
//! let target: BuildTarget = "//app:lib#infer,linux".parse().expect("parse");
//! assert!(target.has_flavour(&Flavour::from_static("infer")));
//! let clean = target.without_flavours([&Flavour::from_static("infer")]);
//! assert_eq!(clean.to_string(), "//app:lib#linux");
//! ```

use std::{borrow::Cow, collections::BTreeSet, fmt};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use sha2::{Digest, Sha256};

mod parse;

pub use parse::TargetParseError;

/// Atomic modifier tag attached to a [`BuildTarget`].
///
/// Flavour names are restricted to ASCII alphanumerics plus `_`, `.` and `-`
/// so that the canonical text form of a target stays parseable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Flavour(Cow<'static, str>);

impl Flavour {
    /// Create a flavour from a compile-time name.
    ///
    /// The name is not validated; only use this for constants.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create a flavour, validating its name.
    ///
    /// # Errors
    ///
    /// Returns [`TargetParseError::InvalidFlavour`] when `name` is empty or
    /// contains characters outside `[A-Za-z0-9_.-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, TargetParseError> {
        let owned = name.into();
        if Self::is_valid_name(&owned) {
            Ok(Self(Cow::Owned(owned)))
        } else {
            Err(TargetParseError::InvalidFlavour { flavour: owned })
        }
    }

    /// Build a flavour from arbitrary text by replacing invalid characters
    /// with `_`.
    ///
    /// ```
    /// use kasane::target::Flavour;
    /// assert_eq!(Flavour::sanitised("src/a b.c").as_str(), "src_a_b.c");
    /// ```
    #[must_use]
    pub fn sanitised(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .map(|c| if is_flavour_char(c) { c } else { '_' })
            .collect();
        if cleaned.is_empty() {
            Self(Cow::Borrowed("_"))
        } else {
            Self(Cow::Owned(cleaned))
        }
    }

    /// Report whether `name` is a valid flavour name.
    #[must_use]
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && name.chars().all(is_flavour_char)
    }

    /// Borrow the flavour name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const fn is_flavour_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

impl fmt::Display for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A target name without flavours: `//base/path:short_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnflavouredTarget {
    base_path: String,
    short_name: String,
}

impl UnflavouredTarget {
    /// Create a target from its base path (including the leading `//`) and
    /// short name.
    ///
    /// # Errors
    ///
    /// Returns a [`TargetParseError`] when the base path lacks the `//`
    /// prefix or the short name is empty or contains `:` or `#`.
    pub fn new(
        base_path: impl Into<String>,
        short_name: impl Into<String>,
    ) -> Result<Self, TargetParseError> {
        let base = base_path.into();
        let name = short_name.into();
        if !base.starts_with("//") {
            return Err(TargetParseError::MissingPrefix {
                input: format!("{base}:{name}"),
            });
        }
        if name.is_empty() || name.contains([':', '#']) {
            return Err(TargetParseError::InvalidName {
                input: format!("{base}:{name}"),
            });
        }
        Ok(Self {
            base_path: base,
            short_name: name,
        })
    }

    /// Create a target from compile-time parts without validation.
    ///
    /// Only use this for constants; see [`UnflavouredTarget::new`].
    #[must_use]
    pub fn from_static(base_path: &'static str, short_name: &'static str) -> Self {
        Self {
            base_path: base_path.to_owned(),
            short_name: short_name.to_owned(),
        }
    }

    /// The `//`-prefixed base path.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The short name after the `:`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }
}

impl fmt::Display for UnflavouredTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base_path, self.short_name)
    }
}

/// A fully qualified build identity: an [`UnflavouredTarget`] plus flavours.
///
/// Equality and hashing consider the base target and the flavour *set*;
/// insertion order of flavours is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTarget {
    unflavoured: UnflavouredTarget,
    flavours: BTreeSet<Flavour>,
}

impl BuildTarget {
    /// Wrap an unflavoured target with an empty flavour set.
    #[must_use]
    pub const fn of(unflavoured: UnflavouredTarget) -> Self {
        Self {
            unflavoured,
            flavours: BTreeSet::new(),
        }
    }

    /// The base target without flavours.
    #[must_use]
    pub const fn unflavoured(&self) -> &UnflavouredTarget {
        &self.unflavoured
    }

    /// The flavours in canonical order.
    #[must_use]
    pub const fn flavours(&self) -> &BTreeSet<Flavour> {
        &self.flavours
    }

    /// Report whether the target carries any flavour.
    #[must_use]
    pub fn is_flavoured(&self) -> bool {
        !self.flavours.is_empty()
    }

    /// Report whether the target carries `flavour`.
    #[must_use]
    pub fn has_flavour(&self, flavour: &Flavour) -> bool {
        self.flavours.contains(flavour)
    }

    /// Return a copy with `flavours` added. Flavours already present are
    /// ignored. No domain validation is performed; see
    /// [`FlavourDomain::with_flavours`](crate::flavour::FlavourDomain::with_flavours)
    /// for the checked variant.
    #[must_use]
    pub fn with_appended_flavours(&self, flavours: impl IntoIterator<Item = Flavour>) -> Self {
        let mut next = self.clone();
        next.flavours.extend(flavours);
        next
    }

    /// Return a copy with every flavour in `flavours` removed.
    #[must_use]
    pub fn without_flavours<'a>(&self, flavours: impl IntoIterator<Item = &'a Flavour>) -> Self {
        let mut next = self.clone();
        for flavour in flavours {
            next.flavours.remove(flavour);
        }
        next
    }

    /// Return the target with all flavours removed.
    #[must_use]
    pub fn without_all_flavours(&self) -> Self {
        Self::of(self.unflavoured.clone())
    }

    /// Stable SHA-256 digest of the canonical text form.
    ///
    /// Suitable as a cache key across process runs because the text form
    /// orders flavours canonically.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Directory under `out_root` reserved for the outputs of this target.
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use kasane::target::BuildTarget;
    ///
    /// let target: BuildTarget = "//app/core:lib#infer".parse().expect("parse");
    /// let dir = target.output_dir(Utf8Path::new("kasane-out"));
    /// assert_eq!(dir.as_str(), "kasane-out/gen/app/core/lib#infer");
    /// ```
    #[must_use]
    pub fn output_dir(&self, out_root: &Utf8Path) -> Utf8PathBuf {
        let mut dir = out_root.join("gen");
        let relative = self.unflavoured.base_path.trim_start_matches('/');
        if !relative.is_empty() {
            dir.push(relative);
        }
        dir.push(self.leaf_name());
        dir
    }

    fn leaf_name(&self) -> String {
        if self.flavours.is_empty() {
            self.unflavoured.short_name.clone()
        } else {
            format!(
                "{}#{}",
                self.unflavoured.short_name,
                self.flavours.iter().join(",")
            )
        }
    }
}

impl From<UnflavouredTarget> for BuildTarget {
    fn from(value: UnflavouredTarget) -> Self {
        Self::of(value)
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unflavoured)?;
        if !self.flavours.is_empty() {
            write!(f, "#{}", self.flavours.iter().join(","))?;
        }
        Ok(())
    }
}

impl Serialize for Flavour {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Flavour {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(D::Error::custom)
    }
}

impl Serialize for BuildTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BuildTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

impl Serialize for UnflavouredTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UnflavouredTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn target(raw: &str) -> BuildTarget {
        raw.parse().expect("valid target")
    }

    #[rstest]
    fn flavour_order_is_not_significant() {
        let a = target("//app:lib").with_appended_flavours([
            Flavour::from_static("zeta"),
            Flavour::from_static("alpha"),
        ]);
        let b = target("//app:lib").with_appended_flavours([
            Flavour::from_static("alpha"),
            Flavour::from_static("zeta"),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "//app:lib#alpha,zeta");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[rstest]
    fn fingerprint_distinguishes_flavours() {
        let plain = target("//app:lib");
        let flavoured = target("//app:lib#infer");
        assert_ne!(plain.fingerprint(), flavoured.fingerprint());
        assert_eq!(plain.fingerprint().len(), 64);
    }

    #[rstest]
    fn removing_absent_flavour_is_a_no_op() {
        let base = target("//app:lib#linux");
        let stripped = base.without_flavours([&Flavour::from_static("infer")]);
        assert_eq!(stripped, base);
    }

    #[rstest]
    #[case("//:root", "kasane-out/gen/root")]
    #[case("//a/b:c#x,y", "kasane-out/gen/a/b/c#x,y")]
    fn output_dir_layout(#[case] raw: &str, #[case] expected: &str) {
        let dir = target(raw).output_dir(Utf8Path::new("kasane-out"));
        assert_eq!(dir.as_str(), expected);
    }

    #[rstest]
    fn serde_uses_canonical_text() {
        let json = serde_json::to_string(&target("//app:lib#b,a")).expect("serialise");
        assert_eq!(json, "\"//app:lib#a,b\"");
        let back: BuildTarget = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, target("//app:lib#a,b"));
    }
}
