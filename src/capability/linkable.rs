//! Native link participation.
//!
//! [`NativeLinkable`] is implemented by every rule that contributes objects,
//! archives or shared libraries to a native link. [`collect_link_input`]
//! walks the linkable graph below a set of roots and concatenates their
//! contributions in a deterministic order.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use camino::Utf8PathBuf;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::platform::CxxPlatform;
use crate::registry::RuleId;
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;
use crate::traversal::breadth_first;

/// Linkage a library prefers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Follow the consumer's link style.
    #[default]
    Any,
    /// Always link statically.
    Static,
    /// Always link as a shared library.
    Shared,
}

impl Linkage {
    /// Whether a consumer linking with `style` links this dependency shared.
    ///
    /// ```
    /// use kasane::capability::{LinkStyle, Linkage};
    ///
    /// assert!(Linkage::Any.links_shared(LinkStyle::Shared));
    /// assert!(!Linkage::Any.links_shared(LinkStyle::StaticPic));
    /// assert!(Linkage::Shared.links_shared(LinkStyle::Static));
    /// ```
    #[must_use]
    pub const fn links_shared(self, style: LinkStyle) -> bool {
        match self {
            Self::Static => false,
            Self::Shared => true,
            Self::Any => matches!(style, LinkStyle::Shared),
        }
    }
}

/// How a consumer links its dependencies.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum LinkStyle {
    /// Static archives.
    #[default]
    Static,
    /// Position-independent static archives.
    StaticPic,
    /// Shared libraries.
    Shared,
}

/// A link contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NativeLinkableInput {
    /// Linker arguments in order.
    pub args: Vec<String>,
    /// Frameworks to link.
    pub frameworks: Vec<String>,
    /// Named system libraries to link.
    pub libraries: Vec<String>,
}

impl NativeLinkableInput {
    /// Merge inputs in order. Arguments are concatenated verbatim while
    /// frameworks and libraries keep their first occurrence.
    #[must_use]
    pub fn concat(inputs: impl IntoIterator<Item = Self>) -> Self {
        let mut args = Vec::new();
        let mut frameworks = IndexSet::new();
        let mut libraries = IndexSet::new();
        for input in inputs {
            args.extend(input.args);
            frameworks.extend(input.frameworks);
            libraries.extend(input.libraries);
        }
        Self {
            args,
            frameworks: frameworks.into_iter().collect(),
            libraries: libraries.into_iter().collect(),
        }
    }

    /// Whether the input contributes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.frameworks.is_empty() && self.libraries.is_empty()
    }

    /// Full linker command-line fragment.
    #[must_use]
    pub fn link_args(&self) -> Vec<String> {
        let mut out = self.args.clone();
        for framework in &self.frameworks {
            out.push("-framework".to_owned());
            out.push(framework.clone());
        }
        out.extend(self.libraries.iter().map(|lib| format!("-l{lib}")));
        out
    }
}

/// A rule participating in native links.
pub trait NativeLinkable: fmt::Debug + Send + Sync {
    /// Identity of the linkable.
    fn linkable_target(&self) -> &BuildTarget;

    /// Declared dependencies that may be linkable.
    fn native_linkable_deps(&self, platform: &CxxPlatform) -> Vec<RuleId>;

    /// Dependencies re-exported to consumers, even across a shared link.
    fn native_linkable_exported_deps(&self, platform: &CxxPlatform) -> Vec<RuleId>;

    /// Linkables that exist only as link inputs and are never registered.
    fn synthetic_linkable_deps(&self, _platform: &CxxPlatform) -> Vec<Arc<dyn NativeLinkable>> {
        Vec::new()
    }

    /// Linkage this rule prefers on `platform`.
    fn preferred_linkage(&self, platform: &CxxPlatform) -> Linkage;

    /// Contribution to a link with `style`. Empty on unsupported platforms.
    ///
    /// # Errors
    ///
    /// Implementations that derive rules may fail while requiring them.
    fn native_linkable_input(
        &self,
        platform: &CxxPlatform,
        style: LinkStyle,
        resolver: &RuleResolver,
    ) -> Result<NativeLinkableInput>;

    /// Shared libraries keyed by soname. Empty on unsupported platforms.
    ///
    /// # Errors
    ///
    /// Implementations that derive rules may fail while requiring them.
    fn shared_libraries(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<IndexMap<String, Utf8PathBuf>>;
}

/// A node in the linkable graph.
#[derive(Debug, Clone)]
pub enum LinkableDep {
    /// A registered rule, which may or may not be linkable.
    Rule(RuleId),
    /// A synthetic linkable owned by its parent.
    Synthetic(Arc<dyn NativeLinkable>),
}

impl PartialEq for LinkableDep {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Rule(a), Self::Rule(b)) => a == b,
            (Self::Synthetic(a), Self::Synthetic(b)) => a.linkable_target() == b.linkable_target(),
            _ => false,
        }
    }
}

impl Eq for LinkableDep {}

impl Hash for LinkableDep {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Rule(id) => {
                0_u8.hash(state);
                id.hash(state);
            }
            Self::Synthetic(linkable) => {
                1_u8.hash(state);
                linkable.linkable_target().hash(state);
            }
        }
    }
}

/// Declared, exported and synthetic dependencies of `linkable`, in that
/// order, without duplicates.
#[must_use]
pub fn linkable_deps(linkable: &dyn NativeLinkable, platform: &CxxPlatform) -> Vec<LinkableDep> {
    let declared = linkable.native_linkable_deps(platform);
    exposed_deps(linkable, platform, declared)
}

fn exposed_deps(
    linkable: &dyn NativeLinkable,
    platform: &CxxPlatform,
    declared: Vec<RuleId>,
) -> Vec<LinkableDep> {
    let mut deps: IndexSet<LinkableDep> = declared.into_iter().map(LinkableDep::Rule).collect();
    deps.extend(
        linkable
            .native_linkable_exported_deps(platform)
            .into_iter()
            .map(LinkableDep::Rule),
    );
    deps.extend(
        linkable
            .synthetic_linkable_deps(platform)
            .into_iter()
            .map(LinkableDep::Synthetic),
    );
    deps.into_iter().collect()
}

/// Concatenate the link inputs of every linkable reachable from `roots`.
///
/// The walk is breadth first in declared order. A dependency linked shared
/// only exposes its exported and synthetic dependencies, since its declared
/// ones are already inside the shared library. Rules without the linkable
/// capability are skipped along with everything below them.
///
/// # Errors
///
/// Propagates failures from linkables.
pub fn collect_link_input(
    roots: &[RuleId],
    platform: &CxxPlatform,
    style: LinkStyle,
    resolver: &RuleResolver,
) -> Result<NativeLinkableInput> {
    let mut inputs = Vec::new();
    breadth_first(roots.iter().copied().map(LinkableDep::Rule), |dep| {
        match dep {
            LinkableDep::Rule(id) => {
                let rule = resolver.rule(*id)?;
                match rule.as_native_linkable() {
                    Some(linkable) => visit(linkable, platform, style, resolver, &mut inputs),
                    None => Ok(Vec::new()),
                }
            }
            LinkableDep::Synthetic(linkable) => {
                visit(linkable.as_ref(), platform, style, resolver, &mut inputs)
            }
        }
    })?;
    Ok(NativeLinkableInput::concat(inputs))
}

fn visit(
    linkable: &dyn NativeLinkable,
    platform: &CxxPlatform,
    style: LinkStyle,
    resolver: &RuleResolver,
    inputs: &mut Vec<NativeLinkableInput>,
) -> Result<Vec<LinkableDep>> {
    inputs.push(linkable.native_linkable_input(platform, style, resolver)?);
    let declared = if linkable.preferred_linkage(platform).links_shared(style) {
        Vec::new()
    } else {
        linkable.native_linkable_deps(platform)
    };
    Ok(exposed_deps(linkable, platform, declared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Linkage::Any, LinkStyle::Static, false)]
    #[case(Linkage::Any, LinkStyle::StaticPic, false)]
    #[case(Linkage::Any, LinkStyle::Shared, true)]
    #[case(Linkage::Static, LinkStyle::Shared, false)]
    #[case(Linkage::Shared, LinkStyle::Static, true)]
    fn linkage_resolution(#[case] linkage: Linkage, #[case] style: LinkStyle, #[case] shared: bool) {
        assert_eq!(linkage.links_shared(style), shared);
    }

    #[rstest]
    fn concat_dedups_libraries_but_not_args() {
        let a = NativeLinkableInput {
            args: vec!["a.o".into()],
            frameworks: vec!["Foundation".into()],
            libraries: vec!["m".into()],
        };
        let b = NativeLinkableInput {
            args: vec!["a.o".into()],
            frameworks: vec!["Foundation".into()],
            libraries: vec!["m".into(), "z".into()],
        };
        let merged = NativeLinkableInput::concat([a, b]);
        assert_eq!(
            merged.link_args(),
            vec!["a.o", "a.o", "-framework", "Foundation", "-lm", "-lz"]
        );
    }

    #[derive(Debug)]
    struct Runtime(BuildTarget);

    impl NativeLinkable for Runtime {
        fn linkable_target(&self) -> &BuildTarget {
            &self.0
        }
        fn native_linkable_deps(&self, _: &CxxPlatform) -> Vec<RuleId> {
            Vec::new()
        }
        fn native_linkable_exported_deps(&self, _: &CxxPlatform) -> Vec<RuleId> {
            Vec::new()
        }
        fn preferred_linkage(&self, _: &CxxPlatform) -> Linkage {
            Linkage::Shared
        }
        fn native_linkable_input(
            &self,
            _: &CxxPlatform,
            _: LinkStyle,
            _: &RuleResolver,
        ) -> Result<NativeLinkableInput> {
            Ok(NativeLinkableInput::default())
        }
        fn shared_libraries(
            &self,
            _: &CxxPlatform,
            _: &RuleResolver,
        ) -> Result<IndexMap<String, Utf8PathBuf>> {
            Ok(IndexMap::new())
        }
    }

    #[rstest]
    fn synthetic_deps_compare_by_target() {
        let target: BuildTarget = "//swift:runtime".parse().expect("parse");
        let a = LinkableDep::Synthetic(Arc::new(Runtime(target.clone())));
        let b = LinkableDep::Synthetic(Arc::new(Runtime(target)));
        let other = LinkableDep::Synthetic(Arc::new(Runtime(
            "//swift:other".parse().expect("parse"),
        )));
        assert_eq!(a, b);
        assert_ne!(a, other);
        let deduped: IndexSet<LinkableDep> = [a, b, other].into_iter().collect();
        assert_eq!(deduped.len(), 2);
    }
}
