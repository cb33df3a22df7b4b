//! Header and preprocessor flag propagation.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::error::Result;
use crate::platform::CxxPlatform;
use crate::registry::{RuleId, recover};
use crate::resolver::RuleResolver;
use crate::target::{BuildTarget, Flavour};

/// How an include directory is passed to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeKind {
    /// `-I`
    Local,
    /// `-isystem`
    System,
}

/// An include directory contributed by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IncludeDir {
    /// Flag style.
    pub kind: IncludeKind,
    /// Directory path.
    pub path: Utf8PathBuf,
}

impl IncludeDir {
    /// A local (`-I`) include directory.
    #[must_use]
    pub fn local(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind: IncludeKind::Local,
            path: path.into(),
        }
    }

    /// A system (`-isystem`) include directory.
    #[must_use]
    pub fn system(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind: IncludeKind::System,
            path: path.into(),
        }
    }

    fn push_args(&self, args: &mut Vec<String>) {
        match self.kind {
            IncludeKind::Local => args.push(format!("-I{}", self.path)),
            IncludeKind::System => {
                args.push("-isystem".to_owned());
                args.push(self.path.to_string());
            }
        }
    }
}

/// Preprocessor contribution of a single rule.
///
/// Recomputed on demand and never registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreprocessorInput {
    /// Raw preprocessor flags.
    pub flags: Vec<String>,
    /// Include directories in search order.
    pub include_dirs: Vec<IncludeDir>,
    /// Framework search paths.
    pub frameworks: Vec<Utf8PathBuf>,
    /// Rules that must be built before the headers are usable.
    pub rules: Vec<RuleId>,
}

impl PreprocessorInput {
    /// The empty contribution.
    pub const EMPTY: Self = Self {
        flags: Vec::new(),
        include_dirs: Vec::new(),
        frameworks: Vec::new(),
        rules: Vec::new(),
    };

    /// Contribution consisting of a single local include directory.
    #[must_use]
    pub fn with_include(dir: impl Into<Utf8PathBuf>, rule: Option<RuleId>) -> Self {
        Self {
            include_dirs: vec![IncludeDir::local(dir)],
            rules: rule.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Whether the input contributes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
            && self.include_dirs.is_empty()
            && self.frameworks.is_empty()
            && self.rules.is_empty()
    }

    /// Merge inputs in order.
    ///
    /// Flags are concatenated verbatim. Include directories, frameworks and
    /// rules keep their first occurrence.
    #[must_use]
    pub fn concat<'a>(inputs: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut flags = Vec::new();
        let mut include_dirs = IndexSet::new();
        let mut frameworks = IndexSet::new();
        let mut rules = IndexSet::new();
        for input in inputs {
            flags.extend(input.flags.iter().cloned());
            include_dirs.extend(input.include_dirs.iter().cloned());
            frameworks.extend(input.frameworks.iter().cloned());
            rules.extend(input.rules.iter().copied());
        }
        Self {
            flags,
            include_dirs: include_dirs.into_iter().collect(),
            frameworks: frameworks.into_iter().collect(),
            rules: rules.into_iter().collect(),
        }
    }

    /// Compiler arguments for the include directories and frameworks.
    #[must_use]
    pub fn include_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for dir in &self.include_dirs {
            dir.push_args(&mut args);
        }
        for framework in &self.frameworks {
            args.push(format!("-F{}", framework_dir(framework)));
        }
        args
    }

    /// Flags followed by include arguments.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = self.flags.clone();
        args.extend(self.include_args());
        args
    }
}

fn framework_dir(framework: &Utf8Path) -> &Utf8Path {
    framework.parent().unwrap_or(framework)
}

/// Per-target preprocessor inputs, ordered from the requesting rule outward.
pub type TransitiveInput = IndexMap<BuildTarget, PreprocessorInput>;

/// A rule whose headers and flags propagate to dependents.
pub trait PreprocessorDep: Send + Sync {
    /// Identity keying this rule's entry in transitive maps.
    fn preprocessor_target(&self) -> &BuildTarget;

    /// Dependencies whose preprocessor input propagates through this rule.
    ///
    /// # Errors
    ///
    /// Implementations that derive rules may fail while requiring them.
    fn preprocessor_deps(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<Vec<RuleId>>;

    /// This rule's own contribution. Empty on unsupported platforms.
    ///
    /// # Errors
    ///
    /// Implementations that derive rules may fail while requiring them.
    fn preprocessor_input(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<PreprocessorInput>;

    /// This rule's contribution followed by that of every transitive
    /// dependency, first occurrence winning.
    ///
    /// # Errors
    ///
    /// Propagates failures from dependencies.
    fn transitive_preprocessor_input(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<Arc<TransitiveInput>>;
}

/// Build the transitive map for `node` from scratch.
///
/// Implementations of [`PreprocessorDep::transitive_preprocessor_input`]
/// usually wrap this in a [`TransitiveInputCache`].
///
/// # Errors
///
/// Propagates failures from `node` and its dependencies.
pub fn compute_transitive_input(
    node: &dyn PreprocessorDep,
    platform: &CxxPlatform,
    resolver: &RuleResolver,
) -> Result<TransitiveInput> {
    let mut map = TransitiveInput::new();
    map.insert(
        node.preprocessor_target().clone(),
        node.preprocessor_input(platform, resolver)?,
    );
    let deps = node.preprocessor_deps(platform, resolver)?;
    merge_dependency_inputs(&mut map, &deps, platform, resolver)?;
    Ok(map)
}

/// Merge the transitive maps of every capability-bearing rule in `deps`.
///
/// # Errors
///
/// Propagates failures from the dependencies.
pub fn transitive_preprocessor_input_of(
    deps: &[RuleId],
    platform: &CxxPlatform,
    resolver: &RuleResolver,
) -> Result<TransitiveInput> {
    let mut map = TransitiveInput::new();
    merge_dependency_inputs(&mut map, deps, platform, resolver)?;
    Ok(map)
}

fn merge_dependency_inputs(
    map: &mut TransitiveInput,
    deps: &[RuleId],
    platform: &CxxPlatform,
    resolver: &RuleResolver,
) -> Result<()> {
    for id in deps {
        let rule = resolver.rule(*id)?;
        let Some(dep) = rule.as_preprocessor_dep() else {
            continue;
        };
        for (target, input) in dep.transitive_preprocessor_input(platform, resolver)?.iter() {
            map.entry(target.clone()).or_insert_with(|| input.clone());
        }
    }
    Ok(())
}

/// Node-owned memo of transitive inputs keyed by platform flavour.
#[derive(Debug, Default)]
pub struct TransitiveInputCache {
    entries: Mutex<HashMap<Flavour, Arc<TransitiveInput>>>,
}

impl TransitiveInputCache {
    /// Return the cached map for `platform`, computing it on first use.
    ///
    /// The computation runs without the cache lock held so that it may
    /// consult other nodes' caches. When two threads race, the first stored
    /// result wins.
    ///
    /// # Errors
    ///
    /// Propagates failures from `compute`; nothing is cached on failure.
    pub fn get_or_compute<F>(&self, platform: &Flavour, compute: F) -> Result<Arc<TransitiveInput>>
    where
        F: FnOnce() -> Result<TransitiveInput>,
    {
        if let Some(hit) = recover(self.entries.lock(), "preprocessor cache").get(platform) {
            return Ok(Arc::clone(hit));
        }
        let computed = Arc::new(compute()?);
        let mut entries = recover(self.entries.lock(), "preprocessor cache");
        Ok(Arc::clone(
            entries.entry(platform.clone()).or_insert(computed),
        ))
    }

    /// Number of cached platforms.
    #[must_use]
    pub fn len(&self) -> usize {
        recover(self.entries.lock(), "preprocessor cache").len()
    }

    /// Whether nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn concat_keeps_first_include_and_all_flags() {
        let a = PreprocessorInput {
            flags: vec!["-DA".into()],
            include_dirs: vec![IncludeDir::local("x"), IncludeDir::system("y")],
            ..PreprocessorInput::default()
        };
        let b = PreprocessorInput {
            flags: vec!["-DA".into(), "-DB".into()],
            include_dirs: vec![IncludeDir::local("x"), IncludeDir::local("z")],
            ..PreprocessorInput::default()
        };
        let merged = PreprocessorInput::concat([&a, &b]);
        assert_eq!(merged.flags, vec!["-DA", "-DA", "-DB"]);
        assert_eq!(
            merged.include_args(),
            vec!["-Ix", "-isystem", "y", "-Iz"]
        );
    }

    #[rstest]
    fn empty_constant_is_empty() {
        assert!(PreprocessorInput::EMPTY.is_empty());
        assert!(!PreprocessorInput::with_include("inc", None).is_empty());
    }

    #[rstest]
    fn framework_args_use_parent_directory() {
        let input = PreprocessorInput {
            frameworks: vec![Utf8PathBuf::from("sdk/Foundation.framework")],
            ..PreprocessorInput::default()
        };
        assert_eq!(input.include_args(), vec!["-Fsdk"]);
    }

    #[rstest]
    fn cache_computes_once_per_platform() {
        let cache = TransitiveInputCache::default();
        let linux = Flavour::from_static("linux");
        let mut calls = 0;
        for _ in 0..3 {
            cache
                .get_or_compute(&linux, || {
                    calls += 1;
                    Ok(TransitiveInput::new())
                })
                .expect("compute");
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn cache_skips_failed_computation() {
        let cache = TransitiveInputCache::default();
        let linux = Flavour::from_static("linux");
        let result = cache.get_or_compute(&linux, || {
            Err(crate::error::DeriveError::UnknownPlatform {
                flavour: linux.clone(),
            })
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
