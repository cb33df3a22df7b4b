//! Swift library meta rule.

use std::sync::Arc;

use camino::Utf8PathBuf;
use indexmap::{IndexMap, IndexSet};

use crate::capability::{
    LinkStyle, Linkage, NativeLinkable, NativeLinkableInput, PreprocessorDep, PreprocessorInput,
    TransitiveInput, TransitiveInputCache, compute_transitive_input,
};
use crate::error::Result;
use crate::graph::{PlatformFilter, SwiftLibraryArgs};
use crate::platform::CxxPlatform;
use crate::registry::{BuildRule, RuleId, RuleKind, TypedRule};
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;

use super::{
    SWIFT_COMPANION_FLAVOUR, SwiftCompile, SwiftLink, SwiftRuntimeLinkable, builds_swift,
    compile_target, link_target,
};

/// The rule of a bare or companion `swift_library` target.
///
/// Builds nothing itself. Capability queries derive the per-platform
/// [`SwiftCompile`] and [`SwiftLink`] rules on demand.
#[derive(Debug)]
pub struct SwiftLibrary {
    target: BuildTarget,
    args: SwiftLibraryArgs,
    declared: Vec<RuleId>,
    exported: Vec<RuleId>,
    deps: Vec<RuleId>,
    platforms: PlatformFilter,
    preprocessor_cache: TransitiveInputCache,
}

impl SwiftLibrary {
    /// Require the library's dependencies and build the node.
    ///
    /// # Errors
    ///
    /// Propagates failures from dependencies.
    pub fn new(
        resolver: &RuleResolver,
        target: &BuildTarget,
        args: &SwiftLibraryArgs,
        platforms: PlatformFilter,
    ) -> Result<Self> {
        let declared = resolver.require_all(&args.deps)?;
        let exported = resolver.require_all(&args.exported_deps)?;
        let deps = declared
            .iter()
            .chain(&exported)
            .copied()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        Ok(Self {
            target: target.clone(),
            args: args.clone(),
            declared,
            exported,
            deps,
            platforms,
            preprocessor_cache: TransitiveInputCache::default(),
        })
    }

    /// Whether the library builds for `platform`: the platform has a Swift
    /// toolchain and matches `supported_platforms_regex`.
    #[must_use]
    pub fn supports(&self, platform: &CxxPlatform) -> bool {
        builds_swift(&self.platforms, platform)
    }

    /// Whether this is a companion library.
    #[must_use]
    pub fn is_companion(&self) -> bool {
        self.target.has_flavour(&SWIFT_COMPANION_FLAVOUR)
    }

    /// Declared and exported dependencies needed at run time.
    #[must_use]
    pub fn runtime_deps(&self) -> &[RuleId] {
        &self.deps
    }

    /// Require the compile rule for `platform`.
    ///
    /// # Errors
    ///
    /// Propagates failures from the compile rule.
    pub fn require_compile(
        &self,
        resolver: &RuleResolver,
        platform: &CxxPlatform,
    ) -> Result<(RuleId, Arc<SwiftCompile>)> {
        resolver.require_typed::<SwiftCompile>(&compile_target(&self.target, platform))
    }

    /// Require the shared link rule for `platform`.
    ///
    /// # Errors
    ///
    /// Propagates failures from the link rule.
    pub fn require_link(
        &self,
        resolver: &RuleResolver,
        platform: &CxxPlatform,
    ) -> Result<(RuleId, Arc<SwiftLink>)> {
        resolver.require_typed::<SwiftLink>(&link_target(&self.target, platform))
    }

    fn supported_or_empty(&self, platform: &CxxPlatform, ids: &[RuleId]) -> Vec<RuleId> {
        if self.supports(platform) {
            ids.to_vec()
        } else {
            Vec::new()
        }
    }
}

impl BuildRule for SwiftLibrary {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        Self::KIND
    }

    fn build_deps(&self) -> &[RuleId] {
        &self.deps
    }

    fn as_native_linkable(&self) -> Option<&dyn NativeLinkable> {
        Some(self)
    }

    fn as_preprocessor_dep(&self) -> Option<&dyn PreprocessorDep> {
        Some(self)
    }
}

impl TypedRule for SwiftLibrary {
    const KIND: RuleKind = RuleKind::SwiftLibrary;
}

impl NativeLinkable for SwiftLibrary {
    fn linkable_target(&self) -> &BuildTarget {
        &self.target
    }

    fn native_linkable_deps(&self, platform: &CxxPlatform) -> Vec<RuleId> {
        self.supported_or_empty(platform, &self.declared)
    }

    fn native_linkable_exported_deps(&self, platform: &CxxPlatform) -> Vec<RuleId> {
        self.supported_or_empty(platform, &self.exported)
    }

    fn synthetic_linkable_deps(&self, platform: &CxxPlatform) -> Vec<Arc<dyn NativeLinkable>> {
        match &platform.swift {
            Some(swift) if self.supports(platform) => {
                vec![Arc::new(SwiftRuntimeLinkable::new(platform, swift.clone()))]
            }
            _ => Vec::new(),
        }
    }

    fn preferred_linkage(&self, _platform: &CxxPlatform) -> Linkage {
        if self.is_companion() {
            Linkage::Static
        } else {
            self.args.linkage
        }
    }

    fn native_linkable_input(
        &self,
        platform: &CxxPlatform,
        style: LinkStyle,
        resolver: &RuleResolver,
    ) -> Result<NativeLinkableInput> {
        if !self.supports(platform) {
            return Ok(NativeLinkableInput::default());
        }
        let (_, compile) = self.require_compile(resolver, platform)?;
        let mut args = compile.ast_link_args();
        if self.preferred_linkage(platform).links_shared(style) {
            let (_, link) = self.require_link(resolver, platform)?;
            if let Some(output) = link.output() {
                args.push(output.to_string());
            }
        } else {
            args.extend(compile.objects().iter().map(ToString::to_string));
        }
        Ok(NativeLinkableInput {
            args,
            frameworks: self.args.frameworks.clone(),
            libraries: self.args.libraries.clone(),
        })
    }

    fn shared_libraries(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<IndexMap<String, Utf8PathBuf>> {
        if !self.supports(platform) {
            return Ok(IndexMap::new());
        }
        let (_, link) = self.require_link(resolver, platform)?;
        let mut libraries = IndexMap::new();
        if let Some(output) = link.output() {
            libraries.insert(link.soname().to_owned(), output.to_owned());
        }
        Ok(libraries)
    }
}

impl PreprocessorDep for SwiftLibrary {
    fn preprocessor_target(&self) -> &BuildTarget {
        &self.target
    }

    fn preprocessor_deps(
        &self,
        platform: &CxxPlatform,
        _resolver: &RuleResolver,
    ) -> Result<Vec<RuleId>> {
        Ok(self.supported_or_empty(platform, &self.deps))
    }

    fn preprocessor_input(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<PreprocessorInput> {
        if !self.supports(platform) {
            return Ok(PreprocessorInput::EMPTY);
        }
        let (id, compile) = self.require_compile(resolver, platform)?;
        Ok(match compile.output() {
            Some(dir) => PreprocessorInput::with_include(dir, Some(id)),
            None => PreprocessorInput::EMPTY,
        })
    }

    fn transitive_preprocessor_input(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<Arc<TransitiveInput>> {
        if self.is_companion() {
            let own = self.preprocessor_input(platform, resolver)?;
            return Ok(Arc::new(TransitiveInput::from([(self.target.clone(), own)])));
        }
        if !self.supports(platform) {
            return Ok(Arc::default());
        }
        self.preprocessor_cache.get_or_compute(&platform.name, || {
            compute_transitive_input(self, platform, resolver)
        })
    }
}
