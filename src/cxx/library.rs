//! C/C++ library node.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};

use crate::capability::{
    LinkStyle, Linkage, NativeLinkable, NativeLinkableInput, PreprocessorDep, PreprocessorInput,
    TransitiveInput, TransitiveInputCache, compute_transitive_input,
};
use crate::error::Result;
use crate::flavour::FlavourConvertible;
use crate::graph::{CxxLibraryArgs, PlatformFilter};
use crate::platform::CxxPlatform;
use crate::registry::{BuildRule, RuleId, RuleKind, TypedRule};
use crate::resolver::RuleResolver;
use crate::target::{BuildTarget, Flavour};

use super::{SHARED_FLAVOUR, STATIC_FLAVOUR, exported_headers_target};

/// The unflavoured rule of a `cxx_library` target.
///
/// Acts as a preprocessor dependency and a native linkable for its
/// dependents. On platforms rejected by `supported_platforms_regex` every
/// capability query returns an empty result.
#[derive(Debug)]
pub struct CxxLibrary {
    target: BuildTarget,
    args: CxxLibraryArgs,
    declared: Vec<RuleId>,
    exported: Vec<RuleId>,
    deps: Vec<RuleId>,
    platforms: PlatformFilter,
    out_root: Utf8PathBuf,
    preprocessor_cache: TransitiveInputCache,
}

impl CxxLibrary {
    /// Require the library's dependencies and build the node.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::InvalidPattern`] for a malformed platform
    /// regex and propagates failures from dependencies.
    ///
    /// [`DeriveError::InvalidPattern`]: crate::error::DeriveError::InvalidPattern
    pub fn new(resolver: &RuleResolver, target: &BuildTarget, args: &CxxLibraryArgs) -> Result<Self> {
        let platforms = PlatformFilter::new(
            args.supported_platforms_regex.as_deref(),
            target.unflavoured(),
        )?;
        let declared = resolver.require_all(&args.common.deps)?;
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
            out_root: resolver.toolchain().out_root().to_owned(),
            preprocessor_cache: TransitiveInputCache::default(),
        })
    }

    /// Whether the library builds for `platform`.
    #[must_use]
    pub fn supports(&self, platform: &CxxPlatform) -> bool {
        self.platforms.supports(platform)
    }

    /// Path of the static archive built for `platform`.
    #[must_use]
    pub fn static_library_path(&self, platform: &CxxPlatform) -> Utf8PathBuf {
        self.flavoured(platform, STATIC_FLAVOUR)
            .output_dir(&self.out_root)
            .join(platform.static_library_name(self.short_name()))
    }

    /// Path of the shared library built for `platform`.
    #[must_use]
    pub fn shared_library_path(&self, platform: &CxxPlatform) -> Utf8PathBuf {
        self.flavoured(platform, SHARED_FLAVOUR)
            .output_dir(&self.out_root)
            .join(self.soname(platform))
    }

    /// Soname of the shared library built for `platform`.
    #[must_use]
    pub fn soname(&self, platform: &CxxPlatform) -> String {
        platform.shared_library_name(self.short_name())
    }

    fn short_name(&self) -> &str {
        self.target.unflavoured().short_name()
    }

    fn flavoured(&self, platform: &CxxPlatform, flavour: Flavour) -> BuildTarget {
        self.target.with_appended_flavours([platform.flavour(), flavour])
    }
}

impl BuildRule for CxxLibrary {
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

impl TypedRule for CxxLibrary {
    const KIND: RuleKind = RuleKind::CxxLibrary;
}

impl PreprocessorDep for CxxLibrary {
    fn preprocessor_target(&self) -> &BuildTarget {
        &self.target
    }

    fn preprocessor_deps(
        &self,
        platform: &CxxPlatform,
        _resolver: &RuleResolver,
    ) -> Result<Vec<RuleId>> {
        if !self.supports(platform) {
            return Ok(Vec::new());
        }
        Ok(self.deps.clone())
    }

    fn preprocessor_input(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<PreprocessorInput> {
        if !self.supports(platform) {
            return Ok(PreprocessorInput::EMPTY);
        }
        let mut input = if self.args.exported_headers.is_empty() {
            PreprocessorInput::default()
        } else {
            let tree = exported_headers_target(self.target.unflavoured(), platform);
            let id = resolver.require_rule(&tree)?;
            PreprocessorInput::with_include(tree.output_dir(&self.out_root), Some(id))
        };
        input.flags = self.args.exported_preprocessor_flags.clone();
        input.frameworks = self.args.common.frameworks.clone();
        Ok(input)
    }

    fn transitive_preprocessor_input(
        &self,
        platform: &CxxPlatform,
        resolver: &RuleResolver,
    ) -> Result<Arc<TransitiveInput>> {
        if !self.supports(platform) {
            return Ok(Arc::default());
        }
        self.preprocessor_cache.get_or_compute(&platform.name, || {
            compute_transitive_input(self, platform, resolver)
        })
    }
}

impl NativeLinkable for CxxLibrary {
    fn linkable_target(&self) -> &BuildTarget {
        &self.target
    }

    fn native_linkable_deps(&self, platform: &CxxPlatform) -> Vec<RuleId> {
        if self.supports(platform) {
            self.declared.clone()
        } else {
            Vec::new()
        }
    }

    fn native_linkable_exported_deps(&self, platform: &CxxPlatform) -> Vec<RuleId> {
        if self.supports(platform) {
            self.exported.clone()
        } else {
            Vec::new()
        }
    }

    fn preferred_linkage(&self, _platform: &CxxPlatform) -> Linkage {
        self.args.linkage
    }

    fn native_linkable_input(
        &self,
        platform: &CxxPlatform,
        style: LinkStyle,
        _resolver: &RuleResolver,
    ) -> Result<NativeLinkableInput> {
        if !self.supports(platform) {
            return Ok(NativeLinkableInput::default());
        }
        let mut args = self.args.exported_linker_flags.clone();
        if !self.args.common.srcs.is_empty() {
            let library = if self.args.linkage.links_shared(style) {
                self.shared_library_path(platform)
            } else {
                self.static_library_path(platform)
            };
            args.push(library.into_string());
        }
        Ok(NativeLinkableInput {
            args,
            frameworks: self
                .args
                .common
                .frameworks
                .iter()
                .filter_map(|path| framework_name(path))
                .collect(),
            libraries: Vec::new(),
        })
    }

    fn shared_libraries(
        &self,
        platform: &CxxPlatform,
        _resolver: &RuleResolver,
    ) -> Result<IndexMap<String, Utf8PathBuf>> {
        if !self.supports(platform)
            || self.args.common.srcs.is_empty()
            || self.args.linkage == Linkage::Static
        {
            return Ok(IndexMap::new());
        }
        Ok(IndexMap::from([(
            self.soname(platform),
            self.shared_library_path(platform),
        )]))
    }
}

fn framework_name(path: &Utf8Path) -> Option<String> {
    path.file_stem().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/System/Library/Frameworks/Foundation.framework", Some("Foundation"))]
    #[case("UIKit.framework", Some("UIKit"))]
    #[case("", None)]
    fn framework_names_drop_the_bundle_extension(
        #[case] path: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            framework_name(Utf8Path::new(path)).as_deref(),
            expected
        );
    }
}
