//! The Swift runtime as a synthetic linkable.

use std::sync::LazyLock;

use camino::Utf8PathBuf;
use indexmap::IndexMap;

use crate::capability::{LinkStyle, Linkage, NativeLinkable, NativeLinkableInput};
use crate::error::Result;
use crate::flavour::FlavourConvertible;
use crate::platform::{CxxPlatform, SwiftPlatform};
use crate::registry::RuleId;
use crate::resolver::RuleResolver;
use crate::target::{BuildTarget, UnflavouredTarget};

/// Identity shared by every platform's runtime linkable.
pub static SWIFT_RUNTIME_TARGET: LazyLock<UnflavouredTarget> =
    LazyLock::new(|| UnflavouredTarget::from_static("//kasane/swift", "runtime"));

/// Runtime search paths and libraries required by any consumer of Swift
/// code. Never registered; owned by the library exposing it.
#[derive(Debug, Clone)]
pub struct SwiftRuntimeLinkable {
    target: BuildTarget,
    swift: SwiftPlatform,
}

impl SwiftRuntimeLinkable {
    /// Runtime linkable for `platform`.
    #[must_use]
    pub fn new(platform: &CxxPlatform, swift: SwiftPlatform) -> Self {
        Self {
            target: BuildTarget::of(SWIFT_RUNTIME_TARGET.clone())
                .with_appended_flavours([platform.flavour()]),
            swift,
        }
    }
}

impl NativeLinkable for SwiftRuntimeLinkable {
    fn linkable_target(&self) -> &BuildTarget {
        &self.target
    }

    fn native_linkable_deps(&self, _platform: &CxxPlatform) -> Vec<RuleId> {
        Vec::new()
    }

    fn native_linkable_exported_deps(&self, _platform: &CxxPlatform) -> Vec<RuleId> {
        Vec::new()
    }

    fn preferred_linkage(&self, _platform: &CxxPlatform) -> Linkage {
        Linkage::Shared
    }

    fn native_linkable_input(
        &self,
        _platform: &CxxPlatform,
        _style: LinkStyle,
        _resolver: &RuleResolver,
    ) -> Result<NativeLinkableInput> {
        let mut args = Vec::new();
        for dir in &self.swift.runtime_library_dirs {
            args.push(format!("-L{dir}"));
            args.push(format!("-Wl,-rpath,{dir}"));
        }
        Ok(NativeLinkableInput {
            args,
            frameworks: Vec::new(),
            libraries: self.swift.runtime_libraries.clone(),
        })
    }

    // The runtime ships with the toolchain.
    fn shared_libraries(
        &self,
        _platform: &CxxPlatform,
        _resolver: &RuleResolver,
    ) -> Result<IndexMap<String, Utf8PathBuf>> {
        Ok(IndexMap::new())
    }
}
