//! Swift library adapter.
//!
//! A `swift_library` target takes part in C/C++ builds through the same
//! capability traits as a C/C++ library. The bare target is a
//! [`SwiftLibrary`] node; per platform it derives a [`SwiftCompile`] rule
//! (`#swift-compile`) and, when linked shared, a [`SwiftLink`] rule
//! (`#shared`). The `#swift-companion` flavour marks a library generated
//! alongside an Objective-C target: it always links statically and does not
//! forward its dependencies' headers.

use std::sync::Arc;

use crate::cxx::SHARED_FLAVOUR;
use crate::error::{DeriveError, Result};
use crate::flavour::FlavourConvertible;
use crate::graph::{PlatformFilter, SwiftLibraryArgs};
use crate::platform::{CxxPlatform, SwiftPlatform};
use crate::registry::{BuildRule, RuleKind, shared};
use crate::resolver::RuleResolver;
use crate::target::{BuildTarget, Flavour};

mod compile;
mod library;
mod link;
mod runtime;

pub use compile::SwiftCompile;
pub use library::SwiftLibrary;
pub use link::SwiftLink;
pub use runtime::{SWIFT_RUNTIME_TARGET, SwiftRuntimeLinkable};

/// Module compilation of a Swift library.
pub const SWIFT_COMPILE_FLAVOUR: Flavour = Flavour::from_static("swift-compile");
/// Companion library of an Objective-C target.
pub const SWIFT_COMPANION_FLAVOUR: Flavour = Flavour::from_static("swift-companion");

const KIND: &str = RuleKind::SwiftLibrary.as_str();

/// Construct the rule for a flavoured `swift_library` target.
///
/// # Errors
///
/// Returns [`DeriveError::UnsupportedFlavours`] for flavours a Swift library
/// cannot build, including compile or link requests for a platform the
/// library does not support.
pub fn describe(
    resolver: &RuleResolver,
    target: &BuildTarget,
    args: &SwiftLibraryArgs,
) -> Result<Arc<dyn BuildRule>> {
    let filter = PlatformFilter::new(
        args.supported_platforms_regex.as_deref(),
        target.unflavoured(),
    )?;
    if target.has_flavour(&SWIFT_COMPILE_FLAVOUR) {
        resolver.ensure_flavours(target, KIND, &[&SWIFT_COMPILE_FLAVOUR])?;
        let (platform, swift) = supported_platform(resolver, target, &filter)?;
        return Ok(shared(SwiftCompile::new(
            resolver, target, args, &platform, &swift,
        )?));
    }
    if target.has_flavour(&SHARED_FLAVOUR) {
        resolver.ensure_flavours(target, KIND, &[&SHARED_FLAVOUR])?;
        let (platform, _) = supported_platform(resolver, target, &filter)?;
        return Ok(shared(SwiftLink::new(resolver, target, args, &platform)?));
    }
    resolver.ensure_flavours(target, KIND, &[&SWIFT_COMPANION_FLAVOUR])?;
    Ok(shared(SwiftLibrary::new(resolver, target, args, filter)?))
}

/// Whether `platform` can build Swift code for a library filtered by
/// `filter`.
fn builds_swift(filter: &PlatformFilter, platform: &CxxPlatform) -> bool {
    platform.swift.is_some() && filter.supports(platform)
}

fn supported_platform(
    resolver: &RuleResolver,
    target: &BuildTarget,
    filter: &PlatformFilter,
) -> Result<(Arc<CxxPlatform>, SwiftPlatform)> {
    let platform = resolver.platform_for(target)?;
    platform
        .swift
        .clone()
        .filter(|_| filter.supports(&platform))
        .map(|swift| (Arc::clone(&platform), swift))
        .ok_or_else(|| DeriveError::UnsupportedFlavours {
            target: target.clone(),
            kind: KIND,
            flavours: platform.name.to_string(),
        })
}

/// Compile rule of the library `base` on `platform`.
fn compile_target(base: &BuildTarget, platform: &CxxPlatform) -> BuildTarget {
    base.with_appended_flavours([platform.flavour()])
        .without_flavours([&SHARED_FLAVOUR, &SWIFT_COMPANION_FLAVOUR])
        .with_appended_flavours([SWIFT_COMPILE_FLAVOUR])
}

/// Shared link rule of the library `base` on `platform`.
fn link_target(base: &BuildTarget, platform: &CxxPlatform) -> BuildTarget {
    base.without_flavours([&SWIFT_COMPANION_FLAVOUR])
        .with_appended_flavours([SHARED_FLAVOUR, platform.flavour()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn linux() -> CxxPlatform {
        CxxPlatform::named(Flavour::from_static("linux"))
    }

    #[rstest]
    #[case("//ui:kit", "//ui:kit#linux,swift-compile")]
    #[case("//ui:kit#swift-companion", "//ui:kit#linux,swift-compile")]
    #[case("//ui:kit#linux,shared", "//ui:kit#linux,swift-compile")]
    fn compile_target_drops_link_flavours(#[case] base: &str, #[case] expected: &str) {
        let library: BuildTarget = base.parse().expect("parse");
        assert_eq!(compile_target(&library, &linux()).to_string(), expected);
    }

    #[rstest]
    #[case("//ui:kit", "//ui:kit#linux,shared")]
    #[case("//ui:kit#swift-companion", "//ui:kit#linux,shared")]
    fn link_target_drops_companion(#[case] base: &str, #[case] expected: &str) {
        let library: BuildTarget = base.parse().expect("parse");
        assert_eq!(link_target(&library, &linux()).to_string(), expected);
    }

    #[rstest]
    fn platforms_without_swift_are_unsupported() {
        let owner = "//ui:kit".parse().expect("parse");
        let filter = PlatformFilter::new(None, &owner).expect("filter");
        assert!(!builds_swift(&filter, &linux()));
        let swift = linux().with_swift(SwiftPlatform::default());
        assert!(builds_swift(&filter, &swift));
    }
}
