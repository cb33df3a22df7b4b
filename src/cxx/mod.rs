//! C/C++ library and binary rules.
//!
//! [`describe`] is the constructor for both target kinds. It routes Infer
//! stage flavours to the [`InferEnhancer`], header tree flavours to a
//! [`HeaderTree`], and the bare target (optionally carrying a platform
//! flavour) to the [`CxxLibrary`] or [`CxxBinary`] node.

use std::sync::Arc;

use crate::error::Result;
use crate::flavour::FlavourConvertible;
use crate::graph::CxxArgs;
use crate::infer::{INFER_FLAVOURS, InferEnhancer};
use crate::platform::CxxPlatform;
use crate::registry::{BuildRule, shared};
use crate::resolver::RuleResolver;
use crate::target::{BuildTarget, Flavour, UnflavouredTarget};

mod binary;
mod headers;
mod library;
mod preprocess;

pub use binary::CxxBinary;
pub use headers::HeaderTree;
pub use library::CxxLibrary;
pub use preprocess::preprocessor_input_for_sources;

/// Private header tree of a library or binary.
pub const HEADER_TREE_FLAVOUR: Flavour = Flavour::from_static("private-headers");
/// Exported header tree of a library, per platform.
pub const EXPORTED_HEADERS_FLAVOUR: Flavour = Flavour::from_static("headers");
/// Output directory of a static archive.
pub const STATIC_FLAVOUR: Flavour = Flavour::from_static("static");
/// Output directory of a shared library.
pub const SHARED_FLAVOUR: Flavour = Flavour::from_static("shared");
/// Sandboxed source directory added to the include path when enabled.
pub const SANDBOX_FLAVOUR: Flavour = Flavour::from_static("sandbox");

/// Construct the rule for a flavoured `cxx_library` or `cxx_binary` target.
///
/// # Errors
///
/// Returns [`DeriveError::UnsupportedFlavours`] for flavours the kind cannot
/// build and propagates failures from the selected constructor.
///
/// [`DeriveError::UnsupportedFlavours`]: crate::error::DeriveError::UnsupportedFlavours
pub fn describe(
    resolver: &RuleResolver,
    target: &BuildTarget,
    args: CxxArgs<'_>,
) -> Result<Arc<dyn BuildRule>> {
    let kind = match args {
        CxxArgs::Library(_) => "cxx_library",
        CxxArgs::Binary(_) => "cxx_binary",
    };
    if let Some(stage) = INFER_FLAVOURS.value_of(target)? {
        resolver.ensure_flavours(target, kind, &[&stage.flavour()])?;
        return InferEnhancer::new(resolver, target, args)?.require(target);
    }
    if target.has_flavour(&HEADER_TREE_FLAVOUR) {
        resolver.ensure_flavours(target, kind, &[&HEADER_TREE_FLAVOUR])?;
        return Ok(headers::describe(
            resolver,
            target,
            args,
            &args.common().headers,
        ));
    }
    if let CxxArgs::Library(library) = args
        && target.has_flavour(&EXPORTED_HEADERS_FLAVOUR)
    {
        resolver.ensure_flavours(target, kind, &[&EXPORTED_HEADERS_FLAVOUR])?;
        return Ok(headers::describe(
            resolver,
            target,
            args,
            &library.exported_headers,
        ));
    }
    resolver.ensure_flavours(target, kind, &[])?;
    match args {
        CxxArgs::Library(library) => Ok(shared(CxxLibrary::new(resolver, target, library)?)),
        CxxArgs::Binary(binary) => Ok(shared(CxxBinary::new(resolver, target, binary)?)),
    }
}

/// Exported header tree of `library` on `platform`.
fn exported_headers_target(library: &UnflavouredTarget, platform: &CxxPlatform) -> BuildTarget {
    BuildTarget::of(library.clone())
        .with_appended_flavours([EXPORTED_HEADERS_FLAVOUR, platform.flavour()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn exported_headers_are_per_platform() {
        let library: UnflavouredTarget = "//app:dep".parse().expect("parse");
        let platform = CxxPlatform::named(Flavour::from_static("linux"));
        assert_eq!(
            exported_headers_target(&library, &platform).to_string(),
            "//app:dep#headers,linux"
        );
    }

    #[rstest]
    fn derived_flavours_are_distinct_from_infer_stages() {
        for flavour in [
            HEADER_TREE_FLAVOUR,
            EXPORTED_HEADERS_FLAVOUR,
            STATIC_FLAVOUR,
            SHARED_FLAVOUR,
            SANDBOX_FLAVOUR,
        ] {
            assert!(!INFER_FLAVOURS.contains(&flavour), "{flavour}");
        }
    }
}
