//! Preprocessor input for compiling a C/C++ target's own sources.

use std::iter;

use crate::capability::{IncludeDir, PreprocessorInput, transitive_preprocessor_input_of};
use crate::error::Result;
use crate::graph::CxxArgs;
use crate::platform::CxxPlatform;
use crate::registry::RuleId;
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;

use super::{SANDBOX_FLAVOUR, exported_headers_target, headers::HeaderTree};

/// Preprocessor input seen by the sources of `target`.
///
/// The target's own flags and include directories come first, the private
/// header tree ahead of exported headers and declared include directories.
/// The transitive inputs of declared dependencies follow in dependency
/// order.
///
/// # Errors
///
/// Propagates failures while requiring header trees or dependencies, and
/// returns a kind mismatch when `header_tree` is not a [`HeaderTree`].
pub fn preprocessor_input_for_sources(
    resolver: &RuleResolver,
    args: CxxArgs<'_>,
    target: &BuildTarget,
    platform: &CxxPlatform,
    header_tree: RuleId,
) -> Result<PreprocessorInput> {
    let common = args.common();
    let tree = resolver.typed::<HeaderTree>(header_tree)?;
    let mut own = PreprocessorInput {
        flags: common.preprocessor_flags.clone(),
        include_dirs: vec![IncludeDir::local(tree.include_dir())],
        frameworks: common.frameworks.clone(),
        rules: vec![header_tree],
    };
    if let CxxArgs::Library(library) = args {
        own.flags
            .extend(library.exported_preprocessor_flags.iter().cloned());
        if !library.exported_headers.is_empty() {
            let exported = exported_headers_target(target.unflavoured(), platform);
            let id = resolver.require_rule(&exported)?;
            own.include_dirs
                .push(IncludeDir::local(exported.output_dir(resolver.toolchain().out_root())));
            own.rules.push(id);
        }
    }
    own.include_dirs
        .extend(common.include_dirs.iter().map(|dir| IncludeDir::local(dir.clone())));
    if resolver.toolchain().sandbox_sources() {
        let sandbox = target.with_appended_flavours([SANDBOX_FLAVOUR]);
        own.include_dirs.push(IncludeDir::local(
            sandbox.output_dir(resolver.toolchain().out_root()),
        ));
    }

    let deps = resolver.declared_dependencies(target.unflavoured())?;
    let transitive = transitive_preprocessor_input_of(&deps, platform, resolver)?;
    Ok(PreprocessorInput::concat(
        iter::once(&own).chain(transitive.values()),
    ))
}
