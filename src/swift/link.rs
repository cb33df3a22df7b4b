//! Shared library link of a Swift module.

use camino::{Utf8Path, Utf8PathBuf};

use crate::capability::{LinkStyle, NativeLinkable, collect_link_input};
use crate::error::Result;
use crate::graph::SwiftLibraryArgs;
use crate::platform::CxxPlatform;
use crate::registry::{BuildRule, RuleId, RuleKind, TypedRule};
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;

use super::{SwiftCompile, SwiftRuntimeLinkable, compile::module_name, compile_target};

/// Links a Swift module's objects into a shared library.
#[derive(Debug)]
pub struct SwiftLink {
    target: BuildTarget,
    soname: String,
    output: Utf8PathBuf,
    deps: Vec<RuleId>,
    command: Vec<String>,
}

impl SwiftLink {
    /// Require the module's compile rule and its dependencies' link input.
    ///
    /// # Errors
    ///
    /// Propagates failures from the compile rule and dependencies.
    pub fn new(
        resolver: &RuleResolver,
        target: &BuildTarget,
        args: &SwiftLibraryArgs,
        platform: &CxxPlatform,
    ) -> Result<Self> {
        let (compile_id, compile) =
            resolver.require_typed::<SwiftCompile>(&compile_target(target, platform))?;
        let soname = platform.shared_library_name(&module_name(target, args));
        let output = target
            .output_dir(resolver.toolchain().out_root())
            .join(&soname);

        let declared = resolver.require_all(&args.deps)?;
        let mut input = collect_link_input(&declared, platform, LinkStyle::Shared, resolver)?;
        if let Some(swift) = &platform.swift {
            let runtime = SwiftRuntimeLinkable::new(platform, swift.clone());
            input.args.extend(
                runtime
                    .native_linkable_input(platform, LinkStyle::Shared, resolver)?
                    .link_args(),
            );
        }
        input.frameworks.extend(args.frameworks.iter().cloned());
        input.libraries.extend(args.libraries.iter().cloned());

        let mut command = vec![
            platform.compiler.clone(),
            "-shared".to_owned(),
            "-o".to_owned(),
            output.to_string(),
        ];
        command.extend(compile.objects().iter().map(ToString::to_string));
        command.extend(compile.ast_link_args());
        command.extend(input.link_args());

        let mut deps = vec![compile_id];
        deps.extend(declared);
        Ok(Self {
            target: target.clone(),
            soname,
            output,
            deps,
            command,
        })
    }

    /// Soname of the linked library.
    #[must_use]
    pub fn soname(&self) -> &str {
        &self.soname
    }
}

impl BuildRule for SwiftLink {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        Self::KIND
    }

    fn build_deps(&self) -> &[RuleId] {
        &self.deps
    }

    fn output(&self) -> Option<&Utf8Path> {
        Some(&self.output)
    }

    fn command(&self) -> Option<&[String]> {
        Some(&self.command)
    }
}

impl TypedRule for SwiftLink {
    const KIND: RuleKind = RuleKind::SwiftLink;
}
