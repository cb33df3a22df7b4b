//! C/C++ binary node.

use camino::{Utf8Path, Utf8PathBuf};

use crate::capability::{LinkStyle, collect_link_input};
use crate::error::Result;
use crate::graph::CxxBinaryArgs;
use crate::registry::{BuildRule, RuleId, RuleKind, TypedRule};
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;

/// The unflavoured rule of a `cxx_binary` target.
///
/// Its link line is computed once, at construction, from the native
/// linkables reachable through its declared dependencies.
#[derive(Debug)]
pub struct CxxBinary {
    target: BuildTarget,
    deps: Vec<RuleId>,
    link_style: LinkStyle,
    link_args: Vec<String>,
    output: Utf8PathBuf,
    command: Vec<String>,
}

impl CxxBinary {
    /// Require the binary's dependencies and compute its link line.
    ///
    /// # Errors
    ///
    /// Propagates failures from dependencies and linkables.
    pub fn new(resolver: &RuleResolver, target: &BuildTarget, args: &CxxBinaryArgs) -> Result<Self> {
        let platform = resolver.platform_for(target)?;
        let deps = resolver.declared_dependencies(target.unflavoured())?;
        let link = collect_link_input(&deps, &platform, args.link_style, resolver)?;
        let output = target
            .output_dir(resolver.toolchain().out_root())
            .join(target.unflavoured().short_name());

        let mut link_args = args.linker_flags.clone();
        link_args.extend(link.link_args());
        let mut command = vec![
            platform.compiler.clone(),
            "-o".to_owned(),
            output.to_string(),
        ];
        command.extend(link_args.iter().cloned());
        Ok(Self {
            target: target.clone(),
            deps,
            link_style: args.link_style,
            link_args,
            output,
            command,
        })
    }

    /// Linker flags followed by the aggregated dependency link input.
    #[must_use]
    pub fn link_args(&self) -> &[String] {
        &self.link_args
    }

    /// Style dependencies were linked with.
    #[must_use]
    pub const fn link_style(&self) -> LinkStyle {
        self.link_style
    }
}

impl BuildRule for CxxBinary {
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

impl TypedRule for CxxBinary {
    const KIND: RuleKind = RuleKind::CxxBinary;
}
