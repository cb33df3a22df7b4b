//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! loads the manifest named on the command line, drives the resolver and
//! writes the result to standard output.

use std::io::{self, Write};

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info};

use crate::capability::{
    LinkStyle, PreprocessorInput, collect_link_input, transitive_preprocessor_input_of,
};
use crate::cli::{Cli, Commands};
use crate::infer::InferFlavour;
use crate::manifest;
use crate::registry::{BuildRule, RuleId, RuleKind};
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;

/// Execute the parsed [`Cli`] command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded, derivation fails or
/// standard output cannot be written.
pub fn run(cli: &Cli) -> Result<()> {
    let path = cli.manifest_path();
    let resolver = manifest::load(&path)
        .with_context(|| format!("loading manifest at {}", path.display()))?;
    info!(manifest = %path.display(), "loaded target graph");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&cli.command, &resolver, &mut out)
}

/// Execute `command` against `resolver`, writing its report to `out`.
///
/// # Errors
///
/// Returns an error if derivation fails or `out` cannot be written.
pub fn execute(command: &Commands, resolver: &RuleResolver, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Derive { target, stage } => derive(resolver, target, *stage, out),
        Commands::Link { target, style } => link(resolver, target, *style, out),
        Commands::Headers { target } => headers(resolver, target, out),
        Commands::Targets => {
            for node in resolver.graph().nodes() {
                writeln!(out, "{}\t{}", node.target, node.args.kind_name())
                    .context("writing target list")?;
            }
            Ok(())
        }
    }
}

/// JSON view of a registered rule.
#[derive(Debug, Serialize)]
struct RuleReport<'a> {
    id: RuleId,
    target: &'a BuildTarget,
    kind: RuleKind,
    deps: &'a [RuleId],
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a Utf8Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_line: Option<String>,
}

impl<'a> RuleReport<'a> {
    fn new(id: RuleId, rule: &'a dyn BuildRule) -> Result<Self> {
        let command_line = rule.command().map(join_args).transpose()?;
        Ok(Self {
            id,
            target: rule.target(),
            kind: rule.kind(),
            deps: rule.build_deps(),
            output: rule.output(),
            command: rule.command(),
            command_line,
        })
    }
}

fn join_args(args: &[String]) -> Result<String> {
    shlex::try_join(args.iter().map(String::as_str)).context("quoting command line")
}

fn derive(
    resolver: &RuleResolver,
    target: &BuildTarget,
    stage: Option<InferFlavour>,
    out: &mut impl Write,
) -> Result<()> {
    let root = match stage {
        Some(flavour) => resolver.require_derived(target, flavour)?,
        None => resolver.require_rule(target)?,
    };
    debug!(%target, %root, "derived rules");
    let rules = resolver.registry().rules();
    let reports = rules
        .iter()
        .map(|(id, rule)| RuleReport::new(*id, rule.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    serde_json::to_writer_pretty(&mut *out, &reports).context("serialising rules")?;
    writeln!(out).context("writing rules")?;
    Ok(())
}

fn link(
    resolver: &RuleResolver,
    target: &BuildTarget,
    style: LinkStyle,
    out: &mut impl Write,
) -> Result<()> {
    let platform = resolver.platform_for(target)?;
    let deps = resolver.declared_dependencies(target.unflavoured())?;
    let input = collect_link_input(&deps, &platform, style, resolver)?;
    writeln!(out, "{}", join_args(&input.link_args())?).context("writing link arguments")?;
    Ok(())
}

fn headers(resolver: &RuleResolver, target: &BuildTarget, out: &mut impl Write) -> Result<()> {
    let platform = resolver.platform_for(target)?;
    let deps = resolver.declared_dependencies(target.unflavoured())?;
    let transitive = transitive_preprocessor_input_of(&deps, &platform, resolver)?;
    let merged = PreprocessorInput::concat(transitive.values());
    writeln!(out, "{}", join_args(&merged.args())?).context("writing preprocessor arguments")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::ensure;

    fn resolver(yaml: &str) -> Result<RuleResolver> {
        manifest::into_resolver(manifest::from_str(yaml)?)
    }

    const GRAPH: &str = r#"
targets:
  - kind: cxx_binary
    name: "//app:main"
    srcs: [main.c]
    deps: ["//app:lib"]
  - kind: cxx_library
    name: "//app:lib"
    srcs: [lib.c]
    exported_headers: [lib.h]
    exported_linker_flags: ["-lm"]
"#;

    fn render(command: &Commands) -> Result<String> {
        let graph = resolver(GRAPH)?;
        let mut buffer = Vec::new();
        execute(command, &graph, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    #[test]
    fn targets_are_listed_in_declaration_order() -> Result<()> {
        let text = render(&Commands::Targets)?;
        ensure!(
            text == "//app:main\tcxx_binary\n//app:lib\tcxx_library\n",
            "unexpected listing: {text}"
        );
        Ok(())
    }

    #[test]
    fn link_lists_library_archive() -> Result<()> {
        let text = render(&Commands::Link {
            target: "//app:main".parse()?,
            style: LinkStyle::Static,
        })?;
        ensure!(text.starts_with("-lm "), "exported flags come first: {text}");
        ensure!(text.contains("liblib.a"), "archive missing: {text}");
        Ok(())
    }

    #[test]
    fn headers_include_exported_tree() -> Result<()> {
        let text = render(&Commands::Headers {
            target: "//app:main".parse()?,
        })?;
        ensure!(
            text.contains("-Ikasane-out/gen/app/lib#default,headers"),
            "exported header dir missing: {text}"
        );
        Ok(())
    }

    #[test]
    fn derive_reports_every_registered_rule() -> Result<()> {
        let text = render(&Commands::Derive {
            target: "//app:lib".parse()?,
            stage: Some(InferFlavour::Report),
        })?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let rules = value.as_array().map_or(0, Vec::len);
        ensure!(rules > 0, "no rules reported");
        ensure!(text.contains("\"infer_report\""), "report rule missing: {text}");
        Ok(())
    }
}
