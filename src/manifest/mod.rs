//! Manifest loading helpers.
//!
//! A graph manifest is a YAML document with a `toolchain` section and a list
//! of `targets`. The YAML is parsed into a [`ManifestValue`] first so parser
//! failures carry a span into the source, then deserialised into a
//! [`GraphManifest`]. [`into_resolver`] validates the declared targets and
//! returns a [`RuleResolver`] ready for derivation.

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::Toolchain;
use crate::graph::StaticTargetGraph;
use crate::resolver::RuleResolver;

mod ast;
mod diagnostics;

/// JSON representation of a manifest document before deserialisation.
pub type ManifestValue = serde_json::Value;

pub use ast::{GraphManifest, TargetKind, TargetSpec};
pub use diagnostics::{
    ManifestError, ManifestName, ManifestSource, map_data_error, map_yaml_error,
};

/// Name used for manifests parsed from a string.
pub const DEFAULT_MANIFEST_NAME: &str = "kasane.yml";

fn from_str_named(yaml: &str, name: &ManifestName) -> Result<GraphManifest, ManifestError> {
    let doc: ManifestValue = serde_saphyr::from_str(yaml).map_err(|e| {
        ManifestError::parse(map_yaml_error(e, &ManifestSource::from(yaml), name), name)
    })?;
    serde_json::from_value(doc).map_err(|e| ManifestError::parse(map_data_error(e, name), name))
}

/// Parse a manifest from YAML text.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or does not describe a
/// manifest.
pub fn from_str(yaml: &str) -> Result<GraphManifest> {
    Ok(from_str_named(yaml, &ManifestName::new(DEFAULT_MANIFEST_NAME))?)
}

/// Load a [`GraphManifest`] from the given file path.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails to parse.
pub fn from_path(path: impl AsRef<Path>) -> Result<GraphManifest> {
    let path_ref = path.as_ref();
    let data = fs::read_to_string(path_ref)
        .with_context(|| format!("failed to read manifest {}", path_ref.display()))?;
    let name = ManifestName::new(path_ref.display().to_string());
    Ok(from_str_named(&data, &name)?)
}

/// Validate the manifest's targets and toolchain.
///
/// # Errors
///
/// Returns [`ManifestError::UnsupportedArgument`] for a field the target's
/// kind does not accept, [`ManifestError::Graph`] for an invalid graph and
/// an error for an invalid toolchain.
pub fn into_parts(manifest: GraphManifest) -> Result<(StaticTargetGraph, Toolchain)> {
    let GraphManifest { toolchain, targets } = manifest;
    let nodes = targets
        .into_iter()
        .map(TargetSpec::into_node)
        .collect::<Result<Vec<_>, ManifestError>>()?;
    let graph = StaticTargetGraph::new(nodes).map_err(ManifestError::from)?;
    debug!(targets = graph.len(), "validated target graph");
    let toolchain = Toolchain::new(toolchain).context("invalid toolchain configuration")?;
    Ok((graph, toolchain))
}

/// Build a resolver over the manifest's targets.
///
/// # Errors
///
/// See [`into_parts`].
pub fn into_resolver(manifest: GraphManifest) -> Result<RuleResolver> {
    let (graph, toolchain) = into_parts(manifest)?;
    Ok(RuleResolver::new(Arc::new(graph), toolchain))
}

/// Load the manifest at `path` and build a resolver over it.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or validated.
pub fn load(path: impl AsRef<Path>) -> Result<RuleResolver> {
    into_resolver(from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, ensure};
    use rstest::rstest;

    use crate::graph::{GraphError, RuleArgs};

    const LIBRARY: &str = r#"
toolchain:
  out_root: build-out
targets:
  - kind: cxx_library
    name: "//app:lib"
    srcs: [a.c, b.c]
    exported_headers: [lib.h]
    deps: ["//app:dep"]
  - kind: cxx_library
    name: "//app:dep"
    srcs: [dep.c]
"#;

    #[test]
    fn parses_targets_in_declaration_order() -> Result<()> {
        let manifest = from_str(LIBRARY)?;
        let names: Vec<String> = manifest
            .targets
            .iter()
            .map(|spec| spec.name.to_string())
            .collect();
        ensure!(names == ["//app:lib", "//app:dep"], "unexpected targets {names:?}");
        let (graph, toolchain) = into_parts(manifest)?;
        ensure!(graph.len() == 2, "expected two nodes");
        ensure!(toolchain.out_root() == "build-out", "out root not applied");
        Ok(())
    }

    #[test]
    fn kind_specific_fields_reach_the_node() -> Result<()> {
        let manifest = from_str(LIBRARY)?;
        let spec = manifest.targets.into_iter().next().context("first target")?;
        let node = spec.into_node()?;
        let RuleArgs::CxxLibrary(args) = node.args else {
            anyhow::bail!("expected library arguments");
        };
        ensure!(args.exported_headers.len() == 1, "exported headers dropped");
        ensure!(args.common.srcs.len() == 2, "sources dropped");
        Ok(())
    }

    #[rstest]
    #[case("cxx_binary", "exported_headers: [a.h]", "exported_headers")]
    #[case("swift_library", "headers: [a.h]", "headers")]
    #[case("cxx_library", "link_style: shared", "link_style")]
    fn rejects_fields_of_other_kinds(
        #[case] kind: &str,
        #[case] field_line: &str,
        #[case] field: &str,
    ) {
        let yaml = format!("targets:\n  - kind: {kind}\n    name: \"//x:y\"\n    {field_line}\n");
        let manifest = from_str(&yaml).expect("parse manifest");
        let err = into_parts(manifest).expect_err("field should be rejected");
        let manifest_err = err
            .downcast_ref::<ManifestError>()
            .expect("manifest error");
        match manifest_err {
            ManifestError::UnsupportedArgument {
                field: rejected, ..
            } => assert_eq!(*rejected, field),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_is_reported() -> Result<()> {
        let yaml = "targets:\n  - kind: cxx_library\n    name: \"//a:b\"\n    deps: [\"//a:c\"]\n";
        let Err(err) = into_parts(from_str(yaml)?) else {
            anyhow::bail!("expected a graph error");
        };
        let graph_err = err
            .downcast_ref::<ManifestError>()
            .context("manifest error")?;
        ensure!(
            matches!(
                graph_err,
                ManifestError::Graph(GraphError::MissingDependency { .. })
            ),
            "unexpected error {graph_err:?}"
        );
        Ok(())
    }

    #[test]
    fn unknown_fields_fail_to_parse() -> Result<()> {
        let yaml = "targets:\n  - kind: cxx_library\n    name: \"//a:b\"\n    sources: [a.c]\n";
        let Err(err) = from_str(yaml) else {
            anyhow::bail!("expected a parse error");
        };
        ensure!(
            err.to_string().contains("failed to parse manifest `kasane.yml`"),
            "unexpected message: {err}"
        );
        Ok(())
    }

    #[test]
    fn empty_document_is_an_empty_manifest() -> Result<()> {
        let manifest = from_str("{}")?;
        ensure!(manifest.targets.is_empty(), "expected no targets");
        Ok(())
    }
}
