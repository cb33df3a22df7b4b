//! Test utilities for rule derivation.
//!
//! This crate provides builders for target nodes and graphs, toolchain
//! fixtures and helpers for writing manifests to temporary directories.

pub mod fixtures;
pub mod manifest;

use std::sync::Arc;

use camino::Utf8PathBuf;
use kasane::config::{Toolchain, ToolchainConfig};
use kasane::graph::{
    CommonCxxArgs, CxxBinaryArgs, CxxLibraryArgs, RuleArgs, StaticTargetGraph, SwiftLibraryArgs,
    TargetNode,
};
use kasane::resolver::RuleResolver;
use kasane::target::{BuildTarget, UnflavouredTarget};

pub use manifest::write_manifest;

/// Parse a possibly flavoured target.
pub fn target(raw: &str) -> BuildTarget {
    raw.parse().expect("valid target")
}

/// Parse an unflavoured target.
pub fn unflavoured(raw: &str) -> UnflavouredTarget {
    raw.parse().expect("valid unflavoured target")
}

fn paths(raw: &[&str]) -> Vec<Utf8PathBuf> {
    raw.iter().map(|path| Utf8PathBuf::from(*path)).collect()
}

fn targets(raw: &[&str]) -> Vec<UnflavouredTarget> {
    raw.iter().map(|name| unflavoured(name)).collect()
}

fn common(srcs: &[&str], deps: &[&str]) -> CommonCxxArgs {
    CommonCxxArgs {
        srcs: paths(srcs),
        deps: targets(deps),
        ..CommonCxxArgs::default()
    }
}

/// Arguments of a C/C++ library with sources and dependencies.
pub fn library_args(srcs: &[&str], deps: &[&str]) -> CxxLibraryArgs {
    CxxLibraryArgs {
        common: common(srcs, deps),
        ..CxxLibraryArgs::default()
    }
}

/// A `cxx_library` node.
pub fn library(name: &str, srcs: &[&str], deps: &[&str]) -> TargetNode {
    library_with(name, library_args(srcs, deps))
}

/// A `cxx_library` node with explicit arguments.
pub fn library_with(name: &str, args: CxxLibraryArgs) -> TargetNode {
    TargetNode::new(unflavoured(name), RuleArgs::CxxLibrary(args))
}

/// A `cxx_binary` node.
pub fn binary(name: &str, srcs: &[&str], deps: &[&str]) -> TargetNode {
    binary_with(
        name,
        CxxBinaryArgs {
            common: common(srcs, deps),
            ..CxxBinaryArgs::default()
        },
    )
}

/// A `cxx_binary` node with explicit arguments.
pub fn binary_with(name: &str, args: CxxBinaryArgs) -> TargetNode {
    TargetNode::new(unflavoured(name), RuleArgs::CxxBinary(args))
}

/// Arguments of a Swift library with sources and dependencies.
pub fn swift_args(srcs: &[&str], deps: &[&str]) -> SwiftLibraryArgs {
    SwiftLibraryArgs {
        srcs: paths(srcs),
        deps: targets(deps),
        ..SwiftLibraryArgs::default()
    }
}

/// A `swift_library` node.
pub fn swift_library(name: &str, srcs: &[&str], deps: &[&str]) -> TargetNode {
    swift_library_with(name, swift_args(srcs, deps))
}

/// A `swift_library` node with explicit arguments.
pub fn swift_library_with(name: &str, args: SwiftLibraryArgs) -> TargetNode {
    TargetNode::new(unflavoured(name), RuleArgs::SwiftLibrary(args))
}

/// Validate `nodes` into a graph.
pub fn graph(nodes: impl IntoIterator<Item = TargetNode>) -> Arc<StaticTargetGraph> {
    Arc::new(StaticTargetGraph::new(nodes).expect("valid target graph"))
}

/// A resolver over `nodes` with the default toolchain.
pub fn resolver(nodes: impl IntoIterator<Item = TargetNode>) -> RuleResolver {
    resolver_with(nodes, ToolchainConfig::default())
}

/// A resolver over `nodes` with a custom toolchain.
pub fn resolver_with(
    nodes: impl IntoIterator<Item = TargetNode>,
    config: ToolchainConfig,
) -> RuleResolver {
    let toolchain = Toolchain::new(config).expect("valid toolchain");
    RuleResolver::new(graph(nodes), toolchain)
}
