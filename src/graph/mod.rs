//! Target graph consumed by the resolver.
//!
//! The engine only needs to look up the constructor arguments of an
//! unflavoured target, so the interface is the [`TargetGraph`] trait.
//! [`StaticTargetGraph`] is an in-memory implementation validated on
//! construction: duplicate targets, dangling dependencies and dependency
//! cycles are rejected before any rule is derived.

// Module-level suppression for version-dependent lint false positives from
// miette/thiserror derive macros. FIXME: remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

use crate::target::UnflavouredTarget;

mod args;
mod cycle;

pub use args::{
    CommonCxxArgs, CxxArgs, CxxBinaryArgs, CxxLibraryArgs, PlatformFilter, PlatformFlags,
    RuleArgs, SourceLanguage, SwiftLibraryArgs, compile_pattern, platform_matches,
};

/// A declared target and its constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNode {
    /// Declared target.
    pub target: UnflavouredTarget,
    /// Constructor arguments.
    pub args: RuleArgs,
}

impl TargetNode {
    /// Pair a target with its arguments.
    #[must_use]
    pub const fn new(target: UnflavouredTarget, args: RuleArgs) -> Self {
        Self { target, args }
    }
}

/// Read access to declared targets.
pub trait TargetGraph: fmt::Debug + Send + Sync {
    /// Node declared for `target`, if any.
    fn node(&self, target: &UnflavouredTarget) -> Option<&TargetNode>;

    /// Every declared node in declaration order.
    fn nodes(&self) -> Vec<&TargetNode>;
}

/// Errors detected while assembling a [`StaticTargetGraph`].
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum GraphError {
    /// The same target was declared twice.
    #[error("target `{target}` is declared more than once")]
    #[diagnostic(code(kasane::graph::duplicate_target))]
    DuplicateTarget {
        /// The duplicated target.
        target: UnflavouredTarget,
    },
    /// A dependency names an undeclared target.
    #[error("`{dependent}` depends on undeclared target `{missing}`")]
    #[diagnostic(code(kasane::graph::missing_dependency))]
    MissingDependency {
        /// Target declaring the dependency.
        dependent: UnflavouredTarget,
        /// The undeclared target.
        missing: UnflavouredTarget,
    },
    /// Dependencies form a cycle.
    #[error("dependency cycle: {}", .cycle.iter().join(" -> "))]
    #[diagnostic(code(kasane::graph::cycle))]
    Cycle {
        /// Targets on the cycle, first repeated at the end.
        cycle: Vec<UnflavouredTarget>,
    },
}

/// In-memory target graph.
#[derive(Debug, Clone, Default)]
pub struct StaticTargetGraph {
    nodes: IndexMap<UnflavouredTarget, TargetNode>,
}

impl StaticTargetGraph {
    /// Validate and index `nodes`.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] for duplicate targets, missing dependencies
    /// or cycles.
    pub fn new(nodes: impl IntoIterator<Item = TargetNode>) -> Result<Self, GraphError> {
        let mut index = IndexMap::new();
        for node in nodes {
            if index.contains_key(&node.target) {
                return Err(GraphError::DuplicateTarget {
                    target: node.target,
                });
            }
            index.insert(node.target.clone(), node);
        }
        let report = cycle::analyse(&index);
        if let Some((dependent, missing)) = report.missing_dependencies.into_iter().next() {
            return Err(GraphError::MissingDependency { dependent, missing });
        }
        if let Some(found) = report.cycle {
            return Err(GraphError::Cycle { cycle: found });
        }
        Ok(Self { nodes: index })
    }

    /// Number of declared targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no targets are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl TargetGraph for StaticTargetGraph {
    fn node(&self, target: &UnflavouredTarget) -> Option<&TargetNode> {
        self.nodes.get(target)
    }

    fn nodes(&self) -> Vec<&TargetNode> {
        self.nodes.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn library(name: &str, deps: &[&str]) -> TargetNode {
        let mut args = CxxLibraryArgs::default();
        args.common.deps = deps
            .iter()
            .map(|d| d.parse().expect("dep"))
            .collect();
        TargetNode::new(name.parse().expect("target"), RuleArgs::CxxLibrary(args))
    }

    #[rstest]
    fn duplicate_targets_are_rejected() {
        let err = StaticTargetGraph::new([library("//a:x", &[]), library("//a:x", &[])])
            .expect_err("duplicate");
        assert!(matches!(err, GraphError::DuplicateTarget { .. }));
    }

    #[rstest]
    fn missing_dependency_is_rejected() {
        let err = StaticTargetGraph::new([library("//a:x", &["//a:y"])]).expect_err("missing");
        assert_eq!(
            err.to_string(),
            "`//a:x` depends on undeclared target `//a:y`"
        );
    }

    #[rstest]
    fn cycle_is_rejected() {
        let err = StaticTargetGraph::new([
            library("//a:x", &["//a:y"]),
            library("//a:y", &["//a:x"]),
        ])
        .expect_err("cycle");
        assert_eq!(err.to_string(), "dependency cycle: //a:x -> //a:y -> //a:x");
    }

    #[rstest]
    fn lookup_preserves_declaration_order() {
        let graph = StaticTargetGraph::new([library("//a:y", &[]), library("//a:x", &["//a:y"])])
            .expect("graph");
        let names: Vec<String> = graph.nodes().iter().map(|n| n.target.to_string()).collect();
        assert_eq!(names, vec!["//a:y", "//a:x"]);
        assert!(graph.node(&"//a:z".parse().expect("target")).is_none());
    }
}
