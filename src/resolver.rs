//! On-demand rule resolution.
//!
//! [`RuleResolver`] is the single entry point for turning a flavoured
//! [`BuildTarget`] into a registered rule. It looks up the target's
//! constructor arguments in the [`TargetGraph`], dispatches on the rule kind
//! and flavours, and registers the result in its [`RuleRegistry`]. Every
//! prerequisite is required through the resolver again, so each identity is
//! constructed at most once.

use std::sync::Arc;

use indexmap::IndexSet;
use itertools::Itertools;
use tracing::debug;

use crate::config::Toolchain;
use crate::error::{DeriveError, Result};
use crate::graph::{CxxArgs, RuleArgs, TargetGraph, TargetNode};
use crate::infer::{INFER_FLAVOURS, InferFlavour};
use crate::platform::CxxPlatform;
use crate::registry::{BuildRule, RuleId, RuleRegistry, TypedRule};
use crate::target::{BuildTarget, Flavour, UnflavouredTarget};
use crate::{cxx, swift};

/// Resolves flavoured targets into memoised rules.
#[derive(Debug)]
pub struct RuleResolver {
    registry: RuleRegistry,
    graph: Arc<dyn TargetGraph>,
    toolchain: Toolchain,
}

impl RuleResolver {
    /// Create a resolver over `graph` with an empty registry.
    #[must_use]
    pub fn new(graph: Arc<dyn TargetGraph>, toolchain: Toolchain) -> Self {
        Self {
            registry: RuleRegistry::new(),
            graph,
            toolchain,
        }
    }

    /// The backing registry.
    #[must_use]
    pub const fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// The target graph.
    #[must_use]
    pub fn graph(&self) -> &dyn TargetGraph {
        self.graph.as_ref()
    }

    /// The toolchain.
    #[must_use]
    pub const fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Return the rule for `target`, constructing it on first request.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::NoSuchRule`] when the graph does not declare
    /// the target, [`DeriveError::UnsupportedFlavours`] when its kind cannot
    /// build the flavour combination, and propagates failures from
    /// prerequisites.
    pub fn require_rule(&self, target: &BuildTarget) -> Result<RuleId> {
        self.registry
            .get_or_construct(target, || self.create(target))
    }

    /// Require `target` and return it as a `T`.
    ///
    /// # Errors
    ///
    /// See [`RuleResolver::require_rule`]; additionally returns
    /// [`DeriveError::RuleKindMismatch`] when the rule is not a `T`.
    pub fn require_typed<T: TypedRule>(&self, target: &BuildTarget) -> Result<(RuleId, Arc<T>)> {
        let id = self.require_rule(target)?;
        Ok((id, self.registry.typed::<T>(id)?))
    }

    /// Require the Infer `stage` of a clean `target`.
    ///
    /// This is the entry point used by consumers outside the engine.
    ///
    /// # Errors
    ///
    /// Returns an internal [`FlavourError::Unexpected`] when `target` already
    /// carries an Infer flavour, and propagates derivation failures.
    ///
    /// [`FlavourError::Unexpected`]: crate::flavour::FlavourError::Unexpected
    pub fn require_derived(&self, target: &BuildTarget, stage: InferFlavour) -> Result<RuleId> {
        INFER_FLAVOURS.assert_absent(target)?;
        let derived = INFER_FLAVOURS.with_value(target, &stage)?;
        debug!(%derived, ?stage, "deriving infer stage");
        self.require_rule(&derived)
    }

    /// Require the rules for the declared and exported dependencies of
    /// `target`, in declared order without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::NoSuchRule`] for an undeclared target and
    /// propagates failures from the dependencies.
    pub fn declared_dependencies(&self, target: &UnflavouredTarget) -> Result<Vec<RuleId>> {
        let node = self.node(target)?;
        self.require_all(node.args.all_deps())
    }

    /// Require every target in `targets` without flavours.
    ///
    /// # Errors
    ///
    /// Propagates the first failure.
    pub fn require_all<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a UnflavouredTarget>,
    ) -> Result<Vec<RuleId>> {
        let mut ids = IndexSet::new();
        for target in targets {
            ids.insert(self.require_rule(&BuildTarget::of(target.clone()))?);
        }
        Ok(ids.into_iter().collect())
    }

    /// Platform selected by `target`.
    ///
    /// # Errors
    ///
    /// Fails when the target carries more than one platform flavour.
    pub fn platform_for(&self, target: &BuildTarget) -> Result<Arc<CxxPlatform>> {
        self.toolchain.platform_for(target)
    }

    /// Platform flavours carried by `target`.
    #[must_use]
    pub fn platform_flavours(&self, target: &BuildTarget) -> Vec<Flavour> {
        target
            .flavours()
            .iter()
            .filter(|f| self.toolchain.platforms().contains(f))
            .cloned()
            .collect()
    }

    /// Fetch a registered rule.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::UnknownRule`] for a foreign handle.
    pub fn rule(&self, id: RuleId) -> Result<Arc<dyn BuildRule>> {
        self.registry.rule(id)
    }

    /// Fetch a registered rule as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::RuleKindMismatch`] when the rule is not a `T`.
    pub fn typed<T: TypedRule>(&self, id: RuleId) -> Result<Arc<T>> {
        self.registry.typed::<T>(id)
    }

    /// Fetch the rule registered under `target` as a `T`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::RuleKindMismatch`] when the rule is not a `T`.
    pub fn get_typed<T: TypedRule>(&self, target: &BuildTarget) -> Result<Option<Arc<T>>> {
        self.registry.get_typed::<T>(target)
    }

    /// Fail unless every flavour on `target` is a platform flavour or listed
    /// in `allowed`.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::UnsupportedFlavours`] naming the offenders.
    pub fn ensure_flavours(
        &self,
        target: &BuildTarget,
        kind: &'static str,
        allowed: &[&Flavour],
    ) -> Result<()> {
        let offenders = target
            .flavours()
            .iter()
            .filter(|f| !self.toolchain.platforms().contains(f) && !allowed.contains(f))
            .join(",");
        if offenders.is_empty() {
            Ok(())
        } else {
            Err(DeriveError::UnsupportedFlavours {
                target: target.clone(),
                kind,
                flavours: offenders,
            })
        }
    }

    fn node(&self, target: &UnflavouredTarget) -> Result<&TargetNode> {
        self.graph
            .node(target)
            .ok_or_else(|| DeriveError::NoSuchRule {
                target: target.clone(),
            })
    }

    fn create(&self, target: &BuildTarget) -> Result<Arc<dyn BuildRule>> {
        let node = self.node(target.unflavoured())?;
        match &node.args {
            RuleArgs::CxxLibrary(args) => cxx::describe(self, target, CxxArgs::Library(args)),
            RuleArgs::CxxBinary(args) => cxx::describe(self, target, CxxArgs::Binary(args)),
            RuleArgs::SwiftLibrary(args) => swift::describe(self, target, args),
        }
    }
}
