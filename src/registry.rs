//! Memoised rule storage.
//!
//! The [`RuleRegistry`] owns every rule node in an arena and hands out
//! [`RuleId`] handles. [`RuleRegistry::get_or_construct`] guarantees at most
//! one node per [`BuildTarget`]: each key owns a slot whose build lock is held
//! across construction, so concurrent callers for the same key wait for the
//! first one while callers for distinct keys proceed independently.
//!
//! Constructors may recurse into the registry for other keys. A constructor
//! that requires its own key on the same thread fails with
//! [`DeriveError::CyclicDerivation`] instead of deadlocking.

use std::{
    any::Any,
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use camino::Utf8Path;
use serde::{Serialize, Serializer};
use tracing::{debug, trace, warn};

use crate::capability::{NativeLinkable, PreprocessorDep};
use crate::error::{DeriveError, Result};
use crate::target::BuildTarget;

/// Handle to a rule registered in a [`RuleRegistry`].
///
/// Handles remember the registry that issued them and serialise as their
/// registration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId {
    registry: u64,
    index: usize,
}

impl RuleId {
    /// Position of the rule in registration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl Serialize for RuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.index.serialize(serializer)
    }
}

/// Discriminant for every rule kind the engine constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Primary C/C++ library.
    CxxLibrary,
    /// Primary C/C++ binary.
    CxxBinary,
    /// Private header symlink tree.
    HeaderTree,
    /// Swift library meta rule.
    SwiftLibrary,
    /// Swift module compilation.
    SwiftCompile,
    /// Swift shared library link.
    SwiftLink,
    /// Per-source Infer capture.
    InferCapture,
    /// Infer analysis over captures and dependency analyses.
    InferAnalyze,
    /// Infer capture aggregation node.
    InferAggregator,
    /// Infer report over an analysis.
    InferReport,
    /// Flattened transitive capture set.
    InferCaptureTransitive,
}

impl RuleKind {
    /// Stable snake case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CxxLibrary => "cxx_library",
            Self::CxxBinary => "cxx_binary",
            Self::HeaderTree => "header_tree",
            Self::SwiftLibrary => "swift_library",
            Self::SwiftCompile => "swift_compile",
            Self::SwiftLink => "swift_link",
            Self::InferCapture => "infer_capture",
            Self::InferAnalyze => "infer_analyze",
            Self::InferAggregator => "infer_aggregator",
            Self::InferReport => "infer_report",
            Self::InferCaptureTransitive => "infer_capture_transitive",
        }
    }

    /// Whether transitive traversals treat nodes of this kind as library
    /// boundaries they may cross.
    #[must_use]
    pub const fn is_library(self) -> bool {
        matches!(self, Self::CxxLibrary)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion of a shared rule into a type-erased [`Any`] for downcasting.
pub trait AsAnyRule: Any + Send + Sync {
    /// Erase the concrete type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyRule for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A node in the action graph.
///
/// Nodes are immutable once registered. Their target is exactly the key they
/// were registered under.
pub trait BuildRule: AsAnyRule + fmt::Debug {
    /// Identity the node was registered under.
    fn target(&self) -> &BuildTarget;

    /// Kind discriminant used for checked downcasts.
    fn kind(&self) -> RuleKind;

    /// Rules this node depends on, in declared order.
    fn build_deps(&self) -> &[RuleId];

    /// Primary output path, if the node produces one.
    fn output(&self) -> Option<&Utf8Path> {
        None
    }

    /// Command line the node would run, if any.
    fn command(&self) -> Option<&[String]> {
        None
    }

    /// Native link capability view.
    fn as_native_linkable(&self) -> Option<&dyn NativeLinkable> {
        None
    }

    /// Preprocessor dependency capability view.
    fn as_preprocessor_dep(&self) -> Option<&dyn PreprocessorDep> {
        None
    }
}

/// A concrete rule type with a fixed kind.
pub trait TypedRule: BuildRule + Sized {
    /// Kind reported by every instance.
    const KIND: RuleKind;
}

/// Box a rule for registration.
pub fn shared<R: BuildRule>(rule: R) -> Arc<dyn BuildRule> {
    Arc::new(rule)
}

#[derive(Debug, Default)]
struct Slot {
    built: OnceLock<RuleId>,
    building: Mutex<()>,
}

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static IN_FLIGHT: RefCell<HashSet<(u64, BuildTarget)>> = RefCell::new(HashSet::new());
}

/// Marks a key as under construction on the current thread.
struct InFlight {
    key: (u64, BuildTarget),
}

impl InFlight {
    fn enter(registry: u64, target: &BuildTarget) -> Option<Self> {
        let key = (registry, target.clone());
        let inserted = IN_FLIGHT.with(|set| set.borrow_mut().insert(key.clone()));
        inserted.then_some(Self { key })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        IN_FLIGHT.with(|set| set.borrow_mut().remove(&self.key));
    }
}

/// Arena of rule nodes keyed by target.
#[derive(Debug)]
pub struct RuleRegistry {
    id: u64,
    index: Mutex<HashMap<BuildTarget, Arc<Slot>>>,
    arena: RwLock<Vec<Arc<dyn BuildRule>>>,
    constructions: AtomicUsize,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            index: Mutex::new(HashMap::new()),
            arena: RwLock::new(Vec::new()),
            constructions: AtomicUsize::new(0),
        }
    }

    /// Return the rule registered under `target`, constructing it first if
    /// needed.
    ///
    /// `construct` runs at most once per key across all threads. It may
    /// request other keys from this registry. Nothing is registered when it
    /// fails, and the key is forgotten unless another caller is waiting on it.
    ///
    /// # Errors
    ///
    /// Propagates constructor failures. Returns
    /// [`DeriveError::CyclicDerivation`] when `construct` re-enters its own
    /// key and [`DeriveError::TargetMismatch`] when it produces a node for a
    /// different target.
    pub fn get_or_construct<F>(&self, target: &BuildTarget, construct: F) -> Result<RuleId>
    where
        F: FnOnce() -> Result<Arc<dyn BuildRule>>,
    {
        let slot = self.slot(target);
        if let Some(id) = slot.built.get() {
            trace!(%target, "registry hit");
            return Ok(*id);
        }
        let Some(_in_flight) = InFlight::enter(self.id, target) else {
            return Err(DeriveError::CyclicDerivation {
                target: target.clone(),
            });
        };
        let _building = recover(slot.building.lock(), "rule slot");
        if let Some(id) = slot.built.get() {
            trace!(%target, "registry hit after wait");
            return Ok(*id);
        }
        let built = construct().and_then(|rule| self.register(target, &slot, rule));
        if built.is_err() {
            self.forget_unbuilt(target, &slot);
        }
        built
    }

    fn register(
        &self,
        target: &BuildTarget,
        slot: &Slot,
        rule: Arc<dyn BuildRule>,
    ) -> Result<RuleId> {
        if rule.target() != target {
            return Err(DeriveError::TargetMismatch {
                requested: target.clone(),
                produced: rule.target().clone(),
            });
        }
        let kind = rule.kind();
        let id = self.push(rule);
        if slot.built.set(id).is_err() {
            warn!(%target, "slot filled twice while holding its build lock");
        }
        self.constructions.fetch_add(1, Ordering::Relaxed);
        debug!(%target, %kind, %id, "registered rule");
        Ok(id)
    }

    /// Drop the index entry for a failed key when no other caller holds its
    /// slot.
    fn forget_unbuilt(&self, target: &BuildTarget, slot: &Arc<Slot>) {
        let mut index = recover(self.index.lock(), "registry index");
        let idle = index
            .get(target)
            .is_some_and(|entry| Arc::ptr_eq(entry, slot) && Arc::strong_count(slot) == 2);
        if idle && slot.built.get().is_none() {
            index.remove(target);
            trace!(%target, "forgot failed key");
        }
    }

    /// Handle registered under `target`, if any.
    #[must_use]
    pub fn get(&self, target: &BuildTarget) -> Option<RuleId> {
        let index = recover(self.index.lock(), "registry index");
        index.get(target).and_then(|slot| slot.built.get().copied())
    }

    /// Fetch a rule by handle.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::UnknownRule`] for a handle from another
    /// registry.
    pub fn rule(&self, id: RuleId) -> Result<Arc<dyn BuildRule>> {
        if id.registry != self.id {
            return Err(DeriveError::UnknownRule { id });
        }
        self.read_arena()
            .get(id.index)
            .cloned()
            .ok_or(DeriveError::UnknownRule { id })
    }

    /// Fetch a rule by handle as its concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::RuleKindMismatch`] when the node is not a `T`.
    pub fn typed<T: TypedRule>(&self, id: RuleId) -> Result<Arc<T>> {
        let rule = self.rule(id)?;
        let actual = rule.kind();
        let target = rule.target().clone();
        if actual != T::KIND {
            return Err(kind_mismatch::<T>(target, actual));
        }
        rule.into_any()
            .downcast::<T>()
            .map_err(|_| kind_mismatch::<T>(target, actual))
    }

    /// Fetch the rule registered under `target` as its concrete type.
    ///
    /// # Errors
    ///
    /// See [`RuleRegistry::typed`].
    pub fn get_typed<T: TypedRule>(&self, target: &BuildTarget) -> Result<Option<Arc<T>>> {
        self.get(target).map(|id| self.typed::<T>(id)).transpose()
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_arena().len()
    }

    /// Whether no rule has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of constructor invocations that produced a registered rule.
    #[must_use]
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::Relaxed)
    }

    /// Snapshot of every registered rule in registration order.
    #[must_use]
    pub fn rules(&self) -> Vec<(RuleId, Arc<dyn BuildRule>)> {
        self.read_arena()
            .iter()
            .enumerate()
            .map(|(index, rule)| (self.handle(index), Arc::clone(rule)))
            .collect()
    }

    fn slot(&self, target: &BuildTarget) -> Arc<Slot> {
        let mut index = recover(self.index.lock(), "registry index");
        Arc::clone(index.entry(target.clone()).or_default())
    }

    fn push(&self, rule: Arc<dyn BuildRule>) -> RuleId {
        let mut arena = self.write_arena();
        arena.push(rule);
        self.handle(arena.len() - 1)
    }

    const fn handle(&self, index: usize) -> RuleId {
        RuleId {
            registry: self.id,
            index,
        }
    }

    #[cfg(test)]
    fn indexed_keys(&self) -> usize {
        recover(self.index.lock(), "registry index").len()
    }

    fn read_arena(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn BuildRule>>> {
        match self.arena.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("recovering poisoned rule arena");
                poisoned.into_inner()
            }
        }
    }

    fn write_arena(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn BuildRule>>> {
        match self.arena.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("recovering poisoned rule arena");
                poisoned.into_inner()
            }
        }
    }
}

fn kind_mismatch<T: TypedRule>(target: BuildTarget, actual: RuleKind) -> DeriveError {
    DeriveError::RuleKindMismatch {
        target,
        expected: T::KIND.as_str(),
        actual: actual.as_str(),
    }
}

/// Take a mutex guard, recovering it if a panicking holder poisoned the lock.
pub(crate) fn recover<'a, T>(
    result: std::sync::LockResult<MutexGuard<'a, T>>,
    what: &str,
) -> MutexGuard<'a, T> {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(lock = what, "recovering poisoned lock");
            poisoned.into_inner()
        }
    }
}
