//! Breadth-first traversal over rule graphs.

use std::{collections::VecDeque, hash::Hash};

use indexmap::IndexSet;

use crate::error::Result;
use crate::registry::{RuleId, TypedRule};
use crate::resolver::RuleResolver;
use crate::target::Flavour;

/// Visit every node reachable from `roots` exactly once, breadth first.
///
/// `visit` returns the successors of a node; they are enqueued in the order
/// returned. Nodes are yielded in discovery order. The first error aborts the
/// walk.
///
/// ```
/// use kasane::traversal::breadth_first;
///
/// let edges = |n: &u32| -> Result<Vec<u32>, ()> {
///     Ok(match n { 1 => vec![2, 3], 2 => vec![3, 4], _ => vec![] })
/// };
/// assert_eq!(breadth_first([1], edges), Ok(vec![1, 2, 3, 4]));
/// ```
///
/// # Errors
///
/// Propagates the first error returned by `visit`.
pub fn breadth_first<N, E, I, F>(roots: I, mut visit: F) -> std::result::Result<Vec<N>, E>
where
    N: Clone + Eq + Hash,
    I: IntoIterator<Item = N>,
    F: FnMut(&N) -> std::result::Result<Vec<N>, E>,
{
    let mut explored: IndexSet<N> = IndexSet::new();
    let mut queue = VecDeque::new();
    for root in roots {
        if explored.insert(root.clone()) {
            queue.push_back(root);
        }
    }
    while let Some(node) = queue.pop_front() {
        for next in visit(&node)? {
            if explored.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }
    Ok(explored.into_iter().collect())
}

/// Require the `flavours` counterpart of every library reachable from
/// `deps`, typed as `T`.
///
/// Library nodes contribute their flavoured counterpart and are expanded
/// through their build dependencies. Any other node ends the walk along that
/// path without contributing.
///
/// # Errors
///
/// Propagates resolution failures and returns
/// [`DeriveError::RuleKindMismatch`](crate::error::DeriveError::RuleKindMismatch)
/// when a counterpart is not a `T`.
pub fn require_transitive_libraries<T: TypedRule>(
    resolver: &RuleResolver,
    deps: &[RuleId],
    flavours: &[Flavour],
) -> Result<IndexSet<RuleId>> {
    let mut counterparts = IndexSet::new();
    breadth_first(deps.iter().copied(), |id| -> Result<Vec<RuleId>> {
        let rule = resolver.rule(*id)?;
        if !rule.kind().is_library() {
            return Ok(Vec::new());
        }
        let derived = rule
            .target()
            .with_appended_flavours(flavours.iter().cloned());
        let derived_id = resolver.require_rule(&derived)?;
        resolver.typed::<T>(derived_id)?;
        counterparts.insert(derived_id);
        Ok(rule.build_deps().to_vec())
    })?;
    Ok(counterparts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn graph(node: &char) -> std::result::Result<Vec<char>, String> {
        Ok(match node {
            'a' => vec!['b', 'c'],
            'b' => vec!['d'],
            'c' => vec!['d', 'a'],
            _ => Vec::new(),
        })
    }

    #[rstest]
    fn visits_each_node_once_in_discovery_order() {
        assert_eq!(breadth_first(['a'], graph), Ok(vec!['a', 'b', 'c', 'd']));
    }

    #[rstest]
    fn duplicate_roots_are_collapsed() {
        assert_eq!(breadth_first(['d', 'd'], graph), Ok(vec!['d']));
    }

    #[rstest]
    fn first_error_aborts() {
        let mut visited = Vec::new();
        let result = breadth_first(['a'], |n: &char| {
            visited.push(*n);
            if *n == 'b' {
                Err("boom".to_owned())
            } else {
                graph(n)
            }
        });
        assert_eq!(result, Err("boom".to_owned()));
        assert_eq!(visited, vec!['a', 'b']);
    }
}
