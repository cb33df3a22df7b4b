//! Cycle detection for the target graph.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::TargetNode;
use crate::target::UnflavouredTarget;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

pub(super) struct CycleDetectionReport {
    pub(super) cycle: Option<Vec<UnflavouredTarget>>,
    pub(super) missing_dependencies: Vec<(UnflavouredTarget, UnflavouredTarget)>,
}

pub(super) fn analyse(nodes: &IndexMap<UnflavouredTarget, TargetNode>) -> CycleDetectionReport {
    let mut detector = CycleDetector::new(nodes);
    let mut cycle = None;
    for target in nodes.keys() {
        if detector.is_visited(target) {
            continue;
        }
        if let Some(found) = detector.visit(target) {
            cycle = Some(found);
            break;
        }
    }
    CycleDetectionReport {
        cycle,
        missing_dependencies: detector.missing_dependencies,
    }
}

struct CycleDetector<'a> {
    nodes: &'a IndexMap<UnflavouredTarget, TargetNode>,
    stack: Vec<&'a UnflavouredTarget>,
    states: HashMap<&'a UnflavouredTarget, VisitState>,
    missing_dependencies: Vec<(UnflavouredTarget, UnflavouredTarget)>,
}

impl<'a> CycleDetector<'a> {
    fn new(nodes: &'a IndexMap<UnflavouredTarget, TargetNode>) -> Self {
        Self {
            nodes,
            stack: Vec::new(),
            states: HashMap::new(),
            missing_dependencies: Vec::new(),
        }
    }

    fn is_visited(&self, target: &UnflavouredTarget) -> bool {
        matches!(self.states.get(target), Some(VisitState::Visited))
    }

    fn visit(&mut self, target: &'a UnflavouredTarget) -> Option<Vec<UnflavouredTarget>> {
        match self.states.get(target) {
            Some(VisitState::Visited) => return None,
            Some(VisitState::Visiting) => {
                let idx = self.stack.iter().position(|t| *t == target).unwrap_or(0);
                let mut cycle: Vec<UnflavouredTarget> =
                    self.stack.iter().skip(idx).map(|t| (*t).clone()).collect();
                cycle.push(target.clone());
                return Some(canonicalize_cycle(cycle));
            }
            None => {
                self.states.insert(target, VisitState::Visiting);
            }
        }

        self.stack.push(target);

        if let Some(node) = self.nodes.get(target) {
            for dep in node.args.all_deps() {
                let Some((key, _)) = self.nodes.get_key_value(dep) else {
                    tracing::debug!(
                        missing = %dep,
                        dependent = %target,
                        "dependency missing from target graph",
                    );
                    self.missing_dependencies
                        .push((target.clone(), dep.clone()));
                    continue;
                };
                if let Some(cycle) = self.visit(key) {
                    return Some(cycle);
                }
            }
        }

        self.stack.pop();
        self.states.insert(target, VisitState::Visited);
        None
    }
}

fn canonicalize_cycle(mut cycle: Vec<UnflavouredTarget>) -> Vec<UnflavouredTarget> {
    if cycle.len() < 2 {
        return cycle;
    }
    let len = cycle.len() - 1;
    let start = cycle
        .iter()
        .take(len)
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);
    let (prefix, suffix) = cycle.split_at_mut(len);
    prefix.rotate_left(start);
    if let (Some(first), Some(slot)) = (prefix.first().cloned(), suffix.first_mut()) {
        *slot = first;
    }
    cycle
}
