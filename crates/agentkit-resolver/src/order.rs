use std::collections::{BTreeMap, BTreeSet};

use agentkit_core::ComponentId;

use crate::error::ResolveError;
use crate::graph::DependencyGraph;

/// Kahn's algorithm over `closure`; ties break on ascending component id.
pub(crate) fn topo_order(
    graph: &DependencyGraph,
    closure: &BTreeSet<ComponentId>,
) -> Result<Vec<ComponentId>, ResolveError> {
    let mut reverse: BTreeMap<&ComponentId, BTreeSet<&ComponentId>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&ComponentId, usize> = BTreeMap::new();

    for name in closure {
        reverse.entry(name).or_default();
        in_degree.insert(name, 0);
    }

    for name in closure {
        let Some(dependency_set) = graph.dependencies_of(name.as_str()) else {
            continue;
        };
        for dep_name in dependency_set {
            let Some(dep_name) = closure.get(dep_name) else {
                continue;
            };
            reverse.entry(dep_name).or_default().insert(name);
            *in_degree.entry(name).or_default() += 1;
        }
    }

    let mut ready: BTreeSet<&ComponentId> = in_degree
        .iter()
        .filter_map(|(name, degree)| (*degree == 0).then_some(*name))
        .collect();
    let mut ordered = Vec::with_capacity(closure.len());

    while let Some(next) = ready.pop_first() {
        ordered.push(next.clone());
        if let Some(children) = reverse.get(next) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }
    }

    if ordered.len() != closure.len() {
        let cycle_nodes = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        return Err(ResolveError::DependencyCycle(cycle_nodes));
    }

    Ok(ordered)
}
