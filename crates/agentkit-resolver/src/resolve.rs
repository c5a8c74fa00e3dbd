use std::collections::BTreeSet;

use agentkit_core::{AgentId, Catalog, ComponentId, Selection};
use tracing::debug;

use crate::error::ResolveError;
use crate::graph::DependencyGraph;
use crate::order::topo_order;
use crate::types::ResolvedPlan;

/// Expands selections against a fixed dependency graph and agent catalog.
#[derive(Debug, Clone)]
pub struct Resolver {
    graph: DependencyGraph,
    supported_agents: BTreeSet<AgentId>,
}

impl Resolver {
    pub fn new(graph: DependencyGraph, supported_agents: BTreeSet<AgentId>) -> Self {
        Self {
            graph,
            supported_agents,
        }
    }

    pub fn from_catalog(catalog: &Catalog, supported_agents: BTreeSet<AgentId>) -> Self {
        Self::new(DependencyGraph::from_catalog(catalog), supported_agents)
    }

    pub fn resolve(&self, selection: &Selection) -> Result<ResolvedPlan, ResolveError> {
        let requested: BTreeSet<&ComponentId> = selection.components.iter().collect();
        let closure = self.graph.closure(requested.iter().copied())?;
        let ordered_components = topo_order(&self.graph, &closure)?;

        let added_dependencies = ordered_components
            .iter()
            .filter(|component| !requested.contains(component))
            .cloned()
            .collect::<Vec<_>>();

        let (supported_agents, unsupported_agents): (Vec<AgentId>, Vec<AgentId>) = selection
            .agents
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .partition(|agent| self.supported_agents.contains(agent));

        debug!(
            ordered = ordered_components.len(),
            added = added_dependencies.len(),
            unsupported = unsupported_agents.len(),
            "resolved selection"
        );

        Ok(ResolvedPlan {
            ordered_components,
            added_dependencies,
            supported_agents,
            unsupported_agents,
        })
    }
}
