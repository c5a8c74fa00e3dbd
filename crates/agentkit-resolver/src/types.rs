use serde::Serialize;

use agentkit_core::{AgentId, ComponentId};

/// Output of one resolution. Built once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPlan {
    /// Install order: every component follows all of its dependencies.
    pub ordered_components: Vec<ComponentId>,
    /// Components pulled in only as dependencies, in install order.
    pub added_dependencies: Vec<ComponentId>,
    pub supported_agents: Vec<AgentId>,
    pub unsupported_agents: Vec<AgentId>,
}
