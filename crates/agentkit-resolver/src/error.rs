use thiserror::Error;

use agentkit_core::ComponentId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown component '{0}'")]
    UnknownComponent(ComponentId),

    #[error("component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        component: ComponentId,
        dependency: ComponentId,
    },

    #[error("dependency cycle detected involving: {}", join_ids(.0))]
    DependencyCycle(Vec<ComponentId>),
}

fn join_ids(ids: &[ComponentId]) -> String {
    ids.iter()
        .map(ComponentId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
