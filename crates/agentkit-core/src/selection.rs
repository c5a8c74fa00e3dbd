use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ComponentId};

/// What the user asked for in one run. Order and duplicates carry no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub agents: Vec<AgentId>,
    #[serde(default)]
    pub components: Vec<ComponentId>,
}

impl Selection {
    pub fn new<A, C>(agents: A, components: C) -> Self
    where
        A: IntoIterator,
        A::Item: Into<AgentId>,
        C: IntoIterator,
        C::Item: Into<ComponentId>,
    {
        Self {
            agents: agents.into_iter().map(Into::into).collect(),
            components: components.into_iter().map(Into::into).collect(),
        }
    }
}
