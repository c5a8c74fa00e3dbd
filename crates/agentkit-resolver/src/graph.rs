use std::collections::{BTreeMap, BTreeSet};

use agentkit_core::{Catalog, ComponentId};

use crate::error::ResolveError;

/// Declared prerequisite edges between components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<ComponentId, BTreeSet<ComponentId>>,
}

impl DependencyGraph {
    pub fn new<I, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (ComponentId, D)>,
        D: IntoIterator<Item = ComponentId>,
    {
        let mut graph = Self::default();
        for (component, dependencies) in edges {
            graph
                .edges
                .entry(component)
                .or_default()
                .extend(dependencies);
        }
        graph
    }

    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(catalog.dependency_edges())
    }

    pub fn contains(&self, component: &str) -> bool {
        self.edges.contains_key(component)
    }

    pub(crate) fn dependencies_of(&self, component: &str) -> Option<&BTreeSet<ComponentId>> {
        self.edges.get(component)
    }

    /// Transitive dependency closure of `roots`, roots included.
    ///
    /// Walks with an explicit stack and visited set, so cyclic graphs terminate here
    /// and are reported later by the ordering pass.
    pub fn closure<'a, I>(&self, roots: I) -> Result<BTreeSet<ComponentId>, ResolveError>
    where
        I: IntoIterator<Item = &'a ComponentId>,
    {
        let mut visited = BTreeSet::new();
        let mut stack = Vec::new();

        for root in roots {
            if !self.contains(root.as_str()) {
                return Err(ResolveError::UnknownComponent(root.clone()));
            }
            stack.push(root.clone());
        }

        while let Some(component) = stack.pop() {
            if visited.contains(&component) {
                continue;
            }
            let dependencies = self
                .dependencies_of(component.as_str())
                .ok_or_else(|| ResolveError::UnknownComponent(component.clone()))?;
            for dependency in dependencies {
                if !self.contains(dependency.as_str()) {
                    return Err(ResolveError::UnknownDependency {
                        component: component.clone(),
                        dependency: dependency.clone(),
                    });
                }
                if !visited.contains(dependency) {
                    stack.push(dependency.clone());
                }
            }
            visited.insert(component);
        }

        Ok(visited)
    }
}
