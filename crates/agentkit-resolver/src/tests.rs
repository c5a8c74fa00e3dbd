use std::collections::{BTreeMap, BTreeSet};

use agentkit_core::{AgentId, Catalog, ComponentId, Selection};

use super::*;

fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
    DependencyGraph::new(edges.iter().map(|(name, deps)| {
        (
            ComponentId::from(*name),
            deps.iter().map(|dep| ComponentId::from(*dep)).collect::<Vec<_>>(),
        )
    }))
}

fn ids(names: &[&str]) -> Vec<ComponentId> {
    names.iter().map(|name| ComponentId::from(*name)).collect()
}

fn resolver(graph: DependencyGraph) -> Resolver {
    Resolver::new(graph, BTreeSet::new())
}

fn position(order: &[ComponentId], name: &ComponentId) -> usize {
    order
        .iter()
        .position(|candidate| candidate == name)
        .expect("component must be ordered")
}

#[test]
fn resolves_transitive_dependencies_in_dependency_first_order() {
    let graph = graph(&[("skills", &["sdd"]), ("sdd", &["engram"]), ("engram", &[])]);
    let plan = resolver(graph)
        .resolve(&Selection::new(Vec::<&str>::new(), ["skills"]))
        .expect("must resolve");

    assert_eq!(plan.ordered_components, ids(&["engram", "sdd", "skills"]));
    assert_eq!(plan.added_dependencies, ids(&["engram", "sdd"]));
}

#[test]
fn ready_ties_break_on_ascending_identifier() {
    let graph = graph(&[
        ("zeta", &[]),
        ("alpha", &[]),
        ("mid", &["zeta", "alpha"]),
        ("beta", &[]),
    ]);
    let plan = resolver(graph)
        .resolve(&Selection::new(
            Vec::<&str>::new(),
            ["mid", "beta", "zeta", "alpha"],
        ))
        .expect("must resolve");

    assert_eq!(
        plan.ordered_components,
        ids(&["alpha", "beta", "zeta", "mid"])
    );
    assert!(plan.added_dependencies.is_empty());
}

#[test]
fn selection_order_and_duplicates_do_not_change_the_plan() {
    let edges: &[(&str, &[&str])] = &[
        ("app", &["lib", "log"]),
        ("lib", &["zlib"]),
        ("log", &[]),
        ("zlib", &[]),
    ];
    let first = resolver(graph(edges))
        .resolve(&Selection::new(Vec::<&str>::new(), ["app", "log"]))
        .expect("must resolve");
    let second = resolver(graph(edges))
        .resolve(&Selection::new(
            Vec::<&str>::new(),
            ["log", "app", "log", "app"],
        ))
        .expect("must resolve");

    assert_eq!(first, second);
    assert_eq!(first.ordered_components, ids(&["log", "zlib", "lib", "app"]));
    assert_eq!(first.added_dependencies, ids(&["zlib", "lib"]));
}

#[test]
fn every_component_follows_its_transitive_dependencies() {
    // Deterministic pseudo-random DAGs: edges only point to lower-numbered nodes.
    let mut seed = 0x2545_f491_4f6c_dd1d_u64;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for _ in 0..50 {
        let node_count = 2 + (next() % 14) as usize;
        let names = (0..node_count)
            .map(|index| format!("c{index:02}"))
            .collect::<Vec<_>>();
        let mut edges: BTreeMap<ComponentId, Vec<ComponentId>> = BTreeMap::new();
        for (index, name) in names.iter().enumerate() {
            let deps = (0..index)
                .filter(|_| next() % 3 == 0)
                .map(|dep| ComponentId::from(names[dep].as_str()))
                .collect::<Vec<_>>();
            edges.insert(ComponentId::from(name.as_str()), deps);
        }

        let graph = DependencyGraph::new(edges.clone());
        let selected = names
            .iter()
            .filter(|_| next() % 2 == 0)
            .map(String::as_str)
            .collect::<Vec<_>>();
        let plan = resolver(graph.clone())
            .resolve(&Selection::new(Vec::<&str>::new(), selected.clone()))
            .expect("acyclic graph must resolve");

        let closure = graph
            .closure(ids(&selected).iter())
            .expect("closure must expand");
        assert_eq!(plan.ordered_components.len(), closure.len());

        for component in &plan.ordered_components {
            let own = position(&plan.ordered_components, component);
            let transitive = graph
                .closure(std::iter::once(component))
                .expect("closure must expand");
            for dependency in transitive.iter().filter(|dep| *dep != component) {
                assert!(
                    position(&plan.ordered_components, dependency) < own,
                    "{dependency} must precede {component}"
                );
            }
        }
    }
}

#[test]
fn cycle_yields_error_and_no_plan() {
    let graph = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
    let err = resolver(graph)
        .resolve(&Selection::new(Vec::<&str>::new(), ["a", "d"]))
        .expect_err("cycle must fail");

    assert_eq!(err, ResolveError::DependencyCycle(ids(&["a", "b", "c"])));
    assert_eq!(
        err.to_string(),
        "dependency cycle detected involving: a, b, c"
    );
}

#[test]
fn cycle_downstream_of_selection_is_reported_without_dependents() {
    let graph = graph(&[("top", &["x"]), ("x", &["y"]), ("y", &["x"])]);
    let err = resolver(graph)
        .resolve(&Selection::new(Vec::<&str>::new(), ["top"]))
        .expect_err("cycle must fail");

    // `top` never reaches zero in-degree either, since it waits on the cycle.
    assert_eq!(err, ResolveError::DependencyCycle(ids(&["top", "x", "y"])));
}

#[test]
fn unknown_selected_component_fails_resolution() {
    let graph = graph(&[("engram", &[])]);
    let err = resolver(graph)
        .resolve(&Selection::new(Vec::<&str>::new(), ["engram", "ghost"]))
        .expect_err("unknown component must fail");
    assert_eq!(err, ResolveError::UnknownComponent(ComponentId::from("ghost")));
}

#[test]
fn unknown_declared_dependency_fails_resolution() {
    let graph = graph(&[("sdd", &["engram"])]);
    let err = resolver(graph)
        .resolve(&Selection::new(Vec::<&str>::new(), ["sdd"]))
        .expect_err("unknown dependency must fail");
    assert_eq!(
        err,
        ResolveError::UnknownDependency {
            component: ComponentId::from("sdd"),
            dependency: ComponentId::from("engram"),
        }
    );
    assert_eq!(
        err.to_string(),
        "component 'sdd' depends on unknown component 'engram'"
    );
}

#[test]
fn empty_selection_resolves_to_empty_plan() {
    let plan = resolver(graph(&[("engram", &[])]))
        .resolve(&Selection::default())
        .expect("empty selection must resolve");
    assert!(plan.ordered_components.is_empty());
    assert!(plan.added_dependencies.is_empty());
}

#[test]
fn agents_are_partitioned_not_rejected() {
    let supported = ["claude-code", "opencode"]
        .into_iter()
        .map(AgentId::from)
        .collect::<BTreeSet<_>>();
    let resolver = Resolver::new(graph(&[("engram", &[])]), supported);
    let plan = resolver
        .resolve(&Selection::new(
            ["opencode", "vim", "claude-code", "opencode"],
            ["engram"],
        ))
        .expect("must resolve");

    assert_eq!(
        plan.supported_agents,
        vec![AgentId::from("claude-code"), AgentId::from("opencode")]
    );
    assert_eq!(plan.unsupported_agents, vec![AgentId::from("vim")]);
}

#[test]
fn builtin_catalog_resolves_skills_chain() {
    let catalog = Catalog::builtin().expect("builtin catalog must parse");
    let resolver = Resolver::from_catalog(&catalog, BTreeSet::new());
    let plan = resolver
        .resolve(&Selection::new(Vec::<&str>::new(), ["skills"]))
        .expect("must resolve");
    assert_eq!(plan.ordered_components, ids(&["engram", "sdd", "skills"]));
    assert_eq!(plan.added_dependencies, ids(&["engram", "sdd"]));
}
