mod error;
mod graph;
mod order;
mod resolve;
mod types;

pub use error::ResolveError;
pub use graph::DependencyGraph;
pub use resolve::Resolver;
pub use types::ResolvedPlan;

#[cfg(test)]
mod tests;
