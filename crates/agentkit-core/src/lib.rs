mod catalog;
mod ids;
mod platform;
mod selection;
mod strategy;

pub use catalog::{AgentPaths, AgentSpec, Catalog, ComponentSpec};
pub use ids::{AgentId, ComponentId};
pub use platform::PlatformProfile;
pub use selection::Selection;
pub use strategy::{McpStrategy, PackageManager, SystemPromptStrategy};
