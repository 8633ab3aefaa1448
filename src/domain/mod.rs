//! Domain logic - pure release rules independent of git operations

pub mod graph;
pub mod tag;
pub mod version;

pub use graph::{dependents_to_update, DependencyGraph};
pub use tag::TagPattern;
pub use version::{resolve_next_version, BumpPolicy, Version};
