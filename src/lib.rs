//! Scene Engine: procedural scene spawning with playability guarantees.
//!
//! Authored scene templates are validated before they are stored, placed
//! into a world of locations, NPCs and routes at spawn time, and turned into
//! concrete player actions lazily, the first time a player looks. Every
//! spawned scene is checked for soft-lock risk before it becomes visible.

pub mod core;
pub mod schema;

pub use crate::core::engine::{EngineError, ExecutionError, ExecutionSummary, SceneEngine};
pub use crate::core::instantiator::SceneSpawnContext;
pub use crate::core::store::TemplateStore;
pub use crate::core::world::WorldStore;
