pub mod engine;
pub mod instantiator;
pub mod narrative;
pub mod placement;
pub mod playability;
pub mod query;
pub mod rewards;
pub mod store;
pub mod text;
pub mod validation;
pub mod world;
