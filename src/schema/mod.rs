pub mod action;
pub mod entity;
pub mod marker;
pub mod placement;
pub mod requirement;
pub mod scene;
pub mod template;
