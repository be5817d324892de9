//! Render dispatch: the local engine path and the server upload pipeline

pub mod cloud;
pub mod local;

pub use cloud::{CloudRenderer, RenderRequest, RenderStage};
pub use local::LocalRenderer;
