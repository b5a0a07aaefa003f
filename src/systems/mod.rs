//! Per-frame systems that bind particle buffers, run compute actions and
//! draw particle systems.

/// Name-based binding of particle buffers to program blocks.
pub mod binding;
/// Compute actions.
pub mod compute;
/// Hook contexts.
pub mod context;
/// Instanced particle drawing.
pub mod render;

pub use binding::{bind_particle_buffers, unbind_particle_buffers, BindReport};
pub use compute::ComputeSystem;
pub use context::{
    DrawContext, GlobalGpuState, RenderHook, UpdateContext, UpdateHook,
};
pub use render::RenderSystem;
