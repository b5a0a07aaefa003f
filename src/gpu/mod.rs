//! GPU resource management.
//!
//! Provides the binding-model device abstraction and its two backends,
//! typed buffers, shader reflection, and WGSL source composition.

/// Typed fixed-size buffers with binding tracking.
pub mod buffer;
/// Severity-filtered GPU diagnostics.
pub mod debug;
/// The `GpuDevice` state machine and its vocabulary types.
pub mod device;
/// Element type tags for buffer contents.
pub mod element;
/// Host-memory device used by tests and tooling.
pub mod headless;
/// Aligned host byte storage.
pub mod memory;
/// Shared wgpu boilerplate helpers for reflected layouts.
pub mod pipeline_helpers;
/// Shader interface reflection over naga IR.
pub mod reflect;
/// wgpu device and queue initialization.
pub mod render_context;
/// WGSL source registry with `#import` support via naga-oil.
pub mod shader_library;
/// Offscreen render targets.
pub mod texture;
/// wgpu-backed device.
pub mod wgpu_device;

pub use buffer::{Buffer, BufferError};
pub use debug::{DebugMessage, DebugOutput, DebugSeverity};
pub use device::{
    Barriers, BindingPoint, BufferHandle, BufferTarget, BufferUsage,
    DeviceLimits, GpuDevice, IndexType, ProgramHandle, ShaderStage, StageHandle, Topology,
    UniformValue, VertexArrayHandle,
};
pub use element::{ElementType, ScalarKind};
pub use headless::{DeviceCall, HeadlessDevice};
pub use render_context::{GpuContext, GpuInitError};
pub use shader_library::ShaderLibrary;
pub use texture::RenderTarget;
pub use wgpu_device::WgpuDevice;
