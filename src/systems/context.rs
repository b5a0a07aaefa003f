//! Hook contexts.
//!
//! Hooks run inline in the middle of an update or draw, while the
//! engine's program, buffers and mesh are bound. They reach the device
//! only through [`GlobalGpuState`], which marks code that mutates the
//! shared binding state. A hook that changes a binding point must restore
//! it before returning.

use super::render::set_vertex_attribute;
use crate::error::EngineError;
use crate::gpu::{Buffer, GpuDevice, ShaderStage, UniformValue};
use crate::particle::{ParticleBuffers, ParticleError};
use crate::program::{ComputeProgram, ProgramError, RenderProgram};

/// Hook run before or after one compute action.
pub type UpdateHook = dyn FnMut(&mut UpdateContext<'_>);

/// Hook run before or after drawing a particle system.
pub type RenderHook = dyn FnMut(&mut DrawContext<'_>);

/// Capability to mutate the device's global binding state.
pub struct GlobalGpuState<'a> {
    device: &'a mut dyn GpuDevice,
}

impl<'a> GlobalGpuState<'a> {
    pub(crate) fn new(device: &'a mut dyn GpuDevice) -> Self {
        Self { device }
    }

    /// The device. Bindings changed through it must be restored before
    /// the hook returns.
    pub fn device(&mut self) -> &mut dyn GpuDevice {
        self.device
    }
}

/// What a compute hook can see and touch.
pub struct UpdateContext<'a> {
    pub(crate) particle_count: u32,
    pub(crate) buffers: &'a mut ParticleBuffers,
    pub(crate) program: &'a mut ComputeProgram,
    pub(crate) gpu: GlobalGpuState<'a>,
}

impl<'a> UpdateContext<'a> {
    /// Particles in the system being updated.
    #[must_use]
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// The system's buffers.
    #[must_use]
    pub fn buffers(&self) -> &ParticleBuffers {
        self.buffers
    }

    /// Mutable buffers, e.g. for swapping attributes between passes.
    pub fn buffers_mut(&mut self) -> &mut ParticleBuffers {
        self.buffers
    }

    /// The compute program of the current action.
    #[must_use]
    pub fn program(&self) -> &ComputeProgram {
        self.program
    }

    /// Mutable compute program of the current action.
    pub fn program_mut(&mut self) -> &mut ComputeProgram {
        self.program
    }

    /// Device access.
    pub fn gpu(&mut self) -> &mut GlobalGpuState<'a> {
        &mut self.gpu
    }

    /// Select a compute subroutine for this dispatch.
    ///
    /// # Errors
    ///
    /// See [`crate::program::ShaderProgram::select_subroutine`].
    pub fn select_subroutine(
        &mut self,
        selector: &str,
        subroutine: &str,
    ) -> Result<(), ProgramError> {
        self.program
            .select_subroutine(ShaderStage::Compute, selector, subroutine)
    }

    /// Write a default-block uniform of the current program.
    ///
    /// # Errors
    ///
    /// See [`crate::program::ShaderProgram::set_uniform`].
    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), ProgramError> {
        self.program.set_uniform(self.gpu.device, name, value)
    }

    /// Exchange two attribute buffers.
    ///
    /// # Errors
    ///
    /// See [`ParticleBuffers::swap_attributes`].
    pub fn swap_attributes(&mut self, first: &str, second: &str) -> Result<(), ParticleError> {
        self.buffers.swap_attributes(first, second)
    }
}

/// What a render hook can see and touch.
pub struct DrawContext<'a> {
    pub(crate) particle_count: u32,
    pub(crate) buffers: &'a mut ParticleBuffers,
    pub(crate) program: &'a mut RenderProgram,
    pub(crate) gpu: GlobalGpuState<'a>,
    pub(crate) attribute_bindings: &'a mut Vec<u32>,
}

impl<'a> DrawContext<'a> {
    /// Particles in the system being drawn.
    #[must_use]
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// The system's buffers.
    #[must_use]
    pub fn buffers(&self) -> &ParticleBuffers {
        self.buffers
    }

    /// Mutable buffers.
    pub fn buffers_mut(&mut self) -> &mut ParticleBuffers {
        self.buffers
    }

    /// The material's render program.
    #[must_use]
    pub fn program(&self) -> &RenderProgram {
        self.program
    }

    /// Mutable render program.
    pub fn program_mut(&mut self) -> &mut RenderProgram {
        self.program
    }

    /// Device access.
    pub fn gpu(&mut self) -> &mut GlobalGpuState<'a> {
        &mut self.gpu
    }

    /// Select a subroutine of `stage` for this draw.
    ///
    /// # Errors
    ///
    /// See [`crate::program::ShaderProgram::select_subroutine`].
    pub fn select_subroutine(
        &mut self,
        stage: ShaderStage,
        selector: &str,
        subroutine: &str,
    ) -> Result<(), ProgramError> {
        self.program.select_subroutine(stage, selector, subroutine)
    }

    /// Write a default-block uniform of the current program.
    ///
    /// # Errors
    ///
    /// See [`crate::program::ShaderProgram::set_uniform`].
    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), ProgramError> {
        self.program.set_uniform(self.gpu.device, name, value)
    }

    /// Source vertex attribute `name` from `buffer` for this draw. The
    /// attribute is disabled again when the draw completes.
    ///
    /// # Errors
    ///
    /// Fails when the program has no such attribute or the buffer's
    /// element type cannot feed an attribute.
    pub fn set_vertex_attribute(
        &mut self,
        name: &str,
        buffer: &Buffer,
        instanced: bool,
    ) -> Result<u32, ProgramError> {
        set_vertex_attribute(
            self.gpu.device,
            self.program,
            self.attribute_bindings,
            name,
            buffer,
            instanced,
        )
    }

    /// Source vertex attribute `name` from the particle attribute buffer
    /// `attribute`, one item per instance.
    ///
    /// # Errors
    ///
    /// Fails when the particle system has no such attribute, or as
    /// [`set_vertex_attribute`](Self::set_vertex_attribute) does.
    pub fn set_particle_attribute(
        &mut self,
        name: &str,
        attribute: &str,
    ) -> Result<u32, EngineError> {
        let buffer = self
            .buffers
            .attribute(attribute)
            .ok_or_else(|| ParticleError::UnknownAttribute(attribute.to_owned()))?;
        Ok(set_vertex_attribute(
            self.gpu.device,
            self.program,
            self.attribute_bindings,
            name,
            buffer,
            true,
        )?)
    }
}
