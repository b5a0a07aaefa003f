use std::ops::{Deref, DerefMut};

use super::{ProgramError, ShaderProgram};
use crate::gpu::{GpuDevice, ShaderLibrary, ShaderStage};

/// A single-stage compute program.
#[derive(Debug)]
pub struct ComputeProgram {
    program: ShaderProgram,
    workgroup_size: [u32; 3],
}

impl ComputeProgram {
    pub(crate) fn new(label: impl Into<String>, source: &str) -> Result<Self, ProgramError> {
        let mut program = ShaderProgram::new(label);
        program.add_stage(ShaderStage::Compute, source)?;
        Ok(Self {
            program,
            workgroup_size: [0; 3],
        })
    }

    /// Build the program and record its work-group size.
    ///
    /// # Errors
    ///
    /// See [`ShaderProgram::build`].
    pub fn build(
        &mut self,
        device: &mut dyn GpuDevice,
        library: &mut ShaderLibrary,
    ) -> Result<(), ProgramError> {
        self.program.build(device, library)?;
        self.workgroup_size =
            self.program.reflection().workgroup_size.unwrap_or([1; 3]);
        Ok(())
    }

    /// Local work-group dimensions, zero until built.
    #[must_use]
    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    /// Invocations per work group, zero until built.
    #[must_use]
    pub fn work_items_per_group(&self) -> u32 {
        self.workgroup_size.iter().product()
    }

    /// Work groups needed to give each of `particle_count` particles one
    /// invocation.
    #[must_use]
    pub fn groups_for(&self, particle_count: u32) -> u32 {
        match self.work_items_per_group() {
            0 => 0,
            items => particle_count.div_ceil(items),
        }
    }

    /// Destroy the device program and its stages.
    pub fn release(self, device: &mut dyn GpuDevice) {
        self.program.release(device);
    }
}

impl Deref for ComputeProgram {
    type Target = ShaderProgram;

    fn deref(&self) -> &ShaderProgram {
        &self.program
    }
}

impl DerefMut for ComputeProgram {
    fn deref_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }
}
