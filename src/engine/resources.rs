//! Program, mesh and material management for [`Engine`].

use std::path::Path;

use glam::Vec3;

use super::Engine;
use crate::error::EngineError;
use crate::gpu::GpuDevice;
use crate::program::{
    ComputeProgram, ComputeProgramId, ProgramService, RenderProgram,
    RenderProgramId, RenderSources,
};
use crate::resources::{
    Material, MaterialId, MaterialManager, Mesh, MeshId, MeshManager,
    RenderType,
};

// ── Programs ──

impl<D: GpuDevice> Engine<D> {
    /// Register WGSL source `text` under `name`.
    ///
    /// # Errors
    ///
    /// Fails when the source does not parse as an importable module.
    pub fn add_source(&mut self, name: &str, text: &str) -> Result<(), EngineError> {
        Ok(self.programs.add_source(name, text)?)
    }

    /// Register the contents of `path` under `name`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or registered.
    pub fn add_source_file(&mut self, path: &Path, name: &str) -> Result<(), EngineError> {
        Ok(self.programs.add_source_file(path, name)?)
    }

    /// Register every `*.wgsl` file below `dir`, named `prefix` plus the
    /// path relative to `dir`. Returns how many were added.
    ///
    /// # Errors
    ///
    /// Fails when the directory or a file cannot be read or registered.
    pub fn add_source_directory(&mut self, dir: &Path, prefix: &str) -> Result<usize, EngineError> {
        Ok(self.programs.add_source_directory(dir, prefix)?)
    }

    /// Create and build a compute program from library source `source`.
    ///
    /// # Errors
    ///
    /// See [`ProgramService::create_compute_program`].
    pub fn create_compute_program(
        &mut self,
        key: &str,
        source: &str,
    ) -> Result<ComputeProgramId, EngineError> {
        Ok(self
            .programs
            .create_compute_program(&mut self.device, key, source)?)
    }

    /// Create and build a render program from library sources.
    ///
    /// # Errors
    ///
    /// See [`ProgramService::create_render_program`].
    pub fn create_render_program(
        &mut self,
        key: &str,
        sources: &RenderSources,
    ) -> Result<RenderProgramId, EngineError> {
        Ok(self
            .programs
            .create_render_program(&mut self.device, key, sources)?)
    }

    /// Set the patch size of a tessellated render program, clamped to the
    /// device limit. Returns `false` for an unknown id.
    pub fn set_tessellation_patch_size(&mut self, id: RenderProgramId, size: u32) -> bool {
        let limits = self.device.limits();
        self.programs
            .render_program_mut(id)
            .map(|program| program.set_tessellation_patch_size(size, limits))
            .is_some()
    }

    /// Compute program `id`.
    #[must_use]
    pub fn compute_program(&self, id: ComputeProgramId) -> Option<&ComputeProgram> {
        self.programs.compute_program(id)
    }

    /// Render program `id`.
    #[must_use]
    pub fn render_program(&self, id: RenderProgramId) -> Option<&RenderProgram> {
        self.programs.render_program(id)
    }

    /// The built-in point program.
    #[must_use]
    pub fn default_program(&self) -> RenderProgramId {
        self.default_program
    }

    /// The program service.
    #[must_use]
    pub fn programs(&self) -> &ProgramService {
        &self.programs
    }

    /// Mutable program service, paired with the device for calls that
    /// need it.
    pub fn programs_mut(&mut self) -> (&mut ProgramService, &mut dyn GpuDevice) {
        let device: &mut dyn GpuDevice = &mut self.device;
        (&mut self.programs, device)
    }
}

// ── Meshes and materials ──

impl<D: GpuDevice> Engine<D> {
    /// Upload a mesh under `key`.
    ///
    /// # Errors
    ///
    /// See [`MeshManager::create_mesh`].
    pub fn create_mesh(
        &mut self,
        key: &str,
        vertices: &[Vec3],
        indices: &[u32],
    ) -> Result<MeshId, EngineError> {
        Ok(self
            .meshes
            .create_mesh(&mut self.device, key, vertices, indices)?)
    }

    /// Upload a unit icosahedron under `key`.
    ///
    /// # Errors
    ///
    /// Fails when `key` is taken.
    pub fn create_icosahedron(&mut self, key: &str) -> Result<MeshId, EngineError> {
        Ok(self.meshes.create_icosahedron(&mut self.device, key)?)
    }

    /// Register a material drawing with render program `program`.
    ///
    /// # Errors
    ///
    /// Fails when `key` is taken.
    pub fn create_material(
        &mut self,
        key: &str,
        program: RenderProgramId,
        render_type: RenderType,
    ) -> Result<MaterialId, EngineError> {
        Ok(self.materials.create_material(key, program, render_type)?)
    }

    /// The built-in single-point mesh.
    #[must_use]
    pub fn default_mesh(&self) -> MeshId {
        self.default_mesh
    }

    /// The built-in point material.
    #[must_use]
    pub fn default_material(&self) -> MaterialId {
        self.default_material
    }

    /// Mesh `id`.
    #[must_use]
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    /// Material `id`.
    #[must_use]
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// The mesh registry.
    #[must_use]
    pub fn meshes(&self) -> &MeshManager {
        &self.meshes
    }

    /// The material registry.
    #[must_use]
    pub fn materials(&self) -> &MaterialManager {
        &self.materials
    }
}
