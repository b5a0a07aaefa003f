use std::path::Path;

use rustc_hash::FxHashMap;

use super::{ComputeProgram, ProgramError, RenderProgram};
use crate::gpu::{GpuDevice, ShaderLibrary, ShaderStage};

/// Library name of the built-in point shader.
pub const DEFAULT_POINTS_SOURCE: &str = "nebula/default_points.wgsl";

/// Registry key of the built-in render program.
pub const DEFAULT_RENDER_PROGRAM: &str = "nebula/default";

/// Id of a compute program owned by a [`ProgramService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputeProgramId(pub(crate) usize);

/// Id of a render program owned by a [`ProgramService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderProgramId(pub(crate) usize);

/// Library source names for the stages of a render program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSources {
    /// Vertex stage source.
    pub vertex: String,
    /// Fragment stage source.
    pub fragment: String,
    /// Optional tessellation control stage source.
    pub tess_control: Option<String>,
    /// Optional tessellation evaluation stage source.
    pub tess_evaluation: Option<String>,
    /// Optional geometry stage source.
    pub geometry: Option<String>,
}

impl RenderSources {
    /// Vertex and fragment stages only.
    #[must_use]
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            tess_control: None,
            tess_evaluation: None,
            geometry: None,
        }
    }

    /// Add a tessellation control stage.
    #[must_use]
    pub fn with_tess_control(mut self, name: impl Into<String>) -> Self {
        self.tess_control = Some(name.into());
        self
    }

    /// Add a tessellation evaluation stage.
    #[must_use]
    pub fn with_tess_evaluation(mut self, name: impl Into<String>) -> Self {
        self.tess_evaluation = Some(name.into());
        self
    }

    /// Add a geometry stage.
    #[must_use]
    pub fn with_geometry(mut self, name: impl Into<String>) -> Self {
        self.geometry = Some(name.into());
        self
    }

    fn stages(&self) -> impl Iterator<Item = (ShaderStage, &str)> {
        [
            (ShaderStage::Vertex, Some(&self.vertex)),
            (ShaderStage::TessControl, self.tess_control.as_ref()),
            (ShaderStage::TessEvaluation, self.tess_evaluation.as_ref()),
            (ShaderStage::Geometry, self.geometry.as_ref()),
            (ShaderStage::Fragment, Some(&self.fragment)),
        ]
        .into_iter()
        .filter_map(|(stage, name)| name.map(|name| (stage, name.as_str())))
    }
}

/// Keyed registry of built programs and the shader sources they are built
/// from.
///
/// Programs are created already built. A key maps to exactly one program
/// for the lifetime of the service, so actions and materials can share a
/// program by id.
pub struct ProgramService {
    library: ShaderLibrary,
    compute: Vec<ComputeProgram>,
    compute_keys: FxHashMap<String, ComputeProgramId>,
    render: Vec<RenderProgram>,
    render_keys: FxHashMap<String, RenderProgramId>,
    default_patch_size: u32,
}

impl ProgramService {
    /// Empty registry. Render programs start with `default_patch_size`
    /// vertices per patch.
    #[must_use]
    pub fn new(default_patch_size: u32) -> Self {
        let mut library = ShaderLibrary::new();
        if let Err(e) = library.add_source(
            DEFAULT_POINTS_SOURCE,
            include_str!("../../assets/shaders/default_points.wgsl"),
        ) {
            log::error!("ProgramService: built-in shader rejected: {e}");
        }
        Self {
            library,
            compute: Vec::new(),
            compute_keys: FxHashMap::default(),
            render: Vec::new(),
            render_keys: FxHashMap::default(),
            default_patch_size: default_patch_size.max(1),
        }
    }

    /// The source library.
    #[must_use]
    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    /// Mutable source library.
    pub fn library_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.library
    }

    /// Register a source under `name`.
    ///
    /// # Errors
    ///
    /// Fails when a composable module does not parse.
    pub fn add_source(&mut self, name: &str, text: &str) -> Result<(), ProgramError> {
        self.library.add_source(name, text).map_err(ProgramError::Library)
    }

    /// Register the file at `path` under `name`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not parse.
    pub fn add_source_file(&mut self, path: &Path, name: &str) -> Result<(), ProgramError> {
        self.library
            .add_source_file(path, name)
            .map_err(ProgramError::Library)
    }

    /// Register every `*.wgsl` file below `dir`, named `prefix` plus the
    /// path relative to `dir`. Returns the number of sources added.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable or unparsable file.
    pub fn add_source_directory(
        &mut self,
        dir: &Path,
        prefix: &str,
    ) -> Result<usize, ProgramError> {
        self.library
            .add_source_directory(dir, prefix)
            .map_err(ProgramError::Library)
    }

    fn source_text(&self, name: &str) -> Result<String, ProgramError> {
        self.library
            .source(name)
            .map(str::to_owned)
            .ok_or_else(|| ProgramError::MissingSource(name.to_owned()))
    }

    /// Create and build a compute program from the library source
    /// `source`.
    ///
    /// # Errors
    ///
    /// Fails when `key` is taken, when the source is missing, or when the
    /// build fails. Nothing is registered on failure.
    pub fn create_compute_program(
        &mut self,
        device: &mut dyn GpuDevice,
        key: &str,
        source: &str,
    ) -> Result<ComputeProgramId, ProgramError> {
        if self.compute_keys.contains_key(key) {
            log::warn!("ProgramService: compute program \"{key}\" already exists");
            return Err(ProgramError::DuplicateKey(key.to_owned()));
        }
        let text = self.source_text(source)?;
        let mut program = ComputeProgram::new(key, &text)?;
        if let Err(e) = program.build(device, &mut self.library) {
            log::error!("ProgramService: compiling compute program \"{key}\" failed");
            program.release(device);
            return Err(e);
        }

        let id = ComputeProgramId(self.compute.len());
        self.compute.push(program);
        let _ = self.compute_keys.insert(key.to_owned(), id);
        log::info!("ProgramService: compute program \"{key}\" created");
        Ok(id)
    }

    /// Create and build a render program from library sources.
    ///
    /// # Errors
    ///
    /// Fails when `key` is taken, when a source is missing, or when the
    /// build fails. Nothing is registered on failure.
    pub fn create_render_program(
        &mut self,
        device: &mut dyn GpuDevice,
        key: &str,
        sources: &RenderSources,
    ) -> Result<RenderProgramId, ProgramError> {
        if self.render_keys.contains_key(key) {
            log::warn!("ProgramService: render program \"{key}\" already exists");
            return Err(ProgramError::DuplicateKey(key.to_owned()));
        }
        let texts = sources
            .stages()
            .map(|(stage, name)| Ok((stage, self.source_text(name)?)))
            .collect::<Result<Vec<_>, ProgramError>>()?;
        let stages: Vec<(ShaderStage, &str)> = texts
            .iter()
            .map(|(stage, text)| (*stage, text.as_str()))
            .collect();
        let mut program = RenderProgram::new(key, &stages, self.default_patch_size)?;
        if let Err(e) = program.build(device, &mut self.library) {
            log::error!("ProgramService: compiling render program \"{key}\" failed");
            program.release(device);
            return Err(e);
        }

        let id = RenderProgramId(self.render.len());
        self.render.push(program);
        let _ = self.render_keys.insert(key.to_owned(), id);
        log::info!("ProgramService: render program \"{key}\" created");
        Ok(id)
    }

    /// The built-in render program: instanced points in `color`. Created on
    /// first use.
    ///
    /// # Errors
    ///
    /// Fails when the built-in program does not build on this device.
    pub fn default_render_program(
        &mut self,
        device: &mut dyn GpuDevice,
        color: [f32; 4],
    ) -> Result<RenderProgramId, ProgramError> {
        if let Some(id) = self.find_render_program(DEFAULT_RENDER_PROGRAM) {
            return Ok(id);
        }
        let sources = RenderSources::new(DEFAULT_POINTS_SOURCE, DEFAULT_POINTS_SOURCE);
        let id = self.create_render_program(device, DEFAULT_RENDER_PROGRAM, &sources)?;
        self.render[id.0].set_uniform(device, "point_color", glam::Vec4::from_array(color))?;
        Ok(id)
    }

    /// Id of the compute program registered under `key`.
    #[must_use]
    pub fn find_compute_program(&self, key: &str) -> Option<ComputeProgramId> {
        self.compute_keys.get(key).copied()
    }

    /// Id of the render program registered under `key`.
    #[must_use]
    pub fn find_render_program(&self, key: &str) -> Option<RenderProgramId> {
        self.render_keys.get(key).copied()
    }

    /// Compute program by id.
    #[must_use]
    pub fn compute_program(&self, id: ComputeProgramId) -> Option<&ComputeProgram> {
        self.compute.get(id.0)
    }

    /// Mutable compute program by id.
    pub fn compute_program_mut(&mut self, id: ComputeProgramId) -> Option<&mut ComputeProgram> {
        self.compute.get_mut(id.0)
    }

    /// Render program by id.
    #[must_use]
    pub fn render_program(&self, id: RenderProgramId) -> Option<&RenderProgram> {
        self.render.get(id.0)
    }

    /// Mutable render program by id.
    pub fn render_program_mut(&mut self, id: RenderProgramId) -> Option<&mut RenderProgram> {
        self.render.get_mut(id.0)
    }

    /// Number of registered programs, compute and render.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compute.len() + self.render.len()
    }

    /// Whether no program is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy every program. Previously issued ids no longer resolve.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for program in self.compute.drain(..) {
            program.release(device);
        }
        for program in self.render.drain(..) {
            program.release(device);
        }
        self.compute_keys.clear();
        self.render_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::program::render::tests::SHADED;
    use crate::program::tests::INTEGRATE;

    fn service() -> ProgramService {
        let mut service = ProgramService::new(3);
        service.add_source("integrate.wgsl", INTEGRATE).unwrap();
        service.add_source("shaded.wgsl", SHADED).unwrap();
        service
    }

    #[test]
    fn programs_are_built_on_creation() {
        let mut device = HeadlessDevice::new();
        let mut service = service();
        let id = service
            .create_compute_program(&mut device, "integrate", "integrate.wgsl")
            .unwrap();
        let program = service.compute_program(id).unwrap();
        assert!(program.is_built());
        assert_eq!(program.work_items_per_group(), 64);
        assert_eq!(service.find_compute_program("integrate"), Some(id));
    }

    #[test]
    fn duplicate_keys_keep_the_first_program() {
        let mut device = HeadlessDevice::new();
        let mut service = service();
        let first = service
            .create_compute_program(&mut device, "integrate", "integrate.wgsl")
            .unwrap();
        let handle = service.compute_program(first).unwrap().handle();

        assert_eq!(
            service.create_compute_program(&mut device, "integrate", "integrate.wgsl"),
            Err(ProgramError::DuplicateKey("integrate".to_owned()))
        );
        assert_eq!(service.find_compute_program("integrate"), Some(first));
        assert_eq!(service.compute_program(first).unwrap().handle(), handle);
        assert_eq!(device.live_programs(), 1);
    }

    #[test]
    fn missing_or_broken_sources_register_nothing() {
        let mut device = HeadlessDevice::new();
        let mut service = service();
        service.add_source("broken.wgsl", "fn main( {").unwrap();

        assert_eq!(
            service.create_compute_program(&mut device, "a", "nowhere.wgsl"),
            Err(ProgramError::MissingSource("nowhere.wgsl".to_owned()))
        );
        assert!(matches!(
            service.create_compute_program(&mut device, "b", "broken.wgsl"),
            Err(ProgramError::StageCompile { .. })
        ));
        assert!(service.is_empty());
        assert_eq!(service.find_compute_program("b"), None);
    }

    #[test]
    fn render_programs_use_configured_patch_size() {
        let mut device = HeadlessDevice::new();
        let mut service = ProgramService::new(4);
        service.add_source("shaded.wgsl", SHADED).unwrap();
        let id = service
            .create_render_program(
                &mut device,
                "shaded",
                &RenderSources::new("shaded.wgsl", "shaded.wgsl"),
            )
            .unwrap();
        let program = service.render_program(id).unwrap();
        assert_eq!(program.tessellation_patch_size(), 4);
        assert_eq!(program.vertex_attribute_location("color"), Some(1));
    }

    #[test]
    fn default_program_is_created_once() {
        let mut device = HeadlessDevice::new();
        let mut service = ProgramService::new(3);
        let color = [1.0, 0.0, 0.0, 1.0];
        let id = service.default_render_program(&mut device, color).unwrap();
        assert_eq!(service.default_render_program(&mut device, color), Ok(id));

        let program = service.render_program(id).unwrap();
        assert_eq!(program.vertex_attribute_location("in_position"), Some(0));
        let location = program.uniform_location("point_color").unwrap();
        let bytes = device
            .program_uniform_bytes(program.handle().unwrap())
            .unwrap();
        let offset = location.offset as usize;
        assert_eq!(
            bytemuck::cast_slice::<u8, f32>(&bytes[offset..offset + 16]),
            &color
        );
    }

    #[test]
    fn release_invalidates_ids() {
        let mut device = HeadlessDevice::new();
        let mut service = service();
        let id = service
            .create_compute_program(&mut device, "integrate", "integrate.wgsl")
            .unwrap();
        let _ = service.default_render_program(&mut device, [1.0; 4]).unwrap();
        assert_eq!(device.live_programs(), 2);

        service.release(&mut device);
        assert_eq!(device.live_programs(), 0);
        assert!(service.compute_program(id).is_none());
        assert!(service.is_empty());
    }
}
