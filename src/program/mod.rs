//! Compiled shader programs.
//!
//! A [`ShaderProgram`] collects per-stage sources, builds them exactly once
//! against a [`GpuDevice`], and afterwards resolves uniforms, blocks and
//! subroutine selectors by name through the reflected interface.
//! [`ComputeProgram`] and [`RenderProgram`] add the state the compute and
//! render passes read, and [`ProgramService`] is the keyed registry that
//! owns them.

/// Compute programs.
pub mod compute;
/// Render programs.
pub mod render;
/// Keyed program registry.
pub mod service;

use std::collections::BTreeMap;
use std::fmt;

pub use compute::ComputeProgram;
pub use render::RenderProgram;
pub use service::{ComputeProgramId, ProgramService, RenderProgramId, RenderSources};

use crate::gpu::reflect::{BlockKind, ProgramReflection, UniformLocation};
use crate::gpu::{
    Buffer, BufferError, BufferTarget, GpuDevice, ProgramHandle, ShaderLibrary,
    ShaderStage, StageHandle, UniformValue,
};

/// Errors produced while building or driving a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// The program was already built (or its build failed).
    AlreadyBuilt,
    /// A stage was given an empty source.
    EmptySource(ShaderStage),
    /// The source library holds no source under this name.
    MissingSource(String),
    /// A source could not be registered with the library.
    Library(String),
    /// A stage failed to parse or compile.
    StageCompile {
        /// Failing stage.
        stage: ShaderStage,
        /// Compiler log.
        log: String,
    },
    /// The compiled stages failed to link.
    Link(String),
    /// The program has not been built successfully.
    NotBuilt,
    /// No active uniform has this name.
    UnknownUniform(String),
    /// The value does not match the uniform's declared type.
    UniformType(String),
    /// No block of the requested kind has this name.
    UnknownBlock(String),
    /// No vertex attribute has this name.
    UnknownAttribute(String),
    /// The buffer's element type cannot feed the named vertex attribute.
    NotReflectable(String),
    /// The stage declares no subroutine selector with this name.
    UnknownSubroutineSelector {
        /// Stage searched.
        stage: ShaderStage,
        /// Selector name.
        name: String,
    },
    /// The selector accepts no subroutine with this name.
    UnknownSubroutine {
        /// Stage searched.
        stage: ShaderStage,
        /// Subroutine name.
        name: String,
    },
    /// A program with this key already exists.
    DuplicateKey(String),
    /// A buffer operation failed.
    Buffer(BufferError),
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBuilt => f.write_str("program was already built"),
            Self::EmptySource(stage) => write!(f, "empty {stage} source"),
            Self::MissingSource(name) => write!(f, "no shader source `{name}`"),
            Self::Library(msg) => write!(f, "shader library error: {msg}"),
            Self::StageCompile { stage, log } => {
                write!(f, "{stage} stage failed to compile: {log}")
            }
            Self::Link(log) => write!(f, "program failed to link: {log}"),
            Self::NotBuilt => f.write_str("program is not built"),
            Self::UnknownUniform(name) => write!(f, "no active uniform `{name}`"),
            Self::UniformType(name) => {
                write!(f, "value does not match the type of uniform `{name}`")
            }
            Self::UnknownBlock(name) => write!(f, "no block `{name}`"),
            Self::UnknownAttribute(name) => {
                write!(f, "no vertex attribute `{name}`")
            }
            Self::NotReflectable(name) => write!(
                f,
                "buffer element type cannot feed attribute `{name}`"
            ),
            Self::UnknownSubroutineSelector { stage, name } => {
                write!(f, "no such subroutine selector `{name}` in {stage} stage")
            }
            Self::UnknownSubroutine { stage, name } => {
                write!(f, "no such subroutine `{name}` in {stage} stage")
            }
            Self::DuplicateKey(key) => {
                write!(f, "a program named `{key}` already exists")
            }
            Self::Buffer(e) => write!(f, "buffer error: {e}"),
        }
    }
}

impl std::error::Error for ProgramError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for ProgramError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

/// Lifecycle of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildStatus {
    /// Accepting stages.
    #[default]
    NotBuilt,
    /// Linked and usable.
    Built,
    /// A build was attempted and failed. Terminal.
    Failed,
}

/// A set of shader stages linked into one executable program.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    status: BuildStatus,
    sources: BTreeMap<ShaderStage, String>,
    stages: Vec<StageHandle>,
    handle: Option<ProgramHandle>,
    reflection: ProgramReflection,
    selections: BTreeMap<ShaderStage, Vec<u32>>,
}

impl ShaderProgram {
    /// Unbuilt program with no stages.
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: BuildStatus::NotBuilt,
            sources: BTreeMap::new(),
            stages: Vec::new(),
            handle: None,
            reflection: ProgramReflection::default(),
            selections: BTreeMap::new(),
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Build state.
    #[must_use]
    pub fn status(&self) -> BuildStatus {
        self.status
    }

    /// Whether the program linked successfully.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.status == BuildStatus::Built
    }

    /// Device handle, once built.
    #[must_use]
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    /// Reflected interface. Empty until built.
    #[must_use]
    pub fn reflection(&self) -> &ProgramReflection {
        &self.reflection
    }

    /// Whether a source is attached for `stage`.
    #[must_use]
    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        self.sources.contains_key(&stage)
    }

    /// Attach the source of one stage. A second source for the same stage
    /// replaces the first.
    ///
    /// # Errors
    ///
    /// Fails once a build was attempted, or when `source` is blank.
    pub fn add_stage(&mut self, stage: ShaderStage, source: &str) -> Result<(), ProgramError> {
        if self.status != BuildStatus::NotBuilt {
            log::warn!(
                "ShaderProgram `{}`: cannot add a {stage} stage after building",
                self.label
            );
            return Err(ProgramError::AlreadyBuilt);
        }
        if source.trim().is_empty() {
            return Err(ProgramError::EmptySource(stage));
        }
        if self.sources.insert(stage, source.to_owned()).is_some() {
            log::warn!(
                "ShaderProgram `{}`: replacing the existing {stage} stage",
                self.label
            );
        }
        Ok(())
    }

    /// Compile every attached stage and link them. A program builds at
    /// most once: after any attempt, further calls fail and leave the
    /// program unchanged.
    ///
    /// # Errors
    ///
    /// Returns the first compile or link failure, or
    /// [`ProgramError::AlreadyBuilt`] on a repeated call.
    pub fn build(
        &mut self,
        device: &mut dyn GpuDevice,
        library: &mut ShaderLibrary,
    ) -> Result<(), ProgramError> {
        if self.status != BuildStatus::NotBuilt {
            log::warn!(
                "ShaderProgram `{}`: program was already built once",
                self.label
            );
            return Err(ProgramError::AlreadyBuilt);
        }

        match self.compile_and_link(device, library) {
            Ok((handle, reflection)) => {
                self.selections = reflection
                    .subroutines
                    .iter()
                    .filter(|(_, slots)| !slots.is_empty())
                    .map(|(stage, slots)| (*stage, vec![0; slots.len()]))
                    .collect();
                self.handle = Some(handle);
                self.reflection = reflection;
                self.status = BuildStatus::Built;
                log::debug!("ShaderProgram `{}`: built", self.label);
                Ok(())
            }
            Err(e) => {
                for stage in self.stages.drain(..) {
                    device.destroy_stage(stage);
                }
                self.status = BuildStatus::Failed;
                log::error!("ShaderProgram `{}`: {e}", self.label);
                Err(e)
            }
        }
    }

    fn compile_and_link(
        &mut self,
        device: &mut dyn GpuDevice,
        library: &mut ShaderLibrary,
    ) -> Result<(ProgramHandle, ProgramReflection), ProgramError> {
        for (&stage, source) in &self.sources {
            let path = format!("{}.{}", self.label, stage.name().replace(' ', "_"));
            let module = library
                .compose(source, &path)
                .map_err(|log| ProgramError::StageCompile { stage, log })?;
            let handle = device
                .compile_stage(stage, module)
                .map_err(|log| ProgramError::StageCompile { stage, log })?;
            self.stages.push(handle);
        }
        device.link_program(&self.stages).map_err(ProgramError::Link)
    }

    fn built_handle(&self) -> Result<ProgramHandle, ProgramError> {
        match (self.status, self.handle) {
            (BuildStatus::Built, Some(handle)) => Ok(handle),
            _ => Err(ProgramError::NotBuilt),
        }
    }

    /// Make this program current.
    ///
    /// # Errors
    ///
    /// Fails (and logs) when the program is not built.
    pub fn bind(&self, device: &mut dyn GpuDevice) -> Result<(), ProgramError> {
        let handle = self.built_handle().inspect_err(|_| {
            log::warn!(
                "ShaderProgram `{}`: binding a program that is not built",
                self.label
            );
        })?;
        device.use_program(Some(handle));
        Ok(())
    }

    /// Clear the current program.
    pub fn unbind(&self, device: &mut dyn GpuDevice) {
        device.use_program(None);
    }

    /// Location of a default-block uniform. `None` when unbuilt or when the
    /// program declares no such uniform.
    #[must_use]
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        if !self.is_built() {
            return None;
        }
        self.reflection.uniform(name)
    }

    /// Write a default-block uniform. Takes effect whether or not the
    /// program is current.
    ///
    /// # Errors
    ///
    /// Fails when unbuilt, when the uniform does not exist, or when the
    /// value does not match its type.
    pub fn set_uniform(
        &self,
        device: &mut dyn GpuDevice,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), ProgramError> {
        let handle = self.built_handle()?;
        let location = self
            .reflection
            .uniform(name)
            .ok_or_else(|| ProgramError::UnknownUniform(name.to_owned()))?;
        let value = value.into();
        if !value.fits(location.kind) {
            return Err(ProgramError::UniformType(name.to_owned()));
        }
        device.program_uniform(handle, location, value);
        Ok(())
    }

    /// Bind `buffer` to the storage block `name`. Returns the binding
    /// index used.
    ///
    /// # Errors
    ///
    /// Fails when unbuilt or when no storage block has this name.
    pub fn bind_storage_block(
        &self,
        device: &mut dyn GpuDevice,
        name: &str,
        buffer: &mut Buffer,
    ) -> Result<u32, ProgramError> {
        self.bind_block(device, name, buffer, BlockKind::Storage)
    }

    /// Bind `buffer` to the uniform block `name`.
    ///
    /// # Errors
    ///
    /// Fails when unbuilt or when no uniform block has this name.
    pub fn bind_uniform_block(
        &self,
        device: &mut dyn GpuDevice,
        name: &str,
        buffer: &mut Buffer,
    ) -> Result<u32, ProgramError> {
        self.bind_block(device, name, buffer, BlockKind::Uniform)
    }

    /// Bind `buffer` to the atomic counter `name`.
    ///
    /// # Errors
    ///
    /// Fails when unbuilt or when no atomic counter has this name.
    pub fn bind_atomic_counter(
        &self,
        device: &mut dyn GpuDevice,
        name: &str,
        buffer: &mut Buffer,
    ) -> Result<u32, ProgramError> {
        self.bind_block(device, name, buffer, BlockKind::AtomicCounter)
    }

    fn bind_block(
        &self,
        device: &mut dyn GpuDevice,
        name: &str,
        buffer: &mut Buffer,
        kind: BlockKind,
    ) -> Result<u32, ProgramError> {
        let _ = self.built_handle()?;
        let binding = self
            .reflection
            .block(name)
            .filter(|block| block.kind == kind)
            .map(|block| block.binding)
            .ok_or_else(|| ProgramError::UnknownBlock(name.to_owned()))?;
        let target = match kind {
            BlockKind::Storage => BufferTarget::ShaderStorage,
            BlockKind::Uniform => BufferTarget::Uniform,
            BlockKind::AtomicCounter => BufferTarget::AtomicCounter,
        };
        buffer.bind_indexed(device, target, binding)?;
        Ok(binding)
    }

    /// Choose `subroutine` for the selector slot `selector` of `stage`.
    /// Only the host-side table changes; see
    /// [`activate_subroutines`](Self::activate_subroutines).
    ///
    /// # Errors
    ///
    /// Fails (and logs) when unbuilt or when either name is unknown. The
    /// previous selection is kept.
    pub fn select_subroutine(
        &mut self,
        stage: ShaderStage,
        selector: &str,
        subroutine: &str,
    ) -> Result<(), ProgramError> {
        let _ = self.built_handle()?;
        let slots = self.reflection.subroutine_slots(stage);
        let Some(position) = slots.iter().position(|slot| slot.name == selector)
        else {
            log::warn!(
                "ShaderProgram `{}`: no such subroutine selector `{selector}`",
                self.label
            );
            return Err(ProgramError::UnknownSubroutineSelector {
                stage,
                name: selector.to_owned(),
            });
        };
        let Some(index) = slots[position].candidate_index(subroutine) else {
            log::warn!(
                "ShaderProgram `{}`: no such subroutine `{subroutine}`",
                self.label
            );
            return Err(ProgramError::UnknownSubroutine {
                stage,
                name: subroutine.to_owned(),
            });
        };
        if let Some(selection) = self.selections.get_mut(&stage) {
            selection[position] = index;
        }
        Ok(())
    }

    /// Host-side selection table of `stage`, one index per selector slot.
    #[must_use]
    pub fn subroutine_selection(&self, stage: ShaderStage) -> &[u32] {
        self.selections.get(&stage).map_or(&[], Vec::as_slice)
    }

    /// Push the whole selection table to the device. The program must be
    /// current.
    pub fn activate_subroutines(&self, device: &mut dyn GpuDevice) {
        for (stage, indices) in &self.selections {
            device.uniform_subroutines(*stage, indices);
        }
    }

    /// Destroy the device program and its stages.
    pub fn release(mut self, device: &mut dyn GpuDevice) {
        if let Some(handle) = self.handle.take() {
            device.destroy_program(handle);
        }
        for stage in self.stages.drain(..) {
            device.destroy_stage(stage);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gpu::{DebugSeverity, DeviceCall, HeadlessDevice};

    pub(crate) const INTEGRATE: &str = r"
@group(0) @binding(0) var<storage, read_write> position: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> velocity: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> spawned: atomic<u32>;
@group(0) @binding(3) var<uniform> forces: vec4<f32>;

struct Params {
    time_step: f32,
    damping: f32,
}
@group(0) @binding(4) var<uniform> uniforms: Params;

override integrator: u32 = 0u;

fn integrator__euler(i: u32) {
    position[i] = position[i] + velocity[i] * uniforms.time_step;
}

fn integrator__damped(i: u32) {
    position[i] = position[i] + velocity[i] * uniforms.time_step * uniforms.damping + forces;
}

@compute @workgroup_size(32, 2, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (integrator == 0u) {
        integrator__euler(id.x);
    } else {
        integrator__damped(id.x);
    }
    atomicAdd(&spawned, 1u);
}
";

    fn built(device: &mut HeadlessDevice) -> ShaderProgram {
        let mut program = ShaderProgram::new("integrate");
        program.add_stage(ShaderStage::Compute, INTEGRATE).unwrap();
        program.build(device, &mut ShaderLibrary::new()).unwrap();
        program
    }

    #[test]
    fn empty_source_is_rejected() {
        let mut program = ShaderProgram::new("p");
        assert_eq!(
            program.add_stage(ShaderStage::Vertex, "  \n"),
            Err(ProgramError::EmptySource(ShaderStage::Vertex))
        );
        assert!(!program.has_stage(ShaderStage::Vertex));
    }

    #[test]
    fn second_build_fails_and_keeps_interface() {
        let mut device = HeadlessDevice::new();
        let mut program = built(&mut device);
        let handle = program.handle();
        let location = program.uniform_location("time_step");

        assert_eq!(
            program.build(&mut device, &mut ShaderLibrary::new()),
            Err(ProgramError::AlreadyBuilt)
        );
        assert_eq!(
            program.add_stage(ShaderStage::Compute, INTEGRATE),
            Err(ProgramError::AlreadyBuilt)
        );
        assert!(program.is_built());
        assert_eq!(program.handle(), handle);
        assert_eq!(program.uniform_location("time_step"), location);
        assert_eq!(device.live_programs(), 1);
    }

    #[test]
    fn failed_build_is_terminal() {
        let mut device = HeadlessDevice::new();
        let mut program = ShaderProgram::new("broken");
        program
            .add_stage(ShaderStage::Compute, "fn main( {")
            .unwrap();
        let err = program
            .build(&mut device, &mut ShaderLibrary::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ProgramError::StageCompile { stage: ShaderStage::Compute, .. }
        ));
        assert_eq!(program.status(), BuildStatus::Failed);
        assert_eq!(
            program.build(&mut device, &mut ShaderLibrary::new()),
            Err(ProgramError::AlreadyBuilt)
        );
        assert_eq!(program.bind(&mut device), Err(ProgramError::NotBuilt));
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn link_failure_leaves_program_unusable() {
        let mut device = HeadlessDevice::new();
        let mut program = ShaderProgram::new("fragment-only");
        program
            .add_stage(
                ShaderStage::Fragment,
                "@fragment fn main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
            )
            .unwrap();
        let err = program
            .build(&mut device, &mut ShaderLibrary::new())
            .unwrap_err();
        assert!(matches!(err, ProgramError::Link(_)));
        assert_eq!(program.uniform_location("anything"), None);
    }

    #[test]
    fn replacing_a_stage_keeps_the_last_source() {
        let mut device = HeadlessDevice::new();
        let mut program = ShaderProgram::new("replaced");
        program.add_stage(ShaderStage::Compute, "fn main( {").unwrap();
        program.add_stage(ShaderStage::Compute, INTEGRATE).unwrap();
        program.build(&mut device, &mut ShaderLibrary::new()).unwrap();
        assert!(program.reflection().block("position").is_some());
    }

    #[test]
    fn uniforms_are_written_without_binding() {
        let mut device = HeadlessDevice::new();
        let program = built(&mut device);
        let handle = program.handle().unwrap();

        program.set_uniform(&mut device, "damping", 0.5_f32).unwrap();
        assert_eq!(device.current_program(), None);
        let offset = program.uniform_location("damping").unwrap().offset as usize;
        let bytes = device.program_uniform_bytes(handle).unwrap();
        assert_eq!(&bytes[offset..offset + 4], &0.5_f32.to_ne_bytes());

        assert_eq!(
            program.set_uniform(&mut device, "missing", 1.0_f32),
            Err(ProgramError::UnknownUniform("missing".to_owned()))
        );
        assert_eq!(
            program.set_uniform(&mut device, "damping", 1_u32),
            Err(ProgramError::UniformType("damping".to_owned()))
        );
    }

    #[test]
    fn unbuilt_program_refuses_uniforms_and_blocks() {
        let mut device = HeadlessDevice::new();
        let program = ShaderProgram::new("unbuilt");
        let mut buffer = Buffer::new::<[f32; 4]>(&mut device, 4);
        assert_eq!(program.uniform_location("damping"), None);
        assert_eq!(
            program.set_uniform(&mut device, "damping", 1.0_f32),
            Err(ProgramError::NotBuilt)
        );
        assert_eq!(
            program.bind_storage_block(&mut device, "position", &mut buffer),
            Err(ProgramError::NotBuilt)
        );
        assert_eq!(buffer.binding(), None);
    }

    #[test]
    fn blocks_bind_at_reflected_indices() {
        let mut device = HeadlessDevice::new();
        let program = built(&mut device);
        let mut position = Buffer::new::<[f32; 4]>(&mut device, 8);
        let mut counter = Buffer::new::<u32>(&mut device, 1);
        let mut forces = Buffer::new::<[f32; 4]>(&mut device, 1);

        assert_eq!(
            program.bind_storage_block(&mut device, "position", &mut position),
            Ok(0)
        );
        assert_eq!(
            program.bind_atomic_counter(&mut device, "spawned", &mut counter),
            Ok(2)
        );
        assert_eq!(
            program.bind_uniform_block(&mut device, "forces", &mut forces),
            Ok(3)
        );
        assert_eq!(
            device.bound_buffer(crate::gpu::BindingPoint::Indexed(
                BufferTarget::AtomicCounter,
                2
            )),
            Some(counter.handle())
        );

        // A storage block is not an atomic counter.
        let mut other = Buffer::new::<u32>(&mut device, 1);
        assert_eq!(
            program.bind_atomic_counter(&mut device, "position", &mut other),
            Err(ProgramError::UnknownBlock("position".to_owned()))
        );
    }

    #[test]
    fn subroutine_selection_is_deferred_until_activation() {
        let mut device = HeadlessDevice::new();
        let mut program = built(&mut device);
        let handle = program.handle().unwrap();
        assert_eq!(program.subroutine_selection(ShaderStage::Compute), &[0]);

        program
            .select_subroutine(ShaderStage::Compute, "integrator", "damped")
            .unwrap();
        assert_eq!(program.subroutine_selection(ShaderStage::Compute), &[1]);
        assert!(!device
            .calls()
            .iter()
            .any(|call| matches!(call, DeviceCall::UniformSubroutines { .. })));

        program.bind(&mut device).unwrap();
        program.activate_subroutines(&mut device);
        assert_eq!(
            device.active_subroutines(handle, ShaderStage::Compute),
            Some(&[1][..])
        );
    }

    #[test]
    fn unknown_subroutine_names_keep_previous_selection() {
        let mut device = HeadlessDevice::new();
        let mut program = built(&mut device);
        program
            .select_subroutine(ShaderStage::Compute, "integrator", "damped")
            .unwrap();

        assert!(matches!(
            program.select_subroutine(ShaderStage::Compute, "shading", "damped"),
            Err(ProgramError::UnknownSubroutineSelector { .. })
        ));
        assert!(matches!(
            program.select_subroutine(ShaderStage::Compute, "integrator", "rk4"),
            Err(ProgramError::UnknownSubroutine { .. })
        ));
        assert!(matches!(
            program.select_subroutine(ShaderStage::Vertex, "integrator", "euler"),
            Err(ProgramError::UnknownSubroutineSelector { .. })
        ));
        assert_eq!(program.subroutine_selection(ShaderStage::Compute), &[1]);
    }

    #[test]
    fn release_destroys_device_objects() {
        let mut device = HeadlessDevice::new();
        let program = built(&mut device);
        program.release(&mut device);
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.debug_output().count_at_least(DebugSeverity::High), 0);
    }
}
