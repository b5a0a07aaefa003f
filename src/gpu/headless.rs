//! Software implementation of [`GpuDevice`].
//!
//! Keeps buffer memory in host RAM and tracks every binding point like a
//! real context. Shaders are validated and reflected but never executed:
//! dispatches and draws are checked against the current binding state and
//! recorded in a call log, leaving buffer contents untouched.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use super::debug::{DebugOutput, DebugSeverity};
use super::device::{
    Barriers, BindingPoint, BufferHandle, BufferTarget, BufferUsage,
    DeviceLimits, GpuDevice, IndexType, ProgramHandle, ShaderStage, StageHandle, Topology,
    UniformValue, VertexArrayHandle,
};
use super::element::ElementType;
use super::memory::AlignedBytes;
use super::reflect::{self, ProgramReflection, StageReflection, UniformLocation};

/// A state-changing call observed by a [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    /// Generic binding changed.
    BindBuffer {
        /// Target.
        target: BufferTarget,
        /// New buffer, `None` to clear.
        buffer: Option<BufferHandle>,
    },
    /// Indexed binding changed.
    BindBufferBase {
        /// Target.
        target: BufferTarget,
        /// Slot.
        index: u32,
        /// New buffer, `None` to clear.
        buffer: Option<BufferHandle>,
    },
    /// Bytes written through a binding point.
    BufferSubData {
        /// Written buffer.
        buffer: BufferHandle,
        /// Byte offset.
        offset: u64,
        /// Byte count.
        len: usize,
    },
    /// Buffer mapped.
    MapBuffer(BufferHandle),
    /// Buffer unmapped.
    UnmapBuffer(BufferHandle),
    /// Current program changed.
    UseProgram(Option<ProgramHandle>),
    /// Default-block uniform written.
    ProgramUniform {
        /// Target program.
        program: ProgramHandle,
        /// Byte offset in the default block.
        offset: u32,
    },
    /// Subroutine selections replaced.
    UniformSubroutines {
        /// Program the selection applies to.
        program: ProgramHandle,
        /// Stage.
        stage: ShaderStage,
        /// Selected subroutine per slot.
        indices: Vec<u32>,
    },
    /// Current vertex array changed.
    BindVertexArray(Option<VertexArrayHandle>),
    /// Attribute sourced and enabled.
    VertexAttribPointer {
        /// Attribute location.
        location: u32,
        /// Source buffer.
        buffer: BufferHandle,
        /// Per-instance stepping.
        instanced: bool,
    },
    /// Attribute disabled.
    DisableVertexAttrib(u32),
    /// Patch size changed.
    PatchVertices(u32),
    /// Compute dispatch executed.
    DispatchCompute {
        /// Dispatched program.
        program: ProgramHandle,
        /// Work-group counts.
        groups: [u32; 3],
    },
    /// Memory barrier.
    MemoryBarrier(Barriers),
    /// Render target cleared.
    Clear([f32; 4]),
    /// Depth testing toggled.
    DepthTest(bool),
    /// Draw executed.
    DrawElementsInstanced {
        /// Drawing program.
        program: ProgramHandle,
        /// Topology.
        topology: Topology,
        /// Indices per instance.
        index_count: u32,
        /// Instance count.
        instances: u32,
    },
    /// Host waited for completion.
    Finish,
}

struct BufferSlot {
    memory: AlignedBytes,
    usage: BufferUsage,
    mapped: bool,
}

struct StageSlot {
    reflection: StageReflection,
}

struct ProgramSlot {
    reflection: ProgramReflection,
    uniforms: AlignedBytes,
    subroutines: BTreeMap<ShaderStage, Vec<u32>>,
}

#[derive(Debug, Clone, Copy)]
struct AttributeSource {
    buffer: BufferHandle,
    element: ElementType,
    instanced: bool,
}

#[derive(Default)]
struct VertexArraySlot {
    attributes: BTreeMap<u32, AttributeSource>,
}

/// GPU-less device used by tests and tooling.
pub struct HeadlessDevice {
    limits: DeviceLimits,
    debug: DebugOutput,
    next_id: u32,
    buffers: FxHashMap<u32, BufferSlot>,
    stages: FxHashMap<u32, StageSlot>,
    programs: FxHashMap<u32, ProgramSlot>,
    vertex_arrays: FxHashMap<u32, VertexArraySlot>,
    generic: FxHashMap<BufferTarget, BufferHandle>,
    indexed: FxHashMap<(BufferTarget, u32), BufferHandle>,
    current_program: Option<ProgramHandle>,
    current_vertex_array: Option<VertexArrayHandle>,
    patch_vertices: u32,
    calls: Vec<DeviceCall>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Device with default limits and a `Low` debug level.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    /// Device with explicit limits.
    #[must_use]
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            debug: DebugOutput::default(),
            next_id: 1,
            buffers: FxHashMap::default(),
            stages: FxHashMap::default(),
            programs: FxHashMap::default(),
            vertex_arrays: FxHashMap::default(),
            generic: FxHashMap::default(),
            indexed: FxHashMap::default(),
            current_program: None,
            current_vertex_array: None,
            patch_vertices: 3,
            calls: Vec::new(),
        }
    }

    /// Recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Forget recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Current contents of a buffer.
    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|slot| slot.memory.as_bytes())
    }

    /// Number of live buffers.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Usage hint `buffer` was allocated with.
    #[must_use]
    pub fn buffer_usage(&self, buffer: BufferHandle) -> Option<BufferUsage> {
        self.buffers.get(&buffer.0).map(|slot| slot.usage)
    }

    /// Number of live programs.
    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Default-block bytes of a program.
    #[must_use]
    pub fn program_uniform_bytes(&self, program: ProgramHandle) -> Option<&[u8]> {
        self.programs.get(&program.0).map(|slot| slot.uniforms.as_bytes())
    }

    /// Active subroutine selection of a program stage.
    #[must_use]
    pub fn active_subroutines(&self, program: ProgramHandle, stage: ShaderStage) -> Option<&[u32]> {
        self.programs
            .get(&program.0)
            .and_then(|slot| slot.subroutines.get(&stage))
            .map(Vec::as_slice)
    }

    /// Current patch size.
    #[must_use]
    pub fn patch_size(&self) -> u32 {
        self.patch_vertices
    }

    /// Source buffer, element type and instancing of an enabled attribute.
    #[must_use]
    pub fn vertex_attribute(
        &self,
        vertex_array: VertexArrayHandle,
        location: u32,
    ) -> Option<(BufferHandle, ElementType, bool)> {
        self.vertex_arrays
            .get(&vertex_array.0)
            .and_then(|slot| slot.attributes.get(&location))
            .map(|a| (a.buffer, a.element, a.instanced))
    }

    fn issue(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, call: DeviceCall) {
        self.calls.push(call);
    }

    fn error(&mut self, text: String) {
        let _ = self.debug.report(DebugSeverity::High, text);
    }

    fn mapped(&self, buffer: BufferHandle) -> bool {
        self.buffers.get(&buffer.0).is_some_and(|slot| slot.mapped)
    }

    /// Every buffer the next dispatch or draw could read.
    fn referenced_buffers(&self) -> Vec<BufferHandle> {
        let mut buffers: Vec<BufferHandle> =
            self.indexed.values().copied().collect();
        if let Some(vao) = self
            .current_vertex_array
            .and_then(|vao| self.vertex_arrays.get(&vao.0))
        {
            buffers.extend(vao.attributes.values().map(|a| a.buffer));
        }
        if let Some(&index) = self.generic.get(&BufferTarget::ElementArray) {
            buffers.push(index);
        }
        buffers
    }

    fn check_unmapped(&mut self, operation: &str) -> bool {
        let mapped: Vec<_> = self
            .referenced_buffers()
            .into_iter()
            .filter(|&b| self.mapped(b))
            .collect();
        if let Some(buffer) = mapped.first() {
            self.error(format!(
                "{operation} while buffer {} is mapped",
                buffer.0
            ));
            return false;
        }
        true
    }

    /// Verify every named block of `program` has a buffer bound.
    fn check_blocks(&mut self, program: ProgramHandle, operation: &str) {
        let Some(slot) = self.programs.get(&program.0) else {
            return;
        };
        let missing: Vec<String> = slot
            .reflection
            .blocks
            .iter()
            .filter(|(_, block)| {
                let target = match block.kind {
                    reflect::BlockKind::Storage => BufferTarget::ShaderStorage,
                    reflect::BlockKind::Uniform => BufferTarget::Uniform,
                    reflect::BlockKind::AtomicCounter => {
                        BufferTarget::AtomicCounter
                    }
                };
                !self.indexed.contains_key(&(target, block.binding))
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in missing {
            let _ = self.debug.report(
                DebugSeverity::Medium,
                format!("{operation}: block `{name}` has no buffer bound"),
            );
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn debug_output(&mut self) -> &mut DebugOutput {
        &mut self.debug
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> BufferHandle {
        let id = self.issue();
        let _ = self.buffers.insert(
            id,
            BufferSlot {
                memory: AlignedBytes::zeroed(size as usize),
                usage,
                mapped: false,
            },
        );
        BufferHandle(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            self.error(format!("destroy of unknown buffer {}", buffer.0));
            return;
        }
        self.generic.retain(|_, b| *b != buffer);
        self.indexed.retain(|_, b| *b != buffer);
        for vao in self.vertex_arrays.values_mut() {
            vao.attributes.retain(|_, a| a.buffer != buffer);
        }
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        match buffer {
            Some(b) if !self.buffers.contains_key(&b.0) => {
                self.error(format!("bind of unknown buffer {}", b.0));
                return;
            }
            Some(b) => {
                let _ = self.generic.insert(target, b);
            }
            None => {
                let _ = self.generic.remove(&target);
            }
        }
        self.record(DeviceCall::BindBuffer { target, buffer });
    }

    fn bind_buffer_base(&mut self, target: BufferTarget, index: u32, buffer: Option<BufferHandle>) {
        if !target.is_indexed() {
            self.error(format!("{target} has no indexed binding points"));
            return;
        }
        match buffer {
            Some(b) if !self.buffers.contains_key(&b.0) => {
                self.error(format!("bind of unknown buffer {}", b.0));
                return;
            }
            Some(b) => {
                let _ = self.indexed.insert((target, index), b);
                let _ = self.generic.insert(target, b);
            }
            None => {
                let _ = self.indexed.remove(&(target, index));
                let _ = self.generic.remove(&target);
            }
        }
        self.record(DeviceCall::BindBufferBase {
            target,
            index,
            buffer,
        });
    }

    fn bound_buffer(&self, point: BindingPoint) -> Option<BufferHandle> {
        match point {
            BindingPoint::Generic(target) => self.generic.get(&target).copied(),
            BindingPoint::Indexed(target, index) => {
                self.indexed.get(&(target, index)).copied()
            }
        }
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: u64, data: &[u8]) {
        let Some(&buffer) = self.generic.get(&target) else {
            self.error(format!("buffer_sub_data with nothing bound to {target}"));
            return;
        };
        let Some(slot) = self.buffers.get_mut(&buffer.0) else {
            return;
        };
        if slot.mapped {
            self.error(format!("buffer_sub_data on mapped buffer {}", buffer.0));
            return;
        }
        if !slot.memory.write(offset as usize, data) {
            self.error(format!(
                "buffer_sub_data of {} bytes at {offset} overflows buffer {}",
                data.len(),
                buffer.0
            ));
            return;
        }
        self.record(DeviceCall::BufferSubData {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn map_buffer(&mut self, buffer: BufferHandle) -> Option<&mut [u8]> {
        if !self.buffers.contains_key(&buffer.0) {
            self.error(format!("map of unknown buffer {}", buffer.0));
            return None;
        }
        self.record(DeviceCall::MapBuffer(buffer));
        let slot = self.buffers.get_mut(&buffer.0)?;
        slot.mapped = true;
        Some(slot.memory.as_bytes_mut())
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        let Some(slot) = self.buffers.get_mut(&buffer.0) else {
            return;
        };
        if slot.mapped {
            slot.mapped = false;
            self.record(DeviceCall::UnmapBuffer(buffer));
        }
    }

    fn is_mapped(&self, buffer: BufferHandle) -> bool {
        self.mapped(buffer)
    }

    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        module: naga::Module,
    ) -> Result<StageHandle, String> {
        reflect::validate(&module)?;
        let reflection = reflect::reflect_stage(stage, &module)?;
        let id = self.issue();
        let _ = self.stages.insert(id, StageSlot { reflection });
        Ok(StageHandle(id))
    }

    fn destroy_stage(&mut self, stage: StageHandle) {
        let _ = self.stages.remove(&stage.0);
    }

    fn link_program(
        &mut self,
        stages: &[StageHandle],
    ) -> Result<(ProgramHandle, ProgramReflection), String> {
        let reflections = stages
            .iter()
            .map(|handle| {
                self.stages
                    .get(&handle.0)
                    .map(|slot| &slot.reflection)
                    .ok_or_else(|| format!("unknown stage {}", handle.0))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let reflection = reflect::link(&reflections)?;

        let uniform_size = reflection
            .default_block
            .as_ref()
            .map_or(0, |block| block.size as usize);
        let subroutines = reflection
            .subroutines
            .iter()
            .map(|(stage, slots)| (*stage, vec![0; slots.len()]))
            .collect();
        let id = self.issue();
        let _ = self.programs.insert(
            id,
            ProgramSlot {
                reflection: reflection.clone(),
                uniforms: AlignedBytes::zeroed(uniform_size),
                subroutines,
            },
        );
        Ok((ProgramHandle(id), reflection))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        let _ = self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        if let Some(p) = program {
            if !self.programs.contains_key(&p.0) {
                self.error(format!("use of unknown program {}", p.0));
                return;
            }
        }
        self.current_program = program;
        self.record(DeviceCall::UseProgram(program));
    }

    fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    fn program_uniform(
        &mut self,
        program: ProgramHandle,
        location: UniformLocation,
        value: UniformValue,
    ) {
        let Some(slot) = self.programs.get_mut(&program.0) else {
            self.error(format!("uniform write to unknown program {}", program.0));
            return;
        };
        if !value.fits(location.kind) {
            self.error(format!(
                "uniform at offset {} is {:?}, got {value:?}",
                location.offset, location.kind
            ));
            return;
        }
        if !slot
            .uniforms
            .write(location.offset as usize, &value.to_bytes())
        {
            self.error(format!(
                "uniform at offset {} lies outside the default block",
                location.offset
            ));
            return;
        }
        self.record(DeviceCall::ProgramUniform {
            program,
            offset: location.offset,
        });
    }

    fn uniform_subroutines(&mut self, stage: ShaderStage, indices: &[u32]) {
        let Some(program) = self.current_program else {
            self.error("uniform_subroutines with no current program".to_owned());
            return;
        };
        let Some(slot) = self.programs.get_mut(&program.0) else {
            return;
        };
        let slots = slot.reflection.subroutine_slots(stage);
        if slots.len() != indices.len() {
            let expected = slots.len();
            self.error(format!(
                "{stage} stage has {expected} subroutine slots, got {}",
                indices.len()
            ));
            return;
        }
        let out_of_range = slots
            .iter()
            .zip(indices)
            .find(|(slot, index)| **index as usize >= slot.candidates.len())
            .map(|(slot, _)| slot.name.clone());
        if let Some(name) = out_of_range {
            self.error(format!("invalid subroutine index for `{name}`"));
            return;
        }
        let _ = slot.subroutines.insert(stage, indices.to_vec());
        self.record(DeviceCall::UniformSubroutines {
            program,
            stage,
            indices: indices.to_vec(),
        });
    }

    fn create_vertex_array(&mut self) -> VertexArrayHandle {
        let id = self.issue();
        let _ = self.vertex_arrays.insert(id, VertexArraySlot::default());
        VertexArrayHandle(id)
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        let _ = self.vertex_arrays.remove(&vertex_array.0);
        if self.current_vertex_array == Some(vertex_array) {
            self.current_vertex_array = None;
        }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        if let Some(vao) = vertex_array {
            if !self.vertex_arrays.contains_key(&vao.0) {
                self.error(format!("bind of unknown vertex array {}", vao.0));
                return;
            }
        }
        self.current_vertex_array = vertex_array;
        self.record(DeviceCall::BindVertexArray(vertex_array));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, element: ElementType, instanced: bool) {
        let Some(vao) = self.current_vertex_array else {
            self.error("vertex_attrib_pointer with no vertex array".to_owned());
            return;
        };
        let Some(&buffer) = self.generic.get(&BufferTarget::Array) else {
            self.error(format!(
                "vertex_attrib_pointer({location}) with no array buffer bound"
            ));
            return;
        };
        if !element.is_reflectable() {
            self.error(format!("attribute {location} cannot source {element}"));
            return;
        }
        if let Some(slot) = self.vertex_arrays.get_mut(&vao.0) {
            let _ = slot.attributes.insert(
                location,
                AttributeSource {
                    buffer,
                    element,
                    instanced,
                },
            );
        }
        self.record(DeviceCall::VertexAttribPointer {
            location,
            buffer,
            instanced,
        });
    }

    fn disable_vertex_attrib(&mut self, location: u32) {
        if let Some(slot) = self
            .current_vertex_array
            .and_then(|vao| self.vertex_arrays.get_mut(&vao.0))
        {
            let _ = slot.attributes.remove(&location);
        }
        self.record(DeviceCall::DisableVertexAttrib(location));
    }

    fn patch_vertices(&mut self, count: u32) {
        if count == 0 || count > self.limits.max_patch_vertices {
            self.error(format!("patch size {count} is out of range"));
            return;
        }
        self.patch_vertices = count;
        self.record(DeviceCall::PatchVertices(count));
    }

    fn dispatch_compute(&mut self, groups: [u32; 3]) {
        let Some(program) = self.current_program else {
            self.error("dispatch with no current program".to_owned());
            return;
        };
        let is_compute = self
            .programs
            .get(&program.0)
            .is_some_and(|slot| slot.reflection.is_compute());
        if !is_compute {
            self.error("dispatch with a graphics program".to_owned());
            return;
        }
        let max = self.limits.max_work_groups_per_dimension;
        if groups.iter().any(|&g| g > max) {
            self.error(format!("dispatch of {groups:?} exceeds {max} groups"));
            return;
        }
        if !self.check_unmapped("dispatch") {
            return;
        }
        self.check_blocks(program, "dispatch");
        self.record(DeviceCall::DispatchCompute { program, groups });
    }

    fn memory_barrier(&mut self, barriers: Barriers) {
        self.record(DeviceCall::MemoryBarrier(barriers));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(DeviceCall::Clear(color));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.record(DeviceCall::DepthTest(enabled));
    }

    fn draw_elements_instanced(
        &mut self,
        topology: Topology,
        index_count: u32,
        index_type: IndexType,
        instances: u32,
    ) {
        let Some(program) = self.current_program else {
            self.error("draw with no current program".to_owned());
            return;
        };
        if self.current_vertex_array.is_none() {
            self.error("draw with no vertex array bound".to_owned());
            return;
        }
        let Some(&index_buffer) = self.generic.get(&BufferTarget::ElementArray)
        else {
            self.error("draw with no element array buffer bound".to_owned());
            return;
        };
        let needed = u64::from(index_count) * u64::from(index_type.size());
        let available = self
            .buffers
            .get(&index_buffer.0)
            .map_or(0, |slot| slot.memory.len() as u64);
        if needed > available {
            self.error(format!(
                "draw reads {needed} index bytes from a {available} byte buffer"
            ));
            return;
        }
        let tessellated = self.programs.get(&program.0).is_some_and(|slot| {
            slot.reflection.has_stage(ShaderStage::TessControl)
                || slot.reflection.has_stage(ShaderStage::TessEvaluation)
        });
        if tessellated != (topology == Topology::Patches) {
            self.error(format!(
                "{topology:?} topology does not match the program's stages"
            ));
            return;
        }
        if !self.check_unmapped("draw") {
            return;
        }
        self.check_blocks(program, "draw");
        self.record(DeviceCall::DrawElementsInstanced {
            program,
            topology,
            index_count,
            instances,
        });
    }

    fn finish(&mut self) {
        self.record(DeviceCall::Finish);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(device: &mut HeadlessDevice, stage: ShaderStage, src: &str) -> StageHandle {
        let module = naga::front::wgsl::parse_str(src).unwrap();
        device.compile_stage(stage, module).unwrap()
    }

    const COMPUTE: &str = r"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;

@compute @workgroup_size(8)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    data[id.x] = data[id.x] + 1u;
}
";

    #[test]
    fn indexed_binding_also_sets_generic_point() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(16, BufferUsage::DynamicDraw);
        device.bind_buffer_base(BufferTarget::ShaderStorage, 2, Some(buffer));
        assert_eq!(
            device.bound_buffer(BindingPoint::Indexed(BufferTarget::ShaderStorage, 2)),
            Some(buffer)
        );
        assert_eq!(
            device.bound_buffer(BindingPoint::Generic(BufferTarget::ShaderStorage)),
            Some(buffer)
        );
        device.bind_buffer_base(BufferTarget::ShaderStorage, 2, None);
        assert_eq!(
            device.bound_buffer(BindingPoint::Indexed(BufferTarget::ShaderStorage, 2)),
            None
        );
    }

    #[test]
    fn indexed_binding_of_plain_target_is_rejected() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(16, BufferUsage::DynamicDraw);
        device.bind_buffer_base(BufferTarget::Array, 0, Some(buffer));
        assert_eq!(device.debug_output().count_at_least(DebugSeverity::High), 1);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn sub_data_writes_through_binding_point() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(8, BufferUsage::DynamicDraw);
        device.bind_buffer(BufferTarget::CopyWrite, Some(buffer));
        device.buffer_sub_data(BufferTarget::CopyWrite, 4, &[9, 8, 7, 6]);
        assert_eq!(
            device.buffer_contents(buffer).unwrap(),
            &[0, 0, 0, 0, 9, 8, 7, 6]
        );
    }

    #[test]
    fn destroying_a_buffer_clears_its_bindings() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(4, BufferUsage::DynamicDraw);
        device.bind_buffer_base(BufferTarget::Uniform, 1, Some(buffer));
        device.destroy_buffer(buffer);
        assert_eq!(
            device.bound_buffer(BindingPoint::Indexed(BufferTarget::Uniform, 1)),
            None
        );
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn dispatch_with_mapped_buffer_is_refused() {
        let mut device = HeadlessDevice::new();
        let stage = compile(&mut device, ShaderStage::Compute, COMPUTE);
        let (program, _) = device.link_program(&[stage]).unwrap();
        let buffer = device.create_buffer(64, BufferUsage::DynamicDraw);
        device.bind_buffer_base(BufferTarget::ShaderStorage, 0, Some(buffer));
        device.use_program(Some(program));

        let _ = device.map_buffer(buffer);
        device.dispatch_compute([2, 1, 1]);
        assert!(!device
            .calls()
            .iter()
            .any(|c| matches!(c, DeviceCall::DispatchCompute { .. })));

        device.unmap_buffer(buffer);
        device.dispatch_compute([2, 1, 1]);
        assert!(device.calls().contains(&DeviceCall::DispatchCompute {
            program,
            groups: [2, 1, 1]
        }));
    }

    #[test]
    fn dispatch_leaves_contents_untouched() {
        let mut device = HeadlessDevice::new();
        let stage = compile(&mut device, ShaderStage::Compute, COMPUTE);
        let (program, _) = device.link_program(&[stage]).unwrap();
        let buffer = device.create_buffer(8, BufferUsage::DynamicDraw);
        device.map_buffer(buffer).unwrap().copy_from_slice(&[1; 8]);
        device.unmap_buffer(buffer);
        device.bind_buffer_base(BufferTarget::ShaderStorage, 0, Some(buffer));
        device.use_program(Some(program));
        device.dispatch_compute([1, 1, 1]);
        assert_eq!(device.buffer_contents(buffer).unwrap(), &[1; 8]);
    }

    #[test]
    fn compile_errors_are_returned() {
        let mut device = HeadlessDevice::new();
        let module = naga::front::wgsl::parse_str("fn helper() {}").unwrap();
        let err = device.compile_stage(ShaderStage::Compute, module).unwrap_err();
        assert!(err.contains("compute"));
    }

    #[test]
    fn mapping_twice_yields_same_region() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(32, BufferUsage::DynamicDraw);
        let first = device.map_buffer(buffer).unwrap().as_ptr();
        let second = device.map_buffer(buffer).unwrap().as_ptr();
        assert_eq!(first, second);
        assert!(device.is_mapped(buffer));
        device.unmap_buffer(buffer);
        device.unmap_buffer(buffer);
        assert!(!device.is_mapped(buffer));
    }
}
