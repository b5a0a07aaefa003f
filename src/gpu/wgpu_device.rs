//! [`GpuDevice`] backed by wgpu.
//!
//! wgpu has no global binding state, so the binding table lives on the
//! host and is resolved into a bind group at every dispatch and draw. Each
//! dispatch and draw is submitted in its own command encoder; queue order
//! already provides the visibility a memory barrier asks for.
//!
//! Mapping copies the buffer into a host shadow through a staging buffer;
//! unmapping writes the shadow back.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex};

use rustc_hash::FxHashMap;

use super::debug::{DebugOutput, DebugSeverity};
use super::device::{
    Barriers, BindingPoint, BufferHandle, BufferTarget, BufferUsage,
    DeviceLimits, GpuDevice, IndexType, ProgramHandle, ShaderStage, StageHandle, Topology,
    UniformValue, VertexArrayHandle,
};
use super::element::ElementType;
use super::memory::AlignedBytes;
use super::pipeline_helpers::{
    depth_state, primitive_topology, program_layout_entries, vertex_format,
};
use super::reflect::{
    self, BlockKind, ProgramReflection, StageReflection, SubroutineSlot,
    UniformLocation,
};
use super::render_context::GpuContext;
use super::texture::{RenderTarget, DEPTH_FORMAT};

const BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::UNIFORM)
    .union(wgpu::BufferUsages::VERTEX)
    .union(wgpu::BufferUsages::INDEX)
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

struct BufferSlot {
    buffer: wgpu::Buffer,
    size: u64,
    shadow: Option<AlignedBytes>,
}

struct StageSlot {
    module: naga::Module,
    reflection: StageReflection,
}

struct LinkedStage {
    stage: ShaderStage,
    module: naga::Module,
    entry_point: String,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct RenderPipelineKey {
    selection: Vec<u32>,
    attributes: Vec<(u32, wgpu::VertexFormat, bool)>,
    topology: wgpu::PrimitiveTopology,
    color_format: wgpu::TextureFormat,
    depth: Option<bool>,
}

struct ProgramSlot {
    reflection: ProgramReflection,
    stages: Vec<LinkedStage>,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: AlignedBytes,
    uniform_buffer: Option<wgpu::Buffer>,
    uniforms_dirty: bool,
    subroutines: BTreeMap<ShaderStage, Vec<u32>>,
    compute_pipelines: FxHashMap<Vec<u32>, wgpu::ComputePipeline>,
    render_pipelines: FxHashMap<RenderPipelineKey, wgpu::RenderPipeline>,
}

#[derive(Debug, Clone, Copy)]
struct AttributeSource {
    buffer: BufferHandle,
    format: wgpu::VertexFormat,
    instanced: bool,
}

#[derive(Default)]
struct VertexArraySlot {
    attributes: BTreeMap<u32, AttributeSource>,
}

/// wgpu implementation of the binding-model device.
pub struct WgpuDevice {
    context: GpuContext,
    limits: DeviceLimits,
    debug: DebugOutput,
    errors: Arc<Mutex<Vec<String>>>,
    next_id: u32,
    buffers: FxHashMap<u32, BufferSlot>,
    stages: FxHashMap<u32, StageSlot>,
    programs: FxHashMap<u32, ProgramSlot>,
    vertex_arrays: FxHashMap<u32, VertexArraySlot>,
    generic: FxHashMap<BufferTarget, BufferHandle>,
    indexed: FxHashMap<(BufferTarget, u32), BufferHandle>,
    current_program: Option<ProgramHandle>,
    current_vertex_array: Option<VertexArrayHandle>,
    target: Option<RenderTarget>,
    pending_clear: Option<wgpu::Color>,
    depth_test: bool,
}

impl WgpuDevice {
    /// Wrap a context. Uncaptured device errors are routed to the debug
    /// output with `High` severity.
    #[must_use]
    pub fn new(context: GpuContext) -> Self {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        context.device.on_uncaptured_error(Box::new(move |error| {
            if let Ok(mut queue) = sink.lock() {
                queue.push(error.to_string());
            }
        }));
        let limits = DeviceLimits {
            max_patch_vertices: 0,
            max_work_groups_per_dimension: context
                .device
                .limits()
                .max_compute_workgroups_per_dimension,
        };
        Self {
            context,
            limits,
            debug: DebugOutput::default(),
            errors,
            next_id: 1,
            buffers: FxHashMap::default(),
            stages: FxHashMap::default(),
            programs: FxHashMap::default(),
            vertex_arrays: FxHashMap::default(),
            generic: FxHashMap::default(),
            indexed: FxHashMap::default(),
            current_program: None,
            current_vertex_array: None,
            target: None,
            pending_clear: None,
            depth_test: true,
        }
    }

    /// Underlying device and queue.
    #[must_use]
    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Replace the target subsequent draws render into.
    pub fn set_render_target(&mut self, target: Option<RenderTarget>) {
        self.target = target;
    }

    /// Current render target.
    #[must_use]
    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    fn issue(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn error(&mut self, text: String) {
        let _ = self.debug.report(DebugSeverity::High, text);
    }

    fn drain_errors(&mut self) {
        let drained = self
            .errors
            .lock()
            .map(|mut queue| std::mem::take(&mut *queue))
            .unwrap_or_default();
        for text in drained {
            self.error(text);
        }
    }

    fn mapped(&self, buffer: BufferHandle) -> bool {
        self.buffers
            .get(&buffer.0)
            .is_some_and(|slot| slot.shadow.is_some())
    }

    fn check_unmapped(&mut self, operation: &str) -> bool {
        let mut referenced: Vec<BufferHandle> =
            self.indexed.values().copied().collect();
        if let Some(vao) = self
            .current_vertex_array
            .and_then(|vao| self.vertex_arrays.get(&vao.0))
        {
            referenced.extend(vao.attributes.values().map(|a| a.buffer));
        }
        referenced.extend(self.generic.get(&BufferTarget::ElementArray));
        let mapped = referenced.into_iter().find(|&b| self.mapped(b));
        if let Some(buffer) = mapped {
            self.error(format!(
                "{operation} while buffer {} is mapped",
                buffer.0
            ));
            return false;
        }
        true
    }

    /// Resolve every block of `program` against the binding table.
    fn bind_group(&mut self, program: ProgramHandle, operation: &str) -> Option<wgpu::BindGroup> {
        let Self {
            context,
            programs,
            buffers,
            indexed,
            debug,
            ..
        } = self;
        let slot = programs.get_mut(&program.0)?;
        if slot.uniforms_dirty {
            if let Some(buffer) = &slot.uniform_buffer {
                context.queue.write_buffer(buffer, 0, slot.uniforms.as_bytes());
            }
            slot.uniforms_dirty = false;
        }

        let mut entries = Vec::new();
        let mut missing = Vec::new();
        for (name, block) in &slot.reflection.blocks {
            let target = block_target(block.kind);
            let bound = indexed
                .get(&(target, block.binding))
                .and_then(|handle| buffers.get(&handle.0));
            match bound {
                Some(bound) => entries.push(wgpu::BindGroupEntry {
                    binding: block.binding,
                    resource: bound.buffer.as_entire_binding(),
                }),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            for name in missing {
                let _ = debug.report(
                    DebugSeverity::Medium,
                    format!("{operation}: block `{name}` has no buffer bound"),
                );
            }
            return None;
        }
        if let (Some(block), Some(buffer)) =
            (&slot.reflection.default_block, &slot.uniform_buffer)
        {
            entries.push(wgpu::BindGroupEntry {
                binding: block.binding,
                resource: buffer.as_entire_binding(),
            });
        }
        Some(context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Nebula Bind Group"),
            layout: &slot.layout,
            entries: &entries,
        }))
    }

    fn compute_pipeline(&mut self, program: ProgramHandle) -> Option<wgpu::ComputePipeline> {
        let Self {
            context,
            programs,
            debug,
            ..
        } = self;
        let slot = programs.get_mut(&program.0)?;
        let selection = slot
            .subroutines
            .get(&ShaderStage::Compute)
            .cloned()
            .unwrap_or_default();
        if let Some(pipeline) = slot.compute_pipelines.get(&selection) {
            return Some(pipeline.clone());
        }

        let device = &context.device;
        let stage = slot.stages.first()?;
        let slots = slot.reflection.subroutine_slots(ShaderStage::Compute);
        let created = scoped(device, || {
            let module = shader_module(device, stage, slots, &selection);
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Nebula Compute Pipeline"),
                layout: Some(&slot.pipeline_layout),
                module: &module,
                entry_point: Some(stage.entry_point.as_str()),
                compilation_options: Default::default(),
                cache: None,
            })
        });
        match created {
            Ok(pipeline) => {
                let _ = slot
                    .compute_pipelines
                    .insert(selection, pipeline.clone());
                Some(pipeline)
            }
            Err(e) => {
                let _ = debug.report(
                    DebugSeverity::High,
                    format!("compute pipeline creation failed: {e}"),
                );
                None
            }
        }
    }

    /// Vertex buffers feeding every attribute `program` declares, in
    /// location order.
    fn vertex_inputs(
        &mut self,
        program: ProgramHandle,
        vertex_array: VertexArrayHandle,
    ) -> Option<Vec<(u32, AttributeSource)>> {
        let slot = self.programs.get(&program.0)?;
        let vao = self.vertex_arrays.get(&vertex_array.0)?;
        let mut inputs = Vec::new();
        let mut missing = Vec::new();
        for (name, attribute) in &slot.reflection.attributes {
            match vao.attributes.get(&attribute.location) {
                Some(source) => inputs.push((attribute.location, *source)),
                None => missing.push(name.clone()),
            }
        }
        if let Some(name) = missing.first() {
            let _ = self.debug.report(
                DebugSeverity::Medium,
                format!("draw: attribute `{name}` has no buffer enabled"),
            );
            return None;
        }
        inputs.sort_by_key(|(location, _)| *location);
        Some(inputs)
    }

    fn render_pipeline(
        &mut self,
        program: ProgramHandle,
        inputs: &[(u32, AttributeSource)],
        topology: wgpu::PrimitiveTopology,
    ) -> Option<wgpu::RenderPipeline> {
        let target = self.target.as_ref()?;
        let color_format = target.format;
        let depth = target.depth_view.as_ref().map(|_| self.depth_test);
        let Self {
            context,
            programs,
            debug,
            ..
        } = self;
        let slot = programs.get_mut(&program.0)?;
        let key = RenderPipelineKey {
            selection: slot.subroutines.values().flatten().copied().collect(),
            attributes: inputs
                .iter()
                .map(|(location, source)| {
                    (*location, source.format, source.instanced)
                })
                .collect(),
            topology,
            color_format,
            depth,
        };
        if let Some(pipeline) = slot.render_pipelines.get(&key) {
            return Some(pipeline.clone());
        }

        let device = &context.device;
        let module_for = |stage: ShaderStage| {
            let linked = slot.stages.iter().find(|s| s.stage == stage)?;
            let selection = slot
                .subroutines
                .get(&stage)
                .map_or(&[][..], Vec::as_slice);
            let module = shader_module(
                device,
                linked,
                slot.reflection.subroutine_slots(stage),
                selection,
            );
            Some((linked, module))
        };
        let attribute_arrays: Vec<[wgpu::VertexAttribute; 1]> = key
            .attributes
            .iter()
            .map(|&(location, format, _)| {
                [wgpu::VertexAttribute {
                    format,
                    offset: 0,
                    shader_location: location,
                }]
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .attributes
            .iter()
            .zip(&attribute_arrays)
            .map(|(&(_, format, instanced), attributes)| {
                wgpu::VertexBufferLayout {
                    array_stride: format.size(),
                    step_mode: if instanced {
                        wgpu::VertexStepMode::Instance
                    } else {
                        wgpu::VertexStepMode::Vertex
                    },
                    attributes,
                }
            })
            .collect();
        let color_targets = [Some(wgpu::ColorTargetState {
            format: color_format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let depth_stencil = depth.map(|test| {
            let mut state = depth_state(DEPTH_FORMAT);
            if !test {
                state.depth_write_enabled = false;
                state.depth_compare = wgpu::CompareFunction::Always;
            }
            state
        });

        let created = scoped(device, || {
            let (vertex, vertex_module) = module_for(ShaderStage::Vertex)?;
            let fragment = module_for(ShaderStage::Fragment);
            Some(device.create_render_pipeline(
                &wgpu::RenderPipelineDescriptor {
                    label: Some("Nebula Render Pipeline"),
                    layout: Some(&slot.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &vertex_module,
                        entry_point: Some(vertex.entry_point.as_str()),
                        buffers: &vertex_buffers,
                        compilation_options: Default::default(),
                    },
                    fragment: fragment.as_ref().map(|(linked, module)| {
                        wgpu::FragmentState {
                            module,
                            entry_point: Some(linked.entry_point.as_str()),
                            targets: &color_targets,
                            compilation_options: Default::default(),
                        }
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology,
                        ..Default::default()
                    },
                    depth_stencil,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                },
            ))
        });
        match created {
            Ok(Some(pipeline)) => {
                let _ = slot.render_pipelines.insert(key, pipeline.clone());
                Some(pipeline)
            }
            Ok(None) => {
                let _ = debug.report(DebugSeverity::High, "render program has no vertex stage");
                None
            }
            Err(e) => {
                let _ = debug.report(
                    DebugSeverity::High,
                    format!("render pipeline creation failed: {e}"),
                );
                None
            }
        }
    }
}

const fn block_target(kind: BlockKind) -> BufferTarget {
    match kind {
        BlockKind::Storage => BufferTarget::ShaderStorage,
        BlockKind::Uniform => BufferTarget::Uniform,
        BlockKind::AtomicCounter => BufferTarget::AtomicCounter,
    }
}

/// Run `create` inside a validation error scope.
fn scoped<T>(
    device: &wgpu::Device,
    create: impl FnOnce() -> T,
) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error.to_string()),
        None => Ok(value),
    }
}

fn shader_module(
    device: &wgpu::Device,
    stage: &LinkedStage,
    slots: &[SubroutineSlot],
    selection: &[u32],
) -> wgpu::ShaderModule {
    let module = if slots.is_empty() {
        stage.module.clone()
    } else {
        reflect::specialize(&stage.module, slots, selection)
    };
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(stage.stage.name()),
        source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
    })
}

/// Spin the device until `receiver` yields.
fn wait_for<T>(device: &wgpu::Device, receiver: &mpsc::Receiver<T>) -> Option<T> {
    loop {
        let _ = device.poll(wgpu::PollType::Poll);
        match receiver.try_recv() {
            Ok(value) => return Some(value),
            Err(mpsc::TryRecvError::Empty) => std::thread::yield_now(),
            Err(mpsc::TryRecvError::Disconnected) => return None,
        }
    }
}

fn read_back(context: &GpuContext, buffer: &wgpu::Buffer) -> Result<AlignedBytes, String> {
    let size = buffer.size();
    let staging = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Nebula Readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = context.create_encoder("Nebula Readback");
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    context.submit(encoder);

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    wait_for(&context.device, &receiver)
        .ok_or_else(|| "readback callback dropped".to_owned())?
        .map_err(|e| e.to_string())?;

    let mut bytes = AlignedBytes::zeroed(size as usize);
    bytes.as_bytes_mut().copy_from_slice(&slice.get_mapped_range());
    staging.unmap();
    Ok(bytes)
}

impl GpuDevice for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn debug_output(&mut self) -> &mut DebugOutput {
        &mut self.debug
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> BufferHandle {
        let allocation = size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let label = match usage {
            BufferUsage::DynamicDraw => "Nebula Dynamic Draw Buffer",
            BufferUsage::DynamicRead => "Nebula Dynamic Read Buffer",
            BufferUsage::StaticDraw => "Nebula Static Draw Buffer",
        };
        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: allocation,
            usage: BUFFER_USAGE,
            mapped_at_creation: false,
        });
        let id = self.issue();
        let _ = self.buffers.insert(
            id,
            BufferSlot {
                buffer,
                size,
                shadow: None,
            },
        );
        BufferHandle(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        let Some(slot) = self.buffers.remove(&buffer.0) else {
            self.error(format!("destroy of unknown buffer {}", buffer.0));
            return;
        };
        slot.buffer.destroy();
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
            }
            Some(b) => {
                let _ = self.generic.insert(target, b);
            }
            None => {
                let _ = self.generic.remove(&target);
            }
        }
    }

    fn bind_buffer_base(&mut self, target: BufferTarget, index: u32, buffer: Option<BufferHandle>) {
        if !target.is_indexed() {
            self.error(format!("{target} has no indexed binding points"));
            return;
        }
        match buffer {
            Some(b) if !self.buffers.contains_key(&b.0) => {
                self.error(format!("bind of unknown buffer {}", b.0));
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
        let Some(slot) = self.buffers.get(&buffer.0) else {
            return;
        };
        let end = offset + data.len() as u64;
        let problem = if slot.shadow.is_some() {
            Some(format!("buffer_sub_data on mapped buffer {}", buffer.0))
        } else if end > slot.size {
            Some(format!(
                "buffer_sub_data of {} bytes at {offset} overflows buffer {}",
                data.len(),
                buffer.0
            ))
        } else if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0
            || (data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0
                && end != slot.size)
        {
            Some(format!(
                "buffer_sub_data at {offset} is not 4-byte aligned"
            ))
        } else {
            None
        };
        if let Some(problem) = problem {
            self.error(problem);
            return;
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.context.queue.write_buffer(&slot.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(
                data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize),
                0,
            );
            self.context.queue.write_buffer(&slot.buffer, offset, &padded);
        }
    }

    fn map_buffer(&mut self, buffer: BufferHandle) -> Option<&mut [u8]> {
        let Self {
            context,
            buffers,
            debug,
            ..
        } = self;
        let Some(slot) = buffers.get_mut(&buffer.0) else {
            let _ = debug.report(
                DebugSeverity::High,
                format!("map of unknown buffer {}", buffer.0),
            );
            return None;
        };
        if slot.shadow.is_none() {
            match read_back(context, &slot.buffer) {
                Ok(bytes) => slot.shadow = Some(bytes),
                Err(e) => {
                    let _ = debug.report(
                        DebugSeverity::High,
                        format!("map of buffer {} failed: {e}", buffer.0),
                    );
                    return None;
                }
            }
        }
        let size = slot.size as usize;
        slot.shadow
            .as_mut()
            .map(|shadow| &mut shadow.as_bytes_mut()[..size])
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        let Some(slot) = self.buffers.get_mut(&buffer.0) else {
            return;
        };
        if let Some(shadow) = slot.shadow.take() {
            self.context
                .queue
                .write_buffer(&slot.buffer, 0, shadow.as_bytes());
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
        if matches!(
            stage,
            ShaderStage::TessControl
                | ShaderStage::TessEvaluation
                | ShaderStage::Geometry
        ) {
            return Err(format!("{stage} shaders are not supported by wgpu"));
        }
        reflect::validate(&module)?;
        let reflection = reflect::reflect_stage(stage, &module)?;
        let id = self.issue();
        let _ = self.stages.insert(id, StageSlot { module, reflection });
        Ok(StageHandle(id))
    }

    fn destroy_stage(&mut self, stage: StageHandle) {
        let _ = self.stages.remove(&stage.0);
    }

    fn link_program(
        &mut self,
        stages: &[StageHandle],
    ) -> Result<(ProgramHandle, ProgramReflection), String> {
        let slots = stages
            .iter()
            .map(|handle| {
                self.stages
                    .get(&handle.0)
                    .ok_or_else(|| format!("unknown stage {}", handle.0))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let reflections: Vec<&StageReflection> =
            slots.iter().map(|slot| &slot.reflection).collect();
        let reflection = reflect::link(&reflections)?;
        let linked: Vec<LinkedStage> = slots
            .iter()
            .map(|slot| LinkedStage {
                stage: slot.reflection.stage,
                module: slot.module.clone(),
                entry_point: slot
                    .reflection
                    .entry_point
                    .clone()
                    .unwrap_or_default(),
            })
            .collect();

        let device = &self.context.device;
        let entries = program_layout_entries(&reflection);
        let (layout, pipeline_layout) = scoped(device, || {
            let layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Nebula Program Layout"),
                    entries: &entries,
                });
            let pipeline_layout =
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Nebula Pipeline Layout"),
                    bind_group_layouts: &[&layout],
                    push_constant_ranges: &[],
                });
            (layout, pipeline_layout)
        })?;

        let uniform_size = reflection
            .default_block
            .as_ref()
            .map_or(0, |block| u64::from(block.size).next_multiple_of(16));
        let uniform_buffer = (uniform_size > 0).then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Nebula Default Uniforms"),
                size: uniform_size,
                usage: wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
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
                stages: linked,
                layout,
                pipeline_layout,
                uniforms: AlignedBytes::zeroed(uniform_size as usize),
                uniform_buffer,
                uniforms_dirty: false,
                subroutines,
                compute_pipelines: FxHashMap::default(),
                render_pipelines: FxHashMap::default(),
            },
        );
        Ok((ProgramHandle(id), reflection))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if let Some(slot) = self.programs.remove(&program.0) {
            if let Some(buffer) = slot.uniform_buffer {
                buffer.destroy();
            }
        }
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
        slot.uniforms_dirty = true;
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
        let invalid = if slots.len() == indices.len() {
            slots
                .iter()
                .zip(indices)
                .find(|(slot, index)| **index as usize >= slot.candidates.len())
                .map(|(slot, _)| format!("invalid subroutine index for `{}`", slot.name))
        } else {
            Some(format!(
                "{stage} stage has {} subroutine slots, got {}",
                slots.len(),
                indices.len()
            ))
        };
        match invalid {
            Some(problem) => self.error(problem),
            None => {
                let _ = slot.subroutines.insert(stage, indices.to_vec());
            }
        }
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
        let Some(format) = vertex_format(element) else {
            self.error(format!("attribute {location} cannot source {element}"));
            return;
        };
        if let Some(slot) = self.vertex_arrays.get_mut(&vao.0) {
            let _ = slot.attributes.insert(
                location,
                AttributeSource {
                    buffer,
                    format,
                    instanced,
                },
            );
        }
    }

    fn disable_vertex_attrib(&mut self, location: u32) {
        if let Some(slot) = self
            .current_vertex_array
            .and_then(|vao| self.vertex_arrays.get_mut(&vao.0))
        {
            let _ = slot.attributes.remove(&location);
        }
    }

    fn patch_vertices(&mut self, count: u32) {
        self.error(format!(
            "patch size {count} requested; tessellation is not supported"
        ));
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
        let Some(bind_group) = self.bind_group(program, "dispatch") else {
            return;
        };
        let Some(pipeline) = self.compute_pipeline(program) else {
            return;
        };

        let mut encoder = self.context.create_encoder("Nebula Dispatch");
        {
            let mut pass =
                encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Nebula Compute Pass"),
                    timestamp_writes: None,
                });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        self.context.submit(encoder);
        self.drain_errors();
    }

    fn memory_barrier(&mut self, barriers: Barriers) {
        log::trace!("WgpuDevice: barrier {barriers:?} ordered by submission");
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.pending_clear = Some(wgpu::Color {
            r: f64::from(color[0]),
            g: f64::from(color[1]),
            b: f64::from(color[2]),
            a: f64::from(color[3]),
        });
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
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
        let Some(vertex_array) = self.current_vertex_array else {
            self.error("draw with no vertex array bound".to_owned());
            return;
        };
        let Some(&index_buffer) = self.generic.get(&BufferTarget::ElementArray)
        else {
            self.error("draw with no element array buffer bound".to_owned());
            return;
        };
        let Some(topology) = primitive_topology(topology) else {
            self.error(format!("{topology:?} topology is not supported"));
            return;
        };
        if self.target.is_none() {
            self.error("draw with no render target".to_owned());
            return;
        }
        if !self.check_unmapped("draw") {
            return;
        }
        let Some(inputs) = self.vertex_inputs(program, vertex_array) else {
            return;
        };
        let Some(bind_group) = self.bind_group(program, "draw") else {
            return;
        };
        let Some(pipeline) = self.render_pipeline(program, &inputs, topology)
        else {
            return;
        };
        let index_format = match index_type {
            IndexType::U32 => wgpu::IndexFormat::Uint32,
        };

        let Self {
            context,
            buffers,
            target,
            pending_clear,
            ..
        } = self;
        let Some(target) = target.as_ref() else {
            return;
        };
        let clear = pending_clear.take();
        let mut encoder = context.create_encoder("Nebula Draw");
        {
            let mut pass =
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Nebula Particle Pass"),
                    color_attachments: &[Some(
                        wgpu::RenderPassColorAttachment {
                            view: &target.view,
                            depth_slice: None,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: clear
                                    .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                                store: wgpu::StoreOp::Store,
                            },
                        },
                    )],
                    depth_stencil_attachment: target.depth_view.as_ref().map(
                        |view| wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: if clear.is_some() {
                                    wgpu::LoadOp::Clear(1.0)
                                } else {
                                    wgpu::LoadOp::Load
                                },
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        },
                    ),
                    ..Default::default()
                });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            for (slot, (_, source)) in inputs.iter().enumerate() {
                if let Some(bound) = buffers.get(&source.buffer.0) {
                    pass.set_vertex_buffer(slot as u32, bound.buffer.slice(..));
                }
            }
            if let Some(bound) = buffers.get(&index_buffer.0) {
                pass.set_index_buffer(bound.buffer.slice(..), index_format);
            }
            pass.draw_indexed(0..index_count, 0, 0..instances);
        }
        context.submit(encoder);
        self.drain_errors();
    }

    fn finish(&mut self) {
        let (sender, receiver) = mpsc::channel();
        self.context.queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        if wait_for(&self.context.device, &receiver).is_none() {
            self.error("finish: completion callback dropped".to_owned());
        }
        self.drain_errors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOUBLE: &str = r"
@group(0) @binding(0) var<storage, read_write> values: array<u32>;

@compute @workgroup_size(4)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    values[id.x] = values[id.x] * 2u;
}
";

    fn device() -> Option<WgpuDevice> {
        GpuContext::new_blocking().ok().map(WgpuDevice::new)
    }

    #[test]
    fn mapped_writes_survive_a_round_trip() {
        let Some(mut device) = device() else {
            return;
        };
        let buffer = device.create_buffer(16, BufferUsage::DynamicDraw);
        device
            .map_buffer(buffer)
            .unwrap()
            .copy_from_slice(&[7; 16]);
        device.unmap_buffer(buffer);
        assert_eq!(device.map_buffer(buffer).unwrap(), &[7; 16]);
        device.unmap_buffer(buffer);
    }

    #[test]
    fn dispatch_runs_the_shader() {
        let Some(mut device) = device() else {
            return;
        };
        let module = naga::front::wgsl::parse_str(DOUBLE).unwrap();
        let stage = device.compile_stage(ShaderStage::Compute, module).unwrap();
        let (program, _) = device.link_program(&[stage]).unwrap();

        let buffer = device.create_buffer(16, BufferUsage::DynamicDraw);
        device.bind_buffer(BufferTarget::CopyWrite, Some(buffer));
        device.buffer_sub_data(
            BufferTarget::CopyWrite,
            0,
            bytemuck::cast_slice(&[1_u32, 2, 3, 4]),
        );
        device.bind_buffer_base(BufferTarget::ShaderStorage, 0, Some(buffer));
        device.use_program(Some(program));
        device.dispatch_compute([1, 1, 1]);
        device.finish();

        let bytes = device.map_buffer(buffer).unwrap().to_vec();
        let values: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, vec![2, 4, 6, 8]);
    }

    #[test]
    fn render_target_is_replaceable() {
        let Some(mut device) = device() else {
            return;
        };
        assert!(device.render_target().is_none());
        let target = RenderTarget::new(
            &device.context().device,
            8,
            8,
            wgpu::TextureFormat::Rgba8Unorm,
            true,
        );
        device.set_render_target(Some(target));
        let stored = device.render_target().unwrap();
        assert_eq!(stored.format, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(stored.texture.width(), 8);
        assert!(stored.depth_view.is_some());

        device.set_render_target(None);
        assert!(device.render_target().is_none());
    }

    #[test]
    fn tessellation_stages_do_not_compile() {
        let Some(mut device) = device() else {
            return;
        };
        let module = naga::Module::default();
        assert!(device
            .compile_stage(ShaderStage::TessControl, module)
            .is_err());
    }
}
