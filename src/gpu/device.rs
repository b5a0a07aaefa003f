//! The stateful GPU context shared by every engine component.
//!
//! [`GpuDevice`] models a single binding state machine: generic and
//! indexed buffer binding points, a current program, a current vertex
//! array, and per-stage subroutine selections. Every engine component talks
//! to the GPU through this trait, and every routine that changes a binding
//! point for internal purposes restores it before returning.

use std::fmt;

use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec3, Vec4};

use super::debug::DebugOutput;
use super::element::ElementType;
use super::reflect::{ProgramReflection, UniformKind, UniformLocation};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw device-issued id.
            #[must_use]
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Device-issued buffer handle.
    BufferHandle
);
handle!(
    /// Device-issued handle for a compiled, unlinked shader stage.
    StageHandle
);
handle!(
    /// Device-issued handle for a linked program.
    ProgramHandle
);
handle!(
    /// Device-issued vertex array (attribute layout) handle.
    VertexArrayHandle
);

/// Buffer binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferTarget {
    /// Vertex attribute source.
    Array,
    /// Index source for indexed draws.
    ElementArray,
    /// Shader storage block.
    ShaderStorage,
    /// Uniform block.
    Uniform,
    /// Atomic counter.
    AtomicCounter,
    /// Copy source staging point.
    CopyRead,
    /// Copy destination staging point.
    CopyWrite,
}

impl BufferTarget {
    /// Whether the target has numbered binding slots.
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        matches!(self, Self::ShaderStorage | Self::Uniform | Self::AtomicCounter)
    }
}

impl fmt::Display for BufferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Array => "array",
            Self::ElementArray => "element array",
            Self::ShaderStorage => "shader storage",
            Self::Uniform => "uniform",
            Self::AtomicCounter => "atomic counter",
            Self::CopyRead => "copy read",
            Self::CopyWrite => "copy write",
        };
        f.write_str(name)
    }
}

/// A single binding point: either a target's generic slot or one of its
/// numbered slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingPoint {
    /// Non-indexed binding of a target.
    Generic(BufferTarget),
    /// Numbered slot of an indexed target.
    Indexed(BufferTarget, u32),
}

impl BindingPoint {
    /// Target this point belongs to.
    #[must_use]
    pub fn target(self) -> BufferTarget {
        match self {
            Self::Generic(target) | Self::Indexed(target, _) => target,
        }
    }

    /// Slot index, `0` for generic points.
    #[must_use]
    pub fn index(self) -> u32 {
        match self {
            Self::Generic(_) => 0,
            Self::Indexed(_, index) => index,
        }
    }
}

impl fmt::Display for BindingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(target) => write!(f, "{target}"),
            Self::Indexed(target, index) => write!(f, "{target}[{index}]"),
        }
    }
}

/// Programmable pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Tessellation control stage.
    TessControl,
    /// Tessellation evaluation stage.
    TessEvaluation,
    /// Geometry stage.
    Geometry,
    /// Fragment stage.
    Fragment,
    /// Compute stage.
    Compute,
}

impl ShaderStage {
    /// Every stage, in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Vertex,
        Self::TessControl,
        Self::TessEvaluation,
        Self::Geometry,
        Self::Fragment,
        Self::Compute,
    ];

    /// Lowercase stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TessControl => "tessellation control",
            Self::TessEvaluation => "tessellation evaluation",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Hazards a memory barrier orders.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Barriers: u32 {
        /// Storage block writes before later storage access.
        const SHADER_STORAGE = 1 << 0;
        /// Writes before vertex attribute fetches.
        const VERTEX_ATTRIB_ARRAY = 1 << 1;
        /// Writes before index fetches.
        const ELEMENT_ARRAY = 1 << 2;
        /// Writes before uniform block reads.
        const UNIFORM = 1 << 3;
        /// Atomic counter updates.
        const ATOMIC_COUNTER = 1 << 4;
        /// Writes before mapping or copying buffers.
        const BUFFER_UPDATE = 1 << 5;
        /// Every hazard.
        const ALL = u32::MAX;
    }
}

/// Primitive topology of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// One point per index.
    Points,
    /// Indexed triangle list.
    Triangles,
    /// Tessellation patches.
    Patches,
}

/// Index element type of an element-array buffer. Meshes always upload
/// 32-bit indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 32-bit indices.
    U32,
}

impl IndexType {
    /// Bytes per index.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::U32 => 4,
        }
    }
}

/// Advisory access pattern given when a buffer is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Rewritten by the host and consumed by draws.
    #[default]
    DynamicDraw,
    /// Written by shaders and read back by the host.
    DynamicRead,
    /// Uploaded once and drawn many times.
    StaticDraw,
}

/// Device capability limits the engine consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest tessellation patch size, `0` when tessellation is
    /// unsupported.
    pub max_patch_vertices: u32,
    /// Largest work-group count per dispatch dimension.
    pub max_work_groups_per_dimension: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_patch_vertices: 32,
            max_work_groups_per_dimension: 65_535,
        }
    }
}

/// Value written into a program's default uniform block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `f32`.
    Float(f32),
    /// `i32`.
    Int(i32),
    /// `u32`.
    Uint(u32),
    /// Boolean, written as a `u32`.
    Bool(bool),
    /// `vec3<f32>`.
    Vec3(Vec3),
    /// `vec4<f32>`.
    Vec4(Vec4),
    /// `mat3x3<f32>`, columns padded to 16 bytes.
    Mat3(Mat3),
    /// `mat4x4<f32>`.
    Mat4(Mat4),
}

impl UniformValue {
    /// Whether this value may be written to a uniform of `kind`.
    #[must_use]
    pub fn fits(&self, kind: UniformKind) -> bool {
        matches!(
            (self, kind),
            (Self::Float(_), UniformKind::Float)
                | (Self::Int(_), UniformKind::Int)
                | (Self::Uint(_), UniformKind::Uint)
                | (Self::Bool(_), UniformKind::Bool | UniformKind::Uint)
                | (Self::Vec3(_), UniformKind::Vec3)
                | (Self::Vec4(_), UniformKind::Vec4)
                | (Self::Mat3(_), UniformKind::Mat3)
                | (Self::Mat4(_), UniformKind::Mat4)
        )
    }

    /// Host-shareable byte encoding.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Float(v) => v.to_ne_bytes().to_vec(),
            Self::Int(v) => v.to_ne_bytes().to_vec(),
            Self::Uint(v) => v.to_ne_bytes().to_vec(),
            Self::Bool(v) => u32::from(*v).to_ne_bytes().to_vec(),
            Self::Vec3(v) => {
                bytemuck::cast_slice::<f32, u8>(&v.to_array()).to_vec()
            }
            Self::Vec4(v) => {
                bytemuck::cast_slice::<f32, u8>(&v.to_array()).to_vec()
            }
            Self::Mat3(m) => {
                let cols = [
                    m.x_axis.extend(0.0),
                    m.y_axis.extend(0.0),
                    m.z_axis.extend(0.0),
                ];
                bytemuck::cast_slice::<Vec4, u8>(&cols).to_vec()
            }
            Self::Mat4(m) => {
                bytemuck::cast_slice::<f32, u8>(&m.to_cols_array()).to_vec()
            }
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        Self::Uint(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        Self::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

/// A stateful GPU context.
///
/// Calls mirror a classic binding-model graphics API: resources are bound
/// to binding points and later calls consume whatever is bound. Misuse is
/// reported through [`GpuDevice::debug_output`] and the offending call is
/// ignored; no method panics.
pub trait GpuDevice {
    /// Capability limits.
    fn limits(&self) -> DeviceLimits;

    /// Diagnostic channel.
    fn debug_output(&mut self) -> &mut DebugOutput;

    /// Allocate a zero-initialized buffer of `size` bytes. `usage` is a
    /// hint; every buffer supports every binding target.
    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> BufferHandle;

    /// Release a buffer. Any binding point holding it is cleared.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Set (or clear) the generic binding of `target`.
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);

    /// Set (or clear) slot `index` of an indexed target. Also sets the
    /// target's generic binding.
    fn bind_buffer_base(&mut self, target: BufferTarget, index: u32, buffer: Option<BufferHandle>);

    /// Buffer currently held by `point`.
    fn bound_buffer(&self, point: BindingPoint) -> Option<BufferHandle>;

    /// Overwrite bytes of the buffer bound to `target`'s generic point.
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: u64, data: &[u8]);

    /// Map a buffer for host access. Mapping an already mapped buffer
    /// returns the same region.
    fn map_buffer(&mut self, buffer: BufferHandle) -> Option<&mut [u8]>;

    /// Publish host writes and end the mapping. No-op when not mapped.
    fn unmap_buffer(&mut self, buffer: BufferHandle);

    /// Whether `buffer` is currently mapped.
    fn is_mapped(&self, buffer: BufferHandle) -> bool;

    /// Compile one stage.
    ///
    /// # Errors
    ///
    /// Returns the compiler log when the stage does not compile.
    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        module: naga::Module,
    ) -> Result<StageHandle, String>;

    /// Release a compiled stage.
    fn destroy_stage(&mut self, stage: StageHandle);

    /// Link compiled stages into a program and reflect its interface.
    ///
    /// # Errors
    ///
    /// Returns the linker log when the stages do not form a valid program.
    fn link_program(
        &mut self,
        stages: &[StageHandle],
    ) -> Result<(ProgramHandle, ProgramReflection), String>;

    /// Release a program.
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Make `program` current, or clear the current program.
    fn use_program(&mut self, program: Option<ProgramHandle>);

    /// The current program.
    fn current_program(&self) -> Option<ProgramHandle>;

    /// Write a default-block uniform of `program`, current or not.
    fn program_uniform(
        &mut self,
        program: ProgramHandle,
        location: UniformLocation,
        value: UniformValue,
    );

    /// Replace the subroutine selections of `stage` for the current
    /// program, one index per selector slot.
    fn uniform_subroutines(&mut self, stage: ShaderStage, indices: &[u32]);

    /// Allocate an empty vertex array.
    fn create_vertex_array(&mut self) -> VertexArrayHandle;

    /// Release a vertex array.
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    /// Make a vertex array current, or clear it.
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>);

    /// Source attribute `location` of the current vertex array from the
    /// buffer bound to [`BufferTarget::Array`], tightly packed, and enable
    /// it.
    fn vertex_attrib_pointer(&mut self, location: u32, element: ElementType, instanced: bool);

    /// Disable attribute `location` of the current vertex array.
    fn disable_vertex_attrib(&mut self, location: u32);

    /// Vertices per tessellation patch for subsequent patch draws.
    fn patch_vertices(&mut self, count: u32);

    /// Run the current compute program.
    fn dispatch_compute(&mut self, groups: [u32; 3]);

    /// Order prior shader writes before the given later accesses.
    fn memory_barrier(&mut self, barriers: Barriers);

    /// Clear the render target before the next draw.
    fn clear(&mut self, color: [f32; 4]);

    /// Enable or disable depth testing for subsequent draws.
    fn set_depth_test(&mut self, enabled: bool);

    /// Indexed, instanced draw with the current program, vertex array and
    /// element-array buffer.
    fn draw_elements_instanced(
        &mut self,
        topology: Topology,
        index_count: u32,
        index_type: IndexType,
        instances: u32,
    );

    /// Block until all submitted work has completed.
    fn finish(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mat3_is_padded_to_vec4_columns() {
        let bytes = UniformValue::Mat3(Mat3::IDENTITY).to_bytes();
        assert_eq!(bytes.len(), 48);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[4..8], &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn bool_fits_uint_uniforms() {
        assert!(UniformValue::Bool(true).fits(UniformKind::Uint));
        assert!(!UniformValue::Float(1.0).fits(UniformKind::Mat4));
        assert_eq!(UniformValue::Bool(true).to_bytes(), 1u32.to_ne_bytes());
    }

    #[test]
    fn binding_point_reports_index() {
        let point = BindingPoint::Indexed(BufferTarget::ShaderStorage, 3);
        assert_eq!(point.index(), 3);
        assert_eq!(point.to_string(), "shader storage[3]");
        assert_eq!(BindingPoint::Generic(BufferTarget::Array).index(), 0);
        assert!(!BufferTarget::Array.is_indexed());
    }
}
