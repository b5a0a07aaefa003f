use std::ops::{Deref, DerefMut};

use super::{ProgramError, ShaderProgram};
use crate::gpu::reflect::AttributeInfo;
use crate::gpu::{DeviceLimits, GpuDevice, ShaderStage};

/// A graphics program: vertex and fragment stages with optional
/// tessellation and geometry stages.
#[derive(Debug)]
pub struct RenderProgram {
    program: ShaderProgram,
    uses_tessellation: bool,
    patch_size: u32,
}

impl RenderProgram {
    pub(crate) fn new(
        label: impl Into<String>,
        stages: &[(ShaderStage, &str)],
        patch_size: u32,
    ) -> Result<Self, ProgramError> {
        let mut program = ShaderProgram::new(label);
        for (stage, source) in stages {
            program.add_stage(*stage, source)?;
        }
        let uses_tessellation = program.has_stage(ShaderStage::TessControl)
            || program.has_stage(ShaderStage::TessEvaluation);
        Ok(Self {
            program,
            uses_tessellation,
            patch_size: patch_size.max(1),
        })
    }

    /// Whether draws with this program submit tessellation patches.
    #[must_use]
    pub fn uses_tessellation(&self) -> bool {
        self.uses_tessellation
    }

    /// Vertices per tessellation patch.
    #[must_use]
    pub fn tessellation_patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Set the patch size, clamped to `[1, max_patch_vertices]`.
    pub fn set_tessellation_patch_size(&mut self, size: u32, limits: DeviceLimits) {
        self.patch_size = size.min(limits.max_patch_vertices).max(1);
    }

    /// Reflected vertex attribute `name`.
    #[must_use]
    pub fn vertex_attribute(&self, name: &str) -> Option<AttributeInfo> {
        if !self.program.is_built() {
            return None;
        }
        self.program.reflection().attribute(name)
    }

    /// Location of vertex attribute `name`.
    #[must_use]
    pub fn vertex_attribute_location(&self, name: &str) -> Option<u32> {
        self.vertex_attribute(name).map(|attribute| attribute.location)
    }

    /// Destroy the device program and its stages.
    pub fn release(self, device: &mut dyn GpuDevice) {
        self.program.release(device);
    }
}

impl Deref for RenderProgram {
    type Target = ShaderProgram;

    fn deref(&self) -> &ShaderProgram {
        &self.program
    }
}

impl DerefMut for RenderProgram {
    fn deref_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gpu::{ElementType, HeadlessDevice, ShaderLibrary};

    pub(crate) const SHADED: &str = r"
struct Camera {
    view_projection: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
}
@group(0) @binding(0) var<uniform> uniforms: Camera;

struct VertexIn {
    @location(0) in_position: vec3<f32>,
    @location(1) color: vec4<f32>,
}

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vs_main(input: VertexIn) -> VertexOut {
    var out: VertexOut;
    out.clip = uniforms.view_projection * vec4<f32>(input.in_position, 1.0);
    out.color = input.color;
    return out;
}

@fragment
fn fs_main(input: VertexOut) -> @location(0) vec4<f32> {
    return input.color;
}
";

    const HELPERS: &str = "fn displace(p: vec3<f32>) -> vec3<f32> { return p * 1.1; }";

    #[test]
    fn attributes_resolve_after_build() {
        let mut device = HeadlessDevice::new();
        let mut program = RenderProgram::new(
            "shaded",
            &[(ShaderStage::Vertex, SHADED), (ShaderStage::Fragment, SHADED)],
            3,
        )
        .unwrap();
        assert_eq!(program.vertex_attribute_location("color"), None);

        program.build(&mut device, &mut ShaderLibrary::new()).unwrap();
        assert_eq!(program.vertex_attribute_location("in_position"), Some(0));
        assert_eq!(
            program.vertex_attribute("color").map(|a| a.element),
            Some(ElementType::VEC4)
        );
        assert_eq!(program.vertex_attribute_location("normal"), None);
        assert!(!program.uses_tessellation());
    }

    #[test]
    fn one_tessellation_stage_enables_patches() {
        let program = RenderProgram::new(
            "tess",
            &[
                (ShaderStage::Vertex, SHADED),
                (ShaderStage::TessEvaluation, HELPERS),
                (ShaderStage::Fragment, SHADED),
            ],
            3,
        )
        .unwrap();
        assert!(program.uses_tessellation());
    }

    #[test]
    fn patch_size_is_clamped_to_device_limit() {
        let mut program = RenderProgram::new(
            "tess",
            &[(ShaderStage::Vertex, SHADED), (ShaderStage::Fragment, SHADED)],
            3,
        )
        .unwrap();
        assert_eq!(program.tessellation_patch_size(), 3);

        let limits = DeviceLimits {
            max_patch_vertices: 16,
            ..DeviceLimits::default()
        };
        program.set_tessellation_patch_size(40, limits);
        assert_eq!(program.tessellation_patch_size(), 16);
        program.set_tessellation_patch_size(0, limits);
        assert_eq!(program.tessellation_patch_size(), 1);

        let unsupported = DeviceLimits {
            max_patch_vertices: 0,
            ..DeviceLimits::default()
        };
        program.set_tessellation_patch_size(4, unsupported);
        assert_eq!(program.tessellation_patch_size(), 1);
    }
}
