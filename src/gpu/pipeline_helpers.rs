//! Shared wgpu boilerplate for reflected program layouts.

use super::device::{ShaderStage, Topology};
use super::element::{ElementType, ScalarKind};
use super::reflect::{BlockKind, ProgramReflection};

/// Visibility mask covering `stages`.
pub fn shader_stages(stages: &[ShaderStage]) -> wgpu::ShaderStages {
    stages
        .iter()
        .fold(wgpu::ShaderStages::NONE, |mask, stage| {
            mask | match stage {
                ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
                ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
                ShaderStage::Compute => wgpu::ShaderStages::COMPUTE,
                ShaderStage::TessControl
                | ShaderStage::TessEvaluation
                | ShaderStage::Geometry => wgpu::ShaderStages::NONE,
            }
        })
}

/// Storage buffer binding.
pub fn storage_buffer(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Uniform buffer binding.
pub fn uniform_buffer(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Layout entries for every block of a linked program, default block
/// included, ordered by binding.
pub fn program_layout_entries(reflection: &ProgramReflection) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries: Vec<_> = reflection
        .blocks
        .values()
        .map(|block| {
            let visibility = shader_stages(&block.stages);
            match block.kind {
                BlockKind::Storage | BlockKind::AtomicCounter => {
                    storage_buffer(block.binding, visibility, block.read_only)
                }
                BlockKind::Uniform => uniform_buffer(block.binding, visibility),
            }
        })
        .collect();
    if let Some(block) = &reflection.default_block {
        entries.push(uniform_buffer(block.binding, shader_stages(&block.stages)));
    }
    entries.sort_by_key(|entry| entry.binding);
    entries
}

/// Vertex format matching an element type, if the type can feed an
/// attribute.
pub fn vertex_format(element: ElementType) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;

    let ElementType::Vector { scalar, components } = element else {
        return None;
    };
    let format = match (scalar, components) {
        (ScalarKind::Float, 1) => F::Float32,
        (ScalarKind::Float, 2) => F::Float32x2,
        (ScalarKind::Float, 3) => F::Float32x3,
        (ScalarKind::Float, 4) => F::Float32x4,
        (ScalarKind::Uint | ScalarKind::Bool, 1) => F::Uint32,
        (ScalarKind::Uint | ScalarKind::Bool, 2) => F::Uint32x2,
        (ScalarKind::Uint | ScalarKind::Bool, 3) => F::Uint32x3,
        (ScalarKind::Uint | ScalarKind::Bool, 4) => F::Uint32x4,
        (ScalarKind::Int, 1) => F::Sint32,
        (ScalarKind::Int, 2) => F::Sint32x2,
        (ScalarKind::Int, 3) => F::Sint32x3,
        (ScalarKind::Int, 4) => F::Sint32x4,
        _ => return None,
    };
    Some(format)
}

/// Primitive topology of a draw, if wgpu can express it.
pub fn primitive_topology(topology: Topology) -> Option<wgpu::PrimitiveTopology> {
    match topology {
        Topology::Points => Some(wgpu::PrimitiveTopology::PointList),
        Topology::Triangles => Some(wgpu::PrimitiveTopology::TriangleList),
        Topology::Patches => None,
    }
}

/// Standard depth test state.
pub fn depth_state(format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_combines_stages() {
        let mask = shader_stages(&[ShaderStage::Vertex, ShaderStage::Fragment]);
        assert_eq!(mask, wgpu::ShaderStages::VERTEX_FRAGMENT);
        assert_eq!(
            shader_stages(&[ShaderStage::Geometry]),
            wgpu::ShaderStages::NONE
        );
    }

    #[test]
    fn vector_elements_map_to_vertex_formats() {
        assert_eq!(
            vertex_format(ElementType::VEC3),
            Some(wgpu::VertexFormat::Float32x3)
        );
        assert_eq!(
            vertex_format(ElementType::INT),
            Some(wgpu::VertexFormat::Sint32)
        );
        assert_eq!(vertex_format(ElementType::Opaque { size: 12 }), None);
    }
}
