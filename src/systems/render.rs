use glam::{Mat3, Mat4};

use super::binding::{bind_particle_buffers, unbind_particle_buffers};
use super::context::{DrawContext, GlobalGpuState};
use crate::gpu::{BindingPoint, Buffer, BufferTarget, GpuDevice, Topology};
use crate::particle::ParticleSystem;
use crate::program::{ProgramError, ProgramService, RenderProgram};
use crate::resources::{MaterialManager, MeshManager, RenderType};

/// Vertex attribute fed from each mesh's vertex buffer.
pub const MESH_POSITION_ATTRIBUTE: &str = "in_position";

/// Source attribute `name` of `program` from `buffer` on the current
/// vertex array and record its location in `bindings`. The buffer's
/// element type must match the declared input in scalar kind and
/// component count. The array-buffer binding is restored afterwards.
pub(crate) fn set_vertex_attribute(
    device: &mut dyn GpuDevice,
    program: &RenderProgram,
    bindings: &mut Vec<u32>,
    name: &str,
    buffer: &Buffer,
    instanced: bool,
) -> Result<u32, ProgramError> {
    let attribute = program
        .vertex_attribute(name)
        .ok_or_else(|| ProgramError::UnknownAttribute(name.to_owned()))?;
    let element = buffer.element_type();
    if !element.is_reflectable() || element != attribute.element {
        log::debug!(
            "RenderSystem: `{name}` declared as {}, buffer holds {element}",
            attribute.element
        );
        return Err(ProgramError::NotReflectable(name.to_owned()));
    }

    let previous = device.bound_buffer(BindingPoint::Generic(BufferTarget::Array));
    device.bind_buffer(BufferTarget::Array, Some(buffer.handle()));
    device.vertex_attrib_pointer(attribute.location, element, instanced);
    device.bind_buffer(BufferTarget::Array, previous);

    bindings.push(attribute.location);
    Ok(attribute.location)
}

/// Draws particle systems as instanced meshes.
#[derive(Debug, Clone)]
pub struct RenderSystem {
    view_projection: Mat4,
    normal_matrix: Mat3,
    attribute_bindings: Vec<u32>,
    log_unresolved: bool,
}

impl Default for RenderSystem {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RenderSystem {
    /// New system with identity camera matrices.
    #[must_use]
    pub fn new(log_unresolved: bool) -> Self {
        Self {
            view_projection: Mat4::IDENTITY,
            normal_matrix: Mat3::IDENTITY,
            attribute_bindings: Vec::new(),
            log_unresolved,
        }
    }

    /// Toggle warnings for unresolved buffer names.
    pub fn set_log_unresolved(&mut self, enabled: bool) {
        self.log_unresolved = enabled;
    }

    /// Camera matrix uploaded as `view_projection` on every draw.
    pub fn set_view_projection(&mut self, view_projection: Mat4) {
        self.view_projection = view_projection;
    }

    /// Uploaded as `normal_matrix` on every draw.
    pub fn set_normal_matrix(&mut self, normal_matrix: Mat3) {
        self.normal_matrix = normal_matrix;
    }

    /// Current view-projection matrix.
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    /// Current normal matrix.
    #[must_use]
    pub fn normal_matrix(&self) -> Mat3 {
        self.normal_matrix
    }

    /// Clear the target ahead of this frame's draws.
    pub fn begin_frame(&self, device: &mut dyn GpuDevice, clear_color: [f32; 4]) {
        device.clear(clear_color);
    }

    /// Enable or disable depth testing for later draws.
    pub fn set_depth_test(&self, device: &mut dyn GpuDevice, enabled: bool) {
        device.set_depth_test(enabled);
    }

    /// Draw one instance of the system's mesh per particle.
    ///
    /// Nothing is drawn when the material, its program or the mesh cannot
    /// be found, or when the program is not built.
    pub fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        programs: &mut ProgramService,
        meshes: &mut MeshManager,
        materials: &MaterialManager,
        system: &mut ParticleSystem,
    ) {
        let Some(material) = materials.get(system.material()).copied() else {
            log::warn!("RenderSystem: unknown material {:?}", system.material());
            return;
        };
        let Some(program) = programs.render_program_mut(material.program()) else {
            log::warn!("RenderSystem: unknown render program {:?}", material.program());
            return;
        };
        let Some(mesh) = meshes.get_mut(system.mesh()) else {
            log::warn!("RenderSystem: unknown mesh {:?}", system.mesh());
            return;
        };
        if program.bind(device).is_err() {
            return;
        }
        let view_projection = program.set_uniform(device, "view_projection", self.view_projection);
        let normal_matrix = program.set_uniform(device, "normal_matrix", self.normal_matrix);
        for (name, result) in [
            ("view_projection", view_projection),
            ("normal_matrix", normal_matrix),
        ] {
            if let Err(e) = result {
                log::debug!("RenderSystem: `{}` skips {name}: {e}", program.label());
            }
        }

        let particle_count = system.particle_count();
        let ParticleSystem {
            buffers,
            pre_render,
            post_render,
            ..
        } = system;
        let attribute_bindings = &mut self.attribute_bindings;
        attribute_bindings.clear();

        mesh.bind(device);
        if let Err(e) = set_vertex_attribute(
            device,
            program,
            attribute_bindings,
            MESH_POSITION_ATTRIBUTE,
            mesh.vertex_buffer(),
            false,
        ) {
            log::debug!("RenderSystem: `{}` has no mesh positions: {e}", program.label());
        }
        mesh.index_buffer_mut().bind(device, BufferTarget::ElementArray);
        let _ = bind_particle_buffers(device, buffers, program, self.log_unresolved);

        pre_render.emit(|hook| {
            hook(&mut DrawContext {
                particle_count,
                buffers: &mut *buffers,
                program: &mut *program,
                gpu: GlobalGpuState::new(&mut *device),
                attribute_bindings: &mut *attribute_bindings,
            });
        });

        program.activate_subroutines(device);
        let topology = if program.uses_tessellation() {
            let size = program
                .tessellation_patch_size()
                .min(device.limits().max_patch_vertices)
                .max(1);
            device.patch_vertices(size);
            Topology::Patches
        } else if material.render_type() == RenderType::Points {
            Topology::Points
        } else {
            Topology::Triangles
        };
        device.draw_elements_instanced(
            topology,
            mesh.index_count(),
            mesh.index_type(),
            particle_count,
        );

        post_render.emit(|hook| {
            hook(&mut DrawContext {
                particle_count,
                buffers: &mut *buffers,
                program: &mut *program,
                gpu: GlobalGpuState::new(&mut *device),
                attribute_bindings: &mut *attribute_bindings,
            });
        });

        for location in attribute_bindings.drain(..) {
            device.disable_vertex_attrib(location);
        }
        unbind_particle_buffers(device, buffers);
        mesh.index_buffer_mut().unbind(device);
        mesh.unbind(device);
        program.unbind(device);
    }
}
