use crate::gpu::GpuDevice;
use crate::particle::{BufferKind, ParticleBuffers};
use crate::program::ShaderProgram;

/// Outcome of binding a system's buffers to a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Buffers bound to a block of the same name.
    pub bound: usize,
    /// Buffer names the program declares no matching block for.
    pub unresolved: Vec<String>,
}

/// Bind every buffer to the program block sharing its name: attributes
/// to storage blocks, atomic counters to atomic counters and uniform
/// buffers to uniform blocks.
///
/// A buffer without a matching block is skipped. The program may simply
/// not use it.
pub fn bind_particle_buffers(
    device: &mut dyn GpuDevice,
    buffers: &mut ParticleBuffers,
    program: &ShaderProgram,
    log_unresolved: bool,
) -> BindReport {
    let mut report = BindReport::default();
    for (kind, name, buffer) in buffers.iter_mut() {
        let result = match kind {
            BufferKind::Attribute => program.bind_storage_block(device, name, buffer),
            BufferKind::AtomicCounter => program.bind_atomic_counter(device, name, buffer),
            BufferKind::Uniform => program.bind_uniform_block(device, name, buffer),
        };
        match result {
            Ok(_) => report.bound += 1,
            Err(e) => {
                if log_unresolved {
                    log::warn!(
                        "program `{}`: {kind} buffer `{name}` not bound: {e}",
                        program.label()
                    );
                }
                report.unresolved.push(name.to_owned());
            }
        }
    }
    report
}

/// Release the binding of every buffer.
pub fn unbind_particle_buffers(device: &mut dyn GpuDevice, buffers: &mut ParticleBuffers) {
    for (_, _, buffer) in buffers.iter_mut() {
        buffer.unbind(device);
    }
}
