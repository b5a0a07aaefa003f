//! Particle systems: named per-particle buffers and an ordered list of
//! compute actions.

/// Compute steps and their hooks.
pub mod action;
/// Named buffer maps of a particle system.
pub mod buffers;
/// The particle system aggregate.
pub mod system;

use std::fmt;

pub use action::Action;
pub use buffers::{BufferKind, ParticleBuffers};
pub use system::{ParticleSystem, ParticleSystemId};

/// Errors produced while managing particle buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticleError {
    /// A buffer of this kind and name already exists.
    DuplicateBuffer {
        /// Map the name collided in.
        kind: BufferKind,
        /// Colliding name.
        name: String,
    },
    /// No attribute buffer has this name.
    UnknownAttribute(String),
}

impl fmt::Display for ParticleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateBuffer { kind, name } => {
                write!(f, "{kind} buffer \"{name}\" already exists")
            }
            Self::UnknownAttribute(name) => {
                write!(f, "no particle attribute \"{name}\"")
            }
        }
    }
}

impl std::error::Error for ParticleError {}
