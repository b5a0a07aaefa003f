//! Crate-level error types.

use std::fmt;

use crate::gpu::{BufferError, GpuInitError};
use crate::particle::ParticleError;
use crate::program::ProgramError;
use crate::resources::ResourceError;

/// Errors produced by the nebula crate.
#[derive(Debug)]
pub enum EngineError {
    /// GPU context initialization failure.
    Gpu(GpuInitError),
    /// Shader program creation or use failed.
    Program(ProgramError),
    /// Buffer size or element mismatch.
    Buffer(BufferError),
    /// Mesh or material registration failed.
    Resource(ResourceError),
    /// Particle buffer misuse.
    Particle(ParticleError),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::Program(e) => write!(f, "program error: {e}"),
            Self::Buffer(e) => write!(f, "buffer error: {e}"),
            Self::Resource(e) => write!(f, "resource error: {e}"),
            Self::Particle(e) => write!(f, "particle system error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Program(e) => Some(e),
            Self::Buffer(e) => Some(e),
            Self::Resource(e) => Some(e),
            Self::Particle(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::OptionsParse(_) => None,
        }
    }
}

impl From<GpuInitError> for EngineError {
    fn from(e: GpuInitError) -> Self {
        Self::Gpu(e)
    }
}

impl From<ProgramError> for EngineError {
    fn from(e: ProgramError) -> Self {
        Self::Program(e)
    }
}

impl From<BufferError> for EngineError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<ResourceError> for EngineError {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}

impl From<ParticleError> for EngineError {
    fn from(e: ParticleError) -> Self {
        Self::Particle(e)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
