//! Keyed registries for meshes and materials.
//!
//! Resources are created only through their manager, addressed by typed
//! ids, and immutable once created. Particle systems reference them by id.

/// Materials: a render program plus a primitive type.
pub mod material;
/// Indexed triangle and point meshes.
pub mod mesh;

use std::fmt;

pub use material::{Material, MaterialId, MaterialManager, RenderType};
pub use mesh::{Mesh, MeshId, MeshManager};

/// Errors produced by the resource managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A resource with this key already exists.
    DuplicateKey(String),
    /// An index refers past the end of the vertex list.
    IndexOutOfRange {
        /// Offending index.
        index: u32,
        /// Number of vertices.
        vertex_count: usize,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey(key) => {
                write!(f, "a resource named \"{key}\" already exists")
            }
            Self::IndexOutOfRange {
                index,
                vertex_count,
            } => write!(
                f,
                "index {index} is out of range for {vertex_count} vertices"
            ),
        }
    }
}

impl std::error::Error for ResourceError {}
