use glam::Vec3;
use rustc_hash::FxHashMap;

use super::ResourceError;
use crate::gpu::{Buffer, GpuDevice, IndexType, VertexArrayHandle};

/// Registry key of the built-in single-point mesh.
pub const DEFAULT_MESH: &str = "nebula/point";

/// Id of a mesh owned by a [`MeshManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) usize);

/// Indexed geometry drawn once per particle.
#[derive(Debug)]
pub struct Mesh {
    vertices: Buffer,
    indices: Buffer,
    vertex_array: VertexArrayHandle,
}

impl Mesh {
    fn new(device: &mut dyn GpuDevice, vertices: &[Vec3], indices: &[u32]) -> Self {
        Self {
            vertices: Buffer::from_slice(device, vertices),
            indices: Buffer::from_slice(device, indices),
            vertex_array: device.create_vertex_array(),
        }
    }

    /// Vertex positions, one `vec3<f32>` per vertex.
    #[must_use]
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertices
    }

    /// Mutable vertex buffer, for sourcing the position attribute.
    pub fn vertex_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.vertices
    }

    /// Triangle or point indices.
    #[must_use]
    pub fn index_buffer(&self) -> &Buffer {
        &self.indices
    }

    /// Mutable index buffer, for binding as the element array.
    pub fn index_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.indices
    }

    /// Number of indices drawn per instance.
    #[must_use]
    pub fn index_count(&self) -> u32 {
        u32::try_from(self.indices.item_count()).unwrap_or(u32::MAX)
    }

    /// Index element type.
    #[must_use]
    pub fn index_type(&self) -> IndexType {
        IndexType::U32
    }

    /// Attribute layout of this mesh.
    #[must_use]
    pub fn vertex_array(&self) -> VertexArrayHandle {
        self.vertex_array
    }

    /// Make this mesh's attribute layout current.
    pub fn bind(&self, device: &mut dyn GpuDevice) {
        device.bind_vertex_array(Some(self.vertex_array));
    }

    /// Clear the current attribute layout.
    pub fn unbind(&self, device: &mut dyn GpuDevice) {
        device.bind_vertex_array(None);
    }

    fn release(self, device: &mut dyn GpuDevice) {
        device.destroy_vertex_array(self.vertex_array);
        self.vertices.release(device);
        self.indices.release(device);
    }
}

/// Keyed mesh registry.
#[derive(Debug, Default)]
pub struct MeshManager {
    meshes: Vec<Mesh>,
    keys: FxHashMap<String, MeshId>,
}

impl MeshManager {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload a mesh and register it under `key`.
    ///
    /// # Errors
    ///
    /// Fails when `key` is taken or an index is out of range.
    pub fn create_mesh(
        &mut self,
        device: &mut dyn GpuDevice,
        key: &str,
        vertices: &[Vec3],
        indices: &[u32],
    ) -> Result<MeshId, ResourceError> {
        if self.keys.contains_key(key) {
            log::warn!("MeshManager: mesh \"{key}\" already exists");
            return Err(ResourceError::DuplicateKey(key.to_owned()));
        }
        if let Some(&index) = indices
            .iter()
            .find(|&&index| index as usize >= vertices.len())
        {
            return Err(ResourceError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }

        let id = MeshId(self.meshes.len());
        self.meshes.push(Mesh::new(device, vertices, indices));
        let _ = self.keys.insert(key.to_owned(), id);
        log::debug!(
            "MeshManager: mesh \"{key}\" created ({} vertices, {} indices)",
            vertices.len(),
            indices.len()
        );
        Ok(id)
    }

    /// Register a unit icosahedron (12 vertices, 20 triangles) under `key`.
    ///
    /// # Errors
    ///
    /// Fails when `key` is taken.
    pub fn create_icosahedron(
        &mut self,
        device: &mut dyn GpuDevice,
        key: &str,
    ) -> Result<MeshId, ResourceError> {
        let (vertices, indices) = icosahedron();
        self.create_mesh(device, key, &vertices, &indices)
    }

    /// The built-in mesh: a single point at the origin. Created on first
    /// use.
    pub fn default_mesh(&mut self, device: &mut dyn GpuDevice) -> MeshId {
        if let Some(id) = self.find(DEFAULT_MESH) {
            return id;
        }
        let id = MeshId(self.meshes.len());
        self.meshes.push(Mesh::new(device, &[Vec3::ZERO], &[0]));
        let _ = self.keys.insert(DEFAULT_MESH.to_owned(), id);
        id
    }

    /// Id of the mesh registered under `key`.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<MeshId> {
        self.keys.get(key).copied()
    }

    /// Mesh by id.
    #[must_use]
    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    /// Mutable mesh by id.
    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.get_mut(id.0)
    }

    /// Number of registered meshes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether no mesh is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Release every mesh. Previously issued ids no longer resolve.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for mesh in self.meshes.drain(..) {
            mesh.release(device);
        }
        self.keys.clear();
    }
}

fn icosahedron() -> (Vec<Vec3>, Vec<u32>) {
    const X: f32 = 0.525_731_1;
    const Z: f32 = 0.850_650_8;

    let vertices = vec![
        Vec3::new(-X, 0.0, Z),
        Vec3::new(X, 0.0, Z),
        Vec3::new(-X, 0.0, -Z),
        Vec3::new(X, 0.0, -Z),
        Vec3::new(0.0, Z, X),
        Vec3::new(0.0, Z, -X),
        Vec3::new(0.0, -Z, X),
        Vec3::new(0.0, -Z, -X),
        Vec3::new(Z, X, 0.0),
        Vec3::new(-Z, X, 0.0),
        Vec3::new(Z, -X, 0.0),
        Vec3::new(-Z, -X, 0.0),
    ];
    let indices = vec![
        1, 4, 0, 4, 9, 0, 4, 5, 9, 8, 5, 4, 1, 8, 4, //
        1, 10, 8, 10, 3, 8, 8, 3, 5, 3, 2, 5, 3, 7, 2, //
        3, 10, 7, 10, 6, 7, 6, 11, 7, 6, 0, 11, 6, 1, 0, //
        10, 1, 6, 11, 0, 9, 2, 11, 9, 5, 2, 9, 11, 2, 7,
    ];
    (vertices, indices)
}
