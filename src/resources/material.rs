use rustc_hash::FxHashMap;

use super::ResourceError;
use crate::program::RenderProgramId;

/// Registry key of the built-in material.
pub const DEFAULT_MATERIAL: &str = "nebula/default";

/// Primitive type used when the program does not tessellate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderType {
    /// Indexed triangle list.
    #[default]
    Triangles,
    /// One point per index.
    Points,
}

/// Id of a material owned by a [`MaterialManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub(crate) usize);

/// How a particle system is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    program: RenderProgramId,
    render_type: RenderType,
}

impl Material {
    /// Render program.
    #[must_use]
    pub fn program(&self) -> RenderProgramId {
        self.program
    }

    /// Primitive type.
    #[must_use]
    pub fn render_type(&self) -> RenderType {
        self.render_type
    }
}

/// Keyed material registry.
#[derive(Debug, Default)]
pub struct MaterialManager {
    materials: Vec<Material>,
    keys: FxHashMap<String, MaterialId>,
}

impl MaterialManager {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material under `key`.
    ///
    /// # Errors
    ///
    /// Fails when `key` is taken.
    pub fn create_material(
        &mut self,
        key: &str,
        program: RenderProgramId,
        render_type: RenderType,
    ) -> Result<MaterialId, ResourceError> {
        if self.keys.contains_key(key) {
            log::warn!("MaterialManager: material \"{key}\" already exists");
            return Err(ResourceError::DuplicateKey(key.to_owned()));
        }
        Ok(self.insert(key, program, render_type))
    }

    /// The built-in material: `program` drawn as points. Created on first
    /// use; later calls return the same material.
    pub fn default_material(&mut self, program: RenderProgramId) -> MaterialId {
        self.find(DEFAULT_MATERIAL)
            .unwrap_or_else(|| self.insert(DEFAULT_MATERIAL, program, RenderType::Points))
    }

    fn insert(
        &mut self,
        key: &str,
        program: RenderProgramId,
        render_type: RenderType,
    ) -> MaterialId {
        let id = MaterialId(self.materials.len());
        self.materials.push(Material {
            program,
            render_type,
        });
        let _ = self.keys.insert(key.to_owned(), id);
        id
    }

    /// Id of the material registered under `key`.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<MaterialId> {
        self.keys.get(key).copied()
    }

    /// Material by id.
    #[must_use]
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    /// Number of registered materials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Whether no material is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Forget every material.
    pub fn clear(&mut self) {
        self.materials.clear();
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::program::ProgramService;

    #[test]
    fn materials_share_one_program() {
        let mut device = HeadlessDevice::new();
        let mut programs = ProgramService::new(3);
        let program = programs.default_render_program(&mut device, [1.0; 4]).unwrap();

        let mut materials = MaterialManager::new();
        let solid = materials
            .create_material("solid", program, RenderType::Triangles)
            .unwrap();
        let dots = materials
            .create_material("dots", program, RenderType::Points)
            .unwrap();
        assert_eq!(materials.get(solid).unwrap().program(), program);
        assert_eq!(materials.get(dots).unwrap().program(), program);
        assert_eq!(materials.get(dots).unwrap().render_type(), RenderType::Points);

        assert_eq!(
            materials.create_material("dots", program, RenderType::Triangles),
            Err(ResourceError::DuplicateKey("dots".to_owned()))
        );
        assert_eq!(materials.get(dots).unwrap().render_type(), RenderType::Points);
    }

    #[test]
    fn default_material_draws_points() {
        let mut device = HeadlessDevice::new();
        let mut programs = ProgramService::new(3);
        let program = programs.default_render_program(&mut device, [1.0; 4]).unwrap();
        let mut materials = MaterialManager::new();
        let id = materials.default_material(program);
        assert_eq!(materials.default_material(program), id);
        assert_eq!(materials.get(id).unwrap().render_type(), RenderType::Points);
        assert_eq!(materials.len(), 1);
    }
}
