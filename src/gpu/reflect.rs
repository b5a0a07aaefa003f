//! Shader interface reflection over `naga` IR.
//!
//! Conventions, all within `@group(0)`:
//!
//! - `var<storage> NAME` is a storage block `NAME`, or an atomic counter
//!   when its type is (an array of, or a struct starting with) `atomic<_>`.
//! - `var<uniform> uniforms` is the default block. Each of its members is
//!   a loose uniform addressed by byte offset.
//! - any other `var<uniform> NAME` is a uniform block `NAME`.
//! - `@location` inputs of the vertex entry point are vertex attributes.
//! - `override SEL: u32` is a subroutine selector when functions named
//!   `SEL__<name>` exist; those functions are its subroutines, in
//!   declaration order.

use std::collections::BTreeMap;

use naga::{AddressSpace, Binding, Module, StorageAccess, TypeInner};

use super::device::ShaderStage;
use super::element::{ElementType, ScalarKind};

/// Name of the global that holds a program's loose uniforms.
pub const DEFAULT_BLOCK_NAME: &str = "uniforms";

/// Separator between a selector name and a subroutine name.
pub const SUBROUTINE_SEPARATOR: &str = "__";

/// Kind of a named buffer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Shader storage block.
    Storage,
    /// Uniform block.
    Uniform,
    /// Atomic counter.
    AtomicCounter,
}

/// A named block of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block kind.
    pub kind: BlockKind,
    /// Binding index within group 0.
    pub binding: u32,
    /// Whether no stage writes the block.
    pub read_only: bool,
    /// Stages that declare the block.
    pub stages: Vec<ShaderStage>,
}

/// Type of a loose uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    /// `f32`.
    Float,
    /// `i32`.
    Int,
    /// `u32`.
    Uint,
    /// `bool`.
    Bool,
    /// `vec2<f32>`.
    Vec2,
    /// `vec3<f32>`.
    Vec3,
    /// `vec4<f32>`.
    Vec4,
    /// `mat3x3<f32>`.
    Mat3,
    /// `mat4x4<f32>`.
    Mat4,
    /// Anything else; not writable through `set_uniform`.
    Other,
}

/// Location of a loose uniform inside the default block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    /// Byte offset within the default block.
    pub offset: u32,
    /// Declared type.
    pub kind: UniformKind,
}

/// A program's default uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultBlock {
    /// Binding index within group 0.
    pub binding: u32,
    /// Block size in bytes.
    pub size: u32,
    /// Stages that declare the block.
    pub stages: Vec<ShaderStage>,
    /// Member uniforms by name.
    pub uniforms: BTreeMap<String, UniformLocation>,
}

/// A vertex-stage input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeInfo {
    /// `@location` index.
    pub location: u32,
    /// Declared type.
    pub element: ElementType,
}

/// One subroutine selector slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineSlot {
    /// Selector name.
    pub name: String,
    /// Compatible subroutines; a subroutine's index is its position.
    pub candidates: Vec<String>,
}

impl SubroutineSlot {
    /// Index of subroutine `name` within this slot.
    #[must_use]
    pub fn candidate_index(&self, name: &str) -> Option<u32> {
        self.candidates
            .iter()
            .position(|c| c == name)
            .map(|i| i as u32)
    }
}

/// Interface of a single compiled stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReflection {
    /// Stage kind.
    pub stage: ShaderStage,
    /// Entry point name, if the stage has one in IR.
    pub entry_point: Option<String>,
    /// Named blocks.
    pub blocks: BTreeMap<String, BlockInfo>,
    /// Default uniform block.
    pub default_block: Option<DefaultBlock>,
    /// Vertex inputs (vertex stage only).
    pub attributes: BTreeMap<String, AttributeInfo>,
    /// Work-group size (compute stage only).
    pub workgroup_size: Option<[u32; 3]>,
    /// Subroutine selector slots, in declaration order.
    pub subroutines: Vec<SubroutineSlot>,
}

/// Interface of a linked program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramReflection {
    /// Linked stages, in pipeline order.
    pub stages: Vec<ShaderStage>,
    /// Named blocks across all stages.
    pub blocks: BTreeMap<String, BlockInfo>,
    /// Merged default uniform block.
    pub default_block: Option<DefaultBlock>,
    /// Vertex inputs.
    pub attributes: BTreeMap<String, AttributeInfo>,
    /// Compute work-group size.
    pub workgroup_size: Option<[u32; 3]>,
    /// Subroutine slots per stage.
    pub subroutines: BTreeMap<ShaderStage, Vec<SubroutineSlot>>,
}

impl ProgramReflection {
    /// Whether the program is a compute program.
    #[must_use]
    pub fn is_compute(&self) -> bool {
        self.stages.contains(&ShaderStage::Compute)
    }

    /// Whether `stage` is linked.
    #[must_use]
    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        self.stages.contains(&stage)
    }

    /// Named block lookup.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&BlockInfo> {
        self.blocks.get(name)
    }

    /// Loose uniform lookup.
    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.default_block
            .as_ref()
            .and_then(|block| block.uniforms.get(name).copied())
    }

    /// Vertex attribute lookup.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<AttributeInfo> {
        self.attributes.get(name).copied()
    }

    /// Subroutine slots of `stage`.
    #[must_use]
    pub fn subroutine_slots(&self, stage: ShaderStage) -> &[SubroutineSlot] {
        self.subroutines.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Run the `naga` validator over a module.
///
/// # Errors
///
/// Returns the validator's message when the module is invalid.
pub fn validate(module: &Module) -> Result<(), String> {
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(module)
        .map(|_| ())
        .map_err(|e| e.as_inner().to_string())
}

const fn naga_stage(stage: ShaderStage) -> Option<naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Some(naga::ShaderStage::Vertex),
        ShaderStage::Fragment => Some(naga::ShaderStage::Fragment),
        ShaderStage::Compute => Some(naga::ShaderStage::Compute),
        ShaderStage::TessControl
        | ShaderStage::TessEvaluation
        | ShaderStage::Geometry => None,
    }
}

/// Reflect the interface of one stage.
///
/// # Errors
///
/// Fails when a vertex, fragment or compute module lacks a matching entry
/// point, or when a resource lives outside group 0.
pub fn reflect_stage(stage: ShaderStage, module: &Module) -> Result<StageReflection, String> {
    let entry_point = match naga_stage(stage) {
        Some(kind) => Some(
            module
                .entry_points
                .iter()
                .find(|ep| ep.stage == kind)
                .ok_or_else(|| format!("no {stage} entry point"))?,
        ),
        None => None,
    };

    let mut reflection = StageReflection {
        stage,
        entry_point: entry_point.map(|ep| ep.name.clone()),
        blocks: BTreeMap::new(),
        default_block: None,
        attributes: BTreeMap::new(),
        workgroup_size: None,
        subroutines: subroutine_slots(module),
    };

    for (_, var) in module.global_variables.iter() {
        let (Some(name), Some(binding)) = (&var.name, &var.binding) else {
            continue;
        };
        if binding.group != 0 {
            return Err(format!(
                "`{name}` uses group {}; only group 0 is supported",
                binding.group
            ));
        }
        let inner = &module.types[var.ty].inner;
        match var.space {
            AddressSpace::Storage { access } => {
                let kind = if is_atomic(module, inner) {
                    BlockKind::AtomicCounter
                } else {
                    BlockKind::Storage
                };
                let _ = reflection.blocks.insert(
                    name.clone(),
                    BlockInfo {
                        kind,
                        binding: binding.binding,
                        read_only: !access.contains(StorageAccess::STORE),
                        stages: vec![stage],
                    },
                );
            }
            AddressSpace::Uniform if name == DEFAULT_BLOCK_NAME => {
                reflection.default_block = Some(DefaultBlock {
                    binding: binding.binding,
                    size: inner.size(module.to_ctx()),
                    stages: vec![stage],
                    uniforms: default_block_members(module, inner),
                });
            }
            AddressSpace::Uniform => {
                let _ = reflection.blocks.insert(
                    name.clone(),
                    BlockInfo {
                        kind: BlockKind::Uniform,
                        binding: binding.binding,
                        read_only: true,
                        stages: vec![stage],
                    },
                );
            }
            _ => {}
        }
    }

    if let Some(ep) = entry_point {
        if ep.stage == naga::ShaderStage::Vertex {
            reflection.attributes = vertex_inputs(module, &ep.function);
        }
        if ep.stage == naga::ShaderStage::Compute {
            reflection.workgroup_size = Some(ep.workgroup_size);
        }
    }

    Ok(reflection)
}

fn is_atomic(module: &Module, inner: &TypeInner) -> bool {
    match inner {
        TypeInner::Atomic(_) => true,
        TypeInner::Array { base, .. } => {
            matches!(module.types[*base].inner, TypeInner::Atomic(_))
        }
        TypeInner::Struct { members, .. } => members.first().is_some_and(|m| {
            matches!(module.types[m.ty].inner, TypeInner::Atomic(_))
        }),
        _ => false,
    }
}

fn default_block_members(module: &Module, inner: &TypeInner) -> BTreeMap<String, UniformLocation> {
    let TypeInner::Struct { members, .. } = inner else {
        return BTreeMap::new();
    };
    members
        .iter()
        .filter_map(|member| {
            let name = member.name.clone()?;
            let kind = uniform_kind(&module.types[member.ty].inner);
            Some((
                name,
                UniformLocation {
                    offset: member.offset,
                    kind,
                },
            ))
        })
        .collect()
}

fn uniform_kind(inner: &TypeInner) -> UniformKind {
    use naga::ScalarKind as K;
    use naga::VectorSize as V;

    match *inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            K::Float | K::AbstractFloat => UniformKind::Float,
            K::Sint | K::AbstractInt => UniformKind::Int,
            K::Uint => UniformKind::Uint,
            K::Bool => UniformKind::Bool,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == K::Float => {
            match size {
                V::Bi => UniformKind::Vec2,
                V::Tri => UniformKind::Vec3,
                V::Quad => UniformKind::Vec4,
            }
        }
        TypeInner::Matrix {
            columns: V::Tri,
            rows: V::Tri,
            ..
        } => UniformKind::Mat3,
        TypeInner::Matrix {
            columns: V::Quad,
            rows: V::Quad,
            ..
        } => UniformKind::Mat4,
        _ => UniformKind::Other,
    }
}

fn element_type(module: &Module, inner: &TypeInner) -> ElementType {
    let (scalar, components) = match *inner {
        TypeInner::Scalar(scalar) => (scalar, 1),
        TypeInner::Vector { size, scalar } => (scalar, size as u8),
        _ => {
            return ElementType::Opaque {
                size: inner.size(module.to_ctx()),
            }
        }
    };
    let kind = match scalar.kind {
        naga::ScalarKind::Sint | naga::ScalarKind::AbstractInt => {
            ScalarKind::Int
        }
        naga::ScalarKind::Uint => ScalarKind::Uint,
        naga::ScalarKind::Float | naga::ScalarKind::AbstractFloat => {
            ScalarKind::Float
        }
        naga::ScalarKind::Bool => ScalarKind::Bool,
    };
    ElementType::vector(kind, components)
}

fn vertex_inputs(module: &Module, function: &naga::Function) -> BTreeMap<String, AttributeInfo> {
    let mut attributes = BTreeMap::new();
    for arg in &function.arguments {
        match (&arg.binding, &arg.name) {
            (Some(Binding::Location { location, .. }), Some(name)) => {
                let element = element_type(module, &module.types[arg.ty].inner);
                let _ = attributes.insert(
                    name.clone(),
                    AttributeInfo {
                        location: *location,
                        element,
                    },
                );
            }
            (None, _) => {
                let TypeInner::Struct { members, .. } =
                    &module.types[arg.ty].inner
                else {
                    continue;
                };
                for member in members {
                    if let (
                        Some(Binding::Location { location, .. }),
                        Some(name),
                    ) = (&member.binding, &member.name)
                    {
                        let element = element_type(module, &module.types[member.ty].inner);
                        let _ = attributes.insert(
                            name.clone(),
                            AttributeInfo {
                                location: *location,
                                element,
                            },
                        );
                    }
                }
            }
            _ => {}
        }
    }
    attributes
}

fn subroutine_slots(module: &Module) -> Vec<SubroutineSlot> {
    let mut slots = Vec::new();
    for (_, ov) in module.overrides.iter() {
        let Some(name) = &ov.name else {
            continue;
        };
        let is_u32 = matches!(
            module.types[ov.ty].inner,
            TypeInner::Scalar(naga::Scalar {
                kind: naga::ScalarKind::Uint,
                ..
            })
        );
        if !is_u32 {
            continue;
        }
        let prefix = format!("{name}{SUBROUTINE_SEPARATOR}");
        let candidates: Vec<String> = module
            .functions
            .iter()
            .filter_map(|(_, f)| {
                f.name.as_deref()?.strip_prefix(&prefix).map(str::to_owned)
            })
            .collect();
        if !candidates.is_empty() {
            slots.push(SubroutineSlot {
                name: name.clone(),
                candidates,
            });
        }
    }
    slots
}

/// Merge per-stage interfaces into a program interface.
///
/// # Errors
///
/// Fails when no stage is given, compute is mixed with graphics stages, a
/// graphics program has no vertex stage, or stages disagree about a block
/// or uniform.
pub fn link(stages: &[&StageReflection]) -> Result<ProgramReflection, String> {
    if stages.is_empty() {
        return Err("no shader stages attached".to_owned());
    }
    let has_compute = stages.iter().any(|s| s.stage == ShaderStage::Compute);
    if has_compute && stages.len() > 1 {
        return Err("compute stage cannot be linked with other stages".to_owned());
    }
    if !has_compute && !stages.iter().any(|s| s.stage == ShaderStage::Vertex) {
        return Err("graphics program has no vertex stage".to_owned());
    }

    let mut program = ProgramReflection::default();
    for reflection in stages {
        program.stages.push(reflection.stage);
        for (name, block) in &reflection.blocks {
            merge_block(&mut program.blocks, name, block)?;
        }
        if let Some(block) = &reflection.default_block {
            merge_default_block(&mut program.default_block, block)?;
        }
        if reflection.stage == ShaderStage::Vertex {
            program.attributes.clone_from(&reflection.attributes);
        }
        if reflection.workgroup_size.is_some() {
            program.workgroup_size = reflection.workgroup_size;
        }
        if !reflection.subroutines.is_empty() {
            let _ = program
                .subroutines
                .insert(reflection.stage, reflection.subroutines.clone());
        }
    }
    program.stages.sort();
    check_binding_collisions(&program)?;
    Ok(program)
}

fn merge_block(
    blocks: &mut BTreeMap<String, BlockInfo>,
    name: &str,
    block: &BlockInfo,
) -> Result<(), String> {
    let Some(existing) = blocks.get_mut(name) else {
        let _ = blocks.insert(name.to_owned(), block.clone());
        return Ok(());
    };
    if existing.kind != block.kind || existing.binding != block.binding {
        return Err(format!(
            "block `{name}` is declared differently across stages \
             ({:?} @binding({}) vs {:?} @binding({}))",
            existing.kind, existing.binding, block.kind, block.binding
        ));
    }
    existing.read_only &= block.read_only;
    existing.stages.extend(block.stages.iter().copied());
    Ok(())
}

fn merge_default_block(
    merged: &mut Option<DefaultBlock>,
    block: &DefaultBlock,
) -> Result<(), String> {
    let Some(existing) = merged else {
        *merged = Some(block.clone());
        return Ok(());
    };
    if existing.binding != block.binding {
        return Err(format!(
            "`{DEFAULT_BLOCK_NAME}` uses @binding({}) and @binding({})",
            existing.binding, block.binding
        ));
    }
    for (name, location) in &block.uniforms {
        match existing.uniforms.get(name) {
            Some(prior) if prior != location => {
                return Err(format!(
                    "uniform `{name}` has conflicting layouts across stages"
                ));
            }
            Some(_) => {}
            None => {
                let _ = existing.uniforms.insert(name.clone(), *location);
            }
        }
    }
    existing.size = existing.size.max(block.size);
    existing.stages.extend(block.stages.iter().copied());
    Ok(())
}

fn check_binding_collisions(program: &ProgramReflection) -> Result<(), String> {
    let mut seen: BTreeMap<u32, &str> = BTreeMap::new();
    let default = program
        .default_block
        .as_ref()
        .map(|block| (DEFAULT_BLOCK_NAME, block.binding));
    let named = program
        .blocks
        .iter()
        .map(|(name, block)| (name.as_str(), block.binding));
    for (name, binding) in named.chain(default) {
        if let Some(other) = seen.insert(binding, name) {
            return Err(format!(
                "@binding({binding}) is used by both `{other}` and `{name}`"
            ));
        }
    }
    Ok(())
}

/// Copy of `module` with each selector slot's override fixed to the given
/// subroutine index.
#[must_use]
pub fn specialize(module: &Module, slots: &[SubroutineSlot], selection: &[u32]) -> Module {
    let mut module = module.clone();
    for (slot, &index) in slots.iter().zip(selection) {
        let found = module
            .overrides
            .iter()
            .find(|(_, ov)| ov.name.as_deref() == Some(slot.name.as_str()))
            .map(|(handle, _)| handle);
        let Some(handle) = found else {
            continue;
        };
        let expr = module.global_expressions.append(
            naga::Expression::Literal(naga::Literal::U32(index)),
            naga::Span::UNDEFINED,
        );
        module.overrides[handle].init = Some(expr);
    }
    module
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPUTE: &str = r"
struct Params {
    time_step: f32,
    particle_count: u32,
}

@group(0) @binding(0) var<storage, read_write> position: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> velocity: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> spawned: atomic<u32>;
@group(0) @binding(3) var<uniform> uniforms: Params;
@group(0) @binding(4) var<uniform> forces: vec4<f32>;

override integrator: u32 = 0u;

fn integrator__euler(i: u32) {
    position[i] = position[i] + velocity[i] * uniforms.time_step + forces;
}

fn integrator__still(i: u32) {
}

@compute @workgroup_size(64, 2, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= uniforms.particle_count) {
        return;
    }
    if (integrator == 0u) {
        integrator__euler(i);
    } else {
        integrator__still(i);
    }
    atomicAdd(&spawned, 1u);
}
";

    const VERTEX: &str = r"
struct Camera {
    view_projection: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
}

struct VertexIn {
    @location(0) in_position: vec3<f32>,
    @location(1) color: vec4<f32>,
}

@group(0) @binding(0) var<storage, read> position: array<vec4<f32>>;
@group(0) @binding(1) var<uniform> uniforms: Camera;

@vertex
fn main(input: VertexIn, @builtin(instance_index) instance: u32) -> @builtin(position) vec4<f32> {
    let center = position[instance].xyz;
    return uniforms.view_projection * vec4<f32>(input.in_position + center, 1.0) + input.color * 0.0;
}
";

    const FRAGMENT: &str = r"
struct Camera {
    view_projection: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
}

@group(0) @binding(1) var<uniform> uniforms: Camera;

@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(uniforms.normal_matrix[0], 1.0);
}
";

    fn parse(source: &str) -> Module {
        naga::front::wgsl::parse_str(source).unwrap()
    }

    #[test]
    fn compute_interface_is_reflected() {
        let module = parse(COMPUTE);
        validate(&module).unwrap();
        let stage = reflect_stage(ShaderStage::Compute, &module).unwrap();

        assert_eq!(stage.workgroup_size, Some([64, 2, 1]));
        assert_eq!(stage.blocks["position"].kind, BlockKind::Storage);
        assert!(!stage.blocks["position"].read_only);
        assert!(stage.blocks["velocity"].read_only);
        assert_eq!(stage.blocks["spawned"].kind, BlockKind::AtomicCounter);
        assert_eq!(stage.blocks["forces"].kind, BlockKind::Uniform);
        assert_eq!(stage.blocks["forces"].binding, 4);

        let default = stage.default_block.as_ref().unwrap();
        assert_eq!(default.binding, 3);
        assert_eq!(
            default.uniforms["particle_count"],
            UniformLocation {
                offset: 4,
                kind: UniformKind::Uint
            }
        );

        assert_eq!(stage.subroutines.len(), 1);
        assert_eq!(stage.subroutines[0].name, "integrator");
        assert_eq!(stage.subroutines[0].candidates, vec!["euler", "still"]);
        assert_eq!(stage.subroutines[0].candidate_index("still"), Some(1));
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let module = parse(FRAGMENT);
        let err = reflect_stage(ShaderStage::Vertex, &module).unwrap_err();
        assert!(err.contains("vertex"));
    }

    #[test]
    fn graphics_link_merges_stages() {
        let vs = reflect_stage(ShaderStage::Vertex, &parse(VERTEX)).unwrap();
        let fs = reflect_stage(ShaderStage::Fragment, &parse(FRAGMENT)).unwrap();
        let program = link(&[&vs, &fs]).unwrap();

        assert_eq!(program.stages, vec![ShaderStage::Vertex, ShaderStage::Fragment]);
        assert_eq!(program.attribute("in_position").unwrap().location, 0);
        assert_eq!(
            program.attribute("color").unwrap().element,
            ElementType::VEC4
        );
        assert_eq!(program.uniform("normal_matrix").unwrap().kind, UniformKind::Mat3);
        assert_eq!(program.uniform("normal_matrix").unwrap().offset, 64);
        assert_eq!(
            program.default_block.as_ref().unwrap().stages,
            vec![ShaderStage::Vertex, ShaderStage::Fragment]
        );
        assert!(program.block("position").unwrap().read_only);
        assert!(!program.is_compute());
    }

    #[test]
    fn link_rejects_invalid_combinations() {
        let cs = reflect_stage(ShaderStage::Compute, &parse(COMPUTE)).unwrap();
        let vs = reflect_stage(ShaderStage::Vertex, &parse(VERTEX)).unwrap();
        let fs = reflect_stage(ShaderStage::Fragment, &parse(FRAGMENT)).unwrap();

        assert!(link(&[]).is_err());
        assert!(link(&[&cs, &vs]).is_err());
        assert!(link(&[&fs]).unwrap_err().contains("vertex"));
    }

    #[test]
    fn conflicting_bindings_fail_to_link() {
        let vs = reflect_stage(ShaderStage::Vertex, &parse(VERTEX)).unwrap();
        let mut fs =
            reflect_stage(ShaderStage::Fragment, &parse(FRAGMENT)).unwrap();
        fs.default_block.as_mut().unwrap().binding = 0;
        let err = link(&[&vs, &fs]).unwrap_err();
        assert!(err.contains("binding"));
    }

    #[test]
    fn specialize_rewrites_selector_default() {
        let module = parse(COMPUTE);
        let stage = reflect_stage(ShaderStage::Compute, &module).unwrap();
        let specialized = specialize(&module, &stage.subroutines, &[1]);
        validate(&specialized).unwrap();

        let (_, ov) = specialized
            .overrides
            .iter()
            .find(|(_, ov)| ov.name.as_deref() == Some("integrator"))
            .unwrap();
        let init = ov.init.unwrap();
        assert!(matches!(
            specialized.global_expressions[init],
            naga::Expression::Literal(naga::Literal::U32(1))
        ));
    }
}
