//! Element-type tags for buffer contents.
//!
//! Every [`Buffer`](super::buffer::Buffer) carries an [`ElementType`]
//! describing one item. Vertex-attribute binding dispatches on this tag;
//! buffers whose element type is [`ElementType::Opaque`] still hold bytes
//! but cannot feed a vertex attribute.

use std::any::TypeId;
use std::fmt;

/// Scalar component kind of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// 32-bit signed integer.
    Int,
    /// 32-bit unsigned integer.
    Uint,
    /// 32-bit float.
    Float,
    /// Boolean, stored as a 32-bit unsigned integer.
    Bool,
}

/// Shape of a single buffer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Scalar or vector of 1 to 4 components.
    Vector {
        /// Component kind.
        scalar: ScalarKind,
        /// Component count, 1..=4.
        components: u8,
    },
    /// Unrecognized item type of the given byte size.
    Opaque {
        /// Size of one item in bytes.
        size: u32,
    },
}

impl ElementType {
    /// Scalar or vector tag. Component counts outside 1..=4 produce an
    /// opaque tag of the equivalent size.
    #[must_use]
    pub const fn vector(scalar: ScalarKind, components: u8) -> Self {
        if components >= 1 && components <= 4 {
            Self::Vector { scalar, components }
        } else {
            Self::Opaque {
                size: components as u32 * 4,
            }
        }
    }

    /// Scalar `f32`.
    pub const FLOAT: Self = Self::vector(ScalarKind::Float, 1);
    /// `vec2<f32>`.
    pub const VEC2: Self = Self::vector(ScalarKind::Float, 2);
    /// `vec3<f32>`.
    pub const VEC3: Self = Self::vector(ScalarKind::Float, 3);
    /// `vec4<f32>`.
    pub const VEC4: Self = Self::vector(ScalarKind::Float, 4);
    /// Scalar `u32`.
    pub const UINT: Self = Self::vector(ScalarKind::Uint, 1);
    /// Scalar `i32`.
    pub const INT: Self = Self::vector(ScalarKind::Int, 1);

    /// Derive the tag for a host type.
    ///
    /// Recognizes `f32`, `i32`, `u32`, arrays of 1 to 4 of those, and the
    /// matching `glam` vector types. Anything else is opaque.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        let id = TypeId::of::<T>();
        let table: [(TypeId, ScalarKind, u8); 22] = [
            (TypeId::of::<f32>(), ScalarKind::Float, 1),
            (TypeId::of::<[f32; 1]>(), ScalarKind::Float, 1),
            (TypeId::of::<[f32; 2]>(), ScalarKind::Float, 2),
            (TypeId::of::<[f32; 3]>(), ScalarKind::Float, 3),
            (TypeId::of::<[f32; 4]>(), ScalarKind::Float, 4),
            (TypeId::of::<glam::Vec2>(), ScalarKind::Float, 2),
            (TypeId::of::<glam::Vec3>(), ScalarKind::Float, 3),
            (TypeId::of::<glam::Vec4>(), ScalarKind::Float, 4),
            (TypeId::of::<i32>(), ScalarKind::Int, 1),
            (TypeId::of::<[i32; 2]>(), ScalarKind::Int, 2),
            (TypeId::of::<[i32; 3]>(), ScalarKind::Int, 3),
            (TypeId::of::<[i32; 4]>(), ScalarKind::Int, 4),
            (TypeId::of::<glam::IVec2>(), ScalarKind::Int, 2),
            (TypeId::of::<glam::IVec3>(), ScalarKind::Int, 3),
            (TypeId::of::<glam::IVec4>(), ScalarKind::Int, 4),
            (TypeId::of::<u32>(), ScalarKind::Uint, 1),
            (TypeId::of::<[u32; 2]>(), ScalarKind::Uint, 2),
            (TypeId::of::<[u32; 3]>(), ScalarKind::Uint, 3),
            (TypeId::of::<[u32; 4]>(), ScalarKind::Uint, 4),
            (TypeId::of::<glam::UVec2>(), ScalarKind::Uint, 2),
            (TypeId::of::<glam::UVec3>(), ScalarKind::Uint, 3),
            (TypeId::of::<glam::UVec4>(), ScalarKind::Uint, 4),
        ];

        table
            .iter()
            .find(|(candidate, _, _)| *candidate == id)
            .map_or(
                Self::Opaque {
                    size: std::mem::size_of::<T>() as u32,
                },
                |&(_, scalar, components)| Self::Vector { scalar, components },
            )
    }

    /// Size of one item in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Vector { components, .. } => components as u32 * 4,
            Self::Opaque { size } => size,
        }
    }

    /// Whether shader reflection can consume this element type.
    #[must_use]
    pub const fn is_reflectable(self) -> bool {
        matches!(self, Self::Vector { .. })
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector {
                scalar,
                components: 1,
            } => write!(f, "{}", scalar_name(*scalar)),
            Self::Vector { scalar, components } => {
                write!(f, "vec{components}<{}>", scalar_name(*scalar))
            }
            Self::Opaque { size } => write!(f, "opaque({size} bytes)"),
        }
    }
}

const fn scalar_name(scalar: ScalarKind) -> &'static str {
    match scalar {
        ScalarKind::Int => "i32",
        ScalarKind::Uint => "u32",
        ScalarKind::Float => "f32",
        ScalarKind::Bool => "bool",
    }
}
