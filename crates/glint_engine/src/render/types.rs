//! GLSL type table
//!
//! Every non-opaque GLSL type the renderer can reflect, with its byte size,
//! scalar kind and shape. Opaque types (samplers, images) collapse into
//! [`GlslType::Sampler`] and are set through the integer setter family.

use std::fmt;

/// Scalar family of a GLSL type, which also selects the uniform setter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `float` family
    Float,
    /// `double` family
    Double,
    /// `int` family (also samplers)
    Int,
    /// `uint` family
    UInt,
    /// `bool` family, set with integers
    Bool,
}

impl ScalarKind {
    /// Size of one scalar in bytes
    pub const fn size(self) -> usize {
        match self {
            Self::Double => 8,
            _ => 4,
        }
    }
}

/// A reflected GLSL type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum GlslType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Double,
    DVec2,
    DVec3,
    DVec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    Mat2x3,
    Mat2x4,
    Mat3x2,
    Mat3x4,
    Mat4x2,
    Mat4x3,
    DMat2,
    DMat3,
    DMat4,
    DMat2x3,
    DMat2x4,
    DMat3x2,
    DMat3x4,
    DMat4x2,
    DMat4x3,
    /// Any opaque type (`sampler2D`, `samplerCube`, `image2D`, ...)
    Sampler,
}

struct TypeRow {
    ty: GlslType,
    name: &'static str,
    scalar: ScalarKind,
    columns: u8,
    rows: u8,
}

const fn row(ty: GlslType, name: &'static str, scalar: ScalarKind, columns: u8, rows: u8) -> TypeRow {
    TypeRow {
        ty,
        name,
        scalar,
        columns,
        rows,
    }
}

use ScalarKind::{Bool, Double, Float, Int, UInt};

const TYPE_TABLE: &[TypeRow] = &[
    row(GlslType::Float, "float", Float, 1, 1),
    row(GlslType::Vec2, "vec2", Float, 1, 2),
    row(GlslType::Vec3, "vec3", Float, 1, 3),
    row(GlslType::Vec4, "vec4", Float, 1, 4),
    row(GlslType::Double, "double", Double, 1, 1),
    row(GlslType::DVec2, "dvec2", Double, 1, 2),
    row(GlslType::DVec3, "dvec3", Double, 1, 3),
    row(GlslType::DVec4, "dvec4", Double, 1, 4),
    row(GlslType::Int, "int", Int, 1, 1),
    row(GlslType::IVec2, "ivec2", Int, 1, 2),
    row(GlslType::IVec3, "ivec3", Int, 1, 3),
    row(GlslType::IVec4, "ivec4", Int, 1, 4),
    row(GlslType::UInt, "uint", UInt, 1, 1),
    row(GlslType::UVec2, "uvec2", UInt, 1, 2),
    row(GlslType::UVec3, "uvec3", UInt, 1, 3),
    row(GlslType::UVec4, "uvec4", UInt, 1, 4),
    row(GlslType::Bool, "bool", Bool, 1, 1),
    row(GlslType::BVec2, "bvec2", Bool, 1, 2),
    row(GlslType::BVec3, "bvec3", Bool, 1, 3),
    row(GlslType::BVec4, "bvec4", Bool, 1, 4),
    row(GlslType::Mat2, "mat2", Float, 2, 2),
    row(GlslType::Mat3, "mat3", Float, 3, 3),
    row(GlslType::Mat4, "mat4", Float, 4, 4),
    row(GlslType::Mat2x3, "mat2x3", Float, 2, 3),
    row(GlslType::Mat2x4, "mat2x4", Float, 2, 4),
    row(GlslType::Mat3x2, "mat3x2", Float, 3, 2),
    row(GlslType::Mat3x4, "mat3x4", Float, 3, 4),
    row(GlslType::Mat4x2, "mat4x2", Float, 4, 2),
    row(GlslType::Mat4x3, "mat4x3", Float, 4, 3),
    row(GlslType::DMat2, "dmat2", Double, 2, 2),
    row(GlslType::DMat3, "dmat3", Double, 3, 3),
    row(GlslType::DMat4, "dmat4", Double, 4, 4),
    row(GlslType::DMat2x3, "dmat2x3", Double, 2, 3),
    row(GlslType::DMat2x4, "dmat2x4", Double, 2, 4),
    row(GlslType::DMat3x2, "dmat3x2", Double, 3, 2),
    row(GlslType::DMat3x4, "dmat3x4", Double, 3, 4),
    row(GlslType::DMat4x2, "dmat4x2", Double, 4, 2),
    row(GlslType::DMat4x3, "dmat4x3", Double, 4, 3),
    row(GlslType::Sampler, "sampler", Int, 1, 1),
];

const OPAQUE_PREFIXES: &[&str] = &["sampler", "isampler", "usampler", "image", "iimage", "uimage", "atomic_uint"];

impl GlslType {
    fn row(self) -> &'static TypeRow {
        // Every variant has exactly one row; the fallback is the sampler row.
        TYPE_TABLE
            .iter()
            .find(|row| row.ty == self)
            .unwrap_or(&TYPE_TABLE[TYPE_TABLE.len() - 1])
    }

    /// Parse a GLSL type keyword. `mat2x2` style aliases are accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = match name {
            "mat2x2" => "mat2",
            "mat3x3" => "mat3",
            "mat4x4" => "mat4",
            "dmat2x2" => "dmat2",
            "dmat3x3" => "dmat3",
            "dmat4x4" => "dmat4",
            other => other,
        };
        if OPAQUE_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            return Some(Self::Sampler);
        }
        TYPE_TABLE.iter().find(|row| row.name == name).map(|row| row.ty)
    }

    /// GLSL spelling
    pub fn name(self) -> &'static str {
        self.row().name
    }

    /// Scalar family
    pub fn scalar(self) -> ScalarKind {
        self.row().scalar
    }

    /// Number of columns (1 for scalars and vectors)
    pub fn columns(self) -> usize {
        usize::from(self.row().columns)
    }

    /// Components per column
    pub fn rows(self) -> usize {
        usize::from(self.row().rows)
    }

    /// Total scalar components
    pub fn components(self) -> usize {
        self.columns() * self.rows()
    }

    /// Tightly packed size in bytes
    pub fn size(self) -> usize {
        self.components() * self.scalar().size()
    }

    /// `true` for opaque types bound to texture units
    pub fn is_sampler(self) -> bool {
        self == Self::Sampler
    }

    /// `true` for matrix types
    pub fn is_matrix(self) -> bool {
        self.columns() > 1
    }
}

impl fmt::Display for GlslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A host value for a plain (non-block) uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Float components, matrices column-major
    Float(Vec<f32>),
    /// Double components
    Double(Vec<f64>),
    /// Signed integers, also used for samplers and bools
    Int(Vec<i32>),
    /// Unsigned integers
    UInt(Vec<u32>),
}

impl UniformValue {
    /// Number of scalar components
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::UInt(v) => v.len(),
        }
    }

    /// `true` when no components are present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this value can feed a uniform of the given scalar family
    pub fn matches(&self, scalar: ScalarKind) -> bool {
        matches!(
            (self, scalar),
            (Self::Float(_), ScalarKind::Float)
                | (Self::Double(_), ScalarKind::Double)
                | (Self::Int(_), ScalarKind::Int | ScalarKind::Bool)
                | (Self::UInt(_), ScalarKind::UInt | ScalarKind::Bool)
        )
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        let family = match self {
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
        };
        format!("{} {family} values", self.len())
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(vec![value])
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(vec![value])
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        Self::Float(value.to_vec())
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        Self::Float(value.to_vec())
    }
}

impl From<&crate::foundation::math::Mat4> for UniformValue {
    fn from(value: &crate::foundation::math::Mat4) -> Self {
        Self::Float(value.as_slice().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_sizes() {
        assert_eq!(GlslType::Vec3.size(), 12);
        assert_eq!(GlslType::Mat4.size(), 64);
        assert_eq!(GlslType::DVec2.size(), 16);
        assert_eq!(GlslType::Mat3x2.components(), 6);
        assert_eq!(GlslType::Sampler.size(), 4);
    }

    #[test]
    fn test_opaque_types_are_samplers() {
        for name in ["sampler2D", "samplerCube", "usampler2D", "image2D", "sampler2DShadow"] {
            assert_eq!(GlslType::from_name(name), Some(GlslType::Sampler), "{name}");
        }
        assert_eq!(GlslType::Sampler.scalar(), ScalarKind::Int);
    }

    #[test]
    fn test_names_round_trip_through_table() {
        for row in TYPE_TABLE {
            assert_eq!(GlslType::from_name(row.name), Some(row.ty));
        }
        assert_eq!(GlslType::from_name("mat4x4"), Some(GlslType::Mat4));
        assert_eq!(GlslType::from_name("Light"), None);
    }

    #[test]
    fn test_value_matching() {
        assert!(UniformValue::from(1.0).matches(ScalarKind::Float));
        assert!(UniformValue::from(1).matches(ScalarKind::Bool));
        assert!(!UniformValue::from(1).matches(ScalarKind::Float));
    }
}
