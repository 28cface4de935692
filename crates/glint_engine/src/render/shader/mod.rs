//! Shader programs
//!
//! A [`ShaderProgram`] owns a linked program object. Plain (non-block)
//! uniforms are written through [`UniformSetter`]s, which check the value
//! against the reflected GLSL type before anything reaches the device.
//! Block uniforms are never set one by one; they live in buffers wired up by
//! [`crate::render::uniformed::UniformedRenderer`].

pub mod introspection;

pub use introspection::{AttributeInfo, BlockInfo, ProgramIntrospection, UniformInfo};

use crate::render::device::{GraphicsDevice, ProgramId, ShaderSources};
use crate::render::types::{GlslType, UniformValue};
use crate::render::{RenderError, RenderResult};

/// A linked program
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    label: String,
}

impl ShaderProgram {
    /// Compile and link `sources`
    ///
    /// Compile and link failures carry the driver's info log verbatim.
    pub fn new(device: &mut dyn GraphicsDevice, label: impl Into<String>, sources: &ShaderSources) -> RenderResult<Self> {
        let label = label.into();
        let id = device.link_program(sources).map_err(|err| {
            log::error!("Shader program '{label}' failed: {err}");
            err
        })?;
        log::debug!("Linked shader program '{label}' as {}", id.0);
        Ok(Self { id, label })
    }

    /// Device handle
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Debug label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Install the program
    pub fn use_program(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        device.use_program(self.id)
    }

    /// Location of a plain uniform
    pub fn uniform_location(&self, device: &dyn GraphicsDevice, name: &str) -> Option<i32> {
        device.uniform_location(self.id, name)
    }

    /// Reflect the program's interface
    pub fn introspect(&self, device: &dyn GraphicsDevice) -> RenderResult<ProgramIntrospection> {
        ProgramIntrospection::reflect(device, self.id)
    }

    /// Delete the program object
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.delete_program(self.id);
    }
}

/// Typed writer for one plain uniform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSetter {
    name: String,
    location: i32,
    ty: GlslType,
    array_size: usize,
}

impl UniformSetter {
    /// Setter for a reflected uniform
    pub fn new(name: impl Into<String>, location: i32, ty: GlslType, array_size: usize) -> Self {
        Self {
            name: name.into(),
            location,
            ty,
            array_size: array_size.max(1),
        }
    }

    /// Uniform name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uniform location
    pub fn location(&self) -> i32 {
        self.location
    }

    /// Reflected type
    pub fn ty(&self) -> GlslType {
        self.ty
    }

    /// Write a value to the uniform of the current program
    ///
    /// The value must use the type's scalar family and hold between one
    /// and `array_size` whole elements.
    pub fn set(&self, device: &mut dyn GraphicsDevice, value: &UniformValue) -> RenderResult<()> {
        let components = self.ty.components();
        let elements = value.len() / components;
        let fits = value.matches(self.ty.scalar())
            && value.len() % components == 0
            && (1..=self.array_size).contains(&elements);
        if !fits {
            return Err(RenderError::UniformTypeMismatch {
                name: self.name.clone(),
                expected: self.ty.name(),
                actual: value.describe(),
            });
        }
        device.set_uniform(self.location, self.ty, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    const VERTEX: &str = "layout (location = 0) in vec3 position; void main() {}";
    const FRAGMENT: &str = "uniform vec3 tint; uniform float weights[4]; void main() {}";

    #[test]
    fn test_link_failure_carries_log() {
        let mut device = HeadlessDevice::new();
        let sources = ShaderSources::new(VERTEX, "out vec4 color;");
        match ShaderProgram::new(&mut device, "broken", &sources) {
            Err(RenderError::LinkFailed { log }) => assert!(log.contains("main")),
            other => panic!("expected link failure, got {other:?}"),
        }
    }

    #[test]
    fn test_setter_checks_shape() {
        let mut device = HeadlessDevice::new();
        let program = ShaderProgram::new(&mut device, "tinted", &ShaderSources::new(VERTEX, FRAGMENT)).unwrap();
        program.use_program(&mut device).unwrap();

        let location = program.uniform_location(&device, "weights[0]").unwrap();
        let weights = UniformSetter::new("weights[0]", location, GlslType::Float, 4);
        weights.set(&mut device, &UniformValue::Float(vec![0.1, 0.2])).unwrap();
        assert!(weights.set(&mut device, &UniformValue::Float(vec![0.0; 5])).is_err());

        let location = program.uniform_location(&device, "tint").unwrap();
        let tint = UniformSetter::new("tint", location, GlslType::Vec3, 1);
        assert!(tint.set(&mut device, &UniformValue::Float(vec![1.0, 1.0])).is_err());
        tint.set(&mut device, &UniformValue::from([1.0, 0.0, 0.0])).unwrap();
    }
}
