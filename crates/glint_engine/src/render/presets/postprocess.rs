//! Screen-space post-processing

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::render::context::RenderContext;
use crate::render::device::{GraphicsDevice, ShaderSources};
use crate::render::framebuffer::{AttachmentDescriptor, FrameBuffer};
use crate::render::mesh::{DrawItem, Material, RenderCompound};
use crate::render::shader::ShaderProgram;
use crate::render::stage::RenderStage;
use crate::render::texture::TextureFormat;
use crate::render::uniformed::SamplerData;
use crate::render::RenderResult;

const VERTEX: &str = r"
#version 430 core
layout (location = 0) in vec2 position;
layout (location = 1) in vec2 uv;

out vec2 frag_uv;

void main() {
    frag_uv = uv;
    gl_Position = vec4(position, 0.0, 1.0);
}
";

const TONE_MAP_FRAGMENT: &str = r"
#version 430 core
uniform sampler2D screen_map;
uniform float exposure;
uniform float gamma;

in vec2 frag_uv;
out vec4 color;

void main() {
    vec3 hdr = texture(screen_map, frag_uv).rgb;
    vec3 mapped = vec3(1.0) - exp(-hdr * exposure);
    color = vec4(pow(mapped, vec3(1.0 / gamma)), 1.0);
}
";

/// Precision of the buffer a post-process stage samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorPrecision {
    /// 8-bit RGB
    #[default]
    Int,
    /// Float RGB, for HDR input
    Float,
}

impl ColorPrecision {
    /// Attachment format
    pub const fn format(self) -> TextureFormat {
        match self {
            Self::Int => TextureFormat::Rgb8,
            Self::Float => TextureFormat::Rgb32F,
        }
    }
}

/// Full-screen pass over the previous stage's output
///
/// Owns a one-color framebuffer the previous stage draws into and samples
/// it on unit 0 while drawing a screen quad.
#[derive(Debug)]
pub struct PostProcessStage {
    program: ShaderProgram,
    framebuffer: FrameBuffer,
    meshes: Vec<DrawItem>,
}

impl PostProcessStage {
    /// Exposure tone mapping with gamma correction
    ///
    /// Reads the static uniforms `exposure` and `gamma`.
    pub fn tone_map(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<Self> {
        let program = ShaderProgram::new(device, "tone map", &ShaderSources::new(VERTEX, TONE_MAP_FRAGMENT))?;
        Self::new(device, program, width, height, ColorPrecision::Float)
    }

    /// Stage drawing `program` over a buffer of `precision`
    pub fn new(
        device: &mut dyn GraphicsDevice,
        program: ShaderProgram,
        width: u32,
        height: u32,
        precision: ColorPrecision,
    ) -> RenderResult<Self> {
        let framebuffer = FrameBuffer::new(device, width, height, &[AttachmentDescriptor::color(precision.format())])?;
        Ok(Self {
            program,
            framebuffer,
            meshes: Vec::new(),
        })
    }

    /// Vertex shader for custom post-process programs: `position` and `uv` in, `frag_uv` out
    pub fn vertex_source() -> &'static str {
        VERTEX
    }
}

impl RenderStage for PostProcessStage {
    fn program(&self) -> &ShaderProgram {
        &self.program
    }

    fn meshes(&self) -> &[DrawItem] {
        &self.meshes
    }

    fn framebuffer(&self) -> Option<&FrameBuffer> {
        Some(&self.framebuffer)
    }

    fn framebuffer_mut(&mut self) -> Option<&mut FrameBuffer> {
        Some(&mut self.framebuffer)
    }

    fn on_created_uniformed(&mut self, ctx: &mut RenderContext, _samplers: &SamplerData) -> RenderResult<()> {
        let quad = ctx.screen_quad()?;
        let material = Material::new(self.framebuffer.color_textures().into_iter().zip(0..));
        self.meshes = vec![Rc::new(RenderCompound::new(quad, material))];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RendererConfig;
    use crate::render::device::HeadlessDevice;
    use crate::render::uniformed::UniformedRenderer;

    #[test]
    fn test_precision_formats() {
        assert_eq!(ColorPrecision::Int.format(), TextureFormat::Rgb8);
        assert_eq!(ColorPrecision::Float.format(), TextureFormat::Rgb32F);
    }

    #[test]
    fn test_screen_compound_samples_own_buffer() {
        let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default());
        let stage = PostProcessStage::tone_map(ctx.device_mut(), 64, 48).unwrap();
        let color = stage.framebuffer.color_textures()[0];
        let device = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(device.texture_format(color), Some(TextureFormat::Rgb32F));

        let uniformed = UniformedRenderer::new(Box::new(stage), &mut ctx).unwrap();
        assert_eq!(uniformed.sampler_data().unwrap()["screen"].bind_index, 0);
        assert_eq!(uniformed.meshes().len(), 1);
        let setters: Vec<_> = uniformed.setters().keys().map(String::as_str).collect();
        assert_eq!(setters, ["exposure", "gamma"]);
    }
}
