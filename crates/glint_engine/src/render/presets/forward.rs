//! Forward shading with spot lights

use crate::render::device::{Capability, GraphicsDevice, ShaderSources};
use crate::render::framebuffer::RenderTarget;
use crate::render::mesh::DrawItem;
use crate::render::shader::ShaderProgram;
use crate::render::stage::{draw_items, DrawContext, RenderStage};
use crate::render::texture::TextureLoadParams;
use crate::render::RenderResult;

const VERTEX: &str = r"
#version 430 core
layout (location = 0) in vec3 position;
layout (location = 1) in vec3 normal;
layout (location = 2) in vec2 uv;

layout (std140) uniform MVPMatrices {
    mat4 model;
    mat4 view;
    mat4 projection;
    mat4 view_projection;
    mat4 model_view_projection;
};

out vec3 frag_pos;
out vec3 frag_normal;
out vec2 frag_uv;

void main() {
    frag_pos = vec3(model * vec4(position, 1.0));
    frag_normal = mat3(transpose(inverse(model))) * normal;
    frag_uv = uv;
    gl_Position = model_view_projection * vec4(position, 1.0);
}
";

const FRAGMENT: &str = r"
#version 430 core
struct SpotLight {
    vec3 diffuse_color;  float linear;
    vec3 specular_color; float quadratic;
    vec3 pos;            float cut_off;
    vec3 direction;      float outer_cut_off;
};

layout (std430) buffer SpotLightStorage {
    int count;
    SpotLight lights[];
} spot_lights;

uniform sampler2D diffuse_map;
uniform vec3 view_pos;
uniform vec3 ambient;

in vec3 frag_pos;
in vec3 frag_normal;
in vec2 frag_uv;
out vec4 color;

void main() {
    vec3 albedo = texture(diffuse_map, frag_uv).rgb;
    vec3 normal = normalize(frag_normal);
    vec3 result = ambient * albedo;
    for (int i = 0; i < spot_lights.count; i++) {
        SpotLight light = spot_lights.lights[i];
        vec3 to_light = normalize(light.pos - frag_pos);
        float theta = dot(to_light, normalize(-light.direction));
        float intensity = clamp((theta - light.outer_cut_off) / (light.cut_off - light.outer_cut_off), 0.0, 1.0);
        result += intensity * max(dot(normal, to_light), 0.0) * light.diffuse_color * albedo;
    }
    color = vec4(result, 1.0);
}
";

/// Lit geometry drawn straight into its target with depth testing
#[derive(Debug)]
pub struct ForwardStage {
    program: ShaderProgram,
}

impl ForwardStage {
    /// Forward stage with the built-in shader
    pub fn new(device: &mut dyn GraphicsDevice) -> RenderResult<Self> {
        let program = ShaderProgram::new(device, "forward", &ShaderSources::new(VERTEX, FRAGMENT))?;
        Ok(Self { program })
    }

    /// Forward stage drawing with `program`
    pub fn with_program(program: ShaderProgram) -> Self {
        Self { program }
    }
}

impl RenderStage for ForwardStage {
    fn program(&self) -> &ShaderProgram {
        &self.program
    }

    fn draw(&self, frame: &mut DrawContext<'_>, target: &dyn RenderTarget, data: &[DrawItem]) -> RenderResult<usize> {
        frame.device().set_capability(Capability::DepthTest, true);
        let drawn = draw_items(&self.program, frame, target, data);
        frame.device().set_capability(Capability::DepthTest, false);
        drawn
    }

    fn load_params(&self, sampler: &str) -> TextureLoadParams {
        TextureLoadParams {
            gamma_correction: sampler == "diffuse",
            ..TextureLoadParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RendererConfig;
    use crate::render::context::RenderContext;
    use crate::render::device::HeadlessDevice;
    use crate::render::uniformed::UniformedRenderer;

    #[test]
    fn test_forward_reflection() {
        let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default());
        let stage = ForwardStage::new(ctx.device_mut()).unwrap();
        let uniformed = UniformedRenderer::new(Box::new(stage), &mut ctx).unwrap();

        let blocks: Vec<_> = uniformed.blocks().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(blocks, ["MVPMatrices", "SpotLightStorage"]);
        let diffuse = &uniformed.sampler_data().unwrap()["diffuse"];
        assert!(diffuse.load_params.gamma_correction);
        let locations: Vec<_> = uniformed.attribute_data().iter().map(|a| a.location).collect();
        assert_eq!(locations, [0, 1, 2]);
    }
}
