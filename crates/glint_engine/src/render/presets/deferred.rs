//! Deferred shading
//!
//! The geometry pass writes surface data into a G-buffer owned by the light
//! pass; the light pass shades a full-screen quad from it.
//!
//! | unit | texture    | format                         |
//! |------|------------|--------------------------------|
//! | 0    | `pos_shin` | `Rgba16F` / `Rgba32F`          |
//! | 1    | `normal`   | `Rgb8Snorm`                    |
//! | 2    | `albedo`   | `Rgba8` (diffuse + specular)   |
//!
//! Units come from the light shader's sampler order, not from this table.

use std::rc::Rc;

use crate::core::GBufferPrecision;
use crate::render::context::RenderContext;
use crate::render::device::{Capability, GraphicsDevice, ShaderSources};
use crate::render::framebuffer::{AttachmentDescriptor, FrameBuffer, RenderTarget};
use crate::render::mesh::{DrawItem, Material, RenderCompound};
use crate::render::shader::ShaderProgram;
use crate::render::stage::{draw_items, DrawContext, RenderStage};
use crate::render::texture::{TextureFormat, TextureLoadParams};
use crate::render::uniformed::SamplerData;
use crate::render::{RenderError, RenderResult};

const GEOMETRY_VERTEX: &str = r"
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
    vec4 world = model * vec4(position, 1.0);
    frag_pos = world.xyz;
    frag_normal = mat3(transpose(inverse(model))) * normal;
    frag_uv = uv;
    gl_Position = view_projection * world;
}
";

const GEOMETRY_FRAGMENT: &str = r"
#version 430 core
in vec3 frag_pos;
in vec3 frag_normal;
in vec2 frag_uv;

uniform sampler2D diffuse_map;
uniform sampler2D specular_map;
uniform float shininess;

layout (location = 0) out vec4 pos_shin;
layout (location = 1) out vec3 normal_out;
layout (location = 2) out vec4 albedo;

void main() {
    pos_shin = vec4(frag_pos, shininess);
    normal_out = normalize(frag_normal);
    albedo = vec4(texture(diffuse_map, frag_uv).rgb, texture(specular_map, frag_uv).r);
}
";

const LIGHT_VERTEX: &str = r"
#version 430 core
layout (location = 0) in vec2 position;
layout (location = 1) in vec2 uv;

out vec2 frag_uv;

void main() {
    frag_uv = uv;
    gl_Position = vec4(position, 0.0, 1.0);
}
";

const LIGHT_FRAGMENT: &str = r"
#version 430 core
struct SpotLight {
    vec3 diffuse_color;  float linear;
    vec3 specular_color; float quadratic;
    vec3 pos;            float cut_off;
    vec3 direction;      float outer_cut_off;
};

struct AreaLight {
    vec3 color; float intensity;
    vec3 points[4];
};

layout (std430) buffer SpotLightStorage {
    int count;
    SpotLight lights[];
} spot_lights;

layout (std430) buffer AreaLightStorage {
    int count;
    AreaLight lights[];
} area_lights;

uniform sampler2D pos_shin_map;
uniform sampler2D normal_map;
uniform sampler2D albedo_map;
uniform vec3 view_pos;

in vec2 frag_uv;
out vec4 color;

vec3 shade_spot(SpotLight light, vec3 pos, vec3 normal, vec4 albedo, float shininess) {
    vec3 to_light = normalize(light.pos - pos);
    float theta = dot(to_light, normalize(-light.direction));
    float epsilon = light.cut_off - light.outer_cut_off;
    float intensity = clamp((theta - light.outer_cut_off) / epsilon, 0.0, 1.0);
    float diffuse = max(dot(normal, to_light), 0.0);
    vec3 halfway = normalize(to_light + normalize(view_pos - pos));
    float specular = pow(max(dot(normal, halfway), 0.0), shininess);
    return intensity * (diffuse * light.diffuse_color * albedo.rgb + specular * light.specular_color * albedo.a);
}

void main() {
    vec4 pos_shin = texture(pos_shin_map, frag_uv);
    vec3 normal = texture(normal_map, frag_uv).xyz;
    vec4 albedo = texture(albedo_map, frag_uv);
    vec3 result = vec3(0.0);
    for (int i = 0; i < spot_lights.count; i++) {
        result += shade_spot(spot_lights.lights[i], pos_shin.xyz, normal, albedo, pos_shin.w);
    }
    for (int i = 0; i < area_lights.count; i++) {
        result += area_lights.lights[i].color * area_lights.lights[i].intensity * albedo.rgb * 0.1;
    }
    color = vec4(result, 1.0);
}
";

/// G-buffer textures in attachment order
pub const GBUFFER_TEXTURES: [&str; 3] = ["pos_shin", "normal", "albedo"];

/// G-buffer attachment layout
pub fn gbuffer_layout(precision: GBufferPrecision) -> [AttachmentDescriptor; 3] {
    let position = match precision {
        GBufferPrecision::Half => TextureFormat::Rgba16F,
        GBufferPrecision::Full => TextureFormat::Rgba32F,
    };
    [
        AttachmentDescriptor::color(position),
        AttachmentDescriptor::color(TextureFormat::Rgb8Snorm),
        AttachmentDescriptor::color(TextureFormat::Rgba8),
    ]
}

/// Writes positions, normals and albedo of the scene into the G-buffer
#[derive(Debug)]
pub struct GeometryPass {
    program: ShaderProgram,
}

impl GeometryPass {
    /// Geometry pass with the built-in shader
    pub fn new(device: &mut dyn GraphicsDevice) -> RenderResult<Self> {
        let sources = ShaderSources::new(GEOMETRY_VERTEX, GEOMETRY_FRAGMENT);
        Ok(Self::with_program(ShaderProgram::new(device, "deferred geometry", &sources)?))
    }

    /// Geometry pass with a custom program writing the same outputs
    pub fn with_program(program: ShaderProgram) -> Self {
        Self { program }
    }
}

impl RenderStage for GeometryPass {
    fn program(&self) -> &ShaderProgram {
        &self.program
    }

    fn draw(&self, frame: &mut DrawContext<'_>, target: &dyn RenderTarget, data: &[DrawItem]) -> RenderResult<usize> {
        frame.device().set_capability(Capability::DepthTest, true);
        frame.device().set_capability(Capability::CullFace, true);
        let drawn = draw_items(&self.program, frame, target, data);
        frame.device().set_capability(Capability::CullFace, false);
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

/// Shades the G-buffer onto a full-screen quad
#[derive(Debug)]
pub struct LightPass {
    program: ShaderProgram,
    gbuffer: FrameBuffer,
    meshes: Vec<DrawItem>,
}

impl LightPass {
    /// Light pass with the built-in shader and a G-buffer of `width x height`
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32, precision: GBufferPrecision) -> RenderResult<Self> {
        let sources = ShaderSources::new(LIGHT_VERTEX, LIGHT_FRAGMENT);
        let program = ShaderProgram::new(device, "deferred light", &sources)?;
        Self::with_program(device, program, width, height, precision)
    }

    /// Light pass with a custom program sampling `pos_shin`, `normal` and `albedo`
    pub fn with_program(
        device: &mut dyn GraphicsDevice,
        program: ShaderProgram,
        width: u32,
        height: u32,
        precision: GBufferPrecision,
    ) -> RenderResult<Self> {
        let gbuffer = FrameBuffer::new(device, width, height, &gbuffer_layout(precision))?;
        Ok(Self {
            program,
            gbuffer,
            meshes: Vec::new(),
        })
    }
}

impl RenderStage for LightPass {
    fn program(&self) -> &ShaderProgram {
        &self.program
    }

    fn draw(&self, frame: &mut DrawContext<'_>, target: &dyn RenderTarget, data: &[DrawItem]) -> RenderResult<usize> {
        let drawn = draw_items(&self.program, frame, target, data)?;
        self.gbuffer.bind(frame.device())?;
        self.gbuffer.clear(frame.device());
        Ok(drawn)
    }

    fn meshes(&self) -> &[DrawItem] {
        &self.meshes
    }

    fn framebuffer(&self) -> Option<&FrameBuffer> {
        Some(&self.gbuffer)
    }

    fn framebuffer_mut(&mut self) -> Option<&mut FrameBuffer> {
        Some(&mut self.gbuffer)
    }

    /// Bind each G-buffer texture to the unit of its sampler
    fn on_created_uniformed(&mut self, ctx: &mut RenderContext, samplers: &SamplerData) -> RenderResult<()> {
        let mut bindings = Vec::with_capacity(GBUFFER_TEXTURES.len());
        for (texture, name) in self.gbuffer.color_textures().into_iter().zip(GBUFFER_TEXTURES) {
            let info = samplers.get(name).ok_or_else(|| RenderError::UnknownUniform {
                name: format!("{name}_map"),
            })?;
            bindings.push((texture, info.bind_index));
        }
        let quad = ctx.screen_quad()?;
        self.meshes = vec![Rc::new(RenderCompound::new(quad, Material::new(bindings)))];
        Ok(())
    }
}
