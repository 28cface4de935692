//! Uniformed renderer
//!
//! Wraps a [`RenderStage`] and binds its program's interface to the engine
//! from introspection alone:
//!
//! - sampler uniforms get texture units in declaration order
//! - other plain uniforms get typed setters fed from scene static data
//! - uniform and storage blocks are routed to renderer dependencies
//!
//! Block names are checked against the dependency registry when the
//! renderer is built, so a shader asking for an unknown block fails at
//! startup rather than on the first frame.

use std::collections::BTreeMap;

use crate::render::context::RenderContext;
use crate::render::dependency::dependency_key;
use crate::render::device::{BlockKind, GraphicsDevice};
use crate::render::framebuffer::{FrameBuffer, RenderTarget};
use crate::render::mesh::DrawItem;
use crate::render::shader::{AttributeInfo, ShaderProgram, UniformSetter};
use crate::render::stage::{DrawContext, RenderStage};
use crate::render::texture::TextureLoadParams;
use crate::render::types::UniformValue;
use crate::render::{RenderError, RenderResult};
use crate::scene::RenderScene;

/// Texture unit assigned to a sampler uniform
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    /// Normalized texture name (`material.diffuse_map` becomes `diffuse`)
    pub name: String,
    /// Sampler uniform as reflected
    pub uniform: String,
    /// Texture unit
    pub bind_index: u32,
    /// How textures for this sampler should be loaded
    pub load_params: TextureLoadParams,
}

/// Sampler units keyed by normalized texture name
pub type SamplerData = BTreeMap<String, TextureInfo>;

/// One uniform-block member, in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockField {
    /// Member name as reflected
    pub name: String,
    /// Byte offset inside the block
    pub offset: usize,
    /// Byte size, array length included
    pub size: usize,
}

/// A block waiting to be routed to its dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Block name, also the dependency name
    pub name: String,
    /// Block index in the program
    pub index: u32,
    /// Members; empty for storage blocks
    pub fields: Vec<BlockField>,
    /// Uniform or storage block
    pub kind: BlockKind,
}

/// Texture name of a sampler uniform: last path segment without a
/// `_map`/`Map` suffix
pub fn texture_name(uniform: &str) -> String {
    let leaf = uniform.strip_suffix("[0]").unwrap_or(uniform);
    let leaf = leaf.rsplit('.').next().unwrap_or(leaf);
    leaf.strip_suffix("_map")
        .or_else(|| leaf.strip_suffix("Map"))
        .unwrap_or(leaf)
        .to_string()
}

/// A stage whose program interface is bound to the engine
#[derive(Debug)]
pub struct UniformedRenderer {
    stage: Box<dyn RenderStage>,
    attributes: Vec<AttributeInfo>,
    samplers: SamplerData,
    setters: BTreeMap<String, UniformSetter>,
    blocks: Vec<BlockDescriptor>,
    dependencies: Vec<String>,
}

impl UniformedRenderer {
    /// Introspect the stage's program and prepare its bindings
    ///
    /// Fails with [`RenderError::UnknownDependency`] when a block has no
    /// registered dependency.
    pub fn new(mut stage: Box<dyn RenderStage>, ctx: &mut RenderContext) -> RenderResult<Self> {
        let program = stage.program();
        let info = program.introspect(ctx.device())?;
        program.use_program(ctx.device_mut())?;

        let mut samplers = SamplerData::new();
        let mut setters = BTreeMap::new();
        let mut next_unit = 0;
        for uniform in info.plain_uniforms() {
            let location = program
                .uniform_location(ctx.device(), &uniform.name)
                .ok_or_else(|| RenderError::UnknownUniform {
                    name: uniform.name.clone(),
                })?;
            if uniform.ty.is_sampler() {
                let bind_index = next_unit;
                next_unit += 1;
                ctx.device_mut()
                    .set_uniform(location, uniform.ty, &UniformValue::Int(vec![bind_index as i32]))?;
                let name = texture_name(&uniform.name);
                log::debug!("'{}' sampler {} on unit {bind_index}", program.label(), uniform.name);
                samplers.insert(name.clone(), TextureInfo {
                    load_params: stage.load_params(&name),
                    name,
                    uniform: uniform.name.clone(),
                    bind_index,
                });
            } else {
                let key = uniform.name.strip_suffix("[0]").unwrap_or(&uniform.name);
                let setter = UniformSetter::new(&uniform.name, location, uniform.ty, uniform.size.max(1) as usize);
                setters.insert(key.to_string(), setter);
            }
        }

        let mut blocks: Vec<BlockDescriptor> = info
            .uniform_blocks
            .iter()
            .map(|block| BlockDescriptor {
                name: block.name.clone(),
                index: block.index,
                fields: info
                    .block_members(block.index)
                    .map(|member| BlockField {
                        name: member.name.clone(),
                        offset: member.offset.max(0) as usize,
                        size: member.byte_size(),
                    })
                    .collect(),
                kind: BlockKind::Uniform,
            })
            .collect();
        blocks.extend(info.storage_blocks.iter().map(|block| BlockDescriptor {
            name: block.name.clone(),
            index: block.index,
            fields: Vec::new(),
            kind: BlockKind::Storage,
        }));

        if let Some(unknown) = blocks.iter().find(|block| !ctx.registry().contains(&block.name)) {
            log::error!("'{}' declares block '{}' with no dependency", program.label(), unknown.name);
            return Err(RenderError::UnknownDependency {
                name: unknown.name.clone(),
            });
        }

        let attributes = info.attributes;
        stage.on_created_uniformed(ctx, &samplers)?;
        Ok(Self {
            stage,
            attributes,
            samplers,
            setters,
            blocks,
            dependencies: Vec::new(),
        })
    }

    /// Route every block to its scene dependency
    ///
    /// Dependencies are created on first use and cached in the scene, so
    /// stages of the same scene share a binding point per block name and
    /// kind. Block member offsets and sizes are converted from bytes to
    /// buffer elements before the dependency sees them.
    pub fn process_deps(&mut self, scene: &mut RenderScene, ctx: &mut RenderContext) -> RenderResult<()> {
        let program = self.stage.program().id();
        ctx.device_mut().use_program(program)?;
        self.dependencies.clear();
        for block in &self.blocks {
            let dependency = scene.get_or_create_dependency(ctx, &block.name, block.kind)?;
            let element = dependency.element_size();
            for field in &block.fields {
                dependency.add_setter(&field.name, field.offset / element, field.size / element)?;
            }
            dependency.upload(ctx.device_mut())?;
            let point = dependency.binding_point();
            match block.kind {
                BlockKind::Uniform => ctx.device_mut().uniform_block_binding(program, block.index, point)?,
                BlockKind::Storage => ctx
                    .device_mut()
                    .shader_storage_block_binding(program, block.index, point)?,
            }
            log::info!(
                "'{}' block {} bound to point {point}",
                self.stage.program().label(),
                block.name
            );
            self.dependencies.push(dependency_key(&block.name, block.kind));
        }
        Ok(())
    }

    /// Write static scene values to the plain uniforms that have one
    pub fn apply_static_uniforms(&self, device: &mut dyn GraphicsDevice, scene: &RenderScene) -> RenderResult<()> {
        self.stage.program().use_program(device)?;
        for (name, setter) in &self.setters {
            match scene.static_uniform(name) {
                Some(value) => setter.set(device, value)?,
                None => log::trace!("No static value for uniform '{name}'"),
            }
        }
        Ok(())
    }

    /// Wrapped stage
    pub fn stage(&self) -> &dyn RenderStage {
        self.stage.as_ref()
    }

    /// Plain uniform setters keyed by name
    pub fn setters(&self) -> &BTreeMap<String, UniformSetter> {
        &self.setters
    }

    /// Blocks found by introspection
    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.blocks
    }

    /// Scene keys of the dependencies resolved by the last `process_deps`
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

impl RenderStage for UniformedRenderer {
    fn program(&self) -> &ShaderProgram {
        self.stage.program()
    }

    fn draw(&self, frame: &mut DrawContext<'_>, target: &dyn RenderTarget, data: &[DrawItem]) -> RenderResult<usize> {
        self.stage.draw(frame, target, data)
    }

    fn meshes(&self) -> &[DrawItem] {
        self.stage.meshes()
    }

    fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.stage.framebuffer()
    }

    fn framebuffer_mut(&mut self) -> Option<&mut FrameBuffer> {
        self.stage.framebuffer_mut()
    }

    fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        self.stage.resize(device, width, height)
    }

    fn load_params(&self, sampler: &str) -> TextureLoadParams {
        self.stage.load_params(sampler)
    }

    fn attribute_data(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    fn sampler_data(&self) -> Option<&SamplerData> {
        Some(&self.samplers)
    }

    fn on_tick(&self, device: &mut dyn GraphicsDevice, scene: &RenderScene) -> RenderResult<()> {
        self.stage.on_tick(device, scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RendererConfig;
    use crate::render::device::{BufferTarget, HeadlessDevice, ShaderSources};
    use crate::render::stage::BasicStage;

    const VERTEX: &str = r"
        #version 430 core
        layout (location = 0) in vec3 position;
        layout (location = 1) in vec2 uv;
        layout (std140) uniform MVPMatrices {
            mat4 view;
            mat4 model_view_projection;
        };
        void main() {}
    ";

    const FRAGMENT: &str = r"
        #version 430 core
        struct Material { sampler2D diffuse_map; sampler2D normalMap; };
        uniform Material material;
        uniform float exposure;
        uniform vec3 tints[2];
        out vec4 color;
        void main() {}
    ";

    fn context() -> RenderContext {
        RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default())
    }

    fn stage(ctx: &mut RenderContext, fragment: &str) -> Box<dyn RenderStage> {
        let sources = ShaderSources::new(VERTEX, fragment);
        let program = ShaderProgram::new(ctx.device_mut(), "test", &sources).unwrap();
        Box::new(BasicStage::new(program))
    }

    #[test]
    fn test_texture_names_are_normalized() {
        assert_eq!(texture_name("material.diffuse_map"), "diffuse");
        assert_eq!(texture_name("normalMap"), "normal");
        assert_eq!(texture_name("shadow"), "shadow");
    }

    #[test]
    fn test_samplers_get_sequential_units() {
        let mut ctx = context();
        let stage = stage(&mut ctx, FRAGMENT);
        let renderer = UniformedRenderer::new(stage, &mut ctx).unwrap();

        let samplers = renderer.sampler_data().unwrap();
        let diffuse = &samplers["diffuse"];
        assert_eq!((diffuse.uniform.as_str(), diffuse.bind_index), ("material.diffuse_map", 0));
        assert_eq!(samplers["normal"].bind_index, 1);

        let program = renderer.program().id();
        let location = renderer.program().uniform_location(ctx.device(), "material.normalMap").unwrap();
        let device = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(device.uniform_value(program, location), Some(&UniformValue::Int(vec![1])));
    }

    #[test]
    fn test_plain_uniforms_get_setters() {
        let mut ctx = context();
        let stage = stage(&mut ctx, FRAGMENT);
        let renderer = UniformedRenderer::new(stage, &mut ctx).unwrap();
        let names: Vec<_> = renderer.setters().keys().map(String::as_str).collect();
        assert_eq!(names, ["exposure", "tints"]);
        assert_eq!(renderer.attribute_data().len(), 2);
        assert_eq!(renderer.blocks()[0].fields[1], BlockField {
            name: "model_view_projection".to_string(),
            offset: 64,
            size: 64,
        });
    }

    #[test]
    fn test_unknown_block_fails_fast() {
        let mut ctx = context();
        let fragment = "layout (std140) uniform Fog { vec4 color; }; out vec4 color; void main() {}";
        let stage = stage(&mut ctx, fragment);
        assert!(matches!(
            UniformedRenderer::new(stage, &mut ctx),
            Err(RenderError::UnknownDependency { name }) if name == "Fog"
        ));
    }

    #[test]
    fn test_process_deps_binds_blocks() {
        let mut ctx = context();
        let mut scene = RenderScene::new();
        let fragment = "buffer SpotLightStorage { int count; float data[]; }; out vec4 color; void main() {}";
        let stage = stage(&mut ctx, fragment);
        let mut renderer = UniformedRenderer::new(stage, &mut ctx).unwrap();
        renderer.process_deps(&mut scene, &mut ctx).unwrap();

        assert_eq!(renderer.dependencies(), ["MVPMatricesUBO", "SpotLightStorageSSBO"]);
        let mvp = scene.dependency("MVPMatricesUBO").unwrap();
        let lights = scene.dependency("SpotLightStorageSSBO").unwrap();
        let program = renderer.program().id();
        let device = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(device.uniform_block_binding_point(program, 0).unwrap(), mvp.binding_point());
        assert_eq!(device.storage_block_binding_point(program, 0).unwrap(), lights.binding_point());
        assert_eq!(
            device.indexed_binding(BufferTarget::Uniform, mvp.binding_point()),
            Some(mvp.buffer().gpu().id())
        );
    }
}
