//! Scene renderer
//!
//! A uniformed renderer attached to one scene: its blocks are routed to the
//! scene's dependencies at construction and its plain uniforms are refreshed
//! from the scene's static data on every tick.

use crate::render::context::RenderContext;
use crate::render::device::GraphicsDevice;
use crate::render::framebuffer::{FrameBuffer, RenderTarget};
use crate::render::mesh::DrawItem;
use crate::render::shader::{AttributeInfo, ShaderProgram};
use crate::render::stage::{DrawContext, RenderStage};
use crate::render::texture::TextureLoadParams;
use crate::render::uniformed::{SamplerData, UniformedRenderer};
use crate::render::RenderResult;
use crate::scene::RenderScene;

/// Stage bound to a scene
#[derive(Debug)]
pub struct SceneRenderer {
    uniformed: UniformedRenderer,
}

impl SceneRenderer {
    /// Bind `uniformed` to the dependencies of `scene`
    pub fn new(scene: &mut RenderScene, mut uniformed: UniformedRenderer, ctx: &mut RenderContext) -> RenderResult<Self> {
        uniformed.process_deps(scene, ctx)?;
        Ok(Self { uniformed })
    }

    /// Introspect `stage` and bind it to `scene` in one step
    pub fn from_stage(scene: &mut RenderScene, stage: Box<dyn RenderStage>, ctx: &mut RenderContext) -> RenderResult<Self> {
        let uniformed = UniformedRenderer::new(stage, ctx)?;
        Self::new(scene, uniformed, ctx)
    }

    /// Underlying uniformed renderer
    pub fn uniformed(&self) -> &UniformedRenderer {
        &self.uniformed
    }
}

impl RenderStage for SceneRenderer {
    fn program(&self) -> &ShaderProgram {
        self.uniformed.program()
    }

    fn draw(&self, frame: &mut DrawContext<'_>, target: &dyn RenderTarget, data: &[DrawItem]) -> RenderResult<usize> {
        self.uniformed.draw(frame, target, data)
    }

    fn meshes(&self) -> &[DrawItem] {
        self.uniformed.meshes()
    }

    fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.uniformed.framebuffer()
    }

    fn framebuffer_mut(&mut self) -> Option<&mut FrameBuffer> {
        self.uniformed.framebuffer_mut()
    }

    fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        self.uniformed.resize(device, width, height)
    }

    fn load_params(&self, sampler: &str) -> TextureLoadParams {
        self.uniformed.load_params(sampler)
    }

    fn attribute_data(&self) -> &[AttributeInfo] {
        self.uniformed.attribute_data()
    }

    fn sampler_data(&self) -> Option<&SamplerData> {
        self.uniformed.sampler_data()
    }

    fn on_tick(&self, device: &mut dyn GraphicsDevice, scene: &RenderScene) -> RenderResult<()> {
        self.uniformed.apply_static_uniforms(device, scene)?;
        self.uniformed.on_tick(device, scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RendererConfig;
    use crate::render::device::{HeadlessDevice, ShaderSources};
    use crate::render::stage::BasicStage;
    use crate::render::types::UniformValue;
    use crate::render::RenderError;

    const VERTEX: &str = "layout (location = 0) in vec3 position; void main() {}";
    const FRAGMENT: &str = "uniform float exposure; uniform vec3 fog_color; out vec4 color; void main() {}";

    fn renderer(ctx: &mut RenderContext, scene: &mut RenderScene) -> SceneRenderer {
        let program = ShaderProgram::new(ctx.device_mut(), "fog", &ShaderSources::new(VERTEX, FRAGMENT)).unwrap();
        SceneRenderer::from_stage(scene, Box::new(BasicStage::new(program)), ctx).unwrap()
    }

    #[test]
    fn test_tick_applies_static_values() {
        let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default());
        let mut scene = RenderScene::new();
        let renderer = renderer(&mut ctx, &mut scene);
        scene.set_static_uniform("exposure", 1.5_f32);

        renderer.on_tick(ctx.device_mut(), &scene).unwrap();

        let program = renderer.program();
        let exposure = program.uniform_location(ctx.device(), "exposure").unwrap();
        let fog = program.uniform_location(ctx.device(), "fog_color").unwrap();
        let device = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(device.uniform_value(program.id(), exposure), Some(&UniformValue::Float(vec![1.5])));
        assert_eq!(device.uniform_value(program.id(), fog), None);
    }

    #[test]
    fn test_wrong_static_type_is_rejected() {
        let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default());
        let mut scene = RenderScene::new();
        let renderer = renderer(&mut ctx, &mut scene);
        scene.set_static_uniform("fog_color", 2_i32);
        assert!(matches!(
            renderer.on_tick(ctx.device_mut(), &scene),
            Err(RenderError::UniformTypeMismatch { .. })
        ));
    }
}
