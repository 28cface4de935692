//! Ready-made stages and chains
//!
//! Every preset stage is wrapped in a [`SceneRenderer`] so its blocks follow
//! the scene and its plain uniforms pick up the scene's static values.

pub mod deferred;
pub mod forward;
pub mod postprocess;

pub use deferred::{GeometryPass, LightPass};
pub use forward::ForwardStage;
pub use postprocess::{ColorPrecision, PostProcessStage};

use crate::render::chain::RenderChain;
use crate::render::context::RenderContext;
use crate::render::scene_renderer::SceneRenderer;
use crate::render::stage::RenderStage;
use crate::render::RenderResult;
use crate::scene::RenderScene;

fn bind_all(
    scene: &mut RenderScene,
    ctx: &mut RenderContext,
    stages: Vec<Box<dyn RenderStage>>,
) -> RenderResult<Vec<Box<dyn RenderStage>>> {
    let mut bound: Vec<Box<dyn RenderStage>> = Vec::with_capacity(stages.len());
    for stage in stages {
        bound.push(Box::new(SceneRenderer::from_stage(scene, stage, ctx)?));
    }
    Ok(bound)
}

/// Forward stage followed by `post` stages
pub fn forward_chain(
    scene: &mut RenderScene,
    ctx: &mut RenderContext,
    post: Vec<Box<dyn RenderStage>>,
) -> RenderResult<RenderChain> {
    let forward = ForwardStage::new(ctx.device_mut())?;
    let first = SceneRenderer::from_stage(scene, Box::new(forward), ctx)?;
    let second = bind_all(scene, ctx, post)?;
    RenderChain::new(ctx.device_mut(), Box::new(first), second)
}

/// Geometry pass into the light pass G-buffer, then the light pass and `post`
///
/// The G-buffer is sized and typed from the context's renderer config.
pub fn deferred_chain(
    scene: &mut RenderScene,
    ctx: &mut RenderContext,
    post: Vec<Box<dyn RenderStage>>,
) -> RenderResult<RenderChain> {
    let (width, height, precision) = {
        let config = ctx.config();
        (config.width, config.height, config.gbuffer_precision)
    };
    let geometry = GeometryPass::new(ctx.device_mut())?;
    let first = SceneRenderer::from_stage(scene, Box::new(geometry), ctx)?;
    let light: Box<dyn RenderStage> = Box::new(LightPass::new(ctx.device_mut(), width, height, precision)?);
    let mut stages = vec![light];
    stages.extend(post);
    let second = bind_all(scene, ctx, stages)?;
    log::info!("Deferred chain {width}x{height} ({precision:?} G-buffer)");
    RenderChain::new(ctx.device_mut(), Box::new(first), second)
}
