//! End-to-end pipeline tests on the headless device

use std::rc::Rc;

use crate::core::{GBufferPrecision, RendererConfig};
use crate::foundation::math::{to_column_major, Mat4, Vec3};
use crate::render::batch::{BatchPass, BatchTarget, RenderBatch};
use crate::render::chain::RenderChain;
use crate::render::context::RenderContext;
use crate::render::device::{
    AttachedObject, AttachmentPoint, DeviceCommand, FramebufferId, HeadlessDevice, ProgramId, ShaderSources,
    VertexLayout,
};
use crate::render::framebuffer::{AttachmentDescriptor, DefaultFramebuffer, FrameBuffer, RenderTarget};
use crate::render::mesh::{DrawItem, Material, Mesh, RenderCompound, SceneNode};
use crate::render::presets::{deferred_chain, forward_chain, PostProcessStage};
use crate::render::scene_renderer::SceneRenderer;
use crate::render::shader::ShaderProgram;
use crate::render::stage::{BasicStage, DrawContext, RenderStage};
use crate::render::texture::TextureFormat;
use crate::render::types::UniformValue;
use crate::render::RenderError;
use crate::scene::{CameraState, RenderScene, SpotLight};

const SCREEN_VERTEX: &str = "layout (location = 0) in vec2 position; layout (location = 1) in vec2 uv; void main() {}";
const SCREEN_FRAGMENT: &str = "out vec4 color; void main() {}";

fn context() -> RenderContext {
    RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default())
}

fn headless(ctx: &mut RenderContext) -> &mut HeadlessDevice {
    ctx.device_as_mut::<HeadlessDevice>().unwrap()
}

fn program(ctx: &mut RenderContext, label: &str, vertex: &str) -> ShaderProgram {
    ShaderProgram::new(ctx.device_mut(), label, &ShaderSources::new(vertex, SCREEN_FRAGMENT)).unwrap()
}

fn triangle(ctx: &mut RenderContext) -> DrawItem {
    Rc::new(Mesh::new(ctx.device_mut(), vec![0.0; 12], vec![0, 1, 2], VertexLayout::new(&[2, 2])).unwrap())
}

/// Stage with its own color buffer drawing the shared screen quad
fn screen_stage(ctx: &mut RenderContext, label: &str) -> BasicStage {
    let program = program(ctx, label, SCREEN_VERTEX);
    let fbo = FrameBuffer::new(ctx.device_mut(), 32, 32, &[AttachmentDescriptor::color(TextureFormat::Rgb8)]).unwrap();
    let quad: DrawItem = ctx.screen_quad().unwrap();
    BasicStage::new(program).with_framebuffer(fbo).with_meshes(vec![quad])
}

fn draws(device: &HeadlessDevice) -> Vec<(Option<FramebufferId>, ProgramId, u32)> {
    device
        .commands()
        .iter()
        .filter_map(|command| match command {
            DeviceCommand::Draw {
                framebuffer,
                program,
                index_count,
            } => Some((*framebuffer, *program, *index_count)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_stages_share_block_binding_point() {
    let mut ctx = context();
    let mut scene = RenderScene::new();
    let lit = program(
        &mut ctx,
        "lit",
        "layout (std140) uniform MVPMatrices { mat4 model; mat4 model_view_projection; }; in vec3 position; void main() {}",
    );
    let outline = program(
        &mut ctx,
        "outline",
        "layout (std140) uniform MVPMatrices { mat4 model; }; in vec3 position; void main() {}",
    );
    let lit = SceneRenderer::from_stage(&mut scene, Box::new(BasicStage::new(lit)), &mut ctx).unwrap();
    let outline = SceneRenderer::from_stage(&mut scene, Box::new(BasicStage::new(outline)), &mut ctx).unwrap();

    let device = ctx.device();
    let first = device.uniform_block_binding_point(lit.program().id(), 0).unwrap();
    let second = device.uniform_block_binding_point(outline.program().id(), 0).unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.bindings().leased_count(), 1);
    assert_eq!(scene.dependency_keys(), ["MVPMatricesUBO"]);
}

#[test]
fn test_single_stage_chain_draws_into_output() {
    let mut ctx = context();
    let first = BasicStage::new(program(&mut ctx, "only", SCREEN_VERTEX));
    let only = first.program().id();
    let mut chain = RenderChain::new(ctx.device_mut(), Box::new(first), Vec::new()).unwrap();
    let data = vec![triangle(&mut ctx)];
    let window = DefaultFramebuffer::new(320, 240);
    headless(&mut ctx).take_commands();

    let first = chain.first_pass(&mut DrawContext::new(ctx.device_mut()), data).unwrap();
    assert_eq!(first, 0);
    assert!(draws(headless(&mut ctx)).is_empty());

    let second = chain.second_pass(&mut DrawContext::new(ctx.device_mut()), &window).unwrap();
    assert_eq!(second, 1);
    assert_eq!(draws(headless(&mut ctx)), [(None, only, 3)]);
}

#[test]
fn test_chain_routes_through_framebuffers() {
    let mut ctx = context();
    let a = BasicStage::new(program(&mut ctx, "a", SCREEN_VERTEX));
    let b = screen_stage(&mut ctx, "b");
    let c = screen_stage(&mut ctx, "c");
    let (a_id, b_id, c_id) = (a.program().id(), b.program().id(), c.program().id());
    let b_fbo = b.framebuffer().unwrap().id();
    let c_fbo = c.framebuffer().unwrap().id();
    let mut chain = RenderChain::new(ctx.device_mut(), Box::new(a), vec![Box::new(b), Box::new(c)]).unwrap();
    let data = vec![triangle(&mut ctx)];
    headless(&mut ctx).take_commands();

    let drawn = chain
        .draw(&mut DrawContext::new(ctx.device_mut()), &DefaultFramebuffer::new(32, 32), data)
        .unwrap();
    assert_eq!(drawn, 3);
    assert_eq!(
        draws(headless(&mut ctx)),
        [(Some(b_fbo), a_id, 3), (Some(c_fbo), b_id, 6), (None, c_id, 6)]
    );
}

#[test]
fn test_batch_unlocks_for_one_frame() {
    let mut ctx = context();
    let scene_pass = BasicStage::new(program(&mut ctx, "scene", SCREEN_VERTEX));
    let overlay = screen_stage(&mut ctx, "overlay");
    let mut batch = RenderBatch::new(vec![
        BatchPass::new(Box::new(scene_pass), BatchTarget::Output, true).unlocking([1]),
        BatchPass::new(Box::new(overlay), BatchTarget::Output, false),
    ])
    .unwrap();
    let window = DefaultFramebuffer::new(32, 32);

    let drawn = batch.draw(&mut DrawContext::new(ctx.device_mut()), &window).unwrap();
    assert_eq!(drawn, 0);
    assert_eq!(batch.allowed(), [true, false]);

    let data = vec![triangle(&mut ctx)];
    batch.set_renderer_in(0, Some(data)).unwrap();
    let drawn = batch.draw(&mut DrawContext::new(ctx.device_mut()), &window).unwrap();
    assert_eq!(drawn, 2);
    assert_eq!(batch.allowed(), [true, true]);

    batch.set_renderer_in(0, None).unwrap();
    batch.draw(&mut DrawContext::new(ctx.device_mut()), &window).unwrap();
    assert_eq!(batch.allowed(), [true, false]);

    assert!(matches!(
        batch.set_renderer_in(2, None),
        Err(RenderError::InvalidHandle { kind: "batch pass", .. })
    ));
}

#[test]
fn test_batch_draws_into_pass_framebuffer() {
    let mut ctx = context();
    let first = BasicStage::new(program(&mut ctx, "first", SCREEN_VERTEX));
    let sink = screen_stage(&mut ctx, "sink");
    let sink_fbo = sink.framebuffer().unwrap().id();
    let mut batch = RenderBatch::new(vec![
        BatchPass::new(Box::new(first), BatchTarget::Pass(1), true),
        BatchPass::new(Box::new(sink), BatchTarget::Output, true),
    ])
    .unwrap();
    let data = vec![triangle(&mut ctx)];
    batch.set_renderer_in(0, Some(data)).unwrap();
    headless(&mut ctx).take_commands();

    batch
        .draw(&mut DrawContext::new(ctx.device_mut()), &DefaultFramebuffer::new(32, 32))
        .unwrap();
    let targets: Vec<_> = draws(headless(&mut ctx)).into_iter().map(|(fbo, _, _)| fbo).collect();
    assert_eq!(targets, [Some(sink_fbo), None]);
}

#[test]
fn test_batch_rejects_bad_targets() {
    let mut ctx = context();
    let lone = BasicStage::new(program(&mut ctx, "lone", SCREEN_VERTEX));
    let plain = BasicStage::new(program(&mut ctx, "plain", SCREEN_VERTEX));
    assert!(matches!(
        RenderBatch::new(vec![
            BatchPass::new(Box::new(lone), BatchTarget::Pass(1), true),
            BatchPass::new(Box::new(plain), BatchTarget::Output, true),
        ]),
        Err(RenderError::InvalidStageTarget { pass: 0, target: 1, .. })
    ));

    let looped = screen_stage(&mut ctx, "looped");
    assert!(matches!(
        RenderBatch::new(vec![BatchPass::new(Box::new(looped), BatchTarget::Pass(0), true)]),
        Err(RenderError::InvalidStageTarget { pass: 0, target: 0, .. })
    ));

    let early = BasicStage::new(program(&mut ctx, "early", SCREEN_VERTEX));
    let late = BasicStage::new(program(&mut ctx, "late", SCREEN_VERTEX));
    assert!(matches!(
        RenderBatch::new(vec![
            BatchPass::new(Box::new(early), BatchTarget::Output, true),
            BatchPass::new(Box::new(late), BatchTarget::Output, true).unlocking([0]),
        ]),
        Err(RenderError::InvalidStageTarget { pass: 1, target: 0, .. })
    ));
}

fn lit_scene(ctx: &mut RenderContext) -> RenderScene {
    let mut scene = RenderScene::new();
    scene.set_static_uniform("exposure", 1.0_f32);
    scene.set_static_uniform("gamma", 2.2_f32);
    scene.set_static_uniform("shininess", 32.0_f32);
    scene.set_static_uniform("view_pos", [0.0_f32, 1.0, 5.0]);
    scene
        .add_light(
            ctx.device_mut(),
            SpotLight::new(Vec3::new(0.0, 4.0, 0.0), -Vec3::y(), Vec3::repeat(1.0), 30.0, None),
        )
        .unwrap();
    scene
}

fn node(ctx: &mut RenderContext, model: Mat4) -> DrawItem {
    let vertices = vec![0.0; 3 * 8];
    let mesh = Rc::new(Mesh::new(ctx.device_mut(), vertices, vec![0, 1, 2], VertexLayout::new(&[3, 3, 2])).unwrap());
    Rc::new(SceneNode::new(model, vec![RenderCompound::new(mesh, Material::new(Vec::new()))]))
}

#[test]
fn test_deferred_frame_end_to_end() {
    let config = RendererConfig {
        width: 64,
        height: 48,
        gbuffer_precision: GBufferPrecision::Full,
        ..RendererConfig::default()
    };
    let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), config);
    let mut scene = lit_scene(&mut ctx);
    let post = PostProcessStage::tone_map(ctx.device_mut(), 64, 48).unwrap();
    let mut chain = deferred_chain(&mut scene, &mut ctx, vec![Box::new(post)]).unwrap();
    let camera = CameraState::new(Vec3::new(0.0, 1.0, 5.0), -Vec3::z(), 1.0, 100.0, (64, 48));
    scene.set_active_camera(ctx.device_mut(), camera).unwrap();
    assert_eq!(
        scene.dependency_keys(),
        ["MVPMatricesUBO", "SpotLightStorageSSBO", "AreaLightStorageSSBO"]
    );

    let gbuffer = chain.second()[0].framebuffer().unwrap();
    assert_eq!(gbuffer.color_count(), 3);
    assert!(gbuffer.has_depth());
    let gbuffer_id = gbuffer.id();
    assert_eq!(
        headless(&mut ctx).texture_format(gbuffer.color_textures()[0]),
        Some(TextureFormat::Rgba32F)
    );
    let post_fbo = chain.second()[1].framebuffer().unwrap().id();

    let model = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
    let data = vec![node(&mut ctx, model)];
    chain.tick(ctx.device_mut(), &scene).unwrap();
    headless(&mut ctx).take_commands();
    let drawn = {
        let mut frame = DrawContext::with_scene(ctx.device_mut(), &mut scene);
        chain.draw(&mut frame, &DefaultFramebuffer::new(64, 48), data).unwrap()
    };
    assert_eq!(drawn, 3);

    let targets: Vec<_> = draws(headless(&mut ctx)).into_iter().map(|(fbo, _, _)| fbo).collect();
    assert_eq!(targets, [Some(gbuffer_id), Some(post_fbo), None]);

    let mvp = scene.dependency("MVPMatricesUBO").unwrap().buffer().gpu().id();
    let on_device = headless(&mut ctx).buffer_f32(mvp).unwrap();
    assert_eq!(&on_device[..16], &to_column_major(&model));
}

#[test]
fn test_static_uniforms_reach_post_process() {
    let mut ctx = context();
    let mut scene = lit_scene(&mut ctx);
    let post = PostProcessStage::tone_map(ctx.device_mut(), 32, 32).unwrap();
    let chain = forward_chain(&mut scene, &mut ctx, vec![Box::new(post)]).unwrap();
    chain.tick(ctx.device_mut(), &scene).unwrap();

    let tone_map = chain.second()[0].program();
    let location = tone_map.uniform_location(ctx.device(), "gamma").unwrap();
    let value = headless(&mut ctx).uniform_value(tone_map.id(), location).cloned();
    assert_eq!(value, Some(UniformValue::from(2.2_f32)));
}

#[test]
fn test_resize_reaches_gbuffer_depth() {
    let mut ctx = context();
    let mut scene = RenderScene::new();
    let mut chain = deferred_chain(&mut scene, &mut ctx, Vec::new()).unwrap();
    chain.resize(ctx.device_mut(), 128, 96).unwrap();

    let gbuffer = chain.second()[0].framebuffer().unwrap();
    assert_eq!(gbuffer.size(), (128, 96));
    let device = headless(&mut ctx);
    for texture in gbuffer.color_textures() {
        assert_eq!(device.texture_size(texture), Some((128, 96)));
    }
    match device.attachment(gbuffer.id(), AttachmentPoint::Depth) {
        Some(AttachedObject::Renderbuffer(depth)) => assert_eq!(device.renderbuffer_size(depth), Some((128, 96))),
        other => panic!("expected a depth render buffer, found {other:?}"),
    }
}
