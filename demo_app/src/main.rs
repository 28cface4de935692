//! Deferred rendering demo
//!
//! Runs the deferred chain with a tone-mapping pass on the headless device:
//! a grid of tiles lit by an orbiting spot light and a fixed area light.
//! Per-frame statistics go to the log.
//!
//! Usage: `deferred_demo [config.toml|config.ron]`

use std::f32::consts::TAU;
use std::rc::Rc;
use std::time::Instant;

use glint_engine::foundation::logging;
use glint_engine::prelude::*;
use glint_engine::render::device::DeviceCommand;
use glint_engine::render::presets::PostProcessStage;
use glint_engine::scene::LightId;
use thiserror::Error;

const FRAMES: u32 = 120;
const RESIZE_AT: u32 = 60;
const GRID: i32 = 3;

#[derive(Error, Debug)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("rendering: {0}")]
    Render(#[from] RenderError),
}

struct DemoApp {
    ctx: RenderContext,
    scene: RenderScene,
    chain: RenderChain,
    window: DefaultFramebuffer,
    nodes: Vec<DrawItem>,
    spot: LightId,
}

fn orbiting_spot(angle: f32) -> SpotLight {
    let position = Vec3::new(4.0 * angle.cos(), 3.0, 4.0 * angle.sin());
    SpotLight::new(position, -position.normalize(), Vec3::new(1.0, 0.9, 0.8), 20.0, Some(30.0))
}

/// One tile: `vec3` position, `vec3` normal, `vec2` uv per vertex
fn tile(device: &mut dyn GraphicsDevice) -> RenderResult<Mesh> {
    #[rustfmt::skip]
    let vertices = vec![
        -0.5, 0.0, -0.5,  0.0, 1.0, 0.0,  0.0, 0.0,
         0.5, 0.0, -0.5,  0.0, 1.0, 0.0,  1.0, 0.0,
         0.5, 0.0,  0.5,  0.0, 1.0, 0.0,  1.0, 1.0,
        -0.5, 0.0,  0.5,  0.0, 1.0, 0.0,  0.0, 1.0,
    ];
    Mesh::new(device, vertices, vec![0, 1, 2, 2, 3, 0], VertexLayout::new(&[3, 3, 2]))
}

impl DemoApp {
    fn new(config: &RendererConfig) -> Result<Self, DemoError> {
        let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), config.clone());
        let mut scene = RenderScene::new();
        scene.set_static_uniform("exposure", 1.2_f32);
        scene.set_static_uniform("gamma", 2.2_f32);
        scene.set_static_uniform("shininess", 32.0_f32);
        scene.set_static_uniform("view_pos", [0.0_f32, 4.0, 8.0]);

        let spot = scene.add_light(ctx.device_mut(), orbiting_spot(0.0))?;
        let corners = [
            Vec3::new(-1.0, 2.0, -1.0),
            Vec3::new(1.0, 2.0, -1.0),
            Vec3::new(1.0, 2.0, 1.0),
            Vec3::new(-1.0, 2.0, 1.0),
        ];
        scene.add_light(ctx.device_mut(), AreaLight::new(Vec3::new(0.3, 0.4, 1.0), 0.5, corners))?;

        let post = PostProcessStage::tone_map(ctx.device_mut(), config.width, config.height)?;
        let chain = presets::deferred_chain(&mut scene, &mut ctx, vec![Box::new(post)])?;
        let camera = CameraState::new(
            Vec3::new(0.0, 4.0, 8.0),
            Vec3::new(0.0, -0.5, -1.0).normalize(),
            45.0_f32.to_radians(),
            100.0,
            (config.width, config.height),
        );
        scene.set_active_camera(ctx.device_mut(), camera)?;

        let mesh = Rc::new(tile(ctx.device_mut())?);
        let nodes = (-GRID / 2..=GRID / 2)
            .flat_map(|x| (-GRID / 2..=GRID / 2).map(move |z| (x, z)))
            .map(|(x, z)| {
                let model = Mat4::new_translation(&Vec3::new(x as f32, 0.0, z as f32));
                let compound = RenderCompound::new(Rc::clone(&mesh), Material::new(Vec::new()));
                Rc::new(SceneNode::new(model, vec![compound])) as DrawItem
            })
            .collect();
        log::info!("Demo scene ready: {} lights, {GRID}x{GRID} tiles", scene.lights().count());

        Ok(Self {
            ctx,
            scene,
            chain,
            window: DefaultFramebuffer::new(config.width, config.height),
            nodes,
            spot,
        })
    }

    fn headless(&mut self) -> Option<&mut HeadlessDevice> {
        self.ctx.device_as_mut::<HeadlessDevice>()
    }

    /// Draw one frame, returning (items drawn, draw calls issued)
    fn frame(&mut self, index: u32, delta: f32) -> Result<(usize, usize), DemoError> {
        let angle = index as f32 / FRAMES as f32 * TAU;
        self.scene.update_light(self.ctx.device_mut(), self.spot, orbiting_spot(angle))?;
        self.scene.tick(self.ctx.device_mut(), delta)?;
        self.chain.tick(self.ctx.device_mut(), &self.scene)?;

        if let Some(device) = self.headless() {
            device.take_commands();
        }
        let drawn = {
            let mut frame = DrawContext::with_scene(self.ctx.device_mut(), &mut self.scene);
            self.chain.draw(&mut frame, &self.window, self.nodes.clone())?
        };
        let calls = self.headless().map_or(0, |device| {
            device
                .commands()
                .iter()
                .filter(|command| matches!(command, DeviceCommand::Draw { .. }))
                .count()
        });
        Ok((drawn, calls))
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), DemoError> {
        log::info!("Resizing to {width}x{height}");
        self.window.set_size(width, height);
        self.chain.resize(self.ctx.device_mut(), width, height)?;
        let mut camera = self.scene.camera().cloned().ok_or(RenderError::InvalidHandle {
            kind: "camera",
            id: 0,
        })?;
        camera.target_size = (width, height);
        self.scene.update_camera(self.ctx.device_mut(), camera)?;
        Ok(())
    }

    fn run(&mut self) -> Result<(), DemoError> {
        let start = Instant::now();
        let mut last = start;
        let (mut items, mut calls) = (0, 0);
        for index in 0..FRAMES {
            if index == RESIZE_AT {
                let (width, height) = self.window.size();
                self.resize(width * 2, height * 2)?;
            }
            let now = Instant::now();
            let (drawn, issued) = self.frame(index, now.duration_since(last).as_secs_f32())?;
            last = now;
            log::debug!("Frame {index}: {drawn} items, {issued} draw calls");
            items += drawn;
            calls += issued;
        }
        let elapsed = start.elapsed();
        log::info!(
            "{FRAMES} frames in {:.2?} ({:.1} us/frame): {items} items, {calls} draw calls",
            elapsed,
            elapsed.as_secs_f64() * 1e6 / f64::from(FRAMES)
        );
        self.scene.release(self.ctx.bindings_mut());
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "demo.toml".to_string());
    let config = EngineConfig::load_or_default(&path)?;
    logging::init_with(&config.logging);
    config.validate()?;

    log::info!("Starting deferred demo ({path})");
    let mut app = DemoApp::new(&config.renderer)?;
    app.run()?;
    log::info!("Demo finished");
    Ok(())
}
