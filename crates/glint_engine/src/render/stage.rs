//! Render stages
//!
//! A stage is one shader program plus whatever it draws into. The base draw
//! contract is shared by every stage:
//!
//! 1. bind the target framebuffer and clear it
//! 2. install the program
//! 3. draw each item of the list
//! 4. report how many items were drawn
//!
//! Stages that own a framebuffer can be the target of an earlier stage in a
//! [`crate::render::chain::RenderChain`] or [`crate::render::batch::RenderBatch`].

use std::fmt;

use crate::foundation::math::Mat4;
use crate::render::context::RenderContext;
use crate::render::device::GraphicsDevice;
use crate::render::framebuffer::{FrameBuffer, RenderTarget};
use crate::render::mesh::DrawItem;
use crate::render::shader::{AttributeInfo, ShaderProgram};
use crate::render::texture::TextureLoadParams;
use crate::render::uniformed::SamplerData;
use crate::render::RenderResult;
use crate::scene::RenderScene;

/// Per-draw state handed to drawables
///
/// Carries the device and, when drawing a scene, the scene whose
/// dependencies follow node transforms.
pub struct DrawContext<'a> {
    device: &'a mut dyn GraphicsDevice,
    scene: Option<&'a mut RenderScene>,
}

impl fmt::Debug for DrawContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawContext")
            .field("scene", &self.scene.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> DrawContext<'a> {
    /// Draw without a scene
    pub fn new(device: &'a mut dyn GraphicsDevice) -> Self {
        Self { device, scene: None }
    }

    /// Draw a scene
    pub fn with_scene(device: &'a mut dyn GraphicsDevice, scene: &'a mut RenderScene) -> Self {
        Self {
            device,
            scene: Some(scene),
        }
    }

    /// Graphics device
    pub fn device(&mut self) -> &mut dyn GraphicsDevice {
        &mut *self.device
    }

    /// Scene being drawn
    pub fn scene(&self) -> Option<&RenderScene> {
        self.scene.as_deref()
    }

    /// Tell the scene a node is about to draw
    pub fn node_drawn(&mut self, model: &Mat4) -> RenderResult<()> {
        match self.scene.as_deref_mut() {
            Some(scene) => scene.node_drawn(&mut *self.device, model),
            None => Ok(()),
        }
    }
}

/// One shader-bearing pass
pub trait RenderStage: fmt::Debug {
    /// Program drawn with
    fn program(&self) -> &ShaderProgram;

    /// Draw `data` into `target`
    fn draw(&self, frame: &mut DrawContext<'_>, target: &dyn RenderTarget, data: &[DrawItem]) -> RenderResult<usize> {
        draw_items(self.program(), frame, target, data)
    }

    /// Items the stage draws on its own (screen quads of second passes)
    fn meshes(&self) -> &[DrawItem] {
        &[]
    }

    /// Owned framebuffer, when other stages can draw into this one
    fn framebuffer(&self) -> Option<&FrameBuffer> {
        None
    }

    /// Owned framebuffer, mutably
    fn framebuffer_mut(&mut self) -> Option<&mut FrameBuffer> {
        None
    }

    /// Follow a target resize
    fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        if let Some(framebuffer) = self.framebuffer_mut() {
            framebuffer.resize(device, width, height)?;
        }
        Ok(())
    }

    /// How material textures bound to a sampler should be loaded
    fn load_params(&self, _sampler: &str) -> TextureLoadParams {
        TextureLoadParams::default()
    }

    /// Called once the stage's samplers have texture units
    fn on_created_uniformed(&mut self, _ctx: &mut RenderContext, _samplers: &SamplerData) -> RenderResult<()> {
        Ok(())
    }

    /// Vertex attributes by location
    fn attribute_data(&self) -> &[AttributeInfo] {
        &[]
    }

    /// Sampler units by texture name
    fn sampler_data(&self) -> Option<&SamplerData> {
        None
    }

    /// Per-frame update before drawing
    fn on_tick(&self, _device: &mut dyn GraphicsDevice, _scene: &RenderScene) -> RenderResult<()> {
        Ok(())
    }
}

/// Base draw: bind and clear `target`, install `program`, draw every item
pub fn draw_items(
    program: &ShaderProgram,
    frame: &mut DrawContext<'_>,
    target: &dyn RenderTarget,
    data: &[DrawItem],
) -> RenderResult<usize> {
    target.bind(frame.device())?;
    target.clear(frame.device());
    program.use_program(frame.device())?;
    for item in data {
        item.draw(frame)?;
    }
    log::trace!("'{}' drew {} items", program.label(), data.len());
    Ok(data.len())
}

/// A stage with an optional framebuffer and a fixed draw list
#[derive(Debug)]
pub struct BasicStage {
    program: ShaderProgram,
    framebuffer: Option<FrameBuffer>,
    meshes: Vec<DrawItem>,
}

impl BasicStage {
    /// Stage drawing with `program` and nothing of its own
    pub fn new(program: ShaderProgram) -> Self {
        Self {
            program,
            framebuffer: None,
            meshes: Vec::new(),
        }
    }

    /// Give the stage a framebuffer other stages draw into
    #[must_use]
    pub fn with_framebuffer(mut self, framebuffer: FrameBuffer) -> Self {
        self.framebuffer = Some(framebuffer);
        self
    }

    /// Items drawn when the stage runs as a second pass
    #[must_use]
    pub fn with_meshes(mut self, meshes: Vec<DrawItem>) -> Self {
        self.meshes = meshes;
        self
    }
}

impl RenderStage for BasicStage {
    fn program(&self) -> &ShaderProgram {
        &self.program
    }

    fn meshes(&self) -> &[DrawItem] {
        &self.meshes
    }

    fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.framebuffer.as_ref()
    }

    fn framebuffer_mut(&mut self) -> Option<&mut FrameBuffer> {
        self.framebuffer.as_mut()
    }
}
