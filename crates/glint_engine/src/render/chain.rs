//! Render chain
//!
//! A first stage that draws the scene, followed by zero or more screen-space
//! stages. Each stage draws into the framebuffer of the next one; the last
//! draws into the output target.
//!
//! ```text
//! first ──data──▶ second[0].fbo
//! second[0] ─────▶ second[1].fbo
//! ...
//! second[n-1] ───▶ out
//! ```
//!
//! Without second passes the first stage draws straight into the output;
//! the data handed to [`RenderChain::first_pass`] is kept until
//! [`RenderChain::second_pass`] runs.

use crate::render::device::GraphicsDevice;
use crate::render::framebuffer::{AttachmentStorage, FrameBuffer, RenderTarget};
use crate::render::mesh::DrawItem;
use crate::render::shader::AttributeInfo;
use crate::render::stage::{DrawContext, RenderStage};
use crate::render::uniformed::SamplerData;
use crate::render::{RenderError, RenderResult};
use crate::scene::RenderScene;

/// Stages sequenced through framebuffers
#[derive(Debug)]
pub struct RenderChain {
    first: Box<dyn RenderStage>,
    second: Vec<Box<dyn RenderStage>>,
    pending: Vec<DrawItem>,
}

impl RenderChain {
    /// Chain `first` into `second`
    ///
    /// Every second-pass stage needs a framebuffer. The first of them also
    /// receives a depth buffer, since the first stage draws geometry into it.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        first: Box<dyn RenderStage>,
        mut second: Vec<Box<dyn RenderStage>>,
    ) -> RenderResult<Self> {
        for (index, stage) in second.iter().enumerate() {
            if stage.framebuffer().is_none() {
                return Err(RenderError::InvalidStageTarget {
                    pass: index,
                    target: index + 1,
                    reason: "second-pass stage has no framebuffer",
                });
            }
        }
        if let Some(fbo) = second.first_mut().and_then(|stage| stage.framebuffer_mut()) {
            fbo.add_depth_buffer(device, AttachmentStorage::Renderbuffer)?;
        }
        log::debug!("Render chain of {} stages", second.len() + 1);
        Ok(Self {
            first,
            second,
            pending: Vec::new(),
        })
    }

    fn target_of(&self, index: usize) -> RenderResult<&FrameBuffer> {
        self.second
            .get(index)
            .and_then(|stage| stage.framebuffer())
            .ok_or(RenderError::InvalidStageTarget {
                pass: index,
                target: index + 1,
                reason: "second-pass stage has no framebuffer",
            })
    }

    /// Draw the scene data with the first stage
    ///
    /// With second passes the data lands in the first second-pass
    /// framebuffer; otherwise it is kept for [`RenderChain::second_pass`].
    pub fn first_pass(&mut self, frame: &mut DrawContext<'_>, data: Vec<DrawItem>) -> RenderResult<usize> {
        if self.second.is_empty() {
            self.pending = data;
            return Ok(0);
        }
        let target = self.target_of(0)?;
        self.first.draw(frame, target, &data)
    }

    /// Run the screen-space stages, the last one into `out`
    pub fn second_pass(&self, frame: &mut DrawContext<'_>, out: &dyn RenderTarget) -> RenderResult<usize> {
        if self.second.is_empty() {
            return self.first.draw(frame, out, &self.pending);
        }
        let mut drawn = 0;
        for (index, stage) in self.second.iter().enumerate() {
            let target: &dyn RenderTarget = if index + 1 < self.second.len() {
                self.target_of(index + 1)?
            } else {
                out
            };
            drawn += stage.draw(frame, target, stage.meshes())?;
        }
        Ok(drawn)
    }

    /// Both passes
    pub fn draw(&mut self, frame: &mut DrawContext<'_>, out: &dyn RenderTarget, data: Vec<DrawItem>) -> RenderResult<usize> {
        let first = self.first_pass(frame, data)?;
        Ok(first + self.second_pass(frame, out)?)
    }

    /// Resize every stage
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        self.first.resize(device, width, height)?;
        for stage in &mut self.second {
            stage.resize(device, width, height)?;
        }
        Ok(())
    }

    /// Per-frame update of every stage
    pub fn tick(&self, device: &mut dyn GraphicsDevice, scene: &RenderScene) -> RenderResult<()> {
        self.first.on_tick(device, scene)?;
        for stage in &self.second {
            stage.on_tick(device, scene)?;
        }
        Ok(())
    }

    /// Vertex attributes the scene data must provide
    pub fn attribute_data(&self) -> &[AttributeInfo] {
        self.first.attribute_data()
    }

    /// Samplers the scene materials must fill
    pub fn sampler_data(&self) -> Option<&SamplerData> {
        self.first.sampler_data()
    }

    /// First stage
    pub fn first(&self) -> &dyn RenderStage {
        self.first.as_ref()
    }

    /// Screen-space stages
    pub fn second(&self) -> &[Box<dyn RenderStage>] {
        &self.second
    }
}
