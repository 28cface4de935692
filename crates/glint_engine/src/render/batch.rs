//! Render batch
//!
//! A flat list of passes, each drawing into the output or into another
//! pass's framebuffer. Passes marked `force` run every frame; the others
//! run only when an earlier pass that drew something unlocks them.
//!
//! The allowed mask is rebuilt from the `force` flags at the start of every
//! frame, so unlocking never leaks into the next frame.

use crate::render::device::GraphicsDevice;
use crate::render::framebuffer::RenderTarget;
use crate::render::mesh::DrawItem;
use crate::render::stage::{DrawContext, RenderStage};
use crate::render::{RenderError, RenderResult};
use crate::scene::RenderScene;

/// Where a pass draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTarget {
    /// The output target handed to [`RenderBatch::draw`]
    Output,
    /// The framebuffer of the pass at this index
    Pass(usize),
}

/// One stage of a batch
#[derive(Debug)]
pub struct BatchPass {
    stage: Box<dyn RenderStage>,
    target: BatchTarget,
    force: bool,
    unlocks: Vec<usize>,
    draw_list: Option<Vec<DrawItem>>,
}

impl BatchPass {
    /// Pass drawing `stage` into `target`; `force` runs it every frame
    pub fn new(stage: Box<dyn RenderStage>, target: BatchTarget, force: bool) -> Self {
        Self {
            stage,
            target,
            force,
            unlocks: Vec::new(),
            draw_list: None,
        }
    }

    /// Later passes enabled for the frame when this one draws anything
    #[must_use]
    pub fn unlocking(mut self, passes: impl IntoIterator<Item = usize>) -> Self {
        self.unlocks.extend(passes);
        self
    }

    /// Stage of the pass
    pub fn stage(&self) -> &dyn RenderStage {
        self.stage.as_ref()
    }

    fn data(&self) -> &[DrawItem] {
        self.draw_list.as_deref().unwrap_or_else(|| self.stage.meshes())
    }
}

/// Passes with per-frame gating
#[derive(Debug)]
pub struct RenderBatch {
    passes: Vec<BatchPass>,
    template: Vec<bool>,
    allowed: Vec<bool>,
}

impl RenderBatch {
    /// Check targets and unlock lists, then build the batch
    pub fn new(passes: Vec<BatchPass>) -> RenderResult<Self> {
        for (index, pass) in passes.iter().enumerate() {
            if let BatchTarget::Pass(target) = pass.target {
                let reason = if target == index {
                    Some("a pass cannot draw into itself")
                } else if passes.get(target).map_or(true, |t| t.stage.framebuffer().is_none()) {
                    Some("target pass has no framebuffer")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    return Err(RenderError::InvalidStageTarget {
                        pass: index,
                        target,
                        reason,
                    });
                }
            }
            if let Some(&target) = pass.unlocks.iter().find(|&&k| k <= index || k >= passes.len()) {
                return Err(RenderError::InvalidStageTarget {
                    pass: index,
                    target,
                    reason: "only later passes can be unlocked",
                });
            }
        }
        let template: Vec<bool> = passes.iter().map(|pass| pass.force).collect();
        Ok(Self {
            allowed: template.clone(),
            template,
            passes,
        })
    }

    /// Override the draw list of a pass; `None` restores the stage's meshes
    pub fn set_renderer_in(&mut self, index: usize, data: Option<Vec<DrawItem>>) -> RenderResult<()> {
        let pass = self.passes.get_mut(index).ok_or(RenderError::InvalidHandle {
            kind: "batch pass",
            id: index as u64,
        })?;
        pass.draw_list = data;
        Ok(())
    }

    /// Run the frame's allowed passes in order and return the items drawn
    pub fn draw(&mut self, frame: &mut DrawContext<'_>, out: &dyn RenderTarget) -> RenderResult<usize> {
        self.allowed.clone_from(&self.template);
        let mut drawn = 0;
        for (index, pass) in self.passes.iter().enumerate() {
            if !self.allowed[index] {
                log::trace!("Batch pass {index} skipped");
                continue;
            }
            let target: &dyn RenderTarget = match pass.target {
                BatchTarget::Output => out,
                BatchTarget::Pass(target) => self.passes[target]
                    .stage
                    .framebuffer()
                    .ok_or(RenderError::InvalidStageTarget {
                        pass: index,
                        target,
                        reason: "target pass has no framebuffer",
                    })?,
            };
            let count = pass.stage.draw(frame, target, pass.data())?;
            if count > 0 {
                for &unlocked in &pass.unlocks {
                    self.allowed[unlocked] = true;
                }
            }
            drawn += count;
        }
        Ok(drawn)
    }

    /// Passes that ran (or were unlocked) in the last frame
    pub fn allowed(&self) -> &[bool] {
        &self.allowed
    }

    /// Passes in order
    pub fn passes(&self) -> &[BatchPass] {
        &self.passes
    }

    /// Resize every stage
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        for pass in &mut self.passes {
            pass.stage.resize(device, width, height)?;
        }
        Ok(())
    }

    /// Per-frame update of every stage
    pub fn tick(&self, device: &mut dyn GraphicsDevice, scene: &RenderScene) -> RenderResult<()> {
        for pass in &self.passes {
            pass.stage.on_tick(device, scene)?;
        }
        Ok(())
    }
}
