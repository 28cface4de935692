//! # Rendering
//!
//! Renderer core layered over a [`device::GraphicsDevice`]:
//!
//! - **Buffers**: typed GPU buffers with dirty tracking, named-field layouts
//!   and array-of-struct storage
//! - **Binding points**: per-kind pools leased to uniform and storage blocks
//! - **Dependencies**: per-block data sources that follow scene events
//! - **Stages**: shader programs introspected into sampler units, uniform
//!   setters and block bindings
//! - **Chains and batches**: stages sequenced through framebuffers
//!
//! Only the headless device ships; a windowed backend implements the same
//! trait.

pub mod batch;
pub mod binding;
pub mod buffer;
pub mod chain;
pub mod context;
pub mod dependency;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod mesh;
pub mod presets;
pub mod scene_renderer;
pub mod shader;
pub mod stage;
pub mod texture;
pub mod types;
pub mod uniformed;

#[cfg(test)]
mod pipeline_tests;

pub use batch::{BatchPass, BatchTarget, RenderBatch};
pub use chain::RenderChain;
pub use context::RenderContext;
pub use error::{RenderError, RenderResult};
pub use framebuffer::{DefaultFramebuffer, FrameBuffer, RenderTarget};
pub use mesh::{DrawItem, Drawable, Material, Mesh, RenderCompound, SceneNode};
pub use scene_renderer::SceneRenderer;
pub use stage::{BasicStage, DrawContext, RenderStage};
pub use uniformed::UniformedRenderer;
