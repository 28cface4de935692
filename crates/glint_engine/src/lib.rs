//! # Glint Engine
//!
//! Renderer core that binds scene data to shader blocks by introspection.
//!
//! ## Features
//!
//! - **Typed GPU buffers**: dirty-range uploads, named-field layouts and
//!   array-of-struct storage with a count header
//! - **Block dependencies**: `MVPMatrices`, `SpotLightStorage` and
//!   `AreaLightStorage` follow scene events and share binding points
//! - **Render chains**: forward and deferred presets, post-processing, and
//!   gated render batches
//! - **Headless device**: a recording backend with GLSL reflection for tests
//!   and tooling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glint_engine::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     glint_engine::foundation::logging::init();
//!     let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default());
//!     let mut scene = RenderScene::new();
//!     let mut chain = presets::deferred_chain(&mut scene, &mut ctx, Vec::new())?;
//!
//!     let window = DefaultFramebuffer::new(800, 600);
//!     chain.tick(ctx.device_mut(), &scene)?;
//!     let mut frame = DrawContext::with_scene(ctx.device_mut(), &mut scene);
//!     chain.draw(&mut frame, &window, Vec::new())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for applications
pub mod prelude {
    pub use crate::config::{Config, ConfigError, ConfigFormat};
    pub use crate::core::{EngineConfig, GBufferPrecision, RendererConfig};
    pub use crate::foundation::math::{Mat4, Vec3};
    pub use crate::render::device::{GraphicsDevice, HeadlessDevice, ShaderSources, VertexLayout};
    pub use crate::render::presets;
    pub use crate::render::{
        BasicStage, DefaultFramebuffer, DrawContext, DrawItem, FrameBuffer, Material, Mesh, RenderBatch, RenderChain,
        RenderCompound, RenderContext, RenderError, RenderResult, RenderStage, RenderTarget, SceneNode, SceneRenderer,
    };
    pub use crate::scene::{AreaLight, CameraState, RenderScene, SpotLight};
}
