//! Graphics device abstraction
//!
//! Everything the renderer core asks of the GPU goes through
//! [`GraphicsDevice`]: buffer objects and indexed binding points, program
//! linking and reflection, uniform setters, textures, render buffers,
//! framebuffers, clears and draws. The trait mirrors the immediate-mode
//! OpenGL 4.3 object model so a native backend is a thin forwarding layer.
//!
//! [`HeadlessDevice`] is the in-memory implementation used by tests and
//! offline tools.

mod headless;

use std::any::Any;

use bitflags::bitflags;

pub use headless::{AttachedObject, DeviceCommand, DeviceLimits, HeadlessDevice};

use crate::render::texture::{SamplerParams, TextureFormat};
use crate::render::types::{GlslType, UniformValue};
use crate::render::RenderResult;

macro_rules! device_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

device_handle!(
    /// Handle to a buffer object
    BufferId
);
device_handle!(
    /// Handle to a linked program
    ProgramId
);
device_handle!(
    /// Handle to a texture object
    TextureId
);
device_handle!(
    /// Handle to a render buffer object
    RenderbufferId
);
device_handle!(
    /// Handle to a framebuffer object
    FramebufferId
);

/// Buffer binding targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Vertex,
    /// Element indices
    Index,
    /// Uniform block storage
    Uniform,
    /// Shader storage block storage
    Storage,
    /// Atomic counters
    AtomicCounter,
}

impl BufferTarget {
    /// Whether the target has indexed binding points
    pub const fn is_indexed(self) -> bool {
        matches!(self, Self::Uniform | Self::Storage | Self::AtomicCounter)
    }
}

/// Buffer usage hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Written once, drawn many times
    #[default]
    Static,
    /// Rewritten often
    Dynamic,
    /// Rewritten every use
    Stream,
}

/// Interface block kinds a renderer dependency can back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// `uniform Name { ... }`
    Uniform,
    /// `buffer Name { ... }`
    Storage,
}

impl BlockKind {
    /// Buffer target backing blocks of this kind
    pub const fn target(self) -> BufferTarget {
        match self {
            Self::Uniform => BufferTarget::Uniform,
            Self::Storage => BufferTarget::Storage,
        }
    }

    /// Suffix used in per-scene dependency keys
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Uniform => "UBO",
            Self::Storage => "SSBO",
        }
    }
}

/// Shader pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Geometry shader
    Geometry,
    /// Fragment shader
    Fragment,
}

impl ShaderStage {
    /// Lowercase stage name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
        }
    }
}

/// GLSL sources of one program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    /// Vertex shader
    pub vertex: String,
    /// Fragment shader
    pub fragment: String,
    /// Optional geometry shader
    pub geometry: Option<String>,
}

impl ShaderSources {
    /// Vertex + fragment program
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            geometry: None,
        }
    }

    /// Add a geometry stage
    #[must_use]
    pub fn with_geometry(mut self, geometry: impl Into<String>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    /// Stages present, in pipeline order
    pub fn stages(&self) -> Vec<(ShaderStage, &str)> {
        let mut stages = vec![(ShaderStage::Vertex, self.vertex.as_str())];
        if let Some(geometry) = &self.geometry {
            stages.push((ShaderStage::Geometry, geometry.as_str()));
        }
        stages.push((ShaderStage::Fragment, self.fragment.as_str()));
        stages
    }
}

/// One entry of the active attribute or uniform list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    /// Name as the driver reports it (`lights[0]` for arrays)
    pub name: String,
    /// Array size, 1 for non-arrays
    pub size: i32,
    /// Reflected type
    pub ty: GlslType,
}

/// Per-uniform parameters queried in bulk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformParameter {
    /// Index of the owning uniform block, -1 for plain uniforms
    BlockIndex,
    /// Byte offset inside the owning block, -1 for plain uniforms
    Offset,
}

/// Framebuffer attachment points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentPoint {
    /// `COLOR_ATTACHMENTn`
    Color(u32),
    /// Depth only
    Depth,
    /// Packed depth + stencil
    DepthStencil,
}

bitflags! {
    /// Buffers cleared by a framebuffer clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u32 {
        /// Color attachments
        const COLOR = 1;
        /// Depth attachment
        const DEPTH = 1 << 1;
        /// Stencil attachment
        const STENCIL = 1 << 2;
    }
}

/// Fixed-function state toggled around passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Back-face culling
    CullFace,
    /// Color blending
    Blend,
}

/// Interleaved vertex layout: component count per attribute location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    /// Components of each attribute, in location order
    pub components: Vec<u32>,
}

impl VertexLayout {
    /// Layout from component counts
    pub fn new(components: &[u32]) -> Self {
        Self {
            components: components.to_vec(),
        }
    }

    /// Floats per vertex
    pub fn stride(&self) -> u32 {
        self.components.iter().sum()
    }
}

/// An indexed draw request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall<'a> {
    /// Interleaved vertex data
    pub vertex_buffer: BufferId,
    /// Element indices
    pub index_buffer: BufferId,
    /// Attribute layout of the vertex buffer
    pub layout: &'a VertexLayout,
    /// Number of indices to draw
    pub index_count: u32,
}

/// The graphics API seen by the renderer core
///
/// Calls that address "the bound buffer" follow OpenGL semantics: bind with
/// [`GraphicsDevice::bind_buffer`] first. Uniform setters apply to the
/// program installed with [`GraphicsDevice::use_program`].
pub trait GraphicsDevice {
    /// Hardware limit of uniform-block binding points
    fn max_uniform_buffer_bindings(&self) -> u32;

    /// Hardware limit of storage-block binding points
    fn max_storage_buffer_bindings(&self) -> u32;

    // Buffers

    /// Create a buffer object
    fn create_buffer(&mut self) -> RenderResult<BufferId>;

    /// Delete a buffer object
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Bind a buffer to a target
    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) -> RenderResult<()>;

    /// Replace the whole store of the buffer bound to `target`
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) -> RenderResult<()>;

    /// Overwrite part of the store of the buffer bound to `target`
    fn buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, data: &[u8]) -> RenderResult<()>;

    /// Read part of the store of the buffer bound to `target`
    fn get_buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, out: &mut [u8]) -> RenderResult<()>;

    /// Attach a buffer to an indexed binding point
    fn bind_buffer_base(&mut self, target: BufferTarget, index: u32, buffer: BufferId) -> RenderResult<()>;

    // Programs

    /// Compile and link a program
    fn link_program(&mut self, sources: &ShaderSources) -> RenderResult<ProgramId>;

    /// Delete a program
    fn delete_program(&mut self, program: ProgramId);

    /// Install a program for subsequent uniform sets and draws
    fn use_program(&mut self, program: ProgramId) -> RenderResult<()>;

    /// Active attributes in driver order
    fn active_attributes(&self, program: ProgramId) -> RenderResult<Vec<ActiveVariable>>;

    /// Location of an active attribute
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Active uniforms, block members included, in driver order
    fn active_uniforms(&self, program: ProgramId) -> RenderResult<Vec<ActiveVariable>>;

    /// Bulk query of a per-uniform parameter
    fn active_uniforms_parameter(
        &self,
        program: ProgramId,
        indices: &[u32],
        parameter: UniformParameter,
    ) -> RenderResult<Vec<i32>>;

    /// Location of a plain uniform
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32>;

    /// Names of active uniform blocks, ordered by block index
    fn uniform_block_names(&self, program: ProgramId) -> RenderResult<Vec<String>>;

    /// Index of a uniform block
    fn uniform_block_index(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Binding point currently assigned to a uniform block
    fn uniform_block_binding_point(&self, program: ProgramId, block_index: u32) -> RenderResult<u32>;

    /// Assign a binding point to a uniform block
    fn uniform_block_binding(&mut self, program: ProgramId, block_index: u32, binding: u32) -> RenderResult<()>;

    /// Names of active storage blocks, ordered by resource index
    fn storage_block_names(&self, program: ProgramId) -> RenderResult<Vec<String>>;

    /// Resource index of a storage block
    fn storage_block_index(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Binding point currently assigned to a storage block
    fn storage_block_binding_point(&self, program: ProgramId, block_index: u32) -> RenderResult<u32>;

    /// Assign a binding point to a storage block
    fn shader_storage_block_binding(&mut self, program: ProgramId, block_index: u32, binding: u32) -> RenderResult<()>;

    /// Set a plain uniform of the current program
    fn set_uniform(&mut self, location: i32, ty: GlslType, value: &UniformValue) -> RenderResult<()>;

    // Textures and render buffers

    /// Create a texture object
    fn create_texture(&mut self) -> RenderResult<TextureId>;

    /// Delete a texture object
    fn delete_texture(&mut self, texture: TextureId);

    /// (Re)allocate a texture's level-0 image, optionally with pixel data
    fn texture_storage(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: Option<&[u8]>,
    ) -> RenderResult<()>;

    /// Apply sampling parameters
    fn texture_parameters(&mut self, texture: TextureId, params: &SamplerParams) -> RenderResult<()>;

    /// Bind a texture to a texture unit, or clear the unit
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) -> RenderResult<()>;

    /// Create a render buffer object
    fn create_renderbuffer(&mut self) -> RenderResult<RenderbufferId>;

    /// Delete a render buffer object
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId);

    /// (Re)allocate render buffer storage
    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferId,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> RenderResult<()>;

    // Framebuffers

    /// Create a framebuffer object
    fn create_framebuffer(&mut self) -> RenderResult<FramebufferId>;

    /// Delete a framebuffer object
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Bind a framebuffer for drawing; `None` selects the default framebuffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> RenderResult<()>;

    /// Attach a texture to a framebuffer
    fn framebuffer_texture(&mut self, framebuffer: FramebufferId, point: AttachmentPoint, texture: TextureId) -> RenderResult<()>;

    /// Attach a render buffer to a framebuffer
    fn framebuffer_renderbuffer(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        renderbuffer: RenderbufferId,
    ) -> RenderResult<()>;

    /// Route fragment outputs to the first `count` color attachments
    fn draw_buffers(&mut self, framebuffer: FramebufferId, count: u32) -> RenderResult<()>;

    // Frame state and drawing

    /// Set the viewport size
    fn viewport(&mut self, width: u32, height: u32);

    /// Set the clear color
    fn clear_color(&mut self, color: [f32; 4]);

    /// Clear the bound framebuffer
    fn clear(&mut self, mask: ClearMask);

    /// Toggle fixed-function state
    fn set_capability(&mut self, capability: Capability, enabled: bool);

    /// Issue an indexed triangle draw with the current program
    fn draw_elements(&mut self, call: &DrawCall<'_>) -> RenderResult<()>;

    /// Downcast to the concrete device
    fn as_any(&self) -> &dyn Any;

    /// Downcast to the concrete device, mutably
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
