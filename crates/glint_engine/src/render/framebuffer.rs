//! Framebuffers and render targets
//!
//! Attachment layouts are data: a list of [`AttachmentDescriptor`]s, each
//! naming an attachment point, an internal format and whether the storage
//! is a sampleable texture or a write-only render buffer.
//!
//! ```text
//! G-buffer:   Color(0) Rgba16F   Color(1) Rgb8Snorm   Color(2) Rgba8
//! + depth:    Depth    Depth32F  (attached by the render chain)
//! ```

use std::fmt;

use crate::render::device::{AttachmentPoint, ClearMask, FramebufferId, GraphicsDevice, TextureId};
use crate::render::texture::{RenderBuffer, SamplerParams, Texture2D, TextureFormat};
use crate::render::RenderResult;

/// Something a stage can draw into
pub trait RenderTarget: fmt::Debug {
    /// Framebuffer object, `None` for the window's back buffer
    fn framebuffer_id(&self) -> Option<FramebufferId>;

    /// Size in pixels
    fn size(&self) -> (u32, u32);

    /// Buffers cleared before drawing
    fn clear_mask(&self) -> ClearMask;

    /// Make this the draw target and match the viewport to it
    fn bind(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        device.bind_framebuffer(self.framebuffer_id())?;
        let (width, height) = self.size();
        device.viewport(width, height);
        Ok(())
    }

    /// Clear the bound target
    fn clear(&self, device: &mut dyn GraphicsDevice) {
        device.clear(self.clear_mask());
    }
}

/// The window's back buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultFramebuffer {
    width: u32,
    height: u32,
}

impl DefaultFramebuffer {
    /// Back buffer of a window of this size
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Follow a window resize
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

impl RenderTarget for DefaultFramebuffer {
    fn framebuffer_id(&self) -> Option<FramebufferId> {
        None
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear_mask(&self) -> ClearMask {
        ClearMask::COLOR | ClearMask::DEPTH
    }
}

/// Kind of object backing an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentStorage {
    /// Sampleable texture
    #[default]
    Texture,
    /// Render buffer, never sampled
    Renderbuffer,
}

/// One attachment of a framebuffer layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// Attachment point; color indices are renumbered in declaration order
    pub point: AttachmentPoint,
    /// Internal format
    pub format: TextureFormat,
    /// Backing object kind
    pub storage: AttachmentStorage,
}

impl AttachmentDescriptor {
    /// Color texture
    pub const fn color(format: TextureFormat) -> Self {
        Self {
            point: AttachmentPoint::Color(0),
            format,
            storage: AttachmentStorage::Texture,
        }
    }

    /// 32-bit float depth
    pub const fn depth(storage: AttachmentStorage) -> Self {
        Self {
            point: AttachmentPoint::Depth,
            format: TextureFormat::Depth32F,
            storage,
        }
    }

    /// Packed depth and stencil
    pub const fn depth_stencil(storage: AttachmentStorage) -> Self {
        Self {
            point: AttachmentPoint::DepthStencil,
            format: TextureFormat::Depth24Stencil8,
            storage,
        }
    }

    /// Same attachment at color index `index`
    #[must_use]
    pub fn moved(mut self, index: u32) -> Self {
        if let AttachmentPoint::Color(_) = self.point {
            self.point = AttachmentPoint::Color(index);
        }
        self
    }

    fn clear_bits(&self) -> ClearMask {
        match self.point {
            AttachmentPoint::Color(_) => ClearMask::COLOR,
            AttachmentPoint::Depth => ClearMask::DEPTH,
            AttachmentPoint::DepthStencil => ClearMask::DEPTH | ClearMask::STENCIL,
        }
    }
}

#[derive(Debug)]
enum AttachmentObject {
    Texture(Texture2D),
    Renderbuffer(RenderBuffer),
}

#[derive(Debug)]
struct Attachment {
    descriptor: AttachmentDescriptor,
    object: AttachmentObject,
}

impl Attachment {
    fn new(
        device: &mut dyn GraphicsDevice,
        framebuffer: FramebufferId,
        descriptor: AttachmentDescriptor,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let object = match descriptor.storage {
            AttachmentStorage::Texture => {
                let texture = Texture2D::new(device, width, height, descriptor.format, SamplerParams::render_target())?;
                device.framebuffer_texture(framebuffer, descriptor.point, texture.id())?;
                AttachmentObject::Texture(texture)
            }
            AttachmentStorage::Renderbuffer => {
                let buffer = RenderBuffer::new(device, width, height, descriptor.format)?;
                device.framebuffer_renderbuffer(framebuffer, descriptor.point, buffer.id())?;
                AttachmentObject::Renderbuffer(buffer)
            }
        };
        Ok(Self { descriptor, object })
    }

    fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        match &mut self.object {
            AttachmentObject::Texture(texture) => texture.resize(device, width, height),
            AttachmentObject::Renderbuffer(buffer) => buffer.resize(device, width, height),
        }
    }

    fn texture(&self) -> Option<&Texture2D> {
        match &self.object {
            AttachmentObject::Texture(texture) => Some(texture),
            AttachmentObject::Renderbuffer(_) => None,
        }
    }

    fn destroy(self, device: &mut dyn GraphicsDevice) {
        match self.object {
            AttachmentObject::Texture(texture) => texture.destroy(device),
            AttachmentObject::Renderbuffer(buffer) => buffer.destroy(device),
        }
    }
}

/// Offscreen framebuffer with owned attachments
#[derive(Debug)]
pub struct FrameBuffer {
    id: FramebufferId,
    width: u32,
    height: u32,
    colors: Vec<Attachment>,
    depth: Option<Attachment>,
    clear_mask: ClearMask,
}

impl FrameBuffer {
    /// Create a framebuffer and allocate every attachment at `width x height`
    ///
    /// Color attachments take the points `Color(0..n)` in the order given.
    /// At most one depth or depth-stencil attachment is kept; later ones are
    /// ignored with a warning.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        attachments: &[AttachmentDescriptor],
    ) -> RenderResult<Self> {
        let id = device.create_framebuffer()?;
        let mut framebuffer = Self {
            id,
            width,
            height,
            colors: Vec::new(),
            depth: None,
            clear_mask: ClearMask::empty(),
        };
        for descriptor in attachments {
            match descriptor.point {
                AttachmentPoint::Color(_) => {
                    let index = framebuffer.colors.len() as u32;
                    let attachment = Attachment::new(device, id, descriptor.moved(index), width, height)?;
                    framebuffer.clear_mask |= ClearMask::COLOR;
                    framebuffer.colors.push(attachment);
                }
                AttachmentPoint::Depth | AttachmentPoint::DepthStencil => {
                    framebuffer.attach_depth(device, *descriptor)?;
                }
            }
        }
        device.draw_buffers(id, framebuffer.colors.len() as u32)?;
        log::debug!(
            "Created {width}x{height} framebuffer {} with {} color attachments",
            id.0,
            framebuffer.colors.len()
        );
        Ok(framebuffer)
    }

    fn attach_depth(&mut self, device: &mut dyn GraphicsDevice, descriptor: AttachmentDescriptor) -> RenderResult<bool> {
        if let Some(existing) = &self.depth {
            log::warn!(
                "Framebuffer {} already has a {:?} attachment, ignoring {:?}",
                self.id.0,
                existing.descriptor.point,
                descriptor.point
            );
            return Ok(false);
        }
        let attachment = Attachment::new(device, self.id, descriptor, self.width, self.height)?;
        self.clear_mask |= descriptor.clear_bits();
        self.depth = Some(attachment);
        Ok(true)
    }

    /// Attach a depth buffer unless one is present
    ///
    /// Returns whether an attachment was added.
    pub fn add_depth_buffer(&mut self, device: &mut dyn GraphicsDevice, storage: AttachmentStorage) -> RenderResult<bool> {
        self.attach_depth(device, AttachmentDescriptor::depth(storage))
    }

    /// Whether a depth or depth-stencil attachment exists
    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Device handle
    pub fn id(&self) -> FramebufferId {
        self.id
    }

    /// Number of color attachments
    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    /// Color texture at attachment index `index`
    pub fn color_texture(&self, index: usize) -> Option<&Texture2D> {
        self.colors.get(index).and_then(Attachment::texture)
    }

    /// Handles of every sampleable color texture, in attachment order
    pub fn color_textures(&self) -> Vec<TextureId> {
        self.colors
            .iter()
            .filter_map(Attachment::texture)
            .map(Texture2D::id)
            .collect()
    }

    /// Descriptors of the current attachments
    pub fn attachments(&self) -> Vec<AttachmentDescriptor> {
        self.colors
            .iter()
            .chain(self.depth.as_ref())
            .map(|attachment| attachment.descriptor)
            .collect()
    }

    /// Reallocate every attachment at a new size
    ///
    /// A no-op when the size is unchanged; returns whether anything was
    /// reallocated.
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<bool> {
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }
        for attachment in self.colors.iter_mut().chain(self.depth.as_mut()) {
            attachment.resize(device, width, height)?;
        }
        self.width = width;
        self.height = height;
        log::debug!("Framebuffer {} resized to {width}x{height}", self.id.0);
        Ok(true)
    }

    /// Delete the framebuffer and its attachments
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        for attachment in self.colors.into_iter().chain(self.depth) {
            attachment.destroy(device);
        }
        device.delete_framebuffer(self.id);
    }
}

impl RenderTarget for FrameBuffer {
    fn framebuffer_id(&self) -> Option<FramebufferId> {
        Some(self.id)
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear_mask(&self) -> ClearMask {
        self.clear_mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::{AttachedObject, HeadlessDevice};

    fn gbuffer(device: &mut HeadlessDevice) -> FrameBuffer {
        FrameBuffer::new(device, 64, 32, &[
            AttachmentDescriptor::color(TextureFormat::Rgba16F),
            AttachmentDescriptor::color(TextureFormat::Rgb8Snorm),
            AttachmentDescriptor::color(TextureFormat::Rgba8),
        ])
        .unwrap()
    }

    #[test]
    fn test_colors_take_sequential_points() {
        let mut device = HeadlessDevice::new();
        let fbo = gbuffer(&mut device);
        assert_eq!(device.draw_buffer_count(fbo.id()), Some(3));
        assert_eq!(fbo.clear_mask(), ClearMask::COLOR);
        let normals = fbo.color_texture(1).unwrap();
        assert_eq!(
            device.attachment(fbo.id(), AttachmentPoint::Color(1)),
            Some(AttachedObject::Texture(normals.id()))
        );
        assert_eq!(device.texture_format(normals.id()), Some(TextureFormat::Rgb8Snorm));
    }

    #[test]
    fn test_second_depth_buffer_is_ignored() {
        let mut device = HeadlessDevice::new();
        let mut fbo = gbuffer(&mut device);
        assert!(fbo.add_depth_buffer(&mut device, AttachmentStorage::Renderbuffer).unwrap());
        assert!(!fbo.add_depth_buffer(&mut device, AttachmentStorage::Texture).unwrap());
        assert!(matches!(
            device.attachment(fbo.id(), AttachmentPoint::Depth),
            Some(AttachedObject::Renderbuffer(_))
        ));
        assert_eq!(fbo.clear_mask(), ClearMask::COLOR | ClearMask::DEPTH);
    }

    #[test]
    fn test_depth_stencil_blocks_depth() {
        let mut device = HeadlessDevice::new();
        let mut fbo = FrameBuffer::new(&mut device, 8, 8, &[
            AttachmentDescriptor::color(TextureFormat::Rgb8),
            AttachmentDescriptor::depth_stencil(AttachmentStorage::Renderbuffer),
        ])
        .unwrap();
        assert!(!fbo.add_depth_buffer(&mut device, AttachmentStorage::Texture).unwrap());
        assert!(fbo.clear_mask().contains(ClearMask::STENCIL));
    }

    #[test]
    fn test_resize_is_idempotent() {
        let mut device = HeadlessDevice::new();
        let mut fbo = gbuffer(&mut device);
        fbo.add_depth_buffer(&mut device, AttachmentStorage::Renderbuffer).unwrap();

        assert!(fbo.resize(&mut device, 128, 96).unwrap());
        assert!(!fbo.resize(&mut device, 128, 96).unwrap());
        for id in fbo.color_textures() {
            assert_eq!(device.texture_size(id), Some((128, 96)));
        }
        let Some(AttachedObject::Renderbuffer(depth)) = device.attachment(fbo.id(), AttachmentPoint::Depth) else {
            panic!("depth attachment missing");
        };
        assert_eq!(device.renderbuffer_size(depth), Some((128, 96)));
        assert_eq!(fbo.attachments().len(), 4);
    }

    #[test]
    fn test_bind_sets_viewport() {
        let mut device = HeadlessDevice::new();
        let fbo = gbuffer(&mut device);
        fbo.bind(&mut device).unwrap();
        assert_eq!(device.bound_framebuffer(), Some(fbo.id()));
        assert_eq!(device.viewport_size(), (64, 32));

        let window = DefaultFramebuffer::new(800, 600);
        window.bind(&mut device).unwrap();
        assert_eq!(device.bound_framebuffer(), None);
        assert_eq!(device.viewport_size(), (800, 600));
    }
}
