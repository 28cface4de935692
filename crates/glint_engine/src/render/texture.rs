//! Textures and render buffers
//!
//! Format descriptors and sampling options are plain data so attachment
//! layouts can be declared as tables (see [`crate::render::framebuffer`]).

use serde::{Deserialize, Serialize};

use crate::render::device::{GraphicsDevice, RenderbufferId, TextureId};
use crate::render::RenderResult;

/// Internal formats of textures and render buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGB
    Rgb8,
    /// 8-bit RGBA
    Rgba8,
    /// Signed normalized 8-bit RGB, used for packed normals
    Rgb8Snorm,
    /// Half float RGB
    Rgb16F,
    /// Half float RGBA
    Rgba16F,
    /// Float RGB
    Rgb32F,
    /// Float RGBA
    Rgba32F,
    /// 32-bit float depth
    Depth32F,
    /// Packed 24-bit depth and 8-bit stencil
    Depth24Stencil8,
}

impl TextureFormat {
    /// Bytes per texel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 | Self::Rgb8Snorm => 3,
            Self::Rgba8 | Self::Depth32F | Self::Depth24Stencil8 => 4,
            Self::Rgb16F => 6,
            Self::Rgba16F => 8,
            Self::Rgb32F => 12,
            Self::Rgba32F => 16,
        }
    }

    /// Whether this is a depth or depth-stencil format
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth32F | Self::Depth24Stencil8)
    }
}

/// Minification and magnification filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Nearest texel
    #[default]
    Nearest,
    /// Bilinear
    Linear,
    /// Trilinear with mipmaps
    Mipmap,
}

/// Wrapping outside `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Border {
    /// Clamp to the border color
    Clamp,
    /// Repeat
    #[default]
    Repeat,
    /// Mirrored repeat
    Mirror,
    /// Clamp to the edge texel
    Edge,
}

/// Sampling parameters of a texture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerParams {
    /// Filtering
    pub interpolation: Interpolation,
    /// Wrapping
    pub border: Border,
    /// Anisotropic filtering level, 0 disables it
    pub anisotropic_levels: u32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Nearest,
            border: Border::Repeat,
            anisotropic_levels: 0,
        }
    }
}

impl SamplerParams {
    /// Nearest filtering clamped to the edge, the setup of render targets
    pub fn render_target() -> Self {
        Self {
            interpolation: Interpolation::Nearest,
            border: Border::Edge,
            anisotropic_levels: 0,
        }
    }
}

/// How a material texture bound to a sampler should be loaded
///
/// Stages report these per sampler; asset loaders consume them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureLoadParams {
    /// Sampling setup after load
    pub sampler: SamplerParams,
    /// Convert sRGB sources to linear space
    pub gamma_correction: bool,
    /// Generate mipmaps
    pub mipmap: bool,
}

impl Default for TextureLoadParams {
    fn default() -> Self {
        Self {
            sampler: SamplerParams {
                interpolation: Interpolation::Mipmap,
                border: Border::Repeat,
                anisotropic_levels: 16,
            },
            gamma_correction: false,
            mipmap: true,
        }
    }
}

/// A 2D texture object
#[derive(Debug)]
pub struct Texture2D {
    id: TextureId,
    width: u32,
    height: u32,
    format: TextureFormat,
    params: SamplerParams,
}

impl Texture2D {
    /// Create and allocate an empty texture
    pub fn new(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
        params: SamplerParams,
    ) -> RenderResult<Self> {
        let id = device.create_texture()?;
        device.texture_storage(id, width, height, format, None)?;
        device.texture_parameters(id, &params)?;
        log::debug!("Created {width}x{height} {format:?} texture {}", id.0);
        Ok(Self {
            id,
            width,
            height,
            format,
            params,
        })
    }

    /// Create a texture from tightly packed pixel data
    pub fn from_pixels(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
        params: SamplerParams,
        pixels: &[u8],
    ) -> RenderResult<Self> {
        let texture = Self::new(device, width, height, format, params)?;
        device.texture_storage(texture.id, width, height, format, Some(pixels))?;
        Ok(texture)
    }

    /// Device handle
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Current size
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Internal format
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Sampling parameters
    pub fn params(&self) -> &SamplerParams {
        &self.params
    }

    /// Reallocate storage at a new size, dropping contents
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        device.texture_storage(self.id, width, height, self.format, None)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Bind to a texture unit
    pub fn bind_to_unit(&self, device: &mut dyn GraphicsDevice, unit: u32) -> RenderResult<()> {
        device.bind_texture(unit, Some(self.id))
    }

    /// Delete the device object
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.delete_texture(self.id);
    }
}

/// A render buffer object (write-only attachment storage)
#[derive(Debug)]
pub struct RenderBuffer {
    id: RenderbufferId,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl RenderBuffer {
    /// Create and allocate a render buffer
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32, format: TextureFormat) -> RenderResult<Self> {
        let id = device.create_renderbuffer()?;
        device.renderbuffer_storage(id, width, height, format)?;
        Ok(Self {
            id,
            width,
            height,
            format,
        })
    }

    /// Device handle
    pub fn id(&self) -> RenderbufferId {
        self.id
    }

    /// Current size
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Internal format
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Reallocate storage at a new size
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        device.renderbuffer_storage(self.id, width, height, self.format)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Delete the device object
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.delete_renderbuffer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    #[test]
    fn test_texture_resize_reallocates() {
        let mut device = HeadlessDevice::new();
        let mut texture =
            Texture2D::new(&mut device, 4, 4, TextureFormat::Rgba16F, SamplerParams::render_target()).unwrap();
        texture.resize(&mut device, 8, 2).unwrap();
        assert_eq!(device.texture_size(texture.id()), Some((8, 2)));
        assert_eq!(texture.size(), (8, 2));
    }

    #[test]
    fn test_pixel_data_length_is_checked() {
        let mut device = HeadlessDevice::new();
        let result = Texture2D::from_pixels(
            &mut device,
            2,
            2,
            TextureFormat::Rgb8,
            SamplerParams::default(),
            &[0; 5],
        );
        assert!(result.is_err());
    }
}
