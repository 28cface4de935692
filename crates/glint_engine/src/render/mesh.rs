//! Meshes and draw items
//!
//! A [`Mesh`] pairs an interleaved vertex buffer with an index buffer. A
//! [`RenderCompound`] adds the texture bindings of a [`Material`]; a
//! [`SceneNode`] adds a world matrix that is announced to the scene before
//! its compounds draw, so `MVPMatrices` follows every node.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::foundation::math::Mat4;
use crate::render::buffer::GpuBuffer;
use crate::render::device::{BufferTarget, BufferUsage, DrawCall, GraphicsDevice, TextureId, VertexLayout};
use crate::render::stage::DrawContext;
use crate::render::{RenderError, RenderResult};

/// Anything a stage can draw
pub trait Drawable: fmt::Debug {
    /// Issue the draw calls for this item
    fn draw(&self, frame: &mut DrawContext<'_>) -> RenderResult<()>;
}

/// Shared draw list entry
pub type DrawItem = Rc<dyn Drawable>;

/// Vertex and index buffers with their attribute layout
#[derive(Debug)]
pub struct Mesh {
    vertices: GpuBuffer<f32>,
    indices: GpuBuffer<u32>,
    layout: VertexLayout,
}

impl Mesh {
    /// Upload interleaved vertices and indices
    ///
    /// `vertices` must hold whole vertices of `layout`.
    pub fn new(device: &mut dyn GraphicsDevice, vertices: Vec<f32>, indices: Vec<u32>, layout: VertexLayout) -> RenderResult<Self> {
        check_vertices(&vertices, &layout)?;
        let mut vertices = GpuBuffer::new(device, BufferTarget::Vertex, BufferUsage::Static, vertices)?;
        let mut indices = GpuBuffer::new(device, BufferTarget::Index, BufferUsage::Static, indices)?;
        vertices.force_upload(device)?;
        indices.force_upload(device)?;
        Ok(Self {
            vertices,
            indices,
            layout,
        })
    }

    /// Full-screen quad: `vec2` position and `vec2` uv per vertex
    pub fn screen_quad(device: &mut dyn GraphicsDevice) -> RenderResult<Self> {
        Self::new(
            device,
            quad_vertices(ScreenRect::FULL, ScreenRect::FULL),
            vec![0, 1, 2, 2, 3, 0],
            VertexLayout::new(&[2, 2]),
        )
    }

    /// Replace the vertex data, keeping the indices
    pub fn set_vertices(&mut self, device: &mut dyn GraphicsDevice, vertices: Vec<f32>) -> RenderResult<()> {
        check_vertices(&vertices, &self.layout)?;
        self.vertices.set_buf_data_and_upload(device, vertices)
    }

    /// Replace vertex and index data
    pub fn set_vertex_data(&mut self, device: &mut dyn GraphicsDevice, vertices: Vec<f32>, indices: Vec<u32>) -> RenderResult<()> {
        self.set_vertices(device, vertices)?;
        self.indices.set_buf_data_and_upload(device, indices)
    }

    /// Attribute layout
    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Whole vertices held
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.layout.stride().max(1) as usize
    }

    /// Indices drawn per call
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Delete both buffer objects
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        self.vertices.destroy(device);
        self.indices.destroy(device);
    }
}

impl Drawable for Mesh {
    fn draw(&self, frame: &mut DrawContext<'_>) -> RenderResult<()> {
        frame.device().draw_elements(&DrawCall {
            vertex_buffer: self.vertices.id(),
            index_buffer: self.indices.id(),
            layout: &self.layout,
            index_count: self.index_count(),
        })
    }
}

fn check_vertices(vertices: &[f32], layout: &VertexLayout) -> RenderResult<()> {
    let stride = layout.stride() as usize;
    if stride == 0 {
        return Err(RenderError::InvalidLayout("vertex layout has no attributes".to_string()));
    }
    if vertices.len() % stride != 0 {
        return Err(RenderError::LengthMismatch {
            expected: vertices.len().div_ceil(stride) * stride,
            actual: vertices.len(),
        });
    }
    Ok(())
}

/// Region of the screen in fractions, `(0, 0)` upper left, `(1, 1)` lower right
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    /// Upper-left corner
    pub start: [f32; 2],
    /// Lower-right corner
    pub end: [f32; 2],
}

impl ScreenRect {
    /// The whole screen
    pub const FULL: Self = Self {
        start: [0.0, 0.0],
        end: [1.0, 1.0],
    };

    /// Region between two corners
    pub const fn new(start: [f32; 2], end: [f32; 2]) -> Self {
        Self { start, end }
    }
}

/// Quad vertices covering `region` and sampling `uv`
///
/// Vertex order is upper left, lower left, lower right, upper right.
pub fn quad_vertices(region: ScreenRect, uv: ScreenRect) -> Vec<f32> {
    let (left, right) = (region.start[0] * 2.0 - 1.0, region.end[0] * 2.0 - 1.0);
    let (top, bottom) = (1.0 - region.start[1] * 2.0, 1.0 - region.end[1] * 2.0);
    let (u0, u1) = (uv.start[0], uv.end[0]);
    let (v0, v1) = (1.0 - uv.start[1], 1.0 - uv.end[1]);
    vec![
        left, top, u0, v0, //
        left, bottom, u0, v1, //
        right, bottom, u1, v1, //
        right, top, u1, v0,
    ]
}

/// Texture bound to a unit while drawing, or a unit to clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    /// Texture, `None` unbinds the unit
    pub texture: Option<TextureId>,
    /// Texture unit
    pub unit: u32,
}

/// Texture bindings applied before a mesh draws
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Material {
    textures: Vec<TextureBinding>,
}

impl Material {
    /// Material from texture and unit pairs
    pub fn new(textures: impl IntoIterator<Item = (TextureId, u32)>) -> Self {
        Self {
            textures: textures
                .into_iter()
                .map(|(texture, unit)| TextureBinding {
                    texture: Some(texture),
                    unit,
                })
                .collect(),
        }
    }

    /// Also clear `unit` when the material is used
    #[must_use]
    pub fn unbinding(mut self, unit: u32) -> Self {
        self.textures.push(TextureBinding { texture: None, unit });
        self
    }

    /// Bindings in application order
    pub fn textures(&self) -> &[TextureBinding] {
        &self.textures
    }

    /// Bind every texture to its unit
    pub fn use_material(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        for binding in &self.textures {
            device.bind_texture(binding.unit, binding.texture)?;
        }
        Ok(())
    }
}

/// A mesh drawn with a material
#[derive(Debug, Clone)]
pub struct RenderCompound {
    /// Shared mesh
    pub mesh: Rc<Mesh>,
    /// Texture bindings
    pub material: Material,
}

impl RenderCompound {
    /// Pair a mesh with a material
    pub fn new(mesh: Rc<Mesh>, material: Material) -> Self {
        Self { mesh, material }
    }
}

impl Drawable for RenderCompound {
    fn draw(&self, frame: &mut DrawContext<'_>) -> RenderResult<()> {
        self.material.use_material(frame.device())?;
        self.mesh.draw(frame)
    }
}

/// Compounds placed in the world by one matrix
#[derive(Debug)]
pub struct SceneNode {
    model: Cell<Mat4>,
    compounds: Vec<RenderCompound>,
}

impl SceneNode {
    /// Node at `model` drawing `compounds`
    pub fn new(model: Mat4, compounds: Vec<RenderCompound>) -> Self {
        Self {
            model: Cell::new(model),
            compounds,
        }
    }

    /// World matrix
    pub fn model(&self) -> Mat4 {
        self.model.get()
    }

    /// Move the node; takes effect on its next draw
    pub fn set_model(&self, model: Mat4) {
        self.model.set(model);
    }
}

impl Drawable for SceneNode {
    fn draw(&self, frame: &mut DrawContext<'_>) -> RenderResult<()> {
        frame.node_drawn(&self.model.get())?;
        for compound in &self.compounds {
            compound.draw(frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    #[test]
    fn test_full_quad_matches_screen_corners() {
        let vertices = quad_vertices(ScreenRect::FULL, ScreenRect::FULL);
        assert_eq!(vertices, [
            -1.0, 1.0, 0.0, 1.0, //
            -1.0, -1.0, 0.0, 0.0, //
            1.0, -1.0, 1.0, 0.0, //
            1.0, 1.0, 1.0, 1.0,
        ]);
    }

    #[test]
    fn test_quad_region_is_moved() {
        let vertices = quad_vertices(ScreenRect::new([0.5, 0.0], [1.0, 0.5]), ScreenRect::FULL);
        // upper left corner of the upper-right quarter
        assert_eq!(&vertices[..2], &[0.0, 1.0]);
        // lower right corner
        assert_eq!(&vertices[8..10], &[1.0, 0.0]);
    }

    #[test]
    fn test_partial_vertex_rejected() {
        let mut device = HeadlessDevice::new();
        let result = Mesh::new(&mut device, vec![0.0; 7], vec![0], VertexLayout::new(&[3, 2]));
        assert!(matches!(result, Err(RenderError::LengthMismatch { expected: 10, actual: 7 })));
    }

    #[test]
    fn test_screen_quad_buffers() {
        let mut device = HeadlessDevice::new();
        let quad = Mesh::screen_quad(&mut device).unwrap();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_count(), 6);
        assert_eq!(device.live_buffers(), 2);
    }
}
