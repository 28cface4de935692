//! Structured buffers
//!
//! [`StructuredBuffer`] holds exactly one frame of a [`StructLayout`];
//! [`StructuredArrayBuffer`] holds a header followed by any number of whole
//! frames. When the header has room, its first element carries the frame
//! count as the bit pattern of an `i32`, which is what a shader-side
//! `int count;` reads.

use crate::render::buffer::{FieldSpec, GpuBuffer, StructLayout};
use crate::render::device::{BlockKind, BufferUsage, GraphicsDevice};
use crate::render::{RenderError, RenderResult};

/// A buffer of exactly one structure instance
#[derive(Debug)]
pub struct StructuredBuffer {
    layout: StructLayout,
    buffer: GpuBuffer<f32>,
}

impl StructuredBuffer {
    /// Create a zeroed single-frame buffer backing `kind` blocks
    pub fn new(
        device: &mut dyn GraphicsDevice,
        name: &str,
        fields: impl IntoIterator<Item = FieldSpec>,
        kind: BlockKind,
        usage: BufferUsage,
    ) -> RenderResult<Self> {
        let layout = StructLayout::new(name, fields, 0)?;
        let buffer = GpuBuffer::zeroed(device, kind.target(), usage, layout.struct_len())?;
        Ok(Self { layout, buffer })
    }

    /// Compiled layout
    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    /// Backing buffer
    pub fn buffer(&self) -> &GpuBuffer<f32> {
        &self.buffer
    }

    /// Backing buffer, mutably
    pub fn buffer_mut(&mut self) -> &mut GpuBuffer<f32> {
        &mut self.buffer
    }

    /// Whether a named field exists
    pub fn has_field(&self, name: &str) -> bool {
        self.layout.has_field(name)
    }

    /// Read a field
    pub fn get(&self, name: &str) -> RenderResult<&[f32]> {
        let range = self.layout.get_value_pointers(name, 0)?;
        self.buffer.get_chunk(range.start, range.end)
    }

    /// Write a field; marks the buffer dirty
    pub fn set(&mut self, name: &str, values: &[f32]) -> RenderResult<()> {
        let range = self.layout.get_value_pointers(name, 0)?;
        self.buffer.set_chunk(range.start, range.end, values)
    }

    /// Register a field discovered at runtime, growing the buffer to hold it
    pub fn add_elem(&mut self, name: &str, offset: usize, len: usize) {
        self.layout.add_elem(name, offset, len);
        if offset + len > self.buffer.len() {
            self.buffer.resize(offset + len, true);
        }
    }

    /// Upload if dirty
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<bool> {
        self.buffer.upload(device)
    }

    /// Upload unconditionally
    pub fn force_upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.buffer.force_upload(device)
    }
}

/// A header followed by a growable run of frames
#[derive(Debug)]
pub struct StructuredArrayBuffer {
    layout: StructLayout,
    buffer: GpuBuffer<f32>,
}

impl StructuredArrayBuffer {
    /// Create a buffer holding only the zeroed header
    pub fn new(
        device: &mut dyn GraphicsDevice,
        name: &str,
        fields: impl IntoIterator<Item = FieldSpec>,
        struct_offset: usize,
        kind: BlockKind,
        usage: BufferUsage,
    ) -> RenderResult<Self> {
        let layout = StructLayout::new(name, fields, struct_offset)?;
        if layout.struct_len() == 0 {
            return Err(RenderError::InvalidLayout(format!("'{name}' has an empty frame")));
        }
        let buffer = GpuBuffer::zeroed(device, kind.target(), usage, struct_offset)?;
        Ok(Self { layout, buffer })
    }

    /// Compiled layout
    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    /// Backing buffer
    pub fn buffer(&self) -> &GpuBuffer<f32> {
        &self.buffer
    }

    /// Backing buffer, mutably
    pub fn buffer_mut(&mut self) -> &mut GpuBuffer<f32> {
        &mut self.buffer
    }

    /// Number of whole frames after the header
    pub fn frame_count(&self) -> usize {
        self.buffer.len().saturating_sub(self.layout.struct_offset()) / self.layout.struct_len()
    }

    /// Count stored in the header, if the header has room for one
    pub fn header_count(&self) -> Option<i32> {
        if self.layout.struct_offset() == 0 {
            return None;
        }
        self.buffer.data().first().map(|bits| bytemuck::cast(*bits))
    }

    fn sync_header(&mut self) -> RenderResult<()> {
        if self.layout.struct_offset() == 0 {
            return Ok(());
        }
        let count = i32::try_from(self.frame_count())
            .map_err(|_| RenderError::InvalidLayout(format!("'{}' holds too many frames", self.layout.name())))?;
        if self.header_count() != Some(count) {
            self.buffer.set_chunk(0, 1, &[bytemuck::cast(count)])?;
        }
        Ok(())
    }

    /// Append one frame built from named values and update the header count
    ///
    /// Returns the new frame's index. Nothing is uploaded.
    pub fn add_frame(&mut self, values: &[(&str, &[f32])]) -> RenderResult<usize> {
        let frame = self.layout.generate_frame(values)?;
        let index = self.frame_count();
        self.buffer.add_buf_data(&frame);
        self.sync_header()?;
        Ok(index)
    }

    /// Register a per-frame field discovered at runtime; the stride is kept
    ///
    /// Fails with [`RenderError::InvalidLayout`] when the range would reach
    /// into the next frame.
    pub fn add_elem(&mut self, name: &str, offset: usize, len: usize) -> RenderResult<()> {
        self.layout.add_frame_elem(name, offset, len)
    }

    /// Read-only view of a frame
    pub fn frame(&self, index: usize) -> RenderResult<FrameRef<'_>> {
        self.check_frame(index)?;
        Ok(FrameRef { array: self, index })
    }

    /// Mutable view of a frame
    pub fn frame_mut(&mut self, index: usize) -> RenderResult<FrameMut<'_>> {
        self.check_frame(index)?;
        Ok(FrameMut { array: self, index })
    }

    fn check_frame(&self, index: usize) -> RenderResult<()> {
        let count = self.frame_count();
        if index >= count {
            return Err(RenderError::OutOfRange {
                start: index,
                end: index + 1,
                len: count,
            });
        }
        Ok(())
    }

    fn get(&self, index: usize, name: &str) -> RenderResult<&[f32]> {
        let range = self.layout.get_value_pointers(name, index)?;
        self.buffer.get_chunk(range.start, range.end)
    }

    fn set(&mut self, index: usize, name: &str, values: &[f32]) -> RenderResult<()> {
        let range = self.layout.get_value_pointers(name, index)?;
        self.buffer.set_chunk(range.start, range.end, values)
    }

    /// Re-synchronize the header count, then upload if dirty
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<bool> {
        self.sync_header()?;
        self.buffer.upload(device)
    }

    /// Re-synchronize the header count, then upload unconditionally
    pub fn force_upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.sync_header()?;
        self.buffer.force_upload(device)
    }

    /// Upload exactly the elements of one frame
    pub fn upload_frame(&self, device: &mut dyn GraphicsDevice, index: usize) -> RenderResult<()> {
        self.check_frame(index)?;
        let (start, stride) = self.layout.get_frame_pointer(index);
        self.buffer.chunk_upload(device, start, stride)
    }
}

/// Read-only view of one frame of a [`StructuredArrayBuffer`]
#[derive(Debug, Clone, Copy)]
pub struct FrameRef<'a> {
    array: &'a StructuredArrayBuffer,
    index: usize,
}

impl<'a> FrameRef<'a> {
    /// Frame index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Read a field of this frame
    pub fn get(&self, name: &str) -> RenderResult<&'a [f32]> {
        self.array.get(self.index, name)
    }
}

/// Mutable view of one frame of a [`StructuredArrayBuffer`]
#[derive(Debug)]
pub struct FrameMut<'a> {
    array: &'a mut StructuredArrayBuffer,
    index: usize,
}

impl FrameMut<'_> {
    /// Frame index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Read a field of this frame
    pub fn get(&self, name: &str) -> RenderResult<&[f32]> {
        self.array.get(self.index, name)
    }

    /// Write a field of this frame
    pub fn set(&mut self, name: &str, values: &[f32]) -> RenderResult<()> {
        self.array.set(self.index, name, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    fn lights(device: &mut HeadlessDevice) -> StructuredArrayBuffer {
        StructuredArrayBuffer::new(
            device,
            "Lights",
            [FieldSpec::new("color", 3), FieldSpec::new("intensity", 1)],
            4,
            BlockKind::Storage,
            BufferUsage::Dynamic,
        )
        .unwrap()
    }

    #[test]
    fn test_frames_follow_header() {
        let mut device = HeadlessDevice::new();
        let mut array = lights(&mut device);
        array.add_frame(&[("color", &[0.0, 0.0, 1.0])]).unwrap();
        array.add_frame(&[("color", &[1.0, 0.0, 0.0]), ("intensity", &[0.5])]).unwrap();
        array.add_frame(&[]).unwrap();

        assert_eq!(array.buffer().len(), 16);
        assert_eq!(array.frame_count(), 3);
        assert_eq!(array.header_count(), Some(3));
        assert_eq!(array.frame(1).unwrap().get("color").unwrap(), &[1.0, 0.0, 0.0]);
        assert_eq!(array.frame(1).unwrap().get("intensity").unwrap(), &[0.5]);
    }

    #[test]
    fn test_frame_out_of_range() {
        let mut device = HeadlessDevice::new();
        let array = lights(&mut device);
        assert!(matches!(array.frame(0), Err(RenderError::OutOfRange { .. })));
    }

    #[test]
    fn test_upload_frame_writes_one_frame() {
        let mut device = HeadlessDevice::new();
        let mut array = lights(&mut device);
        array.add_frame(&[]).unwrap();
        array.add_frame(&[]).unwrap();
        array.force_upload(&mut device).unwrap();

        array.frame_mut(1).unwrap().set("intensity", &[3.0]).unwrap();
        array.upload_frame(&mut device, 1).unwrap();

        let on_device = device.buffer_f32(array.buffer().id()).unwrap();
        assert_eq!(on_device[11], 3.0);
        assert_eq!(
            device.commands().last(),
            Some(&crate::render::device::DeviceCommand::BufferSubData {
                buffer: array.buffer().id(),
                byte_offset: 32,
                bytes: 16,
            })
        );
    }

    #[test]
    fn test_header_count_is_int_bits() {
        let mut device = HeadlessDevice::new();
        let mut array = lights(&mut device);
        array.add_frame(&[]).unwrap();
        array.force_upload(&mut device).unwrap();
        let bytes = device.buffer_contents(array.buffer().id()).unwrap();
        assert_eq!(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 1);
    }

    #[test]
    fn test_single_instance_add_elem_grows() {
        let mut device = HeadlessDevice::new();
        let mut single = StructuredBuffer::new(&mut device, "Single", Vec::new(), BlockKind::Uniform, BufferUsage::Dynamic).unwrap();
        single.add_elem("model", 16, 16);
        assert_eq!(single.buffer().len(), 32);
        single.set("model", &[1.0; 16]).unwrap();
        assert_eq!(single.get("model").unwrap()[15], 1.0);
        assert!(single.upload(&mut device).unwrap());
    }

    #[test]
    fn test_array_field_cannot_reach_next_frame() {
        let mut device = HeadlessDevice::new();
        let mut array = lights(&mut device);
        array.add_frame(&[]).unwrap();
        array.add_frame(&[("color", &[0.2, 0.4, 0.6])]).unwrap();

        assert!(matches!(array.add_elem("wide", 2, 4), Err(RenderError::InvalidLayout(_))));
        assert!(array.frame_mut(0).unwrap().set("wide", &[9.0; 4]).is_err());
        assert_eq!(array.frame(1).unwrap().get("color").unwrap(), &[0.2, 0.4, 0.6]);

        array.add_elem("tail", 2, 2).unwrap();
        array.frame_mut(0).unwrap().set("tail", &[7.0, 7.0]).unwrap();
        assert_eq!(array.frame(1).unwrap().get("color").unwrap(), &[0.2, 0.4, 0.6]);
        assert_eq!(array.frame(0).unwrap().get("intensity").unwrap(), &[7.0]);
    }
}
