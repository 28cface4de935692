//! GPU buffer abstraction
//!
//! [`GpuBuffer`] keeps a typed host copy of a buffer object and tracks
//! whether the device copy is stale. The host array is the source of truth:
//! mutations mark the buffer dirty, [`GpuBuffer::upload`] pushes only when
//! dirty, [`GpuBuffer::force_upload`] always pushes.
//!
//! ## Layout helpers
//!
//! - [`layout`]: field lists to element offsets ([`StructLayout`])
//! - [`structured`]: single-instance and growable array buffers built on a layout

pub mod layout;
pub mod structured;

use std::fmt;

use bytemuck::Pod;

pub use layout::{FieldAccessor, FieldSpec, StructLayout};
pub use structured::{FrameRef, StructuredArrayBuffer, StructuredBuffer};

use crate::render::binding::BindableBuffer;
use crate::render::device::{BufferId, BufferTarget, BufferUsage, GraphicsDevice};
use crate::render::{RenderError, RenderResult};

/// Element types a [`GpuBuffer`] can hold
pub trait BufferElement: Pod + Default + PartialEq + fmt::Debug + 'static {
    /// Name used in logs
    const NAME: &'static str;
}

impl BufferElement for f32 {
    const NAME: &'static str = "f32";
}

impl BufferElement for i32 {
    const NAME: &'static str = "i32";
}

impl BufferElement for u32 {
    const NAME: &'static str = "u32";
}

/// A host-mirrored buffer object
#[derive(Debug)]
pub struct GpuBuffer<T: BufferElement> {
    id: BufferId,
    target: BufferTarget,
    usage: BufferUsage,
    data: Vec<T>,
    dirty: bool,
}

impl<T: BufferElement> GpuBuffer<T> {
    /// Create the device object, bind it, and take ownership of `data`
    ///
    /// Nothing is uploaded yet; the buffer starts dirty.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        target: BufferTarget,
        usage: BufferUsage,
        data: Vec<T>,
    ) -> RenderResult<Self> {
        let id = device.create_buffer()?;
        device.bind_buffer(target, id)?;
        log::debug!(
            "Created {target:?} buffer {} with {} {} elements",
            id.0,
            data.len(),
            T::NAME
        );
        Ok(Self {
            id,
            target,
            usage,
            data,
            dirty: true,
        })
    }

    /// Create a zero-filled buffer of `len` elements
    pub fn zeroed(
        device: &mut dyn GraphicsDevice,
        target: BufferTarget,
        usage: BufferUsage,
        len: usize,
    ) -> RenderResult<Self> {
        Self::new(device, target, usage, vec![T::default(); len])
    }

    /// Device handle
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Binding target
    pub fn target(&self) -> BufferTarget {
        self.target
    }

    /// Usage hint
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Length in elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the host array is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size in bytes
    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    /// Host contents
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Host contents as bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Whether the device copy is stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bind the buffer to its target
    pub fn use_buffer(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        device.bind_buffer(self.target, self.id)
    }

    /// Push the host array if it changed since the last sync
    ///
    /// Returns whether a device write happened.
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.force_upload(device)?;
        Ok(true)
    }

    /// Push the whole host array unconditionally
    pub fn force_upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.use_buffer(device)?;
        device.buffer_data(self.target, bytemuck::cast_slice(&self.data), self.usage)?;
        self.dirty = false;
        Ok(())
    }

    /// Pull the device contents into the host array
    pub fn download(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.use_buffer(device)?;
        device.get_buffer_sub_data(self.target, 0, bytemuck::cast_slice_mut(&mut self.data))?;
        self.dirty = false;
        Ok(())
    }

    /// Upload `count` elements starting at element `offset`
    ///
    /// Only that range reaches the device; the dirty flag is untouched.
    pub fn chunk_upload(&self, device: &mut dyn GraphicsDevice, offset: usize, count: usize) -> RenderResult<()> {
        let chunk = self.get_chunk(offset, offset + count)?;
        self.use_buffer(device)?;
        device.buffer_sub_data(
            self.target,
            offset * std::mem::size_of::<T>(),
            bytemuck::cast_slice(chunk),
        )
    }

    /// Upload raw bytes at a byte offset of the device store
    pub fn sub_upload(&self, device: &mut dyn GraphicsDevice, byte_offset: usize, bytes: &[u8]) -> RenderResult<()> {
        self.use_buffer(device)?;
        device.buffer_sub_data(self.target, byte_offset, bytes)
    }

    /// Attach the buffer to an indexed binding point of its target
    pub fn bind_to_block(&self, device: &mut dyn GraphicsDevice, index: u32) -> RenderResult<()> {
        device.bind_buffer_base(self.target, index, self.id)
    }

    /// Replace the host contents
    pub fn set_buf_data(&mut self, data: Vec<T>) {
        self.data = data;
        self.dirty = true;
    }

    /// Replace the host contents and upload them
    pub fn set_buf_data_and_upload(&mut self, device: &mut dyn GraphicsDevice, data: Vec<T>) -> RenderResult<()> {
        self.set_buf_data(data);
        self.force_upload(device)
    }

    /// Append to the host contents
    pub fn add_buf_data(&mut self, data: &[T]) {
        self.data.extend_from_slice(data);
        self.dirty = true;
    }

    /// Append to the host contents and upload the whole buffer
    pub fn add_buf_data_and_upload(&mut self, device: &mut dyn GraphicsDevice, data: &[T]) -> RenderResult<()> {
        self.add_buf_data(data);
        self.force_upload(device)
    }

    fn check_range(&self, start: usize, stop: usize) -> RenderResult<()> {
        if start > stop || stop > self.data.len() {
            return Err(RenderError::OutOfRange {
                start,
                end: stop,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    /// Host elements `start..stop`
    pub fn get_chunk(&self, start: usize, stop: usize) -> RenderResult<&[T]> {
        self.check_range(start, stop)?;
        Ok(&self.data[start..stop])
    }

    /// Overwrite host elements `start..stop`
    pub fn set_chunk(&mut self, start: usize, stop: usize, values: &[T]) -> RenderResult<()> {
        self.check_range(start, stop)?;
        if values.len() != stop - start {
            return Err(RenderError::LengthMismatch {
                expected: stop - start,
                actual: values.len(),
            });
        }
        self.data[start..stop].copy_from_slice(values);
        self.dirty = true;
        Ok(())
    }

    /// Grow or shrink the host array to `size` elements
    ///
    /// New elements are zero with `zero_fill`; otherwise they repeat the
    /// existing contents cyclically. Nothing is uploaded.
    pub fn resize(&mut self, size: usize, zero_fill: bool) {
        let old = self.data.len();
        if size <= old {
            self.data.truncate(size);
        } else if zero_fill || old == 0 {
            self.data.resize(size, T::default());
        } else {
            let tail: Vec<T> = self.data.iter().copied().cycle().take(size - old).collect();
            self.data.extend(tail);
        }
        self.dirty = true;
    }

    /// Delete the device object
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        log::debug!("Deleting buffer {}", self.id.0);
        device.delete_buffer(self.id);
    }
}

impl<T: BufferElement> BindableBuffer for GpuBuffer<T> {
    fn buffer_id(&self) -> BufferId {
        self.id
    }

    fn bind_base(&self, device: &mut dyn GraphicsDevice, index: u32) -> RenderResult<()> {
        self.bind_to_block(device, index)
    }
}

/// A buffer of `u32` atomic counters
#[derive(Debug)]
pub struct AtomicCounterBuffer {
    buffer: GpuBuffer<u32>,
}

impl AtomicCounterBuffer {
    /// Create `counters` zeroed counters and upload them
    pub fn new(device: &mut dyn GraphicsDevice, counters: usize) -> RenderResult<Self> {
        let mut buffer = GpuBuffer::zeroed(device, BufferTarget::AtomicCounter, BufferUsage::Dynamic, counters)?;
        buffer.force_upload(device)?;
        Ok(Self { buffer })
    }

    /// Zero every counter on the device
    pub fn reset(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let len = self.buffer.len();
        self.buffer.set_buf_data_and_upload(device, vec![0; len])
    }

    /// Read the counters back from the device
    pub fn read_counters(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<&[u32]> {
        self.buffer.download(device)?;
        Ok(self.buffer.data())
    }

    /// Attach to an atomic-counter binding point
    pub fn bind_to_block(&self, device: &mut dyn GraphicsDevice, index: u32) -> RenderResult<()> {
        self.buffer.bind_to_block(device, index)
    }

    /// Underlying buffer
    pub fn buffer(&self) -> &GpuBuffer<u32> {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    fn uniform_buffer(device: &mut HeadlessDevice, data: Vec<f32>) -> GpuBuffer<f32> {
        GpuBuffer::new(device, BufferTarget::Uniform, BufferUsage::Dynamic, data).unwrap()
    }

    #[test]
    fn test_upload_only_when_dirty() {
        let mut device = HeadlessDevice::new();
        let mut buffer = uniform_buffer(&mut device, vec![1.0, 2.0]);

        assert!(buffer.upload(&mut device).unwrap());
        assert!(!buffer.upload(&mut device).unwrap());
        assert_eq!(device.buffer_write_count(buffer.id()), 1);

        buffer.force_upload(&mut device).unwrap();
        buffer.force_upload(&mut device).unwrap();
        assert_eq!(device.buffer_write_count(buffer.id()), 3);
    }

    #[test]
    fn test_resize_zero_fill_keeps_prefix() {
        let mut device = HeadlessDevice::new();
        let mut buffer = uniform_buffer(&mut device, vec![1.0, 2.0, 3.0, 4.0]);
        buffer.resize(10, true);
        assert_eq!(buffer.len(), 10);
        assert_eq!(&buffer.data()[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert!(buffer.data()[4..].iter().all(|v| *v == 0.0));
        assert!(buffer.is_dirty());
        assert_eq!(device.buffer_write_count(buffer.id()), 0);
    }

    #[test]
    fn test_resize_without_zero_fill_repeats() {
        let mut device = HeadlessDevice::new();
        let mut buffer = GpuBuffer::new(&mut device, BufferTarget::Vertex, BufferUsage::Static, vec![1, 2, 3]).unwrap();
        buffer.resize(7, false);
        assert_eq!(buffer.data(), &[1, 2, 3, 1, 2, 3, 1]);
        buffer.resize(2, false);
        assert_eq!(buffer.data(), &[1, 2]);
    }

    #[test]
    fn test_chunk_access_checks_bounds() {
        let mut device = HeadlessDevice::new();
        let mut buffer = uniform_buffer(&mut device, vec![0.0; 4]);
        buffer.set_chunk(1, 3, &[5.0, 6.0]).unwrap();
        assert_eq!(buffer.get_chunk(0, 4).unwrap(), &[0.0, 5.0, 6.0, 0.0]);
        assert!(matches!(buffer.get_chunk(2, 5), Err(RenderError::OutOfRange { .. })));
        assert!(matches!(
            buffer.set_chunk(0, 2, &[1.0]),
            Err(RenderError::LengthMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_chunk_upload_writes_range_only() {
        let mut device = HeadlessDevice::new();
        let mut buffer = uniform_buffer(&mut device, vec![0.0; 4]);
        buffer.force_upload(&mut device).unwrap();
        buffer.set_chunk(2, 4, &[7.0, 8.0]).unwrap();
        buffer.chunk_upload(&mut device, 2, 2).unwrap();

        assert_eq!(device.buffer_f32(buffer.id()).unwrap(), vec![0.0, 0.0, 7.0, 8.0]);
        assert!(buffer.is_dirty());
        assert_eq!(
            device.commands().last(),
            Some(&crate::render::device::DeviceCommand::BufferSubData {
                buffer: buffer.id(),
                byte_offset: 8,
                bytes: 8
            })
        );
    }

    #[test]
    fn test_download_replaces_host_copy() {
        let mut device = HeadlessDevice::new();
        let mut buffer = uniform_buffer(&mut device, vec![1.0, 2.0]);
        buffer.force_upload(&mut device).unwrap();
        buffer.sub_upload(&mut device, 4, bytemuck::bytes_of(&9.0f32)).unwrap();
        buffer.download(&mut device).unwrap();
        assert_eq!(buffer.data(), &[1.0, 9.0]);
        assert!(!buffer.is_dirty());
    }

    #[test]
    fn test_atomic_counters_reset() {
        let mut device = HeadlessDevice::new();
        let mut counters = AtomicCounterBuffer::new(&mut device, 3).unwrap();
        counters.buffer.sub_upload(&mut device, 0, bytemuck::bytes_of(&5u32)).unwrap();
        assert_eq!(counters.read_counters(&mut device).unwrap(), &[5, 0, 0]);
        counters.reset(&mut device).unwrap();
        assert_eq!(counters.read_counters(&mut device).unwrap(), &[0, 0, 0]);
    }
}
