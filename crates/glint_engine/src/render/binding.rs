//! Binding-point allocator
//!
//! Uniform and storage blocks meet their buffers at indexed binding points.
//! Each block kind draws from its own finite pool, sized once from that
//! kind's device limit (capped by a configured override) the first time a
//! point of that kind is requested.

use crate::render::device::{BlockKind, BufferId, GraphicsDevice};
use crate::render::{RenderError, RenderResult};

/// A buffer that can be attached to an indexed binding point
pub trait BindableBuffer {
    /// Device handle of the buffer
    fn buffer_id(&self) -> BufferId;

    /// Attach the buffer to binding point `index`
    fn bind_base(&self, device: &mut dyn GraphicsDevice, index: u32) -> RenderResult<()>;
}

type Slots = Option<Vec<Option<BufferId>>>;

/// Lease tables of uniform and storage binding points
#[derive(Debug, Default)]
pub struct BindingPointAllocator {
    capacity_override: Option<u32>,
    uniform: Slots,
    storage: Slots,
}

impl BindingPointAllocator {
    /// Allocator sized from the device limits on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator whose pools hold at most `capacity` points each
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity_override: Some(capacity),
            ..Self::default()
        }
    }

    fn pool(&self, kind: BlockKind) -> &Slots {
        match kind {
            BlockKind::Uniform => &self.uniform,
            BlockKind::Storage => &self.storage,
        }
    }

    fn slots(&mut self, device: &dyn GraphicsDevice, kind: BlockKind) -> &mut Vec<Option<BufferId>> {
        let limit = match kind {
            BlockKind::Uniform => device.max_uniform_buffer_bindings(),
            BlockKind::Storage => device.max_storage_buffer_bindings(),
        };
        let capacity = self.capacity_override.map_or(limit, |cap| cap.min(limit));
        let pool = match kind {
            BlockKind::Uniform => &mut self.uniform,
            BlockKind::Storage => &mut self.storage,
        };
        pool.get_or_insert_with(|| {
            log::debug!("{kind:?} binding-point pool sized to {capacity}");
            vec![None; capacity as usize]
        })
    }

    /// Pool size for `kind`, once known
    pub fn capacity(&self, kind: BlockKind) -> Option<u32> {
        self.pool(kind)
            .as_ref()
            .map(|slots| slots.len() as u32)
            .or(self.capacity_override)
    }

    /// Number of leased points of `kind`
    pub fn leased(&self, kind: BlockKind) -> usize {
        self.pool(kind)
            .as_ref()
            .map_or(0, |slots| slots.iter().filter(|slot| slot.is_some()).count())
    }

    /// Number of leased points across both pools
    pub fn leased_count(&self) -> usize {
        self.leased(BlockKind::Uniform) + self.leased(BlockKind::Storage)
    }

    /// Buffer holding a binding point
    pub fn occupant(&self, kind: BlockKind, point: u32) -> Option<BufferId> {
        self.pool(kind).as_ref()?.get(point as usize).copied().flatten()
    }

    /// First free binding point of `kind`
    pub fn get_available_index(&mut self, device: &dyn GraphicsDevice, kind: BlockKind) -> RenderResult<u32> {
        let slots = self.slots(device, kind);
        slots
            .iter()
            .position(Option::is_none)
            .map(|index| index as u32)
            .ok_or(RenderError::BindingPointsExhausted {
                capacity: slots.len() as u32,
            })
    }

    /// Lease the first free point of `kind` to `buffer` and bind it there
    pub fn take_point(
        &mut self,
        device: &mut dyn GraphicsDevice,
        buffer: &dyn BindableBuffer,
        kind: BlockKind,
    ) -> RenderResult<u32> {
        let index = self.get_available_index(device, kind)?;
        buffer.bind_base(device, index)?;
        self.slots(device, kind)[index as usize] = Some(buffer.buffer_id());
        log::debug!("{kind:?} binding point {index} leased to buffer {}", buffer.buffer_id().0);
        Ok(index)
    }

    /// Return a point to its pool; releasing a free point is a no-op
    pub fn release(&mut self, kind: BlockKind, point: u32) {
        let pool = match kind {
            BlockKind::Uniform => &mut self.uniform,
            BlockKind::Storage => &mut self.storage,
        };
        if let Some(slot) = pool.as_mut().and_then(|slots| slots.get_mut(point as usize)) {
            if let Some(buffer) = slot.take() {
                log::debug!("{kind:?} binding point {point} released by buffer {}", buffer.0);
            }
        }
    }
}
