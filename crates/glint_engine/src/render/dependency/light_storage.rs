//! Light arrays with a count header
//!
//! Each light kind maps to one frame of a [`StructuredArrayBuffer`]. Adding
//! a light appends a frame and uploads the whole buffer (the header count
//! changed); updating a light rewrites its frame and uploads only that
//! frame's range.

use std::fmt;
use std::marker::PhantomData;

use slotmap::SecondaryMap;

use super::{DependencyBuffer, DependencyBufferMut, RendererDependency};
use crate::render::binding::BindingPointAllocator;
use crate::render::buffer::{FieldSpec, StructuredArrayBuffer};
use crate::render::device::{BlockKind, BufferUsage, GraphicsDevice};
use crate::render::{RenderError, RenderResult};
use crate::scene::{LightId, SceneEvent, SceneEventKind, SceneLight};

const SUBSCRIPTIONS: &[SceneEventKind] = &[SceneEventKind::ComponentAdded, SceneEventKind::LightUpdated];

/// Header elements in front of the first frame; element 0 holds the count
pub const LIGHT_HEADER_LEN: usize = 4;

/// A light kind that can be stored as one buffer frame
pub trait StoredLight: fmt::Debug + 'static {
    /// Block name served
    const NAME: &'static str;

    /// Frame fields, padding included
    fn fields() -> Vec<FieldSpec>;

    /// The light of this kind, if `light` is one
    fn select(light: &SceneLight) -> Option<&Self>;

    /// Field values of one frame
    fn frame_values(&self) -> Vec<(&'static str, Vec<f32>)>;
}

/// Dependency storing every light of one kind
#[derive(Debug)]
pub struct LightStorage<L: StoredLight> {
    array: StructuredArrayBuffer,
    kind: BlockKind,
    binding_point: u32,
    frames: SecondaryMap<LightId, usize>,
    marker: PhantomData<fn() -> L>,
}

impl<L: StoredLight> LightStorage<L> {
    /// Block name served
    pub const NAME: &'static str = L::NAME;

    /// Create the empty array and lease a binding point for it
    pub fn new(device: &mut dyn GraphicsDevice, bindings: &mut BindingPointAllocator, kind: BlockKind) -> RenderResult<Self> {
        let array = StructuredArrayBuffer::new(device, L::NAME, L::fields(), LIGHT_HEADER_LEN, kind, BufferUsage::Dynamic)?;
        let binding_point = bindings.take_point(device, array.buffer(), kind)?;
        log::info!("{} bound to point {binding_point} as {}", L::NAME, kind.suffix());
        Ok(Self {
            array,
            kind,
            binding_point,
            frames: SecondaryMap::new(),
            marker: PhantomData,
        })
    }

    /// Stored array
    pub fn array(&self) -> &StructuredArrayBuffer {
        &self.array
    }

    /// Frame index of a stored light
    pub fn frame_of(&self, id: LightId) -> Option<usize> {
        self.frames.get(id).copied()
    }

    /// Number of stored lights
    pub fn light_count(&self) -> usize {
        self.array.frame_count()
    }

    /// Values stored for a light, by field name
    pub fn stored(&self, id: LightId, field: &str) -> RenderResult<&[f32]> {
        let index = self.frame_of(id).ok_or_else(|| RenderError::UnknownField {
            buffer: L::NAME.to_string(),
            field: format!("light frame for {id:?}"),
        })?;
        self.array.frame(index)?.get(field)
    }

    fn add(&mut self, device: &mut dyn GraphicsDevice, id: LightId, light: &L) -> RenderResult<()> {
        let values = light.frame_values();
        let values: Vec<(&str, &[f32])> = values.iter().map(|(name, value)| (*name, value.as_slice())).collect();
        let index = self.array.add_frame(&values)?;
        self.array.force_upload(device)?;
        self.frames.insert(id, index);
        log::debug!("{} stored light in frame {index}", L::NAME);
        Ok(())
    }

    fn update(&mut self, device: &mut dyn GraphicsDevice, id: LightId, light: &L) -> RenderResult<()> {
        let Some(index) = self.frame_of(id) else {
            return self.add(device, id, light);
        };
        let mut frame = self.array.frame_mut(index)?;
        for (name, value) in light.frame_values() {
            frame.set(name, &value)?;
        }
        self.array.upload_frame(device, index)
    }
}

impl<L: StoredLight> RendererDependency for LightStorage<L> {
    fn name(&self) -> &'static str {
        L::NAME
    }

    fn kind(&self) -> BlockKind {
        self.kind
    }

    fn binding_point(&self) -> u32 {
        self.binding_point
    }

    fn buffer(&self) -> DependencyBuffer<'_> {
        DependencyBuffer::Array(&self.array)
    }

    fn buffer_mut(&mut self) -> DependencyBufferMut<'_> {
        DependencyBufferMut::Array(&mut self.array)
    }

    fn subscriptions(&self) -> &[SceneEventKind] {
        SUBSCRIPTIONS
    }

    // Frames follow the fixed layout; storage blocks report no members
    fn add_setter(&mut self, _name: &str, _offset: usize, _size: usize) -> RenderResult<()> {
        Ok(())
    }

    fn on_event(&mut self, device: &mut dyn GraphicsDevice, event: &SceneEvent) -> RenderResult<()> {
        match event {
            SceneEvent::ComponentAdded { id, light } => match L::select(light) {
                Some(light) => self.add(device, *id, light),
                None => Ok(()),
            },
            SceneEvent::LightUpdated { id, light } => match L::select(light) {
                Some(light) => self.update(device, *id, light),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
