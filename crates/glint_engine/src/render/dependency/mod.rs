//! Renderer dependencies
//!
//! A dependency is the scene-side data source behind one shader block: it
//! owns a structured buffer, leases a binding point for it and keeps it
//! current by reacting to scene events. Stages never talk to dependencies
//! directly; [`crate::render::uniformed::UniformedRenderer::process_deps`]
//! looks them up by block name and routes the block to the dependency's
//! binding point.
//!
//! ## Built-ins
//!
//! - [`MvpMatrices`]: camera and model matrices (`MVPMatrices`)
//! - [`SpotLightStorage`]: spot lights with a count header (`SpotLightStorage`)
//! - [`AreaLightStorage`]: quad lights with a count header (`AreaLightStorage`)

mod area_lights;
mod light_storage;
mod mvp;
mod spot_lights;

use std::collections::HashMap;
use std::fmt;

pub use area_lights::AreaLightStorage;
pub use light_storage::{LightStorage, StoredLight};
pub use mvp::MvpMatrices;
pub use spot_lights::SpotLightStorage;

use crate::render::binding::BindingPointAllocator;
use crate::render::buffer::{GpuBuffer, StructuredArrayBuffer, StructuredBuffer};
use crate::render::device::{BlockKind, GraphicsDevice};
use crate::render::{RenderError, RenderResult};
use crate::scene::{SceneEvent, SceneEventKind};

/// Cache key of a dependency inside a scene: block name plus kind suffix
pub fn dependency_key(name: &str, kind: BlockKind) -> String {
    format!("{name}{}", kind.suffix())
}

/// Buffer owned by a dependency
#[derive(Debug, Clone, Copy)]
pub enum DependencyBuffer<'a> {
    /// One structure instance
    Single(&'a StructuredBuffer),
    /// Header plus a run of frames
    Array(&'a StructuredArrayBuffer),
}

impl<'a> DependencyBuffer<'a> {
    /// Backing buffer object
    pub fn gpu(self) -> &'a GpuBuffer<f32> {
        match self {
            Self::Single(buffer) => buffer.buffer(),
            Self::Array(buffer) => buffer.buffer(),
        }
    }
}

/// Buffer owned by a dependency, mutably
#[derive(Debug)]
pub enum DependencyBufferMut<'a> {
    /// One structure instance
    Single(&'a mut StructuredBuffer),
    /// Header plus a run of frames
    Array(&'a mut StructuredArrayBuffer),
}

impl DependencyBufferMut<'_> {
    /// Register a field discovered by introspection
    ///
    /// Single-instance buffers grow to cover the field. Array buffers keep
    /// their stride and reject fields that do not fit inside one frame.
    pub fn add_elem(self, name: &str, offset: usize, len: usize) -> RenderResult<()> {
        match self {
            Self::Single(buffer) => {
                buffer.add_elem(name, offset, len);
                Ok(())
            }
            Self::Array(buffer) => buffer.add_elem(name, offset, len),
        }
    }

    /// Upload if dirty
    pub fn upload(self, device: &mut dyn GraphicsDevice) -> RenderResult<bool> {
        match self {
            Self::Single(buffer) => buffer.upload(device),
            Self::Array(buffer) => buffer.upload(device),
        }
    }

    /// Upload unconditionally
    pub fn force_upload(self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        match self {
            Self::Single(buffer) => buffer.force_upload(device),
            Self::Array(buffer) => buffer.force_upload(device),
        }
    }
}

/// Scene-level data source behind a shader block
pub trait RendererDependency: fmt::Debug {
    /// Block name this dependency serves
    fn name(&self) -> &'static str;

    /// Block kind the buffer was created for
    fn kind(&self) -> BlockKind;

    /// Leased binding point
    fn binding_point(&self) -> u32;

    /// Bytes per buffer element
    fn element_size(&self) -> usize {
        std::mem::size_of::<f32>()
    }

    /// Owned buffer
    fn buffer(&self) -> DependencyBuffer<'_>;

    /// Owned buffer, mutably
    fn buffer_mut(&mut self) -> DependencyBufferMut<'_>;

    /// Event kinds delivered to [`RendererDependency::on_event`]
    fn subscriptions(&self) -> &[SceneEventKind];

    /// Register a block member reported by introspection
    ///
    /// `offset` and `size` are in buffer elements. The default registers a
    /// field accessor; single buffers grow to `offset + size`, array buffers
    /// reject fields wider than a frame.
    fn add_setter(&mut self, name: &str, offset: usize, size: usize) -> RenderResult<()> {
        self.buffer_mut().add_elem(name, offset, size)
    }

    /// React to a subscribed event
    fn on_event(&mut self, device: &mut dyn GraphicsDevice, event: &SceneEvent) -> RenderResult<()>;

    /// Upload pending host changes
    fn upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<bool> {
        self.buffer_mut().upload(device)
    }

    /// Return the binding point to the pool
    fn release(&self, bindings: &mut BindingPointAllocator) {
        bindings.release(self.kind(), self.binding_point());
    }
}

/// Builds a dependency for a block kind, leasing its binding point
pub type DependencyFactory = Box<
    dyn Fn(&mut dyn GraphicsDevice, &mut BindingPointAllocator, BlockKind) -> RenderResult<Box<dyn RendererDependency>>,
>;

/// Name to factory table
#[derive(Default)]
pub struct DependencyRegistry {
    factories: HashMap<String, DependencyFactory>,
}

impl fmt::Debug for DependencyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("DependencyRegistry").field("names", &names).finish()
    }
}

impl DependencyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in dependencies
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(MvpMatrices::NAME, |device, bindings, kind| {
            Ok(Box::new(MvpMatrices::new(device, bindings, kind)?))
        });
        registry.register(SpotLightStorage::NAME, |device, bindings, kind| {
            Ok(Box::new(SpotLightStorage::new(device, bindings, kind)?))
        });
        registry.register(AreaLightStorage::NAME, |device, bindings, kind| {
            Ok(Box::new(AreaLightStorage::new(device, bindings, kind)?))
        });
        registry
    }

    /// Register or replace the factory for a block name
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&mut dyn GraphicsDevice, &mut BindingPointAllocator, BlockKind) -> RenderResult<Box<dyn RendererDependency>>
            + 'static,
    {
        let name = name.into();
        log::debug!("Registered renderer dependency '{name}'");
        self.factories.insert(name, Box::new(factory));
    }

    /// Whether a block name has a factory
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered block names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the dependency for a block
    pub fn create(
        &self,
        name: &str,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingPointAllocator,
        kind: BlockKind,
    ) -> RenderResult<Box<dyn RendererDependency>> {
        let factory = self.factories.get(name).ok_or_else(|| RenderError::UnknownDependency {
            name: name.to_string(),
        })?;
        factory(device, bindings, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    #[test]
    fn test_key_appends_kind_suffix() {
        assert_eq!(dependency_key("MVPMatrices", BlockKind::Uniform), "MVPMatricesUBO");
        assert_eq!(dependency_key("SpotLightStorage", BlockKind::Storage), "SpotLightStorageSSBO");
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = DependencyRegistry::with_builtins();
        for name in ["MVPMatrices", "SpotLightStorage", "AreaLightStorage"] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert!(!registry.contains("Unregistered"));
    }

    #[test]
    fn test_unknown_name_fails() {
        let mut device = HeadlessDevice::new();
        let mut bindings = BindingPointAllocator::new();
        let registry = DependencyRegistry::new();
        assert!(matches!(
            registry.create("Fog", &mut device, &mut bindings, BlockKind::Uniform),
            Err(RenderError::UnknownDependency { name }) if name == "Fog"
        ));
    }

    #[test]
    fn test_create_leases_binding_point() {
        let mut device = HeadlessDevice::new();
        let mut bindings = BindingPointAllocator::new();
        let registry = DependencyRegistry::with_builtins();
        let mvp = registry
            .create("MVPMatrices", &mut device, &mut bindings, BlockKind::Uniform)
            .unwrap();
        assert_eq!(mvp.binding_point(), 0);
        assert_eq!(bindings.occupant(BlockKind::Uniform, 0), Some(mvp.buffer().gpu().id()));
        mvp.release(&mut bindings);
        assert_eq!(bindings.leased_count(), 0);
    }

    #[derive(Debug)]
    struct Fog {
        array: StructuredArrayBuffer,
    }

    impl RendererDependency for Fog {
        fn name(&self) -> &'static str {
            "Fog"
        }

        fn kind(&self) -> BlockKind {
            BlockKind::Storage
        }

        fn binding_point(&self) -> u32 {
            0
        }

        fn buffer(&self) -> DependencyBuffer<'_> {
            DependencyBuffer::Array(&self.array)
        }

        fn buffer_mut(&mut self) -> DependencyBufferMut<'_> {
            DependencyBufferMut::Array(&mut self.array)
        }

        fn subscriptions(&self) -> &[SceneEventKind] {
            &[]
        }

        fn on_event(&mut self, _device: &mut dyn GraphicsDevice, _event: &SceneEvent) -> RenderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_setter_rejects_field_wider_than_frame() {
        use crate::render::buffer::FieldSpec;
        use crate::render::device::BufferUsage;

        let mut device = HeadlessDevice::new();
        let fields = [FieldSpec::new("color", 3), FieldSpec::new("density", 1)];
        let array = StructuredArrayBuffer::new(&mut device, "Fog", fields, 4, BlockKind::Storage, BufferUsage::Dynamic)
            .unwrap();
        let mut fog = Fog { array };

        fog.add_setter("color_density", 0, 4).unwrap();
        assert!(matches!(
            fog.add_setter("wide", 2, 4),
            Err(RenderError::InvalidLayout(_))
        ));
    }
}
