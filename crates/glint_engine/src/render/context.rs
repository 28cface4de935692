//! Render context
//!
//! Owns the graphics device together with the two process-wide registries
//! of the renderer: the binding-point pool and the dependency factory table.
//! Everything that talks to the GPU borrows it explicitly.

use std::rc::Rc;

use crate::core::RendererConfig;
use crate::render::binding::BindingPointAllocator;
use crate::render::dependency::{DependencyRegistry, RendererDependency};
use crate::render::device::{BlockKind, GraphicsDevice};
use crate::render::mesh::Mesh;
use crate::render::RenderResult;

/// Device plus shared renderer registries
pub struct RenderContext {
    device: Box<dyn GraphicsDevice>,
    bindings: BindingPointAllocator,
    registry: DependencyRegistry,
    config: RendererConfig,
    screen_quad: Option<Rc<Mesh>>,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("bindings", &self.bindings)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    /// Context with the built-in dependencies registered
    pub fn new(device: Box<dyn GraphicsDevice>, config: RendererConfig) -> Self {
        Self::with_registry(device, config, DependencyRegistry::with_builtins())
    }

    /// Context with a custom dependency table
    pub fn with_registry(mut device: Box<dyn GraphicsDevice>, config: RendererConfig, registry: DependencyRegistry) -> Self {
        let bindings = match config.binding_point_capacity {
            Some(capacity) => BindingPointAllocator::with_capacity(capacity),
            None => BindingPointAllocator::new(),
        };
        device.clear_color(config.clear_color);
        log::info!("Render context created at {}x{}", config.width, config.height);
        Self {
            device,
            bindings,
            registry,
            config,
            screen_quad: None,
        }
    }

    /// Graphics device
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// Graphics device, mutably
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    /// Concrete device, when it is a `T`
    pub fn device_as<T: 'static>(&self) -> Option<&T> {
        self.device.as_any().downcast_ref()
    }

    /// Concrete device, mutably
    pub fn device_as_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.device.as_any_mut().downcast_mut()
    }

    /// Binding-point pool
    pub fn bindings(&self) -> &BindingPointAllocator {
        &self.bindings
    }

    /// Binding-point pool, mutably
    pub fn bindings_mut(&mut self) -> &mut BindingPointAllocator {
        &mut self.bindings
    }

    /// Dependency factories
    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    /// Dependency factories, mutably
    pub fn registry_mut(&mut self) -> &mut DependencyRegistry {
        &mut self.registry
    }

    /// Renderer settings
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Build a dependency through the registry, leasing its binding point
    pub fn create_dependency(&mut self, name: &str, kind: BlockKind) -> RenderResult<Box<dyn RendererDependency>> {
        self.registry
            .create(name, self.device.as_mut(), &mut self.bindings, kind)
    }

    /// Full-screen quad shared by every screen-space pass
    pub fn screen_quad(&mut self) -> RenderResult<Rc<Mesh>> {
        if let Some(quad) = &self.screen_quad {
            return Ok(Rc::clone(quad));
        }
        let quad = Rc::new(Mesh::screen_quad(self.device.as_mut())?);
        self.screen_quad = Some(Rc::clone(&quad));
        Ok(quad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    #[test]
    fn test_capacity_override_reaches_pool() {
        let config = RendererConfig {
            binding_point_capacity: Some(4),
            ..RendererConfig::default()
        };
        let ctx = RenderContext::new(Box::new(HeadlessDevice::new()), config);
        assert_eq!(ctx.bindings().capacity(BlockKind::Uniform), Some(4));
    }

    #[test]
    fn test_clear_color_applied() {
        let config = RendererConfig {
            clear_color: [0.2, 0.3, 0.4, 1.0],
            ..RendererConfig::default()
        };
        let ctx = RenderContext::new(Box::new(HeadlessDevice::new()), config);
        let device = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(device.current_clear_color(), [0.2, 0.3, 0.4, 1.0]);
    }

    #[test]
    fn test_screen_quad_is_shared() {
        let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default());
        let first = ctx.screen_quad().unwrap();
        let second = ctx.screen_quad().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(ctx.device_as::<HeadlessDevice>().unwrap().live_buffers(), 2);
    }
}
