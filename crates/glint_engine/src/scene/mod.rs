//! Render scene
//!
//! The renderer's view of a scene: the lights and active camera, static
//! data for plain uniforms, and the cache of renderer dependencies shared by
//! every stage drawing this scene.
//!
//! ## Event flow
//!
//! ```text
//! add_light / update_light / set_active_camera / node_drawn
//!      ↓
//! RenderScene::dispatch (synchronous, in dependency creation order)
//!      ↓
//! RendererDependency::on_event → buffer upload
//! ```
//!
//! Dependencies created after lights or a camera were added are brought up
//! to date by replaying the current state to them.

mod camera;
mod events;
mod light;

use std::collections::HashMap;

use slotmap::SlotMap;

pub use camera::CameraState;
pub use events::{SceneEvent, SceneEventKind};
pub use light::{AreaLight, LightId, SceneLight, SpotLight};

use crate::foundation::math::Mat4;
use crate::render::binding::BindingPointAllocator;
use crate::render::context::RenderContext;
use crate::render::dependency::{dependency_key, RendererDependency};
use crate::render::device::{BlockKind, GraphicsDevice};
use crate::render::types::UniformValue;
use crate::render::{RenderError, RenderResult};

/// Scene state consumed by the renderer
#[derive(Debug, Default)]
pub struct RenderScene {
    dependencies: HashMap<String, Box<dyn RendererDependency>>,
    order: Vec<String>,
    lights: SlotMap<LightId, SceneLight>,
    camera: Option<CameraState>,
    static_data: HashMap<String, UniformValue>,
}

impl RenderScene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every subscribed dependency
    pub fn dispatch(&mut self, device: &mut dyn GraphicsDevice, event: &SceneEvent) -> RenderResult<()> {
        let kind = event.kind();
        for key in &self.order {
            if let Some(dependency) = self.dependencies.get_mut(key) {
                if dependency.subscriptions().contains(&kind) {
                    dependency.on_event(device, event)?;
                }
            }
        }
        Ok(())
    }

    /// Register a light and announce it
    pub fn add_light(&mut self, device: &mut dyn GraphicsDevice, light: impl Into<SceneLight>) -> RenderResult<LightId> {
        let light = light.into();
        let id = self.lights.insert(light.clone());
        self.dispatch(device, &SceneEvent::ComponentAdded { id, light })?;
        Ok(id)
    }

    /// Replace a light's data and announce the change
    pub fn update_light(
        &mut self,
        device: &mut dyn GraphicsDevice,
        id: LightId,
        light: impl Into<SceneLight>,
    ) -> RenderResult<()> {
        let light = light.into();
        let slot = self.lights.get_mut(id).ok_or(RenderError::InvalidHandle {
            kind: "light",
            id: id_bits(id),
        })?;
        *slot = light.clone();
        self.dispatch(device, &SceneEvent::LightUpdated { id, light })
    }

    /// A registered light
    pub fn light(&self, id: LightId) -> Option<&SceneLight> {
        self.lights.get(id)
    }

    /// Every registered light
    pub fn lights(&self) -> impl Iterator<Item = (LightId, &SceneLight)> {
        self.lights.iter()
    }

    /// Make `camera` the active camera
    pub fn set_active_camera(&mut self, device: &mut dyn GraphicsDevice, camera: CameraState) -> RenderResult<()> {
        self.camera = Some(camera.clone());
        self.dispatch(device, &SceneEvent::CameraActivated(camera))
    }

    /// Change the active camera's placement or projection
    pub fn update_camera(&mut self, device: &mut dyn GraphicsDevice, camera: CameraState) -> RenderResult<()> {
        self.camera = Some(camera.clone());
        self.dispatch(device, &SceneEvent::CameraUpdated(camera))
    }

    /// Active camera
    pub fn camera(&self) -> Option<&CameraState> {
        self.camera.as_ref()
    }

    /// Announce that a node with this world matrix is being drawn
    pub fn node_drawn(&mut self, device: &mut dyn GraphicsDevice, model: &Mat4) -> RenderResult<()> {
        self.dispatch(device, &SceneEvent::NodeDrawn { model: *model })
    }

    /// Start a frame
    pub fn tick(&mut self, device: &mut dyn GraphicsDevice, delta: f32) -> RenderResult<()> {
        self.dispatch(device, &SceneEvent::Tick { delta })
    }

    /// Set the value applied to a plain uniform on every tick
    pub fn set_static_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.static_data.insert(name.into(), value.into());
    }

    /// Static value of a plain uniform
    pub fn static_uniform(&self, name: &str) -> Option<&UniformValue> {
        self.static_data.get(name)
    }

    /// Cached dependency by key (`name + kind suffix`)
    pub fn dependency(&self, key: &str) -> Option<&dyn RendererDependency> {
        self.dependencies.get(key).map(Box::as_ref)
    }

    /// Cached dependency keys in creation order
    pub fn dependency_keys(&self) -> &[String] {
        &self.order
    }

    /// Cached dependency for a block, built through the context's registry
    /// on first request
    pub fn get_or_create_dependency(
        &mut self,
        ctx: &mut RenderContext,
        name: &str,
        kind: BlockKind,
    ) -> RenderResult<&mut dyn RendererDependency> {
        let key = dependency_key(name, kind);
        if !self.dependencies.contains_key(&key) {
            let mut dependency = ctx.create_dependency(name, kind)?;
            self.replay(ctx.device_mut(), dependency.as_mut())?;
            log::info!("Scene created dependency '{key}' on binding point {}", dependency.binding_point());
            self.order.push(key.clone());
            self.dependencies.insert(key.clone(), dependency);
        }
        match self.dependencies.get_mut(&key) {
            Some(dependency) => Ok(dependency.as_mut()),
            None => Err(RenderError::UnknownDependency { name: key }),
        }
    }

    fn replay(&self, device: &mut dyn GraphicsDevice, dependency: &mut dyn RendererDependency) -> RenderResult<()> {
        let subscriptions = dependency.subscriptions().to_vec();
        if subscriptions.contains(&SceneEventKind::ComponentAdded) {
            for (id, light) in &self.lights {
                let event = SceneEvent::ComponentAdded {
                    id,
                    light: light.clone(),
                };
                dependency.on_event(device, &event)?;
            }
        }
        if let Some(camera) = &self.camera {
            if subscriptions.contains(&SceneEventKind::CameraActivated) {
                dependency.on_event(device, &SceneEvent::CameraActivated(camera.clone()))?;
            }
        }
        Ok(())
    }

    /// Return every dependency's binding point and drop the cache
    pub fn release(&mut self, bindings: &mut BindingPointAllocator) {
        for key in self.order.drain(..) {
            if let Some(dependency) = self.dependencies.remove(&key) {
                dependency.release(bindings);
            }
        }
    }
}

fn id_bits(id: LightId) -> u64 {
    use slotmap::Key;
    id.data().as_ffi()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RendererConfig;
    use crate::foundation::math::Vec3;
    use crate::render::device::HeadlessDevice;

    fn context() -> RenderContext {
        RenderContext::new(Box::new(HeadlessDevice::new()), RendererConfig::default())
    }

    fn spot() -> SpotLight {
        SpotLight::new(Vec3::new(0.0, 3.0, 0.0), -Vec3::y(), Vec3::repeat(1.0), 25.0, None)
    }

    #[test]
    fn test_dependency_is_cached_per_kind() {
        let mut ctx = context();
        let mut scene = RenderScene::new();
        let first = scene
            .get_or_create_dependency(&mut ctx, "MVPMatrices", BlockKind::Uniform)
            .unwrap()
            .binding_point();
        let again = scene
            .get_or_create_dependency(&mut ctx, "MVPMatrices", BlockKind::Uniform)
            .unwrap()
            .binding_point();
        assert_eq!(first, again);
        assert_eq!(ctx.bindings().leased_count(), 1);

        scene
            .get_or_create_dependency(&mut ctx, "MVPMatrices", BlockKind::Storage)
            .unwrap();
        assert_eq!(scene.dependency_keys(), ["MVPMatricesUBO", "MVPMatricesSSBO"]);
    }

    #[test]
    fn test_late_dependency_sees_existing_lights() {
        let mut ctx = context();
        let mut scene = RenderScene::new();
        scene.add_light(ctx.device_mut(), spot()).unwrap();
        scene.add_light(ctx.device_mut(), spot()).unwrap();

        let lights = scene
            .get_or_create_dependency(&mut ctx, "SpotLightStorage", BlockKind::Storage)
            .unwrap();
        let id = lights.buffer().gpu().id();
        let on_device = ctx.device_as::<HeadlessDevice>().unwrap().buffer_contents(id).unwrap();
        assert_eq!(i32::from_ne_bytes([on_device[0], on_device[1], on_device[2], on_device[3]]), 2);
    }

    #[test]
    fn test_dispatch_reaches_subscribers_only() {
        let mut ctx = context();
        let mut scene = RenderScene::new();
        scene
            .get_or_create_dependency(&mut ctx, "SpotLightStorage", BlockKind::Storage)
            .unwrap();
        let mvp_id = scene
            .get_or_create_dependency(&mut ctx, "MVPMatrices", BlockKind::Uniform)
            .unwrap()
            .buffer()
            .gpu()
            .id();

        let id = scene.add_light(ctx.device_mut(), spot()).unwrap();
        scene.update_light(ctx.device_mut(), id, spot()).unwrap();
        let device = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(device.buffer_write_count(mvp_id), 0);
    }

    #[test]
    fn test_update_unknown_light_fails() {
        let mut ctx = context();
        let mut scene = RenderScene::new();
        let id = scene.add_light(ctx.device_mut(), spot()).unwrap();
        let mut other = RenderScene::new();
        assert!(matches!(
            other.update_light(ctx.device_mut(), id, spot()),
            Err(RenderError::InvalidHandle { kind: "light", .. })
        ));
    }

    #[test]
    fn test_foreign_light_error_reports_full_key() {
        use slotmap::Key;

        let mut ctx = context();
        let mut scene = RenderScene::new();
        scene.add_light(ctx.device_mut(), spot()).unwrap();
        let foreign = scene.add_light(ctx.device_mut(), spot()).unwrap();
        let mut other = RenderScene::new();
        other.add_light(ctx.device_mut(), spot()).unwrap();

        match other.update_light(ctx.device_mut(), foreign, spot()) {
            Err(RenderError::InvalidHandle { kind: "light", id }) => {
                assert_eq!(id, foreign.data().as_ffi());
                assert_ne!(id >> 32, 0, "version bits dropped");
            }
            result => panic!("expected invalid light handle, got {result:?}"),
        }
    }

    #[test]
    fn test_storage_points_exhaust_independently() {
        let mut ctx = context();
        let mut scenes: Vec<RenderScene> = (0..5).map(|_| RenderScene::new()).collect();
        for scene in &mut scenes[..4] {
            scene
                .get_or_create_dependency(&mut ctx, "MVPMatrices", BlockKind::Uniform)
                .unwrap();
            scene
                .get_or_create_dependency(&mut ctx, "SpotLightStorage", BlockKind::Storage)
                .unwrap();
            scene
                .get_or_create_dependency(&mut ctx, "AreaLightStorage", BlockKind::Storage)
                .unwrap();
        }
        assert_eq!(ctx.bindings().leased(BlockKind::Storage), 8);

        let last = &mut scenes[4];
        assert!(matches!(
            last.get_or_create_dependency(&mut ctx, "SpotLightStorage", BlockKind::Storage),
            Err(RenderError::BindingPointsExhausted { capacity: 8 })
        ));
        let point = last
            .get_or_create_dependency(&mut ctx, "MVPMatrices", BlockKind::Uniform)
            .unwrap()
            .binding_point();
        assert_eq!(point, 4);
    }

    #[test]
    fn test_release_returns_points() {
        let mut ctx = context();
        let mut scene = RenderScene::new();
        scene
            .get_or_create_dependency(&mut ctx, "MVPMatrices", BlockKind::Uniform)
            .unwrap();
        scene
            .get_or_create_dependency(&mut ctx, "AreaLightStorage", BlockKind::Storage)
            .unwrap();
        assert_eq!(ctx.bindings().leased_count(), 2);
        scene.release(ctx.bindings_mut());
        assert_eq!(ctx.bindings().leased_count(), 0);
        assert!(scene.dependency_keys().is_empty());
    }
}
