//! `SpotLightStorage` block
//!
//! ```glsl
//! struct SpotLight {
//!     vec3 diffuse_color;  float linear;
//!     vec3 specular_color; float quadratic;
//!     vec3 pos;            float cut_off;
//!     vec3 direction;      float outer_cut_off;
//! };
//! buffer SpotLightStorage { int count; SpotLight lights[]; };
//! ```
//!
//! Cut-offs are stored as cosines so the shader compares them with a dot
//! product directly.

use super::light_storage::{LightStorage, StoredLight};
use crate::render::buffer::FieldSpec;
use crate::scene::{SceneLight, SpotLight};

/// Dependency serving `SpotLightStorage` blocks
pub type SpotLightStorage = LightStorage<SpotLight>;

impl StoredLight for SpotLight {
    const NAME: &'static str = "SpotLightStorage";

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("diffuse_color", 3),
            FieldSpec::new("linear", 1),
            FieldSpec::new("specular_color", 3),
            FieldSpec::new("quadratic", 1),
            FieldSpec::new("pos", 3),
            FieldSpec::new("cut_off", 1),
            FieldSpec::new("direction", 3),
            FieldSpec::new("outer_cut_off", 1),
        ]
    }

    fn select(light: &SceneLight) -> Option<&Self> {
        match light {
            SceneLight::Spot(spot) => Some(spot),
            SceneLight::Area(_) => None,
        }
    }

    fn frame_values(&self) -> Vec<(&'static str, Vec<f32>)> {
        vec![
            ("diffuse_color", self.diffuse_color.as_slice().to_vec()),
            ("specular_color", self.specular_color.as_slice().to_vec()),
            ("pos", self.position.as_slice().to_vec()),
            ("cut_off", vec![self.cut_off.cos()]),
            ("direction", self.direction.as_slice().to_vec()),
            ("outer_cut_off", vec![self.outer_cut_off.cos()]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::binding::BindingPointAllocator;
    use crate::render::dependency::RendererDependency;
    use crate::render::device::{BlockKind, DeviceCommand, HeadlessDevice};
    use crate::scene::{AreaLight, LightId, SceneEvent};
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn spot(x: f32) -> SpotLight {
        SpotLight::new(Vec3::new(x, 2.0, 0.0), -Vec3::y(), Vec3::new(1.0, 0.5, 0.25), 60.0, None)
    }

    fn storage(device: &mut HeadlessDevice) -> SpotLightStorage {
        let mut bindings = BindingPointAllocator::new();
        SpotLightStorage::new(device, &mut bindings, BlockKind::Storage).unwrap()
    }

    #[test]
    fn test_added_light_appends_frame() {
        let mut device = HeadlessDevice::new();
        let mut lights = storage(&mut device);
        let mut ids: SlotMap<LightId, ()> = SlotMap::with_key();
        let first = ids.insert(());
        let second = ids.insert(());

        for (id, x) in [(first, 1.0), (second, 2.0)] {
            let event = SceneEvent::ComponentAdded {
                id,
                light: SceneLight::Spot(spot(x)),
            };
            lights.on_event(&mut device, &event).unwrap();
        }

        assert_eq!(lights.light_count(), 2);
        assert_eq!(lights.array().header_count(), Some(2));
        assert_eq!(lights.array().buffer().len(), 4 + 2 * 16);
        assert_eq!(lights.stored(second, "pos").unwrap(), &[2.0, 2.0, 0.0]);
        assert_relative_eq!(lights.stored(first, "cut_off").unwrap()[0], 0.5, epsilon = 1e-6);
        assert_eq!(lights.stored(first, "linear").unwrap(), &[0.0]);

        let on_device = device.buffer_f32(lights.array().buffer().id()).unwrap();
        assert_eq!(on_device.len(), 36);
        assert_eq!(on_device[4 + 16 + 8], 2.0);
    }

    #[test]
    fn test_update_uploads_one_frame() {
        let mut device = HeadlessDevice::new();
        let mut lights = storage(&mut device);
        let mut ids: SlotMap<LightId, ()> = SlotMap::with_key();
        let ids: Vec<_> = (0..3).map(|_| ids.insert(())).collect();
        for &id in &ids {
            lights
                .on_event(&mut device, &SceneEvent::ComponentAdded { id, light: spot(0.0).into() })
                .unwrap();
        }
        device.take_commands();

        let moved = SceneEvent::LightUpdated {
            id: ids[1],
            light: spot(5.0).into(),
        };
        lights.on_event(&mut device, &moved).unwrap();

        assert_eq!(device.commands(), [DeviceCommand::BufferSubData {
            buffer: lights.array().buffer().id(),
            byte_offset: (4 + 16) * 4,
            bytes: 16 * 4,
        }]);
        assert_eq!(device.buffer_f32(lights.array().buffer().id()).unwrap()[4 + 16 + 8], 5.0);
    }

    #[test]
    fn test_other_lights_are_ignored() {
        let mut device = HeadlessDevice::new();
        let mut lights = storage(&mut device);
        let mut ids: SlotMap<LightId, ()> = SlotMap::with_key();
        let area = AreaLight::new(Vec3::repeat(1.0), 1.0, [Vec3::zeros(); 4]);
        let event = SceneEvent::ComponentAdded {
            id: ids.insert(()),
            light: area.into(),
        };
        lights.on_event(&mut device, &event).unwrap();
        assert_eq!(lights.light_count(), 0);
    }
}
