//! `AreaLightStorage` block
//!
//! ```glsl
//! struct AreaLight {
//!     vec3 color; float intensity;
//!     vec3 points[4];
//! };
//! buffer AreaLightStorage { int count; AreaLight lights[]; };
//! ```
//!
//! Each corner is a `vec3` padded to 16 bytes.

use super::light_storage::{LightStorage, StoredLight};
use crate::render::buffer::FieldSpec;
use crate::scene::{AreaLight, SceneLight};

/// Dependency serving `AreaLightStorage` blocks
pub type AreaLightStorage = LightStorage<AreaLight>;

const POINT_FIELDS: [&str; 4] = ["point0", "point1", "point2", "point3"];

impl StoredLight for AreaLight {
    const NAME: &'static str = "AreaLightStorage";

    fn fields() -> Vec<FieldSpec> {
        let mut fields = vec![FieldSpec::new("color", 3), FieldSpec::new("intensity", 1)];
        for point in POINT_FIELDS {
            fields.push(FieldSpec::new(point, 3));
            fields.push(FieldSpec::padding(1));
        }
        fields
    }

    fn select(light: &SceneLight) -> Option<&Self> {
        match light {
            SceneLight::Area(area) => Some(area),
            SceneLight::Spot(_) => None,
        }
    }

    fn frame_values(&self) -> Vec<(&'static str, Vec<f32>)> {
        let mut values = vec![
            ("color", self.color.as_slice().to_vec()),
            ("intensity", vec![self.intensity]),
        ];
        values.extend(
            POINT_FIELDS
                .iter()
                .zip(&self.points)
                .map(|(name, point)| (*name, point.as_slice().to_vec())),
        );
        values
    }
}
