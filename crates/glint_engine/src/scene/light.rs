//! Scene lights
//!
//! Plain data handed to light-storage dependencies. Lights live in the
//! scene's slot map and are addressed by [`LightId`].

use slotmap::new_key_type;

use crate::foundation::math::Vec3;

new_key_type! {
    /// Handle of a light registered with a scene
    pub struct LightId;
}

/// Cone light with distance attenuation
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    /// World-space position
    pub position: Vec3,
    /// World-space direction the cone points to
    pub direction: Vec3,
    /// Diffuse color
    pub diffuse_color: Vec3,
    /// Specular color
    pub specular_color: Vec3,
    /// Inner cone half-angle in radians
    pub cut_off: f32,
    /// Outer cone half-angle in radians
    pub outer_cut_off: f32,
}

impl SpotLight {
    /// Spot light with a cone given in degrees
    ///
    /// Without an explicit outer cut-off the cone fades out over an extra
    /// 10% of the inner angle.
    pub fn new(position: Vec3, direction: Vec3, color: Vec3, cut_off_deg: f32, outer_cut_off_deg: Option<f32>) -> Self {
        let cut_off = cut_off_deg.to_radians();
        Self {
            position,
            direction: direction.normalize(),
            diffuse_color: color,
            specular_color: color,
            cut_off,
            outer_cut_off: outer_cut_off_deg.map_or(cut_off * 1.1, f32::to_radians),
        }
    }

    /// Replace the specular color
    #[must_use]
    pub fn with_specular(mut self, specular_color: Vec3) -> Self {
        self.specular_color = specular_color;
        self
    }
}

/// Emissive quad
#[derive(Debug, Clone, PartialEq)]
pub struct AreaLight {
    /// Emitted color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Quad corners in world space, in winding order
    pub points: [Vec3; 4],
}

impl AreaLight {
    /// Area light spanning a quad
    pub fn new(color: Vec3, intensity: f32, points: [Vec3; 4]) -> Self {
        Self {
            color,
            intensity,
            points,
        }
    }
}

/// Any light a scene can hold
#[derive(Debug, Clone, PartialEq)]
pub enum SceneLight {
    /// A spot light
    Spot(SpotLight),
    /// An area light
    Area(AreaLight),
}

impl From<SpotLight> for SceneLight {
    fn from(light: SpotLight) -> Self {
        Self::Spot(light)
    }
}

impl From<AreaLight> for SceneLight {
    fn from(light: AreaLight) -> Self {
        Self::Area(light)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spot_cone_in_radians() {
        let light = SpotLight::new(Vec3::zeros(), Vec3::new(0.0, 0.0, -2.0), Vec3::repeat(1.0), 30.0, None);
        assert_relative_eq!(light.cut_off, std::f32::consts::FRAC_PI_6);
        assert_relative_eq!(light.outer_cut_off, std::f32::consts::FRAC_PI_6 * 1.1);
        assert_relative_eq!(light.direction.norm(), 1.0);
    }

    #[test]
    fn test_explicit_outer_cut_off() {
        let light = SpotLight::new(Vec3::zeros(), Vec3::z(), Vec3::repeat(1.0), 10.0, Some(20.0));
        assert_relative_eq!(light.outer_cut_off, 20f32.to_radians());
    }
}
