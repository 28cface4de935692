//! Scene events
//!
//! Dependencies subscribe to event kinds; [`super::RenderScene::dispatch`]
//! delivers each event synchronously to every subscriber, in creation order.

use crate::foundation::math::Mat4;
use crate::scene::camera::CameraState;
use crate::scene::light::{LightId, SceneLight};

/// Discriminant of a [`SceneEvent`], used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEventKind {
    /// A light joined the scene
    ComponentAdded,
    /// A light changed
    LightUpdated,
    /// The active camera moved or changed projection
    CameraUpdated,
    /// A camera became the active one
    CameraActivated,
    /// A node is about to be drawn
    NodeDrawn,
    /// Start of a frame
    Tick,
}

/// Event delivered to renderer dependencies
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A light joined the scene
    ComponentAdded {
        /// Scene handle
        id: LightId,
        /// Light data
        light: SceneLight,
    },
    /// A light changed
    LightUpdated {
        /// Scene handle
        id: LightId,
        /// New light data
        light: SceneLight,
    },
    /// The active camera changed
    CameraUpdated(CameraState),
    /// A camera became the active one
    CameraActivated(CameraState),
    /// A node is about to be drawn with this world matrix
    NodeDrawn {
        /// Model-to-world matrix
        model: Mat4,
    },
    /// Start of a frame
    Tick {
        /// Seconds since the previous tick
        delta: f32,
    },
}

impl SceneEvent {
    /// Kind used to match subscriptions
    pub fn kind(&self) -> SceneEventKind {
        match self {
            Self::ComponentAdded { .. } => SceneEventKind::ComponentAdded,
            Self::LightUpdated { .. } => SceneEventKind::LightUpdated,
            Self::CameraUpdated(_) => SceneEventKind::CameraUpdated,
            Self::CameraActivated(_) => SceneEventKind::CameraActivated,
            Self::NodeDrawn { .. } => SceneEventKind::NodeDrawn,
            Self::Tick { .. } => SceneEventKind::Tick,
        }
    }
}
