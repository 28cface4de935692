//! `MVPMatrices` block
//!
//! Five `mat4` slots: model, view, projection, view-projection and
//! model-view-projection. A shader may declare any subset in any order;
//! introspection tells which slot each declared member occupies.

use super::{DependencyBuffer, DependencyBufferMut, RendererDependency};
use crate::foundation::math::{to_column_major, Mat4};
use crate::render::binding::BindingPointAllocator;
use crate::render::buffer::{FieldSpec, StructuredBuffer};
use crate::render::device::{BlockKind, BufferUsage, GraphicsDevice};
use crate::render::{RenderError, RenderResult};
use crate::scene::{CameraState, SceneEvent, SceneEventKind};

const SUBSCRIPTIONS: &[SceneEventKind] = &[
    SceneEventKind::CameraUpdated,
    SceneEventKind::CameraActivated,
    SceneEventKind::NodeDrawn,
];

const MATRICES: [&str; 5] = ["model", "view", "projection", "view_projection", "model_view_projection"];

const MAT4_LEN: usize = 16;

/// Dependency serving `MVPMatrices` blocks
#[derive(Debug)]
pub struct MvpMatrices {
    buffer: StructuredBuffer,
    kind: BlockKind,
    binding_point: u32,
    declared: Vec<&'static str>,
    model: Mat4,
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    last_model: Option<Mat4>,
}

impl MvpMatrices {
    /// Block name served
    pub const NAME: &'static str = "MVPMatrices";

    /// Create identity matrices and lease a binding point
    pub fn new(device: &mut dyn GraphicsDevice, bindings: &mut BindingPointAllocator, kind: BlockKind) -> RenderResult<Self> {
        let fields = MATRICES.iter().map(|name| FieldSpec::new(*name, MAT4_LEN));
        let buffer = StructuredBuffer::new(device, Self::NAME, fields, kind, BufferUsage::Dynamic)?;
        let binding_point = bindings.take_point(device, buffer.buffer(), kind)?;
        log::info!("{} bound to point {binding_point} as {}", Self::NAME, kind.suffix());
        let mut mvp = Self {
            buffer,
            kind,
            binding_point,
            declared: Vec::new(),
            model: Mat4::identity(),
            view: Mat4::identity(),
            projection: Mat4::identity(),
            view_projection: Mat4::identity(),
            last_model: None,
        };
        mvp.write_all()?;
        Ok(mvp)
    }

    /// Current model matrix
    pub fn model(&self) -> &Mat4 {
        &self.model
    }

    /// Current view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// Current projection matrix
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Current model-view-projection matrix
    pub fn model_view_projection(&self) -> Mat4 {
        self.view_projection * self.model
    }

    /// Host value of one matrix slot
    pub fn matrix(&self, name: &str) -> RenderResult<&[f32]> {
        self.buffer.get(name)
    }

    fn value(&self, name: &str) -> Mat4 {
        match name {
            "model" => self.model,
            "view" => self.view,
            "projection" => self.projection,
            "view_projection" => self.view_projection,
            _ => self.model_view_projection(),
        }
    }

    fn write(&mut self, names: &[&'static str]) -> RenderResult<()> {
        for name in names {
            if self.declared.is_empty() || self.declared.contains(name) {
                let value = to_column_major(&self.value(name));
                self.buffer.set(name, &value)?;
            }
        }
        Ok(())
    }

    fn write_all(&mut self) -> RenderResult<()> {
        self.write(&MATRICES)
    }

    fn set_camera(&mut self, camera: &CameraState) {
        self.view = camera.view_matrix();
        self.projection = camera.projection_matrix();
        self.view_projection = self.projection * self.view;
    }
}

impl RendererDependency for MvpMatrices {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> BlockKind {
        self.kind
    }

    fn binding_point(&self) -> u32 {
        self.binding_point
    }

    fn buffer(&self) -> DependencyBuffer<'_> {
        DependencyBuffer::Single(&self.buffer)
    }

    fn buffer_mut(&mut self) -> DependencyBufferMut<'_> {
        DependencyBufferMut::Single(&mut self.buffer)
    }

    fn subscriptions(&self) -> &[SceneEventKind] {
        SUBSCRIPTIONS
    }

    /// Move a matrix to the slot the shader declares it at
    ///
    /// `name` may carry a block or instance prefix (`MVPMatrices.model`); the
    /// last path segment picks the matrix and `offset / 16` the slot.
    fn add_setter(&mut self, name: &str, offset: usize, size: usize) -> RenderResult<()> {
        let member = name.rsplit('.').next().unwrap_or(name);
        let Some(matrix) = MATRICES.iter().copied().find(|m| *m == member) else {
            return Err(RenderError::UnknownField {
                buffer: Self::NAME.to_string(),
                field: name.to_string(),
            });
        };
        if size != MAT4_LEN {
            return Err(RenderError::LengthMismatch {
                expected: MAT4_LEN,
                actual: size,
            });
        }
        let slot = offset / MAT4_LEN;
        self.buffer.add_elem(matrix, slot * MAT4_LEN, MAT4_LEN);
        if !self.declared.contains(&matrix) {
            self.declared.push(matrix);
        }
        log::debug!("{}.{matrix} mapped to slot {slot}", Self::NAME);
        self.write(&[matrix])
    }

    fn on_event(&mut self, device: &mut dyn GraphicsDevice, event: &SceneEvent) -> RenderResult<()> {
        match event {
            SceneEvent::NodeDrawn { model } => {
                if self.last_model.as_ref() == Some(model) {
                    return Ok(());
                }
                self.last_model = Some(*model);
                self.model = *model;
                self.write(&["model", "model_view_projection"])?;
            }
            SceneEvent::CameraUpdated(camera) | SceneEvent::CameraActivated(camera) => {
                self.set_camera(camera);
                self.write_all()?;
            }
            _ => return Ok(()),
        }
        self.buffer.force_upload(device)
    }
}
