//! In-memory graphics device
//!
//! `HeadlessDevice` implements [`GraphicsDevice`] without a GPU. Buffer
//! stores, textures, render buffers and framebuffers are mirrored in host
//! memory; programs are linked by scanning their GLSL interface, so the
//! reflection it reports (attribute locations, std140 block offsets, block
//! indices) matches what a desktop GL driver reports for the same sources.
//!
//! Every state-changing call is appended to a command log. Tests use the log
//! and the inspection helpers to assert what reached the "GPU".

mod glsl;
mod link;

use std::any::Any;
use std::collections::{HashMap, HashSet};

use link::LinkedProgram;

use super::{
    ActiveVariable, AttachmentPoint, BlockKind, BufferId, BufferTarget, BufferUsage, Capability, ClearMask, DrawCall,
    FramebufferId, GraphicsDevice, ProgramId, RenderbufferId, ShaderSources, TextureId, UniformParameter,
};
use crate::render::texture::{SamplerParams, TextureFormat};
use crate::render::types::{GlslType, UniformValue};
use crate::render::{RenderError, RenderResult};

/// Hardware limits reported by the headless device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// `GL_MAX_UNIFORM_BUFFER_BINDINGS`
    pub max_uniform_buffer_bindings: u32,
    /// `GL_MAX_SHADER_STORAGE_BUFFER_BINDINGS`
    pub max_storage_buffer_bindings: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        // Minimums guaranteed by OpenGL 4.3
        Self {
            max_uniform_buffer_bindings: 36,
            max_storage_buffer_bindings: 8,
        }
    }
}

/// One entry of the device command log
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Whole-store upload
    BufferData {
        /// Target buffer
        buffer: BufferId,
        /// Bytes written
        bytes: usize,
    },
    /// Partial upload
    BufferSubData {
        /// Target buffer
        buffer: BufferId,
        /// First byte written
        byte_offset: usize,
        /// Bytes written
        bytes: usize,
    },
    /// Read back
    BufferRead {
        /// Source buffer
        buffer: BufferId,
        /// Bytes read
        bytes: usize,
    },
    /// Indexed binding point assignment
    BindBufferBase {
        /// Indexed target
        target: BufferTarget,
        /// Binding point
        index: u32,
        /// Bound buffer
        buffer: BufferId,
    },
    /// Program installed
    UseProgram(ProgramId),
    /// Block index routed to a binding point
    BlockBinding {
        /// Program owning the block
        program: ProgramId,
        /// Block kind
        kind: BlockKind,
        /// Block index
        block_index: u32,
        /// Binding point
        binding: u32,
    },
    /// Plain uniform set
    SetUniform {
        /// Current program
        program: ProgramId,
        /// Uniform location
        location: i32,
    },
    /// Texture unit binding
    BindTexture {
        /// Texture unit
        unit: u32,
        /// Bound texture, `None` clears the unit
        texture: Option<TextureId>,
    },
    /// Draw framebuffer binding, `None` is the default framebuffer
    BindFramebuffer(Option<FramebufferId>),
    /// Framebuffer clear
    Clear {
        /// Cleared framebuffer
        framebuffer: Option<FramebufferId>,
        /// Cleared buffers
        mask: ClearMask,
    },
    /// Indexed draw
    Draw {
        /// Framebuffer drawn into
        framebuffer: Option<FramebufferId>,
        /// Program used
        program: ProgramId,
        /// Indices drawn
        index_count: u32,
    },
}

/// Object attached to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachedObject {
    /// A texture
    Texture(TextureId),
    /// A render buffer
    Renderbuffer(RenderbufferId),
}

#[derive(Debug, Default)]
struct HeadlessBuffer {
    data: Vec<u8>,
    usage: BufferUsage,
}

#[derive(Debug, Clone, Copy)]
struct Image {
    width: u32,
    height: u32,
    format: TextureFormat,
}

#[derive(Debug, Default)]
struct HeadlessTexture {
    image: Option<Image>,
    params: SamplerParams,
}

#[derive(Debug)]
struct HeadlessProgram {
    linked: LinkedProgram,
    uniform_bindings: Vec<u32>,
    storage_bindings: Vec<u32>,
    uniform_values: HashMap<i32, UniformValue>,
}

#[derive(Debug, Default)]
struct HeadlessFramebuffer {
    attachments: HashMap<AttachmentPoint, AttachedObject>,
    draw_buffers: u32,
}

/// GPU-less [`GraphicsDevice`]
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    limits: DeviceLimits,
    next_id: u32,
    buffers: HashMap<BufferId, HeadlessBuffer>,
    bound_buffers: HashMap<BufferTarget, BufferId>,
    indexed_bindings: HashMap<(BufferTarget, u32), BufferId>,
    programs: HashMap<ProgramId, HeadlessProgram>,
    current_program: Option<ProgramId>,
    textures: HashMap<TextureId, HeadlessTexture>,
    texture_units: HashMap<u32, TextureId>,
    renderbuffers: HashMap<RenderbufferId, Option<Image>>,
    framebuffers: HashMap<FramebufferId, HeadlessFramebuffer>,
    bound_framebuffer: Option<FramebufferId>,
    viewport: (u32, u32),
    clear_color: [f32; 4],
    capabilities: HashSet<Capability>,
    commands: Vec<DeviceCommand>,
}

impl HeadlessDevice {
    /// Device with OpenGL 4.3 minimum limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Device with custom limits
    pub fn with_limits(limits: DeviceLimits) -> Self {
        log::debug!("Creating headless device with {limits:?}");
        Self {
            limits,
            ..Self::default()
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn bound(&self, target: BufferTarget) -> RenderResult<BufferId> {
        self.bound_buffers.get(&target).copied().ok_or(RenderError::InvalidHandle {
            kind: "bound buffer",
            id: 0,
        })
    }

    fn bound_store(&mut self, target: BufferTarget) -> RenderResult<(BufferId, &mut HeadlessBuffer)> {
        let id = self.bound(target)?;
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or(RenderError::InvalidHandle { kind: "buffer", id: id.0.into() })?;
        Ok((id, buffer))
    }

    fn program(&self, program: ProgramId) -> RenderResult<&HeadlessProgram> {
        self.programs.get(&program).ok_or(RenderError::InvalidHandle {
            kind: "program",
            id: program.0.into(),
        })
    }

    fn program_mut(&mut self, program: ProgramId) -> RenderResult<&mut HeadlessProgram> {
        self.programs.get_mut(&program).ok_or(RenderError::InvalidHandle {
            kind: "program",
            id: program.0.into(),
        })
    }

    fn framebuffer_mut(&mut self, framebuffer: FramebufferId) -> RenderResult<&mut HeadlessFramebuffer> {
        self.framebuffers.get_mut(&framebuffer).ok_or(RenderError::InvalidHandle {
            kind: "framebuffer",
            id: framebuffer.0.into(),
        })
    }

    // Inspection

    /// Every command recorded so far
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drain the command log
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Uploads (whole or partial) that reached a buffer
    pub fn buffer_write_count(&self, buffer: BufferId) -> usize {
        self.commands
            .iter()
            .filter(|command| {
                matches!(command,
                    DeviceCommand::BufferData { buffer: b, .. } | DeviceCommand::BufferSubData { buffer: b, .. }
                    if *b == buffer)
            })
            .count()
    }

    /// Device-side contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    /// Device-side contents of a buffer as `f32` values
    pub fn buffer_f32(&self, buffer: BufferId) -> Option<Vec<f32>> {
        self.buffer_contents(buffer).map(|bytes| {
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect()
        })
    }

    /// Usage hint a buffer was last allocated with
    pub fn buffer_usage(&self, buffer: BufferId) -> Option<BufferUsage> {
        self.buffers.get(&buffer).map(|b| b.usage)
    }

    /// Buffer attached to an indexed binding point
    pub fn indexed_binding(&self, target: BufferTarget, index: u32) -> Option<BufferId> {
        self.indexed_bindings.get(&(target, index)).copied()
    }

    /// Last value set on a uniform location of a program
    pub fn uniform_value(&self, program: ProgramId, location: i32) -> Option<&UniformValue> {
        self.programs.get(&program)?.uniform_values.get(&location)
    }

    /// Texture bound to a unit
    pub fn texture_on_unit(&self, unit: u32) -> Option<TextureId> {
        self.texture_units.get(&unit).copied()
    }

    /// Allocated size of a texture
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        let image = self.textures.get(&texture)?.image?;
        Some((image.width, image.height))
    }

    /// Format of a texture
    pub fn texture_format(&self, texture: TextureId) -> Option<TextureFormat> {
        Some(self.textures.get(&texture)?.image?.format)
    }

    /// Sampling parameters of a texture
    pub fn texture_params(&self, texture: TextureId) -> Option<&SamplerParams> {
        self.textures.get(&texture).map(|t| &t.params)
    }

    /// Allocated size of a render buffer
    pub fn renderbuffer_size(&self, renderbuffer: RenderbufferId) -> Option<(u32, u32)> {
        let image = (*self.renderbuffers.get(&renderbuffer)?)?;
        Some((image.width, image.height))
    }

    /// Object attached at a framebuffer attachment point
    pub fn attachment(&self, framebuffer: FramebufferId, point: AttachmentPoint) -> Option<AttachedObject> {
        self.framebuffers.get(&framebuffer)?.attachments.get(&point).copied()
    }

    /// Number of color attachments fragment outputs are routed to
    pub fn draw_buffer_count(&self, framebuffer: FramebufferId) -> Option<u32> {
        self.framebuffers.get(&framebuffer).map(|f| f.draw_buffers)
    }

    /// Currently bound draw framebuffer
    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    /// Current viewport size
    pub fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }

    /// Current clear color
    pub fn current_clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Whether a capability is enabled
    pub fn capability_enabled(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Live buffer objects
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn max_uniform_buffer_bindings(&self) -> u32 {
        self.limits.max_uniform_buffer_bindings
    }

    fn max_storage_buffer_bindings(&self) -> u32 {
        self.limits.max_storage_buffer_bindings
    }

    fn create_buffer(&mut self) -> RenderResult<BufferId> {
        let id = BufferId(self.next_id());
        self.buffers.insert(id, HeadlessBuffer::default());
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.bound_buffers.retain(|_, bound| *bound != buffer);
        self.indexed_bindings.retain(|_, bound| *bound != buffer);
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) -> RenderResult<()> {
        if !self.buffers.contains_key(&buffer) {
            return Err(RenderError::InvalidHandle {
                kind: "buffer",
                id: buffer.0.into(),
            });
        }
        self.bound_buffers.insert(target, buffer);
        Ok(())
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) -> RenderResult<()> {
        let (id, store) = self.bound_store(target)?;
        store.data = data.to_vec();
        store.usage = usage;
        self.commands.push(DeviceCommand::BufferData {
            buffer: id,
            bytes: data.len(),
        });
        Ok(())
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, data: &[u8]) -> RenderResult<()> {
        let (id, store) = self.bound_store(target)?;
        let end = byte_offset + data.len();
        if end > store.data.len() {
            return Err(RenderError::OutOfRange {
                start: byte_offset,
                end,
                len: store.data.len(),
            });
        }
        store.data[byte_offset..end].copy_from_slice(data);
        self.commands.push(DeviceCommand::BufferSubData {
            buffer: id,
            byte_offset,
            bytes: data.len(),
        });
        Ok(())
    }

    fn get_buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, out: &mut [u8]) -> RenderResult<()> {
        let (id, store) = self.bound_store(target)?;
        let end = byte_offset + out.len();
        if end > store.data.len() {
            return Err(RenderError::OutOfRange {
                start: byte_offset,
                end,
                len: store.data.len(),
            });
        }
        out.copy_from_slice(&store.data[byte_offset..end]);
        self.commands.push(DeviceCommand::BufferRead {
            buffer: id,
            bytes: out.len(),
        });
        Ok(())
    }

    fn bind_buffer_base(&mut self, target: BufferTarget, index: u32, buffer: BufferId) -> RenderResult<()> {
        let limit = match target {
            BufferTarget::Uniform => self.limits.max_uniform_buffer_bindings,
            BufferTarget::Storage => self.limits.max_storage_buffer_bindings,
            BufferTarget::AtomicCounter => 1,
            BufferTarget::Vertex | BufferTarget::Index => 0,
        };
        if index >= limit {
            return Err(RenderError::OutOfRange {
                start: index as usize,
                end: index as usize + 1,
                len: limit as usize,
            });
        }
        self.bind_buffer(target, buffer)?;
        self.indexed_bindings.insert((target, index), buffer);
        self.commands.push(DeviceCommand::BindBufferBase { target, index, buffer });
        Ok(())
    }

    fn link_program(&mut self, sources: &ShaderSources) -> RenderResult<ProgramId> {
        let linked = link::link(sources)?;
        let id = ProgramId(self.next_id());
        log::debug!(
            "Linked headless program {} ({} attributes, {} uniforms, {} uniform blocks, {} storage blocks)",
            id.0,
            linked.attributes.len(),
            linked.uniforms.len(),
            linked.uniform_blocks.len(),
            linked.storage_blocks.len()
        );
        self.programs.insert(
            id,
            HeadlessProgram {
                uniform_bindings: linked.uniform_blocks.iter().map(|b| b.binding).collect(),
                storage_bindings: linked.storage_blocks.iter().map(|b| b.binding).collect(),
                linked,
                uniform_values: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) -> RenderResult<()> {
        self.program(program)?;
        self.current_program = Some(program);
        self.commands.push(DeviceCommand::UseProgram(program));
        Ok(())
    }

    fn active_attributes(&self, program: ProgramId) -> RenderResult<Vec<ActiveVariable>> {
        Ok(self
            .program(program)?
            .linked
            .attributes
            .iter()
            .map(|a| ActiveVariable {
                name: a.name.clone(),
                size: a.size,
                ty: a.ty,
            })
            .collect())
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let program = self.programs.get(&program)?;
        program
            .linked
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }

    fn active_uniforms(&self, program: ProgramId) -> RenderResult<Vec<ActiveVariable>> {
        Ok(self
            .program(program)?
            .linked
            .uniforms
            .iter()
            .map(|u| ActiveVariable {
                name: u.name.clone(),
                size: u.size,
                ty: u.ty,
            })
            .collect())
    }

    fn active_uniforms_parameter(
        &self,
        program: ProgramId,
        indices: &[u32],
        parameter: UniformParameter,
    ) -> RenderResult<Vec<i32>> {
        let uniforms = &self.program(program)?.linked.uniforms;
        indices
            .iter()
            .map(|&index| {
                let uniform = uniforms.get(index as usize).ok_or(RenderError::OutOfRange {
                    start: index as usize,
                    end: index as usize + 1,
                    len: uniforms.len(),
                })?;
                Ok(match parameter {
                    UniformParameter::BlockIndex => uniform.block_index,
                    UniformParameter::Offset => uniform.offset,
                })
            })
            .collect()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        let program = self.programs.get(&program)?;
        program
            .linked
            .uniforms
            .iter()
            .find(|u| u.name == name)
            .and_then(|u| u.location)
    }

    fn uniform_block_names(&self, program: ProgramId) -> RenderResult<Vec<String>> {
        Ok(self
            .program(program)?
            .linked
            .uniform_blocks
            .iter()
            .map(|b| b.name.clone())
            .collect())
    }

    fn uniform_block_index(&self, program: ProgramId, name: &str) -> Option<u32> {
        let program = self.programs.get(&program)?;
        program
            .linked
            .uniform_blocks
            .iter()
            .position(|b| b.name == name)
            .map(|i| i as u32)
    }

    fn uniform_block_binding_point(&self, program: ProgramId, block_index: u32) -> RenderResult<u32> {
        let bindings = &self.program(program)?.uniform_bindings;
        bindings.get(block_index as usize).copied().ok_or(RenderError::OutOfRange {
            start: block_index as usize,
            end: block_index as usize + 1,
            len: bindings.len(),
        })
    }

    fn uniform_block_binding(&mut self, program: ProgramId, block_index: u32, binding: u32) -> RenderResult<()> {
        let state = self.program_mut(program)?;
        let len = state.uniform_bindings.len();
        let slot = state
            .uniform_bindings
            .get_mut(block_index as usize)
            .ok_or(RenderError::OutOfRange {
                start: block_index as usize,
                end: block_index as usize + 1,
                len,
            })?;
        *slot = binding;
        self.commands.push(DeviceCommand::BlockBinding {
            program,
            kind: BlockKind::Uniform,
            block_index,
            binding,
        });
        Ok(())
    }

    fn storage_block_names(&self, program: ProgramId) -> RenderResult<Vec<String>> {
        Ok(self
            .program(program)?
            .linked
            .storage_blocks
            .iter()
            .map(|b| b.name.clone())
            .collect())
    }

    fn storage_block_index(&self, program: ProgramId, name: &str) -> Option<u32> {
        let program = self.programs.get(&program)?;
        program
            .linked
            .storage_blocks
            .iter()
            .position(|b| b.name == name)
            .map(|i| i as u32)
    }

    fn storage_block_binding_point(&self, program: ProgramId, block_index: u32) -> RenderResult<u32> {
        let bindings = &self.program(program)?.storage_bindings;
        bindings.get(block_index as usize).copied().ok_or(RenderError::OutOfRange {
            start: block_index as usize,
            end: block_index as usize + 1,
            len: bindings.len(),
        })
    }

    fn shader_storage_block_binding(&mut self, program: ProgramId, block_index: u32, binding: u32) -> RenderResult<()> {
        let state = self.program_mut(program)?;
        let len = state.storage_bindings.len();
        let slot = state
            .storage_bindings
            .get_mut(block_index as usize)
            .ok_or(RenderError::OutOfRange {
                start: block_index as usize,
                end: block_index as usize + 1,
                len,
            })?;
        *slot = binding;
        self.commands.push(DeviceCommand::BlockBinding {
            program,
            kind: BlockKind::Storage,
            block_index,
            binding,
        });
        Ok(())
    }

    fn set_uniform(&mut self, location: i32, ty: GlslType, value: &UniformValue) -> RenderResult<()> {
        let program = self.current_program.ok_or(RenderError::InvalidHandle {
            kind: "current program",
            id: 0,
        })?;
        let state = self.program_mut(program)?;
        let uniform = state
            .linked
            .uniforms
            .iter()
            .find(|u| u.location == Some(location))
            .ok_or(RenderError::InvalidHandle {
                kind: "uniform location",
                id: u64::from(location as u32),
            })?;
        if uniform.ty != ty || !value.matches(ty.scalar()) {
            return Err(RenderError::UniformTypeMismatch {
                name: uniform.name.clone(),
                expected: uniform.ty.name(),
                actual: value.describe(),
            });
        }
        state.uniform_values.insert(location, value.clone());
        self.commands.push(DeviceCommand::SetUniform { program, location });
        Ok(())
    }

    fn create_texture(&mut self) -> RenderResult<TextureId> {
        let id = TextureId(self.next_id());
        self.textures.insert(id, HeadlessTexture::default());
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.texture_units.retain(|_, bound| *bound != texture);
    }

    fn texture_storage(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: Option<&[u8]>,
    ) -> RenderResult<()> {
        let state = self.textures.get_mut(&texture).ok_or(RenderError::InvalidHandle {
            kind: "texture",
            id: texture.0.into(),
        })?;
        if let Some(data) = data {
            let expected = width as usize * height as usize * format.bytes_per_pixel();
            if data.len() != expected {
                return Err(RenderError::LengthMismatch {
                    expected,
                    actual: data.len(),
                });
            }
        }
        state.image = Some(Image { width, height, format });
        Ok(())
    }

    fn texture_parameters(&mut self, texture: TextureId, params: &SamplerParams) -> RenderResult<()> {
        let state = self.textures.get_mut(&texture).ok_or(RenderError::InvalidHandle {
            kind: "texture",
            id: texture.0.into(),
        })?;
        state.params = params.clone();
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) -> RenderResult<()> {
        match texture {
            Some(id) if !self.textures.contains_key(&id) => {
                return Err(RenderError::InvalidHandle {
                    kind: "texture",
                    id: id.0.into(),
                });
            }
            Some(id) => {
                self.texture_units.insert(unit, id);
            }
            None => {
                self.texture_units.remove(&unit);
            }
        }
        self.commands.push(DeviceCommand::BindTexture { unit, texture });
        Ok(())
    }

    fn create_renderbuffer(&mut self) -> RenderResult<RenderbufferId> {
        let id = RenderbufferId(self.next_id());
        self.renderbuffers.insert(id, None);
        Ok(id)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        self.renderbuffers.remove(&renderbuffer);
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferId,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> RenderResult<()> {
        let state = self.renderbuffers.get_mut(&renderbuffer).ok_or(RenderError::InvalidHandle {
            kind: "renderbuffer",
            id: renderbuffer.0.into(),
        })?;
        *state = Some(Image { width, height, format });
        Ok(())
    }

    fn create_framebuffer(&mut self) -> RenderResult<FramebufferId> {
        let id = FramebufferId(self.next_id());
        self.framebuffers.insert(id, HeadlessFramebuffer::default());
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> RenderResult<()> {
        if let Some(id) = framebuffer {
            if !self.framebuffers.contains_key(&id) {
                return Err(RenderError::InvalidHandle {
                    kind: "framebuffer",
                    id: id.0.into(),
                });
            }
        }
        self.bound_framebuffer = framebuffer;
        self.commands.push(DeviceCommand::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn framebuffer_texture(&mut self, framebuffer: FramebufferId, point: AttachmentPoint, texture: TextureId) -> RenderResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::InvalidHandle {
                kind: "texture",
                id: texture.0.into(),
            });
        }
        self.framebuffer_mut(framebuffer)?
            .attachments
            .insert(point, AttachedObject::Texture(texture));
        Ok(())
    }

    fn framebuffer_renderbuffer(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        renderbuffer: RenderbufferId,
    ) -> RenderResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer) {
            return Err(RenderError::InvalidHandle {
                kind: "renderbuffer",
                id: renderbuffer.0.into(),
            });
        }
        self.framebuffer_mut(framebuffer)?
            .attachments
            .insert(point, AttachedObject::Renderbuffer(renderbuffer));
        Ok(())
    }

    fn draw_buffers(&mut self, framebuffer: FramebufferId, count: u32) -> RenderResult<()> {
        self.framebuffer_mut(framebuffer)?.draw_buffers = count;
        Ok(())
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear(&mut self, mask: ClearMask) {
        self.commands.push(DeviceCommand::Clear {
            framebuffer: self.bound_framebuffer,
            mask,
        });
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        if enabled {
            self.capabilities.insert(capability);
        } else {
            self.capabilities.remove(&capability);
        }
    }

    fn draw_elements(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        let program = self.current_program.ok_or(RenderError::InvalidHandle {
            kind: "current program",
            id: 0,
        })?;
        for buffer in [call.vertex_buffer, call.index_buffer] {
            if !self.buffers.contains_key(&buffer) {
                return Err(RenderError::InvalidHandle {
                    kind: "buffer",
                    id: buffer.0.into(),
                });
            }
        }
        let indices = self.buffers.get(&call.index_buffer).map_or(0, |b| b.data.len() / 4);
        if call.index_count as usize > indices {
            return Err(RenderError::OutOfRange {
                start: 0,
                end: call.index_count as usize,
                len: indices,
            });
        }
        self.commands.push(DeviceCommand::Draw {
            framebuffer: self.bound_framebuffer,
            program,
            index_count: call.index_count,
        });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_store_round_trip() {
        let mut device = HeadlessDevice::new();
        let id = device.create_buffer().unwrap();
        device.bind_buffer(BufferTarget::Uniform, id).unwrap();
        device.buffer_data(BufferTarget::Uniform, &[0; 8], BufferUsage::Dynamic).unwrap();
        device.buffer_sub_data(BufferTarget::Uniform, 4, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 4];
        device.get_buffer_sub_data(BufferTarget::Uniform, 4, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(device.buffer_write_count(id), 2);
        assert_eq!(device.buffer_usage(id), Some(BufferUsage::Dynamic));
    }

    #[test]
    fn test_sub_data_out_of_range() {
        let mut device = HeadlessDevice::new();
        let id = device.create_buffer().unwrap();
        device.bind_buffer(BufferTarget::Vertex, id).unwrap();
        device.buffer_data(BufferTarget::Vertex, &[0; 4], BufferUsage::Static).unwrap();
        let err = device.buffer_sub_data(BufferTarget::Vertex, 2, &[0; 4]).unwrap_err();
        assert!(matches!(err, RenderError::OutOfRange { end: 6, len: 4, .. }));
    }

    #[test]
    fn test_binding_point_limit_is_enforced() {
        let mut device = HeadlessDevice::with_limits(DeviceLimits {
            max_uniform_buffer_bindings: 2,
            max_storage_buffer_bindings: 2,
        });
        let id = device.create_buffer().unwrap();
        device.bind_buffer_base(BufferTarget::Uniform, 1, id).unwrap();
        assert_eq!(device.indexed_binding(BufferTarget::Uniform, 1), Some(id));
        assert!(device.bind_buffer_base(BufferTarget::Uniform, 2, id).is_err());
    }

    #[test]
    fn test_uniform_type_is_checked() {
        let mut device = HeadlessDevice::new();
        let program = device
            .link_program(&ShaderSources::new(
                "void main() {}",
                "uniform vec3 tint; void main() {}",
            ))
            .unwrap();
        device.use_program(program).unwrap();
        let location = device.uniform_location(program, "tint").unwrap();

        device
            .set_uniform(location, GlslType::Vec3, &UniformValue::from([1.0, 0.5, 0.0]))
            .unwrap();
        assert_eq!(
            device.uniform_value(program, location),
            Some(&UniformValue::Float(vec![1.0, 0.5, 0.0]))
        );
        assert!(device
            .set_uniform(location, GlslType::Vec3, &UniformValue::from(1))
            .is_err());
    }

    #[test]
    fn test_draw_requires_program() {
        let mut device = HeadlessDevice::new();
        let vbo = device.create_buffer().unwrap();
        let ibo = device.create_buffer().unwrap();
        let layout = crate::render::device::VertexLayout::new(&[3]);
        let call = DrawCall {
            vertex_buffer: vbo,
            index_buffer: ibo,
            layout: &layout,
            index_count: 0,
        };
        assert!(device.draw_elements(&call).is_err());
    }
}
