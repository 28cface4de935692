//! Program introspection
//!
//! Collects everything the renderer needs to know about a linked program
//! from the device's reflection queries:
//!
//! - attributes, placed by their queried location
//! - active uniforms with their block index and block byte offset
//! - uniform blocks with index and current binding
//! - storage blocks with resource index and current binding

use crate::render::device::{GraphicsDevice, ProgramId, UniformParameter};
use crate::render::types::GlslType;
use crate::render::{RenderError, RenderResult};

/// One vertex attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Attribute name
    pub name: String,
    /// Array size
    pub size: i32,
    /// Reflected type
    pub ty: GlslType,
    /// Attribute location
    pub location: u32,
}

/// One active uniform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    /// Name as reported by the driver
    pub name: String,
    /// Array size
    pub size: i32,
    /// Reflected type
    pub ty: GlslType,
    /// Owning uniform block, -1 for plain uniforms
    pub block_index: i32,
    /// Byte offset in the owning block, -1 for plain uniforms
    pub offset: i32,
}

impl UniformInfo {
    /// Whether the uniform lives in a uniform block
    pub fn in_block(&self) -> bool {
        self.block_index >= 0
    }

    /// Bytes covered by the uniform: array size times type size
    pub fn byte_size(&self) -> usize {
        self.size.max(1) as usize * self.ty.size()
    }
}

/// One uniform or storage block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block name
    pub name: String,
    /// Block or resource index
    pub index: u32,
    /// Binding point assigned at reflection time
    pub binding: u32,
}

/// Reflected interface of a linked program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramIntrospection {
    /// Attributes ordered by location
    pub attributes: Vec<AttributeInfo>,
    /// Active uniforms in driver order
    pub uniforms: Vec<UniformInfo>,
    /// Uniform blocks ordered by index
    pub uniform_blocks: Vec<BlockInfo>,
    /// Storage blocks ordered by index
    pub storage_blocks: Vec<BlockInfo>,
}

impl ProgramIntrospection {
    /// Query the device for a program's interface
    pub fn reflect(device: &dyn GraphicsDevice, program: ProgramId) -> RenderResult<Self> {
        Ok(Self {
            attributes: reflect_attributes(device, program)?,
            uniforms: reflect_uniforms(device, program)?,
            uniform_blocks: reflect_blocks(
                device.uniform_block_names(program)?,
                |name| device.uniform_block_index(program, name),
                |index| device.uniform_block_binding_point(program, index),
            )?,
            storage_blocks: reflect_blocks(
                device.storage_block_names(program)?,
                |name| device.storage_block_index(program, name),
                |index| device.storage_block_binding_point(program, index),
            )?,
        })
    }

    /// Plain uniforms only
    pub fn plain_uniforms(&self) -> impl Iterator<Item = &UniformInfo> {
        self.uniforms.iter().filter(|u| !u.in_block())
    }

    /// Members of one uniform block
    pub fn block_members(&self, block_index: u32) -> impl Iterator<Item = &UniformInfo> {
        self.uniforms
            .iter()
            .filter(move |u| u.block_index == block_index as i32)
    }

    /// Attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

fn reflect_attributes(device: &dyn GraphicsDevice, program: ProgramId) -> RenderResult<Vec<AttributeInfo>> {
    let active = device.active_attributes(program)?;
    let count = active.len();
    let mut placed: Vec<Option<AttributeInfo>> = vec![None; count];
    for variable in active {
        let location = device
            .attribute_location(program, &variable.name)
            .ok_or_else(|| RenderError::InvalidAttributeLocation {
                name: variable.name.clone(),
                location: u32::MAX,
                count,
            })?;
        let slot = placed
            .get_mut(location as usize)
            .ok_or_else(|| RenderError::InvalidAttributeLocation {
                name: variable.name.clone(),
                location,
                count,
            })?;
        *slot = Some(AttributeInfo {
            name: variable.name,
            size: variable.size,
            ty: variable.ty,
            location,
        });
    }
    // With every location below `count` and one attribute per location, no
    // slot can stay empty.
    placed
        .into_iter()
        .enumerate()
        .map(|(location, slot)| {
            slot.ok_or_else(|| RenderError::InvalidAttributeLocation {
                name: format!("<unused location {location}>"),
                location: location as u32,
                count,
            })
        })
        .collect()
}

fn reflect_uniforms(device: &dyn GraphicsDevice, program: ProgramId) -> RenderResult<Vec<UniformInfo>> {
    let active = device.active_uniforms(program)?;
    let indices: Vec<u32> = (0..active.len() as u32).collect();
    let block_indices = device.active_uniforms_parameter(program, &indices, UniformParameter::BlockIndex)?;
    let offsets = device.active_uniforms_parameter(program, &indices, UniformParameter::Offset)?;
    Ok(active
        .into_iter()
        .zip(block_indices)
        .zip(offsets)
        .map(|((variable, block_index), offset)| UniformInfo {
            name: variable.name,
            size: variable.size,
            ty: variable.ty,
            block_index,
            offset,
        })
        .collect())
}

fn reflect_blocks(
    names: Vec<String>,
    index_of: impl Fn(&str) -> Option<u32>,
    binding_of: impl Fn(u32) -> RenderResult<u32>,
) -> RenderResult<Vec<BlockInfo>> {
    let mut blocks = names
        .into_iter()
        .map(|name| {
            let index = index_of(&name).ok_or_else(|| RenderError::InvalidHandle {
                kind: "interface block",
                id: u64::from(u32::MAX),
            })?;
            Ok(BlockInfo {
                binding: binding_of(index)?,
                name,
                index,
            })
        })
        .collect::<RenderResult<Vec<_>>>()?;
    blocks.sort_by_key(|block| block.index);
    Ok(blocks)
}
