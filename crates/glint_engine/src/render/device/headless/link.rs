//! Program linking for the headless device
//!
//! Merges the scanned stage interfaces into the reflection data a GL driver
//! reports after `glLinkProgram`: attribute locations, plain-uniform
//! locations, and uniform-block members with std140 byte offsets.

use std::collections::{BTreeSet, HashMap};

use super::glsl::{self, Declarator, InterfaceBlock, StageInterface};
use crate::render::device::{ShaderSources, ShaderStage};
use crate::render::types::GlslType;
use crate::render::{RenderError, RenderResult};

type Structs = HashMap<String, Vec<Declarator>>;

#[derive(Debug, Clone)]
pub(super) struct LinkedAttribute {
    pub name: String,
    pub size: i32,
    pub ty: GlslType,
    pub location: u32,
}

#[derive(Debug, Clone)]
pub(super) struct LinkedUniform {
    pub name: String,
    pub size: i32,
    pub ty: GlslType,
    pub location: Option<i32>,
    pub block_index: i32,
    pub offset: i32,
}

#[derive(Debug, Clone)]
pub(super) struct LinkedBlock {
    pub name: String,
    pub binding: u32,
    pub data_size: usize,
}

/// Reflection data of a linked program
#[derive(Debug, Clone, Default)]
pub(super) struct LinkedProgram {
    pub attributes: Vec<LinkedAttribute>,
    pub uniforms: Vec<LinkedUniform>,
    pub uniform_blocks: Vec<LinkedBlock>,
    pub storage_blocks: Vec<LinkedBlock>,
}

struct Leaf {
    name: String,
    ty: GlslType,
    size: u32,
    offset: usize,
}

pub(super) fn link(sources: &ShaderSources) -> RenderResult<LinkedProgram> {
    let mut stages: Vec<(ShaderStage, StageInterface)> = Vec::new();
    for (stage, source) in sources.stages() {
        let interface = glsl::scan(source).map_err(|log| RenderError::CompileFailed {
            stage: stage.name(),
            log: format!("ERROR: 0:0: {log}"),
        })?;
        stages.push((stage, interface));
    }

    let mut log = String::new();
    for (stage, interface) in &stages {
        if !interface.has_main {
            log.push_str(&format!("error: {} shader does not define 'main'\n", stage.name()));
        }
    }
    if !log.is_empty() {
        return Err(RenderError::LinkFailed { log });
    }

    let mut program = LinkedProgram::default();
    if let Some((_, vertex)) = stages.iter().find(|(stage, _)| *stage == ShaderStage::Vertex) {
        program.attributes = link_attributes(vertex)?;
    }
    program.uniforms = link_plain_uniforms(&stages)?;

    let (uniform_blocks, members) = link_blocks(&stages, |interface| &interface.uniform_blocks)?;
    program.uniform_blocks = uniform_blocks;
    program.uniforms.extend(members);
    let (storage_blocks, _) = link_blocks(&stages, |interface| &interface.storage_blocks)?;
    program.storage_blocks = storage_blocks;

    Ok(program)
}

fn link_attributes(vertex: &StageInterface) -> RenderResult<Vec<LinkedAttribute>> {
    let mut used = BTreeSet::new();
    let mut placed: Vec<(usize, u32)> = Vec::new();

    let span = |decl: &Declarator| -> RenderResult<(GlslType, u32)> {
        let ty = GlslType::from_name(&decl.ty).ok_or_else(|| RenderError::LinkFailed {
            log: format!("error: vertex input '{}' cannot have type '{}'", decl.name, decl.ty),
        })?;
        Ok((ty, ty.columns() as u32 * decl.array_len.unwrap_or(1).max(1)))
    };

    for (i, decl) in vertex.inputs.iter().enumerate() {
        let Some(location) = decl.location else { continue };
        let (_, count) = span(decl)?;
        for slot in location..location + count {
            if !used.insert(slot) {
                return Err(RenderError::LinkFailed {
                    log: format!("error: vertex input '{}' overlaps location {slot}", decl.name),
                });
            }
        }
        placed.push((i, location));
    }
    for (i, decl) in vertex.inputs.iter().enumerate() {
        if decl.location.is_some() {
            continue;
        }
        let (_, count) = span(decl)?;
        let mut location = 0;
        while (location..location + count).any(|slot| used.contains(&slot)) {
            location += 1;
        }
        used.extend(location..location + count);
        placed.push((i, location));
    }

    let mut attributes = placed
        .into_iter()
        .map(|(i, location)| {
            let decl = &vertex.inputs[i];
            let (ty, _) = span(decl)?;
            Ok(LinkedAttribute {
                name: decl.name.clone(),
                size: decl.array_len.unwrap_or(1).max(1) as i32,
                ty,
                location,
            })
        })
        .collect::<RenderResult<Vec<_>>>()?;
    // Drivers enumerate attributes in their own order, not by location
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(attributes)
}

fn link_plain_uniforms(stages: &[(ShaderStage, StageInterface)]) -> RenderResult<Vec<LinkedUniform>> {
    let mut seen: Vec<(Leaf, Option<u32>)> = Vec::new();
    for (_, interface) in stages {
        for decl in &interface.uniforms {
            let mut leaves = Vec::new();
            let mut offset = 0;
            collect_leaves(&decl.name, &decl.ty, decl.array_len, &interface.structs, &mut offset, &mut leaves, false)?;
            let mut explicit = decl.location;
            for leaf in leaves {
                let size = leaf.size;
                if !seen.iter().any(|(known, _)| known.name == leaf.name) {
                    seen.push((leaf, explicit));
                }
                explicit = explicit.map(|location| location + size.max(1));
            }
        }
    }

    let mut used = BTreeSet::new();
    for (leaf, location) in &seen {
        if let Some(location) = location {
            for slot in *location..*location + leaf.size.max(1) {
                if !used.insert(slot) {
                    return Err(RenderError::LinkFailed {
                        log: format!("error: uniform '{}' overlaps location {slot}", leaf.name),
                    });
                }
            }
        }
    }
    let mut next = 0;
    let mut uniforms = Vec::with_capacity(seen.len());
    for (leaf, location) in seen {
        let location = match location {
            Some(location) => location,
            None => {
                while (next..next + leaf.size.max(1)).any(|slot| used.contains(&slot)) {
                    next += 1;
                }
                used.extend(next..next + leaf.size.max(1));
                next
            }
        };
        uniforms.push(LinkedUniform {
            name: leaf.name,
            size: leaf.size.max(1) as i32,
            ty: leaf.ty,
            location: Some(location as i32),
            block_index: -1,
            offset: -1,
        });
    }
    uniforms.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(uniforms)
}

fn link_blocks(
    stages: &[(ShaderStage, StageInterface)],
    blocks_of: impl Fn(&StageInterface) -> &Vec<InterfaceBlock>,
) -> RenderResult<(Vec<LinkedBlock>, Vec<LinkedUniform>)> {
    let mut blocks: Vec<LinkedBlock> = Vec::new();
    let mut members = Vec::new();
    for (_, interface) in stages {
        for block in blocks_of(interface) {
            if blocks.iter().any(|known| known.name == block.name) {
                continue;
            }
            let index = blocks.len() as i32;
            let mut offset = 0;
            let mut leaves = Vec::new();
            for member in &block.members {
                let name = match &block.instance {
                    Some(_) => format!("{}.{}", block.name, member.name),
                    None => member.name.clone(),
                };
                collect_leaves(&name, &member.ty, member.array_len, &interface.structs, &mut offset, &mut leaves, true)?;
            }
            blocks.push(LinkedBlock {
                name: block.name.clone(),
                binding: block.binding.unwrap_or(0),
                data_size: round_up(offset, 16),
            });
            members.extend(leaves.into_iter().map(|leaf| LinkedUniform {
                name: leaf.name,
                size: leaf.size.max(1) as i32,
                ty: leaf.ty,
                location: None,
                block_index: index,
                offset: leaf.offset as i32,
            }));
        }
    }
    Ok((blocks, members))
}

/// Flatten a declaration into basic-typed leaves the way GL names them,
/// assigning std140 offsets when `std140` is set.
fn collect_leaves(
    name: &str,
    ty_name: &str,
    array_len: Option<u32>,
    structs: &Structs,
    offset: &mut usize,
    leaves: &mut Vec<Leaf>,
    std140: bool,
) -> RenderResult<()> {
    if let Some(ty) = GlslType::from_name(ty_name) {
        match array_len {
            Some(len) => {
                let stride = round_up(basic_size(ty), 16);
                *offset = round_up(*offset, 16);
                leaves.push(Leaf {
                    name: format!("{name}[0]"),
                    ty,
                    size: len,
                    offset: *offset,
                });
                *offset += stride * len as usize;
            }
            None => {
                if std140 {
                    *offset = round_up(*offset, base_alignment(ty));
                }
                leaves.push(Leaf {
                    name: name.to_string(),
                    ty,
                    size: 1,
                    offset: *offset,
                });
                *offset += basic_size(ty);
            }
        }
        return Ok(());
    }

    let members = structs.get(ty_name).ok_or_else(|| RenderError::LinkFailed {
        log: format!("error: '{ty_name}' is not a known type"),
    })?;
    let align = struct_alignment(members, structs);
    let mut lay_out = |prefix: String, offset: &mut usize| -> RenderResult<()> {
        *offset = round_up(*offset, align);
        for member in members {
            collect_leaves(
                &format!("{prefix}.{}", member.name),
                &member.ty,
                member.array_len,
                structs,
                offset,
                leaves,
                std140,
            )?;
        }
        *offset = round_up(*offset, align);
        Ok(())
    };
    match array_len {
        Some(len) => {
            for i in 0..len {
                lay_out(format!("{name}[{i}]"), &mut *offset)?;
            }
        }
        None => lay_out(name.to_string(), &mut *offset)?,
    }
    Ok(())
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

fn vector_alignment(ty: GlslType) -> usize {
    let scalar = ty.scalar().size();
    match ty.rows() {
        1 => scalar,
        2 => 2 * scalar,
        _ => 4 * scalar,
    }
}

fn base_alignment(ty: GlslType) -> usize {
    if ty.is_matrix() {
        round_up(vector_alignment(ty), 16)
    } else {
        vector_alignment(ty)
    }
}

fn basic_size(ty: GlslType) -> usize {
    if ty.is_matrix() {
        ty.columns() * round_up(vector_alignment(ty), 16)
    } else {
        ty.size()
    }
}

fn struct_alignment(members: &[Declarator], structs: &Structs) -> usize {
    let widest = members
        .iter()
        .map(|member| match GlslType::from_name(&member.ty) {
            Some(ty) if member.array_len.is_some() => round_up(base_alignment(ty), 16),
            Some(ty) => base_alignment(ty),
            None => structs
                .get(&member.ty)
                .map_or(16, |inner| struct_alignment(inner, structs)),
        })
        .max()
        .unwrap_or(16);
    round_up(widest, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r"
        #version 430 core
        layout (std140) uniform Block {
            float a;
            vec3 b;
            float c;
            mat4 d;
            vec2 e[2];
            float f;
        };
        in vec3 position;
        in vec2 uv;
        layout (location = 0) in vec3 normal;
        void main() {}
    ";
    const FRAGMENT: &str = r"
        #version 430 core
        struct Material { sampler2D diffuse_map; float shininess; };
        layout (location = 4) uniform Material material;
        uniform float gamma;
        layout (binding = 2) buffer Lights { int count; };
        void main() {}
    ";

    fn linked() -> LinkedProgram {
        link(&ShaderSources::new(VERTEX, FRAGMENT)).unwrap()
    }

    #[test]
    fn test_std140_offsets() {
        let program = linked();
        let offsets: Vec<(&str, i32)> = program
            .uniforms
            .iter()
            .filter(|u| u.block_index == 0)
            .map(|u| (u.name.as_str(), u.offset))
            .collect();
        assert_eq!(
            offsets,
            [("a", 0), ("b", 16), ("c", 28), ("d", 32), ("e[0]", 96), ("f", 128)]
        );
        assert_eq!(program.uniform_blocks[0].data_size, 144);
    }

    #[test]
    fn test_attribute_locations() {
        let program = linked();
        let location = |name: &str| program.attributes.iter().find(|a| a.name == name).unwrap().location;
        assert_eq!(location("normal"), 0);
        assert_eq!(location("position"), 1);
        assert_eq!(location("uv"), 2);
    }

    #[test]
    fn test_struct_uniforms_expand_with_locations() {
        let program = linked();
        let find = |name: &str| program.uniforms.iter().find(|u| u.name == name).unwrap();
        assert_eq!(find("material.diffuse_map").location, Some(4));
        assert_eq!(find("material.shininess").location, Some(5));
        assert_eq!(find("material.diffuse_map").ty, GlslType::Sampler);
        assert_eq!(find("gamma").location, Some(0));
        assert_eq!(program.storage_blocks[0].binding, 2);
    }

    #[test]
    fn test_missing_main_fails_link() {
        let err = link(&ShaderSources::new("void main() {}", "uniform float x;")).unwrap_err();
        match err {
            RenderError::LinkFailed { log } => assert!(log.contains("fragment shader")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
