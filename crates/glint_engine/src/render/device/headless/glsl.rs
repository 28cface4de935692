//! GLSL declaration scanner
//!
//! Reads just enough of a GLSL 4.30 shader to know its interface: vertex
//! inputs, plain uniforms, uniform and storage blocks, struct definitions and
//! whether `main` is defined. Function bodies are skipped without being
//! parsed. Errors are returned as info-log text.

use std::collections::HashMap;

use crate::render::types::GlslType;

/// One declared variable or block member
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Declarator {
    pub ty: String,
    pub name: String,
    /// `Some(0)` marks a runtime-sized array
    pub array_len: Option<u32>,
    pub location: Option<u32>,
}

/// A `uniform` or `buffer` interface block
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct InterfaceBlock {
    pub name: String,
    pub instance: Option<String>,
    pub binding: Option<u32>,
    pub members: Vec<Declarator>,
}

/// Interface of one shader stage
#[derive(Debug, Default)]
pub(super) struct StageInterface {
    pub inputs: Vec<Declarator>,
    pub uniforms: Vec<Declarator>,
    pub uniform_blocks: Vec<InterfaceBlock>,
    pub storage_blocks: Vec<InterfaceBlock>,
    pub structs: HashMap<String, Vec<Declarator>>,
    pub has_main: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    In,
    Out,
    Uniform,
    Buffer,
    Local,
}

const QUALIFIERS: &[&str] = &[
    "const",
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "sample",
    "patch",
    "invariant",
    "precise",
    "highp",
    "mediump",
    "lowp",
    "readonly",
    "writeonly",
    "coherent",
    "volatile",
    "restrict",
    "shared",
];

#[derive(Debug, Default)]
struct Item {
    header: String,
    body: Option<String>,
    trailer: String,
}

type Layout = Vec<(String, Option<String>)>;

/// Scan one stage's source
pub(super) fn scan(source: &str) -> Result<StageInterface, String> {
    let cleaned: String = strip_comments(source)
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut interface = StageInterface::default();
    for item in split_items(&cleaned)? {
        let header = item.header.trim();
        match item.body {
            Some(_) if is_function_header(header) => {
                let name = header[..header.find('(').unwrap_or(header.len())].split_whitespace().last();
                if name == Some("main") {
                    interface.has_main = true;
                }
            }
            Some(body) => {
                if let Some(name) = header.strip_prefix("struct") {
                    let name = name.trim();
                    if name.is_empty() {
                        return Err("syntax error: anonymous struct".to_string());
                    }
                    interface.structs.insert(name.to_string(), parse_members(&body)?);
                } else {
                    scan_block(header, &body, item.trailer.trim(), &mut interface)?;
                }
            }
            None if header.is_empty() || is_function_header(header) => {}
            None => {
                if let Some((storage, declarators)) = parse_declaration(header)? {
                    match storage {
                        Storage::In => interface.inputs.extend(declarators),
                        Storage::Uniform => interface.uniforms.extend(declarators),
                        Storage::Out | Storage::Buffer | Storage::Local => {}
                    }
                }
            }
        }
    }

    validate_types(&interface)?;
    Ok(interface)
}

fn scan_block(header: &str, body: &str, trailer: &str, interface: &mut StageInterface) -> Result<(), String> {
    let (layout, rest) = split_layout(header)?;
    let mut storage = Storage::Local;
    let mut name = None;
    for token in rest.split_whitespace() {
        match token {
            "uniform" => storage = Storage::Uniform,
            "buffer" => storage = Storage::Buffer,
            "in" => storage = Storage::In,
            "out" => storage = Storage::Out,
            _ if QUALIFIERS.contains(&token) => {}
            other => name = Some(other.to_string()),
        }
    }
    let Some(name) = name else {
        return Err(format!("syntax error: interface block without a name near '{header}'"));
    };
    let instance = trailer
        .split('[')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let block = InterfaceBlock {
        name,
        instance,
        binding: layout_int(&layout, "binding")?,
        members: parse_members(body)?,
    };
    match storage {
        Storage::Uniform => interface.uniform_blocks.push(block),
        Storage::Buffer => interface.storage_blocks.push(block),
        // in/out blocks are stage plumbing, not part of the program interface
        Storage::In | Storage::Out | Storage::Local => {}
    }
    Ok(())
}

fn parse_members(body: &str) -> Result<Vec<Declarator>, String> {
    let mut members = Vec::new();
    for member in body.split(';').map(str::trim).filter(|m| !m.is_empty()) {
        if let Some((_, declarators)) = parse_declaration(member)? {
            members.extend(declarators);
        }
    }
    Ok(members)
}

/// Parse `[layout(...)] qualifiers* storage? type name[N]?, name2 ...`
fn parse_declaration(text: &str) -> Result<Option<(Storage, Vec<Declarator>)>, String> {
    let (layout, rest) = split_layout(text)?;
    let mut tokens = rest.split_whitespace().peekable();
    if tokens.peek() == Some(&"precision") {
        return Ok(None);
    }

    let mut storage = Storage::Local;
    let ty = loop {
        let Some(token) = tokens.next() else {
            return Err(format!("syntax error: incomplete declaration '{}'", text.trim()));
        };
        match token {
            "in" | "attribute" => storage = Storage::In,
            "out" | "varying" => storage = Storage::Out,
            "uniform" => storage = Storage::Uniform,
            "buffer" => storage = Storage::Buffer,
            _ if QUALIFIERS.contains(&token) => {}
            other => break other.to_string(),
        }
    };

    let rest: String = tokens.collect::<Vec<_>>().join(" ");
    let location = layout_int(&layout, "location")?;
    let mut declarators = Vec::new();
    for (i, part) in rest.split(',').enumerate() {
        let part = part.split('=').next().unwrap_or_default().trim();
        let (name, array_len) = match part.find('[') {
            Some(open) => {
                let close = part
                    .rfind(']')
                    .ok_or_else(|| format!("syntax error: unterminated array size in '{part}'"))?;
                let size = part[open + 1..close].trim();
                let len = if size.is_empty() {
                    0
                } else {
                    size.parse::<u32>()
                        .map_err(|_| format!("'{size}' : array size must be a constant integer expression"))?
                };
                (part[..open].trim(), Some(len))
            }
            None => (part, None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("syntax error: expected identifier after '{ty}', found '{part}'"));
        }
        declarators.push(Declarator {
            ty: ty.clone(),
            name: name.to_string(),
            array_len,
            location: if i == 0 { location } else { None },
        });
    }
    Ok(Some((storage, declarators)))
}

fn split_layout(text: &str) -> Result<(Layout, String), String> {
    let trimmed = text.trim_start();
    let Some(after) = trimmed.strip_prefix("layout") else {
        return Ok((Vec::new(), trimmed.to_string()));
    };
    let Some(inner) = after.trim_start().strip_prefix('(') else {
        return Err("syntax error: expected '(' after 'layout'".to_string());
    };
    let Some(close) = inner.find(')') else {
        return Err("syntax error: unterminated layout qualifier".to_string());
    };
    let qualifiers = inner[..close]
        .split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| match q.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), Some(value.trim().to_string())),
            None => (q.to_string(), None),
        })
        .collect();
    Ok((qualifiers, inner[close + 1..].to_string()))
}

fn layout_int(layout: &Layout, key: &str) -> Result<Option<u32>, String> {
    layout
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, value)| value.as_deref())
        .map(|value| {
            value
                .parse::<u32>()
                .map_err(|_| format!("'{key}' : invalid layout value '{value}'"))
        })
        .transpose()
}

fn is_function_header(header: &str) -> bool {
    let header = header.trim_start();
    !header.starts_with("layout") && header.contains('(')
}

fn split_items(source: &str) -> Result<Vec<Item>, String> {
    let mut items = Vec::new();
    let mut current = Item::default();
    let mut body = String::new();
    let mut has_body = false;
    let mut depth = 0usize;

    for c in source.chars() {
        match c {
            '{' => {
                if depth > 0 {
                    body.push(c);
                } else {
                    has_body = true;
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err("syntax error: unexpected '}'".to_string());
                }
                depth -= 1;
                if depth > 0 {
                    body.push(c);
                } else if is_function_header(&current.header) {
                    current.body = Some(std::mem::take(&mut body));
                    items.push(std::mem::take(&mut current));
                    has_body = false;
                }
            }
            ';' if depth == 0 => {
                if has_body {
                    current.body = Some(std::mem::take(&mut body));
                }
                items.push(std::mem::take(&mut current));
                has_body = false;
            }
            _ if depth > 0 => body.push(c),
            _ if has_body => current.trailer.push(c),
            _ => current.header.push(c),
        }
    }

    if depth > 0 {
        return Err("syntax error: unexpected end of file, missing '}'".to_string());
    }
    if has_body || !current.header.trim().is_empty() {
        return Err(format!(
            "syntax error: unexpected end of file after '{}'",
            current.header.trim()
        ));
    }
    Ok(items)
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        if c == '\n' {
                            out.push('\n');
                        }
                        prev = c;
                    }
                    out.push(' ');
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

fn validate_types(interface: &StageInterface) -> Result<(), String> {
    let known = |ty: &str| GlslType::from_name(ty).is_some() || interface.structs.contains_key(ty);
    let struct_members = interface.structs.values().flatten();
    let block_members = interface
        .uniform_blocks
        .iter()
        .chain(&interface.storage_blocks)
        .flat_map(|block| &block.members);
    for declarator in interface
        .inputs
        .iter()
        .chain(&interface.uniforms)
        .chain(struct_members)
        .chain(block_members)
    {
        if !known(&declarator.ty) {
            return Err(format!("'{}' : undeclared identifier", declarator.ty));
        }
    }
    Ok(())
}
