//! Structured-buffer layout engine
//!
//! A [`StructLayout`] turns an ordered list of `(name, component count)`
//! fields into element offsets inside a repeating frame. Frames start after
//! an optional header of `struct_offset` elements:
//!
//! ```text
//! | header (struct_offset) | frame 0 (stride) | frame 1 (stride) | ...
//! ```
//!
//! No alignment is inserted. Callers mirror std140/std430 rules by declaring
//! padding fields explicitly, e.g. `vec3` followed by `FieldSpec::padding(1)`.

use std::collections::HashMap;
use std::ops::Range;

use crate::render::{RenderError, RenderResult};

/// One field of a structure: a name and a component count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name; names made only of underscores mark padding
    pub name: String,
    /// Number of buffer elements
    pub len: usize,
}

impl FieldSpec {
    /// A named field
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self { name: name.into(), len }
    }

    /// Anonymous padding that occupies stride but has no accessor
    pub fn padding(len: usize) -> Self {
        Self::new("_", len)
    }

    /// Whether this field is padding
    pub fn is_padding(&self) -> bool {
        !self.name.is_empty() && self.name.chars().all(|c| c == '_')
    }
}

impl<S: Into<String>> From<(S, usize)> for FieldSpec {
    fn from((name, len): (S, usize)) -> Self {
        Self::new(name, len)
    }
}

/// Typed access to one field, resolved once when the layout is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAccessor {
    offset: usize,
    len: usize,
}

impl FieldAccessor {
    /// Offset of the field inside a frame
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Component count
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` for zero-length fields
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element range of the field in the frame starting at `frame_start`
    pub fn range(&self, frame_start: usize) -> Range<usize> {
        frame_start + self.offset..frame_start + self.offset + self.len
    }

    /// Read the field out of a buffer
    pub fn read<'a, T>(&self, data: &'a [T], frame_start: usize) -> RenderResult<&'a [T]> {
        let range = self.range(frame_start);
        data.get(range.clone()).ok_or(RenderError::OutOfRange {
            start: range.start,
            end: range.end,
            len: data.len(),
        })
    }

    /// Write the field into a buffer; `values` must fill it exactly
    pub fn write<T: Copy>(&self, data: &mut [T], frame_start: usize, values: &[T]) -> RenderResult<()> {
        if values.len() != self.len {
            return Err(RenderError::LengthMismatch {
                expected: self.len,
                actual: values.len(),
            });
        }
        let range = self.range(frame_start);
        let len = data.len();
        data.get_mut(range.clone())
            .ok_or(RenderError::OutOfRange {
                start: range.start,
                end: range.end,
                len,
            })?
            .copy_from_slice(values);
        Ok(())
    }
}

/// Field list compiled to offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    name: String,
    fields: Vec<FieldSpec>,
    accessors: HashMap<String, FieldAccessor>,
    struct_len: usize,
    struct_offset: usize,
}

impl StructLayout {
    /// Compile `fields` into cumulative offsets
    ///
    /// Duplicate field names are rejected. `name` identifies the layout in
    /// error messages.
    pub fn new(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldSpec>,
        struct_offset: usize,
    ) -> RenderResult<Self> {
        let mut layout = Self {
            name: name.into(),
            fields: Vec::new(),
            accessors: HashMap::new(),
            struct_len: 0,
            struct_offset,
        };
        for field in fields {
            if !field.is_padding() {
                if layout.accessors.contains_key(&field.name) {
                    return Err(RenderError::InvalidLayout(format!(
                        "field '{}' appears twice in '{}'",
                        field.name, layout.name
                    )));
                }
                layout.accessors.insert(
                    field.name.clone(),
                    FieldAccessor {
                        offset: layout.struct_len,
                        len: field.len,
                    },
                );
            }
            layout.struct_len += field.len;
            layout.fields.push(field);
        }
        Ok(layout)
    }

    /// Layout name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, padding included
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Frame stride in elements
    pub fn struct_len(&self) -> usize {
        self.struct_len
    }

    /// Header length in elements
    pub fn struct_offset(&self) -> usize {
        self.struct_offset
    }

    /// Whether a named field exists
    pub fn has_field(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    /// Names of every accessible field
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    /// Accessor of a named field
    pub fn accessor(&self, name: &str) -> RenderResult<FieldAccessor> {
        self.accessors
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::UnknownField {
                buffer: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Register an extra named range without changing the stride
    ///
    /// The range is not checked against the stride; see
    /// [`StructLayout::add_frame_elem`] for repeating frames.
    pub fn add_elem(&mut self, name: impl Into<String>, offset: usize, len: usize) {
        self.accessors.insert(name.into(), FieldAccessor { offset, len });
    }

    /// Register an extra named range that must fit inside one frame
    pub fn add_frame_elem(&mut self, name: impl Into<String>, offset: usize, len: usize) -> RenderResult<()> {
        let name = name.into();
        if offset + len > self.struct_len {
            return Err(RenderError::InvalidLayout(format!(
                "'{}': field '{name}' spans {offset}..{} past the {}-element stride",
                self.name,
                offset + len,
                self.struct_len
            )));
        }
        self.add_elem(name, offset, len);
        Ok(())
    }

    /// `(start, stride)` of frame `index`, header included
    pub fn get_frame_pointer(&self, index: usize) -> (usize, usize) {
        (self.struct_offset + index * self.struct_len, self.struct_len)
    }

    /// Element range of a field in frame `index`, header included
    pub fn get_value_pointers(&self, name: &str, index: usize) -> RenderResult<Range<usize>> {
        let (frame_start, _) = self.get_frame_pointer(index);
        Ok(self.accessor(name)?.range(frame_start))
    }

    /// One zero-initialized frame with the named fields filled in
    pub fn generate_frame(&self, values: &[(&str, &[f32])]) -> RenderResult<Vec<f32>> {
        let mut frame = vec![0.0; self.struct_len];
        for (name, value) in values {
            let accessor = self.accessor(name)?;
            if accessor.offset + accessor.len > self.struct_len {
                return Err(RenderError::InvalidLayout(format!(
                    "field '{name}' of '{}' lies outside the frame",
                    self.name
                )));
            }
            accessor.write(&mut frame, 0, value)?;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(fields: &[(&str, usize)], offset: usize) -> StructLayout {
        StructLayout::new("Test", fields.iter().map(|&(n, l)| FieldSpec::new(n, l)), offset).unwrap()
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let layout = layout(&[("a", 3), ("b", 1), ("c", 4)], 0);
        assert_eq!(layout.accessor("a").unwrap().offset(), 0);
        assert_eq!(layout.accessor("b").unwrap().offset(), 3);
        assert_eq!(layout.accessor("c").unwrap().offset(), 4);
        assert_eq!(layout.struct_len(), 8);
    }

    #[test]
    fn test_frame_pointer_includes_header() {
        let layout = layout(&[("a", 12)], 4);
        assert_eq!(layout.get_frame_pointer(2), (28, 12));
        assert_eq!(layout.get_value_pointers("a", 1).unwrap(), 16..28);
    }

    #[test]
    fn test_padding_consumes_stride() {
        let layout = layout(&[("pos", 3), ("_", 1), ("normal", 3), ("__", 1)], 0);
        assert_eq!(layout.struct_len(), 8);
        assert_eq!(layout.accessor("normal").unwrap().offset(), 4);
        assert!(!layout.has_field("_"));
        assert!(!layout.has_field("__"));
    }

    #[test]
    fn test_unknown_field() {
        let layout = layout(&[("a", 1)], 0);
        assert!(matches!(
            layout.get_value_pointers("missing", 0),
            Err(RenderError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = StructLayout::new("Dup", [FieldSpec::new("a", 1), FieldSpec::new("a", 2)], 0);
        assert!(matches!(result, Err(RenderError::InvalidLayout(_))));
    }

    #[test]
    fn test_generate_frame() {
        let layout = layout(&[("color", 3), ("intensity", 1)], 4);
        let frame = layout.generate_frame(&[("intensity", &[2.0])]).unwrap();
        assert_eq!(frame, vec![0.0, 0.0, 0.0, 2.0]);
        assert!(matches!(
            layout.generate_frame(&[("color", &[1.0])]),
            Err(RenderError::LengthMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_add_elem_keeps_stride() {
        let mut layout = layout(&[("a", 4)], 0);
        layout.add_elem("a_tail", 2, 2);
        assert_eq!(layout.struct_len(), 4);
        assert_eq!(layout.get_value_pointers("a_tail", 1).unwrap(), 6..8);
    }

    #[test]
    fn test_frame_elem_must_fit_stride() {
        let mut layout = layout(&[("color", 3), ("intensity", 1)], 4);
        layout.add_frame_elem("rgb_i", 0, 4).unwrap();
        assert!(matches!(
            layout.add_frame_elem("wide", 2, 4),
            Err(RenderError::InvalidLayout(_))
        ));
        assert!(!layout.has_field("wide"));
    }
}
