//! Struct layouts.
//!
//! A [`StructDefinition`] lists named fields with their types, byte offsets
//! and sizes.  Definitions are parsed from a field list such as
//!
//! ```text
//! Int x; Int y
//! Char name[16]
//! Ptr next, UInt* counter
//! ```
//!
//! where each entry is `Type [*...] name [[count]]` and entries are separated
//! by commas, semicolons or newlines, or assembled with a [`StructBuilder`].
//! Fields are laid out in order at their natural alignment (the scalar size,
//! at most 8) and the total size is padded to the largest alignment.
//! Pointers are 8 bytes.  `Char` and `WChar` arrays hold UTF-8 and UTF-16
//! text respectively.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{TesseraError, TesseraResult};
use crate::native::memory::POINTER_SIZE;
use crate::objects::key::eq_ignore_case;

/// How the bytes of a scalar are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Signed,
    Unsigned,
    Float,
}

/// Text encoding of a character array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16,
}

/// Type of one field.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// A number of `size` bytes.  Arrays of a scalar with a text encoding
    /// read and write as strings.
    Scalar {
        size: usize,
        kind: ScalarKind,
        text: Option<TextEncoding>,
    },
    /// A nested struct.
    Struct(Rc<StructDefinition>),
}

/// Longest inline array accepted by [`StructDefinition::parse`].
pub const MAX_ARRAY_LEN: usize = 1 << 24;

const SCALAR_TYPES: &[(&str, usize, ScalarKind, Option<TextEncoding>)] = &[
    ("Char", 1, ScalarKind::Signed, Some(TextEncoding::Utf8)),
    ("UChar", 1, ScalarKind::Unsigned, None),
    ("Byte", 1, ScalarKind::Unsigned, None),
    ("Bool", 1, ScalarKind::Unsigned, None),
    ("Short", 2, ScalarKind::Signed, None),
    ("UShort", 2, ScalarKind::Unsigned, None),
    ("Word", 2, ScalarKind::Unsigned, None),
    ("WChar", 2, ScalarKind::Unsigned, Some(TextEncoding::Utf16)),
    ("Int", 4, ScalarKind::Signed, None),
    ("Long", 4, ScalarKind::Signed, None),
    ("UInt", 4, ScalarKind::Unsigned, None),
    ("ULong", 4, ScalarKind::Unsigned, None),
    ("DWord", 4, ScalarKind::Unsigned, None),
    ("Float", 4, ScalarKind::Float, None),
    ("Int64", 8, ScalarKind::Signed, None),
    ("UInt64", 8, ScalarKind::Unsigned, None),
    ("Double", 8, ScalarKind::Float, None),
    ("Ptr", 8, ScalarKind::Signed, None),
    ("UPtr", 8, ScalarKind::Unsigned, None),
];

impl FieldType {
    /// Looks up a scalar type by name, ignoring case.
    pub fn scalar(name: &str) -> Option<Self> {
        SCALAR_TYPES
            .iter()
            .find(|(n, ..)| n.eq_ignore_ascii_case(name))
            .map(|&(_, size, kind, text)| Self::Scalar { size, kind, text })
    }

    /// Size of one value in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Scalar { size, .. } => *size,
            Self::Struct(def) => def.size(),
        }
    }

    /// Natural alignment in bytes.
    pub fn align(&self) -> usize {
        match self {
            Self::Scalar { size, .. } => (*size).clamp(1, 8),
            Self::Struct(def) => def.align(),
        }
    }
}

/// One laid-out field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    ty: FieldType,
    offset: usize,
    pointer_depth: u8,
    count: Option<usize>,
}

impl FieldDescriptor {
    /// Field name as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    /// Byte offset within the struct.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of `*` in the declaration.
    pub fn pointer_depth(&self) -> u8 {
        self.pointer_depth
    }

    /// Returns `true` if the field stores an address.
    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }

    /// Element count of an array field.
    pub fn array_len(&self) -> Option<usize> {
        self.count
    }

    /// Bytes taken by one element in the struct.
    pub fn element_size(&self) -> usize {
        if self.is_pointer() {
            POINTER_SIZE
        } else {
            self.ty.size()
        }
    }

    /// Bytes taken by the whole field in the struct.
    pub fn storage_size(&self) -> usize {
        self.element_size() * self.count.unwrap_or(1)
    }

    /// Alignment of the field in the struct.
    pub fn align(&self) -> usize {
        if self.is_pointer() {
            POINTER_SIZE
        } else {
            self.ty.align()
        }
    }

    /// Text encoding if the field is an inline character array.
    pub fn text_encoding(&self) -> Option<TextEncoding> {
        match (&self.ty, self.count, self.is_pointer()) {
            (FieldType::Scalar { text, .. }, Some(_), false) => *text,
            _ => None,
        }
    }

    /// The nested definition of a struct-typed field.
    pub fn struct_definition(&self) -> Option<&Rc<StructDefinition>> {
        match &self.ty {
            FieldType::Struct(def) => Some(def),
            FieldType::Scalar { .. } => None,
        }
    }
}

/// A complete struct layout.
#[derive(Debug, Clone)]
pub struct StructDefinition {
    fields: SmallVec<[FieldDescriptor; 8]>,
    size: usize,
    align: usize,
}

impl StructDefinition {
    /// Starts an empty layout.
    pub fn builder() -> StructBuilder {
        StructBuilder::default()
    }

    /// Parses a field list that uses only scalar types.
    pub fn parse(text: &str) -> TesseraResult<Rc<Self>> {
        Self::parse_with(text, |_| None)
    }

    /// Parses a field list, resolving non-scalar type names with `resolve`.
    pub fn parse_with(
        text: &str,
        resolve: impl Fn(&str) -> Option<Rc<StructDefinition>>,
    ) -> TesseraResult<Rc<Self>> {
        let mut builder = Self::builder();
        for entry in text.split([',', ';', '\n']) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let decl = parse_entry(entry)?;
            let ty = match FieldType::scalar(decl.type_name) {
                Some(ty) => ty,
                None => FieldType::Struct(resolve(decl.type_name).ok_or_else(|| {
                    TesseraError::DefinitionError(format!("unknown type '{}'", decl.type_name))
                })?),
            };
            builder = builder.add(decl.name, ty, decl.pointer_depth, decl.count)?;
        }
        builder.build()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Total size in bytes, including trailing padding.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Largest field alignment.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Finds a field by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| eq_ignore_case(&f.name, name))
    }
}

/// Incremental constructor for a [`StructDefinition`].
#[derive(Debug, Default)]
pub struct StructBuilder {
    fields: SmallVec<[FieldDescriptor; 8]>,
    offset: usize,
    align: usize,
}

impl StructBuilder {
    /// Appends a field.  `count` makes it an inline array.
    pub fn add(
        mut self,
        name: impl Into<String>,
        ty: FieldType,
        pointer_depth: u8,
        count: Option<usize>,
    ) -> TesseraResult<Self> {
        let mut field = FieldDescriptor {
            name: name.into(),
            ty,
            offset: 0,
            pointer_depth,
            count,
        };
        let too_large = || TesseraError::DefinitionError(format!("field '{}' is too large", field.name));
        let align = field.align();
        let storage = field
            .element_size()
            .checked_mul(field.count.unwrap_or(1))
            .ok_or_else(too_large)?;
        let offset = self
            .offset
            .checked_next_multiple_of(align)
            .ok_or_else(too_large)?;
        self.offset = offset.checked_add(storage).ok_or_else(too_large)?;
        field.offset = offset;
        self.align = self.align.max(align);
        self.fields.push(field);
        Ok(self)
    }

    /// Appends a scalar field by type name.
    pub fn scalar(self, name: impl Into<String>, type_name: &str) -> TesseraResult<Self> {
        let ty = FieldType::scalar(type_name)
            .ok_or_else(|| TesseraError::DefinitionError(format!("unknown type '{type_name}'")))?;
        self.add(name, ty, 0, None)
    }

    /// Appends a nested struct field.
    pub fn nested(self, name: impl Into<String>, def: Rc<StructDefinition>) -> TesseraResult<Self> {
        self.add(name, FieldType::Struct(def), 0, None)
    }

    /// Finishes the layout.  Field names must be unique ignoring case.
    pub fn build(self) -> TesseraResult<Rc<StructDefinition>> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| eq_ignore_case(&f.name, &field.name)) {
                return Err(TesseraError::DefinitionError(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        let align = self.align.max(1);
        let size = self
            .offset
            .checked_next_multiple_of(align)
            .ok_or_else(|| TesseraError::DefinitionError("struct is too large".into()))?;
        Ok(Rc::new(StructDefinition {
            size,
            align,
            fields: self.fields,
        }))
    }
}

struct Declaration<'a> {
    type_name: &'a str,
    name: &'a str,
    pointer_depth: u8,
    count: Option<usize>,
}

fn parse_entry(entry: &str) -> TesseraResult<Declaration<'_>> {
    let bad = |why: &str| TesseraError::DefinitionError(format!("{why} in '{entry}'"));

    let (decl, count) = match entry.find('[') {
        Some(open) => {
            let inner = entry[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| bad("unterminated array length"))?;
            let count: usize = inner
                .trim()
                .parse()
                .map_err(|_| bad("bad array length"))?;
            if count == 0 || count > MAX_ARRAY_LEN {
                return Err(bad("array length out of range"));
            }
            (entry[..open].trim_end(), Some(count))
        }
        None => (entry, None),
    };

    let type_end = decl
        .find(|c: char| c.is_whitespace() || c == '*')
        .ok_or_else(|| bad("missing field name"))?;
    let type_name = &decl[..type_end];
    let rest = &decl[type_end..];
    let name = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '*');
    let stars = rest[..rest.len() - name.len()].matches('*').count();

    let is_ident = |s: &str| {
        !s.is_empty()
            && !s.starts_with(|c: char| c.is_ascii_digit())
            && s.chars().all(|c| c.is_alphanumeric() || c == '_')
    };
    if !is_ident(type_name) {
        return Err(bad("bad type name"));
    }
    if !is_ident(name) {
        return Err(bad("bad field name"));
    }
    Ok(Declaration {
        type_name,
        name,
        pointer_depth: u8::try_from(stars).map_err(|_| bad("too many '*'"))?,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(def: &StructDefinition) -> Vec<(String, usize)> {
        def.fields()
            .iter()
            .map(|f| (f.name().to_owned(), f.offset()))
            .collect()
    }

    // ── parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_two_ints() {
        let def = StructDefinition::parse("Int lo; Int hi").unwrap();
        assert_eq!(def.size(), 8);
        assert_eq!(offsets(&def), [("lo".to_owned(), 0), ("hi".to_owned(), 4)]);
    }

    #[test]
    fn test_parse_separators_and_case() {
        let def = StructDefinition::parse("byte a,\n  UINT b ; double c").unwrap();
        assert_eq!(def.fields().len(), 3);
        assert_eq!(def.find("B").unwrap().offset(), 4);
        assert_eq!(def.find("c").unwrap().offset(), 8);
        assert_eq!(def.size(), 16);
    }

    #[test]
    fn test_parse_pointer_and_array() {
        let def = StructDefinition::parse("Char name[5]; Int* p; Short **pp").unwrap();
        let name = def.find("name").unwrap();
        assert_eq!(name.array_len(), Some(5));
        assert_eq!(name.text_encoding(), Some(TextEncoding::Utf8));
        let p = def.find("p").unwrap();
        assert_eq!(p.pointer_depth(), 1);
        assert_eq!(p.offset(), 8);
        assert_eq!(def.find("pp").unwrap().pointer_depth(), 2);
        assert_eq!(def.size(), 24);
    }

    #[test]
    fn test_parse_errors() {
        for text in ["Int", "Nope x", "Int x[", "Int x[0]", "Int x[99999999]", "Int 1x", "Int a; Int A"] {
            assert!(
                matches!(StructDefinition::parse(text), Err(TesseraError::DefinitionError(_))),
                "{text:?}"
            );
        }
    }

    #[test]
    fn test_parse_with_nested_type() {
        let point = StructDefinition::parse("Int x; Int y").unwrap();
        let def = StructDefinition::parse_with("Byte tag; Point origin", |name| {
            eq_ignore_case(name, "point").then(|| Rc::clone(&point))
        })
        .unwrap();
        assert_eq!(def.find("origin").unwrap().offset(), 4);
        assert_eq!(def.size(), 12);
    }

    // ── layout ────────────────────────────────────────────────────────────────

    #[test]
    fn test_padding_to_largest_alignment() {
        let def = StructDefinition::parse("Int64 a; Byte b").unwrap();
        assert_eq!(def.align(), 8);
        assert_eq!(def.size(), 16);
    }

    #[test]
    fn test_builder_matches_parser() {
        let built = StructDefinition::builder()
            .scalar("lo", "Int")
            .unwrap()
            .scalar("hi", "Int")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(built.size(), 8);
        assert!(StructDefinition::builder().scalar("x", "Quad").is_err());
    }

    #[test]
    fn test_nested_arrays_overflowing_layout_are_rejected() {
        let bytes = StructDefinition::parse("Byte b[16777216]").unwrap();
        let wide = StructDefinition::parse_with("Row r[16777216]", |_| Some(Rc::clone(&bytes)))
            .unwrap();
        assert_eq!(wide.size(), 1 << 48);
        let err = StructDefinition::parse_with("Grid g[16777216]", |_| Some(Rc::clone(&wide)))
            .unwrap_err();
        assert!(matches!(err, TesseraError::DefinitionError(_)));

        let tail = StructDefinition::builder()
            .nested("a", Rc::clone(&wide))
            .unwrap()
            .add("b", FieldType::Struct(Rc::clone(&wide)), 0, Some(MAX_ARRAY_LEN));
        assert!(tail.is_err());
    }

    #[test]
    fn test_wchar_array_is_utf16_text() {
        let def = StructDefinition::parse("WChar title[8]; WChar single").unwrap();
        assert_eq!(def.find("title").unwrap().text_encoding(), Some(TextEncoding::Utf16));
        assert_eq!(def.find("single").unwrap().text_encoding(), None);
        assert_eq!(def.size(), 18);
    }
}
