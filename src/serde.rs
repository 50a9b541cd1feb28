//! JSON-deserializable layout definitions.
//!
//! These types describe layouts as plain data, for example a file shipped
//! next to an application, and convert into [TypeLayout] through
//! [LayoutDefs::resolve] or `TryFrom`. Struct and enum fields refer to other
//! definitions by name. Custom codecs cannot be expressed here.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{LayoutError, LayoutErrorKind, LayoutFault},
    layout::{CollectionTag, ElementLayout, EnumType, FieldLayout, Shape, StringTag, Tag, TypeLayout},
    primitive::{Endianness, PrimitiveKind},
    text::Encoding,
};

/// A set of type and enum definitions with the name of the root type.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LayoutDefs {
    pub root: String,
    pub types: Vec<TypeLayoutDef>,
    #[serde(default)]
    pub enums: Vec<EnumDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TypeLayoutDef {
    pub name: String,
    #[serde(default)]
    pub endianness: Option<Endianness>,
    pub fields: Vec<FieldLayoutDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldLayoutDef {
    pub name: String,
    /// Fields without an order are declared but never serialized.
    #[serde(default)]
    pub order: Option<u32>,
    pub shape: ShapeDef,
    #[serde(default)]
    pub tag: Option<TagDef>,
    #[serde(default)]
    pub endianness: Option<Endianness>,
    #[serde(default)]
    pub bits: Option<u32>,
    #[serde(default)]
    pub pad_after: bool,
    /// Length key this field carries.
    #[serde(default)]
    pub length_of: Option<String>,
    #[serde(default = "serialized")]
    pub serialize: bool,
}

fn serialized() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum ShapeDef {
    Scalar { kind: PrimitiveKind },
    /// Reference to an entry of [LayoutDefs::enums].
    Enum { name: String },
    String,
    List { element: Box<ElementDef> },
    /// Reference to an entry of [LayoutDefs::types].
    Struct { name: String },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ElementDef {
    pub shape: ShapeDef,
    #[serde(default)]
    pub tag: Option<TagDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum TagDef {
    Primitive,
    Boolean {
        #[serde(default)]
        equivalent: Option<PrimitiveKind>,
    },
    Enum {
        #[serde(default)]
        equivalent: Option<PrimitiveKind>,
    },
    String {
        encoding: Encoding,
        #[serde(default)]
        null_terminated: bool,
        #[serde(default)]
        fixed_length: Option<usize>,
        #[serde(default)]
        length_key: Option<String>,
    },
    Collection {
        #[serde(default)]
        fixed_length: Option<usize>,
        #[serde(default)]
        length_key: Option<String>,
    },
    Composite,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnumDef {
    pub name: String,
    pub underlying: PrimitiveKind,
    pub members: Vec<EnumMemberDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnumMemberDef {
    pub name: String,
    pub value: i64,
}

impl From<&EnumDef> for EnumType {
    fn from(def: &EnumDef) -> Self {
        def.members
            .iter()
            .fold(EnumType::new(&def.name, def.underlying), |ty, member| {
                ty.member(&member.name, member.value as i128)
            })
    }
}

impl From<&TagDef> for Tag {
    fn from(def: &TagDef) -> Self {
        match def {
            TagDef::Primitive => Tag::Primitive,
            TagDef::Boolean { equivalent } => Tag::Boolean {
                equivalent: *equivalent,
            },
            TagDef::Enum { equivalent } => Tag::Enum {
                equivalent: *equivalent,
            },
            TagDef::String {
                encoding,
                null_terminated,
                fixed_length,
                length_key,
            } => Tag::String(StringTag {
                encoding: *encoding,
                null_terminated: *null_terminated,
                fixed_length: *fixed_length,
                length_key: length_key.clone(),
            }),
            TagDef::Collection {
                fixed_length,
                length_key,
            } => Tag::Collection(CollectionTag {
                fixed_length: *fixed_length,
                length_key: length_key.clone(),
            }),
            TagDef::Composite => Tag::Composite,
        }
    }
}

impl LayoutDefs {
    /// Builds the layout of the type called `name`, resolving references.
    pub fn resolve(&self, name: &str) -> Result<TypeLayout, LayoutError> {
        let mut resolver = Resolver {
            types: self.types.iter().map(|ty| (ty.name.as_str(), ty)).collect(),
            enums: self
                .enums
                .iter()
                .map(|def| (def.name.as_str(), Arc::new(EnumType::from(def))))
                .collect(),
            built: HashMap::new(),
            stack: Vec::new(),
        };

        match resolver.types.get(name).copied() {
            Some(def) => resolver.build(def),
            None => Err(LayoutError::new(
                name,
                None,
                LayoutErrorKind::UnknownType(name.to_string()),
            )),
        }
    }
}

impl TryFrom<&LayoutDefs> for TypeLayout {
    type Error = LayoutError;

    fn try_from(defs: &LayoutDefs) -> Result<Self, Self::Error> {
        defs.resolve(&defs.root)
    }
}

struct Resolver<'d> {
    types: HashMap<&'d str, &'d TypeLayoutDef>,
    enums: HashMap<&'d str, Arc<EnumType>>,
    /// Struct layouts already built, shared between the fields using them.
    built: HashMap<&'d str, Arc<TypeLayout>>,
    stack: Vec<&'d str>,
}

impl<'d> Resolver<'d> {
    fn build(&mut self, def: &'d TypeLayoutDef) -> Result<TypeLayout, LayoutError> {
        self.stack.push(&def.name);

        let mut layout = TypeLayout::new(&def.name);
        layout.endianness = def.endianness;

        for field in &def.fields {
            let shape = self
                .shape(&field.shape)
                .map_err(|fault| fault.locate(&def.name, &field.name))?;

            layout = layout.field(FieldLayout {
                name: field.name.clone(),
                order: field.order,
                shape,
                tag: field.tag.as_ref().map(Tag::from),
                endianness: field.endianness,
                bit_width: field.bits,
                pad_after: field.pad_after,
                length_of: field.length_of.clone(),
                serialize: field.serialize,
            });
        }

        self.stack.pop();
        Ok(layout)
    }

    fn shape(&mut self, def: &'d ShapeDef) -> Result<Shape, LayoutFault> {
        let shape = match def {
            ShapeDef::Scalar { kind } => Shape::Scalar(*kind),
            ShapeDef::String => Shape::String,
            ShapeDef::Enum { name } => Shape::Enum(
                self.enums
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| LayoutErrorKind::UnknownType(name.clone()))?,
            ),
            ShapeDef::List { element } => {
                let shape = self.shape(&element.shape)?;
                Shape::List(Box::new(ElementLayout {
                    shape,
                    tag: element.tag.as_ref().map(Tag::from),
                }))
            }
            ShapeDef::Struct { name } => Shape::Struct(self.composite(name)?),
        };

        Ok(shape)
    }

    fn composite(&mut self, name: &'d str) -> Result<Arc<TypeLayout>, LayoutFault> {
        if let Some(layout) = self.built.get(name) {
            return Ok(Arc::clone(layout));
        }

        if self.stack.contains(&name) {
            return Err(LayoutErrorKind::RecursiveType(name.to_string()).into());
        }

        let def = self
            .types
            .get(name)
            .copied()
            .ok_or_else(|| LayoutErrorKind::UnknownType(name.to_string()))?;

        let layout = Arc::new(self.build(def)?);
        self.built.insert(name, Arc::clone(&layout));
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::Schema,
        value::{Value, record},
    };

    const PACKET: &str = r#"{
        "root": "Packet",
        "enums": [
            { "name": "Kind", "underlying": "I32", "members": [
                { "name": "Data", "value": 1 },
                { "name": "Ack", "value": 2 }
            ] }
        ],
        "types": [
            { "name": "Header", "fields": [
                { "name": "version", "order": 0, "shape": { "type": "Scalar", "kind": "U8" }, "bits": 4 },
                { "name": "kind", "order": 1, "shape": { "type": "Enum", "name": "Kind" },
                  "tag": { "type": "Enum", "equivalent": "U8" }, "bits": 4 }
            ] },
            { "name": "Packet", "endianness": "Big", "fields": [
                { "name": "header", "order": 0, "shape": { "type": "Struct", "name": "Header" } },
                { "name": "len", "order": 1, "shape": { "type": "Scalar", "kind": "U16" }, "length_of": "body" },
                { "name": "body", "order": 2, "shape": { "type": "String" },
                  "tag": { "type": "String", "encoding": "Utf8", "length_key": "body" } },
                { "name": "scratch", "shape": { "type": "Scalar", "kind": "U32" } }
            ] }
        ]
    }"#;

    #[test]
    fn test_resolve_and_compile() {
        let defs: LayoutDefs = serde_json::from_str(PACKET).unwrap();
        let layout = TypeLayout::try_from(&defs).unwrap();
        assert_eq!(layout.name, "Packet");
        assert_eq!(layout.fields.len(), 4);

        let schema = Schema::compile(&layout).unwrap();
        assert_eq!(schema.min_size(), 3);

        let value = record([
            ("header", record([("version", Value::U8(3)), ("kind", Value::Enum(2))])),
            ("len", Value::U16(0)),
            ("body", Value::Str("hi".into())),
        ]);
        let bytes = schema.to_bytes(&value).unwrap();
        assert_eq!(bytes, vec![0x23, 0x00, 0x02, b'h', b'i']);

        let decoded = schema.deserialize_slice(&bytes).unwrap();
        assert_eq!(decoded.get_field("body"), Some(&Value::Str("hi".into())));
        assert_eq!(decoded.get_field("len"), Some(&Value::U16(2)));
    }

    #[test]
    fn test_unknown_reference() {
        let defs: LayoutDefs = serde_json::from_str(
            r#"{ "root": "A", "types": [
                { "name": "A", "fields": [
                    { "name": "b", "order": 0, "shape": { "type": "Struct", "name": "B" } }
                ] }
            ] }"#,
        )
        .unwrap();

        let err = TypeLayout::try_from(&defs).unwrap_err();
        assert_eq!(err.type_name, "A");
        assert_eq!(err.field.as_deref(), Some("b"));
        assert_eq!(err.kind, LayoutErrorKind::UnknownType("B".into()));

        let err = defs.resolve("Missing").unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::UnknownType("Missing".into()));
    }

    #[test]
    fn test_recursive_reference() {
        let defs: LayoutDefs = serde_json::from_str(
            r#"{ "root": "Node", "types": [
                { "name": "Node", "fields": [
                    { "name": "child", "order": 0, "shape": { "type": "Struct", "name": "Leaf" } }
                ] },
                { "name": "Leaf", "fields": [
                    { "name": "parent", "order": 0, "shape": { "type": "Struct", "name": "Node" } }
                ] }
            ] }"#,
        )
        .unwrap();

        let err = TypeLayout::try_from(&defs).unwrap_err();
        assert_eq!(err.type_name, "Leaf");
        assert_eq!(err.field.as_deref(), Some("parent"));
        assert_eq!(err.kind, LayoutErrorKind::RecursiveType("Node".into()));
    }
}
