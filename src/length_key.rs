//! Length-key resolution.
//!
//! While a descriptor tree is compiled, every composite opens a scope that
//! lists its length-carrying fields. A collection or string with a length key
//! binds to the unique carrier found by searching the open scopes innermost
//! first. The search never crosses into the composites around a repeated
//! element: a list element can only use lengths declared inside itself.
//!
//! A binding works both ways. The consumer gets a [LengthSource] (how many
//! frames up its decoded length lives), the carrier gets a [LengthFeed] (the
//! member path to measure when encoding).

use crate::{
    descriptor::CompositeDescriptor,
    errors::{LayoutError, LayoutErrorKind},
    text::Encoding,
};

/// How a carrier measures its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Number of list elements.
    Elements,
    /// Number of encoded text bytes.
    Bytes(Encoding),
}

/// Encode-side half of a binding, attached to the length-carrying field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthFeed {
    /// Member names from the carrier's composite down to the consumer.
    pub path: Vec<String>,
    pub measure: Measure,
}

/// Decode-side half of a binding, attached to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthSource {
    pub key: String,
    /// Composite frames between the consumer's composite and the carrier's.
    pub up: usize,
}

#[derive(Debug)]
struct Carrier<'d> {
    key: &'d str,
    field: &'d str,
    order: u32,
    feed: Option<LengthFeed>,
}

#[derive(Debug)]
struct Scope<'d> {
    type_name: &'d str,
    /// Marks the start of a repeated element.
    boundary: bool,
    carriers: Vec<Carrier<'d>>,
    /// Member currently being compiled, with its order.
    member: Option<(&'d str, u32)>,
}

#[derive(Debug, Default)]
pub(crate) struct LengthKeyResolver<'d> {
    scopes: Vec<Scope<'d>>,
}

impl<'d> LengthKeyResolver<'d> {
    /// Opens the scope of a composite. Only serialized fields carry lengths.
    pub(crate) fn push_scope(&mut self, composite: &'d CompositeDescriptor) {
        let carriers = composite
            .fields
            .iter()
            .filter(|field| field.serialize)
            .filter_map(|field| {
                field.length_of.as_deref().map(|key| Carrier {
                    key,
                    field: &field.name,
                    order: field.order,
                    feed: None,
                })
            })
            .collect();

        self.scopes.push(Scope {
            type_name: &composite.name,
            boundary: false,
            carriers,
            member: None,
        });
    }

    /// Opens a repeated element.
    pub(crate) fn push_boundary(&mut self) {
        self.scopes.push(Scope {
            type_name: "",
            boundary: true,
            carriers: Vec::new(),
            member: None,
        });
    }

    pub(crate) fn pop_boundary(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn enter_member(&mut self, name: &'d str, order: u32) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.member = Some((name, order));
        }
    }

    /// Closes the innermost composite scope and hands out the feeds of its
    /// carriers by field name. Every carrier must have been bound.
    pub(crate) fn pop_scope(&mut self) -> Result<Vec<(&'d str, LengthFeed)>, LayoutError> {
        let Some(scope) = self.scopes.pop() else {
            return Ok(Vec::new());
        };

        scope
            .carriers
            .into_iter()
            .map(|carrier| match carrier.feed {
                Some(feed) => Ok((carrier.field, feed)),
                None => Err(LayoutError::new(
                    scope.type_name,
                    Some(carrier.field),
                    LayoutErrorKind::UnusedLengthField(carrier.key.to_string()),
                )),
            })
            .collect()
    }

    /// Binds the consumer currently being compiled to the carrier of `key`.
    pub(crate) fn bind(&mut self, key: &str, measure: Measure) -> Result<LengthSource, LayoutErrorKind> {
        let mut matches = Vec::new();
        let mut inside = true;
        let mut outside = false;

        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if scope.boundary {
                inside = false;
                continue;
            }

            for (slot, carrier) in scope.carriers.iter().enumerate() {
                if carrier.key == key {
                    if inside {
                        matches.push((index, slot));
                    } else {
                        outside = true;
                    }
                }
            }
        }

        let (index, slot) = match matches.as_slice() {
            [found] => *found,
            [] if outside => {
                return Err(LayoutErrorKind::LengthKeyInRepeatedElement(key.to_string()));
            }
            [] => return Err(LayoutErrorKind::UnresolvedLengthKey(key.to_string())),
            _ => return Err(LayoutErrorKind::AmbiguousLengthKey(key.to_string())),
        };

        let path: Vec<String> = self.scopes[index..]
            .iter()
            .filter_map(|scope| scope.member.map(|(name, _)| name.to_string()))
            .collect();
        let up = self.scopes.len() - 1 - index;

        let scope = &mut self.scopes[index];
        let Some((_, consumer_order)) = scope.member else {
            return Err(LayoutErrorKind::UnresolvedLengthKey(key.to_string()));
        };

        let carrier = &mut scope.carriers[slot];
        if carrier.order >= consumer_order {
            return Err(LayoutErrorKind::LengthOrder {
                key: key.to_string(),
                length_order: carrier.order,
                consumer_order,
            });
        }

        if carrier.feed.is_some() {
            return Err(LayoutErrorKind::DuplicateLengthConsumer(key.to_string()));
        }

        carrier.feed = Some(LengthFeed { path, measure });

        Ok(LengthSource {
            key: key.to_string(),
            up,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::TypeDescriptor,
        layout::{FieldLayout, TypeLayout},
        primitive::PrimitiveKind,
    };

    fn composite(layout: TypeLayout) -> CompositeDescriptor {
        match TypeDescriptor::analyze(&layout).unwrap().kind {
            crate::descriptor::DescriptorKind::Composite(composite) => composite,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn carriers(name: &str, keys: &[(&str, u32)]) -> CompositeDescriptor {
        let mut layout = TypeLayout::new(name);
        for (key, order) in keys {
            layout = layout.field(
                FieldLayout::primitive(format!("{key}_len"), *order, PrimitiveKind::U16).length_of(*key),
            );
        }
        composite(layout)
    }

    #[test]
    fn test_bind_in_same_scope() {
        let outer = carriers("Outer", &[("items", 0)]);
        let mut resolver = LengthKeyResolver::default();

        resolver.push_scope(&outer);
        resolver.enter_member("items", 1);
        let source = resolver.bind("items", Measure::Elements).unwrap();
        assert_eq!(source, LengthSource { key: "items".into(), up: 0 });

        let feeds = resolver.pop_scope().unwrap();
        assert_eq!(
            feeds,
            vec![(
                "items_len",
                LengthFeed {
                    path: vec!["items".into()],
                    measure: Measure::Elements
                }
            )]
        );
    }

    #[test]
    fn test_bind_from_nested_composite() {
        let outer = carriers("Outer", &[("name", 0)]);
        let inner = carriers("Inner", &[]);
        let mut resolver = LengthKeyResolver::default();

        resolver.push_scope(&outer);
        resolver.enter_member("inner", 3);
        resolver.push_scope(&inner);
        resolver.enter_member("name", 0);

        let source = resolver.bind("name", Measure::Bytes(Encoding::Utf8)).unwrap();
        assert_eq!(source.up, 1);
        assert!(resolver.pop_scope().unwrap().is_empty());

        let feeds = resolver.pop_scope().unwrap();
        assert_eq!(feeds[0].1.path, vec!["inner".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_order_checked_against_enclosing_member() {
        let outer = carriers("Outer", &[("name", 5)]);
        let inner = carriers("Inner", &[]);
        let mut resolver = LengthKeyResolver::default();

        resolver.push_scope(&outer);
        resolver.enter_member("inner", 2);
        resolver.push_scope(&inner);
        resolver.enter_member("name", 9);

        assert_eq!(
            resolver.bind("name", Measure::Elements).unwrap_err(),
            LayoutErrorKind::LengthOrder {
                key: "name".into(),
                length_order: 5,
                consumer_order: 2
            }
        );
    }

    #[test]
    fn test_boundary_blocks_outer_carriers() {
        let outer = carriers("Outer", &[("name", 0)]);
        let element = carriers("Element", &[]);
        let mut resolver = LengthKeyResolver::default();

        resolver.push_scope(&outer);
        resolver.enter_member("items", 1);
        resolver.push_boundary();
        resolver.push_scope(&element);
        resolver.enter_member("name", 0);

        assert_eq!(
            resolver.bind("name", Measure::Elements).unwrap_err(),
            LayoutErrorKind::LengthKeyInRepeatedElement("name".into())
        );
        assert_eq!(
            resolver.bind("other", Measure::Elements).unwrap_err(),
            LayoutErrorKind::UnresolvedLengthKey("other".into())
        );
    }

    #[test]
    fn test_ambiguous_and_unused() {
        let outer = carriers("Outer", &[("name", 0)]);
        let inner = carriers("Inner", &[("name", 0)]);
        let mut resolver = LengthKeyResolver::default();

        resolver.push_scope(&outer);
        resolver.enter_member("inner", 1);
        resolver.push_scope(&inner);
        resolver.enter_member("name", 1);

        assert_eq!(
            resolver.bind("name", Measure::Elements).unwrap_err(),
            LayoutErrorKind::AmbiguousLengthKey("name".into())
        );

        let err = resolver.pop_scope().unwrap_err();
        assert_eq!(err.type_name, "Inner");
        assert_eq!(err.field.as_deref(), Some("name_len"));
        assert_eq!(err.kind, LayoutErrorKind::UnusedLengthField("name".into()));
    }
}
