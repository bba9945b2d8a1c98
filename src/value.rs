//! Zero-copy typed view over parsed YAML nodes.
//!
//! A [`Value`] wraps a node reference and lazily classifies its scalar
//! type the first time a caller asks for one, following the ordered rules
//! in the design notes: explicit quoting style, then an explicit YAML tag,
//! then core-schema heuristics on the plain scalar text.

use std::cell::OnceCell;

use libyaml_safer::ScalarStyle;

use crate::error::ValueError;
use crate::extension::registry;
use crate::yaml_adapter::NodeRef;

/// The classified type of a scalar node (or the structural kind of a
/// non-scalar node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Bool,
    Null,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Extension,
}

/// The structural kind of a node, before scalar classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Sequence,
    Mapping,
}

/// Canonical parsed representation used to answer widening/narrowing
/// queries without re-parsing the scalar text on every call.
#[derive(Debug, Clone)]
enum Canonical {
    Null,
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Double(f64),
    String,
}

/// Narrowing getters return the value populated into the destination type
/// alongside whether it had to be truncated to fit, rather than an error
/// that discards the value: `(v, true)` means `v` is `self`'s value
/// truncated to `$ty`'s range, not the original.
macro_rules! narrow_signed {
    ($name:ident, $ty:ty) => {
        pub fn $name(&self) -> Result<($ty, bool), ValueError> {
            let (v, overflowed) = self.as_i64()?;
            match <$ty>::try_from(v) {
                Ok(n) => Ok((n, overflowed)),
                Err(_) => Ok((v as $ty, true)),
            }
        }
    };
}

macro_rules! narrow_unsigned {
    ($name:ident, $ty:ty) => {
        pub fn $name(&self) -> Result<($ty, bool), ValueError> {
            let (v, overflowed) = self.as_u64()?;
            match <$ty>::try_from(v) {
                Ok(n) => Ok((n, overflowed)),
                Err(_) => Ok((v as $ty, true)),
            }
        }
    };
}

/// A non-owning, lazily-classified view over one YAML node.
pub struct Value<'doc> {
    node: NodeRef<'doc>,
    inferred: OnceCell<Result<(ScalarKind, Canonical), ValueError>>,
}

impl<'doc> Value<'doc> {
    pub fn new(node: NodeRef<'doc>) -> Value<'doc> {
        Value {
            node,
            inferred: OnceCell::new(),
        }
    }

    pub fn node(&self) -> NodeRef<'doc> {
        self.node
    }

    pub fn structural_kind(&self) -> NodeKind {
        if self.node.is_mapping() {
            NodeKind::Mapping
        } else if self.node.is_sequence() {
            NodeKind::Sequence
        } else {
            NodeKind::Scalar
        }
    }

    /// Resolve a path relative to this value. See [`NodeRef::by_path`] for
    /// the syntax.
    pub fn path(&self, path: &str) -> Result<Value<'doc>, ValueError> {
        self.node
            .by_path(path)
            .map(Value::new)
            .ok_or(ValueError::NotFound)
    }

    fn classify(&self) -> Result<(ScalarKind, Canonical), ValueError> {
        self.inferred
            .get_or_init(|| classify_node(&self.node))
            .clone()
    }

    pub fn scalar_kind(&self) -> Result<ScalarKind, ValueError> {
        self.classify().map(|(k, _)| k)
    }

    pub fn as_str(&self) -> Result<&'doc str, ValueError> {
        self.node.scalar().map(|(s, _)| s).ok_or(ValueError::TypeMismatch)
    }

    pub fn as_null(&self) -> Result<(), ValueError> {
        match self.classify()?.1 {
            Canonical::Null => Ok(()),
            _ => Err(ValueError::TypeMismatch),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self.classify()?.1 {
            Canonical::Bool(b) => Ok(b),
            Canonical::Unsigned(0) => Ok(false),
            Canonical::Unsigned(1) => Ok(true),
            _ => Err(ValueError::TypeMismatch),
        }
    }

    /// The value as an `i64`, alongside whether it had to be truncated to
    /// fit (an `Unsigned` value above `i64::MAX` is reinterpreted, not
    /// clamped, matching the destination-still-populated contract for
    /// overflow).
    pub fn as_i64(&self) -> Result<(i64, bool), ValueError> {
        match self.classify()?.1 {
            Canonical::Signed(v) => Ok((v, false)),
            Canonical::Unsigned(v) => match i64::try_from(v) {
                Ok(v) => Ok((v, false)),
                Err(_) => Ok((v as i64, true)),
            },
            _ => Err(ValueError::TypeMismatch),
        }
    }

    /// The value as a `u64`, alongside whether it had to be truncated to
    /// fit (a negative `Signed` value is reinterpreted, not clamped,
    /// matching the destination-still-populated contract for overflow).
    pub fn as_u64(&self) -> Result<(u64, bool), ValueError> {
        match self.classify()?.1 {
            Canonical::Unsigned(v) => Ok((v, false)),
            Canonical::Signed(v) => match u64::try_from(v) {
                Ok(v) => Ok((v, false)),
                Err(_) => Ok((v as u64, true)),
            },
            _ => Err(ValueError::TypeMismatch),
        }
    }

    narrow_signed!(as_i8, i8);
    narrow_signed!(as_i16, i16);
    narrow_signed!(as_i32, i32);

    narrow_unsigned!(as_u8, u8);
    narrow_unsigned!(as_u16, u16);
    narrow_unsigned!(as_u32, u32);

    pub fn as_f64(&self) -> Result<f64, ValueError> {
        match self.classify()?.1 {
            Canonical::Double(v) | Canonical::Float(v) => Ok(v),
            Canonical::Signed(v) => Ok(v as f64),
            Canonical::Unsigned(v) => Ok(v as f64),
            _ => Err(ValueError::TypeMismatch),
        }
    }

    pub fn as_f32(&self) -> Result<(f32, bool), ValueError> {
        let v = self.as_f64()?;
        let narrowed = v as f32;
        Ok((narrowed, narrowed as f64 != v))
    }

    pub fn mapping(&self) -> Result<MappingIter<'doc>, ValueError> {
        if !self.node.is_mapping() {
            return Err(ValueError::TypeMismatch);
        }
        Ok(MappingIter {
            pairs: self.node.mapping_pairs(),
            pos: 0,
        })
    }

    pub fn sequence(&self) -> Result<SequenceIter<'doc>, ValueError> {
        if !self.node.is_sequence() {
            return Err(ValueError::TypeMismatch);
        }
        Ok(SequenceIter {
            items: self.node.sequence_items(),
            pos: 0,
        })
    }

    /// Iterate this value as whichever container it structurally is,
    /// yielding a key for a mapping entry or an index for a sequence item
    /// alongside the value, without the caller needing to branch on
    /// `structural_kind` first.
    pub fn container(&self) -> Result<ContainerIter<'doc>, ValueError> {
        match self.structural_kind() {
            NodeKind::Mapping => Ok(ContainerIter::Mapping(self.mapping()?)),
            NodeKind::Sequence => Ok(ContainerIter::Sequence(self.sequence()?)),
            NodeKind::Scalar => Err(ValueError::TypeMismatch),
        }
    }

    /// Deserialize this node through the tag registered in the extension
    /// registry, if any.
    pub fn extension<T: 'static>(&self) -> Result<Box<T>, ValueError> {
        let tag = self.node.tag().ok_or(ValueError::TypeMismatch)?;
        registry().deserialize::<T>(tag, self)
    }

    /// Breadth-first or depth-first search for descendants (including
    /// `self`) matching `predicate`.
    pub fn find(&self, order: TraversalOrder, max_depth: Option<usize>, predicate: impl Fn(&Value<'doc>) -> bool) -> Vec<FindItem<'doc>> {
        let mut results = Vec::new();
        let mut frontier = vec![(String::new(), self.node, 0usize)];
        while let Some((path, node, depth)) = match order {
            TraversalOrder::BreadthFirst => {
                if frontier.is_empty() {
                    None
                } else {
                    Some(frontier.remove(0))
                }
            }
            TraversalOrder::DepthFirst => frontier.pop(),
        } {
            let value = Value::new(node);
            if predicate(&value) {
                results.push(FindItem { path: path.clone(), value });
            }
            if max_depth.map(|m| depth < m).unwrap_or(true) {
                match node.is_mapping() {
                    true => {
                        for (k, v) in node.mapping_pairs() {
                            let key = k.scalar().map(|(s, _)| s.to_string()).unwrap_or_default();
                            frontier.push((format!("{path}/{key}"), v, depth + 1));
                        }
                    }
                    false => {
                        if node.is_sequence() {
                            for (i, v) in node.sequence_items().into_iter().enumerate() {
                                frontier.push((format!("{path}/{i}"), v, depth + 1));
                            }
                        }
                    }
                }
            }
        }
        results
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    BreadthFirst,
    DepthFirst,
}

pub struct FindItem<'doc> {
    pub path: String,
    pub value: Value<'doc>,
}

pub struct MappingIter<'doc> {
    pairs: Vec<(NodeRef<'doc>, NodeRef<'doc>)>,
    pos: usize,
}

impl<'doc> Iterator for MappingIter<'doc> {
    type Item = (Option<&'doc str>, Value<'doc>);

    fn next(&mut self) -> Option<Self::Item> {
        let (k, v) = self.pairs.get(self.pos)?;
        self.pos += 1;
        let key = match k.scalar() {
            Some((s, _)) => Some(s),
            None => {
                log::warn!(target: "asdf", "mapping key at index {} is not a scalar, using a null key", self.pos - 1);
                None
            }
        };
        Some((key, Value::new(*v)))
    }
}

pub struct SequenceIter<'doc> {
    items: Vec<NodeRef<'doc>>,
    pos: usize,
}

impl<'doc> Iterator for SequenceIter<'doc> {
    type Item = Value<'doc>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.get(self.pos).copied()?;
        self.pos += 1;
        Some(Value::new(item))
    }
}

/// A tagged union over [`MappingIter`] and [`SequenceIter`], yielding
/// either a mapping entry or a sequence item uniformly.
pub enum ContainerIter<'doc> {
    Mapping(MappingIter<'doc>),
    Sequence(SequenceIter<'doc>),
}

/// One item produced by a [`ContainerIter`]: a mapping entry's key, or a
/// sequence item's index, alongside its value.
pub enum ContainerItem<'doc> {
    Keyed { key: Option<&'doc str>, value: Value<'doc> },
    Indexed { index: usize, value: Value<'doc> },
}

impl<'doc> ContainerItem<'doc> {
    /// The mapping key, if this item came from a mapping.
    pub fn key(&self) -> Option<&'doc str> {
        match self {
            ContainerItem::Keyed { key, .. } => *key,
            ContainerItem::Indexed { .. } => None,
        }
    }

    /// The sequence index, if this item came from a sequence.
    pub fn index(&self) -> Option<usize> {
        match self {
            ContainerItem::Keyed { .. } => None,
            ContainerItem::Indexed { index, .. } => Some(*index),
        }
    }

    pub fn value(&self) -> &Value<'doc> {
        match self {
            ContainerItem::Keyed { value, .. } => value,
            ContainerItem::Indexed { value, .. } => value,
        }
    }

    pub fn into_value(self) -> Value<'doc> {
        match self {
            ContainerItem::Keyed { value, .. } => value,
            ContainerItem::Indexed { value, .. } => value,
        }
    }
}

impl<'doc> Iterator for ContainerIter<'doc> {
    type Item = ContainerItem<'doc>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ContainerIter::Mapping(iter) => {
                let (key, value) = iter.next()?;
                Some(ContainerItem::Keyed { key, value })
            }
            ContainerIter::Sequence(iter) => {
                let index = iter.pos;
                let value = iter.next()?;
                Some(ContainerItem::Indexed { index, value })
            }
        }
    }
}

fn classify_node(node: &NodeRef<'_>) -> Result<(ScalarKind, Canonical), ValueError> {
    let (text, style) = node.scalar().ok_or(ValueError::TypeMismatch)?;

    if matches!(
        style,
        ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted | ScalarStyle::Literal | ScalarStyle::Folded
    ) {
        return Ok((ScalarKind::String, Canonical::String));
    }

    if let Some(tag) = node.tag() {
        match tag {
            "tag:yaml.org,2002:null" => return Ok((ScalarKind::Null, Canonical::Null)),
            "tag:yaml.org,2002:bool" => {
                return parse_bool(text)
                    .map(|b| (ScalarKind::Bool, Canonical::Bool(b)))
                    .ok_or(ValueError::ParseFailure)
            }
            "tag:yaml.org,2002:int" => return parse_int(text),
            "tag:yaml.org,2002:float" => return parse_float(text),
            "tag:yaml.org,2002:str" => return Ok((ScalarKind::String, Canonical::String)),
            other if other != "tag:yaml.org,2002:map" && other != "tag:yaml.org,2002:seq" => {
                return Ok((ScalarKind::Extension, Canonical::String));
            }
            _ => {}
        }
    }

    if matches!(text, "null" | "Null" | "NULL" | "~" | "") {
        return Ok((ScalarKind::Null, Canonical::Null));
    }
    if let Some(b) = parse_bool(text) {
        return Ok((ScalarKind::Bool, Canonical::Bool(b)));
    }
    if let Ok(result) = parse_int(text) {
        return Ok(result);
    }
    if let Ok(result) = parse_float(text) {
        return Ok(result);
    }
    Ok((ScalarKind::String, Canonical::String))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn parse_int(text: &str) -> Result<(ScalarKind, Canonical), ValueError> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, digits) = if let Some(rest) = digits.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = digits.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = digits.strip_prefix("0b") {
        (2, rest)
    } else {
        (10, digits)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(ValueError::ParseFailure);
    }
    if negative {
        let v = i64::from_str_radix(digits, radix).map_err(|_| ValueError::Overflow)?;
        let v = -v;
        let kind = narrowest_signed(v);
        Ok((kind, Canonical::Signed(v)))
    } else {
        let v = u64::from_str_radix(digits, radix).map_err(|_| ValueError::Overflow)?;
        let kind = narrowest_unsigned(v);
        Ok((kind, Canonical::Unsigned(v)))
    }
}

fn narrowest_signed(v: i64) -> ScalarKind {
    if i8::try_from(v).is_ok() {
        ScalarKind::Int8
    } else if i16::try_from(v).is_ok() {
        ScalarKind::Int16
    } else if i32::try_from(v).is_ok() {
        ScalarKind::Int32
    } else {
        ScalarKind::Int64
    }
}

fn narrowest_unsigned(v: u64) -> ScalarKind {
    if u8::try_from(v).is_ok() {
        ScalarKind::UInt8
    } else if u16::try_from(v).is_ok() {
        ScalarKind::UInt16
    } else if u32::try_from(v).is_ok() {
        ScalarKind::UInt32
    } else {
        ScalarKind::UInt64
    }
}

fn parse_float(text: &str) -> Result<(ScalarKind, Canonical), ValueError> {
    if !text.contains('.') && !text.to_ascii_lowercase().contains('e') {
        return Err(ValueError::ParseFailure);
    }
    let v: f64 = text.parse().map_err(|_| ValueError::ParseFailure)?;
    let as_f32 = v as f32;
    if as_f32 as f64 == v {
        Ok((ScalarKind::Float, Canonical::Float(v)))
    } else {
        Ok((ScalarKind::Double, Canonical::Double(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml_adapter::parse_from_bytes;

    #[test]
    fn narrowing_int32_returns_low_bits_on_overflow() {
        let doc = parse_from_bytes(b"--- 4294967296\n...\n").unwrap();
        let root = Value::new(NodeRef::root(&doc).unwrap());
        let (v, overflowed) = root.as_i32().unwrap();
        assert!(overflowed);
        assert_eq!(v, 0);
    }

    #[test]
    fn container_iterates_sequence_with_indices() {
        let doc = parse_from_bytes(b"---\n- 10\n- 20\n- 30\n...\n").unwrap();
        let root = Value::new(NodeRef::root(&doc).unwrap());
        let items: Vec<_> = root.container().unwrap().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].index(), Some(1));
        assert_eq!(items[1].value().as_str().unwrap(), "20");
    }

    #[test]
    fn container_iterates_mapping_with_keys() {
        let doc = parse_from_bytes(b"---\nfoo: 1\nbar: 2\n...\n").unwrap();
        let root = Value::new(NodeRef::root(&doc).unwrap());
        let items: Vec<_> = root.container().unwrap().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key(), Some("foo"));
        assert_eq!(items[0].index(), None);
    }

    #[test]
    fn non_scalar_mapping_key_yields_null_key() {
        let doc = parse_from_bytes(b"---\n? [1, 2]\n: value\n...\n").unwrap();
        let root = Value::new(NodeRef::root(&doc).unwrap());
        let (key, value) = root.mapping().unwrap().next().unwrap();
        assert_eq!(key, None);
        assert_eq!(value.as_str().unwrap(), "value");
    }
}
