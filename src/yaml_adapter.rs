//! Thin adapter over `libyaml-safer`'s event-based parser and composer.
//!
//! This module is the only place that touches `libyaml-safer` directly;
//! everything above it (the typed value layer) works against
//! [`Document`]/[`NodeRef`] without caring how the tree was produced.

use libyaml_safer::{yaml_parser_new, Document, NodeData, ScalarStyle};

use crate::error::FramingError;

/// Parse a complete YAML document out of a byte buffer.
///
/// Only the first document in the stream is used; ASDF trees are always
/// single-document.
pub fn parse_from_bytes(bytes: &[u8]) -> Result<Document, FramingError> {
    let mut input: &[u8] = bytes;
    let mut parser = yaml_parser_new();
    libyaml_safer::yaml_parser_set_input_string(&mut parser, &mut input);
    Document::load(&mut parser).map_err(|e| FramingError::Yaml(e.to_string()))
}

/// A reference to a node within a [`Document`], resolved by 1-based index
/// (matching `libyaml-safer`'s node numbering).
#[derive(Clone, Copy)]
pub struct NodeRef<'doc> {
    pub doc: &'doc Document,
    pub index: i32,
}

impl<'doc> NodeRef<'doc> {
    pub fn root(doc: &'doc Document) -> Option<NodeRef<'doc>> {
        if doc.nodes.is_empty() {
            None
        } else {
            Some(NodeRef { doc, index: 1 })
        }
    }

    pub fn node(&self) -> &'doc libyaml_safer::Node {
        self.doc.get_node(self.index).expect("dangling node index")
    }

    pub fn tag(&self) -> Option<&'doc str> {
        self.node().tag.as_deref()
    }

    pub fn scalar(&self) -> Option<(&'doc str, ScalarStyle)> {
        match &self.node().data {
            NodeData::Scalar { value, style } => Some((value.as_str(), *style)),
            _ => None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self.node().data, NodeData::Mapping { .. })
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.node().data, NodeData::Sequence { .. })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.node().data, NodeData::Scalar { .. })
    }

    pub fn sequence_items(&self) -> Vec<NodeRef<'doc>> {
        match &self.node().data {
            NodeData::Sequence { items, .. } => items
                .iter()
                .map(|&idx| NodeRef { doc: self.doc, index: idx })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn mapping_pairs(&self) -> Vec<(NodeRef<'doc>, NodeRef<'doc>)> {
        match &self.node().data {
            NodeData::Mapping { pairs, .. } => pairs
                .iter()
                .map(|p| {
                    (
                        NodeRef { doc: self.doc, index: p.key },
                        NodeRef { doc: self.doc, index: p.value },
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Look up a mapping value by key, comparing the key's scalar text.
    pub fn get(&self, key: &str) -> Option<NodeRef<'doc>> {
        self.mapping_pairs()
            .into_iter()
            .find(|(k, _)| k.scalar().map(|(s, _)| s) == Some(key))
            .map(|(_, v)| v)
    }

    /// Resolve a restricted JSON-Pointer-like path (`/key/0/subkey`)
    /// against this node, treating an empty path as a no-op.
    pub fn by_path(&self, path: &str) -> Option<NodeRef<'doc>> {
        let mut current = *self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if let Ok(index) = segment.parse::<usize>() {
                current = current.sequence_items().get(index).copied()?;
            } else {
                current = current.get(segment)?;
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_mapping() {
        let doc = parse_from_bytes(b"---\nfoo: bar\nbaz: 3\n...\n").unwrap();
        let root = NodeRef::root(&doc).unwrap();
        assert!(root.is_mapping());
        let value = root.by_path("/foo").unwrap();
        assert_eq!(value.scalar().unwrap().0, "bar");
    }

    #[test]
    fn resolves_sequence_index() {
        let doc = parse_from_bytes(b"---\nitems:\n  - 10\n  - 20\n...\n").unwrap();
        let root = NodeRef::root(&doc).unwrap();
        let value = root.by_path("/items/1").unwrap();
        assert_eq!(value.scalar().unwrap().0, "20");
    }
}
