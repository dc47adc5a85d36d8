//! Document schemas: the structural index of a document kind.

use std::collections::HashSet;
use std::fmt;

use dynent_types::ValueKind;
use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, DocumentResult};

/// Location of a field within a document, as path segments from the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Parse a `/`-separated path; empty segments are dropped.
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// This path extended by one segment.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl From<&str> for DocPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// What a schema node holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Interior node grouping child segments.
    Group,
    /// A single scalar.
    Value { kind: ValueKind },
    /// A list of scalars.
    Values { kind: ValueKind },
    /// A nested document of schema `target`.
    Element { target: String },
    /// A list of nested documents of schema `target`.
    Elements { target: String },
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        !matches!(self, NodeKind::Group)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, NodeKind::Values { .. } | NodeKind::Elements { .. })
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Group => f.write_str("group"),
            NodeKind::Value { kind } => write!(f, "{kind}"),
            NodeKind::Values { kind } => write!(f, "list of {kind}"),
            NodeKind::Element { target } => write!(f, "document {target}"),
            NodeKind::Elements { target } => write!(f, "list of document {target}"),
        }
    }
}

/// One segment of a document schema tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub segment: String,
    /// Name this leaf is bound to; the segment name when absent.
    #[serde(default)]
    pub binding: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    fn leaf(segment: &str, kind: NodeKind) -> Self {
        Self {
            segment: segment.to_string(),
            binding: None,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(segment: &str, children: Vec<SchemaNode>) -> Self {
        Self {
            segment: segment.to_string(),
            binding: None,
            kind: NodeKind::Group,
            children,
        }
    }

    pub fn value(segment: &str, kind: ValueKind) -> Self {
        Self::leaf(segment, NodeKind::Value { kind })
    }

    pub fn values(segment: &str, kind: ValueKind) -> Self {
        Self::leaf(segment, NodeKind::Values { kind })
    }

    pub fn element(segment: &str, target: &str) -> Self {
        Self::leaf(
            segment,
            NodeKind::Element {
                target: target.to_string(),
            },
        )
    }

    pub fn elements(segment: &str, target: &str) -> Self {
        Self::leaf(
            segment,
            NodeKind::Elements {
                target: target.to_string(),
            },
        )
    }

    /// Bind this leaf to `name` instead of its segment name.
    pub fn bound_to(mut self, name: &str) -> Self {
        self.binding = Some(name.to_string());
        self
    }

    pub fn binding_name(&self) -> &str {
        self.binding.as_deref().unwrap_or(&self.segment)
    }
}

/// Structural index of one document kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSchema {
    pub name: String,
    pub fields: Vec<SchemaNode>,
}

impl DocSchema {
    pub fn new(name: impl Into<String>, fields: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Check segment names, sibling uniqueness and node shapes.
    pub fn validate(&self) -> DocumentResult<()> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("schema name must not be empty".into()));
        }
        self.validate_level(&DocPath::default(), &self.fields)?;

        let mut bindings = HashSet::new();
        for (path, node) in self.leaves() {
            if !bindings.insert(node.binding_name()) {
                return Err(self.invalid(format!(
                    "binding {:?} at {path} is used by more than one leaf",
                    node.binding_name()
                )));
            }
        }
        Ok(())
    }

    fn validate_level(&self, parent: &DocPath, nodes: &[SchemaNode]) -> DocumentResult<()> {
        let mut seen = HashSet::new();
        for node in nodes {
            let path = parent.child(&node.segment);
            if node.segment.is_empty() || node.segment.contains('/') {
                return Err(self.invalid(format!("invalid segment {:?} at {parent}", node.segment)));
            }
            if !seen.insert(node.segment.as_str()) {
                return Err(self.invalid(format!("duplicate segment at {path}")));
            }
            match (&node.kind, node.children.is_empty()) {
                (NodeKind::Group, true) => {
                    return Err(self.invalid(format!("group {path} has no children")));
                }
                (NodeKind::Group, false) => self.validate_level(&path, &node.children)?,
                (_, false) => {
                    return Err(self.invalid(format!("leaf {path} must not have children")));
                }
                (_, true) => {}
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> DocumentError {
        DocumentError::InvalidSchema {
            schema: self.name.clone(),
            reason,
        }
    }

    /// The node at `path`, if any.
    pub fn node(&self, path: &DocPath) -> Option<&SchemaNode> {
        let mut level = &self.fields;
        let mut found = None;
        for segment in path.segments() {
            let node = level.iter().find(|n| &n.segment == segment)?;
            level = &node.children;
            found = Some(node);
        }
        found
    }

    /// Every leaf with its path, depth-first in declaration order.
    pub fn leaves(&self) -> Vec<(DocPath, &SchemaNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<(DocPath, &SchemaNode)> = self
            .fields
            .iter()
            .rev()
            .map(|n| (DocPath::default().child(&n.segment), n))
            .collect();
        while let Some((path, node)) = stack.pop() {
            if node.kind.is_leaf() {
                out.push((path, node));
            } else {
                for child in node.children.iter().rev() {
                    stack.push((path.child(&child.segment), child));
                }
            }
        }
        out
    }

    /// The first leaf whose binding name is `name`.
    pub fn find_binding(&self, name: &str) -> Option<(DocPath, &SchemaNode)> {
        self.leaves().into_iter().find(|(_, n)| n.binding_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> DocSchema {
        DocSchema::new(
            "person-doc",
            vec![
                SchemaNode::value("id", ValueKind::Int),
                SchemaNode::group(
                    "profile",
                    vec![
                        SchemaNode::value("full_name", ValueKind::Text).bound_to("name"),
                        SchemaNode::values("nicknames", ValueKind::Text),
                    ],
                ),
                SchemaNode::element("boss", "person-doc").bound_to("manager"),
                SchemaNode::elements("reports", "person-doc"),
            ],
        )
    }

    #[test]
    fn paths_parse_and_display() {
        let path = DocPath::parse("/profile//full_name");
        assert_eq!(path.segments(), ["profile", "full_name"]);
        assert_eq!(path.to_string(), "/profile/full_name");
        assert_eq!(path.leaf(), Some("full_name"));
        assert!(DocPath::parse("").is_root());
    }

    #[test]
    fn leaves_are_depth_first() {
        let schema = person();
        let paths: Vec<String> = schema.leaves().iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            paths,
            vec!["/id", "/profile/full_name", "/profile/nicknames", "/boss", "/reports"]
        );
    }

    #[test]
    fn bindings_default_to_segment() {
        let schema = person();
        let (path, node) = schema.find_binding("name").unwrap();
        assert_eq!(path, DocPath::parse("profile/full_name"));
        assert_eq!(node.kind, NodeKind::Value { kind: ValueKind::Text });
        assert!(schema.find_binding("full_name").is_none());
        assert!(schema.find_binding("reports").is_some());
    }

    #[test]
    fn node_lookup() {
        let schema = person();
        assert!(schema.node(&DocPath::parse("profile")).is_some());
        assert!(schema.node(&DocPath::parse("profile/nope")).is_none());
        assert!(schema.node(&DocPath::default()).is_none());
    }

    #[test]
    fn valid_schema_passes() {
        person().validate().unwrap();
    }

    #[test]
    fn duplicate_segments_rejected() {
        let schema = DocSchema::new(
            "dup",
            vec![SchemaNode::value("a", ValueKind::Int), SchemaNode::value("a", ValueKind::Text)],
        );
        assert!(matches!(schema.validate(), Err(DocumentError::InvalidSchema { .. })));
    }

    #[test]
    fn duplicate_bindings_rejected() {
        let schema = DocSchema::new(
            "dup",
            vec![
                SchemaNode::value("a", ValueKind::Int).bound_to("x"),
                SchemaNode::value("b", ValueKind::Int).bound_to("x"),
            ],
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn empty_groups_and_leaf_children_rejected() {
        let empty = DocSchema::new("g", vec![SchemaNode::group("g", vec![])]);
        assert!(empty.validate().is_err());

        let mut leaf = SchemaNode::value("v", ValueKind::Int);
        leaf.children.push(SchemaNode::value("w", ValueKind::Int));
        assert!(DocSchema::new("l", vec![leaf]).validate().is_err());
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "name": "dept-doc",
            "fields": [
                { "segment": "code", "type": "value", "kind": "text" },
                { "segment": "staff", "type": "elements", "target": "person-doc" }
            ]
        }"#;
        let schema: DocSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(
            schema.fields[1].kind,
            NodeKind::Elements {
                target: "person-doc".into()
            }
        );
        schema.validate().unwrap();
    }
}
