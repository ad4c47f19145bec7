use core::fmt;

use string_cache::DefaultAtom;

use crate::model::{NodeKind, XmlNode};
use crate::names::{ExpandedName, Fingerprint};

/// Selects nodes by kind and, optionally, by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    /// `node()`
    AnyNode,
    /// Any node that can be the child of an element: element, text, comment
    /// or processing instruction.
    AnyChildNode,
    /// Never matches (`@text()` and friends).
    NoNode,
    Kind(NodeKind),
    Name { kind: NodeKind, name: ExpandedName },
    /// `prefix:*`
    Namespace { kind: NodeKind, uri: DefaultAtom },
}

impl NodeTest {
    pub fn matches<N: XmlNode>(&self, node: &N) -> bool {
        match self {
            NodeTest::AnyNode => true,
            NodeTest::AnyChildNode => matches!(
                node.kind(),
                NodeKind::Element
                    | NodeKind::Text
                    | NodeKind::Comment
                    | NodeKind::ProcessingInstruction
            ),
            NodeTest::NoNode => false,
            NodeTest::Kind(k) => node.kind() == *k,
            NodeTest::Name { kind, name } => {
                node.kind() == *kind && node.expanded_name().as_ref() == Some(name)
            }
            NodeTest::Namespace { kind, uri } => {
                node.kind() == *kind
                    && node
                        .expanded_name()
                        .is_some_and(|n| n.ns_uri.as_ref() == Some(uri))
            }
        }
    }

    /// The only kind of node this test can match, if there is just one.
    pub fn node_kind(&self) -> Option<NodeKind> {
        match self {
            NodeTest::Kind(k) | NodeTest::Name { kind: k, .. } | NodeTest::Namespace { kind: k, .. } => {
                Some(*k)
            }
            NodeTest::AnyNode | NodeTest::AnyChildNode | NodeTest::NoNode => None,
        }
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        match self {
            NodeTest::Name { name, .. } => Some(name.fingerprint()),
            _ => None,
        }
    }

    pub fn default_priority(&self) -> f64 {
        match self {
            NodeTest::Name { .. } => 0.0,
            NodeTest::Namespace { .. } => -0.25,
            _ => -0.5,
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::AnyNode => f.write_str("node()"),
            NodeTest::AnyChildNode => f.write_str("child-node()"),
            NodeTest::NoNode => f.write_str("empty()"),
            NodeTest::Kind(NodeKind::Element | NodeKind::Attribute | NodeKind::Namespace) => {
                f.write_str("*")
            }
            NodeTest::Kind(NodeKind::Document) => f.write_str("document-node()"),
            NodeTest::Kind(k) => write!(f, "{}()", k.as_str()),
            NodeTest::Name {
                kind: NodeKind::ProcessingInstruction,
                name,
            } => write!(f, "processing-instruction('{name}')"),
            NodeTest::Name { name, .. } => write!(f, "{name}"),
            NodeTest::Namespace { uri, .. } => write!(f, "{{{uri}}}*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_node::{elem, elem_ns, text};

    #[test]
    fn name_and_namespace_tests() {
        let r = elem("r")
            .child(elem_ns("p", "urn:p", "item"))
            .child(elem("item"))
            .child(text("x"))
            .build();
        let kids = r.children();
        let qualified = NodeTest::Name {
            kind: NodeKind::Element,
            name: ExpandedName::new(Some("urn:p"), "item"),
        };
        let wildcard = NodeTest::Namespace {
            kind: NodeKind::Element,
            uri: DefaultAtom::from("urn:p"),
        };
        assert!(qualified.matches(&kids[0]));
        assert!(!qualified.matches(&kids[1]));
        assert!(wildcard.matches(&kids[0]));
        assert!(!wildcard.matches(&kids[1]));
        assert!(NodeTest::AnyChildNode.matches(&kids[2]));
        assert!(!NodeTest::AnyChildNode.matches(&crate::simple_node::doc().build()));
    }

    #[test]
    fn priorities() {
        assert_eq!(NodeTest::Kind(NodeKind::Text).default_priority(), -0.5);
        assert_eq!(
            NodeTest::Namespace {
                kind: NodeKind::Element,
                uri: DefaultAtom::from("u")
            }
            .default_priority(),
            -0.25
        );
    }
}
