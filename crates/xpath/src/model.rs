use core::cmp::Ordering;
use core::fmt;

use crate::axis::{Axis, AxisEnumeration};
use crate::error::EvaluationError;
use crate::names::{ExpandedName, XML_NAMESPACE};
use crate::node_test::NodeTest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Element => "element",
            NodeKind::Attribute => "attribute",
            NodeKind::Text => "text",
            NodeKind::Comment => "comment",
            NodeKind::ProcessingInstruction => "processing-instruction",
            NodeKind::Namespace => "namespace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{}:{}", p, self.local),
            _ => self.local.clone(),
        }
    }
}

/// Fallback comparator for document order based on ancestry and stable
/// sibling ordering.
///
/// - If one node is an ancestor of the other, the ancestor precedes the descendant.
/// - Among siblings, namespaces come first, then attributes, then child nodes;
///   within each group the order provided by the adapter is preserved.
/// - Nodes of different trees cannot be ordered by this fallback; adapters that
///   hand out several documents must override [`XmlNode::compare_document_order`].
pub fn try_compare_by_ancestry<N: XmlNode>(a: &N, b: &N) -> Result<Ordering, EvaluationError> {
    if a.is_same_node(b) {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: XmlNode>(mut n: N) -> Vec<N> {
        let mut p = vec![n.clone()];
        while let Some(parent) = n.parent() {
            p.push(parent.clone());
            n = parent;
        }
        p.reverse();
        p
    }
    let pa = path_to_root(a.clone());
    let pb = path_to_root(b.clone());
    let len = pa.len().min(pb.len());
    let mut i = 0usize;
    while i < len && pa[i].is_same_node(&pb[i]) {
        i += 1;
    }
    if i == len {
        return Ok(pa.len().cmp(&pb.len()));
    }
    if i == 0 {
        return Err(EvaluationError::internal(
            "document order is undefined for nodes of different trees",
        ));
    }
    let parent = &pa[i - 1];
    let mut siblings: Vec<N> = parent.namespaces();
    siblings.extend(parent.attributes());
    siblings.extend(parent.children());
    let posa = siblings.iter().position(|n| n.is_same_node(&pa[i]));
    let posb = siblings.iter().position(|n| n.is_same_node(&pb[i]));
    Ok(match (posa, posb) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    })
}

/// The node source the engine evaluates against.
///
/// Only the structural accessors are required; axes, identity, document order
/// and the XSLT helper lookups have defaults derived from them. Adapters with
/// cheaper native answers (pre-order indexes, ID tables) should override.
pub trait XmlNode: Clone + Eq + fmt::Debug + Send + Sync + 'static {
    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;
    fn base_uri(&self) -> Option<String> {
        self.parent().and_then(|p| p.base_uri())
    }

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    fn attributes(&self) -> Vec<Self>;
    fn namespaces(&self) -> Vec<Self> {
        Vec::new()
    }

    /// Name with the prefix resolved away. Namespace nodes are named by their
    /// prefix and are never in a namespace themselves.
    fn expanded_name(&self) -> Option<ExpandedName> {
        let q = self.name()?;
        if self.kind() == NodeKind::Namespace {
            return Some(ExpandedName::local(&q.local));
        }
        Some(ExpandedName::new(q.ns_uri.as_deref(), &q.local))
    }

    fn is_same_node(&self, other: &Self) -> bool {
        self == other
    }

    fn root(&self) -> Self {
        let mut n = self.clone();
        while let Some(p) = n.parent() {
            n = p;
        }
        n
    }

    fn attribute_value(&self, name: &ExpandedName) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|a| a.expanded_name().as_ref() == Some(name))
            .map(|a| a.string_value())
    }

    /// Element of this node's document carrying the ID `id`.
    fn element_with_id(&self, _id: &str) -> Option<Self> {
        None
    }

    fn unparsed_entity_uri(&self, _name: &str) -> Option<String> {
        None
    }

    /// Identifier unique among the nodes of one document, usable as an XML name.
    fn generate_id(&self) -> String {
        let mut steps = Vec::new();
        let mut n = self.clone();
        while let Some(p) = n.parent() {
            let idx = p
                .namespaces()
                .into_iter()
                .chain(p.attributes())
                .chain(p.children())
                .position(|c| c.is_same_node(&n))
                .unwrap_or(0);
            steps.push(idx.to_string());
            n = p;
        }
        steps.reverse();
        format!("d{}", steps.join("_"))
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering, EvaluationError> {
        try_compare_by_ancestry(self, other)
    }

    /// Nodes reachable along `axis` that satisfy `test`, in axis order.
    fn axis(&self, axis: Axis, test: &NodeTest) -> AxisEnumeration<Self> {
        AxisEnumeration::new(self, axis, test)
    }

    /// Value of `xml:lang` on this node or its nearest ancestor.
    fn language(&self) -> Option<String> {
        let lang = ExpandedName::new(Some(XML_NAMESPACE), "lang");
        let mut n = Some(self.clone());
        while let Some(cur) = n {
            if cur.kind() == NodeKind::Element {
                if let Some(v) = cur.attribute_value(&lang) {
                    return Some(v);
                }
            }
            n = cur.parent();
        }
        None
    }
}
