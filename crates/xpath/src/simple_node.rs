//! Simple in-memory tree implementing [`XmlNode`], used by the tests, the
//! benchmarks and for quick prototypes.
//!
//! Focus:
//! - Ergonomic builder for quick test tree creation
//! - Stable document order (ancestry + sibling ordering; distinct documents are
//!   ordered by allocation address)
//! - Immutable once built, so trees can be shared across threads
//!
//! Example:
//! ```
//! use stylus_xpath::simple_node::{attr, elem, text};
//! use stylus_xpath::XmlNode;
//!
//! // <root id="r"><child>Hello</child><child world="yes"/></root>
//! let root = elem("root")
//!     .attr(attr("id", "r"))
//!     .child(elem("child").child(text("Hello")))
//!     .child(elem("child").attr(attr("world", "yes")))
//!     .build();
//!
//! assert_eq!(root.name().unwrap().local, "root");
//! assert_eq!(root.children().len(), 2);
//! assert_eq!(root.string_value(), "Hello");
//! ```
//!
//! Documents carry the base URI and unparsed entities:
//! ```
//! use stylus_xpath::simple_node::{doc, elem, ns};
//! use stylus_xpath::XmlNode;
//! let document = doc()
//!     .base_uri("file:///data/books.xml")
//!     .unparsed_entity("logo", "file:///data/logo.gif")
//!     .child(elem("root").namespace(ns("p", "urn:one")))
//!     .build();
//! let root = document.children()[0].clone();
//! assert_eq!(root.lookup_namespace_uri("p").as_deref(), Some("urn:one"));
//! assert_eq!(root.base_uri().as_deref(), Some("file:///data/books.xml"));
//! assert_eq!(root.unparsed_entity_uri("logo").as_deref(), Some("file:///data/logo.gif"));
//! ```
use core::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::error::EvaluationError;
use crate::model::{NodeKind, QName, XmlNode, try_compare_by_ancestry};

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: OnceLock<Weak<Inner>>,
    attributes: Vec<SimpleNode>,
    namespaces: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
    base_uri: Option<String>,
    entities: Vec<(String, String)>,
    cached_text: OnceLock<String>,
}

/// An Arc-backed node. Equality is identity.
#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name.as_ref().map(QName::lexical))
            .field("value", &self.0.value)
            .finish()
    }
}

fn qname(prefix: Option<&str>, ns_uri: Option<&str>, local: &str) -> QName {
    QName {
        prefix: prefix.map(str::to_string),
        local: local.to_string(),
        ns_uri: ns_uri.map(str::to_string),
    }
}

impl SimpleNode {
    fn leaf(kind: NodeKind, name: Option<QName>, value: &str) -> Self {
        SimpleNodeBuilder::new(kind, name).value(value).build()
    }

    pub fn document() -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Document, None)
    }
    pub fn element(name: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(qname(None, None, name)))
    }
    pub fn element_ns(prefix: &str, uri: &str, local: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(qname(Some(prefix), Some(uri), local)))
    }
    pub fn attribute(name: &str, value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Attribute, Some(qname(None, None, name)), value)
    }
    pub fn attribute_ns(prefix: &str, uri: &str, local: &str, value: &str) -> SimpleNode {
        Self::leaf(
            NodeKind::Attribute,
            Some(qname(Some(prefix), Some(uri), local)),
            value,
        )
    }
    pub fn text(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Text, None, value)
    }
    pub fn comment(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Comment, None, value)
    }
    pub fn pi(target: &str, data: &str) -> SimpleNode {
        Self::leaf(
            NodeKind::ProcessingInstruction,
            Some(qname(None, None, target)),
            data,
        )
    }
    /// Namespace nodes are named by their prefix and hold the URI as value.
    pub fn namespace(prefix: &str, uri: &str) -> SimpleNode {
        Self::leaf(NodeKind::Namespace, Some(qname(Some(prefix), None, prefix)), uri)
    }

    /// Resolve a namespace prefix by walking the ancestor chain (including self).
    pub fn lookup_namespace_uri(&self, prefix: &str) -> Option<String> {
        let mut cur = Some(self.clone());
        while let Some(n) = cur {
            for ns in &n.0.namespaces {
                if ns.0.name.as_ref().is_some_and(|q| q.local == prefix) {
                    return ns.0.value.clone();
                }
            }
            cur = n.parent();
        }
        None
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.0).addr()
    }

    fn find_id(&self, id: &str) -> Option<SimpleNode> {
        if self.kind() == NodeKind::Element
            && self
                .0
                .attributes
                .iter()
                .any(|a| a.0.name.as_ref().is_some_and(|q| q.local == "id") && a.0.value.as_deref() == Some(id))
        {
            return Some(self.clone());
        }
        self.0.children.iter().find_map(|c| c.find_id(id))
    }
}

pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    base_uri: Option<String>,
    entities: Vec<(String, String)>,
    pending_children: Vec<SimpleNode>,
    pending_attrs: Vec<SimpleNode>,
    pending_ns: Vec<SimpleNode>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        Self {
            kind,
            name,
            value: None,
            base_uri: None,
            entities: Vec::new(),
            pending_children: Vec::new(),
            pending_attrs: Vec::new(),
            pending_ns: Vec::new(),
        }
    }

    #[must_use]
    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.pending_children.push(child.into().into_node());
        self
    }
    #[must_use]
    pub fn children<I: IntoIterator<Item = SimpleNodeOrBuilder>>(mut self, it: I) -> Self {
        self.pending_children
            .extend(it.into_iter().map(SimpleNodeOrBuilder::into_node));
        self
    }
    #[must_use]
    pub fn attr(mut self, attr: SimpleNode) -> Self {
        debug_assert!(attr.kind() == NodeKind::Attribute);
        self.pending_attrs.push(attr);
        self
    }
    #[must_use]
    pub fn namespace(mut self, ns: SimpleNode) -> Self {
        debug_assert!(ns.kind() == NodeKind::Namespace);
        self.pending_ns.push(ns);
        self
    }
    #[must_use]
    pub fn value(mut self, v: &str) -> Self {
        self.value = Some(v.to_string());
        self
    }
    #[must_use]
    pub fn base_uri(mut self, uri: &str) -> Self {
        self.base_uri = Some(uri.to_string());
        self
    }
    #[must_use]
    pub fn unparsed_entity(mut self, name: &str, uri: &str) -> Self {
        self.entities.push((name.to_string(), uri.to_string()));
        self
    }

    pub fn build(self) -> SimpleNode {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            for n in self
                .pending_attrs
                .iter()
                .chain(&self.pending_ns)
                .chain(&self.pending_children)
            {
                // A node already attached elsewhere keeps its first parent.
                let _ = n.0.parent.set(weak.clone());
            }
            Inner {
                kind: self.kind,
                name: self.name,
                value: self.value,
                parent: OnceLock::new(),
                attributes: self.pending_attrs,
                namespaces: self.pending_ns,
                children: self.pending_children,
                base_uri: self.base_uri,
                entities: self.entities,
                cached_text: OnceLock::new(),
            }
        });
        SimpleNode(inner)
    }
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleNode),
    Builder(SimpleNodeBuilder),
}

impl SimpleNodeOrBuilder {
    fn into_node(self) -> SimpleNode {
        match self {
            SimpleNodeOrBuilder::Built(n) => n,
            SimpleNodeOrBuilder::Builder(b) => b.build(),
        }
    }
}

impl From<SimpleNode> for SimpleNodeOrBuilder {
    fn from(n: SimpleNode) -> Self {
        SimpleNodeOrBuilder::Built(n)
    }
}
impl From<SimpleNodeBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleNodeBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

// Convenience helpers for concise test code
pub fn doc() -> SimpleNodeBuilder {
    SimpleNode::document()
}
pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNode::element(name)
}
pub fn elem_ns(prefix: &str, uri: &str, local: &str) -> SimpleNodeBuilder {
    SimpleNode::element_ns(prefix, uri, local)
}
pub fn attr(name: &str, v: &str) -> SimpleNode {
    SimpleNode::attribute(name, v)
}
pub fn attr_ns(prefix: &str, uri: &str, local: &str, v: &str) -> SimpleNode {
    SimpleNode::attribute_ns(prefix, uri, local, v)
}
pub fn text(v: &str) -> SimpleNode {
    SimpleNode::text(v)
}
pub fn comment(v: &str) -> SimpleNode {
    SimpleNode::comment(v)
}
pub fn pi(target: &str, data: &str) -> SimpleNode {
    SimpleNode::pi(target, data)
}
pub fn ns(prefix: &str, uri: &str) -> SimpleNode {
    SimpleNode::namespace(prefix, uri)
}

impl XmlNode for SimpleNode {
    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Element | NodeKind::Document => self
                .0
                .cached_text
                .get_or_init(|| {
                    fn dfs(n: &SimpleNode, out: &mut String) {
                        if n.0.kind == NodeKind::Text {
                            out.push_str(n.0.value.as_deref().unwrap_or_default());
                        }
                        for c in &n.0.children {
                            dfs(c, out);
                        }
                    }
                    let mut out = String::new();
                    dfs(self, &mut out);
                    out
                })
                .clone(),
            _ => self.0.value.clone().unwrap_or_default(),
        }
    }

    fn base_uri(&self) -> Option<String> {
        if let Some(b) = &self.0.base_uri {
            return Some(b.clone());
        }
        self.parent().and_then(|p| p.base_uri())
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.clone()
    }

    fn attributes(&self) -> Vec<Self> {
        self.0.attributes.clone()
    }

    fn namespaces(&self) -> Vec<Self> {
        self.0.namespaces.clone()
    }

    fn element_with_id(&self, id: &str) -> Option<Self> {
        self.root().find_id(id)
    }

    fn unparsed_entity_uri(&self, name: &str) -> Option<String> {
        self.root()
            .0
            .entities
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, uri)| uri.clone())
    }

    fn generate_id(&self) -> String {
        format!("n{:x}", self.address())
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering, EvaluationError> {
        let (ra, rb) = (self.root(), other.root());
        if ra == rb {
            try_compare_by_ancestry(self, other)
        } else {
            Ok(ra.address().cmp(&rb.address()))
        }
    }
}
