//! Node-set values: empty, singleton, materialized extent and lazy intent.
//!
//! All variants share one capability set (enumerate, count, first, ordering
//! flags). Conversions to scalars use the first node in document order.

mod extent;
mod intent;

use compact_str::CompactString;

pub use extent::{NodeSetExtent, sort_document_order};
pub use intent::NodeSetIntent;

use crate::enumeration::{
    BoxedEnumeration, EmptyEnumeration, NodeEnumeration, SingletonEnumeration, SliceEnumeration,
};
use crate::error::{EvaluationError, Result};
use crate::model::XmlNode;

#[derive(Debug, Clone)]
pub enum NodeSetValue<N: XmlNode> {
    Empty,
    /// Zero or one node. `general_use == false` marks a result tree fragment,
    /// which may be converted to a string but not navigated.
    Singleton { node: Option<N>, general_use: bool },
    Extent(NodeSetExtent<N>),
    Intent(NodeSetIntent<N>),
}

impl<N: XmlNode> NodeSetValue<N> {
    pub fn singleton(node: Option<N>) -> Self {
        match node {
            Some(n) => NodeSetValue::Singleton {
                node: Some(n),
                general_use: true,
            },
            None => NodeSetValue::Empty,
        }
    }

    /// A result tree fragment rooted at `root`.
    pub fn fragment(root: N) -> Self {
        NodeSetValue::Singleton {
            node: Some(root),
            general_use: false,
        }
    }

    pub fn from_nodes(nodes: Vec<N>, sorted: bool) -> Self {
        if nodes.is_empty() {
            NodeSetValue::Empty
        } else {
            NodeSetValue::Extent(NodeSetExtent::new(nodes, sorted))
        }
    }

    pub fn allows_general_use(&self) -> bool {
        !matches!(
            self,
            NodeSetValue::Singleton {
                general_use: false,
                ..
            }
        )
    }

    /// Enumerate the members in whatever order is cheapest.
    pub fn enumerate(&self) -> Result<BoxedEnumeration<N>> {
        if !self.allows_general_use() {
            return Err(EvaluationError::type_error(
                "Cannot process a result tree fragment as a node-set under XSLT 1.0",
            ));
        }
        self.scan()
    }

    /// Enumerate, in document order when `sort` is set.
    pub fn enumerate_sorted(&self, sort: bool) -> Result<BoxedEnumeration<N>> {
        if !self.allows_general_use() {
            return self.enumerate();
        }
        match self {
            NodeSetValue::Intent(i) => i.enumerate(sort),
            NodeSetValue::Extent(e) if sort && !e.is_sorted() => Ok(Box::new(e.sort()?.enumerate())),
            _ => self.scan(),
        }
    }

    /// Enumeration without the result tree fragment restriction, for
    /// comparisons and conversions.
    pub(crate) fn scan(&self) -> Result<BoxedEnumeration<N>> {
        Ok(match self {
            NodeSetValue::Empty => Box::new(EmptyEnumeration),
            NodeSetValue::Singleton { node, .. } => Box::new(SingletonEnumeration::new(node.clone())),
            NodeSetValue::Extent(e) => Box::new(e.enumerate()),
            NodeSetValue::Intent(i) => i.enumerate(false)?,
        })
    }

    pub fn is_sorted(&self) -> bool {
        match self {
            NodeSetValue::Empty | NodeSetValue::Singleton { .. } => true,
            NodeSetValue::Extent(e) => e.is_sorted(),
            NodeSetValue::Intent(i) => i.is_sorted(),
        }
    }

    pub fn is_reverse_sorted(&self) -> bool {
        match self {
            NodeSetValue::Empty | NodeSetValue::Singleton { .. } => true,
            NodeSetValue::Extent(e) => e.is_reverse_sorted(),
            NodeSetValue::Intent(_) => false,
        }
    }

    pub fn is_peer(&self) -> bool {
        matches!(self, NodeSetValue::Empty | NodeSetValue::Singleton { .. })
    }

    /// Number of distinct nodes.
    pub fn count(&self) -> Result<usize> {
        match self {
            NodeSetValue::Empty => Ok(0),
            NodeSetValue::Singleton { node, .. } => Ok(usize::from(node.is_some())),
            NodeSetValue::Extent(e) => Ok(e.sort()?.len()),
            NodeSetValue::Intent(i) => i.count(),
        }
    }

    /// First node in document order.
    pub fn first(&self) -> Result<Option<N>> {
        match self {
            NodeSetValue::Empty => Ok(None),
            NodeSetValue::Singleton { node, .. } => Ok(node.clone()),
            NodeSetValue::Extent(e) => e.first(),
            NodeSetValue::Intent(i) => i.first(),
        }
    }

    /// The members, sorted, as a materialized extent.
    pub fn materialize(&self) -> Result<NodeSetExtent<N>> {
        match self {
            NodeSetValue::Extent(e) => e.sort(),
            NodeSetValue::Intent(i) => i.materialize()?.sort(),
            other => {
                let mut enm = other.scan()?;
                NodeSetExtent::from_enumeration(&mut enm)
            }
        }
    }

    pub fn as_string(&self) -> Result<CompactString> {
        Ok(self
            .first()?
            .map(|n| CompactString::from(n.string_value()))
            .unwrap_or_default())
    }

    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            NodeSetValue::Empty => Ok(false),
            NodeSetValue::Singleton { node, .. } => Ok(node.is_some()),
            NodeSetValue::Extent(e) => Ok(!e.is_empty()),
            NodeSetValue::Intent(i) => Ok(i.enumerate(false)?.next_node()?.is_some()),
        }
    }
}

impl<N: XmlNode> From<NodeSetExtent<N>> for NodeSetValue<N> {
    fn from(e: NodeSetExtent<N>) -> Self {
        NodeSetValue::Extent(e)
    }
}

/// Materialized, sorted enumeration of any node enumeration.
pub fn sorted_enumeration<N: XmlNode>(
    mut enm: BoxedEnumeration<N>,
) -> Result<BoxedEnumeration<N>> {
    if enm.is_sorted() {
        return Ok(enm);
    }
    let ext = NodeSetExtent::from_enumeration(&mut enm)?.sort()?;
    Ok(Box::new(ext.enumerate()))
}

/// A sorted enumeration over shared nodes already known to be in document
/// order.
pub fn sorted_slice<N: XmlNode>(nodes: Vec<N>) -> BoxedEnumeration<N> {
    Box::new(SliceEnumeration::new(std::sync::Arc::new(nodes), true, false))
}
