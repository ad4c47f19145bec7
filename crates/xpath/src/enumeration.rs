//! The node enumeration contract shared by axes, node-sets, filters, set
//! operations and sorted selections.
//!
//! The ordering flags are advisory and must be conservative: claiming
//! `is_sorted` for a sequence that is not in document order breaks the merge
//! algorithms downstream, while a false negative only costs a redundant sort.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::Result;
use crate::model::XmlNode;

pub trait NodeEnumeration<N: XmlNode> {
    fn next_node(&mut self) -> Result<Option<N>>;

    /// Nodes are delivered in document order without duplicates.
    fn is_sorted(&self) -> bool;

    /// Nodes are delivered in reverse document order without duplicates.
    fn is_reverse_sorted(&self) -> bool {
        false
    }

    /// No delivered node is an ancestor of another.
    fn is_peer(&self) -> bool {
        false
    }

    /// Whether [`NodeEnumeration::last_position`] answers without reading ahead
    /// of the consumer.
    fn is_last_position_finder(&self) -> bool {
        false
    }

    /// Total number of nodes this enumeration delivers counting from its start,
    /// if known.
    fn last_position(&mut self) -> Result<Option<usize>> {
        Ok(None)
    }
}

pub type BoxedEnumeration<N> = Box<dyn NodeEnumeration<N> + Send>;

impl<N: XmlNode> NodeEnumeration<N> for BoxedEnumeration<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        (**self).next_node()
    }
    fn is_sorted(&self) -> bool {
        (**self).is_sorted()
    }
    fn is_reverse_sorted(&self) -> bool {
        (**self).is_reverse_sorted()
    }
    fn is_peer(&self) -> bool {
        (**self).is_peer()
    }
    fn is_last_position_finder(&self) -> bool {
        (**self).is_last_position_finder()
    }
    fn last_position(&mut self) -> Result<Option<usize>> {
        (**self).last_position()
    }
}

/// Drain an enumeration into a vector.
pub fn collect_nodes<N: XmlNode>(enm: &mut dyn NodeEnumeration<N>) -> Result<Vec<N>> {
    let mut out = Vec::new();
    while let Some(n) = enm.next_node()? {
        out.push(n);
    }
    Ok(out)
}

/// Adapts an enumeration to [`Iterator`].
pub struct NodeIter<N: XmlNode> {
    inner: BoxedEnumeration<N>,
    failed: bool,
}

impl<N: XmlNode> NodeIter<N> {
    pub fn new(inner: BoxedEnumeration<N>) -> Self {
        Self { inner, failed: false }
    }
}

impl<N: XmlNode> Iterator for NodeIter<N> {
    type Item = Result<N>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.inner.next_node() {
            Ok(Some(n)) => Some(Ok(n)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EmptyEnumeration;

impl<N: XmlNode> NodeEnumeration<N> for EmptyEnumeration {
    fn next_node(&mut self) -> Result<Option<N>> {
        Ok(None)
    }
    fn is_sorted(&self) -> bool {
        true
    }
    fn is_reverse_sorted(&self) -> bool {
        true
    }
    fn is_peer(&self) -> bool {
        true
    }
    fn is_last_position_finder(&self) -> bool {
        true
    }
    fn last_position(&mut self) -> Result<Option<usize>> {
        Ok(Some(0))
    }
}

#[derive(Debug)]
pub struct SingletonEnumeration<N> {
    node: Option<N>,
    count: usize,
}

impl<N: XmlNode> SingletonEnumeration<N> {
    pub fn new(node: Option<N>) -> Self {
        let count = usize::from(node.is_some());
        Self { node, count }
    }
}

impl<N: XmlNode> NodeEnumeration<N> for SingletonEnumeration<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        Ok(self.node.take())
    }
    fn is_sorted(&self) -> bool {
        true
    }
    fn is_reverse_sorted(&self) -> bool {
        true
    }
    fn is_peer(&self) -> bool {
        true
    }
    fn is_last_position_finder(&self) -> bool {
        true
    }
    fn last_position(&mut self) -> Result<Option<usize>> {
        Ok(Some(self.count))
    }
}

/// Enumeration over a shared, already materialized node array.
#[derive(Debug)]
pub struct SliceEnumeration<N> {
    nodes: Arc<Vec<N>>,
    index: usize,
    sorted: bool,
    reverse_sorted: bool,
}

impl<N: XmlNode> SliceEnumeration<N> {
    pub fn new(nodes: Arc<Vec<N>>, sorted: bool, reverse_sorted: bool) -> Self {
        Self {
            nodes,
            index: 0,
            sorted,
            reverse_sorted,
        }
    }
}

impl<N: XmlNode> NodeEnumeration<N> for SliceEnumeration<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        let n = self.nodes.get(self.index).cloned();
        if n.is_some() {
            self.index += 1;
        }
        Ok(n)
    }
    fn is_sorted(&self) -> bool {
        self.sorted
    }
    fn is_reverse_sorted(&self) -> bool {
        self.reverse_sorted
    }
    fn is_last_position_finder(&self) -> bool {
        true
    }
    fn last_position(&mut self) -> Result<Option<usize>> {
        Ok(Some(self.nodes.len()))
    }
}

/// Wraps an enumeration that cannot count itself so that `last()` can be
/// answered: the first size request buffers the rest of the base.
pub struct LookaheadEnumeration<N: XmlNode> {
    base: BoxedEnumeration<N>,
    buffer: VecDeque<N>,
    delivered: usize,
    exhausted: bool,
}

impl<N: XmlNode> LookaheadEnumeration<N> {
    pub fn new(base: BoxedEnumeration<N>) -> Self {
        Self {
            base,
            buffer: VecDeque::new(),
            delivered: 0,
            exhausted: false,
        }
    }
}

impl<N: XmlNode> NodeEnumeration<N> for LookaheadEnumeration<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        let next = match self.buffer.pop_front() {
            Some(n) => Some(n),
            None if self.exhausted => None,
            None => self.base.next_node()?,
        };
        if next.is_some() {
            self.delivered += 1;
        } else {
            self.exhausted = true;
        }
        Ok(next)
    }
    fn is_sorted(&self) -> bool {
        self.base.is_sorted()
    }
    fn is_reverse_sorted(&self) -> bool {
        self.base.is_reverse_sorted()
    }
    fn is_peer(&self) -> bool {
        self.base.is_peer()
    }
    fn is_last_position_finder(&self) -> bool {
        true
    }
    fn last_position(&mut self) -> Result<Option<usize>> {
        if !self.exhausted {
            while let Some(n) = self.base.next_node()? {
                self.buffer.push_back(n);
            }
            self.exhausted = true;
        }
        Ok(Some(self.delivered + self.buffer.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_node::{SimpleNode, elem};

    struct Counting(Vec<SimpleNode>);

    impl NodeEnumeration<SimpleNode> for Counting {
        fn next_node(&mut self) -> Result<Option<SimpleNode>> {
            Ok(if self.0.is_empty() { None } else { Some(self.0.remove(0)) })
        }
        fn is_sorted(&self) -> bool {
            true
        }
    }

    #[test]
    fn lookahead_counts_without_losing_nodes() {
        let root = elem("r").child(elem("a")).child(elem("b")).child(elem("c")).build();
        let kids = root.children();
        let mut la = LookaheadEnumeration::new(Box::new(Counting(kids.clone())));
        assert_eq!(la.next_node().unwrap(), Some(kids[0].clone()));
        assert_eq!(la.last_position().unwrap(), Some(3));
        assert_eq!(la.next_node().unwrap(), Some(kids[1].clone()));
        assert_eq!(la.next_node().unwrap(), Some(kids[2].clone()));
        assert_eq!(la.next_node().unwrap(), None);
        assert_eq!(la.last_position().unwrap(), Some(3));
    }

    #[test]
    fn singleton_reports_size() {
        let n = elem("x").build();
        let mut e = SingletonEnumeration::new(Some(n.clone()));
        assert_eq!(e.last_position().unwrap(), Some(1));
        assert_eq!(e.next_node().unwrap(), Some(n));
        assert_eq!(e.next_node().unwrap(), None);
    }
}
