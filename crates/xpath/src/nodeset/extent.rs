use core::cmp::Ordering;
use std::sync::Arc;

use crate::enumeration::{NodeEnumeration, SliceEnumeration};
use crate::error::{EvaluationError, Result};
use crate::model::XmlNode;

/// Sort `nodes` into document order and drop repeated nodes.
pub fn sort_document_order<N: XmlNode>(nodes: &mut Vec<N>) -> Result<()> {
    let mut failure: Option<EvaluationError> = None;
    nodes.sort_by(|a, b| match a.compare_document_order(b) {
        Ok(o) => o,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    nodes.dedup_by(|a, b| a.is_same_node(b));
    Ok(())
}

/// A materialized node-set.
#[derive(Debug, Clone)]
pub struct NodeSetExtent<N> {
    nodes: Arc<Vec<N>>,
    sorted: bool,
    reverse_sorted: bool,
}

impl<N: XmlNode> NodeSetExtent<N> {
    pub fn new(nodes: Vec<N>, sorted: bool) -> Self {
        let single = nodes.len() <= 1;
        Self {
            nodes: Arc::new(nodes),
            sorted: sorted || single,
            reverse_sorted: single,
        }
    }

    /// Materialize the rest of an enumeration, keeping what it knows about its
    /// ordering.
    pub fn from_enumeration(enm: &mut dyn NodeEnumeration<N>) -> Result<Self> {
        let sorted = enm.is_sorted();
        let reverse_sorted = enm.is_reverse_sorted();
        let mut nodes = Vec::new();
        while let Some(n) = enm.next_node()? {
            nodes.push(n);
        }
        let single = nodes.len() <= 1;
        Ok(Self {
            nodes: Arc::new(nodes),
            sorted: sorted || single,
            reverse_sorted: reverse_sorted || single,
        })
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn is_reverse_sorted(&self) -> bool {
        self.reverse_sorted
    }

    /// Number of entries, which counts duplicates unless the extent is sorted.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// The same nodes in document order without duplicates.
    pub fn sort(&self) -> Result<Self> {
        if self.sorted {
            return Ok(self.clone());
        }
        let mut nodes: Vec<N> = self.nodes.as_ref().clone();
        if self.reverse_sorted {
            nodes.reverse();
        } else {
            sort_document_order(&mut nodes)?;
        }
        Ok(Self::new(nodes, true))
    }

    pub fn enumerate(&self) -> SliceEnumeration<N> {
        SliceEnumeration::new(self.nodes.clone(), self.sorted, self.reverse_sorted)
    }

    /// First node in document order.
    pub fn first(&self) -> Result<Option<N>> {
        if self.sorted {
            return Ok(self.nodes.first().cloned());
        }
        if self.reverse_sorted {
            return Ok(self.nodes.last().cloned());
        }
        let mut best: Option<&N> = None;
        for n in self.nodes.iter() {
            best = match best {
                Some(b) if b.compare_document_order(n)? != Ordering::Greater => Some(b),
                _ => Some(n),
            };
        }
        Ok(best.cloned())
    }
}
