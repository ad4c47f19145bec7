//! Merge-based set operations over document-ordered node enumerations.
//!
//! Every enumerator here takes operands that are already sorted (callers use
//! [`crate::nodeset::sorted_enumeration`]) and delivers a sorted,
//! duplicate-free result.

use core::cmp::Ordering;
use std::collections::HashSet;

use compact_str::CompactString;

use crate::context::Context;
use crate::enumeration::{BoxedEnumeration, NodeEnumeration};
use crate::error::Result;
use crate::expr::Expr;
use crate::model::XmlNode;
use crate::nodeset::sorted_enumeration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            SetOperator::Union => "|",
            SetOperator::Intersect => "intersect",
            SetOperator::Except => "except",
        }
    }
}

/// Sorted enumeration with one node of lookahead.
struct Head<N: XmlNode> {
    inner: BoxedEnumeration<N>,
    head: Option<N>,
}

impl<N: XmlNode> Head<N> {
    fn new(inner: BoxedEnumeration<N>) -> Result<Self> {
        let mut inner = sorted_enumeration(inner)?;
        let head = inner.next_node()?;
        Ok(Self { inner, head })
    }

    fn advance(&mut self) -> Result<Option<N>> {
        let next = self.inner.next_node()?;
        Ok(std::mem::replace(&mut self.head, next))
    }
}

fn order<N: XmlNode>(a: &N, b: &N) -> Result<Ordering> {
    if a.is_same_node(b) {
        Ok(Ordering::Equal)
    } else {
        a.compare_document_order(b)
    }
}

/// Merge-walk of two sorted operands for one of the three set operators.
pub struct SetEnumeration<N: XmlNode> {
    op: SetOperator,
    left: Head<N>,
    right: Head<N>,
}

impl<N: XmlNode> SetEnumeration<N> {
    pub fn new(op: SetOperator, left: BoxedEnumeration<N>, right: BoxedEnumeration<N>) -> Result<Self> {
        Ok(Self {
            op,
            left: Head::new(left)?,
            right: Head::new(right)?,
        })
    }

    fn next_union(&mut self) -> Result<Option<N>> {
        match (&self.left.head, &self.right.head) {
            (None, None) => Ok(None),
            (Some(_), None) => self.left.advance(),
            (None, Some(_)) => self.right.advance(),
            (Some(a), Some(b)) => match order(a, b)? {
                Ordering::Less => self.left.advance(),
                Ordering::Greater => self.right.advance(),
                Ordering::Equal => {
                    self.right.advance()?;
                    self.left.advance()
                }
            },
        }
    }

    fn next_intersect(&mut self) -> Result<Option<N>> {
        loop {
            let (Some(a), Some(b)) = (&self.left.head, &self.right.head) else {
                return Ok(None);
            };
            match order(a, b)? {
                Ordering::Less => {
                    self.left.advance()?;
                }
                Ordering::Greater => {
                    self.right.advance()?;
                }
                Ordering::Equal => {
                    self.right.advance()?;
                    return self.left.advance();
                }
            }
        }
    }

    fn next_except(&mut self) -> Result<Option<N>> {
        loop {
            let Some(a) = &self.left.head else {
                return Ok(None);
            };
            let Some(b) = &self.right.head else {
                return self.left.advance();
            };
            match order(a, b)? {
                Ordering::Less => return self.left.advance(),
                Ordering::Greater => {
                    self.right.advance()?;
                }
                Ordering::Equal => {
                    self.left.advance()?;
                    self.right.advance()?;
                }
            }
        }
    }
}

impl<N: XmlNode> NodeEnumeration<N> for SetEnumeration<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        match self.op {
            SetOperator::Union => self.next_union(),
            SetOperator::Intersect => self.next_intersect(),
            SetOperator::Except => self.next_except(),
        }
    }

    fn is_sorted(&self) -> bool {
        true
    }
}

/// Sorted input with every node whose string value (or key value) was
/// already delivered removed.
pub struct DistinctEnumeration<N: XmlNode> {
    base: BoxedEnumeration<N>,
    key: Option<(Expr<N>, Context<N>)>,
    seen: HashSet<CompactString>,
}

impl<N: XmlNode> DistinctEnumeration<N> {
    pub fn new(
        base: BoxedEnumeration<N>,
        key: Option<Expr<N>>,
        context: &Context<N>,
    ) -> Result<Self> {
        Ok(Self {
            base: sorted_enumeration(base)?,
            key: key.map(|k| (k, context.clone())),
            seen: HashSet::new(),
        })
    }

    fn key_of(&self, node: &N) -> Result<CompactString> {
        match &self.key {
            None => Ok(CompactString::from(node.string_value())),
            Some((expr, ctx)) => expr.evaluate_as_string(&ctx.with_focus(node.clone(), 1, 1)),
        }
    }
}

impl<N: XmlNode> NodeEnumeration<N> for DistinctEnumeration<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        while let Some(node) = self.base.next_node()? {
            let key = self.key_of(&node)?;
            if self.seen.insert(key) {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    fn is_sorted(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::enumeration::{SliceEnumeration, collect_nodes};
    use crate::simple_node::{SimpleNode, elem};

    /// The root is returned too; dropping it would detach the children.
    fn kids() -> (SimpleNode, Vec<SimpleNode>) {
        let mut r = elem("r");
        for n in ["a", "b", "c", "d", "e"] {
            r = r.child(elem(n));
        }
        let root = r.build();
        let k = root.children();
        (root, k)
    }

    fn en(nodes: &[SimpleNode], sorted: bool) -> BoxedEnumeration<SimpleNode> {
        Box::new(SliceEnumeration::new(Arc::new(nodes.to_vec()), sorted, false))
    }

    fn run(op: SetOperator, a: &[SimpleNode], b: &[SimpleNode]) -> Vec<SimpleNode> {
        let mut e = SetEnumeration::new(op, en(a, false), en(b, false)).unwrap();
        collect_nodes(&mut e).unwrap()
    }

    #[test]
    fn merge_operators() {
        let (_root, k) = kids();
        let a = [k[3].clone(), k[0].clone(), k[2].clone()];
        let b = [k[4].clone(), k[2].clone(), k[1].clone()];
        assert_eq!(run(SetOperator::Union, &a, &b), k);
        assert_eq!(run(SetOperator::Intersect, &a, &b), [k[2].clone()]);
        assert_eq!(run(SetOperator::Except, &a, &b), [k[0].clone(), k[3].clone()]);
        assert_eq!(run(SetOperator::Except, &b, &[]), [k[1].clone(), k[2].clone(), k[4].clone()]);
    }
}
