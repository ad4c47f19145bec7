//! The thirteen XPath axes and their default derivation from the structural
//! accessors of [`XmlNode`].

use core::fmt;

use crate::enumeration::NodeEnumeration;
use crate::error::Result;
use crate::model::{NodeKind, XmlNode};
use crate::node_test::NodeTest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    pub const ALL: [Axis; 13] = [
        Axis::Ancestor,
        Axis::AncestorOrSelf,
        Axis::Attribute,
        Axis::Child,
        Axis::Descendant,
        Axis::DescendantOrSelf,
        Axis::Following,
        Axis::FollowingSibling,
        Axis::Namespace,
        Axis::Parent,
        Axis::Preceding,
        Axis::PrecedingSibling,
        Axis::SelfAxis,
    ];

    pub fn from_name(name: &str) -> Option<Axis> {
        Axis::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Attribute => "attribute",
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Following => "following",
            Axis::FollowingSibling => "following-sibling",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Preceding => "preceding",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::SelfAxis => "self",
        }
    }

    /// Kind of node selected by `*` on this axis.
    pub fn principal_node_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }

    /// Axis order coincides with document order.
    pub fn is_forwards(self) -> bool {
        !self.is_reverse()
    }

    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }

    /// No node on the axis is an ancestor of another.
    pub fn is_peer(self) -> bool {
        matches!(
            self,
            Axis::Attribute
                | Axis::Child
                | Axis::Namespace
                | Axis::Parent
                | Axis::SelfAxis
                | Axis::FollowingSibling
                | Axis::PrecedingSibling
        )
    }

    /// Every node reached from a given origin lies inside that origin's subtree.
    pub fn is_subtree(self) -> bool {
        matches!(
            self,
            Axis::Attribute
                | Axis::Child
                | Axis::Descendant
                | Axis::DescendantOrSelf
                | Axis::Namespace
                | Axis::SelfAxis
        )
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_attached_leaf(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Attribute | NodeKind::Namespace)
}

/// Position of `node` among its parent's children, with those children.
fn siblings_of<N: XmlNode>(node: &N) -> Option<(Vec<N>, usize)> {
    if is_attached_leaf(node.kind()) {
        return None;
    }
    let siblings = node.parent()?.children();
    let idx = siblings.iter().position(|s| s.is_same_node(node))?;
    Some((siblings, idx))
}

/// A subtree whose remaining content is delivered in reverse document order:
/// the children from last to first, then the node itself.
struct ReverseFrame<N> {
    node: N,
    children: std::iter::Rev<std::vec::IntoIter<N>>,
}

impl<N: XmlNode> ReverseFrame<N> {
    fn new(node: N) -> Self {
        Self {
            children: node.children().into_iter().rev(),
            node,
        }
    }
}

/// Tree walking state. Sibling and attribute lists come from the node model
/// as vectors anyway; everything that reaches beyond them is walked one node
/// per call.
enum Walk<N> {
    Listed(std::vec::IntoIter<N>),
    Ancestors(Option<N>),
    /// Pre-order over a stack of remaining child lists. `anchor` is the node
    /// whose following siblings come next once the stack runs dry; `None`
    /// confines the walk to the subtrees already on the stack.
    Forward {
        stack: Vec<std::vec::IntoIter<N>>,
        anchor: Option<N>,
    },
    /// Reverse document order, nearest first, skipping ancestors of `anchor`.
    Backward {
        stack: Vec<ReverseFrame<N>>,
        siblings: std::iter::Rev<std::vec::IntoIter<N>>,
        anchor: Option<N>,
    },
}

impl<N: XmlNode> Walk<N> {
    fn start(node: &N, axis: Axis) -> Self {
        let listed = |nodes: Vec<N>| Walk::Listed(nodes.into_iter());
        match axis {
            Axis::Child => listed(node.children()),
            Axis::Attribute if node.kind() == NodeKind::Element => listed(node.attributes()),
            Axis::Namespace if node.kind() == NodeKind::Element => listed(node.namespaces()),
            Axis::Attribute | Axis::Namespace => listed(Vec::new()),
            Axis::SelfAxis => listed(vec![node.clone()]),
            Axis::Parent => listed(node.parent().into_iter().collect()),
            Axis::Ancestor => Walk::Ancestors(node.parent()),
            Axis::AncestorOrSelf => Walk::Ancestors(Some(node.clone())),
            Axis::Descendant => Walk::Forward {
                stack: vec![node.children().into_iter()],
                anchor: None,
            },
            Axis::DescendantOrSelf => Walk::Forward {
                stack: vec![vec![node.clone()].into_iter()],
                anchor: None,
            },
            Axis::FollowingSibling => match siblings_of(node) {
                Some((mut s, idx)) => listed(s.split_off(idx + 1)),
                None => listed(Vec::new()),
            },
            Axis::PrecedingSibling => match siblings_of(node) {
                Some((mut s, idx)) => {
                    s.truncate(idx);
                    s.reverse();
                    listed(s)
                }
                None => listed(Vec::new()),
            },
            Axis::Following => {
                if is_attached_leaf(node.kind()) {
                    match node.parent() {
                        Some(p) => Walk::Forward {
                            stack: vec![p.children().into_iter()],
                            anchor: Some(p),
                        },
                        None => listed(Vec::new()),
                    }
                } else {
                    Walk::Forward {
                        stack: Vec::new(),
                        anchor: Some(node.clone()),
                    }
                }
            }
            Axis::Preceding => {
                let anchor = if is_attached_leaf(node.kind()) {
                    node.parent()
                } else {
                    Some(node.clone())
                };
                Walk::Backward {
                    stack: Vec::new(),
                    siblings: Vec::new().into_iter().rev(),
                    anchor,
                }
            }
        }
    }

    fn advance(&mut self) -> Option<N> {
        match self {
            Walk::Listed(it) => it.next(),
            Walk::Ancestors(next) => {
                let n = next.take()?;
                *next = n.parent();
                Some(n)
            }
            Walk::Forward { stack, anchor } => loop {
                if let Some(top) = stack.last_mut() {
                    match top.next() {
                        Some(n) => {
                            stack.push(n.children().into_iter());
                            return Some(n);
                        }
                        None => {
                            stack.pop();
                        }
                    }
                    continue;
                }
                let from = anchor.take()?;
                if let Some((mut s, idx)) = siblings_of(&from) {
                    stack.push(s.split_off(idx + 1).into_iter());
                }
                *anchor = from.parent();
            },
            Walk::Backward {
                stack,
                siblings,
                anchor,
            } => loop {
                if let Some(top) = stack.last_mut() {
                    match top.children.next() {
                        Some(c) => stack.push(ReverseFrame::new(c)),
                        None => return stack.pop().map(|f| f.node),
                    }
                    continue;
                }
                if let Some(s) = siblings.next() {
                    stack.push(ReverseFrame::new(s));
                    continue;
                }
                let from = anchor.take()?;
                if let Some((mut s, idx)) = siblings_of(&from) {
                    s.truncate(idx);
                    *siblings = s.into_iter().rev();
                }
                *anchor = from.parent();
            },
        }
    }

    /// Remaining nodes when they are already listed.
    fn listed(&self) -> Option<&[N]> {
        match self {
            Walk::Listed(it) => Some(it.as_slice()),
            _ => None,
        }
    }
}

/// The nodes of one axis from one origin, filtered by a node test, found one
/// at a time as the consumer asks for them.
pub struct AxisEnumeration<N> {
    axis: Axis,
    walk: Walk<N>,
    test: NodeTest,
    delivered: usize,
}

impl<N: XmlNode> fmt::Debug for AxisEnumeration<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisEnumeration")
            .field("axis", &self.axis)
            .field("test", &self.test)
            .field("delivered", &self.delivered)
            .finish()
    }
}

impl<N: XmlNode> AxisEnumeration<N> {
    pub fn new(origin: &N, axis: Axis, test: &NodeTest) -> Self {
        Self {
            axis,
            walk: Walk::start(origin, axis),
            test: test.clone(),
            delivered: 0,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }
}

impl<N: XmlNode> NodeEnumeration<N> for AxisEnumeration<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        while let Some(n) = self.walk.advance() {
            if self.test.matches(&n) {
                self.delivered += 1;
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    fn is_sorted(&self) -> bool {
        self.axis.is_forwards()
    }

    fn is_reverse_sorted(&self) -> bool {
        self.axis.is_reverse()
    }

    fn is_peer(&self) -> bool {
        self.axis.is_peer()
    }

    /// Only the listed axes know their size without walking the tree.
    fn is_last_position_finder(&self) -> bool {
        self.walk.listed().is_some()
    }

    fn last_position(&mut self) -> Result<Option<usize>> {
        Ok(self.walk.listed().map(|rest| {
            self.delivered + rest.iter().filter(|n| self.test.matches(*n)).count()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumeration::collect_nodes;
    use crate::simple_node::{SimpleNode, attr, elem, text};

    fn collect_axis(node: &SimpleNode, axis: Axis) -> Vec<SimpleNode> {
        collect_nodes(&mut node.axis(axis, &NodeTest::AnyNode)).unwrap()
    }

    fn names(nodes: &[SimpleNode]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| n.name().map(|q| q.local).unwrap_or_else(|| n.string_value()))
            .collect()
    }

    fn sample() -> SimpleNode {
        // <r><a><a1/><a2/></a><b x="1"><b1/></b><c/></r>
        elem("r")
            .child(elem("a").child(elem("a1")).child(elem("a2")))
            .child(elem("b").attr(attr("x", "1")).child(elem("b1")))
            .child(elem("c"))
            .build()
    }

    #[test]
    fn following_and_preceding_exclude_ancestors() {
        let r = sample();
        let b = r.children()[1].clone();
        let b1 = b.children()[0].clone();
        assert_eq!(names(&collect_axis(&b1, Axis::Following)), ["c"]);
        assert_eq!(names(&collect_axis(&b1, Axis::Preceding)), ["a2", "a1", "a"]);
    }

    #[test]
    fn attribute_following_starts_with_parent_content() {
        let r = sample();
        let x = r.children()[1].attributes()[0].clone();
        assert_eq!(names(&collect_axis(&x, Axis::Following)), ["b1", "c"]);
        assert!(collect_axis(&x, Axis::FollowingSibling).is_empty());
    }

    #[test]
    fn reverse_axes_are_nearest_first() {
        let r = sample();
        let a2 = r.children()[0].children()[1].clone();
        assert_eq!(names(&collect_axis(&a2, Axis::AncestorOrSelf)), ["a2", "a", "r"]);
        let c = r.children()[2].clone();
        assert_eq!(names(&collect_axis(&c, Axis::PrecedingSibling)), ["b", "a"]);
    }

    #[test]
    fn axis_enumeration_counts_matches() {
        let r = elem("r")
            .child(elem("a"))
            .child(text("t"))
            .child(elem("a"))
            .build();
        let mut e = r.axis(Axis::Child, &NodeTest::Kind(NodeKind::Element));
        assert_eq!(e.last_position().unwrap(), Some(2));
        assert!(e.next_node().unwrap().is_some());
        assert!(e.next_node().unwrap().is_some());
        assert!(e.next_node().unwrap().is_none());
    }

    #[test]
    fn tree_walks_are_lazy_and_in_document_order() {
        let r = sample();
        let mut e = r.axis(Axis::Descendant, &NodeTest::AnyNode);
        assert!(!e.is_last_position_finder());
        assert_eq!(e.last_position().unwrap(), None);
        assert_eq!(names(&[e.next_node().unwrap().unwrap()]), ["a"]);
        assert_eq!(names(&collect_axis(&r, Axis::DescendantOrSelf)), [
            "r", "a", "a1", "a2", "b", "b1", "c"
        ]);
        let a1 = r.children()[0].children()[0].clone();
        assert_eq!(names(&collect_axis(&a1, Axis::Following)), ["a2", "b", "b1", "c"]);
        let c = r.children()[2].clone();
        assert_eq!(names(&collect_axis(&c, Axis::Preceding)), ["b1", "b", "a2", "a1", "a"]);
    }

    #[test]
    fn axis_names_round_trip() {
        for a in Axis::ALL {
            assert_eq!(Axis::from_name(a.name()), Some(a));
        }
        assert_eq!(Axis::from_name("sideways"), None);
    }
}
