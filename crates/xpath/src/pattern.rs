//! Match patterns: the restricted path syntax used to decide whether a node
//! matches a template rule or a key definition.

use compact_str::CompactString;

use crate::axis::Axis;
use crate::context::{Context, SharedStaticContext};
use crate::enumeration::NodeEnumeration;
use crate::error::{Result, SyntaxError};
use crate::expr::{Expr, ExprKind, Step};
use crate::functions::SystemFunction;
use crate::model::{NodeKind, XmlNode};
use crate::names::{ExpandedName, Fingerprint};
use crate::node_test::NodeTest;
use crate::parser::Parser;

/// How a location pattern step is joined to the pattern for its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `/`
    Parent,
    /// `//`
    Ancestor,
}

/// Position checks that can be done without the full predicate machinery.
#[derive(Debug, Clone)]
pub enum PositionCheck<N: XmlNode> {
    None,
    /// `[1]` on an element step.
    First,
    /// `[last()]`
    Last,
    /// Any other positional predicate: the step is re-run from the parent and
    /// the node must be among the selected nodes.
    Expression(Expr<N>),
}

#[derive(Debug, Clone)]
pub struct LocationPattern<N: XmlNode> {
    pub axis: Axis,
    pub test: NodeTest,
    pub filters: Vec<Expr<N>>,
    pub upper: Option<(Connector, Pattern<N>)>,
    pub position: PositionCheck<N>,
}

#[derive(Debug, Clone)]
pub enum Pattern<N: XmlNode> {
    /// `/`
    Document,
    /// A single step with no predicates and nothing above it.
    Test(NodeTest),
    Location(Box<LocationPattern<N>>),
    /// `id('a b')`
    Id(CompactString),
    /// `key('name', 'value')`
    Key {
        name: ExpandedName,
        value: CompactString,
    },
    Union(Box<Pattern<N>>, Box<Pattern<N>>),
}

impl<N: XmlNode> LocationPattern<N> {
    pub(crate) fn build(
        axis: Axis,
        test: NodeTest,
        filters: Vec<Expr<N>>,
        upper: Option<(Connector, Pattern<N>)>,
    ) -> Pattern<N> {
        if upper.is_none() && filters.is_empty() {
            return Pattern::Test(test);
        }
        let position = position_check(axis, &test, &filters);
        Pattern::Location(Box::new(LocationPattern {
            axis,
            test,
            filters,
            upper,
            position,
        }))
    }

    fn matches(&self, node: &N, ctx: &Context<N>) -> Result<bool> {
        if !self.test.matches(node) {
            return Ok(false);
        }
        match &self.upper {
            None => {}
            Some((Connector::Parent, upper)) => match node.parent() {
                Some(p) if upper.matches(&p, ctx)? => {}
                _ => return Ok(false),
            },
            Some((Connector::Ancestor, upper)) => {
                let mut found = false;
                let mut a = node.parent();
                while let Some(n) = a {
                    if upper.matches(&n, ctx)? {
                        found = true;
                        break;
                    }
                    a = n.parent();
                }
                if !found {
                    return Ok(false);
                }
            }
        }
        match &self.position {
            PositionCheck::First => {
                let mut before = node.axis(Axis::PrecedingSibling, &self.test);
                Ok(before.next_node()?.is_none())
            }
            PositionCheck::Last => {
                let mut after = node.axis(Axis::FollowingSibling, &self.test);
                Ok(after.next_node()?.is_none())
            }
            PositionCheck::Expression(e) => {
                let mut selected = e.enumerate(&ctx.with_context_node(node.clone()), false)?;
                while let Some(n) = selected.next_node()? {
                    if n.is_same_node(node) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            PositionCheck::None => {
                let focus = ctx.with_focus(node.clone(), 1, 1);
                for f in &self.filters {
                    if !f.evaluate_as_boolean(&focus)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

fn position_check<N: XmlNode>(axis: Axis, test: &NodeTest, filters: &[Expr<N>]) -> PositionCheck<N> {
    if let [only] = filters {
        let first = match only.kind() {
            ExprKind::Value(v) => matches!(v.as_number(), Ok(n) if n == 1.0),
            ExprKind::PositionRange { min: 1, max: 1 } => true,
            _ => false,
        };
        if first && axis == Axis::Child && test.node_kind() == Some(NodeKind::Element) {
            return PositionCheck::First;
        }
        let last = match only.kind() {
            ExprKind::IsLast(true) => true,
            ExprKind::FunctionCall { function, args, .. } => {
                *function == SystemFunction::Last && args.is_empty()
            }
            _ => false,
        };
        if last {
            return PositionCheck::Last;
        }
    }
    if !filters.iter().any(Expr::is_positional) {
        return PositionCheck::None;
    }
    let mut step = Step::new(axis, test.clone());
    step.filters.extend(filters.iter().cloned());
    PositionCheck::Expression(Expr::new(ExprKind::Path {
        start: Expr::new(ExprKind::ParentNode),
        step,
    }))
}

impl<N: XmlNode> Pattern<N> {
    /// Compile `text` as a pattern.
    pub fn parse(text: &str, static_context: &SharedStaticContext) -> core::result::Result<Self, SyntaxError> {
        Parser::new(text, static_context)?.parse_pattern_complete()
    }

    /// Whether `node` matches this pattern. `ctx` supplies the controller,
    /// variables and current node for predicates.
    pub fn matches(&self, node: &N, ctx: &Context<N>) -> Result<bool> {
        match self {
            Pattern::Document => Ok(node.kind() == NodeKind::Document),
            Pattern::Test(test) => Ok(test.matches(node)),
            Pattern::Location(lp) => lp.matches(node, ctx),
            Pattern::Id(ids) => {
                if node.kind() != NodeKind::Element {
                    return Ok(false);
                }
                let root = node.root();
                Ok(ids.split_whitespace().any(|id| {
                    root.element_with_id(id)
                        .is_some_and(|e| e.is_same_node(node))
                }))
            }
            Pattern::Key { name, value } => {
                let root = node.root();
                let found = ctx.controller().keys().lookup(name, value, &root, ctx)?;
                Ok(found.iter().any(|n| n.is_same_node(node)))
            }
            Pattern::Union(a, b) => Ok(a.matches(node, ctx)? || b.matches(node, ctx)?),
        }
    }

    /// The only kind of node this pattern can match, if there is one.
    pub fn node_kind(&self) -> Option<NodeKind> {
        match self {
            Pattern::Document => Some(NodeKind::Document),
            Pattern::Test(t) => t.node_kind(),
            Pattern::Location(lp) => lp.test.node_kind(),
            Pattern::Id(_) => Some(NodeKind::Element),
            Pattern::Key { .. } => None,
            Pattern::Union(a, b) => match (a.node_kind(), b.node_kind()) {
                (Some(x), Some(y)) if x == y => Some(x),
                _ => None,
            },
        }
    }

    /// The only name this pattern can match, if there is one.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        match self {
            Pattern::Test(t) => t.fingerprint(),
            Pattern::Location(lp) => lp.test.fingerprint(),
            Pattern::Union(a, b) => match (a.fingerprint(), b.fingerprint()) {
                (Some(x), Some(y)) if x == y => Some(x),
                _ => None,
            },
            _ => None,
        }
    }

    /// Default template priority.
    pub fn default_priority(&self) -> f64 {
        match self {
            Pattern::Test(t) => t.default_priority(),
            _ => 0.5,
        }
    }

    /// Alternatives of a union pattern, each of which has its own default
    /// priority.
    pub fn alternatives(&self) -> Vec<&Pattern<N>> {
        match self {
            Pattern::Union(a, b) => {
                let mut v = a.alternatives();
                v.extend(b.alternatives());
                v
            }
            p => vec![p],
        }
    }

    /// Whether this pattern could match an attribute node.
    pub(crate) fn may_match_attributes(&self) -> bool {
        match self.node_kind() {
            Some(k) => k == NodeKind::Attribute,
            None => !matches!(self, Pattern::Id(_)),
        }
    }
}
