//! The expression tree.
//!
//! An [`Expr`] is a cheap, shareable handle on an immutable node. Each node
//! carries its [`ExprKind`], the static context it was compiled in (system
//! functions such as `system-property()` resolve names against it) and its
//! memoized [`Dependencies`].
//!
//! Lifecycle: the parser builds the tree, [`Expr::simplify`] rewrites it once
//! bottom-up, and from then on the tree is only read. [`Expr::reduce`] builds
//! new nodes instead of changing existing ones.

mod display;
mod evaluate;
mod reduce;
mod simplify;

use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::axis::Axis;
use crate::context::{Binding, SharedStaticContext};
use crate::error::EvaluationError;
use crate::functions::SystemFunction;
use crate::model::XmlNode;
use crate::names::ExpandedName;
use crate::node_test::NodeTest;
use crate::set_ops::SetOperator;
use crate::sort::SortKey;
use crate::value::{CompareOp, DataType, Value};

bitflags! {
    /// Parts of the dynamic context an expression reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Dependencies: u32 {
        const VARIABLES = 1;
        const CURRENT_NODE = 4;
        const CONTEXT_NODE = 8;
        const POSITION = 16;
        const LAST = 32;
        const CONTROLLER = 64;
        const CONTEXT_DOCUMENT = 128;
        /// What stays fixed while a predicate is applied to each node.
        const XSLT_CONTEXT = Self::CONTROLLER.bits() | Self::VARIABLES.bits() | Self::CURRENT_NODE.bits();
        const ALL = Self::VARIABLES.bits()
            | Self::CURRENT_NODE.bits()
            | Self::CONTEXT_NODE.bits()
            | Self::POSITION.bits()
            | Self::LAST.bits()
            | Self::CONTROLLER.bits()
            | Self::CONTEXT_DOCUMENT.bits();
    }
}

/// Upper bound of an open position range.
pub const UNBOUNDED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOp {
    And,
    Or,
}

impl BooleanOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BooleanOp::And => "and",
            BooleanOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Plus,
    Minus,
    Multiply,
    Div,
    Mod,
}

impl ArithmeticOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ArithmeticOp::Plus => "+",
            ArithmeticOp::Minus => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Div => "div",
            ArithmeticOp::Mod => "mod",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithmeticOp::Plus => a + b,
            ArithmeticOp::Minus => a - b,
            ArithmeticOp::Multiply => a * b,
            ArithmeticOp::Div => a / b,
            // Truncating remainder with the sign of the dividend.
            ArithmeticOp::Mod => a % b,
        }
    }
}

/// One location step: an axis, a node test and the predicates applied to
/// the nodes it selects.
#[derive(Debug, Clone)]
pub struct Step<N: XmlNode> {
    pub axis: Axis,
    pub test: NodeTest,
    pub filters: SmallVec<[Expr<N>; 2]>,
}

impl<N: XmlNode> Step<N> {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            filters: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, predicate: Expr<N>) -> Self {
        self.filters.push(predicate);
        self
    }

    fn dependencies(&self) -> Dependencies {
        self.filters
            .iter()
            .fold(Dependencies::empty(), |d, f| d | f.dependencies())
            & Dependencies::XSLT_CONTEXT
    }

    /// Whether any predicate depends on the position of a node in the step.
    pub fn has_positional_filter(&self) -> bool {
        self.filters.iter().any(Expr::is_positional)
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind<N: XmlNode> {
    Value(Value<N>),
    /// The document node of the context node.
    Root,
    ContextNode,
    ParentNode,
    /// XSLT `current()`.
    CurrentNode,
    /// `@name` from the context node.
    AttributeReference(ExpandedName),
    Path {
        start: Expr<N>,
        step: Step<N>,
    },
    /// A step without predicates; `bound` fixes its origin once reduced.
    Axis {
        axis: Axis,
        test: NodeTest,
        bound: Option<N>,
    },
    Filter {
        base: Expr<N>,
        predicate: Expr<N>,
    },
    SetOperation {
        op: SetOperator,
        lhs: Expr<N>,
        rhs: Expr<N>,
    },
    Distinct {
        base: Expr<N>,
        key: Option<Expr<N>>,
    },
    Boolean {
        op: BooleanOp,
        lhs: Expr<N>,
        rhs: Expr<N>,
    },
    Relational {
        op: CompareOp,
        lhs: Expr<N>,
        rhs: Expr<N>,
    },
    /// Comparison of an expression yielding at most one node with a string
    /// or number.
    SingletonComparison {
        node: Expr<N>,
        op: CompareOp,
        value: Value<N>,
    },
    /// Existential comparison of a node-set with a string or number.
    NodeSetComparison {
        nodes: Expr<N>,
        op: CompareOp,
        value: Value<N>,
    },
    Arithmetic {
        op: ArithmeticOp,
        lhs: Expr<N>,
        rhs: Expr<N>,
    },
    Negate(Expr<N>),
    FunctionCall {
        function: SystemFunction,
        args: Vec<Expr<N>>,
        /// Node standing in for the context node once reduced.
        bound: Option<N>,
    },
    /// Host function, bound by name and arity when called.
    ExtensionCall {
        name: ExpandedName,
        args: Vec<Expr<N>>,
    },
    VariableRef(Binding),
    /// True when the context position lies in `min..=max`.
    PositionRange {
        min: usize,
        max: usize,
    },
    /// `position() = last()` (or its negation when false).
    IsLast(bool),
    /// String concatenation of the parts of an attribute value template.
    Avt(Vec<Expr<N>>),
    Sorted {
        base: Expr<N>,
        keys: Vec<SortKey<N>>,
    },
    /// A failure deferred until evaluation.
    Error(EvaluationError),
}

#[derive(Debug)]
struct ExprNode<N: XmlNode> {
    kind: ExprKind<N>,
    static_context: Option<SharedStaticContext>,
    dependencies: OnceLock<Dependencies>,
}

#[derive(Debug, Clone)]
pub struct Expr<N: XmlNode>(Arc<ExprNode<N>>);

impl<N: XmlNode> From<Value<N>> for Expr<N> {
    fn from(v: Value<N>) -> Self {
        Expr::value(v)
    }
}

impl<N: XmlNode> Expr<N> {
    pub fn new(kind: ExprKind<N>) -> Self {
        Self::with_static_context(kind, None)
    }

    pub fn with_static_context(kind: ExprKind<N>, static_context: Option<SharedStaticContext>) -> Self {
        Expr(Arc::new(ExprNode {
            kind,
            static_context,
            dependencies: OnceLock::new(),
        }))
    }

    pub fn value(v: impl Into<Value<N>>) -> Self {
        Self::new(ExprKind::Value(v.into()))
    }

    /// New node compiled in the same static context as this one.
    pub(crate) fn derive(&self, kind: ExprKind<N>) -> Self {
        Self::with_static_context(kind, self.0.static_context.clone())
    }

    pub fn kind(&self) -> &ExprKind<N> {
        &self.0.kind
    }

    pub fn static_context(&self) -> Option<&SharedStaticContext> {
        self.0.static_context.as_ref()
    }

    pub fn ptr_eq(&self, other: &Expr<N>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_value(&self) -> Option<&Value<N>> {
        match self.kind() {
            ExprKind::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind(), ExprKind::Value(_))
    }

    /// What the expression reads from its dynamic context.
    pub fn dependencies(&self) -> Dependencies {
        *self.0.dependencies.get_or_init(|| self.compute_dependencies())
    }

    fn compute_dependencies(&self) -> Dependencies {
        use Dependencies as D;
        let union = |exprs: &[Expr<N>]| {
            exprs
                .iter()
                .fold(D::empty(), |d, e| d | e.dependencies())
        };
        match self.kind() {
            ExprKind::Value(_) | ExprKind::Error(_) => D::empty(),
            ExprKind::Root => D::CONTEXT_DOCUMENT,
            ExprKind::ContextNode | ExprKind::ParentNode | ExprKind::AttributeReference(_) => {
                D::CONTEXT_NODE
            }
            ExprKind::CurrentNode => D::CURRENT_NODE,
            ExprKind::Path { start, step } => start.dependencies() | step.dependencies(),
            ExprKind::Axis { bound, .. } => {
                if bound.is_some() {
                    D::empty()
                } else {
                    D::CONTEXT_NODE
                }
            }
            ExprKind::Filter { base, predicate } => {
                base.dependencies() | (predicate.dependencies() & D::XSLT_CONTEXT)
            }
            ExprKind::SetOperation { lhs, rhs, .. }
            | ExprKind::Boolean { lhs, rhs, .. }
            | ExprKind::Relational { lhs, rhs, .. }
            | ExprKind::Arithmetic { lhs, rhs, .. } => lhs.dependencies() | rhs.dependencies(),
            ExprKind::Distinct { base, key } => {
                base.dependencies()
                    | key
                        .as_ref()
                        .map_or(D::empty(), |k| k.dependencies() & D::XSLT_CONTEXT)
            }
            ExprKind::SingletonComparison { node, .. } => node.dependencies(),
            ExprKind::NodeSetComparison { nodes, .. } => nodes.dependencies(),
            ExprKind::Negate(e) => e.dependencies(),
            ExprKind::FunctionCall {
                function,
                args,
                bound,
            } => {
                let mut intrinsic = function.intrinsic_dependencies(args.len());
                if bound.is_some() {
                    intrinsic -= D::CONTEXT_NODE | D::CONTEXT_DOCUMENT;
                }
                intrinsic | union(args)
            }
            ExprKind::ExtensionCall { args, .. } => {
                D::CONTROLLER
                    | D::CONTEXT_NODE
                    | D::POSITION
                    | D::LAST
                    | D::CONTEXT_DOCUMENT
                    | union(args)
            }
            ExprKind::VariableRef(b) => {
                if b.constant_value().is_some() {
                    D::empty()
                } else {
                    D::VARIABLES
                }
            }
            ExprKind::PositionRange { .. } => D::POSITION,
            ExprKind::IsLast(_) => D::POSITION | D::LAST,
            ExprKind::Avt(parts) => union(parts),
            ExprKind::Sorted { base, keys } => {
                let keys = keys
                    .iter()
                    .fold(D::empty(), |d, k| d | k.expr.dependencies());
                // Each key sees its record as context and current node.
                base.dependencies() | (keys & (D::VARIABLES | D::CONTROLLER))
            }
        }
    }

    /// Static result type.
    pub fn data_type(&self) -> DataType {
        match self.kind() {
            ExprKind::Value(v) => v.data_type(),
            ExprKind::Root
            | ExprKind::ContextNode
            | ExprKind::ParentNode
            | ExprKind::CurrentNode
            | ExprKind::AttributeReference(_)
            | ExprKind::Path { .. }
            | ExprKind::Axis { .. }
            | ExprKind::Filter { .. }
            | ExprKind::SetOperation { .. }
            | ExprKind::Distinct { .. }
            | ExprKind::Sorted { .. } => DataType::NodeSet,
            ExprKind::Boolean { .. }
            | ExprKind::Relational { .. }
            | ExprKind::SingletonComparison { .. }
            | ExprKind::NodeSetComparison { .. }
            | ExprKind::PositionRange { .. }
            | ExprKind::IsLast(_) => DataType::Boolean,
            ExprKind::Arithmetic { .. } | ExprKind::Negate(_) => DataType::Number,
            ExprKind::FunctionCall { function, .. } => function.result_type(),
            ExprKind::VariableRef(b) => match b.constant_value() {
                Some(c) => c.to_value::<N>().data_type(),
                None => DataType::Any,
            },
            ExprKind::Avt(_) => DataType::String,
            ExprKind::ExtensionCall { .. } | ExprKind::Error(_) => DataType::Any,
        }
    }

    /// Node-set expressions whose result is produced by enumeration rather
    /// than by evaluating to a value.
    pub(crate) fn is_node_set_expression(&self) -> bool {
        matches!(
            self.kind(),
            ExprKind::Root
                | ExprKind::ContextNode
                | ExprKind::ParentNode
                | ExprKind::CurrentNode
                | ExprKind::AttributeReference(_)
                | ExprKind::Path { .. }
                | ExprKind::Axis { .. }
                | ExprKind::Filter { .. }
                | ExprKind::SetOperation { .. }
                | ExprKind::Distinct { .. }
                | ExprKind::Sorted { .. }
        )
    }

    /// Known to select at most one node.
    pub fn is_singleton(&self) -> bool {
        matches!(
            self.kind(),
            ExprKind::Root
                | ExprKind::ContextNode
                | ExprKind::ParentNode
                | ExprKind::CurrentNode
                | ExprKind::AttributeReference(_)
        )
    }

    /// Whether the value of this predicate depends on the position of the
    /// node it is applied to.
    pub fn is_positional(&self) -> bool {
        matches!(self.data_type(), DataType::Number | DataType::Any)
            || self
                .dependencies()
                .intersects(Dependencies::POSITION | Dependencies::LAST)
    }

    /// Direct subexpressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr<N>> {
        match self.kind() {
            ExprKind::Value(_)
            | ExprKind::Root
            | ExprKind::ContextNode
            | ExprKind::ParentNode
            | ExprKind::CurrentNode
            | ExprKind::AttributeReference(_)
            | ExprKind::Axis { .. }
            | ExprKind::VariableRef(_)
            | ExprKind::PositionRange { .. }
            | ExprKind::IsLast(_)
            | ExprKind::Error(_) => Vec::new(),
            ExprKind::Path { start, step } => {
                let mut v = vec![start];
                v.extend(step.filters.iter());
                v
            }
            ExprKind::Filter { base, predicate } => vec![base, predicate],
            ExprKind::SetOperation { lhs, rhs, .. }
            | ExprKind::Boolean { lhs, rhs, .. }
            | ExprKind::Relational { lhs, rhs, .. }
            | ExprKind::Arithmetic { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Distinct { base, key } => {
                let mut v = vec![base];
                v.extend(key.iter());
                v
            }
            ExprKind::SingletonComparison { node, .. } => vec![node],
            ExprKind::NodeSetComparison { nodes, .. } => vec![nodes],
            ExprKind::Negate(e) => vec![e],
            ExprKind::FunctionCall { args, .. } | ExprKind::ExtensionCall { args, .. } => {
                args.iter().collect()
            }
            ExprKind::Avt(parts) => parts.iter().collect(),
            ExprKind::Sorted { base, keys } => {
                let mut v = vec![base];
                v.extend(keys.iter().map(|k| &k.expr));
                v
            }
        }
    }

    /// Rebuild this node with every direct subexpression replaced by
    /// `f(child)`. Returns `self` unchanged when `f` changes nothing.
    pub(crate) fn map_children<E>(
        &self,
        mut f: impl FnMut(&Expr<N>) -> Result<Expr<N>, E>,
    ) -> Result<Expr<N>, E> {
        let mut changed = false;
        let mut apply = |e: &Expr<N>| -> Result<Expr<N>, E> {
            let n = f(e)?;
            changed |= !n.ptr_eq(e);
            Ok(n)
        };
        let kind = match self.kind() {
            ExprKind::Path { start, step } => ExprKind::Path {
                start: apply(start)?,
                step: Step {
                    axis: step.axis,
                    test: step.test.clone(),
                    filters: step
                        .filters
                        .iter()
                        .map(&mut apply)
                        .collect::<Result<_, E>>()?,
                },
            },
            ExprKind::Filter { base, predicate } => ExprKind::Filter {
                base: apply(base)?,
                predicate: apply(predicate)?,
            },
            ExprKind::SetOperation { op, lhs, rhs } => ExprKind::SetOperation {
                op: *op,
                lhs: apply(lhs)?,
                rhs: apply(rhs)?,
            },
            ExprKind::Distinct { base, key } => ExprKind::Distinct {
                base: apply(base)?,
                key: key.as_ref().map(&mut apply).transpose()?,
            },
            ExprKind::Boolean { op, lhs, rhs } => ExprKind::Boolean {
                op: *op,
                lhs: apply(lhs)?,
                rhs: apply(rhs)?,
            },
            ExprKind::Relational { op, lhs, rhs } => ExprKind::Relational {
                op: *op,
                lhs: apply(lhs)?,
                rhs: apply(rhs)?,
            },
            ExprKind::Arithmetic { op, lhs, rhs } => ExprKind::Arithmetic {
                op: *op,
                lhs: apply(lhs)?,
                rhs: apply(rhs)?,
            },
            ExprKind::SingletonComparison { node, op, value } => ExprKind::SingletonComparison {
                node: apply(node)?,
                op: *op,
                value: value.clone(),
            },
            ExprKind::NodeSetComparison { nodes, op, value } => ExprKind::NodeSetComparison {
                nodes: apply(nodes)?,
                op: *op,
                value: value.clone(),
            },
            ExprKind::Negate(e) => ExprKind::Negate(apply(e)?),
            ExprKind::FunctionCall {
                function,
                args,
                bound,
            } => ExprKind::FunctionCall {
                function: *function,
                args: args.iter().map(&mut apply).collect::<Result<_, E>>()?,
                bound: bound.clone(),
            },
            ExprKind::ExtensionCall { name, args } => ExprKind::ExtensionCall {
                name: name.clone(),
                args: args.iter().map(&mut apply).collect::<Result<_, E>>()?,
            },
            ExprKind::Avt(parts) => {
                ExprKind::Avt(parts.iter().map(&mut apply).collect::<Result<_, E>>()?)
            }
            ExprKind::Sorted { base, keys } => ExprKind::Sorted {
                base: apply(base)?,
                keys: keys
                    .iter()
                    .map(|k| -> Result<SortKey<N>, E> {
                        Ok(SortKey {
                            expr: apply(&k.expr)?,
                            ..k.clone()
                        })
                    })
                    .collect::<Result<_, E>>()?,
            },
            _ => return Ok(self.clone()),
        };
        Ok(if changed { self.derive(kind) } else { self.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_node::SimpleNode;

    type E = Expr<SimpleNode>;

    #[test]
    fn predicates_only_expose_the_fixed_context() {
        let pred = E::new(ExprKind::PositionRange { min: 1, max: 1 });
        let f = E::new(ExprKind::Filter {
            base: E::new(ExprKind::Axis {
                axis: Axis::Child,
                test: NodeTest::AnyNode,
                bound: None,
            }),
            predicate: pred,
        });
        assert_eq!(f.dependencies(), Dependencies::CONTEXT_NODE);
    }

    #[test]
    fn bound_context_is_not_a_dependency() {
        let call = E::new(ExprKind::FunctionCall {
            function: SystemFunction::Id,
            args: vec![E::value("x")],
            bound: None,
        });
        assert_eq!(call.dependencies(), Dependencies::CONTEXT_DOCUMENT);
        let root = crate::simple_node::doc().build();
        let bound = E::new(ExprKind::FunctionCall {
            function: SystemFunction::Id,
            args: vec![E::value("x")],
            bound: Some(root),
        });
        assert!(bound.dependencies().is_empty());
    }

    #[test]
    fn unchanged_children_keep_identity() {
        let e = E::new(ExprKind::Negate(E::value(1.0)));
        let same = e.map_children(|c| Ok::<_, ()>(c.clone())).unwrap();
        assert!(same.ptr_eq(&e));
    }
}
