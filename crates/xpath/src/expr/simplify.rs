use std::convert::Infallible;

use tracing::trace;

use super::{BooleanOp, Expr, ExprKind, Step, UNBOUNDED};
use crate::axis::Axis;
use crate::context::{Context, Controller};
use crate::functions::SystemFunction;
use crate::model::{NodeKind, XmlNode};
use crate::node_test::NodeTest;
use crate::nodeset::NodeSetValue;
use crate::set_ops::SetOperator;
use crate::value::{CompareOp, DataType, Value};

/// Positions above this are treated as unreachable.
const POSITION_LIMIT: f64 = 1e15;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_position(x: f64) -> usize {
    if x >= POSITION_LIMIT {
        UNBOUNDED
    } else {
        x.max(0.0) as usize
    }
}

fn is_call<N: XmlNode>(e: &Expr<N>, f: SystemFunction, arity: usize) -> Option<&[Expr<N>]> {
    match e.kind() {
        ExprKind::FunctionCall {
            function,
            args,
            bound: None,
        } if *function == f && args.len() == arity => Some(args),
        _ => None,
    }
}

fn is_empty_node_set<N: XmlNode>(e: &Expr<N>) -> bool {
    matches!(e.kind(), ExprKind::Value(Value::NodeSet(NodeSetValue::Empty)))
}

/// Delivers nodes in sort-key order, which a set operation must turn back
/// into document order.
fn is_key_ordered<N: XmlNode>(e: &Expr<N>) -> bool {
    match e.kind() {
        ExprKind::Sorted { .. } => true,
        ExprKind::Filter { base, .. } => is_key_ordered(base),
        _ => false,
    }
}

/// A string or number constant, the values comparisons can be specialized on.
fn scalar<N: XmlNode>(e: &Expr<N>) -> Option<&Value<N>> {
    match e.kind() {
        ExprKind::Value(v @ (Value::String(_) | Value::Number(_))) => Some(v),
        _ => None,
    }
}

fn number<N: XmlNode>(e: &Expr<N>) -> Option<f64> {
    match e.kind() {
        ExprKind::Value(Value::Number(n)) => Some(*n),
        _ => None,
    }
}

/// Boolean value of a constant that is not a number (numbers are positions
/// inside predicates).
fn constant_truth<N: XmlNode>(e: &Expr<N>) -> Option<bool> {
    match e.kind() {
        ExprKind::Value(Value::Number(_)) => None,
        ExprKind::Value(v) => v.as_boolean().ok(),
        _ => None,
    }
}

impl<N: XmlNode> Expr<N> {
    /// Rewrite the tree bottom-up into an equivalent, cheaper form. Meant to be
    /// applied once, after parsing.
    pub fn simplify(&self) -> Expr<N> {
        let mut e = match self.map_children(|c| Ok::<_, Infallible>(c.simplify())) {
            Ok(e) => e,
            Err(never) => match never {},
        };
        while let Some(next) = e.rewrite() {
            trace!(from = %e, to = %next, "simplified");
            e = next;
        }
        e
    }

    fn boolean_call(&self, arg: Expr<N>) -> Expr<N> {
        if arg.data_type() == DataType::Boolean {
            arg
        } else {
            self.call(SystemFunction::Boolean, vec![arg])
        }
    }

    fn call(&self, function: SystemFunction, args: Vec<Expr<N>>) -> Expr<N> {
        self.derive(ExprKind::FunctionCall {
            function,
            args,
            bound: None,
        })
    }

    fn constant(&self, v: impl Into<Value<N>>) -> Expr<N> {
        self.derive(ExprKind::Value(v.into()))
    }

    /// One local rewrite, or `None` when no rule applies.
    fn rewrite(&self) -> Option<Expr<N>> {
        match self.kind() {
            ExprKind::Boolean { op, lhs, rhs } => self.rewrite_boolean(*op, lhs, rhs),
            ExprKind::Relational { op, lhs, rhs } => self.rewrite_comparison(*op, lhs, rhs),
            ExprKind::Filter { base, predicate } => self.rewrite_filter(base, predicate),
            ExprKind::Path { start, step } => self.rewrite_path(start, step),
            ExprKind::SetOperation { op, lhs, rhs } => match op {
                SetOperator::Union if is_empty_node_set(lhs) && !is_key_ordered(rhs) => {
                    Some(rhs.clone())
                }
                SetOperator::Union | SetOperator::Except
                    if is_empty_node_set(rhs) && !is_key_ordered(lhs) =>
                {
                    Some(lhs.clone())
                }
                SetOperator::Union if is_empty_node_set(lhs) || is_empty_node_set(rhs) => None,
                SetOperator::Except if is_empty_node_set(rhs) => None,
                _ if is_empty_node_set(lhs) || is_empty_node_set(rhs) => {
                    Some(self.constant(Value::empty_node_set()))
                }
                _ => None,
            },
            ExprKind::VariableRef(b) => b.constant_value().map(|c| self.constant(c.to_value())),
            ExprKind::FunctionCall {
                function: SystemFunction::FunctionAvailable,
                args,
                bound: None,
            } => self.rewrite_function_available(args),
            ExprKind::Avt(parts) => match parts.as_slice() {
                [] => Some(self.constant("")),
                [only] if only.data_type() == DataType::String => Some(only.clone()),
                [only] => Some(self.call(SystemFunction::String, vec![only.clone()])),
                _ => self.fold(),
            },
            _ => self.fold(),
        }
    }

    /// Evaluate a context-free expression whose operands are all constants.
    fn fold(&self) -> Option<Expr<N>> {
        if self.is_value() || self.is_node_set_expression() || !self.dependencies().is_empty() {
            return None;
        }
        match self.kind() {
            ExprKind::Error(_) | ExprKind::VariableRef(_) | ExprKind::ExtensionCall { .. } => {
                return None;
            }
            ExprKind::FunctionCall { function, .. } if !function.is_foldable() => return None,
            _ => {}
        }
        if !self.children().iter().all(|c| c.is_value()) {
            return None;
        }
        let ctx = Context::new(Controller::detached());
        match self.evaluate(&ctx) {
            Ok(v) => Some(self.constant(v)),
            // The error surfaces if this branch is ever evaluated.
            Err(_) => None,
        }
    }

    fn rewrite_boolean(&self, op: BooleanOp, lhs: &Expr<N>, rhs: &Expr<N>) -> Option<Expr<N>> {
        if let Some(l) = constant_truth(lhs).or_else(|| number(lhs).map(crate::value::number_to_boolean)) {
            return Some(match (op, l) {
                (BooleanOp::And, false) => self.constant(false),
                (BooleanOp::Or, true) => self.constant(true),
                _ => self.boolean_call(rhs.clone()),
            });
        }
        if op == BooleanOp::And {
            if let (
                ExprKind::PositionRange { min: a, max: b },
                ExprKind::PositionRange { min: c, max: d },
            ) = (lhs.kind(), rhs.kind())
            {
                let (min, max) = ((*a).max(*c), (*b).min(*d));
                return Some(if min > max {
                    self.constant(false)
                } else {
                    self.derive(ExprKind::PositionRange { min, max })
                });
            }
        }
        self.fold()
    }

    fn rewrite_comparison(&self, op: CompareOp, lhs: &Expr<N>, rhs: &Expr<N>) -> Option<Expr<N>> {
        if let Some(value) = scalar(rhs) {
            if lhs.is_singleton() {
                return Some(self.derive(ExprKind::SingletonComparison {
                    node: lhs.clone(),
                    op,
                    value: value.clone(),
                }));
            }
            if lhs.data_type() == DataType::NodeSet {
                return Some(self.derive(ExprKind::NodeSetComparison {
                    nodes: lhs.clone(),
                    op,
                    value: value.clone(),
                }));
            }
        }
        if scalar(lhs).is_some() && (rhs.is_singleton() || rhs.data_type() == DataType::NodeSet) {
            return Some(self.derive(ExprKind::Relational {
                op: op.inverse(),
                lhs: rhs.clone(),
                rhs: lhs.clone(),
            }));
        }
        if let Some(folded) = self.fold() {
            return Some(folded);
        }
        self.compare_with_zero(op, lhs, rhs)
            .or_else(|| self.compare_position(op, lhs, rhs))
            .or_else(|| {
                // Put the number on the right and retry.
                number(lhs)?;
                let swapped = self.derive(ExprKind::Relational {
                    op: op.inverse(),
                    lhs: rhs.clone(),
                    rhs: lhs.clone(),
                });
                swapped
                    .compare_with_zero(op.inverse(), rhs, lhs)
                    .or_else(|| swapped.compare_position(op.inverse(), rhs, lhs))
            })
            .or_else(|| {
                // `last() op position()`
                is_call(lhs, SystemFunction::Last, 0)?;
                is_call(rhs, SystemFunction::Position, 0)?;
                self.compare_position(op.inverse(), rhs, lhs)
            })
    }

    /// `count(X) op 0` and `string-length(X) op 0` as existence tests.
    fn compare_with_zero(&self, op: CompareOp, lhs: &Expr<N>, rhs: &Expr<N>) -> Option<Expr<N>> {
        if number(rhs)? != 0.0 {
            return None;
        }
        let operand = if let Some(args) = is_call(lhs, SystemFunction::Count, 1) {
            args[0].clone()
        } else if let Some(args) = is_call(lhs, SystemFunction::StringLength, 1) {
            if args[0].data_type() == DataType::String {
                args[0].clone()
            } else {
                self.call(SystemFunction::String, vec![args[0].clone()])
            }
        } else if is_call(lhs, SystemFunction::StringLength, 0).is_some() {
            self.call(SystemFunction::String, Vec::new())
        } else {
            return None;
        };
        Some(match op {
            CompareOp::Eq | CompareOp::Le => self.call(SystemFunction::Not, vec![operand]),
            CompareOp::Ne | CompareOp::Gt => self.boolean_call(operand),
            CompareOp::Ge => self.constant(true),
            CompareOp::Lt => self.constant(false),
        })
    }

    /// `position() op N` as a position range, `position() op last()` as a
    /// last-position test.
    fn compare_position(&self, op: CompareOp, lhs: &Expr<N>, rhs: &Expr<N>) -> Option<Expr<N>> {
        is_call(lhs, SystemFunction::Position, 0)?;
        if is_call(rhs, SystemFunction::Last, 0).is_some() {
            return Some(match op {
                CompareOp::Eq | CompareOp::Ge => self.derive(ExprKind::IsLast(true)),
                CompareOp::Ne | CompareOp::Lt => self.derive(ExprKind::IsLast(false)),
                CompareOp::Le => self.constant(true),
                CompareOp::Gt => self.constant(false),
            });
        }
        let n = number(rhs)?;
        if n.is_nan() {
            return Some(self.constant(op == CompareOp::Ne));
        }
        let (min, max) = match op {
            CompareOp::Eq if n.fract() == 0.0 && n >= 1.0 => (to_position(n), to_position(n)),
            CompareOp::Eq => return Some(self.constant(false)),
            CompareOp::Ne => return None,
            CompareOp::Lt => (1, to_position(n.ceil() - 1.0)),
            CompareOp::Le => (1, to_position(n.floor())),
            CompareOp::Gt | CompareOp::Ge if n == f64::INFINITY => return Some(self.constant(false)),
            CompareOp::Gt => (to_position(n.floor() + 1.0).max(1), UNBOUNDED),
            CompareOp::Ge => (to_position(n.ceil()).max(1), UNBOUNDED),
        };
        Some(if min > max || max == 0 {
            self.constant(false)
        } else {
            self.derive(ExprKind::PositionRange { min, max })
        })
    }

    fn rewrite_filter(&self, base: &Expr<N>, predicate: &Expr<N>) -> Option<Expr<N>> {
        if is_empty_node_set(base) {
            return Some(base.clone());
        }
        if let Some(keep) = constant_truth(predicate) {
            return Some(if keep {
                base.clone()
            } else {
                self.constant(Value::empty_node_set())
            });
        }
        if is_call(predicate, SystemFunction::Last, 0).is_some() {
            return Some(self.derive(ExprKind::Filter {
                base: base.clone(),
                predicate: self.derive(ExprKind::IsLast(true)),
            }));
        }
        // X[position() >= a][position() >= b] selects from the a+b-1'th node.
        if let (
            ExprKind::PositionRange {
                min: outer,
                max: UNBOUNDED,
            },
            ExprKind::Filter {
                base: inner_base,
                predicate: inner,
            },
        ) = (predicate.kind(), base.kind())
        {
            if let ExprKind::PositionRange {
                min: first,
                max: UNBOUNDED,
            } = inner.kind()
            {
                return Some(self.derive(ExprKind::Filter {
                    base: inner_base.clone(),
                    predicate: self.derive(ExprKind::PositionRange {
                        min: first.saturating_add(*outer).saturating_sub(1),
                        max: UNBOUNDED,
                    }),
                }));
            }
        }
        None
    }

    fn rewrite_path(&self, start: &Expr<N>, step: &Step<N>) -> Option<Expr<N>> {
        if is_empty_node_set(start) {
            return Some(start.clone());
        }
        if let Some(step) = simplify_step_filters(self, step) {
            return Some(match step {
                Some(step) => self.derive(ExprKind::Path {
                    start: start.clone(),
                    step,
                }),
                None => self.constant(Value::empty_node_set()),
            });
        }
        let plain = step.filters.is_empty();
        if plain && step.axis == Axis::SelfAxis && step.test == NodeTest::AnyNode {
            return Some(start.clone());
        }
        if matches!(start.kind(), ExprKind::ContextNode) && plain {
            if let (Axis::Attribute, NodeTest::Name { kind: NodeKind::Attribute, name }) =
                (step.axis, &step.test)
            {
                return Some(self.derive(ExprKind::AttributeReference(name.clone())));
            }
            return Some(self.derive(ExprKind::Axis {
                axis: step.axis,
                test: step.test.clone(),
                bound: None,
            }));
        }
        // S//x is S/descendant::x unless a predicate counts positions.
        if step.axis == Axis::Child && !step.has_positional_filter() {
            let descendant = Step {
                axis: Axis::Descendant,
                test: step.test.clone(),
                filters: step.filters.clone(),
            };
            let origin = match start.kind() {
                ExprKind::Path { start: s, step: inner } if is_descendant_or_self_node(inner) => {
                    Some(s.clone())
                }
                ExprKind::Axis {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::AnyNode,
                    bound: None,
                } => Some(self.derive(ExprKind::ContextNode)),
                _ => None,
            };
            if let Some(origin) = origin {
                return Some(self.derive(ExprKind::Path {
                    start: origin,
                    step: descendant,
                }));
            }
        }
        None
    }

    fn rewrite_function_available(&self, args: &[Expr<N>]) -> Option<Expr<N>> {
        let [arg] = args else {
            return None;
        };
        let ExprKind::Value(Value::String(qname)) = arg.kind() else {
            return None;
        };
        let sc = self.static_context()?;
        let name = crate::functions::strings::resolve_qname(qname, Some(sc)).ok()?;
        if name.ns_uri().is_some_and(|uri| sc.is_extension_namespace(uri)) {
            return None;
        }
        // Host functions may still provide names the static context does
        // not know, so only a positive answer is final.
        sc.is_function_available(&name).then(|| self.constant(true))
    }
}

fn is_descendant_or_self_node<N: XmlNode>(step: &Step<N>) -> bool {
    step.axis == Axis::DescendantOrSelf && step.test == NodeTest::AnyNode && step.filters.is_empty()
}

/// Drop constant-true predicates and recognize `[last()]`. `Some(None)` means
/// a predicate is constant false; `None` means nothing changed.
fn simplify_step_filters<N: XmlNode>(owner: &Expr<N>, step: &Step<N>) -> Option<Option<Step<N>>> {
    let mut changed = false;
    let mut filters = smallvec::SmallVec::new();
    for f in &step.filters {
        match constant_truth(f) {
            Some(true) => changed = true,
            Some(false) => return Some(None),
            None if is_call(f, SystemFunction::Last, 0).is_some() => {
                changed = true;
                filters.push(owner.derive(ExprKind::IsLast(true)));
            }
            None => filters.push(f.clone()),
        }
    }
    changed.then(|| {
        Some(Step {
            axis: step.axis,
            test: step.test.clone(),
            filters,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_node::SimpleNode;

    type E = Expr<SimpleNode>;

    fn call(function: SystemFunction, args: Vec<E>) -> E {
        E::new(ExprKind::FunctionCall {
            function,
            args,
            bound: None,
        })
    }

    fn compare(op: CompareOp, lhs: E, rhs: E) -> E {
        E::new(ExprKind::Relational { op, lhs, rhs }).simplify()
    }

    fn child(name: &str) -> E {
        E::new(ExprKind::Axis {
            axis: Axis::Child,
            test: NodeTest::Name {
                kind: NodeKind::Element,
                name: crate::names::ExpandedName::local(name),
            },
            bound: None,
        })
    }

    #[test]
    fn constants_fold() {
        let e = E::new(ExprKind::Arithmetic {
            op: super::super::ArithmeticOp::Plus,
            lhs: E::value(1.0),
            rhs: E::value(2.0),
        })
        .simplify();
        assert!(matches!(e.as_value(), Some(Value::Number(n)) if *n == 3.0));
    }

    #[test]
    fn positions_become_ranges() {
        let pos = || call(SystemFunction::Position, vec![]);
        let e = compare(CompareOp::Lt, pos(), E::value(3.0));
        assert!(matches!(e.kind(), ExprKind::PositionRange { min: 1, max: 2 }));
        let e = compare(CompareOp::Gt, E::value(3.0), pos());
        assert!(matches!(e.kind(), ExprKind::PositionRange { min: 1, max: 2 }));
        let e = compare(CompareOp::Eq, pos(), E::value(1.5));
        assert!(matches!(e.as_value(), Some(Value::Boolean(false))));
        let e = compare(CompareOp::Ge, pos(), E::value(2.0));
        assert!(matches!(e.kind(), ExprKind::PositionRange { min: 2, max: UNBOUNDED }));
        let e = compare(CompareOp::Eq, pos(), call(SystemFunction::Last, vec![]));
        assert!(matches!(e.kind(), ExprKind::IsLast(true)));
        let e = compare(CompareOp::Ne, call(SystemFunction::Last, vec![]), pos());
        assert!(matches!(e.kind(), ExprKind::IsLast(false)));
    }

    #[test]
    fn counting_against_zero_tests_existence() {
        let count = call(SystemFunction::Count, vec![child("a")]);
        let e = compare(CompareOp::Gt, count.clone(), E::value(0.0));
        assert!(matches!(
            e.kind(),
            ExprKind::FunctionCall { function: SystemFunction::Boolean, .. }
        ));
        let e = compare(CompareOp::Eq, count.clone(), E::value(0.0));
        assert!(matches!(
            e.kind(),
            ExprKind::FunctionCall { function: SystemFunction::Not, .. }
        ));
        let e = compare(CompareOp::Ge, count, E::value(0.0));
        assert!(matches!(e.as_value(), Some(Value::Boolean(true))));
    }

    #[test]
    fn node_comparisons_specialize() {
        let e = compare(CompareOp::Eq, child("a"), E::value("x"));
        assert!(matches!(e.kind(), ExprKind::NodeSetComparison { .. }));
        let e = compare(CompareOp::Lt, E::value(1.0), E::new(ExprKind::ContextNode));
        assert!(matches!(
            e.kind(),
            ExprKind::SingletonComparison { op: CompareOp::Gt, .. }
        ));
    }

    #[test]
    fn anded_ranges_intersect() {
        let e = E::new(ExprKind::Boolean {
            op: BooleanOp::And,
            lhs: E::new(ExprKind::PositionRange { min: 2, max: 10 }),
            rhs: E::new(ExprKind::PositionRange { min: 5, max: UNBOUNDED }),
        })
        .simplify();
        assert!(matches!(e.kind(), ExprKind::PositionRange { min: 5, max: 10 }));
        let e = E::new(ExprKind::Boolean {
            op: BooleanOp::And,
            lhs: E::new(ExprKind::PositionRange { min: 1, max: 1 }),
            rhs: E::new(ExprKind::PositionRange { min: 3, max: 4 }),
        })
        .simplify();
        assert!(matches!(e.as_value(), Some(Value::Boolean(false))));
    }

    #[test]
    fn descendant_shortcut() {
        let dos = E::new(ExprKind::Path {
            start: E::new(ExprKind::Root),
            step: Step::new(Axis::DescendantOrSelf, NodeTest::AnyNode),
        });
        let e = E::new(ExprKind::Path {
            start: dos,
            step: Step::new(
                Axis::Child,
                NodeTest::Name {
                    kind: NodeKind::Element,
                    name: crate::names::ExpandedName::local("x"),
                },
            ),
        })
        .simplify();
        let ExprKind::Path { start, step } = e.kind() else {
            panic!("expected a path, got {e}");
        };
        assert!(matches!(start.kind(), ExprKind::Root));
        assert_eq!(step.axis, Axis::Descendant);
    }

    #[test]
    fn positional_predicates_block_the_shortcut() {
        let dos = E::new(ExprKind::Axis {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            bound: None,
        });
        let e = E::new(ExprKind::Path {
            start: dos,
            step: Step::new(Axis::Child, NodeTest::AnyChildNode).with_filter(E::value(1.0)),
        })
        .simplify();
        let ExprKind::Path { step, .. } = e.kind() else {
            panic!("expected a path, got {e}");
        };
        assert_eq!(step.axis, Axis::Child);
    }

    #[test]
    fn single_part_templates_unwrap() {
        let e = E::new(ExprKind::Avt(vec![E::value("a")])).simplify();
        assert_eq!(e.as_value().unwrap().as_string().unwrap(), "a");
        let e = E::new(ExprKind::Avt(vec![])).simplify();
        assert_eq!(e.as_value().unwrap().as_string().unwrap(), "");
    }
}
