use core::fmt;

use itertools::Itertools;

use super::{Expr, ExprKind, UNBOUNDED};
use crate::model::XmlNode;
use crate::nodeset::NodeSetValue;
use crate::set_ops::SetOperator;
use crate::value::{Value, number_to_string};

fn write_value<N: XmlNode>(f: &mut fmt::Formatter<'_>, v: &Value<N>) -> fmt::Result {
    match v {
        Value::String(s) if s.contains('"') => write!(f, "'{s}'"),
        Value::String(s) => write!(f, "\"{s}\""),
        Value::Number(n) => f.write_str(&number_to_string(*n)),
        Value::Boolean(b) => write!(f, "{b}()"),
        Value::NodeSet(NodeSetValue::Empty) => f.write_str("()"),
        Value::NodeSet(NodeSetValue::Intent(i)) => write!(f, "{}", i.expression()),
        Value::NodeSet(ns) => match ns.count() {
            Ok(n) => write!(f, "node-set({n})"),
            Err(_) => f.write_str("node-set(?)"),
        },
        Value::Object(o) => write!(f, "object({o})"),
    }
}

/// Single-line rendering used in logs and diagnostics. It reads like XPath
/// but is not guaranteed to parse back.
impl<N: XmlNode> fmt::Display for Expr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Value(v) => write_value(f, v),
            ExprKind::Root => f.write_str("/"),
            ExprKind::ContextNode => f.write_str("."),
            ExprKind::ParentNode => f.write_str(".."),
            ExprKind::CurrentNode => f.write_str("current()"),
            ExprKind::AttributeReference(name) => write!(f, "@{name}"),
            ExprKind::Path { start, step } => {
                if matches!(start.kind(), ExprKind::Root) {
                    write!(f, "/{}::{}", step.axis.name(), step.test)?;
                } else {
                    write!(f, "{start}/{}::{}", step.axis.name(), step.test)?;
                }
                step.filters.iter().try_for_each(|p| write!(f, "[{p}]"))
            }
            ExprKind::Axis { axis, test, bound } => {
                if bound.is_some() {
                    f.write_str("{bound}/")?;
                }
                write!(f, "{}::{test}", axis.name())
            }
            // A predicate after a step belongs to the step, so a filtered path
            // needs parentheses to keep its own positions.
            ExprKind::Filter { base, predicate }
                if matches!(base.kind(), ExprKind::Path { .. } | ExprKind::Axis { .. }) =>
            {
                write!(f, "({base})[{predicate}]")
            }
            ExprKind::Filter { base, predicate } => write!(f, "{base}[{predicate}]"),
            ExprKind::SetOperation { op, lhs, rhs } => match op {
                SetOperator::Union => write!(f, "({lhs} | {rhs})"),
                SetOperator::Intersect => write!(f, "set:intersection({lhs}, {rhs})"),
                SetOperator::Except => write!(f, "set:difference({lhs}, {rhs})"),
            },
            ExprKind::Distinct { base, key } => match key {
                Some(k) => write!(f, "set:distinct({base}, {k})"),
                None => write!(f, "set:distinct({base})"),
            },
            ExprKind::Boolean { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.as_str()),
            ExprKind::Relational { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            ExprKind::SingletonComparison { node, op, value }
            | ExprKind::NodeSetComparison {
                nodes: node,
                op,
                value,
            } => {
                write!(f, "({node} {op} ")?;
                write_value(f, value)?;
                f.write_str(")")
            }
            ExprKind::Arithmetic { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.as_str()),
            ExprKind::Negate(e) => write!(f, "-{e}"),
            ExprKind::FunctionCall { function, args, .. } => {
                write!(f, "{}({})", function.display_name(), args.iter().join(", "))
            }
            ExprKind::ExtensionCall { name, args } => {
                write!(f, "{name}({})", args.iter().join(", "))
            }
            ExprKind::VariableRef(b) => write!(f, "${}", b.name()),
            ExprKind::PositionRange { min, max } if *max == UNBOUNDED => {
                write!(f, "position-range({min}, *)")
            }
            ExprKind::PositionRange { min, max } => write!(f, "position-range({min}, {max})"),
            ExprKind::IsLast(true) => f.write_str("is-last()"),
            ExprKind::IsLast(false) => f.write_str("not-last()"),
            ExprKind::Avt(parts) => write!(f, "avt({})", parts.iter().join(", ")),
            ExprKind::Sorted { base, keys } => {
                write!(f, "sort({base}, {})", keys.iter().map(|k| &k.expr).join(", "))
            }
            ExprKind::Error(e) => write!(f, "error(\"{}\")", e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::expr::{ArithmeticOp, Step};
    use crate::node_test::NodeTest;
    use crate::simple_node::SimpleNode;

    type E = Expr<SimpleNode>;

    #[test]
    fn renders_on_one_line() {
        let path = E::new(ExprKind::Path {
            start: E::new(ExprKind::Root),
            step: Step::new(Axis::Descendant, NodeTest::AnyNode)
                .with_filter(E::new(ExprKind::PositionRange { min: 2, max: UNBOUNDED })),
        });
        assert_eq!(path.to_string(), "/descendant::node()[position-range(2, *)]");
        let sum = E::new(ExprKind::Arithmetic {
            op: ArithmeticOp::Plus,
            lhs: E::value(1.5),
            rhs: E::value("a\"b"),
        });
        assert_eq!(sum.to_string(), "(1.5 + 'a\"b')");
    }

    #[test]
    fn filtered_paths_keep_their_parentheses() {
        let sc = crate::context::StandaloneContext::new().shared();
        let grouped = E::parse("(i[3]/preceding-sibling::i)[1]", &sc).unwrap();
        let stepwise = E::parse("i[3]/preceding-sibling::i[1]", &sc).unwrap();
        assert!(grouped.to_string().starts_with('('), "{grouped}");
        assert_ne!(grouped.to_string(), stepwise.to_string());
    }
}
