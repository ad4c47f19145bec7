use compact_str::CompactString;

use super::{BooleanOp, Expr, ExprKind, Step};
use crate::axis::Axis;
use crate::context::Context;
use crate::enumeration::{BoxedEnumeration, NodeEnumeration, SingletonEnumeration, SliceEnumeration};
use crate::error::{EvaluationError, Result};
use crate::filter::FilterEnumerator;
use crate::functions;
use crate::model::XmlNode;
use crate::nodeset::{NodeSetExtent, NodeSetIntent, NodeSetValue, sorted_enumeration};
use crate::set_ops::{DistinctEnumeration, SetEnumeration};
use crate::sort::sort_nodes;
use crate::value::{DataType, Value};

/// Applies one step to each node of a start enumeration in turn.
///
/// The result is in document order when the start is, no start node is an
/// ancestor of another and the step stays inside each start node's subtree.
struct StepMapping<N: XmlNode> {
    start: BoxedEnumeration<N>,
    step: Step<N>,
    context: Context<N>,
    current: Option<BoxedEnumeration<N>>,
    sorted: bool,
}

impl<N: XmlNode> NodeEnumeration<N> for StepMapping<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        loop {
            if let Some(cur) = self.current.as_mut() {
                if let Some(n) = cur.next_node()? {
                    return Ok(Some(n));
                }
                self.current = None;
            }
            match self.start.next_node()? {
                Some(origin) => self.current = Some(apply_step(&self.step, &origin, &self.context)),
                None => return Ok(None),
            }
        }
    }

    fn is_sorted(&self) -> bool {
        self.sorted
    }

    fn is_peer(&self) -> bool {
        self.sorted && self.step.axis.is_peer() && self.step.axis != Axis::Namespace
    }
}

/// The nodes `step` selects from one origin, in axis order.
fn apply_step<N: XmlNode>(step: &Step<N>, origin: &N, ctx: &Context<N>) -> BoxedEnumeration<N> {
    let mut enm: BoxedEnumeration<N> = Box::new(origin.axis(step.axis, &step.test));
    for predicate in &step.filters {
        enm = Box::new(FilterEnumerator::new(enm, predicate.clone(), ctx, false));
    }
    enm
}

fn sorted_if<N: XmlNode>(enm: BoxedEnumeration<N>, sort: bool) -> Result<BoxedEnumeration<N>> {
    if sort { sorted_enumeration(enm) } else { Ok(enm) }
}

impl<N: XmlNode> Expr<N> {
    /// Evaluate to a value of whatever type the expression yields.
    pub fn evaluate(&self, ctx: &Context<N>) -> Result<Value<N>> {
        match self.kind() {
            ExprKind::Value(v) => Ok(v.clone()),
            _ if self.is_node_set_expression() => Ok(Value::NodeSet(self.evaluate_as_node_set(ctx)?)),
            ExprKind::Boolean { .. }
            | ExprKind::Relational { .. }
            | ExprKind::SingletonComparison { .. }
            | ExprKind::NodeSetComparison { .. }
            | ExprKind::PositionRange { .. }
            | ExprKind::IsLast(_) => Ok(Value::Boolean(self.evaluate_as_boolean(ctx)?)),
            ExprKind::Arithmetic { .. } | ExprKind::Negate(_) => {
                Ok(Value::Number(self.evaluate_as_number(ctx)?))
            }
            ExprKind::FunctionCall {
                function,
                args,
                bound,
            } => functions::call(*function, args, bound.as_ref(), self.static_context(), ctx),
            ExprKind::ExtensionCall { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(ctx))
                    .collect::<Result<Vec<_>>>()?;
                let f = ctx
                    .controller()
                    .functions()
                    .resolve(name, values.len())
                    .map_err(|e| EvaluationError::function(e.to_string()))?;
                f(ctx, &values)
            }
            ExprKind::VariableRef(binding) => match binding.constant_value() {
                Some(c) => Ok(c.to_value()),
                None => ctx.variable(binding),
            },
            ExprKind::Avt(_) => Ok(Value::String(self.evaluate_as_string(ctx)?)),
            ExprKind::Error(e) => Err(e.clone()),
            _ => Err(EvaluationError::internal(format!("cannot evaluate {self}"))),
        }
    }

    pub fn evaluate_as_boolean(&self, ctx: &Context<N>) -> Result<bool> {
        match self.kind() {
            ExprKind::Boolean { op, lhs, rhs } => {
                let l = lhs.evaluate_as_boolean(ctx)?;
                match op {
                    BooleanOp::And if !l => Ok(false),
                    BooleanOp::Or if l => Ok(true),
                    _ => rhs.evaluate_as_boolean(ctx),
                }
            }
            ExprKind::Relational { op, lhs, rhs } => {
                let l = lhs.evaluate(ctx)?;
                let r = rhs.evaluate(ctx)?;
                l.compare(*op, &r)
            }
            ExprKind::SingletonComparison { node, op, value } => {
                match node.evaluate_as_node_set(ctx)?.first()? {
                    Some(n) => Value::<N>::string(n.string_value()).compare(*op, value),
                    None => Ok(false),
                }
            }
            ExprKind::NodeSetComparison { nodes, op, value } => {
                Value::NodeSet(nodes.evaluate_as_node_set(ctx)?).compare(*op, value)
            }
            ExprKind::PositionRange { min, max } => {
                let p = ctx.position();
                Ok(p >= *min && p <= *max)
            }
            ExprKind::IsLast(when) => Ok((ctx.position() == ctx.last()) == *when),
            _ if self.is_node_set_expression() => Ok(self.enumerate(ctx, false)?.next_node()?.is_some()),
            _ => self.evaluate(ctx)?.as_boolean(),
        }
    }

    pub fn evaluate_as_number(&self, ctx: &Context<N>) -> Result<f64> {
        match self.kind() {
            ExprKind::Arithmetic { op, lhs, rhs } => {
                Ok(op.apply(lhs.evaluate_as_number(ctx)?, rhs.evaluate_as_number(ctx)?))
            }
            ExprKind::Negate(e) => Ok(-e.evaluate_as_number(ctx)?),
            _ => self.evaluate(ctx)?.as_number(),
        }
    }

    pub fn evaluate_as_string(&self, ctx: &Context<N>) -> Result<CompactString> {
        match self.kind() {
            ExprKind::Avt(parts) => {
                let mut out = CompactString::default();
                for p in parts {
                    out.push_str(&p.evaluate_as_string(ctx)?);
                }
                Ok(out)
            }
            _ if self.is_node_set_expression() => Ok(self
                .enumerate(ctx, true)?
                .next_node()?
                .map(|n| CompactString::from(n.string_value()))
                .unwrap_or_default()),
            _ => self.evaluate(ctx)?.as_string(),
        }
    }

    /// Evaluate to a node-set. Context-free residues of node-set expressions
    /// become lazy intents; anything else is materialized now.
    pub fn evaluate_as_node_set(&self, ctx: &Context<N>) -> Result<NodeSetValue<N>> {
        if let ExprKind::Value(v) = self.kind() {
            return match v {
                Value::NodeSet(ns) => Ok(ns.clone()),
                other => Err(not_a_node_set(other.data_type())),
            };
        }
        if !self.is_node_set_expression() {
            return match self.evaluate(ctx)? {
                Value::NodeSet(ns) => Ok(ns),
                other => Err(not_a_node_set(other.data_type())),
            };
        }
        let reduced = self.reduce(super::Dependencies::ALL, ctx)?;
        match reduced.kind() {
            ExprKind::Value(Value::NodeSet(ns)) => Ok(ns.clone()),
            ExprKind::Value(other) => Err(not_a_node_set(other.data_type())),
            _ if reduced.dependencies().is_empty() => Ok(NodeSetValue::Intent(NodeSetIntent::new(
                reduced,
                ctx.controller().clone(),
            )?)),
            _ => {
                let mut enm = reduced.enumerate(ctx, false)?;
                Ok(NodeSetExtent::from_enumeration(&mut enm)?.into())
            }
        }
    }

    /// Enumerate the selected nodes, in document order when `sort` is set.
    pub fn enumerate(&self, ctx: &Context<N>, sort: bool) -> Result<BoxedEnumeration<N>> {
        match self.kind() {
            ExprKind::Value(Value::NodeSet(ns)) => ns.enumerate_sorted(sort),
            ExprKind::Root => single(Some(ctx.context_node()?.root())),
            ExprKind::ContextNode => single(Some(ctx.context_node()?.clone())),
            ExprKind::ParentNode => single(ctx.context_node()?.parent()),
            ExprKind::CurrentNode => single(Some(ctx.current_node()?.clone())),
            ExprKind::AttributeReference(name) => {
                let node = ctx.context_node()?;
                single(
                    node.attributes()
                        .into_iter()
                        .find(|a| a.expanded_name().as_ref() == Some(name)),
                )
            }
            ExprKind::Axis { axis, test, bound } => {
                let origin = match bound {
                    Some(n) => n,
                    None => ctx.context_node()?,
                };
                sorted_if(Box::new(origin.axis(*axis, test)), sort)
            }
            ExprKind::Path { start, step } => self.enumerate_path(start, step, ctx),
            ExprKind::Filter { base, predicate } => {
                let base = base.enumerate(ctx, sort || predicate.is_positional())?;
                Ok(Box::new(FilterEnumerator::new(base, predicate.clone(), ctx, false)))
            }
            ExprKind::SetOperation { op, lhs, rhs } => Ok(Box::new(SetEnumeration::new(
                *op,
                lhs.enumerate(ctx, true)?,
                rhs.enumerate(ctx, true)?,
            )?)),
            ExprKind::Distinct { base, key } => Ok(Box::new(DistinctEnumeration::new(
                base.enumerate(ctx, true)?,
                key.clone(),
                ctx,
            )?)),
            ExprKind::Sorted { base, keys } => {
                let nodes = sort_nodes(base.enumerate(ctx, true)?, keys, ctx)?;
                if sort {
                    Ok(Box::new(NodeSetExtent::new(nodes, false).sort()?.enumerate()))
                } else {
                    Ok(Box::new(SliceEnumeration::new(std::sync::Arc::new(nodes), false, false)))
                }
            }
            _ => self.evaluate_as_node_set(ctx)?.enumerate_sorted(sort),
        }
    }

    fn enumerate_path(
        &self,
        start: &Expr<N>,
        step: &Step<N>,
        ctx: &Context<N>,
    ) -> Result<BoxedEnumeration<N>> {
        let start_enm = start.enumerate(ctx, true)?;
        let lazy = step.axis.is_forwards()
            && (start.is_singleton() || (start_enm.is_peer() && step.axis.is_subtree()));
        if lazy {
            return Ok(Box::new(StepMapping {
                start: start_enm,
                step: step.clone(),
                context: ctx.clone(),
                current: None,
                sorted: true,
            }));
        }
        let mut mapped = StepMapping {
            start: start_enm,
            step: step.clone(),
            context: ctx.clone(),
            current: None,
            sorted: false,
        };
        // Origins may overlap, so the union needs sorting to drop duplicates.
        let ext = NodeSetExtent::from_enumeration(&mut mapped)?.sort()?;
        Ok(Box::new(ext.enumerate()))
    }
}

fn single<N: XmlNode>(node: Option<N>) -> Result<BoxedEnumeration<N>> {
    Ok(Box::new(SingletonEnumeration::new(node)))
}

fn not_a_node_set(found: DataType) -> EvaluationError {
    EvaluationError::type_error(format!("Value is not a node-set (found {})", found.as_str()))
}
