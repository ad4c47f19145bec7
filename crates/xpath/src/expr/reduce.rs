use tracing::trace;

use super::{Dependencies, Expr, ExprKind, Step};
use crate::context::Context;
use crate::enumeration::NodeEnumeration;
use crate::error::Result;
use crate::model::XmlNode;
use crate::nodeset::NodeSetValue;
use crate::sort::SortKey;
use crate::value::Value;

impl<N: XmlNode> Expr<N> {
    /// Partially evaluate: replace every part that depends only on the
    /// dependencies in `mask` by its value in `ctx`. Predicates are reduced
    /// with the part of the mask that stays fixed across the nodes they are
    /// applied to. The result is equivalent to `self` in `ctx`.
    pub fn reduce(&self, mask: Dependencies, ctx: &Context<N>) -> Result<Expr<N>> {
        if !self.dependencies().intersects(mask) {
            return Ok(self.clone());
        }
        let predicate_mask = mask & Dependencies::XSLT_CONTEXT;
        let rebuilt = match self.kind() {
            ExprKind::Root
            | ExprKind::ContextNode
            | ExprKind::ParentNode
            | ExprKind::CurrentNode
            | ExprKind::AttributeReference(_) => {
                let node = self.enumerate(ctx, false)?.next_node()?;
                return Ok(self.derive(ExprKind::Value(Value::NodeSet(NodeSetValue::singleton(node)))));
            }
            ExprKind::Axis { axis, test, .. } => {
                return Ok(self.derive(ExprKind::Axis {
                    axis: *axis,
                    test: test.clone(),
                    bound: Some(ctx.context_node()?.clone()),
                }));
            }
            ExprKind::Path { start, step } => {
                let start = start.reduce(mask, ctx)?;
                if is_empty_node_set(&start) {
                    return Ok(self.derive(ExprKind::Value(Value::empty_node_set())));
                }
                let filters = step
                    .filters
                    .iter()
                    .map(|f| f.reduce(predicate_mask, ctx))
                    .collect::<Result<_>>()?;
                self.derive(ExprKind::Path {
                    start,
                    step: Step {
                        axis: step.axis,
                        test: step.test.clone(),
                        filters,
                    },
                })
            }
            ExprKind::Filter { base, predicate } => {
                let base = base.reduce(mask, ctx)?;
                if is_empty_node_set(&base) {
                    return Ok(base);
                }
                self.derive(ExprKind::Filter {
                    base,
                    predicate: predicate.reduce(predicate_mask, ctx)?,
                })
            }
            ExprKind::Distinct { base, key } => self.derive(ExprKind::Distinct {
                base: base.reduce(mask, ctx)?,
                key: key.as_ref().map(|k| k.reduce(predicate_mask, ctx)).transpose()?,
            }),
            ExprKind::Sorted { base, keys } => {
                let key_mask = mask & (Dependencies::VARIABLES | Dependencies::CONTROLLER);
                self.derive(ExprKind::Sorted {
                    base: base.reduce(mask, ctx)?,
                    keys: keys
                        .iter()
                        .map(|k| -> Result<SortKey<N>> {
                            Ok(SortKey {
                                expr: k.expr.reduce(key_mask, ctx)?,
                                ..k.clone()
                            })
                        })
                        .collect::<Result<_>>()?,
                })
            }
            ExprKind::FunctionCall {
                function,
                args,
                bound,
            } => {
                let args = args
                    .iter()
                    .map(|a| a.reduce(mask, ctx))
                    .collect::<Result<Vec<_>>>()?;
                let focus = Dependencies::CONTEXT_NODE | Dependencies::CONTEXT_DOCUMENT;
                let intrinsic = function.intrinsic_dependencies(args.len());
                let bound = match bound {
                    None if intrinsic.intersects(mask & focus) && focus.contains(intrinsic) => {
                        Some(ctx.context_node()?.clone())
                    }
                    other => other.clone(),
                };
                self.derive(ExprKind::FunctionCall {
                    function: *function,
                    args,
                    bound,
                })
            }
            _ => self.map_children(|c| c.reduce(mask, ctx))?,
        };
        if rebuilt.is_node_set_expression() || !mask.contains(rebuilt.dependencies()) {
            return Ok(rebuilt);
        }
        match rebuilt.evaluate(ctx) {
            Ok(v) => Ok(rebuilt.derive(ExprKind::Value(v))),
            Err(e) => {
                // Leave the failure to whoever evaluates this branch.
                trace!(error = %e, expr = %rebuilt, "reduction deferred");
                Ok(rebuilt)
            }
        }
    }
}

fn is_empty_node_set<N: XmlNode>(e: &Expr<N>) -> bool {
    matches!(e.kind(), ExprKind::Value(Value::NodeSet(NodeSetValue::Empty)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::context::Controller;
    use crate::functions::SystemFunction;
    use crate::node_test::NodeTest;
    use crate::simple_node::{SimpleNode, elem};

    type E = Expr<SimpleNode>;

    fn call(function: SystemFunction, args: Vec<E>) -> E {
        E::new(ExprKind::FunctionCall {
            function,
            args,
            bound: None,
        })
    }

    #[test]
    fn unrelated_mask_keeps_the_expression() {
        let ctx = Context::new(Controller::<SimpleNode>::detached());
        let e = call(SystemFunction::Position, vec![]);
        let r = e.reduce(Dependencies::VARIABLES, &ctx).unwrap();
        assert!(r.ptr_eq(&e));
    }

    #[test]
    fn positions_become_values() {
        let root = elem("r").build();
        let ctx = Context::new(Controller::detached()).with_focus(root, 3, 5);
        let e = call(SystemFunction::Position, vec![]);
        let r = e.reduce(Dependencies::POSITION, &ctx).unwrap();
        assert!(matches!(r.as_value(), Some(Value::Number(n)) if *n == 3.0));
    }

    #[test]
    fn context_node_is_bound_into_axes() {
        let root = elem("r").child(elem("a")).child(elem("b")).build();
        let ctx = Context::for_node(Controller::detached(), root.clone());
        let e = E::new(ExprKind::Axis {
            axis: Axis::Child,
            test: NodeTest::AnyChildNode,
            bound: None,
        });
        let r = e.reduce(Dependencies::ALL, &ctx).unwrap();
        assert!(r.dependencies().is_empty());
        assert!(r.is_node_set_expression());
        let other = Context::new(Controller::detached());
        assert_eq!(r.evaluate_as_node_set(&other).unwrap().count().unwrap(), 2);
    }

    #[test]
    fn bound_functions_stop_reading_the_context() {
        let root = elem("r").child(elem("a")).build();
        let ctx = Context::for_node(Controller::detached(), root.children()[0].clone());
        let e = call(SystemFunction::LocalName, vec![]);
        let r = e.reduce(Dependencies::CONTEXT_NODE, &ctx).unwrap();
        assert_eq!(r.as_value().unwrap().as_string().unwrap(), "a");
    }
}
