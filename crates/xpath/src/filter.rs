//! Predicate application over a node enumeration.

use crate::context::Context;
use crate::enumeration::{BoxedEnumeration, LookaheadEnumeration, NodeEnumeration};
use crate::error::Result;
use crate::expr::{Dependencies, Expr, ExprKind};
use crate::model::XmlNode;
use crate::value::{DataType, Value};

/// Converts a numeric predicate to a 1-based position, if it can be one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn as_position(n: f64) -> Option<usize> {
    if n >= 1.0 && n.fract() == 0.0 && n <= usize::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

#[allow(clippy::cast_precision_loss)]
fn position_as_number(p: usize) -> f64 {
    p as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Accept positions in `min..=max` and stop once past `max`.
    Positional { min: usize, max: usize },
    /// Statically numeric: compare with the position.
    Numeric,
    /// Statically boolean.
    Boolean,
    /// Decide per value: numbers are positions, everything else a boolean.
    General,
}

pub struct FilterEnumerator<N: XmlNode> {
    base: BoxedEnumeration<N>,
    predicate: Expr<N>,
    context: Context<N>,
    strategy: Strategy,
    uses_last: bool,
    last: Option<usize>,
    position: usize,
    finish_after_reject: bool,
    finished: bool,
}

impl<N: XmlNode> FilterEnumerator<N> {
    pub fn new(
        base: BoxedEnumeration<N>,
        predicate: Expr<N>,
        context: &Context<N>,
        finish_after_reject: bool,
    ) -> Self {
        let strategy = match predicate.kind() {
            ExprKind::Value(Value::Number(n)) => match as_position(*n) {
                Some(p) => Strategy::Positional { min: p, max: p },
                None => Strategy::Positional { min: 1, max: 0 },
            },
            ExprKind::PositionRange { min, max } => Strategy::Positional {
                min: *min,
                max: *max,
            },
            _ => match predicate.data_type() {
                DataType::Number => Strategy::Numeric,
                DataType::Boolean => Strategy::Boolean,
                _ => Strategy::General,
            },
        };
        let uses_last = predicate.dependencies().contains(Dependencies::LAST);
        let base: BoxedEnumeration<N> = if uses_last && !base.is_last_position_finder() {
            Box::new(LookaheadEnumeration::new(base))
        } else {
            base
        };
        Self {
            base,
            predicate,
            context: context.clone(),
            strategy,
            uses_last,
            last: None,
            position: 0,
            finish_after_reject,
            finished: false,
        }
    }

    fn last(&mut self) -> Result<usize> {
        if let Some(l) = self.last {
            return Ok(l);
        }
        let l = self.base.last_position()?.unwrap_or(self.position);
        self.last = Some(l);
        Ok(l)
    }

    fn accepts(&mut self, node: &N) -> Result<bool> {
        if let Strategy::Positional { min, max } = self.strategy {
            return Ok(self.position >= min && self.position <= max);
        }
        let last = if self.uses_last { self.last()? } else { self.position };
        let focus = self.context.with_focus(node.clone(), self.position, last);
        let position = position_as_number(self.position);
        Ok(match self.strategy {
            Strategy::Numeric => self.predicate.evaluate_as_number(&focus)? == position,
            Strategy::Boolean => self.predicate.evaluate_as_boolean(&focus)?,
            _ => match self.predicate.evaluate(&focus)? {
                Value::Number(n) => n == position,
                other => other.as_boolean()?,
            },
        })
    }
}

impl<N: XmlNode> NodeEnumeration<N> for FilterEnumerator<N> {
    fn next_node(&mut self) -> Result<Option<N>> {
        while !self.finished {
            if let Strategy::Positional { max, .. } = self.strategy {
                if self.position >= max {
                    self.finished = true;
                    break;
                }
            }
            let Some(node) = self.base.next_node()? else {
                self.finished = true;
                break;
            };
            self.position += 1;
            if self.accepts(&node)? {
                return Ok(Some(node));
            }
            if self.finish_after_reject {
                self.finished = true;
            }
        }
        Ok(None)
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
}
