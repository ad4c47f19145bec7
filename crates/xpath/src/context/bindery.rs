//! Values of global variables, evaluated lazily on first reference.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{Binding, Context, Controller};
use crate::error::{EvaluationError, Result};
use crate::expr::Expr;
use crate::model::XmlNode;
use crate::names::Fingerprint;
use crate::value::Value;

#[derive(Debug, Clone)]
pub(crate) enum Slot<N: XmlNode> {
    Unevaluated(Expr<N>),
    Evaluating,
    Evaluated(Value<N>),
}

#[derive(Debug)]
pub(crate) struct Bindery<N: XmlNode> {
    globals: HashMap<Fingerprint, Slot<N>>,
}

impl<N: XmlNode> Default for Bindery<N> {
    fn default() -> Self {
        Self {
            globals: HashMap::new(),
        }
    }
}

impl<N: XmlNode> Bindery<N> {
    pub(crate) fn define(&mut self, id: Fingerprint, slot: Slot<N>) {
        self.globals.insert(id, slot);
    }

    pub(crate) fn is_defined(&self, id: Fingerprint) -> bool {
        self.globals.contains_key(&id)
    }
}

/// Value of a global variable, evaluating its definition on first use.
///
/// The slot is marked `Evaluating` while the definition runs; meeting that
/// mark again means the definition refers to itself. The lock is released
/// while the definition is evaluated.
pub(crate) fn global_value<N: XmlNode>(
    controller: &Arc<Controller<N>>,
    binding: &Binding,
) -> Result<Value<N>> {
    let expr = {
        let mut bindery = controller.bindery();
        let Some(slot) = bindery.globals.get_mut(&binding.id()) else {
            return Err(EvaluationError::undefined_variable(binding.name()));
        };
        match slot {
            Slot::Evaluated(v) => return Ok(v.clone()),
            Slot::Evaluating => return Err(EvaluationError::circular_variable(binding.name())),
            Slot::Unevaluated(e) => {
                let e = e.clone();
                *slot = Slot::Evaluating;
                e
            }
        }
    };
    debug!(variable = %binding.name(), "evaluating global variable");
    let result = expr.evaluate(&Context::new(controller.clone()));
    let mut bindery = controller.bindery();
    match result {
        Ok(value) => {
            bindery.define(binding.id(), Slot::Evaluated(value.clone()));
            Ok(value)
        }
        Err(err) => {
            bindery.define(binding.id(), Slot::Unevaluated(expr));
            Err(err)
        }
    }
}
