//! Static and dynamic evaluation contexts.
//!
//! A [`Context`] is the focus of one evaluation (context node, position,
//! size, current node and local variables) plus a handle on the shared
//! [`Controller`]. Nested scopes never change a context in place; they derive
//! a new one with the `with_*` methods.

mod bindery;
mod controller;
mod static_context;

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

pub use controller::{Controller, ControllerBuilder, DocumentResolver, EvaluationOptions};
pub use static_context::{
    Binding, Constant, SharedStaticContext, StandaloneContext, StandaloneContextBuilder,
    StaticContext,
};

use crate::error::{EvaluationError, Result};
use crate::model::XmlNode;
use crate::names::Fingerprint;
use crate::value::Value;

#[derive(Clone)]
pub struct Context<N: XmlNode> {
    controller: Arc<Controller<N>>,
    context_node: Option<N>,
    current_node: Option<N>,
    position: usize,
    last: usize,
    locals: Option<Arc<HashMap<Fingerprint, Value<N>>>>,
}

impl<N: XmlNode> fmt::Debug for Context<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("context_node", &self.context_node)
            .field("current_node", &self.current_node)
            .field("position", &self.position)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl<N: XmlNode> Context<N> {
    /// Context positioned on the controller's global context node, if any.
    pub fn new(controller: Arc<Controller<N>>) -> Self {
        let node = controller.global_context_node().cloned();
        Self {
            controller,
            context_node: node.clone(),
            current_node: node,
            position: 1,
            last: 1,
            locals: None,
        }
    }

    /// Context on `node`, which also becomes the current node.
    pub fn for_node(controller: Arc<Controller<N>>, node: N) -> Self {
        Self {
            context_node: Some(node.clone()),
            current_node: Some(node),
            ..Self::new(controller)
        }
    }

    pub fn controller(&self) -> &Arc<Controller<N>> {
        &self.controller
    }

    pub fn context_node(&self) -> Result<&N> {
        self.context_node
            .as_ref()
            .ok_or_else(|| EvaluationError::no_context("The context item is undefined"))
    }

    pub fn context_node_opt(&self) -> Option<&N> {
        self.context_node.as_ref()
    }

    pub fn current_node(&self) -> Result<&N> {
        self.current_node
            .as_ref()
            .ok_or_else(|| EvaluationError::no_context("The current node is undefined"))
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn last(&self) -> usize {
        self.last
    }

    /// Copy for a nested scope.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    #[must_use]
    pub fn with_context_node(&self, node: N) -> Self {
        Self {
            context_node: Some(node),
            position: 1,
            last: 1,
            ..self.clone()
        }
    }

    /// Context for the `position`-th of `last` nodes.
    #[must_use]
    pub fn with_focus(&self, node: N, position: usize, last: usize) -> Self {
        Self {
            context_node: Some(node),
            position,
            last,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_current_node(&self, node: N) -> Self {
        Self {
            current_node: Some(node),
            ..self.clone()
        }
    }

    /// Bind a local variable for this scope and everything derived from it.
    #[must_use]
    pub fn with_variable(&self, binding: &Binding, value: Value<N>) -> Self {
        let mut locals = self.locals.as_deref().cloned().unwrap_or_default();
        locals.insert(binding.id(), value);
        Self {
            locals: Some(Arc::new(locals)),
            ..self.clone()
        }
    }

    /// Value of the variable a reference was bound to.
    pub fn variable(&self, binding: &Binding) -> Result<Value<N>> {
        if let Some(v) = self.locals.as_ref().and_then(|l| l.get(&binding.id())) {
            return Ok(v.clone());
        }
        if binding.is_global() {
            return bindery::global_value(&self.controller, binding);
        }
        Err(EvaluationError::undefined_variable(binding.name()))
    }
}
