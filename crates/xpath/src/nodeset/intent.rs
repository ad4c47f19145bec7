use core::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::extent::NodeSetExtent;
use crate::context::{Context, Controller};
use crate::enumeration::{BoxedEnumeration, NodeEnumeration};
use crate::error::{EvaluationError, Result};
use crate::expr::Expr;
use crate::model::XmlNode;

#[derive(Debug)]
struct IntentState<N> {
    uses: usize,
    extent: Option<NodeSetExtent<N>>,
}

/// A node-set defined by a context-free expression. It is re-evaluated on
/// demand until it has been used often enough to be worth materializing.
#[derive(Clone)]
pub struct NodeSetIntent<N: XmlNode> {
    expr: Expr<N>,
    controller: Arc<Controller<N>>,
    state: Arc<Mutex<IntentState<N>>>,
}

impl<N: XmlNode> fmt::Debug for NodeSetIntent<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSetIntent")
            .field("expr", &format_args!("{}", self.expr))
            .field("materialized", &self.lock().extent.is_some())
            .finish()
    }
}

impl<N: XmlNode> NodeSetIntent<N> {
    pub fn new(expr: Expr<N>, controller: Arc<Controller<N>>) -> Result<Self> {
        let deps = expr.dependencies();
        if !deps.is_empty() {
            return Err(EvaluationError::internal(format!(
                "Cannot create intensional node-set with context dependencies {deps:?}: {expr}"
            )));
        }
        Ok(Self {
            expr,
            controller,
            state: Arc::new(Mutex::new(IntentState {
                uses: 0,
                extent: None,
            })),
        })
    }

    pub fn expression(&self) -> &Expr<N> {
        &self.expr
    }

    fn lock(&self) -> MutexGuard<'_, IntentState<N>> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn context(&self) -> Context<N> {
        Context::new(self.controller.clone())
    }

    pub fn is_materialized(&self) -> bool {
        self.lock().extent.is_some()
    }

    pub fn is_sorted(&self) -> bool {
        self.lock().extent.as_ref().is_some_and(NodeSetExtent::is_sorted)
    }

    /// Evaluate the expression once, in its natural order, and keep the
    /// result. A sorted selection stays in key order.
    pub fn materialize(&self) -> Result<NodeSetExtent<N>> {
        if let Some(ext) = &self.lock().extent {
            return Ok(ext.clone());
        }
        let mut enm = self.expr.enumerate(&self.context(), false)?;
        let ext = NodeSetExtent::from_enumeration(&mut enm)?;
        debug!(nodes = ext.len(), expr = %self.expr, "materialized node-set intent");
        let mut st = self.lock();
        Ok(st.extent.get_or_insert(ext).clone())
    }

    /// Record one use; true if this use should materialize.
    fn register_use(&self) -> bool {
        let threshold = self.controller.options().intent_promotion_threshold;
        let mut st = self.lock();
        st.uses += 1;
        st.uses >= threshold
    }

    pub fn enumerate(&self, sort: bool) -> Result<BoxedEnumeration<N>> {
        let cached = self.lock().extent.clone();
        let ext = match cached {
            Some(ext) => ext,
            None if self.register_use() => self.materialize()?,
            None => return self.expr.enumerate(&self.context(), sort),
        };
        if sort && !ext.is_sorted() {
            return Ok(Box::new(ext.sort()?.enumerate()));
        }
        Ok(Box::new(ext.enumerate()))
    }

    pub fn count(&self) -> Result<usize> {
        if let Some(ext) = &self.lock().extent {
            return Ok(ext.sort()?.len());
        }
        let mut enm = self.expr.enumerate(&self.context(), false)?;
        if enm.is_sorted() && enm.is_last_position_finder() {
            if let Some(n) = enm.last_position()? {
                return Ok(n);
            }
        }
        Ok(self.materialize()?.sort()?.len())
    }

    pub fn first(&self) -> Result<Option<N>> {
        if let Some(ext) = &self.lock().extent {
            return ext.first();
        }
        let mut enm = self.expr.enumerate(&self.context(), false)?;
        if enm.is_sorted() {
            return enm.next_node();
        }
        NodeSetExtent::from_enumeration(&mut enm)?.first()
    }
}
