use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::bindery::{Bindery, Slot};
use crate::error::{EvaluationError, Result};
use crate::expr::Expr;
use crate::functions::format_number::{DecimalFormat, DecimalFormatManager};
use crate::functions::{ExtensionFunction, FunctionLibrary};
use crate::keys::{KeyDefinition, KeyManager};
use crate::model::XmlNode;
use crate::names::ExpandedName;
use crate::value::Value;

/// Supplies the documents named in `document()` calls.
pub trait DocumentResolver<N>: Send + Sync {
    /// Root node of the document at the absolute `uri`, if there is one.
    fn load(&self, uri: &str) -> Result<Option<N>>;
}

/// Numeric tunables of the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Number of uses after which a lazy node-set is materialized.
    pub intent_promotion_threshold: usize,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            intent_promotion_threshold: 3,
        }
    }
}

/// Shared state of one transformation: global variables, host functions,
/// keys, decimal formats and loaded documents.
pub struct Controller<N: XmlNode> {
    bindery: Mutex<Bindery<N>>,
    functions: FunctionLibrary<N>,
    keys: KeyManager<N>,
    decimal_formats: DecimalFormatManager,
    documents: Option<Arc<dyn DocumentResolver<N>>>,
    document_pool: Mutex<HashMap<String, N>>,
    options: EvaluationOptions,
    global_context_node: Option<N>,
}

impl<N: XmlNode> fmt::Debug for Controller<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("options", &self.options)
            .field("global_context_node", &self.global_context_node)
            .field("has_document_resolver", &self.documents.is_some())
            .finish_non_exhaustive()
    }
}

impl<N: XmlNode> Controller<N> {
    pub fn builder() -> ControllerBuilder<N> {
        ControllerBuilder::new()
    }

    /// A controller with nothing registered, for evaluating expressions that
    /// need no XSLT context.
    pub fn detached() -> Arc<Self> {
        ControllerBuilder::new().build()
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub fn functions(&self) -> &FunctionLibrary<N> {
        &self.functions
    }

    pub fn keys(&self) -> &KeyManager<N> {
        &self.keys
    }

    pub fn decimal_formats(&self) -> &DecimalFormatManager {
        &self.decimal_formats
    }

    pub fn global_context_node(&self) -> Option<&N> {
        self.global_context_node.as_ref()
    }

    /// Document order of two nodes.
    pub fn compare(&self, a: &N, b: &N) -> Result<Ordering> {
        if a.is_same_node(b) {
            return Ok(Ordering::Equal);
        }
        a.compare_document_order(b)
    }

    pub(crate) fn bindery(&self) -> MutexGuard<'_, Bindery<N>> {
        match self.bindery.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether a global variable with this name has been supplied.
    pub fn has_global(&self, name: &ExpandedName) -> bool {
        self.bindery().is_defined(name.fingerprint())
    }

    /// Root of the document at the absolute `uri`; each URI is loaded once.
    pub fn load_document(&self, uri: &str) -> Result<Option<N>> {
        {
            let pool = self.pool();
            if let Some(n) = pool.get(uri) {
                return Ok(Some(n.clone()));
            }
        }
        let Some(resolver) = &self.documents else {
            return Err(EvaluationError::function(format!(
                "Cannot load document {uri}: no document resolver is configured"
            )));
        };
        let Some(root) = resolver.load(uri)? else {
            return Ok(None);
        };
        debug!(uri, "loaded document");
        Ok(Some(
            self.pool()
                .entry(uri.to_string())
                .or_insert(root)
                .clone(),
        ))
    }

    fn pool(&self) -> MutexGuard<'_, HashMap<String, N>> {
        match self.document_pool.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct ControllerBuilder<N: XmlNode> {
    bindery: Bindery<N>,
    functions: FunctionLibrary<N>,
    keys: KeyManager<N>,
    decimal_formats: DecimalFormatManager,
    documents: Option<Arc<dyn DocumentResolver<N>>>,
    options: EvaluationOptions,
    global_context_node: Option<N>,
}

impl<N: XmlNode> Default for ControllerBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XmlNode> ControllerBuilder<N> {
    pub fn new() -> Self {
        Self {
            bindery: Bindery::default(),
            functions: FunctionLibrary::new(),
            keys: KeyManager::new(),
            decimal_formats: DecimalFormatManager::default(),
            documents: None,
            options: EvaluationOptions::default(),
            global_context_node: None,
        }
    }

    /// Define a global variable by expression; it is evaluated on first
    /// reference with the global context node as context.
    #[must_use]
    pub fn with_global_variable(mut self, name: &ExpandedName, expr: Expr<N>) -> Self {
        self.bindery
            .define(name.fingerprint(), Slot::Unevaluated(expr));
        self
    }

    #[must_use]
    pub fn with_global_value(mut self, name: &ExpandedName, value: impl Into<Value<N>>) -> Self {
        self.bindery
            .define(name.fingerprint(), Slot::Evaluated(value.into()));
        self
    }

    #[must_use]
    pub fn with_functions(mut self, functions: FunctionLibrary<N>) -> Self {
        self.functions = functions;
        self
    }

    /// Register one host function for calls with `min..=max` arguments
    /// (`None` for no upper limit).
    #[must_use]
    pub fn with_function(
        mut self,
        name: ExpandedName,
        min_arity: usize,
        max_arity: Option<usize>,
        f: ExtensionFunction<N>,
    ) -> Self {
        self.functions.register_range(name, min_arity, max_arity, f);
        self
    }

    #[must_use]
    pub fn with_document_resolver(mut self, resolver: Arc<dyn DocumentResolver<N>>) -> Self {
        self.documents = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_key(mut self, definition: KeyDefinition<N>) -> Self {
        self.keys.register(definition);
        self
    }

    /// Register a decimal format; `None` replaces the default format.
    #[must_use]
    pub fn with_decimal_format(mut self, name: Option<ExpandedName>, format: DecimalFormat) -> Self {
        self.decimal_formats.register(name, format);
        self
    }

    #[must_use]
    pub fn with_intent_promotion_threshold(mut self, uses: usize) -> Self {
        self.options.intent_promotion_threshold = uses.max(1);
        self
    }

    #[must_use]
    pub fn with_context_node(mut self, node: N) -> Self {
        self.global_context_node = Some(node);
        self
    }

    pub fn build(self) -> Arc<Controller<N>> {
        Arc::new(Controller {
            bindery: Mutex::new(self.bindery),
            functions: self.functions,
            keys: self.keys,
            decimal_formats: self.decimal_formats,
            documents: self.documents,
            document_pool: Mutex::new(HashMap::new()),
            options: self.options,
            global_context_node: self.global_context_node,
        })
    }
}
