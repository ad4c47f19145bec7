use core::fmt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use compact_str::CompactString;

use crate::error::StaticError;
use crate::functions::SystemFunction;
use crate::model::XmlNode;
use crate::names::{
    EXSLT_SETS_NAMESPACE, ExpandedName, Fingerprint, XML_NAMESPACE, XSLT_NAMESPACE, is_qname,
    split_qname,
};
use crate::value::Value;

/// Value of a variable known at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    String(CompactString),
    Number(f64),
    Boolean(bool),
}

impl Constant {
    pub fn to_value<N: XmlNode>(&self) -> Value<N> {
        match self {
            Constant::String(s) => Value::String(s.clone()),
            Constant::Number(n) => Value::Number(*n),
            Constant::Boolean(b) => Value::Boolean(*b),
        }
    }
}

/// A variable declaration as seen by a reference to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    name: ExpandedName,
    id: Fingerprint,
    global: bool,
    constant: Option<Constant>,
}

impl Binding {
    pub fn global(name: ExpandedName) -> Self {
        let id = name.fingerprint();
        Self {
            name,
            id,
            global: true,
            constant: None,
        }
    }

    pub fn local(name: ExpandedName) -> Self {
        Self {
            global: false,
            ..Self::global(name)
        }
    }

    #[must_use]
    pub fn with_constant(mut self, value: Constant) -> Self {
        self.constant = Some(value);
        self
    }

    pub fn name(&self) -> &ExpandedName {
        &self.name
    }

    pub fn id(&self) -> Fingerprint {
        self.id
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn constant_value(&self) -> Option<&Constant> {
        self.constant.as_ref()
    }
}

pub type SharedStaticContext = Arc<dyn StaticContext>;

/// XSLT 1.0 instruction names, for `element-available()`.
const XSLT_INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "number",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

const EXSLT_SET_FUNCTIONS: &[&str] = &[
    "difference",
    "distinct",
    "has-same-node",
    "intersection",
    "leading",
    "trailing",
];

/// Compile-time information an expression is parsed against.
pub trait StaticContext: Send + Sync + fmt::Debug {
    fn system_id(&self) -> Option<&str> {
        None
    }

    fn base_uri(&self) -> Option<&str> {
        None
    }

    /// Namespace URI bound to a non-empty prefix.
    fn uri_for_prefix(&self, prefix: &str) -> Result<String, StaticError>;

    /// Resolve a lexical QName. Unprefixed names are in no namespace.
    fn make_name(&self, qname: &str) -> Result<ExpandedName, StaticError> {
        if !is_qname(qname) {
            return Err(StaticError::InvalidName(qname.to_string()));
        }
        let (prefix, local) = split_qname(qname);
        if prefix.is_empty() {
            return Ok(ExpandedName::local(local));
        }
        let uri = self.uri_for_prefix(prefix)?;
        Ok(ExpandedName::new(Some(&uri), local))
    }

    fn bind_variable(&self, name: &ExpandedName) -> Result<Binding, StaticError>;

    /// Whether calls to functions in `uri` go to the host's function library.
    fn is_extension_namespace(&self, _uri: &str) -> bool {
        false
    }

    fn is_function_available(&self, name: &ExpandedName) -> bool {
        match name.ns_uri() {
            None => SystemFunction::from_name(name.local_name()).is_some(),
            Some(EXSLT_SETS_NAMESPACE) => EXSLT_SET_FUNCTIONS.contains(&name.local_name()),
            Some(_) => false,
        }
    }

    fn is_element_available(&self, name: &ExpandedName) -> bool {
        name.ns_uri() == Some(XSLT_NAMESPACE) && XSLT_INSTRUCTIONS.contains(&name.local_name())
    }

    /// Parse failures become placeholders that fail only when evaluated.
    fn forwards_compatible(&self) -> bool {
        false
    }

    fn allows_key_function(&self) -> bool {
        false
    }
}

/// Static context for expressions compiled outside a stylesheet.
#[derive(Debug, Clone)]
pub struct StandaloneContext {
    namespaces: HashMap<String, String>,
    variables: HashMap<ExpandedName, Binding>,
    extension_namespaces: HashSet<String>,
    extension_functions: HashSet<ExpandedName>,
    forwards_compatible: bool,
    allow_key: bool,
    base_uri: Option<String>,
    system_id: Option<String>,
}

impl Default for StandaloneContext {
    fn default() -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert("xml".to_string(), XML_NAMESPACE.to_string());
        namespaces.insert("xsl".to_string(), XSLT_NAMESPACE.to_string());
        Self {
            namespaces,
            variables: HashMap::new(),
            extension_namespaces: HashSet::new(),
            extension_functions: HashSet::new(),
            forwards_compatible: false,
            allow_key: false,
            base_uri: None,
            system_id: None,
        }
    }
}

impl StandaloneContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> StandaloneContextBuilder {
        StandaloneContextBuilder::new()
    }

    pub fn shared(self) -> SharedStaticContext {
        Arc::new(self)
    }
}

impl From<StandaloneContext> for SharedStaticContext {
    fn from(ctx: StandaloneContext) -> Self {
        Arc::new(ctx)
    }
}

impl StaticContext for StandaloneContext {
    fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    fn uri_for_prefix(&self, prefix: &str) -> Result<String, StaticError> {
        self.namespaces
            .get(prefix)
            .cloned()
            .ok_or_else(|| StaticError::UndeclaredPrefix(prefix.to_string()))
    }

    fn bind_variable(&self, name: &ExpandedName) -> Result<Binding, StaticError> {
        if self.variables.is_empty() {
            return Err(StaticError::VariablesNotAllowed);
        }
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| StaticError::UndeclaredVariable(name.clone()))
    }

    fn is_extension_namespace(&self, uri: &str) -> bool {
        self.extension_namespaces.contains(uri)
    }

    fn is_function_available(&self, name: &ExpandedName) -> bool {
        if self.extension_functions.contains(name) {
            return true;
        }
        match name.ns_uri() {
            None => SystemFunction::from_name(name.local_name()).is_some(),
            Some(EXSLT_SETS_NAMESPACE) => EXSLT_SET_FUNCTIONS.contains(&name.local_name()),
            Some(_) => false,
        }
    }

    fn forwards_compatible(&self) -> bool {
        self.forwards_compatible
    }

    fn allows_key_function(&self) -> bool {
        self.allow_key
    }
}

pub struct StandaloneContextBuilder {
    ctx: StandaloneContext,
}

impl Default for StandaloneContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StandaloneContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: StandaloneContext::default(),
        }
    }

    /// Bind a prefix. The `xml` prefix is fixed and cannot be rebound.
    #[must_use]
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        self.ctx.namespaces.insert(p, uri.into());
        self
    }

    /// Declare a global variable whose value the controller supplies.
    #[must_use]
    pub fn with_variable(mut self, name: ExpandedName) -> Self {
        self.ctx
            .variables
            .insert(name.clone(), Binding::global(name));
        self
    }

    /// Declare a global variable with a value fixed at compile time.
    #[must_use]
    pub fn with_constant(mut self, name: ExpandedName, value: Constant) -> Self {
        self.ctx
            .variables
            .insert(name.clone(), Binding::global(name).with_constant(value));
        self
    }

    /// Declare a variable bound per evaluation through [`crate::Context::with_variable`].
    #[must_use]
    pub fn with_local_variable(mut self, name: ExpandedName) -> Self {
        self.ctx.variables.insert(name.clone(), Binding::local(name));
        self
    }

    #[must_use]
    pub fn with_extension_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.extension_namespaces.insert(uri.into());
        self
    }

    #[must_use]
    pub fn with_extension_function(mut self, name: ExpandedName) -> Self {
        self.ctx.extension_functions.insert(name);
        self
    }

    #[must_use]
    pub fn with_forwards_compatible(mut self, enabled: bool) -> Self {
        self.ctx.forwards_compatible = enabled;
        self
    }

    #[must_use]
    pub fn with_key_function(mut self, allowed: bool) -> Self {
        self.ctx.allow_key = allowed;
        self
    }

    #[must_use]
    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_system_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.system_id = Some(id.into());
        self
    }

    pub fn build(self) -> StandaloneContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_resolve_or_fail() {
        let sc = StandaloneContextBuilder::new()
            .with_namespace("p", "urn:p")
            .with_namespace("xml", "urn:bogus")
            .build();
        assert_eq!(sc.make_name("p:a").unwrap(), ExpandedName::new(Some("urn:p"), "a"));
        assert_eq!(sc.uri_for_prefix("xml").unwrap(), XML_NAMESPACE);
        assert_eq!(
            sc.make_name("q:a"),
            Err(StaticError::UndeclaredPrefix("q".to_string()))
        );
        assert!(matches!(sc.make_name("1a"), Err(StaticError::InvalidName(_))));
    }

    #[test]
    fn variables_need_declarations() {
        let x = ExpandedName::local("x");
        assert_eq!(
            StandaloneContext::new().bind_variable(&x),
            Err(StaticError::VariablesNotAllowed)
        );
        let sc = StandaloneContextBuilder::new()
            .with_constant(x.clone(), Constant::Number(2.0))
            .build();
        let b = sc.bind_variable(&x).unwrap();
        assert!(b.is_global());
        assert_eq!(b.constant_value(), Some(&Constant::Number(2.0)));
        assert!(matches!(
            sc.bind_variable(&ExpandedName::local("y")),
            Err(StaticError::UndeclaredVariable(_))
        ));
    }

    #[test]
    fn availability() {
        let sc = StandaloneContext::new();
        assert!(sc.is_function_available(&ExpandedName::local("concat")));
        assert!(!sc.is_function_available(&ExpandedName::local("matches")));
        assert!(sc.is_function_available(&ExpandedName::new(Some(EXSLT_SETS_NAMESPACE), "leading")));
        assert!(sc.is_element_available(&ExpandedName::new(Some(XSLT_NAMESPACE), "for-each")));
        assert!(!sc.is_element_available(&ExpandedName::new(Some(XSLT_NAMESPACE), "sequence")));
    }
}
