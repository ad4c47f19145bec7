//! XPath 1.0 expressions for an XSLT processor: a tokenizer and parser, a
//! simplifier and partial evaluator over an immutable expression tree, and a
//! lazy node-set evaluator that works over any tree implementing
//! [`XmlNode`].

pub mod avt;
pub mod axis;
pub mod context;
pub mod enumeration;
pub mod error;
pub mod expr;
pub mod filter;
pub mod functions;
pub mod keys;
pub mod model;
pub mod names;
pub mod node_test;
pub mod nodeset;
mod parser;
pub mod pattern;
pub mod set_ops;
pub mod simple_node;
pub mod sort;
pub mod tokenizer;
pub mod value;

use std::sync::Arc;

pub use axis::Axis;
pub use context::{
    Context, Controller, ControllerBuilder, SharedStaticContext, StandaloneContext, StaticContext,
};
pub use error::{EvaluationError, EvaluationErrorKind, StaticError, SyntaxError};
pub use expr::{Dependencies, Expr, ExprKind};
pub use functions::{ExtensionFunction, FunctionLibrary, SystemFunction};
pub use keys::{KeyDefinition, KeyManager};
pub use model::{NodeKind, QName, XmlNode};
pub use names::ExpandedName;
pub use node_test::NodeTest;
pub use nodeset::NodeSetValue;
pub use pattern::Pattern;
pub use simple_node::{SimpleNode, SimpleNodeBuilder, attr, doc as simple_doc, elem, text};
pub use value::{DataType, Value};

/// Parse and simplify `text` against `static_context`.
pub fn compile_xpath<N: XmlNode>(
    text: &str,
    static_context: &SharedStaticContext,
) -> Result<Expr<N>, SyntaxError> {
    Expr::parse(text, static_context)
}

/// Evaluate a standalone expression with `node` as the context node.
pub fn evaluate_xpath<N: XmlNode>(text: &str, node: N) -> error::Result<Value<N>> {
    let expr = Expr::parse(text, &StandaloneContext::new().shared())?;
    let ctx = Context::for_node(Controller::detached(), node);
    expr.evaluate(&ctx)
}

/// Convenience for hosts that share one controller between many
/// evaluations.
pub fn evaluate_with<N: XmlNode>(
    expr: &Expr<N>,
    controller: &Arc<Controller<N>>,
    node: N,
) -> error::Result<Value<N>> {
    expr.evaluate(&Context::for_node(controller.clone(), node))
}
