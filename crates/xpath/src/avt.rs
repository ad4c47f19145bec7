//! Attribute value templates: literal text with `{expr}` holes.

use compact_str::CompactString;

use crate::context::SharedStaticContext;
use crate::error::SyntaxError;
use crate::expr::{Expr, ExprKind};
use crate::model::XmlNode;
use crate::value::Value;

/// Compile an attribute value template. `{{` and `}}` stand for literal
/// braces; a single `}` outside an expression is an error.
pub fn compile<N: XmlNode>(text: &str, static_context: &SharedStaticContext) -> Result<Expr<N>, SyntaxError> {
    let literal = |s: &str| {
        Expr::with_static_context(
            ExprKind::Value(Value::String(CompactString::from(s))),
            Some(static_context.clone()),
        )
    };
    if !text.contains(['{', '}']) {
        return Ok(literal(text));
    }
    let mut parts = Vec::new();
    let mut pending = String::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some(at) = rest.find(['{', '}']) else {
            pending.push_str(rest);
            break;
        };
        pending.push_str(&rest[..at]);
        let brace = &rest[at..];
        if brace.starts_with("{{") || brace.starts_with("}}") {
            pending.push_str(&brace[..1]);
            rest = &brace[2..];
            continue;
        }
        if brace.starts_with('}') {
            return Err(SyntaxError::new(
                text,
                format!("Closing curly brace in attribute value template \"{text}\" must be doubled"),
            )
            .at(text.len() - rest.len() + at));
        }
        let body = &brace[1..];
        let close = expression_end(body).ok_or_else(|| {
            SyntaxError::new(text, format!("No closing \"}}\" in attribute value template {text}"))
        })?;
        if !pending.is_empty() {
            parts.push(literal(&pending));
            pending.clear();
        }
        parts.push(Expr::parse(&body[..close], static_context)?);
        rest = &body[close + 1..];
    }
    if !pending.is_empty() {
        parts.push(literal(&pending));
    }
    Ok(Expr::with_static_context(ExprKind::Avt(parts), Some(static_context.clone())).simplify())
}

/// Offset of the `}` closing an expression, skipping string literals.
fn expression_end(body: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if q == c => quote = None,
            (None, '}') => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, Controller, StandaloneContext};
    use crate::simple_node::{SimpleNode, attr, elem};

    fn eval(template: &str) -> String {
        let root = elem("a").attr(attr("x", "1")).build();
        let sc = StandaloneContext::new().shared();
        let e: Expr<SimpleNode> = compile(template, &sc).unwrap();
        let ctx = Context::for_node(Controller::detached(), root.clone());
        e.evaluate_as_string(&ctx).unwrap().to_string()
    }

    #[test]
    fn holes_and_escapes() {
        assert_eq!(eval("plain"), "plain");
        assert_eq!(eval("v{@x}-{@x + 1}"), "v1-2");
        assert_eq!(eval("{{literal}}"), "{literal}");
        assert_eq!(eval("{'}'}"), "}");
    }

    #[test]
    fn malformed_templates() {
        let sc = StandaloneContext::new().shared();
        let err = compile::<SimpleNode>("a}b", &sc).unwrap_err();
        assert_eq!(
            err.message,
            "Closing curly brace in attribute value template \"a}b\" must be doubled"
        );
        let err = compile::<SimpleNode>("{@x", &sc).unwrap_err();
        assert_eq!(err.message, "No closing \"}\" in attribute value template {@x");
    }

    #[test]
    fn single_literals_need_no_template() {
        let sc = StandaloneContext::new().shared();
        let e: Expr<SimpleNode> = compile("{{x}}", &sc).unwrap();
        assert!(matches!(e.as_value(), Some(Value::String(s)) if s == "{x}"));
    }
}
