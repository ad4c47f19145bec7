//! Recursive-descent parser for expressions and match patterns.
//!
//! Precedence, loosest first: `or`, `and`, equality, relational, additive,
//! multiplicative, unary minus, union, path, filter, primary.

use string_cache::DefaultAtom;
use tracing::debug;

use crate::axis::Axis;
use crate::context::SharedStaticContext;
use crate::error::{EvaluationError, StaticError, SyntaxError};
use crate::expr::{ArithmeticOp, BooleanOp, Dependencies, Expr, ExprKind, Step};
use crate::functions::SystemFunction;
use crate::model::{NodeKind, XmlNode};
use crate::names::{EXSLT_SETS_NAMESPACE, ExpandedName, is_ncname, split_qname};
use crate::node_test::NodeTest;
use crate::pattern::{Connector, LocationPattern, Pattern};
use crate::set_ops::SetOperator;
use crate::tokenizer::{TokenKind, Tokenizer};
use crate::value::{CompareOp, DataType, Value, string_to_number};

type ParseResult<T> = Result<T, SyntaxError>;

pub(crate) struct Parser<'a> {
    t: Tokenizer<'a>,
    sc: &'a SharedStaticContext,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(text: &'a str, sc: &'a SharedStaticContext) -> ParseResult<Self> {
        Ok(Self {
            t: Tokenizer::new(text)?,
            sc,
        })
    }

    fn make<N: XmlNode>(&self, kind: ExprKind<N>) -> Expr<N> {
        Expr::with_static_context(kind, Some(self.sc.clone()))
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.t.expression(), message).at(position)
    }

    fn static_error(&self, e: &StaticError) -> SyntaxError {
        self.t.error(e.to_string())
    }

    fn kind(&self) -> TokenKind {
        self.t.kind()
    }

    fn text(&self) -> compact_str::CompactString {
        self.t.current().text.clone()
    }

    fn expect(&self, kind: TokenKind) -> ParseResult<()> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(self.t.error(format!(
                "expected \"{}\", found {}",
                kind.describe(),
                self.t.current().display()
            )))
        }
    }

    fn consume(&mut self, kind: TokenKind) -> ParseResult<()> {
        self.expect(kind)?;
        self.t.next()
    }

    fn require_node_set<N: XmlNode>(&self, e: &Expr<N>, what: &str) -> ParseResult<()> {
        match e.data_type() {
            DataType::NodeSet | DataType::Any => Ok(()),
            other => Err(self.t.error(format!(
                "{what} requires a node-set, found a {}",
                other.as_str()
            ))),
        }
    }

    /// A whole expression, rejecting trailing tokens.
    pub(crate) fn parse_complete<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let e = self.parse_expr()?;
        if self.kind() != TokenKind::Eof {
            return Err(self.t.error(format!(
                "Unexpected token {} beyond end of expression",
                self.t.current().display()
            )));
        }
        Ok(e)
    }

    fn parse_expr<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        self.parse_or()
    }

    fn parse_or<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_and()?;
        while self.kind() == TokenKind::Or {
            self.t.next()?;
            let rhs = self.parse_and()?;
            e = self.make(ExprKind::Boolean {
                op: BooleanOp::Or,
                lhs: e,
                rhs,
            });
        }
        Ok(e)
    }

    fn parse_and<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_equality()?;
        while self.kind() == TokenKind::And {
            self.t.next()?;
            let rhs = self.parse_equality()?;
            e = self.make(ExprKind::Boolean {
                op: BooleanOp::And,
                lhs: e,
                rhs,
            });
        }
        Ok(e)
    }

    fn parse_equality<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_relational()?;
        loop {
            let op = match self.kind() {
                TokenKind::Equals => CompareOp::Eq,
                TokenKind::NotEquals => CompareOp::Ne,
                _ => return Ok(e),
            };
            self.t.next()?;
            let rhs = self.parse_relational()?;
            e = self.make(ExprKind::Relational { op, lhs: e, rhs });
        }
    }

    fn parse_relational<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => CompareOp::Lt,
                TokenKind::Le => CompareOp::Le,
                TokenKind::Gt => CompareOp::Gt,
                TokenKind::Ge => CompareOp::Ge,
                _ => return Ok(e),
            };
            self.t.next()?;
            let rhs = self.parse_additive()?;
            e = self.make(ExprKind::Relational { op, lhs: e, rhs });
        }
    }

    fn parse_additive<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => ArithmeticOp::Plus,
                TokenKind::Minus => ArithmeticOp::Minus,
                _ => return Ok(e),
            };
            self.t.next()?;
            let rhs = self.parse_multiplicative()?;
            e = self.make(ExprKind::Arithmetic { op, lhs: e, rhs });
        }
    }

    fn parse_multiplicative<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Multiply => ArithmeticOp::Multiply,
                TokenKind::Div => ArithmeticOp::Div,
                TokenKind::Mod => ArithmeticOp::Mod,
                _ => return Ok(e),
            };
            self.t.next()?;
            let rhs = self.parse_unary()?;
            e = self.make(ExprKind::Arithmetic { op, lhs: e, rhs });
        }
    }

    fn parse_unary<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        if self.kind() == TokenKind::Minus {
            self.t.next()?;
            let operand = self.parse_unary()?;
            return Ok(self.make(ExprKind::Negate(operand)));
        }
        self.parse_union()
    }

    fn parse_union<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_path()?;
        while self.kind() == TokenKind::Union {
            self.require_node_set(&e, "Union operator")?;
            self.t.next()?;
            let rhs = self.parse_path()?;
            self.require_node_set(&rhs, "Union operator")?;
            e = self.make(ExprKind::SetOperation {
                op: SetOperator::Union,
                lhs: e,
                rhs,
            });
        }
        Ok(e)
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Name
                | TokenKind::PrefixWildcard
                | TokenKind::Star
                | TokenKind::Axis
                | TokenKind::NodeType
                | TokenKind::At
                | TokenKind::Dot
                | TokenKind::DotDot
        )
    }

    fn descendant_or_self<N: XmlNode>() -> Step<N> {
        Step::new(Axis::DescendantOrSelf, NodeTest::AnyNode)
    }

    fn parse_path<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        match self.kind() {
            TokenKind::Slash => {
                self.t.next()?;
                let root = self.make(ExprKind::Root);
                if !self.at_step_start() {
                    return Ok(root);
                }
                let step = self.parse_step()?;
                let e = self.make(ExprKind::Path { start: root, step });
                self.continue_path(e)
            }
            TokenKind::SlashSlash => {
                self.t.next()?;
                let start = self.make(ExprKind::Path {
                    start: self.make(ExprKind::Root),
                    step: Self::descendant_or_self(),
                });
                let step = self.parse_step()?;
                let e = self.make(ExprKind::Path { start, step });
                self.continue_path(e)
            }
            _ if self.at_step_start() => {
                let e = match self.kind() {
                    TokenKind::Dot => {
                        self.t.next()?;
                        self.make(ExprKind::ContextNode)
                    }
                    TokenKind::DotDot => {
                        self.t.next()?;
                        self.make(ExprKind::ParentNode)
                    }
                    _ => {
                        let step = self.parse_step()?;
                        self.make(ExprKind::Path {
                            start: self.make(ExprKind::ContextNode),
                            step,
                        })
                    }
                };
                self.continue_path(e)
            }
            _ => {
                let e = self.parse_filter_expr()?;
                if matches!(self.kind(), TokenKind::Slash | TokenKind::SlashSlash) {
                    self.require_node_set(&e, "A path expression")?;
                    return self.continue_path(e);
                }
                Ok(e)
            }
        }
    }

    /// Further `/step` and `//step` parts after `start`.
    fn continue_path<N: XmlNode>(&mut self, mut e: Expr<N>) -> ParseResult<Expr<N>> {
        loop {
            match self.kind() {
                TokenKind::Slash => {
                    self.t.next()?;
                }
                TokenKind::SlashSlash => {
                    self.t.next()?;
                    e = self.make(ExprKind::Path {
                        start: e,
                        step: Self::descendant_or_self(),
                    });
                }
                _ => return Ok(e),
            }
            let step = self.parse_step()?;
            e = self.make(ExprKind::Path { start: e, step });
        }
    }

    fn parse_step<N: XmlNode>(&mut self) -> ParseResult<Step<N>> {
        match self.kind() {
            TokenKind::Dot => {
                self.t.next()?;
                return Ok(Step::new(Axis::SelfAxis, NodeTest::AnyNode));
            }
            TokenKind::DotDot => {
                self.t.next()?;
                return Ok(Step::new(Axis::Parent, NodeTest::AnyNode));
            }
            _ => {}
        }
        let axis = match self.kind() {
            TokenKind::At => {
                self.t.next()?;
                if !self.at_node_test() {
                    return Err(self.t.error("@ must be followed by a NameTest or NodeTest"));
                }
                Axis::Attribute
            }
            TokenKind::Axis => {
                let name = self.text();
                let axis = Axis::from_name(&name)
                    .ok_or_else(|| self.t.error(format!("Unknown axis name: {name}")))?;
                self.t.next()?;
                if !self.at_node_test() {
                    return Err(self.t.error(format!(
                        "Unexpected token [{}] after axis name",
                        self.t.current().display()
                    )));
                }
                axis
            }
            _ if self.at_node_test() => Axis::Child,
            _ => {
                return Err(self.t.error(format!(
                    "Unexpected token [{}] in path expression",
                    self.t.current().display()
                )));
            }
        };
        let mut step = Step::new(axis, self.parse_node_test(axis)?);
        while self.kind() == TokenKind::LSquare {
            self.t.next()?;
            let predicate = self.parse_expr()?;
            self.consume(TokenKind::RSquare)?;
            step.filters.push(predicate);
        }
        Ok(step)
    }

    fn at_node_test(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Name | TokenKind::PrefixWildcard | TokenKind::Star | TokenKind::NodeType
        )
    }

    /// The node test at the current token, for a step along `axis`.
    fn parse_node_test(&mut self, axis: Axis) -> ParseResult<NodeTest> {
        let principal = axis.principal_node_kind();
        let test = match self.kind() {
            TokenKind::Name => {
                let name = self.resolve_name(&self.text())?;
                self.t.next()?;
                NodeTest::Name {
                    kind: principal,
                    name,
                }
            }
            TokenKind::PrefixWildcard => {
                let uri = self
                    .sc
                    .uri_for_prefix(&self.text())
                    .map_err(|e| self.static_error(&e))?;
                self.t.next()?;
                NodeTest::Namespace {
                    kind: principal,
                    uri: DefaultAtom::from(uri),
                }
            }
            TokenKind::Star => {
                self.t.next()?;
                NodeTest::Kind(principal)
            }
            TokenKind::NodeType => {
                let node_type = self.text();
                self.t.next()?;
                let test = match node_type.as_str() {
                    "node" => NodeTest::AnyNode,
                    "text" => NodeTest::Kind(NodeKind::Text),
                    "comment" => NodeTest::Kind(NodeKind::Comment),
                    _ if self.kind() == TokenKind::Literal => {
                        let target = self.text();
                        self.t.next()?;
                        if is_ncname(&target) {
                            NodeTest::Name {
                                kind: NodeKind::ProcessingInstruction,
                                name: ExpandedName::local(&target),
                            }
                        } else {
                            NodeTest::NoNode
                        }
                    }
                    _ => NodeTest::Kind(NodeKind::ProcessingInstruction),
                };
                self.consume(TokenKind::RParen)?;
                // Only attributes live on the attribute axis, only namespace
                // nodes on the namespace axis.
                match (axis, &test) {
                    (_, NodeTest::AnyNode) => test,
                    (Axis::Attribute | Axis::Namespace, _) => NodeTest::NoNode,
                    _ => test,
                }
            }
            _ => {
                return Err(self.t.error(format!(
                    "Unexpected token {} in path expression",
                    self.t.current().display()
                )));
            }
        };
        Ok(test)
    }

    fn resolve_name(&self, qname: &str) -> ParseResult<ExpandedName> {
        self.sc.make_name(qname).map_err(|e| self.static_error(&e))
    }

    fn parse_filter_expr<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let mut e = self.parse_primary()?;
        while self.kind() == TokenKind::LSquare {
            self.require_node_set(&e, "A predicate")?;
            self.t.next()?;
            let predicate = self.parse_expr()?;
            self.consume(TokenKind::RSquare)?;
            e = self.make(ExprKind::Filter { base: e, predicate });
        }
        Ok(e)
    }

    fn parse_primary<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        match self.kind() {
            TokenKind::Dollar => {
                self.t.next()?;
                self.expect(TokenKind::Name)?;
                let name = self.resolve_name(&self.text())?;
                let binding = self
                    .sc
                    .bind_variable(&name)
                    .map_err(|e| self.static_error(&e))?;
                self.t.next()?;
                Ok(self.make(ExprKind::VariableRef(binding)))
            }
            TokenKind::LParen => {
                self.t.next()?;
                let e = self.parse_expr()?;
                self.consume(TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::Literal => {
                let s = self.text();
                self.t.next()?;
                Ok(self.make(ExprKind::Value(Value::String(s))))
            }
            TokenKind::Number => {
                let n = string_to_number(&self.text());
                self.t.next()?;
                Ok(self.make(ExprKind::Value(Value::Number(n))))
            }
            TokenKind::Function => self.parse_function_call(),
            _ => Err(self.t.error(format!(
                "Unexpected token {} in expression",
                self.t.current().display()
            ))),
        }
    }

    fn parse_arguments<N: XmlNode>(&mut self) -> ParseResult<Vec<Expr<N>>> {
        let mut args = Vec::new();
        if self.kind() != TokenKind::RParen {
            args.push(self.parse_expr()?);
            while self.kind() == TokenKind::Comma {
                self.t.next()?;
                args.push(self.parse_expr()?);
            }
        }
        self.consume(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_function_call<N: XmlNode>(&mut self) -> ParseResult<Expr<N>> {
        let qname = self.text();
        let position = self.t.current().position;
        self.t.next()?;
        let args = self.parse_arguments()?;
        let (prefix, local) = split_qname(&qname);
        if prefix.is_empty() {
            return self.system_call(local, args, position);
        }
        let uri = self
            .sc
            .uri_for_prefix(prefix)
            .map_err(|e| self.error_at(position, e.to_string()))?;
        if uri == EXSLT_SETS_NAMESPACE {
            return self.set_call(local, args, position);
        }
        let name = ExpandedName::new(Some(&uri), local);
        if self.sc.is_extension_namespace(&uri) || self.sc.is_function_available(&name) {
            return Ok(self.make(ExprKind::ExtensionCall { name, args }));
        }
        debug!(function = %qname, "unknown function deferred to evaluation");
        Ok(self.make(ExprKind::Error(EvaluationError::function(format!(
            "The URI {uri} does not identify an available function library ({qname})"
        )))))
    }

    fn system_call<N: XmlNode>(
        &self,
        local: &str,
        args: Vec<Expr<N>>,
        position: usize,
    ) -> ParseResult<Expr<N>> {
        let function = SystemFunction::from_name(local)
            .ok_or_else(|| self.error_at(position, format!("Unknown system function: {local}")))?;
        function
            .check_arity(args.len())
            .map_err(|m| self.error_at(position, m))?;
        match function {
            SystemFunction::Current => Ok(self.make(ExprKind::CurrentNode)),
            SystemFunction::Key if !self.sc.allows_key_function() => Err(self.error_at(
                position,
                "The key() function is not available in this context",
            )),
            _ => Ok(self.make(ExprKind::FunctionCall {
                function,
                args,
                bound: None,
            })),
        }
    }

    /// Functions of the EXSLT sets namespace. The pure set algebra maps onto
    /// the native set operations.
    fn set_call<N: XmlNode>(
        &self,
        local: &str,
        mut args: Vec<Expr<N>>,
        position: usize,
    ) -> ParseResult<Expr<N>> {
        let op = match local {
            "intersection" => Some(SetOperator::Intersect),
            "difference" => Some(SetOperator::Except),
            _ => None,
        };
        if let Some(op) = op {
            for a in &args {
                self.require_node_set(a, &format!("set:{local}"))?;
            }
            let mut operands = args.into_iter();
            return match (operands.next(), operands.next(), operands.next()) {
                (Some(lhs), Some(rhs), None) => Ok(self.make(ExprKind::SetOperation { op, lhs, rhs })),
                _ => Err(self.error_at(
                    position,
                    format!("Function set:{local} must have 2 arguments"),
                )),
            };
        }
        if local == "distinct" {
            if args.is_empty() || args.len() > 2 {
                return Err(self.error_at(
                    position,
                    "Function set:distinct must have 1 or 2 arguments",
                ));
            }
            let key = (args.len() == 2).then(|| args.pop()).flatten();
            let base = args.remove(0);
            self.require_node_set(&base, "set:distinct")?;
            return Ok(self.make(ExprKind::Distinct { base, key }));
        }
        let function = SystemFunction::from_exslt_set(local).ok_or_else(|| {
            self.error_at(position, format!("Unknown function set:{local}"))
        })?;
        function
            .check_arity(args.len())
            .map_err(|m| self.error_at(position, m))?;
        Ok(self.make(ExprKind::FunctionCall {
            function,
            args,
            bound: None,
        }))
    }

    /// A whole pattern, rejecting trailing tokens.
    pub(crate) fn parse_pattern_complete<N: XmlNode>(&mut self) -> ParseResult<Pattern<N>> {
        let mut p = self.parse_path_pattern()?;
        while self.kind() == TokenKind::Union {
            self.t.next()?;
            let rhs = self.parse_path_pattern()?;
            p = Pattern::Union(Box::new(p), Box::new(rhs));
        }
        if self.kind() != TokenKind::Eof {
            return Err(self.t.error(format!(
                "Unexpected token {} beyond end of pattern",
                self.t.current().display()
            )));
        }
        Ok(p)
    }

    fn connector(&self) -> Option<Connector> {
        match self.kind() {
            TokenKind::Slash => Some(Connector::Parent),
            TokenKind::SlashSlash => Some(Connector::Ancestor),
            _ => None,
        }
    }

    fn parse_path_pattern<N: XmlNode>(&mut self) -> ParseResult<Pattern<N>> {
        let mut upper: Option<(Connector, Pattern<N>)> = None;
        match self.kind() {
            TokenKind::Slash => {
                self.t.next()?;
                if !self.at_node_test() && !matches!(self.kind(), TokenKind::At | TokenKind::Axis) {
                    return Ok(Pattern::Document);
                }
                upper = Some((Connector::Parent, Pattern::Document));
            }
            TokenKind::SlashSlash => {
                self.t.next()?;
                upper = Some((Connector::Ancestor, Pattern::Document));
            }
            TokenKind::Function => {
                let start = self.parse_id_or_key()?;
                let Some(c) = self.connector() else {
                    return Ok(start);
                };
                self.t.next()?;
                upper = Some((c, start));
            }
            _ => {}
        }
        loop {
            let axis = match self.kind() {
                TokenKind::Axis => {
                    let axis = match self.text().as_str() {
                        "child" => Axis::Child,
                        "attribute" => Axis::Attribute,
                        _ => return Err(self.t.error("Axis in pattern must be child or attribute")),
                    };
                    self.t.next()?;
                    axis
                }
                TokenKind::At => {
                    self.t.next()?;
                    if !self.at_node_test() {
                        return Err(self.t.error("@ in pattern not followed by NameTest or NodeTest"));
                    }
                    Axis::Attribute
                }
                _ if self.at_node_test() => Axis::Child,
                TokenKind::Function => {
                    return Err(self.t.error("Function may appear only at the start of a pattern"));
                }
                _ => {
                    return Err(self.t.error(format!(
                        "Unexpected token in pattern, found {}",
                        self.t.current().display()
                    )));
                }
            };
            if !self.at_node_test() {
                return Err(self.t.error(format!(
                    "Unexpected token in pattern, found {}",
                    self.t.current().display()
                )));
            }
            let test = match self.parse_node_test(axis)? {
                NodeTest::AnyNode if axis == Axis::Attribute => NodeTest::Kind(NodeKind::Attribute),
                NodeTest::AnyNode => NodeTest::AnyChildNode,
                other => other,
            };
            let filters = self.parse_pattern_filters()?;
            let step = LocationPattern::build(axis, test, filters, upper.take());
            match self.connector() {
                Some(c) => {
                    self.t.next()?;
                    upper = Some((c, step));
                }
                None => return Ok(step),
            }
        }
    }

    fn parse_pattern_filters<N: XmlNode>(&mut self) -> ParseResult<Vec<Expr<N>>> {
        let mut filters = Vec::new();
        while self.kind() == TokenKind::LSquare {
            self.t.next()?;
            let predicate = self.parse_expr()?.simplify();
            self.consume(TokenKind::RSquare)?;
            if predicate.dependencies().contains(Dependencies::CURRENT_NODE) {
                return Err(self.t.error("The current() function may not be used in a pattern"));
            }
            filters.push(predicate);
        }
        Ok(filters)
    }

    fn parse_id_or_key<N: XmlNode>(&mut self) -> ParseResult<Pattern<N>> {
        let function = self.text();
        self.t.next()?;
        match function.as_str() {
            "id" => {
                self.expect(TokenKind::Literal)?;
                let ids = self.text();
                self.t.next()?;
                self.consume(TokenKind::RParen)?;
                Ok(Pattern::Id(ids))
            }
            "key" => {
                self.expect(TokenKind::Literal)?;
                let key_name = self.text();
                self.t.next()?;
                self.consume(TokenKind::Comma)?;
                self.expect(TokenKind::Literal)?;
                if !self.sc.allows_key_function() {
                    return Err(self.t.error("key() function cannot be used here"));
                }
                let value = self.text();
                let name = self.resolve_name(&key_name)?;
                self.t.next()?;
                self.consume(TokenKind::RParen)?;
                Ok(Pattern::Key { name, value })
            }
            _ => Err(self
                .t
                .error("The only functions allowed in a pattern are id() and key()")),
        }
    }
}

impl<N: XmlNode> Expr<N> {
    /// Parse and simplify an expression.
    ///
    /// In forwards-compatible mode a syntax error does not fail the call: the
    /// result is an expression that raises the error when evaluated.
    pub fn parse(text: &str, static_context: &SharedStaticContext) -> Result<Expr<N>, SyntaxError> {
        match Parser::new(text, static_context).and_then(|mut p| p.parse_complete()) {
            Ok(e) => {
                let e = e.simplify();
                debug!(expression = text, compiled = %e, "compiled expression");
                Ok(e)
            }
            Err(err) if static_context.forwards_compatible() => {
                debug!(error = %err, "syntax error deferred in forwards-compatible mode");
                Ok(Expr::with_static_context(
                    ExprKind::Error(err.into()),
                    Some(static_context.clone()),
                ))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StandaloneContext;
    use crate::simple_node::SimpleNode;

    fn parse(text: &str) -> Result<Expr<SimpleNode>, SyntaxError> {
        let sc = StandaloneContext::builder()
            .with_namespace("p", "urn:p")
            .build()
            .shared();
        Expr::parse(text, &sc)
    }

    #[test]
    fn abbreviations_expand() {
        let e = parse("//a").unwrap();
        let ExprKind::Path { start, step } = e.kind() else {
            panic!("expected a path, got {e}");
        };
        assert!(matches!(start.kind(), ExprKind::Root));
        assert_eq!(step.axis, Axis::Descendant);
        assert!(matches!(parse("@id").unwrap().kind(), ExprKind::AttributeReference(_)));
        assert!(matches!(parse(".").unwrap().kind(), ExprKind::ContextNode));
        assert!(matches!(parse("..").unwrap().kind(), ExprKind::ParentNode));
        assert!(matches!(parse("/").unwrap().kind(), ExprKind::Root));
    }

    #[test]
    fn operator_precedence() {
        let e = parse("1 + 2 * 3 = 7 and not(false())").unwrap();
        assert!(matches!(e.as_value(), Some(Value::Boolean(true))));
        let e = parse("-2 - -3").unwrap();
        assert!(matches!(e.as_value(), Some(Value::Number(n)) if *n == 1.0));
    }

    #[test]
    fn errors_name_the_expression() {
        let err = parse("count()").unwrap_err();
        assert_eq!(err.message, "Function count must have 1 argument");
        assert_eq!(err.to_string(), "Error in expression count(): Function count must have 1 argument");
        assert_eq!(parse("foo(1)").unwrap_err().message, "Unknown system function: foo");
        assert!(parse("a/").is_err());
        assert!(parse("q:a").unwrap_err().message.contains("Prefix q"));
        assert!(parse("1 | a").unwrap_err().message.contains("requires a node-set"));
        assert!(parse("key('k', 'v')").is_err());
    }

    #[test]
    fn unknown_namespaces_defer_the_error() {
        let e = parse("p:thing(1)").unwrap();
        assert!(matches!(e.kind(), ExprKind::Error(_)));
    }

    #[test]
    fn set_functions_use_native_operators() {
        let sc = StandaloneContext::builder()
            .with_namespace("set", EXSLT_SETS_NAMESPACE)
            .build()
            .shared();
        let e: Expr<SimpleNode> = Expr::parse("set:difference(a, b)", &sc).unwrap();
        assert!(matches!(
            e.kind(),
            ExprKind::SetOperation {
                op: SetOperator::Except,
                ..
            }
        ));
        let e: Expr<SimpleNode> = Expr::parse("set:distinct(a)", &sc).unwrap();
        assert!(matches!(e.kind(), ExprKind::Distinct { key: None, .. }));
        assert!(Expr::<SimpleNode>::parse("set:leading(a)", &sc).is_err());
    }

    #[test]
    fn forwards_compatible_mode_defers_syntax_errors() {
        let sc = StandaloneContext::builder()
            .with_forwards_compatible(true)
            .build()
            .shared();
        let e: Expr<SimpleNode> = Expr::parse("1 +", &sc).unwrap();
        let ExprKind::Error(err) = e.kind() else {
            panic!("expected a placeholder, got {e}");
        };
        assert_eq!(err.kind, crate::error::EvaluationErrorKind::Deferred);
    }
}
