//! One-token-lookahead lexer for XPath expressions and patterns.

use compact_str::CompactString;
use pest::Parser;

use crate::axis::Axis;
use crate::error::SyntaxError;

#[derive(pest_derive::Parser)]
#[grammar = "xpath1.pest"]
struct XPathLexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Literal,
    Number,
    Name,
    /// `prefix:*`; the token text is the prefix.
    PrefixWildcard,
    /// A name followed by `(`; the parenthesis is part of the token.
    Function,
    /// `node(`, `text(`, `comment(` or `processing-instruction(`.
    NodeType,
    /// An axis name followed by `::`.
    Axis,
    Slash,
    SlashSlash,
    Union,
    Equals,
    NotEquals,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Multiply,
    Div,
    Mod,
    And,
    Or,
    LParen,
    RParen,
    LSquare,
    RSquare,
    Comma,
    Dollar,
    At,
    /// `*` as a name test.
    Star,
    Dot,
    DotDot,
}

impl TokenKind {
    /// True for tokens after which `*` and `and`/`or`/`div`/`mod` are operators.
    fn ends_operand(self) -> bool {
        matches!(
            self,
            TokenKind::Literal
                | TokenKind::Number
                | TokenKind::Name
                | TokenKind::PrefixWildcard
                | TokenKind::Star
                | TokenKind::RParen
                | TokenKind::RSquare
                | TokenKind::Dot
                | TokenKind::DotDot
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "<end of expression>",
            TokenKind::Literal => "<literal>",
            TokenKind::Number => "<number>",
            TokenKind::Name => "<name>",
            TokenKind::PrefixWildcard => "<prefix:*>",
            TokenKind::Function => "<function>(",
            TokenKind::NodeType => "<node-type>()",
            TokenKind::Axis => "<axis>::",
            TokenKind::Slash => "/",
            TokenKind::SlashSlash => "//",
            TokenKind::Union => "|",
            TokenKind::Equals => "=",
            TokenKind::NotEquals => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Multiply => "*",
            TokenKind::Div => "div",
            TokenKind::Mod => "mod",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LSquare => "[",
            TokenKind::RSquare => "]",
            TokenKind::Comma => ",",
            TokenKind::Dollar => "$",
            TokenKind::At => "@",
            TokenKind::Star => "*",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal content without quotes, the lexical name, or the operator text.
    pub text: CompactString,
    /// Byte offset of the token in the expression.
    pub position: usize,
}

impl Token {
    /// Text to show in error messages.
    pub fn display(&self) -> String {
        match self.kind {
            TokenKind::Eof => "<eof>".to_string(),
            TokenKind::Literal => format!("\"{}\"", self.text),
            TokenKind::Function | TokenKind::NodeType => format!("{}(", self.text),
            TokenKind::Axis => format!("{}::", self.text),
            TokenKind::PrefixWildcard => format!("{}:*", self.text),
            _ => self.text.to_string(),
        }
    }
}

pub struct Tokenizer<'a> {
    input: &'a str,
    offset: usize,
    current: Token,
    previous: Option<TokenKind>,
}

impl<'a> Tokenizer<'a> {
    /// Prepare to read `input` and lex the first token.
    pub fn new(input: &'a str) -> Result<Self, SyntaxError> {
        let mut t = Self {
            input,
            offset: 0,
            current: Token {
                kind: TokenKind::Eof,
                text: CompactString::default(),
                position: 0,
            },
            previous: None,
        };
        t.next()?;
        Ok(t)
    }

    pub fn expression(&self) -> &'a str {
        self.input
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn kind(&self) -> TokenKind {
        self.current.kind
    }

    /// Unconsumed text after the current token.
    pub fn remainder(&self) -> &'a str {
        &self.input[self.offset..]
    }

    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.input, message).at(self.current.position)
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.offset..];
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        self.offset += rest.len() - trimmed.len();
    }

    fn peek_char_after_whitespace(&self) -> (usize, Option<char>) {
        let rest = &self.input[self.offset..];
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        (rest.len() - trimmed.len(), trimmed.chars().next())
    }

    /// Advance to the next token.
    pub fn next(&mut self) -> Result<(), SyntaxError> {
        if self.current.kind != TokenKind::Eof || self.previous.is_some() {
            self.previous = Some(self.current.kind);
        }
        self.skip_whitespace();
        let start = self.offset;
        if start >= self.input.len() {
            self.current = Token {
                kind: TokenKind::Eof,
                text: CompactString::default(),
                position: start,
            };
            return Ok(());
        }
        let input = self.input;
        let rest = &input[start..];
        let mut pairs = XPathLexer::parse(Rule::lexeme, rest).map_err(|_| {
            let c = rest.chars().next().unwrap_or(' ');
            SyntaxError::new(input, format!("Unexpected character '{c}' in expression"))
                .at(start)
        })?;
        let Some(lexeme) = pairs.next().and_then(|p| p.into_inner().next()) else {
            return Err(SyntaxError::new(self.input, "Unexpected end of lexical input").at(start));
        };
        let len = lexeme.as_str().len();
        self.offset = start + len;
        let operator_context = self.previous.is_some_and(TokenKind::ends_operand);

        let (kind, text): (TokenKind, CompactString) = match lexeme.as_rule() {
            Rule::literal => {
                let inner = lexeme.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
                (TokenKind::Literal, inner.into())
            }
            Rule::open_literal => {
                return Err(SyntaxError::new(self.input, "Unmatched quote in expression").at(start));
            }
            Rule::number => (TokenKind::Number, lexeme.as_str().into()),
            Rule::prefix_wildcard => {
                let prefix = lexeme.as_str().trim_end_matches(":*");
                (TokenKind::PrefixWildcard, prefix.into())
            }
            Rule::qname => {
                let name = lexeme.as_str();
                self.classify_name(name, operator_context, start)?
            }
            Rule::symbol => {
                let s = lexeme.as_str();
                let kind = match s {
                    "//" => TokenKind::SlashSlash,
                    "/" => TokenKind::Slash,
                    "|" => TokenKind::Union,
                    "!=" => TokenKind::NotEquals,
                    "<=" => TokenKind::Le,
                    ">=" => TokenKind::Ge,
                    "=" => TokenKind::Equals,
                    "<" => TokenKind::Lt,
                    ">" => TokenKind::Gt,
                    "+" => TokenKind::Plus,
                    "-" => TokenKind::Minus,
                    "*" if operator_context => TokenKind::Multiply,
                    "*" => TokenKind::Star,
                    "(" => TokenKind::LParen,
                    ")" => TokenKind::RParen,
                    "[" => TokenKind::LSquare,
                    "]" => TokenKind::RSquare,
                    "," => TokenKind::Comma,
                    "$" => TokenKind::Dollar,
                    "@" => TokenKind::At,
                    ".." => TokenKind::DotDot,
                    "." => TokenKind::Dot,
                    _ => {
                        return Err(SyntaxError::new(
                            self.input,
                            format!("Unexpected token {s} in expression"),
                        )
                        .at(start));
                    }
                };
                (kind, s.into())
            }
            _ => {
                return Err(SyntaxError::new(self.input, "Unrecognized token").at(start));
            }
        };
        self.current = Token {
            kind,
            text,
            position: start,
        };
        Ok(())
    }

    fn classify_name(
        &mut self,
        name: &str,
        operator_context: bool,
        start: usize,
    ) -> Result<(TokenKind, CompactString), SyntaxError> {
        if operator_context {
            let op = match name {
                "and" => Some(TokenKind::And),
                "or" => Some(TokenKind::Or),
                "div" => Some(TokenKind::Div),
                "mod" => Some(TokenKind::Mod),
                _ => None,
            };
            if let Some(op) = op {
                return Ok((op, name.into()));
            }
        }
        let (skip, next) = self.peek_char_after_whitespace();
        match next {
            Some('(') => {
                self.offset += skip + 1;
                let kind = if matches!(name, "node" | "text" | "comment" | "processing-instruction") {
                    TokenKind::NodeType
                } else {
                    TokenKind::Function
                };
                Ok((kind, name.into()))
            }
            Some(':') if !name.contains(':') && self.input[self.offset + skip..].starts_with("::") => {
                if Axis::from_name(name).is_none() {
                    return Err(
                        SyntaxError::new(self.input, format!("Unknown axis name: {name}")).at(start)
                    );
                }
                self.offset += skip + 2;
                Ok((TokenKind::Axis, name.into()))
            }
            _ => Ok((TokenKind::Name, name.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(s: &str) -> Vec<TokenKind> {
        let mut t = Tokenizer::new(s).unwrap();
        let mut out = Vec::new();
        while t.kind() != TokenKind::Eof {
            out.push(t.kind());
            t.next().unwrap();
        }
        out
    }

    #[test]
    fn star_and_operator_names_depend_on_position() {
        use TokenKind::*;
        assert_eq!(kinds("* * *"), [Star, Multiply, Star]);
        assert_eq!(kinds("div div div"), [Name, Div, Name]);
        assert_eq!(kinds("and and or"), [Name, And, Name]);
        assert_eq!(kinds("@*"), [At, Star]);
    }

    #[test]
    fn functions_axes_and_node_types() {
        use TokenKind::*;
        assert_eq!(
            kinds("child::text() | count (x)"),
            [Axis, NodeType, RParen, Union, Function, Name, RParen]
        );
        assert_eq!(kinds("p:* | p:x"), [PrefixWildcard, Union, Name]);
    }

    #[test]
    fn literals_and_numbers() {
        let mut t = Tokenizer::new("'a\"b' .5 12.").unwrap();
        assert_eq!(t.current().text, "a\"b");
        t.next().unwrap();
        assert_eq!((t.kind(), t.current().text.as_str()), (TokenKind::Number, ".5"));
        t.next().unwrap();
        assert_eq!(t.current().text, "12.");
    }

    #[test]
    fn lexical_errors_carry_position() {
        let err = Tokenizer::new("a = 'open").and_then(|mut t| {
            t.next()?;
            t.next()
        });
        let err = err.unwrap_err();
        assert_eq!(err.position, Some(4));
        assert!(Tokenizer::new("foo::x").is_err());
        assert!(Tokenizer::new("#").is_err());
    }
}
