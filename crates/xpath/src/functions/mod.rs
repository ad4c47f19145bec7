//! System functions and the host function library.
//!
//! System functions are a closed set known to the parser, which checks their
//! arity once. Host functions live in a [`FunctionLibrary`] on the
//! controller and are looked up by expanded name and arity at call time.

pub mod format_number;
mod nodes;
mod numeric;
pub(crate) mod strings;

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{Context, SharedStaticContext};
use crate::error::{EvaluationError, Result};
use crate::expr::{Dependencies, Expr};
use crate::model::XmlNode;
use crate::names::{EXSLT_SETS_NAMESPACE, ExpandedName};
use crate::value::{DataType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemFunction {
    Last,
    Position,
    Count,
    Current,
    Id,
    Key,
    Document,
    LocalName,
    NamespaceUri,
    Name,
    GenerateId,
    Not,
    True,
    False,
    Boolean,
    Lang,
    Number,
    Floor,
    Ceiling,
    Round,
    Sum,
    String,
    StartsWith,
    StringLength,
    Substring,
    Contains,
    SubstringBefore,
    SubstringAfter,
    NormalizeSpace,
    Translate,
    Concat,
    FormatNumber,
    SystemProperty,
    FunctionAvailable,
    ElementAvailable,
    UnparsedEntityUri,
    /// `set:has-same-node`
    HasSameNode,
    /// `set:leading`
    Leading,
    /// `set:trailing`
    Trailing,
}

struct Signature {
    function: SystemFunction,
    name: &'static str,
    min: usize,
    max: Option<usize>,
    result: DataType,
}

const fn sig(
    function: SystemFunction,
    name: &'static str,
    min: usize,
    max: Option<usize>,
    result: DataType,
) -> Signature {
    Signature {
        function,
        name,
        min,
        max,
        result,
    }
}

use SystemFunction as F;

static CORE: &[Signature] = &[
    sig(F::Last, "last", 0, Some(0), DataType::Number),
    sig(F::Position, "position", 0, Some(0), DataType::Number),
    sig(F::Count, "count", 1, Some(1), DataType::Number),
    sig(F::Current, "current", 0, Some(0), DataType::NodeSet),
    sig(F::Id, "id", 1, Some(1), DataType::NodeSet),
    sig(F::Key, "key", 2, Some(2), DataType::NodeSet),
    sig(F::Document, "document", 1, Some(2), DataType::NodeSet),
    sig(F::LocalName, "local-name", 0, Some(1), DataType::String),
    sig(F::NamespaceUri, "namespace-uri", 0, Some(1), DataType::String),
    sig(F::Name, "name", 0, Some(1), DataType::String),
    sig(F::GenerateId, "generate-id", 0, Some(1), DataType::String),
    sig(F::Not, "not", 1, Some(1), DataType::Boolean),
    sig(F::True, "true", 0, Some(0), DataType::Boolean),
    sig(F::False, "false", 0, Some(0), DataType::Boolean),
    sig(F::Boolean, "boolean", 1, Some(1), DataType::Boolean),
    sig(F::Lang, "lang", 1, Some(1), DataType::Boolean),
    sig(F::Number, "number", 0, Some(1), DataType::Number),
    sig(F::Floor, "floor", 1, Some(1), DataType::Number),
    sig(F::Ceiling, "ceiling", 1, Some(1), DataType::Number),
    sig(F::Round, "round", 1, Some(1), DataType::Number),
    sig(F::Sum, "sum", 1, Some(1), DataType::Number),
    sig(F::String, "string", 0, Some(1), DataType::String),
    sig(F::StartsWith, "starts-with", 2, Some(2), DataType::Boolean),
    sig(F::StringLength, "string-length", 0, Some(1), DataType::Number),
    sig(F::Substring, "substring", 2, Some(3), DataType::String),
    sig(F::Contains, "contains", 2, Some(2), DataType::Boolean),
    sig(F::SubstringBefore, "substring-before", 2, Some(2), DataType::String),
    sig(F::SubstringAfter, "substring-after", 2, Some(2), DataType::String),
    sig(F::NormalizeSpace, "normalize-space", 0, Some(1), DataType::String),
    sig(F::Translate, "translate", 3, Some(3), DataType::String),
    sig(F::Concat, "concat", 2, None, DataType::String),
    sig(F::FormatNumber, "format-number", 2, Some(3), DataType::String),
    sig(F::SystemProperty, "system-property", 1, Some(1), DataType::Any),
    sig(F::FunctionAvailable, "function-available", 1, Some(1), DataType::Boolean),
    sig(F::ElementAvailable, "element-available", 1, Some(1), DataType::Boolean),
    sig(F::UnparsedEntityUri, "unparsed-entity-uri", 1, Some(1), DataType::String),
];

static EXSLT_SETS: &[Signature] = &[
    sig(F::HasSameNode, "has-same-node", 2, Some(2), DataType::Boolean),
    sig(F::Leading, "leading", 2, Some(2), DataType::NodeSet),
    sig(F::Trailing, "trailing", 2, Some(2), DataType::NodeSet),
];

impl SystemFunction {
    /// Core XPath/XSLT function with this unprefixed name.
    pub fn from_name(local: &str) -> Option<SystemFunction> {
        CORE.iter().find(|s| s.name == local).map(|s| s.function)
    }

    /// EXSLT set function implemented as a call (the others map to set
    /// operations in the parser).
    pub fn from_exslt_set(local: &str) -> Option<SystemFunction> {
        EXSLT_SETS.iter().find(|s| s.name == local).map(|s| s.function)
    }

    fn signature(self) -> &'static Signature {
        CORE.iter()
            .chain(EXSLT_SETS)
            .find(|s| s.function == self)
            .unwrap_or(&CORE[0])
    }

    pub fn name(self) -> &'static str {
        self.signature().name
    }

    pub fn expanded_name(self) -> ExpandedName {
        if EXSLT_SETS.iter().any(|s| s.function == self) {
            ExpandedName::new(Some(EXSLT_SETS_NAMESPACE), self.name())
        } else {
            ExpandedName::local(self.name())
        }
    }

    /// Display name, with the conventional `set:` prefix for EXSLT functions.
    pub fn display_name(self) -> String {
        if EXSLT_SETS.iter().any(|s| s.function == self) {
            format!("set:{}", self.name())
        } else {
            self.name().to_string()
        }
    }

    pub fn result_type(self) -> DataType {
        self.signature().result
    }

    /// Check an argument count, returning the parse-time message on failure.
    pub fn check_arity(self, count: usize) -> core::result::Result<(), String> {
        let s = self.signature();
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match s.max {
            Some(max) if s.min == max && count != max => Err(format!(
                "Function {} must have {max} argument{}",
                self.display_name(),
                plural(max)
            )),
            _ if count < s.min => Err(format!(
                "Function {} must have at least {} argument{}",
                self.display_name(),
                s.min,
                plural(s.min)
            )),
            Some(max) if count > max => Err(format!(
                "Function {} must have no more than {max} argument{}",
                self.display_name(),
                plural(max)
            )),
            _ => Ok(()),
        }
    }

    /// What a call needs from its context beyond its arguments.
    pub fn intrinsic_dependencies(self, arity: usize) -> Dependencies {
        match self {
            F::Last => Dependencies::LAST,
            F::Position => Dependencies::POSITION,
            F::Current => Dependencies::CURRENT_NODE,
            F::Id | F::UnparsedEntityUri => Dependencies::CONTEXT_DOCUMENT,
            F::Key => Dependencies::CONTEXT_DOCUMENT | Dependencies::CONTROLLER,
            F::Document | F::FormatNumber | F::FunctionAvailable => Dependencies::CONTROLLER,
            F::Lang => Dependencies::CONTEXT_NODE,
            F::LocalName
            | F::NamespaceUri
            | F::Name
            | F::GenerateId
            | F::Number
            | F::String
            | F::StringLength
            | F::NormalizeSpace
                if arity == 0 =>
            {
                Dependencies::CONTEXT_NODE
            }
            _ => Dependencies::empty(),
        }
    }

    /// Whether a call whose arguments are all known can be evaluated at
    /// compile time.
    pub fn is_foldable(self) -> bool {
        !matches!(self, F::FunctionAvailable | F::Document | F::Key)
    }
}

/// Host function: receives the caller's context and the evaluated arguments.
pub type ExtensionFunction<N> =
    Arc<dyn Fn(&Context<N>, &[Value<N>]) -> Result<Value<N>> + Send + Sync>;

pub type FunctionOverload<N> = (usize, Option<usize>, ExtensionFunction<N>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Unknown function {0}")]
    Unknown(ExpandedName),
    #[error("Function {name} cannot be called with {arity} arguments")]
    WrongArity { name: ExpandedName, arity: usize },
}

/// Host functions keyed by expanded name; each name may carry several
/// arity ranges.
pub struct FunctionLibrary<N: XmlNode> {
    fns: HashMap<ExpandedName, Vec<FunctionOverload<N>>>,
}

impl<N: XmlNode> Default for FunctionLibrary<N> {
    fn default() -> Self {
        Self {
            fns: HashMap::new(),
        }
    }
}

impl<N: XmlNode> FunctionLibrary<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for calls with `min_arity..=max_arity` arguments; `None` means
    /// variadic. The most specific overload (highest minimum, then smallest
    /// maximum) wins.
    pub fn register_range(
        &mut self,
        name: ExpandedName,
        min_arity: usize,
        max_arity: Option<usize>,
        func: ExtensionFunction<N>,
    ) {
        let overloads = self.fns.entry(name).or_default();
        overloads.push((min_arity, max_arity, func));
        overloads.sort_by(|a, b| {
            b.0.cmp(&a.0).then_with(|| match (a.1, b.1) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => core::cmp::Ordering::Less,
                (None, Some(_)) => core::cmp::Ordering::Greater,
                (None, None) => core::cmp::Ordering::Equal,
            })
        });
    }

    pub fn register_fn<F>(&mut self, name: ExpandedName, arity: usize, f: F)
    where
        F: 'static + Send + Sync + Fn(&Context<N>, &[Value<N>]) -> Result<Value<N>>,
    {
        self.register_range(name, arity, Some(arity), Arc::new(f));
    }

    pub fn register_ns<F>(&mut self, ns_uri: &str, local: &str, arity: usize, f: F)
    where
        F: 'static + Send + Sync + Fn(&Context<N>, &[Value<N>]) -> Result<Value<N>>,
    {
        self.register_fn(ExpandedName::new(Some(ns_uri), local), arity, f);
    }

    pub fn contains(&self, name: &ExpandedName) -> bool {
        self.fns.contains_key(name)
    }

    pub fn resolve(
        &self,
        name: &ExpandedName,
        arity: usize,
    ) -> core::result::Result<&ExtensionFunction<N>, ResolveError> {
        let Some(candidates) = self.fns.get(name) else {
            return Err(ResolveError::Unknown(name.clone()));
        };
        candidates
            .iter()
            .find(|(min, max, _)| arity >= *min && max.is_none_or(|m| arity <= m))
            .map(|(_, _, f)| f)
            .ok_or_else(|| ResolveError::WrongArity {
                name: name.clone(),
                arity,
            })
    }
}

/// Node the zero-argument forms apply to.
fn focus<'a, N: XmlNode>(bound: Option<&'a N>, ctx: &'a Context<N>) -> Result<&'a N> {
    match bound {
        Some(n) => Ok(n),
        None => ctx.context_node(),
    }
}

/// First node of the argument, or the focus node when there is no argument.
fn node_argument<N: XmlNode>(
    args: &[Expr<N>],
    bound: Option<&N>,
    ctx: &Context<N>,
) -> Result<Option<N>> {
    match args.first() {
        Some(a) => a.evaluate_as_node_set(ctx)?.first(),
        None => focus(bound, ctx).map(|n| Some(n.clone())),
    }
}

fn string_argument<N: XmlNode>(
    args: &[Expr<N>],
    bound: Option<&N>,
    ctx: &Context<N>,
) -> Result<String> {
    match args.first() {
        Some(a) => Ok(a.evaluate_as_string(ctx)?.to_string()),
        None => Ok(focus(bound, ctx)?.string_value()),
    }
}

/// Evaluate a system function call.
pub(crate) fn call<N: XmlNode>(
    function: SystemFunction,
    args: &[Expr<N>],
    bound: Option<&N>,
    static_context: Option<&SharedStaticContext>,
    ctx: &Context<N>,
) -> Result<Value<N>> {
    let arg = |i: usize| {
        args.get(i).ok_or_else(|| {
            EvaluationError::internal(format!("missing argument {i} of {}", function.name()))
        })
    };
    Ok(match function {
        F::Last => Value::Number(numeric::position_number(ctx.last())),
        F::Position => Value::Number(numeric::position_number(ctx.position())),
        F::Count => Value::Number(numeric::position_number(
            arg(0)?.evaluate_as_node_set(ctx)?.count()?,
        )),
        F::Current => Value::NodeSet(crate::nodeset::NodeSetValue::singleton(Some(
            ctx.current_node()?.clone(),
        ))),
        F::Id => nodes::id(&arg(0)?.evaluate(ctx)?, focus(bound, ctx)?)?,
        F::Key => nodes::key(
            &arg(0)?.evaluate_as_string(ctx)?,
            &arg(1)?.evaluate(ctx)?,
            static_context,
            focus(bound, ctx)?,
            ctx,
        )?,
        F::Document => nodes::document(
            &arg(0)?.evaluate(ctx)?,
            args.get(1).map(|a| a.evaluate_as_node_set(ctx)).transpose()?,
            static_context,
            ctx,
        )?,
        F::LocalName => Value::string(nodes::local_name(node_argument(args, bound, ctx)?.as_ref())),
        F::NamespaceUri => {
            Value::string(nodes::namespace_uri(node_argument(args, bound, ctx)?.as_ref()))
        }
        F::Name => Value::string(nodes::name(node_argument(args, bound, ctx)?.as_ref())),
        F::GenerateId => Value::string(
            node_argument(args, bound, ctx)?
                .map(|n| n.generate_id())
                .unwrap_or_default(),
        ),
        F::Not => Value::Boolean(!arg(0)?.evaluate_as_boolean(ctx)?),
        F::True => Value::Boolean(true),
        F::False => Value::Boolean(false),
        F::Boolean => Value::Boolean(arg(0)?.evaluate_as_boolean(ctx)?),
        F::Lang => Value::Boolean(nodes::lang(
            &arg(0)?.evaluate_as_string(ctx)?,
            focus(bound, ctx)?,
        )),
        F::Number => match args.first() {
            Some(a) => Value::Number(a.evaluate_as_number(ctx)?),
            None => Value::Number(crate::value::string_to_number(
                &focus(bound, ctx)?.string_value(),
            )),
        },
        F::Floor => Value::Number(arg(0)?.evaluate_as_number(ctx)?.floor()),
        F::Ceiling => Value::Number(arg(0)?.evaluate_as_number(ctx)?.ceil()),
        F::Round => Value::Number(numeric::round(arg(0)?.evaluate_as_number(ctx)?)),
        F::Sum => Value::Number(numeric::sum(&arg(0)?.evaluate_as_node_set(ctx)?)?),
        F::String => Value::string(string_argument(args, bound, ctx)?),
        F::StartsWith => Value::Boolean(
            arg(0)?
                .evaluate_as_string(ctx)?
                .starts_with(arg(1)?.evaluate_as_string(ctx)?.as_str()),
        ),
        F::StringLength => Value::Number(numeric::position_number(
            string_argument(args, bound, ctx)?.chars().count(),
        )),
        F::Substring => {
            let s = arg(0)?.evaluate_as_string(ctx)?;
            let start = arg(1)?.evaluate_as_number(ctx)?;
            let len = args.get(2).map(|a| a.evaluate_as_number(ctx)).transpose()?;
            Value::string(strings::substring(&s, start, len))
        }
        F::Contains => Value::Boolean(
            arg(0)?
                .evaluate_as_string(ctx)?
                .contains(arg(1)?.evaluate_as_string(ctx)?.as_str()),
        ),
        F::SubstringBefore => Value::string(strings::substring_before(
            &arg(0)?.evaluate_as_string(ctx)?,
            &arg(1)?.evaluate_as_string(ctx)?,
        )),
        F::SubstringAfter => Value::string(strings::substring_after(
            &arg(0)?.evaluate_as_string(ctx)?,
            &arg(1)?.evaluate_as_string(ctx)?,
        )),
        F::NormalizeSpace => {
            Value::string(strings::normalize_space(&string_argument(args, bound, ctx)?))
        }
        F::Translate => Value::string(strings::translate(
            &arg(0)?.evaluate_as_string(ctx)?,
            &arg(1)?.evaluate_as_string(ctx)?,
            &arg(2)?.evaluate_as_string(ctx)?,
        )),
        F::Concat => {
            let mut out = compact_str::CompactString::default();
            for a in args {
                out.push_str(&a.evaluate_as_string(ctx)?);
            }
            Value::String(out)
        }
        F::FormatNumber => Value::string(strings::format_number(
            arg(0)?.evaluate_as_number(ctx)?,
            &arg(1)?.evaluate_as_string(ctx)?,
            args.get(2).map(|a| a.evaluate_as_string(ctx)).transpose()?.as_deref(),
            static_context,
            ctx,
        )?),
        F::SystemProperty => {
            strings::system_property(&arg(0)?.evaluate_as_string(ctx)?, static_context)?
        }
        F::FunctionAvailable => Value::Boolean(nodes::function_available(
            &arg(0)?.evaluate_as_string(ctx)?,
            static_context,
            ctx,
        )?),
        F::ElementAvailable => Value::Boolean(nodes::element_available(
            &arg(0)?.evaluate_as_string(ctx)?,
            static_context,
        )?),
        F::UnparsedEntityUri => Value::string(
            focus(bound, ctx)?
                .root()
                .unparsed_entity_uri(&arg(0)?.evaluate_as_string(ctx)?)
                .unwrap_or_default(),
        ),
        F::HasSameNode => Value::Boolean(nodes::has_same_node(
            &arg(0)?.evaluate_as_node_set(ctx)?,
            &arg(1)?.evaluate_as_node_set(ctx)?,
        )?),
        F::Leading => Value::NodeSet(nodes::leading(
            &arg(0)?.evaluate_as_node_set(ctx)?,
            &arg(1)?.evaluate_as_node_set(ctx)?,
        )?),
        F::Trailing => Value::NodeSet(nodes::trailing(
            &arg(0)?.evaluate_as_node_set(ctx)?,
            &arg(1)?.evaluate_as_node_set(ctx)?,
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_messages() {
        assert_eq!(
            F::Count.check_arity(2).unwrap_err(),
            "Function count must have 1 argument"
        );
        assert_eq!(
            F::Concat.check_arity(1).unwrap_err(),
            "Function concat must have at least 2 arguments"
        );
        assert_eq!(
            F::Substring.check_arity(4).unwrap_err(),
            "Function substring must have no more than 3 arguments"
        );
        assert!(F::Concat.check_arity(7).is_ok());
    }

    #[test]
    fn context_forms_depend_on_the_context_node() {
        assert_eq!(F::String.intrinsic_dependencies(0), Dependencies::CONTEXT_NODE);
        assert!(F::String.intrinsic_dependencies(1).is_empty());
        assert_eq!(F::Last.intrinsic_dependencies(0), Dependencies::LAST);
    }

    #[test]
    fn exslt_names_are_separate() {
        assert_eq!(SystemFunction::from_name("leading"), None);
        assert_eq!(SystemFunction::from_exslt_set("leading"), Some(F::Leading));
        assert_eq!(
            F::Leading.expanded_name(),
            ExpandedName::new(Some(EXSLT_SETS_NAMESPACE), "leading")
        );
    }

    #[test]
    fn library_overloads_pick_the_narrowest_range() {
        use crate::simple_node::SimpleNode;

        let name = ExpandedName::new(Some("urn:host"), "pick");
        let mut lib = FunctionLibrary::<SimpleNode>::default();
        assert!(!lib.contains(&name));
        let any: ExtensionFunction<SimpleNode> =
            Arc::new(|_: &Context<SimpleNode>, _: &[Value<SimpleNode>]| -> Result<Value<SimpleNode>> {
                Ok(Value::from("any"))
            });
        lib.register_range(name.clone(), 0, None, any);
        lib.register_fn(name.clone(), 1, |_, _| Ok(Value::from("one")));
        let ctx = Context::new(crate::context::Controller::detached());
        let call = |arity: usize| {
            let f = lib.resolve(&name, arity).unwrap();
            f(&ctx, &[]).unwrap().as_string().unwrap().to_string()
        };
        assert_eq!(call(1), "one");
        assert_eq!(call(3), "any");
        assert!(matches!(
            lib.resolve(&ExpandedName::local("pick"), 1),
            Err(ResolveError::Unknown(_))
        ));
    }
}
