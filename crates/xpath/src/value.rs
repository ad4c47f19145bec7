//! The XPath 1.0 value model and its coercion and comparison rules.

use core::fmt;
use std::collections::HashSet;
use std::sync::Arc;

use compact_str::{CompactString, format_compact};

use crate::error::Result;
use crate::model::XmlNode;
use crate::nodeset::NodeSetValue;

/// Static type of an expression or a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Number,
    String,
    NodeSet,
    Object,
    /// Not known until evaluation.
    Any,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Number => "number",
            DataType::String => "string",
            DataType::NodeSet => "node-set",
            DataType::Object => "object",
            DataType::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Operator that gives the same result with the operands swapped.
    pub fn inverse(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    pub fn compare_numbers(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }

    fn compare_strings(self, a: &str, b: &str) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => self.compare_numbers(string_to_number(a), string_to_number(b)),
        }
    }

    fn compare_booleans(self, a: bool, b: bool) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => self.compare_numbers(f64::from(u8::from(a)), f64::from(u8::from(b))),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Host value carried through expressions without XPath semantics of its own.
pub trait HostObject: fmt::Debug + fmt::Display + Send + Sync {}

impl<T: fmt::Debug + fmt::Display + Send + Sync> HostObject for T {}

#[derive(Debug, Clone)]
pub struct ObjectRef(Arc<dyn HostObject>);

impl ObjectRef {
    pub fn new(value: impl HostObject + 'static) -> Self {
        Self(Arc::new(value))
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

#[derive(Debug, Clone)]
pub enum Value<N: XmlNode> {
    String(CompactString),
    Number(f64),
    Boolean(bool),
    NodeSet(NodeSetValue<N>),
    Object(ObjectRef),
}

impl<N: XmlNode> Value<N> {
    pub fn string(s: impl Into<CompactString>) -> Self {
        Value::String(s.into())
    }

    pub fn empty_node_set() -> Self {
        Value::NodeSet(NodeSetValue::Empty)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::Number(_) => DataType::Number,
            Value::Boolean(_) => DataType::Boolean,
            Value::NodeSet(_) => DataType::NodeSet,
            Value::Object(_) => DataType::Object,
        }
    }

    pub fn as_string(&self) -> Result<CompactString> {
        Ok(match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => number_to_string(*n),
            Value::Boolean(b) => CompactString::const_new(if *b { "true" } else { "false" }),
            Value::NodeSet(ns) => ns.as_string()?,
            Value::Object(o) => format_compact!("{o}"),
        })
    }

    pub fn as_number(&self) -> Result<f64> {
        Ok(match self {
            Value::String(s) => string_to_number(s),
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::NodeSet(ns) => string_to_number(&ns.as_string()?),
            Value::Object(o) => string_to_number(&o.to_string()),
        })
    }

    pub fn as_boolean(&self) -> Result<bool> {
        Ok(match self {
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => number_to_boolean(*n),
            Value::Boolean(b) => *b,
            Value::NodeSet(ns) => ns.as_boolean()?,
            Value::Object(o) => !o.to_string().is_empty(),
        })
    }

    pub fn as_node_set(&self) -> Option<&NodeSetValue<N>> {
        match self {
            Value::NodeSet(ns) => Some(ns),
            _ => None,
        }
    }

    /// Convert to the given type; node-sets and objects cannot be produced
    /// from scalars and are returned unchanged.
    pub fn convert(&self, to: DataType) -> Result<Value<N>> {
        Ok(match to {
            DataType::Boolean => Value::Boolean(self.as_boolean()?),
            DataType::Number => Value::Number(self.as_number()?),
            DataType::String => Value::String(self.as_string()?),
            _ => self.clone(),
        })
    }

    /// XPath 1.0 comparison of two values, including the existential rules
    /// for node-sets.
    pub fn compare(&self, op: CompareOp, other: &Value<N>) -> Result<bool> {
        match (self, other) {
            (Value::NodeSet(a), Value::NodeSet(b)) => compare_node_sets(a, op, b),
            (Value::NodeSet(a), b) => compare_node_set_to_value(a, op, b),
            (a, Value::NodeSet(b)) => compare_node_set_to_value(b, op.inverse(), a),
            (a, b) => compare_scalars(a, op, b),
        }
    }
}

impl<N: XmlNode> From<bool> for Value<N> {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
impl<N: XmlNode> From<f64> for Value<N> {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl<N: XmlNode> From<&str> for Value<N> {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}
impl<N: XmlNode> From<String> for Value<N> {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}
impl<N: XmlNode> From<NodeSetValue<N>> for Value<N> {
    fn from(ns: NodeSetValue<N>) -> Self {
        Value::NodeSet(ns)
    }
}

pub fn number_to_boolean(n: f64) -> bool {
    n != 0.0 && !n.is_nan()
}

/// Format a number the XPath 1.0 way: no exponent, no trailing `.0`,
/// `-0` as `0`.
pub fn number_to_string(n: f64) -> CompactString {
    if n.is_nan() {
        CompactString::const_new("NaN")
    } else if n.is_infinite() {
        CompactString::const_new(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        CompactString::const_new("0")
    } else {
        // f64's Display already prints the shortest round-tripping decimal
        // without an exponent.
        format_compact!("{n}")
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// XPath 1.0 `number()` applied to a string: `-? (digits ('.' digits?)? | '.' digits)`
/// with optional surrounding whitespace, otherwise NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(is_xml_whitespace);
    let body = t.strip_prefix('-').unwrap_or(t);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in body.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return f64::NAN,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

fn compare_scalars<N: XmlNode>(a: &Value<N>, op: CompareOp, b: &Value<N>) -> Result<bool> {
    if op.is_equality() {
        if matches!(a, Value::Boolean(_)) || matches!(b, Value::Boolean(_)) {
            return Ok(op.compare_booleans(a.as_boolean()?, b.as_boolean()?));
        }
        if matches!(a, Value::Number(_)) || matches!(b, Value::Number(_)) {
            return Ok(op.compare_numbers(a.as_number()?, b.as_number()?));
        }
        return Ok(op.compare_strings(&a.as_string()?, &b.as_string()?));
    }
    Ok(op.compare_numbers(a.as_number()?, b.as_number()?))
}

fn node_strings<N: XmlNode>(ns: &NodeSetValue<N>) -> Result<Vec<String>> {
    let mut enm = ns.scan()?;
    let mut out = Vec::new();
    while let Some(n) = enm.next_node()? {
        out.push(n.string_value());
    }
    Ok(out)
}

fn compare_node_set_to_value<N: XmlNode>(
    ns: &NodeSetValue<N>,
    op: CompareOp,
    other: &Value<N>,
) -> Result<bool> {
    match other {
        Value::Boolean(b) => Ok(op.compare_booleans(ns.as_boolean()?, *b)),
        Value::Number(n) => {
            let mut enm = ns.scan()?;
            while let Some(node) = enm.next_node()? {
                if op.compare_numbers(string_to_number(&node.string_value()), *n) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::String(s) => {
            let mut enm = ns.scan()?;
            while let Some(node) = enm.next_node()? {
                if op.compare_strings(&node.string_value(), s) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Object(_) => Ok(false),
        Value::NodeSet(b) => compare_node_sets(ns, op, b),
    }
}

fn compare_node_sets<N: XmlNode>(
    a: &NodeSetValue<N>,
    op: CompareOp,
    b: &NodeSetValue<N>,
) -> Result<bool> {
    let left = node_strings(a)?;
    if left.is_empty() {
        return Ok(false);
    }
    let right = node_strings(b)?;
    if right.is_empty() {
        return Ok(false);
    }
    match op {
        CompareOp::Eq => {
            let lookup: HashSet<&str> = right.iter().map(String::as_str).collect();
            Ok(left.iter().any(|s| lookup.contains(s.as_str())))
        }
        CompareOp::Ne => {
            // Some pair differs unless every string on both sides is the same.
            let first = &left[0];
            Ok(left.iter().chain(right.iter()).any(|s| s != first))
        }
        _ => {
            let nums = |v: &[String]| -> Vec<f64> {
                v.iter()
                    .map(|s| string_to_number(s))
                    .filter(|n| !n.is_nan())
                    .collect()
            };
            let (l, r) = (nums(&left), nums(&right));
            let (Some(lmin), Some(lmax)) = (min_of(&l), max_of(&l)) else {
                return Ok(false);
            };
            let (Some(rmin), Some(rmax)) = (min_of(&r), max_of(&r)) else {
                return Ok(false);
            };
            Ok(match op {
                CompareOp::Lt => lmin < rmax,
                CompareOp::Le => lmin <= rmax,
                CompareOp::Gt => lmax > rmin,
                _ => lmax >= rmin,
            })
        }
    }
}

fn min_of(v: &[f64]) -> Option<f64> {
    v.iter().copied().reduce(f64::min)
}

fn max_of(v: &[f64]) -> Option<f64> {
    v.iter().copied().reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_node::SimpleNode;

    type V = Value<SimpleNode>;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(1e21), "1000000000000000000000");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_parsing() {
        assert_eq!(string_to_number(" 12.5 "), 12.5);
        assert_eq!(string_to_number("-.5"), -0.5);
        assert_eq!(string_to_number("3."), 3.0);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("+1").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number(".").is_nan());
    }

    #[test]
    fn boolean_coercions() {
        assert!(!V::from("").as_boolean().unwrap());
        assert!(V::from("false").as_boolean().unwrap());
        assert!(!V::from(0.0).as_boolean().unwrap());
        assert!(!V::from(-0.0).as_boolean().unwrap());
        assert!(!V::from(f64::NAN).as_boolean().unwrap());
        assert!(V::from(-3.0).as_boolean().unwrap());
        assert!(!V::empty_node_set().as_boolean().unwrap());
    }

    #[test]
    fn scalar_comparisons() {
        assert!(V::from(true).compare(CompareOp::Eq, &V::from("x")).unwrap());
        assert!(V::from(1.0).compare(CompareOp::Eq, &V::from(" 1 ")).unwrap());
        assert!(V::from("10").compare(CompareOp::Gt, &V::from("9")).unwrap());
        assert!(!V::from(f64::NAN).compare(CompareOp::Eq, &V::from(f64::NAN)).unwrap());
        assert!(V::from(f64::NAN).compare(CompareOp::Ne, &V::from(f64::NAN)).unwrap());
    }

    #[test]
    fn objects_coerce_through_display() {
        let o = V::Object(ObjectRef::new(42));
        assert_eq!(o.as_string().unwrap(), "42");
        assert_eq!(o.as_number().unwrap(), 42.0);
        assert!(!o.compare(CompareOp::Eq, &V::empty_node_set()).unwrap());
    }
}
