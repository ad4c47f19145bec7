use crate::context::{Context, SharedStaticContext};
use crate::error::{EvaluationError, Result};
use crate::model::XmlNode;
use crate::names::{ExpandedName, XSLT_NAMESPACE, is_qname, split_qname};
use crate::value::Value;

pub(crate) const VENDOR: &str = "Stylus";
pub(crate) const VENDOR_URL: &str = "https://github.com/stylus-xml/stylus";

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// XPath 1.0 `substring()`: characters whose 1-based position `p` satisfies
/// `round(start) <= p < round(start) + round(len)`.
pub(crate) fn substring(s: &str, start: f64, len: Option<f64>) -> String {
    let first = super::numeric::round(start);
    let end = match len {
        Some(l) => first + super::numeric::round(l),
        None => f64::INFINITY,
    };
    if first.is_nan() || end.is_nan() {
        return String::new();
    }
    s.chars()
        .zip(1u32..)
        .filter(|(_, p)| {
            let p = f64::from(*p);
            p >= first && p < end
        })
        .map(|(c, _)| c)
        .collect()
}

pub(crate) fn substring_before(s: &str, sep: &str) -> String {
    if sep.is_empty() {
        return String::new();
    }
    s.find(sep).map(|i| s[..i].to_string()).unwrap_or_default()
}

pub(crate) fn substring_after(s: &str, sep: &str) -> String {
    if sep.is_empty() {
        return s.to_string();
    }
    s.find(sep)
        .map(|i| s[i + sep.len()..].to_string())
        .unwrap_or_default()
}

pub(crate) fn normalize_space(s: &str) -> String {
    s.split(is_xml_whitespace)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace each character found in `from` by the character at the same
/// position in `to`, dropping it when `to` is shorter. The first occurrence
/// in `from` wins.
pub(crate) fn translate(s: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect()
}

pub(crate) fn format_number<N: XmlNode>(
    n: f64,
    picture: &str,
    format_name: Option<&str>,
    static_context: Option<&SharedStaticContext>,
    ctx: &Context<N>,
) -> Result<String> {
    let formats = ctx.controller().decimal_formats();
    let format = match format_name {
        None => formats.default_format(),
        Some(qname) => {
            let name = resolve_qname(qname, static_context)?;
            formats.named(&name).ok_or_else(|| {
                EvaluationError::function(format!(
                    "format-number function: decimal-format {qname} not registered"
                ))
            })?
        }
    };
    format.format(n, picture)
}

/// Resolve a QName given as a string argument.
pub(crate) fn resolve_qname(
    qname: &str,
    static_context: Option<&SharedStaticContext>,
) -> Result<ExpandedName> {
    let qname = qname.trim_matches(is_xml_whitespace);
    if !is_qname(qname) {
        return Err(EvaluationError::function(format!(
            "Argument {qname} is not a valid QName"
        )));
    }
    match static_context {
        Some(sc) => sc
            .make_name(qname)
            .map_err(|e| EvaluationError::function(e.to_string())),
        None => {
            let (prefix, local) = split_qname(qname);
            if prefix.is_empty() {
                Ok(ExpandedName::local(local))
            } else {
                Err(EvaluationError::function(format!(
                    "Prefix {prefix} cannot be resolved without a static context"
                )))
            }
        }
    }
}

/// `system-property()`: the three XSLT properties; everything else is the
/// empty string.
pub(crate) fn system_property<N: XmlNode>(
    qname: &str,
    static_context: Option<&SharedStaticContext>,
) -> Result<Value<N>> {
    let name = resolve_qname(qname, static_context)?;
    if name.ns_uri() != Some(XSLT_NAMESPACE) {
        return Ok(Value::string(""));
    }
    Ok(match name.local_name() {
        "version" => Value::Number(1.0),
        "vendor" => Value::string(VENDOR),
        "vendor-url" => Value::string(VENDOR_URL),
        _ => Value::string(""),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_node::SimpleNode;

    #[test]
    fn substring_rounding() {
        assert_eq!(substring("12345", 2.0, Some(3.0)), "234");
        assert_eq!(substring("12345", 1.5, Some(2.6)), "234");
        assert_eq!(substring("12345", 0.0, Some(3.0)), "12");
        assert_eq!(substring("12345", f64::NAN, Some(3.0)), "");
        assert_eq!(substring("12345", 1.0, Some(f64::NAN)), "");
        assert_eq!(substring("12345", -42.0, Some(f64::INFINITY)), "12345");
        assert_eq!(substring("12345", f64::NEG_INFINITY, Some(f64::INFINITY)), "");
        assert_eq!(substring("héllo", 2.0, None), "éllo");
    }

    #[test]
    fn before_after() {
        assert_eq!(substring_before("1999/04/01", "/"), "1999");
        assert_eq!(substring_after("1999/04/01", "/"), "04/01");
        assert_eq!(substring_after("abc", ""), "abc");
        assert_eq!(substring_before("abc", "x"), "");
    }

    #[test]
    fn whitespace_and_translate() {
        assert_eq!(normalize_space("  a \t b\n\nc "), "a b c");
        assert_eq!(normalize_space("a\u{A0}b"), "a\u{A0}b");
        assert_eq!(translate("bar", "abc", "ABC"), "BAr");
        assert_eq!(translate("--aaa--", "abc-", "ABC"), "AAA");
        assert_eq!(translate("aa", "aa", "xy"), "xx");
    }

    #[test]
    fn properties() {
        let sc: SharedStaticContext = crate::context::StandaloneContext::new().into();
        let v = system_property::<SimpleNode>("xsl:version", Some(&sc)).unwrap();
        assert!(matches!(v, Value::Number(n) if n == 1.0));
        let v = system_property::<SimpleNode>("xsl:vendor", Some(&sc)).unwrap();
        assert_eq!(v.as_string().unwrap(), VENDOR);
        let v = system_property::<SimpleNode>("user.home", Some(&sc)).unwrap();
        assert_eq!(v.as_string().unwrap(), "");
        let err = system_property::<SimpleNode>("a b", Some(&sc)).unwrap_err();
        assert_eq!(err.message, "Argument a b is not a valid QName");
    }
}
