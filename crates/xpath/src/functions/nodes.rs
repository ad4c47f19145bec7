use core::cmp::Ordering;
use std::sync::Arc;

use url::Url;

use super::strings::resolve_qname;
use crate::context::{Context, SharedStaticContext, StandaloneContext, StaticContext};
use crate::enumeration::collect_nodes;
use crate::error::{EvaluationError, Result};
use crate::model::XmlNode;
use crate::names::ExpandedName;
use crate::nodeset::{NodeSetValue, sort_document_order};
use crate::value::Value;

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Strings an argument stands for: one per node of a node-set, otherwise
/// its string value.
fn argument_strings<N: XmlNode>(value: &Value<N>) -> Result<Vec<String>> {
    match value {
        Value::NodeSet(ns) => Ok(collect_nodes(&mut ns.enumerate()?)?
            .iter()
            .map(XmlNode::string_value)
            .collect()),
        other => Ok(vec![other.as_string()?.to_string()]),
    }
}

fn sorted_set<N: XmlNode>(mut nodes: Vec<N>) -> Result<NodeSetValue<N>> {
    sort_document_order(&mut nodes)?;
    Ok(NodeSetValue::from_nodes(nodes, true))
}

pub(crate) fn id<N: XmlNode>(value: &Value<N>, context_node: &N) -> Result<Value<N>> {
    let mut found = Vec::new();
    for s in argument_strings(value)? {
        for token in s.split(is_xml_whitespace).filter(|t| !t.is_empty()) {
            if let Some(e) = context_node.element_with_id(token) {
                found.push(e);
            }
        }
    }
    Ok(Value::NodeSet(sorted_set(found)?))
}

pub(crate) fn key<N: XmlNode>(
    name: &str,
    value: &Value<N>,
    static_context: Option<&SharedStaticContext>,
    context_node: &N,
    ctx: &Context<N>,
) -> Result<Value<N>> {
    let key_name = resolve_qname(name, static_context)?;
    let keys = ctx.controller().keys();
    if !keys.is_defined(&key_name) {
        return Err(EvaluationError::function(format!("Key {name} has not been defined")));
    }
    let root = context_node.root();
    let mut found = Vec::new();
    for s in argument_strings(value)? {
        found.extend(keys.lookup(&key_name, &s, &root, ctx)?);
    }
    Ok(Value::NodeSet(sorted_set(found)?))
}

fn absolute_uri(uri: &str, base: Option<&str>) -> Result<String> {
    let resolved = match base {
        Some(b) => Url::parse(b).and_then(|b| b.join(uri)),
        None => Url::parse(uri),
    };
    let mut url = resolved.map_err(|e| {
        EvaluationError::function(format!("Cannot resolve URI {uri}: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    })?;
    url.set_fragment(None);
    Ok(url.into())
}

/// `document(uri-or-nodes, base?)`.
pub(crate) fn document<N: XmlNode>(
    value: &Value<N>,
    base_nodes: Option<NodeSetValue<N>>,
    static_context: Option<&SharedStaticContext>,
    ctx: &Context<N>,
) -> Result<Value<N>> {
    let explicit_base = match &base_nodes {
        Some(ns) => ns.first()?.and_then(|n| n.base_uri()),
        None => None,
    };
    let static_base = static_context.and_then(|sc| sc.base_uri().map(str::to_string));
    let mut requests: Vec<(String, Option<String>)> = Vec::new();
    match value {
        Value::NodeSet(ns) => {
            for node in collect_nodes(&mut ns.enumerate()?)? {
                let base = explicit_base.clone().or_else(|| node.base_uri());
                requests.push((node.string_value(), base));
            }
        }
        other => requests.push((
            other.as_string()?.to_string(),
            explicit_base.clone().or_else(|| static_base.clone()),
        )),
    }
    let mut found = Vec::new();
    for (uri, base) in requests {
        let absolute = absolute_uri(&uri, base.as_deref())?;
        if let Some(doc) = ctx.controller().load_document(&absolute)? {
            found.push(doc);
        }
    }
    Ok(Value::NodeSet(sorted_set(found)?))
}

pub(crate) fn local_name<N: XmlNode>(node: Option<&N>) -> String {
    node.and_then(XmlNode::name).map(|q| q.local).unwrap_or_default()
}

pub(crate) fn namespace_uri<N: XmlNode>(node: Option<&N>) -> String {
    node.and_then(XmlNode::expanded_name)
        .and_then(|n| n.ns_uri().map(str::to_string))
        .unwrap_or_default()
}

pub(crate) fn name<N: XmlNode>(node: Option<&N>) -> String {
    node.and_then(XmlNode::name)
        .map(|q| q.lexical())
        .unwrap_or_default()
}

/// `lang()`: `xml:lang` in scope equals the argument or starts with it
/// followed by `-`, ignoring case.
pub(crate) fn lang<N: XmlNode>(wanted: &str, node: &N) -> bool {
    let Some(actual) = node.language() else {
        return false;
    };
    let actual = actual.to_ascii_lowercase();
    let wanted = wanted.to_ascii_lowercase();
    actual == wanted
        || actual
            .strip_prefix(wanted.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
}

pub(crate) fn function_available<N: XmlNode>(
    qname: &str,
    static_context: Option<&SharedStaticContext>,
    ctx: &Context<N>,
) -> Result<bool> {
    let name: ExpandedName = resolve_qname(qname, static_context)?;
    let statically = match static_context {
        Some(sc) => sc.is_function_available(&name),
        None => StandaloneContext::new().is_function_available(&name),
    };
    Ok(statically || ctx.controller().functions().contains(&name))
}

pub(crate) fn element_available(
    qname: &str,
    static_context: Option<&SharedStaticContext>,
) -> Result<bool> {
    let name = resolve_qname(qname, static_context)?;
    Ok(match static_context {
        Some(sc) => sc.is_element_available(&name),
        None => StandaloneContext::new().is_element_available(&name),
    })
}

pub(crate) fn has_same_node<N: XmlNode>(a: &NodeSetValue<N>, b: &NodeSetValue<N>) -> Result<bool> {
    let right = collect_nodes(&mut b.enumerate()?)?;
    let mut left = a.enumerate()?;
    while let Some(n) = left.next_node()? {
        if right.iter().any(|r| r.is_same_node(&n)) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Nodes of `a` strictly before (`Less`) or after (`Greater`) the first
/// node of `b`. Empty when that node is not a member of `a`.
fn split_at_first<N: XmlNode>(
    a: &NodeSetValue<N>,
    b: &NodeSetValue<N>,
    side: Ordering,
) -> Result<Option<NodeSetValue<N>>> {
    let Some(pivot) = b.first()? else {
        return Ok(None);
    };
    let members = a.materialize()?;
    if !members.nodes().iter().any(|n| n.is_same_node(&pivot)) {
        return Ok(Some(NodeSetValue::Empty));
    }
    let mut kept = Vec::new();
    for n in members.nodes() {
        if n.compare_document_order(&pivot)? == side && !n.is_same_node(&pivot) {
            kept.push(n.clone());
        }
    }
    Ok(Some(NodeSetValue::from_nodes(kept, true)))
}

/// `set:leading`: all of `a` when `b` is empty.
pub(crate) fn leading<N: XmlNode>(a: &NodeSetValue<N>, b: &NodeSetValue<N>) -> Result<NodeSetValue<N>> {
    Ok(split_at_first(a, b, Ordering::Less)?.unwrap_or_else(|| a.clone()))
}

/// `set:trailing`: empty when `b` is empty.
pub(crate) fn trailing<N: XmlNode>(a: &NodeSetValue<N>, b: &NodeSetValue<N>) -> Result<NodeSetValue<N>> {
    Ok(split_at_first(a, b, Ordering::Greater)?.unwrap_or(NodeSetValue::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_node::{SimpleNode, doc, elem};

    fn rows() -> (SimpleNode, Vec<SimpleNode>) {
        let d = doc()
            .child(
                elem("r")
                    .child(elem("a"))
                    .child(elem("b"))
                    .child(elem("c"))
                    .child(elem("d")),
            )
            .build();
        let k = d.children()[0].children();
        (d, k)
    }

    fn set(nodes: &[SimpleNode]) -> NodeSetValue<SimpleNode> {
        NodeSetValue::from_nodes(nodes.to_vec(), false)
    }

    #[test]
    fn leading_and_trailing() {
        let (_doc, k) = rows();
        let all = set(&k);
        let pivot = set(&[k[2].clone()]);
        assert_eq!(leading(&all, &pivot).unwrap().count().unwrap(), 2);
        assert_eq!(trailing(&all, &pivot).unwrap().count().unwrap(), 1);
        assert_eq!(leading(&all, &NodeSetValue::Empty).unwrap().count().unwrap(), 4);
        assert_eq!(trailing(&all, &NodeSetValue::Empty).unwrap().count().unwrap(), 0);
        let outside = set(&[k[3].clone()]);
        let first_two = set(&k[..2]);
        assert_eq!(leading(&first_two, &outside).unwrap().count().unwrap(), 0);
    }

    #[test]
    fn same_node() {
        let (_doc, k) = rows();
        assert!(has_same_node(&set(&k[..2]), &set(&k[1..])).unwrap());
        assert!(!has_same_node(&set(&k[..1]), &set(&k[2..])).unwrap());
    }

    #[test]
    fn relative_uris_use_the_base() {
        assert_eq!(
            absolute_uri("b.xml#frag", Some("file:///data/a.xml")).unwrap(),
            "file:///data/b.xml"
        );
        assert!(absolute_uri("b.xml", None).is_err());
    }
}
