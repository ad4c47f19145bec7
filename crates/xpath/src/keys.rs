//! Key definitions and the per-document indexes behind `key()`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::context::Context;
use crate::enumeration::NodeEnumeration;
use crate::error::{EvaluationError, Result};
use crate::expr::Expr;
use crate::model::{NodeKind, XmlNode};
use crate::names::{ExpandedName, Fingerprint};
use crate::pattern::Pattern;
use crate::value::Value;

/// A named key: the nodes matching `pattern` are indexed by the string
/// values of `use_expr`, evaluated with each node as context.
#[derive(Debug, Clone)]
pub struct KeyDefinition<N: XmlNode> {
    pub name: ExpandedName,
    pub pattern: Pattern<N>,
    pub use_expr: Expr<N>,
}

impl<N: XmlNode> KeyDefinition<N> {
    pub fn new(name: ExpandedName, pattern: Pattern<N>, use_expr: Expr<N>) -> Self {
        Self {
            name,
            pattern,
            use_expr,
        }
    }
}

type Index<N> = HashMap<String, Vec<N>>;

/// Holds key definitions and builds one index per key and document on
/// first use.
#[derive(Debug)]
pub struct KeyManager<N: XmlNode> {
    definitions: HashMap<Fingerprint, Vec<KeyDefinition<N>>>,
    indexes: Mutex<Vec<(Fingerprint, N, Index<N>)>>,
}

impl<N: XmlNode> Default for KeyManager<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XmlNode> KeyManager<N> {
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            indexes: Mutex::new(Vec::new()),
        }
    }

    /// Add a definition. Several definitions may share a name; their
    /// indexes are merged.
    pub fn register(&mut self, definition: KeyDefinition<N>) {
        self.definitions
            .entry(definition.name.fingerprint())
            .or_default()
            .push(definition);
    }

    pub fn is_defined(&self, name: &ExpandedName) -> bool {
        self.definitions.contains_key(&name.fingerprint())
    }

    /// Nodes in the document rooted at `root` whose key value equals `value`,
    /// in document order.
    pub fn lookup(
        &self,
        name: &ExpandedName,
        value: &str,
        root: &N,
        ctx: &Context<N>,
    ) -> Result<Vec<N>> {
        let fp = name.fingerprint();
        let Some(definitions) = self.definitions.get(&fp) else {
            return Err(EvaluationError::function(format!(
                "Key {name} has not been defined"
            )));
        };
        if let Some(found) = self.cached(fp, root, value) {
            return Ok(found);
        }
        // Built unlocked: the use expressions may call key() themselves.
        let index = build_index(definitions, root, ctx)?;
        debug!(key = %name, entries = index.len(), "built key index");
        let found = index.get(value).cloned().unwrap_or_default();
        let mut indexes = self.indexes();
        if !indexes
            .iter()
            .any(|(f, r, _)| *f == fp && r.is_same_node(root))
        {
            indexes.push((fp, root.clone(), index));
        }
        Ok(found)
    }

    fn cached(&self, fp: Fingerprint, root: &N, value: &str) -> Option<Vec<N>> {
        self.indexes()
            .iter()
            .find(|(f, r, _)| *f == fp && r.is_same_node(root))
            .map(|(_, _, index)| index.get(value).cloned().unwrap_or_default())
    }

    fn indexes(&self) -> MutexGuard<'_, Vec<(Fingerprint, N, Index<N>)>> {
        match self.indexes.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn build_index<N: XmlNode>(
    definitions: &[KeyDefinition<N>],
    root: &N,
    ctx: &Context<N>,
) -> Result<Index<N>> {
    let with_attributes = definitions.iter().any(|d| d.pattern.may_match_attributes());
    let mut index: Index<N> = HashMap::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        add_entries(definitions, &node, ctx, &mut index)?;
        if node.kind() == NodeKind::Element && with_attributes {
            for a in node.attributes() {
                add_entries(definitions, &a, ctx, &mut index)?;
            }
        }
        stack.extend(node.children().into_iter().rev());
    }
    Ok(index)
}

fn add_entries<N: XmlNode>(
    definitions: &[KeyDefinition<N>],
    node: &N,
    ctx: &Context<N>,
    index: &mut Index<N>,
) -> Result<()> {
    for d in definitions {
        if !d.pattern.matches(node, ctx)? {
            continue;
        }
        let focus = ctx
            .with_context_node(node.clone())
            .with_current_node(node.clone());
        match d.use_expr.evaluate(&focus)? {
            Value::NodeSet(ns) => {
                let mut members = ns.enumerate()?;
                while let Some(m) = members.next_node()? {
                    insert(index, m.string_value(), node);
                }
            }
            v => insert(index, v.as_string()?.to_string(), node),
        }
    }
    Ok(())
}

/// Nodes arrive in document order, so a repeat can only be the last entry.
fn insert<N: XmlNode>(index: &mut Index<N>, value: String, node: &N) {
    let entry = index.entry(value).or_default();
    if !entry.last().is_some_and(|n| n.is_same_node(node)) {
        entry.push(node.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Controller, StandaloneContext};
    use crate::simple_node::{SimpleNode, attr, doc, elem, text};

    fn manager() -> KeyManager<SimpleNode> {
        let sc = StandaloneContext::new().shared();
        let mut keys = KeyManager::new();
        keys.register(KeyDefinition::new(
            ExpandedName::local("by-colour"),
            Pattern::parse("item", &sc).unwrap(),
            Expr::parse("@colour", &sc).unwrap(),
        ));
        keys.register(KeyDefinition::new(
            ExpandedName::local("by-colour"),
            Pattern::parse("box", &sc).unwrap(),
            Expr::parse("tag", &sc).unwrap(),
        ));
        keys
    }

    #[test]
    fn merged_definitions_index_in_document_order() {
        let root = doc()
            .child(
                elem("r")
                    .child(elem("item").attr(attr("colour", "red")))
                    .child(
                        elem("box")
                            .child(elem("tag").child(text("red")))
                            .child(elem("tag").child(text("red"))),
                    )
                    .child(elem("item").attr(attr("colour", "blue"))),
            )
            .build();
        let keys = manager();
        let ctx = Context::new(Controller::detached());
        let name = ExpandedName::local("by-colour");
        let red = keys.lookup(&name, "red", &root, &ctx).unwrap();
        let names: Vec<_> = red.iter().map(|n| n.name().unwrap().local).collect();
        assert_eq!(names, ["item", "box"]);
        assert_eq!(keys.lookup(&name, "blue", &root, &ctx).unwrap().len(), 1);
        assert!(keys.lookup(&name, "green", &root, &ctx).unwrap().is_empty());
    }

    #[test]
    fn undefined_keys_are_errors() {
        let root = doc().build();
        let ctx = Context::new(Controller::detached());
        let err = manager()
            .lookup(&ExpandedName::local("nope"), "x", &root, &ctx)
            .unwrap_err();
        assert_eq!(err.message, "Key nope has not been defined");
    }
}
