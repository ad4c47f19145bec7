//! Qualified names, NCName checks and the global name pool.
//!
//! Names are stored as interned `string_cache` atoms so that node-test matching
//! compares pointers rather than strings. The [`NamePool`] hands out stable
//! integer fingerprints for expanded names; fingerprints identify variables,
//! keys and pattern targets independently of the prefix used to write them.

use core::fmt;
use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use string_cache::DefaultAtom;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
pub const EXSLT_SETS_NAMESPACE: &str = "http://exslt.org/sets";

/// A namespace-qualified name with the prefix resolved away.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<DefaultAtom>,
    pub local: DefaultAtom,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<&str>, local: &str) -> Self {
        Self {
            ns_uri: ns_uri.filter(|u| !u.is_empty()).map(DefaultAtom::from),
            local: DefaultAtom::from(local),
        }
    }

    pub fn local(local: &str) -> Self {
        Self::new(None, local)
    }

    pub fn ns_uri(&self) -> Option<&str> {
        self.ns_uri.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn fingerprint(&self) -> Fingerprint {
        NamePool::global().allocate(self)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(uri) => write!(f, "{{{}}}{}", uri, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Stable integer identifier for an [`ExpandedName`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u32);

#[derive(Default)]
struct PoolInner {
    by_name: HashMap<ExpandedName, Fingerprint>,
    names: Vec<ExpandedName>,
}

/// Process-wide allocator of fingerprints.
pub struct NamePool {
    inner: RwLock<PoolInner>,
}

static GLOBAL_POOL: LazyLock<NamePool> = LazyLock::new(NamePool::new);

impl Default for NamePool {
    fn default() -> Self {
        Self::new()
    }
}

impl NamePool {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
        }
    }

    pub fn global() -> &'static NamePool {
        &GLOBAL_POOL
    }

    /// Return the fingerprint for `name`, allocating one on first sight.
    pub fn allocate(&self, name: &ExpandedName) -> Fingerprint {
        if let Some(fp) = self.lookup(name) {
            return fp;
        }
        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(fp) = inner.by_name.get(name) {
            return *fp;
        }
        let fp = Fingerprint(u32::try_from(inner.names.len()).unwrap_or(u32::MAX));
        inner.names.push(name.clone());
        inner.by_name.insert(name.clone(), fp);
        fp
    }

    pub fn lookup(&self, name: &ExpandedName) -> Option<Fingerprint> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.by_name.get(name).copied()
    }

    pub fn name(&self, fp: Fingerprint) -> Option<ExpandedName> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.names.get(fp.0 as usize).cloned()
    }
}

fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

/// True if `s` is a name without a colon.
pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

/// True if `s` is `NCName` or `NCName:NCName`.
pub fn is_qname(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(s),
    }
}

/// Split a lexical QName into `(prefix, local)`; the prefix is empty when absent.
pub fn split_qname(s: &str) -> (&str, &str) {
    match s.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprints_are_stable() {
        let a = ExpandedName::new(Some("urn:x"), "item");
        let b = ExpandedName::new(Some("urn:x"), "item");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), ExpandedName::local("item").fingerprint());
        assert_eq!(NamePool::global().name(a.fingerprint()), Some(a));
    }

    #[test]
    fn empty_namespace_is_no_namespace() {
        assert_eq!(ExpandedName::new(Some(""), "a"), ExpandedName::local("a"));
    }

    #[test]
    fn ncname_checks() {
        assert!(is_ncname("foo-bar.baz"));
        assert!(!is_ncname("1abc"));
        assert!(!is_ncname("a:b"));
        assert!(is_qname("a:b"));
        assert!(!is_qname("a:"));
        assert_eq!(split_qname("p:x"), ("p", "x"));
    }
}
