//! Sorting a node-set by explicit sort keys.

use core::cmp::Ordering;

use crate::context::Context;
use crate::enumeration::BoxedEnumeration;
use crate::error::Result;
use crate::expr::Expr;
use crate::model::XmlNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDataType {
    #[default]
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaseOrder {
    #[default]
    UpperFirst,
    LowerFirst,
}

/// One component of a sort specification, major keys first.
#[derive(Debug, Clone)]
pub struct SortKey<N: XmlNode> {
    pub expr: Expr<N>,
    pub order: SortOrder,
    pub data_type: SortDataType,
    pub case_order: CaseOrder,
    /// Recorded for the host; comparison is by code point after case folding.
    pub lang: Option<String>,
}

impl<N: XmlNode> SortKey<N> {
    pub fn new(expr: Expr<N>) -> Self {
        Self {
            expr,
            order: SortOrder::default(),
            data_type: SortDataType::default(),
            case_order: CaseOrder::default(),
            lang: None,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_data_type(mut self, data_type: SortDataType) -> Self {
        self.data_type = data_type;
        self
    }

    #[must_use]
    pub fn with_case_order(mut self, case_order: CaseOrder) -> Self {
        self.case_order = case_order;
        self
    }

    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    fn compare(&self, a: &KeyValue, b: &KeyValue) -> Ordering {
        let o = match (a, b) {
            (KeyValue::Number(x), KeyValue::Number(y)) => compare_numbers(*x, *y),
            (KeyValue::Text { folded: fa, raw: ra }, KeyValue::Text { folded: fb, raw: rb }) => {
                fa.cmp(fb).then_with(|| compare_case(ra, rb, self.case_order))
            }
            // Mixed kinds cannot arise from one key.
            _ => Ordering::Equal,
        };
        match self.order {
            SortOrder::Ascending => o,
            SortOrder::Descending => o.reverse(),
        }
    }
}

#[derive(Debug, Clone)]
enum KeyValue {
    Text { folded: String, raw: String },
    Number(f64),
}

/// NaN sorts before every number.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn compare_case(a: &str, b: &str, case_order: CaseOrder) -> Ordering {
    for (x, y) in a.chars().zip(b.chars()) {
        if x == y {
            continue;
        }
        let upper_first = match (x.is_uppercase(), y.is_uppercase()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => x.cmp(&y),
        };
        return match case_order {
            CaseOrder::UpperFirst => upper_first,
            CaseOrder::LowerFirst => upper_first.reverse(),
        };
    }
    a.len().cmp(&b.len())
}

struct Record<N> {
    node: N,
    keys: Vec<KeyValue>,
}

/// Evaluate every key for every node of `base` (which must be in document
/// order) and return the nodes in key order, ties kept in document order.
pub fn sort_nodes<N: XmlNode>(
    mut base: BoxedEnumeration<N>,
    keys: &[SortKey<N>],
    context: &Context<N>,
) -> Result<Vec<N>> {
    let mut nodes = Vec::new();
    while let Some(n) = base.next_node()? {
        nodes.push(n);
    }
    let last = nodes.len();
    let mut records = Vec::with_capacity(last);
    for (i, node) in nodes.into_iter().enumerate() {
        let focus = context
            .with_focus(node.clone(), i + 1, last)
            .with_current_node(node.clone());
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(match key.data_type {
                SortDataType::Number => KeyValue::Number(key.expr.evaluate_as_number(&focus)?),
                SortDataType::Text => {
                    let raw = key.expr.evaluate_as_string(&focus)?.to_string();
                    KeyValue::Text {
                        folded: raw.to_lowercase(),
                        raw,
                    }
                }
            });
        }
        records.push(Record { node, keys: values });
    }
    records.sort_by(|a, b| {
        keys.iter()
            .zip(a.keys.iter().zip(&b.keys))
            .map(|(k, (x, y))| k.compare(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(records.into_iter().map(|r| r.node).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_sorts_first() {
        assert_eq!(compare_numbers(f64::NAN, -1e300), Ordering::Less);
        assert_eq!(compare_numbers(2.0, 1.0), Ordering::Greater);
    }

    #[test]
    fn case_order_breaks_folded_ties() {
        assert_eq!(compare_case("Apple", "apple", CaseOrder::UpperFirst), Ordering::Less);
        assert_eq!(compare_case("Apple", "apple", CaseOrder::LowerFirst), Ordering::Greater);
    }
}
