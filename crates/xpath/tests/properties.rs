//! Algebraic properties of simplification, reduction, set operations and
//! node-set comparisons.

use rstest::rstest;
use stylus_xpath::enumeration::{NodeEnumeration, collect_nodes};
use stylus_xpath::names::EXSLT_SETS_NAMESPACE;
use stylus_xpath::set_ops::SetOperator;
use stylus_xpath::sort::{SortDataType, SortKey, SortOrder};
use stylus_xpath::{
    Context, Controller, Dependencies, Expr, ExprKind, SharedStaticContext, SimpleNode,
    StandaloneContext, Value, XmlNode, attr, elem, simple_doc as doc, text,
};

fn sc() -> SharedStaticContext {
    StandaloneContext::builder()
        .with_namespace("set", EXSLT_SETS_NAMESPACE)
        .build()
        .shared()
}

fn parse(xpath: &str) -> Expr<SimpleNode> {
    Expr::parse(xpath, &sc()).expect("parse ok")
}

fn numbered() -> SimpleNode {
    let mut list = elem("list");
    for k in 1..=6 {
        list = list.child(elem("n").attr(attr("k", &k.to_string())).child(text(&k.to_string())));
    }
    doc().child(list).build()
}

#[rstest]
#[case("//a[1]/b[position() > 2][last()]")]
#[case("count(x) = 0 and string-length(@y) > 0")]
#[case("(1 + 2) * 3 - -4")]
#[case("a[position() >= 2 and position() <= 4]")]
#[case("//a//b/../@c | /x/y[. = 'z']")]
#[case("(a | b)[false()]")]
#[case("concat('a', string(1 > 0), name())")]
#[case("position() = last() or 3 = position()")]
#[case("set:distinct(//a, @k)")]
fn simplify_is_idempotent(#[case] xpath: &str) {
    let once = parse(xpath);
    let twice = once.simplify();
    assert_eq!(once.to_string(), twice.to_string(), "{xpath}");
}

#[rstest]
#[case("position() * 10 + last()", Dependencies::POSITION | Dependencies::LAST)]
#[case("count(*) + position()", Dependencies::CONTEXT_NODE)]
#[case("string(@k) = position()", Dependencies::CONTEXT_NODE)]
#[case("sum(../n[position() < 3]) * last()", Dependencies::CONTEXT_NODE | Dependencies::LAST)]
#[case("concat(name(), ':', position(), '/', last())", Dependencies::ALL)]
fn reduction_is_sound(#[case] xpath: &str, #[case] mask: Dependencies) {
    let root = numbered();
    let items = root.children()[0].children();
    let e = parse(xpath);

    let first = Context::new(Controller::detached()).with_focus(items[1].clone(), 2, 5);
    let second = Context::new(Controller::detached()).with_focus(items[3].clone(), 4, 6);
    // `second`, except that the dimensions in `mask` come from `first`.
    let (node, position, last) = (
        if mask.contains(Dependencies::CONTEXT_NODE) { &items[1] } else { &items[3] },
        if mask.contains(Dependencies::POSITION) { 2 } else { 4 },
        if mask.contains(Dependencies::LAST) { 5 } else { 6 },
    );
    let merged = Context::new(Controller::detached()).with_focus(node.clone(), position, last);

    let reduced = e.reduce(mask, &first).expect("reduce ok");
    assert_eq!(
        reduced.evaluate_as_string(&second).expect("eval ok"),
        e.evaluate_as_string(&merged).expect("eval ok"),
        "{xpath} reduced to {reduced}"
    );
}

fn nodes(xpath: &str, root: &SimpleNode) -> (Vec<SimpleNode>, bool) {
    let ctx = Context::for_node(Controller::detached(), root.clone());
    let mut enm = parse(xpath).enumerate(&ctx, true).expect("enumerate ok");
    let sorted = enm.is_sorted();
    (collect_nodes(enm.as_mut()).expect("collect ok"), sorted)
}

fn assert_sorted_and_distinct(found: &[SimpleNode]) {
    for pair in found.windows(2) {
        assert_eq!(
            pair[0].compare_document_order(&pair[1]).expect("comparable"),
            core::cmp::Ordering::Less
        );
    }
}

#[rstest]
#[case("//n[@k mod 2 = 0]", "//n[@k > 3]")]
#[case("//n[@k < 3] | //n[@k = 6]", "//n")]
#[case("//n[@k > 10]", "//n[1]")]
#[case("(//n)[last()]/preceding-sibling::n", "//n[@k = 2 or @k = 5]")]
fn set_algebra_laws(#[case] a: &str, #[case] b: &str) {
    let root = numbered();
    let (left, _) = nodes(a, &root);
    let (right, _) = nodes(b, &root);
    let (union, union_sorted) = nodes(&format!("({a}) | ({b})"), &root);
    let (both, both_sorted) = nodes(&format!("set:intersection({a}, {b})"), &root);
    let (only_left, only_left_sorted) = nodes(&format!("set:difference({a}, {b})"), &root);

    assert!(union_sorted && both_sorted && only_left_sorted);
    for found in [&union, &both, &only_left] {
        assert_sorted_and_distinct(found);
    }
    assert_eq!(union.len(), left.len() + right.len() - both.len());
    let expected: Vec<_> = left
        .iter()
        .filter(|n| !both.iter().any(|m| m.is_same_node(n)))
        .cloned()
        .collect();
    assert_eq!(only_left, expected);
}

#[rstest]
fn node_set_comparisons_are_existential() {
    let root = doc()
        .child(
            elem("r")
                .child(elem("v").child(text("1")))
                .child(elem("v").child(text("2"))),
        )
        .build();
    let ctx = Context::for_node(Controller::detached(), root.children()[0].clone());
    let truth = |xpath: &str| parse(xpath).evaluate_as_boolean(&ctx).expect("eval ok");
    assert!(truth("v = 1"));
    assert!(truth("v != 1"));
    assert!(truth("1 = v"));
    assert!(truth("'1' != v"));
    assert!(!truth("not(v = 1)"));
    assert!(!truth("v = 3"));
    assert!(truth("v != 3"));
    assert!(!truth("missing = 1") && !truth("missing != 1"));
}

#[rstest]
fn last_selects_the_final_node_in_document_order() {
    let root = numbered();
    let (found, _) = nodes("(//n[@k = 6]/preceding-sibling::n | //n[1])[last()]", &root);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].string_value(), "5");
    let (found, _) = nodes("//n[position() = 0]", &root);
    assert!(found.is_empty());
}

#[rstest]
#[case(Value::from(""), false)]
#[case(Value::from("false"), true)]
#[case(Value::from(" "), true)]
#[case(Value::from(0.0), false)]
#[case(Value::from(-0.0), false)]
#[case(Value::from(f64::NAN), false)]
#[case(Value::from(0.5), true)]
#[case(Value::from(f64::NEG_INFINITY), true)]
fn boolean_coercion(#[case] value: Value<SimpleNode>, #[case] expected: bool) {
    assert_eq!(value.as_boolean().expect("coerce ok"), expected);
}

#[rstest]
fn count_zero_behaves_like_not() {
    let root = doc()
        .child(elem("r").child(elem("x")).child(elem("y")))
        .build();
    let r = root.children()[0].clone();
    let ctx = Context::for_node(Controller::detached(), r);
    for target in ["x", "z"] {
        let counted = parse(&format!("count({target})=0"));
        let negated = parse(&format!("not({target})"));
        assert_eq!(
            counted.evaluate_as_boolean(&ctx).expect("eval ok"),
            negated.evaluate_as_boolean(&ctx).expect("eval ok"),
            "{target}"
        );
        assert!(
            matches!(counted.kind(), ExprKind::FunctionCall { .. }),
            "count()=0 simplified to {counted}"
        );
    }
}

#[rstest]
fn sorting_by_two_keys_breaks_ties_in_document_order() {
    let item = |id: &str, group: &str, n: &str| {
        elem("item")
            .attr(attr("id", id))
            .attr(attr("group", group))
            .attr(attr("n", n))
    };
    let root = doc()
        .child(
            elem("r")
                .child(item("i1", "B", "1"))
                .child(item("i2", "A", "2"))
                .child(item("i3", "B", "5"))
                .child(item("i4", "A", "2"))
                .child(item("i5", "A", "9")),
        )
        .build();
    let sorted = Expr::new(ExprKind::Sorted {
        base: parse("//item"),
        keys: vec![
            SortKey::new(parse("@group")),
            SortKey::new(parse("@n"))
                .with_data_type(SortDataType::Number)
                .with_order(SortOrder::Descending),
        ],
    });
    let ctx = Context::for_node(Controller::detached(), root.clone());
    let mut enm = sorted.enumerate(&ctx, false).expect("enumerate ok");
    let mut ids = Vec::new();
    while let Some(n) = enm.next_node().expect("next ok") {
        ids.push(n.attributes()[0].string_value());
    }
    assert_eq!(ids, ["i5", "i2", "i4", "i3", "i1"]);
}

fn unsorted_letters() -> SimpleNode {
    let mut r = elem("r");
    for v in ["b", "c", "a"] {
        r = r.child(elem("i").attr(attr("v", v)).child(text(v)));
    }
    doc().child(r).build()
}

fn sorted_by(key: &str) -> Expr<SimpleNode> {
    Expr::new(ExprKind::Sorted {
        base: parse("//i"),
        keys: vec![SortKey::new(parse(key))],
    })
}

fn drain(enm: &mut dyn NodeEnumeration<SimpleNode>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(n) = enm.next_node().expect("next ok") {
        out.push(n.string_value());
    }
    out
}

#[rstest]
fn sorted_node_sets_keep_key_order_after_materializing() {
    let root = unsorted_letters();
    let ctx = Context::for_node(Controller::detached(), root.clone());
    let ns = sorted_by("@v").evaluate_as_node_set(&ctx).expect("eval ok");
    for use_no in 1..=4 {
        let mut enm = ns.enumerate().expect("enumerate ok");
        assert_eq!(drain(enm.as_mut()), ["a", "b", "c"], "use {use_no}");
    }
    assert_eq!(ns.count().expect("count ok"), 3);
    assert_eq!(
        ns.first().expect("first ok").map(|n| n.string_value()),
        Some("b".to_string())
    );
    let mut in_order = ns.enumerate_sorted(true).expect("enumerate ok");
    assert_eq!(drain(in_order.as_mut()), ["b", "c", "a"]);
}

#[rstest]
fn sort_keys_see_each_node_as_current() {
    let root = unsorted_letters();
    let ctx = Context::for_node(Controller::detached(), root.clone());
    let sorted = sorted_by("string(current())");
    assert!(sorted.dependencies().intersection(Dependencies::CURRENT_NODE).is_empty());

    let mut direct = sorted.enumerate(&ctx, false).expect("enumerate ok");
    assert_eq!(drain(direct.as_mut()), ["a", "b", "c"]);

    let ns = sorted.evaluate_as_node_set(&ctx).expect("eval ok");
    let mut via_value = ns.enumerate().expect("enumerate ok");
    assert_eq!(drain(via_value.as_mut()), ["a", "b", "c"]);

    let reduced = sorted.reduce(Dependencies::ALL, &ctx).expect("reduce ok");
    let mut enm = reduced.enumerate(&ctx, false).expect("enumerate ok");
    assert_eq!(drain(enm.as_mut()), ["a", "b", "c"]);
}

#[rstest]
fn union_with_nothing_restores_document_order() {
    let root = unsorted_letters();
    let ctx = Context::for_node(Controller::detached(), root.clone());
    let union = Expr::new(ExprKind::SetOperation {
        op: SetOperator::Union,
        lhs: Expr::value(Value::empty_node_set()),
        rhs: sorted_by("@v"),
    })
    .simplify();
    assert!(matches!(union.kind(), ExprKind::SetOperation { .. }), "{union}");
    let mut enm = union.enumerate(&ctx, false).expect("enumerate ok");
    assert!(enm.is_sorted());
    assert_eq!(drain(enm.as_mut()), ["b", "c", "a"]);

    let plain = Expr::new(ExprKind::SetOperation {
        op: SetOperator::Union,
        lhs: Expr::value(Value::empty_node_set()),
        rhs: parse("//i"),
    })
    .simplify();
    assert!(!matches!(plain.kind(), ExprKind::SetOperation { .. }), "{plain}");
}
