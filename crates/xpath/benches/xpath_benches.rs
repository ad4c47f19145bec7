use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use stylus_xpath::enumeration::NodeEnumeration;
use stylus_xpath::{
    Context, Controller, Dependencies, Expr, SharedStaticContext, SimpleNode, StandaloneContext,
    attr, elem, simple_doc, text,
};

fn sample_queries() -> Vec<&'static str> {
    vec![
        "1 + 2 * 3",
        "string-length('Lorem ipsum dolor sit amet, consectetur adipiscing elit.')",
        "/root/section/item[@type='a'][position() < 5]/@id",
        "count(//item[@featured = 'true']) = 0",
        "//section[@name = 'beta']/item[last()]",
        "sum(//item/@rank) div count(//item)",
    ]
}

fn static_context() -> SharedStaticContext {
    StandaloneContext::new().shared()
}

fn benchmark_parser(c: &mut Criterion) {
    let queries = sample_queries();
    let sc = static_context();
    c.bench_function("parser/parse_and_simplify", |b| {
        b.iter(|| {
            for q in &queries {
                let e: Expr<SimpleNode> = Expr::parse(black_box(q), &sc).expect("parse failure");
                black_box(e);
            }
        });
    });
}

fn build_sample_document(sections: usize, items: usize) -> SimpleNode {
    let mut root = elem("root").attr(attr("xml:lang", "en"));
    for s in 0..sections {
        let mut section = elem("section").attr(attr("name", if s % 2 == 0 { "alpha" } else { "beta" }));
        for i in 0..items {
            section = section.child(
                elem("item")
                    .attr(attr("id", &format!("item-{s}-{i}")))
                    .attr(attr("type", if i % 3 == 0 { "a" } else { "b" }))
                    .attr(attr("rank", &(i % 7).to_string()))
                    .child(text(&format!("Item {i} of section {s}"))),
            );
        }
        root = root.child(section);
    }
    simple_doc().child(root).build()
}

fn benchmark_evaluator(c: &mut Criterion) {
    let document = build_sample_document(20, 50);
    let sc = static_context();
    let ctx = Context::for_node(Controller::detached(), document.clone());

    let mut group = c.benchmark_group("evaluator/evaluate");
    for q in sample_queries() {
        let e: Expr<SimpleNode> = Expr::parse(q, &sc).expect("parse failure");
        group.bench_with_input(BenchmarkId::from_parameter(q), &e, |b, e| {
            b.iter(|| black_box(e.evaluate(black_box(&ctx)).expect("eval failure")));
        });
    }
    group.finish();
}

/// First node of a long path: lazy enumeration stops early, a materialized
/// node-set does not.
fn benchmark_first_node(c: &mut Criterion) {
    let document = build_sample_document(50, 100);
    let sc = static_context();
    let ctx = Context::for_node(Controller::detached(), document.clone());
    let e: Expr<SimpleNode> = Expr::parse("/root/section/item", &sc).expect("parse failure");

    let mut group = c.benchmark_group("evaluator/first_node");
    group.bench_function("lazy", |b| {
        b.iter(|| {
            let mut enm = e.enumerate(&ctx, true).expect("enumerate failure");
            black_box(enm.next_node().expect("next failure"));
        });
    });
    group.bench_function("materialized", |b| {
        b.iter(|| {
            let ns = e.evaluate_as_node_set(&ctx).expect("eval failure");
            black_box(ns.materialize().expect("materialize failure").first().expect("first failure"));
        });
    });
    group.finish();
}

fn benchmark_reduce(c: &mut Criterion) {
    let document = build_sample_document(5, 10);
    let sc = static_context();
    let ctx = Context::for_node(Controller::detached(), document.clone()).with_focus(document.clone(), 3, 9);
    let e: Expr<SimpleNode> =
        Expr::parse("concat(name(/*), position(), last(), count(//item))", &sc).expect("parse failure");
    c.bench_function("expr/reduce_all", |b| {
        b.iter(|| black_box(e.reduce(Dependencies::ALL, &ctx).expect("reduce failure")));
    });
}

criterion_group!(
    benches,
    benchmark_parser,
    benchmark_evaluator,
    benchmark_first_node,
    benchmark_reduce
);
criterion_main!(benches);
