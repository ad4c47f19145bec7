use rstest::{fixture, rstest};
use stylus_xpath::enumeration::NodeEnumeration;
use stylus_xpath::{
    Context, Controller, Expr, SharedStaticContext, SimpleNode, StandaloneContext, XmlNode, attr,
    elem, simple_doc as doc, text,
};

struct Doc {
    root: SimpleNode,
}

impl Doc {
    fn eval_string(&self, xpath: &str) -> String {
        let e: Expr<SimpleNode> = Expr::parse(xpath, &sc()).expect("parse ok");
        let ctx = Context::for_node(Controller::detached(), self.root.clone());
        e.evaluate_as_string(&ctx).expect("eval ok").to_string()
    }

    fn eval_number(&self, xpath: &str) -> f64 {
        let e: Expr<SimpleNode> = Expr::parse(xpath, &sc()).expect("parse ok");
        let ctx = Context::for_node(Controller::detached(), self.root.clone());
        e.evaluate_as_number(&ctx).expect("eval ok")
    }

    fn eval_bool(&self, xpath: &str) -> bool {
        let e: Expr<SimpleNode> = Expr::parse(xpath, &sc()).expect("parse ok");
        let ctx = Context::for_node(Controller::detached(), self.root.clone());
        e.evaluate_as_boolean(&ctx).expect("eval ok")
    }

    /// String values of the selected nodes, in the order the node-set
    /// delivers them when sorted.
    fn select(&self, xpath: &str) -> Vec<String> {
        let e: Expr<SimpleNode> = Expr::parse(xpath, &sc()).expect("parse ok");
        let ctx = Context::for_node(Controller::detached(), self.root.clone());
        let ns = e.evaluate_as_node_set(&ctx).expect("eval ok");
        let mut enm = ns.enumerate().expect("enumerate ok");
        let mut out = Vec::new();
        while let Some(n) = enm.next_node().expect("next ok") {
            out.push(n.string_value());
        }
        out
    }
}

fn sc() -> SharedStaticContext {
    StandaloneContext::new().shared()
}

#[fixture]
fn library() -> Doc {
    let book = |id: &str, title: &str, price: &str, year: &str| {
        elem("book")
            .attr(attr("id", id))
            .attr(attr("year", year))
            .child(elem("title").child(text(title)))
            .child(elem("price").child(text(price)))
    };
    Doc {
        root: doc()
            .child(
                elem("library")
                    .child(book("b1", "Alpha", "10", "2001"))
                    .child(book("b2", "Beta", "25.5", "1999"))
                    .child(book("b3", "Gamma", "7", "2001"))
                    .child(elem("note").child(text(" many   words  here "))),
            )
            .build(),
    }
}

#[rstest]
#[case("count(//book)", 3.0)]
#[case("sum(//price)", 42.5)]
#[case("count(/library/book[@year = 2001])", 2.0)]
#[case("count(//book[price > 8])", 2.0)]
#[case("count(//title | //price)", 6.0)]
#[case("count(//book/@*)", 6.0)]
#[case("floor(-1.5)", -2.0)]
#[case("ceiling(1.2)", 2.0)]
#[case("round(2.5)", 3.0)]
#[case("round(-2.5)", -2.0)]
#[case("string-length('abc')", 3.0)]
#[case("7 mod -3", 1.0)]
#[case("-7 mod 3", -1.0)]
#[case("number('  12 ')", 12.0)]
#[case("count(//book[last()])", 1.0)]
#[case("count(//book[position() > 1])", 2.0)]
fn numbers(library: Doc, #[case] xpath: &str, #[case] expected: f64) {
    assert_eq!(library.eval_number(xpath), expected, "{xpath}");
}

#[rstest]
#[case("number('x')")]
#[case("0 div 0")]
#[case("sum(//title)")]
fn not_a_number(library: Doc, #[case] xpath: &str) {
    assert!(library.eval_number(xpath).is_nan(), "{xpath}");
}

#[rstest]
#[case("//book[2]/title", "Beta")]
#[case("//book[last()]/title", "Gamma")]
#[case("string(//book[@id = 'b3']/price)", "7")]
#[case("concat('a', 1, true())", "a1true")]
#[case("substring('12345', 1.5, 2.6)", "234")]
#[case("substring('12345', 0, 3)", "12")]
#[case("substring-before('1999/04/01', '/')", "1999")]
#[case("substring-after('1999/04/01', '/')", "04/01")]
#[case("translate('bar', 'abc', 'ABC')", "BAr")]
#[case("translate('--aaa--', 'abc-', 'ABC')", "AAA")]
#[case("normalize-space(//note)", "many words here")]
#[case("name(//book[1]/@*[1])", "id")]
#[case("local-name(/*)", "library")]
#[case("1 div 0", "Infinity")]
#[case("-1 div 0", "-Infinity")]
#[case("0.1 + 0.2", "0.30000000000000004")]
#[case("2.50 * 2", "5")]
#[case("string(1 = 1)", "true")]
#[case("format-number(1234.5, '#,##0.00')", "1,234.50")]
#[case("id('b2 b3')[1]/title", "Beta")]
fn strings(library: Doc, #[case] xpath: &str, #[case] expected: &str) {
    assert_eq!(library.eval_string(xpath), expected, "{xpath}");
}

#[rstest]
#[case("//book[1]/title = 'Alpha'", true)]
#[case("contains('Gamma', 'am')", true)]
#[case("starts-with('Gamma', 'Ga')", true)]
#[case("boolean(//missing)", false)]
#[case("not(//book)", false)]
#[case("//price > 20", true)]
#[case("//price < 5", false)]
#[case("'' or 0", false)]
#[case("//book/@year = //book/@year", true)]
#[case("//book[1]/@year != //book[3]/@year", false)]
#[case("true() and (1 div 0 > 0)", true)]
#[case("lang('en')", false)]
fn booleans(library: Doc, #[case] xpath: &str, #[case] expected: bool) {
    assert_eq!(library.eval_bool(xpath), expected, "{xpath}");
}

#[rstest]
fn selections_are_in_document_order(library: Doc) {
    assert_eq!(library.select("//price | //title"), [
        "Alpha", "10", "Beta", "25.5", "Gamma", "7"
    ]);
    assert_eq!(library.select("//title/ancestor::*[1]/price"), ["10", "25.5", "7"]);
    assert_eq!(library.select("(//book)[last()]/preceding-sibling::book/title"), [
        "Alpha", "Beta"
    ]);
    assert_eq!(library.select("//book[price > 8][2]/title"), ["Beta"]);
}

#[rstest]
fn reverse_axes_count_positions_backwards(library: Doc) {
    assert_eq!(library.select("//note/preceding-sibling::book[1]/title"), ["Gamma"]);
    assert_eq!(library.select("(//note/preceding-sibling::book)[1]/title"), ["Alpha"]);
    assert_eq!(library.select("//price[. = 7]/ancestor-or-self::*[2]/@id"), ["b3"]);
}

#[rstest]
fn a_b_position_predicate_selects_the_second_child() {
    let root = doc()
        .child(
            elem("a")
                .child(elem("b").child(text("one")))
                .child(elem("b").child(text("two")))
                .child(elem("b").child(text("three"))),
        )
        .build();
    let d = Doc { root };
    assert_eq!(d.select("a/b[2]"), ["two"]);
    assert_eq!(d.select("a/b[position() = 0]"), Vec::<String>::new());
    assert_eq!(d.select("a/b[last()]"), ["three"]);
    assert_eq!(d.select("a/b[1.5]"), Vec::<String>::new());
}
