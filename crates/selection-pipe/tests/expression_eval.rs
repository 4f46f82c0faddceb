use pretty_assertions::assert_eq;
use selection_pipe::expr::{EXCEPTION_THROWN, Expression, INVALID_RETURNED_VALUE, evaluate};
use selection_pipe::{Outcome, ParseError};

fn values(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn eval(source: &str) -> Outcome {
    evaluate(source, "text", 0, &values(&["text"])).unwrap()
}

#[test]
fn test_coercion_table() {
    assert_eq!(eval("1+1"), Outcome::value("2"));
    assert_eq!(eval("null"), Outcome::value("null"));
    assert_eq!(eval("undefined"), Outcome::value(""));
    assert_eq!(eval("({a:1})"), Outcome::value(r#"{"a":1}"#));
    assert_eq!(eval("() => 1"), Outcome::failure("Invalid returned value."));
    assert_eq!(eval("true"), Outcome::value("true"));
    assert_eq!(eval("0.1 * 3"), Outcome::value("0.30000000000000004"));
    assert_eq!(eval("1 / 0"), Outcome::value("Infinity"));
    assert_eq!(eval("2 ** 70"), Outcome::value("1.1805916207174113e+21"));
    assert_eq!(eval("$"), Outcome::value("text"));
}

#[test]
fn test_structured_results_keep_key_order() {
    assert_eq!(
        eval("({z: 1, a: [1, undefined, () => 1], f: () => 1, u: undefined, n: NaN})"),
        Outcome::value(r#"{"z":1,"a":[1,null,null],"n":null}"#)
    );
}

#[test]
fn test_exceptions_are_failures() {
    for source in [
        "missing",
        "null.x",
        "undefined()",
        "$.noSuchMethod()",
        "JSON.parse('not json')",
        "[].reduce((a, b) => a)",
        "'a'.repeat(-1)",
    ] {
        assert_eq!(eval(source), Outcome::failure(EXCEPTION_THROWN), "{source}");
    }
    assert_eq!(eval("x => x"), Outcome::failure(INVALID_RETURNED_VALUE));
}

#[test]
fn test_calling_convention() {
    let all = values(&["b", "a", "c"]);
    let expr = Expression::compile("`${i}:${$}:${$$.slice().sort().join('')}`").unwrap();
    assert_eq!(
        expr.evaluate_all(&all),
        vec![
            Outcome::value("0:b:abc"),
            Outcome::value("1:a:abc"),
            Outcome::value("2:c:abc"),
        ]
    );
}

#[test]
fn test_evaluation_cannot_mutate_shared_values() {
    let all = values(&["b", "a"]);
    // `sort` and `reverse` return copies; `$$` seen by later selections is unchanged.
    let expr = Expression::compile("$$.sort().reverse().join() + '|' + $$.join()").unwrap();
    assert_eq!(
        expr.evaluate_all(&all),
        vec![Outcome::value("b,a|b,a"), Outcome::value("b,a|b,a")]
    );
    assert_eq!(all, values(&["b", "a"]));
}

#[test]
fn test_compile_failure_is_a_parse_error() {
    assert_eq!(
        evaluate("$ $", "x", 0, &values(&["x"])).unwrap_err(),
        ParseError::InvalidExpression
    );
    assert_eq!(
        Expression::compile("x = 1").unwrap_err(),
        ParseError::InvalidExpression
    );
}

#[test]
fn test_practical_expressions() {
    let all = values(&["  padded  ", "3", "x,y,z"]);
    let cases = [
        ("$.trim()", 0, "padded"),
        ("Number($) * 2", 1, "6"),
        ("$.split(',').map(s => s.toUpperCase()).join('-')", 2, "X-Y-Z"),
        ("String(i + 1).padStart(3, '0')", 1, "002"),
        ("$$.length", 0, "3"),
        ("$.length > 3 ? 'long' : 'short'", 1, "short"),
        ("JSON.stringify($.split(','))", 2, r#"["x","y","z"]"#),
    ];

    for (source, index, expected) in cases {
        let outcome = evaluate(source, &all[index], index, &all).unwrap();
        assert_eq!(outcome, Outcome::value(expected), "{source}");
    }
}
