//! Sandboxed evaluation of JavaScript-style expressions against selection text.
//!
//! Each evaluation sees exactly three names: `$` (the current selection's text), `i` (its
//! index) and `$$` (the text of every selection, in order). The language is a pure expression
//! subset: literals, operators, template strings, arrow functions, member access and calls to
//! a fixed set of builtins. There is no assignment and no access to the host.
//!
//! The result is turned into text:
//!
//! | result                | text                        |
//! |-----------------------|-----------------------------|
//! | string                | itself                      |
//! | `null`                | `null`                      |
//! | `undefined`           | empty                       |
//! | number, boolean       | their string form           |
//! | array, object         | compact JSON                |
//! | function              | failure                     |
//!
//! ```
//! use selection_pipe::expr::Expression;
//! use selection_pipe::Outcome;
//!
//! let expr = Expression::compile("`${i}: ${$.toUpperCase()}`").unwrap();
//! let values = vec!["a".to_string(), "b".to_string()];
//! assert_eq!(expr.evaluate("b", 1, &values), Outcome::Value("1: B".to_string()));
//! ```

mod ast;
mod grammar;
mod interp;
mod value;

use crate::error::ParseError;
use crate::outcome::Outcome;
use interp::{Interpreter, Scope};
use std::sync::Arc;
use value::{Value, format_number};

/// Failure text when the expression throws.
pub const EXCEPTION_THROWN: &str = "Exception thrown in given expression.";
/// Failure text when the expression evaluates to something that has no text form.
pub const INVALID_RETURNED_VALUE: &str = "Invalid returned value.";

/// Deepest nesting of groups and operators an expression may have.
pub const MAX_NESTING: usize = 64;

/// A compiled expression, cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    body: Arc<ast::Expr>,
}

impl Expression {
    /// Compiles `source`, rejecting anything that is not a single expression.
    ///
    /// Expressions nested deeper than [`MAX_NESTING`] are rejected before parsing.
    pub fn compile(source: &str) -> Result<Self, ParseError> {
        if grammar::nesting_depth(source, MAX_NESTING) > MAX_NESTING {
            tracing::debug!("expression nests deeper than {MAX_NESTING} levels");
            return Err(ParseError::InvalidExpression);
        }
        let body = grammar::parse(source).map_err(|err| {
            tracing::debug!("invalid expression '{source}': {err}");
            ParseError::InvalidExpression
        })?;
        Ok(Self {
            source: source.to_string(),
            body: Arc::new(body),
        })
    }

    /// The source text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates for one selection, with `$ = value`, `i = index` and `$$ = all_values`.
    pub fn evaluate(&self, value: &str, index: usize, all_values: &[String]) -> Outcome {
        self.evaluate_with(value, index, &values_array(all_values))
    }

    /// Evaluates once per entry of `values`, in order.
    pub fn evaluate_all(&self, values: &[String]) -> Vec<Outcome> {
        let all = values_array(values);
        values
            .iter()
            .enumerate()
            .map(|(index, value)| self.evaluate_with(value, index, &all))
            .collect()
    }

    fn evaluate_with(&self, value: &str, index: usize, all: &Value) -> Outcome {
        let scope = Scope::root(vec![
            ("$".to_string(), Value::string(value)),
            ("i".to_string(), Value::Number(index as f64)),
            ("$$".to_string(), all.clone()),
        ]);

        match Interpreter::new().eval(&self.body, &scope) {
            Ok(result) => coerce(result),
            Err(exception) => {
                tracing::debug!(index, "expression '{}' threw: {exception}", self.source);
                Outcome::failure(EXCEPTION_THROWN)
            }
        }
    }
}

/// Compiles and evaluates `source` for a single selection.
pub fn evaluate(
    source: &str,
    value: &str,
    index: usize,
    all_values: &[String],
) -> Result<Outcome, ParseError> {
    Ok(Expression::compile(source)?.evaluate(value, index, all_values))
}

fn values_array(values: &[String]) -> Value {
    Value::array(values.iter().map(|v| Value::string(v.as_str())).collect())
}

fn coerce(value: Value) -> Outcome {
    match value {
        Value::String(s) => Outcome::value(s.to_string()),
        Value::Null => Outcome::value("null"),
        Value::Undefined => Outcome::value(""),
        Value::Bool(b) => Outcome::value(b.to_string()),
        Value::Number(n) => Outcome::value(format_number(n)),
        Value::Function(_) => Outcome::failure(INVALID_RETURNED_VALUE),
        compound @ (Value::Array(_) | Value::Object(_)) => compound
            .to_json()
            .and_then(|json| serde_json::to_string(&json).ok())
            .map_or_else(|| Outcome::failure(INVALID_RETURNED_VALUE), Outcome::value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, value: &str) -> Outcome {
        evaluate(source, value, 0, &[value.to_string()]).unwrap()
    }

    #[test]
    fn test_coercion() {
        assert_eq!(eval("$.length", "hello"), Outcome::value("5"));
        assert_eq!(eval("null", "x"), Outcome::value("null"));
        assert_eq!(eval("undefined", "x"), Outcome::value(""));
        assert_eq!(
            eval("[1, 'a', null]", "x"),
            Outcome::value(r#"[1,"a",null]"#)
        );
        assert_eq!(eval("({n: 1.5})", "x"), Outcome::value(r#"{"n":1.5}"#));
        assert_eq!(eval("1 > 2", "x"), Outcome::value("false"));
        assert_eq!(
            eval("() => 1", "x"),
            Outcome::failure(INVALID_RETURNED_VALUE)
        );
        assert_eq!(eval("$.nope()", "x"), Outcome::failure(EXCEPTION_THROWN));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            Expression::compile("$ +").unwrap_err(),
            ParseError::InvalidExpression
        );
        assert_eq!(
            Expression::compile("").unwrap_err(),
            ParseError::InvalidExpression
        );
        assert_eq!(
            Expression::compile("$.trim()").unwrap().source(),
            "$.trim()"
        );
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(
            Expression::compile(&parens).unwrap_err(),
            ParseError::InvalidExpression
        );
        let nots = format!("{}1", "!".repeat(10_000));
        assert_eq!(
            Expression::compile(&nots).unwrap_err(),
            ParseError::InvalidExpression
        );
        let calls = format!("(x => x){}", "(1)".repeat(10_000));
        assert_eq!(
            Expression::compile(&calls).unwrap_err(),
            ParseError::InvalidExpression
        );
        let sums = vec!["1"; 10_000].join(" + ");
        assert_eq!(
            Expression::compile(&sums).unwrap_err(),
            ParseError::InvalidExpression
        );

        let allowed = format!("{}$.length{}", "(".repeat(40), ")".repeat(40));
        let expr = Expression::compile(&allowed).unwrap();
        assert_eq!(expr.evaluate("abc", 0, &[]), Outcome::value("3"));
    }

    #[test]
    fn test_brackets_in_text_do_not_nest() {
        let quoted = format!("'{}' + `{}${{i}}`", "(".repeat(1_000), "[".repeat(1_000));
        let expr = Expression::compile(&quoted).unwrap();
        let Outcome::Value(text) = expr.evaluate("x", 7, &[]) else {
            panic!("expected a value");
        };
        assert!(text.ends_with("[7"));
    }

    #[test]
    fn test_evaluate_all_sees_every_value() {
        let expr = Expression::compile("$$.indexOf($) === i && $$.length === 3").unwrap();
        let values: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(expr.evaluate_all(&values), vec![Outcome::value("true"); 3]);
    }

    #[test]
    fn test_expression_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Expression>();
    }
}
