//! Parser for pipe expressions.

use super::ast::{
    ArrowFunction, BinaryOperator, Expr, LogicalOperator, PostfixOp, TemplatePart, UnaryOperator,
};
use super::value::format_number;
use std::sync::Arc;

/// Parses a single expression, optionally followed by one `;`.
pub(crate) fn parse(input: &str) -> Result<Expr, peg::error::ParseError<peg::str::LineCol>> {
    tracing::trace!("parsing pipe expression: '{input}'");
    expression::program(input)
}

fn binary(op: BinaryOperator, x: Expr, y: Expr) -> Expr {
    Expr::Binary(op, Box::new(x), Box::new(y))
}

fn logical(op: LogicalOperator, x: Expr, y: Expr) -> Expr {
    Expr::Logical(op, Box::new(x), Box::new(y))
}

fn unary(op: UnaryOperator, x: Expr) -> Expr {
    Expr::Unary(op, Box::new(x))
}

fn code_point(hex: &str) -> Result<char, &'static str> {
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or("code point")
}

/// How deeply `input` nests, counting open brackets (`(`, `[`, `{`, `${`), calls and indexing,
/// plus every operator inside the groups that are still open. String and template text is
/// skipped. Scanning stops as soon as the depth exceeds `limit`.
///
/// The parser and the interpreter both recurse once per level, so this bounds their stack use
/// before either of them runs.
pub(crate) fn nesting_depth(input: &str, limit: usize) -> usize {
    enum Frame {
        Group { ops: usize },
        Template,
    }

    let mut stack: Vec<Frame> = Vec::new();
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    // Whether the last token ended a value, so that `(` or `[` starts a call or an index.
    let mut after_value = false;

    fn count_op(stack: &mut [Frame], depth: &mut usize) {
        if let Some(Frame::Group { ops }) = stack.last_mut() {
            *ops += 1;
        }
        *depth += 1;
    }

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(Frame::Template) = stack.last() {
            match c {
                '\\' => {
                    chars.next();
                }
                '`' => {
                    stack.pop();
                    after_value = true;
                }
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    stack.push(Frame::Group { ops: 0 });
                    depth += 1;
                    after_value = false;
                }
                _ => {}
            }
        } else {
            match c {
                '\'' | '"' => {
                    while let Some(inner) = chars.next() {
                        match inner {
                            '\\' => {
                                chars.next();
                            }
                            _ if inner == c => break,
                            _ => {}
                        }
                    }
                    after_value = true;
                }
                '`' => stack.push(Frame::Template),
                '(' | '[' | '{' => {
                    if after_value && c != '{' {
                        count_op(&mut stack, &mut depth);
                    }
                    stack.push(Frame::Group { ops: 0 });
                    depth += 1;
                    after_value = false;
                }
                ')' | ']' | '}' => {
                    if let Some(Frame::Group { ops }) = stack.last() {
                        depth -= 1 + ops;
                        stack.pop();
                    }
                    after_value = true;
                }
                '0'..='9' => {
                    while chars
                        .peek()
                        .is_some_and(|next| next.is_ascii_alphanumeric() || *next == '.')
                    {
                        chars.next();
                    }
                    after_value = true;
                }
                'a'..='z' | 'A'..='Z' | '_' | '$' => {
                    let mut word = String::from(c);
                    while let Some(&next) = chars.peek() {
                        if !(next.is_ascii_alphanumeric() || next == '_' || next == '$') {
                            break;
                        }
                        word.push(next);
                        chars.next();
                    }
                    after_value = word != "typeof";
                    if !after_value {
                        count_op(&mut stack, &mut depth);
                    }
                }
                '!' | '-' | '+' | '?' | '.' => {
                    count_op(&mut stack, &mut depth);
                    after_value = false;
                }
                _ if is_binary_operator_char(c) => {
                    while chars.peek().is_some_and(|next| is_binary_operator_char(*next)) {
                        chars.next();
                    }
                    count_op(&mut stack, &mut depth);
                    after_value = false;
                }
                ',' | ':' | ';' => after_value = false,
                _ => {}
            }
        }

        max_depth = max_depth.max(depth);
        if max_depth > limit {
            break;
        }
    }
    max_depth
}

fn is_binary_operator_char(c: char) -> bool {
    matches!(c, '*' | '/' | '%' | '<' | '>' | '=' | '&' | '|')
}

peg::parser! {
    grammar expression() for str {
        pub(crate) rule program() -> Expr =
            _ e:expression() _ (";" _)? ![_] { e }

        rule expression() -> Expr = arrow() / conditional()

        rule arrow() -> Expr =
            params:arrow_params() _ "=>" _ body:expression() {
                Expr::Arrow(Arc::new(ArrowFunction { params, body }))
            }

        rule arrow_params() -> Vec<String> =
            "(" _ params:(identifier() ** (_ "," _)) _ ")" { params } /
            param:identifier() { vec![param] }

        rule conditional() -> Expr = precedence!{
            x:@ _ "?" _ y:expression() _ ":" _ z:(@) {
                Expr::Conditional(Box::new(x), Box::new(y), Box::new(z))
            }
            --
            x:(@) _ "??" _ y:@ { logical(LogicalOperator::Nullish, x, y) }
            --
            x:(@) _ "||" _ y:@ { logical(LogicalOperator::Or, x, y) }
            --
            x:(@) _ "&&" _ y:@ { logical(LogicalOperator::And, x, y) }
            --
            x:(@) _ "===" _ y:@ { binary(BinaryOperator::StrictEquals, x, y) }
            x:(@) _ "!==" _ y:@ { binary(BinaryOperator::StrictNotEquals, x, y) }
            x:(@) _ "==" _ y:@ { binary(BinaryOperator::Equals, x, y) }
            x:(@) _ "!=" _ y:@ { binary(BinaryOperator::NotEquals, x, y) }
            --
            x:(@) _ "<=" _ y:@ { binary(BinaryOperator::LessThanOrEqualTo, x, y) }
            x:(@) _ ">=" _ y:@ { binary(BinaryOperator::GreaterThanOrEqualTo, x, y) }
            x:(@) _ "<" _ y:@ { binary(BinaryOperator::LessThan, x, y) }
            x:(@) _ ">" _ y:@ { binary(BinaryOperator::GreaterThan, x, y) }
            --
            x:(@) _ "+" _ y:@ { binary(BinaryOperator::Add, x, y) }
            x:(@) _ "-" _ y:@ { binary(BinaryOperator::Subtract, x, y) }
            --
            x:(@) _ "*" !"*" _ y:@ { binary(BinaryOperator::Multiply, x, y) }
            x:(@) _ "/" _ y:@ { binary(BinaryOperator::Divide, x, y) }
            x:(@) _ "%" _ y:@ { binary(BinaryOperator::Modulo, x, y) }
            --
            x:@ _ "**" _ y:(@) { binary(BinaryOperator::Power, x, y) }
            --
            "!" _ x:(@) { unary(UnaryOperator::Not, x) }
            "-" _ x:(@) { unary(UnaryOperator::Negate, x) }
            "+" _ x:(@) { unary(UnaryOperator::Plus, x) }
            "typeof" !ident_char() _ x:(@) { unary(UnaryOperator::TypeOf, x) }
            --
            p:postfix() { p }
        }

        rule postfix() -> Expr =
            base:primary() ops:postfix_op()* {
                ops.into_iter().fold(base, |acc, op| op.apply(acc))
            }

        rule postfix_op() -> PostfixOp =
            _ "." _ name:identifier_name() { PostfixOp::Member(name) } /
            _ "[" _ index:expression() _ "]" { PostfixOp::Index(index) } /
            _ "(" _ args:(expression() ** (_ "," _)) _ ("," _)? ")" { PostfixOp::Call(args) }

        rule primary() -> Expr =
            n:number() { Expr::Number(n) } /
            s:string_literal() { Expr::String(s) } /
            template() /
            "true" !ident_char() { Expr::Bool(true) } /
            "false" !ident_char() { Expr::Bool(false) } /
            "null" !ident_char() { Expr::Null } /
            "undefined" !ident_char() { Expr::Undefined } /
            array() /
            object() /
            name:identifier() { Expr::Identifier(name) } /
            "(" _ e:expression() _ ")" { e }

        rule array() -> Expr =
            "[" _ items:(expression() ** (_ "," _)) _ ("," _)? "]" { Expr::Array(items) }

        rule object() -> Expr =
            "{" _ props:(property() ** (_ "," _)) _ ("," _)? "}" { Expr::Object(props) }

        rule property() -> (String, Expr) =
            key:property_key() _ ":" _ value:expression() { (key, value) } /
            name:identifier() { (name.clone(), Expr::Identifier(name)) }

        rule property_key() -> String =
            identifier_name() /
            string_literal() /
            n:number() { format_number(n) }

        rule template() -> Expr =
            "`" parts:template_part()* "`" { Expr::Template(parts) }

        rule template_part() -> TemplatePart =
            "${" _ e:expression() _ "}" { TemplatePart::Expr(e) } /
            chars:template_char()+ { TemplatePart::Text(chars.into_iter().collect()) }

        rule template_char() -> char =
            escape() /
            !"${" c:[^ '`' | '\\'] { c }

        rule string_literal() -> String =
            "\"" chars:(escape() / [^ '"' | '\\' | '\n'])* "\"" { chars.into_iter().collect() } /
            "'" chars:(escape() / [^ '\'' | '\\' | '\n'])* "'" { chars.into_iter().collect() }

        rule escape() -> char =
            "\\" c:escape_body() { c }

        rule escape_body() -> char =
            "n" { '\n' } /
            "t" { '\t' } /
            "r" { '\r' } /
            "b" { '\u{8}' } /
            "f" { '\u{c}' } /
            "v" { '\u{b}' } /
            "0" !['0'..='9'] { '\0' } /
            "x" h:$(hex_digit() hex_digit()) {? code_point(h) } /
            "u{" h:$(hex_digit()+) "}" {? code_point(h) } /
            "u" h:$(hex_digit() hex_digit() hex_digit() hex_digit()) {? code_point(h) } /
            c:[_] { c }

        rule number() -> f64 =
            "0" ['x' | 'X'] h:$(hex_digit()+) !ident_char() {?
                u64::from_str_radix(h, 16).map(|v| v as f64).or(Err("hex literal"))
            } /
            n:$(mantissa() exponent()?) !ident_char() {?
                n.parse::<f64>().or(Err("number literal"))
            }

        rule mantissa() = ['0'..='9']+ ("." ['0'..='9']*)? / "." ['0'..='9']+

        rule exponent() = ['e' | 'E'] ['+' | '-']? ['0'..='9']+

        rule hex_digit() = ['0'..='9' | 'a'..='f' | 'A'..='F']

        rule identifier() -> String =
            !reserved() name:identifier_name() { name }

        rule identifier_name() -> String =
            s:$(ident_start() ident_char()*) { s.to_owned() }

        rule reserved() =
            (
                "true" / "false" / "null" / "undefined" / "typeof" / "new" / "this" /
                "function" / "return" / "delete" / "void" / "in" / "instanceof"
            ) !ident_char()

        rule ident_start() = ['a'..='z' | 'A'..='Z' | '_' | '$']

        rule ident_char() = ['a'..='z' | 'A'..='Z' | '_' | '$' | '0'..='9']

        rule _() -> () = quiet!{[' ' | '\t' | '\n' | '\r']*} {}
    }
}
