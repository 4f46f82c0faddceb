//! Tree-walking evaluation of pipe expressions.
//!
//! The interpreter only ever sees the names bound in its [`Scope`] plus a fixed set of pure
//! builtins (`Math`, `JSON`, `String`, ...). There is no assignment, no I/O and no way to reach
//! the host process. Values are immutable, so evaluated code cannot observe or change state
//! belonging to other selections or to the caller.

use super::ast::{BinaryOperator, Expr, LogicalOperator, TemplatePart, UnaryOperator};
use super::value::{Function, Value, format_number};
use std::cmp::Ordering;
use std::rc::Rc;

const MAX_CALL_DEPTH: usize = 64;
const MAX_STRING_LENGTH: usize = 1 << 24;

/// A JavaScript-style exception. The message is for logs only and never reaches the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub(crate) struct Exception(pub(crate) String);

type EvalResult = Result<Value, Exception>;

fn throw<T>(message: impl Into<String>) -> Result<T, Exception> {
    Err(Exception(message.into()))
}

/// Lexical scope: bound names plus the enclosing scope.
#[derive(Debug, Clone)]
pub(crate) struct Scope(Rc<Frame>);

#[derive(Debug)]
struct Frame {
    vars: Vec<(String, Value)>,
    parent: Option<Scope>,
}

impl Scope {
    pub(crate) fn root(vars: Vec<(String, Value)>) -> Self {
        Scope(Rc::new(Frame { vars, parent: None }))
    }

    fn child(&self, vars: Vec<(String, Value)>) -> Self {
        Scope(Rc::new(Frame {
            vars,
            parent: Some(self.clone()),
        }))
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some((_, value)) = scope.0.vars.iter().rev().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
            frame = scope.0.parent.as_ref();
        }
        None
    }
}

/// Builtin functions reachable through globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Native {
    String,
    Number,
    Boolean,
    ParseInt,
    ParseFloat,
    IsNaN,
    MathAbs,
    MathFloor,
    MathCeil,
    MathRound,
    MathTrunc,
    MathSign,
    MathSqrt,
    MathCbrt,
    MathPow,
    MathMin,
    MathMax,
    MathLog,
    MathLog2,
    MathLog10,
    MathExp,
    JsonStringify,
    JsonParse,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ArrayIsArray,
}

fn native(native: Native) -> Value {
    Value::function(Function::Native(native))
}

fn namespace(members: &[(&str, Value)]) -> Value {
    Value::object(
        members
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect(),
    )
}

fn global(name: &str) -> Option<Value> {
    let value = match name {
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        "String" => native(Native::String),
        "Number" => native(Native::Number),
        "Boolean" => native(Native::Boolean),
        "parseInt" => native(Native::ParseInt),
        "parseFloat" => native(Native::ParseFloat),
        "isNaN" => native(Native::IsNaN),
        "Math" => namespace(&[
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
            ("abs", native(Native::MathAbs)),
            ("floor", native(Native::MathFloor)),
            ("ceil", native(Native::MathCeil)),
            ("round", native(Native::MathRound)),
            ("trunc", native(Native::MathTrunc)),
            ("sign", native(Native::MathSign)),
            ("sqrt", native(Native::MathSqrt)),
            ("cbrt", native(Native::MathCbrt)),
            ("pow", native(Native::MathPow)),
            ("min", native(Native::MathMin)),
            ("max", native(Native::MathMax)),
            ("log", native(Native::MathLog)),
            ("log2", native(Native::MathLog2)),
            ("log10", native(Native::MathLog10)),
            ("exp", native(Native::MathExp)),
        ]),
        "JSON" => namespace(&[
            ("stringify", native(Native::JsonStringify)),
            ("parse", native(Native::JsonParse)),
        ]),
        "Object" => namespace(&[
            ("keys", native(Native::ObjectKeys)),
            ("values", native(Native::ObjectValues)),
            ("entries", native(Native::ObjectEntries)),
        ]),
        "Array" => namespace(&[("isArray", native(Native::ArrayIsArray))]),
        _ => return None,
    };
    Some(value)
}

const STRING_METHODS: &[&str] = &[
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "split",
    "replace",
    "replaceAll",
    "includes",
    "startsWith",
    "endsWith",
    "indexOf",
    "lastIndexOf",
    "slice",
    "substring",
    "charAt",
    "charCodeAt",
    "at",
    "repeat",
    "padStart",
    "padEnd",
    "concat",
    "localeCompare",
    "toString",
];

const ARRAY_METHODS: &[&str] = &[
    "join", "map", "filter", "reduce", "forEach", "some", "every", "find", "findIndex", "indexOf",
    "includes", "slice", "concat", "reverse", "sort", "at", "flat", "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// `ToIntegerOrInfinity`, with `default` for a missing/undefined argument.
fn int_arg(args: &[Value], index: usize, default: f64) -> f64 {
    match args.get(index) {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() { 0.0 } else { n.trunc() }
        }
    }
}

/// Resolve a possibly negative index against `len`, clamped to `0..=len`.
fn relative_index(n: f64, len: usize) -> usize {
    let len_f = len as f64;
    let resolved = if n < 0.0 {
        (len_f + n).max(0.0)
    } else {
        n.min(len_f)
    };
    resolved as usize
}

fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

fn check_length(len: usize) -> Result<(), Exception> {
    if len > MAX_STRING_LENGTH {
        return throw("RangeError: Invalid string length");
    }
    Ok(())
}

fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// `SameValueZero`, used by `includes`.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() && y.is_nullish() => true,
        (x, y) if x.is_nullish() || y.is_nullish() => false,
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            a.to_number() == b.to_number()
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(a.to_number()), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(b.to_number())),
        (
            Value::Array(_) | Value::Object(_) | Value::Function(_),
            Value::Number(_) | Value::String(_),
        ) => loose_equals(&a.to_primitive(), b),
        (
            Value::Number(_) | Value::String(_),
            Value::Array(_) | Value::Object(_) | Value::Function(_),
        ) => loose_equals(a, &b.to_primitive()),
        _ => strict_equals(a, b),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.to_primitive(), b.to_primitive()) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(&y)),
        (x, y) => x.to_number().partial_cmp(&y.to_number()),
    }
}

fn parse_int(input: &str, radix: f64) -> f64 {
    let mut s = input.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let mut radix = if radix.is_nan() { 0 } else { radix.trunc() as i64 };
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let radix = radix as u32;
    let mut result: Option<f64> = None;
    for digit in s.chars().map_while(|c| c.to_digit(radix)) {
        result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    result.map_or(f64::NAN, |n| sign * n)
}

fn parse_float(input: &str) -> f64 {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if !s[digits_start..end].bytes().any(|b| b.is_ascii_digit()) {
        return f64::NAN;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

fn number_to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        return format_number(n);
    }
    let negative = n < 0.0;
    let mut magnitude = n.abs();
    let mut digits = Vec::new();
    while magnitude >= 1.0 {
        let digit = (magnitude % f64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        magnitude = (magnitude / f64::from(radix)).floor();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

/// Evaluates expressions; tracks call depth so runaway recursion becomes an exception.
pub(crate) struct Interpreter {
    depth: usize,
}

impl Interpreter {
    pub(crate) fn new() -> Self {
        Self { depth: 0 }
    }

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Scope) -> EvalResult {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::string(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => {
                            out.push_str(&self.eval(expr, scope)?.to_display());
                        }
                    }
                    check_length(out.len())?;
                }
                Ok(Value::string(out))
            }
            Expr::Identifier(name) => match scope.lookup(name).or_else(|| global(name)) {
                Some(value) => Ok(value),
                None => throw(format!("ReferenceError: {name} is not defined")),
            },
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::array(values))
            }
            Expr::Object(props) => {
                let mut values = Vec::with_capacity(props.len());
                for (key, value) in props {
                    values.push((key.clone(), self.eval(value, scope)?));
                }
                Ok(Value::object(values))
            }
            Expr::Member(object, name) => {
                let object = self.eval(object, scope)?;
                self.get_member(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object, scope)?;
                let key = match self.eval(index, scope)? {
                    Value::Number(n) => format_number(n),
                    other => other.to_display(),
                };
                self.get_member(&object, &key)
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(&callee, args)
            }
            Expr::Unary(UnaryOperator::TypeOf, operand) => {
                // `typeof` of an unbound name is "undefined", not a ReferenceError.
                let value = match &**operand {
                    Expr::Identifier(name) => scope
                        .lookup(name)
                        .or_else(|| global(name))
                        .unwrap_or(Value::Undefined),
                    other => self.eval(other, scope)?,
                };
                Ok(Value::string(value.type_of()))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOperator::Not => Value::Bool(!value.truthy()),
                    UnaryOperator::Negate => Value::Number(-value.to_number()),
                    UnaryOperator::Plus | UnaryOperator::TypeOf => Value::Number(value.to_number()),
                })
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                Self::binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOperator::And => !left.truthy(),
                    LogicalOperator::Or => left.truthy(),
                    LogicalOperator::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Arrow(function) => Ok(Value::function(Function::Arrow {
                function: function.clone(),
                scope: scope.clone(),
            })),
        }
    }

    fn binary(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult {
        let number = |f: fn(f64, f64) -> f64| -> EvalResult {
            Ok(Value::Number(f(left.to_number(), right.to_number())))
        };

        match op {
            BinaryOperator::Add => match (left.to_primitive(), right.to_primitive()) {
                (l @ Value::String(_), r) | (l, r @ Value::String(_)) => {
                    let mut out = l.to_display();
                    out.push_str(&r.to_display());
                    check_length(out.len())?;
                    Ok(Value::string(out))
                }
                (l, r) => Ok(Value::Number(l.to_number() + r.to_number())),
            },
            BinaryOperator::Subtract => number(|a, b| a - b),
            BinaryOperator::Multiply => number(|a, b| a * b),
            BinaryOperator::Divide => number(|a, b| a / b),
            BinaryOperator::Modulo => number(|a, b| a % b),
            BinaryOperator::Power => number(|a, b| if b.is_nan() { f64::NAN } else { a.powf(b) }),
            BinaryOperator::StrictEquals => Ok(Value::Bool(strict_equals(left, right))),
            BinaryOperator::StrictNotEquals => Ok(Value::Bool(!strict_equals(left, right))),
            BinaryOperator::Equals => Ok(Value::Bool(loose_equals(left, right))),
            BinaryOperator::NotEquals => Ok(Value::Bool(!loose_equals(left, right))),
            BinaryOperator::LessThan => {
                Ok(Value::Bool(compare(left, right) == Some(Ordering::Less)))
            }
            BinaryOperator::GreaterThan => {
                Ok(Value::Bool(compare(left, right) == Some(Ordering::Greater)))
            }
            BinaryOperator::LessThanOrEqualTo => Ok(Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinaryOperator::GreaterThanOrEqualTo => Ok(Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ))),
        }
    }

    fn get_member(&self, object: &Value, key: &str) -> EvalResult {
        let method = |names: &[&str]| {
            if names.contains(&key) {
                Value::function(Function::Method {
                    receiver: object.clone(),
                    name: Rc::from(key),
                })
            } else {
                Value::Undefined
            }
        };

        Ok(match object {
            Value::Undefined | Value::Null => {
                return throw(format!(
                    "TypeError: Cannot read properties of {} (reading '{key}')",
                    object.to_display()
                ));
            }
            Value::String(s) => match key {
                "length" => Value::Number(s.chars().count() as f64),
                _ => match array_index(key) {
                    Some(index) => s
                        .chars()
                        .nth(index)
                        .map_or(Value::Undefined, |c| Value::string(c.to_string())),
                    None => method(STRING_METHODS),
                },
            },
            Value::Array(items) => match key {
                "length" => Value::Number(items.len() as f64),
                _ => match array_index(key) {
                    Some(index) => items.get(index).cloned().unwrap_or(Value::Undefined),
                    None => method(ARRAY_METHODS),
                },
            },
            Value::Object(props) => Value::property(props, key).unwrap_or(Value::Undefined),
            Value::Number(_) => method(NUMBER_METHODS),
            Value::Bool(_) => method(&["toString"]),
            Value::Function(_) => Value::Undefined,
        })
    }

    fn call(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult {
        let Value::Function(function) = callee else {
            return throw(format!("TypeError: {} is not a function", callee.type_of()));
        };

        match &**function {
            Function::Arrow { function, scope } => {
                if self.depth >= MAX_CALL_DEPTH {
                    return throw("RangeError: Maximum call stack size exceeded");
                }
                let mut args = args.into_iter();
                let vars = function
                    .params
                    .iter()
                    .map(|param| (param.clone(), args.next().unwrap_or(Value::Undefined)))
                    .collect();
                let scope = scope.child(vars);

                self.depth += 1;
                let result = self.eval(&function.body, &scope);
                self.depth -= 1;
                result
            }
            Function::Native(native) => self.call_native(*native, &args),
            Function::Method { receiver, name } => self.call_method(receiver, name, &args),
        }
    }

    fn call_native(&mut self, native: Native, args: &[Value]) -> EvalResult {
        let first = arg(args, 0);
        let math = |f: fn(f64) -> f64| -> EvalResult {
            Ok(Value::Number(f(first.to_number())))
        };

        match native {
            Native::String => Ok(Value::string(match args.first() {
                Some(value) => value.to_display(),
                None => String::new(),
            })),
            Native::Number => Ok(Value::Number(match args.first() {
                Some(value) => value.to_number(),
                None => 0.0,
            })),
            Native::Boolean => Ok(Value::Bool(first.truthy())),
            Native::ParseInt => Ok(Value::Number(parse_int(
                &first.to_display(),
                arg(args, 1).to_number(),
            ))),
            Native::ParseFloat => Ok(Value::Number(parse_float(&first.to_display()))),
            Native::IsNaN => Ok(Value::Bool(first.to_number().is_nan())),
            Native::MathAbs => math(f64::abs),
            Native::MathFloor => math(f64::floor),
            Native::MathCeil => math(f64::ceil),
            Native::MathRound => math(|x| (x + 0.5).floor()),
            Native::MathTrunc => math(f64::trunc),
            Native::MathSign => math(|x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
            Native::MathSqrt => math(f64::sqrt),
            Native::MathCbrt => math(f64::cbrt),
            Native::MathLog => math(f64::ln),
            Native::MathLog2 => math(f64::log2),
            Native::MathLog10 => math(f64::log10),
            Native::MathExp => math(f64::exp),
            Native::MathPow => Self::binary(BinaryOperator::Power, &first, &arg(args, 1)),
            Native::MathMin | Native::MathMax => {
                let mut result = if native == Native::MathMin {
                    f64::INFINITY
                } else {
                    f64::NEG_INFINITY
                };
                for value in args {
                    let n = value.to_number();
                    if n.is_nan() {
                        return Ok(Value::Number(f64::NAN));
                    }
                    result = if native == Native::MathMin {
                        result.min(n)
                    } else {
                        result.max(n)
                    };
                }
                Ok(Value::Number(result))
            }
            Native::JsonStringify => Ok(stringify(&first, &arg(args, 2))),
            Native::JsonParse => {
                match serde_json::from_str::<serde_json::Value>(&first.to_display()) {
                    Ok(json) => Ok(Value::from_json(&json)),
                    Err(err) => throw(format!("SyntaxError: {err}")),
                }
            }
            Native::ObjectKeys | Native::ObjectValues | Native::ObjectEntries => {
                let entries: Vec<(String, Value)> = match &first {
                    Value::Undefined | Value::Null => {
                        return throw("TypeError: Cannot convert undefined or null to object");
                    }
                    Value::Object(props) => {
                        let mut seen: Vec<(String, Value)> = Vec::with_capacity(props.len());
                        for (key, value) in props.iter() {
                            match seen.iter_mut().find(|(k, _)| k == key) {
                                Some(slot) => slot.1 = value.clone(),
                                None => seen.push((key.clone(), value.clone())),
                            }
                        }
                        seen
                    }
                    Value::Array(items) => items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v.clone()))
                        .collect(),
                    Value::String(s) => s
                        .chars()
                        .enumerate()
                        .map(|(i, c)| (i.to_string(), Value::string(c.to_string())))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(Value::array(
                    entries
                        .into_iter()
                        .map(|(key, value)| match native {
                            Native::ObjectKeys => Value::string(key),
                            Native::ObjectValues => value,
                            _ => Value::array(vec![Value::string(key), value]),
                        })
                        .collect(),
                ))
            }
            Native::ArrayIsArray => Ok(Value::Bool(matches!(first, Value::Array(_)))),
        }
    }

    fn call_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> EvalResult {
        match receiver {
            Value::String(s) => self.string_method(s, name, args),
            Value::Array(items) => self.array_method(receiver, items, name, args),
            Value::Number(n) => match name {
                "toFixed" => {
                    let digits = int_arg(args, 0, 0.0);
                    if !(0.0..=100.0).contains(&digits) {
                        return throw(
                            "RangeError: toFixed() digits argument must be between 0 and 100",
                        );
                    }
                    if !n.is_finite() || n.abs() >= 1e21 {
                        return Ok(Value::string(format_number(*n)));
                    }
                    Ok(Value::string(format!("{:.*}", digits as usize, n)))
                }
                _ => {
                    let radix = int_arg(args, 0, 10.0);
                    if !(2.0..=36.0).contains(&radix) {
                        return throw("RangeError: toString() radix must be between 2 and 36");
                    }
                    Ok(Value::string(number_to_radix(*n, radix as u32)))
                }
            },
            other => Ok(Value::string(other.to_display())),
        }
    }

    fn string_method(&mut self, s: &Rc<str>, name: &str, args: &[Value]) -> EvalResult {
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len();
        let text_arg = |index: usize| arg(args, index).to_display();
        let substring = |start: usize, end: usize| -> Value {
            if start >= end {
                Value::string("")
            } else {
                Value::string(chars[start..end].iter().collect::<String>())
            }
        };
        // Character index of a byte offset into `s`.
        let char_index = |byte: usize| s[..byte].chars().count() as f64;

        let value = match name {
            "toUpperCase" => Value::string(s.to_uppercase()),
            "toLowerCase" => Value::string(s.to_lowercase()),
            "trim" => Value::string(s.trim()),
            "trimStart" => Value::string(s.trim_start()),
            "trimEnd" => Value::string(s.trim_end()),
            "toString" => Value::String(s.clone()),
            "split" => {
                let limit = match args.get(1) {
                    None | Some(Value::Undefined) => usize::MAX,
                    Some(value) => value.to_number().max(0.0) as usize,
                };
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![Value::String(s.clone())],
                    Some(separator) => {
                        let separator = separator.to_display();
                        if separator.is_empty() {
                            chars.iter().map(|c| Value::string(c.to_string())).collect()
                        } else {
                            s.split(separator.as_str()).map(Value::string).collect()
                        }
                    }
                };
                Value::array(parts.into_iter().take(limit).collect())
            }
            "replace" | "replaceAll" => {
                let pattern = text_arg(0);
                let replacement = arg(args, 1);
                let mut positions: Vec<usize> = if pattern.is_empty() {
                    // An empty pattern matches before every character and at the end.
                    s.char_indices()
                        .map(|(i, _)| i)
                        .chain(std::iter::once(s.len()))
                        .collect()
                } else {
                    s.match_indices(pattern.as_str()).map(|(i, _)| i).collect()
                };
                if name == "replace" {
                    positions.truncate(1);
                }

                let mut out = String::with_capacity(s.len());
                let mut last = 0;
                for position in positions {
                    out.push_str(&s[last..position]);
                    let inserted = match &replacement {
                        Value::Function(_) => self
                            .call(
                                &replacement,
                                vec![
                                    Value::string(pattern.as_str()),
                                    Value::Number(char_index(position)),
                                    Value::String(s.clone()),
                                ],
                            )?
                            .to_display(),
                        other => other.to_display(),
                    };
                    out.push_str(&inserted);
                    check_length(out.len())?;
                    last = position + pattern.len();
                }
                out.push_str(&s[last..]);
                Value::string(out)
            }
            "includes" => Value::Bool(s.contains(text_arg(0).as_str())),
            "startsWith" => Value::Bool(s.starts_with(text_arg(0).as_str())),
            "endsWith" => Value::Bool(s.ends_with(text_arg(0).as_str())),
            "indexOf" => Value::Number(
                s.find(text_arg(0).as_str())
                    .map_or(-1.0, char_index),
            ),
            "lastIndexOf" => Value::Number(
                s.rfind(text_arg(0).as_str())
                    .map_or(-1.0, char_index),
            ),
            "slice" => {
                let start = relative_index(int_arg(args, 0, 0.0), len);
                let end = relative_index(int_arg(args, 1, len as f64), len);
                substring(start, end)
            }
            "substring" => {
                let clamp = |n: f64| n.clamp(0.0, len as f64) as usize;
                let a = clamp(int_arg(args, 0, 0.0));
                let b = clamp(int_arg(args, 1, len as f64));
                substring(a.min(b), a.max(b))
            }
            "charAt" => {
                let index = int_arg(args, 0, 0.0);
                if index < 0.0 || index >= len as f64 {
                    Value::string("")
                } else {
                    Value::string(chars[index as usize].to_string())
                }
            }
            "charCodeAt" => {
                let index = int_arg(args, 0, 0.0);
                if index < 0.0 || index >= len as f64 {
                    Value::Number(f64::NAN)
                } else {
                    Value::Number(f64::from(u32::from(chars[index as usize])))
                }
            }
            "at" => {
                let index = int_arg(args, 0, 0.0);
                let resolved = if index < 0.0 { len as f64 + index } else { index };
                if resolved < 0.0 || resolved >= len as f64 {
                    Value::Undefined
                } else {
                    Value::string(chars[resolved as usize].to_string())
                }
            }
            "repeat" => {
                let count = int_arg(args, 0, 0.0);
                if count < 0.0 || count.is_infinite() {
                    return throw("RangeError: Invalid count value");
                }
                check_length(s.len().saturating_mul(count as usize))?;
                Value::string(s.repeat(count as usize))
            }
            "padStart" | "padEnd" => {
                let target = int_arg(args, 0, 0.0).max(0.0);
                check_length(target as usize)?;
                let target = target as usize;
                let filler = match args.get(1) {
                    None | Some(Value::Undefined) => " ".to_string(),
                    Some(value) => value.to_display(),
                };
                if target <= len || filler.is_empty() {
                    Value::String(s.clone())
                } else {
                    let padding: String = filler.chars().cycle().take(target - len).collect();
                    if name == "padStart" {
                        Value::string(format!("{padding}{s}"))
                    } else {
                        Value::string(format!("{s}{padding}"))
                    }
                }
            }
            "concat" => {
                let mut out = s.to_string();
                for value in args {
                    out.push_str(&value.to_display());
                }
                check_length(out.len())?;
                Value::string(out)
            }
            "localeCompare" => Value::Number(match (**s).cmp(text_arg(0).as_str()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            }),
            _ => return throw(format!("TypeError: {name} is not a function")),
        };
        Ok(value)
    }

    fn array_method(
        &mut self,
        receiver: &Value,
        items: &Rc<Vec<Value>>,
        name: &str,
        args: &[Value],
    ) -> EvalResult {
        let len = items.len();
        let callback = arg(args, 0);
        let call_each = |this: &mut Self, index: usize, item: &Value| {
            this.call(
                &callback,
                vec![item.clone(), Value::Number(index as f64), receiver.clone()],
            )
        };

        let value = match name {
            "join" | "toString" => {
                let separator = match args.first() {
                    Some(value) if name == "join" && !matches!(value, Value::Undefined) => {
                        value.to_display()
                    }
                    _ => ",".to_string(),
                };
                let joined = items
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.to_display()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(&separator);
                check_length(joined.len())?;
                Value::string(joined)
            }
            "map" => {
                let mut out = Vec::with_capacity(len);
                for (index, item) in items.iter().enumerate() {
                    out.push(call_each(self, index, item)?);
                }
                Value::array(out)
            }
            "filter" => {
                let mut out = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    if call_each(self, index, item)?.truthy() {
                        out.push(item.clone());
                    }
                }
                Value::array(out)
            }
            "forEach" => {
                for (index, item) in items.iter().enumerate() {
                    call_each(self, index, item)?;
                }
                Value::Undefined
            }
            "some" | "every" => {
                let want = name == "some";
                for (index, item) in items.iter().enumerate() {
                    if call_each(self, index, item)?.truthy() == want {
                        return Ok(Value::Bool(want));
                    }
                }
                Value::Bool(!want)
            }
            "find" | "findIndex" => {
                for (index, item) in items.iter().enumerate() {
                    if call_each(self, index, item)?.truthy() {
                        return Ok(if name == "find" {
                            item.clone()
                        } else {
                            Value::Number(index as f64)
                        });
                    }
                }
                if name == "find" {
                    Value::Undefined
                } else {
                    Value::Number(-1.0)
                }
            }
            "reduce" => {
                let mut iter = items.iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return throw("TypeError: Reduce of empty array with no initial value");
                        }
                    },
                };
                for (index, item) in iter {
                    acc = self.call(
                        &callback,
                        vec![acc, item.clone(), Value::Number(index as f64), receiver.clone()],
                    )?;
                }
                acc
            }
            "indexOf" => Value::Number(
                items
                    .iter()
                    .position(|item| strict_equals(item, &callback))
                    .map_or(-1.0, |index| index as f64),
            ),
            "includes" => Value::Bool(items.iter().any(|item| same_value_zero(item, &callback))),
            "slice" => {
                let start = relative_index(int_arg(args, 0, 0.0), len);
                let end = relative_index(int_arg(args, 1, len as f64), len);
                Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
            }
            "concat" => {
                let mut out = items.to_vec();
                for value in args {
                    match value {
                        Value::Array(more) => out.extend(more.iter().cloned()),
                        other => out.push(other.clone()),
                    }
                }
                Value::array(out)
            }
            "reverse" => Value::array(items.iter().rev().cloned().collect()),
            "flat" => {
                let depth = int_arg(args, 0, 1.0);
                Value::array(flatten(items, depth))
            }
            "at" => {
                let index = int_arg(args, 0, 0.0);
                let resolved = if index < 0.0 { len as f64 + index } else { index };
                if resolved < 0.0 || resolved >= len as f64 {
                    Value::Undefined
                } else {
                    items[resolved as usize].clone()
                }
            }
            "sort" => {
                let comparator = match &callback {
                    Value::Undefined => None,
                    f @ Value::Function(_) => Some(f.clone()),
                    _ => return throw("TypeError: The comparison function must be a function"),
                };
                Value::array(self.merge_sort(items.to_vec(), comparator.as_ref())?)
            }
            _ => return throw(format!("TypeError: {name} is not a function")),
        };
        Ok(value)
    }

    /// Stable merge sort that tolerates inconsistent user comparators.
    fn merge_sort(
        &mut self,
        mut items: Vec<Value>,
        comparator: Option<&Value>,
    ) -> Result<Vec<Value>, Exception> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items, comparator)?;
        let right = self.merge_sort(right, comparator)?;

        let mut out = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        loop {
            let take_right = match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => self.sort_compare(r, l, comparator)? == Ordering::Less,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (None, None) => break,
            };
            let next = if take_right { right.next() } else { left.next() };
            out.extend(next);
        }
        Ok(out)
    }

    fn sort_compare(
        &mut self,
        a: &Value,
        b: &Value,
        comparator: Option<&Value>,
    ) -> Result<Ordering, Exception> {
        match (a, b) {
            (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
            (Value::Undefined, _) => return Ok(Ordering::Greater),
            (_, Value::Undefined) => return Ok(Ordering::Less),
            _ => {}
        }
        let Some(comparator) = comparator else {
            return Ok(a.to_display().cmp(&b.to_display()));
        };
        let n = self.call(comparator, vec![a.clone(), b.clone()])?.to_number();
        Ok(if n < 0.0 {
            Ordering::Less
        } else if n > 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        })
    }
}

fn flatten(items: &[Value], depth: f64) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => out.extend(flatten(inner, depth - 1.0)),
            other => out.push(other.clone()),
        }
    }
    out
}

fn stringify(value: &Value, indent: &Value) -> Value {
    let Some(json) = value.to_json() else {
        return Value::Undefined;
    };
    let indent = match indent {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };

    let serialized = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        serde::Serialize::serialize(&json, &mut serializer)
            .map(|()| String::from_utf8_lossy(&out).into_owned())
    };
    serialized.map_or(Value::Undefined, Value::string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::grammar;

    fn eval(source: &str) -> EvalResult {
        let expr = grammar::parse(source).unwrap();
        let scope = Scope::root(vec![
            ("$".to_string(), Value::string("Hello, World")),
            ("i".to_string(), Value::Number(1.0)),
            (
                "$$".to_string(),
                Value::array(vec![
                    Value::string("b"),
                    Value::string("Hello, World"),
                    Value::string("a"),
                ]),
            ),
        ]);
        Interpreter::new().eval(&expr, &scope)
    }

    fn display(source: &str) -> String {
        eval(source).unwrap().to_display()
    }

    #[test]
    fn test_arithmetic_and_concatenation() {
        assert_eq!(display("1 + 2 * 3"), "7");
        assert_eq!(display("'a' + 1 + 2"), "a12");
        assert_eq!(display("1 + 2 + 'a'"), "3a");
        assert_eq!(display("7 % 3 - 2 ** 3"), "-7");
        assert_eq!(display("1 / 0"), "Infinity");
        assert_eq!(display("'3' * '4'"), "12");
        assert_eq!(display("[1, 2] + ''"), "1,2");
    }

    #[test]
    fn test_equality_and_comparison() {
        assert_eq!(display("1 == '1'"), "true");
        assert_eq!(display("1 === '1'"), "false");
        assert_eq!(display("null == undefined"), "true");
        assert_eq!(display("null === undefined"), "false");
        assert_eq!(display("'b' > 'a'"), "true");
        assert_eq!(display("'10' < 9"), "false");
        assert_eq!(display("NaN <= NaN"), "false");
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        assert_eq!(display("0 || 'x'"), "x");
        assert_eq!(display("0 ?? 'x'"), "0");
        assert_eq!(display("null ?? 'x'"), "x");
        // The right side would throw if evaluated.
        assert_eq!(display("false && missing.value"), "false");
        assert_eq!(display("i ? 'one' : 'zero'"), "one");
    }

    #[test]
    fn test_bound_names() {
        assert_eq!(display("$.length"), "12");
        assert_eq!(display("$$[i] === $"), "true");
        assert_eq!(display("$$.length"), "3");
        assert_eq!(display("typeof $$"), "object");
        assert_eq!(display("typeof nothing"), "undefined");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(display("$.toUpperCase()"), "HELLO, WORLD");
        assert_eq!(display("$.split(', ').reverse().join(' ')"), "World Hello");
        assert_eq!(display("$.slice(-5)"), "World");
        assert_eq!(display("$.replace('l', 'L')"), "HeLlo, World");
        assert_eq!(display("$.replaceAll('l', 'L')"), "HeLLo, WorLd");
        assert_eq!(display("$.indexOf('W')"), "7");
        assert_eq!(display("'7'.padStart(3, '0')"), "007");
        assert_eq!(display("'ab'.repeat(2)"), "abab");
        assert_eq!(display("'é!'.at(-1)"), "!");
    }

    #[test]
    fn test_array_methods_with_callbacks() {
        assert_eq!(
            display("$$.map((s, j) => j + s).join()"),
            "0b,1Hello, World,2a"
        );
        assert_eq!(display("$$.filter(s => s.length == 1).length"), "2");
        assert_eq!(display("[3, 1, 2].reduce((a, b) => a + b)"), "6");
        assert_eq!(display("[10, 9, 1].sort()"), "1,10,9");
        assert_eq!(display("[10, 9, 1].sort((a, b) => a - b)"), "1,9,10");
        assert_eq!(display("$$.findIndex(s => s == 'a')"), "2");
        assert_eq!(display("[[1], [2, [3]]].flat()"), "1,2,3");
    }

    #[test]
    fn test_builtins() {
        assert_eq!(display("Math.max(1, i, 3)"), "3");
        assert_eq!(display("Math.round(2.5)"), "3");
        assert_eq!(display("parseInt('42px')"), "42");
        assert_eq!(display("parseInt('ff', 16)"), "255");
        assert_eq!(display("parseFloat('3.5e2 apples')"), "350");
        assert_eq!(display("Number('x')"), "NaN");
        assert_eq!(display("(255).toString(16)"), "ff");
        assert_eq!(display("(1.005).toFixed(1)"), "1.0");
        assert_eq!(display("JSON.stringify({a: [1, 'x']})"), r#"{"a":[1,"x"]}"#);
        assert_eq!(display("JSON.parse('[1, 2]').length"), "2");
        assert_eq!(display("Object.keys({b: 1, a: 2})"), "b,a");
    }

    #[test]
    fn test_exceptions() {
        assert!(eval("missing").is_err());
        assert!(eval("null.length").is_err());
        assert!(eval("$()").is_err());
        assert!(eval("$.nope()").is_err());
        assert!(eval("JSON.parse('{')").is_err());
        assert!(eval("(f => f(f))(f => f(f))").is_err());
        assert!(eval("'x'.repeat(1e9)").is_err());
    }
}
