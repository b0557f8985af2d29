//! Global objects and the methods of built-in value types.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};

use crate::collections::{MAP_METHODS, SET_METHODS};
use crate::format::stringify_with_indent;
use crate::interpreter::{iterable_items, throw, Abrupt, Completion, Interpreter, MAX_STRING_LENGTH};
use crate::date;
use crate::regexp::RegexMatch;
use crate::scope::Scope;
use crate::value::*;

const BUILTINS: &[&str] = &[
    "console.log", "console.info", "console.warn", "console.error", "console.debug",
    "JSON.stringify", "JSON.parse",
    "Math.max", "Math.min", "Math.floor", "Math.ceil", "Math.round", "Math.abs", "Math.sqrt",
    "Math.pow", "Math.trunc", "Math.sign", "Math.log", "Math.log2", "Math.log10", "Math.exp",
    "Math.cbrt", "Math.hypot",
    "Object", "Object.keys", "Object.values", "Object.entries", "Object.assign",
    "Object.fromEntries", "Object.freeze",
    "Array", "Array.isArray", "Array.from", "Array.of",
    "Number", "Number.isInteger", "Number.isFinite", "Number.isNaN", "Number.parseFloat",
    "Number.parseInt",
    "String", "Boolean",
    "Promise", "Promise.all", "Promise.allSettled", "Promise.resolve", "Promise.reject",
    "Error", "TypeError", "RangeError", "SyntaxError", "ReferenceError", "URIError",
    "parseInt", "parseFloat", "isNaN", "isFinite",
    "encodeURIComponent", "decodeURIComponent", "encodeURI", "decodeURI",
    "Date", "Date.now", "Date.parse", "Date.UTC",
    "Map", "Set", "RegExp",
];

/// Constructors whose instances are error objects.
pub(crate) const ERROR_CLASSES: &[&str] = &[
    "Error", "TypeError", "RangeError", "SyntaxError", "ReferenceError", "URIError",
];

const NAMESPACES: &[&str] = &["console", "JSON", "Math"];

const GLOBAL_FUNCTIONS: &[&str] = &[
    "Object", "Array", "Number", "String", "Boolean", "Promise", "Error", "TypeError",
    "RangeError", "SyntaxError", "ReferenceError", "URIError", "parseInt", "parseFloat", "isNaN",
    "isFinite", "encodeURIComponent", "decodeURIComponent", "encodeURI", "decodeURI", "Date",
    "Map", "Set", "RegExp",
];

const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "slice", "splice", "concat", "join", "indexOf",
    "lastIndexOf", "includes", "map", "filter", "forEach", "reduce", "find", "findIndex",
    "findLast", "some", "every", "sort", "reverse", "flat", "flatMap", "at", "fill", "toString",
];

const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "trim", "trimStart", "trimEnd", "split", "includes",
    "startsWith", "endsWith", "indexOf", "lastIndexOf", "slice", "substring", "replace",
    "replaceAll", "repeat", "padStart", "padEnd", "charAt", "charCodeAt", "at", "concat",
    "toString", "localeCompare", "match", "matchAll", "search",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString", "toLocaleString"];
const REGEXP_METHODS: &[&str] = &["test", "exec", "toString"];
const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString"];
const PROMISE_METHODS: &[&str] = &["then", "catch", "finally"];
const FUNCTION_METHODS: &[&str] = &["call", "apply"];

fn find(list: &[&'static str], name: &str) -> Option<&'static str> {
    list.iter().copied().find(|candidate| *candidate == name)
}

/// Bind the standard globals into `scope`.
pub(crate) fn install_globals(scope: &Scope) {
    for namespace in NAMESPACES {
        let mut props: Vec<(String, Value)> = BUILTINS
            .iter()
            .filter_map(|path| {
                let member = path.strip_prefix(*namespace)?.strip_prefix('.')?;
                Some((member.to_string(), Value::function(Callable::Builtin(*path))))
            })
            .collect();
        if *namespace == "Math" {
            props.push(("PI".to_string(), Value::Number(std::f64::consts::PI)));
            props.push(("E".to_string(), Value::Number(std::f64::consts::E)));
            props.push(("LN2".to_string(), Value::Number(std::f64::consts::LN_2)));
            props.push(("LN10".to_string(), Value::Number(std::f64::consts::LN_10)));
            props.push(("SQRT2".to_string(), Value::Number(std::f64::consts::SQRT_2)));
        }
        scope.declare(namespace, Value::object(props), true);
    }
    for name in GLOBAL_FUNCTIONS {
        scope.declare(name, Value::function(Callable::Builtin(*name)), true);
    }
    scope.declare("undefined", Value::Undefined, false);
    scope.declare("NaN", Value::Number(f64::NAN), false);
    scope.declare("Infinity", Value::Number(f64::INFINITY), false);
}

/// `Number.isInteger`, `Number.MAX_SAFE_INTEGER` and friends.
pub(crate) fn static_member(path: &str, key: &str) -> Option<Value> {
    let full = format!("{path}.{key}");
    if let Some(found) = find(BUILTINS, &full) {
        return Some(Value::function(Callable::Builtin(found)));
    }
    let constant = match full.as_str() {
        "Number.MAX_SAFE_INTEGER" => 9_007_199_254_740_991.0,
        "Number.MIN_SAFE_INTEGER" => -9_007_199_254_740_991.0,
        "Number.EPSILON" => f64::EPSILON,
        "Number.MAX_VALUE" => f64::MAX,
        "Number.POSITIVE_INFINITY" => f64::INFINITY,
        "Number.NEGATIVE_INFINITY" => f64::NEG_INFINITY,
        "Number.NaN" => f64::NAN,
        _ => return None,
    };
    Some(Value::Number(constant))
}

/// The built-in method `key` of `receiver`, if any.
pub(crate) fn method_name(receiver: &Value, key: &str) -> Option<&'static str> {
    match receiver {
        Value::Array(_) => find(ARRAY_METHODS, key),
        Value::String(_) => find(STRING_METHODS, key),
        Value::Number(_) => find(NUMBER_METHODS, key),
        Value::Bool(_) => find(&["toString"], key),
        Value::Object(_) => match internal_kind(receiver) {
            Some("Map") => find(MAP_METHODS, key),
            Some("Set") => find(SET_METHODS, key),
            Some("Date") => find(date::METHODS, key),
            Some("RegExp") => find(REGEXP_METHODS, key),
            _ => None,
        }
        .or_else(|| find(OBJECT_METHODS, key)),
        Value::Promise(_) => find(PROMISE_METHODS, key),
        Value::Function(_) => find(FUNCTION_METHODS, key),
        Value::Undefined | Value::Null => None,
    }
}

/// `Map`, `Set`, `Date` or `RegExp` for objects backed by internal state.
pub(crate) fn internal_kind(value: &Value) -> Option<&'static str> {
    let Value::Object(obj) = value else {
        return None;
    };
    Some(match lock(obj).internal.as_ref()? {
        Internal::Map(_) => "Map",
        Internal::Set(_) => "Set",
        Internal::Date(_) => "Date",
        Internal::RegExp { .. } => "RegExp",
        Internal::Prototype(_) => return None,
    })
}

/// Read-only properties computed from internal state, such as `size`
/// and `lastIndex`.
pub(crate) fn internal_property(obj: &Obj, key: &str) -> Option<Value> {
    match (obj.internal.as_ref()?, key) {
        (Internal::Map(entries), "size") => Some(Value::Number(entries.len() as f64)),
        (Internal::Set(items), "size") => Some(Value::Number(items.len() as f64)),
        (Internal::RegExp { regex, last_index }, _) => regex.property(key, *last_index),
        _ => None,
    }
}

pub(crate) fn instance_of(left: &Value, right: &Value) -> Completion<bool> {
    let Value::Function(callable) = right else {
        return throw("TypeError", "Right-hand side of 'instanceof' is not callable");
    };
    Ok(match &**callable {
        Callable::Builtin(path) => match *path {
            "Error" => error_class(left).is_some(),
            class if ERROR_CLASSES.contains(&class) => error_class(left) == Some(class),
            "Map" | "Set" | "Date" | "RegExp" => internal_kind(left) == Some(*path),
            "Array" => matches!(left, Value::Array(_)),
            "Object" => matches!(
                left,
                Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Promise(_)
            ),
            "Promise" => matches!(left, Value::Promise(_)),
            _ => false,
        },
        Callable::Class(class) => has_in_chain(left, &class.prototype),
        _ => false,
    })
}

// ── Argument helpers ─────────────────────────────────────────────────────────

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn integer(value: &Value) -> f64 {
    let n = to_number(value);
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a possibly negative index against `len`, clamped to `0..=len`.
fn relative(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = integer(value);
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

pub(crate) fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

fn char_slice(chars: &[char], start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect()
}

fn char_index_of(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..=haystack.len().saturating_sub(needle.len()))
        .find(|&i| i + needle.len() <= haystack.len() && haystack[i..i + needle.len()] == *needle)
}

fn flatten_into(items: Vec<Value>, depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => {
                let inner = lock(&inner).clone();
                flatten_into(inner, depth - 1.0, out);
            }
            other => out.push(other),
        }
    }
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::Undefined | Value::Null => String::new(),
            other => to_string(other),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let trimmed = text.trim_start();
    let (sign, mut body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let requested = match to_number(radix) {
        n if n.is_nan() || n == 0.0 => None,
        n => Some(n.trunc() as u32),
    };
    let hex_body = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X"));
    let radix = match (requested, hex_body) {
        (None | Some(16), Some(rest)) => {
            body = rest;
            16
        }
        (Some(radix), _) => radix,
        (None, None) => 10,
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = body.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    sign * digits
        .into_iter()
        .fold(0.0, |acc, digit| acc * f64::from(radix) + f64::from(digit))
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let chars: Vec<char> = trimmed.chars().collect();
    let mut end = 0;
    if matches!(chars.first(), Some('+') | Some('-')) {
        end = 1;
    }
    if trimmed[end..].starts_with("Infinity") {
        let sign = if trimmed.starts_with('-') { -1.0 } else { 1.0 };
        return sign * f64::INFINITY;
    }
    let digits_start = end;
    while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
    }
    if chars.get(end) == Some(&'.') {
        end += 1;
        while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
            end += 1;
        }
    }
    if end == digits_start || (end == digits_start + 1 && chars.get(digits_start) == Some(&'.')) {
        return f64::NAN;
    }
    if matches!(chars.get(end), Some('e') | Some('E')) {
        let mut exp_end = end + 1;
        if matches!(chars.get(exp_end), Some('+') | Some('-')) {
            exp_end += 1;
        }
        if chars.get(exp_end).is_some_and(|c| c.is_ascii_digit()) {
            while chars.get(exp_end).is_some_and(|c| c.is_ascii_digit()) {
                exp_end += 1;
            }
            end = exp_end;
        }
    }
    let prefix: String = chars[..end].iter().collect();
    prefix.parse::<f64>().unwrap_or(f64::NAN)
}

fn to_fixed(n: f64, digits: &Value) -> Completion<Value> {
    let digits = integer(digits);
    if !(0.0..=100.0).contains(&digits) {
        return throw("RangeError", "toFixed() digits argument must be between 0 and 100");
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::String(number_to_string(n)));
    }
    let digits = digits as usize;
    let factor = 10f64.powi(digits as i32);
    let scaled = n.abs() * factor;
    // ties round away from zero, unlike `format!`
    let rounded = if scaled.fract() == 0.5 {
        n.signum() * (scaled.trunc() + 1.0) / factor
    } else {
        n
    };
    Ok(Value::String(format!("{rounded:.digits$}")))
}

fn radix_string(n: f64, radix: &Value) -> Completion<Value> {
    let radix = match radix {
        Value::Undefined => 10,
        other => integer(other) as u32,
    };
    if !(2..=36).contains(&radix) {
        return throw("RangeError", "toString() radix must be between 2 and 36");
    }
    if radix == 10 || n.fract() != 0.0 || !n.is_finite() {
        return Ok(Value::String(number_to_string(n)));
    }
    let mut value = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        let digit = (value % u64::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        value /= u64::from(radix);
        if value == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(Value::String(digits.into_iter().rev().collect()))
}

fn json_stringify(args: &[Value]) -> Completion<Value> {
    let json = match to_json(&arg(args, 0)) {
        Ok(Some(json)) => json,
        Ok(None) => return Ok(Value::Undefined),
        Err(message) => return throw("TypeError", message),
    };
    let indent = match arg(args, 2) {
        Value::Number(n) if n >= 1.0 => Some(" ".repeat(n.min(10.0) as usize)),
        Value::String(s) if !s.is_empty() => Some(s.chars().take(10).collect()),
        _ => None,
    };
    Ok(Value::String(stringify_with_indent(&json, indent.as_deref())))
}

fn object_entries(value: &Value) -> Completion<Vec<(String, Value)>> {
    match value {
        Value::Undefined | Value::Null => throw("TypeError", "Cannot convert undefined or null to object"),
        Value::Object(obj) => {
            let guard = lock(obj);
            let keys = guard.keys();
            Ok(guard
                .props
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .cloned()
                .collect())
        }
        Value::Array(items) => Ok(lock(items)
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect()),
        Value::String(s) => Ok(s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// `Array(n)`; lengths beyond `limit` are refused rather than allocated.
fn array_from_length(args: &[Value], limit: usize) -> Completion<Value> {
    if let [Value::Number(n)] = args {
        if *n < 0.0 || n.fract() != 0.0 || *n > u32::MAX as f64 || *n > limit as f64 {
            return throw("RangeError", "Invalid array length");
        }
        return Ok(Value::array(vec![Value::Undefined; *n as usize]));
    }
    Ok(Value::array(args.to_vec()))
}

const URI_RESERVED: &str = ";/?:@&=+$,#";

/// `encodeURIComponent`, or `encodeURI` when `component` is false, which
/// also leaves reserved characters alone.
fn encode_uri(text: &str, component: bool) -> String {
    let mut encoded = urlencoding::encode(text).into_owned();
    let kept = if component {
        "!'()*".to_string()
    } else {
        format!("!'()*{URI_RESERVED}")
    };
    for c in kept.chars() {
        encoded = encoded.replace(&format!("%{:02X}", c as u32), &c.to_string());
    }
    encoded
}

/// `decodeURIComponent`, or `decodeURI` when `component` is false, which
/// keeps escapes of reserved characters intact.
fn decode_uri(text: &str, component: bool) -> Completion<String> {
    let bytes = text.as_bytes();
    let mut prepared = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            let next = text[i..].chars().next().map_or(1, char::len_utf8);
            prepared.push_str(&text[i..i + next]);
            i += next;
            continue;
        }
        let Some(hex) = text.get(i + 1..i + 3).filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit())) else {
            return throw("URIError", "URI malformed");
        };
        let byte = u8::from_str_radix(hex, 16).unwrap_or_default();
        if !component && URI_RESERVED.as_bytes().contains(&byte) {
            // re-escape the percent sign so decoding leaves `%XX` behind
            prepared.push_str("%25");
        } else {
            prepared.push('%');
        }
        prepared.push_str(hex);
        i += 3;
    }
    match urlencoding::decode(&prepared) {
        Ok(decoded) => Ok(decoded.into_owned()),
        Err(_) => throw("URIError", "URI malformed"),
    }
}

/// `toLocaleString` for numbers: grouped thousands, at most three
/// fraction digits.
fn locale_number(n: f64) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let fixed = format!("{:.3}", n.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((&fixed, ""));
    let fraction = fraction.trim_end_matches('0');
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if n < 0.0 && (whole != "0" || !fraction.is_empty()) { "-" } else { "" };
    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
    }
}

fn math(path: &str, args: &[Value]) -> Option<Value> {
    let x = to_number(&arg(args, 0));
    let n = match path {
        "Math.max" => args.iter().map(to_number).fold(f64::NEG_INFINITY, |acc, v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.max(v)
            }
        }),
        "Math.min" => args.iter().map(to_number).fold(f64::INFINITY, |acc, v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.min(v)
            }
        }),
        "Math.floor" => x.floor(),
        "Math.ceil" => x.ceil(),
        "Math.round" => (x + 0.5).floor(),
        "Math.abs" => x.abs(),
        "Math.sqrt" => x.sqrt(),
        "Math.pow" => x.powf(to_number(&arg(args, 1))),
        "Math.trunc" => x.trunc(),
        "Math.sign" => {
            if x == 0.0 || x.is_nan() {
                x
            } else {
                x.signum()
            }
        }
        "Math.log" => x.ln(),
        "Math.log2" => x.log2(),
        "Math.log10" => x.log10(),
        "Math.exp" => x.exp(),
        "Math.cbrt" => x.cbrt(),
        "Math.hypot" => args.iter().map(to_number).map(|v| v * v).sum::<f64>().sqrt(),
        _ => return None,
    };
    Some(Value::Number(n))
}

impl Interpreter {
    async fn sort_compare(&self, comparator: &Value, a: &Value, b: &Value) -> Completion<f64> {
        if matches!(comparator, Value::Function(_)) {
            let result = self
                .call(comparator, Value::Undefined, vec![a.clone(), b.clone()])
                .await?;
            let n = to_number(&result);
            return Ok(if n.is_nan() { 0.0 } else { n });
        }
        Ok(match to_string(a).cmp(&to_string(b)) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        })
    }

    // ── Global functions ─────────────────────────────────────────────────────

    pub(crate) fn call_builtin<'a>(
        &'a self,
        path: &'static str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, Completion<Value>> {
        async move {
            if let Some(value) = math(path, &args) {
                return Ok(value);
            }
            match path {
                "console.log" | "console.info" | "console.warn" | "console.error" | "console.debug" => {
                    let line = args.iter().map(inspect).collect::<Vec<_>>().join(" ");
                    self.console.log(&line);
                    Ok(Value::Undefined)
                }
                "JSON.stringify" => json_stringify(&args),
                "JSON.parse" => {
                    let text = to_string(&arg(&args, 0));
                    match serde_json::from_str::<serde_json::Value>(&text) {
                        Ok(json) => Ok(from_json(&json)),
                        Err(err) => throw(
                            "SyntaxError",
                            format!("Unexpected token in JSON at line {} column {}", err.line(), err.column()),
                        ),
                    }
                }
                "Object" => Ok(match arg(&args, 0) {
                    value @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => value,
                    _ => Value::object(Vec::new()),
                }),
                "Object.keys" => Ok(Value::array(
                    object_entries(&arg(&args, 0))?
                        .into_iter()
                        .map(|(k, _)| Value::String(k))
                        .collect(),
                )),
                "Object.values" => Ok(Value::array(
                    object_entries(&arg(&args, 0))?
                        .into_iter()
                        .map(|(_, v)| v)
                        .collect(),
                )),
                "Object.entries" => Ok(Value::array(
                    object_entries(&arg(&args, 0))?
                        .into_iter()
                        .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                        .collect(),
                )),
                "Object.assign" => {
                    let target = arg(&args, 0);
                    for source in args.iter().skip(1) {
                        if matches!(source, Value::Undefined | Value::Null) {
                            continue;
                        }
                        for (key, value) in object_entries(source)? {
                            self.set_member(&target, &key, value)?;
                        }
                    }
                    Ok(target)
                }
                "Object.fromEntries" => {
                    let source = arg(&args, 0);
                    let Some(entries) = iterable_items(&source) else {
                        return throw("TypeError", format!("{} is not iterable", to_string(&source)));
                    };
                    let mut props = Obj::default();
                    for entry in entries {
                        let key = self.get_member(&entry, "0")?;
                        let value = self.get_member(&entry, "1")?;
                        props.set(to_string(&key), value);
                    }
                    Ok(Value::Object(Arc::new(Mutex::new(props))))
                }
                "Object.freeze" => Ok(arg(&args, 0)),
                "Array" => array_from_length(&args, self.max_array_length()),
                "Array.of" => Ok(Value::array(args)),
                "Array.isArray" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_)))),
                "Array.from" => {
                    let source = arg(&args, 0);
                    let items = match (iterable_items(&source), &source) {
                        (Some(items), _) => items,
                        (None, Value::Object(_)) => {
                            let len = integer(&self.get_member(&source, "length")?).max(0.0);
                            if len > self.max_array_length() as f64 {
                                return throw("RangeError", "Invalid array length");
                            }
                            vec![Value::Undefined; len as usize]
                        }
                        _ => Vec::new(),
                    };
                    let mapper = arg(&args, 1);
                    if !matches!(mapper, Value::Function(_)) {
                        return Ok(Value::array(items));
                    }
                    let mut out = Vec::with_capacity(items.len());
                    for (index, item) in items.into_iter().enumerate() {
                        out.push(
                            self.call(&mapper, Value::Undefined, vec![item, Value::Number(index as f64)])
                                .await?,
                        );
                    }
                    Ok(Value::array(out))
                }
                "Number" => Ok(Value::Number(args.first().map_or(0.0, to_number))),
                "Number.isInteger" => Ok(Value::Bool(
                    matches!(arg(&args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0),
                )),
                "Number.isFinite" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite()))),
                "Number.isNaN" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan()))),
                "parseInt" | "Number.parseInt" => Ok(Value::Number(parse_int(
                    &to_string(&arg(&args, 0)),
                    &arg(&args, 1),
                ))),
                "parseFloat" | "Number.parseFloat" => {
                    Ok(Value::Number(parse_float(&to_string(&arg(&args, 0)))))
                }
                "isNaN" => Ok(Value::Bool(to_number(&arg(&args, 0)).is_nan())),
                "isFinite" => Ok(Value::Bool(to_number(&arg(&args, 0)).is_finite())),
                "String" => Ok(Value::String(args.first().map(to_string).unwrap_or_default())),
                "Boolean" => Ok(Value::Bool(truthy(&arg(&args, 0)))),
                "Promise" => throw("TypeError", "Promise constructor cannot be invoked without 'new'"),
                "Promise.resolve" => Ok(self.promise_resolve(arg(&args, 0))),
                "Promise.reject" => Ok(self.promise_reject(arg(&args, 0))),
                "Promise.all" | "Promise.allSettled" => {
                    let source = arg(&args, 0);
                    let Some(items) = iterable_items(&source) else {
                        return throw("TypeError", format!("{} is not iterable", to_string(&source)));
                    };
                    let settled = path == "Promise.allSettled";
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        let outcome = match item {
                            Value::Promise(cell) => {
                                cell.mark_handled();
                                cell.outcome.clone()
                            }
                            other => Ok(other),
                        };
                        match (outcome, settled) {
                            (Ok(value), false) => out.push(value),
                            (Err(reason), false) => return Ok(self.promise_reject(reason)),
                            (Ok(value), true) => out.push(Value::object(vec![
                                ("status".to_string(), Value::string("fulfilled")),
                                ("value".to_string(), value),
                            ])),
                            (Err(reason), true) => out.push(Value::object(vec![
                                ("status".to_string(), Value::string("rejected")),
                                ("reason".to_string(), reason),
                            ])),
                        }
                    }
                    Ok(self.promise_resolve(Value::array(out)))
                }
                class if ERROR_CLASSES.contains(&class) => self.construct_builtin(path, args).await,
                "RegExp" => self.construct_regexp(&args),
                "Map" | "Set" => throw("TypeError", format!("Constructor {path} requires 'new'")),
                "Date" | "Date.now" | "Date.parse" | "Date.UTC" => date::call_static(path, &args),
                "encodeURIComponent" | "encodeURI" => Ok(Value::String(encode_uri(
                    &to_string(&arg(&args, 0)),
                    path == "encodeURIComponent",
                ))),
                "decodeURIComponent" | "decodeURI" => Ok(Value::String(decode_uri(
                    &to_string(&arg(&args, 0)),
                    path == "decodeURIComponent",
                )?)),
                other => throw("TypeError", format!("{other} is not a function")),
            }
        }
        .boxed()
    }

    pub(crate) async fn construct_builtin(&self, path: &'static str, args: Vec<Value>) -> Completion<Value> {
        match path {
            class if ERROR_CLASSES.contains(&class) => {
                let message = match arg(&args, 0) {
                    Value::Undefined => String::new(),
                    other => to_string(&other),
                };
                Ok(Value::error(path, message))
            }
            "Promise" => {
                let executor = arg(&args, 0);
                if !matches!(executor, Value::Function(_)) {
                    return throw(
                        "TypeError",
                        format!("Promise resolver {} is not a function", to_string(&executor)),
                    );
                }
                let slot = Arc::new(Mutex::new(None));
                let resolve = Value::function(Callable::Resolver {
                    slot: slot.clone(),
                    reject: false,
                });
                let reject = Value::function(Callable::Resolver {
                    slot: slot.clone(),
                    reject: true,
                });
                match self.call(&executor, Value::Undefined, vec![resolve, reject]).await {
                    Ok(_) => {}
                    Err(Abrupt::Throw(reason)) => {
                        let mut outcome = lock(&slot);
                        if outcome.is_none() {
                            *outcome = Some(Err(reason));
                        }
                    }
                    Err(other) => return Err(other),
                }
                let outcome = lock(&slot).take();
                match outcome {
                    Some(Ok(value)) => Ok(self.promise_resolve(value)),
                    Some(Err(reason)) => Ok(self.promise_reject(reason)),
                    None => throw(
                        "TypeError",
                        "Promise executor must settle synchronously; timers are not available",
                    ),
                }
            }
            "Map" | "Set" => self.construct_collection(path, &args),
            "Date" => Ok(date::construct(&args)),
            "RegExp" => self.construct_regexp(&args),
            "Object" | "Array" | "Number" | "String" | "Boolean" => self.call_builtin(path, args).await,
            other => throw("TypeError", format!("{other} is not a constructor")),
        }
    }

    // ── Methods ──────────────────────────────────────────────────────────────

    pub(crate) fn call_method<'a>(
        &'a self,
        this: &'a Value,
        name: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, Completion<Value>> {
        async move {
            match this {
                Value::Array(items) => self.array_method(items, this, name, args).await,
                Value::String(s) => self.string_method(s, name, args).await,
                Value::Number(n) => match name {
                    "toFixed" => to_fixed(*n, &arg(&args, 0)),
                    "toLocaleString" => Ok(Value::String(locale_number(*n))),
                    _ => radix_string(*n, &arg(&args, 0)),
                },
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                Value::Object(obj) => match (name, internal_kind(this)) {
                    ("hasOwnProperty", _) => {
                        let key = to_string(&arg(&args, 0));
                        Ok(Value::Bool(lock(obj).get(&key).is_some()))
                    }
                    (_, Some("Map" | "Set")) => self.collection_method(obj, this, name, args).await,
                    (_, Some("Date")) => date::call_method(obj, name, &args),
                    (_, Some("RegExp")) => self.regexp_method(obj, this, name, &args),
                    _ => Ok(Value::String(to_string(this))),
                },
                Value::Promise(cell) => self.promise_method(cell, name, args).await,
                Value::Function(_) => {
                    let receiver = arg(&args, 0);
                    let rest = match name {
                        "apply" => match arg(&args, 1) {
                            Value::Array(items) => lock(&items).clone(),
                            _ => Vec::new(),
                        },
                        _ => args.into_iter().skip(1).collect(),
                    };
                    self.call(this, receiver, rest).await
                }
                Value::Undefined | Value::Null => throw(
                    "TypeError",
                    format!("Cannot read properties of {} (reading '{name}')", to_string(this)),
                ),
            }
        }
        .boxed()
    }

    async fn promise_method(&self, cell: &Arc<PromiseCell>, name: &str, args: Vec<Value>) -> Completion<Value> {
        cell.mark_handled();
        let (on_fulfilled, on_rejected) = match name {
            "then" => (arg(&args, 0), arg(&args, 1)),
            "catch" => (Value::Undefined, arg(&args, 0)),
            _ => {
                let callback = arg(&args, 0);
                if matches!(callback, Value::Function(_)) {
                    self.call(&callback, Value::Undefined, Vec::new()).await?;
                }
                return Ok(match &cell.outcome {
                    Ok(value) => self.promise_resolve(value.clone()),
                    Err(reason) => self.promise_reject(reason.clone()),
                });
            }
        };
        let (handler, input) = match &cell.outcome {
            Ok(value) => (on_fulfilled, Ok(value.clone())),
            Err(reason) => (on_rejected, Err(reason.clone())),
        };
        if !matches!(handler, Value::Function(_)) {
            return Ok(match input {
                Ok(value) => self.promise_resolve(value),
                Err(reason) => self.promise_reject(reason),
            });
        }
        let argument = match input {
            Ok(value) | Err(value) => value,
        };
        match self.call(&handler, Value::Undefined, vec![argument]).await {
            Ok(value) => {
                let value = match value {
                    Value::Promise(inner) => {
                        inner.mark_handled();
                        match &inner.outcome {
                            Ok(v) => v.clone(),
                            Err(reason) => return Ok(self.promise_reject(reason.clone())),
                        }
                    }
                    other => other,
                };
                Ok(self.promise_resolve(value))
            }
            Err(Abrupt::Throw(reason)) => Ok(self.promise_reject(reason)),
            Err(other) => Err(other),
        }
    }

    async fn array_method(
        &self,
        items: &ArrayRef,
        this: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Completion<Value> {
        let snapshot = || lock(items).clone();
        let callback = arg(&args, 0);
        let needs_callback = matches!(
            name,
            "map" | "filter" | "forEach" | "reduce" | "find" | "findIndex" | "findLast" | "some" | "every" | "flatMap"
        );
        if needs_callback && !matches!(callback, Value::Function(_)) {
            return throw("TypeError", format!("{} is not a function", to_string(&callback)));
        }
        let visit = |item: Value, index: usize| vec![item, Value::Number(index as f64), this.clone()];

        match name {
            "push" => {
                let mut guard = lock(items);
                guard.extend(args);
                Ok(Value::Number(guard.len() as f64))
            }
            "pop" => Ok(lock(items).pop().unwrap_or_default()),
            "shift" => {
                let mut guard = lock(items);
                Ok(if guard.is_empty() {
                    Value::Undefined
                } else {
                    guard.remove(0)
                })
            }
            "unshift" => {
                let mut guard = lock(items);
                guard.splice(0..0, args);
                Ok(Value::Number(guard.len() as f64))
            }
            "slice" => {
                let all = snapshot();
                let start = relative(&arg(&args, 0), all.len(), 0);
                let end = relative(&arg(&args, 1), all.len(), all.len());
                Ok(Value::array(if start < end { all[start..end].to_vec() } else { Vec::new() }))
            }
            "splice" => {
                let mut guard = lock(items);
                let len = guard.len();
                let start = relative(&arg(&args, 0), len, 0);
                let delete = if args.len() < 2 {
                    len - start
                } else {
                    (integer(&args[1]).max(0.0) as usize).min(len - start)
                };
                let removed: Vec<Value> = guard
                    .splice(start..start + delete, args.into_iter().skip(2))
                    .collect();
                Ok(Value::array(removed))
            }
            "concat" => {
                let mut all = snapshot();
                for value in args {
                    match value {
                        Value::Array(other) => {
                            let other = lock(&other).clone();
                            all.extend(other);
                        }
                        other => all.push(other),
                    }
                }
                Ok(Value::array(all))
            }
            "join" | "toString" => {
                let separator = match arg(&args, 0) {
                    Value::Undefined => ",".to_string(),
                    other if name == "join" => to_string(&other),
                    _ => ",".to_string(),
                };
                Ok(Value::String(join(&snapshot(), &separator)))
            }
            "indexOf" | "lastIndexOf" => {
                let needle = arg(&args, 0);
                let all = snapshot();
                let found = if name == "indexOf" {
                    let from = relative(&arg(&args, 1), all.len(), 0);
                    all.iter()
                        .enumerate()
                        .skip(from)
                        .find(|(_, item)| strict_equals(item, &needle))
                } else {
                    all.iter().enumerate().rev().find(|(_, item)| strict_equals(item, &needle))
                };
                Ok(Value::Number(found.map_or(-1.0, |(i, _)| i as f64)))
            }
            "includes" => {
                let needle = arg(&args, 0);
                Ok(Value::Bool(snapshot().iter().any(|item| same_value_zero(item, &needle))))
            }
            "map" => {
                let mut out = Vec::new();
                for (index, item) in snapshot().into_iter().enumerate() {
                    out.push(self.call(&callback, Value::Undefined, visit(item, index)).await?);
                }
                Ok(Value::array(out))
            }
            "flatMap" => {
                let mut mapped = Vec::new();
                for (index, item) in snapshot().into_iter().enumerate() {
                    mapped.push(self.call(&callback, Value::Undefined, visit(item, index)).await?);
                }
                let mut out = Vec::new();
                flatten_into(mapped, 1.0, &mut out);
                Ok(Value::array(out))
            }
            "filter" => {
                let mut out = Vec::new();
                for (index, item) in snapshot().into_iter().enumerate() {
                    let keep = self.call(&callback, Value::Undefined, visit(item.clone(), index)).await?;
                    if truthy(&keep) {
                        out.push(item);
                    }
                }
                Ok(Value::array(out))
            }
            "forEach" => {
                for (index, item) in snapshot().into_iter().enumerate() {
                    self.call(&callback, Value::Undefined, visit(item, index)).await?;
                }
                Ok(Value::Undefined)
            }
            "find" | "findIndex" | "findLast" | "some" | "every" => {
                let all = snapshot();
                let order: Vec<usize> = if name == "findLast" {
                    (0..all.len()).rev().collect()
                } else {
                    (0..all.len()).collect()
                };
                for index in order {
                    let item = all[index].clone();
                    let hit = truthy(&self.call(&callback, Value::Undefined, visit(item.clone(), index)).await?);
                    match (name, hit) {
                        ("find" | "findLast", true) => return Ok(item),
                        ("findIndex", true) => return Ok(Value::Number(index as f64)),
                        ("some", true) => return Ok(Value::Bool(true)),
                        ("every", false) => return Ok(Value::Bool(false)),
                        _ => {}
                    }
                }
                Ok(match name {
                    "findIndex" => Value::Number(-1.0),
                    "some" => Value::Bool(false),
                    "every" => Value::Bool(true),
                    _ => Value::Undefined,
                })
            }
            "reduce" => {
                let all = snapshot();
                let mut iter = all.into_iter().enumerate();
                let mut accumulator = if args.len() >= 2 {
                    args[1].clone()
                } else {
                    match iter.next() {
                        Some((_, first)) => first,
                        None => return throw("TypeError", "Reduce of empty array with no initial value"),
                    }
                };
                for (index, item) in iter {
                    accumulator = self
                        .call(
                            &callback,
                            Value::Undefined,
                            vec![accumulator, item, Value::Number(index as f64), this.clone()],
                        )
                        .await?;
                }
                Ok(accumulator)
            }
            "sort" => {
                let comparator = arg(&args, 0);
                let (defined, undefined): (Vec<Value>, Vec<Value>) = snapshot()
                    .into_iter()
                    .partition(|item| !matches!(item, Value::Undefined));
                let mut sorted: Vec<Value> = Vec::with_capacity(defined.len() + undefined.len());
                for item in defined {
                    let (mut low, mut high) = (0, sorted.len());
                    while low < high {
                        let mid = (low + high) / 2;
                        if self.sort_compare(&comparator, &item, &sorted[mid]).await? < 0.0 {
                            high = mid;
                        } else {
                            low = mid + 1;
                        }
                    }
                    sorted.insert(low, item);
                }
                sorted.extend(undefined);
                *lock(items) = sorted;
                Ok(this.clone())
            }
            "reverse" => {
                lock(items).reverse();
                Ok(this.clone())
            }
            "flat" => {
                let depth = match arg(&args, 0) {
                    Value::Undefined => 1.0,
                    other => to_number(&other),
                };
                let mut out = Vec::new();
                flatten_into(snapshot(), depth, &mut out);
                Ok(Value::array(out))
            }
            "at" => {
                let all = snapshot();
                let n = integer(&arg(&args, 0));
                let index = if n < 0.0 { all.len() as f64 + n } else { n };
                Ok(if index < 0.0 {
                    Value::Undefined
                } else {
                    all.get(index as usize).cloned().unwrap_or_default()
                })
            }
            "fill" => {
                let value = arg(&args, 0);
                let mut guard = lock(items);
                let len = guard.len();
                let start = relative(&arg(&args, 1), len, 0);
                let end = relative(&arg(&args, 2), len, len);
                for slot in guard.iter_mut().take(end).skip(start) {
                    *slot = value.clone();
                }
                drop(guard);
                Ok(this.clone())
            }
            other => throw("TypeError", format!("{other} is not a function")),
        }
    }

    async fn string_method(&self, s: &str, name: &str, args: Vec<Value>) -> Completion<Value> {
        let chars: Vec<char> = s.chars().collect();
        let text_arg = |index: usize| to_string(&arg(&args, index));
        let string = |value: String| -> Completion<Value> { Ok(Value::String(value)) };

        if matches!(name, "split" | "replace" | "replaceAll" | "match" | "matchAll" | "search") {
            if let Some(value) = self.string_regex_method(s, name, &args).await? {
                return Ok(value);
            }
        }

        match name {
            "toUpperCase" => string(s.to_uppercase()),
            "toLowerCase" => string(s.to_lowercase()),
            "trim" => string(s.trim().to_string()),
            "trimStart" => string(s.trim_start().to_string()),
            "trimEnd" => string(s.trim_end().to_string()),
            "toString" => string(s.to_string()),
            "split" => {
                let limit = match arg(&args, 1) {
                    Value::Undefined => usize::MAX,
                    other => integer(&other).max(0.0) as usize,
                };
                let parts: Vec<Value> = match arg(&args, 0) {
                    Value::Undefined => vec![Value::string(s)],
                    separator => {
                        let separator = to_string(&separator);
                        if separator.is_empty() {
                            chars.iter().map(|c| Value::String(c.to_string())).collect()
                        } else {
                            s.split(separator.as_str()).map(Value::string).collect()
                        }
                    }
                };
                Ok(Value::array(parts.into_iter().take(limit).collect()))
            }
            "includes" => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                let from = relative(&arg(&args, 1), chars.len(), 0);
                Ok(Value::Bool(char_index_of(&chars, &needle, from).is_some()))
            }
            "startsWith" => {
                let from = relative(&arg(&args, 1), chars.len(), 0);
                Ok(Value::Bool(char_slice(&chars, from, chars.len()).starts_with(&text_arg(0))))
            }
            "endsWith" => {
                let end = relative(&arg(&args, 1), chars.len(), chars.len());
                Ok(Value::Bool(char_slice(&chars, 0, end).ends_with(&text_arg(0))))
            }
            "indexOf" => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                let from = relative(&arg(&args, 1), chars.len(), 0);
                Ok(Value::Number(
                    char_index_of(&chars, &needle, from).map_or(-1.0, |i| i as f64),
                ))
            }
            "lastIndexOf" => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                let found = (0..=chars.len().saturating_sub(needle.len()))
                    .rev()
                    .find(|&i| i + needle.len() <= chars.len() && chars[i..i + needle.len()] == *needle);
                Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
            }
            "slice" => {
                let start = relative(&arg(&args, 0), chars.len(), 0);
                let end = relative(&arg(&args, 1), chars.len(), chars.len());
                string(char_slice(&chars, start, end))
            }
            "substring" => {
                let clamp = |value: Value, default: usize| match value {
                    Value::Undefined => default,
                    other => (integer(&other).max(0.0) as usize).min(chars.len()),
                };
                let start = clamp(arg(&args, 0), 0);
                let end = clamp(arg(&args, 1), chars.len());
                string(char_slice(&chars, start.min(end), start.max(end)))
            }
            "replace" | "replaceAll" => {
                let pattern: Vec<char> = text_arg(0).chars().collect();
                let replacement = arg(&args, 1);
                let mut found_at = Vec::new();
                let mut position = 0;
                while let Some(found) = char_index_of(&chars, &pattern, position) {
                    found_at.push(found);
                    position = found + pattern.len().max(1);
                    if name == "replace" || position > chars.len() {
                        break;
                    }
                }
                let matches: Vec<RegexMatch> = found_at
                    .into_iter()
                    .map(|found| RegexMatch {
                        index: found,
                        end: found + pattern.len(),
                        text: char_slice(&chars, found, found + pattern.len()),
                        groups: Vec::new(),
                        named: Vec::new(),
                    })
                    .collect();
                string(self.replace_matches(s, &matches, &replacement).await?)
            }
            "repeat" => {
                let count = integer(&arg(&args, 0));
                if count < 0.0 || !count.is_finite() {
                    return throw("RangeError", format!("Invalid count value: {}", number_to_string(count)));
                }
                if s.len() as f64 * count > MAX_STRING_LENGTH as f64 {
                    return throw("RangeError", "Invalid string length");
                }
                string(s.repeat(count as usize))
            }
            "padStart" | "padEnd" => {
                let target = integer(&arg(&args, 0)).max(0.0);
                if target > MAX_STRING_LENGTH as f64 {
                    return throw("RangeError", "Invalid string length");
                }
                let target = target as usize;
                let fill: Vec<char> = match arg(&args, 1) {
                    Value::Undefined => vec![' '],
                    other => to_string(&other).chars().collect(),
                };
                if target <= chars.len() || fill.is_empty() {
                    return string(s.to_string());
                }
                let padding: String = fill.iter().cycle().take(target - chars.len()).collect();
                string(if name == "padStart" {
                    padding + s
                } else {
                    s.to_string() + &padding
                })
            }
            "charAt" => {
                let index = integer(&arg(&args, 0));
                string(
                    (index >= 0.0)
                        .then(|| chars.get(index as usize))
                        .flatten()
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                )
            }
            "charCodeAt" => {
                let index = integer(&arg(&args, 0));
                Ok(Value::Number(
                    (index >= 0.0)
                        .then(|| chars.get(index as usize))
                        .flatten()
                        .map_or(f64::NAN, |c| f64::from(u32::from(*c))),
                ))
            }
            "at" => {
                let n = integer(&arg(&args, 0));
                let index = if n < 0.0 { chars.len() as f64 + n } else { n };
                Ok(if index < 0.0 {
                    Value::Undefined
                } else {
                    chars
                        .get(index as usize)
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or_default()
                })
            }
            "concat" => {
                let joined = args.iter().fold(s.to_string(), |acc, v| acc + &to_string(v));
                if joined.len() > MAX_STRING_LENGTH {
                    return throw("RangeError", "Invalid string length");
                }
                string(joined)
            }
            "localeCompare" => Ok(Value::Number(match s.cmp(text_arg(0).as_str()) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            })),
            other => throw("TypeError", format!("{other} is not a function")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integers_with_radix_and_prefix() {
        assert_eq!(parse_int("42px", &Value::Undefined), 42.0);
        assert_eq!(parse_int("  -17", &Value::Undefined), -17.0);
        assert_eq!(parse_int("0x1A", &Value::Undefined), 26.0);
        assert_eq!(parse_int("101", &Value::Number(2.0)), 5.0);
        assert!(parse_int("abc", &Value::Undefined).is_nan());
    }

    #[test]
    fn parses_float_prefixes() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("1e3"), 1000.0);
        assert_eq!(parse_float("1e"), 1.0);
        assert!(parse_float(".").is_nan());
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
    }

    #[test]
    fn to_fixed_rounds_ties_away_from_zero() {
        assert!(matches!(to_fixed(2.5, &Value::Number(0.0)).unwrap(), Value::String(s) if s == "3"));
        assert!(matches!(to_fixed(1.234, &Value::Number(2.0)).unwrap(), Value::String(s) if s == "1.23"));
        assert!(to_fixed(1.0, &Value::Number(101.0)).is_err());
    }

    #[test]
    fn radix_conversion() {
        assert!(matches!(radix_string(255.0, &Value::Number(16.0)).unwrap(), Value::String(s) if s == "ff"));
        assert!(matches!(radix_string(-5.0, &Value::Number(2.0)).unwrap(), Value::String(s) if s == "-101"));
    }

    #[test]
    fn relative_indices_clamp() {
        assert_eq!(relative(&Value::Number(-2.0), 5, 0), 3);
        assert_eq!(relative(&Value::Number(-10.0), 5, 0), 0);
        assert_eq!(relative(&Value::Number(10.0), 5, 0), 5);
        assert_eq!(relative(&Value::Undefined, 5, 5), 5);
    }

    #[test]
    fn static_members_resolve() {
        assert!(matches!(static_member("Object", "keys"), Some(Value::Function(_))));
        assert!(matches!(static_member("Number", "MAX_SAFE_INTEGER"), Some(Value::Number(_))));
        assert!(static_member("Object", "nope").is_none());
    }

    #[test]
    fn instanceof_checks_error_classes() {
        let err = Value::error("TypeError", "x");
        let error_ctor = Value::function(Callable::Builtin("Error"));
        let range_ctor = Value::function(Callable::Builtin("RangeError"));
        assert!(instance_of(&err, &error_ctor).unwrap());
        assert!(!instance_of(&err, &range_ctor).unwrap());
        assert!(instance_of(&err, &Value::Null).is_err());
    }

    #[test]
    fn instanceof_checks_internal_kinds() {
        let map = Value::internal(Internal::Map(Vec::new()));
        let map_ctor = Value::function(Callable::Builtin("Map"));
        let date_ctor = Value::function(Callable::Builtin("Date"));
        assert!(instance_of(&map, &map_ctor).unwrap());
        assert!(!instance_of(&map, &date_ctor).unwrap());
        assert!(!instance_of(&Value::object(Vec::new()), &map_ctor).unwrap());
    }

    #[test]
    fn collection_sizes_are_computed() {
        let set = Obj {
            internal: Some(Internal::Set(vec![Value::Number(1.0), Value::Number(2.0)])),
            ..Obj::default()
        };
        assert!(matches!(internal_property(&set, "size"), Some(Value::Number(n)) if n == 2.0));
        assert!(internal_property(&set, "length").is_none());
        assert!(internal_property(&Obj::default(), "size").is_none());
    }

    #[test]
    fn array_length_is_capped() {
        assert!(array_from_length(&[Value::Number(3.0)], 10).is_ok());
        assert!(array_from_length(&[Value::Number(11.0)], 10).is_err());
        assert!(array_from_length(&[Value::Number(-1.0)], 10).is_err());
    }

    // ── URI coding ───────────────────────────────────────────────────────────

    #[test]
    fn encodes_uri_components() {
        assert_eq!(encode_uri("a b&c=d/é!", true), "a%20b%26c%3Dd%2F%C3%A9!");
        assert_eq!(encode_uri("https://x.io/a b?q=1#f", false), "https://x.io/a%20b?q=1#f");
    }

    #[test]
    fn decodes_uri_components() {
        assert_eq!(decode_uri("a%20b%26%C3%A9", true).unwrap(), "a b&é");
        assert_eq!(decode_uri("a%20b%26c", false).unwrap(), "a b%26c");
        assert!(decode_uri("%E0%A4%A", true).is_err());
        assert!(decode_uri("%zz", true).is_err());
        assert!(decode_uri("%C3", true).is_err());
    }

    #[test]
    fn formats_locale_numbers() {
        assert_eq!(locale_number(1234567.891), "1,234,567.891");
        assert_eq!(locale_number(1000.0), "1,000");
        assert_eq!(locale_number(-0.5), "-0.5");
        assert_eq!(locale_number(12.34567), "12.346");
        assert_eq!(locale_number(999.0), "999");
    }
}
