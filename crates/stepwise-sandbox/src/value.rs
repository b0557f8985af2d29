//! Runtime values of the script language and their conversions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Number};

use crate::ast::{ClassDef, FunctionDef};
use crate::date;
use crate::regexp::JsRegex;
use crate::scope::Scope;

const MAX_INSPECT_DEPTH: usize = 2;
const MAX_JSON_DEPTH: usize = 256;
const INSPECT_LINE_WIDTH: usize = 72;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub type ArrayRef = Arc<Mutex<Vec<Value>>>;
pub type ObjectRef = Arc<Mutex<Obj>>;

/// A script value. Arrays, objects, functions and promises are shared
/// references; cloning a `Value` never deep-copies them.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Arc<Callable>),
    Promise(Arc<PromiseCell>),
}

/// Plain object storage. Property order is insertion order.
#[derive(Debug, Default)]
pub struct Obj {
    pub props: Vec<(String, Value)>,
    /// Set for error instances (`"Error"`, `"TypeError"`, ...).
    pub class: Option<&'static str>,
    /// Next object on the prototype chain of a class instance.
    pub proto: Option<ObjectRef>,
    pub internal: Option<Internal>,
}

/// Hidden state of the built-in object kinds.
#[derive(Debug)]
pub enum Internal {
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    /// Milliseconds since the epoch; NaN for an invalid date.
    Date(f64),
    RegExp {
        regex: Arc<JsRegex>,
        last_index: usize,
    },
    /// Marks the prototype object of the named class.
    Prototype(String),
}

impl Obj {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.props.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.props.len();
        self.props.retain(|(k, _)| k != key);
        before != self.props.len()
    }

    /// Enumerable keys. An error's `message` and `#private` fields are not
    /// enumerable.
    pub fn keys(&self) -> Vec<String> {
        self.props
            .iter()
            .filter(|(k, _)| self.class.is_none() || k != "message")
            .filter(|(k, _)| !k.starts_with('#'))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Name of the class this object is an instance of.
    pub fn class_name(&self) -> Option<String> {
        let proto = lock(self.proto.as_ref()?);
        match &proto.internal {
            Some(Internal::Prototype(name)) => Some(name.clone()),
            _ => None,
        }
    }
}

/// Look `key` up along the prototype chain starting at `start`.
pub fn inherited(start: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = start.clone();
    loop {
        let next = {
            let guard = lock(&current);
            if let Some(value) = guard.get(key) {
                return Some(value.clone());
            }
            guard.proto.clone()
        };
        current = next?;
    }
}

/// Whether `prototype` sits on the prototype chain of `value`.
pub fn has_in_chain(value: &Value, prototype: &ObjectRef) -> bool {
    let Value::Object(obj) = value else {
        return false;
    };
    let mut next = lock(obj).proto.clone();
    while let Some(current) = next {
        if Arc::ptr_eq(&current, prototype) {
            return true;
        }
        next = lock(&current).proto.clone();
    }
    false
}

pub enum Callable {
    Closure { def: Arc<FunctionDef>, scope: Scope },
    /// A function registered by the embedder.
    Host(String),
    /// A global builtin addressed by path, e.g. `"Math.max"`.
    Builtin(&'static str),
    /// A builtin method bound to its receiver, e.g. `[1, 2].push`.
    Method { this: Value, name: &'static str },
    /// `resolve` / `reject` handed to a `new Promise` executor.
    Resolver {
        slot: Arc<Mutex<Option<Result<Value, Value>>>>,
        reject: bool,
    },
    Class(ClassValue),
}

/// A class: its prototype, static members and the scopes its methods close
/// over.
pub struct ClassValue {
    pub def: Arc<ClassDef>,
    pub parent: Option<Value>,
    pub prototype: ObjectRef,
    pub statics: ObjectRef,
    /// Scope of constructors, instance methods and field initializers.
    pub instance_scope: Scope,
    pub static_scope: Scope,
}

impl ClassValue {
    /// A static member, inherited ones included.
    pub fn static_member(&self, key: &str) -> Option<Value> {
        if let Some(value) = lock(&self.statics).get(key) {
            return Some(value.clone());
        }
        match &self.parent {
            Some(Value::Function(parent)) => match &**parent {
                Callable::Class(parent) => parent.static_member(key),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Callable {
    pub fn name(&self) -> String {
        match self {
            Callable::Closure { def, .. } => def.name.clone().unwrap_or_default(),
            Callable::Host(name) => name.clone(),
            Callable::Builtin(path) => path.rsplit('.').next().unwrap_or(path).to_string(),
            Callable::Method { name, .. } => name.to_string(),
            Callable::Resolver { reject, .. } => {
                let name = if *reject { "reject" } else { "resolve" };
                name.to_string()
            }
            Callable::Class(class) => class.def.name.clone().unwrap_or_default(),
        }
    }

    pub fn is_async(&self) -> bool {
        match self {
            Callable::Closure { def, .. } => def.is_async,
            Callable::Host(_) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name())
    }
}

/// An already-settled promise. `handled` flips once anything observes it.
#[derive(Debug)]
pub struct PromiseCell {
    pub outcome: Result<Value, Value>,
    handled: AtomicBool,
}

impl PromiseCell {
    pub fn new(outcome: Result<Value, Value>) -> Self {
        Self {
            outcome,
            handled: AtomicBool::new(false),
        }
    }

    pub fn mark_handled(&self) {
        self.handled.store(true, Ordering::SeqCst);
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::SeqCst)
    }
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(Mutex::new(items)))
    }

    pub fn object(props: Vec<(String, Value)>) -> Self {
        Value::Object(Arc::new(Mutex::new(Obj {
            props,
            ..Obj::default()
        })))
    }

    pub fn internal(internal: Internal) -> Self {
        Value::Object(Arc::new(Mutex::new(Obj {
            internal: Some(internal),
            ..Obj::default()
        })))
    }

    pub fn function(callable: Callable) -> Self {
        Value::Function(Arc::new(callable))
    }

    pub fn error(class: &'static str, message: impl Into<String>) -> Self {
        Value::Object(Arc::new(Mutex::new(Obj {
            props: vec![("message".to_string(), Value::String(message.into()))],
            class: Some(class),
            ..Obj::default()
        })))
    }

    pub fn resolved(value: Value) -> Self {
        Value::Promise(Arc::new(PromiseCell::new(Ok(value))))
    }
}

// ── Conversions ──────────────────────────────────────────────────────────────

/// Render a number the way `String(n)` does.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        let name = if n > 0.0 { "Infinity" } else { "-Infinity" };
        return name.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    format!("{n}")
}

/// Parse a string the way `Number(s)` does.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN);
        }
    }
    let numeric = body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !numeric {
        return f64::NAN;
    }
    body.parse::<f64>().map(|v| sign * v).unwrap_or(f64::NAN)
}

/// Time value of a `Date` object.
pub fn date_value(value: &Value) -> Option<f64> {
    match value {
        Value::Object(obj) => match lock(obj).internal {
            Some(Internal::Date(time)) => Some(time),
            _ => None,
        },
        _ => None,
    }
}

pub fn error_class(value: &Value) -> Option<&'static str> {
    match value {
        Value::Object(obj) => lock(obj).class,
        _ => None,
    }
}

/// The `message` of an error object, or the string form of anything else.
pub fn error_message(value: &Value) -> String {
    if let Value::Object(obj) = value {
        let message = {
            let obj = lock(obj);
            obj.class.map(|_| obj.get("message").cloned())
        };
        if let Some(message) = message {
            return message.as_ref().map(to_string).unwrap_or_default();
        }
    }
    to_string(value)
}

pub fn to_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let items = lock(items).clone();
            items
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => to_string(other),
                })
                .collect::<Vec<_>>()
                .join(",")
        }
        Value::Object(obj) => {
            let (special, class) = {
                let guard = lock(obj);
                let special = match &guard.internal {
                    Some(Internal::Date(time)) => Some(date::display_string(*time)),
                    Some(Internal::RegExp { regex, .. }) => Some(regex.to_string()),
                    Some(Internal::Map(_)) => Some("[object Map]".to_string()),
                    Some(Internal::Set(_)) => Some("[object Set]".to_string()),
                    _ => None,
                };
                (special, guard.class)
            };
            match (special, class) {
                (Some(special), _) => special,
                (None, Some(class)) => {
                    let message = error_message(value);
                    if message.is_empty() {
                        class.to_string()
                    } else {
                        format!("{class}: {message}")
                    }
                }
                (None, None) => "[object Object]".to_string(),
            }
        }
        Value::Function(f) if matches!(**f, Callable::Class(_)) => format!("class {} {{ }}", f.name()),
        Value::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
        Value::Promise(_) => "[object Promise]".to_string(),
    }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::String(s) => string_to_number(s),
        Value::Array(_) => string_to_number(&to_string(value)),
        Value::Object(_) => date_value(value).unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

pub fn to_int32(value: &Value) -> i32 {
    let n = to_number(value);
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 & 0xFFFF_FFFF) as u32 as i32
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Function(_) => "function",
        Value::Null | Value::Array(_) | Value::Object(_) | Value::Promise(_) => "object",
    }
}

/// `===`: identity for reference values, value equality for primitives.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Arc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Arc::ptr_eq(x, y),
        (Value::Promise(x), Value::Promise(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// `==` with the usual coercions.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(_), Value::String(_) | Value::Bool(_))
        | (Value::String(_) | Value::Bool(_), Value::Number(_))
        | (Value::Bool(_), Value::String(_))
        | (Value::String(_), Value::Bool(_)) => to_number(a) == to_number(b),
        (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_) | Value::Bool(_)) => {
            loose_equals(&Value::String(to_string(a)), b)
        }
        (Value::String(_) | Value::Number(_) | Value::Bool(_), Value::Array(_) | Value::Object(_)) => {
            loose_equals(a, &Value::String(to_string(b)))
        }
        _ => strict_equals(a, b),
    }
}

// ── JSON bridge ──────────────────────────────────────────────────────────────

pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}

fn json_number(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Convert to JSON the way `JSON.stringify` would see the value.
///
/// Returns `Ok(None)` for values `JSON.stringify` omits (`undefined`,
/// functions). Cycles are rejected.
pub fn to_json(value: &Value) -> Result<Option<serde_json::Value>, String> {
    let mut stack = Vec::new();
    to_json_inner(value, &mut stack)
}

fn to_json_inner(
    value: &Value,
    stack: &mut Vec<usize>,
) -> Result<Option<serde_json::Value>, String> {
    if stack.len() > MAX_JSON_DEPTH {
        return Err("Maximum JSON nesting depth exceeded".to_string());
    }
    let json = match value {
        Value::Undefined | Value::Function(_) => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => json_number(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Promise(_) => serde_json::Value::Object(Map::new()),
        Value::Array(items) => {
            let id = Arc::as_ptr(items) as usize;
            if stack.contains(&id) {
                return Err("Converting circular structure to JSON".to_string());
            }
            let items = lock(items).clone();
            stack.push(id);
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(to_json_inner(item, stack)?.unwrap_or(serde_json::Value::Null));
            }
            stack.pop();
            serde_json::Value::Array(out)
        }
        Value::Object(obj) => {
            let id = Arc::as_ptr(obj) as usize;
            if stack.contains(&id) {
                return Err("Converting circular structure to JSON".to_string());
            }
            if let Some(time) = date_value(value) {
                return Ok(Some(
                    date::iso_string(time).map_or(serde_json::Value::Null, serde_json::Value::String),
                ));
            }
            let (keys, props) = {
                let guard = lock(obj);
                (guard.keys(), guard.props.clone())
            };
            stack.push(id);
            let mut map = Map::new();
            for (key, value) in props {
                if !keys.contains(&key) {
                    continue;
                }
                if let Some(json) = to_json_inner(&value, stack)? {
                    map.insert(key, json);
                }
            }
            stack.pop();
            serde_json::Value::Object(map)
        }
    };
    Ok(Some(json))
}

/// Convert for passing to the embedder: omitted values become `null`.
pub fn to_json_lossy(value: &Value) -> serde_json::Value {
    to_json(value)
        .ok()
        .flatten()
        .unwrap_or(serde_json::Value::Null)
}

// ── Inspection (console formatting) ──────────────────────────────────────────

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n"))
}

/// Render a value for `console.log`: strings bare, everything else in the
/// bracketed `{ a: 1 }` / `[ 1, 2 ]` notation.
pub fn inspect(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) if error_class(value).is_some() => to_string(value),
        other => inspect_nested(other, 0, &mut Vec::new()),
    }
}

fn wrap(open: &str, close: &str, items: Vec<String>, depth: usize) -> String {
    if items.is_empty() {
        return format!("{open}{close}");
    }
    let flat_len: usize = items.iter().map(|i| i.len() + 2).sum::<usize>() + open.len() + close.len();
    if flat_len <= INSPECT_LINE_WIDTH && items.iter().all(|i| !i.contains('\n')) {
        return format!("{open} {} {close}", items.join(", "));
    }
    let indent = "  ".repeat(depth + 1);
    let closing_indent = "  ".repeat(depth);
    format!(
        "{open}\n{indent}{}\n{closing_indent}{close}",
        items.join(&format!(",\n{indent}"))
    )
}

fn inspect_nested(value: &Value, depth: usize, seen: &mut Vec<usize>) -> String {
    match value {
        Value::String(s) => quote(s),
        Value::Function(f) if matches!(**f, Callable::Class(_)) => format!("[class {}]", f.name()),
        Value::Function(f) => {
            let kind = if f.is_async() { "AsyncFunction" } else { "Function" };
            let name = f.name();
            if name.is_empty() {
                format!("[{kind} (anonymous)]")
            } else {
                format!("[{kind}: {name}]")
            }
        }
        Value::Promise(cell) => match &cell.outcome {
            Ok(v) => format!("Promise {{ {} }}", inspect_nested(v, depth + 1, seen)),
            Err(e) => format!("Promise {{ <rejected> {} }}", inspect_nested(e, depth + 1, seen)),
        },
        Value::Array(items) => {
            let id = Arc::as_ptr(items) as usize;
            if seen.contains(&id) {
                return "[Circular *1]".to_string();
            }
            if depth > MAX_INSPECT_DEPTH {
                return "[Array]".to_string();
            }
            let items = lock(items).clone();
            seen.push(id);
            let rendered = items
                .iter()
                .map(|item| inspect_nested(item, depth + 1, seen))
                .collect();
            seen.pop();
            wrap("[", "]", rendered, depth)
        }
        Value::Object(obj) => {
            let id = Arc::as_ptr(obj) as usize;
            if seen.contains(&id) {
                return "[Circular *1]".to_string();
            }
            if error_class(value).is_some() {
                return format!("[{}]", to_string(value));
            }
            let (props, internal, class_name) = {
                let guard = lock(obj);
                let internal = match &guard.internal {
                    Some(Internal::Map(entries)) => Some(Err(entries.clone())),
                    Some(Internal::Set(items)) => Some(Ok(items.clone())),
                    Some(Internal::Date(time)) => {
                        return date::iso_string(*time).unwrap_or_else(|| "Invalid Date".to_string())
                    }
                    Some(Internal::RegExp { regex, .. }) => return regex.to_string(),
                    _ => None,
                };
                (guard.props.clone(), internal, guard.class_name())
            };
            if depth > MAX_INSPECT_DEPTH {
                return match (internal, class_name) {
                    (Some(Err(_)), _) => "[Map]".to_string(),
                    (Some(Ok(_)), _) => "[Set]".to_string(),
                    (None, Some(name)) => format!("[{name}]"),
                    (None, None) => "[Object]".to_string(),
                };
            }
            seen.push(id);
            let rendered = match &internal {
                Some(Err(entries)) => entries
                    .iter()
                    .map(|(k, v)| {
                        format!(
                            "{} => {}",
                            inspect_nested(k, depth + 1, seen),
                            inspect_nested(v, depth + 1, seen)
                        )
                    })
                    .collect(),
                Some(Ok(items)) => items
                    .iter()
                    .map(|item| inspect_nested(item, depth + 1, seen))
                    .collect(),
                None => props
                    .iter()
                    .filter(|(k, _)| !k.starts_with('#'))
                    .map(|(k, v)| {
                        let key = if is_identifier(k) { k.clone() } else { quote(k) };
                        format!("{key}: {}", inspect_nested(v, depth + 1, seen))
                    })
                    .collect(),
            };
            seen.pop();
            let open = match (&internal, class_name) {
                (Some(Err(entries)), _) => format!("Map({}) {{", entries.len()),
                (Some(Ok(items)), _) => format!("Set({}) {{", items.len()),
                (None, Some(name)) => format!("{name} {{"),
                (None, None) => "{".to_string(),
            };
            wrap(&open, "}", rendered, depth)
        }
        other => to_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_numbers_like_string_conversion() {
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(-1.5), "-1.5");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }

    #[test]
    fn parses_numeric_strings() {
        assert_eq!(string_to_number(" 12 "), 12.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
    }

    #[test]
    fn strict_equality_uses_identity_for_objects() {
        let a = Value::object(vec![]);
        let b = Value::object(vec![]);
        assert!(strict_equals(&a, &a.clone()));
        assert!(!strict_equals(&a, &b));
        assert!(strict_equals(&Value::string("x"), &Value::string("x")));
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::Number(1.0), &Value::string("1")));
        assert!(loose_equals(&Value::Bool(true), &Value::Number(1.0)));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
    }

    #[test]
    fn json_round_trip_keeps_integers_integral() {
        let value = from_json(&json!({"a": 1, "b": [true, null, "x"], "c": 1.5}));
        assert_eq!(
            to_json(&value).unwrap(),
            Some(json!({"a": 1, "b": [true, null, "x"], "c": 1.5}))
        );
    }

    #[test]
    fn json_omits_undefined_properties() {
        let value = Value::object(vec![
            ("a".to_string(), Value::Undefined),
            ("b".to_string(), Value::Number(2.0)),
        ]);
        assert_eq!(to_json(&value).unwrap(), Some(json!({"b": 2})));
    }

    #[test]
    fn json_rejects_cycles() {
        let items = Arc::new(Mutex::new(vec![]));
        let array = Value::Array(items.clone());
        lock(&items).push(array.clone());
        assert!(to_json(&array).is_err());
    }

    #[test]
    fn inspects_like_node() {
        let value = from_json(&json!({"a": 1, "b": ["x", 2], "c": {}}));
        assert_eq!(inspect(&value), "{ a: 1, b: [ 'x', 2 ], c: {} }");
        assert_eq!(inspect(&Value::string("plain")), "plain");
        assert_eq!(inspect(&Value::error("TypeError", "bad")), "TypeError: bad");
    }

    #[test]
    fn inspect_breaks_long_objects_across_lines() {
        let long = "y".repeat(80);
        let value = from_json(&json!({"k": long}));
        assert_eq!(inspect(&value), format!("{{\n  k: '{long}'\n}}"));
    }

    #[test]
    fn inspects_collections_like_node() {
        let map = Value::internal(Internal::Map(vec![(Value::string("a"), Value::Number(1.0))]));
        assert_eq!(inspect(&map), "Map(1) { 'a' => 1 }");
        let set = Value::internal(Internal::Set(vec![Value::Number(1.0), Value::Number(2.0)]));
        assert_eq!(inspect(&set), "Set(2) { 1, 2 }");
        assert_eq!(inspect(&Value::internal(Internal::Set(Vec::new()))), "Set(0) {}");
        assert_eq!(to_json(&map).unwrap(), Some(json!({})));
    }

    #[test]
    fn dates_serialize_as_iso_strings() {
        let date = Value::internal(Internal::Date(0.0));
        assert_eq!(to_json(&date).unwrap(), Some(json!("1970-01-01T00:00:00.000Z")));
        assert_eq!(inspect(&date), "1970-01-01T00:00:00.000Z");
        assert_eq!(to_number(&date), 0.0);
        let invalid = Value::internal(Internal::Date(f64::NAN));
        assert_eq!(to_json(&invalid).unwrap(), Some(json!(null)));
    }

    #[test]
    fn private_fields_are_hidden() {
        let value = Value::object(vec![
            ("#secret".to_string(), Value::Number(1.0)),
            ("shown".to_string(), Value::Number(2.0)),
        ]);
        assert_eq!(to_json(&value).unwrap(), Some(json!({"shown": 2})));
        assert_eq!(inspect(&value), "{ shown: 2 }");
    }

    #[test]
    fn error_objects_hide_message_from_keys() {
        let err = Value::error("Error", "boom");
        assert_eq!(error_message(&err), "boom");
        match err {
            Value::Object(obj) => assert!(lock(&obj).keys().is_empty()),
            _ => unreachable!(),
        }
    }
}
