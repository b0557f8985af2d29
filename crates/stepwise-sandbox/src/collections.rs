//! `Map` and `Set`: insertion-ordered collections keyed by SameValueZero.

use crate::builtins::same_value_zero;
use crate::interpreter::{iterable_items, throw, Completion, Interpreter};
use crate::value::*;

pub(crate) const MAP_METHODS: &[&str] = &[
    "get", "set", "has", "delete", "clear", "keys", "values", "entries", "forEach", "toString",
];

pub(crate) const SET_METHODS: &[&str] = &[
    "add", "has", "delete", "clear", "keys", "values", "entries", "forEach", "toString",
];

fn position<T>(items: &[T], key: &Value, key_of: impl Fn(&T) -> &Value) -> Option<usize> {
    items.iter().position(|item| same_value_zero(key_of(item), key))
}

/// `-0` keys are stored as `+0`.
fn normalize(key: Value) -> Value {
    match key {
        Value::Number(n) if n == 0.0 => Value::Number(0.0),
        other => other,
    }
}

fn map_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match position(entries, &key, |(k, _)| k) {
        Some(index) => entries[index].1 = value,
        None => entries.push((normalize(key), value)),
    }
}

fn set_insert(items: &mut Vec<Value>, value: Value) {
    if position(items, &value, |v| v).is_none() {
        items.push(normalize(value));
    }
}

/// A `Map` method other than `forEach`; `None` for an unknown name.
fn map_method(entries: &mut Vec<(Value, Value)>, this: &Value, name: &str, key: Value, value: Value) -> Option<Value> {
    Some(match name {
        "get" => position(entries, &key, |(k, _)| k)
            .map(|index| entries[index].1.clone())
            .unwrap_or_default(),
        "set" => {
            map_insert(entries, key, value);
            this.clone()
        }
        "has" => Value::Bool(position(entries, &key, |(k, _)| k).is_some()),
        "delete" => Value::Bool(match position(entries, &key, |(k, _)| k) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }),
        "clear" => {
            entries.clear();
            Value::Undefined
        }
        "keys" => Value::array(entries.iter().map(|(k, _)| k.clone()).collect()),
        "values" => Value::array(entries.iter().map(|(_, v)| v.clone()).collect()),
        "entries" => Value::array(
            entries
                .iter()
                .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                .collect(),
        ),
        _ => return None,
    })
}

fn set_method(items: &mut Vec<Value>, this: &Value, name: &str, value: Value) -> Option<Value> {
    Some(match name {
        "add" => {
            set_insert(items, value);
            this.clone()
        }
        "has" => Value::Bool(position(items, &value, |v| v).is_some()),
        "delete" => Value::Bool(match position(items, &value, |v| v) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }),
        "clear" => {
            items.clear();
            Value::Undefined
        }
        "keys" | "values" => Value::array(items.clone()),
        "entries" => Value::array(
            items
                .iter()
                .map(|v| Value::array(vec![v.clone(), v.clone()]))
                .collect(),
        ),
        _ => return None,
    })
}

impl Interpreter {
    /// `new Map(entries)` or `new Set(values)`.
    pub(crate) fn construct_collection(&self, path: &str, args: &[Value]) -> Completion<Value> {
        let source = args.first().cloned().unwrap_or_default();
        let items = match &source {
            Value::Undefined | Value::Null => Vec::new(),
            other => match iterable_items(other) {
                Some(items) => items,
                None => return throw("TypeError", format!("{} is not iterable", inspect(other))),
            },
        };
        if path == "Set" {
            let mut set = Vec::with_capacity(items.len());
            for item in items {
                self.tick()?;
                set_insert(&mut set, item);
            }
            return Ok(Value::internal(Internal::Set(set)));
        }
        let mut map = Vec::with_capacity(items.len());
        for entry in items {
            self.tick()?;
            let Value::Array(pair) = &entry else {
                return throw(
                    "TypeError",
                    format!("Iterator value {} is not an entry object", inspect(&entry)),
                );
            };
            let (key, value) = {
                let pair = lock(pair);
                (
                    pair.first().cloned().unwrap_or_default(),
                    pair.get(1).cloned().unwrap_or_default(),
                )
            };
            map_insert(&mut map, key, value);
        }
        Ok(Value::internal(Internal::Map(map)))
    }

    pub(crate) async fn collection_method(
        &self,
        obj: &ObjectRef,
        this: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Completion<Value> {
        let arg = |index: usize| args.get(index).cloned().unwrap_or_default();
        if name == "forEach" {
            let callback = arg(0);
            if !matches!(callback, Value::Function(_)) {
                return throw("TypeError", format!("{} is not a function", inspect(&callback)));
            }
            // callbacks see a snapshot; mutation during iteration is allowed
            let entries: Vec<(Value, Value)> = match &lock(obj).internal {
                Some(Internal::Map(entries)) => entries.clone(),
                Some(Internal::Set(items)) => items.iter().map(|v| (v.clone(), v.clone())).collect(),
                _ => Vec::new(),
            };
            for (key, value) in entries {
                self.call(&callback, arg(1), vec![value, key, this.clone()]).await?;
            }
            return Ok(Value::Undefined);
        }
        if name == "toString" {
            return Ok(Value::String(to_string(this)));
        }
        let result = match &mut lock(obj).internal {
            Some(Internal::Map(entries)) => map_method(entries, this, name, arg(0), arg(1)),
            Some(Internal::Set(items)) => set_method(items, this, name, arg(0)),
            _ => None,
        };
        match result {
            Some(value) => Ok(value),
            None => throw("TypeError", format!("{name} is not a function")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> (Vec<(Value, Value)>, Value) {
        (Vec::new(), Value::Undefined)
    }

    #[test]
    fn map_keys_compare_by_same_value_zero() {
        let (mut entries, this) = map();
        map_method(&mut entries, &this, "set", Value::Number(f64::NAN), Value::string("nan"));
        map_method(&mut entries, &this, "set", Value::Number(-0.0), Value::string("zero"));
        map_method(&mut entries, &this, "set", Value::string("1"), Value::string("text"));
        assert_eq!(to_string(&map_method(&mut entries, &this, "get", Value::Number(f64::NAN), Value::Undefined).unwrap()), "nan");
        assert_eq!(to_string(&map_method(&mut entries, &this, "get", Value::Number(0.0), Value::Undefined).unwrap()), "zero");
        assert!(matches!(
            map_method(&mut entries, &this, "get", Value::Number(1.0), Value::Undefined),
            Some(Value::Undefined)
        ));
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn map_set_overwrites_in_place() {
        let (mut entries, this) = map();
        map_method(&mut entries, &this, "set", Value::string("a"), Value::Number(1.0));
        map_method(&mut entries, &this, "set", Value::string("b"), Value::Number(2.0));
        map_method(&mut entries, &this, "set", Value::string("a"), Value::Number(3.0));
        let keys = map_method(&mut entries, &this, "keys", Value::Undefined, Value::Undefined).unwrap();
        assert_eq!(inspect(&keys), "[ 'a', 'b' ]");
        assert!(matches!(
            map_method(&mut entries, &this, "delete", Value::string("a"), Value::Undefined),
            Some(Value::Bool(true))
        ));
        assert!(matches!(
            map_method(&mut entries, &this, "delete", Value::string("a"), Value::Undefined),
            Some(Value::Bool(false))
        ));
    }

    #[test]
    fn sets_keep_first_insertion_order() {
        let mut items = Vec::new();
        for value in [3.0, 1.0, 3.0, 2.0, 1.0] {
            set_method(&mut items, &Value::Undefined, "add", Value::Number(value));
        }
        assert_eq!(items.iter().map(to_number).collect::<Vec<_>>(), vec![3.0, 1.0, 2.0]);
        assert!(set_method(&mut items, &Value::Undefined, "size", Value::Undefined).is_none());
    }
}
