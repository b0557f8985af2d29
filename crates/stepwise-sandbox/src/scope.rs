//! Lexical environments.

use std::sync::{Arc, Mutex};

use crate::value::{lock, Value};

struct Slot {
    value: Value,
    mutable: bool,
}

struct Frame {
    vars: Mutex<Vec<(String, Slot)>>,
    parent: Option<Scope>,
    /// Function frames receive `var` declarations and may carry `this`.
    function: bool,
    this: Option<Value>,
}

/// A chain of frames ending at the global frame. Cloning shares the frame.
#[derive(Clone)]
pub struct Scope(Arc<Frame>);

/// Assigning to a `const` binding.
#[derive(Debug, PartialEq, Eq)]
pub struct ConstAssignment;

impl Scope {
    pub fn global() -> Self {
        Self(Arc::new(Frame {
            vars: Mutex::new(Vec::new()),
            parent: None,
            function: true,
            this: None,
        }))
    }

    /// A block scope nested in this one.
    pub fn child(&self) -> Self {
        Self(Arc::new(Frame {
            vars: Mutex::new(Vec::new()),
            parent: Some(self.clone()),
            function: false,
            this: None,
        }))
    }

    /// A function scope. Arrow functions pass `None` and see the outer `this`.
    pub fn function_child(&self, this: Option<Value>) -> Self {
        Self(Arc::new(Frame {
            vars: Mutex::new(Vec::new()),
            parent: Some(self.clone()),
            function: true,
            this,
        }))
    }

    fn root(&self) -> &Scope {
        let mut scope = self;
        while let Some(parent) = &scope.0.parent {
            scope = parent;
        }
        scope
    }

    fn nearest_function(&self) -> &Scope {
        let mut scope = self;
        while !scope.0.function {
            match &scope.0.parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        scope
    }

    /// Bind `name` in this frame, shadowing any outer binding.
    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        let mut vars = lock(&self.0.vars);
        match vars.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = Slot { value, mutable },
            None => vars.push((name.to_string(), Slot { value, mutable })),
        }
    }

    /// `var` semantics: bind in the nearest function frame. A bare
    /// redeclaration keeps the existing value.
    pub fn declare_var(&self, name: &str, value: Option<Value>) {
        let target = self.nearest_function();
        let mut vars = lock(&target.0.vars);
        match (vars.iter_mut().find(|(n, _)| n == name), value) {
            (Some((_, slot)), Some(value)) => slot.value = value,
            (Some(_), None) => {}
            (None, value) => vars.push((
                name.to_string(),
                Slot {
                    value: value.unwrap_or_default(),
                    mutable: true,
                },
            )),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some((_, slot)) = lock(&current.0.vars).iter().find(|(n, _)| n == name) {
                return Some(slot.value.clone());
            }
            scope = current.0.parent.as_ref();
        }
        None
    }

    /// Update the nearest binding of `name`; an undeclared name becomes a
    /// global.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), ConstAssignment> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            let mut vars = lock(&current.0.vars);
            if let Some((_, slot)) = vars.iter_mut().find(|(n, _)| n == name) {
                if !slot.mutable {
                    return Err(ConstAssignment);
                }
                slot.value = value;
                return Ok(());
            }
            drop(vars);
            scope = current.0.parent.as_ref();
        }
        self.root().declare(name, value, true);
        Ok(())
    }

    pub fn this(&self) -> Value {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(this) = &current.0.this {
                return this.clone();
            }
            scope = current.0.parent.as_ref();
        }
        Value::Undefined
    }

    /// Names bound directly in this frame, in declaration order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.0.vars).iter().map(|(n, _)| n.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::strict_equals;

    #[test]
    fn undeclared_assignment_lands_in_global_frame() {
        let global = Scope::global();
        let script = global.function_child(None);
        let block = script.child();
        block.assign("x", Value::Number(1.0)).unwrap();
        assert_eq!(global.names(), vec!["x".to_string()]);
        assert!(script.names().is_empty());
    }

    #[test]
    fn var_hoists_to_function_frame() {
        let global = Scope::global();
        let function = global.function_child(None);
        let block = function.child();
        block.declare_var("v", Some(Value::Bool(true)));
        assert_eq!(function.names(), vec!["v".to_string()]);
        assert!(block.names().is_empty());
    }

    #[test]
    fn const_bindings_reject_assignment() {
        let scope = Scope::global();
        scope.declare("c", Value::Number(1.0), false);
        assert_eq!(scope.assign("c", Value::Number(2.0)), Err(ConstAssignment));
    }

    #[test]
    fn inner_bindings_shadow_outer() {
        let outer = Scope::global();
        outer.declare("x", Value::Number(1.0), true);
        let inner = outer.child();
        inner.declare("x", Value::Number(2.0), true);
        assert!(strict_equals(&inner.lookup("x").unwrap(), &Value::Number(2.0)));
        assert!(strict_equals(&outer.lookup("x").unwrap(), &Value::Number(1.0)));
    }

    #[test]
    fn arrow_frames_see_outer_this() {
        let global = Scope::global();
        let method = global.function_child(Some(Value::string("receiver")));
        let arrow = method.function_child(None);
        assert!(strict_equals(&arrow.this(), &Value::string("receiver")));
    }
}
