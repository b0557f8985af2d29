//! Async tree-walking evaluator.
//!
//! Every evaluation step returns a boxed `Send` future so that host calls can
//! be awaited from arbitrarily deep inside a script. Promises settle eagerly:
//! an async call has finished by the time its promise value exists.
//!
//! Polling nested futures recurses on the native stack, so the recursive
//! entry points run through [`guarded`], which moves onto a fresh stack
//! segment when the current one runs low.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use stepwise_contracts::callable::CallableResult;

use crate::ast::*;
use crate::builtins::ERROR_CLASSES;
use crate::console::BufferConsole;
use crate::regexp::{JsRegex, MatchExtrasTable};
use crate::sandbox::HostFunction;
use crate::scope::Scope;
use crate::value::*;
use crate::{STACK_RED_ZONE, STACK_SEGMENT};

const MAX_CALL_DEPTH: usize = 100;

/// Longest string a script may build, in bytes.
pub(crate) const MAX_STRING_LENGTH: usize = 1 << 25;

// Hidden bindings in class scopes. `%` cannot appear in a script identifier.
const CURRENT_CLASS: &str = "%class";
const SUPER_CONSTRUCTOR: &str = "%super";
const SUPER_HOME: &str = "%home";

pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

/// What a loop does after one iteration of its body.
enum LoopStep {
    Next,
    Exit,
    Leave(Flow),
}

fn loop_step(flow: Flow, label: Option<&str>) -> LoopStep {
    match flow {
        Flow::Normal | Flow::Continue(None) => LoopStep::Next,
        Flow::Break(None) => LoopStep::Exit,
        Flow::Continue(Some(target)) if label == Some(target.as_str()) => LoopStep::Next,
        Flow::Break(Some(target)) if label == Some(target.as_str()) => LoopStep::Exit,
        other => LoopStep::Leave(other),
    }
}

fn is_loop(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::For { .. } | Stmt::ForOf { .. } | Stmt::ForIn { .. } | Stmt::While { .. } | Stmt::DoWhile { .. }
    )
}

/// Polls its inner future on a stack with at least `STACK_RED_ZONE` bytes
/// free.
struct StackGuarded<'a, T> {
    inner: BoxFuture<'a, T>,
}

impl<T> Future for StackGuarded<'_, T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let inner = &mut self.inner;
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || inner.as_mut().poll(cx))
    }
}

fn guarded<'a, T: 'a>(inner: BoxFuture<'a, T>) -> BoxFuture<'a, T> {
    Box::pin(StackGuarded { inner })
}

#[derive(Debug)]
pub(crate) enum Abrupt {
    Throw(Value),
    /// A nullish link in an optional chain; caught at the chain boundary.
    ShortCircuit,
}

pub(crate) type Completion<T> = Result<T, Abrupt>;

pub(crate) fn throw<T>(class: &'static str, message: impl Into<String>) -> Completion<T> {
    Err(Abrupt::Throw(Value::error(class, message)))
}

#[derive(Clone, Copy)]
enum BindMode {
    Declare(DeclKind),
    Assign,
}

/// Where an assignment writes.
enum Reference {
    Name(String),
    Property(Value, String),
}

/// State of one script execution.
pub(crate) struct Interpreter {
    hosts: HashMap<String, Arc<dyn HostFunction>>,
    pub(crate) console: BufferConsole,
    max_operations: u64,
    operations: AtomicU64,
    depth: AtomicUsize,
    /// Host calls made so far, with the script-side value each returned.
    pub(crate) calls: Mutex<Vec<(CallableResult, Value)>>,
    rejections: Mutex<Vec<Arc<PromiseCell>>>,
    /// Compiled regular expressions keyed by `/source/flags`.
    pub(crate) regexes: Mutex<HashMap<String, Arc<JsRegex>>>,
    /// `index` / `input` / `groups` of match arrays.
    pub(crate) array_extras: MatchExtrasTable,
}

impl Interpreter {
    pub(crate) fn new(
        hosts: HashMap<String, Arc<dyn HostFunction>>,
        console: BufferConsole,
        max_operations: u64,
    ) -> Self {
        Self {
            hosts,
            console,
            max_operations,
            operations: AtomicU64::new(0),
            depth: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            rejections: Mutex::new(Vec::new()),
            regexes: Mutex::new(HashMap::new()),
            array_extras: Mutex::new(HashMap::new()),
        }
    }

    /// Run `program` as the body of an async function nested in `globals`
    /// and return its settled result.
    pub(crate) async fn run(&self, program: &[Stmt], globals: &Scope) -> Completion<Value> {
        let scope = globals.function_child(None);
        hoist_vars(program, &scope);
        let value = match self.exec_stmts(program, &scope).await? {
            Flow::Return(value) => value,
            _ => Value::Undefined,
        };
        self.await_value(value)
    }

    /// Rejected promises nothing ever observed.
    pub(crate) fn unhandled_rejections(&self) -> Vec<Value> {
        lock(&self.rejections)
            .iter()
            .filter(|cell| !cell.is_handled())
            .filter_map(|cell| cell.outcome.clone().err())
            .collect()
    }

    /// Longest array a script may build.
    pub(crate) fn max_array_length(&self) -> usize {
        usize::try_from(self.max_operations).unwrap_or(usize::MAX)
    }

    pub(crate) fn tick(&self) -> Completion<()> {
        let used = self.operations.fetch_add(1, Ordering::Relaxed) + 1;
        if used > self.max_operations {
            return throw(
                "RangeError",
                format!("Script exceeded the maximum of {} operations", self.max_operations),
            );
        }
        Ok(())
    }

    // ── Promises ─────────────────────────────────────────────────────────────

    pub(crate) fn promise_resolve(&self, value: Value) -> Value {
        match value {
            promise @ Value::Promise(_) => promise,
            other => Value::resolved(other),
        }
    }

    pub(crate) fn promise_reject(&self, reason: Value) -> Value {
        let cell = Arc::new(PromiseCell::new(Err(reason)));
        lock(&self.rejections).push(cell.clone());
        Value::Promise(cell)
    }

    /// `await`: unwrap a promise, identity for anything else.
    pub(crate) fn await_value(&self, value: Value) -> Completion<Value> {
        match value {
            Value::Promise(cell) => {
                cell.mark_handled();
                match &cell.outcome {
                    Ok(v) => Ok(v.clone()),
                    Err(e) => Err(Abrupt::Throw(e.clone())),
                }
            }
            other => Ok(other),
        }
    }

    // ── Statements ───────────────────────────────────────────────────────────

    pub(crate) fn exec_stmts<'a>(
        &'a self,
        stmts: &'a [Stmt],
        scope: &'a Scope,
    ) -> BoxFuture<'a, Completion<Flow>> {
        async move {
            for stmt in stmts {
                if let Stmt::Function(def) = stmt {
                    if let Some(name) = &def.name {
                        scope.declare(name, closure(def, scope), true);
                    }
                }
            }
            for stmt in stmts {
                match self.exec_stmt(stmt, scope).await? {
                    Flow::Normal => {}
                    other => return Ok(other),
                }
            }
            Ok(Flow::Normal)
        }
        .boxed()
    }

    fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, scope: &'a Scope) -> BoxFuture<'a, Completion<Flow>> {
        guarded(
            async move {
                self.tick()?;
                match stmt {
                    Stmt::Expr(expr) => {
                        self.eval(expr, scope).await?;
                        Ok(Flow::Normal)
                    }
                    Stmt::Declare { kind, declarations } => {
                        for (pattern, init) in declarations {
                            match init {
                                Some(init) => {
                                    let value = self.eval(init, scope).await?;
                                    self.bind(pattern, value, scope, BindMode::Declare(*kind)).await?;
                                }
                                None if *kind == DeclKind::Var => {
                                    let mut names = Vec::new();
                                    pattern_names(pattern, &mut names);
                                    for name in names {
                                        scope.declare_var(&name, None);
                                    }
                                }
                                None => {
                                    self.bind(pattern, Value::Undefined, scope, BindMode::Declare(*kind))
                                        .await?;
                                }
                            }
                        }
                        Ok(Flow::Normal)
                    }
                    Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
                    Stmt::Return(expr) => {
                        let value = match expr {
                            Some(expr) => self.eval(expr, scope).await?,
                            None => Value::Undefined,
                        };
                        Ok(Flow::Return(value))
                    }
                    Stmt::If {
                        test,
                        consequent,
                        alternate,
                    } => {
                        if truthy(&self.eval(test, scope).await?) {
                            self.exec_stmt(consequent, scope).await
                        } else if let Some(alternate) = alternate {
                            self.exec_stmt(alternate, scope).await
                        } else {
                            Ok(Flow::Normal)
                        }
                    }
                    Stmt::Block(body) => {
                        let inner = scope.child();
                        self.exec_stmts(body, &inner).await
                    }
                    Stmt::For { .. }
                    | Stmt::ForOf { .. }
                    | Stmt::ForIn { .. }
                    | Stmt::While { .. }
                    | Stmt::DoWhile { .. } => self.exec_loop(stmt, None, scope).await,
                    Stmt::Labeled { label, body } => {
                        let flow = if is_loop(body) {
                            self.exec_loop(body, Some(label), scope).await?
                        } else {
                            self.exec_stmt(body, scope).await?
                        };
                        Ok(match flow {
                            Flow::Break(Some(target)) if target == *label => Flow::Normal,
                            other => other,
                        })
                    }
                    Stmt::Class(def) => {
                        let class = self.define_class(def, scope).await?;
                        if let Some(name) = &def.name {
                            scope.declare(name, class, true);
                        }
                        Ok(Flow::Normal)
                    }
                    Stmt::Switch {
                        discriminant,
                        cases,
                    } => self.exec_switch(discriminant, cases, scope).await,
                    Stmt::Break(label) => Ok(Flow::Break(label.clone())),
                    Stmt::Continue(label) => Ok(Flow::Continue(label.clone())),
                    Stmt::Throw(expr) => {
                        let value = self.eval(expr, scope).await?;
                        Err(Abrupt::Throw(value))
                    }
                    Stmt::Try {
                        block,
                        param,
                        handler,
                        finalizer,
                    } => {
                        let result = self.exec_stmts(block, &scope.child()).await;
                        let result = match (result, handler) {
                            (Err(Abrupt::Throw(exception)), Some(handler)) => {
                                let catch_scope = scope.child();
                                let bound = match param {
                                    Some(param) => {
                                        self.bind(param, exception, &catch_scope, BindMode::Declare(DeclKind::Let))
                                            .await
                                    }
                                    None => Ok(()),
                                };
                                match bound {
                                    Ok(()) => self.exec_stmts(handler, &catch_scope).await,
                                    Err(err) => Err(err),
                                }
                            }
                            (other, _) => other,
                        };
                        if let Some(finalizer) = finalizer {
                            match self.exec_stmts(finalizer, &scope.child()).await? {
                                Flow::Normal => {}
                                other => return Ok(other),
                            }
                        }
                        result
                    }
                }
            }
            .boxed(),
        )
    }

    async fn exec_loop(&self, stmt: &Stmt, label: Option<&str>, scope: &Scope) -> Completion<Flow> {
        match stmt {
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, label, scope)
                    .await
            }
            Stmt::ForOf {
                kind,
                pattern,
                iterable,
                body,
            } => {
                let iterable_value = self.eval(iterable, scope).await?;
                let items = self.iterate(&iterable_value, iterable)?;
                self.exec_each(*kind, pattern, items, body, label, scope).await
            }
            Stmt::ForIn {
                kind,
                pattern,
                object,
                body,
            } => {
                let object = self.eval(object, scope).await?;
                let keys = own_keys(&object).into_iter().map(Value::String).collect();
                self.exec_each(*kind, pattern, keys, body, label, scope).await
            }
            Stmt::While { test, body } => {
                while truthy(&self.eval(test, scope).await?) {
                    self.tick()?;
                    match loop_step(self.exec_stmt(body, scope).await?, label) {
                        LoopStep::Next => {}
                        LoopStep::Exit => break,
                        LoopStep::Leave(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    self.tick()?;
                    match loop_step(self.exec_stmt(body, scope).await?, label) {
                        LoopStep::Next => {}
                        LoopStep::Exit => break,
                        LoopStep::Leave(flow) => return Ok(flow),
                    }
                    if !truthy(&self.eval(test, scope).await?) {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            other => self.exec_stmt(other, scope).await,
        }
    }

    async fn exec_for(
        &self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        label: Option<&str>,
        scope: &Scope,
    ) -> Completion<Flow> {
        let loop_scope = scope.child();
        let mut per_iteration = Vec::new();
        if let Some(init) = init {
            if let Stmt::Declare {
                kind: DeclKind::Let | DeclKind::Const,
                declarations,
            } = init
            {
                for (pattern, _) in declarations {
                    pattern_names(pattern, &mut per_iteration);
                }
            }
            self.exec_stmt(init, &loop_scope).await?;
        }

        loop {
            self.tick()?;
            // Each iteration gets its own copy of `let` bindings so closures
            // capture that iteration's value.
            let iteration = loop_scope.child();
            for name in &per_iteration {
                let value = loop_scope.lookup(name).unwrap_or_default();
                iteration.declare(name, value, true);
            }
            if let Some(test) = test {
                if !truthy(&self.eval(test, &iteration).await?) {
                    break;
                }
            }
            let flow = self.exec_stmt(body, &iteration).await?;
            for name in &per_iteration {
                let value = iteration.lookup(name).unwrap_or_default();
                // const loop variables cannot change; ignore the rejection
                let _ = loop_scope.assign(name, value);
            }
            match loop_step(flow, label) {
                LoopStep::Next => {}
                LoopStep::Exit => break,
                LoopStep::Leave(flow) => return Ok(flow),
            }
            if let Some(update) = update {
                self.eval(update, &loop_scope).await?;
            }
        }
        Ok(Flow::Normal)
    }

    async fn exec_each(
        &self,
        kind: Option<DeclKind>,
        pattern: &Pattern,
        items: Vec<Value>,
        body: &Stmt,
        label: Option<&str>,
        scope: &Scope,
    ) -> Completion<Flow> {
        for item in items {
            self.tick()?;
            let iteration = scope.child();
            let mode = match kind {
                Some(kind) => BindMode::Declare(kind),
                None => BindMode::Assign,
            };
            self.bind(pattern, item, &iteration, mode).await?;
            match loop_step(self.exec_stmt(body, &iteration).await?, label) {
                LoopStep::Next => {}
                LoopStep::Exit => break,
                LoopStep::Leave(flow) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    async fn exec_switch(
        &self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        scope: &Scope,
    ) -> Completion<Flow> {
        let value = self.eval(discriminant, scope).await?;
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let candidate = self.eval(test, scope).await?;
                if strict_equals(&value, &candidate) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };
        let inner = scope.child();
        for case in &cases[start..] {
            match self.exec_stmts(&case.body, &inner).await? {
                Flow::Normal => {}
                Flow::Break(None) => break,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    /// Materialize a `for…of` / spread source.
    fn iterate(&self, value: &Value, source: &Expr) -> Completion<Vec<Value>> {
        match iterable_items(value) {
            Some(items) => Ok(items),
            None => throw("TypeError", format!("{} is not iterable", expr_text(source))),
        }
    }

    // ── Bindings ─────────────────────────────────────────────────────────────

    fn bind<'a>(
        &'a self,
        pattern: &'a Pattern,
        value: Value,
        scope: &'a Scope,
        mode: BindMode,
    ) -> BoxFuture<'a, Completion<()>> {
        async move {
            match pattern {
                Pattern::Ident(name) => match mode {
                    BindMode::Declare(DeclKind::Var) => {
                        scope.declare_var(name, Some(value));
                        Ok(())
                    }
                    BindMode::Declare(kind) => {
                        scope.declare(name, value, kind != DeclKind::Const);
                        Ok(())
                    }
                    BindMode::Assign => assign_name(scope, name, value),
                },
                Pattern::Member(target) => {
                    let reference = self.reference(target, scope).await?;
                    self.put(&reference, value, scope)
                }
                Pattern::Array { elements, rest } => {
                    let Some(items) = iterable_items(&value) else {
                        return throw("TypeError", format!("{} is not iterable", to_string(&value)));
                    };
                    for (index, element) in elements.iter().enumerate() {
                        let Some(element) = element else {
                            continue;
                        };
                        let item = items.get(index).cloned().unwrap_or_default();
                        let item = self.with_default(item, element.default.as_ref(), scope).await?;
                        self.bind(&element.pattern, item, scope, mode).await?;
                    }
                    if let Some(rest) = rest {
                        let remaining = items.iter().skip(elements.len()).cloned().collect();
                        self.bind(rest, Value::array(remaining), scope, mode).await?;
                    }
                    Ok(())
                }
                Pattern::Object { properties, rest } => {
                    if matches!(value, Value::Undefined | Value::Null) {
                        return throw(
                            "TypeError",
                            format!("Cannot destructure '{}' as it is {}.", to_string(&value), to_string(&value)),
                        );
                    }
                    let mut used = Vec::new();
                    for (key, binding) in properties {
                        let key = match key {
                            PropKey::Named(name) => name.clone(),
                            PropKey::Computed(expr) => property_key(&self.eval(expr, scope).await?),
                        };
                        let item = self.get_member(&value, &key)?;
                        let item = self.with_default(item, binding.default.as_ref(), scope).await?;
                        self.bind(&binding.pattern, item, scope, mode).await?;
                        used.push(key);
                    }
                    if let Some(rest) = rest {
                        let mut remaining = Vec::new();
                        for key in own_keys(&value) {
                            if !used.contains(&key) {
                                let item = self.get_member(&value, &key)?;
                                remaining.push((key, item));
                            }
                        }
                        let rest_pattern = Pattern::Ident(rest.clone());
                        self.bind(&rest_pattern, Value::object(remaining), scope, mode).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }

    async fn with_default(&self, value: Value, default: Option<&Expr>, scope: &Scope) -> Completion<Value> {
        match (value, default) {
            (Value::Undefined, Some(default)) => self.eval(default, scope).await,
            (value, _) => Ok(value),
        }
    }

    fn reference<'a>(&'a self, target: &'a Expr, scope: &'a Scope) -> BoxFuture<'a, Completion<Reference>> {
        async move {
            match target {
                Expr::Ident(name) => Ok(Reference::Name(name.clone())),
                Expr::Member {
                    object,
                    property,
                    optional: false,
                } => {
                    let object = self.eval(object, scope).await?;
                    let key = self.member_key(property, scope).await?;
                    Ok(Reference::Property(object, key))
                }
                _ => throw("SyntaxError", "Invalid left-hand side in assignment"),
            }
        }
        .boxed()
    }

    fn pattern_reference<'a>(
        &'a self,
        target: &'a Pattern,
        scope: &'a Scope,
    ) -> BoxFuture<'a, Completion<Reference>> {
        async move {
            match target {
                Pattern::Ident(name) => Ok(Reference::Name(name.clone())),
                Pattern::Member(expr) => self.reference(expr, scope).await,
                _ => throw("SyntaxError", "Invalid left-hand side in assignment"),
            }
        }
        .boxed()
    }

    fn get(&self, reference: &Reference, scope: &Scope) -> Completion<Value> {
        match reference {
            Reference::Name(name) => match scope.lookup(name) {
                Some(value) => Ok(value),
                None => throw("ReferenceError", format!("{name} is not defined")),
            },
            Reference::Property(object, key) => self.get_member(object, key),
        }
    }

    fn put(&self, reference: &Reference, value: Value, scope: &Scope) -> Completion<()> {
        match reference {
            Reference::Name(name) => assign_name(scope, name, value),
            Reference::Property(object, key) => self.set_member(object, key, value),
        }
    }

    async fn member_key(&self, property: &MemberProp, scope: &Scope) -> Completion<String> {
        match property {
            MemberProp::Named(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => Ok(property_key(&self.eval(expr, scope).await?)),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    pub(crate) fn eval<'a>(&'a self, expr: &'a Expr, scope: &'a Scope) -> BoxFuture<'a, Completion<Value>> {
        guarded(
            async move {
                match expr {
                    Expr::Number(n) => Ok(Value::Number(*n)),
                    Expr::Str(s) => Ok(Value::String(s.clone())),
                    Expr::Bool(b) => Ok(Value::Bool(*b)),
                    Expr::Null => Ok(Value::Null),
                    Expr::Template(parts) => {
                        let mut out = String::new();
                        for part in parts {
                            match part {
                                TemplatePart::Text(text) => out.push_str(text),
                                TemplatePart::Expr(expr) => out.push_str(&to_string(&self.eval(expr, scope).await?)),
                            }
                            if out.len() > MAX_STRING_LENGTH {
                                return throw("RangeError", "Invalid string length");
                            }
                        }
                        Ok(Value::String(out))
                    }
                    Expr::Ident(name) => match scope.lookup(name) {
                        Some(value) => Ok(value),
                        None => throw("ReferenceError", format!("{name} is not defined")),
                    },
                    Expr::This => Ok(scope.this()),
                    Expr::Array(elements) => {
                        let mut items = Vec::with_capacity(elements.len());
                        for element in elements {
                            match element {
                                ArrayElem::Item(expr) => items.push(self.eval(expr, scope).await?),
                                ArrayElem::Spread(expr) => {
                                    let value = self.eval(expr, scope).await?;
                                    items.extend(self.iterate(&value, expr)?);
                                }
                                ArrayElem::Hole => items.push(Value::Undefined),
                            }
                        }
                        Ok(Value::array(items))
                    }
                    Expr::Object(props) => self.eval_object(props, scope).await,
                    Expr::Function(def) => Ok(closure(def, scope)),
                    Expr::Class(def) => self.define_class(def, scope).await,
                    Expr::Regex { pattern, flags } => self.regexp_value(pattern, flags),
                    Expr::SuperCall(args) => {
                        let parent = scope.lookup(SUPER_CONSTRUCTOR).unwrap_or_default();
                        let Some(Value::Function(current)) = scope.lookup(CURRENT_CLASS) else {
                            return throw("SyntaxError", "'super' keyword unexpected here");
                        };
                        if matches!(parent, Value::Undefined) {
                            return throw("SyntaxError", "'super' keyword unexpected here");
                        }
                        let this = scope.this();
                        let args = self.eval_args(args, scope).await?;
                        self.initialize(&parent, &this, args).await?;
                        if let Callable::Class(class) = &*current {
                            self.init_fields(class, &this).await?;
                        }
                        Ok(Value::Undefined)
                    }
                    Expr::SuperMember(property) => {
                        let key = self.member_key(property, scope).await?;
                        self.super_member(&key, scope)
                    }
                    Expr::Member {
                        object,
                        property,
                        optional,
                    } => {
                        let object = self.eval(object, scope).await?;
                        if *optional && matches!(object, Value::Undefined | Value::Null) {
                            return Err(Abrupt::ShortCircuit);
                        }
                        let key = self.member_key(property, scope).await?;
                        self.get_member(&object, &key)
                    }
                    Expr::Call {
                        callee,
                        args,
                        optional,
                    } => {
                        let (function, this) = match &**callee {
                            Expr::Member {
                                object,
                                property,
                                optional: member_optional,
                            } => {
                                let object = self.eval(object, scope).await?;
                                if *member_optional && matches!(object, Value::Undefined | Value::Null) {
                                    return Err(Abrupt::ShortCircuit);
                                }
                                let key = self.member_key(property, scope).await?;
                                (self.get_member(&object, &key)?, object)
                            }
                            Expr::SuperMember(property) => {
                                let key = self.member_key(property, scope).await?;
                                (self.super_member(&key, scope)?, scope.this())
                            }
                            other => (self.eval(other, scope).await?, Value::Undefined),
                        };
                        if *optional && matches!(function, Value::Undefined | Value::Null) {
                            return Err(Abrupt::ShortCircuit);
                        }
                        if !matches!(function, Value::Function(_)) {
                            return throw("TypeError", format!("{} is not a function", expr_text(callee)));
                        }
                        let args = self.eval_args(args, scope).await?;
                        self.call(&function, this, args).await
                    }
                    Expr::New { callee, args } => {
                        let constructor = self.eval(callee, scope).await?;
                        let args = self.eval_args(args, scope).await?;
                        self.construct(&constructor, args, callee).await
                    }
                    Expr::OptionalChain(inner) => match self.eval(inner, scope).await {
                        Err(Abrupt::ShortCircuit) => Ok(Value::Undefined),
                        other => other,
                    },
                    Expr::Unary { op, arg } => self.eval_unary(*op, arg, scope).await,
                    Expr::Update {
                        increment,
                        prefix,
                        target,
                    } => {
                        let reference = self.reference(target, scope).await?;
                        let old = to_number(&self.get(&reference, scope)?);
                        let new = if *increment { old + 1.0 } else { old - 1.0 };
                        self.put(&reference, Value::Number(new), scope)?;
                        Ok(Value::Number(if *prefix { new } else { old }))
                    }
                    Expr::Binary { op, left, right } => {
                        let left = self.eval(left, scope).await?;
                        let right = self.eval(right, scope).await?;
                        self.binary(*op, &left, &right)
                    }
                    Expr::Logical { op, left, right } => {
                        let left = self.eval(left, scope).await?;
                        if logical_short_circuits(*op, &left) {
                            Ok(left)
                        } else {
                            self.eval(right, scope).await
                        }
                    }
                    Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope).await,
                    Expr::Conditional {
                        test,
                        consequent,
                        alternate,
                    } => {
                        if truthy(&self.eval(test, scope).await?) {
                            self.eval(consequent, scope).await
                        } else {
                            self.eval(alternate, scope).await
                        }
                    }
                    Expr::Await(inner) => {
                        let value = self.eval(inner, scope).await?;
                        self.await_value(value)
                    }
                    Expr::Sequence(items) => {
                        let mut last = Value::Undefined;
                        for item in items {
                            last = self.eval(item, scope).await?;
                        }
                        Ok(last)
                    }
                }
            }
            .boxed(),
        )
    }

    async fn eval_args(&self, args: &[ArrayElem], scope: &Scope) -> Completion<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                ArrayElem::Item(expr) => values.push(self.eval(expr, scope).await?),
                ArrayElem::Spread(expr) => {
                    let value = self.eval(expr, scope).await?;
                    values.extend(self.iterate(&value, expr)?);
                }
                ArrayElem::Hole => values.push(Value::Undefined),
            }
        }
        Ok(values)
    }

    async fn eval_object(&self, props: &[ObjectProp], scope: &Scope) -> Completion<Value> {
        let mut obj = Obj::default();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(key, expr) => {
                    let key = match key {
                        PropKey::Named(name) => name.clone(),
                        PropKey::Computed(expr) => property_key(&self.eval(expr, scope).await?),
                    };
                    let value = self.eval(expr, scope).await?;
                    obj.set(key, value);
                }
                ObjectProp::Spread(expr) => {
                    let source = self.eval(expr, scope).await?;
                    for key in own_keys(&source) {
                        let value = self.get_member(&source, &key)?;
                        obj.set(key, value);
                    }
                }
                ObjectProp::ShorthandDefault(..) => {
                    return throw("SyntaxError", "Invalid shorthand property initializer");
                }
            }
        }
        Ok(Value::Object(Arc::new(Mutex::new(obj))))
    }

    async fn eval_unary(&self, op: UnaryOp, arg: &Expr, scope: &Scope) -> Completion<Value> {
        match op {
            UnaryOp::Typeof => {
                if let Expr::Ident(name) = arg {
                    return Ok(Value::string(
                        scope.lookup(name).map_or("undefined", |value| type_of(&value)),
                    ));
                }
                let value = self.eval(arg, scope).await?;
                Ok(Value::string(type_of(&value)))
            }
            UnaryOp::Delete => {
                if let Expr::Member { .. } = arg {
                    if let Reference::Property(object, key) = self.reference(arg, scope).await? {
                        delete_member(&object, &key);
                    }
                }
                Ok(Value::Bool(true))
            }
            _ => {
                let value = self.eval(arg, scope).await?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!truthy(&value)),
                    UnaryOp::Neg => Value::Number(-to_number(&value)),
                    UnaryOp::Plus => Value::Number(to_number(&value)),
                    UnaryOp::BitNot => Value::Number(f64::from(!to_int32(&value))),
                    _ => Value::Undefined,
                })
            }
        }
    }

    async fn eval_assign(
        &self,
        op: AssignOp,
        target: &Pattern,
        value: &Expr,
        scope: &Scope,
    ) -> Completion<Value> {
        match op {
            AssignOp::Assign => {
                let value = self.eval(value, scope).await?;
                self.bind(target, value.clone(), scope, BindMode::Assign).await?;
                Ok(value)
            }
            AssignOp::Arith(op) => {
                let reference = self.pattern_reference(target, scope).await?;
                let current = self.get(&reference, scope)?;
                let rhs = self.eval(value, scope).await?;
                let result = self.binary(op, &current, &rhs)?;
                self.put(&reference, result.clone(), scope)?;
                Ok(result)
            }
            AssignOp::Logical(op) => {
                let reference = self.pattern_reference(target, scope).await?;
                let current = match (&reference, op) {
                    // `x ??= v` on an undeclared name behaves like assignment
                    (Reference::Name(name), LogicalOp::Nullish) => scope.lookup(name).unwrap_or_default(),
                    _ => self.get(&reference, scope)?,
                };
                if logical_short_circuits(op, &current) {
                    return Ok(current);
                }
                let result = self.eval(value, scope).await?;
                self.put(&reference, result.clone(), scope)?;
                Ok(result)
            }
        }
    }

    pub(crate) fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Completion<Value> {
        let num = |f: fn(f64, f64) -> f64| Value::Number(f(to_number(left), to_number(right)));
        let int = |f: fn(i32, i32) -> i32| Value::Number(f64::from(f(to_int32(left), to_int32(right))));
        Ok(match op {
            BinaryOp::Add => {
                let numeric = |v: &Value| {
                    matches!(v, Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_))
                };
                if numeric(left) && numeric(right) {
                    num(|a, b| a + b)
                } else {
                    let (left, right) = (to_string(left), to_string(right));
                    if left.len() + right.len() > MAX_STRING_LENGTH {
                        return throw("RangeError", "Invalid string length");
                    }
                    Value::String(left + &right)
                }
            }
            BinaryOp::Sub => num(|a, b| a - b),
            BinaryOp::Mul => num(|a, b| a * b),
            BinaryOp::Div => num(|a, b| a / b),
            BinaryOp::Rem => num(|a, b| a % b),
            BinaryOp::Exp => num(f64::powf),
            BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
            BinaryOp::NotEq => Value::Bool(!loose_equals(left, right)),
            BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
            BinaryOp::StrictNotEq => Value::Bool(!strict_equals(left, right)),
            BinaryOp::Lt => Value::Bool(compare(left, right).is_some_and(|o| o.is_lt())),
            BinaryOp::Gt => Value::Bool(compare(left, right).is_some_and(|o| o.is_gt())),
            BinaryOp::LtEq => Value::Bool(compare(left, right).is_some_and(|o| o.is_le())),
            BinaryOp::GtEq => Value::Bool(compare(left, right).is_some_and(|o| o.is_ge())),
            BinaryOp::BitAnd => int(|a, b| a & b),
            BinaryOp::BitOr => int(|a, b| a | b),
            BinaryOp::BitXor => int(|a, b| a ^ b),
            BinaryOp::Shl => int(|a, b| a.wrapping_shl(b as u32 & 31)),
            BinaryOp::Shr => int(|a, b| a >> (b as u32 & 31)),
            BinaryOp::UShr => Value::Number(f64::from(
                (to_int32(left) as u32) >> (to_int32(right) as u32 & 31),
            )),
            BinaryOp::In => {
                let key = property_key(left);
                match right {
                    Value::Object(_) | Value::Array(_) => {
                        Value::Bool(own_keys(right).contains(&key) || has_builtin_property(right, &key))
                    }
                    other => {
                        return throw(
                            "TypeError",
                            format!("Cannot use 'in' operator to search for '{key}' in {}", to_string(other)),
                        )
                    }
                }
            }
            BinaryOp::InstanceOf => Value::Bool(crate::builtins::instance_of(left, right)?),
        })
    }

    // ── Members ──────────────────────────────────────────────────────────────

    pub(crate) fn get_member(&self, object: &Value, key: &str) -> Completion<Value> {
        use crate::builtins::{internal_property, method_name, static_member};

        let method = |name: &'static str| {
            Value::function(Callable::Method {
                this: object.clone(),
                name,
            })
        };
        match object {
            Value::Undefined | Value::Null => throw(
                "TypeError",
                format!("Cannot read properties of {} (reading '{key}')", to_string(object)),
            ),
            Value::Object(obj) => {
                let (own, class, proto) = {
                    let guard = lock(obj);
                    let own = guard.get(key).cloned().or_else(|| internal_property(&guard, key));
                    (own, guard.class, guard.proto.clone())
                };
                if let Some(value) = own {
                    return Ok(value);
                }
                if let Some(value) = proto.and_then(|proto| inherited(&proto, key)) {
                    return Ok(value);
                }
                if let Some(class) = class {
                    match key {
                        "name" => return Ok(Value::string(class)),
                        "stack" => return Ok(Value::String(to_string(object))),
                        _ => {}
                    }
                }
                Ok(method_name(object, key).map(method).unwrap_or_default())
            }
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(lock(items).len() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(lock(items).get(index).cloned().unwrap_or_default());
                }
                if let Some(value) = self.array_extra(items, key) {
                    return Ok(value);
                }
                Ok(method_name(object, key).map(method).unwrap_or_default())
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or_default());
                }
                Ok(method_name(object, key).map(method).unwrap_or_default())
            }
            Value::Function(callable) => {
                match key {
                    "name" => return Ok(Value::String(callable.name())),
                    "length" => {
                        let arity = match &**callable {
                            Callable::Closure { def, .. } => def.params.len(),
                            Callable::Class(class) => class.def.constructor.as_ref().map_or(0, |c| c.params.len()),
                            _ => 0,
                        };
                        return Ok(Value::Number(arity as f64));
                    }
                    _ => {}
                }
                if let Callable::Class(class) = &**callable {
                    if key == "prototype" {
                        return Ok(Value::Object(class.prototype.clone()));
                    }
                    if let Some(value) = class.static_member(key) {
                        return Ok(value);
                    }
                }
                if let Callable::Builtin(path) = &**callable {
                    if let Some(value) = static_member(path, key) {
                        return Ok(value);
                    }
                }
                Ok(method_name(object, key).map(method).unwrap_or_default())
            }
            Value::Bool(_) | Value::Number(_) | Value::Promise(_) => {
                Ok(method_name(object, key).map(method).unwrap_or_default())
            }
        }
    }

    // ── Calls ────────────────────────────────────────────────────────────────

    pub(crate) fn call<'a>(
        &'a self,
        function: &'a Value,
        this: Value,
        args: Vec<Value>,
    ) -> BoxFuture<'a, Completion<Value>> {
        guarded(
            async move {
                let Value::Function(callable) = function else {
                    return throw("TypeError", format!("{} is not a function", to_string(function)));
                };
                self.tick()?;
                match &**callable {
                    Callable::Closure { def, scope } => self.call_closure(def, scope, this, args).await,
                    Callable::Host(name) => Ok(self.call_host(name, args).await),
                    Callable::Builtin(path) => self.call_builtin(*path, args).await,
                    Callable::Method { this, name } => self.call_method(this, name, args).await,
                    Callable::Resolver { slot, reject } => {
                        let arg = args.into_iter().next().unwrap_or_default();
                        let mut slot = lock(slot);
                        if slot.is_none() {
                            *slot = Some(if *reject { Err(arg) } else { Ok(arg) });
                        }
                        Ok(Value::Undefined)
                    }
                    Callable::Class(class) => throw(
                        "TypeError",
                        format!(
                            "Class constructor {} cannot be invoked without 'new'",
                            class.def.name.as_deref().unwrap_or("(anonymous)")
                        ),
                    ),
                }
            }
            .boxed(),
        )
    }

    async fn call_closure(
        &self,
        def: &Arc<FunctionDef>,
        scope: &Scope,
        this: Value,
        args: Vec<Value>,
    ) -> Completion<Value> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let result = if depth > MAX_CALL_DEPTH {
            throw("RangeError", "Maximum call stack size exceeded")
        } else {
            self.run_closure(def, scope, this, args).await
        };
        self.depth.fetch_sub(1, Ordering::SeqCst);

        if !def.is_async {
            return result;
        }
        match result {
            Ok(value) => Ok(self.promise_resolve(value)),
            Err(Abrupt::Throw(reason)) => Ok(self.promise_reject(reason)),
            Err(Abrupt::ShortCircuit) => Ok(Value::resolved(Value::Undefined)),
        }
    }

    async fn run_closure(
        &self,
        def: &FunctionDef,
        scope: &Scope,
        this: Value,
        args: Vec<Value>,
    ) -> Completion<Value> {
        let frame = scope.function_child(if def.is_arrow { None } else { Some(this) });
        if !def.is_arrow {
            frame.declare("arguments", Value::array(args.clone()), true);
        }
        for (index, param) in def.params.iter().enumerate() {
            let arg = args.get(index).cloned().unwrap_or_default();
            let arg = self.with_default(arg, param.default.as_ref(), &frame).await?;
            self.bind(&param.pattern, arg, &frame, BindMode::Declare(DeclKind::Let))
                .await?;
        }
        if let Some(rest) = &def.rest {
            let remaining = args.iter().skip(def.params.len()).cloned().collect();
            self.bind(rest, Value::array(remaining), &frame, BindMode::Declare(DeclKind::Let))
                .await?;
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &frame).await,
            FunctionBody::Block(body) => {
                hoist_vars(body, &frame);
                match self.exec_stmts(body, &frame).await? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    /// Invoke a registered host function. Always yields a promise.
    async fn call_host(&self, name: &str, args: Vec<Value>) -> Value {
        let Some(host) = self.hosts.get(name).cloned() else {
            return self.promise_reject(Value::error(
                "Error",
                format!("Error calling function {name}: not registered"),
            ));
        };
        let json_args = args.iter().map(to_json_lossy).collect();
        debug!(callable = %name, "host call");
        match host.invoke(json_args).await {
            Ok(mut result) => {
                result.callable = name.to_string();
                let value = from_json(&result.return_value);
                lock(&self.calls).push((result, value.clone()));
                self.promise_resolve(value)
            }
            Err(err) => {
                debug!(callable = %name, error = %err, "host call failed");
                self.promise_reject(Value::error(
                    "Error",
                    format!("Error calling function {name}: {}", err.message),
                ))
            }
        }
    }

    async fn construct(&self, constructor: &Value, args: Vec<Value>, callee: &Expr) -> Completion<Value> {
        let not_constructor = || throw("TypeError", format!("{} is not a constructor", expr_text(callee)));
        let Value::Function(callable) = constructor else {
            return not_constructor();
        };
        self.tick()?;
        match &**callable {
            Callable::Builtin(path) => self.construct_builtin(*path, args).await,
            Callable::Class(class) => {
                let instance = Value::Object(Arc::new(Mutex::new(Obj {
                    proto: Some(class.prototype.clone()),
                    ..Obj::default()
                })));
                self.initialize(constructor, &instance, args).await
            }
            Callable::Closure { def, scope } if !def.is_arrow && !def.is_async => {
                let instance = Value::object(Vec::new());
                let result = self.call_closure(def, scope, instance.clone(), args).await?;
                Ok(match result {
                    object @ (Value::Object(_) | Value::Array(_)) => object,
                    _ => instance,
                })
            }
            _ => not_constructor(),
        }
    }
}

impl Interpreter {
    // ── Classes ──────────────────────────────────────────────────────────────

    async fn define_class(&self, def: &Arc<ClassDef>, scope: &Scope) -> Completion<Value> {
        let parent = match &def.extends {
            Some(expr) => match self.eval(expr, scope).await? {
                Value::Null => None,
                value if is_constructor(&value) => Some(value),
                other => {
                    return throw(
                        "TypeError",
                        format!("Class extends value {} is not a constructor or null", inspect(&other)),
                    )
                }
            },
            None => None,
        };
        let parent_prototype = match &parent {
            Some(Value::Function(callable)) => match &**callable {
                Callable::Class(class) => Some(class.prototype.clone()),
                _ => None,
            },
            _ => None,
        };
        let prototype = Arc::new(Mutex::new(Obj {
            proto: parent_prototype.clone(),
            internal: Some(Internal::Prototype(def.name.clone().unwrap_or_default())),
            ..Obj::default()
        }));

        let class_scope = scope.child();
        let instance_scope = class_scope.child();
        instance_scope.declare(SUPER_HOME, parent_prototype.map(Value::Object).unwrap_or_default(), false);
        instance_scope.declare(SUPER_CONSTRUCTOR, parent.clone().unwrap_or_default(), false);
        let static_scope = class_scope.child();
        static_scope.declare(SUPER_HOME, parent.clone().unwrap_or_default(), false);

        let class = Value::function(Callable::Class(ClassValue {
            def: def.clone(),
            parent,
            prototype: prototype.clone(),
            statics: Arc::new(Mutex::new(Obj::default())),
            instance_scope: instance_scope.clone(),
            static_scope: static_scope.clone(),
        }));
        class_scope.declare(CURRENT_CLASS, class.clone(), false);
        if let Some(name) = &def.name {
            class_scope.declare(name, class.clone(), false);
        }

        let prototype = Value::Object(prototype);
        for member in &def.members {
            let key = match &member.key {
                PropKey::Named(name) => name.clone(),
                PropKey::Computed(expr) => property_key(&self.eval(expr, &class_scope).await?),
            };
            match &member.kind {
                ClassMemberKind::Method(method) if member.is_static => {
                    self.set_member(&class, &key, closure(method, &static_scope))?;
                }
                ClassMemberKind::Method(method) => {
                    self.set_member(&prototype, &key, closure(method, &instance_scope))?;
                }
                ClassMemberKind::Field(init) if member.is_static => {
                    let frame = static_scope.function_child(Some(class.clone()));
                    let value = match init {
                        Some(init) => self.eval(init, &frame).await?,
                        None => Value::Undefined,
                    };
                    self.set_member(&class, &key, value)?;
                }
                ClassMemberKind::Field(_) => {}
            }
        }
        debug!(class = def.name.as_deref().unwrap_or("(anonymous)"), "class defined");
        Ok(class)
    }

    /// Run the constructor chain of `constructor` against `this`. Returns the
    /// constructed value, which a constructor may replace by returning an
    /// object.
    fn initialize<'a>(
        &'a self,
        constructor: &'a Value,
        this: &'a Value,
        args: Vec<Value>,
    ) -> BoxFuture<'a, Completion<Value>> {
        async move {
            let Value::Function(callable) = constructor else {
                return throw("TypeError", "Super constructor is not a constructor");
            };
            match &**callable {
                Callable::Class(class) => {
                    let Some(body) = &class.def.constructor else {
                        if let Some(parent) = &class.parent {
                            self.initialize(parent, this, args).await?;
                        }
                        self.init_fields(class, this).await?;
                        return Ok(this.clone());
                    };
                    // derived classes initialize their fields once `super()` returns
                    if class.parent.is_none() {
                        self.init_fields(class, this).await?;
                    }
                    let result = self.call_closure(body, &class.instance_scope, this.clone(), args).await?;
                    Ok(match result {
                        object @ (Value::Object(_) | Value::Array(_)) => object,
                        _ => this.clone(),
                    })
                }
                Callable::Builtin(path) if ERROR_CLASSES.contains(path) => {
                    let message = match args.first() {
                        None | Some(Value::Undefined) => String::new(),
                        Some(message) => to_string(message),
                    };
                    if let Value::Object(obj) = this {
                        let mut guard = lock(obj);
                        guard.class = Some(*path);
                        guard.set("message", Value::String(message));
                    }
                    Ok(this.clone())
                }
                Callable::Builtin("Object") => Ok(this.clone()),
                Callable::Closure { def, scope } => {
                    self.call_closure(def, scope, this.clone(), args).await?;
                    Ok(this.clone())
                }
                _ => throw("TypeError", "Super constructor is not a constructor"),
            }
        }
        .boxed()
    }

    async fn init_fields(&self, class: &ClassValue, this: &Value) -> Completion<()> {
        for member in &class.def.members {
            let (ClassMemberKind::Field(init), false, PropKey::Named(key)) =
                (&member.kind, member.is_static, &member.key)
            else {
                continue;
            };
            let value = match init {
                Some(init) => {
                    let frame = class.instance_scope.function_child(Some(this.clone()));
                    self.eval(init, &frame).await?
                }
                None => Value::Undefined,
            };
            self.set_member(this, key, value)?;
        }
        Ok(())
    }

    fn super_member(&self, key: &str, scope: &Scope) -> Completion<Value> {
        match scope.lookup(SUPER_HOME) {
            Some(home @ (Value::Object(_) | Value::Function(_))) => self.get_member(&home, key),
            _ => throw("SyntaxError", "'super' keyword unexpected here"),
        }
    }

    pub(crate) fn set_member(&self, object: &Value, key: &str, value: Value) -> Completion<()> {
        match object {
            Value::Undefined | Value::Null => throw(
                "TypeError",
                format!("Cannot set properties of {} (setting '{key}')", to_string(object)),
            ),
            Value::Object(obj) => {
                let mut guard = lock(obj);
                if let (Some(Internal::RegExp { last_index, .. }), "lastIndex") = (&mut guard.internal, key) {
                    *last_index = integer_index(&value);
                    return Ok(());
                }
                guard.set(key, value);
                Ok(())
            }
            Value::Function(callable) => {
                if let Callable::Class(class) = &**callable {
                    lock(&class.statics).set(key, value);
                }
                Ok(())
            }
            Value::Array(items) => {
                let limit = self.max_array_length();
                let mut items = lock(items);
                if key == "length" {
                    let len = to_number(&value);
                    if len < 0.0 || len.fract() != 0.0 || !len.is_finite() || len > limit as f64 {
                        return throw("RangeError", "Invalid array length");
                    }
                    items.resize(len as usize, Value::Undefined);
                } else if let Some(index) = array_index(key) {
                    if index >= items.len() {
                        if index >= limit {
                            return throw("RangeError", "Invalid array length");
                        }
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ── Free helpers ─────────────────────────────────────────────────────────────

fn is_constructor(value: &Value) -> bool {
    let Value::Function(callable) = value else {
        return false;
    };
    match &**callable {
        Callable::Class(_) => true,
        Callable::Closure { def, .. } => !def.is_arrow && !def.is_async,
        Callable::Builtin(path) => *path == "Object" || ERROR_CLASSES.contains(path),
        _ => false,
    }
}

/// Non-negative integer from a script value; NaN and negatives become 0.
fn integer_index(value: &Value) -> usize {
    let n = to_number(value);
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

/// Items a `for…of`, spread or array pattern walks: array elements, string
/// characters, `Map` entries or `Set` members.
pub(crate) fn iterable_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(lock(items).clone()),
        Value::String(s) => Some(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(obj) => match &lock(obj).internal {
            Some(Internal::Map(entries)) => Some(
                entries
                    .iter()
                    .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                    .collect(),
            ),
            Some(Internal::Set(items)) => Some(items.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn closure(def: &Arc<FunctionDef>, scope: &Scope) -> Value {
    Value::function(Callable::Closure {
        def: def.clone(),
        scope: scope.clone(),
    })
}

fn assign_name(scope: &Scope, name: &str, value: Value) -> Completion<()> {
    scope
        .assign(name, value)
        .or_else(|_| throw("TypeError", "Assignment to constant variable."))
}

fn logical_short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !truthy(left),
        LogicalOp::Or => truthy(left),
        LogicalOp::Nullish => !matches!(left, Value::Undefined | Value::Null),
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(left).partial_cmp(&to_number(right)),
    }
}

pub(crate) fn property_key(value: &Value) -> String {
    to_string(value)
}

fn array_index(key: &str) -> Option<usize> {
    let index = key.parse::<usize>().ok()?;
    (index.to_string() == key).then_some(index)
}

fn has_builtin_property(value: &Value, key: &str) -> bool {
    match value {
        Value::Array(_) => key == "length",
        Value::Object(_) => error_class(value).is_some() && matches!(key, "message" | "name" | "stack"),
        _ => false,
    }
}

/// Enumerable own keys, as `Object.keys` reports them.
pub(crate) fn own_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => lock(obj).keys(),
        Value::Array(items) => (0..lock(items).len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn delete_member(object: &Value, key: &str) {
    match object {
        Value::Object(obj) => {
            lock(obj).remove(key);
        }
        Value::Array(items) => {
            if let Some(index) = array_index(key) {
                if let Some(slot) = lock(items).get_mut(index) {
                    *slot = Value::Undefined;
                }
            }
        }
        _ => {}
    }
}

/// Source-ish text of a callee for error messages.
fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Member {
            object, property, ..
        } => match property {
            MemberProp::Named(name) => format!("{}.{name}", expr_text(object)),
            MemberProp::Computed(_) => format!("{}[...]", expr_text(object)),
        },
        Expr::Call { callee, .. } => format!("{}(...)", expr_text(callee)),
        Expr::OptionalChain(inner) => expr_text(inner),
        Expr::Str(s) => format!("\"{s}\""),
        Expr::Number(n) => number_to_string(*n),
        _ => "expression".to_string(),
    }
}

fn pattern_names(pattern: &Pattern, out: &mut Vec<String>) {
    match pattern {
        Pattern::Ident(name) => out.push(name.clone()),
        Pattern::Array { elements, rest } => {
            for element in elements.iter().flatten() {
                pattern_names(&element.pattern, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        Pattern::Object { properties, rest } => {
            for (_, binding) in properties {
                pattern_names(&binding.pattern, out);
            }
            if let Some(rest) = rest {
                out.push(rest.clone());
            }
        }
        Pattern::Member(_) => {}
    }
}

/// Pre-declare every `var` in a function body, nested blocks included.
fn hoist_vars(stmts: &[Stmt], scope: &Scope) {
    let mut names = Vec::new();
    for stmt in stmts {
        collect_vars(stmt, &mut names);
    }
    for name in names {
        scope.declare_var(&name, None);
    }
}

fn collect_vars(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Declare {
            kind: DeclKind::Var,
            declarations,
        } => {
            for (pattern, _) in declarations {
                pattern_names(pattern, out);
            }
        }
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_vars(consequent, out);
            if let Some(alternate) = alternate {
                collect_vars(alternate, out);
            }
        }
        Stmt::Block(body) => body.iter().for_each(|s| collect_vars(s, out)),
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                collect_vars(init, out);
            }
            collect_vars(body, out);
        }
        Stmt::ForOf {
            kind, pattern, body, ..
        }
        | Stmt::ForIn {
            kind, pattern, body, ..
        } => {
            if *kind == Some(DeclKind::Var) {
                pattern_names(pattern, out);
            }
            collect_vars(body, out);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            collect_vars(body, out)
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                case.body.iter().for_each(|s| collect_vars(s, out));
            }
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            block.iter().for_each(|s| collect_vars(s, out));
            handler.iter().flatten().for_each(|s| collect_vars(s, out));
            finalizer.iter().flatten().for_each(|s| collect_vars(s, out));
        }
        _ => {}
    }
}
