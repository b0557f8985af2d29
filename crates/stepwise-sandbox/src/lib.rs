//! # stepwise-sandbox
//!
//! Runs model-written scripts against host-registered async functions.
//!
//! Scripts are a practical subset of JavaScript: functions, closures,
//! classes, destructuring, template literals, labeled loops, `async`/`await`,
//! regular expressions, `Map`/`Set`/`Date` and the common `Array`, `String`,
//! `Object`, `JSON` and `Math` surface. There is no module system, no
//! filesystem or network access, and no timers: the only way out of the
//! sandbox is a registered [`HostFunction`]. Getters, setters, generators
//! and tagged templates are rejected at parse time.
//!
//! Each execution yields the host calls it made, its return value and its
//! console output, with the call results rendered as a block appended to the
//! output so the model can see what its calls returned.

mod ast;
mod builtins;
mod collections;
pub mod console;
mod date;
pub mod format;
mod interpreter;
mod lexer;
mod parser;
mod regexp;
mod sandbox;
mod scope;
mod value;

/// Stack left when the evaluator switches to a fresh segment.
pub(crate) const STACK_RED_ZONE: usize = 256 * 1024;
pub(crate) const STACK_SEGMENT: usize = 2 * 1024 * 1024;

pub use lexer::SyntaxError;
pub use sandbox::{HostFunction, Sandbox, SandboxOptions, ScriptOutput, ScriptSandbox};

/// Check that `source` parses, without running it.
pub fn check_syntax(source: &str) -> Result<(), SyntaxError> {
    parser::parse_program(source).map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};
    use stepwise_contracts::callable::CallableResult;
    use stepwise_contracts::error::{AgentError, ErrorCode};

    use super::*;

    fn returning(value: Value) -> Arc<dyn HostFunction> {
        Arc::new(move |_args: Vec<Value>| {
            let value = value.clone();
            async move { Ok::<_, AgentError>(CallableResult::new("ignored", value)) }
        })
    }

    fn failing(message: &'static str) -> Arc<dyn HostFunction> {
        Arc::new(move |_args: Vec<Value>| async move {
            Err::<CallableResult, _>(AgentError::new(ErrorCode::UdfExecutionError, message))
        })
    }

    fn recording(seen: Arc<Mutex<Vec<Vec<Value>>>>) -> Arc<dyn HostFunction> {
        Arc::new(move |args: Vec<Value>| {
            seen.lock().unwrap().push(args.clone());
            let first = args.into_iter().next().unwrap_or(Value::Null);
            async move {
                let text = format!("{}-{}", first["a"], first["b"].as_str().unwrap_or_default());
                Ok::<_, AgentError>(CallableResult::new("ignored", json!(text)))
            }
        })
    }

    async fn run(sandbox: &mut Sandbox, script: &str) -> ScriptOutput {
        sandbox.execute_script(script).await.unwrap()
    }

    // ── Registration ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn registered_function_is_callable() {
        let mut sandbox = Sandbox::new();
        sandbox.register("testFunction", returning(json!("test result")));

        let first = run(&mut sandbox, "await testFunction()").await;
        assert_eq!(first.return_value, None);

        let second = run(&mut sandbox, "return await testFunction()").await;
        assert_eq!(second.return_value, Some(json!("test result")));
    }

    #[tokio::test]
    async fn call_history_keeps_one_bucket_per_script() {
        let mut sandbox = Sandbox::new();
        sandbox.register("testFunction", returning(json!("test result")));
        sandbox.register("testFunction2", returning(json!("test result 2")));

        run(&mut sandbox, "await testFunction(); await testFunction2();").await;
        run(&mut sandbox, "await testFunction()").await;

        let history = sandbox.call_history();
        assert_eq!(history.len(), 2);
        assert_eq!(
            history[0],
            vec![
                CallableResult::new("testFunction", json!("test result")),
                CallableResult::new("testFunction2", json!("test result 2")),
            ]
        );
        assert_eq!(history[1], vec![CallableResult::new("testFunction", json!("test result"))]);
    }

    #[tokio::test]
    async fn host_errors_fail_the_script() {
        let mut sandbox = Sandbox::new();
        sandbox.register("errorFunction", failing("Test error"));

        let err = sandbox.execute_script("await errorFunction()").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ScriptExecutionFailed);
        assert_eq!(
            err.message,
            "Script execution failed: Error calling function errorFunction: Test error"
        );
    }

    #[tokio::test]
    async fn arguments_reach_the_host_as_json() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sandbox = Sandbox::new();
        sandbox.register("argFunction", recording(seen.clone()));

        let output = run(&mut sandbox, r#"return await argFunction({ a: 42, b: "test" })"#).await;
        assert_eq!(output.return_value, Some(json!("42-test")));
        assert_eq!(*seen.lock().unwrap(), vec![vec![json!({"a": 42, "b": "test"})]]);
    }

    #[tokio::test]
    async fn host_errors_can_be_caught() {
        let mut sandbox = Sandbox::new();
        sandbox.register("flaky", failing("nope"));

        let output = run(
            &mut sandbox,
            "try { await flaky(); } catch (e) { return e.message; }",
        )
        .await;
        assert_eq!(output.return_value, Some(json!("Error calling function flaky: nope")));
        assert!(sandbox.call_history()[0].is_empty());
    }

    // ── Execution ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn returns_plain_values() {
        let mut sandbox = Sandbox::new();
        assert_eq!(run(&mut sandbox, "return 42;").await.return_value, Some(json!(42)));
        assert_eq!(
            run(&mut sandbox, "return { list: [1, 2.5, 'x'], ok: true }").await.return_value,
            Some(json!({"list": [1, 2.5, "x"], "ok": true}))
        );
    }

    #[tokio::test]
    async fn console_output_is_captured() {
        let mut sandbox = Sandbox::new();
        let output = run(&mut sandbox, r#"console.log("test output"); console.log({ a: 1 }, [1, 'two'])"#).await;
        assert_eq!(output.output, "test output\n{ a: 1 } [ 1, 'two' ]\n");
    }

    #[tokio::test]
    async fn syntax_errors_are_script_failures() {
        let mut sandbox = Sandbox::new();
        let err = sandbox.execute_script("invalid code;").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ScriptExecutionFailed);
        assert_eq!(err.message, "Script execution failed: Unexpected identifier 'code'");
        assert_eq!(sandbox.call_history().len(), 1);
    }

    #[tokio::test]
    async fn thrown_values_are_script_failures() {
        let mut sandbox = Sandbox::new();
        let err = sandbox
            .execute_script("throw new TypeError('bad input')")
            .await
            .unwrap_err();
        assert_eq!(err.message, "Script execution failed: bad input");

        let err = sandbox.execute_script("undefinedThing.prop").await.unwrap_err();
        assert_eq!(err.message, "Script execution failed: undefinedThing is not defined");
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let mut sandbox = Sandbox::new();
        sandbox.register("testFn", returning(json!("result")));

        let output = run(&mut sandbox, "\n  await testFn();\n  await testFn();\n").await;
        assert_eq!(
            output.calls,
            vec![
                CallableResult::new("testFn", json!("result")),
                CallableResult::new("testFn", json!("result")),
            ]
        );
    }

    #[tokio::test]
    async fn awaited_call_without_return_yields_undefined() {
        let mut sandbox = Sandbox::new();
        sandbox.register("f", returning(json!("r")));

        let output = run(&mut sandbox, "await f()").await;
        assert_eq!(output.return_value, None);
        assert_eq!(
            serde_json::to_value(&output.calls).unwrap(),
            json!([{"returnValue": "r", "returnValueSummary": null, "callable": "f"}])
        );
    }

    // ── Call-result rendering ────────────────────────────────────────────────

    #[tokio::test]
    async fn local_variables_are_not_rendered() {
        let mut sandbox = Sandbox::new();
        let output = run(&mut sandbox, "\n const newVar = 'test value';\n return newVar;\n").await;
        assert_eq!(output.return_value, Some(json!("test value")));
        assert_eq!(output.output, "");
    }

    #[tokio::test]
    async fn global_capturing_a_call_labels_it() {
        let mut sandbox = Sandbox::new();
        sandbox.register("testFn", returning(json!("result")));

        let output = run(&mut sandbox, "testFnResult = await testFn();").await;
        assert_eq!(output.return_value, None);
        assert!(output.output.contains("// testFn -> \ntestFnResult = \"result\""));
    }

    #[tokio::test]
    async fn object_results_are_labelled_by_identity() {
        let mut sandbox = Sandbox::new();
        sandbox.register("search", returning(json!({"hits": 2})));

        let output = run(
            &mut sandbox,
            "copy = { hits: 2 };\nfound = await search();\nawait search();",
        )
        .await;
        assert_eq!(
            output.output,
            "// search -> \nfound = {\n  \"hits\": 2\n}\n\n// search -> \n{\n  \"hits\": 2\n}\n"
        );
    }

    #[tokio::test]
    async fn oversized_results_are_truncated_once() {
        let mut sandbox = Sandbox::with_options(SandboxOptions {
            call_result_max_length: 200,
            ..SandboxOptions::default()
        });
        sandbox.register("big", returning(json!("y".repeat(10_000))));

        let output = run(&mut sandbox, "data = await big();").await;
        assert_eq!(output.output.matches("(Truncated. Full size is").count(), 1);
        assert!(output.output.contains("// big -> (Truncated. Full size is 9.77 KB)\ndata = "));
        assert_eq!(output.calls[0].return_value, json!("y".repeat(10_000)));
    }

    // ── State across scripts ─────────────────────────────────────────────────

    #[tokio::test]
    async fn globals_persist_but_declarations_do_not() {
        let mut sandbox = Sandbox::new();
        run(&mut sandbox, "counter = 1; let scratch = 5; var alsoLocal = 6;").await;
        let output = run(
            &mut sandbox,
            "counter += 1; return [counter, typeof scratch, typeof alsoLocal];",
        )
        .await;
        assert_eq!(output.return_value, Some(json!([2, "undefined", "undefined"])));
        assert!(sandbox.global_names().contains(&"counter".to_string()));
    }

    #[tokio::test]
    async fn closures_survive_between_scripts() {
        let mut sandbox = Sandbox::new();
        run(
            &mut sandbox,
            "makeCounter = () => { let n = 0; return () => ++n; }; tick = makeCounter();",
        )
        .await;
        run(&mut sandbox, "tick(); tick();").await;
        assert_eq!(run(&mut sandbox, "return tick();").await.return_value, Some(json!(3)));
    }

    // ── Limits and rejections ────────────────────────────────────────────────

    #[tokio::test]
    async fn runaway_scripts_hit_the_operation_budget() {
        let mut sandbox = Sandbox::with_options(SandboxOptions {
            max_operations: 1_000,
            ..SandboxOptions::default()
        });
        let err = sandbox.execute_script("while (true) {}").await.unwrap_err();
        assert_eq!(
            err.message,
            "Script execution failed: Script exceeded the maximum of 1000 operations"
        );
    }

    #[tokio::test]
    async fn unbounded_recursion_is_a_range_error() {
        let mut sandbox = Sandbox::new();
        let err = sandbox
            .execute_script("function f() { return f(); } f();")
            .await
            .unwrap_err();
        assert_eq!(err.message, "Script execution failed: Maximum call stack size exceeded");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deep_recursion_fits_on_worker_threads() {
        let task = tokio::spawn(async {
            let mut sandbox = Sandbox::new();
            let depth = run(
                &mut sandbox,
                "function down(n) { return n === 0 ? 0 : 1 + down(n - 1); } return down(90);",
            )
            .await;
            let nested = format!("return Array.isArray({}{});", "[".repeat(1_000), "]".repeat(1_000));
            let nested = run(&mut sandbox, &nested).await;
            let overflow = run(
                &mut sandbox,
                "function f(n) { return f(n + 1) + 1; } try { f(0); } catch (e) { return e instanceof RangeError; }",
            )
            .await;
            (depth.return_value, nested.return_value, overflow.return_value)
        });
        let (depth, nested, overflow) = task.await.unwrap();
        assert_eq!(depth, Some(json!(90)));
        assert_eq!(nested, Some(json!(true)));
        assert_eq!(overflow, Some(json!(true)));
    }

    #[tokio::test]
    async fn oversized_strings_and_arrays_are_range_errors() {
        let mut sandbox = Sandbox::new();
        for (script, message) in [
            ("'ab'.repeat(1e9)", "Invalid string length"),
            ("'x'.padStart(1e9)", "Invalid string length"),
            ("let s = 'x'; while (true) s += s;", "Invalid string length"),
            ("let s = 'x'; while (true) s = `${s}${s}`;", "Invalid string length"),
            ("const a = []; a.length = 1e9;", "Invalid array length"),
            ("const a = []; a[5e8] = 1;", "Invalid array length"),
            ("new Array(1e9)", "Invalid array length"),
            ("Array.from({ length: 1e9 })", "Invalid array length"),
        ] {
            let err = sandbox.execute_script(script).await.unwrap_err();
            assert_eq!(err.message, format!("Script execution failed: {message}"), "{script}");
        }
        let output = run(
            &mut sandbox,
            "try { 'ab'.repeat(1e9) } catch (e) { return e instanceof RangeError }",
        )
        .await;
        assert_eq!(output.return_value, Some(json!(true)));
    }

    #[tokio::test]
    async fn unawaited_rejections_are_reported() {
        let mut sandbox = Sandbox::new();
        sandbox.register("broken", failing("boom"));

        let output = run(&mut sandbox, "broken(); return 'done';").await;
        assert_eq!(output.return_value, Some(json!("done")));
        assert_eq!(
            output.output,
            "UnhandledPromiseRejection: Error calling function broken: boom\n"
        );
    }

    // ── Language surface ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn common_idioms_evaluate() {
        let mut sandbox = Sandbox::new();
        let output = run(
            &mut sandbox,
            r#"
            const people = [{ name: 'ada', age: 36 }, { name: 'alan', age: 41 }];
            const names = people.filter(p => p.age > 40).map(({ name }) => name.toUpperCase());
            const total = people.reduce((sum, p) => sum + p.age, 0);
            const [first, ...rest] = [1, 2, 3];
            const merged = { ...{ a: 1 }, b: 2 };
            const label = `${first}:${rest.join('|')}`;
            return { names, total, label, merged, keys: Object.keys(merged), json: JSON.stringify(merged) };
            "#,
        )
        .await;
        assert_eq!(
            output.return_value,
            Some(json!({
                "names": ["ALAN"],
                "total": 77,
                "label": "1:2|3",
                "merged": {"a": 1, "b": 2},
                "keys": ["a", "b"],
                "json": "{\"a\":1,\"b\":2}",
            }))
        );
    }

    #[tokio::test]
    async fn loops_and_async_helpers() {
        let mut sandbox = Sandbox::new();
        sandbox.register("lookup", returning(json!(10)));
        let output = run(
            &mut sandbox,
            r#"
            async function twice() { return (await lookup()) * 2; }
            const values = await Promise.all([twice(), lookup(), 3]);
            let sum = 0;
            for (const v of values) { if (v === 3) continue; sum += v; }
            for (let i = 0; i < 3; i++) sum++;
            return sum;
            "#,
        )
        .await;
        assert_eq!(output.return_value, Some(json!(33)));
        assert_eq!(output.calls.len(), 2);
    }

    #[tokio::test]
    async fn regular_expressions() {
        let mut sandbox = Sandbox::new();
        let output = run(
            &mut sandbox,
            r#"
            const text = 'Order #12 shipped, order #7 pending';
            const ids = [...text.matchAll(/#(\d+)/g)].map(m => Number(m[1]));
            const first = text.match(/#(?<id>\d+)/);
            const re = /order/gi;
            const hits = [];
            let m;
            while ((m = re.exec(text)) !== null) hits.push(m.index);
            return {
              ids,
              id: first.groups.id,
              at: first.index,
              all: text.match(/\d+/g),
              swapped: '2024-01-15'.replace(/(\d+)-(\d+)-(\d+)/, '$3/$2/$1'),
              upper: 'a-b'.replace(/[a-z]/g, c => c.toUpperCase()),
              words: 'a, b;c'.split(/[,;]\s*/),
              hits,
              test: /^\w+$/.test('abc_1'),
              search: text.search(/shipped/),
              shown: String(/x+/g),
            };
            "#,
        )
        .await;
        assert_eq!(
            output.return_value,
            Some(json!({
                "ids": [12, 7],
                "id": "12",
                "at": 6,
                "all": ["12", "7"],
                "swapped": "15/01/2024",
                "upper": "A-B",
                "words": ["a", "b", "c"],
                "hits": [0, 19],
                "test": true,
                "search": 10,
                "shown": "/x+/g",
            }))
        );
    }

    #[tokio::test]
    async fn unsupported_regex_syntax_is_a_syntax_error() {
        let mut sandbox = Sandbox::new();
        let output = run(
            &mut sandbox,
            "try { new RegExp('(?<=a)b'); } catch (e) { return e instanceof SyntaxError; }",
        )
        .await;
        assert_eq!(output.return_value, Some(json!(true)));
        let err = sandbox.execute_script("'aaa'.replaceAll(/a/, 'b')").await.unwrap_err();
        assert_eq!(
            err.message,
            "Script execution failed: replaceAll must be called with a global RegExp"
        );
    }

    #[tokio::test]
    async fn maps_and_sets() {
        let mut sandbox = Sandbox::new();
        let output = run(
            &mut sandbox,
            r#"
            const counts = new Map();
            for (const w of ['a', 'b', 'a']) counts.set(w, (counts.get(w) || 0) + 1);
            const unique = [...new Set([3, 1, 3, 2])];
            const pairs = [];
            counts.forEach((v, k) => pairs.push(`${k}=${v}`));
            const seen = new Set('hello');
            seen.delete('h');
            return {
              size: counts.size,
              a: counts.get('a'),
              has: counts.has('z'),
              unique,
              pairs,
              entries: [...counts],
              obj: Object.fromEntries(counts),
              letters: Array.from(seen).join(''),
              isMap: counts instanceof Map,
            };
            "#,
        )
        .await;
        assert_eq!(
            output.return_value,
            Some(json!({
                "size": 2,
                "a": 2,
                "has": false,
                "unique": [3, 1, 2],
                "pairs": ["a=2", "b=1"],
                "entries": [["a", 2], ["b", 1]],
                "obj": {"a": 2, "b": 1},
                "letters": "elo",
                "isMap": true,
            }))
        );
        let output = run(&mut sandbox, "console.log(new Map([['k', 1]]), new Set([1]))").await;
        assert_eq!(output.output, "Map(1) { 'k' => 1 } Set(1) { 1 }\n");
    }

    #[tokio::test]
    async fn dates_are_utc() {
        let mut sandbox = Sandbox::new();
        let output = run(
            &mut sandbox,
            r#"
            const d = new Date(Date.UTC(2024, 0, 15, 10, 30));
            const next = new Date(d.getTime() + 86400000);
            return {
              iso: d.toISOString(),
              year: d.getFullYear(),
              month: d.getMonth(),
              day: next.getDate(),
              weekday: next.getDay(),
              parsed: Date.parse('2024-01-15T10:30:00Z') === d.getTime(),
              json: JSON.stringify({ d }),
              isDate: d instanceof Date,
              invalid: isNaN(new Date('nope').getTime()),
              elapsed: typeof (Date.now() - d),
            };
            "#,
        )
        .await;
        assert_eq!(
            output.return_value,
            Some(json!({
                "iso": "2024-01-15T10:30:00.000Z",
                "year": 2024,
                "month": 0,
                "day": 16,
                "weekday": 2,
                "parsed": true,
                "json": "{\"d\":\"2024-01-15T10:30:00.000Z\"}",
                "isDate": true,
                "invalid": true,
                "elapsed": "number",
            }))
        );
    }

    #[tokio::test]
    async fn classes_with_inheritance() {
        let mut sandbox = Sandbox::new();
        let output = run(
            &mut sandbox,
            r#"
            class Shape {
              static count = 0;
              #secret = 'hidden';
              sides = 0;
              constructor(name) { this.name = name; Shape.count++; }
              describe() { return `${this.name} with ${this.sides} sides`; }
              reveal() { return this.#secret; }
              static label() { return 'shapes: ' + this.count; }
            }
            class Square extends Shape {
              sides = 4;
              describe() { return 'square: ' + super.describe(); }
            }
            class NotFound extends Error {
              constructor(what) { super(`${what} not found`); this.name = 'NotFound'; }
            }
            const sq = new Square('sq');
            let caught;
            try { throw new NotFound('page'); } catch (e) {
              caught = { message: e.message, name: e.name, isError: e instanceof Error, own: e instanceof NotFound };
            }
            return {
              text: sq.describe(),
              secret: sq.reveal(),
              label: Square.label(),
              isShape: sq instanceof Shape,
              notSquare: new Shape('s') instanceof Square,
              caught,
            };
            "#,
        )
        .await;
        assert_eq!(
            output.return_value,
            Some(json!({
                "text": "square: sq with 4 sides",
                "secret": "hidden",
                "label": "shapes: 1",
                "isShape": true,
                "notSquare": false,
                "caught": {"message": "page not found", "name": "NotFound", "isError": true, "own": true},
            }))
        );
        let err = sandbox.execute_script("class A {} A()").await.unwrap_err();
        assert_eq!(
            err.message,
            "Script execution failed: Class constructor A cannot be invoked without 'new'"
        );
    }

    #[tokio::test]
    async fn labels_arguments_and_uri_helpers() {
        let mut sandbox = Sandbox::new();
        let output = run(
            &mut sandbox,
            r#"
            const found = [];
            outer: for (let i = 0; i < 3; i++) {
              for (let j = 0; j < 3; j++) {
                if (j === 1) continue outer;
                if (i === 2) break outer;
                found.push(`${i}${j}`);
              }
            }
            function count() { return arguments.length; }
            let malformed;
            try { decodeURIComponent('%'); } catch (e) { malformed = e instanceof URIError; }
            return {
              found,
              n: count(1, 2, 3),
              q: encodeURIComponent('a b&c'),
              back: decodeURIComponent('a%20b%26c'),
              malformed,
              grouped: (1234567.5).toLocaleString(),
            };
            "#,
        )
        .await;
        assert_eq!(
            output.return_value,
            Some(json!({
                "found": ["00", "10"],
                "n": 3,
                "q": "a%20b%26c",
                "back": "a b&c",
                "malformed": true,
                "grouped": "1,234,567.5",
            }))
        );
    }

    #[test]
    fn syntax_check_reports_first_error() {
        assert!(check_syntax("const a = 1;\nreturn a;").is_ok());
        let err = check_syntax("const = 4").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
