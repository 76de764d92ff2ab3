//! Script execution on an embedded JavaScript engine.
//!
//! Every batch gets a fresh realm on its own worker thread. A body runs as
//! direct `eval` code inside `with (__sandbox_global__) { ... }`, where
//! `__sandbox_global__` is a `Proxy` whose `get`, `set` and `has` traps
//! forward to a [`GlobalScope`]. Identifiers the scope does not bind fall
//! through to the realm's own intrinsics. Anything a body leaves on the
//! realm's real global object (implicit globals, `var` and function
//! declarations, `this.x = ...`) is moved onto the scope after the body
//! finishes. Top-level `let`, `const` and `class` stay private to the body.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use boa_engine::error::JsNativeErrorKind;
use boa_engine::object::builtins::JsProxyBuilder;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::vm::RuntimeLimits;
use boa_engine::{
    js_string, Context, JsArgs, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue,
    NativeFunction, Source,
};
use tracing::{debug, trace, Span};

use super::console::{ConsoleLevel, ConsoleOutput};
use super::convert::{self, Converter};
use super::limits::ScriptLimits;
use super::scan;
use super::value::Value;
use super::{GlobalScope, ScriptOutcome, WriteOutcome};
use crate::error::ScriptError;

/// Name of the proxy global bodies are evaluated against.
const GLOBAL_BINDING: &str = "__sandbox_global__";

/// Names that resolve to the sandbox global itself.
const GLOBAL_ALIASES: &[&str] = &["window", "self", "globalThis"];

/// Always resolved on the real global so body wrappers stay direct eval.
const REALM_ONLY: &[&str] = &["eval"];

/// Runs script bodies against a [`GlobalScope`].
#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    limits: ScriptLimits,
}

/// Result of running a batch of bodies in one realm.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// One entry per body that finished, in order.
    pub completed: Vec<ScriptOutcome>,
    /// Why the next body failed. Bodies after it were not run.
    pub failure: Option<ScriptError>,
}

impl BatchOutcome {
    fn failed(error: ScriptError) -> Self {
        Self {
            completed: Vec::new(),
            failure: Some(error),
        }
    }
}

impl ScriptEngine {
    pub fn new(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Run one body in a fresh realm.
    pub fn run(
        &self,
        scope: Arc<dyn GlobalScope>,
        console: &ConsoleOutput,
        source: &str,
    ) -> Result<ScriptOutcome, ScriptError> {
        let mut batch = self.run_batch(scope, console, &[source]);
        match batch.failure {
            Some(error) => Err(error),
            None => Ok(batch.completed.pop().unwrap_or_default()),
        }
    }

    /// Run `sources` in order in one realm, stopping at the first failure.
    ///
    /// Function values created by one body stay callable from later bodies
    /// of the same batch; only their data survives on the scope afterwards.
    pub fn run_batch(
        &self,
        scope: Arc<dyn GlobalScope>,
        console: &ConsoleOutput,
        sources: &[&str],
    ) -> BatchOutcome {
        let span = Span::current();
        let limits = &self.limits;

        std::thread::scope(|threads| {
            let worker = std::thread::Builder::new()
                .name("script-engine".into())
                .stack_size(limits.stack_size)
                .spawn_scoped(threads, move || {
                    let _entered = span.enter();
                    run_in_realm(limits, scope, console, sources)
                });
            match worker {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    BatchOutcome::failed(ScriptError::Engine("script engine thread panicked".into()))
                }),
                Err(e) => BatchOutcome::failed(ScriptError::Engine(format!(
                    "cannot start script engine thread: {e}"
                ))),
            }
        })
    }
}

fn run_in_realm(
    limits: &ScriptLimits,
    scope: Arc<dyn GlobalScope>,
    console: &ConsoleOutput,
    sources: &[&str],
) -> BatchOutcome {
    let mut context = Context::default();
    let _realm = RealmGuard;

    if let Err(err) = install(&mut context, limits, scope, console) {
        return BatchOutcome::failed(map_error(err, &mut context));
    }
    debug!(scripts = sources.len(), "script realm ready");

    let mut batch = BatchOutcome::default();
    for source in sources {
        match run_body(&mut context, limits, source) {
            Ok(outcome) => batch.completed.push(outcome),
            Err(error) => {
                batch.failure = Some(error);
                break;
            }
        }
    }
    batch
}

fn run_body(
    context: &mut Context,
    limits: &ScriptLimits,
    source: &str,
) -> Result<ScriptOutcome, ScriptError> {
    scan::check_nesting(source, limits.max_nesting)?;

    let literal = serde_json::to_string(source)
        .map_err(|e| ScriptError::Engine(format!("cannot quote script body: {e}")))?;
    let wrapped = format!("with ({GLOBAL_BINDING}) {{ eval({literal}) }}");
    let evaluated = restore_eval(context)
        .and_then(|()| context.eval(Source::from_bytes(wrapped.as_bytes())))
        .map(drop);
    // Partial writes of a failing body are kept.
    let synced = sweep(context).and_then(|()| flush(context));
    let outcome = with_realm(|realm| std::mem::take(&mut realm.outcome));

    evaluated
        .and(synced)
        .and(outcome)
        .map_err(|err| map_error(err, context))
}

// Engine natives are plain function pointers, so per-realm state lives in a
// thread-local slot owned by the worker thread.
thread_local! {
    static REALM: RefCell<Option<Realm>> = const { RefCell::new(None) };
}

struct Realm {
    handles: Handles,
    /// Real-global property names that are not script globals.
    baseline: HashSet<String>,
    /// Engine values handed out for scope keys, with the scope value they
    /// were built from.
    overlay: HashMap<String, Binding>,
    outcome: ScriptOutcome,
}

impl Realm {
    fn record(&mut self, written: WriteOutcome) {
        match written {
            WriteOutcome::Applied => self.outcome.writes_applied += 1,
            WriteOutcome::Dropped => self.outcome.writes_dropped += 1,
        }
    }

    fn bind(&mut self, key: String, written: WriteOutcome, binding: Binding) {
        self.record(written);
        if written.is_applied() {
            self.overlay.insert(key, binding);
        } else {
            self.overlay.remove(&key);
        }
    }
}

#[derive(Clone)]
struct Handles {
    scope: Arc<dyn GlobalScope>,
    console: ConsoleOutput,
    global: JsObject,
    proxy: JsObject,
    own_names: JsObject,
    eval: JsObject,
    converter: Converter,
}

#[derive(Clone)]
struct Binding {
    live: JsValue,
    synced: Value,
}

/// Empties the realm slot before the engine context is dropped.
struct RealmGuard;

impl Drop for RealmGuard {
    fn drop(&mut self) {
        REALM.with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                slot.take();
            }
        });
    }
}

/// Borrow the realm state. Never call into the engine from `f`: scripts
/// may re-enter the traps.
fn with_realm<R>(f: impl FnOnce(&mut Realm) -> R) -> JsResult<R> {
    REALM.with(|slot| {
        let mut slot = slot
            .try_borrow_mut()
            .map_err(|_| JsNativeError::error().with_message("sandbox realm is busy"))?;
        let realm = slot
            .as_mut()
            .ok_or_else(|| JsNativeError::error().with_message("no sandbox realm on this thread"))?;
        Ok(f(realm))
    })
}

fn handles() -> JsResult<Handles> {
    with_realm(|realm| realm.handles.clone())
}

fn install(
    context: &mut Context,
    limits: &ScriptLimits,
    scope: Arc<dyn GlobalScope>,
    console: &ConsoleOutput,
) -> JsResult<()> {
    let mut runtime = RuntimeLimits::default();
    runtime.set_loop_iteration_limit(limits.loop_iteration_limit);
    runtime.set_recursion_limit(limits.recursion_limit);
    context.set_runtime_limits(runtime);

    register_console(context)?;

    let global = context.global_object();
    let object = global.get(js_string!("Object"), context)?;
    let object = object
        .as_object()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("realm has no Object constructor"))?;
    let object_keys = method(&object, "keys", context)?;
    let own_names = method(&object, "getOwnPropertyNames", context)?;
    let eval = global
        .get(js_string!("eval"), context)?
        .as_object()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("realm has no eval"))?;

    let target = JsObject::with_object_proto(context.intrinsics());
    let proxy: JsObject = JsProxyBuilder::new(target)
        .get(global_get)
        .set(global_set)
        .has(global_has)
        .build(context)
        .into();
    context.register_global_property(
        JsString::from(GLOBAL_BINDING),
        proxy.clone(),
        Attribute::empty(),
    )?;

    let baseline = property_names(&own_names, &global, context)?
        .into_iter()
        .collect();
    let converter = Converter::new(
        object_keys,
        proxy.clone(),
        limits.max_value_depth,
        limits.max_array_length,
    );

    REALM.with(|slot| {
        *slot.borrow_mut() = Some(Realm {
            handles: Handles {
                scope,
                console: console.clone(),
                global,
                proxy,
                own_names,
                eval,
                converter,
            },
            baseline,
            overlay: HashMap::new(),
            outcome: ScriptOutcome::default(),
        });
    });
    Ok(())
}

fn method(object: &JsObject, name: &str, context: &mut Context) -> JsResult<JsObject> {
    object
        .get(JsString::from(name), context)?
        .as_object()
        .filter(|f| f.is_callable())
        .cloned()
        .ok_or_else(|| {
            JsNativeError::typ()
                .with_message(format!("Object.{name} is not callable"))
                .into()
        })
}

fn property_names(
    own_names: &JsObject,
    object: &JsObject,
    context: &mut Context,
) -> JsResult<Vec<String>> {
    let names = own_names.call(&JsValue::undefined(), &[object.clone().into()], context)?;
    let Some(names) = names.as_object() else {
        return Ok(Vec::new());
    };
    let length = names.get(js_string!("length"), context)?.to_length(context)?;
    let mut collected = Vec::new();
    for index in 0..u32::try_from(length).unwrap_or(u32::MAX) {
        if let Some(name) = names.get(index, context)?.as_string() {
            collected.push(name.to_std_string_escaped());
        }
    }
    Ok(collected)
}

/// Put the intrinsic `eval` back in case an earlier body replaced it.
fn restore_eval(context: &mut Context) -> JsResult<()> {
    let handles = handles()?;
    handles
        .global
        .set(js_string!("eval"), handles.eval, false, context)?;
    Ok(())
}

/// Move new properties of the real global object onto the scope.
fn sweep(context: &mut Context) -> JsResult<()> {
    let handles = handles()?;
    for name in property_names(&handles.own_names, &handles.global, context)? {
        if with_realm(|realm| realm.baseline.contains(&name))? {
            continue;
        }
        let key = JsString::from(name.as_str());
        let live = handles.global.get(key.clone(), context)?;

        // A bare `var x` shadowing a scope key leaves `undefined` behind.
        if !(live.is_undefined() && handles.scope.has(&name)) {
            let synced = handles.converter.to_value(&live, context)?;
            let written = handles.scope.set(&name, synced.clone());
            trace!(global = %name, applied = written.is_applied(), "global moved to sandbox");
            with_realm(|realm| realm.bind(name.clone(), written, Binding { live, synced }))?;
        }

        // Declared bindings cannot be deleted; stop tracking them.
        if !handles.global.delete_property_or_throw(key, context).unwrap_or(false) {
            with_realm(|realm| realm.baseline.insert(name))?;
        }
    }
    Ok(())
}

/// Store in-place mutations of handed-out values back on the scope.
fn flush(context: &mut Context) -> JsResult<()> {
    let handles = handles()?;
    let bindings: Vec<(String, Binding)> = with_realm(|realm| {
        realm
            .overlay
            .iter()
            .map(|(key, binding)| (key.clone(), binding.clone()))
            .collect()
    })?;

    for (key, binding) in bindings {
        let synced = handles.converter.to_value(&binding.live, context)?;
        if synced == binding.synced {
            continue;
        }
        let written = handles.scope.set(&key, synced.clone());
        let live = binding.live;
        with_realm(|realm| realm.bind(key, written, Binding { live, synced }))?;
    }
    Ok(())
}

fn property_key(key: &JsValue) -> Option<String> {
    key.as_string().map(|key| key.to_std_string_escaped())
}

fn global_get(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some(key) = property_key(args.get_or_undefined(1)) else {
        return Ok(JsValue::undefined());
    };
    let handles = handles()?;
    if GLOBAL_ALIASES.contains(&key.as_str()) {
        return Ok(handles.proxy.into());
    }
    if !handles.scope.has(&key) {
        return handles.global.get(JsString::from(key.as_str()), context);
    }

    let current = handles.scope.get(&key);
    let cached = with_realm(|realm| realm.overlay.get(&key).cloned())?;
    if let Some(binding) = cached {
        if binding.synced == current {
            return Ok(binding.live);
        }
    }
    let live = convert::to_js(&current, context)?;
    let binding = Binding {
        live: live.clone(),
        synced: current,
    };
    with_realm(|realm| realm.overlay.insert(key, binding))?;
    Ok(live)
}

fn global_set(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some(key) = property_key(args.get_or_undefined(1)) else {
        return Ok(JsValue::from(true));
    };
    if GLOBAL_ALIASES.contains(&key.as_str()) {
        return Ok(JsValue::from(true));
    }
    let handles = handles()?;
    let live = args.get_or_undefined(2).clone();
    let synced = handles.converter.to_value(&live, context)?;
    let written = handles.scope.set(&key, synced.clone());

    // An implicit global created earlier in this body now lives on the scope;
    // drop the real-global copy so the sweep does not restore a stale value.
    let property = JsString::from(key.as_str());
    let tracked = !with_realm(|realm| realm.baseline.contains(&key))?;
    if written.is_applied() && tracked && handles.global.has_own_property(property.clone(), context)? {
        let _ = handles.global.delete_property_or_throw(property, context);
    }

    with_realm(|realm| realm.bind(key, written, Binding { live, synced }))?;
    Ok(JsValue::from(true))
}

fn global_has(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some(key) = property_key(args.get_or_undefined(1)) else {
        return Ok(JsValue::from(false));
    };
    if GLOBAL_ALIASES.contains(&key.as_str()) {
        return Ok(JsValue::from(true));
    }
    if REALM_ONLY.contains(&key.as_str()) {
        return Ok(JsValue::from(false));
    }
    let handles = handles()?;
    let bound = handles.scope.has(&key)
        || handles
            .global
            .has_property(JsString::from(key.as_str()), context)?;
    Ok(JsValue::from(bound))
}

fn register_console(context: &mut Context) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("debug"), 0)
        .function(NativeFunction::from_fn_ptr(console_info), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, Attribute::all())
}

fn console_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    console_write(ConsoleLevel::Log, args, context)
}

fn console_info(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    console_write(ConsoleLevel::Info, args, context)
}

fn console_warn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    console_write(ConsoleLevel::Warn, args, context)
}

fn console_error(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    console_write(ConsoleLevel::Error, args, context)
}

fn console_write(level: ConsoleLevel, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let handles = handles()?;
    let text = args
        .iter()
        .map(|arg| format_arg(&handles, arg, context))
        .collect::<Vec<_>>()
        .join(" ");
    handles.console.record(level, text);
    Ok(JsValue::undefined())
}

/// Strings print raw, arrays and plain objects as JSON.
fn format_arg(handles: &Handles, arg: &JsValue, context: &mut Context) -> String {
    if let Some(s) = arg.as_string() {
        return s.to_std_string_escaped();
    }
    match arg.as_object() {
        Some(object) if object.is_callable() => "[Function]".into(),
        Some(object) if JsObject::equals(object, &handles.proxy) => "[object Window]".into(),
        Some(_) => handles
            .converter
            .to_value(arg, context)
            .ok()
            .and_then(|value| value.to_json())
            .map_or_else(|| arg.display().to_string(), |json| json.to_string()),
        None => arg.display().to_string(),
    }
}

fn map_error(err: JsError, context: &mut Context) -> ScriptError {
    let native = match err.try_native(context) {
        Ok(native) => native,
        Err(_) => return ScriptError::Thrown(err.to_string()),
    };
    let display = native.to_string();
    let message = display
        .split_once(": ")
        .map_or(String::new(), |(_, message)| message.to_string());
    match native.kind {
        JsNativeErrorKind::Syntax => ScriptError::Syntax(message),
        JsNativeErrorKind::Reference => ScriptError::Reference(message),
        JsNativeErrorKind::Type => ScriptError::Type(message),
        JsNativeErrorKind::Range => ScriptError::Range(message),
        JsNativeErrorKind::RuntimeLimit => ScriptError::Limit(message),
        _ => ScriptError::Thrown(display),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::context::SharedContext;
    use crate::sandbox::instance::Sandbox;

    fn active_sandbox() -> Arc<Sandbox> {
        let sandbox = Arc::new(Sandbox::new("app", SharedContext::new()));
        sandbox.activate();
        sandbox
    }

    fn run(sandbox: &Arc<Sandbox>, sources: &[&str]) -> (BatchOutcome, ConsoleOutput) {
        let console = ConsoleOutput::new();
        let batch = ScriptEngine::default().run_batch(Arc::new(sandbox.proxy()), &console, sources);
        (batch, console)
    }

    #[test]
    fn test_function_declarations_and_closures() {
        let sandbox = active_sandbox();
        let (batch, console) = run(
            &sandbox,
            &[r#"
                function init(items) {
                    let total = 0
                    for (const item of items) total += item
                    return total
                }
                const counter = (() => { let n = 0; return () => ++n })()
                counter()
                window.total = init([1, 2, 3])
                window.count = counter()
                class Point { constructor(x) { this.x = x } }
                window.point = new Point(4)
                console.log(`total=${total}`, [1, 'a'], { ok: true })
            "#],
        );

        assert!(batch.failure.is_none(), "{:?}", batch.failure);
        assert_eq!(sandbox.get("total"), Value::from(6));
        assert_eq!(sandbox.get("count"), Value::from(2));
        assert_eq!(sandbox.get("point").get("x"), Some(&Value::from(4)));
        assert_eq!(console.stdout_str(), r#"total=6 [1,"a"] {"ok":true}"#);
    }

    #[test]
    fn test_functions_live_for_the_batch() {
        let sandbox = active_sandbox();
        let (batch, _) = run(
            &sandbox,
            &["function greet(name) { return 'hi ' + name }", "message = greet('ada')"],
        );

        assert!(batch.failure.is_none(), "{:?}", batch.failure);
        assert_eq!(sandbox.get("message"), Value::from("hi ada"));
        assert_eq!(sandbox.get("greet"), Value::Undefined);
    }

    #[test]
    fn test_in_place_mutation_is_stored() {
        let sandbox = active_sandbox();
        let _ = sandbox.set("config", Value::from(serde_json::json!({ "debug": false, "tags": [] })));

        let (batch, _) = run(&sandbox, &["config.debug = true\nconfig.tags.push('x')"]);

        assert!(batch.failure.is_none(), "{:?}", batch.failure);
        assert_eq!(
            sandbox.get("config").to_json(),
            Some(serde_json::json!({ "debug": true, "tags": ["x"] }))
        );
    }

    #[test]
    fn test_intrinsics_cannot_be_replaced_for_the_realm() {
        let sandbox = active_sandbox();
        let (batch, _) = run(&sandbox, &["JSON = 1\nkind = typeof Math.max"]);

        assert!(batch.failure.is_none(), "{:?}", batch.failure);
        assert_eq!(sandbox.get("JSON"), Value::from(1));
        assert_eq!(sandbox.get("kind"), Value::from("function"));

        let other = active_sandbox();
        let (batch, _) = run(&other, &["kind = typeof JSON.stringify"]);
        assert!(batch.failure.is_none(), "{:?}", batch.failure);
        assert_eq!(other.get("kind"), Value::from("function"));
    }

    #[test]
    fn test_error_kinds() {
        let sandbox = active_sandbox();
        let cases = [
            ("x = nope", "reference"),
            ("x = (", "syntax"),
            ("null.x", "type"),
            ("new Array(-1)", "range"),
            ("throw 'boom'", "thrown"),
        ];
        for (source, kind) in cases {
            let (batch, _) = run(&sandbox, &[source]);
            let error = batch.failure.unwrap_or_else(|| panic!("{source} should fail"));
            let matched = match kind {
                "reference" => matches!(error, ScriptError::Reference(ref m) if m.contains("nope")),
                "syntax" => matches!(error, ScriptError::Syntax(_)),
                "type" => matches!(error, ScriptError::Type(_)),
                "range" => matches!(error, ScriptError::Range(_)),
                _ => matches!(error, ScriptError::Thrown(ref m) if m.contains("boom")),
            };
            assert!(matched, "{source}: {error:?}");
        }
    }

    #[test]
    fn test_runaway_loops_hit_the_iteration_limit() {
        let sandbox = active_sandbox();
        let engine = ScriptEngine::new(ScriptLimits::builder().loop_iteration_limit(10_000).build());
        let console = ConsoleOutput::new();

        let result = engine.run(Arc::new(sandbox.proxy()), &console, "done = false\nwhile (true) {}");
        assert!(matches!(result, Err(ref e) if e.is_limit()), "{result:?}");
        assert_eq!(sandbox.get("done"), Value::Bool(false));
    }

    #[test]
    fn test_bodies_cannot_close_the_wrapper() {
        let sandbox = active_sandbox();
        let (batch, _) = run(&sandbox, &["}) }\nescaped = 1\nwith ({}) { ({"]);

        assert!(matches!(batch.failure, Some(ScriptError::Syntax(_))), "{:?}", batch.failure);
        assert!(!sandbox.has("escaped"));
    }

    #[test]
    fn test_replacing_eval_does_not_break_later_bodies() {
        let sandbox = active_sandbox();
        let (batch, _) = run(&sandbox, &["eval = null", "after = typeof eval"]);

        assert!(batch.failure.is_none(), "{:?}", batch.failure);
        assert_eq!(sandbox.get("after"), Value::from("function"));
    }

    #[test]
    fn test_cycles_and_functions_store_as_data() {
        let sandbox = active_sandbox();
        let (batch, _) = run(&sandbox, &["node = { name: 'a', run() {} }\nnode.self = node"]);

        assert!(batch.failure.is_none(), "{:?}", batch.failure);
        assert_eq!(
            sandbox.get("node").to_json(),
            Some(serde_json::json!({ "name": "a" }))
        );
    }
}
