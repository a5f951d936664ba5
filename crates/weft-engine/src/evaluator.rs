//! Sandboxed evaluation of script and condition snippets.
//!
//! Snippets run in an embedded Rhai interpreter with operation, call depth
//! and collection size limits. There is no filesystem, process or network
//! access. The bindings are:
//!
//! - `input`: the node's resolved input
//! - `context`: object map of every completed node's output, keyed by id
//! - `console`: `log`, `info`, `warn` and `error` methods
//!
//! `print` and `debug` are captured like `console.log`. The JavaScript-style
//! `===` and `!==` operators are accepted as `==` and `!=`.

use std::sync::{Arc, Mutex};

use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use tracing::debug;

use weft_core::config::ScriptLimits;
use weft_core::context::stringify;
use weft_core::error::{Result, WeftError};
use weft_core::traits::Evaluator;
use weft_core::types::{ConsoleLine, EvalScope, LogLevel, ScriptOutput};

type ConsoleSink = Arc<Mutex<Vec<ConsoleLine>>>;

/// Script-visible console object.
#[derive(Clone)]
struct Console {
    sink: ConsoleSink,
}

impl Console {
    fn push(&self, level: LogLevel, text: String) {
        if let Ok(mut lines) = self.sink.lock() {
            lines.push(ConsoleLine { level, text });
        }
    }

    fn take(&self) -> Vec<ConsoleLine> {
        self.sink
            .lock()
            .map(|mut lines| std::mem::take(&mut *lines))
            .unwrap_or_default()
    }
}

/// Render a script value for the console: strings verbatim, anything
/// serializable as JSON, the rest through Rhai's own formatting.
fn render(value: &Dynamic) -> String {
    if value.is_string() {
        return value.to_string();
    }
    rhai::serde::from_dynamic::<Value>(value)
        .map(|v| stringify(&v))
        .unwrap_or_else(|_| value.to_string())
}

fn script_error(err: Box<EvalAltResult>) -> WeftError {
    WeftError::Script(err.to_string())
}

/// Accept the strict equality operators editors tend to produce.
///
/// Only code is rewritten: string, character and backtick literals pass
/// through untouched, as do `//` and `/* */` comments.
fn normalize(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' | '`' => {
                let end = literal_end(&chars, i, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = (i + 2..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
                    .map_or(chars.len(), |j| j + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '=' | '!' if chars.get(i + 1) == Some(&'=') && chars.get(i + 2) == Some(&'=') => {
                out.push(c);
                out.push('=');
                i += 3;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Index just past the literal opened by `quote` at `start`. An unterminated
/// literal runs to the end so the parser reports it.
fn literal_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' if quote != '`' => j += 2,
            ch if ch == quote => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}

/// JSON truthiness used for condition results.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Rhai-backed `Evaluator`.
pub struct RhaiEvaluator {
    limits: ScriptLimits,
}

impl RhaiEvaluator {
    pub fn new(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    fn engine(&self, console: &Console) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);
        engine.set_max_map_size(self.limits.max_map_size);
        engine.disable_symbol("eval");

        let print_sink = console.clone();
        engine.on_print(move |text| print_sink.push(LogLevel::Info, text.to_string()));
        let debug_sink = console.clone();
        engine.on_debug(move |text, _source, _pos| debug_sink.push(LogLevel::Info, text.to_string()));

        engine.register_type_with_name::<Console>("Console");
        for (name, level) in [
            ("log", LogLevel::Info),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            engine.register_fn(name, move |c: &mut Console, value: Dynamic| {
                c.push(level, render(&value));
            });
            engine.register_fn(name, move |c: &mut Console, a: Dynamic, b: Dynamic| {
                c.push(level, format!("{} {}", render(&a), render(&b)));
            });
        }

        engine
    }

    fn scope(&self, bindings: &EvalScope, console: &Console) -> Result<Scope<'static>> {
        let input = rhai::serde::to_dynamic(&bindings.input).map_err(script_error)?;
        let context = rhai::serde::to_dynamic(&bindings.context).map_err(script_error)?;

        let mut scope = Scope::new();
        scope.push_dynamic("input", input);
        scope.push_dynamic("context", context);
        scope.push("console", console.clone());
        Ok(scope)
    }

    fn eval(&self, source: &str, bindings: &EvalScope) -> Result<(Value, Vec<ConsoleLine>)> {
        let console = Console {
            sink: Arc::new(Mutex::new(Vec::new())),
        };
        let engine = self.engine(&console);
        let mut scope = self.scope(bindings, &console)?;

        let result = engine
            .eval_with_scope::<Dynamic>(&mut scope, &normalize(source))
            .map_err(script_error)?;
        let value = rhai::serde::from_dynamic::<Value>(&result).map_err(script_error)?;

        Ok((value, console.take()))
    }
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new(ScriptLimits::default())
    }
}

impl Evaluator for RhaiEvaluator {
    fn run_script(&self, source: &str, scope: &EvalScope) -> Result<ScriptOutput> {
        let (value, console) = self.eval(source, scope)?;
        debug!(lines = console.len(), "Script evaluated");
        Ok(ScriptOutput { value, console })
    }

    fn check_condition(&self, expression: &str, scope: &EvalScope) -> Result<bool> {
        let (value, _) = self.eval(expression, scope)?;
        Ok(truthy(&value))
    }
}
