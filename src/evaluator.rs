use crate::ast::{MapRef, Tag, Value};
use crate::builtinops::{OpKind, find_op};
use crate::json::parse_json;
use crate::typecheck::type_check;
use crate::{Error, MAX_EVAL_DEPTH};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Accepted argument counts of a builtin operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn validate(&self, got: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(expected) if got != expected => Err(Error::arity_error(expected, got)),
            Arity::AtLeast(expected) if got < expected => Err(Error::arity_error(expected, got)),
            _ => Ok(()),
        }
    }
}

/// The interpreter's only persistent state: a mapping from name to value.
///
/// The mapping is held behind a [`MapRef`] so that `dump` can hand out a
/// `Value::Map` that aliases it. Later writes are visible through every map
/// previously returned by `dump`.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    bindings: MapRef,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            bindings: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Bind `name` to `value`, overwriting any previous binding
    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Look up `name`; an absent name yields Null
    pub fn get(&self, name: &str) -> Value {
        self.bindings
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// The whole table as a map value sharing the live mapping
    pub fn as_value(&self) -> Value {
        Value::Map(Rc::clone(&self.bindings))
    }

    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }

    /// All bindings as (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut result: Vec<_> = self
            .bindings
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// How the interpreter was started; decides what diagnostics mention
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Reading forms one line at a time
    #[default]
    Interactive,
    /// Running the single document stored in this file
    Script(PathBuf),
}

/// Tunable evaluation limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Nesting depth at which evaluation aborts with an error
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// How a script run ended
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    /// Ran to the end with every `test` passing
    Completed,
    /// Ran to the end, but this many `test` forms failed
    TestsFailed(usize),
    /// Stopped early: the document did not decode or evaluation hit a fatal error
    Failed(Error),
}

impl ScriptOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            ScriptOutcome::Completed => 0,
            ScriptOutcome::TestsFailed(_) | ScriptOutcome::Failed(_) => 1,
        }
    }
}

/// Invocation context threaded through every evaluation call.
///
/// Owns the symbol table and the sink that `print`, `test` and unknown-function
/// diagnostics write to.
pub struct Interpreter {
    symbols: SymbolTable,
    mode: RunMode,
    config: EvalConfig,
    output: Box<dyn Write>,
    failed_tests: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("symbols", &self.symbols.len())
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("failed_tests", &self.failed_tests)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Interactive interpreter with an empty symbol table, writing to stdout
    pub fn new() -> Self {
        Interpreter {
            symbols: SymbolTable::new(),
            mode: RunMode::Interactive,
            config: EvalConfig::default(),
            output: Box::new(io::stdout()),
            failed_tests: 0,
        }
    }

    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    /// Number of `test` forms that have failed so far
    pub fn failed_tests(&self) -> usize {
        self.failed_tests
    }

    /// Evaluate a value in this interpreter
    pub fn eval(&mut self, expr: &Value) -> Result<Value, Error> {
        eval(expr, self)
    }

    /// Decode a JSON document and evaluate it
    pub fn run_source(&mut self, source: &str) -> Result<Value, Error> {
        let program = parse_json(source)?;
        eval(&program, self)
    }

    /// Run a whole script document and classify how it ended
    pub fn run_script(&mut self, source: &str) -> ScriptOutcome {
        match self.run_source(source) {
            Err(error) => ScriptOutcome::Failed(error),
            Ok(_) if self.failed_tests > 0 => ScriptOutcome::TestsFailed(self.failed_tests),
            Ok(_) => ScriptOutcome::Completed,
        }
    }

    /// Write one line to the output sink
    pub(crate) fn emit(&mut self, line: impl fmt::Display) -> Result<(), Error> {
        writeln!(self.output, "{line}")?;
        self.output.flush()?;
        Ok(())
    }

    fn record_test_failure(&mut self, expr: &Value) -> Result<(), Error> {
        self.failed_tests += 1;
        let message = match &self.mode {
            RunMode::Script(path) => format!("test failed in {}: {expr}", path.display()),
            RunMode::Interactive => format!("test failed: {expr}"),
        };
        warn!(%expr, "test failed");
        self.emit(message)
    }
}

/// Evaluate a value (public API)
pub fn eval(expr: &Value, interp: &mut Interpreter) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, interp, 0)
}

/// Evaluate a value with depth tracking to prevent stack overflow
fn eval_with_depth_tracking(
    expr: &Value,
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= interp.config.max_depth {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {})",
            interp.config.max_depth
        )));
    }
    match expr {
        // Self-evaluating forms. A bare string is a literal; lookup goes through `get`.
        Value::Number(_) | Value::String(_) | Value::Null | Value::Bool(_) | Value::Map(_) => {
            Ok(expr.clone())
        }

        Value::Array(elements) => {
            eval_array(elements, interp, depth).map_err(|err| add_context(err, expr))
        }
    }
}

/// Helper function to add expression context to errors.
/// Only the innermost form is recorded.
fn add_context(error: Error, expr: &Value) -> Error {
    const MARKER: &str = "\n  Context: ";
    match error {
        Error::EvalError(msg) if !msg.contains(MARKER) => {
            Error::EvalError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        Error::TypeError(msg) if !msg.contains(MARKER) => {
            Error::TypeError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        Error::ArityError {
            expected,
            got,
            expression: None,
        } => Error::arity_error_with_expr(expected, got, expr.to_string()),
        // Type mismatches name both tags; parse and io errors carry their own context
        other => other,
    }
}

/// Helper function to evaluate a list of argument expressions with depth tracking
fn eval_args(args: &[Value], interp: &mut Interpreter, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, interp, depth + 1))
        .collect()
}

/// Evaluate an array form.
///
/// The head is evaluated and must reduce to a string naming an operation (or
/// to a lambda/macro array). The remaining elements are handed over raw; each
/// operation decides which of them to evaluate.
fn eval_array(elements: &[Value], interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
    let [head_expr, args @ ..] = elements else {
        // The empty array is a no-op that evaluates to itself
        return Ok(Value::Array(Vec::new()));
    };

    let head = eval_with_depth_tracking(head_expr, interp, depth + 1)?;
    match &head {
        Value::String(name) => call_named(name, args, interp, depth),
        Value::Array(items) => match Callable::from_items(items) {
            Some(callable) => callable.apply(args, interp, depth),
            None => Err(Error::EvalError(format!("{head} is not a string"))),
        },
        _ => Err(Error::EvalError(format!("{head} is not a string"))),
    }
}

/// Dispatch a named operation: builtins first, then lambdas and macros bound
/// in the symbol table.
fn call_named(
    name: &str,
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    if let Some(op) = find_op(name) {
        op.validate_arity(args.len())?;
        debug!(op = op.id, argc = args.len(), "dispatching builtin");
        return match op.op_kind {
            OpKind::Function(func) => {
                let evaluated = eval_args(args, interp, depth)?;
                func(evaluated, interp)
            }
            OpKind::SpecialForm(special_form) => special_form(args, interp, depth),
        };
    }

    if let Value::Array(items) = interp.symbols.get(name)
        && let Some(callable) = Callable::from_items(&items)
    {
        debug!(%name, "applying bound procedure");
        return callable.apply(args, interp, depth);
    }

    warn!(%name, "can't find function");
    interp.emit(format_args!("can't find function `{name}`"))?;
    Ok(Value::Null)
}

/// How a procedure treats its arguments before substituting them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    /// Arguments are evaluated first
    Lambda,
    /// Arguments are substituted as written
    Macro,
}

impl CallKind {
    fn keyword(self) -> &'static str {
        match self {
            CallKind::Lambda => "lambda",
            CallKind::Macro => "macro",
        }
    }
}

/// A `["lambda", [params...], body]` or `["macro", [params...], body]` array
struct Callable<'a> {
    kind: CallKind,
    params: Vec<&'a str>,
    body: &'a Value,
}

impl<'a> Callable<'a> {
    fn from_items(items: &'a [Value]) -> Option<Self> {
        let [Value::String(keyword), Value::Array(params), body] = items else {
            return None;
        };
        let kind = match keyword.as_str() {
            "lambda" => CallKind::Lambda,
            "macro" => CallKind::Macro,
            _ => return None,
        };
        let params = params
            .iter()
            .map(Value::as_str)
            .collect::<Option<Vec<_>>>()?;
        Some(Callable { kind, params, body })
    }

    /// Substitute every parameter occurring in the body, then evaluate the body
    fn apply(&self, args: &[Value], interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
        if self.params.len() != args.len() {
            return Err(Error::arity_error(self.params.len(), args.len()));
        }

        let mut bindings = Vec::with_capacity(args.len());
        for (param, arg) in self.params.iter().zip(args) {
            let replacement = match self.kind {
                // Evaluated arrays are data; quote them so the body does not run them
                CallKind::Lambda => match eval_with_depth_tracking(arg, interp, depth + 1)? {
                    array @ Value::Array(_) => Value::Array(vec![Value::from("quote"), array]),
                    value => value,
                },
                CallKind::Macro => arg.clone(),
            };
            bindings.push((*param, replacement));
        }

        debug!(kind = self.kind.keyword(), params = ?self.params, "applying");
        let body = substitute(self.body, &bindings);
        eval_with_depth_tracking(&body, interp, depth + 1)
    }
}

/// Replace, all at once, every string equal to a parameter name anywhere in
/// `body` with the parameter's value. Maps are left untouched.
fn substitute(body: &Value, bindings: &[(&str, Value)]) -> Value {
    match body {
        Value::String(s) => bindings
            .iter()
            .find(|(param, _)| param == s)
            .map_or_else(|| body.clone(), |(_, value)| value.clone()),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, bindings))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Evaluate program special form: each argument in order, yielding the last
pub(crate) fn eval_program(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    let mut last = Value::Null;
    for arg in args {
        last = eval_with_depth_tracking(arg, interp, depth + 1)?;
    }
    Ok(last)
}

/// Evaluate dump special form: the live symbol table as a map
pub(crate) fn eval_dump(
    _args: &[Value],
    interp: &mut Interpreter,
    _depth: usize,
) -> Result<Value, Error> {
    Ok(interp.symbols.as_value())
}

/// Evaluate test special form.
///
/// Only the first argument is evaluated. A `false` result (but not null) is
/// reported and yields `false`; anything else yields `true`.
pub(crate) fn eval_test(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    let Some(expr) = args.first() else {
        return Ok(Value::Bool(true));
    };
    match eval_with_depth_tracking(expr, interp, depth + 1)? {
        Value::Bool(false) => {
            interp.record_test_failure(expr)?;
            Ok(Value::Bool(false))
        }
        _ => Ok(Value::Bool(true)),
    }
}

/// Evaluate assert special form: fatal if the argument evaluates to null
pub(crate) fn eval_assert(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [expr] => match eval_with_depth_tracking(expr, interp, depth + 1)? {
            Value::Null => Err(Error::EvalError(format!("assert failed for {expr}"))),
            _ => Ok(Value::Bool(true)),
        },
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate assert= special form: fatal unless both arguments are structurally equal
pub(crate) fn eval_assert_equal(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [left, right] => {
            let a = eval_with_depth_tracking(left, interp, depth + 1)?;
            let b = eval_with_depth_tracking(right, interp, depth + 1)?;
            if a == b {
                Ok(Value::Bool(true))
            } else {
                Err(Error::EvalError(format!(
                    "assert= failed for [{left}, {right}]: {a} != {b}"
                )))
            }
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    args: &[Value],
    _interp: &mut Interpreter,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate define special form: the name is taken as written, the value is evaluated
pub(crate) fn eval_define(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::String(name), expr] => {
            let value = eval_with_depth_tracking(expr, interp, depth + 1)?;
            trace!(%name, %value, "define");
            interp.symbols.put(name.clone(), value.clone());
            Ok(value)
        }
        [_, _] => Err(Error::TypeError("define requires a string name".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate if special form: only the chosen branch is evaluated
pub(crate) fn eval_if(args: &[Value], interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            let condition = eval_with_depth_tracking(condition_expr, interp, depth + 1)?;
            if condition.is_truthy() {
                eval_with_depth_tracking(then_expr, interp, depth + 1)
            } else {
                eval_with_depth_tracking(else_expr, interp, depth + 1)
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

fn make_callable(kind: CallKind, args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Array(param_list), body] => {
            let mut params: Vec<&str> = Vec::new();
            for param in param_list {
                match param {
                    Value::String(name) => {
                        if params.contains(&name.as_str()) {
                            return Err(Error::EvalError(format!(
                                "Duplicate parameter name: {name}"
                            )));
                        }
                        params.push(name);
                    }
                    other => {
                        return Err(Error::TypeError(format!(
                            "{} parameters must be strings, got {other}",
                            kind.keyword()
                        )));
                    }
                }
            }
            // The procedure is its own literal form
            Ok(Value::Array(vec![
                Value::from(kind.keyword()),
                Value::Array(param_list.clone()),
                body.clone(),
            ]))
        }
        [_, _] => Err(Error::TypeError(format!(
            "{} parameters must be an array",
            kind.keyword()
        ))),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    args: &[Value],
    _interp: &mut Interpreter,
    _depth: usize,
) -> Result<Value, Error> {
    make_callable(CallKind::Lambda, args)
}

/// Evaluate macro special form
pub(crate) fn eval_macro(
    args: &[Value],
    _interp: &mut Interpreter,
    _depth: usize,
) -> Result<Value, Error> {
    make_callable(CallKind::Macro, args)
}

/// Evaluate apply special form: evaluate the argument, then evaluate the resulting array as a form
pub(crate) fn eval_apply(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [expr] => match eval_with_depth_tracking(expr, interp, depth + 1)? {
            form @ Value::Array(_) => eval_with_depth_tracking(&form, interp, depth + 1),
            other => Err(Error::TypeError(format!(
                "apply requires an array, got {}",
                other.tag()
            ))),
        },
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate or special form: arguments left to right, stopping at the first truthy one
pub(crate) fn eval_or(args: &[Value], interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
    for arg in args {
        if eval_with_depth_tracking(arg, interp, depth + 1)?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

/// Evaluate map special form: apply a procedure or operation name to every array element
pub(crate) fn eval_map(args: &[Value], interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
    let evaluated = eval_args(args, interp, depth)?;
    type_check(&evaluated, &[Tag::Any, Tag::Array])?;
    let [func, Value::Array(elements)] = evaluated.as_slice() else {
        return Err(Error::arity_error(2, evaluated.len()));
    };

    elements
        .iter()
        .map(|element| {
            // Elements are already values; quote them so they are not run as forms
            let call = Value::Array(vec![
                func.clone(),
                Value::Array(vec![Value::from("quote"), element.clone()]),
            ]);
            eval_with_depth_tracking(&call, interp, depth + 1)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Evaluate quasiquote special form.
///
/// The template is copied as written, except that `["unquote", expr]` is
/// replaced by the value of `expr` and `["splice-unquote", expr]` inside an
/// array is replaced by the elements of the array `expr` evaluates to. Nested
/// arrays are walked too.
pub(crate) fn eval_quasiquote(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [template] => quasi_walk(template, interp, depth + 1),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn unquoted<'a>(keyword: &str, value: &'a Value) -> Option<&'a Value> {
    match value {
        Value::Array(items) => match items.as_slice() {
            [Value::String(head), expr] if head == keyword => Some(expr),
            _ => None,
        },
        _ => None,
    }
}

fn quasi_walk(template: &Value, interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
    if depth >= interp.config.max_depth {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {})",
            interp.config.max_depth
        )));
    }
    if let Some(expr) = unquoted("unquote", template) {
        return eval_with_depth_tracking(expr, interp, depth + 1);
    }
    let Value::Array(items) = template else {
        return Ok(template.clone());
    };

    let mut result = Vec::with_capacity(items.len());
    for item in items {
        match unquoted("splice-unquote", item) {
            Some(expr) => match eval_with_depth_tracking(expr, interp, depth + 1)? {
                Value::Array(spliced) => result.extend(spliced),
                other => {
                    return Err(Error::TypeMismatch {
                        found: other.tag(),
                        expected: Tag::Array,
                    });
                }
            },
            None => result.push(quasi_walk(item, interp, depth + 1)?),
        }
    }
    Ok(Value::Array(result))
}

/// Evaluate json.loads special form: read, decode and evaluate another document
pub(crate) fn eval_json_loads(
    args: &[Value],
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    let path = eval_args(args, interp, depth)?;
    type_check(&path, &[Tag::String])?;
    let [Value::String(path)] = path.as_slice() else {
        return Err(Error::arity_error(1, path.len()));
    };

    debug!(%path, "loading");
    let source = std::fs::read_to_string(path)
        .map_err(|e| Error::EvalError(format!("Cannot load {path}: {e}")))?;
    let program = parse_json(&source)?;
    eval_with_depth_tracking(&program, interp, depth + 1)
}
