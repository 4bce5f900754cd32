//! Built-in operations registry.
//!
//! Every operation the language knows about is listed once in
//! [`BUILTIN_OPS`], with its name, its arity and how it wants its arguments:
//!
//! - **Functions**: all arguments are evaluated, in order, before the
//!   implementation runs (e.g. `+`, `=`, `set`, `print`)
//! - **Special forms**: the implementation receives the raw argument
//!   expressions and decides itself what to evaluate (e.g. `program`,
//!   `test`, `quote`, `lambda`)
//!
//! Function implementations live here; special forms need the evaluator's
//! depth tracking and live in `evaluator.rs`.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature
//!    `fn(Vec<Value>, &mut Interpreter) -> Result<Value, Error>`, or add a
//!    special form to the evaluator
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::ast::{NumberType, Tag, Value, equal};
use crate::evaluator::{
    Arity, Interpreter, eval_apply, eval_assert, eval_assert_equal, eval_define, eval_dump,
    eval_if, eval_json_loads, eval_lambda, eval_macro, eval_map, eval_or, eval_program,
    eval_quasiquote, eval_quote, eval_test,
};
use crate::typecheck::type_check;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::trace;

/// Implementation that receives already-evaluated arguments
pub type FunctionFn = fn(Vec<Value>, &mut Interpreter) -> Result<Value, Error>;

/// Implementation that receives raw argument expressions and the current evaluation depth
pub type SpecialFormFn = fn(&[Value], &mut Interpreter, usize) -> Result<Value, Error>;

/// Represents the implementation of a built-in operation (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    Function(FunctionFn),
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name used in head position to invoke this operation
    pub id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    #[cfg_attr(not(test), expect(dead_code))]
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// Check if the given number of arguments is valid for this operation
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Builtin Function Implementations
//

fn builtin_set(args: Vec<Value>, interp: &mut Interpreter) -> Result<Value, Error> {
    type_check(&args, &[Tag::String, Tag::Any])?;
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(Value::String(name)), Some(value)) => {
            trace!(%name, %value, "set");
            interp.symbols_mut().put(name, value.clone());
            Ok(value)
        }
        (_, None) => Err(Error::arity_error(2, 1)),
        (Some(other), Some(_)) => Err(Error::TypeMismatch {
            found: other.tag(),
            expected: Tag::String,
        }),
        (None, Some(_)) => Err(Error::arity_error(2, 0)),
    }
}

fn builtin_get(args: Vec<Value>, interp: &mut Interpreter) -> Result<Value, Error> {
    type_check(&args, &[Tag::String])?;
    match args.first() {
        Some(Value::String(name)) => Ok(interp.symbols().get(name)),
        Some(other) => Err(Error::TypeMismatch {
            found: other.tag(),
            expected: Tag::String,
        }),
        None => Err(Error::arity_error(1, 0)),
    }
}

fn builtin_print(args: Vec<Value>, interp: &mut Interpreter) -> Result<Value, Error> {
    for value in &args {
        interp.emit(value)?;
    }
    Ok(Value::Null)
}

fn builtin_equal(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    Ok(Value::Bool(equal(&args)))
}

fn builtin_add(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    type_check(&args, &[Tag::Number])?;
    // Accumulate in argument order for reproducible rounding
    let mut sum: NumberType = 0.0;
    for arg in &args {
        if let Value::Number(n) = arg {
            sum += n;
        }
    }
    Ok(Value::Number(sum))
}

fn builtin_type(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    match args.as_slice() {
        [value] => Ok(Value::String(value.tag().name().to_owned())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_to_string(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    match args.as_slice() {
        [value] => Ok(Value::String(value.to_string())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

//
// Arrays
//

fn builtin_head(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    type_check(&args, &[Tag::Array])?;
    match args.into_iter().next() {
        Some(Value::Array(items)) => Ok(items.into_iter().next().unwrap_or(Value::Null)),
        _ => Err(Error::arity_error(1, 0)),
    }
}

fn builtin_tail(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    type_check(&args, &[Tag::Array])?;
    match args.into_iter().next() {
        Some(Value::Array(items)) => Ok(Value::Array(items.into_iter().skip(1).collect())),
        _ => Err(Error::arity_error(1, 0)),
    }
}

/// Element count of an array, entry count of a map, character count of a string
fn builtin_len(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    let count = match args.as_slice() {
        [Value::Array(items)] => items.len(),
        [Value::Map(map)] => map.borrow().len(),
        [Value::String(s)] => s.chars().count(),
        [other] => {
            return Err(Error::TypeError(format!(
                "len requires an array, map or string, got {}",
                other.tag()
            )));
        }
        _ => return Err(Error::arity_error(1, args.len())),
    };
    Ok(Value::Number(count as NumberType))
}

//
// Maps
//

fn builtin_contains_key(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    type_check(&args, &[Tag::Map, Tag::String])?;
    match args.as_slice() {
        [Value::Map(map), Value::String(key)] => Ok(Value::Bool(map.borrow().contains_key(key))),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// A fresh map holding the entries of the given one plus `key`; the original is untouched
fn builtin_insert(args: Vec<Value>, _interp: &mut Interpreter) -> Result<Value, Error> {
    type_check(&args, &[Tag::Map, Tag::String, Tag::Any])?;
    match args.as_slice() {
        [Value::Map(map), Value::String(key), value] => {
            let mut entries = map.borrow().clone();
            entries.insert(key.clone(), value.clone());
            Ok(Value::new_map(entries))
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Symbol table
        BuiltinOp {
            id: "set",
            op_kind: OpKind::Function(builtin_set),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            id: "get",
            op_kind: OpKind::Function(builtin_get),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "define",
            op_kind: OpKind::SpecialForm(eval_define),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "dump",
            op_kind: OpKind::SpecialForm(eval_dump),
            arity: Arity::Any,
        },
        // Output
        BuiltinOp {
            id: "print",
            op_kind: OpKind::Function(builtin_print),
            arity: Arity::Any,
        },
        // Sequencing and control flow
        BuiltinOp {
            id: "program",
            op_kind: OpKind::SpecialForm(eval_program),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "if",
            op_kind: OpKind::SpecialForm(eval_if),
            arity: Arity::Exact(3),
        },
        // Equality and arithmetic
        BuiltinOp {
            id: "=",
            op_kind: OpKind::Function(builtin_equal),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "+",
            op_kind: OpKind::Function(builtin_add),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "or",
            op_kind: OpKind::SpecialForm(eval_or),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "type",
            op_kind: OpKind::Function(builtin_type),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "->string",
            op_kind: OpKind::Function(builtin_to_string),
            arity: Arity::Exact(1),
        },
        // Arrays
        BuiltinOp {
            id: "head",
            op_kind: OpKind::Function(builtin_head),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "tail",
            op_kind: OpKind::Function(builtin_tail),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "len",
            op_kind: OpKind::Function(builtin_len),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "map",
            op_kind: OpKind::SpecialForm(eval_map),
            arity: Arity::Exact(2),
        },
        // Maps
        BuiltinOp {
            id: "contains-key",
            op_kind: OpKind::Function(builtin_contains_key),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "insert",
            op_kind: OpKind::Function(builtin_insert),
            arity: Arity::Exact(3),
        },
        // Testing
        BuiltinOp {
            id: "test",
            op_kind: OpKind::SpecialForm(eval_test),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "assert",
            op_kind: OpKind::SpecialForm(eval_assert),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "assert=",
            op_kind: OpKind::SpecialForm(eval_assert_equal),
            arity: Arity::Exact(2),
        },
        // Quoting and substitution-based procedures
        BuiltinOp {
            id: "quote",
            op_kind: OpKind::SpecialForm(eval_quote),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "lambda",
            op_kind: OpKind::SpecialForm(eval_lambda),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "macro",
            op_kind: OpKind::SpecialForm(eval_macro),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "quasiquote",
            op_kind: OpKind::SpecialForm(eval_quasiquote),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "apply",
            op_kind: OpKind::SpecialForm(eval_apply),
            arity: Arity::Exact(1),
        },
        // Loading other programs
        BuiltinOp {
            id: "json.loads",
            op_kind: OpKind::SpecialForm(eval_json_loads),
            arity: Arity::Exact(1),
        },
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by the name used in head position
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{map, nil, val};

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Helper to invoke a function builtin through the registry with
    /// already-evaluated arguments.
    fn call_builtin(name: &str, args: &[Value], interp: &mut Interpreter) -> Result<Value, Error> {
        let op = find_op(name).expect("builtin not found");
        op.validate_arity(args.len())?;
        match &op.op_kind {
            OpKind::Function(func) => func(args.to_vec(), interp),
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add_op = find_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::Any);
        assert!(!add_op.is_special_form());

        let program_op = find_op("program").unwrap();
        assert!(program_op.is_special_form());

        // Forms that must not evaluate their arguments eagerly
        for id in [
            "program", "test", "dump", "quote", "lambda", "macro", "define", "if", "or", "map",
            "quasiquote",
        ] {
            assert!(find_op(id).unwrap().is_special_form(), "{id} should be a special form");
        }
        // Forms that evaluate every argument
        for id in [
            "set", "get", "print", "=", "+", "type", "->string", "head", "tail", "len",
            "contains-key", "insert",
        ] {
            assert!(!find_op(id).unwrap().is_special_form(), "{id} should be a function");
        }

        // Every registered id is unique and findable
        let all_ops = get_builtin_ops();
        for op in all_ops {
            assert!(std::ptr::eq(find_op(op.id).unwrap(), op));
        }
        assert_eq!(BUILTIN_BY_ID.len(), all_ops.len());

        assert!(find_op("unknown").is_none());
        assert!(find_op("").is_none());
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($interp:expr, $name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args, $interp), $expected)
        };
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let mut interp = Interpreter::new().with_output(Box::new(std::io::sink()));
        let interp = &mut interp;

        let many_ones: Vec<Value> = (0..100).map(|_| val(1)).collect();

        let test_cases: Vec<TestCase> = vec![
            // Addition
            test!(interp, "+", &[], success(0)),
            test!(interp, "+", &[val(5)], success(5)),
            test!(interp, "+", &[val(1), val(2), val(3)], success(6)),
            test!(interp, "+", &[val(-5), val(10)], success(5)),
            test!(interp, "+", &[val(0.5), val(0.25)], success(0.75)),
            test!(interp, "+", &many_ones, success(100)),
            test!(interp, "+", &[val("a")], None),
            test!(interp, "+", &[val(1), val(true)], None),
            test!(interp, "+", &[val(1), Value::Null], None),
            // Equality over any number of arguments
            test!(interp, "=", &[], success(true)),
            test!(interp, "=", &[val(1)], success(true)),
            test!(interp, "=", &[val(1), val(1)], success(true)),
            test!(interp, "=", &[val(1), val("1")], success(false)),
            test!(interp, "=", &[val([1, 2]), val([1, 2]), val([1, 2])], success(true)),
            test!(interp, "=", &[val([1, 2]), val([1, 2]), val([2, 1])], success(false)),
            test!(interp, "=", &[map([("a", 1)]), map([("a", 1)])], success(true)),
            test!(interp, "=", &[Value::Null, Value::Null], success(true)),
            // type
            test!(interp, "type", &[val(1)], success("number")),
            test!(interp, "type", &[val("s")], success("string")),
            test!(interp, "type", &[nil()], success("array")),
            test!(interp, "type", &[Value::Null], success("null")),
            test!(interp, "type", &[val(false)], success("bool")),
            test!(interp, "type", &[map([("a", 1)])], success("map")),
            test!(interp, "type", &[], None),
            // set / get through the symbol table
            test!(interp, "set", &[val("x"), val(5)], success(5)),
            test!(interp, "get", &[val("x")], success(5)),
            test!(interp, "set", &[val("x"), val("five")], success("five")),
            test!(interp, "get", &[val("x")], success("five")),
            test!(interp, "get", &[val("missing")], Some(Value::Null)),
            test!(interp, "set", &[val(1), val(5)], None),
            test!(interp, "set", &[val("only-name")], None),
            test!(interp, "get", &[val(true)], None),
            test!(interp, "get", &[], None),
            // print always yields null
            test!(interp, "print", &[], Some(Value::Null)),
            test!(interp, "print", &[val(1), val("two")], Some(Value::Null)),
            // ->string renders like print
            test!(interp, "->string", &[val(1.5)], success("1.5")),
            test!(interp, "->string", &[val("a")], success("\"a\"")),
            test!(interp, "->string", &[val([1, 2])], success("[1, 2]")),
            test!(interp, "->string", &[map([("k", Value::Null)])], success("{k:null}")),
            test!(interp, "->string", &[], None),
            // head / tail
            test!(interp, "head", &[val([1, 2, 3])], success(1)),
            test!(interp, "head", &[nil()], Some(Value::Null)),
            test!(interp, "head", &[val(1)], None),
            test!(interp, "tail", &[val([1, 2, 3])], success([2, 3])),
            test!(interp, "tail", &[val([1])], Some(nil())),
            test!(interp, "tail", &[nil()], Some(nil())),
            test!(interp, "tail", &[val("abc")], None),
            // len
            test!(interp, "len", &[val([1, 2, 3])], success(3)),
            test!(interp, "len", &[nil()], success(0)),
            test!(interp, "len", &[map([("a", 1), ("b", 2)])], success(2)),
            test!(interp, "len", &[val("héllo")], success(5)),
            test!(interp, "len", &[val(true)], None),
            test!(interp, "len", &[val([1]), val([2])], None),
            // contains-key / insert
            test!(interp, "contains-key", &[map([("a", 1)]), val("a")], success(true)),
            test!(interp, "contains-key", &[map([("a", 1)]), val("b")], success(false)),
            test!(interp, "contains-key", &[map([("a", 1)]), val(1)], None),
            test!(interp, "contains-key", &[val([1]), val("a")], None),
            test!(interp, "insert", &[map([("a", 1)]), val("b"), val(2)], Some(map([("a", 1), ("b", 2)]))),
            test!(interp, "insert", &[map([("a", 1)]), val("a"), val("x")], Some(map([("a", val("x"))]))),
            test!(interp, "insert", &[map::<&str, Value, 0>([]), val("k"), val([1])], Some(map([("k", val([1]))]))),
            test!(interp, "insert", &[map([("a", 1)]), val(1), val(2)], None),
            test!(interp, "insert", &[map([("a", 1)]), val("b")], None),
        ];

        for (i, (name, result, expected)) in test_cases.into_iter().enumerate() {
            match (result, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "#{} `{name}`", i + 1)
                }
                (Err(_), None) => {}
                (Ok(actual), None) => panic!("#{} `{name}`: expected error, got {actual:?}", i + 1),
                (Err(err), Some(expected)) => {
                    panic!("#{} `{name}`: expected {expected:?}, got error {err}", i + 1)
                }
            }
        }
    }

    #[test]
    fn test_insert_leaves_original_map_untouched() {
        let mut interp = Interpreter::new().with_output(Box::new(std::io::sink()));
        let original = map([("a", 1)]);
        let updated = call_builtin("insert", &[original.clone(), val("b"), val(2)], &mut interp).unwrap();
        assert_eq!(original, map([("a", 1)]));
        assert_eq!(updated, map([("a", 1), ("b", 2)]));
    }

    #[test]
    fn test_type_errors_identify_tags() {
        let mut interp = Interpreter::new().with_output(Box::new(std::io::sink()));
        let err = call_builtin("+", &[val(1), val("a")], &mut interp).unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                found: Tag::String,
                expected: Tag::Number
            }
        );

        let err = call_builtin("set", &[val(1), val(2)], &mut interp).unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                found: Tag::Number,
                expected: Tag::String
            }
        );
    }
}
