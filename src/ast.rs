//! This module defines the core value type of the interpreter. The main enum,
//! [`Value`], is a closed tagged union over the six JSON shapes the language
//! knows about: numbers, strings, arrays, null, booleans and maps. Arrays are
//! the only expression-bearing form; everything else is plain data.
//!
//! The module also provides the canonical text rendering (via `Display`), deep
//! structural equality (via `PartialEq` and [`equal`]), the [`Tag`] used by the
//! type checker, and conversion traits from common Rust types so that values can
//! be built from literals in code and tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Type alias for number values in interpreter
pub type NumberType = f64;

/// Shared, mutable string-keyed mapping.
///
/// Cloning a `Value::Map` clones this reference, not the mapping. This is how
/// the result of `dump` stays attached to the live symbol table.
pub type MapRef = Rc<RefCell<HashMap<String, Value>>>;

/// The tag of a [`Value`], as seen by the type checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Number,
    String,
    Array,
    Null,
    Bool,
    Map,
    /// Wildcard accepted by the type checker in place of any concrete tag
    Any,
}

impl Tag {
    pub fn name(self) -> &'static str {
        match self {
            Tag::Number => "number",
            Tag::String => "string",
            Tag::Array => "array",
            Tag::Null => "null",
            Tag::Bool => "bool",
            Tag::Map => "map",
            Tag::Any => "any",
        }
    }

    /// Whether a value tagged `found` satisfies this expected tag
    pub fn accepts(self, found: Tag) -> bool {
        self == Tag::Any || self == found
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core value type in interpreter
///
/// To build values in code, use the conversions and helpers:
/// - `val(42)` for numbers, `val("name")` for strings, `nil()` for `[]`
/// - `val([1, 2, 3])` for homogeneous arrays
/// - `val(vec![val("+"), val(1), val(2)])` for mixed arrays (forms)
#[derive(Clone)]
pub enum Value {
    /// Numbers (64-bit floats, all arithmetic is float-based)
    Number(NumberType),
    /// Strings; also operation names and bound identifiers
    String(String),
    /// Arrays; the only form that evaluation looks inside of
    Array(Vec<Value>),
    Null,
    Bool(bool),
    /// String-keyed maps, shared by reference (see [`MapRef`])
    Map(MapRef),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Number(_) => Tag::Number,
            Value::String(_) => Tag::String,
            Value::Array(_) => Tag::Array,
            Value::Null => Tag::Null,
            Value::Bool(_) => Tag::Bool,
            Value::Map(_) => Tag::Map,
        }
    }

    /// Build a map value that owns a fresh mapping
    pub fn new_map(entries: HashMap<String, Value>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if a value is the empty array
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Array(items) if items.is_empty())
    }

    /// Truthiness used by `if`: null, `false` and `[]` are false
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false)) && !self.is_nil()
    }

    fn render_into(
        &self,
        f: &mut fmt::Formatter<'_>,
        open_maps: &mut Vec<*const RefCell<HashMap<String, Value>>>,
    ) -> fmt::Result {
        match self {
            Value::Number(n) if n.is_finite() => write!(f, "{n}"),
            // JSON has no spelling for NaN or the infinities
            Value::Number(_) | Value::Null => f.write_str("null"),
            Value::String(s) => write!(f, "{}", serde_json::Value::from(s.as_str())),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.render_into(f, open_maps)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                let ptr = Rc::as_ptr(map);
                if open_maps.contains(&ptr) {
                    return f.write_str("{...}");
                }
                open_maps.push(ptr);
                let entries = map.borrow();
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{key}:")?;
                    entries[key].render_into(f, open_maps)?;
                }
                f.write_str("}")?;
                open_maps.pop();
                Ok(())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render_into(f, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(items) => {
                write!(f, "Array(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Map(_) => write!(f, "Map({self})"),
        }
    }
}

/// Deep structural equality.
///
/// Tags must match exactly; arrays compare in order, maps compare over the
/// same key set, scalars compare by value. A map is always equal to itself,
/// which keeps comparisons of a self-containing `dump` result finite. NaN is
/// equal to NaN so that `=` stays reflexive for every value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value == other))
            }
            _ => false, // Different variants are never equal
        }
    }
}

/// Compare every value from index 1 onward against value 0.
/// Zero or one values are trivially equal.
pub fn equal(values: &[Value]) -> bool {
    match values.split_first() {
        None => true,
        Some((first, rest)) => rest.iter().all(|value| value == first),
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

// Only integer types that convert to f64 losslessly
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Array(arr.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::Array(slice.iter().cloned().map(|x| x.into()).collect())
    }
}

/// Helper function for creating Values - works great in mixed arrays!
/// Accepts any type that can be converted to Value
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating the empty array
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Array(vec![])
}

/// Helper function for creating a fresh map from key/value pairs
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn map<K: Into<String>, V: Into<Value>, const N: usize>(pairs: [(K, V); N]) -> Value {
    Value::new_map(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}


#[cfg(test)]
mod render_tests {
    use super::*;

    #[test]
    fn test_render_data_driven() {
        let test_cases = vec![
            (val(5), "5"),
            (val(-3), "-3"),
            (val(0.5), "0.5"),
            (val(1.25e-3), "0.00125"),
            (val(f64::NAN), "null"),
            (val(f64::INFINITY), "null"),
            (val("hi"), "\"hi\""),
            (val("say \"hi\"\n"), r#""say \"hi\"\n""#),
            (val(true), "true"),
            (val(false), "false"),
            (Value::Null, "null"),
            (nil(), "[]"),
            (val([1, 2, 3]), "[1, 2, 3]"),
            (val(vec![val("+"), val([1]), val("x")]), r#"["+", [1], "x"]"#),
            (map([("b", val(2)), ("a", val("x"))]), r#"{a:"x",b:2}"#),
            (map([("nested", map([("k", nil())]))]), "{nested:{k:[]}}"),
            (map::<&str, Value, 0>([]), "{}"),
        ];

        for (value, expected) in test_cases {
            assert_eq!(value.to_string(), expected, "rendering {value:?}");
        }
    }

    #[test]
    fn test_render_self_containing_map() {
        let table = map([("x", 1)]);
        let Value::Map(inner) = &table else {
            panic!("expected map");
        };
        inner.borrow_mut().insert("self".to_owned(), table.clone());

        assert_eq!(table.to_string(), "{self:{...},x:1}");
    }
}

#[cfg(test)]
mod equality_tests {
    use super::*;

    #[test]
    fn test_equality_data_driven() {
        // (values, expected)
        let test_cases: Vec<(Vec<Value>, bool)> = vec![
            (vec![], true),
            (vec![val(1)], true),
            (vec![val(1), val(1)], true),
            (vec![val(1), val(1), val(1)], true),
            (vec![val(1), val(1), val(2)], false),
            (vec![val(1), val("1")], false),
            (vec![val("a"), val("a")], true),
            (vec![val(true), val(true)], true),
            (vec![val(true), val(false)], false),
            (vec![Value::Null, Value::Null], true),
            (vec![Value::Null, val(false)], false),
            (vec![Value::Null, nil()], false),
            (vec![nil(), nil()], true),
            (vec![val([1, 2]), val([1, 2])], true),
            (vec![val([1, 2]), val([2, 1])], false),
            (vec![val([1, 2]), val([1, 2, 3])], false),
            (vec![val([val([1]), val("x")]), val([val([1]), val("x")])], true),
            (vec![map([("a", 1)]), map([("a", 1)])], true),
            (vec![map([("a", 1)]), map([("a", 2)])], false),
            (vec![map([("a", 1)]), map([("b", 1)])], false),
            (vec![map([("a", 1)]), map([("a", 1), ("b", 2)])], false),
            (vec![map([("a", 1), ("b", 2)]), map([("a", 1)])], false),
            (vec![map([("a", val([1]))]), map([("a", val([1]))])], true),
            (vec![map([("a", 1)]), val([1])], false),
        ];

        for (i, (values, expected)) in test_cases.iter().enumerate() {
            assert_eq!(
                equal(values),
                *expected,
                "Test case {} failed: {values:?}",
                i + 1
            );
        }
    }

    #[test]
    fn test_map_aliases_compare_equal() {
        let shared = map([("x", 1)]);
        let alias = shared.clone();
        assert!(equal(&[shared, alias]));
    }

    #[test]
    fn test_float_equality_is_by_value() {
        assert!(equal(&[val(0.1 + 0.2), val(0.1 + 0.2)]));
        assert!(!equal(&[val(0.1 + 0.2), val(0.3)]));
        assert!(equal(&[val(f64::NAN), val(f64::NAN)]));
        assert!(!equal(&[val(f64::NAN), val(0)]));
        assert!(equal(&[val([f64::NAN]), val([f64::NAN])]));
    }
}
