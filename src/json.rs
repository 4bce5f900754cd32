//! JSON boundary of the interpreter.
//!
//! Text is decoded by `serde_json` into its generic tree, which is then
//! converted node by node into [`Value`]. Objects become fresh maps, arrays
//! become arrays; nothing is compiled or rewritten on the way in, because in
//! this language the JSON document *is* the program.

use std::collections::HashMap;

use crate::Error;
use crate::ast::Value;

/// Parse a JSON document into a value ready for evaluation
pub fn parse_json(input: &str) -> Result<Value, Error> {
    let json_value: serde_json::Value =
        serde_json::from_str(input).map_err(|e| Error::ParseError(format!("Invalid JSON: {e}")))?;

    from_generic(json_value)
}

/// Convert a decoded `serde_json::Value` tree into a [`Value`], recursively
pub fn from_generic(json: serde_json::Value) -> Result<Value, Error> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| Error::TypeError(format!("Can't turn {n} into a number"))),
        serde_json::Value::String(s) => Ok(Value::String(s)),
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(from_generic)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_json::Value::Object(obj) => obj
            .into_iter()
            .map(|(key, value)| Ok((key, from_generic(value)?)))
            .collect::<Result<HashMap<_, _>, Error>>()
            .map(Value::new_map),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{map, nil, val};

    #[test]
    fn test_parse_json_data_driven() {
        let test_cases = vec![
            // Primitives
            ("true", val(true)),
            ("false", val(false)),
            ("null", Value::Null),
            ("42", val(42)),
            ("-0.5", val(-0.5)),
            ("1e3", val(1000)),
            (r#""hello""#, val("hello")),
            (r#""with \"quotes\"""#, val("with \"quotes\"")),
            // Arrays are kept as-is, forms included
            ("[]", nil()),
            ("[[]]", val([nil()])),
            ("[1, 2]", val([1, 2])),
            (
                r#"["+", 1, ["get", "x"]]"#,
                val(vec![val("+"), val(1), val(vec![val("get"), val("x")])]),
            ),
            (r#"[null, true, "s"]"#, val(vec![Value::Null, val(true), val("s")])),
            // Objects become maps
            (r#"{}"#, map::<&str, Value, 0>([])),
            (r#"{"a": 1, "b": [2]}"#, map([("a", val(1)), ("b", val([2]))])),
            (r#"{"outer": {"inner": null}}"#, map([("outer", map([("inner", Value::Null)]))])),
            // Surrounding whitespace is fine
            ("  [1]\n", val([1])),
        ];

        for (input, expected) in test_cases {
            let parsed = parse_json(input).unwrap();
            assert_eq!(parsed, expected, "parsing {input}");
        }
    }

    #[test]
    fn test_parse_json_errors() {
        for input in ["", "[1,", "[1 2]", "{\"a\"}", "hello", "[1] [2]", "'x'"] {
            match parse_json(input) {
                Err(Error::ParseError(msg)) => assert!(msg.starts_with("Invalid JSON")),
                other => panic!("expected parse error for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_generic_uses_fresh_maps() {
        let tree = serde_json::json!([{"k": 1}, {"k": 1}]);
        let Value::Array(items) = from_generic(tree).unwrap() else {
            panic!("expected array");
        };
        let (Value::Map(a), Value::Map(b)) = (&items[0], &items[1]) else {
            panic!("expected maps");
        };
        assert!(!std::rc::Rc::ptr_eq(a, b));
        assert_eq!(items[0], items[1]);
    }
}
