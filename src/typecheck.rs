//! Positional tag checking for special-form arguments.
//!
//! Expected tags act as a "repeat-last" pattern rather than a strict arity
//! match: when there are more values than tags, every value past the end of
//! the list is checked against the last tag. `typed(&[Tag::String, Tag::Any])`
//! therefore reads as "a string followed by anything".
//!
//! Arity is the registry's concern (see `builtinops`), not the checker's.

use crate::Error;
use crate::ast::{Tag, Value};

/// Check `values` against `expected`, position by position.
///
/// An empty `expected` list places no constraint on the values.
pub fn type_check(values: &[Value], expected: &[Tag]) -> Result<(), Error> {
    let Some(last) = expected.last() else {
        return Ok(());
    };

    for (i, value) in values.iter().enumerate() {
        let tag = expected.get(i).unwrap_or(last);
        if !tag.accepts(value.tag()) {
            return Err(Error::TypeMismatch {
                found: value.tag(),
                expected: *tag,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{map, nil, val};

    #[test]
    fn test_type_check_data_driven() {
        use Tag::*;

        // (values, expected tags, offending (found, expected) or None for success)
        let test_cases: Vec<(Vec<Value>, Vec<Tag>, Option<(Tag, Tag)>)> = vec![
            // Empty inputs
            (vec![], vec![], None),
            (vec![], vec![Number], None),
            (vec![val(1), val("x")], vec![], None),
            // Exact positional matches
            (vec![val(1)], vec![Number], None),
            (vec![val("a"), val(1)], vec![String, Number], None),
            (vec![Value::Null, nil(), map([("k", 1)])], vec![Null, Array, Map], None),
            // Repeat-last policy
            (vec![val(1), val(2), val(3)], vec![Number], None),
            (vec![val(1), val(2), val("3")], vec![Number], Some((String, Number))),
            (vec![val("name"), val(1), val(true), nil()], vec![String, Any], None),
            (vec![val(1), val(1)], vec![String, Any], Some((Number, String))),
            // Fewer values than tags
            (vec![val("only")], vec![String, Number, Bool], None),
            // Wildcard
            (vec![val(true), Value::Null], vec![Any], None),
            // First offending value is reported
            (vec![val(true), val("b")], vec![Number], Some((Bool, Number))),
        ];

        for (i, (values, expected, failure)) in test_cases.iter().enumerate() {
            let result = type_check(values, expected);
            match failure {
                None => assert!(
                    result.is_ok(),
                    "Test case {} failed: expected success, got {result:?}",
                    i + 1
                ),
                Some((found, expected)) => assert_eq!(
                    result,
                    Err(Error::TypeMismatch {
                        found: *found,
                        expected: *expected
                    }),
                    "Test case {} failed",
                    i + 1
                ),
            }
        }
    }

    #[test]
    fn test_mismatch_message_names_both_tags() {
        let err = type_check(&[val("a")], &[Tag::Number]).unwrap_err();
        assert_eq!(err.to_string(), "Mismatched types string and number");
    }
}
