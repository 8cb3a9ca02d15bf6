//! Assertion Evaluation
//!
//! Evaluates simple `path op literal` expressions against a step's output
//! data. Supported operators: `==`, `!=`, `>`, `>=`, `<`, `<=`, `contains`
//! and the unary `exists`.
//!
//! Paths are dot-separated and descend through objects and arrays
//! (numeric segments index arrays), e.g. `body.items.0.id == 42`.

use serde_json::Value;
use thiserror::Error;

use crate::flow::OutputData;

/// An assertion that did not hold, or could not be evaluated.
#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("assertion '{expression}' failed: expected {expected}, got {actual}")]
    Failed {
        expression: String,
        expected: String,
        actual: String,
    },

    #[error("assertion '{expression}' failed: path '{path}' not found")]
    PathNotFound { expression: String, path: String },

    #[error("invalid assertion '{expression}': {reason}")]
    Invalid { expression: String, reason: String },
}

/// Evaluates assertions against one step's output.
pub struct Evaluator<'a> {
    data: &'a OutputData,
}

impl<'a> Evaluator<'a> {
    pub fn new(data: &'a OutputData) -> Self {
        Self { data }
    }

    /// Evaluates every expression, stopping at the first failure.
    pub fn evaluate_all(&self, expressions: &[String]) -> Result<(), AssertionError> {
        for expression in expressions {
            self.evaluate(expression)?;
        }
        Ok(())
    }

    /// Evaluates a single `path op literal` expression.
    pub fn evaluate(&self, expression: &str) -> Result<(), AssertionError> {
        let trimmed = expression.trim();
        let mut parts = trimmed.splitn(3, char::is_whitespace);

        let path = parts.next().filter(|p| !p.is_empty()).ok_or_else(|| {
            AssertionError::Invalid {
                expression: trimmed.to_string(),
                reason: "empty expression".to_string(),
            }
        })?;

        let op = parts.next().ok_or_else(|| AssertionError::Invalid {
            expression: trimmed.to_string(),
            reason: "missing operator".to_string(),
        })?;

        if op == "exists" {
            return match self.lookup(path) {
                Some(_) => Ok(()),
                None => Err(AssertionError::PathNotFound {
                    expression: trimmed.to_string(),
                    path: path.to_string(),
                }),
            };
        }

        let literal = parts.next().ok_or_else(|| AssertionError::Invalid {
            expression: trimmed.to_string(),
            reason: format!("operator '{}' requires a right-hand side", op),
        })?;
        let expected = parse_literal(literal.trim());

        let actual = self
            .lookup(path)
            .ok_or_else(|| AssertionError::PathNotFound {
                expression: trimmed.to_string(),
                path: path.to_string(),
            })?;

        let holds = match op {
            "==" => values_equal(actual, &expected),
            "!=" => !values_equal(actual, &expected),
            ">" | ">=" | "<" | "<=" => compare_numeric(actual, &expected, op).ok_or_else(|| {
                AssertionError::Invalid {
                    expression: trimmed.to_string(),
                    reason: format!("operator '{}' requires numeric operands", op),
                }
            })?,
            "contains" => contains(actual, &expected),
            other => {
                return Err(AssertionError::Invalid {
                    expression: trimmed.to_string(),
                    reason: format!("unknown operator '{}'", other),
                })
            }
        };

        if holds {
            Ok(())
        } else {
            Err(AssertionError::Failed {
                expression: trimmed.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    /// Resolves a dot path against the output data.
    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.data.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

/// Parses the right-hand side of an expression.
///
/// Tries JSON first (numbers, booleans, null, quoted strings), falling back
/// to a bare string.
fn parse_literal(literal: &str) -> Value {
    serde_json::from_str(literal).unwrap_or_else(|_| Value::String(literal.to_string()))
}

/// Equality with numeric coercion, so `status == 200` matches both integer
/// and float representations.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return a == b;
    }
    actual == expected
}

fn compare_numeric(actual: &Value, expected: &Value, op: &str) -> Option<bool> {
    let a = actual.as_f64()?;
    let b = expected.as_f64()?;
    Some(match op {
        ">" => a > b,
        ">=" => a >= b,
        "<" => a < b,
        "<=" => a <= b,
        _ => return None,
    })
}

/// `contains` over strings (substring), arrays (membership) and objects
/// (key presence).
fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => expected.as_str().map(|e| s.contains(e)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        Value::Object(map) => expected
            .as_str()
            .map(|key| map.contains_key(key))
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> OutputData {
        match json!({
            "status": 200,
            "body": {
                "id": "abc",
                "count": 5,
                "tags": ["alpha", "beta"],
                "message": "operation completed"
            }
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_equality() {
        let data = data();
        let eval = Evaluator::new(&data);

        assert!(eval.evaluate("status == 200").is_ok());
        assert!(eval.evaluate("body.id == abc").is_ok());
        assert!(eval.evaluate("body.id == \"abc\"").is_ok());
        assert!(eval.evaluate("status == 404").is_err());
    }

    #[test]
    fn test_inequality() {
        let data = data();
        let eval = Evaluator::new(&data);

        assert!(eval.evaluate("status != 500").is_ok());
        assert!(eval.evaluate("status != 200").is_err());
    }

    #[test]
    fn test_numeric_comparison() {
        let data = data();
        let eval = Evaluator::new(&data);

        assert!(eval.evaluate("body.count > 3").is_ok());
        assert!(eval.evaluate("body.count >= 5").is_ok());
        assert!(eval.evaluate("body.count < 10").is_ok());
        assert!(eval.evaluate("body.count <= 4").is_err());
    }

    #[test]
    fn test_numeric_comparison_on_string_invalid() {
        let data = data();
        let eval = Evaluator::new(&data);
        assert!(matches!(
            eval.evaluate("body.id > 3"),
            Err(AssertionError::Invalid { .. })
        ));
    }

    #[test]
    fn test_contains() {
        let data = data();
        let eval = Evaluator::new(&data);

        assert!(eval.evaluate("body.message contains completed").is_ok());
        assert!(eval.evaluate("body.tags contains alpha").is_ok());
        assert!(eval.evaluate("body contains id").is_ok());
        assert!(eval.evaluate("body.tags contains gamma").is_err());
    }

    #[test]
    fn test_exists() {
        let data = data();
        let eval = Evaluator::new(&data);

        assert!(eval.evaluate("body.id exists").is_ok());
        assert!(eval.evaluate("body.missing exists").is_err());
    }

    #[test]
    fn test_array_index_path() {
        let data = data();
        let eval = Evaluator::new(&data);
        assert!(eval.evaluate("body.tags.0 == alpha").is_ok());
    }

    #[test]
    fn test_path_not_found() {
        let data = data();
        let eval = Evaluator::new(&data);
        assert!(matches!(
            eval.evaluate("no.such.path == 1"),
            Err(AssertionError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_expressions() {
        let data = data();
        let eval = Evaluator::new(&data);

        assert!(matches!(
            eval.evaluate("status"),
            Err(AssertionError::Invalid { .. })
        ));
        assert!(matches!(
            eval.evaluate("status ~= 200"),
            Err(AssertionError::Invalid { .. })
        ));
        assert!(matches!(
            eval.evaluate("status =="),
            Err(AssertionError::Invalid { .. })
        ));
    }

    #[test]
    fn test_evaluate_all_stops_at_first_failure() {
        let data = data();
        let eval = Evaluator::new(&data);

        let ok = vec!["status == 200".to_string(), "body.id exists".to_string()];
        assert!(eval.evaluate_all(&ok).is_ok());

        let mixed = vec!["status == 200".to_string(), "status == 500".to_string()];
        assert!(eval.evaluate_all(&mixed).is_err());
    }
}
