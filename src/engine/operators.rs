// Predicate library over (argument value, policy value) pairs

use crate::core::models::Operator;
use serde_json::Value;
use tracing::warn;

/// Evaluate one operator against a JSON left operand and a policy value.
///
/// Returns `None` when the policy cannot be evaluated at all (a `regex`
/// operator whose pattern fails to compile); callers skip such policies.
/// Non-string left operands under string operators evaluate to `Some(false)`,
/// never an error.
pub fn evaluate(op: Operator, left: &Value, right: &str) -> Option<bool> {
    match op {
        Operator::Equal => Some(json_equal(left, right)),
        Operator::NotEqual => Some(!json_equal(left, right)),
        Operator::Contains => Some(str_test(left, |s| s.contains(right))),
        Operator::NotContains => Some(!str_test(left, |s| s.contains(right))),
        Operator::StartsWith => Some(str_test(left, |s| s.starts_with(right))),
        Operator::EndsWith => Some(str_test(left, |s| s.ends_with(right))),
        Operator::Regex => match regex::Regex::new(right) {
            // Unanchored match, per the upstream semantics.
            Ok(re) => Some(str_test(left, |s| re.is_match(s))),
            Err(e) => {
                warn!(pattern = %right, error = %e, "Skipping policy with invalid regex");
                None
            }
        },
    }
}

/// Structural JSON equality. The policy value is parsed as JSON when it
/// parses; otherwise it is compared as a JSON string.
fn json_equal(left: &Value, right: &str) -> bool {
    let right_value: Value = serde_json::from_str(right)
        .unwrap_or_else(|_| Value::String(right.to_string()));
    *left == right_value
}

fn str_test<F: FnOnce(&str) -> bool>(left: &Value, test: F) -> bool {
    match left.as_str() {
        Some(s) => test(s),
        None => false,
    }
}
