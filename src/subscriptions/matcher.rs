//! Recursive parameter-tree matcher (spec §4.8), applied after contract +
//! event name + block-range filtering has already narrowed candidates.

use serde_json::Value;

/// `pattern` is the subscription's declared parameter tree; `actual` is the
/// event's parameters. Missing subscription keys default to match-anything.
pub fn matches(pattern: &Value, actual: &Value) -> bool {
    match pattern {
        Value::String(s) if s == "*" => true,
        Value::Object(pattern_obj) => {
            let Value::Object(actual_obj) = actual else {
                return false;
            };
            pattern_obj
                .iter()
                .all(|(key, sub_pattern)| match actual_obj.get(key) {
                    Some(sub_actual) => matches(sub_pattern, sub_actual),
                    None => false,
                })
        }
        Value::Array(pattern_arr) => {
            let Value::Array(actual_arr) = actual else {
                return false;
            };
            pattern_arr
                .iter()
                .all(|wanted| actual_arr.iter().any(|got| matches(wanted, got)))
        }
        literal => canonicalize(literal) == canonicalize(actual),
    }
}

/// String-equals after canonicalization: numbers and strings that represent
/// the same value compare equal (e.g. `1` and `"1"`).
fn canonicalize(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_matches_anything() {
        assert!(matches(&json!("*"), &json!({"anything": true})));
        assert!(matches(&json!("*"), &json!(42)));
    }

    #[test]
    fn literal_matches_after_canonicalization() {
        assert!(matches(&json!("1"), &json!(1)));
        assert!(!matches(&json!("1"), &json!(2)));
    }

    #[test]
    fn object_requires_every_pattern_key_present() {
        let pattern = json!({"from": "*", "amount": "100"});
        assert!(matches(&pattern, &json!({"from": "alice", "amount": 100, "extra": true})));
        assert!(!matches(&pattern, &json!({"from": "alice"})));
    }

    #[test]
    fn array_requires_every_pattern_element_present() {
        let pattern = json!(["a", "b"]);
        assert!(matches(&pattern, &json!(["a", "b", "c"])));
        assert!(!matches(&pattern, &json!(["a"])));
    }

    #[test]
    fn missing_subscription_key_is_not_a_constraint() {
        // An empty pattern object imposes no constraints at all.
        assert!(matches(&json!({}), &json!({"from": "alice"})));
    }
}
