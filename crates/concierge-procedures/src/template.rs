use std::collections::HashMap;

use serde_json::Value;

/// Interpolates `{{path.to.var}}` placeholders against `variables`, walking
/// dot-segments. Unresolved placeholders are left literal (§4.3).
pub fn interpolate(template: &str, variables: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                match resolve(path, variables) {
                    Some(value) => out.push_str(&value_to_string(&value)),
                    None => {
                        out.push_str("{{");
                        out.push_str(path);
                        out.push_str("}}");
                    }
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve(path: &str, variables: &HashMap<String, Value>) -> Option<Value> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    let mut current = variables.get(root)?.clone();
    for segment in segments {
        current = current.get(segment)?.clone();
    }
    Some(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

const OPERATORS: &[&str] = &[">=", "<=", "==", "!=", ">", "<"];

/// Evaluates `left OP right`, interpolating both sides first. Numeric
/// comparison when both sides parse as numbers, otherwise string comparison
/// (only `==`/`!=` meaningful for strings). Malformed expressions are false.
pub fn eval_condition(expr: &str, variables: &HashMap<String, Value>) -> bool {
    for op in OPERATORS {
        if let Some(idx) = expr.find(op) {
            let left = interpolate(expr[..idx].trim(), variables);
            let right = interpolate(expr[idx + op.len()..].trim(), variables);
            return compare(&left, &right, op);
        }
    }
    false
}

fn compare(left: &str, right: &str, op: &str) -> bool {
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        return match op {
            ">" => l > r,
            "<" => l < r,
            ">=" => l >= r,
            "<=" => l <= r,
            "==" => l == r,
            "!=" => l != r,
            _ => false,
        };
    }
    match op {
        "==" => left == right,
        "!=" => left != right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn interpolates_top_level_variable() {
        let v = vars(&[("name", Value::String("Ada".into()))]);
        assert_eq!(interpolate("hello {{name}}", &v), "hello Ada");
    }

    #[test]
    fn interpolates_nested_path() {
        let v = vars(&[("order", serde_json::json!({"total": 42}))]);
        assert_eq!(interpolate("total: {{order.total}}", &v), "total: 42");
    }

    #[test]
    fn unresolved_placeholder_left_literal() {
        let v = HashMap::new();
        assert_eq!(interpolate("hi {{missing}}", &v), "hi {{missing}}");
    }

    #[test]
    fn numeric_condition_compares_as_numbers() {
        let v = vars(&[("total", serde_json::json!(100))]);
        assert!(eval_condition("{{total}} > 50", &v));
        assert!(!eval_condition("{{total}} < 50", &v));
    }

    #[test]
    fn string_condition_only_supports_equality() {
        let v = vars(&[("status", Value::String("gold".into()))]);
        assert!(eval_condition("{{status}} == gold", &v));
        assert!(!eval_condition("{{status}} > gold", &v));
    }

    #[test]
    fn malformed_expression_is_false() {
        let v = HashMap::new();
        assert!(!eval_condition("no operator here", &v));
    }
}
