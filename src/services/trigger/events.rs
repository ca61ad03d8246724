//! Event-filter grammar (§4.10 "Event"): `$eq`/`$ne`/`$gt`/`$gte`/`$lt`/
//! `$lte`/`$in`/`$nin`/`$exists`, operator-free values compared by direct
//! equality, nested fields addressed by dot-path.

use std::cmp::Ordering;

use serde_json::Value;

use crate::domain::models::{trigger::resolve_path, EventFilter, FilterOperators, FilterValue};

pub fn matches(filter: &EventFilter, payload: &Value) -> bool {
    filter.iter().all(|(field, expected)| {
        let actual = resolve_path(payload, field);
        matches_value(actual, expected)
    })
}

fn matches_value(actual: Option<&Value>, expected: &FilterValue) -> bool {
    match expected {
        FilterValue::Literal(value) => actual == Some(value),
        FilterValue::Operators(ops) => matches_operators(actual, ops),
    }
}

fn matches_operators(actual: Option<&Value>, ops: &FilterOperators) -> bool {
    if let Some(eq) = &ops.eq {
        if actual != Some(eq) {
            return false;
        }
    }
    if let Some(ne) = &ops.ne {
        if actual == Some(ne) {
            return false;
        }
    }
    if let Some(gt) = &ops.gt {
        if !compare(actual, gt, |o| o == Ordering::Greater) {
            return false;
        }
    }
    if let Some(gte) = &ops.gte {
        if !compare(actual, gte, |o| o != Ordering::Less) {
            return false;
        }
    }
    if let Some(lt) = &ops.lt {
        if !compare(actual, lt, |o| o == Ordering::Less) {
            return false;
        }
    }
    if let Some(lte) = &ops.lte {
        if !compare(actual, lte, |o| o != Ordering::Greater) {
            return false;
        }
    }
    if let Some(list) = &ops.r#in {
        if !actual.is_some_and(|v| list.contains(v)) {
            return false;
        }
    }
    if let Some(list) = &ops.nin {
        if actual.is_some_and(|v| list.contains(v)) {
            return false;
        }
    }
    if let Some(exists) = ops.exists {
        if actual.is_some() != exists {
            return false;
        }
    }
    true
}

fn compare(actual: Option<&Value>, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if let (Some(a), Some(t)) = (actual.and_then(Value::as_f64), target.as_f64()) {
        return a.partial_cmp(&t).is_some_and(&accept);
    }
    if let (Some(a), Some(t)) = (actual.and_then(Value::as_str), target.as_str()) {
        return accept(a.cmp(t));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn direct_equality_on_nested_field() {
        let mut filter: EventFilter = HashMap::new();
        filter.insert("user.role".to_string(), FilterValue::Literal(serde_json::json!("admin")));
        let payload = serde_json::json!({"user": {"role": "admin"}});
        assert!(matches(&filter, &payload));
    }

    #[test]
    fn gte_operator_excludes_lower_values() {
        let mut filter: EventFilter = HashMap::new();
        filter.insert(
            "score".to_string(),
            FilterValue::Operators(FilterOperators { gte: Some(serde_json::json!(10)), ..Default::default() }),
        );
        assert!(matches(&filter, &serde_json::json!({"score": 10})));
        assert!(!matches(&filter, &serde_json::json!({"score": 9})));
    }

    #[test]
    fn exists_false_requires_absent_field() {
        let mut filter: EventFilter = HashMap::new();
        filter.insert(
            "error".to_string(),
            FilterValue::Operators(FilterOperators { exists: Some(false), ..Default::default() }),
        );
        assert!(matches(&filter, &serde_json::json!({})));
        assert!(!matches(&filter, &serde_json::json!({"error": "x"})));
    }

    #[test]
    fn in_operator_matches_any_listed_value() {
        let mut filter: EventFilter = HashMap::new();
        filter.insert(
            "status".to_string(),
            FilterValue::Operators(FilterOperators {
                r#in: Some(vec![serde_json::json!("open"), serde_json::json!("pending")]),
                ..Default::default()
            }),
        );
        assert!(matches(&filter, &serde_json::json!({"status": "pending"})));
        assert!(!matches(&filter, &serde_json::json!({"status": "closed"})));
    }
}
