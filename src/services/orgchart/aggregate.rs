//! Aggregate operators (§4.8 `aggregate`). Always operate on
//! `step_{i-1}_result`, required to be a JSON array.

use serde_json::Value;
use std::collections::HashMap;

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::models::AggregateMethod;

pub fn aggregate(method: AggregateMethod, elements: &[Value]) -> ConclaveResult<Value> {
    match method {
        AggregateMethod::Consensus => Ok(consensus(elements)),
        AggregateMethod::Majority => Ok(majority(elements)),
        AggregateMethod::Merge => Ok(merge(elements)),
        AggregateMethod::Best => Ok(best(elements)),
    }
}

/// Modal element; ties broken by first-seen (Open Question #1 — see
/// DESIGN.md: "first-to-reach wins").
fn consensus(elements: &[Value]) -> Value {
    majority_like(elements, 1).unwrap_or(Value::Null)
}

/// First element whose running occurrence count reaches `ceil(n/2)`.
fn majority(elements: &[Value]) -> Value {
    let threshold = elements.len().div_ceil(2).max(1);
    majority_like(elements, threshold).unwrap_or(Value::Null)
}

fn majority_like(elements: &[Value], threshold: usize) -> Option<Value> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for element in elements {
        let key = element.to_string();
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        if *count >= threshold {
            return Some(element.clone());
        }
    }
    if threshold <= 1 {
        // consensus: fall back to the most frequent even if nothing hit 1 early
        return elements
            .iter()
            .max_by_key(|e| counts.get(&e.to_string()).copied().unwrap_or(0))
            .cloned();
    }
    None
}

fn merge(elements: &[Value]) -> Value {
    if elements.is_empty() || !elements.iter().all(Value::is_object) {
        return Value::Array(elements.to_vec());
    }
    let mut merged = serde_json::Map::new();
    for element in elements {
        if let Some(obj) = element.as_object() {
            for (k, v) in obj {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(merged)
}

fn best(elements: &[Value]) -> Value {
    elements
        .iter()
        .max_by(|a, b| confidence(a).partial_cmp(&confidence(b)).unwrap_or(std::cmp::Ordering::Equal))
        .cloned()
        .unwrap_or(Value::Null)
}

fn confidence(value: &Value) -> f64 {
    value
        .as_object()
        .and_then(|o| o.get("confidence"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Extracts the array operand for an `aggregate` step, failing with a
/// contract violation if the preceding result is not a list.
pub fn require_array(value: &Value) -> ConclaveResult<Vec<Value>> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| ConclaveError::StepFailed("aggregate requires a list operand".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_picks_modal_value() {
        let elements = vec![
            serde_json::json!("A"),
            serde_json::json!("A"),
            serde_json::json!("B"),
        ];
        assert_eq!(aggregate(AggregateMethod::Consensus, &elements).unwrap(), serde_json::json!("A"));
    }

    #[test]
    fn majority_requires_ceiling_half_threshold() {
        let elements = vec![serde_json::json!("A"), serde_json::json!("B"), serde_json::json!("B")];
        assert_eq!(aggregate(AggregateMethod::Majority, &elements).unwrap(), serde_json::json!("B"));
    }

    #[test]
    fn majority_returns_null_when_no_element_reaches_threshold() {
        let elements = vec![serde_json::json!("A"), serde_json::json!("B"), serde_json::json!("C")];
        assert_eq!(aggregate(AggregateMethod::Majority, &elements).unwrap(), Value::Null);
    }

    #[test]
    fn merge_prefers_later_objects() {
        let elements = vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2, "b": 3})];
        assert_eq!(
            aggregate(AggregateMethod::Merge, &elements).unwrap(),
            serde_json::json!({"a": 2, "b": 3})
        );
    }

    #[test]
    fn best_picks_highest_confidence_defaulting_to_zero() {
        let elements = vec![
            serde_json::json!({"v": "x"}),
            serde_json::json!({"v": "y", "confidence": 0.9}),
        ];
        assert_eq!(
            aggregate(AggregateMethod::Best, &elements).unwrap(),
            serde_json::json!({"v": "y", "confidence": 0.9})
        );
    }
}
