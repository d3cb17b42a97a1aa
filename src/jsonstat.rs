//! Flattening of Eurostat JSON-stat 2.0 bodies into (period label, value) pairs.
//!
//! Only the time dimension is decoded: the request filters are expected to pin every other
//! dimension to a single category, so the flat value ordinal equals the time ordinal.

use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub period: String,
    pub value: f64,
}

/// Parse a response body. Any structural problem yields an empty vector, never an error.
pub fn parse_body(body: &[u8]) -> Vec<RawObservation> {
    match serde_json::from_slice::<Value>(body) {
        Ok(json) => parse_value(&json),
        Err(_) => Vec::new(),
    }
}

pub fn parse_value(json: &Value) -> Vec<RawObservation> {
    let Some(index) = json
        .get("dimension")
        .and_then(|d| d.get("time"))
        .and_then(|t| t.get("category"))
        .and_then(|c| c.get("index"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };
    let Some(values) = json.get("value") else {
        return Vec::new();
    };

    warn_on_unpinned_dimensions(json);

    // label -> ordinal, inverted
    let by_ordinal: HashMap<u64, &str> = index
        .iter()
        .filter_map(|(label, ord)| ord.as_u64().map(|o| (o, label.as_str())))
        .collect();

    let mut out = Vec::new();
    let mut push = |ordinal: u64, v: &Value| {
        if let (Some(label), Some(value)) = (by_ordinal.get(&ordinal), numeric(v)) {
            out.push(RawObservation { period: label.to_string(), value });
        }
    };

    match values {
        // sparse form: {"0": 1.2, "5": 3.4}
        Value::Object(map) => {
            for (k, v) in map {
                if let Ok(ordinal) = k.trim().parse::<u64>() {
                    push(ordinal, v);
                }
            }
        }
        // dense form: [1.2, null, 3.4]
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                push(i as u64, v);
            }
        }
        _ => {}
    }

    out
}

fn numeric(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    x.is_finite().then_some(x)
}

fn warn_on_unpinned_dimensions(json: &Value) {
    let (Some(ids), Some(sizes)) = (
        json.get("id").and_then(Value::as_array),
        json.get("size").and_then(Value::as_array),
    ) else {
        return;
    };
    for (id, size) in ids.iter().zip(sizes) {
        let (Some(id), Some(size)) = (id.as_str(), size.as_u64()) else {
            continue;
        };
        if id != "time" && size > 1 {
            warn!(dimension = id, categories = size, "dimension not pinned by filters; series will mix categories");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const BODY: &str = r#"{
        "version": "2.0",
        "class": "dataset",
        "id": ["freq", "unit", "geo", "time"],
        "size": [1, 1, 1, 3],
        "dimension": {
            "time": {"category": {"index": {"2024-01": 0, "2024-02": 1, "2024-03": 2}}}
        },
        "value": {"0": 100.0, "2": "102.5", "7": 9.9}
    }"#;

    #[test]
    fn maps_ordinals_to_labels() {
        let mut rows = parse_body(BODY.as_bytes());
        rows.sort_by(|a, b| a.period.cmp(&b.period));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period, "2024-01");
        assert_relative_eq!(rows[0].value, 100.0);
        assert_eq!(rows[1].period, "2024-03");
        assert_relative_eq!(rows[1].value, 102.5);
    }

    #[test]
    fn dense_value_arrays_are_supported() {
        let body = r#"{
            "dimension": {"time": {"category": {"index": {"2020": 0, "2021": 1}}}},
            "value": [null, 4.5]
        }"#;
        let rows = parse_body(body.as_bytes());
        assert_eq!(rows, vec![RawObservation { period: "2021".into(), value: 4.5 }]);
    }

    #[test]
    fn missing_keys_give_empty_result() {
        for body in [
            "",
            "[]",
            "not json",
            r#"{"value": {"0": 1}}"#,
            r#"{"dimension": {"time": {"category": {"index": {"2024": 0}}}}}"#,
            r#"{"dimension": {"time": {"category": {}}}, "value": {"0": 1}}"#,
            r#"{"error": {"status": 404, "label": "not found"}}"#,
        ] {
            assert!(parse_body(body.as_bytes()).is_empty(), "body: {}", body);
        }
    }

    #[test]
    fn non_numeric_values_are_dropped() {
        let body = r#"{
            "dimension": {"time": {"category": {"index": {"2024": 0, "2025": 1, "2026": 2}}}},
            "value": {"0": ":", "1": null, "x": 3.0, "2": 7}
        }"#;
        let rows = parse_body(body.as_bytes());
        assert_eq!(rows, vec![RawObservation { period: "2026".into(), value: 7.0 }]);
    }
}
