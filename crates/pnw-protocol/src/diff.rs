//! Generic field-level diffing between a stored row and an incoming record.
//!
//! The Entity Store's update semantics (§4.7) require exactly one emitted
//! event per changed field, and an SQL `UPDATE` touching exactly those
//! columns. Rather than hand-writing a comparison per struct — which drifts
//! the moment a field is added — both sides are serialized to
//! `serde_json::Value` maps and compared key by key (SPEC_FULL.md §4.7).

use serde::Serialize;
use serde_json::Value;

/// One changed field: its name, the value it held before, and the value it
/// should take now. The Entity Store's update event carries `old_value` as
/// its before-state payload (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Computes `{field: (old, new) for field, new in incoming if stored[field] != new}`.
///
/// Both `stored` and `incoming` must serialize to a JSON object; fields
/// present only in one side (schema drift) are ignored rather than treated
/// as changes, since the store only ever mutates columns both sides define.
pub fn diff_fields<T: Serialize>(stored: &T, incoming: &T) -> Vec<FieldChange> {
    let stored = serde_json::to_value(stored).expect("entity always serializes to an object");
    let incoming = serde_json::to_value(incoming).expect("entity always serializes to an object");

    let (Value::Object(stored), Value::Object(incoming)) = (stored, incoming) else {
        panic!("diff_fields requires struct types that serialize to JSON objects");
    };

    let mut changes = Vec::new();
    for (field, new_value) in &incoming {
        let old_value = stored.get(field).cloned().unwrap_or(Value::Null);
        if old_value != *new_value {
            changes.push(FieldChange { field: field.clone(), old_value, new_value: new_value.clone() });
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Row {
        id: i64,
        score: f64,
        soldiers: i64,
        name: String,
    }

    #[test]
    fn diff_is_minimal_and_exact() {
        let before = Row { id: 10, score: 50.0, soldiers: 0, name: "Foo".to_owned() };
        let after = Row { id: 10, score: 60.0, soldiers: 1000, name: "Foo".to_owned() };

        let mut changes = diff_fields(&before, &after);
        changes.sort_by(|a, b| a.field.cmp(&b.field));

        let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["score", "soldiers"]);
    }

    #[test]
    fn identical_rows_produce_no_changes() {
        let row = Row { id: 1, score: 1.0, soldiers: 1, name: "A".to_owned() };
        assert!(diff_fields(&row, &row).is_empty());
    }
}
