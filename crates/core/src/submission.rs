//! Persisted entities: form submissions and the external ids they collect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type SubmissionId = i64;

/// Raw submission payload: a loosely-structured string-keyed mapping.
pub type SubmissionData = Map<String, Value>;

/// A form submission as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub data: SubmissionData,
    pub created_at: DateTime<Utc>,
    /// Set once by the batch exporter, never cleared.
    pub csv_exported_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Keys from `required` that are absent, null, or blank strings in `data`.
    pub fn missing_keys<'a>(data: &SubmissionData, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|key| match data.get(key.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .map(String::as_str)
            .collect()
    }
}

/// Proof that a system accepted a submission. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDispatchRecord {
    pub id: i64,
    pub submission_id: SubmissionId,
    pub system_code: String,
    /// Identifier assigned by the external system.
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> SubmissionData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_keys_detects_absent_null_and_blank() {
        let required = vec!["block".to_string(), "lot".to_string(), "parcel".to_string()];
        let d = data(json!({"block": "  ", "lot": null, "parcel": 12}));
        assert_eq!(Submission::missing_keys(&d, &required), vec!["block", "lot"]);
    }

    #[test]
    fn complete_payload_has_no_missing_keys() {
        let required = vec!["block".to_string(), "lot".to_string()];
        let d = data(json!({"block": "1", "lot": "2", "first_name": "bob"}));
        assert!(Submission::missing_keys(&d, &required).is_empty());
    }
}
