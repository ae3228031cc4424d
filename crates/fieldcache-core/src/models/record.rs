use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record stored offline. `program_id` is the collection key; the payload is
/// kept exactly as the server sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "programId")]
    pub program_id: i64,
    pub payload: Value,
}

impl Record {
    pub fn new(id: impl Into<String>, program_id: i64, payload: Value) -> Self {
        Self {
            id: id.into(),
            program_id,
            payload,
        }
    }

    /// Build a record from a server object, taking its id from `id` or
    /// `referenceId`. Returns `None` when neither is a usable scalar.
    pub fn from_server(program_id: i64, payload: Value) -> Option<Self> {
        let id = ["id", "referenceId"]
            .iter()
            .filter_map(|key| payload.get(key))
            .find_map(scalar_id)?;
        Some(Self::new(id, program_id, payload))
    }
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_server_numeric_id() {
        let record = Record::from_server(4, json!({"id": 12, "name": "A"})).unwrap();
        assert_eq!(record.id, "12");
        assert_eq!(record.program_id, 4);
        assert_eq!(record.payload["name"], "A");
    }

    #[test]
    fn test_from_server_reference_id() {
        let record = Record::from_server(4, json!({"referenceId": "ref-1"})).unwrap();
        assert_eq!(record.id, "ref-1");
    }

    #[test]
    fn test_from_server_prefers_id() {
        let record = Record::from_server(4, json!({"id": 1, "referenceId": "ref-1"})).unwrap();
        assert_eq!(record.id, "1");
    }

    #[test]
    fn test_from_server_without_id() {
        assert!(Record::from_server(4, json!({"name": "nobody"})).is_none());
        assert!(Record::from_server(4, json!({"id": null, "referenceId": ""})).is_none());
        assert!(Record::from_server(4, json!("not an object")).is_none());
    }
}
