//! JSON encoding of job bodies.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::consumer::QueueMessage;
use crate::error::QueueError;

/// Serialize a job into a message body.
pub fn encode<T: Serialize>(job: &T) -> Result<String, QueueError> {
    serde_json::to_string(job).map_err(|e| QueueError::Encode(e.to_string()))
}

/// Parse a message body back into a job.
pub fn decode<T: DeserializeOwned>(msg: &QueueMessage) -> Result<T, QueueError> {
    serde_json::from_str(&msg.body)
        .map_err(|e| QueueError::Parse(format!("Invalid JSON in message {}: {}", msg.id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Job {
        system: String,
        attempts: u32,
    }

    fn message(body: &str) -> QueueMessage {
        QueueMessage {
            id: "msg-1".to_string(),
            body: body.to_string(),
            receipt_handle: "h".to_string(),
            timestamp: Utc::now(),
            attempt_count: 1,
        }
    }

    #[test]
    fn decode_encoded_job() {
        let job = Job {
            system: "dbi".to_string(),
            attempts: 2,
        };
        let body = encode(&job).unwrap();
        let decoded: Job = decode(&message(&body)).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = decode::<Job>(&message("not json")).unwrap_err();
        assert!(matches!(err, QueueError::Parse(ref m) if m.contains("msg-1")));
    }
}
