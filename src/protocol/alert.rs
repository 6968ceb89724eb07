//! Alert message decoding
//!
//! Queue payloads are UTF-8 JSON objects with the required string fields
//! `email`, `subject` and `body`. Unknown fields are ignored.

use crate::error::DecodeError;
use crate::mail::is_valid_address;
use serde::{Deserialize, Serialize};

/// One unit of work read from the alert queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    #[serde(rename = "email")]
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Wire shape with every field optional so missing fields can be named
#[derive(Debug, Deserialize)]
struct RawAlert {
    email: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

impl AlertMessage {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Decode an opaque queue payload into a validated alert
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
        let raw: RawAlert =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        let recipient = raw.email.ok_or(DecodeError::MissingField("email"))?;
        let subject = raw.subject.ok_or(DecodeError::MissingField("subject"))?;
        let body = raw.body.ok_or(DecodeError::MissingField("body"))?;

        if !is_valid_address(&recipient) {
            return Err(DecodeError::InvalidRecipient(recipient));
        }

        Ok(Self {
            recipient,
            subject,
            body,
        })
    }

    /// Encode as a queue payload, the inverse of [`AlertMessage::decode`]
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_storm_warning() {
        let payload =
            br#"{"email":"a@b.com","subject":"Storm Warning","body":"Severe weather approaching"}"#;

        let alert = AlertMessage::decode(payload).unwrap();

        assert_eq!(alert.recipient, "a@b.com");
        assert_eq!(alert.subject, "Storm Warning");
        assert_eq!(alert.body, "Severe weather approaching");
    }

    #[test]
    fn test_ignores_unknown_fields() {
        let payload = br#"{"email":"ops@example.com","subject":"s","body":"b","userId":42,"type":"windSpeed"}"#;
        assert!(AlertMessage::decode(payload).is_ok());
    }

    #[test]
    fn test_rejects_non_json() {
        let result = AlertMessage::decode(b"not json at all");
        assert!(matches!(result, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_rejects_non_utf8() {
        let result = AlertMessage::decode(&[0xff, 0xfe, 0x00]);
        assert_eq!(result, Err(DecodeError::NotUtf8));
    }

    #[test]
    fn test_rejects_json_that_is_not_an_object() {
        assert!(matches!(
            AlertMessage::decode(b"[1,2,3]"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(
            AlertMessage::decode(b"\"a@b.com\""),
            Err(DecodeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_names_each_missing_field() {
        assert_eq!(
            AlertMessage::decode(br#"{"subject":"s","body":"b"}"#),
            Err(DecodeError::MissingField("email"))
        );
        assert_eq!(
            AlertMessage::decode(br#"{"email":"a@b.com","body":"b"}"#),
            Err(DecodeError::MissingField("subject"))
        );
        assert_eq!(
            AlertMessage::decode(br#"{"email":"a@b.com","subject":"s"}"#),
            Err(DecodeError::MissingField("body"))
        );
    }

    #[test]
    fn test_null_field_counts_as_missing() {
        assert_eq!(
            AlertMessage::decode(br#"{"email":null,"subject":"s","body":"b"}"#),
            Err(DecodeError::MissingField("email"))
        );
    }

    #[test]
    fn test_wrong_field_type_is_invalid_json() {
        let result = AlertMessage::decode(br#"{"email":5,"subject":"s","body":"b"}"#);
        assert!(matches!(result, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_rejects_malformed_recipient() {
        let result = AlertMessage::decode(br#"{"email":"malformed","subject":"s","body":"b"}"#);
        assert_eq!(
            result,
            Err(DecodeError::InvalidRecipient("malformed".to_string()))
        );
    }

    #[test]
    fn test_payload_uses_wire_field_names() {
        let alert = AlertMessage::new("a@b.com", "Heads up", "Rain expected");
        let json: serde_json::Value =
            serde_json::from_slice(&alert.to_payload().unwrap()).unwrap();

        assert_eq!(json["email"], "a@b.com");
        assert_eq!(json["subject"], "Heads up");
        assert_eq!(json["body"], "Rain expected");
        assert!(json.get("recipient").is_none());
    }
}
