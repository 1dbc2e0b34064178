use base64::Engine;

use convoy_api::{DecodeError, Event, RawRecord};

/// Converts a raw stream record into a structured event.
///
/// The payload must be a base64 container around a flat JSON object of
/// scalar fields (string/number/bool) carrying a string `timestamp`.
/// Decode failures never propagate past the accumulator — the caller logs
/// and drops the record.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordDecoder;

impl RecordDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, raw: &RawRecord) -> Result<Event, DecodeError> {
        let payload = base64::engine::general_purpose::STANDARD.decode(&raw.data)?;
        let value: serde_json::Value = serde_json::from_slice(&payload)?;

        let serde_json::Value::Object(fields) = value else {
            return Err(DecodeError::NotAnObject);
        };

        for (name, field) in &fields {
            if !(field.is_string() || field.is_number() || field.is_boolean()) {
                return Err(DecodeError::NonScalarField { field: name.clone() });
            }
        }

        if fields.get("timestamp").and_then(|v| v.as_str()).is_none() {
            return Err(DecodeError::MissingTimestamp);
        }

        Ok(Event {
            partition_key: raw.partition_key.clone(),
            sequence: raw.sequence.clone(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn raw(payload: &[u8]) -> RawRecord {
        RawRecord {
            partition_key: "3".into(),
            sequence: "00000000000000000042".into(),
            data: base64::engine::general_purpose::STANDARD
                .encode(payload)
                .into_bytes(),
        }
    }

    #[test]
    fn test_decode_valid_payload() {
        let record = raw(br#"{"truck_id":"TRUCK_003","timestamp":"2026-08-30 12:00:00","speed":88.5,"urgent":false}"#);
        let event = RecordDecoder::new().decode(&record).unwrap();
        assert_eq!(event.partition_key, "3");
        assert_eq!(event.sequence, "00000000000000000042");
        assert_eq!(event.timestamp(), Some("2026-08-30 12:00:00"));
        assert_eq!(event.fields["speed"], 88.5);
    }

    #[test]
    fn test_decode_bad_base64() {
        let record = RawRecord {
            partition_key: "1".into(),
            sequence: "1".into(),
            data: b"not-base64!!!".to_vec(),
        };
        assert!(matches!(
            RecordDecoder::new().decode(&record),
            Err(DecodeError::Transport(_))
        ));
    }

    #[test]
    fn test_decode_bad_json() {
        assert!(matches!(
            RecordDecoder::new().decode(&raw(b"{truncated")),
            Err(DecodeError::Payload(_))
        ));
    }

    #[test]
    fn test_decode_non_object() {
        assert!(matches!(
            RecordDecoder::new().decode(&raw(b"[1,2,3]")),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn test_decode_non_scalar_field() {
        let record = raw(br#"{"timestamp":"t","tires":[28.0,29.1]}"#);
        match RecordDecoder::new().decode(&record) {
            Err(DecodeError::NonScalarField { field }) => assert_eq!(field, "tires"),
            other => panic!("expected NonScalarField, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_missing_timestamp() {
        assert!(matches!(
            RecordDecoder::new().decode(&raw(br#"{"speed":10}"#)),
            Err(DecodeError::MissingTimestamp)
        ));
    }
}
