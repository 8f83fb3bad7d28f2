use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Detection,
    Annotation,
    Meta,
}

/// Self-describing streamed record.
///
/// `event_id` and `timestamp` are only written by the daily live storage;
/// `profile` only accompanies annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub record_type: RecordType,
    pub algo: String,
    pub dialect: String,
    pub instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::time::iso_z::option"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub payload: Value,
}

impl Envelope {
    pub fn new(
        record_type: RecordType,
        algo: &str,
        dialect: &str,
        instance: &str,
        payload: Value,
    ) -> Self {
        Self {
            record_type,
            algo: algo.to_string(),
            dialect: dialect.to_string(),
            instance: instance.to_string(),
            event_id: None,
            timestamp: None,
            profile: None,
            payload,
        }
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_string());
        self
    }

    pub fn with_routing(mut self, event_id: Option<String>, timestamp: DateTime<Utc>) -> Self {
        self.event_id = event_id;
        self.timestamp = Some(timestamp);
        self
    }

    /// One JSON line, newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_envelope_shape() {
        let env = Envelope::new(RecordType::Annotation, "finder", "scfinder", "finder@a", json!({}))
            .with_profile("time_vs_magnitude");
        let v: Value = serde_json::from_str(env.to_line().unwrap().trim_end()).unwrap();
        assert_eq!(v["record_type"], "annotation");
        assert_eq!(v["profile"], "time_vs_magnitude");
        assert!(v.get("event_id").is_none());
        assert!(v.get("timestamp").is_none());
    }

    #[test]
    fn test_routing_fields() {
        let ts = crate::time::normalize_timestamp("2024-05-01 12:00:00").unwrap();
        let env = Envelope::new(RecordType::Meta, "vs", "scvsmag", "vs@a", json!({}))
            .with_routing(Some("E9".into()), ts);
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["event_id"], "E9");
        assert_eq!(v["timestamp"], "2024-05-01T12:00:00Z");
    }
}
