//! Producer-to-consumer hand-off payloads.
//!
//! The producer publishes `{"Instance": .., "FailsafeSnapshotID": ..}`. The
//! consumer receives it wrapped in a batch of notification records whose
//! message body is itself a JSON-encoded string.

use serde::{Deserialize, Serialize};

use crate::error::{FailsafeError, FailsafeResult};

/// Event source tag of records delivered by the pub/sub transport.
pub const SNS_EVENT_SOURCE: &str = "aws:sns";

/// Announces that a promoted snapshot is shared and ready to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationNotice {
    #[serde(rename = "Instance")]
    pub instance: String,
    #[serde(rename = "FailsafeSnapshotID")]
    pub snapshot_id: String,
}

impl ReplicationNotice {
    pub fn new(instance: impl Into<String>, snapshot_id: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            snapshot_id: snapshot_id.into(),
        }
    }

    pub fn to_json(&self) -> FailsafeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a message body and rejects empty fields.
    pub fn from_message(message: &str) -> FailsafeResult<Self> {
        let notice: ReplicationNotice = serde_json::from_str(message)?;
        if notice.instance.is_empty() || notice.snapshot_id.is_empty() {
            return Err(FailsafeError::DeserializationError(
                "Instance and FailsafeSnapshotID must both be provided".to_string(),
            ));
        }
        Ok(notice)
    }

    /// Decodes an inbound record batch.
    ///
    /// Records from other event sources, or with an empty message, are
    /// skipped. Each remaining record yields its own result so one malformed
    /// message does not hide the others.
    ///
    /// # Errors
    ///
    /// `FailsafeError::DeserializationError` if the batch envelope itself is
    /// malformed.
    pub fn from_event(event: &str) -> FailsafeResult<Vec<FailsafeResult<Self>>> {
        let event: InboundEvent = serde_json::from_str(event)?;

        let notices = event
            .records
            .iter()
            .filter(|record| record.event_source == SNS_EVENT_SOURCE)
            .filter_map(|record| record.sns.as_ref())
            .filter(|sns| !sns.message.is_empty())
            .map(|sns| Self::from_message(&sns.message))
            .collect();

        Ok(notices)
    }
}

#[derive(Debug, Deserialize)]
struct InboundEvent {
    #[serde(rename = "Records", default)]
    records: Vec<InboundRecord>,
}

#[derive(Debug, Deserialize)]
struct InboundRecord {
    #[serde(rename = "EventSource", default)]
    event_source: String,
    #[serde(rename = "Sns", default)]
    sns: Option<SnsEnvelope>,
}

#[derive(Debug, Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Message", default)]
    message: String,
}
