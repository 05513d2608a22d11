use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client;

use failsafe_core::{FailsafeError, FailsafeResult, NotificationTransport, ReplicationNotice};

/// Publishes notices to an SNS topic.
///
/// Messages use the JSON message structure, so the body is wrapped as
/// `{"default": "<notice json>"}` and subscribers receive the inner string.
#[derive(Clone)]
pub struct SnsTransport {
    client: Client,
    topic_arn: String,
}

impl SnsTransport {
    pub async fn new(region: &str, topic_arn: impl Into<String>) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self::from_client(Client::new(&aws_config), topic_arn)
    }

    pub fn from_client(client: Client, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }
}

/// Wraps a notice in the JSON message-structure envelope.
pub(crate) fn envelope(notice: &ReplicationNotice) -> FailsafeResult<String> {
    let body = notice.to_json()?;
    Ok(serde_json::json!({ "default": body }).to_string())
}

#[async_trait]
impl NotificationTransport for SnsTransport {
    async fn publish(&self, notice: &ReplicationNotice) -> FailsafeResult<()> {
        let message = envelope(notice)?;

        let output = self
            .client
            .publish()
            .target_arn(&self.topic_arn)
            .message(message)
            .message_structure("json")
            .send()
            .await
            .map_err(|e| {
                FailsafeError::transport(format!(
                    "SNS publish to {} failed: {}",
                    self.topic_arn,
                    DisplayErrorContext(&e)
                ))
            })?;

        tracing::debug!(
            topic_arn = %self.topic_arn,
            message_id = output.message_id().unwrap_or_default(),
            "Published replication notice"
        );

        Ok(())
    }
}
