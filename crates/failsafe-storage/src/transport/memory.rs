use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use failsafe_core::{FailsafeError, FailsafeResult, NotificationTransport, ReplicationNotice};

/// Records published notices in memory. Cloning shares the same log, so a
/// test can keep one handle while the workflow owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    published: Arc<RwLock<Vec<ReplicationNotice>>>,
    fail_with: Arc<RwLock<Option<String>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notice published so far, oldest first.
    pub fn published(&self) -> Vec<ReplicationNotice> {
        self.published.read().clone()
    }

    /// Make subsequent publishes fail with `message` (or succeed with `None`).
    pub fn set_failure(&self, message: Option<&str>) {
        *self.fail_with.write() = message.map(str::to_string);
    }

    /// Drains the log, as a consumer receiving the batch would.
    pub fn take(&self) -> Vec<ReplicationNotice> {
        std::mem::take(&mut *self.published.write())
    }
}

#[async_trait]
impl NotificationTransport for MemoryTransport {
    async fn publish(&self, notice: &ReplicationNotice) -> FailsafeResult<()> {
        if let Some(message) = self.fail_with.read().clone() {
            return Err(FailsafeError::transport(message));
        }
        self.published.write().push(notice.clone());
        Ok(())
    }
}
