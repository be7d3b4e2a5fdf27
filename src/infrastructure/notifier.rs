use crate::domain::ports::Notifier;
use crate::domain::user::UserId;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Delivers notifications to the log. Stands in for a messaging provider.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: UserId, message: &str) -> Result<()> {
        info!(target: "notifications", recipient, message, "Notification sent");
        Ok(())
    }
}
