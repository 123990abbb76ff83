use async_trait::async_trait;
use tracing::warn;

use crate::application::ports::{AlertChannel, DeliveryError};
use crate::domain::{AlertMessage, DeliveryReceipt};

/// Fan-out to several channels. One channel failing does not stop the
/// others; the send fails only when every channel failed.
pub struct MultiAlertChannel {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl MultiAlertChannel {
    pub fn new(channels: Vec<Box<dyn AlertChannel>>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl AlertChannel for MultiAlertChannel {
    async fn send(&self, message: &AlertMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let mut receipt = None;
        let mut last_err = None;

        for channel in &self.channels {
            match channel.send(message).await {
                Ok(r) => receipt = receipt.or(Some(r)),
                Err(e) => {
                    warn!(error = %e, "alert channel failed");
                    last_err = Some(e);
                }
            }
        }

        match receipt {
            Some(r) => Ok(r),
            None => Err(last_err
                .unwrap_or_else(|| DeliveryError("no alert channels configured".into()))),
        }
    }
}
