use async_trait::async_trait;

use crate::application::ports::{AlertChannel, DeliveryError};
use crate::domain::{AlertMessage, DeliveryReceipt};

pub struct ConsoleAlertChannel;

impl ConsoleAlertChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertChannel for ConsoleAlertChannel {
    async fn send(&self, message: &AlertMessage) -> Result<DeliveryReceipt, DeliveryError> {
        println!(
            "ALERT to={} from={}\n{}",
            message.destination, message.origin, message.body
        );
        Ok(DeliveryReceipt {
            id: "console".to_string(),
        })
    }
}
