use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{AlertChannel, DeliveryError};
use crate::domain::{AlertMessage, DeliveryReceipt};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Twilio-style SMS delivery over the Messages REST API.
pub struct SmsAlertChannel {
    client: reqwest::Client,
    endpoint: String,
    account_sid: String,
    auth_token: String,
}

impl SmsAlertChannel {
    pub const DEFAULT_API_BASE: &'static str = "https://api.twilio.com";

    pub fn new(api_base: &str, account_sid: String, auth_token: String) -> Self {
        let endpoint = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            api_base.trim_end_matches('/'),
            account_sid
        );
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("http client");
        Self {
            client,
            endpoint,
            account_sid,
            auth_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageResp {
    sid: String,
}

#[async_trait]
impl AlertChannel for SmsAlertChannel {
    async fn send(&self, message: &AlertMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let params = [
            ("To", message.destination.as_str()),
            ("From", message.origin.as_str()),
            ("Body", message.body.as_str()),
        ];

        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| DeliveryError(e.to_string()))?
            .error_for_status()
            .map_err(|e| DeliveryError(e.to_string()))?;

        let body: MessageResp = resp
            .json()
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;

        Ok(DeliveryReceipt { id: body.sid })
    }
}
