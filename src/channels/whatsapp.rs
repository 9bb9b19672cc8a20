//! WhatsApp delivery via the Twilio REST API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::channels::{MAX_BODY_LENGTH, OutboundChannel, split_body};
use crate::config::TwilioConfig;
use crate::error::ChannelError;

/// Twilio-backed WhatsApp channel. Without credentials it logs outbound
/// messages instead of sending them (local development mode).
pub struct WhatsAppChannel {
    client: reqwest::Client,
    config: Option<TwilioConfig>,
}

impl WhatsAppChannel {
    pub fn new(config: Option<TwilioConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn messages_url(account_sid: &str) -> String {
        format!("https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json")
    }

    /// Prefix a number with `whatsapp:` unless already present.
    fn whatsapp_address(number: &str) -> String {
        if number.starts_with("whatsapp:") {
            number.to_string()
        } else {
            format!("whatsapp:{number}")
        }
    }

    async fn send_chunk(
        &self,
        config: &TwilioConfig,
        to: &str,
        body: &str,
    ) -> Result<(), ChannelError> {
        let form = [
            ("From", Self::whatsapp_address(&config.from_number)),
            ("To", Self::whatsapp_address(to)),
            ("Body", body.to_string()),
        ];

        let resp = self
            .client
            .post(Self::messages_url(&config.account_sid))
            .basic_auth(&config.account_sid, Some(config.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                to: to.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                to: to.to_string(),
                reason: format!("{status}: {detail}"),
            });
        }

        debug!(to, "WhatsApp chunk sent");
        Ok(())
    }
}

#[async_trait]
impl OutboundChannel for WhatsAppChannel {
    async fn send(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let Some(config) = &self.config else {
            info!(to, "WHATSAPP_DEBUG:\n{body}");
            return Ok(());
        };

        for chunk in split_body(body, MAX_BODY_LENGTH) {
            self.send_chunk(config, to, &chunk).await?;
        }
        Ok(())
    }
}
