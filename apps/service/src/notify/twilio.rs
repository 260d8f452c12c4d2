use async_trait::async_trait;
use reqwest::Client;

use super::{Notifier, NotifyError};

const MAX_MESSAGE_LENGTH: usize = 1600;
const PHONE_DIGITS: usize = 10;

/// Twilio account settings
#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
    /// Prefix for the 10-digit owner phone, e.g. `+1`
    pub country_code: String,
    pub api_base: String,
}

/// Sends alerts as SMS through the Twilio Messages API
pub struct TwilioNotifier {
    client: Client,
    settings: TwilioSettings,
}

impl TwilioNotifier {
    pub fn new(settings: TwilioSettings) -> Self {
        Self { client: Client::new(), settings }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.account_sid
        )
    }
}

fn validate_phone(phone: &str) -> Result<&str, NotifyError> {
    let phone = phone.trim();
    if phone.len() == PHONE_DIGITS && phone.chars().all(|c| c.is_ascii_digit()) {
        Ok(phone)
    } else {
        Err(NotifyError::InvalidRecipient(format!("`{phone}` is not a {PHONE_DIGITS}-digit phone number")))
    }
}

fn validate_message(message: &str) -> Result<&str, NotifyError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(NotifyError::InvalidMessage("message is empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(NotifyError::InvalidMessage(format!(
            "message must be at most {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(message)
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        let phone = validate_phone(recipient)?;
        let body = validate_message(message)?;
        let to = format!("{}{}", self.settings.country_code, phone);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&[("From", self.settings.from_phone.as_str()), ("To", to.as_str()), ("Body", body)])
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 => Ok(()),
            status => Err(NotifyError::Rejected(status)),
        }
    }
}
