//! Environment-driven configuration.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Twilio WhatsApp credentials.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender number, without the `whatsapp:` prefix.
    pub from_number: String,
}

/// Farm platform (AgriTech internal API) connection details.
#[derive(Debug, Clone)]
pub struct FarmApiConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

/// Application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub anthropic_api_key: SecretString,
    pub model: String,
    pub openweather_api_key: String,
    /// Missing credentials switch the outbound channel to debug logging.
    pub twilio: Option<TwilioConfig>,
    /// Missing key disables web search (market research degrades).
    pub brave_api_key: Option<String>,
    /// Missing config disables the farm platform (field flows degrade).
    pub farm_api: Option<FarmApiConfig>,
    pub db_path: String,
    pub port: u16,
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let twilio = match (
            std::env::var("TWILIO_ACCOUNT_SID").ok(),
            std::env::var("TWILIO_AUTH_TOKEN").ok(),
            std::env::var("TWILIO_PHONE_NUMBER").ok(),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token: SecretString::from(auth_token),
                from_number,
            }),
            _ => None,
        };

        let farm_api = match (
            std::env::var("AGRITECH_API_URL").ok(),
            std::env::var("AGRITECH_INTERNAL_API_KEY").ok(),
        ) {
            (Some(base_url), Some(api_key)) => Some(FarmApiConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: SecretString::from(api_key),
            }),
            _ => None,
        };

        let port: u16 = std::env::var("AGRI_ASSIST_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "AGRI_ASSIST_PORT".to_string(),
                message: format!("{e}"),
            })?;

        Ok(Self {
            anthropic_api_key: SecretString::from(required("ANTHROPIC_API_KEY")?),
            model: std::env::var("AGRI_ASSIST_MODEL")
                .unwrap_or_else(|_| "claude-3-haiku-20240307".to_string()),
            openweather_api_key: required("OPENWEATHER_API_KEY")?,
            twilio,
            brave_api_key: std::env::var("BRAVE_API_KEY").ok(),
            farm_api,
            db_path: std::env::var("AGRI_ASSIST_DB_PATH")
                .unwrap_or_else(|_| "./data/agri-assist.db".to_string()),
            port,
        })
    }
}
