//! Weather provider — OpenWeather current conditions + short-range forecast.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::ProviderError;

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Current conditions plus forecast, kept as raw JSON: the payloads are
/// only ever embedded into generation prompts.
#[derive(Debug, Clone)]
pub struct WeatherBundle {
    pub current: Value,
    pub forecast: Value,
}

impl WeatherBundle {
    /// Compact rendering for prompt context, capped so a verbose forecast
    /// cannot blow up the prompt.
    pub fn prompt_block(&self) -> String {
        let mut current = self.current.to_string();
        current.truncate(2000);
        let mut forecast = self.forecast.to_string();
        forecast.truncate(4000);
        format!("Current Weather: {current}\nForecast: {forecast}")
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_and_forecast(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<WeatherBundle, ProviderError>;

    /// Reverse-geocode to a place name. Best-effort.
    async fn city_name(&self, lat: f64, lon: f64) -> Option<String>;
}

pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }

    async fn fetch(&self, endpoint: &str, lat: f64, lon: f64) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .get(format!("{OPENWEATHER_BASE_URL}/{endpoint}"))
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: "openweather",
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ProviderError::RequestFailed {
                provider: "openweather",
                reason: format!("{endpoint} returned {}", resp.status()),
            });
        }

        resp.json().await.map_err(|e| ProviderError::InvalidResponse {
            provider: "openweather",
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current_and_forecast(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<WeatherBundle, ProviderError> {
        let current = self.fetch("weather", lat, lon).await?;
        let forecast = self.fetch("forecast", lat, lon).await?;
        Ok(WeatherBundle { current, forecast })
    }

    async fn city_name(&self, lat: f64, lon: f64) -> Option<String> {
        match self.fetch("weather", lat, lon).await {
            Ok(data) => data
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(String::from),
            Err(e) => {
                warn!("Reverse geocode failed: {e}");
                None
            }
        }
    }
}
