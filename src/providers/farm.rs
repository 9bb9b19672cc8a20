//! Farm platform client — the linked AgriTech internal API.
//!
//! Account lookup, field lists, satellite field-health analysis, crop
//! prediction, and agronomic weather metrics. Every call is best-effort:
//! failures are logged and surface as `None`/empty, never fatal to a turn.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::warn;

use crate::config::FarmApiConfig;
use crate::session::ExternalField;

/// Satellite calls run a full analysis pipeline server-side.
const SATELLITE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A linked platform account resolved from a phone number.
#[derive(Debug, Clone)]
pub struct LinkedAccount {
    pub id: String,
    pub name: Option<String>,
}

/// Result of a satellite field-health analysis.
#[derive(Debug, Clone)]
pub struct FieldHealthReport {
    pub health_score: Option<f64>,
    pub ndvi: Option<f64>,
    pub details: Value,
}

/// Result of a satellite crop prediction.
#[derive(Debug, Clone)]
pub struct CropForecast {
    pub crop: String,
    pub confidence: Option<f64>,
}

/// Agronomic metrics (soil moisture, evapotranspiration, ...) rendered
/// key-by-key into prompt context; kept as an open map.
pub type AgroMetrics = serde_json::Map<String, Value>;

#[async_trait]
pub trait FarmPlatform: Send + Sync {
    async fn lookup_account(&self, phone: &str) -> Option<LinkedAccount>;
    async fn fields_for_account(&self, account_id: &str) -> Vec<ExternalField>;
    async fn analyze_field_health(
        &self,
        lat: f64,
        lon: f64,
        field_name: &str,
    ) -> Option<FieldHealthReport>;
    async fn predict_crop(&self, lat: f64, lon: f64) -> Option<CropForecast>;
    async fn agricultural_weather(&self, lat: f64, lon: f64) -> Option<AgroMetrics>;
}

/// HTTP client for the AgriTech internal API. Unconfigured deployments
/// report every lookup as absent.
pub struct AgriTechClient {
    client: reqwest::Client,
    config: Option<FarmApiConfig>,
}

impl AgriTechClient {
    pub fn new(config: Option<FarmApiConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Option<Value> {
        let config = self.config.as_ref()?;
        let result = self
            .client
            .get(format!("{}{path}", config.base_url))
            .header("X-Internal-API-Key", config.api_key.expose_secret())
            .query(query)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(resp) => {
                if resp.status() != reqwest::StatusCode::NOT_FOUND {
                    warn!(path, status = %resp.status(), "Farm platform GET failed");
                }
                None
            }
            Err(e) => {
                warn!(path, "Farm platform GET error: {e}");
                None
            }
        }
    }

    async fn post(&self, path: &str, body: Value, timeout: Duration) -> Option<Value> {
        let config = self.config.as_ref()?;
        let result = self
            .client
            .post(format!("{}{path}", config.base_url))
            .header("X-Internal-API-Key", config.api_key.expose_secret())
            .json(&body)
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(resp) => {
                warn!(path, status = %resp.status(), "Farm platform POST failed");
                None
            }
            Err(e) => {
                warn!(path, "Farm platform POST error: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl FarmPlatform for AgriTechClient {
    async fn lookup_account(&self, phone: &str) -> Option<LinkedAccount> {
        let data = self
            .get(
                "/api/internal/user/by-phone",
                &[("phone", phone.to_string())],
            )
            .await?;
        let user = data.get("user")?;
        Some(LinkedAccount {
            id: user.get("id")?.as_str()?.to_string(),
            name: user
                .get("name")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    async fn fields_for_account(&self, account_id: &str) -> Vec<ExternalField> {
        let Some(data) = self
            .get(&format!("/api/internal/fields/{account_id}"), &[])
            .await
        else {
            return Vec::new();
        };
        data.get("fields")
            .cloned()
            .and_then(|fields| serde_json::from_value(fields).ok())
            .unwrap_or_default()
    }

    async fn analyze_field_health(
        &self,
        lat: f64,
        lon: f64,
        field_name: &str,
    ) -> Option<FieldHealthReport> {
        let details = self
            .post(
                "/api/internal/satellite/analyze",
                json!({
                    "latitude": lat,
                    "longitude": lon,
                    "field_name": field_name,
                }),
                SATELLITE_TIMEOUT,
            )
            .await?;

        Some(FieldHealthReport {
            health_score: details.get("healthScore").and_then(Value::as_f64),
            ndvi: details.get("ndvi").and_then(Value::as_f64),
            details,
        })
    }

    async fn predict_crop(&self, lat: f64, lon: f64) -> Option<CropForecast> {
        let data = self
            .post(
                "/api/internal/satellite/predict-crop",
                json!({"latitude": lat, "longitude": lon}),
                SATELLITE_TIMEOUT,
            )
            .await?;

        let crop = data
            .get("predictedCrop")
            .or_else(|| data.get("crop"))
            .and_then(Value::as_str)?
            .to_string();
        Some(CropForecast {
            crop,
            confidence: data.get("confidence").and_then(Value::as_f64),
        })
    }

    async fn agricultural_weather(&self, lat: f64, lon: f64) -> Option<AgroMetrics> {
        let data = self
            .get(
                "/api/internal/weather/agricultural",
                &[("lat", lat.to_string()), ("lon", lon.to_string())],
            )
            .await?;
        match data {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}
