//! Task bodies. Every task converts its own failure into a user-facing
//! apology naming the task's subject; nothing propagates past this module.

use std::sync::Arc;

use base64::Engine;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{error, warn};

use crate::channels::OutboundChannel;
use crate::config::TwilioConfig;
use crate::enrichment;
use crate::error::{Error, ProviderError};
use crate::providers::farm::{FarmPlatform, FieldHealthReport};
use crate::providers::llm::{ImageData, TextGenerator, generate_structured};
use crate::providers::search::SearchProvider;
use crate::providers::translate::Translator;
use crate::providers::weather::WeatherProvider;
use crate::session::{ExternalField, Session, SessionStore};
use crate::tasks::{BackgroundTask, TaskKind};

/// Everything a task body may need. Cheap to clone per dispatch.
#[derive(Clone)]
pub struct TaskDeps {
    pub store: Arc<dyn SessionStore>,
    pub outbound: Arc<dyn OutboundChannel>,
    pub translator: Arc<dyn Translator>,
    pub llm: Arc<dyn TextGenerator>,
    pub weather: Arc<dyn WeatherProvider>,
    pub search: Arc<dyn SearchProvider>,
    pub farm: Arc<dyn FarmPlatform>,
    /// Media URLs on inbound messages are Twilio-hosted and need basic auth.
    pub twilio: Option<TwilioConfig>,
}

struct TaskOutcome {
    text: String,
    /// Market research already answers in the user's language.
    localize: bool,
}

impl TaskOutcome {
    fn localized(text: String) -> Self {
        Self {
            text,
            localize: true,
        }
    }
}

/// Run one task to completion and deliver its terminal message.
pub(crate) async fn run(deps: TaskDeps, task: BackgroundTask) {
    let session = match deps.store.get(&task.session_key).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            warn!(phone = %task.session_key, "Task for unknown session");
            Session::new(&task.session_key)
        }
        Err(e) => {
            warn!(phone = %task.session_key, "Session load failed for task: {e}");
            Session::new(&task.session_key)
        }
    };

    let kind_name = task.kind.name();
    let subject = task.kind.subject();
    let outcome = match execute(&deps, &session, task.kind).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(task = kind_name, phone = %session.phone, "Background task failed: {e}");
            TaskOutcome::localized(format!(
                "Sorry, I could not complete the {subject} right now. Please try again later."
            ))
        }
    };

    let text = if outcome.localize && session.language != "en" {
        deps.translator
            .translate(&outcome.text, &session.language, Some("en"))
            .await
    } else {
        outcome.text
    };

    if let Err(e) = deps.outbound.send(&session.phone, &text).await {
        error!(task = kind_name, phone = %session.phone, "Task result delivery failed: {e}");
    }
}

async fn execute(
    deps: &TaskDeps,
    session: &Session,
    kind: TaskKind,
) -> Result<TaskOutcome, Error> {
    match kind {
        TaskKind::WeatherReport => weather_report(deps, session).await,
        TaskKind::FarmingAdvice { query } => farming_advice(deps, session, &query).await,
        TaskKind::PestAnalysis { media_url } => pest_analysis(deps, &media_url).await,
        TaskKind::MarketResearch {
            crop,
            qty_tons,
            location,
        } => {
            let report = enrichment::market_research(
                deps.search.as_ref(),
                deps.llm.as_ref(),
                &crop,
                qty_tons,
                &location,
                &session.language,
            )
            .await?;
            Ok(TaskOutcome {
                text: report,
                localize: false,
            })
        }
        TaskKind::FieldHealth { field } => field_health(deps, &field).await,
        TaskKind::CropPrediction {
            latitude,
            longitude,
        } => crop_prediction(deps, latitude, longitude).await,
    }
}

async fn weather_report(deps: &TaskDeps, session: &Session) -> Result<TaskOutcome, Error> {
    let Some(location) = &session.location else {
        return Ok(TaskOutcome::localized(
            "I need your location to provide weather information. \
             Please share your location from the main menu."
                .to_string(),
        ));
    };

    let bundle = deps
        .weather
        .current_and_forecast(location.latitude, location.longitude)
        .await?;

    let mut profile = String::new();
    if !session.crops.is_empty() {
        profile.push_str(&format!("Farmer's crops: {}\n", session.crops.join(", ")));
    }
    if let Some(acres) = session.farm_size_acres {
        profile.push_str(&format!("Farm size: {acres} acres\n"));
    }

    let prompt = format!(
        "You are an agricultural assistant. Based on the following weather data \
         for {city}, provide a simple, actionable summary for a farmer. Include \
         today's weather and a brief 3-day forecast. Focus on what matters for \
         farming (rain, temperature, wind). Give specific advice tied to the \
         farmer's crops if known (irrigation, spraying, harvesting timing).\n\
         {profile}\n{weather}",
        city = location.city,
        weather = bundle.prompt_block(),
    );

    let text = deps.llm.generate(&prompt, 1024).await?;
    Ok(TaskOutcome::localized(text))
}

async fn farming_advice(
    deps: &TaskDeps,
    session: &Session,
    query: &str,
) -> Result<TaskOutcome, Error> {
    let context = enrichment::assemble(
        deps.farm.as_ref(),
        deps.weather.as_ref(),
        &session.phone,
        session.location.as_ref(),
    )
    .await;

    let location = session
        .location
        .as_ref()
        .map(|loc| loc.city.clone())
        .unwrap_or_else(|| "N/A".to_string());
    let crops = if session.crops.is_empty() {
        "N/A".to_string()
    } else {
        session.crops.join(", ")
    };

    let prompt = format!(
        "You are an expert agricultural assistant for Indian farmers. Your advice must be:\n\
         1. Specific to this farmer's actual fields and conditions — reference \
            field names, health scores, and NDVI values when relevant.\n\
         2. Weather-aware — factor current and forecasted weather into advice \
            on irrigation, spraying, and harvesting.\n\
         3. Low-cost and accessible — prioritize affordable, practical solutions.\n\
         4. Actionable — give clear steps the farmer can take right now.\n\n\
         If any field shows a health score below 60 or NDVI below 0.4, \
         proactively mention it and suggest corrective actions.\n\n\
         Farmer profile:\n\
         - Name: {name}\n\
         - Location: {location}\n\
         - Crops: {crops}\n\n\
         {context}\n\
         Farmer's question: \"{query}\"",
        name = session.name.as_deref().unwrap_or("N/A"),
        context = context.prompt_block(),
    );

    let text = deps.llm.generate(&prompt, 1024).await?;
    Ok(TaskOutcome::localized(text))
}

async fn pest_analysis(deps: &TaskDeps, media_url: &str) -> Result<TaskOutcome, Error> {
    let image = fetch_media(deps.twilio.as_ref(), media_url).await?;

    let prompt = "Analyze this image of a plant. Identify any visible pests or \
                  diseases. Provide a concise summary of the issue and suggest a \
                  low-cost, organic treatment plan. If no issue is visible, state \
                  that the plant appears healthy. Focus on practical advice for \
                  Indian farmers.";
    let text = deps.llm.generate_with_image(prompt, &image, 1024).await?;
    Ok(TaskOutcome::localized(text))
}

async fn fetch_media(
    twilio: Option<&TwilioConfig>,
    media_url: &str,
) -> Result<ImageData, ProviderError> {
    let client = reqwest::Client::new();
    let mut request = client.get(media_url);
    if let Some(config) = twilio {
        request = request.basic_auth(&config.account_sid, Some(config.auth_token.expose_secret()));
    }

    let resp = request
        .send()
        .await
        .map_err(|e| ProviderError::RequestFailed {
            provider: "media",
            reason: e.to_string(),
        })?;
    if !resp.status().is_success() {
        return Err(ProviderError::RequestFailed {
            provider: "media",
            reason: format!("status {}", resp.status()),
        });
    }

    let media_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = resp.bytes().await.map_err(|e| ProviderError::InvalidResponse {
        provider: "media",
        reason: e.to_string(),
    })?;

    Ok(ImageData {
        media_type,
        base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
    })
}

async fn field_health(deps: &TaskDeps, field: &ExternalField) -> Result<TaskOutcome, Error> {
    let Some(report) = deps
        .farm
        .analyze_field_health(field.latitude, field.longitude, &field.name)
        .await
    else {
        return Ok(TaskOutcome::localized(format!(
            "Satellite analysis for {} is not available right now. Please try again later.",
            field.name
        )));
    };

    let prompt = format!(
        "You are an agronomist. Interpret this satellite analysis of the field \
         '{name}' for a farmer with no technical background.\n\
         Analysis data: {details}\n\n\
         Respond ONLY with a JSON object of the form \
         {{\"summary\": \"one short paragraph\", \"actions\": [\"step\", ...]}}.",
        name = field.name,
        details = report.details,
    );
    let parsed = generate_structured(deps.llm.as_ref(), &prompt, 1024).await;

    Ok(TaskOutcome::localized(field_report_text(
        field, &report, &parsed,
    )))
}

fn field_report_text(field: &ExternalField, report: &FieldHealthReport, parsed: &Value) -> String {
    let mut text = format!("🛰️ *Field Report: {}*\n", field.name);
    if let Some(score) = report.health_score {
        text.push_str(&format!("💚 Health Score: {score:.0}/100\n"));
    }
    if let Some(ndvi) = report.ndvi {
        text.push_str(&format!("🌱 NDVI: {ndvi:.3}\n"));
    }

    if let Some(summary) = parsed.get("summary").and_then(Value::as_str) {
        text.push('\n');
        text.push_str(summary);
        text.push('\n');
    }
    if let Some(actions) = parsed.get("actions").and_then(Value::as_array) {
        let steps: Vec<&str> = actions.iter().filter_map(Value::as_str).collect();
        if !steps.is_empty() {
            text.push_str("\n*What to do:*\n");
            for step in steps {
                text.push_str(&format!("• {step}\n"));
            }
        }
    }

    text.trim_end().to_string()
}

async fn crop_prediction(deps: &TaskDeps, lat: f64, lon: f64) -> Result<TaskOutcome, Error> {
    let Some(forecast) = deps.farm.predict_crop(lat, lon).await else {
        return Ok(TaskOutcome::localized(
            "Crop prediction for your land is not available right now. \
             Please try again later."
                .to_string(),
        ));
    };

    let mut text = format!(
        "🛰️ Based on satellite analysis, the best-suited crop for your land is *{}*.",
        forecast.crop
    );
    if let Some(confidence) = forecast.confidence {
        text.push_str(&format!(" (confidence: {:.0}%)", confidence * 100.0));
    }
    Ok(TaskOutcome::localized(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field() -> ExternalField {
        ExternalField {
            name: "North Plot".into(),
            crop_type: Some("Wheat".into()),
            area_hectares: None,
            health_score: None,
            ndvi: None,
            latitude: 28.7,
            longitude: 77.1,
        }
    }

    #[test]
    fn field_report_includes_scores_and_actions() {
        let report = FieldHealthReport {
            health_score: Some(72.0),
            ndvi: Some(0.613),
            details: json!({}),
        };
        let parsed = json!({
            "summary": "The field is in fair shape.",
            "actions": ["Irrigate the north corner", "Check for aphids"],
        });
        let text = field_report_text(&field(), &report, &parsed);
        assert!(text.contains("Health Score: 72/100"));
        assert!(text.contains("NDVI: 0.613"));
        assert!(text.contains("The field is in fair shape."));
        assert!(text.contains("• Irrigate the north corner"));
    }

    #[test]
    fn field_report_tolerates_empty_model_output() {
        let report = FieldHealthReport {
            health_score: None,
            ndvi: None,
            details: json!({}),
        };
        let text = field_report_text(&field(), &report, &json!({}));
        assert!(text.contains("Field Report: North Plot"));
        assert!(!text.contains("What to do"));
    }
}
