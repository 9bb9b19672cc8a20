//! Per-user session model: onboarding phase, conversation state, profile
//! fields, and the typed scratch payload carried across multi-turn flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Onboarding progresses linearly and never regresses once complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingPhase {
    NotStarted,
    AwaitingLanguage,
    AwaitingName,
    Complete,
}

impl OnboardingPhase {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::AwaitingLanguage => "awaiting_language",
            Self::AwaitingName => "awaiting_name",
            Self::Complete => "complete",
        }
    }

    /// Parse a persisted phase string. Unknown values map to `NotStarted`
    /// so a forward-incompatible record restarts onboarding instead of
    /// wedging the user.
    pub fn parse(s: &str) -> Self {
        match s {
            "awaiting_language" => Self::AwaitingLanguage,
            "awaiting_name" => Self::AwaitingName,
            "complete" => Self::Complete,
            _ => Self::NotStarted,
        }
    }
}

impl Default for OnboardingPhase {
    fn default() -> Self {
        Self::NotStarted
    }
}

/// Conversation state for the post-onboarding state machine.
///
/// Dispatch is an exhaustive `match`, so every state has a handler by
/// construction; unknown persisted strings are reconciled to `MainMenu`
/// at the store boundary (see [`ConversationState::parse`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    MainMenu,
    AwaitingQuery,
    AwaitingImage,
    AwaitingLanguageChange,
    AwaitingLocation,
    ConfirmLocation,
    AwaitingWasteCrop,
    AwaitingWasteQuantity,
    WasteConfirmDeal,
    AwaitingFieldSelection,
    AwaitingCropPredictionLocation,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainMenu => "main_menu",
            Self::AwaitingQuery => "awaiting_query",
            Self::AwaitingImage => "awaiting_image",
            Self::AwaitingLanguageChange => "awaiting_language_change",
            Self::AwaitingLocation => "awaiting_location",
            Self::ConfirmLocation => "confirm_location",
            Self::AwaitingWasteCrop => "awaiting_waste_crop",
            Self::AwaitingWasteQuantity => "awaiting_waste_quantity",
            Self::WasteConfirmDeal => "waste_confirm_deal",
            Self::AwaitingFieldSelection => "awaiting_field_selection",
            Self::AwaitingCropPredictionLocation => "awaiting_crop_prediction_location",
        }
    }

    /// Parse a persisted state string. Unknown values fall back to
    /// `MainMenu` — the state machine must never be permanently stuck on
    /// a state no handler knows.
    pub fn parse(s: &str) -> Self {
        match s {
            "awaiting_query" => Self::AwaitingQuery,
            "awaiting_image" => Self::AwaitingImage,
            "awaiting_language_change" => Self::AwaitingLanguageChange,
            "awaiting_location" => Self::AwaitingLocation,
            "confirm_location" => Self::ConfirmLocation,
            "awaiting_waste_crop" => Self::AwaitingWasteCrop,
            "awaiting_waste_quantity" => Self::AwaitingWasteQuantity,
            "waste_confirm_deal" => Self::WasteConfirmDeal,
            "awaiting_field_selection" => Self::AwaitingFieldSelection,
            "awaiting_crop_prediction_location" => Self::AwaitingCropPredictionLocation,
            "main_menu" => Self::MainMenu,
            other => {
                if !other.is_empty() {
                    tracing::warn!(state = other, "Unknown conversation state, resetting to menu");
                }
                Self::MainMenu
            }
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::MainMenu
    }
}

/// A resolved user location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A field fetched from the linked farm platform.
///
/// Transient: lives only inside [`FlowData::FieldSelection`] for the
/// duration of one selection flow, referenced by list position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalField {
    pub name: String,
    #[serde(default)]
    pub crop_type: Option<String>,
    #[serde(default)]
    pub area_hectares: Option<f64>,
    /// 0–100 when present.
    #[serde(default)]
    pub health_score: Option<f64>,
    #[serde(default)]
    pub ndvi: Option<f64>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Typed scratch payload for the currently active multi-turn flow.
///
/// A closed tagged union instead of an open key/value map: a flow step can
/// never misread another flow's leftover keys. Cleared whenever the owning
/// flow reaches a terminal outcome (success, cancel, or abort).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum FlowData {
    Waste {
        crop: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qty_tons: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        potential_income: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        carbon_saved: Option<f64>,
    },
    FieldSelection {
        account_id: String,
        fields: Vec<ExternalField>,
    },
}

/// Durable per-user record. Created on first contact, mutated every turn,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable phone-derived key.
    pub phone: String,
    pub name: Option<String>,
    pub onboarding: OnboardingPhase,
    pub state: ConversationState,
    pub location: Option<Location>,
    pub language: String,
    pub farm_size_acres: Option<f64>,
    pub crops: Vec<String>,
    pub scratch: Option<FlowData>,
    /// Optimistic-concurrency token, bumped on every successful save.
    pub version: i64,
}

impl Session {
    pub fn new(phone: &str) -> Self {
        Self {
            phone: phone.to_string(),
            name: None,
            onboarding: OnboardingPhase::NotStarted,
            state: ConversationState::MainMenu,
            location: None,
            language: "en".to_string(),
            farm_size_acres: None,
            crops: Vec::new(),
            scratch: None,
            version: 0,
        }
    }

    /// Clear the scratch payload. Called on every terminal flow outcome.
    pub fn clear_scratch(&mut self) {
        self.scratch = None;
    }
}

/// Append-only record of one inbound message.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub id: Uuid,
    pub phone: String,
    pub query_text: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrips_through_strings() {
        let states = [
            ConversationState::MainMenu,
            ConversationState::AwaitingQuery,
            ConversationState::AwaitingImage,
            ConversationState::AwaitingLanguageChange,
            ConversationState::AwaitingLocation,
            ConversationState::ConfirmLocation,
            ConversationState::AwaitingWasteCrop,
            ConversationState::AwaitingWasteQuantity,
            ConversationState::WasteConfirmDeal,
            ConversationState::AwaitingFieldSelection,
            ConversationState::AwaitingCropPredictionLocation,
        ];
        for state in states {
            assert_eq!(ConversationState::parse(state.as_str()), state);
        }
    }

    #[test]
    fn unknown_state_falls_back_to_menu() {
        assert_eq!(
            ConversationState::parse("awaiting_teleport"),
            ConversationState::MainMenu
        );
        assert_eq!(ConversationState::parse(""), ConversationState::MainMenu);
    }

    #[test]
    fn onboarding_phase_roundtrips() {
        for phase in [
            OnboardingPhase::NotStarted,
            OnboardingPhase::AwaitingLanguage,
            OnboardingPhase::AwaitingName,
            OnboardingPhase::Complete,
        ] {
            assert_eq!(OnboardingPhase::parse(phase.as_str()), phase);
        }
        assert_eq!(OnboardingPhase::parse("junk"), OnboardingPhase::NotStarted);
    }

    #[test]
    fn new_session_defaults() {
        let s = Session::new("+911234567890");
        assert_eq!(s.onboarding, OnboardingPhase::NotStarted);
        assert_eq!(s.state, ConversationState::MainMenu);
        assert_eq!(s.language, "en");
        assert!(s.scratch.is_none());
        assert_eq!(s.version, 0);
    }

    #[test]
    fn flow_data_serde_roundtrip() {
        let scratch = FlowData::Waste {
            crop: "Paddy".into(),
            qty_tons: Some(2.0),
            potential_income: Some(3600.0),
            carbon_saved: Some(2.92),
        };
        let json = serde_json::to_string(&scratch).unwrap();
        assert!(json.contains("\"flow\":\"waste\""));
        let parsed: FlowData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, scratch);
    }

    #[test]
    fn external_field_deserializes_camel_case() {
        let field: ExternalField = serde_json::from_str(
            r#"{"name":"North Plot","cropType":"Wheat","areaHectares":2.5,
                "healthScore":72.0,"ndvi":0.61,"latitude":28.7,"longitude":77.1}"#,
        )
        .unwrap();
        assert_eq!(field.name, "North Plot");
        assert_eq!(field.crop_type.as_deref(), Some("Wheat"));
        assert_eq!(field.health_score, Some(72.0));
    }
}
