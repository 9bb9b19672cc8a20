//! End-to-end dialog tests: onboarding, menu dispatch, multi-step flows,
//! and background-task enqueueing, run against the in-memory store with
//! recording doubles for the outbound channel and task sink.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use agri_assist::channels::OutboundChannel;
use agri_assist::dialog::{Dialog, DialogDeps, InboundMessage};
use agri_assist::error::{ChannelError, ProviderError};
use agri_assist::providers::farm::{
    AgroMetrics, CropForecast, FarmPlatform, FieldHealthReport, LinkedAccount,
};
use agri_assist::providers::translate::NoopTranslator;
use agri_assist::providers::weather::{WeatherBundle, WeatherProvider};
use agri_assist::session::{
    ConversationState, ExternalField, FlowData, Location, MemoryStore, OnboardingPhase, Session,
    SessionStore,
};
use agri_assist::tasks::{BackgroundTask, TaskKind, TaskSink};

// ── Test doubles ────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    async fn last(&self) -> String {
        self.sent
            .lock()
            .await
            .last()
            .map(|(_, body)| body.clone())
            .unwrap_or_default()
    }

    async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    async fn send(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .await
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    tasks: std::sync::Mutex<Vec<BackgroundTask>>,
}

impl RecordingSink {
    fn drain(&self) -> Vec<BackgroundTask> {
        std::mem::take(&mut self.tasks.lock().unwrap())
    }
}

impl TaskSink for RecordingSink {
    fn enqueue(&self, task: BackgroundTask) {
        self.tasks.lock().unwrap().push(task);
    }
}

struct StubWeather;

#[async_trait]
impl WeatherProvider for StubWeather {
    async fn current_and_forecast(
        &self,
        _lat: f64,
        _lon: f64,
    ) -> Result<WeatherBundle, ProviderError> {
        Err(ProviderError::NotConfigured { provider: "stub" })
    }

    async fn city_name(&self, _lat: f64, _lon: f64) -> Option<String> {
        Some("Ludhiana".to_string())
    }
}

/// Farm platform double: an account with a configurable field list, or no
/// account at all when the list is empty.
struct StubFarm {
    fields: Vec<ExternalField>,
}

#[async_trait]
impl FarmPlatform for StubFarm {
    async fn lookup_account(&self, _phone: &str) -> Option<LinkedAccount> {
        (!self.fields.is_empty()).then(|| LinkedAccount {
            id: "acct-1".to_string(),
            name: Some("Ramesh".to_string()),
        })
    }

    async fn fields_for_account(&self, _account_id: &str) -> Vec<ExternalField> {
        self.fields.clone()
    }

    async fn analyze_field_health(
        &self,
        _lat: f64,
        _lon: f64,
        _field_name: &str,
    ) -> Option<FieldHealthReport> {
        None
    }

    async fn predict_crop(&self, _lat: f64, _lon: f64) -> Option<CropForecast> {
        None
    }

    async fn agricultural_weather(&self, _lat: f64, _lon: f64) -> Option<AgroMetrics> {
        None
    }
}

struct Harness {
    dialog: Dialog,
    store: Arc<MemoryStore>,
    channel: Arc<RecordingChannel>,
    sink: Arc<RecordingSink>,
}

fn harness_with_fields(fields: Vec<ExternalField>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(RecordingChannel::default());
    let sink = Arc::new(RecordingSink::default());
    let dialog = Dialog::new(DialogDeps {
        store: Arc::clone(&store) as Arc<dyn SessionStore>,
        outbound: Arc::clone(&channel) as Arc<dyn OutboundChannel>,
        translator: Arc::new(NoopTranslator),
        weather: Arc::new(StubWeather),
        farm: Arc::new(StubFarm { fields }),
        tasks: Arc::clone(&sink) as Arc<dyn TaskSink>,
    });
    Harness {
        dialog,
        store,
        channel,
        sink,
    }
}

fn harness() -> Harness {
    harness_with_fields(Vec::new())
}

fn msg(from: &str, body: &str) -> InboundMessage {
    InboundMessage {
        from: from.to_string(),
        body: body.to_string(),
        ..Default::default()
    }
}

fn test_fields(n: usize) -> Vec<ExternalField> {
    (1..=n)
        .map(|i| ExternalField {
            name: format!("Field {i}"),
            crop_type: Some("Wheat".to_string()),
            area_hectares: Some(2.0),
            health_score: None,
            ndvi: None,
            latitude: 28.0 + i as f64,
            longitude: 77.0,
        })
        .collect()
}

/// Seed a session that is already past onboarding.
async fn onboarded(h: &Harness, phone: &str) -> Session {
    let mut session = h.store.get_or_create(phone).await.unwrap();
    session.onboarding = OnboardingPhase::Complete;
    session.name = Some("Ramesh".to_string());
    h.store.save(&mut session).await.unwrap();
    session
}

async fn state_of(h: &Harness, phone: &str) -> ConversationState {
    h.store.get(phone).await.unwrap().unwrap().state
}

// ── Onboarding ──────────────────────────────────────────────────────

#[tokio::test]
async fn new_user_walks_through_onboarding_to_main_menu() {
    let h = harness();
    let phone = "+911111111111";

    // First contact: content ignored, language menu sent.
    h.dialog.handle_inbound(msg(phone, "Hi")).await.unwrap();
    assert!(h.channel.last().await.contains("choose your preferred language"));

    h.dialog.handle_inbound(msg(phone, "Hindi")).await.unwrap();
    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.language, "hi");
    assert_eq!(session.onboarding, OnboardingPhase::AwaitingName);
    assert!(h.channel.last().await.contains("What is your name?"));

    h.dialog.handle_inbound(msg(phone, "Ramesh")).await.unwrap();
    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.onboarding, OnboardingPhase::Complete);
    assert_eq!(session.name.as_deref(), Some("Ramesh"));
    assert_eq!(session.state, ConversationState::MainMenu);
    let last = h.channel.last().await;
    assert!(last.contains("Hello Ramesh!"));
    assert!(last.contains("AgriAssist Menu"));

    // Option 1 with no saved location asks for one.
    h.dialog.handle_inbound(msg(phone, "1")).await.unwrap();
    assert_eq!(state_of(&h, phone).await, ConversationState::AwaitingLocation);
}

#[tokio::test]
async fn unsupported_language_reprompts_without_advancing() {
    let h = harness();
    let phone = "+911111111112";

    h.dialog.handle_inbound(msg(phone, "Hi")).await.unwrap();
    h.dialog.handle_inbound(msg(phone, "Klingon")).await.unwrap();

    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.onboarding, OnboardingPhase::AwaitingLanguage);
    assert_eq!(session.language, "en");
    assert!(h.channel.last().await.contains("Invalid language"));
}

#[tokio::test]
async fn onboarding_never_regresses_once_complete() {
    let h = harness();
    let phone = "+911111111113";
    onboarded(&h, phone).await;

    for body in ["hi", "hello", "0", "junk", "2"] {
        h.dialog.handle_inbound(msg(phone, body)).await.unwrap();
        let session = h.store.get(phone).await.unwrap().unwrap();
        assert_eq!(session.onboarding, OnboardingPhase::Complete);
    }
}

// ── Reset + menu dispatch ───────────────────────────────────────────

#[tokio::test]
async fn reset_keyword_returns_to_menu_from_any_state() {
    let h = harness();
    let phone = "+912222222221";
    let mut session = onboarded(&h, phone).await;
    session.state = ConversationState::AwaitingWasteQuantity;
    session.scratch = Some(FlowData::Waste {
        crop: "Paddy".to_string(),
        qty_tons: None,
        potential_income: None,
        carbon_saved: None,
    });
    h.store.save(&mut session).await.unwrap();

    h.dialog.handle_inbound(msg(phone, "0")).await.unwrap();

    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.state, ConversationState::MainMenu);
    assert!(session.scratch.is_none());
    assert!(h.channel.last().await.contains("AgriAssist Menu"));
}

#[tokio::test]
async fn invalid_menu_token_leaves_state_unchanged() {
    let h = harness();
    let phone = "+912222222222";
    onboarded(&h, phone).await;

    h.dialog.handle_inbound(msg(phone, "9")).await.unwrap();

    assert_eq!(state_of(&h, phone).await, ConversationState::MainMenu);
    assert!(h.channel.last().await.contains("AgriAssist Menu"));
    assert!(h.sink.drain().is_empty());
}

#[tokio::test]
async fn ask_expert_enqueues_advice_task_and_returns_to_menu() {
    let h = harness();
    let phone = "+912222222223";
    onboarded(&h, phone).await;

    h.dialog.handle_inbound(msg(phone, "2")).await.unwrap();
    assert_eq!(state_of(&h, phone).await, ConversationState::AwaitingQuery);

    h.dialog
        .handle_inbound(msg(phone, "How do I treat leaf rust?"))
        .await
        .unwrap();
    assert_eq!(state_of(&h, phone).await, ConversationState::MainMenu);

    let tasks = h.sink.drain();
    assert_eq!(tasks.len(), 1);
    assert!(matches!(
        &tasks[0].kind,
        TaskKind::FarmingAdvice { query } if query.contains("leaf rust")
    ));
}

#[tokio::test]
async fn pest_check_requires_an_image() {
    let h = harness();
    let phone = "+912222222224";
    onboarded(&h, phone).await;

    h.dialog.handle_inbound(msg(phone, "3")).await.unwrap();
    h.dialog.handle_inbound(msg(phone, "no image here")).await.unwrap();
    assert_eq!(state_of(&h, phone).await, ConversationState::AwaitingImage);
    assert!(h.sink.drain().is_empty());

    let mut with_image = msg(phone, "");
    with_image.media_url = Some("https://api.twilio.com/media/123".to_string());
    h.dialog.handle_inbound(with_image).await.unwrap();
    assert_eq!(state_of(&h, phone).await, ConversationState::MainMenu);
    assert!(matches!(
        h.sink.drain()[0].kind,
        TaskKind::PestAnalysis { .. }
    ));
}

#[tokio::test]
async fn shared_location_is_geocoded_and_triggers_weather_task() {
    let h = harness();
    let phone = "+912222222225";
    onboarded(&h, phone).await;

    h.dialog.handle_inbound(msg(phone, "1")).await.unwrap();
    let mut located = msg(phone, "");
    located.latitude = Some(30.9);
    located.longitude = Some(75.8);
    h.dialog.handle_inbound(located).await.unwrap();

    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.state, ConversationState::MainMenu);
    assert_eq!(session.location.as_ref().map(|l| l.city.as_str()), Some("Ludhiana"));
    assert!(matches!(h.sink.drain()[0].kind, TaskKind::WeatherReport));
}

// ── Waste-to-wealth flow ────────────────────────────────────────────

#[tokio::test]
async fn waste_quantity_computes_income_and_carbon() {
    let h = harness();
    let phone = "+913333333331";
    let mut session = onboarded(&h, phone).await;
    session.state = ConversationState::AwaitingWasteQuantity;
    session.scratch = Some(FlowData::Waste {
        crop: "Paddy".to_string(),
        qty_tons: None,
        potential_income: None,
        carbon_saved: None,
    });
    h.store.save(&mut session).await.unwrap();

    h.dialog.handle_inbound(msg(phone, "2")).await.unwrap();

    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.state, ConversationState::WasteConfirmDeal);
    assert!(matches!(
        session.scratch,
        Some(FlowData::Waste {
            qty_tons: Some(q),
            potential_income: Some(i),
            carbon_saved: Some(c),
            ..
        }) if q == 2.0 && i == 3600.0 && (c - 2.92).abs() < 1e-9
    ));
    let last = h.channel.last().await;
    assert!(last.contains("3600"));
    assert!(last.contains("2.92"));
}

#[tokio::test]
async fn confirmed_deal_enqueues_market_research_and_clears_scratch() {
    let h = harness();
    let phone = "+913333333332";
    let mut session = onboarded(&h, phone).await;
    session.state = ConversationState::WasteConfirmDeal;
    session.location = Some(Location {
        latitude: 30.9,
        longitude: 75.8,
        city: "Ludhiana".to_string(),
        state: Some("Punjab".to_string()),
    });
    session.scratch = Some(FlowData::Waste {
        crop: "Paddy".to_string(),
        qty_tons: Some(2.0),
        potential_income: Some(3600.0),
        carbon_saved: Some(2.92),
    });
    h.store.save(&mut session).await.unwrap();

    h.dialog.handle_inbound(msg(phone, "Haan")).await.unwrap();

    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.state, ConversationState::MainMenu);
    assert!(session.scratch.is_none());
    let tasks = h.sink.drain();
    assert!(matches!(
        &tasks[0].kind,
        TaskKind::MarketResearch { crop, qty_tons, .. }
            if crop == "Paddy" && *qty_tons == 2.0
    ));
}

#[tokio::test]
async fn confirmed_deal_without_location_asks_for_one_instead() {
    let h = harness();
    let phone = "+913333333333";
    let mut session = onboarded(&h, phone).await;
    session.state = ConversationState::WasteConfirmDeal;
    session.scratch = Some(FlowData::Waste {
        crop: "Paddy".to_string(),
        qty_tons: Some(2.0),
        potential_income: Some(3600.0),
        carbon_saved: Some(2.92),
    });
    h.store.save(&mut session).await.unwrap();

    h.dialog.handle_inbound(msg(phone, "yes")).await.unwrap();

    assert!(h.channel.last().await.contains("update your location"));
    assert!(h.sink.drain().is_empty());
}

#[tokio::test]
async fn missing_waste_scratch_aborts_to_menu() {
    let h = harness();
    let phone = "+913333333334";
    let mut session = onboarded(&h, phone).await;
    session.state = ConversationState::AwaitingWasteQuantity;
    h.store.save(&mut session).await.unwrap();

    h.dialog.handle_inbound(msg(phone, "2")).await.unwrap();

    assert_eq!(state_of(&h, phone).await, ConversationState::MainMenu);
    assert!(h.channel.last().await.contains("Something went wrong"));
}

// ── Field selection ─────────────────────────────────────────────────

#[tokio::test]
async fn field_check_lists_linked_fields() {
    let h = harness_with_fields(test_fields(3));
    let phone = "+914444444441";
    onboarded(&h, phone).await;

    h.dialog.handle_inbound(msg(phone, "7")).await.unwrap();

    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.state, ConversationState::AwaitingFieldSelection);
    assert!(matches!(
        &session.scratch,
        Some(FlowData::FieldSelection { fields, .. }) if fields.len() == 3
    ));
    assert!(h.channel.last().await.contains("1. Field 1"));
}

#[tokio::test]
async fn field_check_without_account_falls_back_to_crop_prediction() {
    let h = harness();
    let phone = "+914444444442";
    onboarded(&h, phone).await;

    h.dialog.handle_inbound(msg(phone, "7")).await.unwrap();
    assert_eq!(
        state_of(&h, phone).await,
        ConversationState::AwaitingCropPredictionLocation
    );

    let mut located = msg(phone, "");
    located.latitude = Some(30.9);
    located.longitude = Some(75.8);
    h.dialog.handle_inbound(located).await.unwrap();
    assert_eq!(state_of(&h, phone).await, ConversationState::MainMenu);
    assert!(matches!(
        h.sink.drain()[0].kind,
        TaskKind::CropPrediction { .. }
    ));
}

#[tokio::test]
async fn field_selection_validates_range_then_enqueues_analysis() {
    let h = harness_with_fields(test_fields(3));
    let phone = "+914444444443";
    onboarded(&h, phone).await;
    h.dialog.handle_inbound(msg(phone, "7")).await.unwrap();

    // Out of range: state and scratch untouched.
    h.dialog.handle_inbound(msg(phone, "5")).await.unwrap();
    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.state, ConversationState::AwaitingFieldSelection);
    assert!(session.scratch.is_some());
    assert!(h.channel.last().await.contains("between 1 and 3"));
    assert!(h.sink.drain().is_empty());

    // Valid pick: back to menu, scratch cleared, one task enqueued.
    h.dialog.handle_inbound(msg(phone, "2")).await.unwrap();
    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.state, ConversationState::MainMenu);
    assert!(session.scratch.is_none());
    let tasks = h.sink.drain();
    assert_eq!(tasks.len(), 1);
    assert!(matches!(
        &tasks[0].kind,
        TaskKind::FieldHealth { field } if field.name == "Field 2"
    ));
}

// ── Bookkeeping ─────────────────────────────────────────────────────

#[tokio::test]
async fn every_turn_logs_one_interaction() {
    let h = harness();
    let phone = "+915555555551";

    h.dialog.handle_inbound(msg(phone, "Hi")).await.unwrap();
    h.dialog.handle_inbound(msg(phone, "English")).await.unwrap();
    h.dialog.handle_inbound(msg(phone, "Ramesh")).await.unwrap();
    assert_eq!(h.store.interaction_count().await, 3);
    assert!(h.channel.count().await >= 3);
}

#[tokio::test]
async fn language_change_updates_session() {
    let h = harness();
    let phone = "+915555555552";
    onboarded(&h, phone).await;

    h.dialog.handle_inbound(msg(phone, "6")).await.unwrap();
    assert_eq!(
        state_of(&h, phone).await,
        ConversationState::AwaitingLanguageChange
    );

    h.dialog.handle_inbound(msg(phone, "Tamil")).await.unwrap();
    let session = h.store.get(phone).await.unwrap().unwrap();
    assert_eq!(session.language, "ta");
    assert_eq!(session.state, ConversationState::MainMenu);
}
