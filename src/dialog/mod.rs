//! Conversational core: per-user turn handling.
//!
//! An inbound message acquires that user's lock, loads the session, and is
//! routed either into the onboarding sequence or the main state machine.
//! Every turn ends with an interaction log row.

pub mod machine;
pub mod onboarding;
pub mod texts;
pub mod waste;

use std::sync::Arc;

use tracing::debug;

use crate::channels::OutboundChannel;
use crate::error::Result;
use crate::providers::{FarmPlatform, Translator, WeatherProvider};
use crate::session::{Session, SessionLocks, SessionStore};
use crate::tasks::TaskSink;

/// Fields consumed from one inbound transport event.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
    pub media_url: Option<String>,
    /// Present only when the user shared a location.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Collaborators the dialog needs to run a turn.
pub struct DialogDeps {
    pub store: Arc<dyn SessionStore>,
    pub outbound: Arc<dyn OutboundChannel>,
    pub translator: Arc<dyn Translator>,
    pub weather: Arc<dyn WeatherProvider>,
    pub farm: Arc<dyn FarmPlatform>,
    pub tasks: Arc<dyn TaskSink>,
}

pub struct Dialog {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) outbound: Arc<dyn OutboundChannel>,
    pub(crate) translator: Arc<dyn Translator>,
    pub(crate) weather: Arc<dyn WeatherProvider>,
    pub(crate) farm: Arc<dyn FarmPlatform>,
    pub(crate) tasks: Arc<dyn TaskSink>,
    locks: SessionLocks,
}

impl Dialog {
    pub fn new(deps: DialogDeps) -> Self {
        Self {
            store: deps.store,
            outbound: deps.outbound,
            translator: deps.translator,
            weather: deps.weather,
            farm: deps.farm,
            tasks: deps.tasks,
            locks: SessionLocks::new(),
        }
    }

    /// Run one full turn for an inbound message. Holding the per-user lock
    /// across the whole read-modify-write keeps same-user turns linearized.
    pub async fn handle_inbound(&self, msg: InboundMessage) -> Result<()> {
        let _guard = self.locks.acquire(&msg.from).await;
        debug!(from = %msg.from, "Handling inbound turn");

        let mut session = self.store.get_or_create(&msg.from).await?;
        if session.onboarding.is_complete() {
            machine::handle_turn(self, &mut session, &msg).await?;
        } else {
            onboarding::advance(self, &mut session, &msg.body).await?;
        }

        self.store
            .record_interaction(&msg.from, &msg.body, msg.media_url.as_deref())
            .await?;
        Ok(())
    }

    /// Translate outbound copy into the session's language. English
    /// sessions skip the round trip.
    pub(crate) async fn localize(&self, session: &Session, text: &str) -> String {
        if session.language == "en" {
            return text.to_string();
        }
        self.translator
            .translate(text, &session.language, Some("en"))
            .await
    }

    /// Localize and deliver one message to the session's user.
    pub(crate) async fn say(&self, session: &Session, text: &str) -> Result<()> {
        let localized = self.localize(session, text).await;
        self.outbound.send(&session.phone, &localized).await?;
        Ok(())
    }

    /// Deliver text as-is, skipping localization.
    pub(crate) async fn say_raw(&self, session: &Session, text: &str) -> Result<()> {
        self.outbound.send(&session.phone, text).await?;
        Ok(())
    }

    pub(crate) async fn save(&self, session: &mut Session) -> Result<()> {
        self.store.save(session).await?;
        Ok(())
    }
}
