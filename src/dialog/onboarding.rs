//! Onboarding sequence: language then name, run once per user before the
//! main menu becomes reachable.

use tracing::info;

use crate::dialog::{Dialog, texts};
use crate::error::Result;
use crate::languages::code_for;
use crate::session::{OnboardingPhase, Session};

/// Advance onboarding by one turn. Progression is strictly forward; an
/// unmatched input re-prompts at the same phase.
pub(crate) async fn advance(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    match session.onboarding {
        OnboardingPhase::NotStarted => {
            // The triggering message's content is ignored.
            session.onboarding = OnboardingPhase::AwaitingLanguage;
            d.save(session).await?;
            d.say_raw(session, &texts::welcome_prompt()).await
        }

        OnboardingPhase::AwaitingLanguage => match code_for(body) {
            Some(code) => {
                session.language = code.to_string();
                session.onboarding = OnboardingPhase::AwaitingName;
                d.save(session).await?;
                d.say(session, "What is your name?").await
            }
            None => {
                d.say(session, "Invalid language. Please choose a supported one.")
                    .await
            }
        },

        OnboardingPhase::AwaitingName => {
            let name = body.trim();
            if name.is_empty() {
                return d.say(session, "Please tell me your name.").await;
            }
            session.name = Some(name.to_string());
            session.onboarding = OnboardingPhase::Complete;
            d.save(session).await?;
            info!(phone = %session.phone, "Onboarding complete");

            let welcome = d
                .localize(session, &format!("Hello {name}! You are all set."))
                .await;
            let menu = d.localize(session, texts::MAIN_MENU_TEXT).await;
            d.say_raw(session, &format!("{welcome}\n\n{menu}")).await
        }

        // Callers only dispatch here while incomplete; re-sending the menu
        // keeps the session recoverable if that ever changes.
        OnboardingPhase::Complete => d.say(session, texts::MAIN_MENU_TEXT).await,
    }
}
