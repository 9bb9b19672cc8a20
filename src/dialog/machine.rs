//! Main state machine: routes a post-onboarding message to exactly one
//! handler based on the current conversation state, with a universal
//! reset override. The `match` on [`ConversationState`] is exhaustive, so
//! every state has a handler by construction.

use tracing::warn;

use crate::dialog::{Dialog, InboundMessage, texts, waste};
use crate::error::Result;
use crate::languages::code_for;
use crate::session::{ConversationState, FlowData, Location, Session};
use crate::tasks::{BackgroundTask, TaskKind};

const RESET_KEYWORDS: &[&str] = &["0", "hi", "hello", "menu"];
const AFFIRMATIVE: &[&str] = &["yes", "y", "haan", "ha"];
const NEGATIVE: &[&str] = &["no", "n", "nahi"];

fn is_affirmative(body: &str) -> bool {
    AFFIRMATIVE.contains(&body.to_lowercase().as_str())
}

fn is_negative(body: &str) -> bool {
    NEGATIVE.contains(&body.to_lowercase().as_str())
}

/// Route one post-onboarding turn.
pub(crate) async fn handle_turn(
    d: &Dialog,
    session: &mut Session,
    msg: &InboundMessage,
) -> Result<()> {
    let body = msg.body.trim();

    // Universal reset: no handler runs this turn.
    if RESET_KEYWORDS.contains(&body.to_lowercase().as_str()) {
        session.state = ConversationState::MainMenu;
        session.clear_scratch();
        d.save(session).await?;
        return d.say(session, texts::MAIN_MENU_TEXT).await;
    }

    match session.state {
        ConversationState::MainMenu => main_menu(d, session, body).await,
        ConversationState::AwaitingQuery => awaiting_query(d, session, body).await,
        ConversationState::AwaitingImage => awaiting_image(d, session, msg).await,
        ConversationState::AwaitingLanguageChange => language_change(d, session, body).await,
        ConversationState::AwaitingLocation => awaiting_location(d, session, msg).await,
        ConversationState::ConfirmLocation => confirm_location(d, session, body).await,
        ConversationState::AwaitingWasteCrop => waste_crop(d, session, body).await,
        ConversationState::AwaitingWasteQuantity => waste_quantity(d, session, body).await,
        ConversationState::WasteConfirmDeal => waste_confirm_deal(d, session, body).await,
        ConversationState::AwaitingFieldSelection => field_selection(d, session, body).await,
        ConversationState::AwaitingCropPredictionLocation => {
            crop_prediction_location(d, session, msg).await
        }
    }
}

/// Abort a multi-step flow whose scratch payload is missing or belongs to
/// a different flow. Logged loudly: this is an invariant violation, not
/// ordinary bad input.
async fn abort_to_menu(d: &Dialog, session: &mut Session) -> Result<()> {
    warn!(phone = %session.phone, state = session.state.as_str(), "Missing flow scratch, aborting to menu");
    session.state = ConversationState::MainMenu;
    session.clear_scratch();
    d.save(session).await?;
    d.say(session, texts::scratch_abort()).await
}

async fn main_menu(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    match body {
        "1" => match &session.location {
            Some(loc) => {
                let prompt =
                    format!("Your saved location is {}. Is this correct? (Yes/No)", loc.city);
                session.state = ConversationState::ConfirmLocation;
                d.save(session).await?;
                d.say(session, &prompt).await
            }
            None => {
                session.state = ConversationState::AwaitingLocation;
                d.save(session).await?;
                d.say(session, "Please share your location to get weather information.")
                    .await
            }
        },
        "2" => {
            session.state = ConversationState::AwaitingQuery;
            d.save(session).await?;
            d.say(session, "Please ask your question.").await
        }
        "3" => {
            session.state = ConversationState::AwaitingImage;
            d.save(session).await?;
            d.say(session, "Please upload a photo of the affected plant.")
                .await
        }
        "4" => {
            session.state = ConversationState::AwaitingWasteCrop;
            d.save(session).await?;
            d.say(
                session,
                "Which crop residue do you have? (e.g., Rice Stubble, Wheat Straw)",
            )
            .await
        }
        "5" => d.say(session, &texts::profile(session)).await,
        "6" => {
            session.state = ConversationState::AwaitingLanguageChange;
            d.save(session).await?;
            d.say(session, &texts::language_change_prompt()).await
        }
        "7" => field_check(d, session).await,
        _ => d.say(session, texts::MAIN_MENU_TEXT).await,
    }
}

/// Menu option 7: list linked fields for selection, or fall through to the
/// satellite crop-prediction path when nothing is linked.
async fn field_check(d: &Dialog, session: &mut Session) -> Result<()> {
    let fields = match d.farm.lookup_account(&session.phone).await {
        Some(account) => {
            let fields = d.farm.fields_for_account(&account.id).await;
            if fields.is_empty() {
                None
            } else {
                Some((account.id, fields))
            }
        }
        None => None,
    };

    match fields {
        Some((account_id, fields)) => {
            let listing = texts::field_list(&fields);
            session.scratch = Some(FlowData::FieldSelection { account_id, fields });
            session.state = ConversationState::AwaitingFieldSelection;
            d.save(session).await?;
            d.say(session, &listing).await
        }
        None => {
            session.state = ConversationState::AwaitingCropPredictionLocation;
            d.save(session).await?;
            d.say(
                session,
                "No linked fields found. Share your location and I will analyze \
                 the best-suited crop for your land.",
            )
            .await
        }
    }
}

async fn awaiting_query(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    if body.is_empty() {
        return d.say(session, "Please type your question.").await;
    }
    d.say(session, "Thanks! Analyzing your query...").await?;

    // The advice prompt works in English; translate the query up front.
    let query = d
        .translator
        .translate(body, "en", Some(&session.language))
        .await;

    session.state = ConversationState::MainMenu;
    d.save(session).await?;
    d.tasks.enqueue(BackgroundTask {
        session_key: session.phone.clone(),
        kind: TaskKind::FarmingAdvice { query },
    });
    Ok(())
}

async fn awaiting_image(d: &Dialog, session: &mut Session, msg: &InboundMessage) -> Result<()> {
    let Some(media_url) = &msg.media_url else {
        return d.say(session, "Please upload an image for analysis.").await;
    };

    d.say(session, "Thanks! Analyzing your image...").await?;
    session.state = ConversationState::MainMenu;
    d.save(session).await?;
    d.tasks.enqueue(BackgroundTask {
        session_key: session.phone.clone(),
        kind: TaskKind::PestAnalysis {
            media_url: media_url.clone(),
        },
    });
    Ok(())
}

async fn language_change(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    match code_for(body) {
        Some(code) => {
            session.language = code.to_string();
            session.state = ConversationState::MainMenu;
            d.save(session).await?;

            let confirmation = d
                .localize(session, &format!("Language changed to {}.", body.trim()))
                .await;
            let menu = d.localize(session, texts::MAIN_MENU_TEXT).await;
            d.say_raw(session, &format!("{confirmation}\n\n{menu}")).await
        }
        None => {
            d.say(session, "Invalid language. Please choose a supported one.")
                .await
        }
    }
}

async fn awaiting_location(d: &Dialog, session: &mut Session, msg: &InboundMessage) -> Result<()> {
    let (Some(lat), Some(lon)) = (msg.latitude, msg.longitude) else {
        return d
            .say(session, "Please share your location using the attach button.")
            .await;
    };

    let city = d
        .weather
        .city_name(lat, lon)
        .await
        .unwrap_or_else(|| format!("{lat:.2}, {lon:.2}"));
    session.location = Some(Location {
        latitude: lat,
        longitude: lon,
        city: city.clone(),
        state: None,
    });
    session.state = ConversationState::MainMenu;
    d.save(session).await?;

    d.say(session, &format!("Location updated to {city}. Fetching weather..."))
        .await?;
    d.tasks.enqueue(BackgroundTask {
        session_key: session.phone.clone(),
        kind: TaskKind::WeatherReport,
    });
    Ok(())
}

async fn confirm_location(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    if is_affirmative(body) {
        session.state = ConversationState::MainMenu;
        d.save(session).await?;
        d.say(session, "Fetching weather...").await?;
        d.tasks.enqueue(BackgroundTask {
            session_key: session.phone.clone(),
            kind: TaskKind::WeatherReport,
        });
        Ok(())
    } else if is_negative(body) {
        session.state = ConversationState::AwaitingLocation;
        d.save(session).await?;
        d.say(session, "Please share your new location.").await
    } else {
        d.say(session, "Invalid response. Please reply with Yes or No.")
            .await
    }
}

async fn waste_crop(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    if body.is_empty() {
        return d
            .say(session, "Please tell me the type of crop residue you have.")
            .await;
    }

    let crop = body.trim().to_string();
    let prompt = format!("How many tons of {crop} do you have?");
    session.scratch = Some(FlowData::Waste {
        crop,
        qty_tons: None,
        potential_income: None,
        carbon_saved: None,
    });
    session.state = ConversationState::AwaitingWasteQuantity;
    d.save(session).await?;
    d.say(session, &prompt).await
}

async fn waste_quantity(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    let Some(FlowData::Waste { crop, .. }) = &session.scratch else {
        return abort_to_menu(d, session).await;
    };
    if body.is_empty() {
        return d
            .say(session, "Please provide the quantity in tons/quintals.")
            .await;
    }

    let crop = crop.clone();
    let qty = waste::parse_quantity(body);
    let potential_income = qty * waste::rate_per_ton(&crop);
    let carbon_saved = qty * waste::CARBON_FACTOR;

    session.scratch = Some(FlowData::Waste {
        crop,
        qty_tons: Some(qty),
        potential_income: Some(potential_income),
        carbon_saved: Some(carbon_saved),
    });
    session.state = ConversationState::WasteConfirmDeal;
    d.save(session).await?;
    d.say(session, &texts::waste_report(potential_income, carbon_saved))
        .await
}

async fn waste_confirm_deal(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    if is_affirmative(body) {
        let Some(FlowData::Waste {
            crop,
            qty_tons: Some(qty_tons),
            ..
        }) = session.scratch.clone()
        else {
            return abort_to_menu(d, session).await;
        };

        // Terminal outcome for the flow: reset before any slow work.
        session.clear_scratch();
        session.state = ConversationState::MainMenu;
        d.save(session).await?;

        match session.location.clone() {
            Some(location) => {
                d.say(
                    session,
                    "🔎 Searching for nearest buyers & arranging pickup... Please wait.",
                )
                .await?;
                d.tasks.enqueue(BackgroundTask {
                    session_key: session.phone.clone(),
                    kind: TaskKind::MarketResearch {
                        crop,
                        qty_tons,
                        location,
                    },
                });
                Ok(())
            }
            None => {
                d.say(
                    session,
                    "To find market rates and buyers, please update your location \
                     first (Option 1 in Main Menu).",
                )
                .await
            }
        }
    } else if is_negative(body) {
        session.clear_scratch();
        session.state = ConversationState::MainMenu;
        d.save(session).await?;
        d.say(session, "Okay, returning to main menu.").await
    } else {
        d.say(
            session,
            "Invalid response. Please reply 'Yes' or 'Haan' to confirm, or 'No'/'Nahi' to cancel.",
        )
        .await
    }
}

async fn field_selection(d: &Dialog, session: &mut Session, body: &str) -> Result<()> {
    let Some(FlowData::FieldSelection { fields, .. }) = &session.scratch else {
        return abort_to_menu(d, session).await;
    };

    let count = fields.len();
    let choice = body.trim().parse::<usize>().ok();
    let Some(index) = choice.filter(|n| (1..=count).contains(n)) else {
        return d
            .say(
                session,
                &format!("Please reply with a number between 1 and {count}."),
            )
            .await;
    };

    let field = fields[index - 1].clone();
    session.clear_scratch();
    session.state = ConversationState::MainMenu;
    d.save(session).await?;

    d.say(
        session,
        &format!(
            "🛰️ Starting satellite analysis for {}... This can take a minute.",
            field.name
        ),
    )
    .await?;
    d.tasks.enqueue(BackgroundTask {
        session_key: session.phone.clone(),
        kind: TaskKind::FieldHealth { field },
    });
    Ok(())
}

async fn crop_prediction_location(
    d: &Dialog,
    session: &mut Session,
    msg: &InboundMessage,
) -> Result<()> {
    let (Some(lat), Some(lon)) = (msg.latitude, msg.longitude) else {
        return d
            .say(session, "Please share your location using the attach button.")
            .await;
    };

    let city = d
        .weather
        .city_name(lat, lon)
        .await
        .unwrap_or_else(|| format!("{lat:.2}, {lon:.2}"));
    session.location = Some(Location {
        latitude: lat,
        longitude: lon,
        city,
        state: None,
    });
    session.state = ConversationState::MainMenu;
    d.save(session).await?;

    d.say(session, "🛰️ Analyzing satellite data for your land... Please wait.")
        .await?;
    d.tasks.enqueue(BackgroundTask {
        session_key: session.phone.clone(),
        kind: TaskKind::CropPrediction {
            latitude: lat,
            longitude: lon,
        },
    });
    Ok(())
}
