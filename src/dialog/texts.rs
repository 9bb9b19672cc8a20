//! User-facing copy shared across handlers. Everything here is authored
//! in English; localization happens at the send boundary.

use crate::languages::language_menu;
use crate::session::{ExternalField, Session};

pub const MAIN_MENU_TEXT: &str = "🌿 *AgriAssist Menu*
1️⃣ Weather Info
2️⃣ Ask Expert (Chat)
3️⃣ Pest Check (Image)
4️⃣ Waste to Wealth
5️⃣ Profile
6️⃣ Change Language
7️⃣ Field Check (Satellite)
_Reply 0 to reset._";

pub fn welcome_prompt() -> String {
    format!(
        "Welcome to AgriAssist! Please choose your preferred language \
         (e.g., English, Hindi).\n\nSupported: {}",
        language_menu()
    )
}

pub fn language_change_prompt() -> String {
    format!(
        "Please choose your new language.\n\nSupported: {}",
        language_menu()
    )
}

pub fn profile(session: &Session) -> String {
    let location = session
        .location
        .as_ref()
        .map(|loc| loc.city.clone())
        .unwrap_or_else(|| "Not Set".to_string());
    let crops = if session.crops.is_empty() {
        "Not Set".to_string()
    } else {
        session.crops.join(", ")
    };
    let farm_size = session
        .farm_size_acres
        .map(|acres| format!("{acres} acres"))
        .unwrap_or_else(|| "Not Set".to_string());

    format!(
        "*Your AgriAssist Profile*\n\
         👤 *Name:* {}\n\
         📞 *Phone:* {}\n\
         🌐 *Language:* {}\n\
         📍 *Location:* {}\n\
         🌾 *Crops:* {}\n\
         🏞️ *Farm Size:* {}",
        session.name.as_deref().unwrap_or("Not Set"),
        session.phone,
        session.language.to_uppercase(),
        location,
        crops,
        farm_size,
    )
}

pub fn waste_report(potential_income: f64, carbon_saved: f64) -> String {
    format!(
        "📊 *Anumanit Report (Estimate):*\n\
         💰 *Potential Income:* ₹{potential_income:.0}\n\
         🌍 *Carbon Saved:* {carbon_saved:.2} tons (You are a Climate Hero! 🦸)\n\n\
         *Kya aap isse bechna chahte hain? (Reply 'Yes' or 'Haan')*"
    )
}

pub fn field_list(fields: &[ExternalField]) -> String {
    let mut out = String::from("🛰️ *Your Linked Fields*\n");
    for (i, field) in fields.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} ({})",
            i + 1,
            field.name,
            field.crop_type.as_deref().unwrap_or("Unknown crop"),
        ));
        if let Some(area) = field.area_hectares {
            out.push_str(&format!(", {area} ha"));
        }
        out.push('\n');
    }
    out.push_str("\nReply with the number of the field to analyze.");
    out
}

pub fn scratch_abort() -> &'static str {
    "Something went wrong with the details. Please try again from the main menu (Reply 0)."
}
