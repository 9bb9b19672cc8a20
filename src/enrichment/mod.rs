//! Enrichment aggregation: best-effort context assembly for advice
//! generation, and the widening-scope market search used by the
//! waste-to-wealth flow.

use chrono::Utc;
use tracing::warn;

use crate::error::LlmError;
use crate::providers::farm::{AgroMetrics, FarmPlatform};
use crate::providers::llm::TextGenerator;
use crate::providers::search::SearchProvider;
use crate::providers::weather::{WeatherBundle, WeatherProvider};
use crate::session::{ExternalField, Location};

/// Best-effort context bag for AI advice. Absent sources are absent keys,
/// never errors.
#[derive(Debug, Default)]
pub struct EnrichmentContext {
    pub fields: Option<Vec<ExternalField>>,
    pub weather: Option<WeatherBundle>,
    pub agro: Option<AgroMetrics>,
}

impl EnrichmentContext {
    /// Render the gathered context into prompt text. Empty when nothing
    /// was available.
    pub fn prompt_block(&self) -> String {
        let mut out = String::new();

        if let Some(fields) = &self.fields
            && !fields.is_empty()
        {
            out.push_str("Linked platform fields:\n");
            for field in fields {
                out.push_str(&format!(
                    "- {}: Crop={}",
                    field.name,
                    field.crop_type.as_deref().unwrap_or("Unknown")
                ));
                if let Some(area) = field.area_hectares {
                    out.push_str(&format!(", Area={area}ha"));
                }
                if let Some(health) = field.health_score {
                    out.push_str(&format!(", Health={health}/100"));
                }
                if let Some(ndvi) = field.ndvi {
                    out.push_str(&format!(", NDVI={ndvi:.3}"));
                }
                out.push('\n');
            }
        }

        if let Some(weather) = &self.weather {
            out.push_str(&weather.prompt_block());
            out.push('\n');
        }

        if let Some(agro) = &self.agro
            && !agro.is_empty()
        {
            out.push_str("Agricultural metrics:\n");
            for (key, value) in agro {
                if key != "success" && !value.is_null() {
                    out.push_str(&format!("- {key}: {value}\n"));
                }
            }
        }

        out
    }
}

/// Fan out to the independent context sources concurrently. A failure in
/// one source must not abort the others.
pub async fn assemble(
    farm: &dyn FarmPlatform,
    weather: &dyn WeatherProvider,
    phone: &str,
    location: Option<&Location>,
) -> EnrichmentContext {
    let fields_fut = async {
        let account = farm.lookup_account(phone).await?;
        let fields = farm.fields_for_account(&account.id).await;
        (!fields.is_empty()).then_some(fields)
    };

    let weather_fut = async {
        let loc = location?;
        match weather
            .current_and_forecast(loc.latitude, loc.longitude)
            .await
        {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!("Weather enrichment unavailable: {e}");
                None
            }
        }
    };

    let agro_fut = async {
        let loc = location?;
        farm.agricultural_weather(loc.latitude, loc.longitude).await
    };

    let (fields, weather, agro) = tokio::join!(fields_fut, weather_fut, agro_fut);
    EnrichmentContext {
        fields,
        weather,
        agro,
    }
}

// ── Market research ─────────────────────────────────────────────────

/// Combined result of one batch of search queries, with an explicit
/// relevance flag instead of a sentinel string in the text.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub text: String,
    pub relevant: bool,
}

/// Hits fetched per individual query.
const RESULTS_PER_QUERY: usize = 2;

fn buyer_queries(crop: &str, scope: &str) -> [String; 4] {
    [
        format!("Biomass briquette manufacturers in {scope} mobile number"),
        format!("Paddy straw buyers in {scope} contact"),
        format!("{crop} residue buyers in {scope} phone number"),
        format!("Biofuel plant manager in {scope} mobile number"),
    ]
}

/// Run a batch of queries concurrently and combine their results.
pub async fn combined_search(search: &dyn SearchProvider, queries: &[String]) -> SearchOutcome {
    let futures = queries
        .iter()
        .map(|query| async move { (query, search.search(query, RESULTS_PER_QUERY).await) });
    let results = futures::future::join_all(futures).await;

    let mut text = String::new();
    let mut relevant = false;
    for (query, result) in results {
        match result {
            Ok(hits) if !hits.is_empty() => {
                relevant = true;
                text.push_str(&format!("Results for query: '{query}'\n"));
                for hit in hits {
                    text.push_str(&format!(
                        "Title: {}\nSnippet: {}\nURL: {}\n---\n",
                        hit.title, hit.snippet, hit.url
                    ));
                }
                text.push('\n');
            }
            Ok(_) => {
                text.push_str(&format!("No results for query: '{query}'.\n\n"));
            }
            Err(e) => {
                warn!(query, "Search failed: {e}");
                text.push_str(&format!("Search unavailable for query: '{query}'.\n\n"));
            }
        }
    }

    SearchOutcome {
        text: text.trim_end().to_string(),
        relevant,
    }
}

/// Buyer search with the widening-scope fallback chain: city, then
/// state/region, then generic national scopes. Stops at the first scope
/// with relevant results; keeps the last attempt otherwise.
pub async fn buyer_search_with_fallback(
    search: &dyn SearchProvider,
    crop: &str,
    location: &Location,
) -> SearchOutcome {
    let mut scopes: Vec<String> = vec![location.city.clone()];
    if let Some(state) = &location.state
        && !state.is_empty()
    {
        scopes.push(state.clone());
    }
    scopes.push("nearest industrial hub India".to_string());
    scopes.push("major agricultural markets India".to_string());

    let mut last = None;
    for scope in &scopes {
        let outcome = combined_search(search, &buyer_queries(crop, scope)).await;
        if outcome.relevant {
            return outcome;
        }
        last = Some(outcome);
    }
    last.unwrap_or(SearchOutcome {
        text: String::new(),
        relevant: false,
    })
}

/// Full market research: buyer fallback chain + one unscoped rate query,
/// synthesized into a single report in the user's language.
pub async fn market_research(
    search: &dyn SearchProvider,
    llm: &dyn TextGenerator,
    crop: &str,
    qty_tons: f64,
    location: &Location,
    language: &str,
) -> Result<String, LlmError> {
    let buyers = buyer_search_with_fallback(search, crop, location).await;

    let rate_query = format!(
        "Current price of {crop} stubble biomass in India {}",
        Utc::now().format("%B %Y")
    );
    let rates = combined_search(search, &[rate_query]).await;

    let prompt = format!(
        "You are a Data Extraction Assistant. Your primary directive is to format \
         extracted data as requested.\n\
         The user's required output language is '{language}'.\n\
         **Your final response MUST be written exclusively in the '{language}' language.**\n\
         Do not use any other language, even if the source text is in a different language.\n\n\
         CONTEXT:\n\
         Search results for potential buyers: {buyers}\n\
         Search results for market rates: {rates}\n\
         User location: {city}\n\
         Crop: {crop}\n\
         Quantity: {qty_tons} tons\n\n\
         INSTRUCTIONS:\n\
         1. Extract contacts: from the buyer results, list any phone numbers found.\n\
         2. Print full numbers; never mask digits.\n\
         3. Only list companies present in the search text; do not invent names.\n\
         4. If a company has no number, give a Google Maps search link: \
            https://www.google.com/maps/search/{{Company Name}}+{{City}}\n\
         5. Prioritize results closest to the user's location; if none match \
            exactly, list the closest and name its location.\n\
         6. Output per entry: company name, phone or maps link, location.",
        buyers = buyers.text,
        rates = rates.text,
        city = location.city,
    );

    llm.generate(&prompt, 2048).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::search::SearchHit;
    use async_trait::async_trait;

    /// Returns hits only for queries containing a configured marker.
    struct ScopedSearch {
        answers_scope: &'static str,
    }

    #[async_trait]
    impl SearchProvider for ScopedSearch {
        async fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchHit>, ProviderError> {
            if query.contains(self.answers_scope) {
                Ok(vec![SearchHit {
                    title: format!("Buyer near {}", self.answers_scope),
                    snippet: "Call 9876543210".into(),
                    url: "https://example.com/buyer".into(),
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn location() -> Location {
        Location {
            latitude: 30.9,
            longitude: 75.8,
            city: "Ludhiana".into(),
            state: Some("Punjab".into()),
        }
    }

    #[tokio::test]
    async fn fallback_widens_to_state_scope_when_city_has_no_results() {
        let search = ScopedSearch {
            answers_scope: "Punjab",
        };
        let outcome = buyer_search_with_fallback(&search, "Paddy", &location()).await;
        assert!(outcome.relevant);
        assert!(outcome.text.contains("Buyer near Punjab"));
        assert!(!outcome.text.contains("Buyer near Ludhiana"));
    }

    #[tokio::test]
    async fn fallback_stops_at_city_when_relevant() {
        let search = ScopedSearch {
            answers_scope: "Ludhiana",
        };
        let outcome = buyer_search_with_fallback(&search, "Paddy", &location()).await;
        assert!(outcome.relevant);
        assert!(outcome.text.contains("Buyer near Ludhiana"));
    }

    #[tokio::test]
    async fn fallback_exhausts_to_last_scope() {
        let search = ScopedSearch { answers_scope: "∅" };
        let outcome = buyer_search_with_fallback(&search, "Paddy", &location()).await;
        assert!(!outcome.relevant);
        assert!(outcome.text.contains("major agricultural markets India"));
    }

    #[tokio::test]
    async fn combined_search_flags_relevance_explicitly() {
        let search = ScopedSearch {
            answers_scope: "Ludhiana",
        };
        let hit = combined_search(&search, &["buyers in Ludhiana".to_string()]).await;
        assert!(hit.relevant);
        let miss = combined_search(&search, &["buyers in Jaipur".to_string()]).await;
        assert!(!miss.relevant);
        assert!(miss.text.contains("No results"));
    }
}
