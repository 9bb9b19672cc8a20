//! External collaborator boundaries: traits with reqwest-backed clients.

pub mod farm;
pub mod llm;
pub mod search;
pub mod translate;
pub mod weather;

pub use farm::{
    AgriTechClient, AgroMetrics, CropForecast, FarmPlatform, FieldHealthReport, LinkedAccount,
};
pub use llm::{AnthropicGenerator, ImageData, TextGenerator, extract_json, generate_structured};
pub use search::{BraveSearch, SearchHit, SearchProvider};
pub use translate::{GoogleTranslator, NoopTranslator, Translator};
pub use weather::{OpenWeatherClient, WeatherBundle, WeatherProvider};
