use std::env;

/// Runtime configuration, read once at startup. Every knob has a default
/// suitable for local development except `JWT_SECRET`, which must be set.
#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub db_name: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub bgg_base_url: String,
    /// Base URL of the hosted text service used for Hungarian enrichment.
    /// Unset means enrichment is disabled and games stay untranslated.
    pub translate_base_url: Option<String>,
    pub translate_api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mongo_uri: env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            db_name: env::var("DB_NAME").unwrap_or_else(|_| "boardgame_collection".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            bgg_base_url: env::var("BGG_API_URL")
                .unwrap_or_else(|_| "https://boardgamegeek.com/xmlapi2".to_string()),
            translate_base_url: env::var("TRANSLATE_API_URL").ok(),
            translate_api_key: env::var("TRANSLATE_API_KEY").ok(),
            cache_ttl_secs: env::var("BGG_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86_400),
            cache_capacity: env::var("BGG_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000),
        }
    }
}
