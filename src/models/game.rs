use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Lending status of a game. The only transitions are
/// available -> borrowed (borrow) and borrowed -> available (return).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Available,
    Borrowed,
}

impl Default for BorrowStatus {
    fn default() -> Self {
        Self::Available
    }
}

impl BorrowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Borrowed => "borrowed",
        }
    }
}

/// One user's stake in a game. A user appears at most once per game; the
/// game itself is deleted when the last owner is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: ObjectId,
    pub name: String,
    pub added_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Document id written by the pre-Mongo-ObjectId deployment. Routes
    /// accept either scheme; see `store::id_query`.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub legacy_id: Option<String>,
    pub bgg_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_hu: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default = "default_players")]
    pub min_players: i32,
    #[serde(default = "default_players")]
    pub max_players: i32,
    #[serde(default)]
    pub play_time: i32,
    #[serde(default)]
    pub min_age: i32,
    #[serde(default)]
    pub complexity_rating: f64,
    #[serde(default)]
    pub bgg_rating: f64,
    #[serde(default)]
    pub rules_link: String,
    #[serde(default)]
    pub release_year: i32,
    #[serde(default)]
    pub categories: Vec<String>,
    /// User-curated labels ("family", "strategy", ...), filterable alongside
    /// the BGG categories.
    #[serde(default)]
    pub game_types: Vec<String>,
    #[serde(default)]
    pub moods: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_short: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_hu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_short_hu: Option<String>,
    #[serde(default)]
    pub status: BorrowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borrowed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borrowed_date: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<DateTime>,
    #[serde(default)]
    pub owners: Vec<Owner>,
    /// Flat single-owner fields from pre-owner-list documents; normalized
    /// into `owners` on first read (see `store::normalize_legacy_owner`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
}

fn default_players() -> i32 {
    1
}

fn default_language() -> String {
    "en".to_string()
}

impl Game {
    /// Check whether `user_id` already appears in the owner list.
    pub fn is_owned_by(&self, user_id: &ObjectId) -> bool {
        self.owners.iter().any(|o| &o.user_id == user_id)
    }

    /// API projection: one `id` string (ObjectId hex, falling back to the
    /// legacy document id) instead of the raw `_id`/`id` pair.
    pub fn into_view(mut self) -> GameView {
        let id = self
            .id
            .take()
            .map(|oid| oid.to_hex())
            .or_else(|| self.legacy_id.take())
            .unwrap_or_default();
        self.legacy_id = None;
        self.owner_id = None;
        self.owner_name = None;
        GameView { id, game: self }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub id: String,
    #[serde(flatten)]
    game: Game,
}
