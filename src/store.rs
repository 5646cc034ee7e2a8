//! The owned-games collection: import/dedup, filtered listing, typed partial
//! updates, ownership removal, and the borrow state machine.
//!
//! Every state transition is a single atomic conditional update in Mongo:
//! two concurrent borrow attempts race on `status: "available"` and at most
//! one wins.

use chrono::{NaiveDate, NaiveTime};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Bson, DateTime, Document, Regex};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::Deserialize;
use tracing::info;

use crate::error::{is_duplicate_key, ApiError};
use crate::models::{BorrowStatus, Game, Owner};

fn games(db: &Database) -> Collection<Game> {
    db.collection("games")
}

/// Filter matching a game by either id scheme: the `_id` ObjectId hex used
/// by current documents, or the flat UUID `id` written by the legacy
/// deployment. Both stay resolvable on every game-by-id route.
pub fn id_query(raw_id: &str) -> Document {
    match ObjectId::parse_str(raw_id) {
        Ok(oid) => doc! { "$or": [ { "_id": oid }, { "id": raw_id } ] },
        Err(_) => doc! { "id": raw_id },
    }
}

fn doc_id_query(game: &Game) -> Result<Document, ApiError> {
    if let Some(oid) = game.id {
        return Ok(doc! { "_id": oid });
    }
    match &game.legacy_id {
        Some(legacy) => Ok(doc! { "id": legacy }),
        None => Err(ApiError::Internal(anyhow::anyhow!(
            "game document has no identifier"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Listing & filters
// ---------------------------------------------------------------------------

/// Query parameters accepted by `GET /api/games`. Absent fields are no-ops;
/// list-valued fields take comma-separated values matched case-insensitively.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<BorrowStatus>,
    pub search: Option<String>,
    pub min_players: Option<i32>,
    pub max_players: Option<i32>,
    pub min_play_time: Option<i32>,
    pub max_play_time: Option<i32>,
    pub min_age: Option<i32>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub category: Option<String>,
    pub game_type: Option<String>,
    pub mood: Option<String>,
    pub owned: Option<bool>,
}

/// Build the Mongo filter for a listing request. Conjunctive across fields;
/// the comma-separated list filters are disjunctive within themselves.
pub fn build_list_filter(query: &ListQuery, caller: &ObjectId) -> Document {
    let mut clauses: Vec<Document> = Vec::new();

    if let Some(status) = query.status {
        clauses.push(doc! { "status": status.as_str() });
    }

    if let Some(search) = trimmed(&query.search) {
        let pattern = ci_contains(search);
        clauses.push(doc! { "$or": [
            { "title": pattern.clone() },
            { "authors": pattern.clone() },
            { "categories": pattern },
        ]});
    }

    // Range overlap: a game fits a requested player count when its own
    // range intersects the requested one. A contradictory request simply
    // produces two clauses few games satisfy.
    if let Some(min_players) = query.min_players {
        clauses.push(doc! { "max_players": { "$gte": min_players } });
    }
    if let Some(max_players) = query.max_players {
        clauses.push(doc! { "min_players": { "$lte": max_players } });
    }

    if let Some(min_time) = query.min_play_time {
        clauses.push(doc! { "play_time": { "$gte": min_time } });
    }
    if let Some(max_time) = query.max_play_time {
        clauses.push(doc! { "play_time": { "$lte": max_time } });
    }

    // Age floor: games playable by someone this old.
    if let Some(age) = query.min_age {
        clauses.push(doc! { "min_age": { "$lte": age } });
    }

    if let Some(min_rating) = query.min_rating {
        clauses.push(doc! { "bgg_rating": { "$gte": min_rating } });
    }
    if let Some(max_rating) = query.max_rating {
        clauses.push(doc! { "bgg_rating": { "$lte": max_rating } });
    }

    for (field, values) in [
        ("categories", &query.category),
        ("game_types", &query.game_type),
        ("moods", &query.mood),
    ] {
        if let Some(raw) = trimmed(values) {
            let alternatives: Vec<Bson> = raw
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ci_exact)
                .collect();
            if !alternatives.is_empty() {
                clauses.push(doc! { field: { "$in": alternatives } });
            }
        }
    }

    if query.owned == Some(true) {
        clauses.push(doc! { "owners.user_id": *caller });
    }

    if clauses.is_empty() {
        doc! {}
    } else {
        doc! { "$and": clauses }
    }
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn ci_contains(value: &str) -> Bson {
    Bson::RegularExpression(Regex {
        pattern: regex_escape(value),
        options: "i".to_string(),
    })
}

fn ci_exact(value: &str) -> Bson {
    Bson::RegularExpression(Regex {
        pattern: format!("^{}$", regex_escape(value)),
        options: "i".to_string(),
    })
}

/// Escape user input for use inside a Mongo regular expression.
fn regex_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(
            ch,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' | '/'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub async fn list_games(
    db: &Database,
    query: &ListQuery,
    caller: &ObjectId,
) -> Result<Vec<Game>, ApiError> {
    let collection = games(db);
    let filter = build_list_filter(query, caller);
    let options = FindOptions::builder().sort(doc! { "title": 1 }).build();

    let mut cursor = collection.find(filter, options).await?;
    let mut results = Vec::new();
    while let Some(game) = cursor.try_next().await? {
        results.push(normalize_legacy_owner(&collection, game).await?);
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Import & ownership
// ---------------------------------------------------------------------------

pub async fn import_game(
    db: &Database,
    details: Game,
    caller: &ObjectId,
    caller_name: &str,
    note: Option<String>,
) -> Result<Game, ApiError> {
    let collection = games(db);
    let owner = Owner {
        user_id: *caller,
        name: caller_name.to_string(),
        added_at: DateTime::now(),
        note,
    };

    if let Some(existing) = collection
        .find_one(doc! { "bgg_id": &details.bgg_id }, None)
        .await?
    {
        let existing = normalize_legacy_owner(&collection, existing).await?;
        return append_owner(&collection, existing, owner).await;
    }

    let mut fresh = details;
    fresh.id = None;
    fresh.owners = vec![owner.clone()];
    match collection.insert_one(&fresh, None).await {
        Ok(result) => {
            fresh.id = result.inserted_id.as_object_id();
            info!(bgg_id = %fresh.bgg_id, title = %fresh.title, "imported game");
            Ok(fresh)
        }
        // A concurrent import of the same bgg_id won the insert race; fall
        // through to the append-owner path on the winner's document.
        Err(err) if is_duplicate_key(&err) => {
            let existing = collection
                .find_one(doc! { "bgg_id": &fresh.bgg_id }, None)
                .await?
                .ok_or_else(|| ApiError::conflict("game import raced and lost"))?;
            let existing = normalize_legacy_owner(&collection, existing).await?;
            append_owner(&collection, existing, owner).await
        }
        Err(err) => Err(err.into()),
    }
}

/// Append `owner` unless already present, guarded in the update filter so
/// two concurrent imports by the same user cannot double-append.
async fn append_owner(
    collection: &Collection<Game>,
    existing: Game,
    owner: Owner,
) -> Result<Game, ApiError> {
    if existing.is_owned_by(&owner.user_id) {
        return Err(ApiError::conflict("game is already in your collection"));
    }

    let mut filter = doc_id_query(&existing)?;
    filter.insert("owners.user_id", doc! { "$ne": owner.user_id });
    let update = doc! { "$push": { "owners": to_bson(&owner)? } };

    let result = collection.update_one(filter, update, None).await?;
    if result.matched_count == 0 {
        return Err(ApiError::conflict("game is already in your collection"));
    }

    collection
        .find_one(doc_id_query(&existing)?, None)
        .await?
        .ok_or_else(|| ApiError::not_found("game disappeared during import"))
}

/// Outcome of removing a caller's ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Other owners remain; the game stays in the collection.
    OwnerRemoved,
    /// The caller was the last owner; the game document is gone.
    GameDeleted,
}

pub async fn remove_ownership(
    db: &Database,
    raw_id: &str,
    caller: &ObjectId,
) -> Result<RemovalOutcome, ApiError> {
    let collection = games(db);
    let game = collection
        .find_one(id_query(raw_id), None)
        .await?
        .ok_or_else(|| ApiError::not_found("game not found"))?;
    let game = normalize_legacy_owner(&collection, game).await?;

    if !game.is_owned_by(caller) {
        return Err(ApiError::forbidden("game is not in your collection"));
    }

    let filter = doc_id_query(&game)?;
    collection
        .update_one(
            filter.clone(),
            doc! { "$pull": { "owners": { "user_id": *caller } } },
            None,
        )
        .await?;

    // Orphaned games are deleted, never persisted. The $size guard makes
    // the delete race-safe against a concurrent owner append.
    let mut orphan_filter = filter;
    orphan_filter.insert("owners", doc! { "$size": 0 });
    let deleted = collection.delete_one(orphan_filter, None).await?;

    if deleted.deleted_count > 0 {
        info!(bgg_id = %game.bgg_id, "deleted game after last owner left");
        Ok(RemovalOutcome::GameDeleted)
    } else {
        Ok(RemovalOutcome::OwnerRemoved)
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// The set of fields a `PUT /api/games/{id}` may touch, each with its
/// concrete type. Unknown or mistyped fields fail deserialization at the
/// boundary instead of being dropped or coerced. Borrow state and ownership
/// are only mutated through their dedicated transitions.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GamePatch {
    pub title: Option<String>,
    pub title_hu: Option<String>,
    pub authors: Option<Vec<String>>,
    pub cover_image: Option<String>,
    pub min_players: Option<i32>,
    pub max_players: Option<i32>,
    pub play_time: Option<i32>,
    pub min_age: Option<i32>,
    pub complexity_rating: Option<f64>,
    pub bgg_rating: Option<f64>,
    pub rules_link: Option<String>,
    pub release_year: Option<i32>,
    pub categories: Option<Vec<String>>,
    pub game_types: Option<Vec<String>>,
    pub moods: Option<Vec<String>>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub description_short: Option<String>,
    pub description_hu: Option<String>,
    pub description_short_hu: Option<String>,
}

impl GamePatch {
    /// Shallow-merge document for `$set`; empty when no field was provided.
    pub fn into_update(self) -> Document {
        let mut set = Document::new();
        set_opt(&mut set, "title", self.title);
        set_opt(&mut set, "title_hu", self.title_hu);
        set_opt(&mut set, "authors", self.authors);
        set_opt(&mut set, "cover_image", self.cover_image);
        set_opt(&mut set, "min_players", self.min_players);
        set_opt(&mut set, "max_players", self.max_players);
        set_opt(&mut set, "play_time", self.play_time);
        set_opt(&mut set, "min_age", self.min_age);
        set_opt(&mut set, "complexity_rating", self.complexity_rating);
        set_opt(&mut set, "bgg_rating", self.bgg_rating);
        set_opt(&mut set, "rules_link", self.rules_link);
        set_opt(&mut set, "release_year", self.release_year);
        set_opt(&mut set, "categories", self.categories);
        set_opt(&mut set, "game_types", self.game_types);
        set_opt(&mut set, "moods", self.moods);
        set_opt(&mut set, "language", self.language);
        set_opt(&mut set, "description", self.description);
        set_opt(&mut set, "description_short", self.description_short);
        set_opt(&mut set, "description_hu", self.description_hu);
        set_opt(&mut set, "description_short_hu", self.description_short_hu);
        set
    }
}

fn set_opt<T: Into<Bson>>(doc: &mut Document, key: &str, value: Option<T>) {
    if let Some(value) = value {
        doc.insert(key, value.into());
    }
}

pub async fn update_game(db: &Database, raw_id: &str, patch: GamePatch) -> Result<Game, ApiError> {
    let collection = games(db);
    let set = patch.into_update();
    if set.is_empty() {
        return Err(ApiError::invalid_input("no updatable fields in request"));
    }

    let result = collection
        .update_one(id_query(raw_id), doc! { "$set": set }, None)
        .await?;
    if result.matched_count == 0 {
        return Err(ApiError::not_found("game not found"));
    }

    let game = collection
        .find_one(id_query(raw_id), None)
        .await?
        .ok_or_else(|| ApiError::not_found("game not found"))?;
    normalize_legacy_owner(&collection, game).await
}

// ---------------------------------------------------------------------------
// Borrow state machine
// ---------------------------------------------------------------------------

pub async fn borrow_game(
    db: &Database,
    raw_id: &str,
    borrower_name: &str,
    return_date: NaiveDate,
) -> Result<Game, ApiError> {
    let collection = games(db);

    // Atomic conditional transition: only an available game can flip to
    // borrowed, so of two concurrent borrowers at most one matches.
    let mut filter = id_query(raw_id);
    filter.insert("status", BorrowStatus::Available.as_str());
    let update = doc! { "$set": {
        "status": BorrowStatus::Borrowed.as_str(),
        "borrowed_by": borrower_name,
        "borrowed_date": DateTime::now(),
        "return_date": bson_date(return_date),
    }};

    let result = collection.update_one(filter, update, None).await?;
    if result.matched_count == 0 {
        return Err(match collection.find_one(id_query(raw_id), None).await? {
            Some(_) => ApiError::conflict("game is not available"),
            None => ApiError::not_found("game not found"),
        });
    }

    find_game(db, raw_id).await
}

pub async fn return_game(db: &Database, raw_id: &str) -> Result<Game, ApiError> {
    let collection = games(db);

    let mut filter = id_query(raw_id);
    filter.insert("status", BorrowStatus::Borrowed.as_str());
    let update = doc! {
        "$set": { "status": BorrowStatus::Available.as_str() },
        "$unset": { "borrowed_by": "", "borrowed_date": "", "return_date": "" },
    };

    let result = collection.update_one(filter, update, None).await?;
    if result.matched_count == 0 {
        return Err(match collection.find_one(id_query(raw_id), None).await? {
            Some(_) => ApiError::conflict("game is not borrowed"),
            None => ApiError::not_found("game not found"),
        });
    }

    find_game(db, raw_id).await
}

fn bson_date(date: NaiveDate) -> DateTime {
    DateTime::from_millis(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

// ---------------------------------------------------------------------------
// Lookup & legacy migration
// ---------------------------------------------------------------------------

pub async fn find_game(db: &Database, raw_id: &str) -> Result<Game, ApiError> {
    let collection = games(db);
    let game = collection
        .find_one(id_query(raw_id), None)
        .await?
        .ok_or_else(|| ApiError::not_found("game not found"))?;
    normalize_legacy_owner(&collection, game).await
}

/// Owner entry equivalent to a legacy flat-owner document, if the document
/// still carries one and has no owner list.
fn legacy_owner_entry(game: &Game) -> Option<Owner> {
    if !game.owners.is_empty() {
        return None;
    }
    game.owner_id.map(|user_id| Owner {
        user_id,
        name: game.owner_name.clone().unwrap_or_default(),
        added_at: DateTime::now(),
        note: None,
    })
}

/// One-shot migration executed on read: rewrite a legacy flat-owner document
/// into the owner-list shape, then hand back the normalized game. Documents
/// already in the new shape pass through untouched.
async fn normalize_legacy_owner(
    collection: &Collection<Game>,
    mut game: Game,
) -> Result<Game, ApiError> {
    let Some(owner) = legacy_owner_entry(&game) else {
        return Ok(game);
    };

    collection
        .update_one(
            doc_id_query(&game)?,
            doc! {
                "$set": { "owners": [to_bson(&owner)?] },
                "$unset": { "owner_id": "", "owner_name": "" },
            },
            None,
        )
        .await?;
    info!(bgg_id = %game.bgg_id, "migrated legacy owner fields");

    game.owners = vec![owner];
    game.owner_id = None;
    game.owner_name = None;
    Ok(game)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_query_accepts_both_schemes() {
        let oid = ObjectId::new();
        let query = id_query(&oid.to_hex());
        let branches = query.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);

        let legacy = id_query("3f2b8c1e-aaaa-bbbb-cccc-000000000000");
        assert!(legacy.get_array("$or").is_err());
        assert_eq!(
            legacy.get_str("id").unwrap(),
            "3f2b8c1e-aaaa-bbbb-cccc-000000000000"
        );
    }

    #[test]
    fn empty_list_query_matches_everything() {
        let caller = ObjectId::new();
        let filter = build_list_filter(&ListQuery::default(), &caller);
        assert!(filter.is_empty());
    }

    #[test]
    fn status_and_search_combine_conjunctively() {
        let caller = ObjectId::new();
        let query = ListQuery {
            status: Some(BorrowStatus::Available),
            search: Some("pandemic".to_string()),
            ..Default::default()
        };
        let filter = build_list_filter(&query, &caller);
        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(clauses.len(), 2);

        let search_clause = clauses[1].as_document().unwrap();
        let fields = search_clause.get_array("$or").unwrap();
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn contradictory_player_range_keeps_both_bounds() {
        let caller = ObjectId::new();
        let query = ListQuery {
            min_players: Some(5),
            max_players: Some(3),
            ..Default::default()
        };
        let filter = build_list_filter(&query, &caller);
        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(clauses.len(), 2);
        // A matching game needs max_players >= 5 AND min_players <= 3.
        assert_eq!(
            clauses[0]
                .as_document()
                .unwrap()
                .get_document("max_players")
                .unwrap()
                .get_i32("$gte")
                .unwrap(),
            5
        );
        assert_eq!(
            clauses[1]
                .as_document()
                .unwrap()
                .get_document("min_players")
                .unwrap()
                .get_i32("$lte")
                .unwrap(),
            3
        );
    }

    #[test]
    fn comma_separated_categories_become_disjunctive_membership() {
        let caller = ObjectId::new();
        let query = ListQuery {
            category: Some("Economic, Negotiation ,".to_string()),
            ..Default::default()
        };
        let filter = build_list_filter(&query, &caller);
        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(clauses.len(), 1);
        let membership = clauses[0]
            .as_document()
            .unwrap()
            .get_document("categories")
            .unwrap()
            .get_array("$in")
            .unwrap();
        assert_eq!(membership.len(), 2);
        match &membership[0] {
            Bson::RegularExpression(re) => {
                assert_eq!(re.pattern, "^Economic$");
                assert_eq!(re.options, "i");
            }
            other => panic!("expected regex, got {:?}", other),
        }
    }

    #[test]
    fn owned_toggle_scopes_to_caller() {
        let caller = ObjectId::new();
        let query = ListQuery {
            owned: Some(true),
            ..Default::default()
        };
        let filter = build_list_filter(&query, &caller);
        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(
            clauses[0]
                .as_document()
                .unwrap()
                .get_object_id("owners.user_id")
                .unwrap(),
            caller
        );
    }

    #[test]
    fn search_input_is_regex_escaped() {
        assert_eq!(regex_escape("7 Wonders (2nd ed.)"), "7 Wonders \\(2nd ed\\.\\)");
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let result: Result<GamePatch, _> =
            serde_json::from_value(serde_json::json!({ "status": "borrowed" }));
        assert!(result.is_err());
    }

    #[test]
    fn patch_rejects_mistyped_fields() {
        let result: Result<GamePatch, _> =
            serde_json::from_value(serde_json::json!({ "min_players": "three" }));
        assert!(result.is_err());
    }

    #[test]
    fn patch_merges_only_provided_fields() {
        let patch: GamePatch = serde_json::from_value(serde_json::json!({
            "title": "Catan (HU)",
            "play_time": 90,
            "moods": ["cozy", "competitive"],
        }))
        .unwrap();
        let set = patch.into_update();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get_str("title").unwrap(), "Catan (HU)");
        assert_eq!(set.get_i32("play_time").unwrap(), 90);
        assert_eq!(set.get_array("moods").unwrap().len(), 2);
    }

    #[test]
    fn legacy_flat_owner_maps_to_owner_entry() {
        let user = ObjectId::new();
        let mut game: Game = serde_json::from_value(serde_json::json!({
            "bgg_id": "13",
            "title": "Catan",
            "owner_name": "Anna",
        }))
        .unwrap();
        game.owner_id = Some(user);

        let owner = legacy_owner_entry(&game).expect("expected a migrated owner");
        assert_eq!(owner.user_id, user);
        assert_eq!(owner.name, "Anna");
        assert_eq!(owner.note, None);
    }

    #[test]
    fn documents_with_owner_lists_are_not_migrated() {
        let mut game: Game = serde_json::from_value(serde_json::json!({
            "bgg_id": "13",
            "title": "Catan",
        }))
        .unwrap();
        game.owners = vec![Owner {
            user_id: ObjectId::new(),
            name: "Bea".to_string(),
            added_at: DateTime::now(),
            note: None,
        }];
        game.owner_id = Some(ObjectId::new());

        assert!(legacy_owner_entry(&game).is_none());
    }

    #[test]
    fn borrow_due_date_converts_to_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let converted = bson_date(date);
        assert_eq!(
            converted.try_to_rfc3339_string().unwrap(),
            "2025-03-15T00:00:00Z"
        );
    }
}
