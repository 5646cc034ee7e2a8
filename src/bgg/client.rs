use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::{BorrowStatus, Game};
use crate::retry::{RetryCause, RetryPolicy};
use crate::text;

use super::cache::DetailsCache;
use super::xml::{self, ThingItem};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SEARCH_RESULTS: usize = 10;
const MAX_AUTHORS: usize = 3;
const MAX_CATEGORIES: usize = 5;

/// One search hit as served by the API; thumbnails are filled in by a
/// best-effort secondary lookup.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Client for the BoardGameGeek XMLAPI2. Owns the details cache and the
/// retry schedule; safe to share behind an `Arc`.
pub struct BggClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    cache: DetailsCache,
}

impl BggClient {
    pub fn new(
        base_url: impl Into<String>,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::upstream(),
            cache: DetailsCache::new(cache_ttl, cache_capacity),
        })
    }

    pub fn cache(&self) -> &DetailsCache {
        &self.cache
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let query = query.trim();
        if query.chars().count() < 2 {
            return Err(ApiError::invalid_input(
                "search query must be at least 2 characters",
            ));
        }

        let body = self
            .fetch_xml("/search", &[("query", query), ("type", "boardgame")])
            .await?;
        let items = xml::parse_search(&body).map_err(invalid_response)?;
        Ok(truncate_results(items))
    }

    /// Search plus one batched `/thing` lookup for thumbnails. A failed
    /// thumbnail lookup never fails the search.
    pub async fn search_with_thumbnails(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let mut results = self.search(query).await?;
        if results.is_empty() {
            return Ok(results);
        }

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        match self.fetch_things(&ids).await {
            Ok(things) => {
                let mut thumbnails: HashMap<String, String> = things
                    .into_iter()
                    .filter_map(|t| t.thumbnail.map(|thumb| (t.id, thumb)))
                    .collect();
                for result in &mut results {
                    result.thumbnail = thumbnails.remove(&result.id);
                }
            }
            Err(err) => warn!(error = %err, "thumbnail lookup failed, returning bare results"),
        }
        Ok(results)
    }

    /// Detail lookup, cache-checked first. Returns an unpersisted `Game`
    /// snapshot with normalized descriptions and capped list fields.
    pub async fn details(&self, bgg_id: &str) -> Result<Game, ApiError> {
        if let Some(game) = self.cache.get(bgg_id) {
            debug!(bgg_id, "details cache hit");
            return Ok(game);
        }

        let things = self.fetch_things(&[bgg_id]).await?;
        let thing = things
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(format!("no game with BGG id {bgg_id}")))?;
        let game = build_game(thing);
        self.cache.put(bgg_id, game.clone());
        Ok(game)
    }

    /// Overlay an enriched snapshot so later cache hits keep the
    /// translated fields.
    pub fn update_cached(&self, bgg_id: &str, game: &Game) {
        self.cache.put(bgg_id, game.clone());
    }

    async fn fetch_things(&self, ids: &[&str]) -> Result<Vec<ThingItem>, ApiError> {
        let joined = ids.join(",");
        let body = self
            .fetch_xml("/thing", &[("id", joined.as_str()), ("stats", "1")])
            .await?;
        xml::parse_things(&body).map_err(invalid_response)
    }

    /// GET with the shared retry schedule: 202 means BGG is still preparing
    /// the response, timeouts get a shorter backoff, anything else fails.
    async fn fetch_xml(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let cause = match self.http.get(&url).query(params).send().await {
                Ok(resp) if resp.status() == StatusCode::ACCEPTED => RetryCause::StillProcessing,
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| ApiError::UpstreamUnavailable(e.to_string()))?;
                    return Ok(bytes.to_vec());
                }
                Ok(resp) => {
                    return Err(ApiError::UpstreamUnavailable(format!(
                        "{} returned HTTP {}",
                        url,
                        resp.status()
                    )));
                }
                Err(err) if err.is_timeout() => RetryCause::TimedOut,
                Err(err) => return Err(ApiError::UpstreamUnavailable(err.to_string())),
            };

            match self.retry.next_delay(attempt, cause) {
                Some(delay) => {
                    debug!(url = %url, attempt, ?cause, "retrying BGG request");
                    sleep(delay).await;
                }
                None => {
                    return Err(ApiError::UpstreamUnavailable(format!(
                        "{} gave no answer after {} attempts",
                        url, attempt
                    )));
                }
            }
        }
    }
}

fn invalid_response(err: xml::ParseError) -> ApiError {
    ApiError::UpstreamInvalidResponse(err.to_string())
}

/// Keep upstream ordering, cap at the first ten hits.
fn truncate_results(items: Vec<xml::SearchItem>) -> Vec<SearchResult> {
    items
        .into_iter()
        .take(MAX_SEARCH_RESULTS)
        .map(|item| SearchResult {
            id: item.id,
            name: item.name,
            year: item.year,
            thumbnail: None,
        })
        .collect()
}

fn build_game(thing: ThingItem) -> Game {
    let description = text::strip_markup(&thing.description);
    let description_short = text::derive_short_description(&description);
    let rules_link = format!("https://boardgamegeek.com/boardgame/{}/rules", thing.id);

    let mut authors = thing.designers;
    authors.truncate(MAX_AUTHORS);
    let mut categories = thing.categories;
    categories.truncate(MAX_CATEGORIES);

    Game {
        id: None,
        legacy_id: None,
        bgg_id: thing.id,
        title: thing.title,
        title_hu: None,
        authors,
        cover_image: thing.image.or(thing.thumbnail),
        min_players: thing.min_players,
        max_players: thing.max_players,
        play_time: thing.play_time,
        min_age: thing.min_age,
        complexity_rating: thing.complexity,
        bgg_rating: thing.bgg_rating,
        rules_link,
        release_year: thing.year,
        categories,
        game_types: Vec::new(),
        moods: Vec::new(),
        language: "en".to_string(),
        description,
        description_short,
        description_hu: None,
        description_short_hu: None,
        status: BorrowStatus::Available,
        borrowed_by: None,
        borrowed_date: None,
        return_date: None,
        owners: Vec::new(),
        owner_id: None,
        owner_name: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgg::xml::SearchItem;

    #[tokio::test]
    async fn short_queries_are_rejected_before_any_request() {
        let client = BggClient::new(
            "http://127.0.0.1:0",
            Duration::from_secs(60),
            16,
        )
        .unwrap();
        for query in ["", " ", "a", " b "] {
            let err = client.search(query).await.expect_err("expected rejection");
            assert_eq!(err.kind(), "invalid_input");
        }
    }

    #[test]
    fn search_results_are_capped_at_ten_in_upstream_order() {
        let items: Vec<SearchItem> = (0..12)
            .map(|i| SearchItem {
                id: i.to_string(),
                name: format!("Game {}", i),
                year: None,
            })
            .collect();
        let results = truncate_results(items);
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].id, "0");
        assert_eq!(results[9].id, "9");
    }

    #[test]
    fn build_game_caps_lists_and_normalizes_description() {
        let thing = ThingItem {
            id: "13".to_string(),
            title: "CATAN".to_string(),
            year: 1995,
            thumbnail: Some("thumb.jpg".to_string()),
            image: Some("full.jpg".to_string()),
            min_players: 3,
            max_players: 4,
            play_time: 120,
            min_age: 10,
            bgg_rating: 7.1,
            complexity: 2.3,
            designers: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            categories: vec![
                "1".into(),
                "2".into(),
                "3".into(),
                "4".into(),
                "5".into(),
                "6".into(),
            ],
            description: "In <b>CATAN</b>, players settle an island rich in resources &amp; trade routes.&#10;&#10;More prose."
                .to_string(),
        };

        let game = build_game(thing);
        assert_eq!(game.authors.len(), 3);
        assert_eq!(game.categories.len(), 5);
        assert_eq!(game.cover_image.as_deref(), Some("full.jpg"));
        assert_eq!(game.status, BorrowStatus::Available);
        assert!(game.description.starts_with("In CATAN, players settle"));
        assert!(!game.description.contains('<'));
        assert_eq!(
            game.description_short,
            "In CATAN, players settle an island rich in resources & trade routes."
        );
        assert_eq!(game.rules_link, "https://boardgamegeek.com/boardgame/13/rules");
    }
}
