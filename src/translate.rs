//! Best-effort Hungarian enrichment against a hosted text service.
//!
//! The backend speaks a two-endpoint JSON contract (`/translate`,
//! `/summarize`). An unconfigured or failing backend never fails the
//! request that triggered enrichment: games simply stay untranslated.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::models::Game;
use crate::retry::{RetryCause, RetryPolicy};
use crate::text;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const TARGET_LOCALE: &str = "hu";
const SUMMARY_CAP: usize = 250;
const FALLBACK_SUMMARY_CAP: usize = 200;

pub struct Translator {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

impl Translator {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
            retry: RetryPolicy::upstream(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Translate `text`; `None` when the backend is unconfigured or fails.
    pub async fn translate(&self, text: &str, target: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        match self.call("translate", text, target).await {
            Ok(translated) => Some(translated),
            Err(reason) => {
                debug!(reason, "translation unavailable, keeping source text");
                None
            }
        }
    }

    /// Summarize `text`, capped at 250 characters. Always produces output:
    /// a failing backend degrades to the first-sentence heuristic.
    pub async fn summarize(&self, text: &str, target: &str) -> String {
        match self.call("summarize", text, target).await {
            Ok(summary) => text::cap_chars(&summary, SUMMARY_CAP),
            Err(reason) => {
                debug!(reason, "summarization unavailable, using sentence heuristic");
                text::first_sentence_summary(text, FALLBACK_SUMMARY_CAP)
            }
        }
    }

    /// Fill the Hungarian fields of a freshly imported game. Title and long
    /// description translate concurrently; the short description summarizes
    /// the translated text and therefore runs after it. Partial failures
    /// leave individual fields empty.
    pub async fn enrich_game(&self, game: &mut Game) {
        if !self.is_enabled() {
            return;
        }

        let (title_hu, description_hu) = tokio::join!(
            self.translate(&game.title, TARGET_LOCALE),
            self.translate(&game.description, TARGET_LOCALE),
        );
        game.title_hu = title_hu;
        game.description_hu = description_hu;

        if let Some(long_hu) = game.description_hu.clone() {
            game.description_short_hu = Some(self.summarize(&long_hu, TARGET_LOCALE).await);
        }

        if game.title_hu.is_none() && game.description_hu.is_none() {
            warn!(bgg_id = %game.bgg_id, "enrichment produced no translated fields");
        }
    }

    async fn call(&self, op: &str, text: &str, target: &str) -> Result<String, String> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| "translation backend not configured".to_string())?;
        let url = format!("{}/{}", base, op);
        let payload = TextRequest { text, target };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut request = self.http.post(&url).json(&payload);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let cause = match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: TextResponse =
                        resp.json().await.map_err(|e| e.to_string())?;
                    return Ok(body.text);
                }
                Ok(resp) => return Err(format!("{} returned HTTP {}", url, resp.status())),
                Err(err) if err.is_timeout() => RetryCause::TimedOut,
                Err(err) => return Err(err.to_string()),
            };

            match self.retry.next_delay(attempt, cause) {
                Some(delay) => sleep(delay).await,
                None => return Err(format!("{} timed out after {} attempts", url, attempt)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_translator() -> Translator {
        Translator::new(None, None).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_translate_yields_none() {
        let translator = disabled_translator();
        assert_eq!(translator.translate("Catan", "hu").await, None);
    }

    #[tokio::test]
    async fn unconfigured_summarize_falls_back_to_first_sentence() {
        let translator = disabled_translator();
        let summary = translator
            .summarize("Első mondat a játékról. Második mondat.", "hu")
            .await;
        assert_eq!(summary, "Első mondat a játékról.");
    }

    #[tokio::test]
    async fn summarize_fallback_truncates_long_sentences() {
        let translator = disabled_translator();
        let long = "szó ".repeat(100);
        let summary = translator.summarize(&long, "hu").await;
        assert!(summary.chars().count() <= FALLBACK_SUMMARY_CAP + 1);
        assert!(summary.ends_with('\u{2026}'));
    }

    #[tokio::test]
    async fn enrichment_is_a_noop_when_disabled() {
        let translator = disabled_translator();
        let mut game: Game = serde_json::from_value(serde_json::json!({
            "bgg_id": "13",
            "title": "Catan",
            "description": "Trade and build.",
        }))
        .unwrap();
        translator.enrich_game(&mut game).await;
        assert_eq!(game.title_hu, None);
        assert_eq!(game.description_hu, None);
        assert_eq!(game.description_short_hu, None);
    }
}
