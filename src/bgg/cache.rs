use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::Game;

/// TTL + capacity bounded snapshot cache for fetched game details, keyed by
/// catalog id. Owned by the BGG client; shared across in-flight requests.
pub struct DetailsCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    stored_at: Instant,
    game: Game,
}

impl DetailsCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, bgg_id: &str) -> Option<Game> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(bgg_id) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.game.clone()),
            Some(_) => {
                entries.remove(bgg_id);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, bgg_id: &str, game: Game) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity && !entries.contains_key(bgg_id) {
            Self::evict(&mut entries, self.ttl);
        }
        entries.insert(
            bgg_id.to_string(),
            Entry {
                stored_at: Instant::now(),
                game,
            },
        );
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries; if nothing expired, drop the oldest entry so an
    /// insert always has room.
    fn evict(entries: &mut HashMap<String, Entry>, ttl: Duration) {
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        if entries.len() < before {
            return;
        }
        if let Some(oldest) = entries
            .iter()
            .max_by_key(|(_, entry)| entry.stored_at.elapsed())
            .map(|(key, _)| key.clone())
        {
            entries.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_game(bgg_id: &str) -> Game {
        serde_json::from_value(serde_json::json!({
            "bgg_id": bgg_id,
            "title": format!("Game {}", bgg_id),
        }))
        .unwrap()
    }

    #[test]
    fn hit_within_ttl_returns_the_snapshot() {
        let cache = DetailsCache::new(Duration::from_secs(60), 10);
        cache.put("13", sample_game("13"));
        let game = cache.get("13").expect("expected cache hit");
        assert_eq!(game.bgg_id, "13");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entry_misses_and_is_pruned() {
        let cache = DetailsCache::new(Duration::from_nanos(1), 10);
        cache.put("13", sample_game("13"));
        std::thread::sleep(Duration::from_millis(1));
        assert!(cache.get("13").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn capacity_bound_evicts_the_oldest() {
        let cache = DetailsCache::new(Duration::from_secs(60), 2);
        cache.put("1", sample_game("1"));
        std::thread::sleep(Duration::from_millis(1));
        cache.put("2", sample_game("2"));
        std::thread::sleep(Duration::from_millis(1));
        cache.put("3", sample_game("3"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("1").is_none());
        assert!(cache.get("3").is_some());
    }

    #[test]
    fn reinserting_an_existing_key_does_not_evict() {
        let cache = DetailsCache::new(Duration::from_secs(60), 2);
        cache.put("1", sample_game("1"));
        cache.put("2", sample_game("2"));
        cache.put("2", sample_game("2"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("1").is_some());
    }
}
