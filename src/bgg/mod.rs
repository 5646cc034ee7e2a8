//! BoardGameGeek XMLAPI2 integration: HTTP client with bounded retries,
//! payload parsing, and the TTL details cache.

pub mod cache;
pub mod client;
pub mod xml;

pub use cache::DetailsCache;
pub use client::{BggClient, SearchResult};
