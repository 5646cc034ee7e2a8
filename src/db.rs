use anyhow::Result;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use tracing::info;

use crate::config::Config;
use crate::models::{Game, User};

pub async fn connect(config: &Config) -> Result<Database> {
    let client_options = ClientOptions::parse(&config.mongo_uri).await?;
    let client = Client::with_options(client_options)?;
    let db = client.database(&config.db_name);

    // Test the connection
    db.run_command(doc! { "ping": 1 }, None).await?;
    info!(db = %config.db_name, "connected to MongoDB");

    Ok(db)
}

/// Unique indexes backing the import-dedup and registration paths. Concurrent
/// inserts that race past the application-level checks hit these and surface
/// as duplicate-key errors.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let unique = IndexOptions::builder().unique(true).build();

    db.collection::<Game>("games")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "bgg_id": 1 })
                .options(unique.clone())
                .build(),
            None,
        )
        .await?;

    db.collection::<User>("users")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique)
                .build(),
            None,
        )
        .await?;

    Ok(())
}
