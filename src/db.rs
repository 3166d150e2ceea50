use std::time::Duration;

use anyhow::Result;
use mongodb::{options::ClientOptions, Client, Database};

use crate::config::Config;

/// Connects with bounded timeouts and pings once, so a dead database fails
/// startup instead of hanging the first request.
pub async fn connect(config: &Config) -> Result<(Client, Database)> {
    let mut options = ClientOptions::parse(&config.mongodb_uri).await?;
    options.connect_timeout = Some(Duration::from_secs(5));
    options.server_selection_timeout = Some(Duration::from_secs(5));
    let client = Client::with_options(options)?;

    let db = client.database(&config.mongodb_db);
    db.run_command(mongodb::bson::doc! { "ping": 1 }, None)
        .await?;

    Ok((client, db))
}
