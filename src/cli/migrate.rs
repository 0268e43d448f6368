use crate::config::BeaconConfig;
use crate::error::Result;
use crate::store::Store;

/// Execute the `migrate` command: bring the schema up to date.
pub async fn execute(mut config: BeaconConfig, database_url: Option<String>) -> Result<()> {
    if let Some(url) = database_url {
        config.database.url = url;
    }

    let store = Store::connect(&config.database).await?;
    store.migrate().await?;

    println!("Migrations applied to {}", config.database.url);
    Ok(())
}
