#![deny(warnings)]

use persistence::{default_sqlite_url, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("CPQ_DATABASE_URL").unwrap_or_else(|_| default_sqlite_url().into());
    if let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Store::connect(&url).await?;
    println!("DB migrated at {}", url);
    Ok(())
}
