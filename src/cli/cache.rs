use crate::cache::CacheStore;
use crate::config::Config;

use super::CacheAction;

pub(crate) async fn run(action: CacheAction, config: &Config) -> anyhow::Result<()> {
    let store = CacheStore::open(&config.cache);

    match action {
        CacheAction::Clear => {
            if store.clear().await {
                println!("Cache cleared");
            } else {
                println!("Memory cache cleared, durable tier unavailable");
            }
        }
        CacheAction::Cleanup => match store.cleanup().await {
            Some(removed) => println!("Removed {removed} expired entries"),
            None => println!("Nothing removed, durable tier unavailable"),
        },
        CacheAction::Stats => {
            let stats = store.stats().await;
            println!("Cache file: {}", config.cache.db_path.display());
            println!("Memory entries: {}", stats.memory_entries);
            match stats.durable_entries {
                Some(n) => println!("Durable entries: {n}"),
                None => println!("Durable entries: unavailable"),
            }
        }
    }

    Ok(())
}
