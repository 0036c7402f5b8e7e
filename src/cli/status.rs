use crate::backend::durable::CacheStore;
use anyhow::Result;

pub async fn execute(store: &CacheStore, database_url: &str) -> Result<()> {
    println!("=== Cache Store Status ===\n");
    println!("Database: {}", database_url);

    match store.get_meta().await? {
        Some(meta) => {
            println!("Version:  {}", meta.version);
            if meta.clean_up {
                println!("Cleanup:  ⚠️ interrupted wipe, completed on next open");
            }
        }
        None => println!("Version:  (not stamped)"),
    }

    println!("Entries:  {}", store.count().await?);

    let namespaces = store.namespaces().await?;
    if namespaces.is_empty() {
        println!("\nNo namespaces stored.");
        return Ok(());
    }

    println!("\nNamespaces:");
    for ns in namespaces {
        println!("  - {}", ns);
    }
    Ok(())
}
