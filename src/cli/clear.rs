use crate::backend::durable::{store::KEY_SEPARATOR, CacheStore};
use crate::cli::ClearArgs;
use anyhow::Result;
use std::io::Write;

pub async fn execute(store: &CacheStore, args: &ClearArgs) -> Result<()> {
    let target = args.namespace.as_deref().unwrap_or("all namespaces");

    if !args.yes {
        print!("Delete stored entries of {}? [y/N]: ", target);
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim().to_lowercase() != "y" {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    let removed = match &args.namespace {
        Some(ns) => {
            store
                .delete_prefix(&format!("{}{}", ns, KEY_SEPARATOR))
                .await?
        }
        None => store.delete_all().await?,
    };

    println!("✅ {} entries removed from {}", removed, target);
    Ok(())
}
