use crate::backend::durable::{store::KEY_SEPARATOR, CacheStore};
use crate::cli::KeysArgs;
use anyhow::Result;

pub async fn execute(store: &CacheStore, args: &KeysArgs) -> Result<()> {
    let prefix = format!("{}{}", args.namespace, KEY_SEPARATOR);
    let keys = store.keys_with_prefix(&prefix).await?;

    if keys.is_empty() {
        println!("No keys stored for namespace: {}", args.namespace);
        return Ok(());
    }

    for key in &keys {
        println!("{}", key);
    }
    println!("\n{} key(s) in {}", keys.len(), args.namespace);
    Ok(())
}
