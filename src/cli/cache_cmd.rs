use anyhow::Result;

use crate::cli::daily_cmd::resolve_provider;
use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::config::AppConfig;
use crate::core::cost::cache::CacheStore;
use crate::core::cost::provider::Provider;

fn store_for(provider: Provider, config: &AppConfig) -> CacheStore {
    config.scan.scan_options(provider, false).cache_store()
}

pub fn path(provider: Option<&str>, config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    let provider = resolve_provider(provider, config)?;
    let store = store_for(provider, config);
    match opts.format {
        OutputFormat::Text => println!("{}", store.path().display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "provider": provider.id(), "path": store.path().display().to_string() })
        ),
    }
    Ok(())
}

pub fn clear(provider: Option<&str>, config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    let providers: Vec<Provider> = match provider {
        Some(id) => vec![resolve_provider(Some(id), config)?],
        None => Provider::all().to_vec(),
    };

    let mut results = Vec::new();
    for provider in providers {
        let store = store_for(provider, config);
        let removed = store.clear()?;
        match opts.format {
            OutputFormat::Text if removed => println!("Removed {}", store.path().display()),
            OutputFormat::Text => println!("No cache at {}", store.path().display()),
            OutputFormat::Json => results.push(serde_json::json!({
                "provider": provider.id(),
                "path": store.path().display().to_string(),
                "removed": removed,
            })),
        }
    }
    if matches!(opts.format, OutputFormat::Json) {
        println!("{}", serde_json::Value::Array(results));
    }
    Ok(())
}
