use std::env;
use std::fs;

use anyhow::Context;
use log::{info, warn};

use property_registry::intents::{self, Intent};
use property_registry::{Registry, RegistryConfig};

// Load the intent document named on the command line, if any
fn load_intents() -> anyhow::Result<Vec<Intent>> {
    let Some(path) = env::args().nth(1) else {
        warn!("No intent file given, exporting an empty ledger");
        return Ok(Vec::new());
    };

    let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let intents = intents::parse_intents(&raw).with_context(|| format!("parsing {}", path))?;
    info!("Loaded {} intents from {}", intents.len(), path);
    Ok(intents)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = RegistryConfig::from_env().context("reading registry configuration")?;
    info!(
        "Starting property registry (difficulty={}, mining_timeout={:?})",
        config.difficulty, config.mining_timeout
    );

    let registry = Registry::create(&config).await.context("creating ledger")?;
    let pending = load_intents()?;
    let report = intents::replay(&registry, &pending).await;
    info!(
        "Replay finished: {} sealed, {} refused",
        report.sealed.len(),
        report.rejected.len()
    );

    for (property_id, owner) in registry.owners() {
        info!("{} is owned by {}", property_id, owner);
    }

    match registry.validate() {
        Ok(()) => info!("Ledger of {} blocks is valid", registry.len()),
        Err(err) => warn!("Ledger failed validation: {}", err),
    }

    let snapshot = registry.snapshot();
    println!("{}", snapshot.to_json_pretty().context("serializing ledger")?);

    Ok(())
}
