use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use anyql::memory::sample_provider;
use anyql::{Engine, EngineConfig, ExecutionOptions};

const DEFAULT_QUERY: &str =
    "SELECT City, Count() AS People FROM #a.entities() WHERE City IS NOT NULL GROUP BY City ORDER BY City";

// TODO: main should read queries in a loop, like a REPL.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env().context("reading ANYQL_* settings")?;
    let engine = Engine::new(Arc::new(sample_provider()), config);
    let query = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_QUERY.to_string());
    println!("Doing query: {}", query);
    let artifact = engine.compile(&query)?;
    println!("{}", artifact.explain());
    println!("-----");
    let table = engine.execute(&artifact, &ExecutionOptions::default())?;
    table.print(false);
    Ok(())
}
