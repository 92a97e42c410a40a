//! Run a scenario from a JSON file and print its events as JSON lines.
//!
//! ```bash
//! emosim scenario.json [seed]
//! ```
//!
//! Environment:
//! - `EMOSIM_ORACLE` -- `scripted` (default), `openai`, or `anthropic`.
//! - `EMOSIM_API_URL` / `EMOSIM_API_KEY` -- HTTP backend settings.
//! - `DATABASE_URL` -- when set, persist to `PostgreSQL` instead of memory.
//! - `EMOSIM_OBSERVER_ADDR` -- when set, serve the WebSocket observer too.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use emosim_db::{PersistBackend, PgStore, PostgresConfig};
use emosim_engine::{EngineConfig, RunManager};
use emosim_oracle::{AnthropicBackend, BackendConfig, LlmOracle, OpenAiBackend, ScriptedOracle};
use emosim_types::{ControlAction, EventType, Scenario};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        return Err("usage: emosim <scenario.json> [seed]".into());
    };
    let seed: Option<u64> = args.next().map(|s| s.parse()).transpose()?;

    let raw = std::fs::read_to_string(&path)?;
    let scenario: Scenario = serde_json::from_str(&raw)?;
    scenario.validate()?;

    let store = Arc::new(build_store().await?);
    let recovered = store.recover_interrupted_runs().await?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "interrupted runs reset to paused");
    }

    let oracle = Arc::new(build_oracle());
    let manager = Arc::new(RunManager::new(store, oracle, EngineConfig::default()));

    if let Ok(addr) = std::env::var("EMOSIM_OBSERVER_ADDR") {
        let observer_manager = Arc::clone(&manager);
        tokio::spawn(async move {
            if let Err(e) = emosim_observer::serve(observer_manager, &addr).await {
                tracing::error!(error = %e, "observer server failed");
            }
        });
    }

    manager.register_scenario(&scenario).await?;
    let run = manager.create_run(scenario.id, seed, None).await?;
    info!(run_id = %run.id, seed = run.seed, "starting run");

    let mut events = manager.subscribe(run.id)?;
    manager.control_run(run.id, ControlAction::Start).await?;

    while let Some(envelope) = events.recv().await {
        println!("{}", serde_json::to_string(&envelope)?);
        if matches!(
            envelope.event,
            EventType::RunCompleted | EventType::RunStopped | EventType::Error
        ) {
            break;
        }
    }

    let final_run = manager.get_run(run.id).await?;
    info!(run_id = %run.id, status = ?final_run.status, steps = final_run.current_step, "run finished");
    Ok(())
}

async fn build_store() -> Result<PersistBackend, Box<dyn std::error::Error>> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = PgStore::connect(&PostgresConfig {
                url,
                max_connections: 8,
            })
            .await?;
            Ok(PersistBackend::Postgres(store))
        }
        Err(_) => Ok(PersistBackend::memory()),
    }
}

fn build_oracle() -> LlmOracle {
    let config = BackendConfig {
        api_url: std::env::var("EMOSIM_API_URL")
            .unwrap_or_else(|_| String::from("http://localhost:11434/v1")),
        api_key: std::env::var("EMOSIM_API_KEY").unwrap_or_else(|_| String::from("ollama")),
        max_tokens: 1024,
    };
    match std::env::var("EMOSIM_ORACLE").as_deref() {
        Ok("openai") => LlmOracle::OpenAi(OpenAiBackend::new(config)),
        Ok("anthropic") => LlmOracle::Anthropic(AnthropicBackend::new(config)),
        _ => LlmOracle::Scripted(ScriptedOracle::new()),
    }
}
