#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
#![allow(clippy::multiple_crate_versions)]

use clap::Parser;
use crowdstore::cli::{Cli, Commands, EngineConfig};
use crowdstore::storage::{Config, JsonFileStorage};
use crowdstore::{Engine, Planner, WriteMode, server};
use std::sync::Arc;
use tokio::sync::Mutex;

fn open_engine(cfg: &EngineConfig) -> anyhow::Result<Engine> {
    let storage = JsonFileStorage::open(&Config {
        data_file: cfg.database.clone(),
        pretty: !cfg.compact,
    });
    let planner = if cfg.lenient {
        Planner::lenient()
    } else {
        Planner::new()
    };
    let write_mode = if cfg.deferred {
        WriteMode::Deferred
    } else {
        WriteMode::WriteThrough
    };
    Ok(Engine::open(storage)?
        .with_planner(planner)
        .with_write_mode(write_mode))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(cmd) => {
            let engine = open_engine(&cmd.engine_config)?;
            println!("{}", engine.location());
        }
        Commands::Query(cmd) => {
            let mut engine = open_engine(&cmd.engine_config)?;
            let (output, stats) = engine.dispatch(cmd.mode, &cmd.statement, &cmd.params)?;
            engine.flush()?;
            log::debug!("{stats:?}");
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Exec(cmd) => {
            let mut engine = open_engine(&cmd.engine_config)?;
            let removed = engine.exec(&cmd.script)?;
            engine.flush()?;
            println!("{removed}");
        }
        Commands::Explain(cmd) => {
            let engine = open_engine(&cmd.engine_config)?;
            print!("{}", engine.explain(&cmd.statement)?);
        }
        Commands::Start(cmd) => {
            let engine = Arc::new(Mutex::new(open_engine(&cmd.engine_config)?));
            let server = server::start_server(engine.clone(), &cmd.server_config.address);
            tokio::select! {
                result = server => result?,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Shutting down");
                }
            }
            engine.lock().await.flush()?;
        }
    }

    Ok(())
}
