//! trackql CLI: the `trackql` command.

mod cli;
mod commands;
mod parse;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "TRACKQL_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Commands::Render { query, json } => commands::render::run(config, query, json),

        Commands::Search { query, count, json } => {
            commands::search::run(config, query, count, json)
        }

        Commands::Create {
            record_type,
            sets,
            key,
            parent,
            json,
        } => commands::create::run(
            config,
            commands::create::Args {
                record_type,
                sets,
                key,
                parent,
                json,
            },
        ),

        Commands::Update {
            record_type,
            key,
            sets,
            unsets,
            parent,
            detach,
            json,
        } => commands::update::run(
            config,
            commands::update::Args {
                record_type,
                key,
                sets,
                unsets,
                parent,
                detach,
                json,
            },
        ),

        Commands::Delete { key, json } => commands::delete::run(config, key, json),

        Commands::Get { key, json } => commands::get::run(config, key, json),
    }
}
