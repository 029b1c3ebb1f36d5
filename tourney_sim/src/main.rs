//! Tournament simulator.
//!
//! Runs one event end to end against the in-memory store or PostgreSQL and
//! prints the final standings.

use std::sync::Arc;

use anyhow::Error;
use pico_args::Arguments;
use tourney::clock::SystemClock;
use tourney::db::{Database, MemoryRepository, PgRepository, Repository};
use tourney::tournament::TournamentFormat;
use tourney::{Collaborators, Engine};
use tourney_sim::{Overrides, SimConfig, Simulation, format_standings, logging};
use tracing::info;

const HELP: &str = "\
Simulate a tournament from registration to final standings

USAGE:
  tourney_sim [OPTIONS]

OPTIONS:
  --format     NAME        swiss, swiss_top_cut, single_elimination, double_elimination,
                           round_robin, league, gauntlet, group_brackets, custom  [default: env SIM_FORMAT or swiss]
  --players    N           Number of registering players  [default: env SIM_PLAYERS or 16]
  --capacity   N           Seats  [default: env SIM_CAPACITY or player count]
  --top-cut    N           Top-cut size for swiss_top_cut  [default: 8]
  --seed       N           RNG seed for reproducible runs
  --db-url     URL         Use PostgreSQL instead of the in-memory store  [default: env DATABASE_URL]

FLAGS:
  -v, --verbose            Debug logging for the engine
  -h, --help               Print help information

ENVIRONMENT:
  RUST_LOG                 Log filter (overrides --verbose)
  SIM_DRAW_PERCENT         Chance of a drawn match  [default: 5]
  SIM_DISPUTE_PERCENT      Chance of a disputed report  [default: 5]
  SIM_PRIZE_CENTS          Store credit for the winner  [default: 0]
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let verbose = pargs.contains(["-v", "--verbose"]);
    let overrides = Overrides {
        database_url: pargs.opt_value_from_str("--db-url")?,
        format: pargs.opt_value_from_fn("--format", |s| s.parse::<TournamentFormat>())?,
        players: pargs.opt_value_from_str("--players")?,
        capacity: pargs.opt_value_from_str("--capacity")?,
        top_cut: pargs.opt_value_from_str("--top-cut")?,
        seed: pargs.opt_value_from_str("--seed")?,
    };

    logging::init(verbose);
    let config = SimConfig::from_env(overrides)?;

    let repo: Arc<dyn Repository> = match &config.database {
        Some(db_config) => {
            info!("Connecting to database");
            let db = Database::new(db_config)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
            db.migrate()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create the schema: {}", e))?;
            Arc::new(PgRepository::new(Arc::new(db.pool().clone())))
        }
        None => {
            info!("Using the in-memory store");
            Arc::new(MemoryRepository::new())
        }
    };

    let engine = Engine::new(
        Arc::clone(&repo),
        Arc::new(SystemClock),
        config.engine.clone(),
        Collaborators::default(),
    );

    info!(
        "Simulating {} with {} players",
        config.event.format, config.event.players
    );
    let summary = Simulation::new(repo, engine, config.event.clone())
        .run()
        .await?;

    println!(
        "Tournament {} finished: {} rounds, {} matches, {} disputes",
        summary.tournament_id, summary.rounds, summary.matches, summary.disputes
    );
    if summary.result.prize_issued {
        println!("Prize credit issued to the winner");
    }
    print!("{}", format_standings(&summary.result.standings, &summary.names));

    Ok(())
}
