//! Structured logging configuration.
//!
//! The engine logs through the `log` facade; the subscriber picks those
//! records up alongside the simulator's own `tracing` events.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize logging
///
/// Configurable log levels via the `RUST_LOG` env var, `--verbose` raises the
/// engine and simulator to debug.
///
/// # Example
///
/// ```no_run
/// tourney_sim::logging::init(false);
/// tracing::info!("Simulator starting");
/// ```
pub fn init(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(format!("{DEFAULT_FILTER},tourney=debug,tourney_sim=debug"))
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(verbose);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::debug!("Logging initialized");
}

/// Log the outcome of one generated round
pub fn log_round(tournament_id: i64, stage: &str, round: u32, matches: usize) {
    tracing::info!(
        tournament_id = tournament_id,
        stage = stage,
        round = round,
        matches = matches,
        "Round generated"
    );
}
