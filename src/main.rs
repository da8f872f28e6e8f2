use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use moneyline_backtest::backtest::{self, BacktestConfig, arg_value};
use moneyline_backtest::ledger_export;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = BacktestConfig::from_env_and_args(&args).context("invalid configuration")?;
    info!(
        league = %cfg.league,
        start = cfg.start_event,
        games = cfg.games,
        provider = ?cfg.provider,
        cache = ?cfg.cache,
        "starting backtest"
    );

    let client = cfg.build_client();
    let report = backtest::run(&client, &cfg);

    println!("{report}");

    if let Some(path) = parse_export_arg(&args) {
        let out = ledger_export::export_ledger(&path, &report)?;
        println!("Exported {} bets to {}", out.bets, path.display());
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn parse_export_arg(args: &[String]) -> Option<PathBuf> {
    arg_value(args, "--export")
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}
