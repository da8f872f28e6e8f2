use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use moneyline_backtest::backtest::{self, BacktestConfig, GameSnapshot, arg_value, format_pct, roi};
use moneyline_backtest::decision::{DecisionConfig, FavoriteFilter, SideFilter};
use moneyline_backtest::settlement::RunState;

const DEFAULT_THRESHOLDS: &[f64] = &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
const DEFAULT_TOP: usize = 15;

#[derive(Debug, Clone, Copy)]
struct SweepRow {
    decision: DecisionConfig,
    state: RunState,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = BacktestConfig::from_env_and_args(&args).context("invalid configuration")?;
    let thresholds = parse_thresholds_arg(&args).unwrap_or_else(|| DEFAULT_THRESHOLDS.to_vec());
    let top = parse_usize_arg(&args, "--top").unwrap_or(DEFAULT_TOP);

    let client = cfg.build_client();
    let (snapshots, failed) = backtest::collect_snapshots(&client, &cfg);
    if snapshots.is_empty() {
        return Err(anyhow!("no games could be collected ({failed} failed)"));
    }

    let grid = build_grid(&cfg.decision, &thresholds);
    let mut rows = evaluate(&snapshots, &grid);
    rows.sort_by(|a, b| {
        b.state
            .bankroll
            .partial_cmp(&a.state.bankroll)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    println!("Decision sweep");
    println!(
        "League: {}  games: {}  skipped: {}  configs: {}",
        cfg.league,
        snapshots.len(),
        failed,
        grid.len()
    );
    println!("Upsets: {}  bet amount: {:.2}", cfg.decision.upset, cfg.decision.bet_amount);
    println!();

    for r in rows.iter().take(top) {
        println!(
            "side={:<4} fav={:<8} threshold={:>5.1} bets={:>4} won={:>4} bankroll={:>10.2} roi={}",
            r.decision.side,
            r.decision.favorite,
            r.decision.threshold,
            r.state.bets_placed,
            r.state.bets_won,
            r.state.bankroll,
            format_pct(roi(&r.state, r.decision.bet_amount))
        );
    }

    Ok(())
}

fn build_grid(base: &DecisionConfig, thresholds: &[f64]) -> Vec<DecisionConfig> {
    let mut out = Vec::new();
    for side in SideFilter::ALL {
        for favorite in FavoriteFilter::ALL {
            for &threshold in thresholds {
                out.push(DecisionConfig {
                    side,
                    favorite,
                    threshold,
                    ..*base
                });
            }
        }
    }
    out
}

fn evaluate(snapshots: &[GameSnapshot], grid: &[DecisionConfig]) -> Vec<SweepRow> {
    grid.par_iter()
        .map(|decision| SweepRow {
            decision: *decision,
            state: backtest::replay(snapshots, decision),
        })
        .collect()
}

fn parse_thresholds_arg(args: &[String]) -> Option<Vec<f64>> {
    let raw = arg_value(args, "--thresholds")?;
    let values = raw
        .split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect::<Vec<_>>();
    if values.is_empty() { None } else { Some(values) }
}

fn parse_usize_arg(args: &[String], name: &str) -> Option<usize> {
    arg_value(args, name).and_then(|v| v.trim().parse::<usize>().ok())
}
