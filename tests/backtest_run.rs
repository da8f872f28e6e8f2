use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use moneyline_backtest::backtest::{self, BacktestConfig, CacheBackend, GameSnapshot};
use moneyline_backtest::cache_store::{CacheStore, MemoryStore};
use moneyline_backtest::decision::{DecisionConfig, FavoriteFilter, SideFilter, UpsetFilter};
use moneyline_backtest::error::FetchError;
use moneyline_backtest::league::League;
use moneyline_backtest::market_data::{MarketDataClient, Provider, RecordKind};
use moneyline_backtest::synthetic_feed::SyntheticProvider;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

/// Serves the fixture game for a set of known event ids, 404 for everything else.
struct FixtureProvider {
    known: Vec<String>,
    calls: RefCell<HashMap<(RecordKind, String), usize>>,
}

impl FixtureProvider {
    fn new(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|s| s.to_string()).collect(),
            calls: RefCell::new(HashMap::new()),
        }
    }

    fn calls_for(&self, kind: RecordKind, event_id: &str) -> usize {
        self.calls
            .borrow()
            .get(&(kind, event_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.borrow().values().sum()
    }
}

impl Provider for FixtureProvider {
    fn fetch(
        &self,
        kind: RecordKind,
        _league: League,
        event_id: &str,
    ) -> Result<String, FetchError> {
        *self
            .calls
            .borrow_mut()
            .entry((kind, event_id.to_string()))
            .or_insert(0) += 1;
        if !self.known.iter().any(|k| k == event_id) {
            return Err(FetchError::Transport {
                status: 404,
                url: format!("fixture://{}/{event_id}", kind.prefix()),
            });
        }
        let name = match kind {
            RecordKind::Odds => "espn_odds.json",
            RecordKind::Prediction => "espn_predictor.json",
            RecordKind::Results => "espn_summary.json",
        };
        Ok(read_fixture(name))
    }
}

fn scenario_decision() -> DecisionConfig {
    DecisionConfig {
        side: SideFilter::Both,
        favorite: FavoriteFilter::Both,
        upset: UpsetFilter::NoUpset,
        threshold: 5.0,
        bet_amount: 100.0,
    }
}

fn scenario_config(start: u64, games: u32) -> BacktestConfig {
    BacktestConfig {
        league: League::Nba,
        start_event: start,
        games,
        decision: scenario_decision(),
        cache: CacheBackend::Memory,
        ..BacktestConfig::default()
    }
}

#[test]
fn end_to_end_scenario_bets_away_and_wins() {
    let client = MarketDataClient::new(FixtureProvider::new(&["401705636"]), MemoryStore::new());
    let report = backtest::run(&client, &scenario_config(401_705_636, 1));

    assert_eq!(report.games_analyzed, 1);
    assert_eq!(report.games_failed, 0);
    assert_eq!(report.state.bets_placed, 1);
    assert_eq!(report.state.bets_won, 1);
    assert!((report.state.bankroll - 66.67).abs() < 1e-9);

    let bet = &report.bets[0];
    assert_eq!(bet.event_id, "401705636");
    assert_eq!(bet.money_line, -150);
    assert!((bet.discrepancy() - 10.0).abs() < 1e-9);
    assert!((report.roi().unwrap() - 66.67).abs() < 1e-9);
}

#[test]
fn failed_events_are_skipped_without_touching_state() {
    let provider = FixtureProvider::new(&["100"]);
    let client = MarketDataClient::new(provider, MemoryStore::new());
    let report = backtest::run(&client, &scenario_config(102, 3));

    assert_eq!(report.games_failed, 2);
    assert_eq!(report.games_analyzed, 1);
    assert_eq!(report.state.bets_placed, 1);
    assert!((report.state.bankroll - 66.67).abs() < 1e-9);
    // Failures stop at the odds call; nothing else is requested for them.
    assert_eq!(client.provider().calls_for(RecordKind::Odds, "101"), 1);
    assert_eq!(client.provider().calls_for(RecordKind::Prediction, "101"), 0);
}

#[test]
fn second_run_is_served_entirely_from_cache() {
    let client = MarketDataClient::new(FixtureProvider::new(&["7", "6"]), MemoryStore::new());
    let cfg = scenario_config(7, 2);

    let first = backtest::run(&client, &cfg);
    let calls_after_first = client.provider().total_calls();
    let second = backtest::run(&client, &cfg);

    assert_eq!(client.provider().total_calls(), calls_after_first);
    assert_eq!(first.state, second.state);
    assert_eq!(first.bets, second.bets);
    for id in ["7", "6"] {
        assert_eq!(client.provider().calls_for(RecordKind::Odds, id), 1);
        assert_eq!(client.provider().calls_for(RecordKind::Prediction, id), 1);
        assert_eq!(client.provider().calls_for(RecordKind::Results, id), 1);
        assert!(client.store().get(&format!("odds_nba_{id}")).is_some());
    }
}

#[test]
fn result_is_not_fetched_when_no_bet_is_placed() {
    let client = MarketDataClient::new(FixtureProvider::new(&["55"]), MemoryStore::new());
    let mut cfg = scenario_config(55, 1);
    cfg.decision.side = SideFilter::Home;

    let report = backtest::run(&client, &cfg);
    assert_eq!(report.state.bets_placed, 0);
    assert_eq!(report.roi(), None);
    assert_eq!(client.provider().calls_for(RecordKind::Results, "55"), 0);
    assert!(report.to_string().contains("ROI: n/a"));
}

#[test]
fn failing_results_call_aborts_only_that_event() {
    struct NoResults(FixtureProvider);
    impl Provider for NoResults {
        fn fetch(
            &self,
            kind: RecordKind,
            league: League,
            event_id: &str,
        ) -> Result<String, FetchError> {
            if kind == RecordKind::Results {
                return Err(FetchError::unavailable("no competitors"));
            }
            self.0.fetch(kind, league, event_id)
        }
    }

    let client = MarketDataClient::new(NoResults(FixtureProvider::new(&["9"])), MemoryStore::new());
    let report = backtest::run(&client, &scenario_config(9, 1));
    assert_eq!(report.games_failed, 1);
    assert_eq!(report.state.bets_placed, 0);
    assert_eq!(report.state.bankroll, 0.0);
}

#[test]
fn replay_matches_sequential_run_on_synthetic_games() {
    let mut cfg = scenario_config(5_000, 200);
    cfg.provider = backtest::ProviderKind::Synthetic;
    cfg.decision.threshold = 2.0;

    let client = MarketDataClient::new(SyntheticProvider::default(), MemoryStore::new());
    let report = backtest::run(&client, &cfg);
    let (snapshots, failed): (Vec<GameSnapshot>, u32) = backtest::collect_snapshots(&client, &cfg);

    assert_eq!(failed, 0);
    assert_eq!(snapshots.len(), 200);
    let replayed = backtest::replay(&snapshots, &cfg.decision);
    assert_eq!(replayed.bets_placed, report.state.bets_placed);
    assert_eq!(replayed.bets_won, report.state.bets_won);
    assert!((replayed.bankroll - report.state.bankroll).abs() < 1e-6);
}

#[test]
fn configured_client_runs_offline() {
    let cfg = BacktestConfig::from_sources(
        &[
            "--provider".to_string(),
            "synthetic".to_string(),
            "--cache".to_string(),
            "memory".to_string(),
            "--games=25".to_string(),
            "--start=900".to_string(),
            "--side=both".to_string(),
        ],
        |_| None,
    )
    .expect("config should parse");
    let client = cfg.build_client();
    let report = backtest::run(&client, &cfg);
    assert_eq!(report.games_analyzed + report.games_failed, 25);
    assert_eq!(report.games_failed, 0);
    assert_eq!(report.bets.len() as u32, report.state.bets_placed);
}
