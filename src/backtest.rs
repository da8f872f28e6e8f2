//! Sequential backtest over a range of event ids, walking backwards from a start id.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache_store::{
    CacheStore, DisabledStore, JsonDirStore, MemoryStore, SqliteStore, default_cache_dir,
};
use crate::decision::{DecisionConfig, should_bet};
use crate::error::{ConfigError, FetchError};
use crate::espn::EspnProvider;
use crate::league::League;
use crate::market_data::{
    DEFAULT_SPORTSBOOK, MarketDataClient, OddsRecord, PredictionRecord, Provider, ResultRecord,
};
use crate::settlement::{PlacedBet, RunState, Side, chosen_side, settle_game};
use crate::synthetic_feed::SyntheticProvider;

const DEFAULT_START_EVENT: u64 = 401_705_636;
const DEFAULT_GAMES: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Json,
    Sqlite,
    Memory,
    Off,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(CacheBackend::Json),
            "sqlite" => Ok(CacheBackend::Sqlite),
            "memory" => Ok(CacheBackend::Memory),
            "off" | "none" => Ok(CacheBackend::Off),
            _ => Err(ConfigError::invalid("cache", raw, "json, sqlite, memory or off")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Espn,
    Synthetic,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "espn" => Ok(ProviderKind::Espn),
            "synthetic" | "fake" => Ok(ProviderKind::Synthetic),
            _ => Err(ConfigError::invalid("provider", raw, "espn or synthetic")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub league: League,
    pub start_event: u64,
    pub games: u32,
    pub decision: DecisionConfig,
    pub delay: Duration,
    pub sportsbook: String,
    pub provider: ProviderKind,
    pub cache: CacheBackend,
    pub cache_dir: PathBuf,
    pub synthetic_seed: u64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            league: League::Nba,
            start_event: DEFAULT_START_EVENT,
            games: DEFAULT_GAMES,
            decision: DecisionConfig::default(),
            delay: Duration::ZERO,
            sportsbook: DEFAULT_SPORTSBOOK.to_string(),
            provider: ProviderKind::Espn,
            cache: CacheBackend::Json,
            cache_dir: default_cache_dir(),
            synthetic_seed: 0,
        }
    }
}

/// (env key, command-line flag)
const KEYS: &[(&str, &str)] = &[
    ("BACKTEST_LEAGUE", "--league"),
    ("BACKTEST_START_EVENT", "--start"),
    ("BACKTEST_GAMES", "--games"),
    ("BACKTEST_SIDE", "--side"),
    ("BACKTEST_FAVORITE", "--favorite"),
    ("BACKTEST_UPSET", "--upset"),
    ("BACKTEST_THRESHOLD", "--threshold"),
    ("BACKTEST_BET_AMOUNT", "--bet-amount"),
    ("BACKTEST_DELAY_MS", "--delay-ms"),
    ("ODDS_SPORTSBOOK", "--sportsbook"),
    ("BACKTEST_PROVIDER", "--provider"),
    ("BACKTEST_SYNTHETIC_SEED", "--seed"),
    ("CACHE_BACKEND", "--cache"),
    ("CACHE_DIR", "--cache-dir"),
    ("SKIP_CACHE", "--skip-cache"),
];

impl BacktestConfig {
    pub fn from_env_and_args(args: &[String]) -> Result<Self, ConfigError> {
        Self::from_sources(args, |key| std::env::var(key).ok())
    }

    /// Flags win over the environment; anything unset keeps its default.
    pub fn from_sources(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |env_key: &str| -> Option<String> {
            let flag = KEYS
                .iter()
                .find(|(k, _)| *k == env_key)
                .map(|(_, f)| *f)?;
            arg_value(args, flag)
                .or_else(|| env(env_key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut cfg = Self::default();
        if let Some(v) = lookup("BACKTEST_LEAGUE") {
            cfg.league = v.parse()?;
        }
        if let Some(v) = lookup("BACKTEST_START_EVENT") {
            cfg.start_event = parse_num("start", &v, "a non-negative event id")?;
        }
        if let Some(v) = lookup("BACKTEST_GAMES") {
            cfg.games = parse_num("games", &v, "a game count")?;
        }
        if let Some(v) = lookup("BACKTEST_SIDE") {
            cfg.decision.side = v.parse()?;
        }
        if let Some(v) = lookup("BACKTEST_FAVORITE") {
            cfg.decision.favorite = v.parse()?;
        }
        if let Some(v) = lookup("BACKTEST_UPSET") {
            cfg.decision.upset = v.parse()?;
        }
        if let Some(v) = lookup("BACKTEST_THRESHOLD") {
            cfg.decision.threshold = parse_num("threshold", &v, "a non-negative number")?;
        }
        if let Some(v) = lookup("BACKTEST_BET_AMOUNT") {
            cfg.decision.bet_amount = parse_num("bet_amount", &v, "a positive number")?;
        }
        if let Some(v) = lookup("BACKTEST_DELAY_MS") {
            cfg.delay = Duration::from_millis(parse_num("delay_ms", &v, "milliseconds")?);
        }
        if let Some(v) = lookup("ODDS_SPORTSBOOK") {
            cfg.sportsbook = v;
        }
        if let Some(v) = lookup("BACKTEST_PROVIDER") {
            cfg.provider = v.parse()?;
        }
        if let Some(v) = lookup("BACKTEST_SYNTHETIC_SEED") {
            cfg.synthetic_seed = parse_num("seed", &v, "an unsigned integer")?;
        }
        if let Some(v) = lookup("CACHE_BACKEND") {
            cfg.cache = v.parse()?;
        }
        if let Some(v) = lookup("CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(v);
        }
        if has_flag(args, "--skip-cache") || lookup("SKIP_CACHE").is_some_and(|v| truthy(&v)) {
            cfg.cache = CacheBackend::Off;
        }

        cfg.decision.validate()?;
        Ok(cfg)
    }

    /// Event ids from the start id downward; stops early rather than go below zero.
    pub fn event_ids(&self) -> Vec<String> {
        (0..self.games as u64)
            .map_while(|i| self.start_event.checked_sub(i))
            .map(|id| id.to_string())
            .collect()
    }

    pub fn build_provider(&self) -> Box<dyn Provider> {
        match self.provider {
            ProviderKind::Espn => Box::new(EspnProvider::new()),
            ProviderKind::Synthetic => Box::new(
                SyntheticProvider::new(self.sportsbook.clone()).with_salt(self.synthetic_seed),
            ),
        }
    }

    /// Builds and initializes the configured store. Init failure is logged only; the
    /// store then misses on every lookup.
    pub fn build_store(&self) -> Box<dyn CacheStore> {
        let store: Box<dyn CacheStore> = match self.cache {
            CacheBackend::Json => Box::new(JsonDirStore::new(self.cache_dir.join("records"))),
            CacheBackend::Sqlite => {
                Box::new(SqliteStore::new(self.cache_dir.join("records.sqlite")))
            }
            CacheBackend::Memory => Box::new(MemoryStore::new()),
            CacheBackend::Off => Box::new(DisabledStore),
        };
        if let Err(err) = store.init() {
            warn!(%err, "failed to initialize cache, continuing without it");
        }
        store
    }

    pub fn build_client(&self) -> MarketDataClient<Box<dyn Provider>, Box<dyn CacheStore>> {
        MarketDataClient::new(self.build_provider(), self.build_store())
            .with_sportsbook(self.sportsbook.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Verdicts {
    pub away: bool,
    pub home: bool,
}

pub fn decide(odds: &OddsRecord, prediction: &PredictionRecord, cfg: &DecisionConfig) -> Verdicts {
    Verdicts {
        away: should_bet(
            true,
            odds.away_implied_probability,
            prediction.away_team_predicted_probability,
            odds.away_money_line,
            cfg,
        ),
        home: should_bet(
            false,
            odds.home_implied_probability,
            prediction.home_team_predicted_probability,
            odds.home_money_line,
            cfg,
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameAnalysis {
    pub event_id: String,
    pub odds: OddsRecord,
    pub prediction: PredictionRecord,
    pub verdicts: Verdicts,
    pub bet: Option<PlacedBet>,
}

impl GameAnalysis {
    pub fn implied_for(&self, side: Side) -> f64 {
        match side {
            Side::Away => self.odds.away_implied_probability,
            Side::Home => self.odds.home_implied_probability,
        }
    }

    pub fn predicted_for(&self, side: Side) -> f64 {
        match side {
            Side::Away => self.prediction.away_team_predicted_probability,
            Side::Home => self.prediction.home_team_predicted_probability,
        }
    }
}

/// Resolves one event end to end: odds, prediction, decision, then the result only if a
/// wager is placed. On error the caller's state is untouched.
pub fn analyze_game<P: Provider, S: CacheStore>(
    client: &MarketDataClient<P, S>,
    league: League,
    event_id: &str,
    cfg: &DecisionConfig,
    state: RunState,
) -> Result<(RunState, GameAnalysis), FetchError> {
    let odds = client.odds(league, event_id)?;
    debug!(
        event_id,
        away_ml = odds.away_money_line,
        home_ml = odds.home_money_line,
        away_implied = odds.away_implied_probability,
        home_implied = odds.home_implied_probability,
        "odds"
    );
    let prediction = client.prediction(league, event_id)?;
    debug!(
        event_id,
        away = prediction.away_team_predicted_probability,
        home = prediction.home_team_predicted_probability,
        "predicted"
    );

    let verdicts = decide(&odds, &prediction, cfg);
    let mut analysis = GameAnalysis {
        event_id: event_id.to_string(),
        odds,
        prediction,
        verdicts,
        bet: None,
    };

    let Some(side) = chosen_side(verdicts.away, verdicts.home) else {
        return Ok((state, analysis));
    };

    let result = client.results(league, event_id)?;
    let (next, bet) = settle_game(state, side, &odds, &result, cfg.bet_amount);
    info!(
        event_id,
        side = side.label(),
        money_line = bet.money_line,
        won = bet.won,
        profit = bet.profit,
        bankroll = next.bankroll,
        "bet settled"
    );
    analysis.bet = Some(bet);
    Ok((next, analysis))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRow {
    pub event_id: String,
    pub side: Side,
    pub money_line: i32,
    pub implied: f64,
    pub predicted: f64,
    pub won: bool,
    pub profit: f64,
    pub bankroll_after: f64,
}

impl LedgerRow {
    pub fn discrepancy(&self) -> f64 {
        self.predicted - self.implied
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub league: League,
    pub decision: DecisionConfig,
    pub state: RunState,
    pub bets: Vec<LedgerRow>,
    pub games_analyzed: u32,
    pub games_failed: u32,
}

impl BacktestReport {
    pub fn new(league: League, decision: DecisionConfig) -> Self {
        Self {
            league,
            decision,
            state: RunState::default(),
            bets: Vec::new(),
            games_analyzed: 0,
            games_failed: 0,
        }
    }

    /// Return on total staked, in percent. `None` when nothing was staked.
    pub fn roi(&self) -> Option<f64> {
        roi(&self.state, self.decision.bet_amount)
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.state.bets_placed == 0 {
            return None;
        }
        Some(self.state.bets_won as f64 / self.state.bets_placed as f64 * 100.0)
    }

    fn record(&mut self, analysis: &GameAnalysis) {
        self.games_analyzed += 1;
        if let Some(bet) = analysis.bet {
            self.bets.push(LedgerRow {
                event_id: analysis.event_id.clone(),
                side: bet.side,
                money_line: bet.money_line,
                implied: analysis.implied_for(bet.side),
                predicted: analysis.predicted_for(bet.side),
                won: bet.won,
                profit: bet.profit,
                bankroll_after: self.state.bankroll,
            });
        }
    }
}

pub fn roi(state: &RunState, bet_amount: f64) -> Option<f64> {
    if state.bets_placed == 0 {
        return None;
    }
    let staked = state.bets_placed as f64 * bet_amount;
    Some(state.bankroll / staked * 100.0)
}

pub fn format_pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}%"))
        .unwrap_or_else(|| "n/a".to_string())
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "League: {}", self.league)?;
        writeln!(f, "Away or Home: {}", self.decision.side)?;
        writeln!(f, "Favorite or Underdog: {}", self.decision.favorite)?;
        writeln!(f, "Discrepancy threshold: {}", self.decision.threshold)?;
        writeln!(f, "Betting upsets? {}", self.decision.upset)?;
        writeln!(
            f,
            "Games analyzed: {} (failed: {})",
            self.games_analyzed, self.games_failed
        )?;
        writeln!(f, "Final bankroll: {:.2}", self.state.bankroll)?;
        writeln!(f, "Number of bets placed: {}", self.state.bets_placed)?;
        writeln!(f, "Number of bets won: {}", self.state.bets_won)?;
        writeln!(f, "Win rate: {}", format_pct(self.win_rate()))?;
        write!(f, "ROI: {}", format_pct(self.roi()))
    }
}

/// Runs the configured range strictly in order. A failed event is logged, counted, and
/// leaves the state as it was.
pub fn run<P: Provider, S: CacheStore>(
    client: &MarketDataClient<P, S>,
    cfg: &BacktestConfig,
) -> BacktestReport {
    let mut report = BacktestReport::new(cfg.league, cfg.decision);
    let ids = cfg.event_ids();
    let last = ids.len().saturating_sub(1);

    for (idx, event_id) in ids.iter().enumerate() {
        match analyze_game(client, cfg.league, event_id, &cfg.decision, report.state) {
            Ok((next, analysis)) => {
                report.state = next;
                report.record(&analysis);
            }
            Err(err) => {
                report.games_failed += 1;
                warn!(event_id = %event_id, %err, "error analyzing game");
            }
        }
        debug!(event_id = %event_id, bankroll = report.state.bankroll, "current bankroll");
        if idx < last && !cfg.delay.is_zero() {
            thread::sleep(cfg.delay);
        }
    }

    report
}

/// Everything needed to re-evaluate one game under any decision config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub odds: OddsRecord,
    pub prediction: PredictionRecord,
    pub result: ResultRecord,
}

pub fn collect_snapshots<P: Provider, S: CacheStore>(
    client: &MarketDataClient<P, S>,
    cfg: &BacktestConfig,
) -> (Vec<GameSnapshot>, u32) {
    let mut out = Vec::new();
    let mut failed = 0u32;
    let ids = cfg.event_ids();
    let last = ids.len().saturating_sub(1);

    for (idx, event_id) in ids.iter().enumerate() {
        let snapshot = client.odds(cfg.league, event_id).and_then(|odds| {
            let prediction = client.prediction(cfg.league, event_id)?;
            let result = client.results(cfg.league, event_id)?;
            Ok(GameSnapshot {
                odds,
                prediction,
                result,
            })
        });
        match snapshot {
            Ok(s) => out.push(s),
            Err(err) => {
                failed += 1;
                warn!(event_id = %event_id, %err, "skipping game");
            }
        }
        if idx < last && !cfg.delay.is_zero() {
            thread::sleep(cfg.delay);
        }
    }
    (out, failed)
}

/// Pure re-evaluation of collected games.
pub fn replay(snapshots: &[GameSnapshot], cfg: &DecisionConfig) -> RunState {
    snapshots.iter().fold(RunState::default(), |state, s| {
        let verdicts = decide(&s.odds, &s.prediction, cfg);
        match chosen_side(verdicts.away, verdicts.home) {
            Some(side) => settle_game(state, side, &s.odds, &s.result, cfg.bet_amount).0,
            None => state,
        }
    })
}

/// Value of `--flag=value` or `--flag value`. A following `--other` flag is not taken as the value.
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{flag}=")) {
            return Some(raw.to_string());
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.starts_with("--")
        {
            return Some(next.clone());
        }
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn truthy(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}

fn parse_num<T: FromStr>(key: &str, raw: &str, expected: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::invalid(key, raw, expected))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{
        BacktestConfig, CacheBackend, GameSnapshot, ProviderKind, arg_value, format_pct, replay,
        roi,
    };
    use crate::cache_store::CacheStore;
    use crate::decision::{DecisionConfig, SideFilter, UpsetFilter};
    use crate::league::League;
    use crate::market_data::{OddsRecord, PredictionRecord, ResultRecord};
    use crate::settlement::RunState;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_follow_settings() {
        let cfg = BacktestConfig::from_sources(&[], env_of(&[])).unwrap();
        assert_eq!(cfg.league, League::Nba);
        assert_eq!(cfg.start_event, 401_705_636);
        assert_eq!(cfg.games, 1000);
        assert_eq!(cfg.decision.side, SideFilter::Away);
        assert_eq!(cfg.decision.upset, UpsetFilter::NoUpset);
        assert_eq!(cfg.decision.threshold, 5.0);
        assert_eq!(cfg.provider, ProviderKind::Espn);
        assert_eq!(cfg.cache, CacheBackend::Json);
    }

    #[test]
    fn flags_override_env() {
        let cfg = BacktestConfig::from_sources(
            &args(&["--league", "nhl", "--threshold=7.5", "--side", "both"]),
            env_of(&[
                ("BACKTEST_LEAGUE", "nfl"),
                ("BACKTEST_GAMES", "12"),
                ("BACKTEST_DELAY_MS", "750"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.league, League::Nhl);
        assert_eq!(cfg.games, 12);
        assert_eq!(cfg.decision.threshold, 7.5);
        assert_eq!(cfg.decision.side, SideFilter::Both);
        assert_eq!(cfg.delay, Duration::from_millis(750));
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(BacktestConfig::from_sources(&args(&["--league", "epl"]), env_of(&[])).is_err());
        assert!(
            BacktestConfig::from_sources(&[], env_of(&[("BACKTEST_START_EVENT", "abc")])).is_err()
        );
        assert!(BacktestConfig::from_sources(&args(&["--threshold=-2"]), env_of(&[])).is_err());
        assert!(BacktestConfig::from_sources(&args(&["--bet-amount", "0"]), env_of(&[])).is_err());
    }

    #[test]
    fn skip_cache_turns_cache_off() {
        let cfg =
            BacktestConfig::from_sources(&[], env_of(&[("SKIP_CACHE", "true")])).unwrap();
        assert_eq!(cfg.cache, CacheBackend::Off);
        let cfg = BacktestConfig::from_sources(&args(&["--skip-cache"]), env_of(&[])).unwrap();
        assert_eq!(cfg.cache, CacheBackend::Off);
        let cfg =
            BacktestConfig::from_sources(&[], env_of(&[("SKIP_CACHE", "false")])).unwrap();
        assert_eq!(cfg.cache, CacheBackend::Json);
    }

    #[test]
    fn event_ids_walk_backwards_and_stop_at_zero() {
        let mut cfg = BacktestConfig::default();
        cfg.start_event = 10;
        cfg.games = 3;
        assert_eq!(cfg.event_ids(), vec!["10", "9", "8"]);
        cfg.start_event = 1;
        cfg.games = 5;
        assert_eq!(cfg.event_ids(), vec!["1", "0"]);
    }

    #[test]
    fn roi_is_undefined_without_bets() {
        assert_eq!(roi(&RunState::default(), 100.0), None);
        assert_eq!(format_pct(None), "n/a");
        let s = RunState {
            bankroll: 50.0,
            bets_placed: 4,
            bets_won: 3,
        };
        assert!((roi(&s, 100.0).unwrap() - 12.5).abs() < 1e-9);
        assert_eq!(format_pct(roi(&s, 100.0)), "12.50%");
    }

    #[test]
    fn arg_value_does_not_swallow_the_next_flag() {
        let a = args(&["--top", "--thresholds=1,2", "--games", "40"]);
        assert_eq!(arg_value(&a, "--top"), None);
        assert_eq!(arg_value(&a, "--thresholds").as_deref(), Some("1,2"));
        assert_eq!(arg_value(&a, "--games").as_deref(), Some("40"));
        assert_eq!(arg_value(&a, "--league"), None);
    }

    #[test]
    fn replay_stakes_the_configured_bet_amount() {
        let snapshots = [GameSnapshot {
            odds: OddsRecord::from_money_lines(-150, 130),
            prediction: PredictionRecord {
                away_team_predicted_probability: 70.0,
                home_team_predicted_probability: 35.0,
            },
            result: ResultRecord::away_won(true),
        }];
        let base = DecisionConfig::default();
        let half = DecisionConfig {
            bet_amount: 50.0,
            ..base
        };
        assert!((replay(&snapshots, &base).bankroll - 66.67).abs() < 1e-9);
        assert!((replay(&snapshots, &half).bankroll - 33.33).abs() < 1e-9);
    }

    #[test]
    fn unusable_cache_dir_degrades_to_always_fetch() {
        let dir = std::env::temp_dir().join(format!(
            "moneyline_backtest_blocked_{}",
            std::process::id()
        ));
        std::fs::write(&dir, "not a directory").unwrap();

        for cache in [CacheBackend::Sqlite, CacheBackend::Json] {
            let cfg = BacktestConfig {
                provider: ProviderKind::Synthetic,
                cache,
                cache_dir: dir.join("nested"),
                ..BacktestConfig::default()
            };
            let store = cfg.build_store();
            assert!(store.put("odds_nba_1", &serde_json::json!({})).is_err());
            assert!(store.get("odds_nba_1").is_none());

            let client = cfg.build_client();
            let first = client.odds(League::Nba, "1").unwrap();
            let second = client.odds(League::Nba, "1").unwrap();
            assert_eq!(first, second);
            assert!(client.store().get("odds_nba_1").is_none());
        }
        std::fs::remove_file(&dir).ok();
    }
}
