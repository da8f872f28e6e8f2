//! Odds, prediction and result retrieval, each cached under its own key.
//!
//! A cache hit never touches the provider. A miss issues exactly one provider call,
//! shapes the record, and writes it back before returning. Write failures are logged
//! and the fresh record is still returned.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache_store::CacheStore;
use crate::error::FetchError;
use crate::league::League;
use crate::probability::{implied_probability, round_to};

pub const DEFAULT_SPORTSBOOK: &str = "ESPN BET";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Odds,
    Prediction,
    Results,
}

impl RecordKind {
    pub fn prefix(self) -> &'static str {
        match self {
            RecordKind::Odds => "odds",
            RecordKind::Prediction => "prediction",
            RecordKind::Results => "results",
        }
    }

    pub fn cache_key(self, league: League, event_id: &str) -> String {
        format!("{}_{}_{}", self.prefix(), league.code(), event_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsRecord {
    pub away_money_line: i32,
    pub home_money_line: i32,
    pub away_implied_probability: f64,
    pub home_implied_probability: f64,
}

impl OddsRecord {
    pub fn from_money_lines(away_money_line: i32, home_money_line: i32) -> Self {
        Self {
            away_money_line,
            home_money_line,
            away_implied_probability: implied_probability(away_money_line),
            home_implied_probability: implied_probability(home_money_line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub away_team_predicted_probability: f64,
    pub home_team_predicted_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub away_team_won: bool,
    pub home_team_won: bool,
}

impl ResultRecord {
    pub fn away_won(away_team_won: bool) -> Self {
        Self {
            away_team_won,
            home_team_won: !away_team_won,
        }
    }
}

/// Raw JSON source for one record kind of one event.
pub trait Provider {
    fn fetch(&self, kind: RecordKind, league: League, event_id: &str)
    -> Result<String, FetchError>;
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn fetch(
        &self,
        kind: RecordKind,
        league: League,
        event_id: &str,
    ) -> Result<String, FetchError> {
        (**self).fetch(kind, league, event_id)
    }
}

pub struct MarketDataClient<P, S> {
    provider: P,
    store: S,
    sportsbook: String,
}

impl<P: Provider, S: CacheStore> MarketDataClient<P, S> {
    pub fn new(provider: P, store: S) -> Self {
        Self {
            provider,
            store,
            sportsbook: DEFAULT_SPORTSBOOK.to_string(),
        }
    }

    pub fn with_sportsbook(mut self, sportsbook: impl Into<String>) -> Self {
        self.sportsbook = sportsbook.into();
        self
    }

    pub fn sportsbook(&self) -> &str {
        &self.sportsbook
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn odds(&self, league: League, event_id: &str) -> Result<OddsRecord, FetchError> {
        self.cached(RecordKind::Odds, league, event_id, |body| {
            parse_odds_json(body, &self.sportsbook)
        })
    }

    pub fn prediction(
        &self,
        league: League,
        event_id: &str,
    ) -> Result<PredictionRecord, FetchError> {
        self.cached(RecordKind::Prediction, league, event_id, parse_prediction_json)
    }

    pub fn results(&self, league: League, event_id: &str) -> Result<ResultRecord, FetchError> {
        self.cached(RecordKind::Results, league, event_id, parse_summary_json)
    }

    fn cached<T, F>(
        &self,
        kind: RecordKind,
        league: League,
        event_id: &str,
        shape: F,
    ) -> Result<T, FetchError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&str) -> Result<T, FetchError>,
    {
        let key = kind.cache_key(league, event_id);
        if let Some(value) = self.store.get(&key) {
            match serde_json::from_value::<T>(value) {
                Ok(record) => {
                    debug!(%key, "cache hit");
                    return Ok(record);
                }
                Err(err) => warn!(%key, %err, "cached entry does not match record shape, refetching"),
            }
        }

        debug!(%key, "cache miss");
        let body = self.provider.fetch(kind, league, event_id)?;
        let record = shape(&body)?;

        match serde_json::to_value(&record) {
            Ok(value) => {
                if let Err(err) = self.store.put(&key, &value) {
                    warn!(%err, "failed to save record to cache");
                }
            }
            Err(err) => warn!(%key, %err, "failed to encode record for cache"),
        }
        Ok(record)
    }
}

#[derive(Debug, Deserialize)]
struct OddsPayload {
    #[serde(default)]
    items: Vec<OddsItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OddsItem {
    provider: Option<OddsProvider>,
    away_team_odds: Option<TeamOdds>,
    home_team_odds: Option<TeamOdds>,
}

#[derive(Debug, Deserialize)]
struct OddsProvider {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamOdds {
    money_line: Option<f64>,
}

pub fn parse_odds_json(raw: &str, sportsbook: &str) -> Result<OddsRecord, FetchError> {
    let payload: OddsPayload = decode(raw, "odds")?;
    let item = payload
        .items
        .iter()
        .find(|item| {
            item.provider
                .as_ref()
                .and_then(|p| p.name.as_deref())
                .is_some_and(|name| name == sportsbook)
        })
        .ok_or_else(|| FetchError::unavailable(format!("no odds line from {sportsbook}")))?;

    let away = item.away_team_odds.as_ref().and_then(|o| o.money_line);
    let home = item.home_team_odds.as_ref().and_then(|o| o.money_line);
    let (Some(away), Some(home)) = (away, home) else {
        return Err(FetchError::unavailable("money line odds are not available"));
    };

    Ok(OddsRecord::from_money_lines(
        away.round() as i32,
        home.round() as i32,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictorPayload {
    away_team: Option<PredictorTeam>,
}

#[derive(Debug, Deserialize)]
struct PredictorTeam {
    #[serde(default)]
    statistics: Vec<PredictorStat>,
}

#[derive(Debug, Deserialize)]
struct PredictorStat {
    name: Option<String>,
    value: Option<f64>,
}

/// Both probabilities come from the away team's statistics: `gameProjection` for the
/// away side and `teamChanceLoss` for the home side.
pub fn parse_prediction_json(raw: &str) -> Result<PredictionRecord, FetchError> {
    let payload: PredictorPayload = decode(raw, "predictor")?;
    let stats = payload
        .away_team
        .map(|t| t.statistics)
        .ok_or_else(|| FetchError::unavailable("predictor has no away team statistics"))?;

    let stat = |name: &str| {
        stats
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
            .and_then(|s| s.value)
    };

    let away = stat("gameProjection").ok_or_else(|| {
        FetchError::unavailable("away team predicted probability is not available")
    })?;
    let home = stat("teamChanceLoss").ok_or_else(|| {
        FetchError::unavailable("home team predicted probability is not available")
    })?;

    Ok(PredictionRecord {
        away_team_predicted_probability: round_to(away, 3),
        home_team_predicted_probability: round_to(home, 3),
    })
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    header: Option<SummaryHeader>,
}

#[derive(Debug, Deserialize)]
struct SummaryHeader {
    #[serde(default)]
    competitions: Vec<SummaryCompetition>,
}

#[derive(Debug, Deserialize)]
struct SummaryCompetition {
    #[serde(default)]
    competitors: Vec<SummaryCompetitor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryCompetitor {
    home_away: Option<String>,
    winner: Option<bool>,
}

pub fn parse_summary_json(raw: &str) -> Result<ResultRecord, FetchError> {
    let payload: SummaryPayload = decode(raw, "summary")?;
    let competitors = payload
        .header
        .and_then(|h| h.competitions.into_iter().next())
        .map(|c| c.competitors)
        .ok_or_else(|| FetchError::unavailable("summary has no competition"))?;

    let side = |flag: &str| {
        competitors
            .iter()
            .find(|c| c.home_away.as_deref() == Some(flag))
    };
    let away = side("away")
        .ok_or_else(|| FetchError::unavailable("away team not found in the game summary"))?;
    if side("home").is_none() {
        return Err(FetchError::unavailable(
            "home team not found in the game summary",
        ));
    }

    Ok(ResultRecord::away_won(away.winner == Some(true)))
}

fn decode<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, FetchError> {
    serde_json::from_str(raw).map_err(|err| FetchError::unavailable(format!("invalid {what} json: {err}")))
}
