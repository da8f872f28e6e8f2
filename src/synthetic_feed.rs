use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};

use crate::error::FetchError;
use crate::league::League;
use crate::market_data::{DEFAULT_SPORTSBOOK, Provider, RecordKind};
use crate::probability::money_line_for;

/// Offline provider. Every (league, event) maps to one fixed synthetic game, rendered in
/// the same JSON shape as the upstream endpoints.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    sportsbook: String,
    salt: u64,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            sportsbook: DEFAULT_SPORTSBOOK.to_string(),
            salt: 0,
        }
    }
}

impl SyntheticProvider {
    pub fn new(sportsbook: impl Into<String>) -> Self {
        Self {
            sportsbook: sportsbook.into(),
            salt: 0,
        }
    }

    pub fn with_salt(mut self, salt: u64) -> Self {
        self.salt = salt;
        self
    }

    pub fn game(&self, league: League, event_id: &str) -> SyntheticGame {
        SyntheticGame::generate(league, event_id, self.salt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticGame {
    pub away_true_prob: f64,
    pub away_money_line: i32,
    pub home_money_line: i32,
    pub away_projection: f64,
    pub home_chance_loss: f64,
    pub away_won: bool,
}

impl SyntheticGame {
    fn generate(league: League, event_id: &str, salt: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed_for(league, event_id) ^ salt);

        let away_true_prob: f64 = rng.gen_range(0.25..0.75);
        let market_noise: f64 = rng.gen_range(-0.06..0.06);
        let vig: f64 = rng.gen_range(0.01..0.03);
        let model_noise: f64 = rng.gen_range(-0.08..0.08);
        let away_won = rng.gen_bool(away_true_prob);

        let market_away = (away_true_prob + market_noise).clamp(0.05, 0.95);
        let away_money_line = money_line_for(market_away + vig / 2.0);
        let home_money_line = money_line_for(1.0 - market_away + vig / 2.0);

        let away_projection = ((away_true_prob + model_noise).clamp(0.02, 0.98)) * 100.0;

        Self {
            away_true_prob,
            away_money_line,
            home_money_line,
            away_projection,
            home_chance_loss: 100.0 - away_projection,
            away_won,
        }
    }

    fn odds_json(&self, sportsbook: &str) -> Value {
        json!({
            "count": 2,
            "items": [
                {
                    "provider": { "id": "0", "name": "Consensus" },
                    "awayTeamOdds": { "moneyLine": self.away_money_line - 5 },
                    "homeTeamOdds": { "moneyLine": self.home_money_line - 5 }
                },
                {
                    "provider": { "id": "58", "name": sportsbook },
                    "awayTeamOdds": { "moneyLine": self.away_money_line },
                    "homeTeamOdds": { "moneyLine": self.home_money_line }
                }
            ]
        })
    }

    fn predictor_json(&self) -> Value {
        json!({
            "name": "Matchup Predictor",
            "awayTeam": {
                "statistics": [
                    { "name": "gameProjection", "value": self.away_projection },
                    { "name": "teamChanceLoss", "value": self.home_chance_loss }
                ]
            },
            "homeTeam": {
                "statistics": [
                    { "name": "gameProjection", "value": self.home_chance_loss },
                    { "name": "teamChanceLoss", "value": self.away_projection }
                ]
            }
        })
    }

    fn summary_json(&self) -> Value {
        json!({
            "header": {
                "competitions": [{
                    "competitors": [
                        { "homeAway": "home", "winner": !self.away_won },
                        { "homeAway": "away", "winner": self.away_won }
                    ]
                }]
            }
        })
    }
}

impl Provider for SyntheticProvider {
    fn fetch(
        &self,
        kind: RecordKind,
        league: League,
        event_id: &str,
    ) -> Result<String, FetchError> {
        let game = self.game(league, event_id);
        let body = match kind {
            RecordKind::Odds => game.odds_json(&self.sportsbook),
            RecordKind::Prediction => game.predictor_json(),
            RecordKind::Results => game.summary_json(),
        };
        Ok(body.to_string())
    }
}

fn seed_for(league: League, event_id: &str) -> u64 {
    // FNV-1a over league code and event id.
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in league.code().bytes().chain([b'_']).chain(event_id.bytes()) {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}
