use serde::{Deserialize, Serialize};

use crate::market_data::{OddsRecord, ResultRecord};
use crate::probability::payout;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    pub bankroll: f64,
    pub bets_placed: u32,
    pub bets_won: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Away,
    Home,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Away => "away",
            Side::Home => "home",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacedBet {
    pub side: Side,
    pub money_line: i32,
    pub amount: f64,
    pub won: bool,
    /// Signed bankroll change: the payout on a win, minus the stake on a loss.
    pub profit: f64,
}

/// Applies one wager to the running state. A false verdict leaves it untouched.
pub fn settle(state: RunState, verdict: bool, won: bool, money_line: i32, amount: f64) -> RunState {
    if !verdict {
        return state;
    }
    let mut next = state;
    next.bets_placed += 1;
    if won {
        next.bankroll += payout(amount, money_line);
        next.bets_won += 1;
    } else {
        next.bankroll -= amount;
    }
    next
}

/// Picks the side to settle for one game. The away verdict wins when both fire.
pub fn chosen_side(bet_away: bool, bet_home: bool) -> Option<Side> {
    if bet_away {
        Some(Side::Away)
    } else if bet_home {
        Some(Side::Home)
    } else {
        None
    }
}

/// Settles at most one wager for a game.
pub fn settle_game(
    state: RunState,
    side: Side,
    odds: &OddsRecord,
    result: &ResultRecord,
    amount: f64,
) -> (RunState, PlacedBet) {
    let (money_line, won) = match side {
        Side::Away => (odds.away_money_line, result.away_team_won),
        Side::Home => (odds.home_money_line, result.home_team_won),
    };
    let next = settle(state, true, won, money_line, amount);
    let bet = PlacedBet {
        side,
        money_line,
        amount,
        won,
        profit: if won { payout(amount, money_line) } else { -amount },
    };
    (next, bet)
}
