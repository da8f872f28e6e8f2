use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideFilter {
    Away,
    Home,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteFilter {
    Favorite,
    Underdog,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsetFilter {
    Upset,
    NoUpset,
    Both,
}

impl SideFilter {
    pub const ALL: [SideFilter; 3] = [SideFilter::Away, SideFilter::Home, SideFilter::Both];

    pub fn label(self) -> &'static str {
        match self {
            SideFilter::Away => "away",
            SideFilter::Home => "home",
            SideFilter::Both => "both",
        }
    }
}

impl FavoriteFilter {
    pub const ALL: [FavoriteFilter; 3] = [
        FavoriteFilter::Favorite,
        FavoriteFilter::Underdog,
        FavoriteFilter::Both,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FavoriteFilter::Favorite => "favorite",
            FavoriteFilter::Underdog => "underdog",
            FavoriteFilter::Both => "both",
        }
    }
}

impl UpsetFilter {
    pub const ALL: [UpsetFilter; 3] = [UpsetFilter::Upset, UpsetFilter::NoUpset, UpsetFilter::Both];

    pub fn label(self) -> &'static str {
        match self {
            UpsetFilter::Upset => "upset",
            UpsetFilter::NoUpset => "noupset",
            UpsetFilter::Both => "both",
        }
    }
}

macro_rules! label_enum_parse {
    ($ty:ty, $key:literal, $expected:literal) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let t = raw.trim().to_ascii_lowercase();
                <$ty>::ALL
                    .into_iter()
                    .find(|v| v.label() == t)
                    .ok_or_else(|| ConfigError::invalid($key, raw, $expected))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

label_enum_parse!(SideFilter, "side", "away, home or both");
label_enum_parse!(FavoriteFilter, "favorite", "favorite, underdog or both");
label_enum_parse!(UpsetFilter, "upset", "upset, noupset or both");

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub side: SideFilter,
    pub favorite: FavoriteFilter,
    pub upset: UpsetFilter,
    /// Minimum predicted-minus-implied gap, in probability points.
    pub threshold: f64,
    pub bet_amount: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            side: SideFilter::Away,
            favorite: FavoriteFilter::Both,
            upset: UpsetFilter::NoUpset,
            threshold: 5.0,
            bet_amount: 100.0,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::invalid(
                "threshold",
                &self.threshold.to_string(),
                "a non-negative number",
            ));
        }
        if !self.bet_amount.is_finite() || self.bet_amount <= 0.0 {
            return Err(ConfigError::invalid(
                "bet_amount",
                &self.bet_amount.to_string(),
                "a positive number",
            ));
        }
        Ok(())
    }
}

pub fn is_upset(implied: f64, predicted: f64) -> bool {
    predicted > 50.0 && implied < 50.0
}

/// Runs the side, upset and favorite filters in order, then the discrepancy gate.
pub fn should_bet(
    is_away: bool,
    implied: f64,
    predicted: f64,
    money_line: i32,
    cfg: &DecisionConfig,
) -> bool {
    match cfg.side {
        SideFilter::Away if !is_away => return false,
        SideFilter::Home if is_away => return false,
        _ => {}
    }

    let upset = is_upset(implied, predicted);
    match cfg.upset {
        UpsetFilter::Upset if !upset => return false,
        UpsetFilter::NoUpset if upset => return false,
        _ => {}
    }

    let favorite = money_line < 0;
    match cfg.favorite {
        FavoriteFilter::Favorite if !favorite => return false,
        FavoriteFilter::Underdog if favorite => return false,
        _ => {}
    }

    let discrepancy = predicted - implied;
    discrepancy >= cfg.threshold && discrepancy > 0.0
}

#[cfg(test)]
mod tests {
    use super::{DecisionConfig, FavoriteFilter, SideFilter, UpsetFilter, should_bet};

    fn open(threshold: f64) -> DecisionConfig {
        DecisionConfig {
            side: SideFilter::Both,
            favorite: FavoriteFilter::Both,
            upset: UpsetFilter::Both,
            threshold,
            bet_amount: 100.0,
        }
    }

    #[test]
    fn never_bets_without_positive_discrepancy() {
        let cfg = open(0.0);
        assert!(!should_bet(true, 55.0, 55.0, -120, &cfg));
        assert!(!should_bet(false, 55.0, 40.0, -120, &cfg));
        assert!(should_bet(false, 55.0, 55.1, -120, &cfg));
    }

    #[test]
    fn threshold_is_inclusive() {
        let cfg = open(5.0);
        assert!(should_bet(true, 40.0, 45.0, 150, &cfg));
        assert!(!should_bet(true, 40.0, 44.9, 150, &cfg));
    }

    #[test]
    fn side_filter_excludes_other_side() {
        let mut cfg = open(0.0);
        cfg.side = SideFilter::Away;
        assert!(!should_bet(false, 40.0, 60.0, 150, &cfg));
        assert!(should_bet(true, 40.0, 60.0, 150, &cfg));
        cfg.side = SideFilter::Home;
        assert!(!should_bet(true, 40.0, 60.0, 150, &cfg));
        assert!(should_bet(false, 40.0, 60.0, 150, &cfg));
    }

    #[test]
    fn upset_filter() {
        let mut cfg = open(0.0);
        // predicted 60 > 50, implied 40 < 50
        cfg.upset = UpsetFilter::NoUpset;
        assert!(!should_bet(true, 40.0, 60.0, 150, &cfg));
        cfg.upset = UpsetFilter::Upset;
        assert!(should_bet(true, 40.0, 60.0, 150, &cfg));
        assert!(!should_bet(true, 40.0, 48.0, 150, &cfg));
    }

    #[test]
    fn favorite_filter_treats_zero_as_underdog() {
        let mut cfg = open(0.0);
        cfg.favorite = FavoriteFilter::Favorite;
        assert!(should_bet(true, 60.0, 70.0, -150, &cfg));
        assert!(!should_bet(true, 40.0, 45.0, 150, &cfg));
        assert!(!should_bet(true, 40.0, 45.0, 0, &cfg));
        cfg.favorite = FavoriteFilter::Underdog;
        assert!(!should_bet(true, 60.0, 70.0, -150, &cfg));
        assert!(should_bet(true, 40.0, 45.0, 0, &cfg));
    }

    #[test]
    fn filter_words_parse() {
        assert_eq!("NoUpset".parse::<UpsetFilter>().unwrap(), UpsetFilter::NoUpset);
        assert_eq!("home".parse::<SideFilter>().unwrap(), SideFilter::Home);
        assert_eq!(
            "underdog".parse::<FavoriteFilter>().unwrap(),
            FavoriteFilter::Underdog
        );
        assert!("dogs".parse::<FavoriteFilter>().is_err());
        assert_eq!(UpsetFilter::NoUpset.to_string(), "noupset");
    }

    #[test]
    fn validate_rejects_bad_amounts() {
        let mut cfg = DecisionConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.threshold = -1.0;
        assert!(cfg.validate().is_err());
        cfg.threshold = 0.0;
        cfg.bet_amount = 0.0;
        assert!(cfg.validate().is_err());
    }
}
