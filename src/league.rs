use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nba,
    Nfl,
    Mlb,
    Nhl,
}

impl League {
    pub const ALL: [League; 4] = [League::Nba, League::Nfl, League::Mlb, League::Nhl];

    /// Path segment the provider uses for the league itself.
    pub fn code(self) -> &'static str {
        match self {
            League::Nba => "nba",
            League::Nfl => "nfl",
            League::Mlb => "mlb",
            League::Nhl => "nhl",
        }
    }

    pub fn sport(self) -> &'static str {
        match self {
            League::Nba => "basketball",
            League::Nfl => "football",
            League::Mlb => "baseball",
            League::Nhl => "icehockey",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for League {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let t = raw.trim().to_ascii_lowercase();
        League::ALL
            .into_iter()
            .find(|l| l.code() == t)
            .ok_or_else(|| ConfigError::invalid("league", raw, "nba, nfl, mlb or nhl"))
    }
}

#[cfg(test)]
mod tests {
    use super::League;

    #[test]
    fn every_league_maps_to_a_sport() {
        assert_eq!(League::Nba.sport(), "basketball");
        assert_eq!(League::Nfl.sport(), "football");
        assert_eq!(League::Mlb.sport(), "baseball");
        assert_eq!(League::Nhl.sport(), "icehockey");
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(" NHL ".parse::<League>().unwrap(), League::Nhl);
        assert!("epl".parse::<League>().is_err());
    }
}
