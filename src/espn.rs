use tracing::debug;

use crate::error::FetchError;
use crate::http_client::get_text;
use crate::league::League;
use crate::market_data::{Provider, RecordKind};

const CORE_BASE_URL: &str = "https://sports.core.api.espn.com/v2";
const SITE_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2";

/// Hits the public ESPN core and site APIs. One GET per `fetch`.
#[derive(Debug, Clone)]
pub struct EspnProvider {
    core_base: String,
    site_base: String,
}

impl Default for EspnProvider {
    fn default() -> Self {
        Self::with_base_urls(CORE_BASE_URL, SITE_BASE_URL)
    }
}

impl EspnProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_urls(core_base: &str, site_base: &str) -> Self {
        Self {
            core_base: core_base.trim_end_matches('/').to_string(),
            site_base: site_base.trim_end_matches('/').to_string(),
        }
    }

    fn competition_url(&self, league: League, event_id: &str) -> String {
        format!(
            "{}/sports/{}/leagues/{}/events/{event_id}/competitions/{event_id}",
            self.core_base,
            league.sport(),
            league.code()
        )
    }

    pub fn odds_url(&self, league: League, event_id: &str) -> String {
        format!("{}/odds", self.competition_url(league, event_id))
    }

    pub fn predictor_url(&self, league: League, event_id: &str) -> String {
        format!("{}/predictor", self.competition_url(league, event_id))
    }

    pub fn summary_url(&self, league: League, event_id: &str) -> String {
        format!(
            "{}/sports/{}/{}/summary?event={event_id}",
            self.site_base,
            league.sport(),
            league.code()
        )
    }

    pub fn url_for(&self, kind: RecordKind, league: League, event_id: &str) -> String {
        match kind {
            RecordKind::Odds => self.odds_url(league, event_id),
            RecordKind::Prediction => self.predictor_url(league, event_id),
            RecordKind::Results => self.summary_url(league, event_id),
        }
    }
}

impl Provider for EspnProvider {
    fn fetch(
        &self,
        kind: RecordKind,
        league: League,
        event_id: &str,
    ) -> Result<String, FetchError> {
        let url = self.url_for(kind, league, event_id);
        debug!(%url, "requesting");
        get_text(&url)
    }
}
