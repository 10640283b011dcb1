use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::USER_AGENT;
use serde_json::Value;
use tracing::debug;

use crate::api_cache::ApiCache;
use crate::http_client::{body_snippet, http_client};
use crate::team_stats::{TeamStats, extract_team_stats};

const FOOTYSTATS_BASE_URL: &str = "https://api.football-data-api.com";

#[derive(Debug, Clone)]
pub struct FootyStatsClient {
    api_key: String,
    base_url: String,
    cache: ApiCache,
    stats_max_age: Duration,
    list_max_age: Duration,
}

impl FootyStatsClient {
    pub fn new(
        api_key: impl Into<String>,
        cache: ApiCache,
        stats_max_age: Duration,
        list_max_age: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: FOOTYSTATS_BASE_URL.to_string(),
            cache,
            stats_max_age,
            list_max_age,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Leagues (with season ids) the key has access to.
    pub fn league_list(&self) -> Result<Value> {
        self.get("league-list", &[("chosen_leagues_only", "true")], self.list_max_age)
    }

    /// Every team of a season, with season stats included.
    pub fn league_teams(&self, season_id: u32) -> Result<Vec<TeamStats>> {
        let season = season_id.to_string();
        let raw = self.get(
            "league-teams",
            &[("season_id", season.as_str()), ("include", "stats")],
            self.stats_max_age,
        )?;
        Ok(parse_league_teams(&raw))
    }

    pub fn team(&self, team_id: u32) -> Result<Option<TeamStats>> {
        let id = team_id.to_string();
        let raw = self.get("team", &[("team_id", id.as_str())], self.stats_max_age)?;
        let data = raw.get("data").unwrap_or(&raw);
        // The team endpoint returns one entry per competition; the first is the current one.
        let entry = data.as_array().and_then(|a| a.first()).unwrap_or(data);
        if entry.is_null() {
            return Ok(None);
        }
        Ok(Some(extract_team_stats(entry, "")))
    }

    pub fn league_matches(&self, season_id: u32) -> Result<Value> {
        let season = season_id.to_string();
        self.get(
            "league-matches",
            &[("season_id", season.as_str())],
            self.stats_max_age,
        )
    }

    fn get(&self, endpoint: &str, params: &[(&str, &str)], max_age: Duration) -> Result<Value> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        let (body, hit) = self.cache.get_or_fetch(&url, params, max_age, || {
            let mut query: Vec<(&str, &str)> = vec![("key", self.api_key.as_str())];
            query.extend_from_slice(params);
            let resp = http_client()?
                .get(&url)
                .query(&query)
                .header(USER_AGENT, "footy-value/0.1")
                .send()
                .context("footystats request failed")?;
            let status = resp.status();
            let body = resp.text().context("failed reading footystats body")?;
            if !status.is_success() {
                return Err(anyhow::anyhow!("footystats http {}: {}", status, body_snippet(&body)));
            }
            Ok(body)
        })?;
        debug!(endpoint, ?hit, "footystats response");
        let value: Value = serde_json::from_str(&body).context("invalid footystats json")?;
        if value.get("success").and_then(Value::as_bool) == Some(false) {
            let msg = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request rejected");
            return Err(anyhow::anyhow!("footystats: {msg}"));
        }
        Ok(value)
    }
}

/// Normalizes a `league-teams` payload. Table positions are filled from the
/// order of `table_position` when present, else left empty.
pub fn parse_league_teams(raw: &Value) -> Vec<TeamStats> {
    let Some(items) = raw.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    let size = items.len() as u32;
    items
        .iter()
        .map(|item| {
            let mut stats = extract_team_stats(item, "");
            if stats.table_position.is_some() && stats.league_size.is_none() {
                stats.league_size = Some(size);
            }
            stats
        })
        .filter(|s| !s.name.is_empty())
        .collect()
}
