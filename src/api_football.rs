use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api_cache::ApiCache;
use crate::http_client::{body_snippet, http_client};
use crate::team_stats::{H2HStats, TeamStats, extract_team_stats, h2h_from_fixtures, lookup};

const API_FOOTBALL_BASE_URL: &str = "https://v3.football.api-sports.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueRef {
    pub id: u32,
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ApiFootballClient {
    api_key: String,
    base_url: String,
    cache: ApiCache,
    stats_max_age: Duration,
    list_max_age: Duration,
}

impl ApiFootballClient {
    pub fn new(
        api_key: impl Into<String>,
        cache: ApiCache,
        stats_max_age: Duration,
        list_max_age: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: API_FOOTBALL_BASE_URL.to_string(),
            cache,
            stats_max_age,
            list_max_age,
        }
    }

    pub fn leagues(&self, country: Option<&str>) -> Result<Vec<LeagueRef>> {
        let mut params = Vec::new();
        if let Some(country) = country {
            params.push(("country", country));
        }
        let raw = self.get("leagues", &params, self.list_max_age)?;
        Ok(parse_leagues(&raw))
    }

    pub fn teams_by_league(&self, league_id: u32, season: u32) -> Result<Vec<TeamRef>> {
        let league = league_id.to_string();
        let season = season.to_string();
        let raw = self.get(
            "teams",
            &[("league", league.as_str()), ("season", season.as_str())],
            self.list_max_age,
        )?;
        Ok(parse_teams(&raw))
    }

    pub fn team_statistics(&self, league_id: u32, season: u32, team: &TeamRef) -> Result<TeamStats> {
        let league = league_id.to_string();
        let season = season.to_string();
        let team_id = team.id.to_string();
        let raw = self.get(
            "teams/statistics",
            &[
                ("league", league.as_str()),
                ("season", season.as_str()),
                ("team", team_id.as_str()),
            ],
            self.stats_max_age,
        )?;
        Ok(extract_team_stats(&raw, &team.name))
    }

    pub fn head_to_head(&self, home: &TeamRef, away: &TeamRef, last: u32) -> Result<H2HStats> {
        let pair = format!("{}-{}", home.id, away.id);
        let last = last.to_string();
        let raw = self.get(
            "fixtures/headtohead",
            &[("h2h", pair.as_str()), ("last", last.as_str())],
            self.stats_max_age,
        )?;
        Ok(h2h_from_fixtures(&raw, home.id as u64, &home.name, &away.name))
    }

    fn get(&self, endpoint: &str, params: &[(&str, &str)], max_age: Duration) -> Result<Value> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        let (body, hit) = self.cache.get_or_fetch(&url, params, max_age, || {
            let resp = http_client()?
                .get(&url)
                .query(params)
                .header("x-apisports-key", self.api_key.as_str())
                .send()
                .context("api-football request failed")?;
            let status = resp.status();
            let body = resp.text().context("failed reading api-football body")?;
            if !status.is_success() {
                return Err(anyhow::anyhow!(
                    "api-football http {}: {}",
                    status,
                    body_snippet(&body)
                ));
            }
            Ok(body)
        })?;
        debug!(endpoint, ?hit, "api-football response");
        let value: Value = serde_json::from_str(&body).context("invalid api-football json")?;
        if let Some(errors) = value.get("errors")
            && has_errors(errors)
        {
            warn!(endpoint, %errors, "api-football reported errors");
            return Err(anyhow::anyhow!("api-football: {errors}"));
        }
        Ok(value)
    }
}

fn has_errors(errors: &Value) -> bool {
    match errors {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => false,
    }
}

pub fn parse_leagues(raw: &Value) -> Vec<LeagueRef> {
    let Some(items) = raw.get("response").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            Some(LeagueRef {
                id: lookup(item, "league.id")?.as_u64()? as u32,
                name: lookup(item, "league.name")?.as_str()?.to_string(),
                country: lookup(item, "country.name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

/// Team list of a league season. Every entry of the response is kept.
pub fn parse_teams(raw: &Value) -> Vec<TeamRef> {
    let Some(items) = raw.get("response").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            Some(TeamRef {
                id: lookup(item, "team.id")?.as_u64()? as u32,
                name: lookup(item, "team.name")?.as_str()?.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_teams_keeps_every_entry() {
        let raw = json!({"response": [
            {"team": {"id": 33, "name": "Manchester United"}},
            {"team": {"id": 40, "name": "Liverpool"}},
            {"team": {"id": null, "name": "Broken"}}
        ]});
        let teams = parse_teams(&raw);
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[1], TeamRef { id: 40, name: "Liverpool".to_string() });
    }

    #[test]
    fn empty_error_collections_are_not_errors() {
        assert!(!has_errors(&json!([])));
        assert!(!has_errors(&json!({})));
        assert!(has_errors(&json!({"token": "invalid key"})));
    }
}
