use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::analysis_parser::{AnalysisDocument, parse_analysis_response};
use crate::api_cache::ApiCache;
use crate::api_football::{ApiFootballClient, TeamRef};
use crate::config::{AppConfig, PromptStyle};
use crate::fbref_parse::{canonical_words, find_team, parse_team_stats};
use crate::footystats::FootyStatsClient;
use crate::justifications::{JustificationContext, attach_justifications};
use crate::llm::{ChatModel, analyze_with_gpt};
use crate::odds_input::{MarketOdds, parse_odds_line};
use crate::opportunities::{MarketComparison, OpportunityRecord, compare_markets, find_opportunities};
use crate::probability::{MarketProbabilities, calculate_advanced_probabilities};
use crate::prompt::{PromptContext, format_enhanced_prompt, format_highly_optimized_prompt};
use crate::scraper_fetch::{RetryPolicy, fetch_fbref_data};
use crate::team_stats::{H2HStats, TeamStats, extract_team_stats};

const H2H_LAST: u32 = 10;

/// Where the team statistics for one analysis come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceSpec {
    Fbref { url: String },
    FootyStats { season_id: u32 },
    ApiFootball { league_id: u32, season: u32 },
    Fixture { path: PathBuf },
}

impl SourceSpec {
    pub fn label(&self) -> String {
        match self {
            SourceSpec::Fbref { url } => format!("FBref {url}"),
            SourceSpec::FootyStats { season_id } => format!("FootyStats season {season_id}"),
            SourceSpec::ApiFootball { league_id, season } => {
                format!("API-Football league {league_id} season {season}")
            }
            SourceSpec::Fixture { path } => format!("fixture {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub league: String,
    pub home: String,
    pub away: String,
    pub odds_line: String,
    pub source: SourceSpec,
    pub use_llm: bool,
}

/// Tuning the pipeline needs from [`AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub value_threshold: f64,
    pub prompt_style: PromptStyle,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            value_threshold: cfg.value_threshold,
            prompt_style: cfg.prompt_style,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub league: String,
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub home: TeamStats,
    pub away: TeamStats,
    pub h2h: Option<H2HStats>,
    pub odds: Vec<MarketOdds>,
    pub probabilities: MarketProbabilities,
    pub comparisons: Vec<MarketComparison>,
    pub opportunities: Vec<OpportunityRecord>,
    pub prompt: String,
    pub llm_text: Option<String>,
    pub document: Option<AnalysisDocument>,
    pub warnings: Vec<String>,
    /// Requested teams the provider had no statistics for.
    #[serde(default)]
    pub stats_missing: Vec<String>,
}

impl AnalysisOutcome {
    /// Markets the model actually priced against the user's odds.
    pub fn markets_analyzed(&self) -> u32 {
        self.comparisons.len() as u32
    }

    /// Credits this analysis costs: one per priced market, nothing when both
    /// teams fell back to default statistics.
    pub fn credits_due(&self) -> u32 {
        if self.stats_missing.len() >= 2 {
            return 0;
        }
        self.markets_analyzed()
    }
}

/// A provider of per-team statistics.
pub trait StatsSource: Send + Sync {
    fn label(&self) -> String;

    /// `Ok(None)` when the provider answered but does not know the team.
    fn team_stats(&self, team: &str) -> Result<Option<TeamStats>>;

    fn head_to_head(&self, _home: &str, _away: &str) -> Result<Option<H2HStats>> {
        Ok(None)
    }
}

/// FBref squad-stats page, fetched once per source and shared by both teams.
pub struct FbrefSource {
    url: String,
    cache: ApiCache,
    max_age: Duration,
    policy: RetryPolicy,
    table: OnceCell<Vec<TeamStats>>,
}

impl FbrefSource {
    pub fn new(url: impl Into<String>, cache: ApiCache, max_age: Duration, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            cache,
            max_age,
            policy,
            table: OnceCell::new(),
        }
    }

    fn teams(&self) -> Result<&Vec<TeamStats>> {
        self.table.get_or_try_init(|| {
            let html = fetch_fbref_data(&self.url, &self.cache, self.max_age, self.policy)?
                .ok_or_else(|| anyhow::anyhow!("could not fetch {}", self.url))?;
            parse_team_stats(&html)
        })
    }
}

impl StatsSource for FbrefSource {
    fn label(&self) -> String {
        format!("FBref {}", self.url)
    }

    fn team_stats(&self, team: &str) -> Result<Option<TeamStats>> {
        Ok(find_team(self.teams()?, team).cloned())
    }
}

pub struct FootyStatsSource {
    client: FootyStatsClient,
    season_id: u32,
    table: OnceCell<Vec<TeamStats>>,
}

impl FootyStatsSource {
    pub fn new(client: FootyStatsClient, season_id: u32) -> Self {
        Self {
            client,
            season_id,
            table: OnceCell::new(),
        }
    }
}

impl StatsSource for FootyStatsSource {
    fn label(&self) -> String {
        format!("FootyStats season {}", self.season_id)
    }

    fn team_stats(&self, team: &str) -> Result<Option<TeamStats>> {
        let teams = self
            .table
            .get_or_try_init(|| self.client.league_teams(self.season_id))?;
        Ok(find_team(teams, team).cloned())
    }
}

pub struct ApiFootballSource {
    client: ApiFootballClient,
    league_id: u32,
    season: u32,
    teams: OnceCell<Vec<TeamRef>>,
}

impl ApiFootballSource {
    pub fn new(client: ApiFootballClient, league_id: u32, season: u32) -> Self {
        Self {
            client,
            league_id,
            season,
            teams: OnceCell::new(),
        }
    }

    fn team_ref(&self, name: &str) -> Result<Option<TeamRef>> {
        let refs = self
            .teams
            .get_or_try_init(|| self.client.teams_by_league(self.league_id, self.season))?;
        // Reuse the squad-name matcher by viewing refs as empty stat rows.
        let named: Vec<TeamStats> = refs.iter().map(|r| TeamStats::default_for(&r.name)).collect();
        Ok(find_team(&named, name).and_then(|hit| refs.iter().find(|r| r.name == hit.name).cloned()))
    }
}

impl StatsSource for ApiFootballSource {
    fn label(&self) -> String {
        format!("API-Football league {} season {}", self.league_id, self.season)
    }

    fn team_stats(&self, team: &str) -> Result<Option<TeamStats>> {
        let Some(team_ref) = self.team_ref(team)? else {
            return Ok(None);
        };
        self.client
            .team_statistics(self.league_id, self.season, &team_ref)
            .map(Some)
    }

    fn head_to_head(&self, home: &str, away: &str) -> Result<Option<H2HStats>> {
        let (Some(h), Some(a)) = (self.team_ref(home)?, self.team_ref(away)?) else {
            return Ok(None);
        };
        self.client.head_to_head(&h, &a, H2H_LAST).map(Some)
    }
}

/// Local JSON file: `{"teams": [...], "h2h": {...}}`. Team entries may be flat
/// records or provider payloads.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    pub label: String,
    pub teams: Vec<TeamStats>,
    pub h2h: Option<H2HStats>,
}

impl FixtureSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid fixture json {}", path.display()))?;
        let mut source = Self::from_value(&value);
        source.label = format!("fixture {}", path.display());
        Ok(source)
    }

    pub fn from_value(value: &Value) -> Self {
        let teams = value
            .get("teams")
            .and_then(Value::as_array)
            .or_else(|| value.get("data").and_then(Value::as_array))
            .map(|items| {
                items
                    .iter()
                    .map(|item| extract_team_stats(item, ""))
                    .filter(|t| !t.name.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let h2h = value
            .get("h2h")
            .and_then(|h| serde_json::from_value::<H2HStats>(h.clone()).ok());
        Self {
            label: "fixture".to_string(),
            teams,
            h2h,
        }
    }
}

impl StatsSource for FixtureSource {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn team_stats(&self, team: &str) -> Result<Option<TeamStats>> {
        Ok(find_team(&self.teams, team).cloned())
    }

    fn head_to_head(&self, home: &str, away: &str) -> Result<Option<H2HStats>> {
        let Some(h) = &self.h2h else {
            return Ok(None);
        };
        let same = |a: &str, b: &str| a.eq_ignore_ascii_case(b);
        if same(&h.team1, home) && same(&h.team2, away) {
            return Ok(Some(h.clone()));
        }
        if same(&h.team1, away) && same(&h.team2, home) {
            // Stored the other way round; flip so team1 is the home side.
            return Ok(Some(H2HStats {
                team1: h.team2.clone(),
                team2: h.team1.clone(),
                team1_wins: h.team2_wins,
                team2_wins: h.team1_wins,
                ..h.clone()
            }));
        }
        Ok(None)
    }
}

/// Builds the provider for `spec`, or explains which credential is missing.
pub fn build_source(spec: &SourceSpec, cfg: &AppConfig) -> Result<Box<dyn StatsSource>> {
    let cache = ApiCache::new(cfg.api_cache_dir());
    let source: Box<dyn StatsSource> = match spec {
        SourceSpec::Fbref { url } => Box::new(FbrefSource::new(
            url.clone(),
            ApiCache::new(cfg.html_cache_dir()),
            cfg.stats_cache_max_age,
            RetryPolicy {
                attempts: cfg.scrape_retries,
                base_delay: cfg.scrape_backoff,
            },
        )),
        SourceSpec::FootyStats { season_id } => {
            let key = cfg
                .footystats_api_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("FOOTYSTATS_API_KEY is not set"))?;
            let client = FootyStatsClient::new(
                key,
                cache,
                cfg.stats_cache_max_age,
                cfg.list_cache_max_age,
            );
            Box::new(FootyStatsSource::new(client, *season_id))
        }
        SourceSpec::ApiFootball { league_id, season } => {
            let key = cfg
                .api_football_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("API_FOOTBALL_KEY is not set"))?;
            let client = ApiFootballClient::new(
                key,
                cache,
                cfg.stats_cache_max_age,
                cfg.list_cache_max_age,
            );
            Box::new(ApiFootballSource::new(client, *league_id, *season))
        }
        SourceSpec::Fixture { path } => Box::new(FixtureSource::from_path(path)?),
    };
    Ok(source)
}

/// One end-to-end analysis: stats, model, value detection, prompt and
/// (optionally) the LLM commentary. Provider and LLM failures become warnings.
pub fn run_analysis(
    request: &AnalysisRequest,
    source: &dyn StatsSource,
    chat: Option<&dyn ChatModel>,
    cfg: PipelineConfig,
) -> AnalysisOutcome {
    let mut warnings = Vec::new();

    let (home_res, away_res) = rayon::join(
        || source.team_stats(&request.home),
        || source.team_stats(&request.away),
    );
    let mut stats_missing = Vec::new();
    let home = resolve_team(&request.home, home_res, &mut warnings, &mut stats_missing);
    let away = resolve_team(&request.away, away_res, &mut warnings, &mut stats_missing);

    let h2h = match source.head_to_head(&request.home, &request.away) {
        Ok(h) => h.filter(|h| h.total_matches > 0),
        Err(err) => {
            warn!("head-to-head lookup failed: {err:#}");
            warnings.push(format!("head-to-head unavailable: {err}"));
            None
        }
    };

    let parsed = parse_odds_line(&request.odds_line);
    warnings.extend(parsed.warnings);
    let odds = parsed.odds;
    if odds.is_empty() {
        warnings.push("no valid odds entered; value detection skipped".to_string());
    }

    let probabilities = calculate_advanced_probabilities(&home, &away, h2h.as_ref());
    let comparisons = compare_markets(&probabilities, &odds, &home.name, &away.name);
    let mut opportunities = find_opportunities(
        &probabilities,
        &odds,
        &home.name,
        &away.name,
        cfg.value_threshold,
    );
    attach_justifications(
        &mut opportunities,
        &JustificationContext {
            home: &home,
            away: &away,
            h2h: h2h.as_ref(),
            probs: &probabilities,
        },
    );

    let ctx = PromptContext {
        league: &request.league,
        home: &home,
        away: &away,
        h2h: h2h.as_ref(),
        probs: &probabilities,
        odds: &odds,
        opportunities: &opportunities,
    };

    let (prompt, llm_text) = match chat.filter(|_| request.use_llm) {
        Some(model) => match analyze_with_gpt(model, &ctx, cfg.prompt_style) {
            Ok((prompt, reply)) => (prompt, Some(reply)),
            Err(err) => {
                warn!("llm analysis failed: {err:#}");
                warnings.push(format!("AI analysis unavailable: {err}"));
                (render_prompt(&ctx, cfg.prompt_style), None)
            }
        },
        None => {
            if request.use_llm {
                warnings.push("AI analysis skipped: OPENAI_API_KEY is not set".to_string());
            }
            (render_prompt(&ctx, cfg.prompt_style), None)
        }
    };
    let document = llm_text.as_deref().map(parse_analysis_response);

    info!(
        home = %home.name,
        away = %away.name,
        markets = odds.len(),
        value = opportunities.len(),
        llm = llm_text.is_some(),
        "analysis complete"
    );

    AnalysisOutcome {
        league: request.league.clone(),
        source: source.label(),
        generated_at: Utc::now(),
        home,
        away,
        h2h,
        odds,
        probabilities,
        comparisons,
        opportunities,
        prompt,
        llm_text,
        document,
        warnings,
        stats_missing,
    }
}

fn render_prompt(ctx: &PromptContext, style: PromptStyle) -> String {
    match style {
        PromptStyle::Optimized => format_highly_optimized_prompt(ctx),
        PromptStyle::Enhanced => format_enhanced_prompt(ctx),
    }
}

fn resolve_team(
    name: &str,
    fetched: Result<Option<TeamStats>>,
    warnings: &mut Vec<String>,
    missing: &mut Vec<String>,
) -> TeamStats {
    match fetched {
        Ok(Some(mut stats)) => {
            if canonical_words(&stats.name) != canonical_words(name) {
                info!(requested = name, matched = %stats.name, "team matched by alias");
                warnings.push(format!("using stats for {} as {name}", stats.name));
            }
            // Keep the user's spelling for labels.
            stats.name = name.trim().to_string();
            stats
        }
        Ok(None) => {
            warnings.push(format!("no statistics found for {name}; using defaults"));
            missing.push(name.trim().to_string());
            TeamStats::default_for(name.trim())
        }
        Err(err) => {
            warn!(team = name, "stats fetch failed: {err:#}");
            warnings.push(format!("statistics for {name} unavailable ({err}); using defaults"));
            missing.push(name.trim().to_string());
            TeamStats::default_for(name.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StaticModel;
    use serde_json::json;

    fn fixture() -> FixtureSource {
        FixtureSource::from_value(&json!({
            "teams": [
                {"name": "Arsenal", "matches_played": 10, "wins": 7, "draws": 2, "losses": 1,
                 "goals_for": 21, "goals_against": 8, "xg": 19.5, "xga": 9.0, "form": "WWDWW"},
                {"name": "Chelsea", "matches_played": 10, "wins": 4, "draws": 3, "losses": 3,
                 "goals_for": 14, "goals_against": 12, "form": "LDWWL"}
            ],
            "h2h": {"team1": "Chelsea", "team2": "Arsenal", "total_matches": 4,
                    "team1_wins": 1, "team2_wins": 2, "draws": 1, "avg_goals": 2.5}
        }))
    }

    fn request(odds: &str, use_llm: bool) -> AnalysisRequest {
        AnalysisRequest {
            league: "Premier League".to_string(),
            home: "Arsenal".to_string(),
            away: "Chelsea".to_string(),
            odds_line: odds.to_string(),
            source: SourceSpec::Fixture {
                path: PathBuf::from("unused.json"),
            },
            use_llm,
        }
    }

    const CFG: PipelineConfig = PipelineConfig {
        value_threshold: 5.0,
        prompt_style: PromptStyle::Optimized,
    };

    #[test]
    fn fixture_h2h_is_flipped_to_home_perspective() {
        let h2h = fixture().head_to_head("Arsenal", "Chelsea").unwrap().unwrap();
        assert_eq!(h2h.team1, "Arsenal");
        assert_eq!(h2h.team1_wins, 2);
    }

    #[test]
    fn missing_team_falls_back_with_warning() {
        let mut req = request("1=2.0", false);
        req.away = "Unknown United".to_string();
        let out = run_analysis(&req, &fixture(), None, CFG);
        assert_eq!(out.away.matches_played, 0);
        assert!(out.warnings.iter().any(|w| w.contains("Unknown United")));
        assert!(out.h2h.is_none());
        assert_eq!(out.stats_missing, vec!["Unknown United".to_string()]);
        assert_eq!(out.credits_due(), 1);
    }

    #[test]
    fn both_teams_missing_costs_nothing() {
        let mut req = request("1=2.0 X=3.2", false);
        req.home = "Real Madrid".to_string();
        req.away = "Barcelona".to_string();
        let out = run_analysis(&req, &fixture(), None, CFG);
        assert_eq!(out.stats_missing.len(), 2);
        assert_eq!(out.markets_analyzed(), 2);
        assert_eq!(out.credits_due(), 0);
    }

    #[test]
    fn alias_match_is_reported() {
        let source = FixtureSource::from_value(&json!({
            "teams": [
                {"name": "Manchester Utd", "matches_played": 10, "wins": 5},
                {"name": "Manchester City", "matches_played": 10, "wins": 8}
            ]
        }));
        let mut req = request("1=2.0", false);
        req.home = "Manchester United".to_string();
        req.away = "Arsenal".to_string();
        let out = run_analysis(&req, &source, None, CFG);
        assert_eq!(out.home.name, "Manchester United");
        assert_eq!(out.home.wins, 5);
        assert!(out.warnings.iter().any(|w| w.contains("using stats for Manchester Utd")));
    }

    #[test]
    fn llm_reply_is_parsed() {
        let model = StaticModel {
            reply: "# Arsenal vs Chelsea\nConfidence: High".to_string(),
        };
        let out = run_analysis(&request("1=2.5 X=3.5 2=3.0", true), &fixture(), Some(&model), CFG);
        let doc = out.document.as_ref().unwrap();
        assert_eq!(doc.title, "Arsenal vs Chelsea");
        assert_eq!(doc.confidence.as_deref(), Some("High"));
        assert_eq!(out.markets_analyzed(), 3);
        assert!(out.h2h.is_some());
    }

    #[test]
    fn llm_requested_without_model_warns() {
        let out = run_analysis(&request("1=2.5", true), &fixture(), None, CFG);
        assert!(out.llm_text.is_none());
        assert!(out.prompt.contains("# MATCH"));
        assert!(out.warnings.iter().any(|w| w.contains("OPENAI_API_KEY")));
    }
}
