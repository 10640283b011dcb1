use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_POSSESSION: f64 = 50.0;

/// Season numbers for one team, as scraped or pulled from a stats API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamStats {
    pub name: String,
    pub matches_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    // Season totals, not per game.
    pub xg: f64,
    pub xga: f64,
    pub possession: f64,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub corners_for: f64,
    pub corners_against: f64,
    // Oldest to newest, e.g. "WDLWW".
    pub form: String,
    pub table_position: Option<u32>,
    pub league_size: Option<u32>,
    pub clean_sheets: u32,
    pub btts_matches: u32,
    pub over_2_5_matches: u32,
}

impl Default for TeamStats {
    fn default() -> Self {
        Self::default_for("")
    }
}

impl TeamStats {
    pub fn default_for(name: &str) -> Self {
        Self {
            name: name.to_string(),
            matches_played: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            goals_for: 0,
            goals_against: 0,
            xg: 0.0,
            xga: 0.0,
            possession: DEFAULT_POSSESSION,
            yellow_cards: 0,
            red_cards: 0,
            corners_for: 0.0,
            corners_against: 0.0,
            form: String::new(),
            table_position: None,
            league_size: None,
            clean_sheets: 0,
            btts_matches: 0,
            over_2_5_matches: 0,
        }
    }

    fn games(&self) -> f64 {
        self.matches_played.max(1) as f64
    }

    pub fn has_matches(&self) -> bool {
        self.matches_played > 0
    }

    pub fn goals_for_pg(&self) -> f64 {
        self.goals_for as f64 / self.games()
    }

    pub fn goals_against_pg(&self) -> f64 {
        self.goals_against as f64 / self.games()
    }

    pub fn xg_pg(&self) -> f64 {
        self.xg / self.games()
    }

    pub fn xga_pg(&self) -> f64 {
        self.xga / self.games()
    }

    pub fn corners_for_pg(&self) -> f64 {
        self.corners_for / self.games()
    }

    pub fn corners_against_pg(&self) -> f64 {
        self.corners_against / self.games()
    }

    /// Yellow plus red cards per game.
    pub fn cards_pg(&self) -> f64 {
        (self.yellow_cards + self.red_cards) as f64 / self.games()
    }

    pub fn points_per_game(&self) -> f64 {
        (3 * self.wins + self.draws) as f64 / self.games()
    }

    /// The last five results, oldest first.
    pub fn recent_form(&self) -> String {
        let chars: Vec<char> = self
            .form
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| matches!(c, 'W' | 'D' | 'L'))
            .collect();
        let start = chars.len().saturating_sub(5);
        chars[start..].iter().collect()
    }

    /// Points earned over the last five results (max 15).
    pub fn form_points(&self) -> u32 {
        self.recent_form()
            .chars()
            .map(|c| match c {
                'W' => 3,
                'D' => 1,
                _ => 0,
            })
            .sum()
    }

    /// Fraction (0..=1) of the inputs the probability model reads that carry real data.
    pub fn coverage(&self) -> f64 {
        let checks = [
            self.matches_played > 0,
            self.goals_for + self.goals_against > 0,
            self.xg > 0.0,
            self.xga > 0.0,
            (self.possession - DEFAULT_POSSESSION).abs() > f64::EPSILON,
            self.yellow_cards + self.red_cards > 0,
            self.corners_for > 0.0,
            !self.recent_form().is_empty(),
            self.table_position.is_some(),
        ];
        checks.iter().filter(|c| **c).count() as f64 / checks.len() as f64
    }

    /// Applies basic consistency rules after a merge from partial sources.
    pub fn normalize(&mut self) {
        let wdl = self.wins + self.draws + self.losses;
        if self.matches_played < wdl {
            self.matches_played = wdl;
        }
        if !(0.0..=100.0).contains(&self.possession) || self.possession == 0.0 {
            self.possession = DEFAULT_POSSESSION;
        }
        if self.xg < 0.0 {
            self.xg = 0.0;
        }
        if self.xga < 0.0 {
            self.xga = 0.0;
        }
        if let (Some(pos), Some(size)) = (self.table_position, self.league_size)
            && pos > size
        {
            self.league_size = Some(pos);
        }
    }
}

/// Aggregate head-to-head record; `team1` is the home side of the analysed fixture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct H2HStats {
    pub team1: String,
    pub team2: String,
    pub total_matches: u32,
    pub team1_wins: u32,
    pub team2_wins: u32,
    pub draws: u32,
    pub avg_goals: f64,
    pub avg_cards: f64,
    pub avg_corners: f64,
}

impl H2HStats {
    pub fn empty(team1: &str, team2: &str) -> Self {
        Self {
            team1: team1.to_string(),
            team2: team2.to_string(),
            ..Self::default()
        }
    }
}

const NAME_KEYS: &[&str] = &["name", "cleanName", "team_name", "response.team.name", "team.name"];
const MATCHES_KEYS: &[&str] = &[
    "matches_played",
    "stats.seasonMatchesPlayed_overall",
    "stats.matchesPlayed",
    "response.fixtures.played.total",
    "fixtures.played.total",
];
const WINS_KEYS: &[&str] = &[
    "wins",
    "stats.seasonWinsNum_overall",
    "response.fixtures.wins.total",
    "fixtures.wins.total",
];
const DRAWS_KEYS: &[&str] = &[
    "draws",
    "stats.seasonDrawsNum_overall",
    "response.fixtures.draws.total",
    "fixtures.draws.total",
];
const LOSSES_KEYS: &[&str] = &[
    "losses",
    "stats.seasonLossesNum_overall",
    "response.fixtures.loses.total",
    "fixtures.loses.total",
];
const GOALS_FOR_KEYS: &[&str] = &[
    "goals_for",
    "stats.seasonGoals_overall",
    "stats.seasonScoredNum_overall",
    "response.goals.for.total.total",
    "goals.for.total.total",
];
const GOALS_AGAINST_KEYS: &[&str] = &[
    "goals_against",
    "stats.seasonConceded_overall",
    "stats.seasonConcededNum_overall",
    "response.goals.against.total.total",
    "goals.against.total.total",
];
const XG_TOTAL_KEYS: &[&str] = &["xg", "stats.xg_for_overall", "stats.seasonXG_overall"];
const XG_AVG_KEYS: &[&str] = &["xg_per_game", "stats.xg_for_avg_overall"];
const XGA_TOTAL_KEYS: &[&str] = &["xga", "stats.xg_against_overall", "stats.seasonXGA_overall"];
const XGA_AVG_KEYS: &[&str] = &["xga_per_game", "stats.xg_against_avg_overall"];
const POSSESSION_KEYS: &[&str] = &["possession", "stats.possessionAVG_overall", "response.possession"];
const YELLOW_KEYS: &[&str] = &["yellow_cards", "stats.cardsTotal_overall", "stats.seasonYellowCards_overall"];
const YELLOW_RANGE_KEYS: &[&str] = &["response.cards.yellow", "cards.yellow"];
const RED_KEYS: &[&str] = &["red_cards", "stats.seasonRedCards_overall"];
const RED_RANGE_KEYS: &[&str] = &["response.cards.red", "cards.red"];
const CORNERS_FOR_KEYS: &[&str] = &["corners_for", "stats.cornersTotal_overall"];
const CORNERS_FOR_AVG_KEYS: &[&str] = &["corners_per_game", "stats.cornersAVG_overall"];
const CORNERS_AGAINST_KEYS: &[&str] = &["corners_against", "stats.cornersAgainst_overall"];
const CORNERS_AGAINST_AVG_KEYS: &[&str] = &["stats.cornersAgainstAVG_overall"];
const FORM_KEYS: &[&str] = &["form", "stats.formRun_overall", "response.form"];
const POSITION_KEYS: &[&str] = &["table_position", "position", "stats.leaguePosition_overall"];
const LEAGUE_SIZE_KEYS: &[&str] = &["league_size", "stats.leagueTeams"];
const CLEAN_SHEET_KEYS: &[&str] = &[
    "clean_sheets",
    "stats.seasonCS_overall",
    "response.clean_sheet.total",
    "clean_sheet.total",
];
const BTTS_KEYS: &[&str] = &["btts_matches", "stats.seasonBTTS_overall"];
const OVER25_KEYS: &[&str] = &["over_2_5_matches", "stats.seasonOver25Num_overall"];

/// Flattens a FootyStats team object, an API-Football statistics payload or a
/// flat record into [`TeamStats`], taking the first key path that resolves for
/// each field. Missing fields keep their defaults.
pub fn extract_team_stats(value: &Value, fallback_name: &str) -> TeamStats {
    let name = first_str(value, NAME_KEYS).unwrap_or_else(|| fallback_name.to_string());
    let mut out = TeamStats::default_for(&name);

    out.matches_played = first_u32(value, MATCHES_KEYS).unwrap_or(0);
    out.wins = first_u32(value, WINS_KEYS).unwrap_or(0);
    out.draws = first_u32(value, DRAWS_KEYS).unwrap_or(0);
    out.losses = first_u32(value, LOSSES_KEYS).unwrap_or(0);
    out.goals_for = first_u32(value, GOALS_FOR_KEYS).unwrap_or(0);
    out.goals_against = first_u32(value, GOALS_AGAINST_KEYS).unwrap_or(0);

    let games = out.matches_played as f64;
    out.xg = first_f64(value, XG_TOTAL_KEYS)
        .or_else(|| first_f64(value, XG_AVG_KEYS).map(|avg| avg * games))
        .unwrap_or(0.0);
    out.xga = first_f64(value, XGA_TOTAL_KEYS)
        .or_else(|| first_f64(value, XGA_AVG_KEYS).map(|avg| avg * games))
        .unwrap_or(0.0);
    out.possession = first_f64(value, POSSESSION_KEYS).unwrap_or(DEFAULT_POSSESSION);

    out.yellow_cards = first_u32(value, YELLOW_KEYS)
        .or_else(|| first_range_total(value, YELLOW_RANGE_KEYS))
        .unwrap_or(0);
    out.red_cards = first_u32(value, RED_KEYS)
        .or_else(|| first_range_total(value, RED_RANGE_KEYS))
        .unwrap_or(0);

    out.corners_for = first_f64(value, CORNERS_FOR_KEYS)
        .or_else(|| first_f64(value, CORNERS_FOR_AVG_KEYS).map(|avg| avg * games))
        .unwrap_or(0.0);
    out.corners_against = first_f64(value, CORNERS_AGAINST_KEYS)
        .or_else(|| first_f64(value, CORNERS_AGAINST_AVG_KEYS).map(|avg| avg * games))
        .unwrap_or(0.0);

    out.form = first_str(value, FORM_KEYS).unwrap_or_default();
    out.table_position = first_u32(value, POSITION_KEYS).filter(|p| *p > 0);
    out.league_size = first_u32(value, LEAGUE_SIZE_KEYS).filter(|n| *n > 0);
    out.clean_sheets = first_u32(value, CLEAN_SHEET_KEYS).unwrap_or(0);
    out.btts_matches = first_u32(value, BTTS_KEYS).unwrap_or(0);
    out.over_2_5_matches = first_u32(value, OVER25_KEYS).unwrap_or(0);

    out.normalize();
    out
}

/// Builds a head-to-head summary from an API-Football fixture list
/// (`/fixtures/headtohead`). Unfinished fixtures are skipped.
pub fn h2h_from_fixtures(value: &Value, team1_id: u64, team1: &str, team2: &str) -> H2HStats {
    let mut out = H2HStats::empty(team1, team2);
    let fixtures = lookup(value, "response")
        .and_then(Value::as_array)
        .or_else(|| value.as_array());
    let Some(fixtures) = fixtures else {
        return out;
    };

    let mut goals_total = 0u32;
    for fx in fixtures {
        let (Some(gh), Some(ga)) = (
            lookup(fx, "goals.home").and_then(value_u32),
            lookup(fx, "goals.away").and_then(value_u32),
        ) else {
            continue;
        };
        let home_id = lookup(fx, "teams.home.id").and_then(Value::as_u64);
        out.total_matches += 1;
        goals_total += gh + ga;
        let team1_home = home_id == Some(team1_id);
        let (t1, t2) = if team1_home { (gh, ga) } else { (ga, gh) };
        if t1 > t2 {
            out.team1_wins += 1;
        } else if t2 > t1 {
            out.team2_wins += 1;
        } else {
            out.draws += 1;
        }
    }
    if out.total_matches > 0 {
        out.avg_goals = goals_total as f64 / out.total_matches as f64;
    }
    out
}

/// Ordered `(label, value)` pairs used when rendering a team into a prompt.
pub fn prompt_fields(stats: &TeamStats) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("Matches played", stats.matches_played.to_string()),
        (
            "Record (W-D-L)",
            format!("{}-{}-{}", stats.wins, stats.draws, stats.losses),
        ),
        (
            "Goals (for/against)",
            format!("{}/{}", stats.goals_for, stats.goals_against),
        ),
        (
            "Goals per game",
            format!("{:.2} scored, {:.2} conceded", stats.goals_for_pg(), stats.goals_against_pg()),
        ),
        (
            "xG per game",
            format!("{:.2} for, {:.2} against", stats.xg_pg(), stats.xga_pg()),
        ),
        ("Possession", format!("{:.1}%", stats.possession)),
        ("Cards per game", format!("{:.2}", stats.cards_pg())),
        (
            "Corners per game",
            format!("{:.2} for, {:.2} against", stats.corners_for_pg(), stats.corners_against_pg()),
        ),
    ];
    let form = stats.recent_form();
    fields.push((
        "Form (last 5)",
        if form.is_empty() {
            "n/a".to_string()
        } else {
            format!("{form} ({} pts)", stats.form_points())
        },
    ));
    if let Some(pos) = stats.table_position {
        let table = match stats.league_size {
            Some(size) => format!("{pos} of {size}"),
            None => pos.to_string(),
        };
        fields.push(("Table position", table));
    }
    if stats.matches_played > 0 && stats.clean_sheets > 0 {
        fields.push(("Clean sheets", stats.clean_sheets.to_string()));
    }
    fields
}

pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for part in path.split('.') {
        cur = match cur {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if cur.is_null() { None } else { Some(cur) }
}

pub fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn value_u32(value: &Value) -> Option<u32> {
    value_f64(value)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u32)
}

/// Parses "1,234", "55.3%", " 12 " and similar cells.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s == "-" || s == "—" {
        return None;
    }
    let s = s.trim_end_matches('%').replace(',', "");
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn first_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| lookup(value, k).and_then(value_f64))
}

fn first_u32(value: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| lookup(value, k).and_then(value_u32))
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        lookup(value, k)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

// API-Football splits cards into minute ranges: {"0-15": {"total": 2}, ...}.
fn first_range_total(value: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| {
        let ranges = lookup(value, k)?.as_object()?;
        let total = ranges
            .values()
            .filter_map(|r| lookup(r, "total").and_then(value_u32))
            .sum();
        Some(total)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recent_form_keeps_last_five_results() {
        let mut stats = TeamStats::default_for("A");
        stats.form = "lwwdlwdWW".to_string();
        assert_eq!(stats.recent_form(), "LWDWW");
        assert_eq!(stats.form_points(), 10);
    }

    #[test]
    fn per_game_values_do_not_divide_by_zero() {
        let stats = TeamStats::default_for("Empty");
        assert_eq!(stats.goals_for_pg(), 0.0);
        assert_eq!(stats.cards_pg(), 0.0);
        assert!(!stats.has_matches());
    }

    #[test]
    fn extract_prefers_earlier_key_paths() {
        let raw = json!({
            "name": "Arsenal",
            "wins": 20,
            "stats": {
                "seasonMatchesPlayed_overall": 30,
                "seasonWinsNum_overall": 18,
                "xg_for_avg_overall": "1.90",
                "possessionAVG_overall": "57%"
            }
        });
        let stats = extract_team_stats(&raw, "fallback");
        assert_eq!(stats.name, "Arsenal");
        assert_eq!(stats.wins, 20);
        assert_eq!(stats.matches_played, 30);
        assert!((stats.xg - 57.0).abs() < 1e-9);
        assert!((stats.possession - 57.0).abs() < 1e-9);
    }

    #[test]
    fn api_football_card_ranges_are_summed() {
        let raw = json!({
            "response": {
                "team": {"name": "Sevilla"},
                "fixtures": {"played": {"total": 10}},
                "cards": {
                    "yellow": {"0-15": {"total": 2}, "16-30": {"total": 5}, "31-45": {"total": null}},
                    "red": {"76-90": {"total": 1}}
                }
            }
        });
        let stats = extract_team_stats(&raw, "x");
        assert_eq!(stats.name, "Sevilla");
        assert_eq!(stats.yellow_cards, 7);
        assert_eq!(stats.red_cards, 1);
    }

    #[test]
    fn h2h_counts_from_team1_perspective() {
        let raw = json!({"response": [
            {"teams": {"home": {"id": 1}, "away": {"id": 2}}, "goals": {"home": 2, "away": 0}},
            {"teams": {"home": {"id": 2}, "away": {"id": 1}}, "goals": {"home": 1, "away": 1}},
            {"teams": {"home": {"id": 2}, "away": {"id": 1}}, "goals": {"home": 3, "away": 1}},
            {"teams": {"home": {"id": 1}, "away": {"id": 2}}, "goals": {"home": null, "away": null}}
        ]});
        let h2h = h2h_from_fixtures(&raw, 1, "A", "B");
        assert_eq!(h2h.total_matches, 3);
        assert_eq!(h2h.team1_wins, 1);
        assert_eq!(h2h.team2_wins, 1);
        assert_eq!(h2h.draws, 1);
        assert!((h2h.avg_goals - 8.0 / 3.0).abs() < 1e-9);
    }
}
