use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::team_stats::{TeamStats, parse_number};

const FUZZY_HEADER_THRESHOLD: f64 = 0.92;
const FUZZY_TEAM_THRESHOLD: f64 = 0.88;
const FUZZY_TEAM_MARGIN: f64 = 0.03;

/// Canonical column name and the header spellings that map onto it.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("team", &["squad", "team", "club", "equipo"]),
    ("rank", &["rk", "rank", "pos", "position"]),
    ("matches_played", &["mp", "matches played", "matches", "games", "pj"]),
    ("wins", &["w", "wins"]),
    ("draws", &["d", "draws", "ties", "drawn"]),
    ("losses", &["l", "losses"]),
    ("goals_for", &["gf", "goals for", "gls", "goals"]),
    ("goals_against", &["ga", "goals against"]),
    ("points", &["pts", "points"]),
    ("xg", &["xg", "expected goals", "xg for"]),
    ("xga", &["xga", "xg against", "expected goals against"]),
    ("possession", &["poss", "possession"]),
    ("yellow_cards", &["crdy", "yellow cards", "yellows"]),
    ("red_cards", &["crdr", "red cards", "reds"]),
    ("corners", &["ck", "corner kicks", "corners"]),
    ("form", &["last 5", "form", "last5"]),
    ("clean_sheets", &["cs", "clean sheets"]),
];

/// Table ids FBref uses for the squad-level tables we read.
const KNOWN_TABLE_HINTS: &[&str] = &[
    "_overall",
    "stats_squads_standard",
    "stats_squads_possession",
    "stats_squads_misc",
    "stats_squads_passing_types",
    "stats_squads_keeper",
];

#[derive(Debug, Clone)]
struct ParsedTable {
    id: String,
    columns: Vec<Option<&'static str>>,
    rows: Vec<Vec<String>>,
}

impl ParsedTable {
    fn column_index(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(key))
    }

    fn is_against(&self) -> bool {
        self.id.ends_with("_against")
    }
}

/// Maps a raw header cell onto a canonical column name.
pub fn canonical_column(header: &str) -> Option<&'static str> {
    let norm = normalize_header(header);
    if norm.is_empty() {
        return None;
    }
    for (key, aliases) in COLUMN_ALIASES {
        if aliases.iter().any(|a| *a == norm) {
            return Some(key);
        }
    }
    // Short codes are too close to each other for fuzzy matching ("w" vs "l").
    if norm.len() <= 3 {
        return None;
    }
    let mut best: Option<(&'static str, f64)> = None;
    for (key, aliases) in COLUMN_ALIASES {
        for alias in aliases
            .iter()
            .filter(|a| a.len() > 3 && a.chars().next() == norm.chars().next())
        {
            let score = strsim::jaro_winkler(&norm, alias);
            if score >= FUZZY_HEADER_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
                best = Some((key, score));
            }
        }
    }
    best.map(|(key, _)| key)
}

fn normalize_header(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts per-squad statistics from an FBref league or squad-stats page.
/// Tables FBref hides inside HTML comments are included. Fields no table
/// provides keep the defaults of [`TeamStats::default_for`].
pub fn parse_team_stats(html: &str) -> Result<Vec<TeamStats>> {
    let uncommented = html.replace("<!--", "").replace("-->", "");
    let document = Html::parse_document(&uncommented);
    let tables = extract_tables(&document)?;

    let mut order: Vec<String> = Vec::new();
    let mut teams: HashMap<String, TeamStats> = HashMap::new();

    for table in &tables {
        let Some(team_idx) = table.column_index("team") else {
            continue;
        };
        let against = table.is_against();
        let league_size = table.rows.len() as u32;
        for row in &table.rows {
            let Some(raw_name) = row.get(team_idx) else {
                continue;
            };
            let name = if against {
                raw_name.trim().trim_start_matches("vs ").trim().to_string()
            } else {
                raw_name.trim().to_string()
            };
            if name.is_empty() {
                continue;
            }
            let key = canonical_words(&name).join("");
            let entry = teams.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                TeamStats::default_for(&name)
            });
            apply_row(entry, table, row, against, league_size);
        }
        debug!(table = %table.id, rows = table.rows.len(), "parsed fbref table");
    }

    let mut out: Vec<TeamStats> = order
        .into_iter()
        .filter_map(|k| teams.remove(&k))
        .collect();
    for team in &mut out {
        team.normalize();
    }
    Ok(out)
}

fn apply_row(
    stats: &mut TeamStats,
    table: &ParsedTable,
    row: &[String],
    against: bool,
    league_size: u32,
) {
    let num = |key: &str| -> Option<f64> {
        table
            .column_index(key)
            .and_then(|i| row.get(i))
            .and_then(|cell| parse_number(cell))
    };
    let count = |key: &str| num(key).filter(|v| *v >= 0.0).map(|v| v.round() as u32);

    if against {
        if let Some(ck) = num("corners") {
            stats.corners_against = ck;
        }
        return;
    }

    if let Some(v) = count("matches_played") {
        stats.matches_played = stats.matches_played.max(v);
    }
    if let Some(v) = count("rank") {
        stats.table_position = Some(v);
        stats.league_size = Some(league_size);
    }
    if let Some(v) = count("wins") {
        stats.wins = v;
    }
    if let Some(v) = count("draws") {
        stats.draws = v;
    }
    if let Some(v) = count("losses") {
        stats.losses = v;
    }
    if let Some(v) = count("goals_for")
        && stats.goals_for == 0
    {
        stats.goals_for = v;
    }
    if let Some(v) = count("goals_against") {
        stats.goals_against = v;
    }
    if let Some(v) = num("xg")
        && stats.xg == 0.0
    {
        stats.xg = v;
    }
    if let Some(v) = num("xga") {
        stats.xga = v;
    }
    if let Some(v) = num("possession") {
        stats.possession = v;
    }
    if let Some(v) = count("yellow_cards") {
        stats.yellow_cards = v;
    }
    if let Some(v) = count("red_cards") {
        stats.red_cards = v;
    }
    if let Some(v) = num("corners") {
        stats.corners_for = v;
    }
    if let Some(v) = count("clean_sheets") {
        stats.clean_sheets = v;
    }
    if let Some(idx) = table.column_index("form")
        && let Some(cell) = row.get(idx)
    {
        let form: String = cell
            .chars()
            .filter(|c| matches!(c.to_ascii_uppercase(), 'W' | 'D' | 'L'))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if !form.is_empty() {
            stats.form = form;
        }
    }
}

fn extract_tables(document: &Html) -> Result<Vec<ParsedTable>> {
    let table_sel = selector("table")?;
    let header_row_sel = selector("thead tr")?;
    let body_row_sel = selector("tbody tr")?;
    let any_row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let mut out = Vec::new();
    for table in document.select(&table_sel) {
        let id = table.value().attr("id").unwrap_or_default().to_string();

        let header_row = table
            .select(&header_row_sel)
            .last()
            .or_else(|| table.select(&any_row_sel).next());
        let Some(header_row) = header_row else {
            continue;
        };
        let mut seen = HashSet::new();
        let columns: Vec<Option<&'static str>> = header_row
            .select(&cell_sel)
            .map(|cell| {
                let key = canonical_column(&cell_text(cell))?;
                // FBref repeats headers in per-90 groups; keep the first.
                seen.insert(key).then_some(key)
            })
            .collect();

        if !is_team_table(&id, &columns) {
            continue;
        }

        let mut body_rows: Vec<ElementRef> = table.select(&body_row_sel).collect();
        if body_rows.is_empty() {
            body_rows = table.select(&any_row_sel).skip(1).collect();
        }
        let rows = body_rows
            .into_iter()
            .filter(|row| {
                let class = row.value().attr("class").unwrap_or_default();
                !class.contains("thead") && !class.contains("spacer")
            })
            .map(|row| row.select(&cell_sel).map(cell_text).collect::<Vec<_>>())
            .filter(|cells| !cells.is_empty())
            .collect();

        out.push(ParsedTable { id, columns, rows });
    }
    Ok(out)
}

fn is_team_table(id: &str, columns: &[Option<&'static str>]) -> bool {
    let has = |key: &str| columns.iter().any(|c| *c == Some(key));
    // Home/away splits repeat W/D/L per venue and would overwrite season totals.
    if !has("team") || id.contains("home_away") {
        return false;
    }
    if KNOWN_TABLE_HINTS.iter().any(|hint| id.contains(hint)) {
        return true;
    }
    // Unknown id: accept anything that looks like a squad table.
    has("matches_played") || (has("wins") && has("losses"))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid selector {css}"))
}

fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Finds a team by exact name, then by shared aliases, then by fuzzy name.
/// Ambiguous or conflicting candidates resolve to `None`.
pub fn find_team<'a>(teams: &'a [TeamStats], name: &str) -> Option<&'a TeamStats> {
    let wanted_words = canonical_words(name);
    let wanted = wanted_words.join("");
    if wanted.is_empty() {
        return None;
    }
    if let Some(t) = teams
        .iter()
        .find(|t| canonical_words(&t.name).join("") == wanted)
    {
        return Some(t);
    }

    let wanted_aliases = team_aliases(name);
    let mut by_alias: Vec<(&TeamStats, usize)> = teams
        .iter()
        .map(|t| (t, team_aliases(&t.name).intersection(&wanted_aliases).count()))
        .filter(|(t, shared)| {
            *shared >= 2 && !has_conflicting_word(&wanted_words, &canonical_words(&t.name))
        })
        .collect();
    by_alias.sort_by(|a, b| b.1.cmp(&a.1));
    match by_alias.as_slice() {
        [(team, _)] => return Some(*team),
        [(team, best), (_, next), ..] if best > next => return Some(*team),
        [_, _, ..] => return None,
        [] => {}
    }

    let mut scored: Vec<(&TeamStats, f64)> = teams
        .iter()
        .map(|t| (t, strsim::jaro_winkler(&canonical_words(&t.name).join(""), &wanted)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let (team, score) = *scored.first()?;
    if score < FUZZY_TEAM_THRESHOLD {
        return None;
    }
    if scored
        .get(1)
        .is_some_and(|(_, runner_up)| score - runner_up < FUZZY_TEAM_MARGIN)
    {
        return None;
    }
    if has_conflicting_word(&wanted_words, &canonical_words(&team.name)) {
        return None;
    }
    Some(team)
}

/// True when each name keeps a word the other lacks and the two words are not
/// spellings of one another ("united" vs "city"). Abbreviations such as
/// "utd" for "united" are not conflicts.
fn has_conflicting_word(a: &[String], b: &[String]) -> bool {
    let only_a: Vec<&String> = a.iter().filter(|w| !b.contains(*w)).collect();
    let only_b: Vec<&String> = b.iter().filter(|w| !a.contains(*w)).collect();
    if only_a.is_empty() || only_b.is_empty() {
        return false;
    }
    only_a
        .iter()
        .any(|wa| !only_b.iter().any(|wb| same_word(wa, wb)))
}

fn same_word(a: &str, b: &str) -> bool {
    if strsim::jaro_winkler(a, b) >= FUZZY_TEAM_THRESHOLD {
        return true;
    }
    // "utd" / "united", "man" / "manchester": letters of the short word appear in order.
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut rest = long.chars();
    short.len() >= 3
        && short.chars().next() == long.chars().next()
        && short.chars().all(|c| rest.any(|l| l == c))
}

pub fn team_aliases(name: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let words = canonical_words(name);
    if words.is_empty() {
        return out;
    }

    let collapsed = words.join("");
    if collapsed.len() >= 2 {
        out.insert(collapsed.clone());
    }
    let acronym: String = words.iter().filter_map(|w| w.chars().next()).collect();
    if acronym.len() >= 2 {
        out.insert(acronym);
    }
    for w in &words {
        if w.len() >= 3 {
            out.insert(w.clone());
        }
    }
    out
}

pub fn canonical_words(name: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned
        .split_whitespace()
        .filter(|w| !matches!(*w, "fc" | "cf" | "afc" | "sc" | "ac" | "club"))
        .map(|w| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_column_maps_fbref_codes() {
        assert_eq!(canonical_column("Squad"), Some("team"));
        assert_eq!(canonical_column("MP"), Some("matches_played"));
        assert_eq!(canonical_column("CrdY"), Some("yellow_cards"));
        assert_eq!(canonical_column("Last 5"), Some("form"));
        assert_eq!(canonical_column("Poss"), Some("possession"));
        assert_eq!(canonical_column("Attendance"), None);
    }

    #[test]
    fn canonical_column_fuzzy_matches_long_headers() {
        assert_eq!(canonical_column("Posession"), Some("possession"));
        assert_eq!(canonical_column("Corner Kick"), Some("corners"));
    }

    #[test]
    fn find_team_handles_suffixes_and_typos() {
        let teams = vec![
            TeamStats::default_for("Manchester City"),
            TeamStats::default_for("Manchester Utd"),
            TeamStats::default_for("Brighton"),
        ];
        assert_eq!(find_team(&teams, "Manchester City FC").unwrap().name, "Manchester City");
        assert_eq!(find_team(&teams, "Brigton").unwrap().name, "Brighton");
        assert!(find_team(&teams, "Real Madrid").is_none());
    }

    #[test]
    fn find_team_does_not_swap_clubs() {
        let teams = vec![
            TeamStats::default_for("Manchester City"),
            TeamStats::default_for("Arsenal"),
        ];
        assert!(find_team(&teams, "Manchester United").is_none());
        assert!(find_team(&teams, "Man Utd").is_none());

        let teams = vec![
            TeamStats::default_for("Sheffield Utd"),
            TeamStats::default_for("Sheffield Weds"),
        ];
        assert!(find_team(&teams, "Sheffield").is_none());
    }

    #[test]
    fn find_team_prefers_aliases_over_fuzzy() {
        let teams = vec![
            TeamStats::default_for("Manchester City"),
            TeamStats::default_for("Manchester Utd"),
        ];
        assert_eq!(find_team(&teams, "Manchester United").unwrap().name, "Manchester Utd");
        assert_eq!(find_team(&teams, "Man City").unwrap().name, "Manchester City");
    }
}
