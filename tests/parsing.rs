use std::fs;
use std::path::PathBuf;

use footy_value::fbref_parse::{find_team, parse_team_stats};
use footy_value::footystats::parse_league_teams;
use footy_value::odds_input::{Line, Market, parse_odds_line};
use footy_value::pipeline::{FixtureSource, StatsSource};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file should be readable")
}

#[test]
fn parses_fbref_squad_tables() {
    let html = read_fixture("fbref_squad_stats.html");
    let teams = parse_team_stats(&html).expect("fixture should parse");
    assert_eq!(teams.len(), 3);

    let liverpool = find_team(&teams, "Liverpool FC").expect("liverpool present");
    assert_eq!(liverpool.matches_played, 20);
    assert_eq!(liverpool.wins, 14);
    assert_eq!(liverpool.goals_for, 47);
    assert!((liverpool.xg - 42.1).abs() < 1e-9);
    assert_eq!(liverpool.form, "WWDWW");
    assert_eq!(liverpool.table_position, Some(1));
}

#[test]
fn fbref_reads_commented_and_against_tables() {
    let html = read_fixture("fbref_squad_stats.html");
    let teams = parse_team_stats(&html).expect("fixture should parse");
    let utd = find_team(&teams, "Manchester Utd").expect("manchester utd present");
    assert!((utd.possession - 50.7).abs() < 1e-9);
    assert_eq!(utd.yellow_cards, 45);
    assert_eq!(utd.red_cards, 2);
    assert!((utd.corners_for - 98.0).abs() < 1e-9);
    assert!((utd.corners_against - 118.0).abs() < 1e-9);
}

#[test]
fn fbref_ignores_home_away_split() {
    let html = read_fixture("fbref_squad_stats.html");
    let teams = parse_team_stats(&html).expect("fixture should parse");
    let liverpool = find_team(&teams, "Liverpool").expect("liverpool present");
    // The venue split lists 10 home games with 9 wins.
    assert_eq!(liverpool.wins, 14);
    assert_eq!(liverpool.matches_played, 20);
}

#[test]
fn page_without_tables_is_empty() {
    let teams = parse_team_stats("<html><body><p>Rate limited</p></body></html>").unwrap();
    assert!(teams.is_empty());
}

#[test]
fn parses_footystats_league_teams() {
    let raw: serde_json::Value =
        serde_json::from_str(&read_fixture("footystats_league_teams.json")).unwrap();
    let teams = parse_league_teams(&raw);
    assert_eq!(teams.len(), 2);

    let arsenal = &teams[0];
    assert_eq!(arsenal.name, "Arsenal");
    assert_eq!(arsenal.matches_played, 20);
    assert!((arsenal.xg - 35.8).abs() < 1e-6);
    assert!((arsenal.corners_for - 121.0).abs() < 1e-6);
    assert_eq!(arsenal.recent_form(), "WDDWW");
    assert_eq!(arsenal.table_position, Some(2));
    assert_eq!(arsenal.league_size, Some(2));
}

#[test]
fn footystats_without_data_is_empty() {
    let teams = parse_league_teams(&serde_json::json!({ "success": true }));
    assert!(teams.is_empty());
}

#[test]
fn fixture_source_flips_head_to_head() {
    let source = FixtureSource::from_path(&fixture_path("match_fixture.json")).unwrap();
    let h2h = source
        .head_to_head("Liverpool", "Manchester Utd")
        .unwrap()
        .expect("h2h present");
    assert_eq!(h2h.team1, "Liverpool");
    assert_eq!(h2h.team1_wins, 3);
    assert_eq!(h2h.team2_wins, 1);
    assert_eq!(h2h.draws, 2);

    let unknown = source.team_stats("Real Madrid").unwrap();
    assert!(unknown.is_none());
}

#[test]
fn odds_line_accepts_mixed_separators() {
    let parsed = parse_odds_line("1=1.70; X:3.90, 2=4.80 O2.5=1.80 BTTS=1.75 CO9.5=1.90 bogus Z=2");
    assert_eq!(parsed.odds.len(), 6);
    assert_eq!(parsed.warnings.len(), 2);
    let line = Line::from_f64(2.5).unwrap();
    assert!(
        parsed
            .odds
            .iter()
            .any(|o| o.market == Market::GoalsOver(line) && (o.decimal - 1.80).abs() < 1e-9)
    );
}

#[test]
fn odds_outside_model_ladders_warn() {
    let parsed = parse_odds_line("1=2.0 O5.5=6.0 CO13.5=3.0 KO8.5=4.0");
    assert_eq!(parsed.odds.len(), 1);
    assert_eq!(parsed.warnings.len(), 3);
}

#[test]
fn fbref_lookup_rejects_a_different_club() {
    let html = read_fixture("fbref_squad_stats.html");
    let teams = parse_team_stats(&html).expect("fixture should parse");
    assert!(find_team(&teams, "Manchester City").is_none());
    assert_eq!(
        find_team(&teams, "Manchester United").map(|t| t.name.as_str()),
        Some("Manchester Utd")
    );
}
