use std::path::PathBuf;

use footy_value::odds_input::parse_odds_line;
use footy_value::opportunities::{compare_markets, find_opportunities};
use footy_value::pipeline::{FixtureSource, StatsSource};
use footy_value::probability::{MarketProbabilities, calculate_advanced_probabilities};
use footy_value::team_stats::TeamStats;

fn fixture_source() -> FixtureSource {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("match_fixture.json");
    FixtureSource::from_path(&path).expect("fixture should load")
}

fn fixture_probs(with_h2h: bool) -> (TeamStats, TeamStats, MarketProbabilities) {
    let source = fixture_source();
    let home = source.team_stats("Liverpool").unwrap().unwrap();
    let away = source.team_stats("Manchester Utd").unwrap().unwrap();
    let h2h = if with_h2h {
        source.head_to_head("Liverpool", "Manchester Utd").unwrap()
    } else {
        None
    };
    let probs = calculate_advanced_probabilities(&home, &away, h2h.as_ref());
    (home, away, probs)
}

fn assert_families_sum_to_100(p: &MarketProbabilities) {
    let ml = p.moneyline.home + p.moneyline.draw + p.moneyline.away;
    assert!((ml - 100.0).abs() < 0.01, "1X2 sums to {ml}");
    for l in p.goals.iter().chain(&p.corners).chain(&p.cards) {
        assert!((l.over + l.under - 100.0).abs() < 0.01, "line {} sums off", l.line);
        assert!((0.0..=100.0).contains(&l.over));
    }
    assert!((p.btts.yes + p.btts.no - 100.0).abs() < 0.01);
    let dc = p.double_chance.home_draw + p.double_chance.home_away + p.double_chance.draw_away;
    assert!((dc - 200.0).abs() < 0.01);
}

#[test]
fn every_family_sums_to_100() {
    let (_, _, with_h2h) = fixture_probs(true);
    assert_families_sum_to_100(&with_h2h);
    let (_, _, without) = fixture_probs(false);
    assert_families_sum_to_100(&without);

    let empty = calculate_advanced_probabilities(
        &TeamStats::default_for("A"),
        &TeamStats::default_for("B"),
        None,
    );
    assert_families_sum_to_100(&empty);
}

#[test]
fn league_leader_is_favoured_at_home() {
    let (_, _, p) = fixture_probs(true);
    assert!(p.moneyline.home > p.moneyline.away);
    assert!(p.moneyline.home > p.moneyline.draw);
    assert!(p.expected_goals_home > p.expected_goals_away);
    assert!(p.data_quality > 0.8);
}

#[test]
fn over_lines_decrease_with_the_line() {
    let (_, _, p) = fixture_probs(false);
    for pair in p.goals.windows(2) {
        assert!(pair[0].over >= pair[1].over);
    }
    for pair in p.corners.windows(2) {
        assert!(pair[0].over >= pair[1].over);
    }
}

#[test]
fn swapping_sides_mirrors_the_favourite() {
    let (home, away, p) = fixture_probs(false);
    let swapped = calculate_advanced_probabilities(&away, &home, None);
    assert!(swapped.moneyline.away > swapped.moneyline.home);
    assert!(p.moneyline.home > swapped.moneyline.home);
}

#[test]
fn value_detection_uses_edge_threshold() {
    let (home, away, p) = fixture_probs(true);
    let odds = parse_odds_line("1=2.60 X=3.60 2=6.50 O2.5=1.30 BTTS=1.90").odds;

    let compared = compare_markets(&p, &odds, &home.name, &away.name);
    assert_eq!(compared.len(), odds.len());

    let found = find_opportunities(&p, &odds, &home.name, &away.name, 5.0);
    for o in &found {
        assert!(o.edge >= 5.0);
        assert!((o.implied_probability - 100.0 / o.decimal_odds).abs() < 1e-9);
        assert!((o.expected_value - (o.real_probability / 100.0 * o.decimal_odds - 1.0)).abs() < 1e-9);
    }
    // A 38% implied home price against a clear favourite is value.
    assert!(found.iter().any(|o| o.label == "Liverpool win"));
    for pair in found.windows(2) {
        assert!(pair[0].edge >= pair[1].edge);
    }
}
