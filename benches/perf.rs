use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use footy_value::analysis_parser::parse_analysis_response;
use footy_value::fbref_parse::parse_team_stats;
use footy_value::odds_input::parse_odds_line;
use footy_value::opportunities::find_opportunities;
use footy_value::probability::calculate_advanced_probabilities;
use footy_value::team_stats::{H2HStats, TeamStats};

const REPLY: &str = include_str!("../tests/fixtures/llm_reply.md");
const FBREF_HTML: &str = include_str!("../tests/fixtures/fbref_squad_stats.html");

fn team(name: &str, wins: u32, draws: u32, losses: u32, gf: u32, ga: u32, form: &str) -> TeamStats {
    TeamStats {
        matches_played: wins + draws + losses,
        wins,
        draws,
        losses,
        goals_for: gf,
        goals_against: ga,
        xg: gf as f64 * 0.95,
        xga: ga as f64 * 1.05,
        possession: 54.0,
        yellow_cards: 38,
        red_cards: 2,
        corners_for: 110.0,
        corners_against: 90.0,
        form: form.to_string(),
        table_position: Some(4),
        league_size: Some(20),
        ..TeamStats::default_for(name)
    }
}

fn bench_probabilities(c: &mut Criterion) {
    let home = team("Home", 12, 4, 4, 38, 20, "WWDLW");
    let away = team("Away", 7, 6, 7, 27, 28, "LDWDL");
    let h2h = H2HStats {
        total_matches: 6,
        team1_wins: 3,
        team2_wins: 1,
        draws: 2,
        avg_goals: 2.8,
        avg_cards: 4.1,
        avg_corners: 10.2,
        ..H2HStats::empty("Home", "Away")
    };
    c.bench_function("calculate_advanced_probabilities", |b| {
        b.iter(|| calculate_advanced_probabilities(black_box(&home), black_box(&away), Some(&h2h)))
    });

    let probs = calculate_advanced_probabilities(&home, &away, Some(&h2h));
    let odds = parse_odds_line("1=2.10 X=3.40 2=3.60 1X=1.30 O2.5=1.90 U2.5=1.95 BTTS=1.80 CO9.5=1.85 KO4.5=1.90").odds;
    c.bench_function("find_opportunities", |b| {
        b.iter(|| find_opportunities(black_box(&probs), black_box(&odds), "Home", "Away", 5.0))
    });
}

fn bench_parsers(c: &mut Criterion) {
    c.bench_function("parse_analysis_response", |b| {
        b.iter(|| parse_analysis_response(black_box(REPLY)))
    });
    c.bench_function("parse_team_stats_fbref", |b| {
        b.iter(|| parse_team_stats(black_box(FBREF_HTML)))
    });
    c.bench_function("parse_odds_line", |b| {
        b.iter(|| parse_odds_line(black_box("1=2.10, X:3.40; 2=3.60 o2.5=1.90 btts=1.80")))
    });
}

criterion_group!(benches, bench_probabilities, bench_parsers);
criterion_main!(benches);
