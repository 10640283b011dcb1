use std::fmt::Write as _;

use crate::odds_input::MarketOdds;
use crate::opportunities::{OpportunityRecord, implied_probability};
use crate::probability::{LineProbability, MarketProbabilities};
use crate::team_stats::{H2HStats, TeamStats, prompt_fields};

pub const SYSTEM_PROMPT: &str = "You are a professional football betting analyst. You compare \
model probabilities with bookmaker odds, point out value bets with concrete statistical reasons, \
and never invent statistics that are not in the data you are given. Follow the requested output \
format exactly.";

/// Output-format block shared by both prompt styles; `analysis_parser` reads this shape back.
pub const OUTPUT_FORMAT_INSTRUCTIONS: &str = "## OUTPUT FORMAT
Respond in markdown using exactly this structure:

# <Home team> vs <Away team>: value analysis

## Value opportunities
| Market | Odds | Real probability | Implied probability | Edge | Justification |
|---|---|---|---|---|---|
| <market> | <decimal odds> | <xx.x%> | <xx.x%> | <+x.x> | <one sentence> |

## Probability comparison
- <market>: real <xx.x%> vs implied <xx.x%>

## Confidence
Confidence level: <High|Medium|Low> - <one sentence explaining why>

Rules:
- Only list markets from the BOOKMAKER ODDS section.
- Write \"No value opportunities\" under the table header if none qualify.
- Keep percentages with one decimal.";

pub struct PromptContext<'a> {
    pub league: &'a str,
    pub home: &'a TeamStats,
    pub away: &'a TeamStats,
    pub h2h: Option<&'a H2HStats>,
    pub probs: &'a MarketProbabilities,
    pub odds: &'a [MarketOdds],
    pub opportunities: &'a [OpportunityRecord],
}

/// Compact prompt: one block per section, numbers only.
pub fn format_highly_optimized_prompt(ctx: &PromptContext) -> String {
    let mut out = String::with_capacity(4096);
    let (home, away, probs) = (ctx.home, ctx.away, ctx.probs);

    let _ = writeln!(out, "# MATCH");
    let _ = writeln!(out, "{} (home) vs {} (away)", home.name, away.name);
    if !ctx.league.trim().is_empty() {
        let _ = writeln!(out, "League: {}", ctx.league.trim());
    }
    out.push('\n');

    let _ = writeln!(out, "# TEAM STATS");
    for team in [home, away] {
        let fields = prompt_fields(team)
            .into_iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = writeln!(out, "- {}: {}", team.name, fields);
    }
    out.push('\n');

    write_h2h(&mut out, ctx.h2h);

    let _ = writeln!(out, "# MODEL PROBABILITIES");
    let _ = writeln!(
        out,
        "1X2: {:.1}% / {:.1}% / {:.1}%",
        probs.moneyline.home, probs.moneyline.draw, probs.moneyline.away
    );
    let _ = writeln!(
        out,
        "Double chance: 1X {:.1}% | 12 {:.1}% | X2 {:.1}%",
        probs.double_chance.home_draw, probs.double_chance.home_away, probs.double_chance.draw_away
    );
    let _ = writeln!(out, "Goals over: {}", compact_lines(&probs.goals));
    let _ = writeln!(out, "BTTS yes: {:.1}%", probs.btts.yes);
    let _ = writeln!(out, "Corners over: {}", compact_lines(&probs.corners));
    let _ = writeln!(out, "Cards over: {}", compact_lines(&probs.cards));
    let _ = writeln!(
        out,
        "Expected: goals {:.2}-{:.2}, corners {:.1}, cards {:.1}; data quality {:.2}",
        probs.expected_goals_home,
        probs.expected_goals_away,
        probs.expected_corners,
        probs.expected_cards,
        probs.data_quality
    );
    out.push('\n');

    write_odds(&mut out, ctx);
    write_detected_value(&mut out, ctx.opportunities);

    out.push_str(OUTPUT_FORMAT_INSTRUCTIONS);
    out.push('\n');
    out
}

/// Verbose prompt with narrative team sections and full line ladders.
pub fn format_enhanced_prompt(ctx: &PromptContext) -> String {
    let mut out = String::with_capacity(8192);
    let (home, away, probs) = (ctx.home, ctx.away, ctx.probs);

    let _ = writeln!(out, "# MATCH");
    let _ = writeln!(
        out,
        "Analyse the fixture {} (home) against {} (away){}.",
        home.name,
        away.name,
        if ctx.league.trim().is_empty() {
            String::new()
        } else {
            format!(" in {}", ctx.league.trim())
        }
    );
    out.push('\n');

    let _ = writeln!(out, "# TEAM STATS");
    for (role, team) in [("Home", home), ("Away", away)] {
        let _ = writeln!(out, "## {} ({role})", team.name);
        for (label, value) in prompt_fields(team) {
            let _ = writeln!(out, "- {label}: {value}");
        }
        let _ = writeln!(
            out,
            "- Points per game: {:.2}; form score {}/15",
            team.points_per_game(),
            team.form_points()
        );
        out.push('\n');
    }

    write_h2h(&mut out, ctx.h2h);

    let _ = writeln!(out, "# MODEL PROBABILITIES");
    let _ = writeln!(out, "## Match result");
    let _ = writeln!(out, "- {} win: {:.1}%", home.name, probs.moneyline.home);
    let _ = writeln!(out, "- Draw: {:.1}%", probs.moneyline.draw);
    let _ = writeln!(out, "- {} win: {:.1}%", away.name, probs.moneyline.away);
    let _ = writeln!(out, "## Double chance");
    let _ = writeln!(out, "- 1X: {:.1}%", probs.double_chance.home_draw);
    let _ = writeln!(out, "- 12: {:.1}%", probs.double_chance.home_away);
    let _ = writeln!(out, "- X2: {:.1}%", probs.double_chance.draw_away);
    write_ladder(&mut out, "Goals", &probs.goals);
    let _ = writeln!(out, "## Both teams to score");
    let _ = writeln!(out, "- Yes: {:.1}% / No: {:.1}%", probs.btts.yes, probs.btts.no);
    write_ladder(&mut out, "Corners", &probs.corners);
    write_ladder(&mut out, "Cards", &probs.cards);
    let _ = writeln!(out, "## Model inputs");
    let _ = writeln!(
        out,
        "- Strength: {} {:.3} (form {:.2}, stats {:.2}, table {:.2}, creation {:.2})",
        home.name,
        probs.home_strength.total,
        probs.home_strength.form,
        probs.home_strength.stats,
        probs.home_strength.position,
        probs.home_strength.creation
    );
    let _ = writeln!(
        out,
        "- Strength: {} {:.3} (form {:.2}, stats {:.2}, table {:.2}, creation {:.2})",
        away.name,
        probs.away_strength.total,
        probs.away_strength.form,
        probs.away_strength.stats,
        probs.away_strength.position,
        probs.away_strength.creation
    );
    let _ = writeln!(
        out,
        "- Expected goals {:.2} - {:.2}, corners {:.1}, cards {:.1}",
        probs.expected_goals_home, probs.expected_goals_away, probs.expected_corners, probs.expected_cards
    );
    let _ = writeln!(
        out,
        "- Data quality {:.2} (1.00 = complete data; lower values were blended toward market averages)",
        probs.data_quality
    );
    out.push('\n');

    write_odds(&mut out, ctx);
    write_detected_value(&mut out, ctx.opportunities);

    out.push_str(OUTPUT_FORMAT_INSTRUCTIONS);
    out.push('\n');
    out
}

fn write_h2h(out: &mut String, h2h: Option<&H2HStats>) {
    let _ = writeln!(out, "# HEAD TO HEAD");
    match h2h.filter(|h| h.total_matches > 0) {
        Some(h) => {
            let _ = writeln!(
                out,
                "{} meetings: {} {} wins, {} draws, {} {} wins; avg goals {:.2}",
                h.total_matches, h.team1, h.team1_wins, h.draws, h.team2, h.team2_wins, h.avg_goals
            );
            if h.avg_cards > 0.0 || h.avg_corners > 0.0 {
                let _ = writeln!(
                    out,
                    "avg cards {:.1}, avg corners {:.1}",
                    h.avg_cards, h.avg_corners
                );
            }
        }
        None => {
            let _ = writeln!(out, "No head-to-head data.");
        }
    }
    out.push('\n');
}

fn write_odds(out: &mut String, ctx: &PromptContext) {
    let _ = writeln!(out, "# BOOKMAKER ODDS");
    if ctx.odds.is_empty() {
        let _ = writeln!(out, "No odds supplied.");
    }
    for o in ctx.odds {
        let implied = implied_probability(o.decimal).unwrap_or(0.0);
        let _ = writeln!(
            out,
            "- {}: {:.2} (implied {:.1}%)",
            o.market.label(&ctx.home.name, &ctx.away.name),
            o.decimal,
            implied
        );
    }
    out.push('\n');
}

fn write_detected_value(out: &mut String, opportunities: &[OpportunityRecord]) {
    let _ = writeln!(out, "# DETECTED VALUE");
    if opportunities.is_empty() {
        let _ = writeln!(out, "None above threshold.");
    }
    for o in opportunities {
        let _ = writeln!(
            out,
            "- {} @ {:.2}: real {:.1}% vs implied {:.1}% (edge {:+.1}, EV {:+.2})",
            o.label, o.decimal_odds, o.real_probability, o.implied_probability, o.edge, o.expected_value
        );
    }
    out.push('\n');
}

fn compact_lines(lines: &[LineProbability]) -> String {
    lines
        .iter()
        .map(|l| format!("{} {:.1}%", l.line, l.over))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn write_ladder(out: &mut String, title: &str, lines: &[LineProbability]) {
    let _ = writeln!(out, "## {title}");
    for l in lines {
        let _ = writeln!(out, "- Over {}: {:.1}% / Under {}: {:.1}%", l.line, l.over, l.line, l.under);
    }
}
