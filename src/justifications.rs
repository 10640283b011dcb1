use crate::odds_input::Market;
use crate::opportunities::OpportunityRecord;
use crate::probability::MarketProbabilities;
use crate::team_stats::{H2HStats, TeamStats};

/// Stats a justification can quote.
pub struct JustificationContext<'a> {
    pub home: &'a TeamStats,
    pub away: &'a TeamStats,
    pub h2h: Option<&'a H2HStats>,
    pub probs: &'a MarketProbabilities,
}

/// Fills `justification` on every record.
pub fn attach_justifications(records: &mut [OpportunityRecord], ctx: &JustificationContext) {
    for record in records.iter_mut() {
        record.justification = Some(justify(record, ctx));
    }
}

pub fn justify(record: &OpportunityRecord, ctx: &JustificationContext) -> String {
    let mut reasons: Vec<String> = Vec::new();
    let (home, away, probs) = (ctx.home, ctx.away, ctx.probs);

    match record.market {
        Market::Home | Market::HomeOrDraw => {
            reasons.push(form_reason(home));
            reasons.push(xg_reason(home));
            if away.has_matches() {
                reasons.push(format!(
                    "{} concede {:.2} per game",
                    away.name,
                    away.goals_against_pg()
                ));
            }
        }
        Market::Away | Market::DrawOrAway => {
            reasons.push(form_reason(away));
            reasons.push(xg_reason(away));
            if home.has_matches() {
                reasons.push(format!(
                    "{} concede {:.2} per game",
                    home.name,
                    home.goals_against_pg()
                ));
            }
        }
        Market::Draw => {
            let gap = (probs.home_strength.total - probs.away_strength.total).abs();
            reasons.push(format!(
                "strength ratings are close ({:.2} vs {:.2}, gap {:.2})",
                probs.home_strength.total, probs.away_strength.total, gap
            ));
        }
        Market::HomeOrAway => {
            reasons.push(format!(
                "a draw is rated only {:.1}%",
                probs.moneyline.draw
            ));
        }
        Market::GoalsOver(line) | Market::GoalsUnder(line) => {
            reasons.push(format!(
                "model expects {:.2} total goals against a {line} line ({:.2} + {:.2})",
                probs.expected_goals_total(),
                probs.expected_goals_home,
                probs.expected_goals_away
            ));
            let over_rate = over25_rate(home, away);
            if let Some(rate) = over_rate {
                reasons.push(format!("{rate:.0}% of their matches went over 2.5"));
            }
        }
        Market::BttsYes | Market::BttsNo => {
            reasons.push(format!(
                "expected goals {:.2} for {} and {:.2} for {}",
                probs.expected_goals_home, home.name, probs.expected_goals_away, away.name
            ));
            if home.has_matches() && away.has_matches() {
                reasons.push(format!(
                    "clean sheets: {} {}, {} {}",
                    home.name, home.clean_sheets, away.name, away.clean_sheets
                ));
            }
        }
        Market::CornersOver(line) | Market::CornersUnder(line) => {
            reasons.push(format!(
                "expected corners {:.1} against a {line} line",
                probs.expected_corners
            ));
            reasons.push(format!(
                "possession {:.0}% vs {:.0}%",
                home.possession, away.possession
            ));
        }
        Market::CardsOver(line) | Market::CardsUnder(line) => {
            reasons.push(format!(
                "expected cards {:.1} against a {line} line ({:.2} + {:.2} per game)",
                probs.expected_cards,
                home.cards_pg(),
                away.cards_pg()
            ));
        }
    }

    if let Some(h2h) = ctx.h2h.filter(|h| h.total_matches > 0) {
        reasons.push(format!(
            "head to head {}-{}-{} over {} meetings",
            h2h.team1_wins, h2h.draws, h2h.team2_wins, h2h.total_matches
        ));
    }

    reasons.retain(|r| !r.is_empty());
    let body = if reasons.is_empty() {
        String::new()
    } else {
        format!(": {}", reasons.join("; "))
    };
    format!(
        "{} rated {:.1}% vs {:.1}% implied (+{:.1} pts){}",
        record.label, record.real_probability, record.implied_probability, record.edge, body
    )
}

fn form_reason(team: &TeamStats) -> String {
    let form = team.recent_form();
    if form.is_empty() {
        return String::new();
    }
    format!(
        "{} took {} of the last {} points ({})",
        team.name,
        team.form_points(),
        form.len() * 3,
        form
    )
}

fn xg_reason(team: &TeamStats) -> String {
    if !team.has_matches() || team.xg <= 0.0 {
        return String::new();
    }
    format!("{} create {:.2} xG per game", team.name, team.xg_pg())
}

fn over25_rate(home: &TeamStats, away: &TeamStats) -> Option<f64> {
    let games = home.matches_played + away.matches_played;
    let overs = home.over_2_5_matches + away.over_2_5_matches;
    if games == 0 || overs == 0 {
        return None;
    }
    Some(overs as f64 / games as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::calculate_advanced_probabilities;

    #[test]
    fn home_justification_quotes_form() {
        let mut home = TeamStats::default_for("Home FC");
        home.matches_played = 10;
        home.form = "WWDWW".to_string();
        home.xg = 18.0;
        let away = TeamStats::default_for("Away FC");
        let probs = calculate_advanced_probabilities(&home, &away, None);
        let record = OpportunityRecord {
            market: Market::Home,
            label: "Home FC win".to_string(),
            decimal_odds: 2.5,
            real_probability: 52.0,
            implied_probability: 40.0,
            edge: 12.0,
            expected_value: 0.3,
            justification: None,
        };
        let ctx = JustificationContext {
            home: &home,
            away: &away,
            h2h: None,
            probs: &probs,
        };
        let text = justify(&record, &ctx);
        assert!(text.starts_with("Home FC win rated 52.0%"));
        assert!(text.contains("13 of the last 15 points"));
        assert!(text.contains("1.80 xG per game"));
    }
}
