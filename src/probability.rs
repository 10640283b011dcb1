use serde::{Deserialize, Serialize};

use crate::odds_input::{Line, Market};
use crate::team_stats::{H2HStats, TeamStats};

// Per team, per game.
pub const LEAGUE_AVG_GOALS: f64 = 1.35;
pub const LEAGUE_AVG_CORNERS: f64 = 5.0;
pub const LEAGUE_AVG_CARDS: f64 = 2.1;

pub const HOME_ADVANTAGE_PP: f64 = 5.0;
const HOME_GOALS_FACTOR: f64 = 1.05;
const AWAY_GOALS_FACTOR: f64 = 0.97;
const MONEYLINE_FLOOR: f64 = 5.0;
const MONEYLINE_CAP: f64 = 85.0;
const MIN_H2H_MATCHES: u32 = 3;
const MAX_GOALS: u32 = 10;
const MAX_CARDS: u32 = 20;

pub const GOAL_LINES: [u16; 5] = [5, 15, 25, 35, 45];
pub const CORNER_LINES: [u16; 5] = [75, 85, 95, 105, 115];
pub const CARD_LINES: [u16; 5] = [25, 35, 45, 55, 65];

// Typical bookmaker-market frequencies the model falls back on with thin data.
const MARKET_AVG_MONEYLINE: (f64, f64, f64) = (45.0, 27.0, 28.0);
const MARKET_AVG_BTTS_YES: f64 = 52.0;
const MARKET_AVG_GOALS_OVER: [f64; 5] = [92.0, 75.0, 52.0, 30.0, 15.0];
const MARKET_AVG_CORNERS_OVER: [f64; 5] = [72.0, 61.0, 50.0, 39.0, 29.0];
const MARKET_AVG_CARDS_OVER: [f64; 5] = [72.0, 57.0, 45.0, 30.0, 18.0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthWeights {
    pub form: f64,
    pub stats: f64,
    pub position: f64,
    pub creation: f64,
    pub h2h: f64,
}

impl Default for StrengthWeights {
    fn default() -> Self {
        Self {
            form: 0.30,
            stats: 0.30,
            position: 0.20,
            creation: 0.20,
            h2h: 0.0,
        }
    }
}

impl StrengthWeights {
    /// Makes room for a 10% head-to-head component.
    pub fn with_h2h(self) -> Self {
        Self {
            form: self.form * 0.9,
            stats: self.stats * 0.9,
            position: self.position * 0.9,
            creation: self.creation * 0.9,
            h2h: 0.10,
        }
    }
}

/// Component scores in 0..=1 and their weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Strength {
    pub form: f64,
    pub stats: f64,
    pub position: f64,
    pub creation: f64,
    pub h2h: Option<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moneyline {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoubleChance {
    pub home_draw: f64,
    pub home_away: f64,
    pub draw_away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineProbability {
    pub line: Line,
    pub over: f64,
    pub under: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Btts {
    pub yes: f64,
    pub no: f64,
}

/// Model output for one fixture. All probabilities are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProbabilities {
    pub moneyline: Moneyline,
    pub double_chance: DoubleChance,
    pub goals: Vec<LineProbability>,
    pub btts: Btts,
    pub corners: Vec<LineProbability>,
    pub cards: Vec<LineProbability>,
    pub expected_goals_home: f64,
    pub expected_goals_away: f64,
    pub expected_corners: f64,
    pub expected_cards: f64,
    pub data_quality: f64,
    pub home_strength: Strength,
    pub away_strength: Strength,
}

impl MarketProbabilities {
    pub fn expected_goals_total(&self) -> f64 {
        self.expected_goals_home + self.expected_goals_away
    }

    pub fn probability(&self, market: Market) -> Option<f64> {
        let find = |lines: &[LineProbability], line: Line| lines.iter().find(|l| l.line == line).copied();
        match market {
            Market::Home => Some(self.moneyline.home),
            Market::Draw => Some(self.moneyline.draw),
            Market::Away => Some(self.moneyline.away),
            Market::HomeOrDraw => Some(self.double_chance.home_draw),
            Market::HomeOrAway => Some(self.double_chance.home_away),
            Market::DrawOrAway => Some(self.double_chance.draw_away),
            Market::GoalsOver(l) => find(&self.goals, l).map(|p| p.over),
            Market::GoalsUnder(l) => find(&self.goals, l).map(|p| p.under),
            Market::BttsYes => Some(self.btts.yes),
            Market::BttsNo => Some(self.btts.no),
            Market::CornersOver(l) => find(&self.corners, l).map(|p| p.over),
            Market::CornersUnder(l) => find(&self.corners, l).map(|p| p.under),
            Market::CardsOver(l) => find(&self.cards, l).map(|p| p.over),
            Market::CardsUnder(l) => find(&self.cards, l).map(|p| p.under),
        }
    }
}

/// Runs the full model for `home` vs `away`.
pub fn calculate_advanced_probabilities(
    home: &TeamStats,
    away: &TeamStats,
    h2h: Option<&H2HStats>,
) -> MarketProbabilities {
    let h2h = h2h.filter(|h| h.total_matches >= MIN_H2H_MATCHES);
    let weights = if h2h.is_some() {
        StrengthWeights::default().with_h2h()
    } else {
        StrengthWeights::default()
    };

    let h2h_home = h2h.map(|h| h2h_share(h, true));
    let h2h_away = h2h.map(|h| h2h_share(h, false));
    let home_strength = team_strength(home, h2h_home, weights);
    let away_strength = team_strength(away, h2h_away, weights);

    let quality = data_quality(home, away);
    let share = strength_share(home_strength.total, away_strength.total);

    let raw_ml = moneyline_from_share(share);
    let moneyline = blend_moneyline(raw_ml, quality);
    let double_chance = DoubleChance {
        home_draw: moneyline.home + moneyline.draw,
        home_away: moneyline.home + moneyline.away,
        draw_away: moneyline.draw + moneyline.away,
    };

    let (lambda_home, lambda_away) = expected_goals(home, away);
    let mut lambda_total = lambda_home + lambda_away;
    if let Some(h) = h2h
        && h.avg_goals > 0.0
    {
        lambda_total = 0.8 * lambda_total + 0.2 * h.avg_goals;
    }

    let goals = GOAL_LINES
        .iter()
        .zip(MARKET_AVG_GOALS_OVER)
        .map(|(tenths, avg)| {
            let line = Line(*tenths);
            let over = 100.0 * (1.0 - poisson_cdf(lambda_total, line.value().floor() as u32));
            line_probability(line, blend(over, avg, quality))
        })
        .collect();

    let btts_yes = 100.0 * (1.0 - (-lambda_home).exp()) * (1.0 - (-lambda_away).exp());
    let btts_yes = clamp(blend(btts_yes, MARKET_AVG_BTTS_YES, quality), 0.0, 100.0);
    let btts = Btts {
        yes: btts_yes,
        no: 100.0 - btts_yes,
    };

    let expected_corners = expected_corners(home, away, h2h);
    let sigma = expected_corners.sqrt() * 1.1;
    let corners = CORNER_LINES
        .iter()
        .zip(MARKET_AVG_CORNERS_OVER)
        .map(|(tenths, avg)| {
            let line = Line(*tenths);
            let over = 100.0 * (1.0 - normal_cdf((line.value() - expected_corners) / sigma));
            line_probability(line, blend(over, avg, quality))
        })
        .collect();

    let expected_cards = expected_cards(home, away, h2h, share);
    let cards = CARD_LINES
        .iter()
        .zip(MARKET_AVG_CARDS_OVER)
        .map(|(tenths, avg)| {
            let line = Line(*tenths);
            let over = 100.0 * (1.0 - poisson_cdf_capped(expected_cards, line.value().floor() as u32, MAX_CARDS));
            line_probability(line, blend(over, avg, quality))
        })
        .collect();

    MarketProbabilities {
        moneyline,
        double_chance,
        goals,
        btts,
        corners,
        cards,
        expected_goals_home: lambda_home,
        expected_goals_away: lambda_away,
        expected_corners,
        expected_cards,
        data_quality: quality,
        home_strength,
        away_strength,
    }
}

pub fn team_strength(stats: &TeamStats, h2h: Option<f64>, weights: StrengthWeights) -> Strength {
    let form = form_score(stats);
    let stats_score = attack_defence_score(stats);
    let position = position_score(stats);
    let creation = creation_score(stats);

    let mut total = weights.form * form
        + weights.stats * stats_score
        + weights.position * position
        + weights.creation * creation;
    match h2h {
        Some(h) if weights.h2h > 0.0 => total += weights.h2h * h,
        // Keep totals on the same scale when h2h was weighted but is missing.
        _ => total /= (weights.form + weights.stats + weights.position + weights.creation).max(1e-9),
    }

    Strength {
        form,
        stats: stats_score,
        position,
        creation,
        h2h,
        total: clamp(total, 0.0, 1.0),
    }
}

fn form_score(stats: &TeamStats) -> f64 {
    let recent = stats.recent_form();
    if !recent.is_empty() {
        return stats.form_points() as f64 / (3.0 * recent.len() as f64);
    }
    if stats.has_matches() {
        return clamp(stats.points_per_game() / 3.0, 0.0, 1.0);
    }
    0.5
}

fn attack_defence_score(stats: &TeamStats) -> f64 {
    let attack = attack_rate(stats) / LEAGUE_AVG_GOALS;
    let defence = LEAGUE_AVG_GOALS / defence_rate(stats).max(0.2);
    let ratio = attack * defence;
    ratio / (1.0 + ratio)
}

fn position_score(stats: &TeamStats) -> f64 {
    if let (Some(pos), Some(size)) = (stats.table_position, stats.league_size)
        && size > 1
    {
        return clamp(1.0 - (pos.saturating_sub(1)) as f64 / (size - 1) as f64, 0.0, 1.0);
    }
    if stats.has_matches() {
        return clamp(stats.points_per_game() / 3.0, 0.0, 1.0);
    }
    0.5
}

fn creation_score(stats: &TeamStats) -> f64 {
    let created = attack_rate(stats);
    created / (created + LEAGUE_AVG_GOALS)
}

// xG per game, then goals per game, then the league average.
fn attack_rate(stats: &TeamStats) -> f64 {
    if stats.xg > 0.0 && stats.has_matches() {
        stats.xg_pg()
    } else if stats.has_matches() {
        stats.goals_for_pg()
    } else {
        LEAGUE_AVG_GOALS
    }
}

fn defence_rate(stats: &TeamStats) -> f64 {
    if stats.xga > 0.0 && stats.has_matches() {
        stats.xga_pg()
    } else if stats.has_matches() {
        stats.goals_against_pg()
    } else {
        LEAGUE_AVG_GOALS
    }
}

fn h2h_share(h2h: &H2HStats, for_team1: bool) -> f64 {
    if h2h.total_matches == 0 {
        return 0.5;
    }
    let wins = if for_team1 { h2h.team1_wins } else { h2h.team2_wins };
    (wins as f64 + 0.5 * h2h.draws as f64) / h2h.total_matches as f64
}

fn strength_share(home: f64, away: f64) -> f64 {
    let sum = home + away;
    if sum <= 1e-9 { 0.5 } else { home / sum }
}

/// Baseline 1X2 split from the home share of combined strength, plus home advantage.
pub fn moneyline_from_share(share: f64) -> Moneyline {
    let share = clamp(share, 0.0, 1.0);
    let gap = (share - 0.5).abs() * 2.0;
    let draw = clamp(28.0 - 20.0 * gap, 12.0, 30.0);
    let rest = 100.0 - draw;

    let mut home = rest * share + HOME_ADVANTAGE_PP;
    let mut away = rest * (1.0 - share) - HOME_ADVANTAGE_PP;
    home = clamp(home, MONEYLINE_FLOOR, MONEYLINE_CAP);
    away = clamp(away, MONEYLINE_FLOOR, MONEYLINE_CAP);
    normalize_moneyline(home, draw, away)
}

fn blend_moneyline(ml: Moneyline, quality: f64) -> Moneyline {
    let (h, d, a) = MARKET_AVG_MONEYLINE;
    normalize_moneyline(
        blend(ml.home, h, quality),
        blend(ml.draw, d, quality),
        blend(ml.away, a, quality),
    )
}

/// Scales to exactly 100, leaving any rounding residue in the draw.
pub fn normalize_moneyline(home: f64, draw: f64, away: f64) -> Moneyline {
    let sum = (home + draw + away).max(1e-9);
    let home = home / sum * 100.0;
    let away = away / sum * 100.0;
    Moneyline {
        home,
        draw: 100.0 - home - away,
        away,
    }
}

/// Expected goals per side: own attack against the opponent's defence,
/// nudged by possession share and venue.
pub fn expected_goals(home: &TeamStats, away: &TeamStats) -> (f64, f64) {
    let poss_diff = home.possession - away.possession;
    let poss_home = 1.0 + poss_diff / 200.0;
    let poss_away = 1.0 - poss_diff / 200.0;

    let lambda_home = (attack_rate(home) + defence_rate(away)) / 2.0 * poss_home * HOME_GOALS_FACTOR;
    let lambda_away = (attack_rate(away) + defence_rate(home)) / 2.0 * poss_away * AWAY_GOALS_FACTOR;
    (clamp(lambda_home, 0.20, 3.80), clamp(lambda_away, 0.20, 3.80))
}

fn expected_corners(home: &TeamStats, away: &TeamStats, h2h: Option<&H2HStats>) -> f64 {
    let per_game = |v: f64, stats: &TeamStats| {
        if v > 0.0 && stats.has_matches() { v } else { LEAGUE_AVG_CORNERS }
    };
    let home_for = per_game(home.corners_for_pg(), home);
    let home_against = per_game(home.corners_against_pg(), home);
    let away_for = per_game(away.corners_for_pg(), away);
    let away_against = per_game(away.corners_against_pg(), away);

    let base = (home_for + away_against) / 2.0 + (away_for + home_against) / 2.0;
    // Lopsided possession tends to pin one side back and produce more corners.
    let dominance = 1.0 + (home.possession - away.possession).abs() / 100.0 * 0.5;
    let mut mu = base * dominance;
    if let Some(h) = h2h
        && h.avg_corners > 0.0
    {
        mu = 0.8 * mu + 0.2 * h.avg_corners;
    }
    clamp(mu, 4.0, 18.0)
}

fn expected_cards(home: &TeamStats, away: &TeamStats, h2h: Option<&H2HStats>, share: f64) -> f64 {
    let per_game = |stats: &TeamStats| {
        let v = stats.cards_pg();
        if v > 0.0 && stats.has_matches() { v } else { LEAGUE_AVG_CARDS }
    };
    let mut mu = per_game(home) + per_game(away);
    if let Some(h) = h2h
        && h.avg_cards > 0.0
    {
        mu = 0.7 * mu + 0.3 * h.avg_cards;
    }
    // Evenly matched games are more contested.
    if (share - 0.5).abs() < 0.1 {
        mu *= 1.08;
    }
    clamp(mu, 1.0, 12.0)
}

/// Blends toward `market_avg` as data quality drops.
fn blend(model: f64, market_avg: f64, quality: f64) -> f64 {
    quality * model + (1.0 - quality) * market_avg
}

fn line_probability(line: Line, over: f64) -> LineProbability {
    let over = clamp(over, 0.0, 100.0);
    LineProbability {
        line,
        over,
        under: 100.0 - over,
    }
}

/// 0.6 for no usable data, 1.0 for complete stats over a decent sample.
pub fn data_quality(home: &TeamStats, away: &TeamStats) -> f64 {
    let coverage = (home.coverage() + away.coverage()) / 2.0;
    let sample = (home.matches_played.min(away.matches_played) as f64 / 10.0).min(1.0);
    clamp(0.6 + 0.4 * coverage * sample, 0.6, 1.0)
}

/// P(X <= k) for X ~ Poisson(lambda).
pub fn poisson_cdf(lambda: f64, k: u32) -> f64 {
    poisson_cdf_capped(lambda, k, MAX_GOALS.max(k))
}

fn poisson_cdf_capped(lambda: f64, k: u32, max_k: u32) -> f64 {
    let pmf = poisson_pmf(lambda, max_k.max(k));
    clamp(pmf.iter().take(k as usize + 1).sum(), 0.0, 1.0)
}

pub fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let mut out = vec![0.0; max_k + 1];
    let lambda = lambda.max(0.0);

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}

/// Standard normal CDF (Abramowitz & Stegun 7.1.26 for erf).
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let y = 1.0
        - (((((1.061_405_429 * t - 1.453_152_027) * t) + 1.421_413_741) * t - 0.284_496_736) * t
            + 0.254_829_592)
            * t
            * (-x * x).exp();
    sign * y
}

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}
