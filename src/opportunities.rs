use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::odds_input::{Market, MarketOdds};
use crate::probability::MarketProbabilities;

pub const DEFAULT_VALUE_THRESHOLD: f64 = 5.0;

/// A market where the model probability beats the bookmaker's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub market: Market,
    pub label: String,
    pub decimal_odds: f64,
    pub real_probability: f64,
    pub implied_probability: f64,
    /// Percentage points.
    pub edge: f64,
    /// Expected profit per unit staked.
    pub expected_value: f64,
    pub justification: Option<String>,
}

/// Comparison row for every market the user priced, value or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketComparison {
    pub market: Market,
    pub label: String,
    pub decimal_odds: f64,
    pub real_probability: f64,
    pub implied_probability: f64,
    pub edge: f64,
}

pub fn implied_probability(decimal_odds: f64) -> Option<f64> {
    if !decimal_odds.is_finite() || decimal_odds <= 1.0 {
        return None;
    }
    Some(100.0 / decimal_odds)
}

/// Bookmaker margin (overround) of a complete 1X2 price, in percentage points.
pub fn overround(home: f64, draw: f64, away: f64) -> Option<f64> {
    let sum = implied_probability(home)? + implied_probability(draw)? + implied_probability(away)?;
    Some(sum - 100.0)
}

/// Margin-free 1X2 probabilities from decimal odds.
pub fn remove_vig(home: f64, draw: f64, away: f64) -> Option<(f64, f64, f64)> {
    let ih = implied_probability(home)?;
    let id = implied_probability(draw)?;
    let ia = implied_probability(away)?;
    let sum = ih + id + ia;
    if sum <= 0.0 {
        return None;
    }
    Some((ih / sum * 100.0, id / sum * 100.0, ia / sum * 100.0))
}

pub fn compare_markets(
    probs: &MarketProbabilities,
    odds: &[MarketOdds],
    home: &str,
    away: &str,
) -> Vec<MarketComparison> {
    odds.iter()
        .filter_map(|o| {
            let real = probs.probability(o.market)?;
            let implied = implied_probability(o.decimal)?;
            Some(MarketComparison {
                market: o.market,
                label: o.market.label(home, away),
                decimal_odds: o.decimal,
                real_probability: real,
                implied_probability: implied,
                edge: real - implied,
            })
        })
        .collect()
}

/// Markets whose edge is at least `threshold` points, best edge first.
pub fn find_opportunities(
    probs: &MarketProbabilities,
    odds: &[MarketOdds],
    home: &str,
    away: &str,
    threshold: f64,
) -> Vec<OpportunityRecord> {
    let mut out: Vec<OpportunityRecord> = compare_markets(probs, odds, home, away)
        .into_iter()
        .filter(|c| c.edge >= threshold)
        .map(|c| OpportunityRecord {
            market: c.market,
            label: c.label,
            decimal_odds: c.decimal_odds,
            real_probability: c.real_probability,
            implied_probability: c.implied_probability,
            edge: c.edge,
            expected_value: c.real_probability / 100.0 * c.decimal_odds - 1.0,
            justification: None,
        })
        .collect();
    out.sort_by(|a, b| b.edge.partial_cmp(&a.edge).unwrap_or(Ordering::Equal));
    out
}
