use std::fmt;

use serde::{Deserialize, Serialize};

use crate::probability::{CARD_LINES, CORNER_LINES, GOAL_LINES};

/// A betting line stored in tenths so markets stay `Eq`/`Hash` (2.5 → 25).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Line(pub u16);

impl Line {
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 || value > 50.0 {
            return None;
        }
        let tenths = (value * 10.0).round();
        // Only half lines: a total can never land exactly on them.
        if tenths as u16 % 10 != 5 {
            return None;
        }
        Some(Self(tenths as u16))
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 10.0
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    Home,
    Draw,
    Away,
    HomeOrDraw,
    HomeOrAway,
    DrawOrAway,
    GoalsOver(Line),
    GoalsUnder(Line),
    BttsYes,
    BttsNo,
    CornersOver(Line),
    CornersUnder(Line),
    CardsOver(Line),
    CardsUnder(Line),
}

impl Market {
    /// Human label with team names substituted where relevant.
    pub fn label(&self, home: &str, away: &str) -> String {
        match self {
            Market::Home => format!("{home} win"),
            Market::Draw => "Draw".to_string(),
            Market::Away => format!("{away} win"),
            Market::HomeOrDraw => format!("{home} or draw (1X)"),
            Market::HomeOrAway => "Either team wins (12)".to_string(),
            Market::DrawOrAway => format!("{away} or draw (X2)"),
            Market::GoalsOver(l) => format!("Over {l} goals"),
            Market::GoalsUnder(l) => format!("Under {l} goals"),
            Market::BttsYes => "Both teams to score: yes".to_string(),
            Market::BttsNo => "Both teams to score: no".to_string(),
            Market::CornersOver(l) => format!("Over {l} corners"),
            Market::CornersUnder(l) => format!("Under {l} corners"),
            Market::CardsOver(l) => format!("Over {l} cards"),
            Market::CardsUnder(l) => format!("Under {l} cards"),
        }
    }

    /// Short code as accepted by [`parse_odds_line`].
    pub fn code(&self) -> String {
        match self {
            Market::Home => "1".to_string(),
            Market::Draw => "X".to_string(),
            Market::Away => "2".to_string(),
            Market::HomeOrDraw => "1X".to_string(),
            Market::HomeOrAway => "12".to_string(),
            Market::DrawOrAway => "X2".to_string(),
            Market::GoalsOver(l) => format!("O{l}"),
            Market::GoalsUnder(l) => format!("U{l}"),
            Market::BttsYes => "BTTS".to_string(),
            Market::BttsNo => "BTTS-NO".to_string(),
            Market::CornersOver(l) => format!("CO{l}"),
            Market::CornersUnder(l) => format!("CU{l}"),
            Market::CardsOver(l) => format!("KO{l}"),
            Market::CardsUnder(l) => format!("KU{l}"),
        }
    }

    pub fn family(&self) -> MarketFamily {
        match self {
            Market::Home | Market::Draw | Market::Away => MarketFamily::Moneyline,
            Market::HomeOrDraw | Market::HomeOrAway | Market::DrawOrAway => {
                MarketFamily::DoubleChance
            }
            Market::GoalsOver(_) | Market::GoalsUnder(_) => MarketFamily::Goals,
            Market::BttsYes | Market::BttsNo => MarketFamily::Btts,
            Market::CornersOver(_) | Market::CornersUnder(_) => MarketFamily::Corners,
            Market::CardsOver(_) | Market::CardsUnder(_) => MarketFamily::Cards,
        }
    }

    /// Whether the probability model has a line for this market.
    pub fn is_modelled(&self) -> bool {
        match self {
            Market::GoalsOver(l) | Market::GoalsUnder(l) => GOAL_LINES.contains(&l.0),
            Market::CornersOver(l) | Market::CornersUnder(l) => CORNER_LINES.contains(&l.0),
            Market::CardsOver(l) | Market::CardsUnder(l) => CARD_LINES.contains(&l.0),
            _ => true,
        }
    }

    pub fn parse_code(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        let line = |rest: &str| rest.parse::<f64>().ok().and_then(Line::from_f64);
        let market = match code.as_str() {
            "1" | "H" | "HOME" => Market::Home,
            "X" | "D" | "DRAW" => Market::Draw,
            "2" | "A" | "AWAY" => Market::Away,
            "1X" => Market::HomeOrDraw,
            "12" => Market::HomeOrAway,
            "X2" | "2X" => Market::DrawOrAway,
            "BTTS" | "BTTS-YES" | "GG" => Market::BttsYes,
            "BTTS-NO" | "NG" => Market::BttsNo,
            _ => {
                if let Some(rest) = code.strip_prefix("CO") {
                    Market::CornersOver(line(rest)?)
                } else if let Some(rest) = code.strip_prefix("CU") {
                    Market::CornersUnder(line(rest)?)
                } else if let Some(rest) = code.strip_prefix("KO") {
                    Market::CardsOver(line(rest)?)
                } else if let Some(rest) = code.strip_prefix("KU") {
                    Market::CardsUnder(line(rest)?)
                } else if let Some(rest) = code.strip_prefix('O') {
                    Market::GoalsOver(line(rest)?)
                } else if let Some(rest) = code.strip_prefix('U') {
                    Market::GoalsUnder(line(rest)?)
                } else {
                    return None;
                }
            }
        };
        Some(market)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketFamily {
    Moneyline,
    DoubleChance,
    Goals,
    Btts,
    Corners,
    Cards,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    pub market: Market,
    pub decimal: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OddsParse {
    pub odds: Vec<MarketOdds>,
    pub warnings: Vec<String>,
}

/// Parses a line such as `1=2.10 X=3.40 2=3.60 O2.5=1.90 BTTS=1.80 CO9.5=1.85`.
/// Tokens may be separated by spaces, commas or semicolons; `:` works as well as `=`.
/// Later duplicates replace earlier ones.
pub fn parse_odds_line(raw: &str) -> OddsParse {
    let mut out = OddsParse::default();
    for token in raw
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|t| !t.is_empty())
    {
        let Some((code, price)) = token.split_once(['=', ':']) else {
            out.warnings.push(format!("ignored '{token}': expected CODE=ODDS"));
            continue;
        };
        let Some(market) = Market::parse_code(code) else {
            out.warnings.push(format!("unknown market '{code}'"));
            continue;
        };
        if !market.is_modelled() {
            out.warnings.push(format!(
                "no model line for '{code}' (goals 0.5-4.5, corners 7.5-11.5, cards 2.5-6.5)"
            ));
            continue;
        }
        let Some(decimal) = price.trim().replace(',', ".").parse::<f64>().ok() else {
            out.warnings.push(format!("bad odds '{price}' for {code}"));
            continue;
        };
        if !decimal.is_finite() || decimal <= 1.0 {
            out.warnings
                .push(format!("odds for {code} must be greater than 1.0"));
            continue;
        }
        out.odds.retain(|o| o.market != market);
        out.odds.push(MarketOdds { market, decimal });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_separators() {
        let parsed = parse_odds_line("1=2.10, X:3.40; 2=3.60 o2.5=1.90 btts=1.80 CO9.5=1.85 KU4.5=2.0");
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
        let markets: Vec<Market> = parsed.odds.iter().map(|o| o.market).collect();
        assert_eq!(
            markets,
            vec![
                Market::Home,
                Market::Draw,
                Market::Away,
                Market::GoalsOver(Line(25)),
                Market::BttsYes,
                Market::CornersOver(Line(95)),
                Market::CardsUnder(Line(45)),
            ]
        );
    }

    #[test]
    fn rejects_bad_tokens_with_warnings() {
        let parsed = parse_odds_line("1=0.9 Z=2.0 O2=1.5 hello X=abc");
        assert!(parsed.odds.is_empty());
        assert_eq!(parsed.warnings.len(), 5);
    }

    #[test]
    fn unmodelled_lines_are_rejected() {
        let parsed = parse_odds_line("1=2.0 O5.5=6.0 CO13.5=3.0 KO8.5=4.0 CU7.5=1.4");
        let markets: Vec<Market> = parsed.odds.iter().map(|o| o.market).collect();
        assert_eq!(markets, vec![Market::Home, Market::CornersUnder(Line(75))]);
        assert_eq!(parsed.warnings.len(), 3);
        assert!(parsed.warnings[0].contains("O5.5"));
    }

    #[test]
    fn later_duplicate_wins() {
        let parsed = parse_odds_line("1=2.0 1=2.5");
        assert_eq!(parsed.odds.len(), 1);
        assert_eq!(parsed.odds[0].decimal, 2.5);
    }

    #[test]
    fn codes_round_trip_through_parser() {
        for market in [Market::DrawOrAway, Market::GoalsUnder(Line(35)), Market::BttsNo] {
            assert_eq!(Market::parse_code(&market.code()), Some(market));
        }
    }
}
