use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// Patterns are fixed strings; a failed compile just disables that pass.
static BULLET_OPPORTUNITY: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*•]|\d+[.)])\s*(?P<market>[^@\n]+?)\s*@\s*(?P<odds>\d+(?:[.,]\d+)?)\s*[:\-]?.*?real\s*(?:probability\s*)?(?P<real>\d+(?:\.\d+)?)\s*%.*?implied\s*(?:probability\s*)?(?P<implied>\d+(?:\.\d+)?)\s*%",
    )
    .ok()
});

static STRICT_COMPARISON: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*•]\s*)?\**(?P<market>[^:\n*@]+?)\**\s*:\s*real\s*(?P<real>\d+(?:\.\d+)?)\s*%\s*vs\.?\s*implied\s*(?P<implied>\d+(?:\.\d+)?)\s*%",
    )
    .ok()
});

static LOOSE_COMPARISON: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*•]\s*)?\**(?P<market>[A-Za-z][^%\n]*?)\**\s*[:\-]?\s*(?:real|model)?\s*(?:probability)?\s*[:=]?\s*(?P<real>\d+(?:\.\d+)?)\s*%[^0-9\n]*?(?P<implied>\d+(?:\.\d+)?)\s*%",
    )
    .ok()
});

static CONFIDENCE_LINE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*•]\s*)?\**\s*confidence(?:\s+level)?\s*\**\s*[:\-]\s*\**\s*(?P<body>.+)$")
        .ok()
});

static PERCENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?P<num>\d+(?:[.,]\d+)?)\s*%").ok());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedOpportunity {
    pub market: String,
    pub odds: Option<f64>,
    pub real_probability: Option<f64>,
    pub implied_probability: Option<f64>,
    pub edge: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityComparison {
    pub market: String,
    pub real: f64,
    pub implied: f64,
}

/// Structured view of a model reply. Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    pub title: String,
    pub opportunities: Vec<ParsedOpportunity>,
    pub comparisons: Vec<ProbabilityComparison>,
    pub confidence: Option<String>,
    pub raw: String,
}

impl AnalysisDocument {
    pub fn is_structured(&self) -> bool {
        !self.opportunities.is_empty() || !self.comparisons.is_empty() || self.confidence.is_some()
    }
}

struct Section<'a> {
    heading: String,
    lines: Vec<&'a str>,
}

pub fn parse_analysis_response(text: &str) -> AnalysisDocument {
    let sections = split_sections(text);

    let mut opportunities = parse_table(text);
    if opportunities.is_empty() {
        opportunities = parse_bullet_opportunities(text);
    }

    AnalysisDocument {
        title: parse_title(text),
        opportunities,
        comparisons: parse_comparisons(text, &sections),
        confidence: parse_confidence(text, &sections),
        raw: text.to_string(),
    }
}

fn parse_title(text: &str) -> String {
    let lines = || text.lines().map(str::trim).filter(|l| !l.is_empty());
    if let Some(h) = lines().find(|l| l.starts_with('#')) {
        let t = h.trim_start_matches('#').trim();
        if !t.is_empty() {
            return strip_markup(t);
        }
    }
    if let Some(b) = lines().find(|l| l.starts_with("**") && l.len() > 4) {
        return strip_markup(b);
    }
    lines().next().map(strip_markup).unwrap_or_default()
}

fn split_sections(text: &str) -> Vec<Section<'_>> {
    let mut out = vec![Section {
        heading: String::new(),
        lines: Vec::new(),
    }];
    for line in text.lines() {
        let t = line.trim();
        let is_heading = t.starts_with('#')
            || (t.starts_with("**") && t.ends_with("**") && t.len() > 4 && !t.contains(':'));
        if is_heading {
            out.push(Section {
                heading: strip_markup(t.trim_start_matches('#')).to_lowercase(),
                lines: Vec::new(),
            });
        } else if let Some(section) = out.last_mut() {
            section.lines.push(line);
        }
    }
    out
}

fn table_cells(line: &str) -> Option<Vec<String>> {
    let t = line.trim();
    if !t.starts_with('|') {
        return None;
    }
    let inner = t.trim_start_matches('|').trim_end_matches('|');
    Some(inner.split('|').map(|c| c.trim().to_string()).collect())
}

fn is_separator(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

#[derive(Default)]
struct Columns {
    market: usize,
    odds: Option<usize>,
    real: Option<usize>,
    implied: Option<usize>,
    edge: Option<usize>,
    note: Option<usize>,
}

fn header_columns(cells: &[String]) -> Option<Columns> {
    let lower: Vec<String> = cells.iter().map(|c| strip_markup(c).to_lowercase()).collect();
    let market = lower
        .iter()
        .position(|c| c.contains("market") || c.contains("bet") || c.contains("selection"))?;
    let find = |keys: &[&str]| lower.iter().position(|c| keys.iter().any(|k| c.contains(k)));
    Some(Columns {
        market,
        odds: find(&["odds", "price", "quota"]),
        real: find(&["real", "model", "our"]),
        implied: find(&["implied", "bookmaker", "bookie"]),
        edge: find(&["edge", "value", "diff"]),
        note: find(&["justification", "reason", "why", "note"]),
    })
}

fn parse_table(text: &str) -> Vec<ParsedOpportunity> {
    let mut out = Vec::new();
    let mut columns: Option<Columns> = None;

    for line in text.lines() {
        let Some(cells) = table_cells(line) else {
            columns = None;
            continue;
        };
        if is_separator(&cells) {
            continue;
        }
        match &columns {
            None => columns = header_columns(&cells),
            Some(cols) => {
                if cells.len() < 4 {
                    continue;
                }
                let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).map(String::as_str);
                let market = strip_markup(cell(Some(cols.market)).unwrap_or_default());
                if market.is_empty() || market.to_lowercase().starts_with("no value") {
                    continue;
                }
                out.push(ParsedOpportunity {
                    market,
                    odds: cell(cols.odds).and_then(parse_num),
                    real_probability: cell(cols.real).and_then(parse_num),
                    implied_probability: cell(cols.implied).and_then(parse_num),
                    edge: cell(cols.edge).and_then(parse_num),
                    note: cell(cols.note)
                        .map(strip_markup)
                        .filter(|n| !n.is_empty()),
                });
            }
        }
    }
    out
}

fn parse_bullet_opportunities(text: &str) -> Vec<ParsedOpportunity> {
    let Some(re) = BULLET_OPPORTUNITY.as_ref() else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let real = caps.name("real").and_then(|m| parse_num(m.as_str()));
            let implied = caps.name("implied").and_then(|m| parse_num(m.as_str()));
            Some(ParsedOpportunity {
                market: strip_markup(caps.name("market")?.as_str()),
                odds: caps.name("odds").and_then(|m| parse_num(m.as_str())),
                real_probability: real,
                implied_probability: implied,
                edge: real.zip(implied).map(|(r, i)| r - i),
                note: None,
            })
        })
        .collect()
}

fn parse_comparisons(text: &str, sections: &[Section]) -> Vec<ProbabilityComparison> {
    if let Some(re) = STRICT_COMPARISON.as_ref() {
        let strict: Vec<_> = text
            .lines()
            .filter(|l| !l.trim_start().starts_with('|'))
            .filter_map(|l| comparison_from(re, l))
            .collect();
        if !strict.is_empty() {
            return strict;
        }
    }

    let section_lines: Vec<&str> = sections
        .iter()
        .filter(|s| s.heading.contains("comparison") || s.heading.contains("probabilit"))
        .flat_map(|s| s.lines.iter().copied())
        .collect();

    if let Some(re) = LOOSE_COMPARISON.as_ref() {
        let loose: Vec<_> = section_lines
            .iter()
            .filter(|l| !l.trim_start().starts_with('|'))
            .filter_map(|l| comparison_from(re, l))
            .collect();
        if !loose.is_empty() {
            return loose;
        }
    }

    section_lines
        .iter()
        .filter_map(|l| split_comparison(l))
        .collect()
}

fn comparison_from(re: &Regex, line: &str) -> Option<ProbabilityComparison> {
    let caps = re.captures(line)?;
    let market = strip_markup(caps.name("market")?.as_str());
    if market.is_empty() {
        return None;
    }
    Some(ProbabilityComparison {
        market,
        real: parse_num(caps.name("real")?.as_str())?,
        implied: parse_num(caps.name("implied")?.as_str())?,
    })
}

// Last resort: "Market | 55% | 48%" or "Market: 55% / 48%".
fn split_comparison(line: &str) -> Option<ProbabilityComparison> {
    let re = PERCENT.as_ref()?;
    let trimmed = line.trim().trim_start_matches(['-', '*', '•', '|']).trim();
    let (market, rest) = trimmed.split_once(['|', ':'])?;
    let mut nums = re
        .captures_iter(rest)
        .filter_map(|c| c.name("num").and_then(|m| parse_num(m.as_str())));
    let real = nums.next()?;
    let implied = nums.next()?;
    let market = strip_markup(market);
    if market.is_empty() {
        return None;
    }
    Some(ProbabilityComparison {
        market,
        real,
        implied,
    })
}

fn parse_confidence(text: &str, sections: &[Section]) -> Option<String> {
    if let Some(re) = CONFIDENCE_LINE.as_ref() {
        for line in text.lines() {
            if let Some(body) = re.captures(line).and_then(|c| c.name("body")) {
                let body = strip_markup(body.as_str());
                if !body.is_empty() {
                    return Some(body);
                }
            }
        }
    }
    sections
        .iter()
        .filter(|s| s.heading.contains("confidence"))
        .flat_map(|s| s.lines.iter())
        .map(|l| strip_markup(l))
        .find(|l| !l.is_empty())
}

fn parse_num(raw: &str) -> Option<f64> {
    let cleaned: String = strip_markup(raw)
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();
    let v = cleaned.trim_matches('.').parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

fn strip_markup(raw: &str) -> String {
    raw.replace("**", "")
        .replace('`', "")
        .trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '_')
        .to_string()
}

/// Plain-text rendering for the results pane and exports.
pub fn format_analysis_response(doc: &AnalysisDocument) -> String {
    if !doc.is_structured() {
        return doc.raw.trim().to_string();
    }
    let mut out = String::new();
    if !doc.title.is_empty() {
        let _ = writeln!(out, "{}", doc.title);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Value opportunities:");
    if doc.opportunities.is_empty() {
        let _ = writeln!(out, "  none");
    }
    for o in &doc.opportunities {
        let mut line = format!("  - {}", o.market);
        if let Some(odds) = o.odds {
            let _ = write!(line, " @ {odds:.2}");
        }
        if let Some(real) = o.real_probability {
            let _ = write!(line, " | real {real:.1}%");
        }
        if let Some(implied) = o.implied_probability {
            let _ = write!(line, " | implied {implied:.1}%");
        }
        if let Some(edge) = o.edge {
            let _ = write!(line, " | edge {edge:+.1}");
        }
        let _ = writeln!(out, "{line}");
        if let Some(note) = &o.note {
            let _ = writeln!(out, "      {note}");
        }
    }

    if !doc.comparisons.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Probability comparison:");
        for c in &doc.comparisons {
            let _ = writeln!(
                out,
                "  - {}: real {:.1}% vs implied {:.1}%",
                c.market, c.real, c.implied
            );
        }
    }

    if let Some(conf) = &doc.confidence {
        let _ = writeln!(out);
        let _ = writeln!(out, "Confidence: {conf}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "# Arsenal vs Chelsea: value analysis

## Value opportunities
| Market | Odds | Real probability | Implied probability | Edge | Justification |
|---|---|---|---|---|---|
| Over 2.5 goals | 1.90 | 60.1% | 52.6% | +7.5 | Both sides create plenty. |
| **Arsenal win** | 2.10 | 54.0% | 47.6% | +6.4 | Strong home form. |

## Probability comparison
- Arsenal win: real 54.0% vs implied 47.6%
- Draw: real 24.0% vs implied 29.4%

## Confidence
Confidence level: Medium - thin H2H sample.
";

    #[test]
    fn parses_the_requested_format() {
        let doc = parse_analysis_response(REPLY);
        assert_eq!(doc.title, "Arsenal vs Chelsea: value analysis");
        assert_eq!(doc.opportunities.len(), 2);
        assert_eq!(doc.opportunities[1].market, "Arsenal win");
        assert_eq!(doc.opportunities[0].odds, Some(1.90));
        assert_eq!(doc.opportunities[0].edge, Some(7.5));
        assert_eq!(
            doc.opportunities[0].note.as_deref(),
            Some("Both sides create plenty.")
        );
        assert_eq!(doc.comparisons.len(), 2);
        assert_eq!(doc.comparisons[1].implied, 29.4);
        assert_eq!(doc.confidence.as_deref(), Some("Medium - thin H2H sample."));
    }

    #[test]
    fn bullet_fallback_and_loose_comparisons() {
        let reply = "**Quick take**
- Over 2.5 goals @ 1.95: real 58% vs implied 51.3%

Probability comparison
**Probabilities**
- Home win 48% against 44%

**Confidence**
Low";
        let doc = parse_analysis_response(reply);
        assert_eq!(doc.title, "Quick take");
        assert_eq!(doc.opportunities.len(), 1);
        assert_eq!(doc.opportunities[0].odds, Some(1.95));
        assert!((doc.opportunities[0].edge.unwrap() - 6.7).abs() < 1e-9);
        assert_eq!(doc.comparisons.len(), 1);
        assert_eq!(doc.comparisons[0].real, 48.0);
        assert_eq!(doc.confidence.as_deref(), Some("Low"));
    }

    #[test]
    fn unstructured_text_renders_raw() {
        let doc = parse_analysis_response("Sorry, I cannot help with that.");
        assert_eq!(doc.title, "Sorry, I cannot help with that.");
        assert!(!doc.is_structured());
        assert_eq!(format_analysis_response(&doc), "Sorry, I cannot help with that.");
    }

    #[test]
    fn formatted_output_lists_rows() {
        let text = format_analysis_response(&parse_analysis_response(REPLY));
        assert!(text.contains("Over 2.5 goals @ 1.90 | real 60.1% | implied 52.6% | edge +7.5"));
        assert!(text.contains("Confidence: Medium"));
    }
}
