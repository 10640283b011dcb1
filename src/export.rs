use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::pipeline::AnalysisOutcome;
use crate::team_stats::{TeamStats, prompt_fields};
use crate::users::UserAccount;

pub struct ExportReport {
    pub sheets: usize,
    pub rows: usize,
}

/// One workbook per analysis: summary, team stats, model probabilities,
/// priced markets, value opportunities and the AI commentary.
pub fn export_analysis_xlsx(path: &Path, outcome: &AnalysisOutcome) -> Result<ExportReport> {
    let summary_rows = vec![
        row(["Field", "Value"]),
        vec!["Match".to_string(), format!("{} vs {}", outcome.home.name, outcome.away.name)],
        vec!["League".to_string(), outcome.league.clone()],
        vec!["Source".to_string(), outcome.source.clone()],
        vec![
            "Generated".to_string(),
            outcome.generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        ],
        vec![
            "Data quality".to_string(),
            format!("{:.2}", outcome.probabilities.data_quality),
        ],
        vec![
            "Expected goals".to_string(),
            format!(
                "{:.2} - {:.2}",
                outcome.probabilities.expected_goals_home, outcome.probabilities.expected_goals_away
            ),
        ],
        vec!["Warnings".to_string(), outcome.warnings.join("; ")],
    ];

    let mut team_rows = vec![row(["Stat", outcome.home.name.as_str(), outcome.away.name.as_str()])];
    team_rows.extend(team_stat_rows(&outcome.home, &outcome.away));

    let p = &outcome.probabilities;
    let mut prob_rows = vec![row(["Family", "Outcome", "Probability %", "Complement %"])];
    prob_rows.push(prob_row("1X2", &format!("{} win", outcome.home.name), p.moneyline.home, None));
    prob_rows.push(prob_row("1X2", "Draw", p.moneyline.draw, None));
    prob_rows.push(prob_row("1X2", &format!("{} win", outcome.away.name), p.moneyline.away, None));
    prob_rows.push(prob_row("Double chance", "1X", p.double_chance.home_draw, None));
    prob_rows.push(prob_row("Double chance", "12", p.double_chance.home_away, None));
    prob_rows.push(prob_row("Double chance", "X2", p.double_chance.draw_away, None));
    for (family, lines) in [("Goals", &p.goals), ("Corners", &p.corners), ("Cards", &p.cards)] {
        for l in lines {
            prob_rows.push(prob_row(family, &format!("Over {}", l.line), l.over, Some(l.under)));
        }
    }
    prob_rows.push(prob_row("BTTS", "Yes", p.btts.yes, Some(p.btts.no)));

    let mut market_rows = vec![row(["Market", "Odds", "Real %", "Implied %", "Edge"])];
    for c in &outcome.comparisons {
        market_rows.push(vec![
            c.label.clone(),
            format!("{:.2}", c.decimal_odds),
            format!("{:.1}", c.real_probability),
            format!("{:.1}", c.implied_probability),
            format!("{:.1}", c.edge),
        ]);
    }

    let mut value_rows = vec![row([
        "Market",
        "Odds",
        "Real %",
        "Implied %",
        "Edge",
        "EV per unit",
        "Justification",
    ])];
    for o in &outcome.opportunities {
        value_rows.push(vec![
            o.label.clone(),
            format!("{:.2}", o.decimal_odds),
            format!("{:.1}", o.real_probability),
            format!("{:.1}", o.implied_probability),
            format!("{:.1}", o.edge),
            format!("{:.3}", o.expected_value),
            o.justification.clone().unwrap_or_default(),
        ]);
    }

    let mut ai_rows = vec![row(["Section", "Text"])];
    if let Some(doc) = &outcome.document {
        ai_rows.push(vec!["Title".to_string(), doc.title.clone()]);
        for o in &doc.opportunities {
            ai_rows.push(vec![
                "Opportunity".to_string(),
                format!(
                    "{} | odds {} | real {} | implied {}",
                    o.market,
                    opt_num(o.odds, 2),
                    opt_num(o.real_probability, 1),
                    opt_num(o.implied_probability, 1)
                ),
            ]);
        }
        if let Some(conf) = &doc.confidence {
            ai_rows.push(vec!["Confidence".to_string(), conf.clone()]);
        }
    }
    if let Some(text) = &outcome.llm_text {
        ai_rows.push(vec!["Raw reply".to_string(), clip(text)]);
    }
    ai_rows.push(vec!["Prompt".to_string(), clip(&outcome.prompt)]);

    let sheets: [(&str, &Vec<Vec<String>>); 6] = [
        ("Summary", &summary_rows),
        ("Teams", &team_rows),
        ("Probabilities", &prob_rows),
        ("Markets", &market_rows),
        ("Value", &value_rows),
        ("AI", &ai_rows),
    ];
    write_workbook(path, &sheets)
}

/// Admin export of every account.
pub fn export_users_xlsx(path: &Path, users: &[&UserAccount]) -> Result<ExportReport> {
    let mut rows = vec![row([
        "Email",
        "Name",
        "Tier",
        "Verified",
        "Free credits",
        "Purchased credits",
        "Used",
        "Remaining",
        "Analyses",
        "Created",
        "Last login",
    ])];
    for u in users {
        rows.push(vec![
            u.email.clone(),
            u.name.clone(),
            u.tier.label().to_string(),
            if u.verified { "yes".to_string() } else { "no".to_string() },
            u.free_credits.to_string(),
            u.purchased_credits.to_string(),
            u.credits_used().to_string(),
            u.credits_remaining().to_string(),
            u.usage.len().to_string(),
            u.created_at.format("%Y-%m-%d").to_string(),
            u.last_login
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
        ]);
    }
    write_workbook(path, &[("Users", &rows)])
}

fn write_workbook(path: &Path, sheets: &[(&str, &Vec<Vec<String>>)]) -> Result<ExportReport> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let mut workbook = Workbook::new();
    let mut rows = 0usize;
    for (name, data) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name)?;
        write_rows(sheet, data)?;
        rows += data.len().saturating_sub(1);
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(ExportReport {
        sheets: sheets.len(),
        rows,
    })
}

fn team_stat_rows(home: &TeamStats, away: &TeamStats) -> Vec<Vec<String>> {
    let away_fields = prompt_fields(away);
    prompt_fields(home)
        .into_iter()
        .map(|(label, value)| {
            let other = away_fields
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            vec![label.to_string(), value, other]
        })
        .collect()
}

fn prob_row(family: &str, outcome: &str, p: f64, complement: Option<f64>) -> Vec<String> {
    vec![
        family.to_string(),
        outcome.to_string(),
        format!("{p:.1}"),
        complement.map(|c| format!("{c:.1}")).unwrap_or_default(),
    ]
}

fn row<const N: usize>(cells: [&str; N]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

// Excel caps a cell at 32767 characters.
fn clip(text: &str) -> String {
    text.chars().take(32_000).collect()
}

fn opt_num(v: Option<f64>, decimals: usize) -> String {
    v.map(|v| format!("{v:.decimals$}")).unwrap_or_else(|| "-".to_string())
}

// Numeric-looking cells are written as numbers so spreadsheets can sort them.
fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            match value.parse::<f64>() {
                Ok(n) if row_idx > 0 && n.is_finite() => worksheet.write_number(r, c, n),
                _ => worksheet.write_string(r, c, value),
            }
            .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
