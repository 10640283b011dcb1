use std::path::PathBuf;

use anyhow::{Result, anyhow};

use footy_value::analysis_parser::format_analysis_response;
use footy_value::config::AppConfig;
use footy_value::export::export_analysis_xlsx;
use footy_value::llm::{ChatModel, OpenAiClient};
use footy_value::logging::init_cli_logging;
use footy_value::pipeline::{AnalysisRequest, FixtureSource, PipelineConfig, SourceSpec, run_analysis};

const USAGE: &str = "usage: analyze --fixture <stats.json> --home <team> --away <team> --odds \"1=2.10 X=3.40 2=3.60\" [--league <name>] [--llm] [--xlsx <out.xlsx>]";

fn main() -> Result<()> {
    init_cli_logging();
    let cfg = AppConfig::from_env();

    let fixture = arg_value("--fixture").map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?;
    let home = arg_value("--home").ok_or_else(|| anyhow!(USAGE))?;
    let away = arg_value("--away").ok_or_else(|| anyhow!(USAGE))?;
    let odds_line = arg_value("--odds").unwrap_or_default();
    let league = arg_value("--league").unwrap_or_else(|| "Unknown league".to_string());
    let use_llm = has_flag("--llm");

    let source = FixtureSource::from_path(&fixture)?;
    let chat: Option<Box<dyn ChatModel>> = if use_llm {
        OpenAiClient::from_config(&cfg)?.map(|c| Box::new(c) as Box<dyn ChatModel>)
    } else {
        None
    };

    let request = AnalysisRequest {
        league,
        home,
        away,
        odds_line,
        source: SourceSpec::Fixture { path: fixture },
        use_llm,
    };
    let outcome = run_analysis(&request, &source, chat.as_deref(), PipelineConfig::from(&cfg));

    let p = &outcome.probabilities;
    println!("{} vs {} ({})", outcome.home.name, outcome.away.name, outcome.source);
    println!(
        "xG {:.2} - {:.2} | data quality {:.2}",
        p.expected_goals_home, p.expected_goals_away, p.data_quality
    );
    println!(
        "1X2 {:.1} / {:.1} / {:.1} | 1X {:.1} 12 {:.1} X2 {:.1}",
        p.moneyline.home,
        p.moneyline.draw,
        p.moneyline.away,
        p.double_chance.home_draw,
        p.double_chance.home_away,
        p.double_chance.draw_away
    );
    for l in &p.goals {
        println!("goals {}: over {:.1} under {:.1}", l.line, l.over, l.under);
    }
    println!("BTTS yes {:.1} no {:.1}", p.btts.yes, p.btts.no);

    println!();
    if outcome.opportunities.is_empty() {
        println!("No value opportunities above {:.1}% edge", cfg.value_threshold);
    }
    for o in &outcome.opportunities {
        println!(
            "VALUE {} @ {:.2}: real {:.1}% vs implied {:.1}% (edge {:+.1}, EV {:+.3})",
            o.label, o.decimal_odds, o.real_probability, o.implied_probability, o.edge, o.expected_value
        );
        if let Some(j) = &o.justification {
            println!("  {j}");
        }
    }
    for w in &outcome.warnings {
        println!("warning: {w}");
    }
    if let Some(doc) = &outcome.document {
        println!();
        println!("{}", format_analysis_response(doc));
    }

    if let Some(out) = arg_value("--xlsx") {
        let report = export_analysis_xlsx(&PathBuf::from(&out), &outcome)?;
        println!("Wrote {} ({} sheets, {} rows)", out, report.sheets, report.rows);
    }
    Ok(())
}

fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|a| a == name)
}
