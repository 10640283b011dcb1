use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Value, json};

use footy_value::api_cache::ApiCache;
use footy_value::api_football::ApiFootballClient;
use footy_value::config::AppConfig;
use footy_value::fbref_parse::parse_team_stats;
use footy_value::footystats::FootyStatsClient;
use footy_value::llm::{ChatModel, OpenAiClient};
use footy_value::logging::init_cli_logging;
use footy_value::scraper_fetch::{RetryPolicy, fetch_fbref_data};
use footy_value::state::DEFAULT_FBREF_URL;

const OUT_DIR: &str = "api_test_results";

struct Probe {
    name: &'static str,
    ok: bool,
    elapsed: Duration,
    summary: String,
    payload: Value,
}

fn main() -> Result<()> {
    init_cli_logging();
    let cfg = AppConfig::from_env();
    let out_dir = PathBuf::from(OUT_DIR);
    fs::create_dir_all(&out_dir).with_context(|| format!("failed to create {OUT_DIR}"))?;

    // Probes always hit the network.
    let cache = ApiCache::new(std::env::temp_dir().join("footy_value_probe_cache"));
    let fresh = Duration::ZERO;

    let mut probes = Vec::new();
    probes.push(run("fbref", || {
        let html = fetch_fbref_data(DEFAULT_FBREF_URL, &cache, fresh, RetryPolicy::default())?
            .ok_or_else(|| anyhow::anyhow!("page unavailable"))?;
        let teams = parse_team_stats(&html)?;
        Ok((
            format!("{} teams parsed", teams.len()),
            serde_json::to_value(&teams)?,
        ))
    }));

    match cfg.footystats_api_key.as_deref() {
        Some(key) => probes.push(run("footystats", || {
            let client = FootyStatsClient::new(key, cache.clone(), fresh, fresh);
            let raw = client.league_list()?;
            let leagues = raw.get("data").and_then(Value::as_array).map_or(0, Vec::len);
            Ok((format!("{leagues} leagues available"), raw))
        })),
        None => println!("skip footystats: FOOTYSTATS_API_KEY not set"),
    }

    match cfg.api_football_key.as_deref() {
        Some(key) => probes.push(run("api_football", || {
            let client = ApiFootballClient::new(key, cache.clone(), fresh, fresh);
            let leagues = client.leagues(Some("England"))?;
            Ok((
                format!("{} English leagues", leagues.len()),
                serde_json::to_value(&leagues)?,
            ))
        })),
        None => println!("skip api_football: API_FOOTBALL_KEY not set"),
    }

    match OpenAiClient::from_config(&cfg) {
        Ok(Some(client)) => probes.push(run("openai", || {
            let reply = client.complete("Reply with one word.", "Say ok.")?;
            Ok((format!("{} replied", client.name()), json!({ "reply": reply })))
        })),
        Ok(None) => println!("skip openai: OPENAI_API_KEY not set"),
        Err(err) => println!("skip openai: {err:#}"),
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let mut summary = Vec::new();
    for probe in &probes {
        let path = out_dir.join(format!("{}_{stamp}.json", probe.name));
        write_json(&path, &probe.payload)?;
        println!(
            "{:<13} {:<4} {:>6} ms  {}",
            probe.name,
            if probe.ok { "ok" } else { "FAIL" },
            probe.elapsed.as_millis(),
            probe.summary
        );
        summary.push(json!({
            "name": probe.name,
            "ok": probe.ok,
            "elapsed_ms": probe.elapsed.as_millis() as u64,
            "summary": probe.summary,
            "file": path.display().to_string(),
        }));
    }
    write_json(&out_dir.join(format!("summary_{stamp}.json")), &Value::Array(summary))?;
    Ok(())
}

fn run(name: &'static str, f: impl FnOnce() -> Result<(String, Value)>) -> Probe {
    let started = Instant::now();
    let result = f();
    let elapsed = started.elapsed();
    match result {
        Ok((summary, payload)) => Probe {
            name,
            ok: true,
            elapsed,
            summary,
            payload,
        },
        Err(err) => Probe {
            name,
            ok: false,
            elapsed,
            summary: format!("{err:#}"),
            payload: json!({ "error": format!("{err:#}") }),
        },
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}
