use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::{debug, info, warn};

use crate::api_cache::{ApiCache, CacheHit};
use crate::http_client::{BROWSER_USER_AGENT, http_client};

const BOT_MARKERS: &[&str] = &[
    "just a moment...",
    "cf-browser-verification",
    "challenge-platform",
    "captcha",
    "access denied",
    "rate limited",
];

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Why a single attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageProblem {
    BotProtection,
    MissingTables,
}

/// Classifies a fetched HTML page; `None` means it looks usable.
pub fn detect_page_problem(html: &str) -> Option<PageProblem> {
    let lower = html.to_ascii_lowercase();
    if BOT_MARKERS.iter().any(|m| lower.contains(m)) && !lower.contains("<table") {
        return Some(PageProblem::BotProtection);
    }
    if !lower.contains("<table") {
        return Some(PageProblem::MissingTables);
    }
    None
}

/// GETs an HTML page, retrying transport errors, 429/5xx responses,
/// bot-protection pages and pages without tables. `Ok(None)` once retries run out.
pub fn fetch_html_with_retries(url: &str, policy: RetryPolicy) -> Result<Option<String>> {
    let client = http_client()?;
    fetch_html_with_client(client, url, policy)
}

pub fn fetch_html_with_client(
    client: &Client,
    url: &str,
    policy: RetryPolicy,
) -> Result<Option<String>> {
    let attempts = policy.attempts.max(1);
    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.delay_for(attempt - 1);
            debug!(url, attempt, ?delay, "backing off before retry");
            thread::sleep(delay);
        }

        let resp = client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send();
        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                warn!(url, attempt, "request failed: {err}");
                continue;
            }
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!(url, attempt, %status, "retryable status");
            continue;
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("http {status} for {url}"));
        }

        let body = resp.text().context("failed reading body")?;
        match detect_page_problem(&body) {
            None => return Ok(Some(body)),
            Some(problem) => warn!(url, attempt, ?problem, "unusable page"),
        }
    }
    info!(url, attempts, "giving up on page");
    Ok(None)
}

/// FBref page fetch with an on-disk snapshot cache.
pub fn fetch_fbref_data(
    url: &str,
    cache: &ApiCache,
    max_age: Duration,
    policy: RetryPolicy,
) -> Result<Option<String>> {
    let fetched = cache.get_or_fetch(url, &[], max_age, || {
        fetch_html_with_retries(url, policy)?
            .ok_or_else(|| anyhow::anyhow!("no usable page after {} attempts", policy.attempts))
    });
    match fetched {
        Ok((html, hit)) => {
            debug!(url, ?hit, "fbref page ready");
            if hit == CacheHit::Stale {
                warn!(url, "using stale fbref snapshot");
            }
            Ok(Some(html))
        }
        Err(err) => {
            warn!(url, "fbref fetch failed: {err:#}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloudflare_interstitial_is_bot_protection() {
        let html = "<html><title>Just a moment...</title><body>checking</body></html>";
        assert_eq!(detect_page_problem(html), Some(PageProblem::BotProtection));
    }

    #[test]
    fn page_without_tables_is_rejected() {
        let html = "<html><body><p>Squad stats coming soon</p></body></html>";
        assert_eq!(detect_page_problem(html), Some(PageProblem::MissingTables));
    }

    #[test]
    fn page_with_table_is_accepted() {
        let html = "<html><body><table id=\"stats\"><tr><td>1</td></tr></table></body></html>";
        assert_eq!(detect_page_problem(html), None);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
