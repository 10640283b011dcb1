use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::http_client::{body_snippet, http_client};
use crate::users::{Package, Tier, package};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const CURRENCY: &str = "eur";

/// Subset of a Stripe Checkout Session the app reads back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A checkout that has been paid and can be credited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidCheckout {
    pub session_id: String,
    pub email: String,
    pub credits: u32,
    pub tier: Tier,
}

/// Query parameters Stripe appends when redirecting back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnParams {
    pub session_id: Option<String>,
    pub email: Option<String>,
    pub credits: Option<u32>,
    pub payment: Option<String>,
}

pub struct StripeClient {
    secret_key: String,
    base_url: String,
    success_url: String,
    cancel_url: String,
}

impl StripeClient {
    pub fn new(
        secret_key: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            base_url: STRIPE_API_BASE.to_string(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Option<Self> {
        let key = cfg.stripe_secret_key.as_deref()?;
        Some(Self::new(
            key,
            cfg.stripe_success_url.as_str(),
            cfg.stripe_cancel_url.as_str(),
        ))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn create_checkout_session(&self, email: &str, pack: &Package) -> Result<CheckoutSession> {
        let success = success_url(&self.success_url, email, pack.credits)?;
        let form = checkout_form(email, pack, &success, &self.cancel_url);
        let url = format!("{}/checkout/sessions", self.base_url.trim_end_matches('/'));
        let resp = http_client()?
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .context("stripe checkout request failed")?;
        let session = read_session(resp)?;
        info!(session_id = %session.id, email, package = pack.id, "checkout session created");
        Ok(session)
    }

    pub fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession> {
        if session_id.is_empty() || !session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(anyhow::anyhow!("invalid checkout session id"));
        }
        let url = format!(
            "{}/checkout/sessions/{}",
            self.base_url.trim_end_matches('/'),
            session_id
        );
        let resp = http_client()?
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .context("stripe session lookup failed")?;
        let session = read_session(resp)?;
        debug!(session_id, status = ?session.payment_status, "checkout session retrieved");
        Ok(session)
    }
}

fn read_session(resp: reqwest::blocking::Response) -> Result<CheckoutSession> {
    let status = resp.status();
    let body = resp.text().context("failed reading stripe body")?;
    if !status.is_success() {
        return Err(anyhow::anyhow!("stripe http {}: {}", status, body_snippet(&body)));
    }
    serde_json::from_str(&body).context("invalid stripe session json")
}

fn checkout_form(email: &str, pack: &Package, success_url: &str, cancel_url: &str) -> Vec<(String, String)> {
    let credits = pack.credits.to_string();
    [
        ("mode", "payment"),
        ("payment_method_types[0]", "card"),
        ("customer_email", email),
        ("line_items[0][quantity]", "1"),
        ("line_items[0][price_data][currency]", CURRENCY),
        ("line_items[0][price_data][product_data][name]", pack.name),
        ("success_url", success_url),
        ("cancel_url", cancel_url),
        ("metadata[email]", email),
        ("metadata[credits]", credits.as_str()),
        ("metadata[tier]", tier_code(pack.tier)),
        ("metadata[package]", pack.id),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .chain(std::iter::once((
        "line_items[0][price_data][unit_amount]".to_string(),
        pack.price_cents.to_string(),
    )))
    .collect()
}

/// Stripe substitutes `{CHECKOUT_SESSION_ID}` itself, so it is appended unencoded.
fn success_url(base: &str, email: &str, credits: u32) -> Result<String> {
    let mut url = Url::parse(base).with_context(|| format!("invalid success url {base}"))?;
    url.query_pairs_mut()
        .append_pair("email", email)
        .append_pair("credits", &credits.to_string());
    Ok(format!("{url}&session_id={{CHECKOUT_SESSION_ID}}"))
}

fn tier_code(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "free",
        Tier::Standard => "standard",
        Tier::Pro => "pro",
    }
}

fn tier_from_code(code: &str) -> Option<Tier> {
    match code.trim().to_ascii_lowercase().as_str() {
        "free" => Some(Tier::Free),
        "standard" => Some(Tier::Standard),
        "pro" => Some(Tier::Pro),
        _ => None,
    }
}

/// Accepts only sessions Stripe reports as `paid`, and reads the grant from metadata.
pub fn verify_payment(session: &CheckoutSession) -> Result<PaidCheckout> {
    match session.payment_status.as_deref() {
        Some("paid") => {}
        other => {
            return Err(anyhow::anyhow!(
                "payment not completed (status: {})",
                other.unwrap_or("unknown")
            ));
        }
    }
    let email = session
        .metadata
        .get("email")
        .cloned()
        .or_else(|| session.customer_email.clone())
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("checkout session has no email"))?;
    let credits = session
        .metadata
        .get("credits")
        .and_then(|c| c.trim().parse::<u32>().ok())
        .filter(|c| *c > 0)
        .ok_or_else(|| anyhow::anyhow!("checkout session has no credit amount"))?;
    let tier = session
        .metadata
        .get("tier")
        .and_then(|t| tier_from_code(t))
        .or_else(|| {
            session
                .metadata
                .get("package")
                .and_then(|p| package(p))
                .map(|p| p.tier)
        })
        .unwrap_or(Tier::Standard);
    Ok(PaidCheckout {
        session_id: session.id.clone(),
        email,
        credits,
        tier,
    })
}

/// Reads `session_id`, `email`, `credits` and `payment` from a return URL or its query string.
pub fn parse_return_query(query: &str) -> ReturnParams {
    let query = query.trim();
    let query = match query.split_once('?') {
        Some((_, q)) => q,
        None => query,
    };
    let Ok(url) = Url::parse(&format!("http://return.local/?{query}")) else {
        return ReturnParams::default();
    };
    let mut out = ReturnParams::default();
    for (key, value) in url.query_pairs() {
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "session_id" => out.session_id = Some(value),
            "email" => out.email = Some(value),
            "credits" => out.credits = value.parse().ok(),
            "payment" => out.payment = Some(value),
            _ => {}
        }
    }
    out
}
