use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

pub const FREE_CREDITS: u32 = 5;
pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;
const MIN_PASSWORD_LEN: usize = 6;
const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("an account already exists for {0}")]
    AlreadyRegistered(String),
    #[error("no account for {0}")]
    UnknownUser(String),
    #[error("wrong password")]
    BadPassword,
    #[error("email not verified yet")]
    Unverified,
    #[error("wrong verification code")]
    BadCode,
    #[error("not enough credits: {needed} needed, {available} left")]
    InsufficientCredits { needed: u32, available: u32 },
    #[error("user store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("user store is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Standard,
    Pro,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Standard => "Standard",
            Tier::Pro => "Pro",
        }
    }
}

/// A credit pack sold through Stripe Checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    pub id: &'static str,
    pub name: &'static str,
    pub tier: Tier,
    pub credits: u32,
    /// EUR cents.
    pub price_cents: u32,
}

pub const PACKAGES: [Package; 2] = [
    Package {
        id: "standard",
        name: "Standard pack",
        tier: Tier::Standard,
        credits: 30,
        price_cents: 1499,
    },
    Package {
        id: "pro",
        name: "Pro pack",
        tier: Tier::Pro,
        credits: 60,
        price_cents: 2499,
    },
];

pub fn package(id: &str) -> Option<&'static Package> {
    PACKAGES.iter().find(|p| p.id.eq_ignore_ascii_case(id.trim()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub at: DateTime<Utc>,
    pub markets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub free_credits: u32,
    #[serde(default)]
    pub purchased_credits: u32,
    #[serde(default)]
    pub usage: Vec<UsageEntry>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verification_code: Option<String>,
    #[serde(default)]
    pub processed_sessions: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl UserAccount {
    pub fn credits_used(&self) -> u32 {
        self.usage.iter().map(|u| u.markets).sum()
    }

    pub fn credits_remaining(&self) -> u32 {
        (self.free_credits + self.purchased_credits).saturating_sub(self.credits_used())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageStats {
    pub analyses: usize,
    pub markets: u32,
    pub credits_remaining: u32,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserFile {
    version: u32,
    users: BTreeMap<String, UserAccount>,
}

/// JSON-backed account store. The whole file is rewritten after every change.
pub struct UserManager {
    path: PathBuf,
    data: UserFile,
    hash_iterations: u32,
}

impl UserManager {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AccountError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => UserFile::default(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => UserFile::default(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), users = data.users.len(), "user store loaded");
        Ok(Self {
            path,
            data,
            hash_iterations: DEFAULT_HASH_ITERATIONS,
        })
    }

    /// Cheaper hashing for tests; existing hashes keep their own iteration count.
    pub fn with_hash_iterations(mut self, iterations: u32) -> Self {
        self.hash_iterations = iterations.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, email: &str) -> Option<&UserAccount> {
        self.data.users.get(&normalize_email(email))
    }

    /// Creates an unverified free account and returns its verification code.
    pub fn register(&mut self, email: &str, password: &str, name: &str) -> Result<String, AccountError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AccountError::InvalidEmail(email));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::WeakPassword);
        }
        if self.data.users.contains_key(&email) {
            return Err(AccountError::AlreadyRegistered(email));
        }

        let code = verification_code();
        let name = if name.trim().is_empty() {
            email.split('@').next().unwrap_or_default().to_string()
        } else {
            name.trim().to_string()
        };
        let account = UserAccount {
            email: email.clone(),
            password_hash: hash_password(password, self.hash_iterations),
            name,
            tier: Tier::Free,
            free_credits: FREE_CREDITS,
            purchased_credits: 0,
            usage: Vec::new(),
            verified: false,
            verification_code: Some(code.clone()),
            processed_sessions: Vec::new(),
            created_at: Utc::now(),
            last_login: None,
        };
        self.data.users.insert(email.clone(), account);
        self.save()?;
        info!(%email, "account registered");
        Ok(code)
    }

    pub fn authenticate(&mut self, email: &str, password: &str) -> Result<UserAccount, AccountError> {
        let account = self.account_mut(email)?;
        if !verify_password(password, &account.password_hash) {
            warn!(email = %account.email, "failed login");
            return Err(AccountError::BadPassword);
        }
        if !account.verified {
            return Err(AccountError::Unverified);
        }
        account.last_login = Some(Utc::now());
        let snapshot = account.clone();
        self.save()?;
        Ok(snapshot)
    }

    pub fn verify(&mut self, email: &str, code: &str) -> Result<(), AccountError> {
        let account = self.account_mut(email)?;
        if account.verified {
            return Ok(());
        }
        if account.verification_code.as_deref() != Some(code.trim()) {
            return Err(AccountError::BadCode);
        }
        account.verified = true;
        account.verification_code = None;
        self.save()
    }

    pub fn regenerate_code(&mut self, email: &str) -> Result<String, AccountError> {
        let account = self.account_mut(email)?;
        let code = verification_code();
        account.verification_code = Some(code.clone());
        account.verified = false;
        self.save()?;
        Ok(code)
    }

    pub fn credits_remaining(&self, email: &str) -> Result<u32, AccountError> {
        self.account(email).map(UserAccount::credits_remaining)
    }

    /// Charges one credit per analysed market; refuses when the balance is short.
    pub fn register_usage(&mut self, email: &str, markets: u32) -> Result<u32, AccountError> {
        let account = self.account_mut(email)?;
        let available = account.credits_remaining();
        if markets > available {
            return Err(AccountError::InsufficientCredits {
                needed: markets,
                available,
            });
        }
        if markets == 0 {
            return Ok(available);
        }
        account.usage.push(UsageEntry {
            at: Utc::now(),
            markets,
        });
        let remaining = account.credits_remaining();
        self.save()?;
        Ok(remaining)
    }

    pub fn add_credits(&mut self, email: &str, credits: u32) -> Result<u32, AccountError> {
        let account = self.account_mut(email)?;
        account.purchased_credits = account.purchased_credits.saturating_add(credits);
        let remaining = account.credits_remaining();
        self.save()?;
        info!(email = %normalize_email(email), credits, "credits granted");
        Ok(remaining)
    }

    /// Grants a paid checkout once. Returns `false` when `session_id` was already applied.
    pub fn apply_purchase(
        &mut self,
        email: &str,
        session_id: &str,
        credits: u32,
        tier: Tier,
    ) -> Result<bool, AccountError> {
        let account = self.account_mut(email)?;
        if account.processed_sessions.iter().any(|s| s == session_id) {
            return Ok(false);
        }
        account.processed_sessions.push(session_id.to_string());
        account.purchased_credits = account.purchased_credits.saturating_add(credits);
        if tier > account.tier {
            account.tier = tier;
        }
        self.save()?;
        info!(email = %normalize_email(email), session_id, credits, "purchase applied");
        Ok(true)
    }

    pub fn delete(&mut self, email: &str) -> Result<UserAccount, AccountError> {
        let key = normalize_email(email);
        let removed = self
            .data
            .users
            .remove(&key)
            .ok_or(AccountError::UnknownUser(key))?;
        self.save()?;
        Ok(removed)
    }

    /// All accounts, ordered by email.
    pub fn list(&self) -> Vec<&UserAccount> {
        self.data.users.values().collect()
    }

    pub fn usage_stats(&self, email: &str) -> Result<UsageStats, AccountError> {
        let account = self.account(email)?;
        Ok(UsageStats {
            analyses: account.usage.len(),
            markets: account.credits_used(),
            credits_remaining: account.credits_remaining(),
            last_used: account.usage.iter().map(|u| u.at).max(),
        })
    }

    fn account(&self, email: &str) -> Result<&UserAccount, AccountError> {
        let key = normalize_email(email);
        self.data
            .users
            .get(&key)
            .ok_or(AccountError::UnknownUser(key))
    }

    fn account_mut(&mut self, email: &str) -> Result<&mut UserAccount, AccountError> {
        let key = normalize_email(email);
        self.data
            .users
            .get_mut(&key)
            .ok_or(AccountError::UnknownUser(key))
    }

    fn save(&mut self) -> Result<(), AccountError> {
        self.data.version = STORE_VERSION;
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

fn verification_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

/// `pbkdf2$<iterations>$<base64 salt>$<base64 hash>` with HMAC-SHA256.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill(&mut salt[..]);
    let mut hash = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut hash);
    format!(
        "pbkdf2${iterations}${}${}",
        BASE64.encode(salt),
        BASE64.encode(hash)
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some("pbkdf2"), Some(iters), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iters.parse::<u32>(),
        BASE64.decode(salt),
        BASE64.decode(hash),
    ) else {
        return false;
    };
    if iterations == 0 || expected.is_empty() {
        return false;
    }
    let mut actual = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut actual);
    actual
        .iter()
        .zip(&expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Admin access needs `ADMIN_PASSWORD` configured; there is no built-in default.
pub fn admin_password_matches(configured: Option<&str>, attempt: &str) -> bool {
    match configured {
        Some(expected) if !expected.is_empty() => {
            expected.len() == attempt.len()
                && expected
                    .bytes()
                    .zip(attempt.bytes())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trips() {
        let stored = hash_password("hunter22", 1_000);
        assert!(stored.starts_with("pbkdf2$1000$"));
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
        assert!(!verify_password("hunter22", "plain-text"));
    }

    #[test]
    fn verification_codes_are_six_digits() {
        for _ in 0..20 {
            let code = verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn admin_password_requires_configuration() {
        assert!(!admin_password_matches(None, ""));
        assert!(!admin_password_matches(Some(""), ""));
        assert!(admin_password_matches(Some("s3cret"), "s3cret"));
        assert!(!admin_password_matches(Some("s3cret"), "s3cre"));
    }

    #[test]
    fn email_validation() {
        assert!(valid_email("a@b.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("@b.co"));
        assert!(!valid_email("a b@c.de"));
    }
}
