use std::env;
use std::path::PathBuf;
use std::time::Duration;

const RENDER_DATA_DIR: &str = "/opt/render/project/src/data";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    Optimized,
    Enhanced,
}

#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub llm_timeout: Duration,
    pub footystats_api_key: Option<String>,
    pub api_football_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_success_url: String,
    pub stripe_cancel_url: String,
    pub smtp: Option<SmtpConfig>,
    pub admin_password: Option<String>,
    pub value_threshold: f64,
    pub stats_cache_max_age: Duration,
    pub list_cache_max_age: Duration,
    pub scrape_retries: u32,
    pub scrape_backoff: Duration,
    pub prompt_style: PromptStyle,
}

impl AppConfig {
    /// Loads `.env.local` and `.env` (if present) and reads the environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_current_env()
    }

    pub fn from_current_env() -> Self {
        let data_dir = env_opt("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                if env_bool("RENDER", false) {
                    PathBuf::from(RENDER_DATA_DIR)
                } else {
                    PathBuf::from("data")
                }
            });

        let smtp = match (env_opt("SMTP_HOST"), env_opt("SMTP_USER"), env_opt("SMTP_PASSWORD")) {
            (Some(host), Some(user), Some(password)) => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT", 587u16),
                from: env_opt("SMTP_FROM").unwrap_or_else(|| user.clone()),
                user,
                password,
            }),
            _ => None,
        };

        let prompt_style = match env_opt("PROMPT_STYLE")
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            Some("enhanced") => PromptStyle::Enhanced,
            _ => PromptStyle::Optimized,
        };

        Self {
            data_dir,
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_opt("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: env_opt("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            llm_timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", 60u64).clamp(5, 300)),
            footystats_api_key: env_opt("FOOTYSTATS_API_KEY"),
            api_football_key: env_opt("API_FOOTBALL_KEY"),
            stripe_secret_key: env_opt("STRIPE_SECRET_KEY"),
            stripe_success_url: env_opt("STRIPE_SUCCESS_URL")
                .unwrap_or_else(|| "http://localhost:8501/?payment=success".to_string()),
            stripe_cancel_url: env_opt("STRIPE_CANCEL_URL")
                .unwrap_or_else(|| "http://localhost:8501/?payment=cancelled".to_string()),
            smtp,
            admin_password: env_opt("ADMIN_PASSWORD"),
            value_threshold: env_parse("VALUE_THRESHOLD", 5.0f64).clamp(0.0, 50.0),
            stats_cache_max_age: Duration::from_secs(
                env_parse("STATS_CACHE_HOURS", 6u64).clamp(1, 72) * 3600,
            ),
            list_cache_max_age: Duration::from_secs(
                env_parse("LIST_CACHE_HOURS", 24u64).clamp(1, 168) * 3600,
            ),
            scrape_retries: env_parse("SCRAPE_RETRIES", 3u32).clamp(1, 10),
            scrape_backoff: Duration::from_millis(env_parse("SCRAPE_BACKOFF_MS", 1500u64).min(30_000)),
            prompt_style,
        }
    }

    /// Configuration with no credentials and default tuning, rooted at `data_dir`.
    pub fn offline(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            llm_timeout: Duration::from_secs(60),
            footystats_api_key: None,
            api_football_key: None,
            stripe_secret_key: None,
            stripe_success_url: "http://localhost:8501/?payment=success".to_string(),
            stripe_cancel_url: "http://localhost:8501/?payment=cancelled".to_string(),
            smtp: None,
            admin_password: None,
            value_threshold: 5.0,
            stats_cache_max_age: Duration::from_secs(6 * 3600),
            list_cache_max_age: Duration::from_secs(24 * 3600),
            scrape_retries: 3,
            scrape_backoff: Duration::from_millis(1500),
            prompt_style: PromptStyle::Optimized,
        }
    }

    pub fn user_data_path(&self) -> PathBuf {
        self.data_dir.join("user_data.json")
    }

    pub fn api_cache_dir(&self) -> PathBuf {
        self.data_dir.join("api_cache")
    }

    pub fn html_cache_dir(&self) -> PathBuf {
        self.data_dir.join("html_cache")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.data_dir.join("outbox")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

pub fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
