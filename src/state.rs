use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::billing::{CheckoutSession, PaidCheckout, parse_return_query};
use crate::config::AppConfig;
use crate::export::{export_analysis_xlsx, export_users_xlsx};
use crate::odds_input::parse_odds_line;
use crate::pipeline::{AnalysisOutcome, AnalysisRequest, SourceSpec};
use crate::users::{AccountError, PACKAGES, UserManager, admin_password_matches};

const MAX_LOGS: usize = 200;
pub const DEFAULT_FBREF_URL: &str = "https://fbref.com/en/comps/9/Premier-League-Stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Verify,
    Dashboard,
    Packages,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    SignIn,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Fbref,
    FootyStats,
    ApiFootball,
    Fixture,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Fbref => "FBref",
            SourceKind::FootyStats => "FootyStats",
            SourceKind::ApiFootball => "API-Football",
            SourceKind::Fixture => "Fixture file",
        }
    }

    /// What the "Source" field should contain for this provider.
    pub fn hint(self) -> &'static str {
        match self {
            SourceKind::Fbref => "FBref squad stats URL",
            SourceKind::FootyStats => "season id, e.g. 9660",
            SourceKind::ApiFootball => "league/season, e.g. 39/2024",
            SourceKind::Fixture => "path to a stats JSON file",
        }
    }

    pub fn next(self) -> Self {
        match self {
            SourceKind::Fbref => SourceKind::FootyStats,
            SourceKind::FootyStats => SourceKind::ApiFootball,
            SourceKind::ApiFootball => SourceKind::Fixture,
            SourceKind::Fixture => SourceKind::Fbref,
        }
    }

    pub fn spec(self, arg: &str) -> Result<SourceSpec, String> {
        let arg = arg.trim();
        match self {
            SourceKind::Fbref => {
                let url = if arg.is_empty() { DEFAULT_FBREF_URL } else { arg };
                if !url.starts_with("http") {
                    return Err("FBref source must be an http(s) URL".to_string());
                }
                Ok(SourceSpec::Fbref {
                    url: url.to_string(),
                })
            }
            SourceKind::FootyStats => arg
                .parse::<u32>()
                .map(|season_id| SourceSpec::FootyStats { season_id })
                .map_err(|_| "FootyStats source needs a numeric season id".to_string()),
            SourceKind::ApiFootball => {
                let parsed = arg
                    .split_once(['/', ' ', ','])
                    .and_then(|(l, s)| Some((l.trim().parse::<u32>().ok()?, s.trim().parse::<u32>().ok()?)));
                match parsed {
                    Some((league_id, season)) => Ok(SourceSpec::ApiFootball { league_id, season }),
                    None => Err("API-Football source needs league/season, e.g. 39/2024".to_string()),
                }
            }
            SourceKind::Fixture => {
                if arg.is_empty() {
                    return Err("fixture source needs a file path".to_string());
                }
                Ok(SourceSpec::Fixture {
                    path: PathBuf::from(arg),
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub label: &'static str,
    pub value: String,
    pub secret: bool,
}

/// A column of single-line text inputs with one focused field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub fields: Vec<FormField>,
    pub focus: usize,
}

impl Form {
    pub fn new(fields: &[(&'static str, bool)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|&(label, secret)| FormField {
                    label,
                    value: String::new(),
                    secret,
                })
                .collect(),
            focus: 0,
        }
    }

    pub fn value(&self, idx: usize) -> &str {
        self.fields.get(idx).map(|f| f.value.trim()).unwrap_or_default()
    }

    pub fn set(&mut self, idx: usize, value: impl Into<String>) {
        if let Some(field) = self.fields.get_mut(idx) {
            field.value = value.into();
        }
    }

    pub fn next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
    }

    pub fn push_char(&mut self, c: char) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.pop();
        }
    }

    pub fn clear_secrets(&mut self) {
        for field in self.fields.iter_mut().filter(|f| f.secret) {
            field.value.clear();
        }
    }
}

// Field indices.
pub const LOGIN_EMAIL: usize = 0;
pub const LOGIN_PASSWORD: usize = 1;
pub const REGISTER_NAME: usize = 0;
pub const REGISTER_EMAIL: usize = 1;
pub const REGISTER_PASSWORD: usize = 2;
pub const ANALYSIS_LEAGUE: usize = 0;
pub const ANALYSIS_HOME: usize = 1;
pub const ANALYSIS_AWAY: usize = 2;
pub const ANALYSIS_ODDS: usize = 3;
pub const ANALYSIS_SOURCE: usize = 4;

/// Work handed to the background worker.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    Analyze {
        email: String,
        request: AnalysisRequest,
    },
    CreateCheckout {
        email: String,
        package_id: &'static str,
    },
    ConfirmCheckout {
        session_id: String,
    },
    SendVerification {
        email: String,
        name: String,
        code: String,
    },
}

/// Results coming back from the worker.
#[derive(Debug, Clone)]
pub enum Delta {
    Log(String),
    AnalysisDone {
        email: String,
        outcome: Box<AnalysisOutcome>,
    },
    AnalysisFailed(String),
    CheckoutCreated(CheckoutSession),
    CheckoutFailed(String),
    PaymentConfirmed(PaidCheckout),
    PaymentRejected(String),
    VerificationSent {
        email: String,
    },
    VerificationFailed {
        email: String,
        error: String,
    },
}

pub struct AppState {
    pub screen: Screen,
    pub users: UserManager,
    pub current_user: Option<String>,
    pub login_mode: LoginMode,
    pub login_form: Form,
    pub register_form: Form,
    pub verify_form: Form,
    pub pending_verification: Option<String>,
    pub analysis_form: Form,
    pub source_kind: SourceKind,
    pub use_llm: bool,
    pub busy: bool,
    pub last_outcome: Option<AnalysisOutcome>,
    pub results_scroll: u16,
    pub selected_package: usize,
    pub pending_checkout: Option<CheckoutSession>,
    pub confirm_form: Form,
    pub admin_password: Option<String>,
    pub admin_unlocked: bool,
    pub admin_form: Form,
    pub admin_selected: usize,
    pub export_dir: PathBuf,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl AppState {
    pub fn new(cfg: &AppConfig) -> Result<Self, AccountError> {
        let users = UserManager::load(cfg.user_data_path())?;
        let mut state = Self::with_users(users, cfg.admin_password.clone(), cfg.export_dir());
        state.source_kind = if cfg.footystats_api_key.is_some() {
            SourceKind::FootyStats
        } else if cfg.api_football_key.is_some() {
            SourceKind::ApiFootball
        } else {
            SourceKind::Fbref
        };
        state.use_llm = cfg.openai_api_key.is_some();
        Ok(state)
    }

    pub fn with_users(users: UserManager, admin_password: Option<String>, export_dir: PathBuf) -> Self {
        Self {
            screen: Screen::Login,
            users,
            current_user: None,
            login_mode: LoginMode::SignIn,
            login_form: Form::new(&[("Email", false), ("Password", true)]),
            register_form: Form::new(&[("Name", false), ("Email", false), ("Password", true)]),
            verify_form: Form::new(&[("Verification code", false)]),
            pending_verification: None,
            analysis_form: Form::new(&[
                ("League", false),
                ("Home team", false),
                ("Away team", false),
                ("Odds", false),
                ("Source", false),
            ]),
            source_kind: SourceKind::Fbref,
            use_llm: false,
            busy: false,
            last_outcome: None,
            results_scroll: 0,
            selected_package: 0,
            pending_checkout: None,
            confirm_form: Form::new(&[("Session id or return URL", false)]),
            admin_password,
            admin_unlocked: false,
            admin_form: Form::new(&[("Admin password", true), ("Grant credits", false)]),
            admin_selected: 0,
            export_dir,
            logs: VecDeque::new(),
            help_overlay: false,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    /// The form that receives typed characters on the current screen.
    pub fn active_form(&mut self) -> Option<&mut Form> {
        match self.screen {
            Screen::Login => Some(match self.login_mode {
                LoginMode::SignIn => &mut self.login_form,
                LoginMode::Register => &mut self.register_form,
            }),
            Screen::Verify => Some(&mut self.verify_form),
            Screen::Dashboard => Some(&mut self.analysis_form),
            Screen::Packages => Some(&mut self.confirm_form),
            Screen::Admin => Some(&mut self.admin_form),
        }
    }

    pub fn credits(&self) -> Option<u32> {
        let email = self.current_user.as_deref()?;
        self.users.credits_remaining(email).ok()
    }

    pub fn toggle_login_mode(&mut self) {
        self.login_mode = match self.login_mode {
            LoginMode::SignIn => LoginMode::Register,
            LoginMode::Register => LoginMode::SignIn,
        };
    }

    pub fn submit_login(&mut self) {
        let email = self.login_form.value(LOGIN_EMAIL).to_string();
        let password = self.login_form.value(LOGIN_PASSWORD).to_string();
        self.login_form.clear_secrets();
        match self.users.authenticate(&email, &password) {
            Ok(account) => {
                self.push_log(format!(
                    "[INFO] Welcome back {} ({} credits)",
                    account.name,
                    account.credits_remaining()
                ));
                self.current_user = Some(account.email);
                self.screen = Screen::Dashboard;
            }
            Err(AccountError::Unverified) => {
                self.push_log("[WARN] Email not verified yet; enter the code we sent");
                self.pending_verification = Some(email);
                self.screen = Screen::Verify;
            }
            Err(err) => self.push_log(format!("[WARN] Login failed: {err}")),
        }
    }

    /// Creates the account and asks the worker to mail the code.
    pub fn submit_register(&mut self) -> Option<WorkerCommand> {
        let name = self.register_form.value(REGISTER_NAME).to_string();
        let email = self.register_form.value(REGISTER_EMAIL).to_string();
        let password = self.register_form.value(REGISTER_PASSWORD).to_string();
        self.register_form.clear_secrets();
        match self.users.register(&email, &password, &name) {
            Ok(code) => {
                let account = self.users.get(&email)?;
                let (email, name) = (account.email.clone(), account.name.clone());
                self.push_log(format!("[INFO] Account created for {email}; sending verification code"));
                self.pending_verification = Some(email.clone());
                self.screen = Screen::Verify;
                Some(WorkerCommand::SendVerification { email, name, code })
            }
            Err(err) => {
                self.push_log(format!("[WARN] Registration failed: {err}"));
                None
            }
        }
    }

    pub fn submit_verification(&mut self) {
        let Some(email) = self.pending_verification.clone() else {
            self.screen = Screen::Login;
            return;
        };
        let code = self.verify_form.value(0).to_string();
        match self.users.verify(&email, &code) {
            Ok(()) => {
                self.verify_form.set(0, "");
                self.pending_verification = None;
                self.push_log(format!("[INFO] {email} verified; you can sign in now"));
                self.login_mode = LoginMode::SignIn;
                self.login_form.set(LOGIN_EMAIL, email);
                self.screen = Screen::Login;
            }
            Err(err) => self.push_log(format!("[WARN] Verification failed: {err}")),
        }
    }

    pub fn resend_verification(&mut self) -> Option<WorkerCommand> {
        let email = self.pending_verification.clone()?;
        match self.users.regenerate_code(&email) {
            Ok(code) => {
                let name = self.users.get(&email).map(|a| a.name.clone()).unwrap_or_default();
                self.push_log("[INFO] New verification code requested");
                Some(WorkerCommand::SendVerification { email, name, code })
            }
            Err(err) => {
                self.push_log(format!("[WARN] Could not issue a new code: {err}"));
                None
            }
        }
    }

    pub fn logout(&mut self) {
        if let Some(email) = self.current_user.take() {
            self.push_log(format!("[INFO] Signed out {email}"));
        }
        self.admin_unlocked = false;
        self.admin_form.clear_secrets();
        self.screen = Screen::Login;
    }

    /// Validates the dashboard form and the credit balance, then builds the worker command.
    pub fn submit_analysis(&mut self) -> Option<WorkerCommand> {
        if self.busy {
            self.push_log("[INFO] Analysis already running");
            return None;
        }
        let Some(email) = self.current_user.clone() else {
            self.push_log("[WARN] Sign in first");
            return None;
        };
        let form = &self.analysis_form;
        let home = form.value(ANALYSIS_HOME).to_string();
        let away = form.value(ANALYSIS_AWAY).to_string();
        let odds_line = form.value(ANALYSIS_ODDS).to_string();
        let league = form.value(ANALYSIS_LEAGUE).to_string();
        let source_arg = form.value(ANALYSIS_SOURCE).to_string();

        if home.is_empty() || away.is_empty() {
            self.push_log("[WARN] Enter both team names");
            return None;
        }
        let parsed = parse_odds_line(&odds_line);
        for w in &parsed.warnings {
            self.push_log(format!("[WARN] Odds: {w}"));
        }
        let markets = parsed.odds.len() as u32;
        if markets == 0 {
            self.push_log("[WARN] Enter at least one market, e.g. 1=2.10 X=3.40 2=3.60 O2.5=1.90");
            return None;
        }
        let available = self.users.credits_remaining(&email).unwrap_or(0);
        if markets > available {
            self.push_log(format!(
                "[WARN] {markets} markets need {markets} credits; you have {available}. Buy a package (F3)"
            ));
            return None;
        }
        let source = match self.source_kind.spec(&source_arg) {
            Ok(s) => s,
            Err(err) => {
                self.push_log(format!("[WARN] {err}"));
                return None;
            }
        };

        self.busy = true;
        self.push_log(format!("[INFO] Analysing {home} vs {away} ({markets} markets)"));
        Some(WorkerCommand::Analyze {
            email,
            request: AnalysisRequest {
                league,
                home,
                away,
                odds_line,
                source,
                use_llm: self.use_llm,
            },
        })
    }

    pub fn select_package(&mut self, delta: isize) {
        let len = PACKAGES.len() as isize;
        self.selected_package = (self.selected_package as isize + delta).rem_euclid(len) as usize;
    }

    pub fn start_checkout(&mut self) -> Option<WorkerCommand> {
        let email = self.current_user.clone()?;
        let pack = PACKAGES.get(self.selected_package)?;
        self.push_log(format!("[INFO] Creating checkout for {}", pack.name));
        Some(WorkerCommand::CreateCheckout {
            email,
            package_id: pack.id,
        })
    }

    /// Accepts a bare session id or the full return URL Stripe redirected to.
    pub fn confirm_checkout(&mut self) -> Option<WorkerCommand> {
        let raw = self.confirm_form.value(0).to_string();
        let session_id = if raw.contains("session_id=") {
            parse_return_query(&raw).session_id
        } else if !raw.is_empty() {
            Some(raw)
        } else {
            self.pending_checkout.as_ref().map(|s| s.id.clone())
        };
        let Some(session_id) = session_id else {
            self.push_log("[WARN] No checkout session to confirm");
            return None;
        };
        self.push_log(format!("[INFO] Checking payment {session_id}"));
        Some(WorkerCommand::ConfirmCheckout { session_id })
    }

    pub fn unlock_admin(&mut self) {
        let attempt = self.admin_form.value(0).to_string();
        self.admin_form.clear_secrets();
        if admin_password_matches(self.admin_password.as_deref(), &attempt) {
            self.admin_unlocked = true;
            self.admin_form.focus = 1;
            self.push_log("[INFO] Admin panel unlocked");
        } else if self.admin_password.is_none() {
            self.push_log("[WARN] Admin panel disabled: ADMIN_PASSWORD is not set");
        } else {
            self.push_log("[WARN] Wrong admin password");
        }
    }

    pub fn admin_selected_email(&self) -> Option<String> {
        self.users
            .list()
            .get(self.admin_selected)
            .map(|u| u.email.clone())
    }

    pub fn admin_move(&mut self, delta: isize) {
        let len = self.users.list().len();
        if len == 0 {
            self.admin_selected = 0;
            return;
        }
        self.admin_selected = (self.admin_selected as isize + delta).rem_euclid(len as isize) as usize;
    }

    pub fn admin_grant_credits(&mut self) {
        if !self.admin_unlocked {
            return;
        }
        let Some(email) = self.admin_selected_email() else {
            return;
        };
        let Ok(credits) = self.admin_form.value(1).parse::<u32>() else {
            self.push_log("[WARN] Enter a whole number of credits to grant");
            return;
        };
        match self.users.add_credits(&email, credits) {
            Ok(remaining) => {
                self.admin_form.set(1, "");
                self.push_log(format!("[INFO] Granted {credits} credits to {email} ({remaining} left)"));
            }
            Err(err) => self.push_log(format!("[WARN] Grant failed: {err}")),
        }
    }

    pub fn admin_delete_selected(&mut self) {
        if !self.admin_unlocked {
            return;
        }
        let Some(email) = self.admin_selected_email() else {
            return;
        };
        if self.current_user.as_deref() == Some(email.as_str()) {
            self.push_log("[WARN] Refusing to delete the signed-in account");
            return;
        }
        match self.users.delete(&email) {
            Ok(_) => {
                self.push_log(format!("[INFO] Deleted {email}"));
                self.admin_move(0);
            }
            Err(err) => self.push_log(format!("[WARN] Delete failed: {err}")),
        }
    }

    pub fn export_users(&mut self) -> Option<PathBuf> {
        if !self.admin_unlocked {
            return None;
        }
        let path = self.export_dir.join(format!("users_{}.xlsx", Utc::now().format("%Y%m%d_%H%M%S")));
        let users = self.users.list();
        match export_users_xlsx(&path, &users) {
            Ok(report) => {
                self.push_log(format!("[INFO] Exported {} users to {}", report.rows, path.display()));
                Some(path)
            }
            Err(err) => {
                self.push_log(format!("[WARN] Export failed: {err:#}"));
                None
            }
        }
    }

    pub fn export_last_analysis(&mut self) -> Option<PathBuf> {
        let Some(outcome) = &self.last_outcome else {
            self.push_log("[INFO] Nothing to export yet");
            return None;
        };
        let path = analysis_export_path(&self.export_dir, outcome);
        match export_analysis_xlsx(&path, outcome) {
            Ok(_) => {
                self.push_log(format!("[INFO] Analysis exported to {}", path.display()));
                Some(path)
            }
            Err(err) => {
                self.push_log(format!("[WARN] Export failed: {err:#}"));
                None
            }
        }
    }
}

pub fn analysis_export_path(dir: &Path, outcome: &AnalysisOutcome) -> PathBuf {
    let slug = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect()
    };
    dir.join(format!(
        "{}_vs_{}_{}.xlsx",
        slug(&outcome.home.name),
        slug(&outcome.away.name),
        outcome.generated_at.format("%Y%m%d_%H%M%S")
    ))
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::Log(msg) => state.push_log(msg),
        Delta::AnalysisDone { email, outcome } => {
            state.busy = false;
            let markets = outcome.credits_due();
            if markets == 0 {
                state.push_log(format!(
                    "[WARN] No statistics for {}; no credits charged",
                    outcome.stats_missing.join(" or ")
                ));
            }
            match state.users.register_usage(&email, markets) {
                Ok(remaining) => state.push_log(format!(
                    "[INFO] Analysis ready: {} value bets, {markets} credits used, {remaining} left",
                    outcome.opportunities.len()
                )),
                Err(err) => state.push_log(format!("[WARN] Could not record usage: {err}")),
            }
            for w in &outcome.warnings {
                state.push_log(format!("[WARN] {w}"));
            }
            state.results_scroll = 0;
            state.last_outcome = Some(*outcome);
        }
        Delta::AnalysisFailed(err) => {
            state.busy = false;
            state.push_log(format!("[WARN] Analysis failed: {err}"));
        }
        Delta::CheckoutCreated(session) => {
            match &session.url {
                Some(url) => state.push_log(format!("[INFO] Complete payment at {url}")),
                None => state.push_log(format!("[INFO] Checkout {} created", session.id)),
            }
            state.confirm_form.set(0, session.id.clone());
            state.pending_checkout = Some(session);
        }
        Delta::CheckoutFailed(err) => state.push_log(format!("[WARN] Checkout failed: {err}")),
        Delta::PaymentConfirmed(paid) => {
            match state
                .users
                .apply_purchase(&paid.email, &paid.session_id, paid.credits, paid.tier)
            {
                Ok(true) => state.push_log(format!(
                    "[INFO] Payment received: {} credits added to {}",
                    paid.credits, paid.email
                )),
                Ok(false) => state.push_log(format!(
                    "[INFO] Payment {} was already credited",
                    paid.session_id
                )),
                Err(err) => state.push_log(format!("[WARN] Could not credit payment: {err}")),
            }
            if state
                .pending_checkout
                .as_ref()
                .is_some_and(|s| s.id == paid.session_id)
            {
                state.pending_checkout = None;
                state.confirm_form.set(0, "");
            }
        }
        Delta::PaymentRejected(err) => state.push_log(format!("[WARN] Payment not confirmed: {err}")),
        Delta::VerificationSent { email } => {
            state.push_log(format!("[INFO] Verification code sent to {email}"))
        }
        Delta::VerificationFailed { email, error } => state.push_log(format!(
            "[WARN] Could not send the code to {email}: {error}. Use F5 to retry"
        )),
    }
}
