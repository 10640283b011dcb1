use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use footy_value::billing::{CheckoutSession, PaidCheckout};
use footy_value::llm::StaticModel;
use footy_value::pipeline::{AnalysisRequest, FixtureSource, PipelineConfig, SourceSpec, run_analysis};
use footy_value::config::PromptStyle;
use footy_value::state::{
    ANALYSIS_AWAY, ANALYSIS_HOME, ANALYSIS_ODDS, ANALYSIS_SOURCE, AppState, Delta, LOGIN_EMAIL,
    LOGIN_PASSWORD, REGISTER_EMAIL, REGISTER_NAME, REGISTER_PASSWORD, Screen, SourceKind,
    WorkerCommand, apply_delta,
};
use footy_value::users::{FREE_CREDITS, Tier, UserManager};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("footy_value_state_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("match_fixture.json")
}

fn new_state(name: &str) -> AppState {
    let dir = temp_dir(name);
    let users = UserManager::load(dir.join("user_data.json"))
        .unwrap()
        .with_hash_iterations(10);
    AppState::with_users(users, Some("letmein".to_string()), dir.join("exports"))
}

/// Registers, verifies and signs in `fan@example.com`.
fn signed_in_state(name: &str) -> AppState {
    let mut state = new_state(name);
    state.toggle_login_mode();
    state.register_form.set(REGISTER_NAME, "Fan");
    state.register_form.set(REGISTER_EMAIL, "fan@example.com");
    state.register_form.set(REGISTER_PASSWORD, "hunter22");
    let Some(WorkerCommand::SendVerification { code, .. }) = state.submit_register() else {
        panic!("registration should request a verification mail");
    };
    state.verify_form.set(0, code);
    state.submit_verification();
    state.login_form.set(LOGIN_PASSWORD, "hunter22");
    state.submit_login();
    assert_eq!(state.screen, Screen::Dashboard);
    state
}

fn fill_analysis(state: &mut AppState, odds: &str) {
    state.source_kind = SourceKind::Fixture;
    state.analysis_form.set(ANALYSIS_HOME, "Liverpool");
    state.analysis_form.set(ANALYSIS_AWAY, "Manchester Utd");
    state.analysis_form.set(ANALYSIS_ODDS, odds);
    state
        .analysis_form
        .set(ANALYSIS_SOURCE, fixture_path().display().to_string());
}

#[test]
fn registration_flow_reaches_dashboard() {
    let state = signed_in_state("register");
    assert_eq!(state.current_user.as_deref(), Some("fan@example.com"));
    assert_eq!(state.credits(), Some(FREE_CREDITS));
    assert_eq!(state.login_form.value(LOGIN_EMAIL), "fan@example.com");
    // Secrets are cleared once submitted.
    assert_eq!(state.login_form.value(LOGIN_PASSWORD), "");
}

#[test]
fn unverified_login_goes_to_verify_screen() {
    let mut state = new_state("unverified");
    state.users.register("late@example.com", "hunter22", "Late").unwrap();
    state.login_form.set(LOGIN_EMAIL, "late@example.com");
    state.login_form.set(LOGIN_PASSWORD, "hunter22");
    state.submit_login();
    assert_eq!(state.screen, Screen::Verify);
    assert_eq!(state.pending_verification.as_deref(), Some("late@example.com"));
    assert!(matches!(
        state.resend_verification(),
        Some(WorkerCommand::SendVerification { .. })
    ));
}

#[test]
fn analysis_is_refused_without_enough_credits() {
    let mut state = signed_in_state("credits");
    fill_analysis(&mut state, "1=1.70 X=3.90 2=4.80 O2.5=1.80 U2.5=2.00 BTTS=1.75");
    assert!(state.submit_analysis().is_none());
    assert!(!state.busy);
    assert!(state.logs.back().is_some_and(|l| l.contains("credits")));
}

#[test]
fn analysis_done_charges_per_market() {
    let mut state = signed_in_state("charge");
    fill_analysis(&mut state, "1=2.60 X=3.60 2=6.50");
    let Some(WorkerCommand::Analyze { email, request }) = state.submit_analysis() else {
        panic!("analysis should be dispatched");
    };
    assert!(state.busy);
    assert!(state.submit_analysis().is_none());
    assert!(matches!(request.source, SourceSpec::Fixture { .. }));

    let source = FixtureSource::from_path(&fixture_path()).unwrap();
    let outcome = run_analysis(
        &request,
        &source,
        None,
        PipelineConfig {
            value_threshold: 5.0,
            prompt_style: PromptStyle::Optimized,
        },
    );
    apply_delta(
        &mut state,
        Delta::AnalysisDone {
            email,
            outcome: Box::new(outcome),
        },
    );
    assert!(!state.busy);
    assert_eq!(state.credits(), Some(FREE_CREDITS - 3));
    assert!(state.last_outcome.is_some());

    let exported = state.export_last_analysis().expect("export written");
    assert!(exported.exists());
}

#[test]
fn unpriced_lines_are_not_charged() {
    let mut state = signed_in_state("unpriced");
    fill_analysis(&mut state, "O5.5=6.0 CO13.5=3.0 KO8.5=4.0");
    assert!(state.submit_analysis().is_none());
    assert!(!state.busy);

    fill_analysis(&mut state, "1=2.60 O5.5=6.0 CO13.5=3.0 KO8.5=4.0");
    let Some(WorkerCommand::Analyze { email, request }) = state.submit_analysis() else {
        panic!("analysis should be dispatched");
    };
    let source = FixtureSource::from_path(&fixture_path()).unwrap();
    let outcome = run_analysis(
        &request,
        &source,
        None,
        PipelineConfig {
            value_threshold: 5.0,
            prompt_style: PromptStyle::Optimized,
        },
    );
    assert_eq!(outcome.markets_analyzed(), 1);
    apply_delta(
        &mut state,
        Delta::AnalysisDone {
            email,
            outcome: Box::new(outcome),
        },
    );
    assert_eq!(state.credits(), Some(FREE_CREDITS - 1));
}

#[test]
fn unknown_teams_are_not_charged() {
    let mut state = signed_in_state("unknown_teams");
    fill_analysis(&mut state, "1=2.60 X=3.60");
    state.analysis_form.set(ANALYSIS_HOME, "Real Madrid");
    state.analysis_form.set(ANALYSIS_AWAY, "Barcelona");
    let Some(WorkerCommand::Analyze { email, request }) = state.submit_analysis() else {
        panic!("analysis should be dispatched");
    };
    let source = FixtureSource::from_path(&fixture_path()).unwrap();
    let outcome = run_analysis(
        &request,
        &source,
        None,
        PipelineConfig {
            value_threshold: 5.0,
            prompt_style: PromptStyle::Optimized,
        },
    );
    apply_delta(
        &mut state,
        Delta::AnalysisDone {
            email,
            outcome: Box::new(outcome),
        },
    );
    assert!(!state.busy);
    assert_eq!(state.credits(), Some(FREE_CREDITS));
    assert!(state.logs.iter().any(|l| l.contains("no credits charged")));
}

#[test]
fn failed_analysis_clears_busy_without_charging() {
    let mut state = signed_in_state("failed");
    fill_analysis(&mut state, "1=2.60");
    assert!(state.submit_analysis().is_some());
    apply_delta(&mut state, Delta::AnalysisFailed("boom".to_string()));
    assert!(!state.busy);
    assert_eq!(state.credits(), Some(FREE_CREDITS));
}

#[test]
fn llm_reply_is_parsed_into_the_outcome() {
    let request = AnalysisRequest {
        league: "Premier League".to_string(),
        home: "Liverpool".to_string(),
        away: "Manchester Utd".to_string(),
        odds_line: "1=1.70 O2.5=1.80".to_string(),
        source: SourceSpec::Fixture { path: fixture_path() },
        use_llm: true,
    };
    let reply = fs::read_to_string(fixture_path().with_file_name("llm_reply.md")).unwrap();
    let model = StaticModel { reply };
    let source = FixtureSource::from_path(&fixture_path()).unwrap();
    let outcome = run_analysis(
        &request,
        &source,
        Some(&model),
        PipelineConfig {
            value_threshold: 5.0,
            prompt_style: PromptStyle::Enhanced,
        },
    );
    let doc = outcome.document.expect("reply parsed");
    assert_eq!(doc.opportunities.len(), 2);
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
}

#[test]
fn payment_confirmation_is_idempotent() {
    let mut state = signed_in_state("payment");
    state.selected_package = 0;
    let Some(WorkerCommand::CreateCheckout { package_id, .. }) = state.start_checkout() else {
        panic!("checkout should be requested");
    };
    assert_eq!(package_id, "standard");

    apply_delta(
        &mut state,
        Delta::CheckoutCreated(CheckoutSession {
            id: "cs_test_1".to_string(),
            url: Some("https://checkout.stripe.com/c/pay/cs_test_1".to_string()),
            metadata: HashMap::new(),
            ..CheckoutSession::default()
        }),
    );
    let Some(WorkerCommand::ConfirmCheckout { session_id }) = state.confirm_checkout() else {
        panic!("confirmation should be requested");
    };
    assert_eq!(session_id, "cs_test_1");

    let paid = PaidCheckout {
        session_id,
        email: "fan@example.com".to_string(),
        credits: 30,
        tier: Tier::Standard,
    };
    apply_delta(&mut state, Delta::PaymentConfirmed(paid.clone()));
    apply_delta(&mut state, Delta::PaymentConfirmed(paid));
    assert_eq!(state.credits(), Some(FREE_CREDITS + 30));
    assert!(state.pending_checkout.is_none());
    assert_eq!(state.users.get("fan@example.com").unwrap().tier, Tier::Standard);
}

#[test]
fn confirm_accepts_return_url() {
    let mut state = signed_in_state("return_url");
    state
        .confirm_form
        .set(0, "http://localhost:8501/?payment=success&session_id=cs_live_9");
    assert!(matches!(
        state.confirm_checkout(),
        Some(WorkerCommand::ConfirmCheckout { session_id }) if session_id == "cs_live_9"
    ));
}

#[test]
fn admin_panel_needs_password() {
    let mut state = signed_in_state("admin");
    state.screen = Screen::Admin;
    state.admin_form.set(0, "nope");
    state.unlock_admin();
    assert!(!state.admin_unlocked);

    state.admin_form.set(0, "letmein");
    state.unlock_admin();
    assert!(state.admin_unlocked);

    state.admin_form.set(1, "7");
    state.admin_grant_credits();
    assert_eq!(state.credits(), Some(FREE_CREDITS + 7));

    // The signed-in account cannot delete itself.
    state.admin_delete_selected();
    assert_eq!(state.users.list().len(), 1);
}

#[test]
fn log_is_bounded() {
    let mut state = new_state("logs");
    for i in 0..250 {
        apply_delta(&mut state, Delta::Log(format!("[INFO] {i}")));
    }
    assert_eq!(state.logs.len(), 200);
    assert_eq!(state.logs.front().map(String::as_str), Some("[INFO] 50"));
}
