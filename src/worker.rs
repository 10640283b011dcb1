use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use tracing::{info, warn};

use crate::billing::{StripeClient, verify_payment};
use crate::config::AppConfig;
use crate::llm::{ChatModel, OpenAiClient};
use crate::mailer::{Mailer, mailer_from_config, verification_email};
use crate::pipeline::{PipelineConfig, build_source, run_analysis};
use crate::state::{Delta, WorkerCommand};
use crate::users::package;

/// Everything the background thread needs to serve [`WorkerCommand`]s.
pub struct Worker {
    cfg: AppConfig,
    chat: Option<Box<dyn ChatModel>>,
    stripe: Option<StripeClient>,
    mailer: Box<dyn Mailer>,
}

impl Worker {
    pub fn new(
        cfg: AppConfig,
        chat: Option<Box<dyn ChatModel>>,
        stripe: Option<StripeClient>,
        mailer: Box<dyn Mailer>,
    ) -> Self {
        Self {
            cfg,
            chat,
            stripe,
            mailer,
        }
    }

    /// Wires the real OpenAI, Stripe and mail backends from configuration.
    pub fn from_config(cfg: AppConfig) -> (Self, Vec<String>) {
        let mut notes = Vec::new();
        let chat: Option<Box<dyn ChatModel>> = match OpenAiClient::from_config(&cfg) {
            Ok(Some(client)) => Some(Box::new(client)),
            Ok(None) => {
                notes.push("[INFO] OPENAI_API_KEY not set; AI commentary disabled".to_string());
                None
            }
            Err(err) => {
                notes.push(format!("[WARN] OpenAI client unavailable: {err:#}"));
                None
            }
        };
        let stripe = StripeClient::from_config(&cfg);
        if stripe.is_none() {
            notes.push("[INFO] STRIPE_SECRET_KEY not set; purchases disabled".to_string());
        }
        let mailer = mailer_from_config(&cfg);
        notes.push(format!("[INFO] Mail via {}", mailer.describe()));
        (Self::new(cfg, chat, stripe, mailer), notes)
    }

    pub fn handle(&self, cmd: WorkerCommand) -> Delta {
        match cmd {
            WorkerCommand::Analyze { email, request } => {
                let source = match build_source(&request.source, &self.cfg) {
                    Ok(s) => s,
                    Err(err) => {
                        warn!("cannot build stats source: {err:#}");
                        return Delta::AnalysisFailed(format!("{err:#}"));
                    }
                };
                let outcome = run_analysis(
                    &request,
                    source.as_ref(),
                    self.chat.as_deref(),
                    PipelineConfig::from(&self.cfg),
                );
                Delta::AnalysisDone {
                    email,
                    outcome: Box::new(outcome),
                }
            }
            WorkerCommand::CreateCheckout { email, package_id } => {
                let Some(stripe) = &self.stripe else {
                    return Delta::CheckoutFailed("STRIPE_SECRET_KEY is not set".to_string());
                };
                let Some(pack) = package(package_id) else {
                    return Delta::CheckoutFailed(format!("unknown package {package_id}"));
                };
                match stripe.create_checkout_session(&email, pack) {
                    Ok(session) => Delta::CheckoutCreated(session),
                    Err(err) => Delta::CheckoutFailed(format!("{err:#}")),
                }
            }
            WorkerCommand::ConfirmCheckout { session_id } => {
                let Some(stripe) = &self.stripe else {
                    return Delta::PaymentRejected("STRIPE_SECRET_KEY is not set".to_string());
                };
                match stripe
                    .retrieve_session(&session_id)
                    .and_then(|s| verify_payment(&s))
                {
                    Ok(paid) => {
                        info!(session_id = %paid.session_id, credits = paid.credits, "payment verified");
                        Delta::PaymentConfirmed(paid)
                    }
                    Err(err) => Delta::PaymentRejected(format!("{err:#}")),
                }
            }
            WorkerCommand::SendVerification { email, name, code } => {
                let (subject, body) = verification_email(&name, &code);
                match self.mailer.send(&email, &subject, &body) {
                    Ok(()) => Delta::VerificationSent { email },
                    Err(err) => {
                        warn!("verification mail failed: {err:#}");
                        Delta::VerificationFailed {
                            email,
                            error: format!("{err:#}"),
                        }
                    }
                }
            }
        }
    }
}

pub fn spawn_worker(tx: Sender<Delta>, cmd_rx: Receiver<WorkerCommand>, cfg: AppConfig) {
    thread::spawn(move || {
        let (worker, notes) = Worker::from_config(cfg);
        for note in notes {
            let _ = tx.send(Delta::Log(note));
        }
        while let Ok(cmd) = cmd_rx.recv() {
            if tx.send(worker.handle(cmd)).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::OutboxMailer;
    use crate::pipeline::{AnalysisRequest, SourceSpec};

    fn offline_worker(dir: &std::path::Path) -> Worker {
        let cfg = AppConfig::offline(dir);
        let outbox = cfg.outbox_dir();
        Worker::new(cfg, None, None, Box::new(OutboxMailer::new(outbox)))
    }

    #[test]
    fn checkout_without_stripe_fails_cleanly() {
        let dir = std::env::temp_dir().join(format!("footy_value_worker_{}", std::process::id()));
        let worker = offline_worker(&dir);
        let delta = worker.handle(WorkerCommand::CreateCheckout {
            email: "a@b.io".to_string(),
            package_id: "standard",
        });
        assert!(matches!(delta, Delta::CheckoutFailed(msg) if msg.contains("STRIPE")));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_fixture_reports_failure() {
        let dir = std::env::temp_dir().join(format!("footy_value_worker_fx_{}", std::process::id()));
        let worker = offline_worker(&dir);
        let delta = worker.handle(WorkerCommand::Analyze {
            email: "a@b.io".to_string(),
            request: AnalysisRequest {
                league: "Test".to_string(),
                home: "A".to_string(),
                away: "B".to_string(),
                odds_line: "1=2.0".to_string(),
                source: SourceSpec::Fixture {
                    path: dir.join("does_not_exist.json"),
                },
                use_llm: false,
            },
        });
        assert!(matches!(delta, Delta::AnalysisFailed(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
