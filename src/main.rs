//! frontdesk - scripted conversational intake agent
//!
//! A console chatbot where an LLM produces the utterances while a
//! per-session state machine gates which tools it may call at each step.

mod context;
mod intake;
mod llm;
mod session;

use std::io::{self, BufRead};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intake::FlowKind;
use llm::{LlmConfig, LoggingService, OpenAiService};
use session::{Session, Turn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so the transcript on stdout stays clean.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "frontdesk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let flow: FlowKind = std::env::var("FRONTDESK_FLOW")
        .ok()
        .map(|raw| raw.parse())
        .transpose()?
        .unwrap_or(FlowKind::Scheduling);

    let config = LlmConfig::from_env();
    let Some(api_key) = config.api_key.clone() else {
        return Err("OPENAI_API_KEY is not set".into());
    };
    let service = LoggingService::new(Arc::new(OpenAiService::new(
        api_key,
        config.model.clone(),
        config.base_url.as_deref(),
    )));

    tracing::info!(flow = ?flow, model = %config.model, "frontdesk starting");

    let mut session = Session::new(flow, Arc::new(service));
    render(session.start().await?);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let text = line.trim();
        if text == "exit" {
            break;
        }
        if text.is_empty() {
            continue;
        }

        render(session.submit_user_message(text).await?);

        if session.has_ended() {
            break;
        }
    }

    let collected = session.collected();
    tracing::info!(
        state = ?session.state(),
        birthday = ?collected.birthday,
        appointment = ?collected.appointment,
        prescriptions = collected.prescriptions.len(),
        allergies = collected.allergies.len(),
        conditions = collected.conditions.len(),
        visit_reasons = collected.visit_reasons.len(),
        "session finished; collected data is discarded"
    );

    Ok(())
}

fn render(turn: Turn) {
    for utterance in turn.utterances {
        println!("{utterance}");
    }
}
