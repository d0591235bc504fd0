//! Mock LLM service and session integration tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{ContentBlock, LlmError, LlmRequest, LlmResponse, LlmService, Usage};

/// Mock LLM service that returns queued responses and records every request
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain-text response
    pub fn queue_text(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(LlmResponse {
            content: vec![ContentBlock::text(text)],
            usage: Usage::default(),
        }));
    }

    /// Queue a tool invocation response
    pub fn queue_tool_use(&self, name: &str, arguments: Value) {
        self.responses.lock().unwrap().push_back(Ok(LlmResponse {
            content: vec![ContentBlock::tool_use(name, arguments)],
            usage: Usage::default(),
        }));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::intake::state::{AppointmentSlot, FlowKind, SessionState};
    use crate::intake::validate::Rejection;
    use crate::session::{Session, SessionError, SessionEvent};
    use chrono::NaiveDate;
    use serde_json::json;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
    }

    fn new_session(flow: FlowKind) -> (Session<MockLlmService>, Arc<MockLlmService>) {
        let llm = Arc::new(MockLlmService::new());
        let session = Session::with_today(flow, llm.clone(), fixed_today());
        (session, llm)
    }

    /// Start a session past its greeting pass.
    async fn started(flow: FlowKind) -> (Session<MockLlmService>, Arc<MockLlmService>) {
        let (mut session, llm) = new_session(flow);
        llm.queue_text("Hi, I'm Jessica. Can you confirm your birthday?");
        session.start().await.unwrap();
        (session, llm)
    }

    fn tool_names(request: &LlmRequest) -> Vec<&str> {
        request.tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn start_introduces_the_agent_with_only_the_identity_tool() {
        let (mut session, llm) = new_session(FlowKind::Scheduling);
        llm.queue_text("Hi, I'm Jessica.");

        let turn = session.start().await.unwrap();

        assert_eq!(turn.utterances, vec!["Hi, I'm Jessica.".to_string()]);
        assert_eq!(session.state(), SessionState::AwaitingIdentity);

        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(tool_names(&requests[0]), vec!["verify_birthday"]);
        // The persona directive leads the record.
        assert_eq!(requests[0].messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn valid_birthday_advances_to_appointment_collection() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;
        llm.queue_tool_use("verify_birthday", json!({"birthday": "1990-05-16"}));
        llm.queue_text("Thanks! The doctor is available on 7/22 at 12pm.");

        let turn = session.submit_user_message("May 16th, 1990").await.unwrap();

        assert_eq!(session.state(), SessionState::AwaitingAppointment);
        assert_eq!(
            session.collected().birthday,
            NaiveDate::from_ymd_opt(1990, 5, 16)
        );
        assert_eq!(turn.utterances.len(), 1);
        assert_eq!(
            turn.events,
            vec![SessionEvent::Transitioned {
                from: SessionState::AwaitingIdentity,
                to: SessionState::AwaitingAppointment,
                tool: "verify_birthday".to_string(),
            }]
        );

        // The follow-up call already carries the swapped tool set.
        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(tool_names(&requests[2]), vec!["make_appointment"]);
    }

    #[tokio::test]
    async fn unparseable_birthday_keeps_the_identity_tool_only() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;
        llm.queue_tool_use("verify_birthday", json!({"birthday": "not-a-date"}));
        llm.queue_text("Sorry, could you repeat your birthday?");

        let turn = session.submit_user_message("hm, not a date").await.unwrap();

        assert_eq!(session.state(), SessionState::AwaitingIdentity);
        assert!(matches!(
            turn.events.as_slice(),
            [SessionEvent::Rejected {
                reason: Rejection::Parse(_),
                ..
            }]
        ));

        let requests = llm.recorded_requests();
        assert_eq!(
            tool_names(requests.last().unwrap()),
            vec!["verify_birthday"]
        );
    }

    #[tokio::test]
    async fn unmatched_record_is_rejected_without_reaching_the_age_rule() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;
        // 1990 + 5 + 15 is divisible by 3: the placeholder record rule fires.
        llm.queue_tool_use("verify_birthday", json!({"birthday": "1990-05-15"}));
        llm.queue_text("I couldn't find your records.");

        let turn = session.submit_user_message("May 15th, 1990").await.unwrap();

        assert_eq!(session.state(), SessionState::AwaitingIdentity);
        assert_eq!(
            turn.events,
            vec![SessionEvent::Rejected {
                tool: "verify_birthday".to_string(),
                reason: Rejection::IdentityNotFound,
            }]
        );
    }

    #[tokio::test]
    async fn full_scheduling_flow_runs_to_completion() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;

        llm.queue_tool_use("verify_birthday", json!({"birthday": "1990-05-16"}));
        llm.queue_text("Thanks! When would you like to come in?");
        session.submit_user_message("May 16th, 1990").await.unwrap();

        llm.queue_tool_use(
            "make_appointment",
            json!({"appointment_day": "07-22", "appointment_hour": "12:00"}),
        );
        llm.queue_text("Booked for 7/22 at 12:00. Can you confirm?");
        session.submit_user_message("Monday at noon").await.unwrap();

        assert_eq!(session.state(), SessionState::AwaitingConfirmation);
        assert_eq!(
            session.collected().appointment,
            Some(AppointmentSlot { month: 7, day: 22, hour: 12, minute: 0 })
        );

        llm.queue_tool_use("confirm_appointment", json!({}));
        llm.queue_text("You're all set. Goodbye!");
        let turn = session.submit_user_message("yes, confirmed").await.unwrap();

        assert_eq!(session.state(), SessionState::Ended);
        assert!(turn.events.contains(&SessionEvent::Ended));
        assert_eq!(turn.utterances, vec!["You're all set. Goodbye!".to_string()]);

        // has_ended is idempotent.
        assert!(session.has_ended());
        assert!(session.has_ended());

        // The goodbye pass exposed no tools at all.
        let requests = llm.recorded_requests();
        assert!(requests.last().unwrap().tools.is_empty());
    }

    #[tokio::test]
    async fn intake_capture_chains_into_the_next_category_without_a_user_turn() {
        let (mut session, llm) = started(FlowKind::PatientIntake).await;

        llm.queue_tool_use("verify_birthday", json!({"birthday": "1990-05-16"}));
        llm.queue_text("Thanks! What prescriptions are you taking?");
        session.submit_user_message("May 16th, 1990").await.unwrap();
        assert_eq!(session.state(), SessionState::CollectingPrescriptions);

        llm.queue_tool_use(
            "list_prescriptions",
            json!({"prescriptions": [{"medication": "Metformin", "dosage": "500 mg"}]}),
        );
        llm.queue_text("Got it. Do you have any allergies?");
        let turn = session
            .submit_user_message("I take Metformin, 500 mg")
            .await
            .unwrap();

        // The capture and the follow-up both happened inside one user turn.
        assert_eq!(session.state(), SessionState::CollectingAllergies);
        assert_eq!(session.collected().prescriptions.len(), 1);
        assert_eq!(turn.utterances, vec!["Got it. Do you have any allergies?".to_string()]);

        let requests = llm.recorded_requests();
        assert_eq!(tool_names(requests.last().unwrap()), vec!["list_allergies"]);

        // The freshly appended directive steers toward the next category.
        let directive = session
            .transcript()
            .iter()
            .rev()
            .find(|m| m.role == Role::System)
            .unwrap();
        assert!(directive.content.contains("list_allergies"));
    }

    #[tokio::test]
    async fn full_intake_flow_collects_every_category() {
        let (mut session, llm) = started(FlowKind::PatientIntake).await;

        llm.queue_tool_use("verify_birthday", json!({"birthday": "1990-05-16"}));
        llm.queue_text("Thanks! What prescriptions are you taking?");
        session.submit_user_message("May 16th, 1990").await.unwrap();

        llm.queue_tool_use(
            "list_prescriptions",
            json!({"prescriptions": [{"medication": "Metformin", "dosage": "500 mg"}]}),
        );
        llm.queue_text("Any allergies?");
        session.submit_user_message("Metformin, 500 mg").await.unwrap();

        llm.queue_tool_use("list_allergies", json!({"allergies": [{"name": "penicillin"}]}));
        llm.queue_text("Any existing conditions?");
        session.submit_user_message("penicillin").await.unwrap();

        llm.queue_tool_use("list_conditions", json!({"conditions": []}));
        llm.queue_text("What brings you in today?");
        session.submit_user_message("none").await.unwrap();

        llm.queue_tool_use(
            "list_visit_reasons",
            json!({"visit_reasons": [{"name": "annual checkup"}]}),
        );
        llm.queue_text("That's everything. See you soon, goodbye!");
        let turn = session.submit_user_message("annual checkup").await.unwrap();

        assert!(session.has_ended());
        assert!(turn.events.contains(&SessionEvent::Ended));

        let collected = session.collected();
        assert_eq!(collected.prescriptions.len(), 1);
        assert_eq!(collected.allergies, vec!["penicillin".to_string()]);
        assert!(collected.conditions.is_empty());
        assert_eq!(collected.visit_reasons, vec!["annual checkup".to_string()]);
    }

    #[tokio::test]
    async fn llm_failure_during_goodbye_still_ends_the_session() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;

        llm.queue_tool_use("verify_birthday", json!({"birthday": "1990-05-16"}));
        llm.queue_text("When would you like to come in?");
        session.submit_user_message("May 16th, 1990").await.unwrap();

        llm.queue_tool_use(
            "make_appointment",
            json!({"appointment_day": "07-22", "appointment_hour": "12:00"}),
        );
        llm.queue_text("Can you confirm?");
        session.submit_user_message("Monday at noon").await.unwrap();

        llm.queue_tool_use("confirm_appointment", json!({}));
        llm.queue_error(LlmError::network("connection reset"));
        let turn = session.submit_user_message("yes").await.unwrap();

        assert!(session.has_ended());
        assert!(turn.events.contains(&SessionEvent::Ended));
        assert!(turn.utterances.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_mid_session_propagates() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;
        llm.queue_error(LlmError::network("connection reset"));

        let result = session.submit_user_message("hello?").await;
        assert!(matches!(result, Err(SessionError::Llm(_))));
        assert!(!session.has_ended());
    }

    #[tokio::test]
    async fn tool_outside_the_active_set_is_skipped_without_a_state_change() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;
        llm.queue_tool_use(
            "make_appointment",
            json!({"appointment_day": "07-22", "appointment_hour": "12:00"}),
        );

        let turn = session.submit_user_message("book me in").await.unwrap();

        assert_eq!(session.state(), SessionState::AwaitingIdentity);
        assert_eq!(
            turn.events,
            vec![SessionEvent::UnknownTool {
                name: "make_appointment".to_string()
            }]
        );
        assert!(session.collected().appointment.is_none());
    }

    #[tokio::test]
    async fn submitting_to_an_ended_session_is_an_error() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;

        llm.queue_tool_use("verify_birthday", json!({"birthday": "1990-05-16"}));
        llm.queue_text("When?");
        session.submit_user_message("May 16th, 1990").await.unwrap();
        llm.queue_tool_use(
            "make_appointment",
            json!({"appointment_day": "08-01", "appointment_hour": "12:00"}),
        );
        llm.queue_text("Confirm?");
        session.submit_user_message("Aug 1 noon").await.unwrap();
        llm.queue_tool_use("confirm_appointment", json!({}));
        llm.queue_text("Goodbye!");
        session.submit_user_message("yes").await.unwrap();
        assert!(session.has_ended());

        let result = session.submit_user_message("one more thing").await;
        assert!(matches!(result, Err(SessionError::AlreadyEnded)));
    }

    #[tokio::test]
    async fn runaway_tool_chains_are_cut_off() {
        let (mut session, llm) = started(FlowKind::Scheduling).await;
        // A misbehaving collaborator that never stops asking for tools.
        for _ in 0..16 {
            llm.queue_tool_use("verify_birthday", json!({"birthday": "not-a-date"}));
        }

        let result = session.submit_user_message("loop forever").await;
        assert!(matches!(result, Err(SessionError::ChainLimit(_))));
        // Still recoverable: the state never moved.
        assert_eq!(session.state(), SessionState::AwaitingIdentity);
    }
}
