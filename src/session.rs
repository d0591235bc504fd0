//! Session runtime
//!
//! Owns one conversation: the record, the state, the collected data, and
//! the termination flag. Applies the pure transition results and drives the
//! bounded chain of follow-up LLM calls within each user turn.

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use thiserror::Error;

use crate::context::{ConversationContext, Message};
use crate::intake::state::{CollectedData, FlowKind, SessionState};
use crate::intake::tools;
use crate::intake::transition::{self, DataUpdate, Disposition};
use crate::intake::validate::Rejection;
use crate::llm::{LlmError, LlmRequest, LlmService, ToolInvocation};

/// Upper bound on chained LLM calls per external user turn. Every handled
/// tool call triggers one follow-up so the model can speak; a well-behaved
/// collaborator stays far below this.
const MAX_CHAINED_CALLS: usize = 8;

const MAX_RESPONSE_TOKENS: u32 = 1024;

/// Errors surfaced to the session loop
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("session has already ended")]
    AlreadyEnded,
    #[error("LLM kept requesting tools after {0} chained calls")]
    ChainLimit(usize),
}

/// Structured observability event emitted by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transitioned {
        from: SessionState,
        to: SessionState,
        tool: String,
    },
    Rejected {
        tool: String,
        reason: Rejection,
    },
    UnknownTool {
        name: String,
    },
    Ended,
}

/// Everything produced by one external user turn
#[derive(Debug, Clone, Default)]
pub struct Turn {
    /// Assistant text to render (and, where wired, to speak).
    pub utterances: Vec<String>,
    pub events: Vec<SessionEvent>,
}

/// One conversation from start to terminal state
pub struct Session<L> {
    id: String,
    flow: FlowKind,
    state: SessionState,
    context: ConversationContext,
    collected: CollectedData,
    llm: Arc<L>,
    ended: bool,
    today: NaiveDate,
}

impl<L: LlmService> Session<L> {
    pub fn new(flow: FlowKind, llm: Arc<L>) -> Self {
        Self::with_today(flow, llm, Local::now().date_naive())
    }

    /// Pin "today" (the age cutoff and the availability text depend on it).
    pub fn with_today(flow: FlowKind, llm: Arc<L>, today: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            flow,
            state: SessionState::AwaitingIdentity,
            context: ConversationContext::new(),
            collected: CollectedData::default(),
            llm,
            ended: false,
            today,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn collected(&self) -> &CollectedData {
        &self.collected
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    #[allow(dead_code)] // Accessor for API completeness
    pub fn transcript(&self) -> &[Message] {
        self.context.messages()
    }

    /// Start the session: persona directive, identity tool only, and one
    /// LLM pass so the agent introduces itself before the first user turn.
    pub async fn start(&mut self) -> Result<Turn, SessionError> {
        tracing::info!(session = %self.id, flow = ?self.flow, "starting session");
        self.append_directive(transition::opening_directive(self.flow));
        self.context
            .set_active_tools(tools::tools_for(self.flow, self.state));
        self.drive_llm().await
    }

    /// Submit one user utterance and run the turn to completion.
    pub async fn submit_user_message(&mut self, text: &str) -> Result<Turn, SessionError> {
        if self.ended {
            return Err(SessionError::AlreadyEnded);
        }
        self.context.append(Message::user(text));
        self.drive_llm().await
    }

    /// Invoke the LLM with the full record and the active tool set; handle
    /// tool invocations until it answers with plain text. Strictly
    /// sequential: each call sees the state the previous one left behind.
    async fn drive_llm(&mut self) -> Result<Turn, SessionError> {
        let mut turn = Turn::default();

        for _ in 0..MAX_CHAINED_CALLS {
            let request = LlmRequest {
                messages: self.context.messages().to_vec(),
                tools: self.context.active_tools().to_vec(),
                max_tokens: Some(MAX_RESPONSE_TOKENS),
            };

            let response = match self.llm.complete(&request).await {
                Ok(response) => response,
                Err(e) if self.ended => {
                    // The goodbye pass failed. The terminal transition has
                    // already run; the session still counts as ended.
                    tracing::warn!(
                        session = %self.id,
                        error = %e,
                        "LLM call after terminal transition failed"
                    );
                    return Ok(turn);
                }
                Err(e) => return Err(e.into()),
            };

            let mut invocations = response.tool_invocations();
            if invocations.is_empty() {
                let text = response.text();
                if !text.is_empty() {
                    self.context.append(Message::assistant(text.clone()));
                    turn.utterances.push(text);
                }
                return Ok(turn);
            }

            if invocations.len() > 1 {
                tracing::warn!(
                    session = %self.id,
                    count = invocations.len(),
                    "multiple tool invocations in one response; handling the first"
                );
            }
            let invocation = invocations.remove(0);

            if !self.apply(&invocation, &mut turn) {
                return Ok(turn);
            }
        }

        Err(SessionError::ChainLimit(MAX_CHAINED_CALLS))
    }

    /// Apply one invocation's transition. Returns whether the chain should
    /// continue with another LLM call.
    fn apply(&mut self, invocation: &ToolInvocation, turn: &mut Turn) -> bool {
        let result = transition::handle_tool_call(self.flow, self.state, invocation, self.today);

        let event = match &result.disposition {
            Disposition::UnknownTool { name } => SessionEvent::UnknownTool { name: name.clone() },
            Disposition::Rejected { reason } => SessionEvent::Rejected {
                tool: invocation.name.clone(),
                reason: reason.clone(),
            },
            Disposition::Advanced { from, to } => SessionEvent::Transitioned {
                from: *from,
                to: *to,
                tool: invocation.name.clone(),
            },
            Disposition::Ended => SessionEvent::Ended,
        };
        self.emit(&event);
        let skipped = matches!(event, SessionEvent::UnknownTool { .. });
        turn.events.push(event);
        if skipped {
            // No directive was appended, so another call would only repeat
            // the mistake; end the turn instead.
            return false;
        }

        for directive in &result.directives {
            self.append_directive(directive.clone());
        }
        if let Some(update) = result.update {
            self.record(update);
        }
        self.state = result.state;
        self.context
            .set_active_tools(tools::tools_for(self.flow, self.state));
        if self.state.is_terminal() {
            self.ended = true;
        }

        true
    }

    /// Render one structured controller event to the log.
    fn emit(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Transitioned { from, to, tool } => {
                tracing::info!(
                    session = %self.id,
                    tool = %tool,
                    from = ?from,
                    to = ?to,
                    "state transition"
                );
            }
            SessionEvent::Rejected { tool, reason } => {
                tracing::info!(
                    session = %self.id,
                    tool = %tool,
                    reason = %reason,
                    "invocation rejected"
                );
            }
            SessionEvent::UnknownTool { name } => {
                tracing::warn!(
                    session = %self.id,
                    tool = %name,
                    state = ?self.state,
                    "tool not in active set; skipping"
                );
            }
            SessionEvent::Ended => {
                tracing::info!(session = %self.id, "terminal transition");
            }
        }
    }

    fn record(&mut self, update: DataUpdate) {
        match update {
            DataUpdate::Birthday(birthday) => self.collected.birthday = Some(birthday),
            DataUpdate::Appointment(slot) => self.collected.appointment = Some(slot),
            DataUpdate::Prescriptions(prescriptions) => {
                for prescription in &prescriptions {
                    tracing::debug!(
                        session = %self.id,
                        medication = %prescription.medication,
                        dosage = %prescription.dosage,
                        "captured prescription"
                    );
                }
                self.collected.prescriptions = prescriptions;
            }
            DataUpdate::Allergies(allergies) => self.collected.allergies = allergies,
            DataUpdate::Conditions(conditions) => self.collected.conditions = conditions,
            DataUpdate::VisitReasons(reasons) => self.collected.visit_reasons = reasons,
        }
    }

    fn append_directive(&mut self, directive: String) {
        // Directives steer the LLM; they are logged, never shown verbatim.
        tracing::info!(session = %self.id, directive = %directive, "steering directive");
        self.context.append(Message::system(directive));
    }
}
