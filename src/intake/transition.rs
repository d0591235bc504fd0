//! Pure tool-call handling
//!
//! `handle_tool_call` is the single authority over state transitions: given
//! the current state and an invocation, it decides the next state, the
//! steering directives to append, and the data to record. No I/O happens
//! here; the session applies the result.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;

use super::state::{
    AppointmentSlot, FlowKind, ListAllergiesArgs, ListConditionsArgs, ListPrescriptionsArgs,
    ListVisitReasonsArgs, MakeAppointmentArgs, NamedItem, Prescription, SessionState,
    VerifyBirthdayArgs,
};
use super::tools;
use super::validate::{self, Rejection};
use crate::llm::ToolInvocation;

/// What a handled invocation did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Validated; the session advanced to the next state.
    Advanced {
        from: SessionState,
        to: SessionState,
    },
    /// Refused; a corrective directive was appended and the state (and so
    /// the tool set) is unchanged. Retry is implicit on the next turn.
    Rejected { reason: Rejection },
    /// The terminal transition ran; no further tools are exposed.
    Ended,
    /// The tool is not in the active set. Skipped defensively.
    UnknownTool { name: String },
}

/// A confirmed fact to merge into the session's collected data
#[derive(Debug, Clone, PartialEq)]
pub enum DataUpdate {
    Birthday(NaiveDate),
    Appointment(AppointmentSlot),
    Prescriptions(Vec<Prescription>),
    Allergies(Vec<String>),
    Conditions(Vec<String>),
    VisitReasons(Vec<String>),
}

/// Result of handling one tool invocation
#[derive(Debug, Clone)]
pub struct TurnTransition {
    /// State after the invocation (equal to the prior state on rejection).
    pub state: SessionState,
    /// System directives to append, in order.
    pub directives: Vec<String>,
    pub update: Option<DataUpdate>,
    pub disposition: Disposition,
}

impl TurnTransition {
    fn advance(
        from: SessionState,
        to: SessionState,
        directive: String,
        update: Option<DataUpdate>,
    ) -> Self {
        let disposition = if to == SessionState::Ended {
            Disposition::Ended
        } else {
            Disposition::Advanced { from, to }
        };
        Self {
            state: to,
            directives: vec![directive],
            update,
            disposition,
        }
    }

    fn reject(state: SessionState, reason: Rejection, directive: String) -> Self {
        Self {
            state,
            directives: vec![directive],
            update: None,
            disposition: Disposition::Rejected { reason },
        }
    }

    fn skip_unknown(state: SessionState, name: &str) -> Self {
        Self {
            state,
            directives: Vec::new(),
            update: None,
            disposition: Disposition::UnknownTool {
                name: name.to_string(),
            },
        }
    }
}

/// Persona and opening instructions for a flow; appended once at session
/// start, before the first LLM pass.
pub fn opening_directive(flow: FlowKind) -> String {
    let task = match flow {
        FlowKind::Scheduling => {
            "Your job is to help the user schedule an appointment with the doctor."
        }
        FlowKind::PatientIntake => {
            "Your job is to collect important information from the user before their doctor visit."
        }
    };
    format!(
        "You are Jessica, an assistant for Tri-County Health Services. {task} \
         You should be polite and professional. You're not a medical professional, \
         so you shouldn't provide any advice. Keep your responses short. Don't make \
         assumptions about what values to plug into functions; ask for clarification \
         if a user response is ambiguous. Start by introducing yourself. Then, ask the \
         user to confirm their identity by telling you their birthday, including the \
         year. When they answer with their birthday, call the verify_birthday function."
    )
}

/// Handle one tool invocation against the current state.
///
/// Pure: same inputs always produce the same `TurnTransition`. `today`
/// feeds the age cutoff and the availability text.
pub fn handle_tool_call(
    flow: FlowKind,
    state: SessionState,
    invocation: &ToolInvocation,
    today: NaiveDate,
) -> TurnTransition {
    // The LLM integration restricts choices to the active set already, but
    // the controller re-checks rather than trusting it.
    let active = tools::tools_for(flow, state);
    if !active.iter().any(|tool| tool.name == invocation.name) {
        return TurnTransition::skip_unknown(state, &invocation.name);
    }

    match invocation.name.as_str() {
        tools::VERIFY_BIRTHDAY => verify_birthday_call(flow, state, invocation, today),
        tools::MAKE_APPOINTMENT => make_appointment_call(state, invocation),
        tools::CONFIRM_APPOINTMENT => confirm_appointment_call(state),
        tools::LIST_PRESCRIPTIONS => list_prescriptions_call(state, invocation),
        tools::LIST_ALLERGIES => list_allergies_call(state, invocation),
        tools::LIST_CONDITIONS => list_conditions_call(state, invocation),
        tools::LIST_VISIT_REASONS => list_visit_reasons_call(state, invocation),
        other => TurnTransition::skip_unknown(state, other),
    }
}

fn verify_birthday_call(
    flow: FlowKind,
    state: SessionState,
    invocation: &ToolInvocation,
    today: NaiveDate,
) -> TurnTransition {
    let args: VerifyBirthdayArgs = match parse_args(invocation) {
        Ok(args) => args,
        Err(reason) => {
            return TurnTransition::reject(state, reason, birthday_parse_directive());
        }
    };

    match validate::verify_birthday(&args.birthday, today) {
        Ok(birthday) => {
            let (to, directive) = match flow {
                FlowKind::Scheduling => (
                    SessionState::AwaitingAppointment,
                    availability_directive(today),
                ),
                FlowKind::PatientIntake => (
                    SessionState::CollectingPrescriptions,
                    "Next, thank the user for confirming their identity, then ask the user \
                     to list their current prescriptions. Each prescription needs a \
                     medication name and a dosage. Once they have listed them, call the \
                     list_prescriptions function."
                        .to_string(),
                ),
            };
            TurnTransition::advance(state, to, directive, Some(DataUpdate::Birthday(birthday)))
        }
        Err(reason) => {
            let directive = match &reason {
                Rejection::IdentityNotFound => {
                    "The user provided a birthday that is not validated. Tell the user that \
                     the records were not found in the system, and ask them to double-check \
                     their birthday and provide it again."
                        .to_string()
                }
                Rejection::UnderAge => {
                    "The user is too young (below 18). Tell that to the user, and ask \
                     whether the birthday was entered correctly; if they provide a corrected \
                     birthday, call verify_birthday again."
                        .to_string()
                }
                _ => birthday_parse_directive(),
            };
            TurnTransition::reject(state, reason, directive)
        }
    }
}

fn make_appointment_call(state: SessionState, invocation: &ToolInvocation) -> TurnTransition {
    let args: MakeAppointmentArgs = match parse_args(invocation) {
        Ok(args) => args,
        Err(reason) => {
            return TurnTransition::reject(state, reason, appointment_parse_directive());
        }
    };

    match validate::verify_appointment(&args.appointment_day, &args.appointment_hour) {
        Ok(slot) => {
            let directive = format!(
                "The user booked an appointment. Remind the user of the day ({}/{}) and \
                 time ({}:{:02}) of the appointment and ask the user to re-confirm the \
                 booking. Call confirm_appointment when the user has confirmed.",
                slot.month, slot.day, slot.hour, slot.minute
            );
            TurnTransition::advance(
                state,
                SessionState::AwaitingConfirmation,
                directive,
                Some(DataUpdate::Appointment(slot)),
            )
        }
        Err(reason) => {
            let directive = match &reason {
                Rejection::UnavailableSlot => {
                    "The user provided a non-possible appointment, ask the user to book \
                     another time."
                        .to_string()
                }
                _ => appointment_parse_directive(),
            };
            TurnTransition::reject(state, reason, directive)
        }
    }
}

fn confirm_appointment_call(state: SessionState) -> TurnTransition {
    TurnTransition::advance(
        state,
        SessionState::Ended,
        "The user confirmed the appointment. Thank them and say goodbye.".to_string(),
        None,
    )
}

fn list_prescriptions_call(state: SessionState, invocation: &ToolInvocation) -> TurnTransition {
    let args: ListPrescriptionsArgs = match parse_args(invocation) {
        Ok(args) => args,
        Err(reason) => return reject_list_shape(state, reason),
    };
    TurnTransition::advance(
        state,
        SessionState::CollectingAllergies,
        "Next, ask the user if they have any allergies. Once they have listed their \
         allergies, or confirmed they have none, call the list_allergies function."
            .to_string(),
        Some(DataUpdate::Prescriptions(args.prescriptions)),
    )
}

fn list_allergies_call(state: SessionState, invocation: &ToolInvocation) -> TurnTransition {
    let args: ListAllergiesArgs = match parse_args(invocation) {
        Ok(args) => args,
        Err(reason) => return reject_list_shape(state, reason),
    };
    TurnTransition::advance(
        state,
        SessionState::CollectingConditions,
        "Next, ask the user about any existing medical conditions. Once they have listed \
         them, or confirmed they have none, call the list_conditions function."
            .to_string(),
        Some(DataUpdate::Allergies(into_names(args.allergies))),
    )
}

fn list_conditions_call(state: SessionState, invocation: &ToolInvocation) -> TurnTransition {
    let args: ListConditionsArgs = match parse_args(invocation) {
        Ok(args) => args,
        Err(reason) => return reject_list_shape(state, reason),
    };
    TurnTransition::advance(
        state,
        SessionState::CollectingVisitReasons,
        "Finally, ask the user the reason for their doctor visit today. Once they have \
         listed their reasons, call the list_visit_reasons function."
            .to_string(),
        Some(DataUpdate::Conditions(into_names(args.conditions))),
    )
}

fn list_visit_reasons_call(state: SessionState, invocation: &ToolInvocation) -> TurnTransition {
    let args: ListVisitReasonsArgs = match parse_args(invocation) {
        Ok(args) => args,
        Err(reason) => return reject_list_shape(state, reason),
    };
    TurnTransition::advance(
        state,
        SessionState::Ended,
        "Thank the user for providing the information, tell them the intake is complete, \
         and say goodbye."
            .to_string(),
        Some(DataUpdate::VisitReasons(into_names(args.visit_reasons))),
    )
}

fn parse_args<T: DeserializeOwned>(invocation: &ToolInvocation) -> Result<T, Rejection> {
    serde_json::from_value(invocation.arguments.clone())
        .map_err(|e| Rejection::Parse(format!("{} arguments: {e}", invocation.name)))
}

fn into_names(items: Vec<NamedItem>) -> Vec<String> {
    items.into_iter().map(|item| item.name).collect()
}

fn birthday_parse_directive() -> String {
    "The birthday could not be understood. Ask the user to repeat their birthday, \
     including the year, and convert it to YYYY-MM-DD format before calling \
     verify_birthday again."
        .to_string()
}

fn appointment_parse_directive() -> String {
    "The appointment day or hour could not be understood. Ask the user to restate the \
     day and time, and convert them to MM-DD and HH:MM (24 hour) format before calling \
     make_appointment again."
        .to_string()
}

fn reject_list_shape(state: SessionState, reason: Rejection) -> TurnTransition {
    TurnTransition::reject(
        state,
        reason,
        "The listed items could not be understood. Ask the user to repeat them, and call \
         the function again with every entry filled in."
            .to_string(),
    )
}

fn availability_directive(today: NaiveDate) -> String {
    format!(
        "Next, thank the user for confirming their birthday, then tell the user that the \
         doctor availability is Monday 7/22 at 12pm, Tuesday 7/23 at 3pm, and any date \
         and time after Tuesday. Today is {}. When the user tells their preferred time, \
         call the make_appointment function.",
        today.format("%m/%d")
    )
}
