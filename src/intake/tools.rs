//! Tool catalog and the state-to-active-set derivation

use serde_json::json;

use super::state::{FlowKind, SessionState};
use crate::llm::ToolDefinition;

pub const VERIFY_BIRTHDAY: &str = "verify_birthday";
pub const MAKE_APPOINTMENT: &str = "make_appointment";
pub const CONFIRM_APPOINTMENT: &str = "confirm_appointment";
pub const LIST_PRESCRIPTIONS: &str = "list_prescriptions";
pub const LIST_ALLERGIES: &str = "list_allergies";
pub const LIST_CONDITIONS: &str = "list_conditions";
pub const LIST_VISIT_REASONS: &str = "list_visit_reasons";

/// Derive the active tool set from the current state.
///
/// This is the single source of truth for what the LLM may call next: the
/// session swaps the whole set after every transition, so the registry can
/// never drift from the state.
pub fn tools_for(flow: FlowKind, state: SessionState) -> Vec<ToolDefinition> {
    match (flow, state) {
        (_, SessionState::AwaitingIdentity) => vec![verify_birthday()],
        (FlowKind::Scheduling, SessionState::AwaitingAppointment) => vec![make_appointment()],
        (FlowKind::Scheduling, SessionState::AwaitingConfirmation) => vec![confirm_appointment()],
        (FlowKind::PatientIntake, SessionState::CollectingPrescriptions) => {
            vec![list_prescriptions()]
        }
        (FlowKind::PatientIntake, SessionState::CollectingAllergies) => vec![list_allergies()],
        (FlowKind::PatientIntake, SessionState::CollectingConditions) => vec![list_conditions()],
        (FlowKind::PatientIntake, SessionState::CollectingVisitReasons) => {
            vec![list_visit_reasons()]
        }
        // Ended, and states belonging to the other flow (unreachable by
        // construction).
        _ => Vec::new(),
    }
}

fn verify_birthday() -> ToolDefinition {
    ToolDefinition {
        name: VERIFY_BIRTHDAY.to_string(),
        description: "Use this function to verify the user has provided their correct birthday."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "birthday": {
                    "type": "string",
                    "description": "The user's birthdate, including the year. The user can provide it in any format, but convert it to YYYY-MM-DD format to call this function.",
                }
            },
            "required": ["birthday"],
        }),
    }
}

fn make_appointment() -> ToolDefinition {
    ToolDefinition {
        name: MAKE_APPOINTMENT.to_string(),
        description: "Once the user has provided a day and hour for an appointment, call this function. Make sure the user is clear about the day and time; if not, ask again.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "appointment_day": {
                    "type": "string",
                    "description": "The user's requested day for the appointment. The user can provide it in any format, but convert it to MM-DD format to call this function.",
                },
                "appointment_hour": {
                    "type": "string",
                    "description": "The user's requested hour for the appointment. The user can provide it in any format, but convert it to HH:MM in 24 hour format to call this function.",
                },
            },
            "required": ["appointment_day", "appointment_hour"],
        }),
    }
}

fn confirm_appointment() -> ToolDefinition {
    ToolDefinition {
        name: CONFIRM_APPOINTMENT.to_string(),
        description: "Call this when the user has confirmed the appointment.".to_string(),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

fn list_prescriptions() -> ToolDefinition {
    ToolDefinition {
        name: LIST_PRESCRIPTIONS.to_string(),
        description: "Once the user has listed all their prescriptions, call this function."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "prescriptions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "medication": {
                                "type": "string",
                                "description": "The medication's name",
                            },
                            "dosage": {
                                "type": "string",
                                "description": "The prescription's dosage",
                            },
                        },
                        "required": ["medication", "dosage"],
                    },
                }
            },
            "required": ["prescriptions"],
        }),
    }
}

fn list_allergies() -> ToolDefinition {
    ToolDefinition {
        name: LIST_ALLERGIES.to_string(),
        description: "Once the user has listed all their allergies, or confirmed they have none, call this function.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "allergies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {
                                "type": "string",
                                "description": "What the user is allergic to",
                            }
                        },
                        "required": ["name"],
                    },
                }
            },
            "required": ["allergies"],
        }),
    }
}

fn list_conditions() -> ToolDefinition {
    ToolDefinition {
        name: LIST_CONDITIONS.to_string(),
        description: "Once the user has listed all their medical conditions, or confirmed they have none, call this function.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "conditions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {
                                "type": "string",
                                "description": "The user's medical condition",
                            }
                        },
                        "required": ["name"],
                    },
                }
            },
            "required": ["conditions"],
        }),
    }
}

fn list_visit_reasons() -> ToolDefinition {
    ToolDefinition {
        name: LIST_VISIT_REASONS.to_string(),
        description: "Once the user has listed the reasons for their doctor visit, call this function.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "visit_reasons": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {
                                "type": "string",
                                "description": "The user's reason for visiting the doctor",
                            }
                        },
                        "required": ["name"],
                    },
                }
            },
            "required": ["visit_reasons"],
        }),
    }
}
