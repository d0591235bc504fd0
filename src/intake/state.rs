//! Session states, flow variants, and collected intake data

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which scripted flow a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Verify identity, book a slot, confirm it.
    Scheduling,
    /// Verify identity, then capture prescriptions, allergies, conditions,
    /// and visit reasons in sequence.
    PatientIntake,
}

impl std::str::FromStr for FlowKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "scheduling" => Ok(FlowKind::Scheduling),
            "intake" | "patient_intake" => Ok(FlowKind::PatientIntake),
            other => Err(format!("unknown flow {other:?} (expected \"scheduling\" or \"intake\")")),
        }
    }
}

/// Session state. Exactly one is active at a time; transitions happen only
/// through successful validated tool calls, never through plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingIdentity,
    // Scheduling flow
    AwaitingAppointment,
    AwaitingConfirmation,
    // Patient-intake flow
    CollectingPrescriptions,
    CollectingAllergies,
    CollectingConditions,
    CollectingVisitReasons,
    /// No outgoing transitions; the tool set is empty.
    Ended,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Ended)
    }
}

/// A validated appointment slot (same-year, so no year field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl AppointmentSlot {
    pub fn minute_of_day(self) -> u32 {
        self.hour * 60 + self.minute
    }
}

/// One captured prescription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub medication: String,
    pub dosage: String,
}

/// Wire shape for list captures whose entries are `{"name": ...}` objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedItem {
    pub name: String,
}

/// Structured facts confirmed so far.
///
/// Owned by the session for its lifetime and dropped with it; nothing is
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedData {
    pub birthday: Option<NaiveDate>,
    pub appointment: Option<AppointmentSlot>,
    pub prescriptions: Vec<Prescription>,
    pub allergies: Vec<String>,
    pub conditions: Vec<String>,
    pub visit_reasons: Vec<String>,
}

// ============================================================================
// Tool argument shapes - one typed struct per tool
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyBirthdayArgs {
    pub birthday: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MakeAppointmentArgs {
    pub appointment_day: String,
    pub appointment_hour: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListPrescriptionsArgs {
    pub prescriptions: Vec<Prescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListAllergiesArgs {
    pub allergies: Vec<NamedItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListConditionsArgs {
    pub conditions: Vec<NamedItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListVisitReasonsArgs {
    pub visit_reasons: Vec<NamedItem>,
}
