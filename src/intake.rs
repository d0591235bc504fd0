//! Intake state machine
//!
//! States, state-derived tool gating, argument validation, and the pure
//! transition function that decides what every tool invocation does.

pub mod state;
pub mod tools;
pub mod transition;
pub mod validate;


pub use state::{CollectedData, FlowKind, SessionState};
pub use transition::{handle_tool_call, Disposition, TurnTransition};
pub use validate::Rejection;
