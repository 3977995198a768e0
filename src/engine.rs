//! Session execution engine
//!
//! A pure run-to-suspension walk over the flow graph. Each call consumes one
//! inbound event and produces the next session state plus everything to send
//! back; persistence and transport live in `runtime`.

mod clock;
mod input;
pub mod message;
pub mod state;
mod turn;

#[cfg(test)]
mod proptests;

pub use clock::{Clock, FixedClock, RandomIds, SystemClock};
pub use message::{ButtonOption, InboundPayload, OutboundMessage, SideEffects, TurnOutput};
pub use state::{LogEntry, SessionState, SessionStatus, WaitingFor};
pub use turn::{new_session, run_turn, EngineError, TurnContext, TurnOutcome};
