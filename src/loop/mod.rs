//! The control loop: state machine, controller, and final outcomes.
//!
//! One [`controller::LoopController`] instance drives one request at a
//! time through the ANALYZE -> HYPOTHESIZE -> CODE -> VALIDATE -> audit
//! sequence. Independent requests run on independent controller instances
//! with no shared mutable state.

pub mod controller;
pub mod state;

pub use controller::LoopController;
pub use state::{FinalOutcome, LoopPhase, OutcomeStatus};
