// State machine module for batch and job lifecycles
//
// Transition tables are pure functions over (state, event); persistence happens through the
// store's atomic commits, not here.

pub mod batch_state_machine;
pub mod events;
pub mod states;

// Re-export main types for convenient access
pub use batch_state_machine::{BatchStateMachine, SeedJobStateMachine};
pub use events::{BatchEvent, SeedJobEvent};
pub use states::{BatchState, JobState, SeedJobState};
