use super::events::{BatchEvent, SeedJobEvent};
use super::states::{BatchState, SeedJobState};
use crate::error::{BatchError, BatchResult};

/// Transition table for [`BatchState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStateMachine;

impl BatchStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: BatchState,
        event: &BatchEvent,
    ) -> BatchResult<BatchState> {
        let target = match (current_state, event) {
            (BatchState::Active, BatchEvent::CompleteSeeding) => BatchState::SeedingComplete,

            (BatchState::SeedingComplete, BatchEvent::FinishJobs) => BatchState::Completed,

            // Deletion is allowed from every live state
            (from, BatchEvent::Delete) if !from.is_terminal() => BatchState::Deleted,

            (from_state, _) => {
                return Err(BatchError::state(format!(
                    "invalid batch transition from {from_state} on {}",
                    event.event_type()
                )))
            }
        };

        Ok(target)
    }
}

/// Transition table for [`SeedJobState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedJobStateMachine;

impl SeedJobStateMachine {
    pub fn determine_target_state(
        current_state: SeedJobState,
        event: &SeedJobEvent,
    ) -> BatchResult<SeedJobState> {
        let target = match (current_state, event) {
            (SeedJobState::Pending | SeedJobState::Rescheduled, SeedJobEvent::Start) => {
                SeedJobState::Running
            }
            (SeedJobState::Running, SeedJobEvent::Reschedule) => SeedJobState::Rescheduled,
            (SeedJobState::Running, SeedJobEvent::Exhaust) => SeedJobState::Done,
            (SeedJobState::Running, SeedJobEvent::Fail(_)) => SeedJobState::Pending,

            (from_state, _) => {
                return Err(BatchError::state(format!(
                    "invalid seed job transition from {from_state} on {}",
                    event.event_type()
                )))
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_lifecycle() {
        let state = BatchStateMachine::determine_target_state(
            BatchState::Active,
            &BatchEvent::CompleteSeeding,
        )
        .unwrap();
        assert_eq!(state, BatchState::SeedingComplete);

        let state =
            BatchStateMachine::determine_target_state(state, &BatchEvent::FinishJobs).unwrap();
        assert_eq!(state, BatchState::Completed);

        let state = BatchStateMachine::determine_target_state(state, &BatchEvent::Delete).unwrap();
        assert_eq!(state, BatchState::Deleted);
    }

    #[test]
    fn test_batch_invalid_transitions() {
        // Jobs cannot finish before seeding completed
        assert!(matches!(
            BatchStateMachine::determine_target_state(BatchState::Active, &BatchEvent::FinishJobs),
            Err(BatchError::State(_))
        ));
        assert!(BatchStateMachine::determine_target_state(
            BatchState::Completed,
            &BatchEvent::CompleteSeeding
        )
        .is_err());
        assert!(
            BatchStateMachine::determine_target_state(BatchState::Deleted, &BatchEvent::Delete)
                .is_err()
        );
    }

    #[test]
    fn test_seed_job_reschedules_in_place() {
        let running =
            SeedJobStateMachine::determine_target_state(SeedJobState::Pending, &SeedJobEvent::Start)
                .unwrap();
        let rescheduled =
            SeedJobStateMachine::determine_target_state(running, &SeedJobEvent::Reschedule)
                .unwrap();
        assert_eq!(rescheduled, SeedJobState::Rescheduled);

        let running =
            SeedJobStateMachine::determine_target_state(rescheduled, &SeedJobEvent::Start).unwrap();
        assert_eq!(
            SeedJobStateMachine::determine_target_state(running, &SeedJobEvent::Exhaust).unwrap(),
            SeedJobState::Done
        );
        assert!(
            SeedJobStateMachine::determine_target_state(SeedJobState::Done, &SeedJobEvent::Start)
                .is_err()
        );
    }

    #[test]
    fn test_seed_job_failure_returns_to_pending() {
        let state = SeedJobStateMachine::determine_target_state(
            SeedJobState::Running,
            &SeedJobEvent::Fail("store unavailable".to_string()),
        )
        .unwrap();
        assert_eq!(state, SeedJobState::Pending);
    }
}
