//! Run and step state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an operation reports when it finishes without raising
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Success,
    Failed,
}

impl StepOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, StepOutcome::Success)
    }
}

/// State of one step as seen by observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    NotStarted,
    Running,
    Success,
    Failed,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepState::Success | StepState::Failed)
    }
}

impl From<StepOutcome> for StepState {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Success => StepState::Success,
            StepOutcome::Failed => StepState::Failed,
        }
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Storage and initial input are being prepared
    Initializing,
    /// A step is executing
    Running,
    /// Every step succeeded
    Completed,
    /// A step failed or raised; later steps were not run
    Failed,
    /// Cancellation was requested and observed
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Progress record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,

    pub pipeline_id: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    pub total_steps: usize,

    /// Index of the step currently or last executed
    pub current_step: Option<usize>,

    pub completed_steps: usize,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, pipeline_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            run_id: run_id.into(),
            pipeline_id: pipeline_id.into(),
            status: RunStatus::Initializing,
            started_at: Utc::now(),
            completed_at: None,
            total_steps,
            current_step: None,
            completed_steps: 0,
        }
    }

    /// Enter the given step
    pub fn advance(&mut self, step_index: usize) {
        self.status = RunStatus::Running;
        self.current_step = Some(step_index);
    }

    pub fn step_succeeded(&mut self) {
        self.completed_steps += 1;
    }

    pub fn complete(&mut self) {
        self.finish(RunStatus::Completed);
    }

    pub fn fail(&mut self) {
        self.finish(RunStatus::Failed);
    }

    pub fn cancel(&mut self) {
        self.finish(RunStatus::Cancelled);
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Fraction of steps completed (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 1.0;
        }
        self.completed_steps as f64 / self.total_steps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!StepState::NotStarted.is_terminal());
        assert!(!StepState::Running.is_terminal());
        assert!(StepState::Success.is_terminal());
        assert!(StepState::from(StepOutcome::Failed).is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_run_progress() {
        let mut state = RunState::new("r", "p", 4);
        assert_eq!(state.progress(), 0.0);

        state.advance(0);
        state.step_succeeded();
        state.advance(1);
        state.step_succeeded();
        assert_eq!(state.progress(), 0.5);
        assert_eq!(state.current_step, Some(1));

        state.fail();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.completed_at.is_some());
    }
}
