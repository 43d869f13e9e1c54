//! Episode bookkeeping shared by every environment.

use std::fmt;

use rapier3d::prelude::Real;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    /// Waiting for `reset`; the next `step` resets first.
    Reset,
    Running,
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    Failure,
    /// Truncated at the step limit.
    MaxSteps,
    /// Ended by the host.
    Interrupted,
    /// Physics state went NaN or infinite.
    NumericInstability,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Termination::Success => "success",
            Termination::Failure => "failure",
            Termination::MaxSteps => "max_steps",
            Termination::Interrupted => "interrupted",
            Termination::NumericInstability => "numeric_instability",
        };
        f.write_str(name)
    }
}

/// Report for a finished episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub index: u64,
    pub steps: usize,
    pub cumulative_reward: Real,
    pub termination: Termination,
}

/// Result of one environment tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Vec<f32>,
    pub reward: Real,
    pub done: bool,
    pub termination: Option<Termination>,
}

#[derive(Debug, Clone)]
pub struct EpisodeState {
    phase: EpisodePhase,
    index: u64,
    steps: usize,
    cumulative_reward: Real,
    termination: Option<Termination>,
    max_steps: usize,
}

impl EpisodeState {
    /// `max_steps == 0` disables truncation.
    pub fn new(max_steps: usize) -> Self {
        Self {
            phase: EpisodePhase::Reset,
            index: 0,
            steps: 0,
            cumulative_reward: 0.0,
            termination: None,
            max_steps,
        }
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn cumulative_reward(&self) -> Real {
        self.cumulative_reward
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn is_running(&self) -> bool {
        self.phase == EpisodePhase::Running
    }

    /// Start a new episode.
    pub fn begin(&mut self) {
        if self.steps > 0 || self.termination.is_some() {
            self.index += 1;
        }
        self.phase = EpisodePhase::Running;
        self.steps = 0;
        self.cumulative_reward = 0.0;
        self.termination = None;
    }

    /// Count one tick and its reward.
    pub fn record(&mut self, reward: Real) {
        self.steps += 1;
        self.cumulative_reward += reward;
    }

    pub fn step_limit_reached(&self) -> bool {
        self.max_steps > 0 && self.steps >= self.max_steps
    }

    /// End the episode and report it. Ending twice keeps the first reason.
    pub fn finish(&mut self, termination: Termination) -> EpisodeSummary {
        let termination = *self.termination.get_or_insert(termination);
        self.phase = EpisodePhase::Reset;
        EpisodeSummary {
            index: self.index,
            steps: self.steps,
            cumulative_reward: self.cumulative_reward,
            termination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_starts_in_reset_phase() {
        let episode = EpisodeState::new(10);
        assert_eq!(episode.phase(), EpisodePhase::Reset);
        assert!(!episode.is_running());
    }

    #[test]
    fn test_record_and_finish() {
        let mut episode = EpisodeState::new(3);
        episode.begin();
        episode.record(0.5);
        episode.record(0.25);
        assert!(!episode.step_limit_reached());
        episode.record(0.0);
        assert!(episode.step_limit_reached());

        let summary = episode.finish(Termination::MaxSteps);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.index, 0);
        assert_relative_eq!(summary.cumulative_reward, 0.75);
        assert_eq!(episode.phase(), EpisodePhase::Reset);

        let again = episode.finish(Termination::Interrupted);
        assert_eq!(again.termination, Termination::MaxSteps);

        episode.begin();
        assert_eq!(episode.index(), 1);
        assert_eq!(episode.steps(), 0);
        assert_eq!(episode.termination(), None);
    }

    #[test]
    fn test_zero_max_steps_never_truncates() {
        let mut episode = EpisodeState::new(0);
        episode.begin();
        for _ in 0..10_000 {
            episode.record(0.0);
        }
        assert!(!episode.step_limit_reached());
    }

    #[test]
    fn test_reset_without_steps_keeps_index() {
        let mut episode = EpisodeState::new(5);
        episode.begin();
        episode.begin();
        assert_eq!(episode.index(), 0);
    }
}
