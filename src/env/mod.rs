//! Reset/step environments built on a [`Task`] and a [`SimulationWorld`].

mod ball;
mod reacher;
mod walker;

pub use ball::BallTask;
pub use reacher::ReacherTask;
pub use walker::WalkerTask;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rapier3d::prelude::Real;
use tracing::{debug, info, warn};

use crate::config::{ArenaSettings, ParameterSource};
use crate::episode::{EpisodeState, EpisodeSummary, StepOutcome, Termination};
use crate::error::{ArenaError, Result};
use crate::physics::PhysicsBackend;
use crate::world::SimulationWorld;

pub type ReacherEnv = Arena<ReacherTask>;
pub type WalkerEnv = Arena<WalkerTask>;
pub type BallEnv = Arena<BallTask>;

/// Shape of the actions an environment accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSpace {
    /// Components in `[-1, 1]`; larger values are clamped.
    Continuous(usize),
    /// One integer choice per branch, `0..branch_size`.
    Discrete(Vec<u32>),
}

impl ActionSpace {
    pub fn len(&self) -> usize {
        match self {
            ActionSpace::Continuous(size) => *size,
            ActionSpace::Discrete(branches) => branches.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a trainer sees of an environment.
pub trait Environment {
    fn observation_size(&self) -> usize;

    fn action_size(&self) -> usize;

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Continuous(self.action_size())
    }

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Advance one tick. Stepping a finished episode resets it first.
    fn step(&mut self, action: &[f32]) -> Result<StepOutcome>;

    /// End the running episode on behalf of the host.
    fn terminate(&mut self) -> Option<EpisodeSummary>;

    fn episode(&self) -> &EpisodeState;

    fn last_summary(&self) -> Option<EpisodeSummary>;
}

/// Reward and end condition produced by one tick of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tick {
    pub reward: Real,
    pub termination: Option<Termination>,
}

/// Agent-specific logic driven by [`Arena`].
pub trait Task {
    fn name(&self) -> &'static str;

    fn observation_size(&self) -> usize;

    fn action_size(&self) -> usize;

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Continuous(self.action_size())
    }

    /// Put bodies and targets back to a fresh episode start.
    fn reset(
        &mut self,
        world: &mut SimulationWorld,
        rng: &mut StdRng,
        params: &dyn ParameterSource,
    ) -> Result<()>;

    /// Re-read body state from the world. Fails on NaN or infinite state.
    fn refresh(&mut self, world: &SimulationWorld) -> Result<()>;

    /// Turn the action into forces for the coming physics step.
    fn actuate(&mut self, world: &mut SimulationWorld, action: &[f32]) -> Result<()>;

    /// Reward and termination after the physics step.
    fn evaluate(&mut self, world: &SimulationWorld, rng: &mut StdRng) -> Result<Tick>;

    fn observe(&self) -> Vec<f32>;
}

/// Owns the world, the RNG and the episode state machine for one task.
pub struct Arena<T> {
    world: SimulationWorld,
    task: T,
    rng: StdRng,
    params: Box<dyn ParameterSource>,
    episode: EpisodeState,
    last_summary: Option<EpisodeSummary>,
}

impl<T: Task> Arena<T> {
    pub fn with_task(
        world: SimulationWorld,
        task: T,
        seed: u64,
        max_steps: usize,
        params: Box<dyn ParameterSource>,
    ) -> Self {
        Self {
            world,
            task,
            rng: StdRng::seed_from_u64(seed),
            params,
            episode: EpisodeState::new(max_steps),
            last_summary: None,
        }
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn world(&self) -> &SimulationWorld {
        &self.world
    }

    /// Direct world access, for hosts that perturb the scene between ticks.
    pub fn world_mut(&mut self) -> &mut SimulationWorld {
        &mut self.world
    }

    fn finish(&mut self, termination: Termination) -> EpisodeSummary {
        let summary = self.episode.finish(termination);
        info!(
            task = self.task.name(),
            episode = summary.index,
            steps = summary.steps,
            reward = summary.cumulative_reward,
            termination = %summary.termination,
            "episode finished"
        );
        self.last_summary = Some(summary);
        summary
    }

    fn begin_episode(&mut self) -> Result<Vec<f32>> {
        self.task
            .reset(&mut self.world, &mut self.rng, self.params.as_ref())?;
        self.task.refresh(&self.world)?;
        self.episode.begin();
        debug!(
            task = self.task.name(),
            episode = self.episode.index(),
            "episode reset"
        );
        Ok(self.task.observe())
    }

    /// End the episode on non-finite state and start over right away.
    fn recover(&mut self, err: ArenaError) -> Result<StepOutcome> {
        warn!(task = self.task.name(), error = %err, "non-finite physics state, resetting");
        self.finish(Termination::NumericInstability);
        let observation = self.begin_episode()?;
        Ok(StepOutcome {
            observation,
            reward: 0.0,
            done: true,
            termination: Some(Termination::NumericInstability),
        })
    }
}

impl<T: Task> Environment for Arena<T> {
    fn observation_size(&self) -> usize {
        self.task.observation_size()
    }

    fn action_size(&self) -> usize {
        self.task.action_size()
    }

    fn action_space(&self) -> ActionSpace {
        self.task.action_space()
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        if self.episode.is_running() && self.episode.steps() > 0 {
            self.finish(Termination::Interrupted);
        }
        self.begin_episode()
    }

    fn step(&mut self, action: &[f32]) -> Result<StepOutcome> {
        let expected = self.task.action_size();
        if action.len() != expected {
            return Err(ArenaError::action_length(expected, action.len()));
        }
        if !self.episode.is_running() {
            self.begin_episode()?;
        }

        match self.task.refresh(&self.world) {
            Err(err) if err.is_recoverable() => return self.recover(err),
            other => other?,
        }
        self.task.actuate(&mut self.world, action)?;
        self.world.step();
        match self.task.refresh(&self.world) {
            Err(err) if err.is_recoverable() => return self.recover(err),
            other => other?,
        }

        let tick = self.task.evaluate(&self.world, &mut self.rng)?;
        self.episode.record(tick.reward);
        let termination = tick.termination.or_else(|| {
            self.episode
                .step_limit_reached()
                .then_some(Termination::MaxSteps)
        });
        let observation = self.task.observe();
        if let Some(termination) = termination {
            self.finish(termination);
        }

        Ok(StepOutcome {
            observation,
            reward: tick.reward,
            done: termination.is_some(),
            termination,
        })
    }

    fn terminate(&mut self) -> Option<EpisodeSummary> {
        if !self.episode.is_running() {
            return None;
        }
        Some(self.finish(Termination::Interrupted))
    }

    fn episode(&self) -> &EpisodeState {
        &self.episode
    }

    fn last_summary(&self) -> Option<EpisodeSummary> {
        self.last_summary
    }
}

impl ReacherEnv {
    pub fn new(settings: &ArenaSettings, params: Box<dyn ParameterSource>) -> Result<Self> {
        let mut world = SimulationWorld::new();
        let task = ReacherTask::spawn(&mut world, &settings.reacher)?;
        Ok(Self::with_task(world, task, settings.seed, settings.max_steps, params))
    }

    pub fn from_settings(settings: &ArenaSettings) -> Result<Self> {
        Self::new(settings, Box::new(settings.environment_parameters.clone()))
    }
}

impl WalkerEnv {
    pub fn new(settings: &ArenaSettings, params: Box<dyn ParameterSource>) -> Result<Self> {
        let mut world = SimulationWorld::with_floor(0.0);
        let task = WalkerTask::spawn(&mut world, &settings.walker)?;
        Ok(Self::with_task(world, task, settings.seed, settings.max_steps, params))
    }

    pub fn from_settings(settings: &ArenaSettings) -> Result<Self> {
        Self::new(settings, Box::new(settings.environment_parameters.clone()))
    }
}

impl BallEnv {
    pub fn new(settings: &ArenaSettings, params: Box<dyn ParameterSource>) -> Result<Self> {
        let mut world = SimulationWorld::with_platform(
            ball::PLATFORM_TOP,
            settings.ball.platform_half_extent,
        );
        let task = BallTask::spawn(&mut world, &settings.ball)?;
        Ok(Self::with_task(world, task, settings.seed, settings.max_steps, params))
    }

    pub fn from_settings(settings: &ArenaSettings) -> Result<Self> {
        Self::new(settings, Box::new(settings.environment_parameters.clone()))
    }
}
