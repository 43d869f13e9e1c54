//! Driving environments with simple policies, alone or in parallel.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rapier3d::prelude::Real;
use rayon::prelude::*;
use tracing::info;

use crate::env::{ActionSpace, Environment};
use crate::episode::EpisodeSummary;
use crate::error::Result;

/// Episode length used when the environment itself never truncates.
pub const FALLBACK_EPISODE_TICKS: usize = 1000;

pub trait Policy {
    fn act(&mut self, observation: &[f32]) -> Vec<f32>;
}

/// Uniform random actions from a seeded generator.
pub struct RandomPolicy {
    space: ActionSpace,
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(space: ActionSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _observation: &[f32]) -> Vec<f32> {
        match &self.space {
            ActionSpace::Continuous(size) => {
                (0..*size).map(|_| self.rng.gen_range(-1.0..=1.0)).collect()
            }
            ActionSpace::Discrete(branches) => branches
                .iter()
                .map(|&n| self.rng.gen_range(0..n.max(1)) as f32)
                .collect(),
        }
    }
}

/// Always returns the same action.
#[derive(Debug, Clone)]
pub struct ConstantPolicy {
    pub action: Vec<f32>,
}

impl Policy for ConstantPolicy {
    fn act(&mut self, _observation: &[f32]) -> Vec<f32> {
        self.action.clone()
    }
}

/// Rewards and summaries collected over a run of episodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    /// Reward of every tick, across episode boundaries.
    pub rewards: Vec<Real>,
    pub summaries: Vec<EpisodeSummary>,
}

impl Trajectory {
    pub fn steps(&self) -> usize {
        self.rewards.len()
    }

    pub fn total_reward(&self) -> Real {
        self.rewards.iter().sum()
    }

    pub fn mean_episode_reward(&self) -> Real {
        if self.summaries.is_empty() {
            return 0.0;
        }
        let total: Real = self.summaries.iter().map(|s| s.cumulative_reward).sum();
        total / self.summaries.len() as Real
    }
}

/// Play `episodes` complete episodes.
pub fn run_episodes<E, P>(env: &mut E, policy: &mut P, episodes: usize) -> Result<Trajectory>
where
    E: Environment + ?Sized,
    P: Policy + ?Sized,
{
    let mut trajectory = Trajectory::default();
    if episodes == 0 {
        return Ok(trajectory);
    }

    let truncates = env.episode().max_steps() > 0;
    let mut observation = env.reset()?;
    while trajectory.summaries.len() < episodes {
        let action = policy.act(&observation);
        let outcome = env.step(&action)?;
        trajectory.rewards.push(outcome.reward);

        let mut done = outcome.done;
        if !done && !truncates && env.episode().steps() >= FALLBACK_EPISODE_TICKS {
            env.terminate();
            done = true;
        }

        if done {
            if let Some(summary) = env.last_summary() {
                trajectory.summaries.push(summary);
            }
            if trajectory.summaries.len() < episodes {
                observation = env.reset()?;
            }
        } else {
            observation = outcome.observation;
        }
    }
    Ok(trajectory)
}

/// One seeded environment and random policy per seed, run on the rayon pool.
pub fn parallel_rollouts<E, F>(seeds: &[u64], episodes: usize, make_env: F) -> Result<Vec<Trajectory>>
where
    E: Environment,
    F: Fn(u64) -> Result<E> + Sync,
{
    let start = Instant::now();
    let trajectories: Vec<Trajectory> = seeds
        .par_iter()
        .map(|&seed| {
            let mut env = make_env(seed)?;
            let mut policy = RandomPolicy::new(env.action_space(), seed);
            run_episodes(&mut env, &mut policy, episodes)
        })
        .collect::<Result<_>>()?;

    let steps: usize = trajectories.iter().map(Trajectory::steps).sum();
    let secs = start.elapsed().as_secs_f64().max(1e-9);
    let mean_reward = if trajectories.is_empty() {
        0.0
    } else {
        trajectories.iter().map(Trajectory::mean_episode_reward).sum::<Real>()
            / trajectories.len() as Real
    };
    info!(
        rollouts = seeds.len(),
        steps,
        steps_per_sec = steps as f64 / secs,
        mean_reward,
        "parallel rollouts finished"
    );
    Ok(trajectories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaSettings;
    use crate::env::{BallEnv, ReacherEnv};

    fn reacher(seed: u64, max_steps: usize) -> Result<ReacherEnv> {
        let settings = ArenaSettings {
            seed,
            max_steps,
            ..ArenaSettings::default()
        };
        ReacherEnv::from_settings(&settings)
    }

    #[test]
    fn test_random_policy_respects_space() {
        let mut continuous = RandomPolicy::new(ActionSpace::Continuous(6), 1);
        let action = continuous.act(&[]);
        assert_eq!(action.len(), 6);
        assert!(action.iter().all(|v| (-1.0..=1.0).contains(v)));

        let mut discrete = RandomPolicy::new(ActionSpace::Discrete(vec![2, 3]), 1);
        for _ in 0..50 {
            let action = discrete.act(&[]);
            assert!(action[0] == 0.0 || action[0] == 1.0);
            assert!([0.0, 1.0, 2.0].contains(&action[1]));
        }
    }

    #[test]
    fn test_run_episodes_collects_summaries() {
        let mut env = reacher(3, 20).unwrap();
        let mut policy = ConstantPolicy {
            action: vec![0.5; 4],
        };
        let trajectory = run_episodes(&mut env, &mut policy, 3).unwrap();
        assert_eq!(trajectory.summaries.len(), 3);
        assert_eq!(trajectory.steps(), 60);
        assert!(trajectory.summaries.iter().all(|s| s.steps == 20));
    }

    #[test]
    fn test_fallback_length_without_step_limit() {
        let mut env = reacher(3, 0).unwrap();
        let mut policy = ConstantPolicy {
            action: vec![0.0; 4],
        };
        let trajectory = run_episodes(&mut env, &mut policy, 1).unwrap();
        assert_eq!(trajectory.steps(), FALLBACK_EPISODE_TICKS);
    }

    #[test]
    fn test_parallel_rollouts_are_seed_deterministic() {
        let seeds = [1, 2, 1];
        let runs = parallel_rollouts(&seeds, 2, |seed| reacher(seed, 30)).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], runs[2]);
    }

    #[test]
    fn test_parallel_ball_rollouts() {
        let runs = parallel_rollouts(&[7, 8], 1, |seed| {
            let settings = ArenaSettings {
                seed,
                max_steps: 100,
                ..ArenaSettings::default()
            };
            BallEnv::from_settings(&settings)
        })
        .unwrap();
        assert!(runs.iter().all(|run| run.summaries.len() == 1));
    }
}
