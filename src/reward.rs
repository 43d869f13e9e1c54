//! Per-tick reward policies.

use rapier3d::na::Vector3;
use rapier3d::prelude::Real;

pub const REACHER_PROGRESS_REWARD: Real = 0.001;
pub const TARGET_TOUCH_REWARD: Real = 1.0;
pub const BALL_SUCCESS_REWARD: Real = 1.0;

/// Rewards the reacher for every strict improvement over its best hand-to-goal distance.
#[derive(Debug, Clone, Copy)]
pub struct ReacherReward {
    checkpoint: Real,
}

impl Default for ReacherReward {
    fn default() -> Self {
        Self {
            checkpoint: Real::INFINITY,
        }
    }
}

impl ReacherReward {
    /// Start the episode with a known distance.
    pub fn reset_to(&mut self, distance: Real) {
        self.checkpoint = distance;
    }

    pub fn checkpoint(&self) -> Real {
        self.checkpoint
    }

    pub fn evaluate(&mut self, distance: Real) -> Real {
        if distance < self.checkpoint {
            self.checkpoint = distance;
            REACHER_PROGRESS_REWARD
        } else {
            0.0
        }
    }
}

/// Shaping terms that make up the walker's reward for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WalkerRewardTerms {
    pub velocity: Real,
    pub facing: Real,
    pub height: Real,
}

impl WalkerRewardTerms {
    pub fn total(&self) -> Real {
        self.velocity + self.facing + self.height
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WalkerReward {
    pub max_speed: Real,
    pub velocity_weight: Real,
    pub facing_weight: Real,
    pub height_weight: Real,
}

impl Default for WalkerReward {
    fn default() -> Self {
        Self {
            max_speed: 999.0,
            velocity_weight: 0.02,
            facing_weight: 0.01,
            height_weight: 0.01,
        }
    }
}

/// Body measurements the walker reward reads.
#[derive(Debug, Clone, Copy)]
pub struct WalkerPosture {
    /// Walk direction, unit length on the ground plane.
    pub forward: Vector3<Real>,
    pub hips_velocity: Vector3<Real>,
    pub head_forward: Vector3<Real>,
    pub head_height: Real,
    pub left_foot_height: Real,
    pub right_foot_height: Real,
}

impl WalkerReward {
    pub fn terms(&self, posture: &WalkerPosture) -> WalkerRewardTerms {
        let velocity = clamp_magnitude(posture.hips_velocity, self.max_speed);
        WalkerRewardTerms {
            velocity: self.velocity_weight * posture.forward.dot(&velocity),
            facing: self.facing_weight * posture.forward.dot(&posture.head_forward),
            height: self.height_weight
                * ((posture.head_height - posture.left_foot_height)
                    + (posture.head_height - posture.right_foot_height)),
        }
    }

    pub fn evaluate(&self, posture: &WalkerPosture) -> Real {
        self.terms(posture).total()
    }
}

/// `+1` once the ball is close enough to the target; the reward replaces anything
/// accumulated that tick.
#[derive(Debug, Clone, Copy)]
pub struct BallReward {
    pub success_distance: Real,
}

impl Default for BallReward {
    fn default() -> Self {
        Self {
            success_distance: 0.1,
        }
    }
}

impl BallReward {
    pub fn reached(&self, distance: Real) -> bool {
        distance < self.success_distance
    }
}

pub fn clamp_magnitude(v: Vector3<Real>, max: Real) -> Vector3<Real> {
    let norm = v.norm();
    if norm > max && norm > 0.0 {
        v * (max / norm)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reacher_rewards_only_strict_improvement() {
        let mut reward = ReacherReward::default();
        reward.reset_to(5.0);
        assert_relative_eq!(reward.evaluate(4.0), 0.001);
        assert_relative_eq!(reward.evaluate(4.0), 0.0);
        assert_relative_eq!(reward.evaluate(4.5), 0.0);
        assert_relative_eq!(reward.checkpoint(), 4.0);
        assert_relative_eq!(reward.evaluate(3.9), 0.001);
    }

    #[test]
    fn test_reacher_reward_is_monotone_in_checkpoint() {
        let mut reward = ReacherReward::default();
        reward.reset_to(10.0);
        assert_relative_eq!(reward.evaluate(10.0), 0.0);
        let distances = [9.0, 9.5, 8.0, 8.0, 12.0, 1.0];
        let mut last = reward.checkpoint();
        for d in distances {
            let r = reward.evaluate(d);
            let now = reward.checkpoint();
            assert!(now <= last);
            assert_eq!(r > 0.0, d < last);
            last = now;
        }
    }

    #[test]
    fn test_walker_reward_terms() {
        let reward = WalkerReward::default();
        let posture = WalkerPosture {
            forward: Vector3::z(),
            hips_velocity: Vector3::new(0.0, 0.0, 2.0),
            head_forward: Vector3::z(),
            head_height: 1.8,
            left_foot_height: 0.1,
            right_foot_height: 0.1,
        };
        let terms = reward.terms(&posture);
        assert_relative_eq!(terms.velocity, 0.04, epsilon = 1e-6);
        assert_relative_eq!(terms.facing, 0.01, epsilon = 1e-6);
        assert_relative_eq!(terms.height, 0.034, epsilon = 1e-6);
        assert_relative_eq!(reward.evaluate(&posture), 0.084, epsilon = 1e-6);
    }

    #[test]
    fn test_walker_velocity_is_clamped() {
        let reward = WalkerReward {
            max_speed: 1.0,
            ..WalkerReward::default()
        };
        let posture = WalkerPosture {
            forward: Vector3::z(),
            hips_velocity: Vector3::new(0.0, 0.0, 50.0),
            head_forward: -Vector3::z(),
            head_height: 0.0,
            left_foot_height: 0.0,
            right_foot_height: 0.0,
        };
        let terms = reward.terms(&posture);
        assert_relative_eq!(terms.velocity, 0.02, epsilon = 1e-6);
        assert_relative_eq!(terms.facing, -0.01, epsilon = 1e-6);
    }

    #[test]
    fn test_ball_success_radius() {
        let reward = BallReward::default();
        assert!(reward.reached(0.05));
        assert!(!reward.reached(0.1));
    }
}
