//! Runtime tunables and YAML settings.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::warn;

use crate::error::Result;

// Reset parameter names
pub const GOAL_SIZE: &str = "goal_size";
pub const GOAL_SPEED: &str = "goal_speed";
pub const DEVIATION: &str = "deviation";
pub const DEVIATION_FREQ: &str = "deviation_freq";
pub const CHEST_MASS: &str = "chest_mass";
pub const SPINE_MASS: &str = "spine_mass";
pub const HIP_MASS: &str = "hip_mass";

/// Where environments read their reset-time tunables from.
pub trait ParameterSource: Send {
    fn get_with_default(&self, name: &str, default: f32) -> f32;
}

/// Named tunables loaded from YAML or set by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentParameters {
    values: HashMap<String, Value>,
}

impl EnvironmentParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: f32) {
        self.values.insert(key.into(), Value::from(f64::from(value)));
    }

    pub fn set_raw(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get_parameter(&self, key: &str) -> Option<f32> {
        self.values.get(key).and_then(parse_number)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParameterSource for EnvironmentParameters {
    fn get_with_default(&self, name: &str, default: f32) -> f32 {
        match self.values.get(name) {
            None => default,
            Some(raw) => match parse_number(raw) {
                Some(value) => value,
                None => {
                    warn!(parameter = name, ?raw, default, "malformed parameter, using default");
                    default
                }
            },
        }
    }
}

fn parse_number(value: &Value) -> Option<f32> {
    let parsed = match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReacherSettings {
    #[serde(default = "default_segment_count")]
    pub segment_count: usize,
    #[serde(default = "default_segment_length")]
    pub segment_length: f32,
    #[serde(default = "default_goal_size")]
    pub goal_size: f32,
    #[serde(default = "default_goal_speed")]
    pub goal_speed: f32,
    #[serde(default)]
    pub deviation: f32,
    #[serde(default)]
    pub deviation_freq: f32,
}

impl Default for ReacherSettings {
    fn default() -> Self {
        Self {
            segment_count: default_segment_count(),
            segment_length: default_segment_length(),
            goal_size: default_goal_size(),
            goal_speed: default_goal_speed(),
            deviation: 0.0,
            deviation_freq: 0.0,
        }
    }
}

fn default_segment_count() -> usize { 2 }
fn default_segment_length() -> f32 { 5.0 }
fn default_goal_size() -> f32 { 5.0 }
fn default_goal_speed() -> f32 { 1.0 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkerSettings {
    #[serde(default = "default_target_spawn_radius")]
    pub target_spawn_radius: f32,
    #[serde(default = "default_target_spawn_height")]
    pub target_spawn_height: f32,
    #[serde(default = "default_true")]
    pub random_start_yaw: bool,
    #[serde(default)]
    pub respawn_target_on_touch: bool,
    #[serde(default = "default_touch_distance")]
    pub target_touch_distance: f32,
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    /// Reward given when the torso or head hits the ground.
    #[serde(default = "default_fall_penalty")]
    pub fall_penalty: f32,
    #[serde(default = "default_body_part_mass")]
    pub chest_mass: f32,
    #[serde(default = "default_body_part_mass")]
    pub spine_mass: f32,
    #[serde(default = "default_body_part_mass")]
    pub hip_mass: f32,
    #[serde(default = "default_joint_stiffness")]
    pub joint_stiffness: f32,
    #[serde(default = "default_joint_damping")]
    pub joint_damping: f32,
    #[serde(default = "default_max_joint_force_limit")]
    pub max_joint_force_limit: f32,
}

impl Default for WalkerSettings {
    fn default() -> Self {
        Self {
            target_spawn_radius: default_target_spawn_radius(),
            target_spawn_height: default_target_spawn_height(),
            random_start_yaw: true,
            respawn_target_on_touch: false,
            target_touch_distance: default_touch_distance(),
            max_speed: default_max_speed(),
            fall_penalty: default_fall_penalty(),
            chest_mass: default_body_part_mass(),
            spine_mass: default_body_part_mass(),
            hip_mass: default_body_part_mass(),
            joint_stiffness: default_joint_stiffness(),
            joint_damping: default_joint_damping(),
            max_joint_force_limit: default_max_joint_force_limit(),
        }
    }
}

fn default_target_spawn_radius() -> f32 { 15.0 }
fn default_target_spawn_height() -> f32 { 5.0 }
fn default_true() -> bool { true }
fn default_touch_distance() -> f32 { 1.0 }
fn default_max_speed() -> f32 { 999.0 }
fn default_fall_penalty() -> f32 { 0.0 }
fn default_body_part_mass() -> f32 { 8.0 }
fn default_joint_stiffness() -> f32 { 400.0 }
fn default_joint_damping() -> f32 { 40.0 }
fn default_max_joint_force_limit() -> f32 { 400.0 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallSettings {
    #[serde(default = "default_ball_speed")]
    pub speed: f32,
    #[serde(default = "default_platform_half_extent")]
    pub platform_half_extent: f32,
}

impl Default for BallSettings {
    fn default() -> Self {
        Self {
            speed: default_ball_speed(),
            platform_half_extent: default_platform_half_extent(),
        }
    }
}

fn default_ball_speed() -> f32 { 40.0 }
fn default_platform_half_extent() -> f32 { 1.0 }

/// Top-level settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaSettings {
    #[serde(default)]
    pub seed: u64,
    /// Ticks before an episode is truncated; 0 disables the limit.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub reacher: ReacherSettings,
    #[serde(default)]
    pub walker: WalkerSettings,
    #[serde(default)]
    pub ball: BallSettings,
    #[serde(default)]
    pub environment_parameters: EnvironmentParameters,
}

fn default_max_steps() -> usize { 5000 }

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            max_steps: default_max_steps(),
            reacher: ReacherSettings::default(),
            walker: WalkerSettings::default(),
            ball: BallSettings::default(),
            environment_parameters: EnvironmentParameters::default(),
        }
    }
}

impl ArenaSettings {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document is a valid, all-default settings file.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameters_fall_back_on_missing_and_malformed() {
        let mut params = EnvironmentParameters::new();
        params.set_parameter(GOAL_SPEED, 2.5);
        params.set_raw(GOAL_SIZE, Value::from("3.5"));
        params.set_raw(DEVIATION, Value::from("wobbly"));
        params.set_raw(DEVIATION_FREQ, Value::Sequence(vec![]));

        assert_relative_eq!(params.get_with_default(GOAL_SPEED, 1.0), 2.5);
        assert_relative_eq!(params.get_with_default(GOAL_SIZE, 5.0), 3.5);
        assert_relative_eq!(params.get_with_default(DEVIATION, 0.0), 0.0);
        assert_relative_eq!(params.get_with_default(DEVIATION_FREQ, 0.5), 0.5);
        assert_relative_eq!(params.get_with_default(HIP_MASS, 8.0), 8.0);
    }

    #[test]
    fn test_settings_from_yaml() {
        let yaml = r#"
seed: 42
max_steps: 300
reacher:
  segment_count: 3
walker:
  respawn_target_on_touch: true
environment_parameters:
  goal_size: 2
  goal_speed: "0.5"
"#;
        let settings = ArenaSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.seed, 42);
        assert_eq!(settings.max_steps, 300);
        assert_eq!(settings.reacher.segment_count, 3);
        assert_relative_eq!(settings.reacher.segment_length, 5.0);
        assert!(settings.walker.respawn_target_on_touch);
        assert!(settings.walker.random_start_yaw);
        assert_relative_eq!(settings.ball.speed, 40.0);
        let params = &settings.environment_parameters;
        assert_relative_eq!(params.get_with_default(GOAL_SIZE, 5.0), 2.0);
        assert_relative_eq!(params.get_with_default(GOAL_SPEED, 1.0), 0.5);
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = ArenaSettings::from_yaml_str("").unwrap();
        assert_eq!(settings.max_steps, 5000);
        assert!(settings.environment_parameters.is_empty());
    }

    #[test]
    fn test_bad_yaml_is_an_error() {
        assert!(ArenaSettings::from_yaml_str("max_steps: [1, 2").is_err());
    }
}
