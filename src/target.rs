//! Goals the agents move towards.

use rand::Rng;
use rapier3d::na::Vector3;
use rapier3d::prelude::Real;

pub const ORBIT_RADIUS: Real = 8.0 * 1.2;

/// Parameters an orbiting goal is reset with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitParams {
    pub goal_size: Real,
    pub goal_speed: Real,
    pub deviation: Real,
    pub deviation_freq: Real,
}

impl Default for OrbitParams {
    fn default() -> Self {
        Self {
            goal_size: 5.0,
            goal_speed: 1.0,
            deviation: 0.0,
            deviation_freq: 0.0,
        }
    }
}

/// Goal circling the reacher's pivot in the horizontal plane.
#[derive(Debug, Clone, Copy)]
pub struct OrbitingGoal {
    origin: Vector3<Real>,
    /// Current angle in degrees, kept in `[0, 360)`.
    angle: Real,
    /// Degrees per tick; may be negative.
    speed: Real,
    size: Real,
    deviation: Real,
    deviation_freq: Real,
    position: Vector3<Real>,
}

impl OrbitingGoal {
    pub fn new(origin: Vector3<Real>) -> Self {
        let mut goal = Self {
            origin,
            angle: 0.0,
            speed: 0.0,
            size: OrbitParams::default().goal_size,
            deviation: 0.0,
            deviation_freq: 0.0,
            position: origin,
        };
        goal.update_position();
        goal
    }

    pub fn randomize<R: Rng>(&mut self, rng: &mut R, params: &OrbitParams) {
        self.angle = rng.gen_range(0.0..360.0);
        self.speed = rng.gen_range(-1.0..1.0) * params.goal_speed;
        self.size = params.goal_size;
        self.deviation = params.deviation;
        self.deviation_freq = params.deviation_freq;
        self.update_position();
    }

    /// Move the goal along its orbit by one tick.
    pub fn advance(&mut self) {
        self.angle = wrap_degrees(self.angle + self.speed);
        self.update_position();
    }

    pub fn position(&self) -> Vector3<Real> {
        self.position
    }

    pub fn angle(&self) -> Real {
        self.angle
    }

    pub fn speed(&self) -> Real {
        self.speed
    }

    /// Uniform scale of the goal.
    pub fn size(&self) -> Real {
        self.size
    }

    fn update_position(&mut self) {
        let radians = self.angle.to_radians();
        let offset = Vector3::new(
            ORBIT_RADIUS * radians.sin(),
            self.deviation * (self.deviation_freq * radians).cos(),
            ORBIT_RADIUS * radians.cos(),
        );
        self.position = self.origin + offset;
    }
}

fn wrap_degrees(angle: Real) -> Real {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

const RESPAWN_ATTEMPTS: usize = 64;

/// Target dropped at a random point around the agent, hovering at a fixed height.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRadiusTarget {
    origin: Vector3<Real>,
    pub radius: Real,
    pub height: Real,
    position: Vector3<Real>,
}

impl SpawnRadiusTarget {
    pub fn new(origin: Vector3<Real>, radius: Real, height: Real) -> Self {
        Self {
            origin,
            radius,
            height,
            position: origin + Vector3::new(0.0, height, 0.0),
        }
    }

    pub fn respawn<R: Rng>(&mut self, rng: &mut R) {
        let mut offset = inside_unit_sphere(rng) * self.radius;
        offset.y = self.height;
        self.position = self.origin + offset;
    }

    /// Respawn until none of `avoid` lies within `clearance` on the ground plane.
    ///
    /// Gives up after a fixed number of draws and keeps the last one.
    pub fn respawn_clear_of<R: Rng>(
        &mut self,
        rng: &mut R,
        avoid: &[Vector3<Real>],
        clearance: Real,
    ) {
        for _ in 0..RESPAWN_ATTEMPTS {
            self.respawn(rng);
            if !avoid.iter().any(|point| self.within(point, clearance)) {
                return;
            }
        }
    }

    /// `point` is closer than `distance` to the target, ignoring height.
    pub fn within(&self, point: &Vector3<Real>, distance: Real) -> bool {
        let mut offset = point - self.position;
        offset.y = 0.0;
        offset.norm() < distance
    }

    pub fn position(&self) -> Vector3<Real> {
        self.position
    }

    pub fn origin(&self) -> Vector3<Real> {
        self.origin
    }
}

/// Rejection-sample a point inside the unit sphere.
pub fn inside_unit_sphere<R: Rng>(rng: &mut R) -> Vector3<Real> {
    loop {
        let p = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if p.norm_squared() <= 1.0 {
            return p;
        }
    }
}

/// Target for the rolling ball, placed uniformly in a box beside the start.
#[derive(Debug, Clone, Copy)]
pub struct BallTarget {
    origin: Vector3<Real>,
    position: Vector3<Real>,
}

impl BallTarget {
    pub fn new(origin: Vector3<Real>) -> Self {
        Self {
            origin,
            position: origin,
        }
    }

    pub fn respawn<R: Rng>(&mut self, rng: &mut R) {
        let draws: [Real; 3] = [rng.gen(), rng.gen(), rng.gen()];
        self.position = self.origin + Self::local_position(draws);
    }

    /// Map three uniform `[0, 1)` draws onto the target box.
    pub fn local_position([rx, ry, rz]: [Real; 3]) -> Vector3<Real> {
        Vector3::new(-1.5 * rx * 0.7, -0.5 + ry, -0.8 + rz * 1.6)
    }

    pub fn position(&self) -> Vector3<Real> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_goal_angle_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut goal = OrbitingGoal::new(Vector3::zeros());
        let params = OrbitParams {
            goal_speed: 250.0,
            ..OrbitParams::default()
        };
        for _ in 0..50 {
            goal.randomize(&mut rng, &params);
            for _ in 0..20 {
                assert!((0.0..360.0).contains(&goal.angle()));
                assert!(goal.speed().abs() <= 250.0);
                goal.advance();
            }
        }
    }

    #[test]
    fn test_goal_orbits_at_fixed_radius() {
        let origin = Vector3::new(1.0, 2.0, 3.0);
        let mut rng = StdRng::seed_from_u64(11);
        let mut goal = OrbitingGoal::new(origin);
        goal.randomize(&mut rng, &OrbitParams::default());
        for _ in 0..100 {
            let offset = goal.position() - origin;
            assert_relative_eq!(offset.y, 0.0);
            assert_relative_eq!(offset.xz().norm(), ORBIT_RADIUS, epsilon = 1e-4);
            goal.advance();
        }
    }

    #[test]
    fn test_goal_deviation() {
        let mut goal = OrbitingGoal::new(Vector3::zeros());
        goal.deviation = 2.0;
        goal.deviation_freq = 1.0;
        goal.update_position();
        // Angle zero sits on +z at the top of the deviation.
        assert_relative_eq!(goal.position().z, ORBIT_RADIUS);
        assert_relative_eq!(goal.position().y, 2.0);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_relative_eq!(wrap_degrees(370.0), 10.0, epsilon = 1e-4);
        assert_relative_eq!(wrap_degrees(-10.0), 350.0, epsilon = 1e-4);
        assert!(wrap_degrees(-1e-9) < 360.0);
    }

    #[test]
    fn test_spawn_point_within_radius() {
        let origin = Vector3::new(5.0, 0.0, -5.0);
        let mut target = SpawnRadiusTarget::new(origin, 15.0, 5.0);
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..500 {
            target.respawn(&mut rng);
            let offset = target.position() - origin;
            assert_relative_eq!(offset.y, 5.0);
            assert!(offset.xz().norm() <= 15.0 + 1e-4);
        }
    }

    #[test]
    fn test_respawn_keeps_clear_of_points() {
        let origin = Vector3::zeros();
        let mut target = SpawnRadiusTarget::new(origin, 15.0, 5.0);
        let mut rng = StdRng::seed_from_u64(22);
        let feet = [Vector3::new(0.0, 0.1, 0.0), Vector3::new(2.0, 0.1, 0.0)];
        for _ in 0..200 {
            target.respawn_clear_of(&mut rng, &feet, 10.0);
            for foot in &feet {
                assert!(!target.within(foot, 10.0));
            }
        }
    }

    #[test]
    fn test_ball_target_box() {
        let near = BallTarget::local_position([0.0; 3]);
        assert_relative_eq!(near.x, 0.0);
        assert_relative_eq!(near.y, -0.5);
        assert_relative_eq!(near.z, -0.8);
        let far = BallTarget::local_position([1.0; 3]);
        assert_relative_eq!(far.x, -1.05, epsilon = 1e-6);
        assert_relative_eq!(far.y, 0.5);
        assert_relative_eq!(far.z, 0.8, epsilon = 1e-6);
    }
}
