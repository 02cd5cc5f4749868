//! Inertial model of the simulated rigid body.
//!
//! Targets are reached in closed form from the moment they were set, so the
//! state at a given time does not depend on how finely time was stepped:
//!
//! - a position target is approached by a critically damped spring,
//! - a velocity target is approached exponentially while position integrates,
//! - a rotation target is approached along the shortest arc with critically
//!   damped progress,
//! - the ambient-motion bound is approached exponentially and adds a
//!   sinusoidal hand-held jitter on top of position.

use std::f64::consts::TAU;

use nalgebra::{UnitQuaternion, Vector3};

use crate::config::PhysicalModelConfig;
use crate::parameter::{InterpolationMode, ModelState, ParameterValueType};

const NANOS_PER_SEC: f64 = 1e9;

#[allow(clippy::cast_precision_loss)]
fn seconds_between(start_ns: i64, now_ns: i64) -> f64 {
    (now_ns.saturating_sub(start_ns) as f64 / NANOS_PER_SEC).max(0.0)
}

/// How the body translates.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    /// Spring toward a target position.
    Position {
        start_ns: i64,
        position: Vector3<f32>,
        velocity: Vector3<f32>,
        target: Vector3<f32>,
    },
    /// Exponential approach toward a target velocity.
    Velocity {
        start_ns: i64,
        position: Vector3<f32>,
        velocity: Vector3<f32>,
        target: Vector3<f32>,
    },
}

/// Translational state at one instant.
#[derive(Debug, Clone, Copy)]
struct Kinematics {
    position: Vector3<f32>,
    velocity: Vector3<f32>,
    acceleration: Vector3<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RotationTrack {
    start_ns: i64,
    start: UnitQuaternion<f32>,
    target: UnitQuaternion<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BoundTrack {
    start_ns: i64,
    start: f32,
    target: f32,
}

/// Inertial state of a single rigid body.
///
/// # Example
///
/// ```
/// use sensor_physics::{InertialModel, InterpolationMode, ModelState, ParameterValueType};
/// use nalgebra::Vector3;
///
/// let mut model = InertialModel::default();
/// model.set_target_position(Vector3::new(1.0, 0.0, 0.0), InterpolationMode::Smooth);
/// assert_eq!(model.set_current_time(10_000_000), ModelState::Changing);
/// assert_eq!(model.set_current_time(5_000_000_000), ModelState::Stable);
///
/// let position = model.position(ParameterValueType::Current);
/// assert!((position.x - 1.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct InertialModel {
    frequency: f64,
    position_epsilon: f32,
    velocity_epsilon: f32,
    rotation_epsilon: f32,
    jitter_frequencies: Vector3<f64>,
    now_ns: i64,
    motion: Motion,
    rotation: RotationTrack,
    ambient_motion: BoundTrack,
}

impl Default for InertialModel {
    fn default() -> Self {
        Self::new(&PhysicalModelConfig::default())
    }
}

impl InertialModel {
    /// Create a body at rest at the origin with identity rotation.
    #[must_use]
    pub fn new(config: &PhysicalModelConfig) -> Self {
        Self {
            frequency: f64::from(config.inertial_frequency),
            position_epsilon: config.position_epsilon,
            velocity_epsilon: config.velocity_epsilon,
            rotation_epsilon: config.rotation_epsilon,
            jitter_frequencies: config.ambient_motion_frequencies.cast::<f64>(),
            now_ns: 0,
            motion: Motion::Position {
                start_ns: 0,
                position: Vector3::zeros(),
                velocity: Vector3::zeros(),
                target: Vector3::zeros(),
            },
            rotation: RotationTrack {
                start_ns: 0,
                start: UnitQuaternion::identity(),
                target: UnitQuaternion::identity(),
            },
            ambient_motion: BoundTrack {
                start_ns: 0,
                start: 0.0,
                target: 0.0,
            },
        }
    }

    /// Current model time in nanoseconds.
    #[must_use]
    pub const fn current_time_ns(&self) -> i64 {
        self.now_ns
    }

    /// Sets the target position.
    ///
    /// `Step` places the body at rest at `position`; `Smooth` springs toward
    /// it from the current position and velocity.
    pub fn set_target_position(&mut self, position: Vector3<f32>, mode: InterpolationMode) {
        self.motion = match mode {
            InterpolationMode::Step => Motion::Position {
                start_ns: self.now_ns,
                position,
                velocity: Vector3::zeros(),
                target: position,
            },
            InterpolationMode::Smooth => {
                let now = self.translation();
                Motion::Position {
                    start_ns: self.now_ns,
                    position: now.position,
                    velocity: now.velocity,
                    target: position,
                }
            }
        };
    }

    /// Sets the target velocity.
    ///
    /// `Step` moves at `velocity` immediately; `Smooth` accelerates toward
    /// it. Either way the body keeps moving until a position target is set
    /// or the velocity target is zero.
    pub fn set_target_velocity(&mut self, velocity: Vector3<f32>, mode: InterpolationMode) {
        let now = self.translation();
        let start_velocity = match mode {
            InterpolationMode::Step => velocity,
            InterpolationMode::Smooth => now.velocity,
        };
        self.motion = Motion::Velocity {
            start_ns: self.now_ns,
            position: now.position,
            velocity: start_velocity,
            target: velocity,
        };
    }

    /// Sets the target rotation.
    pub fn set_target_rotation(&mut self, rotation: UnitQuaternion<f32>, mode: InterpolationMode) {
        let start = match mode {
            InterpolationMode::Step => rotation,
            InterpolationMode::Smooth => self.current_rotation(),
        };
        self.rotation = RotationTrack {
            start_ns: self.now_ns,
            start,
            target: rotation,
        };
    }

    /// Sets the target bound of the hand-held jitter (m).
    pub fn set_target_ambient_motion(&mut self, bound: f32, mode: InterpolationMode) {
        let start = match mode {
            InterpolationMode::Step => bound,
            InterpolationMode::Smooth => self.current_bound(),
        };
        self.ambient_motion = BoundTrack {
            start_ns: self.now_ns,
            start,
            target: bound,
        };
    }

    /// Advances the model to `time_ns` and reports whether it is at rest.
    ///
    /// Once at rest, every value is snapped exactly onto its target.
    pub fn set_current_time(&mut self, time_ns: i64) -> ModelState {
        self.now_ns = time_ns;
        if self.is_at_rest() {
            self.settle();
            ModelState::Stable
        } else {
            ModelState::Changing
        }
    }

    /// Returns the position (m).
    #[must_use]
    pub fn position(&self, value_type: ParameterValueType) -> Vector3<f32> {
        match value_type {
            ParameterValueType::Current => self.translation().position + self.jitter().position,
            ParameterValueType::CurrentNoAmbientMotion => self.translation().position,
            ParameterValueType::Target => match self.motion {
                Motion::Position { target, .. } => target,
                Motion::Velocity { .. } => self.translation().position,
            },
        }
    }

    /// Returns the linear velocity (m/s).
    #[must_use]
    pub fn velocity(&self, value_type: ParameterValueType) -> Vector3<f32> {
        match value_type {
            ParameterValueType::Current => self.translation().velocity + self.jitter().velocity,
            ParameterValueType::CurrentNoAmbientMotion => self.translation().velocity,
            ParameterValueType::Target => match self.motion {
                Motion::Position { .. } => Vector3::zeros(),
                Motion::Velocity { target, .. } => target,
            },
        }
    }

    /// Returns the rotation.
    #[must_use]
    pub fn rotation(&self, value_type: ParameterValueType) -> UnitQuaternion<f32> {
        match value_type {
            ParameterValueType::Current | ParameterValueType::CurrentNoAmbientMotion => {
                self.current_rotation()
            }
            ParameterValueType::Target => self.rotation.target,
        }
    }

    /// Returns the ambient-motion bound (m).
    #[must_use]
    pub fn ambient_motion(&self, value_type: ParameterValueType) -> f32 {
        match value_type {
            ParameterValueType::Current | ParameterValueType::CurrentNoAmbientMotion => {
                self.current_bound()
            }
            ParameterValueType::Target => self.ambient_motion.target,
        }
    }

    /// Returns the linear acceleration in world frame (m/s^2), jitter included.
    #[must_use]
    pub fn acceleration(&self) -> Vector3<f32> {
        self.translation().acceleration + self.jitter().acceleration
    }

    /// Returns the angular velocity in world frame (rad/s).
    #[must_use]
    pub fn rotational_velocity(&self) -> Vector3<f32> {
        let track = &self.rotation;
        let Some((axis, angle)) = (track.target * track.start.inverse()).axis_angle() else {
            return Vector3::zeros();
        };
        let t = seconds_between(track.start_ns, self.now_ns);
        let w = self.frequency;
        // d/dt of 1 - (1 + wt)e^(-wt)
        let rate = w * w * t * (-w * t).exp();
        #[allow(clippy::cast_possible_truncation)]
        let speed = (f64::from(angle) * rate) as f32;
        axis.into_inner() * speed
    }

    fn translation(&self) -> Kinematics {
        let w = self.frequency;
        match self.motion {
            Motion::Position {
                start_ns,
                position,
                velocity,
                target,
            } => {
                let t = seconds_between(start_ns, self.now_ns);
                let decay = (-w * t).exp();
                let d0 = (position - target).cast::<f64>();
                let v0 = velocity.cast::<f64>();
                let c = v0 + d0 * w;
                Kinematics {
                    position: target + ((d0 + c * t) * decay).cast::<f32>(),
                    velocity: ((v0 - c * (w * t)) * decay).cast::<f32>(),
                    acceleration: ((c * (w * t) - c - v0) * (w * decay)).cast::<f32>(),
                }
            }
            Motion::Velocity {
                start_ns,
                position,
                velocity,
                target,
            } => {
                let t = seconds_between(start_ns, self.now_ns);
                let decay = (-w * t).exp();
                let vt = target.cast::<f64>();
                let dv0 = (velocity - target).cast::<f64>();
                Kinematics {
                    position: position + (vt * t + dv0 * ((1.0 - decay) / w)).cast::<f32>(),
                    velocity: (vt + dv0 * decay).cast::<f32>(),
                    acceleration: (dv0 * (-w * decay)).cast::<f32>(),
                }
            }
        }
    }

    #[allow(clippy::float_cmp)]
    fn jitter(&self) -> Kinematics {
        let track = &self.ambient_motion;
        let w = self.frequency;
        let t = seconds_between(track.start_ns, self.now_ns);
        let target = f64::from(track.target);
        let offset = (f64::from(track.start) - target) * (-w * t).exp();
        let bound = target + offset;
        if bound == 0.0 && offset == 0.0 {
            return Kinematics {
                position: Vector3::zeros(),
                velocity: Vector3::zeros(),
                acceleration: Vector3::zeros(),
            };
        }
        let bound_rate = -w * offset;
        let bound_accel = w * w * offset;

        #[allow(clippy::cast_precision_loss)]
        let now = self.now_ns as f64 / NANOS_PER_SEC;
        let omega = self.jitter_frequencies * TAU;
        let phase = omega * now;
        let sin = phase.map(f64::sin);
        let cos = phase.map(f64::cos);

        let position = sin * bound;
        let velocity = sin * bound_rate + cos.component_mul(&omega) * bound;
        let acceleration = sin * bound_accel + cos.component_mul(&omega) * (2.0 * bound_rate)
            - sin.component_mul(&omega.component_mul(&omega)) * bound;
        Kinematics {
            position: position.cast::<f32>(),
            velocity: velocity.cast::<f32>(),
            acceleration: acceleration.cast::<f32>(),
        }
    }

    fn progress(&self, start_ns: i64) -> f64 {
        let w = self.frequency;
        let t = seconds_between(start_ns, self.now_ns);
        1.0 - (1.0 + w * t) * (-w * t).exp()
    }

    fn current_rotation(&self) -> UnitQuaternion<f32> {
        let track = &self.rotation;
        match (track.target * track.start.inverse()).axis_angle() {
            Some((axis, angle)) => {
                #[allow(clippy::cast_possible_truncation)]
                let travelled = (f64::from(angle) * self.progress(track.start_ns)) as f32;
                UnitQuaternion::from_axis_angle(&axis, travelled) * track.start
            }
            None => track.start,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn current_bound(&self) -> f32 {
        let track = &self.ambient_motion;
        let t = seconds_between(track.start_ns, self.now_ns);
        let decay = (-self.frequency * t).exp();
        (f64::from(track.target) + (f64::from(track.start) - f64::from(track.target)) * decay)
            as f32
    }

    #[allow(clippy::float_cmp)]
    fn is_at_rest(&self) -> bool {
        let now = self.translation();
        let translation_at_rest = match self.motion {
            Motion::Position { target, .. } => {
                (now.position - target).norm() < self.position_epsilon
                    && now.velocity.norm() < self.velocity_epsilon
            }
            Motion::Velocity { target, .. } => {
                target == Vector3::zeros() && now.velocity.norm() < self.velocity_epsilon
            }
        };

        let rotation_at_rest = self.current_rotation().angle_to(&self.rotation.target)
            < self.rotation_epsilon
            && self.rotational_velocity().norm() < self.rotation_epsilon;

        let bound_at_rest = self.ambient_motion.target == 0.0
            && self.current_bound().abs() < self.position_epsilon;

        translation_at_rest && rotation_at_rest && bound_at_rest
    }

    fn settle(&mut self) {
        let position = self.position(ParameterValueType::Target);
        self.motion = Motion::Position {
            start_ns: self.now_ns,
            position,
            velocity: Vector3::zeros(),
            target: position,
        };
        self.rotation = RotationTrack {
            start_ns: self.now_ns,
            start: self.rotation.target,
            target: self.rotation.target,
        };
        self.ambient_motion = BoundTrack {
            start_ns: self.now_ns,
            start: 0.0,
            target: 0.0,
        };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MS: i64 = 1_000_000;

    fn run_until_stable(model: &mut InertialModel, start_ns: i64, step_ns: i64) -> i64 {
        let mut now = start_ns;
        for _ in 0..10_000 {
            now += step_ns;
            if model.set_current_time(now) == ModelState::Stable {
                return now;
            }
        }
        panic!("model did not settle");
    }

    #[test]
    fn starts_at_rest() {
        let mut model = InertialModel::default();
        assert_eq!(model.set_current_time(0), ModelState::Stable);
        assert_eq!(model.position(ParameterValueType::Current), Vector3::zeros());
        assert_eq!(model.rotation(ParameterValueType::Current), UnitQuaternion::identity());
    }

    #[test]
    fn step_position_is_immediate() {
        let mut model = InertialModel::default();
        let target = Vector3::new(0.5, -1.0, 2.0);
        model.set_target_position(target, InterpolationMode::Step);
        assert_eq!(model.position(ParameterValueType::Current), target);
        assert_eq!(model.set_current_time(0), ModelState::Stable);
    }

    #[test]
    fn smooth_position_converges() {
        let mut model = InertialModel::default();
        let target = Vector3::new(1.0, 0.0, 0.0);
        model.set_target_position(target, InterpolationMode::Smooth);
        assert_eq!(model.set_current_time(10 * MS), ModelState::Changing);
        let halfway = model.position(ParameterValueType::Current);
        assert!(halfway.x > 0.0 && halfway.x < 1.0);

        run_until_stable(&mut model, 10 * MS, 10 * MS);
        assert_eq!(model.position(ParameterValueType::Current), target);
        assert_eq!(model.velocity(ParameterValueType::Current), Vector3::zeros());
    }

    #[test]
    fn result_independent_of_step_size() {
        let target = Vector3::new(0.0, 3.0, 0.0);
        let mut coarse = InertialModel::default();
        let mut fine = InertialModel::default();
        coarse.set_target_position(target, InterpolationMode::Smooth);
        fine.set_target_position(target, InterpolationMode::Smooth);

        coarse.set_current_time(200 * MS);
        for i in 1..=200 {
            fine.set_current_time(i * MS);
        }
        assert_relative_eq!(
            coarse.position(ParameterValueType::Current),
            fine.position(ParameterValueType::Current),
            epsilon = 1e-6
        );
    }

    #[test]
    fn acceleration_matches_spring_at_start() {
        let mut model = InertialModel::default();
        model.set_target_position(Vector3::new(1.0, 0.0, 0.0), InterpolationMode::Smooth);
        // a(0) = w^2 * (T - x0) with w = 10
        assert_relative_eq!(model.acceleration().x, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn retarget_keeps_changing() {
        let mut model = InertialModel::default();
        model.set_target_position(Vector3::new(1.0, 0.0, 0.0), InterpolationMode::Smooth);
        assert_eq!(model.set_current_time(100 * MS), ModelState::Changing);
        model.set_target_position(Vector3::new(-1.0, 0.0, 0.0), InterpolationMode::Smooth);
        assert_eq!(model.set_current_time(110 * MS), ModelState::Changing);
        let settled = run_until_stable(&mut model, 110 * MS, 10 * MS);
        assert!(settled > 110 * MS);
        assert_eq!(model.position(ParameterValueType::Current).x, -1.0);
    }

    #[test]
    fn velocity_target_moves_body() {
        let mut model = InertialModel::default();
        let velocity = Vector3::new(0.0, 0.0, 2.0);
        model.set_target_velocity(velocity, InterpolationMode::Step);
        assert_eq!(model.set_current_time(1_000 * MS), ModelState::Changing);
        assert_relative_eq!(
            model.position(ParameterValueType::Current),
            Vector3::new(0.0, 0.0, 2.0),
            epsilon = 1e-5
        );
        assert_eq!(model.velocity(ParameterValueType::Target), velocity);
    }

    #[test]
    fn zero_velocity_target_settles() {
        let mut model = InertialModel::default();
        model.set_target_velocity(Vector3::new(1.0, 0.0, 0.0), InterpolationMode::Step);
        model.set_current_time(500 * MS);
        model.set_target_velocity(Vector3::zeros(), InterpolationMode::Smooth);
        run_until_stable(&mut model, 500 * MS, 10 * MS);
        let rest = model.position(ParameterValueType::Current);
        // 0.5 m travelled, then 1/w = 0.1 m of braking distance.
        assert_relative_eq!(rest.x, 0.6, epsilon = 1e-3);
        assert_eq!(model.position(ParameterValueType::Target), rest);
    }

    #[test]
    fn smooth_rotation_converges() {
        let mut model = InertialModel::default();
        let target = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0);
        model.set_target_rotation(target, InterpolationMode::Smooth);
        model.set_current_time(50 * MS);
        let speed = model.rotational_velocity();
        assert!(speed.z > 0.0);
        assert_relative_eq!(speed.x, 0.0, epsilon = 1e-6);

        run_until_stable(&mut model, 50 * MS, 10 * MS);
        assert_eq!(model.rotation(ParameterValueType::Current), target);
        assert_eq!(model.rotational_velocity(), Vector3::zeros());
    }

    #[test]
    fn rotation_half_turn() {
        let mut model = InertialModel::default();
        let target = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::PI);
        model.set_target_rotation(target, InterpolationMode::Smooth);
        run_until_stable(&mut model, 0, 10 * MS);
        assert!(model.rotation(ParameterValueType::Current).angle_to(&target) < 1e-4);
    }

    #[test]
    fn ambient_motion_jitters_position() {
        let mut model = InertialModel::default();
        model.set_target_ambient_motion(0.01, InterpolationMode::Step);
        assert_eq!(model.set_current_time(123 * MS), ModelState::Changing);

        let with = model.position(ParameterValueType::Current);
        let without = model.position(ParameterValueType::CurrentNoAmbientMotion);
        assert_eq!(without, Vector3::zeros());
        assert!(with.norm() > 0.0);
        assert!(with.amax() <= 0.01 + 1e-6);

        model.set_target_ambient_motion(0.0, InterpolationMode::Smooth);
        run_until_stable(&mut model, 123 * MS, 10 * MS);
        assert_eq!(model.ambient_motion(ParameterValueType::Current), 0.0);
    }
}
