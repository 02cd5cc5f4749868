//! Ambient environment surrounding the simulated body.

use nalgebra::Vector3;

use crate::config::PhysicalModelConfig;
use crate::parameter::{InterpolationMode, ModelState, ParameterValueType};

/// A value that decays exponentially from where it was toward a target.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Track<T> {
    start_ns: i64,
    start: T,
    target: T,
}

impl<T: Copy> Track<T> {
    const fn at_rest(value: T) -> Self {
        Self {
            start_ns: 0,
            start: value,
            target: value,
        }
    }
}

/// Temperature, pressure, light, humidity, proximity and magnetic field.
///
/// Each value has the same current/target contract as the
/// [`InertialModel`](crate::InertialModel): `Step` snaps, `Smooth`
/// approaches the target exponentially at the configured ambient rate.
///
/// # Example
///
/// ```
/// use sensor_physics::{AmbientEnvironment, InterpolationMode, ModelState, ParameterValueType};
///
/// let mut ambient = AmbientEnvironment::default();
/// ambient.set_temperature(40.0, InterpolationMode::Smooth);
/// assert_eq!(ambient.set_current_time(1_000_000), ModelState::Changing);
/// assert_eq!(ambient.temperature(ParameterValueType::Target), 40.0);
/// ```
#[derive(Debug, Clone)]
pub struct AmbientEnvironment {
    rate: f64,
    epsilon: f32,
    gravity: Vector3<f32>,
    now_ns: i64,
    magnetic_field: Track<Vector3<f32>>,
    temperature: Track<f32>,
    proximity: Track<f32>,
    light: Track<f32>,
    pressure: Track<f32>,
    humidity: Track<f32>,
}

impl Default for AmbientEnvironment {
    fn default() -> Self {
        Self::new(&PhysicalModelConfig::default())
    }
}

impl AmbientEnvironment {
    /// Create an environment at rest at the configured initial values.
    #[must_use]
    pub fn new(config: &PhysicalModelConfig) -> Self {
        Self {
            rate: f64::from(config.ambient_rate),
            epsilon: config.ambient_epsilon,
            gravity: config.gravity,
            now_ns: 0,
            magnetic_field: Track::at_rest(config.magnetic_field),
            temperature: Track::at_rest(config.temperature),
            proximity: Track::at_rest(config.proximity),
            light: Track::at_rest(config.light),
            pressure: Track::at_rest(config.pressure),
            humidity: Track::at_rest(config.humidity),
        }
    }

    /// Fixed gravity vector in world frame (m/s^2).
    #[must_use]
    pub const fn gravity(&self) -> Vector3<f32> {
        self.gravity
    }

    /// Sets the target magnetic field (µT).
    pub fn set_magnetic_field(&mut self, field: Vector3<f32>, mode: InterpolationMode) {
        let start = self.vector_at(&self.magnetic_field);
        self.magnetic_field = self.retarget(start, field, mode);
    }

    /// Sets the target temperature (°C).
    pub fn set_temperature(&mut self, celsius: f32, mode: InterpolationMode) {
        let start = self.scalar_at(&self.temperature);
        self.temperature = self.retarget(start, celsius, mode);
    }

    /// Sets the target proximity (cm).
    pub fn set_proximity(&mut self, centimeters: f32, mode: InterpolationMode) {
        let start = self.scalar_at(&self.proximity);
        self.proximity = self.retarget(start, centimeters, mode);
    }

    /// Sets the target light level (lux).
    pub fn set_light(&mut self, lux: f32, mode: InterpolationMode) {
        let start = self.scalar_at(&self.light);
        self.light = self.retarget(start, lux, mode);
    }

    /// Sets the target pressure (hPa).
    pub fn set_pressure(&mut self, hpa: f32, mode: InterpolationMode) {
        let start = self.scalar_at(&self.pressure);
        self.pressure = self.retarget(start, hpa, mode);
    }

    /// Sets the target relative humidity (%).
    pub fn set_humidity(&mut self, percent: f32, mode: InterpolationMode) {
        let start = self.scalar_at(&self.humidity);
        self.humidity = self.retarget(start, percent, mode);
    }

    /// Advances the environment to `time_ns` and reports whether it is at rest.
    pub fn set_current_time(&mut self, time_ns: i64) -> ModelState {
        self.now_ns = time_ns;

        let scalars = [
            self.temperature,
            self.proximity,
            self.light,
            self.pressure,
            self.humidity,
        ];
        let scalars_at_rest = scalars.iter().all(|track| {
            let tolerance = self.epsilon * track.target.abs().max(1.0);
            (self.scalar_at(track) - track.target).abs() < tolerance
        });
        let field = &self.magnetic_field;
        let tolerance = self.epsilon * field.target.norm().max(1.0);
        let field_at_rest = (self.vector_at(field) - field.target).norm() < tolerance;

        if scalars_at_rest && field_at_rest {
            self.settle();
            ModelState::Stable
        } else {
            ModelState::Changing
        }
    }

    /// Returns the magnetic field (µT).
    #[must_use]
    pub fn magnetic_field(&self, value_type: ParameterValueType) -> Vector3<f32> {
        match value_type {
            ParameterValueType::Target => self.magnetic_field.target,
            ParameterValueType::Current | ParameterValueType::CurrentNoAmbientMotion => {
                self.vector_at(&self.magnetic_field)
            }
        }
    }

    /// Returns the temperature (°C).
    #[must_use]
    pub fn temperature(&self, value_type: ParameterValueType) -> f32 {
        self.scalar(&self.temperature, value_type)
    }

    /// Returns the proximity (cm).
    #[must_use]
    pub fn proximity(&self, value_type: ParameterValueType) -> f32 {
        self.scalar(&self.proximity, value_type)
    }

    /// Returns the light level (lux).
    #[must_use]
    pub fn light(&self, value_type: ParameterValueType) -> f32 {
        self.scalar(&self.light, value_type)
    }

    /// Returns the pressure (hPa).
    #[must_use]
    pub fn pressure(&self, value_type: ParameterValueType) -> f32 {
        self.scalar(&self.pressure, value_type)
    }

    /// Returns the relative humidity (%).
    #[must_use]
    pub fn humidity(&self, value_type: ParameterValueType) -> f32 {
        self.scalar(&self.humidity, value_type)
    }

    fn retarget<T: Copy>(&self, current: T, target: T, mode: InterpolationMode) -> Track<T> {
        Track {
            start_ns: self.now_ns,
            start: match mode {
                InterpolationMode::Step => target,
                InterpolationMode::Smooth => current,
            },
            target,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn decay(&self, start_ns: i64) -> f64 {
        let elapsed = (self.now_ns.saturating_sub(start_ns) as f64 / 1e9).max(0.0);
        (-self.rate * elapsed).exp()
    }

    fn scalar(&self, track: &Track<f32>, value_type: ParameterValueType) -> f32 {
        match value_type {
            ParameterValueType::Target => track.target,
            ParameterValueType::Current | ParameterValueType::CurrentNoAmbientMotion => {
                self.scalar_at(track)
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn scalar_at(&self, track: &Track<f32>) -> f32 {
        let offset = f64::from(track.start - track.target) * self.decay(track.start_ns);
        track.target + offset as f32
    }

    fn vector_at(&self, track: &Track<Vector3<f32>>) -> Vector3<f32> {
        let offset = (track.start - track.target).cast::<f64>() * self.decay(track.start_ns);
        track.target + offset.cast::<f32>()
    }

    fn settle(&mut self) {
        let now = self.now_ns;
        let snap = |track: &mut Track<f32>| {
            *track = Track {
                start_ns: now,
                start: track.target,
                target: track.target,
            };
        };
        snap(&mut self.temperature);
        snap(&mut self.proximity);
        snap(&mut self.light);
        snap(&mut self.pressure);
        snap(&mut self.humidity);
        self.magnetic_field = Track {
            start_ns: now,
            start: self.magnetic_field.target,
            target: self.magnetic_field.target,
        };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MS: i64 = 1_000_000;

    #[test]
    fn starts_at_config_values() {
        let config = PhysicalModelConfig::default().with_temperature(18.0);
        let mut ambient = AmbientEnvironment::new(&config);
        assert_eq!(ambient.set_current_time(0), ModelState::Stable);
        assert_eq!(ambient.temperature(ParameterValueType::Current), 18.0);
        assert_eq!(
            ambient.magnetic_field(ParameterValueType::Current),
            config.magnetic_field
        );
        assert_eq!(ambient.gravity(), config.gravity);
    }

    #[test]
    fn step_is_immediate() {
        let mut ambient = AmbientEnvironment::default();
        ambient.set_light(500.0, InterpolationMode::Step);
        assert_eq!(ambient.light(ParameterValueType::Current), 500.0);
        assert_eq!(ambient.set_current_time(0), ModelState::Stable);
    }

    #[test]
    fn smooth_converges() {
        let mut ambient = AmbientEnvironment::default();
        ambient.set_pressure(900.0, InterpolationMode::Smooth);
        assert_eq!(ambient.set_current_time(50 * MS), ModelState::Changing);
        let midway = ambient.pressure(ParameterValueType::Current);
        assert!(midway < 1013.25 && midway > 900.0);

        let mut now = 50 * MS;
        while ambient.set_current_time(now) == ModelState::Changing {
            now += 10 * MS;
            assert!(now < 60_000 * MS, "pressure never settled");
        }
        assert_eq!(ambient.pressure(ParameterValueType::Current), 900.0);
    }

    #[test]
    fn smooth_magnetic_field() {
        let mut ambient = AmbientEnvironment::default();
        let target = Vector3::new(10.0, 0.0, -30.0);
        ambient.set_magnetic_field(target, InterpolationMode::Smooth);
        assert_eq!(ambient.set_current_time(100 * MS), ModelState::Changing);
        assert_eq!(ambient.set_current_time(5_000 * MS), ModelState::Stable);
        assert_relative_eq!(ambient.magnetic_field(ParameterValueType::Current), target);
    }

    #[test]
    fn retarget_starts_from_current() {
        let mut ambient = AmbientEnvironment::default();
        ambient.set_humidity(100.0, InterpolationMode::Smooth);
        ambient.set_current_time(100 * MS);
        let partway = ambient.humidity(ParameterValueType::Current);
        ambient.set_humidity(0.0, InterpolationMode::Smooth);
        assert_relative_eq!(
            ambient.humidity(ParameterValueType::Current),
            partway,
            epsilon = 1e-5
        );
    }
}
