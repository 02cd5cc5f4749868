//! Configuration for the physical model.
//!
//! Controls the fixed environment (gravity), the values the ambient
//! environment starts at, and how quickly smooth targets converge.

use nalgebra::Vector3;

use crate::error::{PhysicsError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a [`PhysicalModel`](crate::PhysicalModel).
///
/// # Example
///
/// ```
/// use sensor_physics::PhysicalModelConfig;
///
/// let config = PhysicalModelConfig::default()
///     .with_inertial_frequency(20.0)
///     .with_temperature(30.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicalModelConfig {
    /// Gravity vector in world frame (m/s^2).
    ///
    /// The default points along -Y so that a device lying upright in
    /// portrait reads +9.81 on its Y axis.
    pub gravity: Vector3<f32>,

    /// Natural frequency of the inertial spring (rad/s).
    pub inertial_frequency: f32,

    /// Convergence rate of ambient values (1/s).
    pub ambient_rate: f32,

    /// Distance from the target position considered at rest (m).
    pub position_epsilon: f32,

    /// Speed considered at rest (m/s).
    pub velocity_epsilon: f32,

    /// Angle from the target rotation considered at rest (rad).
    pub rotation_epsilon: f32,

    /// Relative distance from an ambient target considered at rest.
    pub ambient_epsilon: f32,

    /// Per-axis frequencies of the ambient hand-held motion (Hz).
    pub ambient_motion_frequencies: Vector3<f32>,

    /// Initial magnetic field (µT).
    pub magnetic_field: Vector3<f32>,

    /// Initial temperature (°C).
    pub temperature: f32,

    /// Initial proximity (cm).
    pub proximity: f32,

    /// Initial light (lux).
    pub light: f32,

    /// Initial pressure (hPa).
    pub pressure: f32,

    /// Initial relative humidity (%).
    pub humidity: f32,
}

impl Default for PhysicalModelConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            inertial_frequency: 10.0,
            ambient_rate: 10.0,
            position_epsilon: 1e-4,
            velocity_epsilon: 1e-4,
            rotation_epsilon: 1e-4,
            ambient_epsilon: 1e-4,
            ambient_motion_frequencies: Vector3::new(1.3, 1.7, 2.3),
            magnetic_field: Vector3::new(0.0, 5.9, -48.4),
            temperature: 25.0,
            proximity: 1.0,
            light: 0.0,
            pressure: 1013.25,
            humidity: 0.0,
        }
    }
}

impl PhysicalModelConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gravity vector.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f32>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set the inertial spring frequency.
    #[must_use]
    pub fn with_inertial_frequency(mut self, frequency: f32) -> Self {
        self.inertial_frequency = frequency;
        self
    }

    /// Set the ambient convergence rate.
    #[must_use]
    pub fn with_ambient_rate(mut self, rate: f32) -> Self {
        self.ambient_rate = rate;
        self
    }

    /// Set the initial magnetic field.
    #[must_use]
    pub fn with_magnetic_field(mut self, field: Vector3<f32>) -> Self {
        self.magnetic_field = field;
        self
    }

    /// Set the initial temperature.
    #[must_use]
    pub fn with_temperature(mut self, celsius: f32) -> Self {
        self.temperature = celsius;
        self
    }

    /// Set the initial pressure.
    #[must_use]
    pub fn with_pressure(mut self, hpa: f32) -> Self {
        self.pressure = hpa;
        self
    }

    /// Checks that rates and epsilons are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidConfig`] if a rate or epsilon is not
    /// a positive finite number.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("inertial_frequency", self.inertial_frequency),
            ("ambient_rate", self.ambient_rate),
            ("position_epsilon", self.position_epsilon),
            ("velocity_epsilon", self.velocity_epsilon),
            ("rotation_epsilon", self.rotation_epsilon),
            ("ambient_epsilon", self.ambient_epsilon),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PhysicsError::invalid_config(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if !self.gravity.iter().all(|c| c.is_finite()) {
            return Err(PhysicsError::invalid_config("gravity must be finite"));
        }
        Ok(())
    }
}
