//! Virtual sensors and their override state.

use nalgebra::Vector3;

use crate::parameter::{ParameterKind, ParameterValue};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A value reported by a sensor. Sensors share the parameter value shapes.
pub type SensorValue = ParameterValue;

/// A virtual sensor derived from the physical model.
///
/// Declaration order is the persisted order used by snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sensor {
    /// Proper acceleration in device frame (m/s^2).
    Accelerometer,
    /// Angular velocity in device frame (rad/s).
    Gyroscope,
    /// Magnetic field in device frame (µT).
    Magnetometer,
    /// Device orientation as XYZ Euler angles (degrees).
    Orientation,
    /// Ambient temperature (°C).
    Temperature,
    /// Proximity (cm).
    Proximity,
    /// Ambient light (lux).
    Light,
    /// Barometric pressure (hPa).
    Pressure,
    /// Relative humidity (%).
    Humidity,
    /// Magnetic field without hard-iron calibration (µT).
    MagnetometerUncalibrated,
    /// Angular velocity without drift compensation (rad/s).
    GyroscopeUncalibrated,
}

impl Sensor {
    /// All sensors in persisted order.
    pub const ALL: [Self; 11] = [
        Self::Accelerometer,
        Self::Gyroscope,
        Self::Magnetometer,
        Self::Orientation,
        Self::Temperature,
        Self::Proximity,
        Self::Light,
        Self::Pressure,
        Self::Humidity,
        Self::MagnetometerUncalibrated,
        Self::GyroscopeUncalibrated,
    ];

    /// Number of sensors this build supports.
    pub const COUNT: usize = Self::ALL.len();

    /// Index of this sensor in persisted order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the shape of this sensor's values.
    #[must_use]
    pub const fn kind(self) -> ParameterKind {
        match self {
            Self::Accelerometer
            | Self::Gyroscope
            | Self::Magnetometer
            | Self::Orientation
            | Self::MagnetometerUncalibrated
            | Self::GyroscopeUncalibrated => ParameterKind::Vec3,
            Self::Temperature
            | Self::Proximity
            | Self::Light
            | Self::Pressure
            | Self::Humidity => ParameterKind::Float,
        }
    }

    /// Returns the sensor name for log output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::Gyroscope => "gyroscope",
            Self::Magnetometer => "magnetometer",
            Self::Orientation => "orientation",
            Self::Temperature => "temperature",
            Self::Proximity => "proximity",
            Self::Light => "light",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
            Self::MagnetometerUncalibrated => "magnetometer_uncalibrated",
            Self::GyroscopeUncalibrated => "gyroscope_uncalibrated",
        }
    }
}

/// A sensor value together with its measurement id.
///
/// Consumers compare ids between polls: an unchanged id means the value
/// cannot have changed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorReading {
    /// The reported value.
    pub value: SensorValue,
    /// Change-detection counter for this sensor.
    pub measurement_id: u64,
}

impl SensorReading {
    /// Returns the vector value, or zero for a scalar sensor.
    #[must_use]
    pub fn vec3(&self) -> Vector3<f32> {
        self.value.vec3_or_zero()
    }

    /// Returns the scalar value, or zero for a vector sensor.
    #[must_use]
    pub fn float(&self) -> f32 {
        self.value.float_or_zero()
    }
}

/// Per-sensor override and measurement-id bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct SensorTable {
    overrides: [Option<SensorValue>; Sensor::COUNT],
    measurement_ids: [u64; Sensor::COUNT],
}

impl Default for SensorTable {
    fn default() -> Self {
        Self {
            overrides: [None; Sensor::COUNT],
            measurement_ids: [0; Sensor::COUNT],
        }
    }
}

impl SensorTable {
    /// Returns the active override, if any.
    pub(crate) fn override_value(&self, sensor: Sensor) -> Option<SensorValue> {
        self.overrides[sensor.index()]
    }

    /// Activates an override and bumps the sensor's measurement id.
    pub(crate) fn set_override(&mut self, sensor: Sensor, value: SensorValue) {
        self.overrides[sensor.index()] = Some(value);
        self.bump(sensor);
    }

    /// Drops every override.
    pub(crate) fn clear_overrides(&mut self) {
        self.overrides = [None; Sensor::COUNT];
    }

    pub(crate) fn measurement_id(&self, sensor: Sensor) -> u64 {
        self.measurement_ids[sensor.index()]
    }

    /// Increments and returns the sensor's measurement id.
    pub(crate) fn bump(&mut self, sensor: Sensor) -> u64 {
        let id = &mut self.measurement_ids[sensor.index()];
        *id = id.wrapping_add(1);
        *id
    }

    pub(crate) fn bump_all(&mut self) {
        for id in &mut self.measurement_ids {
            *id = id.wrapping_add(1);
        }
    }
}
