//! Physical parameters and their values.
//!
//! Every parameter the model can be driven with is listed once in
//! [`PhysicalParameter`]; values travel as a [`ParameterValue`] so a single
//! dispatch covers all of them.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A parameter of the physical model that has a current and a target value.
///
/// Declaration order is the persisted order used by snapshots and saved
/// state. New parameters must be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PhysicalParameter {
    /// Position of the body in world frame (m).
    Position,
    /// Rotation of the body as XYZ Euler angles (degrees).
    Rotation,
    /// Ambient magnetic field (µT).
    MagneticField,
    /// Ambient temperature (°C).
    Temperature,
    /// Distance to the nearest object (cm).
    Proximity,
    /// Ambient light (lux).
    Light,
    /// Barometric pressure (hPa).
    Pressure,
    /// Relative humidity (%).
    Humidity,
    /// Linear velocity of the body in world frame (m/s).
    Velocity,
    /// Bound of the hand-held jitter applied to position (m).
    AmbientMotion,
}

/// Shape of a parameter or sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// A single `f32`.
    Float,
    /// Three `f32` components.
    Vec3,
}

impl ParameterKind {
    /// Number of `f32` components in a value of this kind.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Vec3 => 3,
        }
    }

    /// Zero value of this kind.
    #[must_use]
    pub fn zero(self) -> ParameterValue {
        match self {
            Self::Float => ParameterValue::Float(0.0),
            Self::Vec3 => ParameterValue::Vec3(Vector3::zeros()),
        }
    }
}

impl PhysicalParameter {
    /// All parameters in persisted order.
    pub const ALL: [Self; 10] = [
        Self::Position,
        Self::Rotation,
        Self::MagneticField,
        Self::Temperature,
        Self::Proximity,
        Self::Light,
        Self::Pressure,
        Self::Humidity,
        Self::Velocity,
        Self::AmbientMotion,
    ];

    /// Number of parameters this build supports.
    pub const COUNT: usize = Self::ALL.len();

    /// Returns the shape of this parameter's values.
    #[must_use]
    pub const fn kind(self) -> ParameterKind {
        match self {
            Self::Position | Self::Rotation | Self::MagneticField | Self::Velocity => {
                ParameterKind::Vec3
            }
            Self::Temperature
            | Self::Proximity
            | Self::Light
            | Self::Pressure
            | Self::Humidity
            | Self::AmbientMotion => ParameterKind::Float,
        }
    }

    /// Index of this parameter in persisted order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Identifier used for this parameter in automation events.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn wire_id(self) -> i32 {
        self as i32
    }

    /// Looks up a parameter by its automation event identifier.
    #[must_use]
    pub fn from_wire_id(id: i32) -> Option<Self> {
        usize::try_from(id)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Returns the parameter name for log output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Rotation => "rotation",
            Self::MagneticField => "magnetic_field",
            Self::Temperature => "temperature",
            Self::Proximity => "proximity",
            Self::Light => "light",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
            Self::Velocity => "velocity",
            Self::AmbientMotion => "ambient_motion",
        }
    }
}

/// A parameter or sensor value.
///
/// # Example
///
/// ```
/// use sensor_physics::ParameterValue;
/// use nalgebra::Vector3;
///
/// let value = ParameterValue::from(Vector3::new(1.0, 2.0, 3.0));
/// assert_eq!(value.to_vec(), vec![1.0, 2.0, 3.0]);
/// assert_eq!(ParameterValue::from(4.0).as_float(), Some(4.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterValue {
    /// Scalar value.
    Float(f32),
    /// Vector value.
    Vec3(Vector3<f32>),
}

impl ParameterValue {
    /// Returns the shape of this value.
    #[must_use]
    pub const fn kind(&self) -> ParameterKind {
        match self {
            Self::Float(_) => ParameterKind::Float,
            Self::Vec3(_) => ParameterKind::Vec3,
        }
    }

    /// Returns the scalar, if this is a scalar value.
    #[must_use]
    pub const fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Vec3(_) => None,
        }
    }

    /// Returns the vector, if this is a vector value.
    #[must_use]
    pub const fn as_vec3(&self) -> Option<Vector3<f32>> {
        match self {
            Self::Float(_) => None,
            Self::Vec3(value) => Some(*value),
        }
    }

    /// Returns the scalar, or zero for a vector value.
    #[must_use]
    pub fn float_or_zero(&self) -> f32 {
        self.as_float().unwrap_or(0.0)
    }

    /// Returns the vector, or zero for a scalar value.
    #[must_use]
    pub fn vec3_or_zero(&self) -> Vector3<f32> {
        self.as_vec3().unwrap_or_else(Vector3::zeros)
    }

    /// Flattens the value into its components.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        match self {
            Self::Float(value) => vec![*value],
            Self::Vec3(value) => vec![value.x, value.y, value.z],
        }
    }

    /// Returns this value if it has the expected shape, otherwise the zero
    /// value of that shape.
    ///
    /// Callers log the mismatch; this only normalizes.
    #[must_use]
    pub fn coerce(self, kind: ParameterKind) -> Self {
        if self.kind() == kind { self } else { kind.zero() }
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vector3<f32>> for ParameterValue {
    fn from(value: Vector3<f32>) -> Self {
        Self::Vec3(value)
    }
}

/// Selects which value a parameter getter returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterValueType {
    /// The instantaneous value at the model time.
    #[default]
    Current,
    /// The value the model is moving toward.
    Target,
    /// The instantaneous value without hand-held jitter.
    CurrentNoAmbientMotion,
}

/// How a new target is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InterpolationMode {
    /// Snap the current value to the target immediately.
    Step,
    /// Approach the target over simulated time.
    #[default]
    Smooth,
}

/// Whether a model is at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModelState {
    /// All values have converged on their targets.
    #[default]
    Stable,
    /// At least one value is still moving.
    Changing,
}

impl ModelState {
    /// Returns true if the model is at rest.
    #[must_use]
    pub const fn is_stable(self) -> bool {
        matches!(self, Self::Stable)
    }
}

/// Builds a rotation from XYZ Euler angles in degrees (`Rx * Ry * Rz`).
#[must_use]
pub fn rotation_from_euler_degrees(degrees: Vector3<f32>) -> UnitQuaternion<f32> {
    let radians = degrees.map(f32::to_radians);
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), radians.x)
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), radians.y)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), radians.z)
}

/// Extracts XYZ Euler angles in degrees, inverse of
/// [`rotation_from_euler_degrees`].
#[must_use]
pub fn euler_degrees_from_rotation(rotation: &UnitQuaternion<f32>) -> Vector3<f32> {
    let m: Matrix3<f32> = rotation.to_rotation_matrix().into_inner();
    let sin_y = m[(0, 2)].clamp(-1.0, 1.0);
    let y = sin_y.asin();
    // Gimbal lock: x and z rotate about the same axis, attribute it all to x.
    let (x, z) = if sin_y.abs() > 1.0 - 1e-6 {
        (m[(2, 1)].atan2(m[(1, 1)]), 0.0)
    } else {
        ((-m[(1, 2)]).atan2(m[(2, 2)]), (-m[(0, 1)]).atan2(m[(0, 0)]))
    };
    Vector3::new(x, y, z).map(f32::to_degrees)
}
