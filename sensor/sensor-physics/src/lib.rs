//! Physical state model for an emulated device.
//!
//! This crate simulates one rigid body and the environment around it, and
//! derives virtual sensor readings from that state over simulated time:
//!
//! # Sub-models
//!
//! - [`InertialModel`] - Position, velocity, rotation and hand-held jitter
//! - [`AmbientEnvironment`] - Magnetic field, temperature, proximity, light,
//!   pressure and humidity
//!
//! # Engine
//!
//! - [`PhysicalModel`] - Thread-safe owner of both sub-models; target
//!   setters, sensor reads, overrides, snapshots and automation replay
//! - [`SensorSource`] - Read-only capability handed to sensor backends
//! - [`PhysicalStateAgent`] / [`StateCallbacks`] - Stable/changing
//!   notifications
//!
//! # Persistence
//!
//! - [`SnapshotData`] - Big-endian binary snapshot of targets and overrides
//! - [`PhysicalModelEvent`] / [`InitialState`] - Automation record and
//!   playback format
//! - [`GroundTruthRecorder`] - Pose trace file
//!
//! Every parameter and sensor value is a [`ParameterValue`]: a scalar or a
//! three-component vector.
//!
//! # Example
//!
//! ```
//! use nalgebra::Vector3;
//! use sensor_physics::{InterpolationMode, ParameterValueType, PhysicalModel};
//!
//! let model = PhysicalModel::default();
//! model.set_target_position(Vector3::new(0.0, 0.0, 1.0), InterpolationMode::Smooth);
//!
//! let mut now = 0;
//! model.set_current_time(now);
//! while model.is_changing() {
//!     now += 16_000_000;
//!     model.set_current_time(now);
//! }
//!
//! let position = model.parameter_position(ParameterValueType::Current);
//! assert_eq!(position, Vector3::new(0.0, 0.0, 1.0));
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod ambient;
mod automation;
mod config;
mod error;
mod ground_truth;
mod inertial;
mod model;
mod observer;
mod parameter;
mod sensor;
mod snapshot;

// Re-export sub-models
pub use ambient::AmbientEnvironment;
pub use inertial::InertialModel;

// Re-export engine types
pub use model::{PhysicalModel, SensorSource, Transform};
pub use observer::{Callback, PhysicalStateAgent, StateCallback, StateCallbacks};

// Re-export value types
pub use parameter::{
    InterpolationMode, ModelState, ParameterKind, ParameterValue, ParameterValueType,
    PhysicalParameter, euler_degrees_from_rotation, rotation_from_euler_degrees,
};
pub use sensor::{Sensor, SensorReading, SensorValue};

// Re-export persistence types
pub use automation::{AutomationEventSink, InitialState, ParameterPayload, PhysicalModelEvent};
pub use ground_truth::GroundTruthRecorder;
pub use snapshot::SnapshotData;

// Re-export configuration and error types
pub use config::PhysicalModelConfig;
pub use error::{PhysicsError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        AutomationEventSink, InitialState, InterpolationMode, ModelState, ParameterValue,
        ParameterValueType, PhysicalModel, PhysicalModelConfig, PhysicalModelEvent,
        PhysicalParameter, PhysicalStateAgent, PhysicsError, Sensor, SensorReading,
        SensorSource, StateCallbacks, Transform,
    };
}
