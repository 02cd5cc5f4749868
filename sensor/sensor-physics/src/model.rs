//! The physical model engine.
//!
//! [`PhysicalModel`] owns one [`InertialModel`] and one
//! [`AmbientEnvironment`], derives sensor values from them and tracks the
//! aggregate stable/changing state.
//!
//! # Locking
//!
//! All mutable state sits behind one mutex, which is never held while the
//! observer or the automation sink runs. Callbacks may therefore call back
//! into the engine. A target change marks the state changing and notifies
//! first, so the observer still sees the old values. The value is applied
//! under a second lock, and overrides are cleared under a third just before
//! the target-changed notification.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::ambient::AmbientEnvironment;
use crate::automation::{AutomationEventSink, InitialState, PhysicalModelEvent};
use crate::config::PhysicalModelConfig;
use crate::error::Result;
use crate::ground_truth::GroundTruthRecorder;
use crate::inertial::InertialModel;
use crate::observer::PhysicalStateAgent;
use crate::parameter::{
    InterpolationMode, ParameterKind, ParameterValue, ParameterValueType, PhysicalParameter,
    euler_degrees_from_rotation, rotation_from_euler_degrees,
};
use crate::sensor::{Sensor, SensorReading, SensorTable, SensorValue};
use crate::snapshot::SnapshotData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pose of the body at the current model time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    /// Position in world frame (m), ambient motion included.
    pub position: Vector3<f32>,
    /// XYZ Euler angles (degrees).
    pub rotation_degrees: Vector3<f32>,
    /// Model time of the pose (ns).
    pub timestamp_ns: i64,
}

/// Read access to simulated sensors.
///
/// Sensor backends poll through this trait so they can be driven by a
/// [`PhysicalModel`] or by a test double.
pub trait SensorSource: Send + Sync {
    /// Returns the value and measurement id of `sensor`.
    fn sensor(&self, sensor: Sensor) -> SensorReading;

    /// Returns the body pose.
    fn transform(&self) -> Transform;

    /// Returns true while the physical state is changing.
    fn is_changing(&self) -> bool;
}

/// Observer notification. Always delivered with the lock released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Changing,
    Stabilized,
    TargetChanged,
}

impl Transition {
    fn deliver(self, agent: &dyn PhysicalStateAgent) {
        match self {
            Self::Changing => agent.on_physical_state_changing(),
            Self::Stabilized => agent.on_physical_state_stabilized(),
            Self::TargetChanged => agent.on_target_state_changed(),
        }
    }
}

struct EngineState {
    inertial: InertialModel,
    ambient: AmbientEnvironment,
    sensors: SensorTable,
    changing: bool,
    model_time_ns: i64,
    agent: Option<Arc<dyn PhysicalStateAgent>>,
    sink: Option<Arc<dyn AutomationEventSink>>,
    ground_truth: Option<GroundTruthRecorder>,
}

impl EngineState {
    fn new(config: &PhysicalModelConfig) -> Self {
        Self {
            inertial: InertialModel::new(config),
            ambient: AmbientEnvironment::new(config),
            sensors: SensorTable::default(),
            changing: false,
            model_time_ns: 0,
            agent: None,
            sink: None,
            ground_truth: None,
        }
    }

    /// Stable to changing edge. Returns true only on the edge.
    fn begin_changing(&mut self) -> bool {
        if self.changing {
            return false;
        }
        self.changing = true;
        debug!(time_ns = self.model_time_ns, "physical state changing");
        true
    }

    fn stabilize(&mut self) {
        debug_assert!(self.changing, "stabilized without a pending change");
        self.sensors.bump_all();
        self.changing = false;
        debug!(time_ns = self.model_time_ns, "physical state stabilized");
    }

    fn apply_target(
        &mut self,
        parameter: PhysicalParameter,
        value: ParameterValue,
        mode: InterpolationMode,
    ) {
        match parameter {
            PhysicalParameter::Position => {
                self.inertial.set_target_position(value.vec3_or_zero(), mode);
            }
            PhysicalParameter::Rotation => {
                let rotation = rotation_from_euler_degrees(value.vec3_or_zero());
                self.inertial.set_target_rotation(rotation, mode);
            }
            PhysicalParameter::MagneticField => {
                self.ambient.set_magnetic_field(value.vec3_or_zero(), mode);
            }
            PhysicalParameter::Temperature => {
                self.ambient.set_temperature(value.float_or_zero(), mode);
            }
            PhysicalParameter::Proximity => {
                self.ambient.set_proximity(value.float_or_zero(), mode);
            }
            PhysicalParameter::Light => self.ambient.set_light(value.float_or_zero(), mode),
            PhysicalParameter::Pressure => self.ambient.set_pressure(value.float_or_zero(), mode),
            PhysicalParameter::Humidity => self.ambient.set_humidity(value.float_or_zero(), mode),
            PhysicalParameter::Velocity => {
                self.inertial.set_target_velocity(value.vec3_or_zero(), mode);
            }
            PhysicalParameter::AmbientMotion => {
                self.inertial
                    .set_target_ambient_motion(value.float_or_zero(), mode);
            }
        }
    }

    fn parameter(
        &self,
        parameter: PhysicalParameter,
        value_type: ParameterValueType,
    ) -> ParameterValue {
        let inertial = &self.inertial;
        let ambient = &self.ambient;
        match parameter {
            PhysicalParameter::Position => inertial.position(value_type).into(),
            PhysicalParameter::Rotation => {
                euler_degrees_from_rotation(&inertial.rotation(value_type)).into()
            }
            PhysicalParameter::MagneticField => ambient.magnetic_field(value_type).into(),
            PhysicalParameter::Temperature => ambient.temperature(value_type).into(),
            PhysicalParameter::Proximity => ambient.proximity(value_type).into(),
            PhysicalParameter::Light => ambient.light(value_type).into(),
            PhysicalParameter::Pressure => ambient.pressure(value_type).into(),
            PhysicalParameter::Humidity => ambient.humidity(value_type).into(),
            PhysicalParameter::Velocity => inertial.velocity(value_type).into(),
            PhysicalParameter::AmbientMotion => inertial.ambient_motion(value_type).into(),
        }
    }

    /// Sensor value derived from the physical state, ignoring overrides.
    fn physical_value(&self, sensor: Sensor) -> SensorValue {
        let current = ParameterValueType::Current;
        let rotation = self.inertial.rotation(current);
        let to_device = rotation.inverse();
        match sensor {
            Sensor::Accelerometer => {
                (to_device * (self.inertial.acceleration() - self.ambient.gravity())).into()
            }
            Sensor::Gyroscope | Sensor::GyroscopeUncalibrated => {
                (to_device * self.inertial.rotational_velocity()).into()
            }
            Sensor::Magnetometer | Sensor::MagnetometerUncalibrated => {
                (to_device * self.ambient.magnetic_field(current)).into()
            }
            Sensor::Orientation => euler_degrees_from_rotation(&rotation).into(),
            Sensor::Temperature => self.ambient.temperature(current).into(),
            Sensor::Proximity => self.ambient.proximity(current).into(),
            Sensor::Light => self.ambient.light(current).into(),
            Sensor::Pressure => self.ambient.pressure(current).into(),
            Sensor::Humidity => self.ambient.humidity(current).into(),
        }
    }

    fn read_sensor(&mut self, sensor: Sensor) -> SensorReading {
        if let Some(value) = self.sensors.override_value(sensor) {
            return SensorReading {
                value,
                measurement_id: self.sensors.measurement_id(sensor),
            };
        }
        let measurement_id = if self.changing {
            self.sensors.bump(sensor)
        } else {
            self.sensors.measurement_id(sensor)
        };
        SensorReading {
            value: self.physical_value(sensor),
            measurement_id,
        }
    }
}

/// Physical state of one emulated device and the sensors derived from it.
///
/// The handle is `Send + Sync`; share it with `Arc<PhysicalModel>`.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use sensor_physics::{InterpolationMode, PhysicalModel, Sensor};
///
/// let model = PhysicalModel::default();
/// model.set_target_rotation(Vector3::new(0.0, 0.0, 90.0), InterpolationMode::Step);
/// model.set_current_time(1_000_000);
///
/// // Gravity reaction now reads along the device's +x axis.
/// let (accel, _) = model.accelerometer();
/// assert!((accel.x - 9.81).abs() < 1e-3);
/// assert!(!model.is_changing());
/// ```
pub struct PhysicalModel {
    state: Mutex<EngineState>,
}

impl fmt::Debug for PhysicalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PhysicalModel")
            .field("model_time_ns", &state.model_time_ns)
            .field("changing", &state.changing)
            .field("has_agent", &state.agent.is_some())
            .field("recording", &state.ground_truth.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for PhysicalModel {
    fn default() -> Self {
        Self::new(&PhysicalModelConfig::default())
    }
}

impl Drop for PhysicalModel {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if !std::thread::panicking() {
            debug_assert!(
                state.agent.is_none(),
                "physical state agent must be detached before the model is dropped"
            );
        }
    }
}

impl PhysicalModel {
    /// Create a model at rest at time zero.
    ///
    /// `config` is trusted. Use [`try_new`](Self::try_new) for
    /// configuration from outside the program; a zero or non-finite rate
    /// would otherwise stall or poison the simulation.
    ///
    /// # Panics
    ///
    /// Debug builds panic if `config` fails
    /// [`validate`](PhysicalModelConfig::validate).
    #[must_use]
    pub fn new(config: &PhysicalModelConfig) -> Self {
        debug_assert!(
            config.validate().is_ok(),
            "invalid physical model config: {config:?}"
        );
        Self {
            state: Mutex::new(EngineState::new(config)),
        }
    }

    /// Create a model after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidConfig`](crate::PhysicsError::InvalidConfig)
    /// if a rate or tolerance is not positive and finite.
    pub fn try_new(config: &PhysicalModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the state changing and, on the stable to changing edge, tells
    /// the observer before any value moves.
    fn state_changing(&self) {
        let agent = {
            let mut state = self.lock();
            if state.begin_changing() {
                state.agent.clone()
            } else {
                None
            }
        };
        notify(agent, Transition::Changing);
    }

    /// Drops every override after a target change, then notifies.
    fn target_state_changed(&self) {
        let agent = {
            let mut state = self.lock();
            state.sensors.clear_overrides();
            state.agent.clone()
        };
        notify(agent, Transition::TargetChanged);
    }

    fn change_target(
        &self,
        parameter: PhysicalParameter,
        value: ParameterValue,
        mode: InterpolationMode,
    ) {
        self.state_changing();
        self.lock().apply_target(parameter, value, mode);
        self.target_state_changed();
    }

    fn apply_override(&self, sensor: Sensor, value: SensorValue) {
        self.state_changing();
        self.lock().sensors.set_override(sensor, value);
    }

    fn replay(&self, parameter: PhysicalParameter, event: &PhysicalModelEvent) {
        if let Some(value) = event.current(parameter) {
            self.change_target(parameter, value, InterpolationMode::Step);
        }
        if let Some(value) = event.target(parameter) {
            self.change_target(parameter, value, InterpolationMode::Smooth);
        }
    }

    /// Advances simulated time.
    ///
    /// Both sub-models are advanced; when both come to rest after a change
    /// every measurement id is bumped and the observer is told the state
    /// stabilized. A time earlier than the current model time is ignored.
    pub fn set_current_time(&self, time_ns: i64) {
        let pending = {
            let mut state = self.lock();
            if time_ns < state.model_time_ns {
                warn!(
                    time_ns,
                    model_time_ns = state.model_time_ns,
                    "ignoring attempt to move model time backwards"
                );
                return;
            }
            state.model_time_ns = time_ns;
            let inertial = state.inertial.set_current_time(time_ns);
            let ambient = state.ambient.set_current_time(time_ns);
            let stable = inertial.is_stable() && ambient.is_stable();
            if stable && state.changing {
                state.stabilize();
                Some((state.agent.clone(), Transition::Stabilized))
            } else if !stable && state.begin_changing() {
                Some((state.agent.clone(), Transition::Changing))
            } else {
                None
            }
        };
        if let Some((agent, transition)) = pending {
            notify(agent, transition);
        }
    }

    /// Current model time (ns).
    #[must_use]
    pub fn model_time_ns(&self) -> i64 {
        self.lock().model_time_ns
    }

    /// Returns true while any value is still moving toward its target.
    #[must_use]
    pub fn is_changing(&self) -> bool {
        self.lock().changing
    }

    /// Sets a target value, recording it to the automation sink if one is
    /// attached.
    ///
    /// A value of the wrong shape for `parameter` is logged and replaced with
    /// zero. Setting any target clears every sensor override.
    pub fn set_target(
        &self,
        parameter: PhysicalParameter,
        value: ParameterValue,
        mode: InterpolationMode,
    ) {
        let value = conform(parameter.name(), parameter.kind(), value);
        let recording = {
            let state = self.lock();
            state.sink.clone().map(|sink| (sink, state.model_time_ns))
        };
        if let Some((sink, time_ns)) = recording {
            let event = PhysicalModelEvent::for_target(parameter, value, mode);
            sink.record_physical_model_event(time_ns, &event);
        }
        self.change_target(parameter, value, mode);
    }

    /// Sets the target position (m).
    pub fn set_target_position(&self, position: Vector3<f32>, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Position, position.into(), mode);
    }

    /// Sets the target rotation as XYZ Euler angles (degrees).
    pub fn set_target_rotation(&self, degrees: Vector3<f32>, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Rotation, degrees.into(), mode);
    }

    /// Sets the target magnetic field (µT).
    pub fn set_target_magnetic_field(&self, field: Vector3<f32>, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::MagneticField, field.into(), mode);
    }

    /// Sets the target temperature (°C).
    pub fn set_target_temperature(&self, celsius: f32, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Temperature, celsius.into(), mode);
    }

    /// Sets the target proximity (cm).
    pub fn set_target_proximity(&self, centimeters: f32, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Proximity, centimeters.into(), mode);
    }

    /// Sets the target light level (lux).
    pub fn set_target_light(&self, lux: f32, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Light, lux.into(), mode);
    }

    /// Sets the target pressure (hPa).
    pub fn set_target_pressure(&self, hpa: f32, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Pressure, hpa.into(), mode);
    }

    /// Sets the target relative humidity (%).
    pub fn set_target_humidity(&self, percent: f32, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Humidity, percent.into(), mode);
    }

    /// Sets the target velocity (m/s).
    pub fn set_target_velocity(&self, velocity: Vector3<f32>, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::Velocity, velocity.into(), mode);
    }

    /// Sets the target ambient-motion bound (m).
    pub fn set_target_ambient_motion(&self, bound: f32, mode: InterpolationMode) {
        self.set_target(PhysicalParameter::AmbientMotion, bound.into(), mode);
    }

    /// Returns a parameter value. Rotation is XYZ Euler angles in degrees.
    #[must_use]
    pub fn parameter(
        &self,
        parameter: PhysicalParameter,
        value_type: ParameterValueType,
    ) -> ParameterValue {
        self.lock().parameter(parameter, value_type)
    }

    /// Position (m).
    #[must_use]
    pub fn parameter_position(&self, value_type: ParameterValueType) -> Vector3<f32> {
        self.parameter(PhysicalParameter::Position, value_type)
            .vec3_or_zero()
    }

    /// Rotation as XYZ Euler angles (degrees).
    #[must_use]
    pub fn parameter_rotation(&self, value_type: ParameterValueType) -> Vector3<f32> {
        self.parameter(PhysicalParameter::Rotation, value_type)
            .vec3_or_zero()
    }

    /// Magnetic field (µT).
    #[must_use]
    pub fn parameter_magnetic_field(&self, value_type: ParameterValueType) -> Vector3<f32> {
        self.parameter(PhysicalParameter::MagneticField, value_type)
            .vec3_or_zero()
    }

    /// Temperature (°C).
    #[must_use]
    pub fn parameter_temperature(&self, value_type: ParameterValueType) -> f32 {
        self.parameter(PhysicalParameter::Temperature, value_type)
            .float_or_zero()
    }

    /// Proximity (cm).
    #[must_use]
    pub fn parameter_proximity(&self, value_type: ParameterValueType) -> f32 {
        self.parameter(PhysicalParameter::Proximity, value_type)
            .float_or_zero()
    }

    /// Light (lux).
    #[must_use]
    pub fn parameter_light(&self, value_type: ParameterValueType) -> f32 {
        self.parameter(PhysicalParameter::Light, value_type)
            .float_or_zero()
    }

    /// Pressure (hPa).
    #[must_use]
    pub fn parameter_pressure(&self, value_type: ParameterValueType) -> f32 {
        self.parameter(PhysicalParameter::Pressure, value_type)
            .float_or_zero()
    }

    /// Relative humidity (%).
    #[must_use]
    pub fn parameter_humidity(&self, value_type: ParameterValueType) -> f32 {
        self.parameter(PhysicalParameter::Humidity, value_type)
            .float_or_zero()
    }

    /// Velocity (m/s).
    #[must_use]
    pub fn parameter_velocity(&self, value_type: ParameterValueType) -> Vector3<f32> {
        self.parameter(PhysicalParameter::Velocity, value_type)
            .vec3_or_zero()
    }

    /// Ambient-motion bound (m).
    #[must_use]
    pub fn parameter_ambient_motion(&self, value_type: ParameterValueType) -> f32 {
        self.parameter(PhysicalParameter::AmbientMotion, value_type)
            .float_or_zero()
    }

    /// Forces `sensor` to report `value` until the next target change.
    ///
    /// A value of the wrong shape is logged and replaced with zero.
    pub fn override_sensor(&self, sensor: Sensor, value: SensorValue) {
        let value = conform(sensor.name(), sensor.kind(), value);
        self.apply_override(sensor, value);
    }

    /// Overrides the accelerometer (m/s^2).
    pub fn override_accelerometer(&self, value: Vector3<f32>) {
        self.override_sensor(Sensor::Accelerometer, value.into());
    }

    /// Overrides the gyroscope (rad/s).
    pub fn override_gyroscope(&self, value: Vector3<f32>) {
        self.override_sensor(Sensor::Gyroscope, value.into());
    }

    /// Overrides the magnetometer (µT).
    pub fn override_magnetometer(&self, value: Vector3<f32>) {
        self.override_sensor(Sensor::Magnetometer, value.into());
    }

    /// Overrides the orientation (degrees).
    pub fn override_orientation(&self, value: Vector3<f32>) {
        self.override_sensor(Sensor::Orientation, value.into());
    }

    /// Overrides the temperature sensor (°C).
    pub fn override_temperature(&self, value: f32) {
        self.override_sensor(Sensor::Temperature, value.into());
    }

    /// Overrides the proximity sensor (cm).
    pub fn override_proximity(&self, value: f32) {
        self.override_sensor(Sensor::Proximity, value.into());
    }

    /// Overrides the light sensor (lux).
    pub fn override_light(&self, value: f32) {
        self.override_sensor(Sensor::Light, value.into());
    }

    /// Overrides the pressure sensor (hPa).
    pub fn override_pressure(&self, value: f32) {
        self.override_sensor(Sensor::Pressure, value.into());
    }

    /// Overrides the humidity sensor (%).
    pub fn override_humidity(&self, value: f32) {
        self.override_sensor(Sensor::Humidity, value.into());
    }

    /// Overrides the uncalibrated magnetometer (µT).
    pub fn override_magnetometer_uncalibrated(&self, value: Vector3<f32>) {
        self.override_sensor(Sensor::MagnetometerUncalibrated, value.into());
    }

    /// Overrides the uncalibrated gyroscope (rad/s).
    pub fn override_gyroscope_uncalibrated(&self, value: Vector3<f32>) {
        self.override_sensor(Sensor::GyroscopeUncalibrated, value.into());
    }

    /// Reads a sensor.
    ///
    /// An active override is returned with its id unchanged. Otherwise the
    /// physically derived value is returned, and the id is bumped first if
    /// the state is changing.
    #[must_use]
    pub fn sensor(&self, sensor: Sensor) -> SensorReading {
        self.lock().read_sensor(sensor)
    }

    fn vec3_sensor(&self, sensor: Sensor) -> (Vector3<f32>, u64) {
        let reading = self.sensor(sensor);
        (reading.vec3(), reading.measurement_id)
    }

    fn float_sensor(&self, sensor: Sensor) -> (f32, u64) {
        let reading = self.sensor(sensor);
        (reading.float(), reading.measurement_id)
    }

    /// Accelerometer in device frame (m/s^2) and its measurement id.
    #[must_use]
    pub fn accelerometer(&self) -> (Vector3<f32>, u64) {
        self.vec3_sensor(Sensor::Accelerometer)
    }

    /// Gyroscope in device frame (rad/s) and its measurement id.
    #[must_use]
    pub fn gyroscope(&self) -> (Vector3<f32>, u64) {
        self.vec3_sensor(Sensor::Gyroscope)
    }

    /// Magnetometer in device frame (µT) and its measurement id.
    #[must_use]
    pub fn magnetometer(&self) -> (Vector3<f32>, u64) {
        self.vec3_sensor(Sensor::Magnetometer)
    }

    /// Orientation as XYZ Euler angles (degrees) and its measurement id.
    #[must_use]
    pub fn orientation(&self) -> (Vector3<f32>, u64) {
        self.vec3_sensor(Sensor::Orientation)
    }

    /// Temperature (°C) and its measurement id.
    #[must_use]
    pub fn temperature(&self) -> (f32, u64) {
        self.float_sensor(Sensor::Temperature)
    }

    /// Proximity (cm) and its measurement id.
    #[must_use]
    pub fn proximity(&self) -> (f32, u64) {
        self.float_sensor(Sensor::Proximity)
    }

    /// Light (lux) and its measurement id.
    #[must_use]
    pub fn light(&self) -> (f32, u64) {
        self.float_sensor(Sensor::Light)
    }

    /// Pressure (hPa) and its measurement id.
    #[must_use]
    pub fn pressure(&self) -> (f32, u64) {
        self.float_sensor(Sensor::Pressure)
    }

    /// Relative humidity (%) and its measurement id.
    #[must_use]
    pub fn humidity(&self) -> (f32, u64) {
        self.float_sensor(Sensor::Humidity)
    }

    /// Uncalibrated magnetometer (µT) and its measurement id.
    #[must_use]
    pub fn magnetometer_uncalibrated(&self) -> (Vector3<f32>, u64) {
        self.vec3_sensor(Sensor::MagnetometerUncalibrated)
    }

    /// Uncalibrated gyroscope (rad/s) and its measurement id.
    #[must_use]
    pub fn gyroscope_uncalibrated(&self) -> (Vector3<f32>, u64) {
        self.vec3_sensor(Sensor::GyroscopeUncalibrated)
    }

    /// Returns the current pose, appending it to the ground-truth trace if
    /// recording.
    pub fn transform(&self) -> Transform {
        let mut state = self.lock();
        let current = ParameterValueType::Current;
        let transform = Transform {
            position: state.inertial.position(current),
            rotation_degrees: euler_degrees_from_rotation(&state.inertial.rotation(current)),
            timestamp_ns: state.model_time_ns,
        };
        if let Some(recorder) = state.ground_truth.as_mut() {
            recorder.write_pose(
                transform.timestamp_ns,
                &transform.position,
                &transform.rotation_degrees,
            );
        }
        transform
    }

    /// Attaches or detaches the state observer.
    ///
    /// A newly attached observer is brought up to date: it receives
    /// `changing` (followed by `stabilized` if the model is at rest), then
    /// `target_state_changed`.
    pub fn set_state_agent(&self, agent: Option<Arc<dyn PhysicalStateAgent>>) {
        let changing = {
            let mut state = self.lock();
            state.agent.clone_from(&agent);
            state.changing
        };
        let Some(agent) = agent else {
            return;
        };
        agent.on_physical_state_changing();
        if !changing {
            agent.on_physical_state_stabilized();
        }
        agent.on_target_state_changed();
    }

    /// Attaches or detaches the sink that records target changes.
    pub fn set_automation_sink(&self, sink: Option<Arc<dyn AutomationEventSink>>) {
        self.lock().sink = sink;
    }

    /// Writes all target values and sensor overrides.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::Io`](crate::PhysicsError::Io) if the writer
    /// fails.
    pub fn snapshot_save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let data = {
            let state = self.lock();
            SnapshotData {
                targets: PhysicalParameter::ALL
                    .iter()
                    .map(|&parameter| state.parameter(parameter, ParameterValueType::Target))
                    .collect(),
                overrides: Sensor::ALL
                    .iter()
                    .map(|&sensor| state.sensors.override_value(sensor))
                    .collect(),
            }
        };
        data.write(writer)
    }

    /// Restores targets (stepped into place) and sensor overrides written by
    /// [`snapshot_save`](Self::snapshot_save).
    ///
    /// The stream is decoded completely before anything is applied, so on
    /// error the model is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::IncompatibleSnapshot`](crate::PhysicsError::IncompatibleSnapshot)
    /// if the snapshot stores more parameters or sensors than supported, or
    /// [`PhysicsError::Io`](crate::PhysicsError::Io) if the stream is
    /// truncated.
    pub fn snapshot_load<R: Read>(&self, reader: &mut R) -> Result<()> {
        let data = SnapshotData::read(reader)?;
        debug!(
            parameters = data.targets.len(),
            sensors = data.overrides.len(),
            "loading physical model snapshot"
        );
        for (&parameter, &value) in PhysicalParameter::ALL.iter().zip(&data.targets) {
            self.change_target(parameter, value, InterpolationMode::Step);
        }
        for (&sensor, value) in Sensor::ALL.iter().zip(&data.overrides) {
            if let Some(value) = *value {
                self.apply_override(sensor, value);
            }
        }
        Ok(())
    }

    /// Captures every parameter's current (without ambient motion) and
    /// target value for automation playback.
    #[must_use]
    pub fn save_state(&self) -> InitialState {
        let state = self.lock();
        InitialState {
            initial_time_ns: state.model_time_ns,
            physical_model: PhysicalParameter::ALL
                .iter()
                .map(|&parameter| {
                    PhysicalModelEvent::with_values(
                        parameter,
                        state.parameter(parameter, ParameterValueType::CurrentNoAmbientMotion),
                        state.parameter(parameter, ParameterValueType::Target),
                    )
                })
                .collect(),
        }
    }

    /// Restores state produced by [`save_state`](Self::save_state).
    ///
    /// Position and velocity are applied last so the restored velocity is not
    /// overwritten: current position, then current velocity, then either the
    /// target velocity (if non-zero) or the target position.
    pub fn load_state(&self, initial: &InitialState) {
        let mut current_position = Vector3::zeros();
        let mut target_position = Vector3::zeros();
        let mut current_velocity = Vector3::zeros();
        let mut target_velocity = Vector3::zeros();

        for event in &initial.physical_model {
            match event.physical_parameter() {
                Some(parameter @ PhysicalParameter::Position) => {
                    if let Some(value) = event.current(parameter) {
                        current_position = value.vec3_or_zero();
                    }
                    if let Some(value) = event.target(parameter) {
                        target_position = value.vec3_or_zero();
                    }
                }
                Some(parameter @ PhysicalParameter::Velocity) => {
                    if let Some(value) = event.current(parameter) {
                        current_velocity = value.vec3_or_zero();
                    }
                    if let Some(value) = event.target(parameter) {
                        target_velocity = value.vec3_or_zero();
                    }
                }
                Some(parameter) => self.replay(parameter, event),
                None => {}
            }
        }

        let (step, smooth) = (InterpolationMode::Step, InterpolationMode::Smooth);
        self.change_target(PhysicalParameter::Position, current_position.into(), step);
        self.change_target(PhysicalParameter::Velocity, current_velocity.into(), step);
        if target_velocity == Vector3::zeros() {
            self.change_target(PhysicalParameter::Position, target_position.into(), smooth);
        } else {
            self.change_target(PhysicalParameter::Velocity, target_velocity.into(), smooth);
        }
    }

    /// Applies a recorded event without recording it again.
    ///
    /// The current value (if any) is stepped into place, then the target
    /// value (if any) is approached smoothly. Events for unknown parameters
    /// are logged and skipped.
    pub fn replay_event(&self, event: &PhysicalModelEvent) {
        let Some(parameter) = event.physical_parameter() else {
            return;
        };
        self.replay(parameter, event);
    }

    /// Starts appending every [`transform`](Self::transform) read to a trace
    /// file, replacing any trace in progress.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::GroundTruthOpen`](crate::PhysicsError::GroundTruthOpen)
    /// if the file cannot be created; recording is then off.
    pub fn record_ground_truth(&self, path: impl AsRef<Path>) -> Result<()> {
        self.stop_record_ground_truth();
        let recorder = GroundTruthRecorder::create(path)?;
        self.lock().ground_truth = Some(recorder);
        Ok(())
    }

    /// Stops ground-truth recording and closes the trace file.
    pub fn stop_record_ground_truth(&self) {
        let recorder = self.lock().ground_truth.take();
        drop(recorder);
    }
}

impl SensorSource for PhysicalModel {
    fn sensor(&self, sensor: Sensor) -> SensorReading {
        Self::sensor(self, sensor)
    }

    fn transform(&self) -> Transform {
        Self::transform(self)
    }

    fn is_changing(&self) -> bool {
        Self::is_changing(self)
    }
}

fn notify(agent: Option<Arc<dyn PhysicalStateAgent>>, transition: Transition) {
    if let Some(agent) = agent {
        transition.deliver(agent.as_ref());
    }
}

/// Logs and zeroes a value whose shape does not match `kind`.
fn conform(name: &'static str, kind: ParameterKind, value: ParameterValue) -> ParameterValue {
    if value.kind() != kind {
        warn!(
            name,
            expected = ?kind,
            found = ?value.kind(),
            "value has the wrong shape, substituting zero"
        );
    }
    value.coerce(kind)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MS: i64 = 1_000_000;

    fn settle(model: &PhysicalModel, mut now: i64) -> i64 {
        model.set_current_time(now);
        while model.is_changing() {
            now += 10 * MS;
            model.set_current_time(now);
            assert!(now < 60_000 * MS, "model never settled");
        }
        now
    }

    #[test]
    fn at_rest_accelerometer_reads_gravity_reaction() {
        let model = PhysicalModel::default();
        let (accel, _) = model.accelerometer();
        assert_relative_eq!(accel, Vector3::new(0.0, 9.81, 0.0), epsilon = 1e-5);
        assert!(!model.is_changing());
    }

    #[test]
    fn magnetometer_rotates_into_device_frame() {
        let model = PhysicalModel::default();
        model.set_target_magnetic_field(Vector3::new(30.0, 0.0, 0.0), InterpolationMode::Step);
        model.set_target_rotation(Vector3::new(0.0, 0.0, 90.0), InterpolationMode::Step);
        settle(&model, 0);
        let (field, _) = model.magnetometer();
        assert_relative_eq!(field, Vector3::new(0.0, -30.0, 0.0), epsilon = 1e-4);
        let (uncalibrated, _) = model.magnetometer_uncalibrated();
        assert_relative_eq!(uncalibrated, field);
    }

    #[test]
    fn orientation_reports_degrees() {
        let model = PhysicalModel::default();
        let degrees = Vector3::new(10.0, 20.0, 30.0);
        model.set_target_rotation(degrees, InterpolationMode::Step);
        let (orientation, _) = model.orientation();
        assert_relative_eq!(orientation, degrees, epsilon = 1e-3);
        assert_relative_eq!(
            model.parameter_rotation(ParameterValueType::Target),
            degrees,
            epsilon = 1e-3
        );
    }

    #[test]
    fn scalar_sensors_follow_environment() {
        let model = PhysicalModel::default();
        model.set_target_temperature(31.0, InterpolationMode::Step);
        model.set_target_proximity(3.0, InterpolationMode::Step);
        model.set_target_light(200.0, InterpolationMode::Step);
        model.set_target_pressure(990.0, InterpolationMode::Step);
        model.set_target_humidity(55.0, InterpolationMode::Step);
        assert_eq!(model.temperature().0, 31.0);
        assert_eq!(model.proximity().0, 3.0);
        assert_eq!(model.light().0, 200.0);
        assert_eq!(model.pressure().0, 990.0);
        assert_eq!(model.humidity().0, 55.0);
    }

    #[test]
    fn gyroscope_is_nonzero_while_rotating() {
        let model = PhysicalModel::default();
        model.set_target_rotation(Vector3::new(0.0, 90.0, 0.0), InterpolationMode::Smooth);
        model.set_current_time(50 * MS);
        let (gyro, _) = model.gyroscope();
        assert!(gyro.y > 0.0);
        assert_relative_eq!(model.gyroscope_uncalibrated().0, gyro);
        settle(&model, 50 * MS);
        assert_relative_eq!(model.gyroscope().0, Vector3::zeros(), epsilon = 1e-4);
    }

    #[test]
    fn wrong_shape_becomes_zero() {
        let model = PhysicalModel::default();
        model.set_target(
            PhysicalParameter::Temperature,
            ParameterValue::Vec3(Vector3::new(1.0, 2.0, 3.0)),
            InterpolationMode::Step,
        );
        assert_eq!(model.parameter_temperature(ParameterValueType::Current), 0.0);

        model.override_sensor(Sensor::Accelerometer, SensorValue::Float(4.0));
        assert_eq!(model.accelerometer().0, Vector3::zeros());
    }

    #[test]
    fn decreasing_time_is_ignored() {
        let model = PhysicalModel::default();
        model.set_current_time(100 * MS);
        model.set_current_time(50 * MS);
        assert_eq!(model.model_time_ns(), 100 * MS);
        assert_eq!(model.transform().timestamp_ns, 100 * MS);
    }

    #[test]
    fn stabilizing_bumps_every_measurement_id() {
        let model = PhysicalModel::default();
        let before: Vec<_> = Sensor::ALL
            .iter()
            .map(|&s| model.sensor(s).measurement_id)
            .collect();
        model.set_target_light(10.0, InterpolationMode::Step);
        model.set_current_time(MS);
        assert!(!model.is_changing());
        for (&sensor, id) in Sensor::ALL.iter().zip(before) {
            assert_eq!(model.sensor(sensor).measurement_id, id + 1);
        }
    }

    #[test]
    fn transform_matches_parameters() {
        let model = PhysicalModel::default();
        model.set_target_position(Vector3::new(1.0, 2.0, 3.0), InterpolationMode::Step);
        model.set_current_time(7);
        let transform = model.transform();
        assert_eq!(transform.position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.rotation_degrees, Vector3::zeros());
        assert_eq!(transform.timestamp_ns, 7);
    }

    #[test]
    fn try_new_rejects_bad_config() {
        let config = PhysicalModelConfig::default().with_inertial_frequency(0.0);
        assert!(PhysicalModel::try_new(&config).is_err());
        assert!(PhysicalModel::try_new(&PhysicalModelConfig::default()).is_ok());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid physical model config")]
    fn new_rejects_bad_config_in_debug() {
        let config = PhysicalModelConfig::default().with_ambient_rate(f32::INFINITY);
        let _ = PhysicalModel::new(&config);
    }

    #[test]
    fn sensor_source_is_object_safe() {
        let model = Arc::new(PhysicalModel::default());
        let source: Arc<dyn SensorSource> = model;
        assert!(!source.is_changing());
        assert_eq!(source.sensor(Sensor::Light).float(), 0.0);
    }
}
