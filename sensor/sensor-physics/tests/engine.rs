//! Engine behaviour: convergence, stepping, overrides and measurement ids.

use approx::assert_relative_eq;
use nalgebra::Vector3;
use sensor_physics::{
    InterpolationMode, ParameterValue, ParameterValueType, PhysicalModel, PhysicalModelConfig,
    PhysicalParameter, Sensor, SensorValue,
};

const MS: i64 = 1_000_000;
const SECOND: i64 = 1_000_000_000;

/// Advance in 10 ms steps until the model is stable, returning the final time.
fn run_until_stable(model: &PhysicalModel, mut now: i64) -> i64 {
    model.set_current_time(now);
    while model.is_changing() {
        now += 10 * MS;
        model.set_current_time(now);
        assert!(now < 120 * SECOND, "model did not stabilize");
    }
    now
}

/// Test: smooth position target reaches (1, 0, 0) and reports stable.
#[test]
fn smooth_position_scenario() {
    let model = PhysicalModel::default();
    model.set_target_position(Vector3::new(1.0, 0.0, 0.0), InterpolationMode::Smooth);
    assert!(model.is_changing());

    model.set_current_time(100 * MS);
    assert!(model.is_changing());
    let partway = model.parameter_position(ParameterValueType::Current);
    assert!(partway.x > 0.0 && partway.x < 1.0, "x = {}", partway.x);

    model.set_current_time(5 * SECOND);
    assert!(!model.is_changing());
    assert_relative_eq!(
        model.parameter_position(ParameterValueType::Current),
        Vector3::new(1.0, 0.0, 0.0),
        epsilon = 1e-4
    );
}

/// Test: every parameter converges on a smooth target from rest.
#[test]
fn every_parameter_converges() {
    let targets = [
        (
            PhysicalParameter::Position,
            ParameterValue::Vec3(Vector3::new(0.5, -2.0, 1.0)),
        ),
        (
            PhysicalParameter::Rotation,
            ParameterValue::Vec3(Vector3::new(30.0, -45.0, 60.0)),
        ),
        (
            PhysicalParameter::MagneticField,
            ParameterValue::Vec3(Vector3::new(20.0, 0.0, -40.0)),
        ),
        (PhysicalParameter::Temperature, ParameterValue::Float(37.5)),
        (PhysicalParameter::Proximity, ParameterValue::Float(0.0)),
        (PhysicalParameter::Light, ParameterValue::Float(12_000.0)),
        (PhysicalParameter::Pressure, ParameterValue::Float(870.0)),
        (PhysicalParameter::Humidity, ParameterValue::Float(80.0)),
        (PhysicalParameter::AmbientMotion, ParameterValue::Float(0.0)),
    ];

    for (parameter, target) in targets {
        let model = PhysicalModel::default();
        model.set_target(parameter, target, InterpolationMode::Smooth);
        run_until_stable(&model, 0);

        let current = model.parameter(parameter, ParameterValueType::Current);
        match (current, target) {
            (ParameterValue::Vec3(current), ParameterValue::Vec3(target)) => {
                assert_relative_eq!(current, target, epsilon = 1e-2);
            }
            (ParameterValue::Float(current), ParameterValue::Float(target)) => {
                assert_relative_eq!(current, target, epsilon = 1e-2);
            }
            other => panic!("{} changed shape: {other:?}", parameter.name()),
        }
    }
}

/// Test: step targets are visible on the very next read.
#[test]
fn step_is_immediate() {
    let model = PhysicalModel::default();
    model.set_target_position(Vector3::new(3.0, 2.0, 1.0), InterpolationMode::Step);
    model.set_target_pressure(950.0, InterpolationMode::Step);

    assert_eq!(
        model.parameter_position(ParameterValueType::Current),
        Vector3::new(3.0, 2.0, 1.0)
    );
    assert_eq!(model.parameter_pressure(ParameterValueType::Current), 950.0);

    model.set_current_time(MS);
    assert!(!model.is_changing());
}

/// Test: a non-zero target velocity keeps the body moving.
#[test]
fn velocity_target_keeps_moving() {
    let model = PhysicalModel::default();
    model.set_target_velocity(Vector3::new(1.0, 0.0, 0.0), InterpolationMode::Step);
    model.set_current_time(2 * SECOND);
    assert!(model.is_changing());
    assert_relative_eq!(
        model.parameter_position(ParameterValueType::Current),
        Vector3::new(2.0, 0.0, 0.0),
        epsilon = 1e-4
    );

    model.set_target_velocity(Vector3::zeros(), InterpolationMode::Smooth);
    run_until_stable(&model, 2 * SECOND);
    assert_relative_eq!(
        model.parameter_velocity(ParameterValueType::Current),
        Vector3::zeros(),
        epsilon = 1e-3
    );
}

/// Test: ambient motion jitters position but not the no-ambient value.
#[test]
fn ambient_motion_only_affects_current() {
    let model = PhysicalModel::default();
    model.set_target_ambient_motion(0.05, InterpolationMode::Step);
    model.set_current_time(123 * MS);
    assert!(model.is_changing());

    let steady = model.parameter_position(ParameterValueType::CurrentNoAmbientMotion);
    let jittered = model.parameter_position(ParameterValueType::Current);
    assert_eq!(steady, Vector3::zeros());
    assert!(jittered != steady);
    assert!(jittered.amax() <= 0.05 + 1e-6);
}

/// Test: an override wins until the next target set.
#[test]
fn override_precedence() {
    let model = PhysicalModel::default();
    let forced = Vector3::new(0.0, 0.0, 42.0);
    model.override_accelerometer(forced);

    model.set_target_rotation(Vector3::new(0.0, 45.0, 0.0), InterpolationMode::Step);
    // The target set above cleared the override.
    assert_relative_eq!(model.accelerometer().0.norm(), 9.81, epsilon = 1e-4);

    model.override_accelerometer(forced);
    model.set_current_time(50 * MS);
    let (value, first_id) = model.accelerometer();
    assert_eq!(value, forced);
    let (_, second_id) = model.accelerometer();
    assert_eq!(first_id, second_id);

    model.set_target_light(5.0, InterpolationMode::Step);
    assert_ne!(model.accelerometer().0, forced);
}

/// Test: overriding bumps the id once and marks the state changing.
#[test]
fn override_bumps_measurement_id() {
    let model = PhysicalModel::default();
    let before = model.sensor(Sensor::Light).measurement_id;
    model.override_sensor(Sensor::Light, SensorValue::Float(900.0));
    let reading = model.sensor(Sensor::Light);
    assert_eq!(reading.float(), 900.0);
    assert_eq!(reading.measurement_id, before + 1);
    assert!(model.is_changing());
}

/// Test: ids grow on every read while changing and hold still while stable.
#[test]
fn measurement_id_monotonicity() {
    let model = PhysicalModel::default();
    model.set_target_temperature(60.0, InterpolationMode::Smooth);
    model.set_current_time(10 * MS);
    assert!(model.is_changing());

    let mut last = model.temperature().1;
    for _ in 0..5 {
        let id = model.temperature().1;
        assert!(id > last);
        last = id;
    }

    run_until_stable(&model, 10 * MS);
    let settled = model.temperature().1;
    assert!(settled > last);
    assert_eq!(model.temperature().1, settled);
    assert_eq!(model.temperature().1, settled);
}

/// Test: moving time backwards is ignored.
#[test]
fn decreasing_time_is_ignored() {
    let model = PhysicalModel::default();
    model.set_target_humidity(90.0, InterpolationMode::Smooth);
    model.set_current_time(200 * MS);
    let humidity = model.parameter_humidity(ParameterValueType::Current);

    model.set_current_time(100 * MS);
    assert_eq!(model.model_time_ns(), 200 * MS);
    assert_eq!(model.parameter_humidity(ParameterValueType::Current), humidity);
}

/// Test: config values seed the environment.
#[test]
fn config_seeds_environment() {
    let config = PhysicalModelConfig::default()
        .with_temperature(-5.0)
        .with_pressure(700.0)
        .with_gravity(Vector3::new(0.0, 0.0, -9.81));
    let model = PhysicalModel::new(&config);
    assert_eq!(model.temperature().0, -5.0);
    assert_eq!(model.pressure().0, 700.0);
    assert_relative_eq!(
        model.accelerometer().0,
        Vector3::new(0.0, 0.0, 9.81),
        epsilon = 1e-6
    );
}
