//! Automation event format for recording, playback and saved state.
//!
//! These are the structures the engine exchanges with an automation
//! controller. Encoding them on the wire is the controller's business; with
//! the `serde` feature they derive `Serialize`/`Deserialize`.

use nalgebra::Vector3;
use tracing::warn;

use crate::parameter::{InterpolationMode, ParameterKind, ParameterValue, PhysicalParameter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Flat list of `f32` components: one for a scalar, three for a vector.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterPayload {
    /// Value components.
    pub data: Vec<f32>,
}

impl ParameterPayload {
    /// Decodes the payload as a value of `kind`.
    ///
    /// A payload with the wrong number of components is logged and decodes
    /// to zero.
    #[must_use]
    pub fn decode(&self, kind: ParameterKind) -> ParameterValue {
        match (kind, self.data.as_slice()) {
            (ParameterKind::Float, &[value]) => ParameterValue::Float(value),
            (ParameterKind::Vec3, &[x, y, z]) => ParameterValue::Vec3(Vector3::new(x, y, z)),
            _ => {
                warn!(
                    expected = kind.len(),
                    found = self.data.len(),
                    "malformed physical model payload, substituting zero"
                );
                kind.zero()
            }
        }
    }
}

impl From<ParameterValue> for ParameterPayload {
    fn from(value: ParameterValue) -> Self {
        Self {
            data: value.to_vec(),
        }
    }
}

/// A change to one physical parameter.
///
/// `current_value` is applied with [`InterpolationMode::Step`] and
/// `target_value` with [`InterpolationMode::Smooth`], in that order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicalModelEvent {
    /// Wire id of the parameter (see [`PhysicalParameter::wire_id`]).
    pub parameter: i32,
    /// Value to snap to.
    pub current_value: Option<ParameterPayload>,
    /// Value to approach.
    pub target_value: Option<ParameterPayload>,
}

impl PhysicalModelEvent {
    /// Builds the event recorded for a target set with `mode`.
    #[must_use]
    pub fn for_target(
        parameter: PhysicalParameter,
        value: ParameterValue,
        mode: InterpolationMode,
    ) -> Self {
        let payload = Some(ParameterPayload::from(value));
        match mode {
            InterpolationMode::Step => Self {
                parameter: parameter.wire_id(),
                current_value: payload,
                target_value: None,
            },
            InterpolationMode::Smooth => Self {
                parameter: parameter.wire_id(),
                current_value: None,
                target_value: payload,
            },
        }
    }

    /// Builds an event carrying both a current and a target value.
    #[must_use]
    pub fn with_values(
        parameter: PhysicalParameter,
        current: ParameterValue,
        target: ParameterValue,
    ) -> Self {
        Self {
            parameter: parameter.wire_id(),
            current_value: Some(current.into()),
            target_value: Some(target.into()),
        }
    }

    /// Resolves the parameter, logging unknown ids.
    #[must_use]
    pub fn physical_parameter(&self) -> Option<PhysicalParameter> {
        let parameter = PhysicalParameter::from_wire_id(self.parameter);
        if parameter.is_none() {
            warn!(id = self.parameter, "unknown physical parameter in event");
        }
        parameter
    }

    /// Decoded current value, if present.
    #[must_use]
    pub fn current(&self, parameter: PhysicalParameter) -> Option<ParameterValue> {
        self.current_value
            .as_ref()
            .map(|payload| payload.decode(parameter.kind()))
    }

    /// Decoded target value, if present.
    #[must_use]
    pub fn target(&self, parameter: PhysicalParameter) -> Option<ParameterValue> {
        self.target_value
            .as_ref()
            .map(|payload| payload.decode(parameter.kind()))
    }
}

/// Full physical state as a sequence of events, used to start a playback.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InitialState {
    /// Model time when the state was saved (ns).
    pub initial_time_ns: i64,
    /// One event per parameter.
    pub physical_model: Vec<PhysicalModelEvent>,
}

/// Destination for events generated while recording.
///
/// Called without the engine lock held.
pub trait AutomationEventSink: Send + Sync {
    /// Records that `event` happened at model time `time_ns`.
    fn record_physical_model_event(&self, time_ns: i64, event: &PhysicalModelEvent);
}
