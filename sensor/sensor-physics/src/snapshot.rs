//! Binary snapshot codec.
//!
//! Layout (all big-endian):
//!
//! ```text
//! u32 parameter_count
//! parameter_count × target value     (f32, or 3 × f32 for vectors)
//! u32 sensor_count
//! sensor_count × {
//!     u32 is_overridden
//!     override value if is_overridden (f32, or 3 × f32)
//! }
//! ```
//!
//! Entries are in [`PhysicalParameter::ALL`] and [`Sensor::ALL`] order.
//! A snapshot with fewer entries than this build supports loads; one with
//! more is rejected.

use std::io::{Read, Write};

use nalgebra::Vector3;
use tracing::warn;

use crate::error::{PhysicsError, Result};
use crate::parameter::{ParameterKind, ParameterValue, PhysicalParameter};
use crate::sensor::{Sensor, SensorValue};

/// Decoded snapshot contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotData {
    /// Target values for the first `targets.len()` parameters.
    pub targets: Vec<ParameterValue>,
    /// Override state for the first `overrides.len()` sensors.
    pub overrides: Vec<Option<SensorValue>>,
}

impl SnapshotData {
    /// Writes the snapshot.
    ///
    /// Each value is written in the shape its slot expects, so the stream
    /// always reads back aligned. A mismatched value is logged and written
    /// as zero. Entries past the supported counts are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::Io`] if the writer fails.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let targets: Vec<_> = PhysicalParameter::ALL.iter().zip(&self.targets).collect();
        write_count(writer, targets.len())?;
        for (parameter, value) in targets {
            write_value(writer, parameter.name(), parameter.kind(), *value)?;
        }

        let overrides: Vec<_> = Sensor::ALL.iter().zip(&self.overrides).collect();
        write_count(writer, overrides.len())?;
        for (sensor, entry) in overrides {
            match entry {
                Some(value) => {
                    writer.write_all(&1u32.to_be_bytes())?;
                    write_value(writer, sensor.name(), sensor.kind(), *value)?;
                }
                None => writer.write_all(&0u32.to_be_bytes())?,
            }
        }
        Ok(())
    }

    /// Reads a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::IncompatibleSnapshot`] if the snapshot stores
    /// more parameters or sensors than this build supports, or
    /// [`PhysicsError::Io`] if the stream ends early.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let parameter_count = read_count(reader, "physical parameters", PhysicalParameter::COUNT)?;
        let targets = PhysicalParameter::ALL[..parameter_count]
            .iter()
            .map(|parameter| read_value(reader, parameter.kind()))
            .collect::<Result<Vec<_>>>()?;

        let sensor_count = read_count(reader, "sensors", Sensor::COUNT)?;
        let overrides = Sensor::ALL[..sensor_count]
            .iter()
            .map(|sensor| {
                if read_u32(reader)? == 0 {
                    Ok(None)
                } else {
                    read_value(reader, sensor.kind()).map(Some)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { targets, overrides })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_count<W: Write>(writer: &mut W, count: usize) -> Result<()> {
    writer.write_all(&(count as u32).to_be_bytes())?;
    Ok(())
}

fn write_value<W: Write>(
    writer: &mut W,
    name: &'static str,
    kind: ParameterKind,
    value: ParameterValue,
) -> Result<()> {
    if value.kind() != kind {
        warn!(
            name,
            expected = ?kind,
            found = ?value.kind(),
            "snapshot value has the wrong shape, writing zero"
        );
    }
    for component in value.coerce(kind).to_vec() {
        writer.write_all(&component.to_be_bytes())?;
    }
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_be_bytes(buf))
}

#[allow(clippy::cast_possible_truncation)]
fn read_count<R: Read>(reader: &mut R, what: &'static str, supported: usize) -> Result<usize> {
    let stored = read_u32(reader)?;
    if stored as usize > supported {
        return Err(PhysicsError::incompatible_snapshot(
            what,
            stored,
            supported as u32,
        ));
    }
    Ok(stored as usize)
}

fn read_value<R: Read>(reader: &mut R, kind: ParameterKind) -> Result<ParameterValue> {
    Ok(match kind {
        ParameterKind::Float => ParameterValue::Float(read_f32(reader)?),
        ParameterKind::Vec3 => {
            let x = read_f32(reader)?;
            let y = read_f32(reader)?;
            let z = read_f32(reader)?;
            ParameterValue::Vec3(Vector3::new(x, y, z))
        }
    })
}
