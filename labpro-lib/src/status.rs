use std::fmt;

use serde::Serialize;

/// Marker value the firmware places in every complete status vector.
pub const STATUS_SENTINEL: f64 = 8888.0;

/// Position of the sentinel within the status vector.
pub const SENTINEL_INDEX: usize = 3;

/// Elements in a full status vector, sentinel included.
pub const STATUS_FIELD_COUNT: usize = 17;

/// Snapshot of the logger's state as reported by the status command.
///
/// Fields map positionally onto the 17-element status vector. The sentinel
/// slot at index 3 is validated and dropped; it confirms the firmware sent
/// the full layout rather than a warm-up or truncated frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub software_id: f64,
    pub error: f64,
    /// Raw battery field. The firmware's encoding is not a charge level;
    /// interpreting it is left to callers.
    pub battery: f64,
    pub sample_time: f64,
    pub trigger_condition: f64,
    pub channel_function: f64,
    pub channel_post: f64,
    pub channel_filter: f64,
    pub num_samples: f64,
    pub record_time: f64,
    pub temperature: f64,
    pub piezo_flag: f64,
    pub system_state: f64,
    pub data_start: f64,
    pub data_end: f64,
    pub system_id: f64,
}

impl DeviceStatus {
    /// Whether `values` is a usable snapshot: full length and carrying the
    /// sentinel. Anything else is a transient frame and must be re-polled.
    pub fn is_complete(values: &[f64]) -> bool {
        values.len() >= STATUS_FIELD_COUNT && values.contains(&STATUS_SENTINEL)
    }

    /// Build a snapshot from a status vector, or `None` if the vector is not
    /// complete.
    pub fn from_vector(values: &[f64]) -> Option<Self> {
        if !Self::is_complete(values) {
            return None;
        }
        Some(Self {
            software_id: values[0],
            error: values[1],
            battery: values[2],
            sample_time: values[4],
            trigger_condition: values[5],
            channel_function: values[6],
            channel_post: values[7],
            channel_filter: values[8],
            num_samples: values[9],
            record_time: values[10],
            temperature: values[11],
            piezo_flag: values[12],
            system_state: values[13],
            data_start: values[14],
            data_end: values[15],
            system_id: values[16],
        })
    }

    /// Whether the logger is in the middle of a sampling run.
    pub fn is_collecting(&self) -> bool {
        (self.system_state as i64).rem_euclid(16) == 3
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sw {}, error {}, battery {}, {} samples every {} s, state {}, system id {}",
            self.software_id,
            self.error,
            self.battery,
            self.num_samples,
            self.sample_time,
            self.system_state,
            self.system_id
        )
    }
}
