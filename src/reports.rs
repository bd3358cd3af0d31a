//! Report metadata and decoded reading types.
//!
//! The fixed per-report-ID table (byte length, element count, Q-point
//! scalar) lives here together with the typed values the batch decoder
//! produces and the fixed-layout control reports exchanged on the
//! control channel.

use crate::constants::*;
use crate::error::BnoError;
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static metadata for one sensor report ID.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReportMeta {
    /// Q-point scalar applied to each raw 16-bit word
    pub scalar: f64,
    /// Number of 16-bit words in the sample
    pub count: usize,
    /// Total report length in bytes
    pub length: usize,
    /// Raw reports carry unsigned ADC words; everything else is signed
    pub unsigned: bool,
}

const fn signed(scalar: f64, count: usize, length: usize) -> SensorReportMeta {
    SensorReportMeta { scalar, count, length, unsigned: false }
}

const fn unsigned(count: usize, length: usize) -> SensorReportMeta {
    SensorReportMeta { scalar: 1.0, count, length, unsigned: true }
}

/// Look up the table entry for a sensor report ID (< 0xF0).
pub fn sensor_report_meta(report_id: u8) -> Option<SensorReportMeta> {
    let meta = match report_id {
        REPORT_ACCELEROMETER => signed(Q_POINT_8_SCALAR, 3, 10),
        REPORT_GRAVITY => signed(Q_POINT_8_SCALAR, 3, 10),
        REPORT_GYROSCOPE => signed(Q_POINT_9_SCALAR, 3, 10),
        REPORT_MAGNETOMETER => signed(Q_POINT_4_SCALAR, 3, 10),
        REPORT_LINEAR_ACCELERATION => signed(Q_POINT_8_SCALAR, 3, 10),
        REPORT_ROTATION_VECTOR => signed(Q_POINT_14_SCALAR, 4, 14),
        REPORT_GEOMAGNETIC_ROTATION_VECTOR => signed(Q_POINT_12_SCALAR, 4, 14),
        REPORT_GAME_ROTATION_VECTOR => signed(Q_POINT_14_SCALAR, 4, 12),
        REPORT_STEP_COUNTER => signed(1.0, 1, 12),
        REPORT_SHAKE_DETECTOR => signed(1.0, 1, 6),
        REPORT_STABILITY_CLASSIFIER => signed(1.0, 1, 6),
        REPORT_ACTIVITY_CLASSIFIER => signed(1.0, 1, 16),
        REPORT_RAW_ACCELEROMETER => unsigned(3, 16),
        REPORT_RAW_GYROSCOPE => unsigned(3, 16),
        REPORT_RAW_MAGNETOMETER => unsigned(3, 16),
        _ => return None,
    };
    Some(meta)
}

/// Fixed lengths of control reports (>= 0xF0).
pub fn control_report_length(report_id: u8) -> Option<usize> {
    match report_id {
        PRODUCT_ID_RESPONSE => Some(16),
        GET_FEATURE_RESPONSE => Some(17),
        COMMAND_RESPONSE => Some(16),
        BASE_TIMESTAMP => Some(5),
        TIMESTAMP_REBASE => Some(5),
        _ => None,
    }
}

/// Byte length of any report, sensor or control.
pub fn report_length(report_id: u8) -> Result<usize, BnoError> {
    let length = if report_id < CONTROL_REPORT_BASE {
        sensor_report_meta(report_id).map(|meta| meta.length)
    } else {
        control_report_length(report_id)
    };
    length.ok_or(BnoError::UnknownReportId(report_id))
}

/// Stability classification reported by 0x13.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Stability {
    #[default]
    Unknown = 0,
    #[strum(to_string = "On Table")]
    OnTable = 1,
    Stationary = 2,
    Stable = 3,
    #[strum(to_string = "In motion")]
    InMotion = 4,
}

/// Activity classes reported by the activity classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Activity {
    #[default]
    Unknown = 0,
    #[strum(to_string = "In-Vehicle")]
    InVehicle = 1,
    #[strum(to_string = "On-Bicycle")]
    OnBicycle = 2,
    #[strum(to_string = "On-Foot")]
    OnFoot = 3,
    Still = 4,
    Tilting = 5,
    Walking = 6,
    Running = 7,
    #[strum(to_string = "On Stairs")]
    OnStairs = 8,
}

/// Most-likely activity plus the per-activity confidence scores.
///
/// Confidences are 0..=100; -1 marks a class the sensor has not scored yet
/// (the state a freshly enabled classifier starts in).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivityClassification {
    pub most_likely: Activity,
    pub page: u8,
    confidence: [i16; 9],
}

impl ActivityClassification {
    pub(crate) fn new(most_likely: Activity, page: u8, confidence: [i16; 9]) -> Self {
        Self { most_likely, page, confidence }
    }

    /// Confidence score for one activity class, -1 if not yet scored.
    pub fn confidence(&self, activity: Activity) -> i16 {
        self.confidence[u8::from(activity) as usize]
    }
}

impl Default for ActivityClassification {
    fn default() -> Self {
        Self { most_likely: Activity::Unknown, page: 0, confidence: [-1; 9] }
    }
}

/// One decoded sensor reading, keyed in the cache by report ID.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Reading {
    /// 3-axis sample (acceleration, gyro, magnetic, ...) with its
    /// 2-bit accuracy estimate
    Vector { values: [f64; 3], accuracy: u8 },
    /// Unit quaternion [i, j, k, real]
    Quaternion { values: [f64; 4], accuracy: u8 },
    StepCount(u16),
    Shake(bool),
    Stability(Stability),
    Activity(ActivityClassification),
}

/// The type-appropriate zero a get-feature response seeds the cache with.
pub fn initial_reading(report_id: u8) -> Option<Reading> {
    let reading = match report_id {
        REPORT_ROTATION_VECTOR | REPORT_GAME_ROTATION_VECTOR | REPORT_GEOMAGNETIC_ROTATION_VECTOR => {
            Reading::Quaternion { values: [0.0; 4], accuracy: 0 }
        }
        REPORT_STABILITY_CLASSIFIER => Reading::Stability(Stability::Unknown),
        REPORT_ACTIVITY_CLASSIFIER => Reading::Activity(ActivityClassification::default()),
        REPORT_STEP_COUNTER => Reading::StepCount(0),
        REPORT_SHAKE_DETECTOR => Reading::Shake(false),
        REPORT_ACCELEROMETER
        | REPORT_GRAVITY
        | REPORT_GYROSCOPE
        | REPORT_MAGNETOMETER
        | REPORT_LINEAR_ACCELERATION
        | REPORT_RAW_ACCELEROMETER
        | REPORT_RAW_GYROSCOPE
        | REPORT_RAW_MAGNETOMETER => Reading::Vector { values: [0.0; 3], accuracy: 0 },
        _ => return None,
    };
    Some(reading)
}

/// Product ID response wire layout (16 bytes, control channel).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ProductIdResponseRaw {
    pub report_id: u8,
    pub reset_cause: u8,
    pub sw_version_major: u8,
    pub sw_version_minor: u8,
    pub part_number: U32,
    pub build_number: U32,
    pub sw_version_patch: U16,
    pub reserved: U16,
}

/// Device identity parsed from a product ID response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProductId {
    pub part_number: u32,
    pub build_number: u32,
    pub sw_version_major: u8,
    pub sw_version_minor: u8,
    pub sw_version_patch: u16,
    pub reset_cause: u8,
}

impl From<ProductIdResponseRaw> for ProductId {
    fn from(raw: ProductIdResponseRaw) -> Self {
        Self {
            part_number: raw.part_number.get(),
            build_number: raw.build_number.get(),
            sw_version_major: raw.sw_version_major,
            sw_version_minor: raw.sw_version_minor,
            sw_version_patch: raw.sw_version_patch.get(),
            reset_cause: raw.reset_cause,
        }
    }
}

/// Get-feature response wire layout (17 bytes). The set-feature command
/// shares the layout with report ID 0xFD.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FeatureReportRaw {
    pub report_id: u8,
    pub feature_report_id: u8,
    pub flags: u8,
    pub change_sensitivity: U16,
    pub report_interval_us: U32,
    pub batch_interval_us: U32,
    pub sensor_specific: U32,
}

impl FeatureReportRaw {
    /// Build a set-feature command for one feature with the default report
    /// interval. `sensor_specific` is 0 for every report except the
    /// activity classifier's enabled-activities mask.
    pub fn set_feature(feature_report_id: u8) -> Self {
        let sensor_specific = if feature_report_id == REPORT_ACTIVITY_CLASSIFIER {
            ENABLED_ACTIVITIES
        } else {
            0
        };
        Self {
            report_id: SET_FEATURE_COMMAND,
            feature_report_id,
            flags: 0,
            change_sensitivity: U16::new(0),
            report_interval_us: U32::new(DEFAULT_REPORT_INTERVAL_US),
            batch_interval_us: U32::new(0),
            sensor_specific: U32::new(sensor_specific),
        }
    }
}

/// Command request wire layout (12 bytes, control channel).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct CommandRequestRaw {
    pub report_id: u8,
    pub sequence: u8,
    pub command: u8,
    pub params: [u8; 9],
}

impl CommandRequestRaw {
    pub fn new(sequence: u8, command: u8, params: [u8; 9]) -> Self {
        Self { report_id: COMMAND_REQUEST, sequence, command, params }
    }
}

/// Command response wire layout (16 bytes, control channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct CommandResponseRaw {
    pub report_id: u8,
    pub sequence: u8,
    pub command: u8,
    pub command_sequence: u8,
    pub response_sequence: u8,
    pub data: [u8; 11],
}

impl CommandResponseRaw {
    /// First response byte: 0 means the command succeeded.
    pub fn status(&self) -> u8 {
        self.data[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_length_covers_both_tables() {
        assert_eq!(report_length(REPORT_ACCELEROMETER).unwrap(), 10);
        assert_eq!(report_length(REPORT_ACTIVITY_CLASSIFIER).unwrap(), 16);
        assert_eq!(report_length(GET_FEATURE_RESPONSE).unwrap(), 17);
        assert_eq!(report_length(BASE_TIMESTAMP).unwrap(), 5);
        assert!(matches!(report_length(0x7E), Err(BnoError::UnknownReportId(0x7E))));
        assert!(matches!(report_length(0xF0), Err(BnoError::UnknownReportId(0xF0))));
    }

    #[test]
    fn set_feature_is_17_bytes_with_interval_at_offset_5() {
        let cmd = FeatureReportRaw::set_feature(REPORT_GYROSCOPE);
        let bytes = cmd.as_bytes();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], SET_FEATURE_COMMAND);
        assert_eq!(bytes[1], REPORT_GYROSCOPE);
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 50_000);
        assert_eq!(u32::from_le_bytes(bytes[13..17].try_into().unwrap()), 0);
    }

    #[test]
    fn activity_classifier_enables_all_activities() {
        let cmd = FeatureReportRaw::set_feature(REPORT_ACTIVITY_CLASSIFIER);
        assert_eq!(cmd.sensor_specific.get(), 0x1FF);
    }

    #[test]
    fn command_request_is_12_bytes() {
        let cmd = CommandRequestRaw::new(3, CMD_ME_CALIBRATE, [1, 1, 1, 0, 0, 0, 0, 0, 0]);
        let bytes = cmd.as_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[..3], [COMMAND_REQUEST, 3, CMD_ME_CALIBRATE]);
    }

    #[test]
    fn stability_display_names() {
        assert_eq!(Stability::from(1).to_string(), "On Table");
        assert_eq!(Stability::from(4).to_string(), "In motion");
        assert_eq!(Stability::from(0x7F), Stability::Unknown);
    }

    #[test]
    fn unrecognized_classifier_codes_fall_back_to_unknown() {
        assert_eq!(Activity::from(0x7F), Activity::Unknown);
        assert_eq!(Activity::default(), Activity::Unknown);
        assert_eq!(Stability::default(), Stability::Unknown);
    }
}
