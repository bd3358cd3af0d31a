// Protocol constants for the BNO08x SHTP interface

use std::time::Duration;

/// Size of the SHTP frame header (4 bytes)
pub const SHTP_HEADER_SIZE: usize = 4;

/// SHTP command channel
pub const CHANNEL_SHTP_COMMAND: u8 = 0;
/// Executable channel (soft reset lives here)
pub const CHANNEL_EXE: u8 = 1;
/// Control channel (feature and command reports)
pub const CHANNEL_CONTROL: u8 = 2;
/// Input sensor report channel
pub const CHANNEL_INPUT_SENSOR_REPORTS: u8 = 3;
/// Wake input sensor report channel
pub const CHANNEL_WAKE_INPUT_SENSOR_REPORTS: u8 = 4;
/// Gyro rotation vector channel
pub const CHANNEL_GYRO_ROTATION_VECTOR: u8 = 5;

/// Highest valid channel number; anything above marks a garbage header
pub const CHANNEL_MAX: u8 = 5;

/// Number of logical SHTP channels
pub const CHANNEL_COUNT: usize = 6;

/// Calibrated acceleration (m/s²)
pub const REPORT_ACCELEROMETER: u8 = 0x01;
/// Calibrated gyroscope (rad/s)
pub const REPORT_GYROSCOPE: u8 = 0x02;
/// Calibrated magnetic field (µT)
pub const REPORT_MAGNETOMETER: u8 = 0x03;
/// Linear acceleration (m/s², gravity removed)
pub const REPORT_LINEAR_ACCELERATION: u8 = 0x04;
/// Rotation vector (unit quaternion)
pub const REPORT_ROTATION_VECTOR: u8 = 0x05;
/// Gravity vector (m/s²)
pub const REPORT_GRAVITY: u8 = 0x06;
/// Game rotation vector (no magnetometer input)
pub const REPORT_GAME_ROTATION_VECTOR: u8 = 0x08;
/// Geomagnetic rotation vector
pub const REPORT_GEOMAGNETIC_ROTATION_VECTOR: u8 = 0x09;
/// Step counter
pub const REPORT_STEP_COUNTER: u8 = 0x11;
/// Stability classifier
pub const REPORT_STABILITY_CLASSIFIER: u8 = 0x13;
/// Raw (uncalibrated, unsigned ADC) accelerometer
pub const REPORT_RAW_ACCELEROMETER: u8 = 0x14;
/// Raw gyroscope
pub const REPORT_RAW_GYROSCOPE: u8 = 0x15;
/// Raw magnetometer
pub const REPORT_RAW_MAGNETOMETER: u8 = 0x16;
/// Shake detector
pub const REPORT_SHAKE_DETECTOR: u8 = 0x19;
/// Activity classifier
pub const REPORT_ACTIVITY_CLASSIFIER: u8 = 0x1E;

/// First control report ID; everything below is sensor data
pub const CONTROL_REPORT_BASE: u8 = 0xF0;

/// Command response (control channel)
pub const COMMAND_RESPONSE: u8 = 0xF1;
/// Command request (control channel)
pub const COMMAND_REQUEST: u8 = 0xF2;
/// Timestamp rebase report, prefixes some sensor batches
pub const TIMESTAMP_REBASE: u8 = 0xFA;
/// Base timestamp report, prefixes sensor batches
pub const BASE_TIMESTAMP: u8 = 0xFB;
/// Get feature response
pub const GET_FEATURE_RESPONSE: u8 = 0xFC;
/// Set feature command
pub const SET_FEATURE_COMMAND: u8 = 0xFD;
/// Get feature request
pub const GET_FEATURE_REQUEST: u8 = 0xFE;
/// Product ID response
pub const PRODUCT_ID_RESPONSE: u8 = 0xF8;
/// Product ID request
pub const PRODUCT_ID_REQUEST: u8 = 0xF9;

/// Soft-reset opcode, sent alone on the executable channel
pub const EXE_RESET: u8 = 0x01;

/// Save dynamic calibration data command
pub const CMD_SAVE_DCD: u8 = 0x06;
/// Motion-engine calibration command
pub const CMD_ME_CALIBRATE: u8 = 0x07;
/// ME calibrate subcommand: configure calibration
pub const ME_CAL_CONFIG: u8 = 0x00;
/// ME calibrate subcommand: get calibration status
pub const ME_GET_CAL: u8 = 0x01;

/// Default report interval written into set-feature commands (microseconds)
pub const DEFAULT_REPORT_INTERVAL_US: u32 = 50_000;

/// Activity classifier sensor-specific config: one bit per activity,
/// all nine enabled
pub const ENABLED_ACTIVITIES: u32 = 0x1FF;

/// Q-point 14 scalar (rotation vectors)
pub const Q_POINT_14_SCALAR: f64 = 1.0 / ((1 << 14) as f64);
/// Q-point 12 scalar (geomagnetic rotation vector)
pub const Q_POINT_12_SCALAR: f64 = 1.0 / ((1 << 12) as f64);
/// Q-point 9 scalar (gyroscope)
pub const Q_POINT_9_SCALAR: f64 = 1.0 / ((1 << 9) as f64);
/// Q-point 8 scalar (accelerometer family)
pub const Q_POINT_8_SCALAR: f64 = 1.0 / ((1 << 8) as f64);
/// Q-point 4 scalar (magnetometer)
pub const Q_POINT_4_SCALAR: f64 = 1.0 / ((1 << 4) as f64);

/// Bound on the product-ID wait during bring-up
pub const IDENTIFY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Bound on waiting for a single pending packet
pub const PACKET_READ_TIMEOUT: Duration = Duration::from_millis(2000);

/// Bound on the poll loop after a set-feature command. Milliseconds;
/// some ancestor implementations compared a seconds constant against
/// millisecond deltas, which this constant supersedes.
pub const FEATURE_ENABLE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Bound on the poll loop after a command request
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(2000);

/// Delay between soft reset and the first drain read
pub const RESET_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Sleep between iterations of a bounded poll loop
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Reset+identify cycles attempted before giving up on the device
pub const INIT_ATTEMPTS: usize = 3;

/// Packets drained per call while polling for a feature to come up
pub const MAX_PACKETS_PER_POLL: usize = 10;

/// The raw reports require their calibrated counterpart to be enabled first
pub fn raw_report_dependency(report_id: u8) -> Option<u8> {
    match report_id {
        REPORT_RAW_ACCELEROMETER => Some(REPORT_ACCELEROMETER),
        REPORT_RAW_GYROSCOPE => Some(REPORT_GYROSCOPE),
        REPORT_RAW_MAGNETOMETER => Some(REPORT_MAGNETOMETER),
        _ => None,
    }
}
