use std::io;
use thiserror::Error;

/// The primary error type for the `bno08x-shtp` library.
#[derive(Error, Debug)]
pub enum BnoError {
    #[error("BNO08x did not identify itself after repeated resets")]
    DeviceNotFound,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("error-sentinel SHTP header (channel {channel}, sequence {sequence})")]
    MalformedHeader { channel: u8, sequence: u8 },

    #[error("batch truncated: report 0x{report_id:02X} needs {needed} bytes, {remaining} left")]
    TruncatedBatch {
        report_id: u8,
        needed: usize,
        remaining: usize,
    },

    #[error("unknown report ID 0x{0:02X}")]
    UnknownReportId(u8),

    #[error("timed out after {elapsed_ms} ms waiting for {waiting_for}")]
    Timeout {
        waiting_for: &'static str,
        elapsed_ms: u64,
    },

    #[error("feature 0x{0:02X} was not enabled before the timeout")]
    FeatureEnableTimeout(u8),

    #[error("sensor refused to save calibration data (status {0})")]
    CalibrationSaveFailed(u8),

    #[error("no reading for report 0x{0:02X}; was the feature enabled?")]
    ReportNotEnabled(u8),
}
