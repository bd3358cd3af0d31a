//! Splitting a packet payload into reports and decoding each one.
//!
//! A single SHTP packet batches one or more reports back to back. The
//! splitter walks the payload with the fixed per-ID lengths from
//! [`crate::reports`]; the decoder turns one slice into a typed
//! [`Report`].

use crate::constants::*;
use crate::error::BnoError;
use crate::reports::{
    Activity, ActivityClassification, CommandResponseRaw, FeatureReportRaw, ProductId,
    ProductIdResponseRaw, Reading, Stability, report_length, sensor_report_meta,
};
use bytes::Bytes;
use zerocopy::FromBytes;

/// Bit mask applied to the shake detector's u16 to test for a shake on
/// any axis.
const SHAKE_AXIS_MASK: u16 = 0x0111;

/// One decoded report out of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Device identification from a product ID response
    ProductId(ProductId),
    /// Get-feature response confirming a feature is running
    FeatureEnabled { feature_report_id: u8 },
    /// Command response, correlated by the embedded command byte
    Command(CommandResponseRaw),
    /// Base timestamp / timestamp rebase prefix, microseconds delta
    Timestamp(u32),
    /// Sensor sample or classifier output
    Sensor { report_id: u8, reading: Reading },
}

/// Split a packet payload into its report slices, in order.
///
/// The payload must be consumed exactly; a report whose table length
/// overruns the remaining bytes fails the whole batch with
/// [`BnoError::TruncatedBatch`].
pub fn split_batch(payload: &Bytes) -> Result<Vec<Bytes>, BnoError> {
    let mut slices = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let report_id = payload[offset];
        let needed = report_length(report_id)?;
        let remaining = payload.len() - offset;
        if remaining < needed {
            return Err(BnoError::TruncatedBatch { report_id, needed, remaining });
        }
        slices.push(payload.slice(offset..offset + needed));
        offset += needed;
    }
    Ok(slices)
}

/// Decode one report slice produced by [`split_batch`].
pub fn decode_report(report: &[u8]) -> Result<Report, BnoError> {
    let report_id = *report.first().ok_or(BnoError::UnknownReportId(0))?;
    let needed = report_length(report_id)?;
    if report.len() < needed {
        return Err(BnoError::TruncatedBatch { report_id, needed, remaining: report.len() });
    }
    match report_id {
        PRODUCT_ID_RESPONSE => {
            let raw = ProductIdResponseRaw::read_from_bytes(report)
                .map_err(|_| BnoError::UnknownReportId(report_id))?;
            Ok(Report::ProductId(ProductId::from(raw)))
        }
        GET_FEATURE_RESPONSE => {
            let raw = FeatureReportRaw::read_from_bytes(report)
                .map_err(|_| BnoError::UnknownReportId(report_id))?;
            Ok(Report::FeatureEnabled { feature_report_id: raw.feature_report_id })
        }
        COMMAND_RESPONSE => {
            let raw = CommandResponseRaw::read_from_bytes(report)
                .map_err(|_| BnoError::UnknownReportId(report_id))?;
            Ok(Report::Command(raw))
        }
        BASE_TIMESTAMP | TIMESTAMP_REBASE => {
            let delta = u32::from_le_bytes(
                report[1..5].try_into().map_err(|_| BnoError::UnknownReportId(report_id))?,
            );
            Ok(Report::Timestamp(delta))
        }
        id if id < CONTROL_REPORT_BASE => {
            let reading = decode_sensor_report(id, report)?;
            Ok(Report::Sensor { report_id: id, reading })
        }
        id => Err(BnoError::UnknownReportId(id)),
    }
}

fn decode_sensor_report(report_id: u8, report: &[u8]) -> Result<Reading, BnoError> {
    match report_id {
        REPORT_STEP_COUNTER => Ok(Reading::StepCount(read_u16(report, 8))),
        REPORT_SHAKE_DETECTOR => {
            Ok(Reading::Shake(read_u16(report, 4) & SHAKE_AXIS_MASK != 0))
        }
        REPORT_STABILITY_CLASSIFIER => Ok(Reading::Stability(Stability::from(report[4]))),
        REPORT_ACTIVITY_CLASSIFIER => Ok(Reading::Activity(decode_activity(report))),
        _ => decode_sensor_sample(report_id, report),
    }
}

/// Generic vector/quaternion sample: 2-bit accuracy at byte 2, `count`
/// little-endian 16-bit words from byte 4, each scaled by the report's
/// Q-point scalar.
fn decode_sensor_sample(report_id: u8, report: &[u8]) -> Result<Reading, BnoError> {
    let meta = sensor_report_meta(report_id).ok_or(BnoError::UnknownReportId(report_id))?;
    let accuracy = report[2] & 0b11;
    let mut values = [0.0f64; 4];
    for (index, value) in values.iter_mut().take(meta.count).enumerate() {
        let offset = 4 + index * 2;
        let word = read_u16(report, offset);
        *value = if meta.unsigned {
            word as f64 * meta.scalar
        } else {
            word as i16 as f64 * meta.scalar
        };
    }
    let reading = match meta.count {
        4 => Reading::Quaternion { values, accuracy },
        _ => Reading::Vector { values: [values[0], values[1], values[2]], accuracy },
    };
    Ok(reading)
}

fn decode_activity(report: &[u8]) -> ActivityClassification {
    let page = report[4] & 0x7F;
    let most_likely = Activity::from(report[5]);
    let mut confidence = [-1i16; 9];
    for (index, slot) in confidence.iter_mut().enumerate() {
        *slot = report[6 + index] as i16;
    }
    ActivityClassification::new(most_likely, page, confidence)
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn sensor_report(report_id: u8, length: usize) -> Vec<u8> {
        let mut report = vec![0u8; length];
        report[0] = report_id;
        report
    }

    #[test]
    fn splits_concatenated_reports_in_order() {
        let mut payload = BytesMut::new();
        payload.put_slice(&sensor_report(BASE_TIMESTAMP, 5));
        payload.put_slice(&sensor_report(REPORT_ACCELEROMETER, 10));
        payload.put_slice(&sensor_report(REPORT_ROTATION_VECTOR, 14));
        let payload = payload.freeze();

        let slices = split_batch(&payload).unwrap();
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].len(), 5);
        assert_eq!(slices[1].len(), 10);
        assert_eq!(slices[2].len(), 14);
        assert_eq!(slices[1][0], REPORT_ACCELEROMETER);
        assert_eq!(payload.slice(5..15), slices[1]);
    }

    #[test]
    fn short_final_report_is_truncated_batch() {
        let mut payload = BytesMut::new();
        payload.put_slice(&sensor_report(REPORT_GYROSCOPE, 10));
        payload.put_slice(&sensor_report(REPORT_ROTATION_VECTOR, 13)); // 1 byte short
        let err = split_batch(&payload.freeze()).unwrap_err();
        assert!(matches!(
            err,
            BnoError::TruncatedBatch { report_id: REPORT_ROTATION_VECTOR, needed: 14, remaining: 13 }
        ));
    }

    #[test]
    fn unknown_report_id_fails_the_batch() {
        let payload = Bytes::from_static(&[0x7E, 0, 0, 0]);
        assert!(matches!(split_batch(&payload), Err(BnoError::UnknownReportId(0x7E))));
    }

    #[test]
    fn accelerometer_sample_scales_by_q8() {
        let report = hex::decode("01000100040008000c00").expect("valid hex");
        let decoded = decode_report(&report).unwrap();
        assert_eq!(
            decoded,
            Report::Sensor {
                report_id: REPORT_ACCELEROMETER,
                reading: Reading::Vector { values: [0.015625, 0.03125, 0.046875], accuracy: 1 },
            }
        );
    }

    #[test]
    fn short_report_slice_is_an_error_not_a_panic() {
        let report = sensor_report(REPORT_ACCELEROMETER, 6); // table says 10
        let err = decode_report(&report).unwrap_err();
        assert!(matches!(
            err,
            BnoError::TruncatedBatch { report_id: REPORT_ACCELEROMETER, needed: 10, remaining: 6 }
        ));
    }

    #[test]
    fn raw_accelerometer_words_are_unsigned() {
        let mut report = sensor_report(REPORT_RAW_ACCELEROMETER, 16);
        report[4] = 0xFF;
        report[5] = 0xFF;
        let Report::Sensor { reading: Reading::Vector { values, .. }, .. } =
            decode_report(&report).unwrap()
        else {
            panic!("expected vector reading");
        };
        assert_eq!(values[0], 65535.0);
    }

    #[test]
    fn rotation_vector_decodes_as_quaternion() {
        // accuracy 3, real component = 1.0 at Q14
        let report = hex::decode("0500030000000000000000400000").expect("valid hex");
        let Report::Sensor { reading: Reading::Quaternion { values, accuracy }, .. } =
            decode_report(&report).unwrap()
        else {
            panic!("expected quaternion reading");
        };
        assert_eq!(values, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(accuracy, 3);
    }

    #[test]
    fn command_responses_decode_and_compare() {
        let mut report = sensor_report(COMMAND_RESPONSE, 16);
        report[2] = CMD_ME_CALIBRATE;
        report[5] = 0x05;
        let decoded = decode_report(&report).unwrap();
        assert_eq!(decoded, decode_report(&report).unwrap());
        let Report::Command(response) = decoded else {
            panic!("expected command response");
        };
        assert_eq!(response.command, CMD_ME_CALIBRATE);
        assert_eq!(response.status(), 0x05);
    }

    #[test]
    fn product_id_part_number_is_little_endian() {
        let mut report = sensor_report(PRODUCT_ID_RESPONSE, 16);
        report[2] = 3; // sw major
        report[3] = 8; // sw minor
        report[4..8].copy_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        let Report::ProductId(id) = decode_report(&report).unwrap() else {
            panic!("expected product id");
        };
        assert_eq!(id.part_number, 0x0403_0201);
        assert_eq!(id.sw_version_major, 3);
        assert_eq!(id.sw_version_minor, 8);
    }

    #[test]
    fn step_counter_reads_count_at_offset_8() {
        let mut report = sensor_report(REPORT_STEP_COUNTER, 12);
        report[8] = 0x2A;
        report[9] = 0x01;
        let decoded = decode_report(&report).unwrap();
        assert_eq!(
            decoded,
            Report::Sensor { report_id: REPORT_STEP_COUNTER, reading: Reading::StepCount(298) }
        );
    }

    #[test]
    fn shake_detector_tests_axis_bits() {
        let mut report = sensor_report(REPORT_SHAKE_DETECTOR, 6);
        report[4] = 0x10;
        let Report::Sensor { reading: Reading::Shake(shaken), .. } = decode_report(&report).unwrap()
        else {
            panic!("expected shake reading");
        };
        assert!(shaken);

        let quiet = sensor_report(REPORT_SHAKE_DETECTOR, 6);
        let Report::Sensor { reading: Reading::Shake(shaken), .. } = decode_report(&quiet).unwrap()
        else {
            panic!("expected shake reading");
        };
        assert!(!shaken);
    }

    #[test]
    fn stability_classifier_names_states() {
        let mut report = sensor_report(REPORT_STABILITY_CLASSIFIER, 6);
        report[4] = 3;
        let decoded = decode_report(&report).unwrap();
        assert_eq!(
            decoded,
            Report::Sensor {
                report_id: REPORT_STABILITY_CLASSIFIER,
                reading: Reading::Stability(Stability::Stable),
            }
        );
    }

    #[test]
    fn activity_classifier_reads_page_and_confidences() {
        let mut report = sensor_report(REPORT_ACTIVITY_CLASSIFIER, 16);
        report[4] = 0x80; // end bit set, page 0
        report[5] = u8::from(Activity::Walking);
        report[6 + u8::from(Activity::Walking) as usize] = 87;
        let Report::Sensor { reading: Reading::Activity(activity), .. } =
            decode_report(&report).unwrap()
        else {
            panic!("expected activity reading");
        };
        assert_eq!(activity.most_likely, Activity::Walking);
        assert_eq!(activity.page, 0);
        assert_eq!(activity.confidence(Activity::Walking), 87);
        assert_eq!(activity.confidence(Activity::Running), 0);
    }
}
