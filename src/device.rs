//! The SHTP session state machine.
//!
//! [`Bno08x`] owns the transport and drives it strictly from the caller's
//! task: bring-up walks Resetting -> IdentityPending -> Ready (up to three
//! reset+identify cycles before giving up), and every reading accessor
//! drains whatever packets are pending before consulting the latest-reading
//! cache. All waits are bounded by a deadline and sleep between poll
//! iterations instead of spinning.

use crate::constants::*;
use crate::error::BnoError;
use crate::message::{self, Report};
use crate::packet::{Packet, decode_header};
use crate::reports::{
    ActivityClassification, CommandRequestRaw, FeatureReportRaw, ProductId, Reading, Stability,
    initial_reading,
};
use crate::transport::ShtpTransport;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace, warn};
use zerocopy::IntoBytes;

pub struct Bno08x<T: ShtpTransport> {
    transport: T,
    /// Outbound sequence number per SHTP channel, wrapping at 256
    sequence: [u8; CHANNEL_COUNT],
    /// Two-ended command/response sequence counters, keyed by report type
    report_sequence: HashMap<u8, u8>,
    /// Latest decoded reading per report ID, last write wins
    readings: HashMap<u8, Reading>,
    product_id: Option<ProductId>,
    magnetometer_accuracy: u8,
    last_command_response: Option<(u8, u8)>,
    me_calibration_started_at: Option<Instant>,
    dcd_saved_at: Option<Instant>,
}

impl<T: ShtpTransport> Bno08x<T> {
    /// Wrap a transport. The device is not touched until
    /// [`initialize`](Self::initialize) runs.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sequence: [0; CHANNEL_COUNT],
            report_sequence: HashMap::new(),
            readings: HashMap::new(),
            product_id: None,
            magnetometer_accuracy: 0,
            last_command_response: None,
            me_calibration_started_at: None,
            dcd_saved_at: None,
        }
    }

    /// Bring the sensor hub up: soft reset, then identify, retrying the
    /// whole cycle up to [`INIT_ATTEMPTS`] times.
    pub async fn initialize(&mut self) -> Result<(), BnoError> {
        for attempt in 1..=INIT_ATTEMPTS {
            self.soft_reset().await?;
            match self.check_id().await {
                Ok(id) => {
                    info!(
                        "BNO08x identified: part {} firmware {}.{}.{}",
                        id.part_number, id.sw_version_major, id.sw_version_minor, id.sw_version_patch
                    );
                    return Ok(());
                }
                Err(err) => warn!("identify attempt {attempt}/{INIT_ATTEMPTS} failed: {err}"),
            }
        }
        Err(BnoError::DeviceNotFound)
    }

    /// Device identity, available once [`initialize`](Self::initialize)
    /// has succeeded.
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    /// Send the 1-byte reset opcode on the executable channel, then drain
    /// the boot chatter. Decode errors here are expected reset noise.
    async fn soft_reset(&mut self) -> Result<(), BnoError> {
        debug!("soft resetting");
        self.send_packet(CHANNEL_EXE, &[EXE_RESET]).await?;
        sleep(RESET_SETTLE_DELAY).await;
        for _ in 0..3 {
            match self.read_packet().await {
                Ok(_) => {}
                Err(BnoError::Transport(err)) => return Err(BnoError::Transport(err)),
                Err(err) => {
                    trace!("reset noise: {err}");
                    sleep(RESET_SETTLE_DELAY).await;
                }
            }
        }
        Ok(())
    }

    /// Request the product ID and wait for the matching response,
    /// forwarding anything else to the decoder.
    async fn check_id(&mut self) -> Result<ProductId, BnoError> {
        self.send_packet(CHANNEL_CONTROL, &[PRODUCT_ID_REQUEST, 0]).await?;
        let packet = self
            .wait_for_report(
                CHANNEL_CONTROL,
                PRODUCT_ID_RESPONSE,
                IDENTIFY_TIMEOUT,
                "product ID response",
            )
            .await?;
        self.handle_packet(&packet)?;
        self.product_id.ok_or(BnoError::DeviceNotFound)
    }

    /// Enable a sensor report at the default interval. A raw report pulls
    /// in its calibrated counterpart first if that is not running yet.
    pub async fn enable_feature(&mut self, report_id: u8) -> Result<(), BnoError> {
        if let Some(dependency) = raw_report_dependency(report_id) {
            if !self.readings.contains_key(&dependency) {
                debug!(
                    "feature 0x{report_id:02X} requires calibrated counterpart 0x{dependency:02X}"
                );
                self.send_feature_enable(dependency).await?;
            }
        }
        self.send_feature_enable(report_id).await
    }

    async fn send_feature_enable(&mut self, report_id: u8) -> Result<(), BnoError> {
        debug!("enabling feature 0x{report_id:02X}");
        let command = FeatureReportRaw::set_feature(report_id);
        self.send_packet(CHANNEL_CONTROL, command.as_bytes()).await?;

        let deadline = Instant::now() + FEATURE_ENABLE_TIMEOUT;
        while Instant::now() < deadline {
            self.process_available_packets(Some(MAX_PACKETS_PER_POLL)).await?;
            if self.readings.contains_key(&report_id) {
                return Ok(());
            }
            sleep(POLL_INTERVAL).await;
        }
        Err(BnoError::FeatureEnableTimeout(report_id))
    }

    /// Queue a 12-byte command request on the control channel. `params`
    /// holds at most 9 bytes; shorter slices are zero padded.
    pub async fn send_command(&mut self, command: u8, params: &[u8]) -> Result<(), BnoError> {
        let mut padded = [0u8; 9];
        let n = params.len().min(padded.len());
        padded[..n].copy_from_slice(&params[..n]);
        let sequence = self.next_report_sequence(COMMAND_REQUEST);
        let request = CommandRequestRaw::new(sequence, command, padded);
        self.send_packet(CHANNEL_CONTROL, request.as_bytes()).await
    }

    /// Start motion-engine calibration of the accelerometer, gyro and
    /// magnetometer. Success is a status-0 command response.
    pub async fn begin_calibration(&mut self) -> Result<(), BnoError> {
        let status = self
            .send_me_command([1, 1, 1, ME_CAL_CONFIG, 0, 0, 0, 0, 0], "calibration start")
            .await?;
        if status != 0 {
            warn!("ME calibration config returned status {status}");
        }
        Ok(())
    }

    /// Whether the sensor has acknowledged a calibration start with a
    /// status-0 command response.
    pub fn calibration_started(&self) -> bool {
        self.me_calibration_started_at.is_some()
    }

    /// Query calibration quality: issues a get-status ME command, then
    /// reports the magnetometer accuracy (0..=3) seen on the most recent
    /// magnetometer report.
    pub async fn calibration_status(&mut self) -> Result<u8, BnoError> {
        self.send_me_command([0, 0, 0, ME_GET_CAL, 0, 0, 0, 0, 0], "calibration status")
            .await?;
        Ok(self.magnetometer_accuracy)
    }

    /// Persist the current dynamic calibration data on the sensor.
    pub async fn save_calibration_data(&mut self) -> Result<(), BnoError> {
        let started = Instant::now();
        self.send_command(CMD_SAVE_DCD, &[]).await?;
        let deadline = started + COMMAND_TIMEOUT;
        while Instant::now() < deadline {
            self.process_available_packets(None).await?;
            if self.dcd_saved_at.is_some_and(|at| at >= started) {
                return Ok(());
            }
            sleep(POLL_INTERVAL).await;
        }
        Err(BnoError::Timeout {
            waiting_for: "calibration save confirmation",
            elapsed_ms: COMMAND_TIMEOUT.as_millis() as u64,
        })
    }

    async fn send_me_command(
        &mut self,
        params: [u8; 9],
        waiting_for: &'static str,
    ) -> Result<u8, BnoError> {
        self.last_command_response = None;
        self.send_command(CMD_ME_CALIBRATE, &params).await?;
        let deadline = Instant::now() + COMMAND_TIMEOUT;
        while Instant::now() < deadline {
            self.process_available_packets(None).await?;
            if let Some((CMD_ME_CALIBRATE, status)) = self.last_command_response {
                return Ok(status);
            }
            sleep(POLL_INTERVAL).await;
        }
        Err(BnoError::Timeout {
            waiting_for,
            elapsed_ms: COMMAND_TIMEOUT.as_millis() as u64,
        })
    }

    /// Calibrated acceleration in m/s².
    pub async fn acceleration(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_ACCELEROMETER).await
    }

    /// Calibrated angular velocity in rad/s.
    pub async fn gyro(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_GYROSCOPE).await
    }

    /// Calibrated magnetic field in µT.
    pub async fn magnetic(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_MAGNETOMETER).await
    }

    /// Acceleration with gravity removed, m/s².
    pub async fn linear_acceleration(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_LINEAR_ACCELERATION).await
    }

    /// Gravity direction vector, m/s².
    pub async fn gravity(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_GRAVITY).await
    }

    /// Absolute rotation vector as a unit quaternion [i, j, k, real].
    pub async fn quaternion(&mut self) -> Result<[f64; 4], BnoError> {
        self.quaternion_reading(REPORT_ROTATION_VECTOR).await
    }

    /// Game rotation vector (drifts in yaw, immune to magnetic anomalies).
    pub async fn game_quaternion(&mut self) -> Result<[f64; 4], BnoError> {
        self.quaternion_reading(REPORT_GAME_ROTATION_VECTOR).await
    }

    /// Geomagnetic rotation vector.
    pub async fn geomagnetic_quaternion(&mut self) -> Result<[f64; 4], BnoError> {
        self.quaternion_reading(REPORT_GEOMAGNETIC_ROTATION_VECTOR).await
    }

    /// Raw (uncalibrated, unsigned ADC) accelerometer words.
    pub async fn raw_acceleration(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_RAW_ACCELEROMETER).await
    }

    /// Raw gyroscope words.
    pub async fn raw_gyro(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_RAW_GYROSCOPE).await
    }

    /// Raw magnetometer words.
    pub async fn raw_magnetic(&mut self) -> Result<[f64; 3], BnoError> {
        self.vector_reading(REPORT_RAW_MAGNETOMETER).await
    }

    /// Steps counted since the step counter was enabled.
    pub async fn steps(&mut self) -> Result<u16, BnoError> {
        self.process_available_packets(None).await?;
        match self.readings.get(&REPORT_STEP_COUNTER) {
            Some(Reading::StepCount(steps)) => Ok(*steps),
            _ => Err(BnoError::ReportNotEnabled(REPORT_STEP_COUNTER)),
        }
    }

    /// Whether a shake was detected since the last call. Reading a
    /// detected shake clears it so one shake is reported once.
    pub async fn shake(&mut self) -> Result<bool, BnoError> {
        self.process_available_packets(None).await?;
        match self.readings.get_mut(&REPORT_SHAKE_DETECTOR) {
            Some(Reading::Shake(shaken)) => {
                let was_shaken = *shaken;
                *shaken = false;
                Ok(was_shaken)
            }
            _ => Err(BnoError::ReportNotEnabled(REPORT_SHAKE_DETECTOR)),
        }
    }

    /// Current stability classification.
    pub async fn stability_classification(&mut self) -> Result<Stability, BnoError> {
        self.process_available_packets(None).await?;
        match self.readings.get(&REPORT_STABILITY_CLASSIFIER) {
            Some(Reading::Stability(stability)) => Ok(*stability),
            _ => Err(BnoError::ReportNotEnabled(REPORT_STABILITY_CLASSIFIER)),
        }
    }

    /// Current activity classification with per-class confidences.
    pub async fn activity_classification(&mut self) -> Result<ActivityClassification, BnoError> {
        self.process_available_packets(None).await?;
        match self.readings.get(&REPORT_ACTIVITY_CLASSIFIER) {
            Some(Reading::Activity(activity)) => Ok(*activity),
            _ => Err(BnoError::ReportNotEnabled(REPORT_ACTIVITY_CLASSIFIER)),
        }
    }

    async fn vector_reading(&mut self, report_id: u8) -> Result<[f64; 3], BnoError> {
        self.process_available_packets(None).await?;
        match self.readings.get(&report_id) {
            Some(Reading::Vector { values, .. }) => Ok(*values),
            _ => Err(BnoError::ReportNotEnabled(report_id)),
        }
    }

    async fn quaternion_reading(&mut self, report_id: u8) -> Result<[f64; 4], BnoError> {
        self.process_available_packets(None).await?;
        match self.readings.get(&report_id) {
            Some(Reading::Quaternion { values, .. }) => Ok(*values),
            _ => Err(BnoError::ReportNotEnabled(report_id)),
        }
    }

    /// Non-blocking drain: decode every packet the device has pending,
    /// up to `max_packets` when bounded. Per-packet decode failures are
    /// tolerated; a failed calibration save is not.
    async fn process_available_packets(
        &mut self,
        max_packets: Option<usize>,
    ) -> Result<(), BnoError> {
        let mut processed = 0usize;
        while max_packets.is_none_or(|max| processed < max) {
            match self.read_packet().await {
                Ok(Some(packet)) => {
                    processed += 1;
                    match self.handle_packet(&packet) {
                        Ok(()) => {}
                        Err(err @ BnoError::CalibrationSaveFailed(_)) => return Err(err),
                        Err(err) => warn!("discarding packet: {err}"),
                    }
                }
                Ok(None) => break,
                Err(BnoError::MalformedHeader { channel, sequence }) => {
                    // tolerated noise; the packets queued behind it are
                    // still pending, so keep draining
                    processed += 1;
                    trace!("skipping error-sentinel header (channel {channel}, seq {sequence})");
                }
                Err(err) => return Err(err),
            }
        }
        trace!("processed {processed} pending packets");
        Ok(())
    }

    /// Decode one packet into the caches. Executable and SHTP-command
    /// channel traffic carries no reports and is dropped.
    fn handle_packet(&mut self, packet: &Packet) -> Result<(), BnoError> {
        if matches!(packet.channel(), CHANNEL_EXE | CHANNEL_SHTP_COMMAND) {
            trace!("ignoring channel {} packet", packet.channel());
            return Ok(());
        }
        for slice in message::split_batch(&packet.payload)? {
            let report = message::decode_report(&slice)?;
            self.apply_report(report)?;
        }
        Ok(())
    }

    fn apply_report(&mut self, report: Report) -> Result<(), BnoError> {
        match report {
            Report::ProductId(id) => {
                debug!("product ID: part {}, build {}", id.part_number, id.build_number);
                self.product_id = Some(id);
            }
            Report::FeatureEnabled { feature_report_id } => {
                debug!("feature 0x{feature_report_id:02X} reported enabled");
                if let Some(reading) = initial_reading(feature_report_id) {
                    self.readings.entry(feature_report_id).or_insert(reading);
                }
            }
            Report::Command(response) => {
                let status = response.status();
                self.last_command_response = Some((response.command, status));
                if response.command == CMD_ME_CALIBRATE && status == 0 {
                    self.me_calibration_started_at = Some(Instant::now());
                }
                if response.command == CMD_SAVE_DCD {
                    if status == 0 {
                        self.dcd_saved_at = Some(Instant::now());
                    } else {
                        return Err(BnoError::CalibrationSaveFailed(status));
                    }
                }
            }
            Report::Timestamp(delta) => trace!("batch timestamp delta {delta} µs"),
            Report::Sensor { report_id, reading } => {
                if report_id == REPORT_MAGNETOMETER {
                    if let Reading::Vector { accuracy, .. } = reading {
                        self.magnetometer_accuracy = accuracy;
                    }
                }
                self.readings.insert(report_id, reading);
            }
        }
        Ok(())
    }

    /// Wait until the device has a packet pending, then read it.
    async fn wait_for_packet(&mut self, timeout: Duration) -> Result<Packet, BnoError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.read_packet().await {
                Ok(Some(packet)) => return Ok(packet),
                Ok(None) => {}
                Err(BnoError::MalformedHeader { .. }) => {}
                Err(err) => return Err(err),
            }
            if Instant::now() >= deadline {
                return Err(BnoError::Timeout {
                    waiting_for: "pending packet",
                    elapsed_ms: timeout.as_millis() as u64,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Read packets until one arrives on `channel` with the leading
    /// `report_id`, decoding everything else along the way.
    async fn wait_for_report(
        &mut self,
        channel: u8,
        report_id: u8,
        timeout: Duration,
        waiting_for: &'static str,
    ) -> Result<Packet, BnoError> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(BnoError::Timeout {
                    waiting_for,
                    elapsed_ms: timeout.as_millis() as u64,
                });
            }
            let wait = PACKET_READ_TIMEOUT.min(deadline - now);
            let packet = match self.wait_for_packet(wait).await {
                Ok(packet) => packet,
                Err(BnoError::Timeout { .. }) => continue,
                Err(err) => return Err(err),
            };
            if packet.channel() == channel && packet.report_id() == Some(report_id) {
                return Ok(packet);
            }
            match self.handle_packet(&packet) {
                Ok(()) => {}
                Err(err @ BnoError::CalibrationSaveFailed(_)) => return Err(err),
                Err(err) => warn!("ignoring packet while waiting for {waiting_for}: {err}"),
            }
        }
    }

    /// Frame a payload on `channel` and advance that channel's sequence
    /// number (wrapping at 256).
    async fn send_packet(&mut self, channel: u8, payload: &[u8]) -> Result<(), BnoError> {
        let sequence = self.sequence[channel as usize];
        let packet = Packet::new(channel, sequence, Bytes::copy_from_slice(payload));
        self.transport.write_frame(&packet.to_bytes()).await?;
        self.sequence[channel as usize] = sequence.wrapping_add(1);
        trace!("sent {} bytes on channel {channel} (seq {sequence})", payload.len());
        Ok(())
    }

    /// Peek the 4-byte header; if it announces payload, read the frame.
    /// `Ok(None)` means nothing is pending this round.
    async fn read_packet(&mut self) -> Result<Option<Packet>, BnoError> {
        let header = decode_header(self.transport.read_header().await?);
        if header.is_error() {
            return Err(BnoError::MalformedHeader {
                channel: header.channel(),
                sequence: header.sequence(),
            });
        }
        if header.data_length() == 0 {
            return Ok(None);
        }
        let payload = self.transport.read_payload(header.data_length()).await?;
        trace!(
            "read {} bytes on channel {} (seq {})",
            payload.len(),
            header.channel(),
            header.sequence()
        );
        Ok(Some(Packet { header, payload: Bytes::from(payload) }))
    }

    fn next_report_sequence(&mut self, report_id: u8) -> u8 {
        let counter = self.report_sequence.entry(report_id).or_insert(0);
        let sequence = *counter;
        *counter = counter.wrapping_add(1);
        sequence
    }
}
