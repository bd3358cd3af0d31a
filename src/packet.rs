use crate::constants::{CHANNEL_MAX, SHTP_HEADER_SIZE};
use crate::error::BnoError;
use bytes::{BufMut, Bytes, BytesMut};
use modular_bitfield::prelude::*;

/// The 4-byte header every SHTP frame starts with.
///
/// Bytes 0-1 carry the total frame length (header included) as a
/// little-endian u16 whose top bit is the continuation flag; byte 2 is the
/// channel, byte 3 the per-channel sequence number.
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShtpHeader {
    pub length: B15,
    pub continuation: bool,
    pub channel: u8,
    pub sequence: u8,
}

impl ShtpHeader {
    /// Total frame byte count with the continuation bit masked off.
    pub fn packet_byte_count(&self) -> u16 {
        self.length()
    }

    /// Payload bytes following the header. Zero for the empty
    /// "nothing pending" header the sensor returns between reports.
    pub fn data_length(&self) -> usize {
        (self.length() as usize).saturating_sub(SHTP_HEADER_SIZE)
    }

    /// True for headers that must not be decoded further: an out-of-range
    /// channel, or the all-ones error sentinel (raw length word 0xFFFF
    /// with sequence 0xFF) the hub emits when a read went wrong.
    pub fn is_error(&self) -> bool {
        if self.channel() > CHANNEL_MAX {
            return true;
        }
        self.length() == 0x7FFF && self.continuation() && self.sequence() == 0xFF
    }

    /// A packet is worth reading only when it carries payload and the
    /// header is not the error sentinel.
    pub fn is_data_ready(&self) -> bool {
        !self.is_error() && self.data_length() > 0
    }
}

/// One SHTP frame: header plus exactly `data_length` payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: ShtpHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Build an outbound frame on `channel` with the given sequence number.
    pub fn new(channel: u8, sequence: u8, payload: Bytes) -> Self {
        let header = ShtpHeader::new()
            .with_length((payload.len() + SHTP_HEADER_SIZE) as u16)
            .with_continuation(false)
            .with_channel(channel)
            .with_sequence(sequence);
        Packet { header, payload }
    }

    /// The packet's report ID: the first payload byte.
    pub fn report_id(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    pub fn channel(&self) -> u8 {
        self.header.channel()
    }

    /// Serialize header + payload into one wire frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut frame = BytesMut::with_capacity(SHTP_HEADER_SIZE + self.payload.len());
        frame.put_slice(&self.header.into_bytes());
        frame.put_slice(&self.payload);
        frame.freeze()
    }
}

impl TryFrom<Bytes> for Packet {
    type Error = BnoError;

    fn try_from(mut bytes: Bytes) -> Result<Self, Self::Error> {
        if bytes.len() < SHTP_HEADER_SIZE {
            return Err(BnoError::TruncatedBatch {
                report_id: 0,
                needed: SHTP_HEADER_SIZE,
                remaining: bytes.len(),
            });
        }
        let header_bytes = bytes.split_to(SHTP_HEADER_SIZE);
        let header_bytes: [u8; 4] = header_bytes
            .as_ref()
            .try_into()
            .map_err(|_| BnoError::MalformedHeader { channel: 0, sequence: 0 })?;
        let header = ShtpHeader::from_bytes(header_bytes);
        if header.is_error() {
            return Err(BnoError::MalformedHeader {
                channel: header.channel(),
                sequence: header.sequence(),
            });
        }
        let data_length = header.data_length();
        if bytes.len() < data_length {
            return Err(BnoError::TruncatedBatch {
                report_id: bytes.first().copied().unwrap_or(0),
                needed: data_length,
                remaining: bytes.len(),
            });
        }
        let payload = bytes.split_to(data_length);
        Ok(Packet { header, payload })
    }
}

/// Decode just the 4-byte header. Never fails; callers must check
/// [`ShtpHeader::is_error`] before trusting it.
pub fn decode_header(bytes: [u8; 4]) -> ShtpHeader {
    ShtpHeader::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_recovers_fields() {
        for (channel, sequence, payload) in [
            (0u8, 0u8, Bytes::new()),
            (2, 17, Bytes::from_static(&[0xF9, 0x00])),
            (3, 255, Bytes::from(vec![0xAB; 100])),
            (5, 128, Bytes::from_static(&[0x01])),
        ] {
            let packet = Packet::new(channel, sequence, payload.clone());
            let frame = packet.to_bytes();
            let header = decode_header(frame[..4].try_into().unwrap());
            assert_eq!(header.channel(), channel);
            assert_eq!(header.sequence(), sequence);
            assert_eq!(header.data_length(), payload.len());
            assert_eq!(header.packet_byte_count() as usize, payload.len() + 4);
            assert!(!header.is_error());
        }
    }

    #[test]
    fn full_frame_parse_recovers_payload() {
        let packet = Packet::new(2, 9, Bytes::from_static(&[0xF8, 1, 2, 3]));
        let parsed = Packet::try_from(packet.to_bytes()).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.report_id(), Some(0xF8));
    }

    #[test]
    fn frame_shorter_than_declared_length_is_rejected() {
        // header says 10 payload bytes, only 2 follow
        let frame = Bytes::from_static(&[0x0E, 0x00, 0x03, 0x01, 0xF8, 0x00]);
        let err = Packet::try_from(frame).unwrap_err();
        assert!(matches!(
            err,
            BnoError::TruncatedBatch { report_id: 0xF8, needed: 10, remaining: 2 }
        ));
    }

    #[test]
    fn error_sentinel_header() {
        let header = decode_header([0xFF, 0xFF, 0x02, 0xFF]);
        assert!(header.is_error());
        assert!(!header.is_data_ready());
    }

    #[test]
    fn out_of_range_channel_is_error() {
        let header = decode_header([0x08, 0x00, 0x06, 0x01]);
        assert!(header.is_error());
    }

    #[test]
    fn sentinel_requires_sequence_ff() {
        // 0xFFFF length word alone is not enough
        let header = decode_header([0xFF, 0xFF, 0x02, 0x00]);
        assert!(!header.is_error());
    }

    #[test]
    fn empty_header_is_valid_but_not_ready() {
        let header = decode_header([0x00, 0x00, 0x00, 0x00]);
        assert!(!header.is_error());
        assert_eq!(header.data_length(), 0);
        assert!(!header.is_data_ready());
    }

    #[test]
    fn continuation_bit_masked_from_length() {
        // 0x8010 -> 16 bytes with the continuation bit set
        let header = decode_header([0x10, 0x80, 0x03, 0x05]);
        assert_eq!(header.packet_byte_count(), 16);
        assert_eq!(header.data_length(), 12);
        assert!(header.continuation());
        assert!(!header.is_error());
    }
}
