use std::io;

/// Byte-level access to the sensor hub, supplied by the embedding
/// application.
///
/// Implementations address one fixed device on one bus; the driver never
/// opens, scans or arbitrates the bus itself. All calls are serialized by
/// the driver owning the transport exclusively, so implementations do not
/// need their own locking.
#[allow(async_fn_in_trait)]
pub trait ShtpTransport {
    /// Read the next 4 header bytes without consuming the frame payload.
    /// A device with nothing pending returns an all-zero header.
    async fn read_header(&mut self) -> io::Result<[u8; 4]>;

    /// Read the `n` payload bytes following a header.
    async fn read_payload(&mut self, n: usize) -> io::Result<Vec<u8>>;

    /// Write one complete frame (header plus payload).
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}
