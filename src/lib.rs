//! SHTP packet framing, batched-report decoding and a session driver for
//! the BNO08x family of IMU sensor hubs.
//!
//! The crate is transport-agnostic: the embedding application supplies a
//! [`transport::ShtpTransport`] over its bus of choice and the
//! [`Bno08x`] driver handles framing, sequencing, bring-up, feature
//! enablement and the latest-reading cache on top of it.

pub mod constants;
pub mod device;
pub mod error;
pub mod message;
pub mod packet;
pub mod reports;
pub mod transport;


// Re-export the driver for easy access
pub use device::Bno08x;
pub use error::BnoError;
