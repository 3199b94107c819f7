//! Wire protocol spoken by the RFID antenna.
//!
//! Frames share one layout:
//!
//! ```text
//! 0xCF | addr | cmd_hi | cmd_lo | len | data[len] | crc_hi | crc_lo
//! ```
//!
//! Outbound commands are fixed byte strings with their checksum baked in
//! ([`command`]). Inbound frames are classified by hex prefix ([`frame`]).
//! [`AntennaCodec`] plugs both into `tokio_util::codec::Framed`.

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;

pub use codec::AntennaCodec;
pub use command::{Command, CommandFrame, CommandSet};
pub use error::ProtocolError;
pub use frame::{FrameKind, InboundFrame, classify, to_hex};

/// First byte of every well-formed frame.
pub const FRAME_HEADER: u8 = 0xCF;

/// Header bytes before the payload: header, address, two command bytes, length.
pub const FRAME_PREFIX_LEN: usize = 5;

/// Trailing checksum bytes.
pub const FRAME_CHECKSUM_LEN: usize = 2;
