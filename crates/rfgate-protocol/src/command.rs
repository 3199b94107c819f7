//! Outbound command frames.
//!
//! Commands are never built at runtime. Each one is a constant with its
//! CRC-16 trailer already computed, selected by intent through [`Command`].
//! Only the read filter may be replaced by configuration, and it is
//! validated once at load time by [`CommandFrame::from_hex`].

use bytes::Bytes;
use rfgate_core::{Error, Result};
use std::fmt;

use crate::{FRAME_CHECKSUM_LEN, FRAME_HEADER, FRAME_PREFIX_LEN, to_hex};

/// Liveness probe: "get device info".
pub const HEALTHCHECK: &[u8] = &[0xCF, 0xFF, 0x00, 0x70, 0x00, 0x24, 0x15];

/// Energise relay 1 (gate opens).
pub const RELAY_OPEN: &[u8] = &[0xCF, 0xFF, 0x00, 0x77, 0x02, 0x01, 0x01, 0x66, 0xC7];

/// Release relay 1 (gate closes).
pub const RELAY_CLOSE: &[u8] = &[0xCF, 0xFF, 0x00, 0x77, 0x02, 0x01, 0x00, 0x77, 0x4E];

/// Default read mask: suppress tags whose EPC starts with `E2` from bit 0x20
/// (toll-system transponders).
pub const DEFAULT_READ_FILTER: &[u8] = &[
    0xCF, 0xFF, 0x00, 0x71, 0x05, 0x01, 0x01, 0x20, 0x08, 0xE2, 0xFA, 0xE1,
];

/// What a command frame asks the antenna to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Healthcheck,
    RelayOpen,
    RelayClose,
    ReadFilter,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Healthcheck => "healthcheck",
            Command::RelayOpen => "relay-open",
            Command::RelayClose => "relay-close",
            Command::ReadFilter => "read-filter",
        };
        f.write_str(name)
    }
}

/// An opaque, validated outbound frame.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandFrame(Bytes);

impl CommandFrame {
    /// Wrap a compile-time constant.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Parse a configured frame from hex (whitespace and `:` separators allowed).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommandFrame` if the text is not hex, the frame
    /// does not start with the protocol header, or the declared payload length
    /// disagrees with the number of bytes supplied.
    ///
    /// ```
    /// use rfgate_protocol::CommandFrame;
    ///
    /// let frame = CommandFrame::from_hex("cf ff 00 71 05 01 01 20 08 e2 fa e1").unwrap();
    /// assert_eq!(frame.len(), 12);
    ///
    /// assert!(CommandFrame::from_hex("cf ff 00").is_err());
    /// ```
    pub fn from_hex(text: &str) -> Result<Self> {
        let digits: Vec<u8> = text
            .bytes()
            .filter(|b| !b.is_ascii_whitespace() && *b != b':')
            .collect();

        if digits.len() % 2 != 0 {
            return Err(Error::InvalidCommandFrame(
                "odd number of hex digits".to_string(),
            ));
        }

        let mut bytes = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks(2) {
            let hi = hex_value(pair[0])?;
            let lo = hex_value(pair[1])?;
            bytes.push((hi << 4) | lo);
        }

        if bytes.len() < FRAME_PREFIX_LEN + FRAME_CHECKSUM_LEN {
            return Err(Error::InvalidCommandFrame(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != FRAME_HEADER {
            return Err(Error::InvalidCommandFrame(format!(
                "frame must start with 0x{FRAME_HEADER:02X}, got 0x{:02X}",
                bytes[0]
            )));
        }
        let declared = FRAME_PREFIX_LEN + bytes[4] as usize + FRAME_CHECKSUM_LEN;
        if declared != bytes.len() {
            return Err(Error::InvalidCommandFrame(format!(
                "declared length {declared} does not match {} bytes",
                bytes.len()
            )));
        }

        Ok(Self(Bytes::from(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame({})", to_hex(&self.0))
    }
}

fn hex_value(digit: u8) -> Result<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(Error::InvalidCommandFrame(format!(
            "invalid hex digit {:?}",
            other as char
        ))),
    }
}

/// The four frames a supervisor can send, with the configured read filter.
#[derive(Debug, Clone)]
pub struct CommandSet {
    read_filter: CommandFrame,
}

impl CommandSet {
    pub fn new(read_filter: CommandFrame) -> Self {
        Self { read_filter }
    }

    /// Frame for the given intent.
    pub fn frame(&self, command: Command) -> CommandFrame {
        match command {
            Command::Healthcheck => CommandFrame::from_static(HEALTHCHECK),
            Command::RelayOpen => CommandFrame::from_static(RELAY_OPEN),
            Command::RelayClose => CommandFrame::from_static(RELAY_CLOSE),
            Command::ReadFilter => self.read_filter.clone(),
        }
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::new(CommandFrame::from_static(DEFAULT_READ_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// CRC-16/MCRF4XX, the antenna's frame checksum (transmitted high byte first).
    fn crc16(data: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for byte in data {
            crc ^= u16::from(*byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0x8408
                } else {
                    crc >> 1
                };
            }
        }
        crc
    }

    #[rstest]
    #[case(HEALTHCHECK)]
    #[case(RELAY_OPEN)]
    #[case(RELAY_CLOSE)]
    #[case(DEFAULT_READ_FILTER)]
    fn test_constants_carry_valid_checksum(#[case] frame: &[u8]) {
        let (body, trailer) = frame.split_at(frame.len() - FRAME_CHECKSUM_LEN);
        let crc = crc16(body);
        assert_eq!(trailer, &[(crc >> 8) as u8, (crc & 0xFF) as u8]);
    }

    #[rstest]
    #[case(HEALTHCHECK)]
    #[case(RELAY_OPEN)]
    #[case(RELAY_CLOSE)]
    #[case(DEFAULT_READ_FILTER)]
    fn test_constants_declare_their_length(#[case] frame: &[u8]) {
        assert_eq!(frame[0], FRAME_HEADER);
        assert_eq!(
            FRAME_PREFIX_LEN + frame[4] as usize + FRAME_CHECKSUM_LEN,
            frame.len()
        );
    }

    #[test]
    fn test_command_set_selects_by_intent() {
        let set = CommandSet::default();
        assert_eq!(set.frame(Command::RelayOpen).as_bytes(), RELAY_OPEN);
        assert_eq!(set.frame(Command::RelayClose).as_bytes(), RELAY_CLOSE);
        assert_eq!(set.frame(Command::Healthcheck).as_bytes(), HEALTHCHECK);
        assert_eq!(set.frame(Command::ReadFilter).as_bytes(), DEFAULT_READ_FILTER);
    }

    #[test]
    fn test_command_set_uses_configured_filter() {
        let filter = CommandFrame::from_hex("CFFF0071000000").unwrap();
        let set = CommandSet::new(filter.clone());
        assert_eq!(set.frame(Command::ReadFilter), filter);
    }

    #[test]
    fn test_from_hex_accepts_separators() {
        let frame = CommandFrame::from_hex("CF:FF:00:70:00:24:15").unwrap();
        assert_eq!(frame.as_bytes(), HEALTHCHECK);
    }

    #[rstest]
    #[case("zz")]
    #[case("cfff007")]
    #[case("aaff0070002415")]
    #[case("cfff00700124")]
    #[case("cfff0070052415")]
    fn test_from_hex_rejects(#[case] text: &str) {
        assert!(matches!(
            CommandFrame::from_hex(text),
            Err(Error::InvalidCommandFrame(_))
        ));
    }

    #[test]
    fn test_debug_shows_hex() {
        let frame = CommandFrame::from_static(HEALTHCHECK);
        assert_eq!(format!("{frame:?}"), "CommandFrame(cfff0070002415)");
    }
}
