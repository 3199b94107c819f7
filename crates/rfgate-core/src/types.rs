use crate::{
    Result,
    constants::{MAX_TAG_LENGTH, MIN_DEVICE_ID, MIN_TAG_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Antenna device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Create a new device ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the ID is below `MIN_DEVICE_ID`.
    pub fn new(id: u32) -> Result<Self> {
        if id < MIN_DEVICE_ID {
            return Err(Error::InvalidDeviceId(format!(
                "Device ID must be >= {MIN_DEVICE_ID}, got {id}"
            )));
        }
        Ok(DeviceId(id))
    }

    /// Get the raw device ID.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u32 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidDeviceId(format!("Invalid device ID: {s}")))?;
        DeviceId::new(id)
    }
}

/// Physical direction an antenna controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    /// Wire name used by the authorization service.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "in" | "entrada" => Ok(Direction::Entry),
            "exit" | "out" | "saida" => Ok(Direction::Exit),
            other => Err(Error::InvalidDirection(other.to_string())),
        }
    }
}

/// Sanitised RFID tag identifier.
///
/// A tag is stored uppercase with every non-hex character removed, and must
/// be an even number of hex characters between `MIN_TAG_LENGTH` and
/// `MAX_TAG_LENGTH`.
///
/// # Security
/// Comparison runs in constant time, like every other credential comparison
/// in the system.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId(String);

impl TagId {
    /// Strip non-hex characters and uppercase the rest.
    ///
    /// ```
    /// use rfgate_core::TagId;
    ///
    /// assert_eq!(TagId::sanitize(" e2-00:1a zz "), "E2001A");
    /// ```
    #[must_use]
    pub fn sanitize(raw: &str) -> String {
        raw.chars()
            .filter(char::is_ascii_hexdigit)
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Sanitise and validate a raw tag string.
    ///
    /// # Errors
    /// Returns `Error::InvalidTagFormat` if the sanitised value is outside the
    /// length envelope or has an odd length.
    ///
    /// ```
    /// use rfgate_core::TagId;
    ///
    /// let tag = TagId::parse("0123456789").unwrap();
    /// assert_eq!(tag.as_str(), "0123456789");
    ///
    /// assert!(TagId::parse("ABC").is_err());
    /// assert!(TagId::parse("123456789").is_err()); // odd length
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let tag = Self::sanitize(raw);
        let len = tag.len();

        if !(MIN_TAG_LENGTH..=MAX_TAG_LENGTH).contains(&len) {
            return Err(Error::InvalidTagFormat(format!(
                "Tag must be {MIN_TAG_LENGTH}-{MAX_TAG_LENGTH} hex chars, got {len}"
            )));
        }
        if len % 2 != 0 {
            return Err(Error::InvalidTagFormat(format!(
                "Tag must have an even number of hex chars, got {len}"
            )));
        }

        Ok(TagId(tag))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TagId::parse(s)
    }
}

impl TryFrom<String> for TagId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TagId::parse(&value)
    }
}

impl From<TagId> for String {
    fn from(tag: TagId) -> Self {
        tag.0
    }
}

impl PartialEq for TagId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for TagId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Static description of one antenna. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntennaConfig {
    pub device_id: DeviceId,
    pub host: String,
    pub port: u16,
    pub direction: Direction,
    pub name: String,
}

impl AntennaConfig {
    pub fn new(
        device_id: DeviceId,
        host: impl Into<String>,
        port: u16,
        direction: Direction,
        name: impl Into<String>,
    ) -> Self {
        Self {
            device_id,
            host: host.into(),
            port,
            direction,
            name: name.into(),
        }
    }

    /// `host:port` string suitable for `TcpStream::connect`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for AntennaConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (#{}, {}, {})",
            self.name,
            self.device_id,
            self.direction,
            self.address()
        )
    }
}
