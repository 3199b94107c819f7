//! Inbound frame classification.
//!
//! An inbound frame is rendered as lowercase hex and matched against an
//! ordered table of prefixes. The first match wins, so more specific
//! prefixes (filter-ack success) precede their general form (any filter ack).
//! Anything that matches nothing is [`InboundFrame::Unknown`].
//!
//! Tag reports carry the tag identifier near the end of the frame: the
//! identifier is `"0"` followed by the nine hex characters located
//! `13..4` characters from the end. The last four characters are a per-frame
//! trailer and are not interpreted.
//!
//! ```
//! use rfgate_protocol::{InboundFrame, classify};
//!
//! let ack = [0xCF, 0x00, 0x00, 0x71, 0x01, 0x00, 0xF1, 0x56];
//! assert_eq!(classify(&ack), InboundFrame::FilterAck { success: true });
//! ```

use std::fmt::Write;

/// Offset from the end of the hex string where the tag window starts.
const TAG_WINDOW_START_FROM_END: usize = 13;

/// Offset from the end of the hex string where the tag window stops.
const TAG_WINDOW_END_FROM_END: usize = 4;

/// Prefix prepended to the extracted tag window.
const TAG_PREFIX: &str = "0";

/// Hex prefix of tag report frames.
const TAG_READ_PREFIX: &str = "cf000001";

/// The closed set of frame kinds the antenna sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    HealthcheckAck,
    FilterAckSuccess,
    FilterAckFailure,
    GateClosedAck,
    GateOpenedAck,
    TagRead,
}

/// Ordered classification table. Order matters: first match wins.
const PREFIXES: [(&str, FrameKind); 6] = [
    ("cf000070", FrameKind::HealthcheckAck),
    ("cf0000710100", FrameKind::FilterAckSuccess),
    ("cf000071", FrameKind::FilterAckFailure),
    ("cf000077020000", FrameKind::GateClosedAck),
    ("cf000077020001", FrameKind::GateOpenedAck),
    (TAG_READ_PREFIX, FrameKind::TagRead),
];

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    HealthcheckAck,
    FilterAck { success: bool },
    GateClosedAck,
    GateOpenedAck,
    TagRead { tag: String },
    Unknown { hex: String },
}

impl InboundFrame {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            InboundFrame::HealthcheckAck => "healthcheck-ack",
            InboundFrame::FilterAck { .. } => "filter-ack",
            InboundFrame::GateClosedAck => "gate-closed-ack",
            InboundFrame::GateOpenedAck => "gate-opened-ack",
            InboundFrame::TagRead { .. } => "tag-read",
            InboundFrame::Unknown { .. } => "unknown",
        }
    }
}

/// Lowercase hex rendering of a byte slice.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Classify one complete frame.
pub fn classify(bytes: &[u8]) -> InboundFrame {
    let hex = to_hex(bytes);

    let kind = PREFIXES
        .iter()
        .find(|(prefix, _)| hex.starts_with(prefix))
        .map(|(_, kind)| *kind);

    match kind {
        Some(FrameKind::HealthcheckAck) => InboundFrame::HealthcheckAck,
        Some(FrameKind::FilterAckSuccess) => InboundFrame::FilterAck { success: true },
        Some(FrameKind::FilterAckFailure) => InboundFrame::FilterAck { success: false },
        Some(FrameKind::GateClosedAck) => InboundFrame::GateClosedAck,
        Some(FrameKind::GateOpenedAck) => InboundFrame::GateOpenedAck,
        Some(FrameKind::TagRead) => match extract_tag(&hex) {
            Some(tag) => InboundFrame::TagRead { tag },
            None => InboundFrame::Unknown { hex },
        },
        None => InboundFrame::Unknown { hex },
    }
}

/// Whether `bytes`, the start of a buffered frame, can still grow into one
/// of the known inbound frames. Only the first four bytes are compared.
pub(crate) fn may_start_frame(bytes: &[u8]) -> bool {
    let hex = to_hex(&bytes[..bytes.len().min(4)]);
    PREFIXES.iter().any(|(prefix, _)| prefix.starts_with(&hex))
}

/// Pull the tag identifier out of a tag-read frame's hex rendering.
///
/// Returns `None` when the frame is too short to hold the window after its
/// classification prefix.
fn extract_tag(hex: &str) -> Option<String> {
    let len = hex.len();
    if len < TAG_READ_PREFIX.len() + TAG_WINDOW_START_FROM_END {
        return None;
    }
    let window = &hex[len - TAG_WINDOW_START_FROM_END..len - TAG_WINDOW_END_FROM_END];
    Some(format!("{TAG_PREFIX}{window}"))
}
