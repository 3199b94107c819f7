//! Tokio codec for antenna frames.
//!
//! The antenna protocol has no explicit length prefix, but every well-formed
//! frame begins with [`FRAME_HEADER`] and carries its payload length in the
//! fifth byte. `AntennaCodec` uses that to reassemble frames split across
//! TCP segments and to split several frames delivered in one segment.
//!
//! Bytes that do not start with the header are delivered as one opaque
//! chunk, up to the next header byte, and classify as
//! [`InboundFrame::Unknown`]. A header byte followed by an address or
//! command no inbound frame uses is treated the same way, so a stray `0xCF`
//! in line noise cannot hold back the frames behind it.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use rfgate_protocol::{AntennaCodec, Command, CommandSet};
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> Result<(), rfgate_protocol::ProtocolError> {
//! let stream = TcpStream::connect("127.0.0.1:6000").await?;
//! let mut framed = Framed::new(stream, AntennaCodec::new());
//!
//! framed.send(CommandSet::default().frame(Command::Healthcheck)).await?;
//! if let Some(Ok(frame)) = framed.next().await {
//!     println!("received {}", frame.label());
//! }
//! # Ok(())
//! # }
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::frame::may_start_frame;
use crate::{
    CommandFrame, FRAME_CHECKSUM_LEN, FRAME_HEADER, FRAME_PREFIX_LEN, InboundFrame, ProtocolError,
    classify, to_hex,
};

/// Default maximum frame size in bytes.
///
/// The one-byte length field caps a well-formed frame at 262 bytes; the
/// default leaves headroom for opaque chunks.
const DEFAULT_MAX_FRAME_SIZE: usize = 1024;

/// Codec turning the antenna byte stream into classified frames.
#[derive(Debug)]
pub struct AntennaCodec {
    max_frame_size: usize,
}

impl AntennaCodec {
    /// Create a new codec with the default maximum frame size.
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a new codec with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the current maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl AntennaCodec {
    /// Split off an opaque chunk: everything up to the next header byte at
    /// or after `from`.
    fn split_opaque(
        &self,
        src: &mut BytesMut,
        from: usize,
    ) -> Result<Option<InboundFrame>, ProtocolError> {
        let end = src[from..]
            .iter()
            .position(|b| *b == FRAME_HEADER)
            .map_or(src.len(), |i| from + i);
        if end > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: end,
                max_size: self.max_frame_size,
            });
        }
        let chunk = src.split_to(end);
        Ok(Some(classify(&chunk)))
    }
}

impl Default for AntennaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AntennaCodec {
    type Item = InboundFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if src[0] != FRAME_HEADER {
            return self.split_opaque(src, 0);
        }
        if !may_start_frame(src) {
            trace!(hex = %to_hex(&src[..src.len().min(FRAME_PREFIX_LEN)]), "Resyncing past stray header");
            return self.split_opaque(src, 1);
        }

        if src.len() < FRAME_PREFIX_LEN {
            return Ok(None);
        }

        let total = FRAME_PREFIX_LEN + src[FRAME_PREFIX_LEN - 1] as usize + FRAME_CHECKSUM_LEN;
        if total > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: total,
                max_size: self.max_frame_size,
            });
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        Ok(Some(classify(&frame)))
    }

    /// A frame cut short by the peer closing is dropped rather than reported
    /// as an error; the session is ending either way.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                buf.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<CommandFrame> for AntennaCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: CommandFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
