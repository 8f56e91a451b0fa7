//! Wire framing: 4-byte big-endian length prefix, bincode body.
//!
//! Both directions share one codec implementation, parameterized by which
//! message type is read and which is written. Frames above [`MAX_FRAME_SIZE`]
//! are rejected on both paths.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{ClientMessage, ServerMessage};

/// Upper bound on a single frame body (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A well-delimited frame whose body failed to decode.
    ///
    /// The frame's bytes were consumed before the failure surfaced, so the
    /// stream is still aligned: the caller may skip this frame and keep
    /// reading.
    #[error("Malformed frame: {0}")]
    Frame(bincode::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

impl CodecError {
    /// Whether the stream is still usable after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Frame(_))
    }
}

/// Length-prefixed bincode codec reading `Rx` frames and writing `Tx` frames
pub struct MessageCodec<Rx, Tx> {
    _direction: PhantomData<fn() -> (Rx, Tx)>,
}

/// Codec for the server end: reads [`ClientMessage`], writes [`ServerMessage`]
pub type ServerCodec = MessageCodec<ClientMessage, ServerMessage>;

/// Codec for the viewer end: reads [`ServerMessage`], writes [`ClientMessage`]
pub type ClientCodec = MessageCodec<ServerMessage, ClientMessage>;

impl<Rx, Tx> MessageCodec<Rx, Tx> {
    pub fn new() -> Self {
        Self {
            _direction: PhantomData,
        }
    }
}

impl<Rx, Tx> Default for MessageCodec<Rx, Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Rx: DeserializeOwned, Tx> Decoder for MessageCodec<Rx, Tx> {
    type Item = Rx;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Rx>, CodecError> {
        // The length prefix must be complete before anything else
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let body = src.split_to(len);

        // The frame is consumed whether or not the body decodes
        bincode::deserialize(&body)
            .map(Some)
            .map_err(CodecError::Frame)
    }
}

impl<Rx, Tx: Serialize> Encoder<Tx> for MessageCodec<Rx, Tx> {
    type Error = CodecError;

    fn encode(&mut self, item: Tx, dst: &mut BytesMut) -> Result<(), CodecError> {
        let body = bincode::serialize(&item)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(4 + body.len());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}
