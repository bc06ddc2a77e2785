use aida_core::{FieldBuffer, Frame, FrameDecodeError, MalformedFrame};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length-prefixed binary frames: a `u32` big-endian byte count followed by
/// the encoded field list.
///
/// A frame whose header decodes but whose payload does not is yielded as
/// `Err(MalformedFrame)` so the stream stays usable; the length prefix
/// already marks where the next frame starts. A bad length or header is a
/// decoder error and ends the stream.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Upper bound on a single frame, checked in both directions.
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Result<Frame, MalformedFrame>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[..4]);
        let frame_len = u32::from_be_bytes(length_bytes) as usize;

        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(frame_len));
        }

        if src.len() < 4 + frame_len {
            src.reserve(4 + frame_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let data = src.split_to(frame_len);
        match Frame::decode_header_first(&data) {
            Ok(frame) => Ok(Some(Ok(frame))),
            Err(FrameDecodeError::Payload(malformed)) => Ok(Some(Err(malformed))),
            Err(FrameDecodeError::Header(e)) => Err(CodecError::Framing(e.message)),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let buffer: FieldBuffer = item.to_buffer();
        let len = buffer.encoded_len();
        if len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(len));
        }

        dst.reserve(4 + len);
        dst.put_u32(len as u32);
        buffer.encode_into(dst);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Malformed frame: {0}")]
    Framing(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}
