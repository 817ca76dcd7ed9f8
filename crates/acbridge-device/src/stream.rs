//! Splitting the status connection byte stream into frames.

use acbridge_core::frame::{frame_len, LENGTH_OFFSET, MIN_FRAME_LEN, SYNC};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Frames the status connection stream by sync header and declared length.
///
/// Bytes before a sync header are discarded. Checksums are not verified here;
/// every yielded frame still goes through the codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFrameDecoder;

impl StatusFrameDecoder {
    /// Create a new decoder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for StatusFrameDecoder {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match src.windows(SYNC.len()).position(|window| window == SYNC) {
                Some(0) => {}
                Some(start) => {
                    tracing::warn!(dropped = start, "Discarding bytes before sync header");
                    src.advance(start);
                }
                None => {
                    // A trailing 0xAA may be the first half of the next header.
                    let keep = usize::from(src.last() == Some(&SYNC[0]));
                    let dropped = src.len() - keep;
                    if dropped > 0 {
                        tracing::warn!(dropped, "Discarding bytes without sync header");
                        src.advance(dropped);
                    }
                    return Ok(None);
                }
            }

            if src.len() <= LENGTH_OFFSET {
                return Ok(None);
            }

            let len = frame_len(src[LENGTH_OFFSET]);
            if len < MIN_FRAME_LEN {
                tracing::warn!(declared = src[LENGTH_OFFSET], "Discarding impossible length");
                src.advance(1);
                continue;
            }

            if src.len() < len {
                src.reserve(len - src.len());
                return Ok(None);
            }

            return Ok(Some(src.split_to(len).freeze()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = self.decode(src)?;
        if frame.is_none() && !src.is_empty() {
            tracing::debug!(remaining = src.len(), "Discarding partial frame at end of stream");
            src.clear();
        }
        Ok(frame)
    }
}
