//! Length-prefixed frame codec.
//!
//! Every message travels as one frame:
//!
//! ```text
//! +---------------------------+------------------+
//! | varint(len), 1..=5 bytes  | payload (len)    |
//! +---------------------------+------------------+
//! ```
//!
//! The length uses base-128 groups, least significant group first, with the
//! high bit of each byte set while more groups follow. Five groups cover the
//! full `u32` range.
//!
//! Decoding is incremental: bytes are pushed into a [`FrameDecoder`] as they
//! arrive and complete frames are pulled out in arrival order. The prefix
//! itself may be split across reads.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum number of bytes in a length prefix.
pub const MAX_VARINT_LEN: usize = 5;

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Framing errors. None of them is recoverable: there is no
/// resynchronization scheme, so the connection must be closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The length prefix did not terminate within [`MAX_VARINT_LEN`] bytes.
    #[error("length prefix longer than {MAX_VARINT_LEN} bytes")]
    PrefixTooLong,

    /// The length prefix encodes a value above `u32::MAX`.
    #[error("length prefix overflows u32")]
    LengthOverflow,

    /// The declared payload length exceeds the configured limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    Oversized {
        /// Declared payload length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The stream ended in the middle of a frame.
    #[error("stream ended inside a frame ({buffered} bytes buffered)")]
    Truncated {
        /// Bytes of the incomplete frame that were buffered.
        buffered: usize,
    },
}

/// Appends the varint encoding of `value` to `dst`.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_varint(mut value: u32, dst: &mut BytesMut) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decodes a varint from the start of `src`.
///
/// Returns `Ok(None)` while the prefix is incomplete, and
/// `Ok(Some((value, prefix_len)))` once it terminates.
///
/// # Errors
///
/// Returns [`FrameError::PrefixTooLong`] if five bytes arrive without a
/// terminating group, or [`FrameError::LengthOverflow`] if the decoded value
/// does not fit in a `u32`.
pub fn decode_varint(src: &[u8]) -> Result<Option<(u32, usize)>, FrameError> {
    let mut value: u64 = 0;
    for (i, &byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            let value = u32::try_from(value).map_err(|_| FrameError::LengthOverflow)?;
            return Ok(Some((value, i + 1)));
        }
    }

    if src.len() >= MAX_VARINT_LEN {
        Err(FrameError::PrefixTooLong)
    } else {
        Ok(None)
    }
}

/// Encodes `payload` as a single frame.
///
/// # Errors
///
/// Returns [`FrameError::LengthOverflow`] if the payload is longer than
/// `u32::MAX` bytes.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut dst = BytesMut::with_capacity(payload.len() + MAX_VARINT_LEN);
    encode_frame_into(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Appends `payload` as a single frame to `dst`.
///
/// # Errors
///
/// Returns [`FrameError::LengthOverflow`] if the payload is longer than
/// `u32::MAX` bytes.
pub fn encode_frame_into(payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::LengthOverflow)?;
    dst.reserve(payload.len() + MAX_VARINT_LEN);
    encode_varint(len, dst);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Incremental frame decoder.
///
/// One decoder belongs to exactly one connection. It buffers bytes across
/// reads and remembers the length of the frame currently being assembled.
///
/// # Example
///
/// ```
/// use wallet_sync_protocol::{encode_frame, FrameDecoder};
///
/// let frame = encode_frame(b"hello").unwrap();
/// let mut decoder = FrameDecoder::new();
///
/// decoder.extend(&frame[..2]);
/// assert!(decoder.decode_next().unwrap().is_none());
///
/// decoder.extend(&frame[2..]);
/// assert_eq!(&decoder.decode_next().unwrap().unwrap()[..], b"hello");
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Payload length of the frame in progress; `None` while the next
    /// length prefix is still expected.
    pending_len: Option<usize>,
    max_frame_len: usize,
}

impl FrameDecoder {
    /// Creates a decoder with [`DEFAULT_MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a decoder that rejects frames longer than `max_frame_len`.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            pending_len: None,
            max_frame_len,
        }
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the receive buffer so a reader can fill it in place.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Returns the payload length of the frame being assembled, if its
    /// prefix has already been decoded.
    pub fn pending_frame_len(&self) -> Option<usize> {
        self.pending_len
    }

    /// Returns the number of buffered bytes not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.pending_len.is_none() && self.buffer.is_empty()
    }

    /// Extracts the next complete frame, if one is buffered.
    ///
    /// Call repeatedly until it returns `Ok(None)` to drain every frame
    /// delivered by one read.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for a malformed or oversized prefix. The
    /// buffer is discarded; the decoder must not be used afterwards.
    pub fn decode_next(&mut self) -> Result<Option<Bytes>, FrameError> {
        let len = match self.pending_len {
            Some(len) => len,
            None => match self.decode_prefix()? {
                Some(len) => len,
                None => return Ok(None),
            },
        };

        if self.buffer.len() < len {
            self.buffer.reserve(len - self.buffer.len());
            return Ok(None);
        }

        self.pending_len = None;
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Checks that the stream ended on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] if a prefix or payload is
    /// incomplete.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(FrameError::Truncated {
                buffered: self.buffer.len(),
            })
        }
    }

    fn decode_prefix(&mut self) -> Result<Option<usize>, FrameError> {
        let (len, prefix_len) = match decode_varint(&self.buffer) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.buffer.clear();
                return Err(e);
            }
        };

        let len = len as usize;
        if len > self.max_frame_len {
            self.buffer.clear();
            return Err(FrameError::Oversized {
                len,
                max: self.max_frame_len,
            });
        }

        self.buffer.advance(prefix_len);
        self.pending_len = Some(len);
        Ok(Some(len))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn varint(value: u32) -> Vec<u8> {
        let mut dst = BytesMut::new();
        encode_varint(value, &mut dst);
        dst.to_vec()
    }

    fn feed_in_chunks(encoded: &[u8], chunk: usize) -> Vec<Bytes> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for piece in encoded.chunks(chunk) {
            decoder.extend(piece);
            while let Some(frame) = decoder.decode_next().unwrap() {
                frames.push(frame);
            }
        }
        decoder.finish().unwrap();
        frames
    }

    #[test]
    fn varint_known_encodings() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(1), vec![0x01]);
        assert_eq!(varint(127), vec![0x7f]);
        assert_eq!(varint(128), vec![0x80, 0x01]);
        assert_eq!(varint(300), vec![0xac, 0x02]);
        assert_eq!(varint(u32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn varint_incomplete_prefix() {
        assert_eq!(decode_varint(&[]), Ok(None));
        assert_eq!(decode_varint(&[0x80]), Ok(None));
        assert_eq!(decode_varint(&[0xff, 0xff, 0xff, 0xff]), Ok(None));
    }

    #[test]
    fn varint_prefix_too_long() {
        assert_eq!(
            decode_varint(&[0x80, 0x80, 0x80, 0x80, 0x80]),
            Err(FrameError::PrefixTooLong)
        );
        assert_eq!(
            decode_varint(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
            Err(FrameError::PrefixTooLong)
        );
    }

    #[test]
    fn varint_overflow_in_fifth_group() {
        assert_eq!(
            decode_varint(&[0xff, 0xff, 0xff, 0xff, 0x1f]),
            Err(FrameError::LengthOverflow)
        );
    }

    #[test]
    fn empty_payload_frame() {
        let frame = encode_frame(&[]).unwrap();
        assert_eq!(&frame[..], &[0x00]);

        let frames = feed_in_chunks(&frame, 1);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut wire = BytesMut::new();
        encode_frame_into(b"one", &mut wire).unwrap();
        encode_frame_into(b"two", &mut wire).unwrap();
        encode_frame_into(b"three", &mut wire).unwrap();

        let frames = feed_in_chunks(&wire, wire.len());
        let frames: Vec<&[u8]> = frames.iter().map(|f| &f[..]).collect();
        assert_eq!(frames, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
    }

    #[test]
    fn split_prefix_tracks_pending_length() {
        let payload = vec![7u8; 300];
        let frame = encode_frame(&payload).unwrap();
        let mut decoder = FrameDecoder::new();

        decoder.extend(&frame[..1]);
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.pending_frame_len(), None);

        decoder.extend(&frame[1..3]);
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.pending_frame_len(), Some(300));

        decoder.extend(&frame[3..]);
        assert_eq!(decoder.decode_next().unwrap().unwrap().len(), 300);
        assert_eq!(decoder.pending_frame_len(), None);
        assert!(decoder.is_idle());
    }

    #[test]
    fn oversized_frame_rejected_before_payload() {
        let mut decoder = FrameDecoder::with_max_frame_len(16);
        let frame = encode_frame(&[0u8; 17]).unwrap();

        decoder.extend(&frame[..1]);
        let err = decoder.decode_next().unwrap_err();
        assert_eq!(err, FrameError::Oversized { len: 17, max: 16 });
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn runaway_prefix_is_discarded() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert_eq!(decoder.decode_next(), Err(FrameError::PrefixTooLong));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn truncated_stream_detected() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x80]);
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.finish(), Err(FrameError::Truncated { buffered: 1 }));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x05, b'a', b'b']);
        assert!(decoder.decode_next().unwrap().is_none());
        assert!(decoder.finish().is_err());
    }

    proptest! {
        #[test]
        fn varint_roundtrip(value in any::<u32>()) {
            let encoded = varint(value);
            prop_assert!(encoded.len() <= MAX_VARINT_LEN);
            prop_assert_eq!(decode_varint(&encoded), Ok(Some((value, encoded.len()))));
        }

        #[test]
        fn frame_roundtrip_any_split(
            payload in prop::collection::vec(any::<u8>(), 0..2048),
            chunk in prop::sample::select(vec![1usize, 3, 7, 64, usize::MAX]),
        ) {
            let frame = encode_frame(&payload).unwrap();
            let chunk = chunk.min(frame.len()).max(1);
            let frames = feed_in_chunks(&frame, chunk);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0][..], &payload[..]);
        }

        #[test]
        fn frame_sequence_preserves_order(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..8),
            chunk in 1usize..16,
        ) {
            let mut wire = BytesMut::new();
            for payload in &payloads {
                encode_frame_into(payload, &mut wire).unwrap();
            }
            let frames = feed_in_chunks(&wire, chunk);
            let frames: Vec<Vec<u8>> = frames.iter().map(|f| f.to_vec()).collect();
            prop_assert_eq!(frames, payloads);
        }
    }
}
