//! Wire layout of emitted samples
//!
//! Every sample leaves the engine as a little-endian frame with a fixed
//! 28-byte header followed by a variable trailer:
//!
//! ```text
//! series_id: u64 | timestamp: u64 | payload_type: u16 | payload_size: u16 | body: u64
//! ```
//!
//! `payload_size` counts the whole frame including the header, so
//! variable-length frames (tuple, event) can be concatenated in one buffer
//! and re-split by the consumer. FLOAT frames carry the value bits in the
//! header body and no trailer. TUPLE frames carry the presence bitmap in the
//! header body and one packed 8-byte value per set bit in the trailer, in
//! column declaration order. EVENT frames carry zero in the header body and
//! the blob in the trailer.

use bytes::{Buf, BufMut, Bytes};

use crate::error::{Error, Result};
use crate::model::{Payload, Sample};

/// Fixed frame header size in bytes
pub const HEADER_SIZE: usize = 28;

/// Payload type tag: one 64-bit float
pub const PAYLOAD_FLOAT: u16 = 0;
/// Payload type tag: presence bitmap plus packed values
pub const PAYLOAD_TUPLE: u16 = 1;
/// Payload type tag: opaque event bytes
pub const PAYLOAD_EVENT: u16 = 2;

/// Encoded size of a sample frame.
///
/// Tuple frames are sized by the bitmap's popcount, not by the number of
/// declared columns: absent columns occupy no space.
pub fn frame_size(payload: &Payload) -> usize {
    match payload {
        Payload::Float(_) => HEADER_SIZE,
        Payload::Tuple { bitmap, .. } => HEADER_SIZE + 8 * bitmap.count_ones() as usize,
        Payload::Event(blob) => HEADER_SIZE + blob.len(),
    }
}

/// Encode one sample at the front of `dest`, returning the frame size.
///
/// The caller must have checked capacity with [`frame_size`]; frames are
/// bounded by `u16::MAX` bytes by construction (at most 64 tuple columns,
/// event blobs validated upstream).
pub fn encode(sample: &Sample, mut dest: &mut [u8]) -> usize {
    let size = frame_size(&sample.payload);
    debug_assert!(dest.len() >= size, "frame does not fit output buffer");
    dest.put_u64_le(sample.series_id);
    dest.put_u64_le(sample.timestamp);
    match &sample.payload {
        Payload::Float(value) => {
            dest.put_u16_le(PAYLOAD_FLOAT);
            dest.put_u16_le(size as u16);
            dest.put_f64_le(*value);
        }
        Payload::Tuple { bitmap, values } => {
            debug_assert_eq!(bitmap.count_ones() as usize, values.len());
            dest.put_u16_le(PAYLOAD_TUPLE);
            dest.put_u16_le(size as u16);
            dest.put_u64_le(*bitmap);
            for value in values {
                dest.put_f64_le(*value);
            }
        }
        Payload::Event(blob) => {
            dest.put_u16_le(PAYLOAD_EVENT);
            dest.put_u16_le(size as u16);
            dest.put_u64_le(0);
            dest.put_slice(blob);
        }
    }
    size
}

/// Decode one frame from the front of `buf`, returning the sample and the
/// number of bytes consumed.
pub fn decode(mut buf: &[u8]) -> Result<(Sample, usize)> {
    if buf.len() < HEADER_SIZE {
        return Err(Error::MalformedFrame(format!(
            "truncated header: {} bytes",
            buf.len()
        )));
    }
    let series_id = buf.get_u64_le();
    let timestamp = buf.get_u64_le();
    let payload_type = buf.get_u16_le();
    let payload_size = buf.get_u16_le() as usize;
    if payload_size < HEADER_SIZE {
        return Err(Error::MalformedFrame(format!(
            "declared size {payload_size} below header size"
        )));
    }
    let trailer_len = payload_size - HEADER_SIZE;
    let body = buf.get_u64_le();
    if buf.len() < trailer_len {
        return Err(Error::MalformedFrame(format!(
            "truncated trailer: need {trailer_len}, have {}",
            buf.len()
        )));
    }
    let payload = match payload_type {
        PAYLOAD_FLOAT => {
            if trailer_len != 0 {
                return Err(Error::MalformedFrame(
                    "float frame with trailer".to_string(),
                ));
            }
            Payload::Float(f64::from_bits(body))
        }
        PAYLOAD_TUPLE => {
            let bitmap = body;
            let expected = 8 * bitmap.count_ones() as usize;
            if trailer_len != expected {
                return Err(Error::MalformedFrame(format!(
                    "tuple trailer {trailer_len} does not match bitmap popcount"
                )));
            }
            let mut values = Vec::with_capacity(bitmap.count_ones() as usize);
            for _ in 0..bitmap.count_ones() {
                values.push(buf.get_f64_le());
            }
            Payload::Tuple { bitmap, values }
        }
        PAYLOAD_EVENT => Payload::Event(Bytes::copy_from_slice(&buf[..trailer_len])),
        other => {
            return Err(Error::MalformedFrame(format!(
                "unknown payload type {other}"
            )));
        }
    };
    Ok((
        Sample {
            series_id,
            timestamp,
            payload,
        },
        payload_size,
    ))
}

/// Iterator over the frames packed into one output batch.
///
/// Splits on each frame's declared `payload_size`, never on a fixed stride.
pub struct FrameIter<'a> {
    buf: &'a [u8],
}

impl<'a> FrameIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl Iterator for FrameIter<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        match decode(self.buf) {
            Ok((sample, consumed)) => {
                self.buf = &self.buf[consumed..];
                Some(Ok(sample))
            }
            Err(err) => {
                // Poison the iterator: a bad frame makes the rest of the
                // buffer unreadable.
                self.buf = &[];
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_frame_round_trip() {
        let sample = Sample::float(42, 1000, 3.25);
        let mut buf = [0u8; 64];
        let written = encode(&sample, &mut buf);
        assert_eq!(written, HEADER_SIZE);

        let (decoded, consumed) = decode(&buf[..written]).unwrap();
        assert_eq!(consumed, HEADER_SIZE);
        assert_eq!(decoded, sample);
    }

    #[test]
    fn test_tuple_frame_sized_by_popcount() {
        let sample = Sample {
            series_id: 7,
            timestamp: 55,
            payload: Payload::Tuple {
                bitmap: 0b101,
                values: vec![1.0, 3.0],
            },
        };
        assert_eq!(frame_size(&sample.payload), HEADER_SIZE + 16);

        let mut buf = [0u8; 64];
        let written = encode(&sample, &mut buf);
        let (decoded, _) = decode(&buf[..written]).unwrap();
        assert_eq!(decoded, sample);
    }

    #[test]
    fn test_event_frame_round_trip() {
        let sample = Sample {
            series_id: 9,
            timestamp: 77,
            payload: Payload::Event(Bytes::from_static(b"power-cycle")),
        };
        let mut buf = [0u8; 64];
        let written = encode(&sample, &mut buf);
        assert_eq!(written, HEADER_SIZE + 11);

        let (decoded, _) = decode(&buf[..written]).unwrap();
        assert_eq!(decoded, sample);
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let sample = Sample::float(1, 2, 3.0);
        let mut buf = [0u8; 64];
        let written = encode(&sample, &mut buf);
        assert!(decode(&buf[..written - 1]).is_err());
        assert!(decode(&buf[..10]).is_err());
    }

    #[test]
    fn test_frame_iter_resplits_mixed_batch() {
        let samples = vec![
            Sample::float(1, 10, 0.5),
            Sample {
                series_id: 2,
                timestamp: 11,
                payload: Payload::Tuple {
                    bitmap: 0b11,
                    values: vec![1.0, 2.0],
                },
            },
            Sample {
                series_id: 3,
                timestamp: 12,
                payload: Payload::Event(Bytes::from_static(b"x")),
            },
        ];
        let mut buf = vec![0u8; 256];
        let mut at = 0;
        for s in &samples {
            at += encode(s, &mut buf[at..]);
        }

        let decoded: Vec<Sample> = FrameIter::new(&buf[..at])
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(decoded, samples);
    }
}
