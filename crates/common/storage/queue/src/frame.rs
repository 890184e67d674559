// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! On-disk frame format.
//!
//! Frames are stored back to back in segment files:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┐
//! │  Length (4B)    │   Payload (variable) │
//! │  big-endian     │   raw bytes          │
//! └─────────────────┴──────────────────────┘
//! ```
//!
//! The length prefix is checked against the configured bounds before the
//! payload is read, so a torn write cannot trigger an unbounded allocation.

use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};
use snafu::{ResultExt, ensure};

use crate::{
    Result,
    error::{FrameCorruptSnafu, ReadFrameSnafu},
};

/// Size of the length prefix in bytes.
pub(crate) const FRAME_HEADER_SIZE: usize = 4;

/// Total on-disk size of a frame with a payload of `payload_len` bytes.
#[inline]
pub(crate) const fn frame_disk_size(payload_len: usize) -> u64 {
    (FRAME_HEADER_SIZE + payload_len) as u64
}

/// Appends the frame for `payload` to `buf`.
///
/// The caller has already checked `payload.len()` against the size bounds.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode(payload: &[u8], buf: &mut BytesMut) {
    buf.reserve(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
}

/// Reads one frame from `reader`.
///
/// Fails with [`QueueError::FrameCorrupt`](crate::QueueError::FrameCorrupt)
/// when the length prefix is outside `min..=max`, and with
/// [`QueueError::ReadFrame`](crate::QueueError::ReadFrame) on a short read.
pub(crate) fn decode<R: Read>(reader: &mut R, min: u32, max: u32) -> Result<Bytes> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).context(ReadFrameSnafu)?;
    let size = u32::from_be_bytes(header);

    ensure!(
        size >= min && size <= max,
        FrameCorruptSnafu { size, min, max }
    );

    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).context(ReadFrameSnafu)?;
    Ok(Bytes::from(payload))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::QueueError;

    #[test]
    fn test_frame_disk_size() {
        assert_eq!(frame_disk_size(0), 4);
        assert_eq!(frame_disk_size(10), 14);
    }

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        encode(b"hello", &mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_decode_consecutive_frames() {
        let mut buf = BytesMut::new();
        encode(b"first", &mut buf);
        encode(b"", &mut buf);
        encode(b"third", &mut buf);

        let mut reader = Cursor::new(buf.freeze());
        assert_eq!(decode(&mut reader, 0, 100).unwrap(), Bytes::from("first"));
        assert_eq!(decode(&mut reader, 0, 100).unwrap(), Bytes::new());
        assert_eq!(decode(&mut reader, 0, 100).unwrap(), Bytes::from("third"));
        assert!(matches!(
            decode(&mut reader, 0, 100),
            Err(QueueError::ReadFrame { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_header() {
        let mut reader = Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF, 1, 2, 3]);
        let err = decode(&mut reader, 0, 1024).unwrap_err();
        assert!(matches!(
            err,
            QueueError::FrameCorrupt {
                size: u32::MAX,
                min: 0,
                max: 1024
            }
        ));
    }

    #[test]
    fn test_decode_rejects_undersized_header() {
        let mut buf = BytesMut::new();
        encode(b"ab", &mut buf);
        let mut reader = Cursor::new(buf.freeze());
        assert!(matches!(
            decode(&mut reader, 3, 10),
            Err(QueueError::FrameCorrupt { size: 2, .. })
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let mut reader = Cursor::new(vec![0, 0, 0, 8, b'a', b'b']);
        assert!(matches!(
            decode(&mut reader, 0, 100),
            Err(QueueError::ReadFrame { .. })
        ));
    }
}
