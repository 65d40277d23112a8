//! gRPC-Web frame layer.
//!
//! Every unit on the wire is a frame: a 5-byte header followed by the
//! payload. Header byte 0 is a flag (bit 0x80 marks a trailer), bytes
//! 1–4 are the payload length as a big-endian u32. Framing is
//! identical in both directions.
//!
//! [`ChunkParser`] is the receive side: it accepts transport chunks
//! with arbitrary boundaries and yields only complete frames,
//! buffering partial headers and payloads across calls.

use bytes::{BufMut, Bytes, BytesMut};

/// Length of the frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 5;

/// Flag bit marking a trailer frame.
pub const TRAILER_FLAG: u8 = 0x80;

/// Pre-allocation cap for declared payloads; the buffer still grows
/// to the declared size, but a hostile length cannot reserve 4 GiB up
/// front.
const PAYLOAD_RESERVE_CAP: usize = 64 * 1024;

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// An encoded message.
    Message,
    /// The trailer: final status and late context headers.
    Trailer,
}

impl FrameKind {
    fn flag(self) -> u8 {
        match self {
            Self::Message => 0,
            Self::Trailer => TRAILER_FLAG,
        }
    }
}

/// One complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message or trailer.
    pub kind: FrameKind,
    /// The payload bytes, without the header.
    pub payload: Bytes,
}

/// Encode one frame: 5-byte header plus payload.
///
/// # Panics
///
/// Panics if the payload exceeds `u32::MAX` bytes, which the wire
/// format cannot represent.
#[must_use]
pub fn encode_frame(kind: FrameKind, payload: &[u8]) -> Bytes {
    assert!(
        u32::try_from(payload.len()).is_ok(),
        "frame payload exceeds u32 length"
    );
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(kind.flag());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Incremental parser reassembling frames from transport chunks.
///
/// The parser holds a header buffer filling toward 5 bytes, the
/// declared payload length once the header is complete, and a payload
/// buffer filling toward that length. A frame is yielded exactly when
/// its payload buffer fills; input chunks may carry partial frames or
/// several frames, and boundaries are respected either way.
#[derive(Debug, Default)]
pub struct ChunkParser {
    header: Vec<u8>,
    declared: Option<(FrameKind, usize)>,
    payload: BytesMut,
}

impl ChunkParser {
    /// Create a parser with no buffered state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns every frame completed by it.
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            match self.declared {
                None => {
                    let need = FRAME_HEADER_LEN - self.header.len();
                    let take = need.min(chunk.len());
                    self.header.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    if self.header.len() < FRAME_HEADER_LEN {
                        break;
                    }
                    let kind = if self.header[0] & TRAILER_FLAG != 0 {
                        FrameKind::Trailer
                    } else {
                        FrameKind::Message
                    };
                    let len = u32::from_be_bytes([
                        self.header[1],
                        self.header[2],
                        self.header[3],
                        self.header[4],
                    ]) as usize;
                    self.header.clear();
                    self.declared = Some((kind, len));
                    self.payload = BytesMut::with_capacity(len.min(PAYLOAD_RESERVE_CAP));
                }
                Some((kind, len)) => {
                    let need = len - self.payload.len();
                    let take = need.min(chunk.len());
                    self.payload.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    if self.payload.len() < len {
                        break;
                    }
                    frames.push(Frame {
                        kind,
                        payload: self.payload.split().freeze(),
                    });
                    self.declared = None;
                }
            }
        }
        frames
    }

    /// Whether the parser is between frames, with nothing buffered.
    /// A stream that ends while this is false was truncated.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.header.is_empty() && self.declared.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frames: &[(FrameKind, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (kind, payload) in frames {
            out.extend_from_slice(&encode_frame(*kind, payload));
        }
        out
    }

    #[test]
    fn test_encode_header_shape() {
        let frame = encode_frame(FrameKind::Message, b"hello");
        assert_eq!(&frame[..5], &[0, 0, 0, 0, 5]);
        assert_eq!(&frame[5..], b"hello");

        let trailer = encode_frame(FrameKind::Trailer, b"grpc-status: 0");
        assert_eq!(trailer[0], TRAILER_FLAG);
    }

    #[test]
    fn test_single_chunk_round_trip() {
        let bytes = wire(&[
            (FrameKind::Message, b"first"),
            (FrameKind::Message, b"second"),
            (FrameKind::Trailer, b"grpc-status: 0"),
        ]);

        let mut parser = ChunkParser::new();
        let frames = parser.push(&bytes);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].kind, FrameKind::Message);
        assert_eq!(&frames[0].payload[..], b"first");
        assert_eq!(frames[2].kind, FrameKind::Trailer);
        assert!(parser.is_idle());
    }

    #[test]
    fn test_byte_by_byte_partition() {
        let bytes = wire(&[
            (FrameKind::Message, b"payload one"),
            (FrameKind::Trailer, b"grpc-status: 0\r\ngrpc-message: ok"),
        ]);

        let mut parser = ChunkParser::new();
        let mut frames = Vec::new();
        for byte in &bytes {
            frames.extend(parser.push(std::slice::from_ref(byte)));
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].payload[..], b"payload one");
        assert_eq!(frames[1].kind, FrameKind::Trailer);
        assert!(parser.is_idle());
    }

    #[test]
    fn test_every_split_point_preserves_frames() {
        let bytes = wire(&[
            (FrameKind::Message, b"abc"),
            (FrameKind::Message, b""),
            (FrameKind::Message, b"defghij"),
        ]);

        for split in 0..=bytes.len() {
            let mut parser = ChunkParser::new();
            let mut frames = parser.push(&bytes[..split]);
            frames.extend(parser.push(&bytes[split..]));

            let payloads: Vec<&[u8]> = frames.iter().map(|f| &f.payload[..]).collect();
            assert_eq!(
                payloads,
                vec![b"abc".as_slice(), b"".as_slice(), b"defghij".as_slice()],
                "split at {split}"
            );
            assert!(parser.is_idle());
        }
    }

    #[test]
    fn test_zero_length_payload_is_emitted() {
        let bytes = wire(&[(FrameKind::Trailer, b"")]);
        let mut parser = ChunkParser::new();
        let frames = parser.push(&bytes);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
        assert!(parser.is_idle());
    }

    #[test]
    fn test_partial_frame_is_never_yielded() {
        let bytes = wire(&[(FrameKind::Message, b"truncated payload")]);
        let mut parser = ChunkParser::new();
        let frames = parser.push(&bytes[..bytes.len() - 1]);
        assert!(frames.is_empty());
        assert!(!parser.is_idle());
    }

    #[test]
    fn test_payload_concatenation_invariant() {
        // Concatenated emitted payloads must equal the input minus
        // headers, under an arbitrary mixed partition.
        let payloads: [&[u8]; 4] = [b"a", b"bb", b"", b"cccc"];
        let bytes = wire(&[
            (FrameKind::Message, payloads[0]),
            (FrameKind::Message, payloads[1]),
            (FrameKind::Message, payloads[2]),
            (FrameKind::Message, payloads[3]),
        ]);

        let mut parser = ChunkParser::new();
        let mut collected = Vec::new();
        for chunk in bytes.chunks(3) {
            for frame in parser.push(chunk) {
                collected.extend_from_slice(&frame.payload);
            }
        }
        let expected: Vec<u8> = payloads.concat();
        assert_eq!(collected, expected);
    }
}
