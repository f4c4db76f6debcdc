use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` source.
///
/// Partial reads are buffered internally. Bytes already buffered survive a
/// failed call, so a timeout in the middle of a frame loses nothing.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_frame, MAGIC};

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn reads_frames_in_order() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        assert_eq!(reader.read_frame().unwrap().payload().as_ref(), b"one");
        assert_eq!(reader.read_frame().unwrap().payload().as_ref(), b"two");
        assert_eq!(reader.read_frame().unwrap().payload().as_ref(), b"three");
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn assembles_frame_from_single_byte_reads() {
        let mut reader = FrameReader::new(Trickle {
            bytes: wire(&[b"slow"]),
            pos: 0,
        });
        assert_eq!(reader.read_frame().unwrap().payload().as_ref(), b"slow");
    }

    #[test]
    fn large_payload_spans_many_chunks() {
        let payload = vec![0x5A; 3 * READ_CHUNK_SIZE + 17];
        let mut reader = FrameReader::new(Cursor::new(wire(&[payload.as_slice()])));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload().as_ref(), payload.as_slice());
    }

    #[test]
    fn eof_mid_frame_reports_connection_closed() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_slice(b"half");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn garbage_prefix_yields_one_error_then_frame() {
        let mut bytes = b"noise".to_vec();
        bytes.extend(wire(&[b"after"]));
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::InvalidMagic
        ));
        assert_eq!(reader.read_frame().unwrap().payload().as_ref(), b"after");
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire(&[b"too long"])), cfg);
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::PayloadTooLarge { size: 8, max: 4 }
        ));
    }

    #[test]
    fn interrupted_read_is_retried() {
        let mut reader = FrameReader::new(FailOnce {
            kind: ErrorKind::Interrupted,
            failed: false,
            inner: Cursor::new(wire(&[b"ok"])),
        });
        assert_eq!(reader.read_frame().unwrap().payload().as_ref(), b"ok");
    }

    #[test]
    fn timeout_keeps_buffered_bytes() {
        let bytes = wire(&[b"kept"]);
        let (head, tail) = bytes.split_at(4);
        let mut reader = FrameReader::new(Chunks {
            chunks: vec![
                Ok(head.to_vec()),
                Err(ErrorKind::WouldBlock),
                Ok(tail.to_vec()),
            ],
        });

        let err = reader.read_frame().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(reader.buffered(), 4);
        assert_eq!(reader.read_frame().unwrap().payload().as_ref(), b"kept");
    }

    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct FailOnce<R> {
        kind: ErrorKind,
        failed: bool,
        inner: R,
    }

    impl<R: Read> Read for FailOnce<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.failed {
                self.failed = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.inner.read(buf)
        }
    }

    struct Chunks {
        chunks: Vec<std::result::Result<Vec<u8>, ErrorKind>>,
    }

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(kind) => Err(std::io::Error::from(kind)),
            }
        }
    }
}
