//! Stream adapters applying the puzzle codec to async byte streams

use super::{AmbiguousBlockPolicy, Codec, CodecError, BLOCK_SIZE};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

/// Encoding half: every plain byte becomes one 6-byte block on the wire
pub struct ObfsWriter<W> {
    inner: W,
    codec: Codec,
    staging: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> ObfsWriter<W> {
    /// Wrap the write half `inner`, encoding with `codec`
    pub fn new(inner: W, codec: Codec) -> Self {
        Self {
            inner,
            codec,
            staging: Vec::new(),
        }
    }

    /// Encode `data` and write all resulting blocks.
    ///
    /// Returns the number of plain bytes written.
    pub async fn write_encoded(&mut self, data: &[u8]) -> Result<usize, CodecError> {
        if data.is_empty() {
            return Ok(0);
        }

        self.staging.clear();
        self.codec.encode_into(data, &mut self.staging);

        let expected = self.staging.len();
        let mut written = 0;
        while written < expected {
            let n = self.inner.write(&self.staging[written..]).await?;
            if n == 0 {
                return Err(CodecError::ShortWrite { written, expected });
            }
            written += n;
        }
        self.inner.flush().await?;

        trace!("Encoded {} bytes into {} wire bytes", data.len(), expected);
        Ok(data.len())
    }

    /// Shut down the write side of the underlying stream
    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.inner.shutdown().await?;
        Ok(())
    }

}

/// Decoding half.
///
/// Raw bytes that do not yet form a complete block stay buffered until the
/// next read completes them.
pub struct ObfsReader<R> {
    inner: R,
    codec: Codec,
    policy: AmbiguousBlockPolicy,
    pending: BytesMut,
    scratch: Vec<u8>,
    skipped: u64,
}

impl<R: AsyncRead + Unpin> ObfsReader<R> {
    /// Wrap the read half `inner`; `policy` decides what happens to blocks
    /// that fail validation
    pub fn new(inner: R, codec: Codec, policy: AmbiguousBlockPolicy) -> Self {
        Self {
            inner,
            codec,
            policy,
            pending: BytesMut::new(),
            scratch: Vec::new(),
            skipped: 0,
        }
    }

    /// Read and decode into `buf`, returning the number of plain bytes.
    ///
    /// At most `6 * buf.len()` raw bytes are staged. `Ok(0)` means a clean
    /// end of stream; a stream ending inside a block is an error.
    pub async fn read_decoded(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let n = self.drain_blocks(buf)?;
            if n > 0 {
                return Ok(n);
            }

            // Fewer than BLOCK_SIZE bytes pending here
            let want = buf.len() * BLOCK_SIZE - self.pending.len();
            self.scratch.resize(want, 0);
            let read = self.inner.read(&mut self.scratch[..want]).await?;

            if read == 0 {
                if self.pending.is_empty() {
                    return Ok(0);
                }
                return Err(CodecError::TruncatedBlock(self.pending.len()));
            }

            self.pending.extend_from_slice(&self.scratch[..read]);
            trace!(
                "Read {} raw bytes, {} pending",
                read,
                self.pending.len()
            );
        }
    }

    /// Fill `buf` completely
    pub async fn read_exact_decoded(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_decoded(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(CodecError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            filled += n;
        }
        Ok(())
    }

    /// Decode complete pending blocks into `buf`
    fn drain_blocks(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut n = 0;
        let mut block = [0u8; BLOCK_SIZE];

        while n < buf.len() && self.pending.len() >= BLOCK_SIZE {
            block.copy_from_slice(&self.pending[..BLOCK_SIZE]);

            match self.codec.decode_block(&block) {
                Ok(byte) => {
                    buf[n] = byte;
                    n += 1;
                    self.pending.advance(BLOCK_SIZE);
                }
                Err(e) if e.is_block_rejection() => match self.policy {
                    AmbiguousBlockPolicy::Skip => {
                        warn!("Dropping rejected block: {}", e);
                        self.skipped += 1;
                        self.pending.advance(BLOCK_SIZE);
                    }
                    // Hand out what was decoded; the bad block fails the next call
                    AmbiguousBlockPolicy::Abort if n > 0 => return Ok(n),
                    AmbiguousBlockPolicy::Abort => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }

        Ok(n)
    }

    /// Blocks dropped under [`AmbiguousBlockPolicy::Skip`]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::ObfuscationCode;
    use crate::sudoku::shared_catalog;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Reader handing out one predefined chunk per read call
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkedReader {
        fn new(data: &[u8], splits: &[usize]) -> Self {
            let mut chunks = VecDeque::new();
            let mut start = 0;
            for &end in splits {
                chunks.push_back(data[start..end].to_vec());
                start = end;
            }
            chunks.push_back(data[start..].to_vec());
            Self { chunks }
        }
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if let Some(mut chunk) = self.chunks.pop_front() {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    chunk.drain(..n);
                    self.chunks.push_front(chunk);
                }
            }
            Poll::Ready(Ok(()))
        }
    }

    /// Writer that accepts nothing
    struct StalledWriter;

    impl AsyncWrite for StalledWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(0))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn codec() -> Codec {
        Codec::new(shared_catalog(), ObfuscationCode::Direct)
    }

    async fn read_all<R: AsyncRead + Unpin>(
        reader: &mut ObfsReader<R>,
        chunk: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read_decoded(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_partial_read_keeps_remainder() {
        let codec = codec();
        let plain = b"hello sudoku tunnel";
        let wire = codec.encode(plain);

        // 3 blocks + 3 bytes, then odd-sized tails
        let source = ChunkedReader::new(&wire, &[21, 22, 50, 101]);
        let mut reader = ObfsReader::new(source, codec, AmbiguousBlockPolicy::Abort);

        let decoded = read_all(&mut reader, 64).await.unwrap();
        assert_eq!(decoded, plain);
        assert_eq!(reader.pending.len(), 0);
    }

    #[tokio::test]
    async fn test_remainder_retained_between_calls() {
        let codec = codec();
        let wire = codec.encode(b"abcd");

        let source = ChunkedReader::new(&wire, &[9]);
        let mut reader = ObfsReader::new(source, codec, AmbiguousBlockPolicy::Abort);

        let mut buf = [0u8; 4];
        let n = reader.read_decoded(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"a");
        assert_eq!(reader.pending.len(), 3);

        let n = reader.read_decoded(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"bcd");
    }

    #[tokio::test]
    async fn test_small_caller_buffer() {
        let codec = codec();
        let plain: Vec<u8> = (0..=255u8).collect();
        let wire = codec.encode(&plain);

        let source = ChunkedReader::new(&wire, &[1, 7, 700]);
        let mut reader = ObfsReader::new(source, codec, AmbiguousBlockPolicy::Abort);

        assert_eq!(read_all(&mut reader, 1).await.unwrap(), plain);
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let codec = codec();
        let mut wire = codec.encode(b"xy");
        wire.truncate(10);

        let mut reader = ObfsReader::new(
            ChunkedReader::new(&wire, &[]),
            codec,
            AmbiguousBlockPolicy::Abort,
        );
        let err = read_all(&mut reader, 16).await.unwrap_err();
        assert!(matches!(err, CodecError::TruncatedBlock(4)));
    }

    #[tokio::test]
    async fn test_abort_on_rejected_block() {
        let codec = codec();
        let mut wire = codec.encode(b"ok");
        wire.extend_from_slice(&[0; BLOCK_SIZE]);
        wire.extend_from_slice(&codec.encode(b"!"));

        let mut reader = ObfsReader::new(
            ChunkedReader::new(&wire, &[]),
            codec,
            AmbiguousBlockPolicy::Abort,
        );

        let mut buf = [0u8; 16];
        let n = reader.read_decoded(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ok");

        let err = reader.read_decoded(&mut buf).await.unwrap_err();
        assert!(matches!(err, CodecError::AmbiguousPuzzle(_)));
    }

    #[tokio::test]
    async fn test_skip_rejected_block() {
        let codec = codec();
        let mut wire = codec.encode(b"ok");
        wire.extend_from_slice(&[0; BLOCK_SIZE]);
        wire.extend_from_slice(&codec.encode(b"!"));

        let mut reader = ObfsReader::new(
            ChunkedReader::new(&wire, &[8]),
            codec,
            AmbiguousBlockPolicy::Skip,
        );

        assert_eq!(read_all(&mut reader, 16).await.unwrap(), b"ok!");
        assert_eq!(reader.skipped(), 1);
    }

    #[tokio::test]
    async fn test_duplex_round_trip() {
        let codec = codec();
        let (a, b) = tokio::io::duplex(256);
        let mut writer = ObfsWriter::new(a, codec.clone());
        let mut reader = ObfsReader::new(b, codec, AmbiguousBlockPolicy::Abort);

        let plain: Vec<u8> = (0..2000).map(|i| (i % 251) as u8).collect();
        let expected = plain.clone();

        let send = tokio::spawn(async move {
            for chunk in plain.chunks(333) {
                assert_eq!(writer.write_encoded(chunk).await.unwrap(), chunk.len());
            }
            writer.shutdown().await.unwrap();
        });

        let decoded = read_all(&mut reader, 100).await.unwrap();
        send.await.unwrap();
        assert_eq!(decoded, expected);
    }

    #[tokio::test]
    async fn test_read_exact_decoded() {
        let codec = codec();
        let wire = codec.encode(b"exact");
        let mut reader = ObfsReader::new(
            ChunkedReader::new(&wire, &[5, 11]),
            codec,
            AmbiguousBlockPolicy::Abort,
        );

        let mut buf = [0u8; 5];
        reader.read_exact_decoded(&mut buf).await.unwrap();
        assert_eq!(&buf, b"exact");

        let mut more = [0u8; 1];
        assert!(reader.read_exact_decoded(&mut more).await.is_err());
    }

    #[tokio::test]
    async fn test_short_write() {
        let mut writer = ObfsWriter::new(StalledWriter, codec());
        let err = writer.write_encoded(b"abc").await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::ShortWrite {
                written: 0,
                expected: 18
            }
        ));
    }
}
