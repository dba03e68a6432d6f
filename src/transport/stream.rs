//! Plain and obfuscated chunk endpoints

use super::{ChunkSink, ChunkSource, TransportError};
use crate::obfuscation::{AmbiguousBlockPolicy, Codec, ObfsReader, ObfsWriter};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub type BoxedSource = Box<dyn ChunkSource>;
pub type BoxedSink = Box<dyn ChunkSink>;

/// Untransformed read half
pub struct PlainSource<R>(pub R);

/// Untransformed write half
pub struct PlainSink<W>(pub W);

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for PlainSource<R> {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(self.0.read(buf).await?)
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkSink for PlainSink<W> {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.0.write_all(data).await?;
        Ok(data.len())
    }

    async fn finish(&mut self) -> Result<(), TransportError> {
        self.0.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for ObfsReader<R> {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(self.read_decoded(buf).await?)
    }

    fn skipped_blocks(&self) -> u64 {
        self.skipped()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkSink for ObfsWriter<W> {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(self.write_encoded(data).await?)
    }

    async fn finish(&mut self) -> Result<(), TransportError> {
        Ok(self.shutdown().await?)
    }
}

/// Wrap a read half, decoding when a codec is given
pub fn source<R>(reader: R, codec: Option<&Codec>, policy: AmbiguousBlockPolicy) -> BoxedSource
where
    R: AsyncRead + Unpin + Send + 'static,
{
    match codec {
        Some(codec) => Box::new(ObfsReader::new(reader, codec.clone(), policy)),
        None => Box::new(PlainSource(reader)),
    }
}

/// Wrap a write half, encoding when a codec is given
pub fn sink<W>(writer: W, codec: Option<&Codec>) -> BoxedSink
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    match codec {
        Some(codec) => Box::new(ObfsWriter::new(writer, codec.clone())),
        None => Box::new(PlainSink(writer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::{ObfuscationCode, BLOCK_SIZE};
    use crate::sudoku::shared_catalog;

    #[tokio::test]
    async fn test_obfuscated_endpoints() {
        let codec = Codec::new(shared_catalog(), ObfuscationCode::Inverted);
        let (a, b) = tokio::io::duplex(1024);

        let mut tx = sink(a, Some(&codec));
        let mut rx = source(b, Some(&codec), AmbiguousBlockPolicy::Abort);

        assert_eq!(tx.write_chunk(b"ping").await.unwrap(), 4);
        tx.finish().await.unwrap();

        let mut buf = [0u8; 4];
        rx.read_exact_chunk(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(rx.read_chunk(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wire_expansion() {
        let codec = Codec::new(shared_catalog(), ObfuscationCode::Direct);
        let (a, mut b) = tokio::io::duplex(1024);

        let mut tx = sink(a, Some(&codec));
        tx.write_chunk(b"abc").await.unwrap();
        tx.finish().await.unwrap();

        let mut raw = Vec::new();
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw.len(), 3 * BLOCK_SIZE);
        assert_eq!(codec.decode(&raw).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_skipped_blocks_reported() {
        let codec = Codec::new(shared_catalog(), ObfuscationCode::Direct);
        let (mut a, b) = tokio::io::duplex(1024);

        let mut wire = codec.encode(b"a");
        wire.extend_from_slice(&[0u8; BLOCK_SIZE]);
        wire.extend_from_slice(&codec.encode(b"b"));
        a.write_all(&wire).await.unwrap();
        drop(a);

        let mut rx = source(b, Some(&codec), AmbiguousBlockPolicy::Skip);
        let mut buf = [0u8; 2];
        rx.read_exact_chunk(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ab");
        assert_eq!(rx.skipped_blocks(), 1);

        let plain = source(tokio::io::empty(), None, AmbiguousBlockPolicy::Skip);
        assert_eq!(plain.skipped_blocks(), 0);
    }

    #[tokio::test]
    async fn test_plain_endpoints() {
        let (a, b) = tokio::io::duplex(64);
        let mut tx = sink(a, None);
        let mut rx = source(b, None, AmbiguousBlockPolicy::Abort);

        tx.write_chunk(b"plain").await.unwrap();
        tx.finish().await.unwrap();

        let mut buf = [0u8; 5];
        rx.read_exact_chunk(&mut buf).await.unwrap();
        assert_eq!(&buf, b"plain");

        let mut more = [0u8; 1];
        assert!(matches!(
            rx.read_exact_chunk(&mut more).await,
            Err(TransportError::Closed)
        ));
    }
}
