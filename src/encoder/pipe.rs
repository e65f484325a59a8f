//! Encoder input pipe
//!
//! Chunks are queued without blocking the caller and written to the encoder's
//! standard input by a dedicated task, in submission order. The pipe tracks how
//! many bytes are queued but not yet accepted by the encoder and refuses new
//! chunks once that amount would exceed the high-watermark.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Error returned when a chunk cannot be queued
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipeError {
    /// Queued bytes would exceed the high-watermark
    #[error("encoder input backlog full ({buffered} bytes queued, limit {limit})")]
    Full {
        /// Bytes currently queued
        buffered: usize,
        /// Configured high-watermark
        limit: usize,
    },
    /// The writer task has stopped (encoder input closed or broken)
    #[error("encoder input closed")]
    Closed,
}

/// Byte pipe feeding one encoder process
#[derive(Debug)]
pub struct EncoderPipe {
    tx: mpsc::UnboundedSender<Bytes>,
    buffered: Arc<AtomicUsize>,
    high_watermark: usize,
    writer: JoinHandle<io::Result<u64>>,
}

impl EncoderPipe {
    /// Start the writer task for `input`
    pub fn spawn<W>(input: W, high_watermark: usize) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        let writer = tokio::spawn(drain_into(input, rx, Arc::clone(&buffered)));

        Self {
            tx,
            buffered,
            high_watermark,
            writer,
        }
    }

    /// Queue a chunk for the encoder
    ///
    /// A chunk larger than the high-watermark is still accepted when nothing is
    /// queued, so an oversized chunk cannot wedge the stream forever.
    pub fn write(&self, chunk: Bytes) -> Result<(), PipeError> {
        let len = chunk.len();
        let buffered = self.buffered.load(Ordering::Acquire);

        if buffered > 0 && buffered + len > self.high_watermark {
            return Err(PipeError::Full {
                buffered,
                limit: self.high_watermark,
            });
        }

        self.buffered.fetch_add(len, Ordering::AcqRel);
        if self.tx.send(chunk).is_err() {
            self.buffered.fetch_sub(len, Ordering::AcqRel);
            return Err(PipeError::Closed);
        }

        Ok(())
    }

    /// Bytes queued but not yet written to the encoder
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Check if the writer task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Signal end of input and wait for the queue to drain
    ///
    /// Returns the total number of bytes the encoder accepted.
    pub async fn finish(self) -> io::Result<u64> {
        drop(self.tx);
        match self.writer.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

async fn drain_into<W>(
    mut input: W,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    buffered: Arc<AtomicUsize>,
) -> io::Result<u64>
where
    W: AsyncWrite + Send + Unpin,
{
    let mut total = 0u64;

    while let Some(chunk) = rx.recv().await {
        let result = input.write_all(&chunk).await;
        buffered.fetch_sub(chunk.len(), Ordering::AcqRel);
        result?;
        total += chunk.len() as u64;
    }

    input.flush().await?;
    input.shutdown().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_writes_in_order() {
        let input = tokio_test::io::Builder::new()
            .write(b"first")
            .write(b"second")
            .write(b"third")
            .build();

        let pipe = EncoderPipe::spawn(input, 1024);
        pipe.write(Bytes::from_static(b"first")).unwrap();
        pipe.write(Bytes::from_static(b"second")).unwrap();
        pipe.write(Bytes::from_static(b"third")).unwrap();

        let total = pipe.finish().await.unwrap();
        assert_eq!(total, 16);
    }

    #[tokio::test]
    async fn test_finish_closes_input() {
        let (input, mut output) = tokio::io::duplex(1024);
        let pipe = EncoderPipe::spawn(input, 1024);

        pipe.write(Bytes::from_static(&[1, 2, 3])).unwrap();
        pipe.finish().await.unwrap();

        let mut received = Vec::new();
        output.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_high_watermark() {
        // Tiny duplex so the writer stalls after a few bytes
        let (input, mut output) = tokio::io::duplex(4);
        let pipe = EncoderPipe::spawn(input, 10);

        pipe.write(Bytes::from(vec![0u8; 6])).unwrap();
        assert_eq!(pipe.buffered(), 6);

        let err = pipe.write(Bytes::from(vec![0u8; 6])).unwrap_err();
        assert_eq!(
            err,
            PipeError::Full {
                buffered: 6,
                limit: 10
            }
        );

        // Still room for a small one
        pipe.write(Bytes::from(vec![1u8; 4])).unwrap();
        assert_eq!(pipe.buffered(), 10);

        let mut received = vec![0u8; 10];
        output.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[6..], [1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_oversized_chunk_accepted_when_idle() {
        let (input, mut output) = tokio::io::duplex(64);
        let pipe = EncoderPipe::spawn(input, 4);

        pipe.write(Bytes::from(vec![9u8; 16])).unwrap();

        let mut received = vec![0u8; 16];
        output.read_exact(&mut received).await.unwrap();
        assert_eq!(received, vec![9u8; 16]);
    }

    #[tokio::test]
    async fn test_closed_after_broken_input() {
        let (input, output) = tokio::io::duplex(4);
        drop(output);

        let pipe = EncoderPipe::spawn(input, 1024);
        pipe.write(Bytes::from_static(b"lost")).unwrap();

        // Let the writer hit the broken pipe and exit
        while !pipe.is_closed() {
            tokio::task::yield_now().await;
        }

        assert_eq!(pipe.write(Bytes::from_static(b"more")), Err(PipeError::Closed));
        assert!(pipe.finish().await.is_err());
    }
}
