//! Pull-based file streaming.
//!
//! [`pump`] moves bytes from an async reader into a sink one bounded chunk at
//! a time, and only reads the next chunk once the sink reports it is ready for
//! more. Downloads run the pump in its own task feeding a capacity-1 channel
//! whose receiving end is the HTTP response body, so a slow client holds at
//! most a couple of chunks in memory and a disconnected client releases the
//! file straight away.

use std::io;
use std::path::Path;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use futures::future::poll_fn;
use futures::{Sink, SinkExt};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Chunks buffered between the pump and the response body.
const DOWNLOAD_BUFFER: usize = 1;

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("Read failed: {0}")]
    Read(io::Error),

    #[error("Sink closed before the transfer completed")]
    SinkClosed,
}

/// Open a stored file for streaming.
pub async fn open_source(path: &Path) -> io::Result<File> {
    File::open(path).await
}

/// Copy `source` into `sink` in chunks of at most `chunk_size` bytes.
///
/// On EOF the sink is closed, which ends the response. A read error is passed
/// on to the sink as an error item, aborting the response, and returned. The
/// source is dropped, and so released, whichever way this returns.
pub async fn pump<R, K>(mut source: R, mut sink: K, chunk_size: usize) -> Result<u64, PumpError>
where
    R: AsyncRead + Unpin,
    K: Sink<io::Result<Bytes>> + Unpin,
{
    let chunk_size = chunk_size.max(1);
    let mut transferred = 0u64;

    loop {
        poll_fn(|cx| sink.poll_ready_unpin(cx))
            .await
            .map_err(|_| PumpError::SinkClosed)?;

        let mut chunk = BytesMut::with_capacity(chunk_size);
        match (&mut source).take(chunk_size as u64).read_buf(&mut chunk).await {
            Ok(0) => {
                sink.close().await.map_err(|_| PumpError::SinkClosed)?;
                return Ok(transferred);
            }
            Ok(n) => {
                transferred += n as u64;
                sink.start_send_unpin(Ok(chunk.freeze()))
                    .map_err(|_| PumpError::SinkClosed)?;
            }
            Err(e) => {
                let _ = sink.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                return Err(PumpError::Read(e));
            }
        }
    }
}

/// Stream `file` as a response body.
pub fn stream_file(file: File, chunk_size: usize) -> Body {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(DOWNLOAD_BUFFER);

    tokio::spawn(async move {
        match pump(file, tx, chunk_size).await {
            Ok(bytes) => debug!(bytes, "File streamed"),
            Err(PumpError::SinkClosed) => debug!("Client went away, file released"),
            Err(e) => warn!(error = %e, "File stream aborted"),
        }
    });

    Body::from_stream(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::ReadBuf;

    /// Counts how many bytes have been pulled out of the inner reader.
    struct CountingReader<R> {
        inner: R,
        read: Arc<AtomicUsize>,
    }

    impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let before = buf.filled().len();
            let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
            let n = buf.filled().len() - before;
            self.read.fetch_add(n, Ordering::SeqCst);
            poll
        }
    }

    /// Yields `good` bytes, then fails.
    struct FailingReader {
        good: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.good == 0 {
                return Poll::Ready(Err(io::Error::other("disk on fire")));
            }
            let n = self.good.min(buf.remaining());
            buf.put_slice(&vec![7u8; n]);
            self.good -= n;
            Poll::Ready(Ok(()))
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_pump_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.jpg");
        let data = sample(200_000);
        tokio::fs::write(&path, &data).await.unwrap();

        let file = open_source(&path).await.unwrap();
        let (tx, rx) = mpsc::channel(DOWNLOAD_BUFFER);
        let pumping = tokio::spawn(pump(file, tx, 4096));

        let chunks: Vec<io::Result<Bytes>> = rx.collect().await;
        let mut received = Vec::new();
        for chunk in chunks {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 4096);
            received.extend_from_slice(&chunk);
        }

        assert_eq!(received, data);
        assert_eq!(pumping.await.unwrap().unwrap(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_source(&dir.path().join("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_source_ends_stream() {
        let (tx, rx) = mpsc::channel(DOWNLOAD_BUFFER);
        let transferred = pump(io::Cursor::new(Vec::<u8>::new()), tx, 1024)
            .await
            .unwrap();
        assert_eq!(transferred, 0);
        assert!(rx.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_sink_bounds_reads() {
        let read = Arc::new(AtomicUsize::new(0));
        let source = CountingReader {
            inner: io::Cursor::new(sample(1024 * 1024)),
            read: read.clone(),
        };

        let (tx, mut rx) = mpsc::channel(DOWNLOAD_BUFFER);
        let pumping = tokio::spawn(pump(source, tx, 1024));

        // Nobody is draining: the pump must stall after a few chunks.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(read.load(Ordering::SeqCst) <= 3 * 1024);

        let mut total = 0;
        while let Some(chunk) = rx.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 1024 * 1024);
        assert_eq!(pumping.await.unwrap().unwrap(), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_closed_sink_stops_pump() {
        let read = Arc::new(AtomicUsize::new(0));
        let source = CountingReader {
            inner: io::Cursor::new(sample(1024 * 1024)),
            read: read.clone(),
        };

        let (tx, mut rx) = mpsc::channel(DOWNLOAD_BUFFER);
        let pumping = tokio::spawn(pump(source, tx, 1024));

        rx.next().await.unwrap().unwrap();
        drop(rx);

        let result = pumping.await.unwrap();
        assert!(matches!(result, Err(PumpError::SinkClosed)));
        assert!(read.load(Ordering::SeqCst) < 1024 * 1024);
    }

    #[tokio::test]
    async fn test_read_error_aborts_sink() {
        let (tx, rx) = mpsc::channel(DOWNLOAD_BUFFER);
        let pumping = tokio::spawn(pump(FailingReader { good: 1500 }, tx, 1024));

        let items: Vec<io::Result<Bytes>> = rx.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().len(), 1024);
        assert_eq!(items[1].as_ref().unwrap().len(), 476);
        assert!(items[2].is_err());

        assert!(matches!(pumping.await.unwrap(), Err(PumpError::Read(_))));
    }
}
