//! Chunked transfer of a byte interval out of a seekable source.
//!
//! Full-file and partial responses share this one path: a whole file is the
//! interval `[0, total-1]`. The stream reads the next chunk only when the
//! consumer polls for it, so a slow client never causes more than one chunk
//! to be buffered. Dropping the stream drops the source handle.

use crate::services::range::ByteRange;
use bytes::Bytes;
use futures::Stream;
use std::io::{self, SeekFrom};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, warn};

/// Read size for streaming and ingest.
pub const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer truncated: expected {expected} bytes, delivered {delivered}")]
    Truncated { expected: u64, delivered: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What to read: where to start, how much, and in what chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    start: u64,
    length: u64,
    chunk_size: usize,
}

impl TransferPlan {
    pub fn for_range(range: &ByteRange) -> Self {
        Self {
            start: range.start(),
            length: range.len(),
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Whole resource of `total` bytes. An empty resource yields an empty plan.
    pub fn whole(total: u64) -> Self {
        match ByteRange::full(total) {
            Some(range) => Self::for_range(&range),
            None => Self {
                start: 0,
                length: 0,
                chunk_size: CHUNK_SIZE,
            },
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Bytes the transfer is expected to deliver.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// An open source positioned at the plan's start offset.
#[derive(Debug)]
pub struct ChunkedTransfer<R> {
    source: R,
    plan: TransferPlan,
    delivered: u64,
    finished: bool,
}

impl<R> ChunkedTransfer<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    /// Seek `source` to the plan's start. The source is owned by the transfer
    /// from here on and released when the transfer (or its stream) is dropped.
    /// An empty plan never touches the source.
    pub async fn open(mut source: R, plan: TransferPlan) -> io::Result<Self> {
        if !plan.is_empty() {
            source.seek(SeekFrom::Start(plan.start)).await?;
        }
        Ok(Self {
            source,
            plan,
            delivered: 0,
            finished: false,
        })
    }

    fn remaining(&self) -> u64 {
        self.plan.length - self.delivered
    }

    /// Read the next `min(chunk_size, remaining)` bytes.
    ///
    /// Returns `Ok(None)` once the plan is delivered. A read that hits end of
    /// data before that ends the transfer with `TransferError::Truncated`.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        if self.finished {
            return Ok(None);
        }
        let remaining = self.remaining();
        if remaining == 0 {
            self.finished = true;
            return Ok(None);
        }

        let want = remaining.min(self.plan.chunk_size as u64);
        let mut buf = Vec::with_capacity(want as usize);
        if let Err(err) = (&mut self.source).take(want).read_to_end(&mut buf).await {
            self.finished = true;
            return Err(TransferError::Io(err));
        }

        if buf.is_empty() {
            self.finished = true;
            warn!(
                expected = self.plan.length,
                delivered = self.delivered,
                "source ended before the planned range was delivered"
            );
            return Err(TransferError::Truncated {
                expected: self.plan.length,
                delivered: self.delivered,
            });
        }

        self.delivered += buf.len() as u64;
        Ok(Some(Bytes::from(buf)))
    }

    /// Lazy, forward-only stream of chunks. Ends after the last chunk or after
    /// the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, TransferError>> + Send + 'static {
        futures::stream::try_unfold(self, |mut transfer| async move {
            let chunk = transfer.next_chunk().await?;
            Ok::<_, TransferError>(chunk.map(|chunk| (chunk, transfer)))
        })
    }
}

impl<R> Drop for ChunkedTransfer<R> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                remaining = self.plan.length - self.delivered,
                "transfer dropped before completion, releasing source"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt, pin_mut};
    use std::{
        io::Cursor,
        pin::Pin,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        task::{Context, Poll},
    };
    use tokio::io::ReadBuf;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn collect(source: Vec<u8>, plan: TransferPlan) -> Vec<Bytes> {
        let transfer = ChunkedTransfer::open(Cursor::new(source), plan).await.unwrap();
        transfer.into_stream().try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn partial_range_yields_exact_slice() {
        let data = sample(1000);
        let range = ByteRange::new(123, 876, 1000).unwrap();
        let plan = TransferPlan::for_range(&range).with_chunk_size(64);

        let chunks = collect(data.clone(), plan).await;

        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 64));
        assert_eq!(chunks.concat(), data[123..=876]);
    }

    #[tokio::test]
    async fn whole_plan_matches_open_ended_range() {
        let data = sample(300);
        let whole = collect(data.clone(), TransferPlan::whole(300).with_chunk_size(7)).await;
        let from_zero = ByteRange::new(0, 299, 300).unwrap();
        let ranged = collect(
            data.clone(),
            TransferPlan::for_range(&from_zero).with_chunk_size(7),
        )
        .await;

        assert_eq!(whole.concat(), data);
        assert_eq!(ranged.concat(), data);
    }

    #[tokio::test]
    async fn default_chunk_size_bounds_reads() {
        let data = sample(CHUNK_SIZE * 2 + 10);
        let total = data.len() as u64;
        let chunks = collect(data.clone(), TransferPlan::whole(total)).await;

        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 10]);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn empty_plan_yields_nothing() {
        let chunks = collect(Vec::new(), TransferPlan::whole(0)).await;
        assert!(chunks.is_empty());
    }

    /// Source that fails any seek.
    struct Unseekable;

    impl AsyncRead for Unseekable {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncSeek for Unseekable {
        fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
            Err(io::Error::other("seek on unseekable source"))
        }

        fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
            Poll::Ready(Ok(0))
        }
    }

    #[tokio::test]
    async fn empty_plan_does_not_seek() {
        let transfer = ChunkedTransfer::open(Unseekable, TransferPlan::whole(0))
            .await
            .unwrap();
        let chunks: Vec<Bytes> = transfer.into_stream().try_collect().await.unwrap();
        assert!(chunks.is_empty());

        let range = ByteRange::new(0, 9, 10).unwrap();
        assert!(
            ChunkedTransfer::open(Unseekable, TransferPlan::for_range(&range))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn short_source_reports_truncation_and_stops() {
        // Plan believes the source holds 150 bytes; only 100 exist.
        let range = ByteRange::new(50, 149, 150).unwrap();
        let plan = TransferPlan::for_range(&range).with_chunk_size(32);
        let transfer = ChunkedTransfer::open(Cursor::new(sample(100)), plan)
            .await
            .unwrap();
        let stream = transfer.into_stream();
        pin_mut!(stream);

        let mut delivered = Vec::new();
        let err = loop {
            match stream.next().await {
                Some(Ok(chunk)) => delivered.extend_from_slice(&chunk),
                Some(Err(err)) => break err,
                None => panic!("stream ended without reporting truncation"),
            }
        };

        assert_eq!(delivered, sample(100)[50..]);
        assert!(matches!(
            err,
            TransferError::Truncated {
                expected: 100,
                delivered: 50
            }
        ));
        assert!(stream.next().await.is_none());
    }

    struct TrackedSource {
        inner: Cursor<Vec<u8>>,
        dropped: Arc<AtomicBool>,
    }

    impl Drop for TrackedSource {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    impl AsyncRead for TrackedSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncSeek for TrackedSource {
        fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
            Pin::new(&mut self.inner).start_seek(position)
        }

        fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
            Pin::new(&mut self.inner).poll_complete(cx)
        }
    }

    #[tokio::test]
    async fn dropping_stream_mid_transfer_releases_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = TrackedSource {
            inner: Cursor::new(sample(1000)),
            dropped: dropped.clone(),
        };
        let plan = TransferPlan::whole(1000).with_chunk_size(100);
        let transfer = ChunkedTransfer::open(source, plan).await.unwrap();

        {
            let stream = transfer.into_stream();
            pin_mut!(stream);
            let first = stream.next().await.unwrap().unwrap();
            assert_eq!(first.len(), 100);
            assert!(!dropped.load(Ordering::SeqCst));
        }

        assert!(dropped.load(Ordering::SeqCst));
    }
}
