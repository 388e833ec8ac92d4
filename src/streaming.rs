//! Rechunking and bounded buffering for blob bodies in transit.
//!
//! Blobs can be arbitrarily large; nothing in this module ever holds a
//! full blob in memory. A source read is a lazy byte stream; the
//! rechunker normalizes it to fixed-size pieces; the bounded buffer
//! decouples a streaming read from a streaming upload so the producer
//! can run ahead of a slower consumer up to a fixed memory budget.

use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{RegistryError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_BUFFER_DEPTH: usize = 4;

/// Rewrite `source` so every chunk except possibly the last is exactly
/// `chunk_size` bytes. The input stream is consumed at most once; this
/// is not restartable.
pub fn rechunk(
    source: impl Stream<Item = Result<Bytes>> + Send + 'static,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    futures::stream::unfold(
        (Box::pin(source), BytesMut::new(), false),
        move |(mut source, mut pending, mut exhausted)| async move {
            loop {
                if pending.len() >= chunk_size {
                    let chunk = pending.split_to(chunk_size);
                    return Some((Ok(chunk.freeze()), (source, pending, exhausted)));
                }
                if exhausted {
                    if pending.is_empty() {
                        return None;
                    }
                    let chunk = std::mem::take(&mut pending);
                    return Some((Ok(chunk.freeze()), (source, pending, exhausted)));
                }
                match source.next().await {
                    Some(Ok(bytes)) => pending.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (source, pending, exhausted))),
                    None => exhausted = true,
                }
            }
        },
    )
}

/// Connects a streaming reader to a streaming uploader through a bounded
/// `tokio::sync::mpsc` channel of depth `capacity`. The producer fills
/// the channel and suspends via its backpressure when full; on producer
/// failure the error is sent as the channel's final item so the consumer
/// observes it and can abort. Returns the consumer-side stream; the
/// producer task is spawned and runs independently.
pub fn buffered(
    mut source: impl Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
    capacity: usize,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(async move {
        while let Some(item) = source.next().await {
            let is_err = item.is_err();
            if tx.send(item).await.is_err() {
                // consumer dropped; stop reading promptly.
                return;
            }
            if is_err {
                return;
            }
        }
    });
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

/// Adapts a `reqwest::Response` into the crate's blob byte stream type,
/// mapping transport errors into [`RegistryError::Network`].
pub fn response_byte_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    response
        .bytes_stream()
        .map(|r| r.map_err(RegistryError::Network))
}
