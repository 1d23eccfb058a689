//! Chunked streaming of rows from a producer thread.
//!
//! `ChunkedRows::spawn` moves an iterator onto its own thread. The thread collects items into
//! chunks of `chunk_size` and sends them over a bounded channel of `capacity` chunks, so a fast
//! producer blocks once the consumer falls behind. Between chunks it polls the cancellation
//! token. However it stops, after the last rows it sends an empty chunk, which tells the consumer
//! that the stream ended rather than broke.
//!
//! Dropping the consumer drops the receiving end: the producer's next send fails and the thread
//! exits. A consumer that stops early (for example because of `TAKE`) never waits for the rest of
//! the source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use thiserror::Error;
use tracing::trace;

/// A cooperative cancellation flag shared by everything working on one query.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Row source {name} failed: {error:#}")]
    Source { name: String, error: anyhow::Error },
    #[error("Row source {0} stopped without finishing its stream.")]
    Disconnected(String),
}

enum Message<T> {
    Chunk(Vec<T>),
    Failed(anyhow::Error),
}

/// The consuming end of a chunked stream. Yields items in production order.
pub struct ChunkedRows<T> {
    name: String,
    receiver: Receiver<Message<T>>,
    current: std::vec::IntoIter<T>,
    finished: bool,
    /// Number of chunks received, including the final empty one.
    chunks: usize,
}

impl<T: Send + 'static> ChunkedRows<T> {
    /// Start producing `items` on a new thread.
    pub fn spawn<I>(
        name: &str,
        items: I,
        chunk_size: usize,
        capacity: usize,
        cancellation: CancellationToken,
    ) -> Self
    where
        I: Iterator<Item = anyhow::Result<T>> + Send + 'static,
    {
        let (sender, receiver) = bounded(capacity.max(1));
        let chunk_size = chunk_size.max(1);
        let thread_name = name.to_string();
        std::thread::spawn(move || {
            let mut items = items;
            loop {
                if cancellation.is_cancelled() {
                    trace!(source = %thread_name, "producer cancelled");
                    break;
                }
                let mut chunk = Vec::with_capacity(chunk_size);
                let mut failed = None;
                for item in items.by_ref() {
                    match item {
                        Ok(v) => chunk.push(v),
                        Err(e) => {
                            failed = Some(e);
                            break;
                        }
                    }
                    if chunk.len() == chunk_size {
                        break;
                    }
                }
                let last = chunk.len() < chunk_size;
                if !chunk.is_empty() {
                    trace!(source = %thread_name, rows = chunk.len(), "sending chunk");
                    if sender.send(Message::Chunk(chunk)).is_err() {
                        return;
                    }
                }
                if let Some(e) = failed {
                    let _ = sender.send(Message::Failed(e));
                    return;
                }
                if last {
                    break;
                }
            }
            // End of stream. The consumer may already be gone.
            let _ = sender.send(Message::Chunk(vec![]));
        });
        ChunkedRows {
            name: name.to_string(),
            receiver,
            current: vec![].into_iter(),
            finished: false,
            chunks: 0,
        }
    }

    pub fn chunks_received(&self) -> usize {
        self.chunks
    }
}

impl<T> Iterator for ChunkedRows<T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(v) = self.current.next() {
                return Some(Ok(v));
            }
            if self.finished {
                return None;
            }
            match self.receiver.recv() {
                Ok(Message::Chunk(chunk)) => {
                    self.chunks += 1;
                    if chunk.is_empty() {
                        self.finished = true;
                        return None;
                    }
                    self.current = chunk.into_iter();
                }
                Ok(Message::Failed(error)) => {
                    self.finished = true;
                    return Some(Err(Error::Source {
                        name: self.name.clone(),
                        error,
                    }));
                }
                Err(_) => {
                    self.finished = true;
                    return Some(Err(Error::Disconnected(self.name.clone())));
                }
            }
        }
    }
}

#[cfg(test)]
fn numbers(n: usize) -> impl Iterator<Item = anyhow::Result<usize>> + Send + 'static {
    (0..n).map(Ok)
}

#[test]
fn test_no_rows_lost_across_chunk_sizes() {
    let cases = vec![(0, 3), (1, 3), (10, 3), (9, 3), (100, 1), (100, 1000)];
    for (n, chunk_size) in cases {
        println!("Running case: n={} chunk_size={}", n, chunk_size);
        let rows: Vec<usize> =
            ChunkedRows::spawn("numbers", numbers(n), chunk_size, 2, CancellationToken::new())
                .collect::<Result<_, _>>()
                .unwrap();
        assert_eq!(rows, (0..n).collect::<Vec<_>>());
    }
}

#[test]
fn test_source_error_is_delivered_after_earlier_rows() {
    let items = (0..10).map(|i| match i {
        4 => Err(anyhow::anyhow!("disk on fire")),
        i => Ok(i),
    });
    let results: Vec<_> = ChunkedRows::spawn("flaky", items, 3, 2, CancellationToken::new()).collect();
    let ok: Vec<i32> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(ok, vec![0, 1, 2, 3]);
    match results.last() {
        Some(Err(Error::Source { name, error })) => {
            assert_eq!(name, "flaky");
            assert_eq!(error.to_string(), "disk on fire");
        }
        r => panic!("unexpected {:?}", r.map(|r| r.is_ok())),
    }
}

#[test]
fn test_cancel_yields_a_prefix() {
    let token = CancellationToken::new();
    let mut rows = ChunkedRows::spawn("endless", (0..).map(Ok::<u64, anyhow::Error>), 4, 1, token.clone());
    let mut seen = vec![];
    for r in rows.by_ref() {
        seen.push(r.unwrap());
        if seen.len() == 10 {
            token.cancel();
        }
    }
    assert!(seen.len() >= 10);
    assert_eq!(seen, (0..seen.len() as u64).collect::<Vec<_>>());
    assert!(rows.chunks_received() > 0);
}

#[test]
fn test_dropping_consumer_stops_producer() {
    let produced = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = produced.clone();
    let items = (0..).map(move |i: u64| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(i)
    });
    let first: Vec<u64> = ChunkedRows::spawn("endless", items, 2, 1, CancellationToken::new())
        .take(3)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(first, vec![0, 1, 2]);
    std::thread::sleep(std::time::Duration::from_millis(50));
    let after = produced.load(Ordering::SeqCst);
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(produced.load(Ordering::SeqCst), after);
}
