//! Single-consumer decode/route pipeline.
//!
//! Every inbound chunk goes through one task that owns the
//! [`TopicRouter`]. A chunk is decoded and fully routed before the next one
//! is taken off the queue, so subscribers see envelopes in transport order
//! no matter how many producers hold a [`DispatcherHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use super::frame::decode_chunk;
use super::router::TopicRouter;
use crate::domain::{Delivery, EventBus};
use crate::error::TelemetryError;

/// Pipeline counters, shared between the task and its handles.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    chunks: AtomicU64,
    envelopes: AtomicU64,
    malformed: AtomicU64,
    unrouted: AtomicU64,
    publishes: AtomicU64,
    handler_failures: AtomicU64,
    last_chunk_ms: AtomicI64,
}

impl DispatchCounters {
    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> DispatchStats {
        let chunks = self.chunks.load(Ordering::Acquire);
        let last = self.last_chunk_ms.load(Ordering::Relaxed);
        DispatchStats {
            chunks,
            envelopes: self.envelopes.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            last_chunk_at: (last > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(last))
                .flatten(),
        }
    }
}

/// Serializable snapshot of [`DispatchCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchStats {
    /// Chunks processed.
    pub chunks: u64,
    /// Envelopes decoded.
    pub envelopes: u64,
    /// Segments dropped as malformed.
    pub malformed: u64,
    /// Envelopes dropped for an unknown type.
    pub unrouted: u64,
    /// Topic publishes performed.
    pub publishes: u64,
    /// Handler invocations that failed.
    pub handler_failures: u64,
    /// When the last chunk was processed.
    pub last_chunk_at: Option<DateTime<Utc>>,
}

/// Outcome of processing one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    /// Envelopes decoded.
    pub envelopes: usize,
    /// Segments dropped as malformed.
    pub malformed: usize,
    /// Envelopes dropped for an unknown type.
    pub unrouted: usize,
    /// Topic publishes performed.
    pub publishes: usize,
    /// Handler outcomes across all publishes.
    pub delivery: Delivery,
}

/// Decodes `chunk` and routes every envelope, in order.
///
/// Malformed segments and unknown types are skipped; neither stops the
/// remaining envelopes.
#[must_use]
pub fn process_chunk(router: &TopicRouter, chunk: &str) -> ChunkReport {
    let decoded = decode_chunk(chunk);
    let mut report = ChunkReport {
        envelopes: decoded.envelopes.len(),
        malformed: decoded.rejected.len(),
        ..ChunkReport::default()
    };
    for envelope in &decoded.envelopes {
        match router.route(envelope) {
            Ok(routed) => {
                report.publishes += routed.topics.len();
                report.delivery += routed.delivery;
            }
            Err(_) => report.unrouted += 1,
        }
    }
    report
}

/// Cloneable producer side of the dispatcher queue.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<String>,
    counters: Arc<DispatchCounters>,
}

impl DispatcherHandle {
    /// Enqueues a raw chunk. Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::DispatcherClosed`] if the dispatcher task
    /// has stopped.
    pub async fn deliver(&self, chunk: impl Into<String>) -> Result<(), TelemetryError> {
        self.tx
            .send(chunk.into())
            .await
            .map_err(|_| TelemetryError::DispatcherClosed)
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Returns `true` once the dispatcher task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The consumer task.
#[derive(Debug)]
pub struct Dispatcher {
    router: TopicRouter,
    rx: mpsc::Receiver<String>,
    counters: Arc<DispatchCounters>,
}

impl Dispatcher {
    /// Spawns the dispatcher on the current Tokio runtime.
    ///
    /// The task runs until every [`DispatcherHandle`] is dropped. A
    /// `capacity` of zero is raised to one.
    #[must_use]
    pub fn spawn(bus: EventBus, capacity: usize) -> (DispatcherHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(DispatchCounters::default());
        let dispatcher = Self {
            router: TopicRouter::new(bus),
            rx,
            counters: Arc::clone(&counters),
        };
        let task = tokio::spawn(dispatcher.run());
        (DispatcherHandle { tx, counters }, task)
    }

    async fn run(mut self) {
        tracing::debug!("dispatcher started");
        while let Some(chunk) = self.rx.recv().await {
            let report = process_chunk(&self.router, &chunk);
            self.record(&report);
        }
        tracing::debug!("dispatcher stopped");
    }

    fn record(&self, report: &ChunkReport) {
        let c = &self.counters;
        c.envelopes.fetch_add(report.envelopes as u64, Ordering::Relaxed);
        c.malformed.fetch_add(report.malformed as u64, Ordering::Relaxed);
        c.unrouted.fetch_add(report.unrouted as u64, Ordering::Relaxed);
        c.publishes.fetch_add(report.publishes as u64, Ordering::Relaxed);
        c.handler_failures
            .fetch_add(report.delivery.failed as u64, Ordering::Relaxed);
        c.last_chunk_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        // Published last: a reader that sees the chunk sees its counts.
        c.chunks.fetch_add(1, Ordering::Release);
    }
}
