//! Output workers feeding batches to publish engines.
//!
//! An [`OutputGroup`] owns one thread per configured worker. Each worker owns
//! a [`PublishEngine`] with its own transport and request pool; the resolver
//! and observer are shared. Batches are enqueued round-robin on bounded
//! queues without blocking the pipeline. A batch that cannot be enqueued is
//! cancelled so the pipeline can resubmit it without spending a retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use log::warn;
use parking_lot::Mutex;

use crate::batch::Batch;
use crate::config::OutputConfig;
use crate::engine::{PublishEngine, SenderInfo};
use crate::error::{BuildError, EnqueueError};
use crate::observer::Observer;
use crate::rate_limited_warner::RateLimitedWarner;
use crate::resolver::Resolver;

/// Upper bound on waiting for a worker to acknowledge shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Commands processed by a worker thread.
pub enum PublishCommand {
    Publish(Box<dyn Batch>),
    Flush(Sender<()>),
    Shutdown(Sender<()>),
}

/// Spawn a worker thread that publishes batches through `engine`.
pub fn spawn_worker(
    name: String,
    engine: PublishEngine,
    capacity: usize,
) -> std::io::Result<(Sender<PublishCommand>, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded(capacity);
    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || Worker { engine }.run(rx))?;
    Ok((tx, handle))
}

struct Worker {
    engine: PublishEngine,
}

impl Worker {
    fn handle(&self, command: PublishCommand, rx: &Receiver<PublishCommand>) -> bool {
        match command {
            PublishCommand::Publish(mut batch) => {
                self.engine.publish(batch.as_mut());
            }
            PublishCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            PublishCommand::Shutdown(ack) => {
                self.drain_pending(rx);
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn drain_pending(&self, rx: &Receiver<PublishCommand>) {
        loop {
            match rx.try_recv() {
                Ok(PublishCommand::Publish(mut batch)) => {
                    self.engine.publish(batch.as_mut());
                }
                Ok(PublishCommand::Flush(ack)) | Ok(PublishCommand::Shutdown(ack)) => {
                    let _ = ack.send(());
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn run(self, rx: Receiver<PublishCommand>) {
        loop {
            match rx.recv() {
                Ok(command) => {
                    if !self.handle(command, &rx) {
                        break;
                    }
                }
                Err(_) => {
                    self.drain_pending(&rx);
                    break;
                }
            }
        }
        self.engine.close();
    }
}

struct WorkerHandle {
    tx: Option<Sender<PublishCommand>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WorkerHandle {
    fn request_shutdown(&mut self, timeout: Duration) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(PublishCommand::Shutdown(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.recv_timeout(timeout);
    }

    fn join(&mut self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("OutputGroup: worker thread panicked");
        }
    }
}

/// Pool of output workers registered with the host pipeline.
pub struct OutputGroup {
    workers: Vec<WorkerHandle>,
    next: AtomicUsize,
    warner: RateLimitedWarner,
    max_retries: i32,
    shutdown_timeout: Duration,
}

impl OutputGroup {
    /// Build one engine per configured worker and start the threads.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, TLS cannot be initialised, or a
    /// thread cannot be spawned. Already started workers are shut down.
    pub fn new(
        config: &OutputConfig,
        sender: &SenderInfo,
        resolver: Arc<dyn Resolver>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, BuildError> {
        config.validate()?;
        let mut group = Self {
            workers: Vec::with_capacity(config.workers),
            next: AtomicUsize::new(0),
            warner: RateLimitedWarner::default(),
            max_retries: config.max_retries,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        };
        for index in 0..config.workers {
            let engine = PublishEngine::new(config, sender, resolver.clone(), observer.clone())?;
            let (tx, handle) = spawn_worker(
                format!("dingtalk-output-{index}"),
                engine,
                config.queue_capacity,
            )
            .map_err(|err| {
                warn!("OutputGroup: failed to spawn worker {index}: {err}");
                BuildError::Spawn(err)
            })?;
            group.workers.push(WorkerHandle {
                tx: Some(tx),
                handle: Mutex::new(Some(handle)),
            });
        }
        Ok(group)
    }

    /// Retry hint for the pipeline; `-1` retries forever.
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Preferred batch size; bulk submission is disabled.
    pub fn batch_size(&self) -> i64 {
        -1
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Enqueue `batch` on the next worker without blocking.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::QueueFull`] or [`EnqueueError::Closed`]; the batch has
    /// already been cancelled back to the pipeline in both cases.
    pub fn publish(&self, batch: Box<dyn Batch>) -> Result<(), EnqueueError> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len().max(1);
        let Some(tx) = self.workers.get(index).and_then(|w| w.tx.as_ref()) else {
            let mut batch = batch;
            self.cancel(batch.as_mut(), "closed");
            return Err(EnqueueError::Closed);
        };
        match tx.try_send(PublishCommand::Publish(batch)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                cancel_command(command, |batch| self.cancel(batch, "queue full"));
                Err(EnqueueError::QueueFull)
            }
            Err(TrySendError::Disconnected(command)) => {
                cancel_command(command, |batch| self.cancel(batch, "disconnected"));
                Err(EnqueueError::Closed)
            }
        }
    }

    fn cancel(&self, batch: &mut dyn Batch, reason: &str) {
        self.warner.record(batch.events().len() as u64);
        batch.cancel_all();
        self.warner.warn_if_due(|count| {
            warn!("OutputGroup {reason}; cancelled {count} events");
        });
    }

    /// Wait until every batch queued so far has been published.
    ///
    /// Returns `false` if any worker failed to catch up within `timeout`.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.warner.flush(|count| {
            warn!("OutputGroup cancelled {count} events in the last interval");
        });
        let deadline = Instant::now() + timeout;
        let mut acks = Vec::with_capacity(self.workers.len());
        for tx in self.workers.iter().filter_map(|w| w.tx.as_ref()) {
            let (ack_tx, ack_rx) = bounded(1);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tx.send_timeout(PublishCommand::Flush(ack_tx), remaining).is_err() {
                return false;
            }
            acks.push(ack_rx);
        }
        acks.into_iter().all(|ack| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            ack.recv_timeout(remaining).is_ok()
        })
    }

    /// Drain every queue, stop the workers, and wait for them to exit.
    pub fn close(&mut self) {
        let timeout = self.shutdown_timeout;
        for worker in &mut self.workers {
            worker.request_shutdown(timeout);
        }
        for worker in &mut self.workers {
            worker.join();
        }
    }
}

fn cancel_command(command: PublishCommand, cancel: impl FnOnce(&mut dyn Batch)) {
    if let PublishCommand::Publish(mut batch) = command {
        cancel(batch.as_mut());
    }
}

impl Drop for OutputGroup {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for OutputGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputGroup")
            .field("workers", &self.workers.len())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
