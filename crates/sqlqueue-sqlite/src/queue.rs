//! Serialized access to one connection from any number of threads.
//!
//! A [`SerializedAccessQueue`] moves its [`SqliteConnection`] onto a dedicated
//! worker thread. Callers submit closures; the worker runs them one at a time
//! in acceptance order and sends each result back to the blocked submitter.

#![allow(clippy::result_large_err)]

use crate::config::{QueueConfig, TransactionKind};
use crate::connection::SqliteConnection;
use sqlqueue_core::{ConfigError, Error, QueueError, QueueErrorKind, Result};
use std::any::Any;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of work as the worker sees it.
type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// What a unit of work sends back: its result, or the payload of its panic.
type Reply<T> = std::result::Result<Result<T>, Box<dyn Any + Send + 'static>>;

/// Sending half of the job channel.
#[derive(Clone)]
enum Mailbox {
    Unbounded(mpsc::Sender<Job>),
    Bounded(mpsc::SyncSender<Job>),
}

impl Mailbox {
    fn channel(capacity: Option<usize>) -> (Self, mpsc::Receiver<Job>) {
        match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::sync_channel(capacity);
                (Mailbox::Bounded(tx), rx)
            }
            None => {
                let (tx, rx) = mpsc::channel();
                (Mailbox::Unbounded(tx), rx)
            }
        }
    }

    /// Blocks while a bounded mailbox is full.
    fn send(&self, job: Job) -> std::result::Result<(), Job> {
        match self {
            Mailbox::Unbounded(tx) => tx.send(job).map_err(|e| e.0),
            Mailbox::Bounded(tx) => tx.send(job).map_err(|e| e.0),
        }
    }
}

struct QueueInner {
    id: u64,
    thread_name: String,
    worker_thread: ThreadId,
    /// `None` once the queue is closed.
    mailbox: Mutex<Option<Mailbox>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueueInner {
    fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_thread
    }

    fn shut_down(&self) -> Result<()> {
        let mailbox = self.mailbox.lock().unwrap_or_else(PoisonError::into_inner).take();
        if mailbox.is_some() {
            tracing::debug!(queue_id = self.id, "Closing serialized queue");
        }
        drop(mailbox);

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker
                .join()
                .map_err(|_| Error::custom(format!("worker thread '{}' panicked", self.thread_name)))?;
        }
        Ok(())
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        // The last handle can be released from inside a unit of work; the
        // worker then exits on its own once the mailbox is gone.
        if self.on_worker() {
            self.mailbox.lock().unwrap_or_else(PoisonError::into_inner).take();
            return;
        }
        if let Err(e) = self.shut_down() {
            tracing::error!(queue_id = self.id, error = %e, "Serialized queue shut down uncleanly");
        }
    }
}

/// Runs units of work against one connection, one at a time.
///
/// Cloning yields another handle to the same queue; all clones compare equal.
/// The connection is closed when the queue is closed or the last handle is
/// dropped.
#[derive(Clone)]
pub struct SerializedAccessQueue {
    inner: Arc<QueueInner>,
}

impl SerializedAccessQueue {
    /// Take ownership of `conn` with the default configuration.
    pub fn new(conn: SqliteConnection) -> Result<Self> {
        Self::with_config(conn, QueueConfig::default())
    }

    /// Take ownership of `conn` and start its worker thread.
    ///
    /// Fails with [`Error::Config`] when the thread name contains a NUL byte.
    pub fn with_config(conn: SqliteConnection, config: QueueConfig) -> Result<Self> {
        if config.thread_name.contains('\0') {
            return Err(Error::Config(ConfigError {
                message: format!("invalid worker thread name {:?}: contains NUL", config.thread_name),
            }));
        }

        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        let (mailbox, jobs) = Mailbox::channel(config.mailbox_capacity);

        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_worker(id, conn, &jobs))?;

        tracing::debug!(
            queue_id = id,
            thread = %config.thread_name,
            capacity = ?config.mailbox_capacity,
            "Started serialized queue"
        );

        Ok(Self {
            inner: Arc::new(QueueInner {
                id,
                thread_name: config.thread_name,
                worker_thread: worker.thread().id(),
                mailbox: Mutex::new(Some(mailbox)),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// Identity shared by every clone of this queue.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether the queue has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.inner
            .mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Run `unit` on the worker and wait for its result.
    ///
    /// Fails with a [`QueueErrorKind::Closed`] error once the queue is closed
    /// and with [`QueueErrorKind::Reentrant`] when called from inside another
    /// unit of this queue. A panic in `unit` is re-raised on the caller.
    pub fn submit<T, F>(&self, unit: F) -> Result<T>
    where
        F: FnOnce(&SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_mut(move |conn| unit(conn))
    }

    /// Like [`submit`](Self::submit), with mutable access for operations such
    /// as installing a trace callback.
    pub fn submit_mut<T, F>(&self, unit: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.on_worker() {
            return Err(queue_error(
                QueueErrorKind::Reentrant,
                "submitted from inside a unit of work on the same queue",
            ));
        }

        let mailbox = self
            .inner
            .mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(closed)?;

        let (reply_tx, reply_rx) = mpsc::sync_channel::<Reply<T>>(1);
        let job: Job = Box::new(move |conn: &mut SqliteConnection| {
            let reply = panic::catch_unwind(AssertUnwindSafe(|| unit(conn)));
            // The submitter only goes away if its own thread died.
            let _ = reply_tx.send(reply);
        });

        mailbox.send(job).map_err(|_| closed())?;
        drop(mailbox);

        match reply_rx.recv() {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(closed()),
        }
    }

    /// Run `body` in a transaction as a single unit of work.
    pub fn submit_transaction<T, F>(&self, kind: TransactionKind, body: F) -> Result<T>
    where
        F: FnOnce(&SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(move |conn| conn.transaction(kind, body))
    }

    /// Run `body` in a savepoint as a single unit of work.
    pub fn submit_savepoint<T, F>(&self, name: impl Into<String>, body: F) -> Result<T>
    where
        F: FnOnce(&SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        self.submit(move |conn| conn.savepoint(&name, body))
    }

    /// Stop accepting work, finish what was already accepted, and close the
    /// connection. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.on_worker() {
            return Err(queue_error(
                QueueErrorKind::Reentrant,
                "cannot close a queue from its own worker",
            ));
        }
        self.inner.shut_down()
    }
}

impl PartialEq for SerializedAccessQueue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SerializedAccessQueue {}

impl Hash for SerializedAccessQueue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for SerializedAccessQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedAccessQueue")
            .field("id", &self.inner.id)
            .field("thread", &self.inner.thread_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_worker(id: u64, mut conn: SqliteConnection, jobs: &mpsc::Receiver<Job>) {
    tracing::trace!(queue_id = id, "Serialized queue worker running");
    let mut completed: u64 = 0;
    while let Ok(job) = jobs.recv() {
        job(&mut conn);
        completed += 1;
    }
    if let Err(e) = conn.close() {
        tracing::warn!(queue_id = id, error = %e, "Failed to close connection on queue shutdown");
    }
    tracing::debug!(queue_id = id, completed, "Serialized queue worker stopped");
}

fn queue_error(kind: QueueErrorKind, message: &str) -> Error {
    Error::Queue(QueueError {
        kind,
        message: message.to_string(),
    })
}

fn closed() -> Error {
    queue_error(QueueErrorKind::Closed, "queue is closed")
}
