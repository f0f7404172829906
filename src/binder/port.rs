//! Subscriber ports: the per-client handle onto a binder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use thiserror::Error;
use uuid::Uuid;

use crate::core::{Document, OTransform};

/// Identity of one subscriber within a binder.
pub type SubscriberId = Uuid;

/// A batch of edits travelling from a port into the binder loop, with the
/// reply channel the ack comes back on.
pub(crate) struct Submission {
    pub edits: Vec<OTransform>,
    pub respond: Sender<Result<u64, SubmitError>>,
}

/// Control-plane messages. These ride an unbounded channel of their own so
/// a saturated submission queue can never starve a subscribe or an
/// unsubscribe.
pub(crate) enum Control {
    Subscribe {
        respond: Sender<SubscriberPort>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
    Close {
        respond: Sender<()>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("edit claims version {claimed} but the document is at {current}")]
    VersionTooNew { claimed: u64, current: u64 },

    #[error("edit would grow the document past {max} code points")]
    SizeLimit { max: usize },

    #[error("edit rejected: {reason}")]
    InvalidEdit { reason: String },

    #[error("binder submission queue is full")]
    QueueFull,

    #[error("binder is closed")]
    BinderClosed,
}

/// The outbound stream ended: the binder closed or this port was evicted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("subscription closed")]
pub struct Closed;

/// The binder refused the request because it is shutting down or gone.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("binder is closed")]
pub struct BinderClosed;

/// One client's handle: a submission lane in, a broadcast stream out, and
/// the document snapshot taken at subscribe time.
///
/// Dropping the port unsubscribes it.
#[derive(Debug)]
pub struct SubscriberPort {
    id: SubscriberId,
    document: Document,
    version: u64,
    submit_tx: Sender<Submission>,
    control_tx: Sender<Control>,
    outbound: Receiver<Vec<OTransform>>,
    closed: AtomicBool,
}

impl SubscriberPort {
    pub(crate) fn new(
        id: SubscriberId,
        document: Document,
        version: u64,
        submit_tx: Sender<Submission>,
        control_tx: Sender<Control>,
        outbound: Receiver<Vec<OTransform>>,
    ) -> Self {
        Self {
            id,
            document,
            version,
            submit_tx,
            control_tx,
            outbound,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Document and version as observed at subscribe time. Broadcasts
    /// received on this port apply on top of exactly this snapshot.
    pub fn snapshot(&self) -> (&Document, u64) {
        (&self.document, self.version)
    }

    /// Submit a batch of edits; returns the committed version of the first.
    ///
    /// The enqueue is non-blocking (`QueueFull` when the binder is
    /// saturated); the wait for the ack is not.
    pub fn submit(&self, edits: Vec<OTransform>) -> Result<u64, SubmitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::BinderClosed);
        }
        let (respond, ack) = crossbeam::channel::bounded(1);
        match self.submit_tx.try_send(Submission { edits, respond }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(SubmitError::QueueFull),
            Err(TrySendError::Disconnected(_)) => return Err(SubmitError::BinderClosed),
        }
        match ack.recv() {
            Ok(result) => result,
            Err(_) => Err(SubmitError::BinderClosed),
        }
    }

    /// Next broadcast batch; blocks until one arrives or the stream closes.
    pub fn recv(&self) -> Result<Vec<OTransform>, Closed> {
        self.outbound.recv().map_err(|_| Closed)
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`, returning
    /// `Ok(None)`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<OTransform>>, Closed> {
        match self.outbound.recv_timeout(timeout) {
            Ok(batch) => Ok(Some(batch)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Closed),
        }
    }

    pub fn try_recv(&self) -> Result<Option<Vec<OTransform>>, Closed> {
        match self.outbound.try_recv() {
            Ok(batch) => Ok(Some(batch)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Closed),
        }
    }

    /// Unsubscribe from the binder; safe to call more than once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.control_tx.send(Control::Unsubscribe { id: self.id });
        }
    }
}

impl Drop for SubscriberPort {
    fn drop(&mut self) {
        self.close();
    }
}
