//! Binder spawn and serialization loop.
//!
//! One dedicated thread per binder consumes every channel: submissions,
//! control messages, and a computed deadline tick covering the flush
//! period and the idle timeout. All state mutation happens on that thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};

use crate::core::{DocId, Document, Limits};
use crate::store::DocumentStore;

use super::core::{BinderFault, BinderState};
use super::port::{BinderClosed, Control, Submission, SubmitError, SubscriberPort};

/// Timer and capacity knobs for one binder, derived from [`Limits`].
#[derive(Clone, Debug)]
pub struct BinderConfig {
    pub flush_period: Duration,
    pub idle_timeout: Duration,
    pub outbound_buffer: usize,
    pub submission_buffer: usize,
    pub history_safety_window: u64,
    pub max_document_size: Option<usize>,
}

impl BinderConfig {
    pub fn from_limits(limits: &Limits) -> Self {
        Self {
            flush_period: Duration::from_millis(limits.flush_period_ms),
            idle_timeout: Duration::from_millis(limits.idle_timeout_ms),
            outbound_buffer: limits.outbound_buffer.max(1),
            submission_buffer: limits.submission_buffer.max(1),
            history_safety_window: limits.history_safety_window,
            max_document_size: limits.max_document_size,
        }
    }
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self::from_limits(&Limits::default())
    }
}

/// Handle onto a running binder thread.
///
/// Holding the handle keeps the submission channel alive; the thread still
/// shuts itself down on idle timeout, after which [`subscribe`](Self::subscribe)
/// reports [`BinderClosed`] and the owner is expected to re-bind.
pub struct Binder {
    doc_id: DocId,
    control_tx: Sender<Control>,
    closed: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Binder {
    /// Spawn a binder owning `document`, with `version` edits already in
    /// its past. Flush failures go out on `fault_tx`.
    pub fn bind(
        document: Document,
        version: u64,
        config: BinderConfig,
        store: Arc<dyn DocumentStore>,
        fault_tx: Sender<BinderFault>,
    ) -> Binder {
        let doc_id = document.id.clone();
        let (submit_tx, submit_rx) = crossbeam::channel::bounded(config.submission_buffer);
        let (control_tx, control_rx) = crossbeam::channel::unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let state = BinderState::new(document, version, config, store, fault_tx);

        let thread = {
            let closed = Arc::clone(&closed);
            let control_tx = control_tx.clone();
            std::thread::spawn(move || {
                run_loop(state, submit_tx, submit_rx, control_tx, control_rx);
                closed.store(true, Ordering::Release);
            })
        };
        tracing::info!(doc = %doc_id, version, "binder started");

        Binder {
            doc_id,
            control_tx,
            closed,
            thread: Mutex::new(Some(thread)),
        }
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Register a new subscriber and hand back its port.
    pub fn subscribe(&self) -> Result<SubscriberPort, BinderClosed> {
        let (respond, port_rx) = crossbeam::channel::bounded(1);
        self.control_tx
            .send(Control::Subscribe { respond })
            .map_err(|_| BinderClosed)?;
        port_rx.recv().map_err(|_| BinderClosed)
    }

    /// Graceful shutdown: drain, flush, evict subscribers, stop the
    /// thread. Safe to call more than once.
    pub fn close(&self) {
        let (respond, done) = crossbeam::channel::bounded(1);
        if self.control_tx.send(Control::Close { respond }).is_ok() {
            let _ = done.recv_timeout(Duration::from_secs(10));
        }
        if let Some(thread) = self.thread.lock().expect("binder join handle lock").take() {
            let _ = thread.join();
        }
    }
}

fn run_loop(
    mut state: BinderState,
    submit_tx: Sender<Submission>,
    submit_rx: Receiver<Submission>,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
) {
    let flush_period = state.config().flush_period;
    let idle_timeout = state.config().idle_timeout;
    let mut next_flush = Instant::now() + flush_period;

    loop {
        let idle_deadline = state.idle_since.map(|since| since + idle_timeout);
        let deadline = match idle_deadline {
            Some(idle) => next_flush.min(idle),
            None => next_flush,
        };
        let tick = crossbeam::channel::after(deadline.saturating_duration_since(Instant::now()));

        crossbeam::select! {
            recv(submit_rx) -> msg => {
                if let Ok(submission) = msg {
                    handle_submission(&mut state, submission);
                }
                // The loop itself holds a sender, so disconnection cannot
                // happen; nothing to do on Err.
            }
            recv(control_rx) -> msg => {
                match msg {
                    Ok(Control::Subscribe { respond }) => {
                        let port = open_port(&mut state, &submit_tx, &control_tx);
                        let _ = respond.send(port);
                    }
                    Ok(Control::Unsubscribe { id }) => {
                        state.remove_subscriber(&id);
                    }
                    Ok(Control::Close { respond }) => {
                        shutdown(&mut state, &submit_rx);
                        let _ = respond.send(());
                        return;
                    }
                    Err(_) => {
                        shutdown(&mut state, &submit_rx);
                        return;
                    }
                }
            }
            recv(tick) -> _ => {
                let now = Instant::now();
                if now >= next_flush {
                    state.flush();
                    next_flush = now + flush_period;
                }
                if idle_deadline.is_some_and(|idle| now >= idle)
                    && !state.has_subscribers()
                    && submit_rx.is_empty()
                    && control_rx.is_empty()
                {
                    tracing::info!(doc = %state.doc_id(), "idle timeout; shutting down");
                    shutdown(&mut state, &submit_rx);
                    return;
                }
            }
        }
    }
}

fn handle_submission(state: &mut BinderState, submission: Submission) {
    let Submission { edits, respond } = submission;
    match state.commit(edits) {
        Ok((first_version, batch)) => {
            // Ack before fan-out; the submitter sees its own batch arrive
            // on its outbound channel afterwards like everyone else.
            let _ = respond.send(Ok(first_version));
            state.broadcast(&batch);
            state.trim_history();
        }
        Err(err) => {
            let _ = respond.send(Err(err));
        }
    }
}

fn open_port(
    state: &mut BinderState,
    submit_tx: &Sender<Submission>,
    control_tx: &Sender<Control>,
) -> SubscriberPort {
    let (tx, outbound) = crossbeam::channel::bounded(state.config().outbound_buffer);
    let id = state.register_subscriber(tx);
    SubscriberPort::new(
        id,
        state.document().clone(),
        state.version(),
        submit_tx.clone(),
        control_tx.clone(),
        outbound,
    )
}

fn shutdown(state: &mut BinderState, submit_rx: &Receiver<Submission>) {
    // Anything still queued was never accepted; tell the submitters so.
    while let Ok(Submission { respond, .. }) = submit_rx.try_recv() {
        let _ = respond.send(Err(SubmitError::BinderClosed));
    }
    state.close();
}
