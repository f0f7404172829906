//! Binder state: the single-writer model behind the serialization loop.
//!
//! Exactly one thread owns a `BinderState`; everything here is plain
//! sequential code, which is what keeps the document, the version counter
//! and the history window free of locks.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Sender, TrySendError};
use uuid::Uuid;

use crate::core::{self, DocId, Document, OTransform};
use crate::store::{DocumentStore, StoreError};

use super::port::{SubmitError, SubscriberId};
use super::run::BinderConfig;

/// Lifecycle of a binder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    /// Transient, while a synchronous store call is in flight.
    Flushing,
    Closed,
}

/// A flush failure surfaced out-of-band to whoever owns the binder.
/// Clients never see these; the binder stays dirty and retries.
#[derive(Debug)]
pub struct BinderFault {
    pub doc_id: DocId,
    pub error: StoreError,
}

pub(crate) struct SubscriberEntry {
    tx: Sender<Vec<OTransform>>,
    /// Version of the last batch accepted into this subscriber's channel.
    delivered: u64,
}

pub(crate) struct BinderState {
    document: Document,
    version: u64,
    /// Committed edits of this session, version-ordered and contiguous.
    history: VecDeque<OTransform>,
    subscribers: BTreeMap<SubscriberId, SubscriberEntry>,
    dirty: bool,
    lifecycle: Lifecycle,
    /// Set while the subscriber set is empty; drives the idle timeout.
    pub idle_since: Option<Instant>,
    config: BinderConfig,
    store: Arc<dyn DocumentStore>,
    fault_tx: Sender<BinderFault>,
}

impl BinderState {
    pub fn new(
        document: Document,
        version: u64,
        config: BinderConfig,
        store: Arc<dyn DocumentStore>,
        fault_tx: Sender<BinderFault>,
    ) -> Self {
        Self {
            document,
            version,
            history: VecDeque::new(),
            subscribers: BTreeMap::new(),
            dirty: false,
            lifecycle: Lifecycle::Running,
            idle_since: Some(Instant::now()),
            config,
            store,
            fault_tx,
        }
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn doc_id(&self) -> &DocId {
        &self.document.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Version of the oldest history entry still present; one past the
    /// current version when the window is empty.
    fn history_floor(&self) -> u64 {
        self.history
            .front()
            .map(|edit| edit.version)
            .unwrap_or(self.version + 1)
    }

    /// Serialize a batch into the committed history.
    ///
    /// Each edit is checked against the current version: too new is
    /// rejected, up to date is taken as-is, stale is transformed against
    /// every committed edit it has not seen. The whole batch commits
    /// atomically; on success the transformed batch and the committed
    /// version of its first edit are returned for broadcast and ack.
    pub fn commit(
        &mut self,
        edits: Vec<OTransform>,
    ) -> Result<(u64, Vec<OTransform>), SubmitError> {
        if edits.is_empty() {
            return Err(SubmitError::InvalidEdit {
                reason: "empty batch".to_string(),
            });
        }

        let mut content = self.document.content.clone();
        let mut len = content.chars().count();
        let mut version = self.version;
        let mut committed: Vec<OTransform> = Vec::with_capacity(edits.len());

        for edit in edits {
            if edit.version == 0 {
                return Err(SubmitError::InvalidEdit {
                    reason: "version must be positive".to_string(),
                });
            }
            if edit.version > version + 1 {
                return Err(SubmitError::VersionTooNew {
                    claimed: edit.version,
                    current: version,
                });
            }

            let mut edit = edit;
            if edit.version <= version {
                let floor = self.history_floor();
                if edit.version < floor {
                    return Err(SubmitError::InvalidEdit {
                        reason: format!(
                            "version {} predates the retained history (floor {floor})",
                            edit.version
                        ),
                    });
                }
                for old in self.history.iter().chain(committed.iter()) {
                    if old.version >= edit.version {
                        edit = core::transform(&edit, old);
                    }
                }
            }
            edit.version = version + 1;

            content = core::apply(&edit, &content).map_err(|err| SubmitError::InvalidEdit {
                reason: err.to_string(),
            })?;
            len = len - edit.delete + edit.insert_len();
            if let Some(max) = self.config.max_document_size {
                if len > max {
                    return Err(SubmitError::SizeLimit { max });
                }
            }

            version += 1;
            committed.push(edit);
        }

        let first_version = self.version + 1;
        self.document.content = content;
        self.version = version;
        self.history.extend(committed.iter().cloned());
        self.dirty = true;
        tracing::debug!(
            doc = %self.document.id,
            first_version,
            edits = committed.len(),
            "committed batch"
        );
        Ok((first_version, committed))
    }

    /// Register a new subscriber channel, caught up to the current version.
    pub fn register_subscriber(&mut self, tx: Sender<Vec<OTransform>>) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers.insert(
            id,
            SubscriberEntry {
                tx,
                delivered: self.version,
            },
        );
        self.idle_since = None;
        id
    }

    pub fn remove_subscriber(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
        self.note_idle();
    }

    /// Fan a committed batch out to every subscriber.
    ///
    /// Sends are non-blocking: a full outbound channel evicts its
    /// subscriber on the spot. The binder never waits for a consumer.
    pub fn broadcast(&mut self, batch: &[OTransform]) {
        let Some(last_version) = batch.last().map(|edit| edit.version) else {
            return;
        };
        let mut dropped = Vec::new();
        for (id, entry) in self.subscribers.iter_mut() {
            match entry.tx.try_send(batch.to_vec()) {
                Ok(()) => entry.delivered = last_version,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        doc = %self.document.id,
                        subscriber = %id,
                        "evicting subscriber with a full outbound channel"
                    );
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => dropped.push(*id),
            }
        }
        for id in dropped {
            self.subscribers.remove(&id);
        }
        self.note_idle();
    }

    /// Drop history no live subscriber can still need.
    pub fn trim_history(&mut self) {
        let floor = match self.subscribers.values().map(|sub| sub.delivered).min() {
            Some(min_delivered) => min_delivered.saturating_sub(self.config.history_safety_window),
            None => self.version,
        };
        while self.history.front().is_some_and(|edit| edit.version < floor) {
            self.history.pop_front();
        }
    }

    /// Write the document to the store if there is anything unwritten.
    /// Failures are reported on the fault channel and retried on the next
    /// flush; they are never fatal to clients.
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.lifecycle = Lifecycle::Flushing;
        match self.store.store(&self.document) {
            Ok(()) => {
                self.dirty = false;
                tracing::debug!(doc = %self.document.id, version = self.version, "flushed");
            }
            Err(error) => {
                tracing::error!(doc = %self.document.id, %error, "flush failed; retaining dirty state");
                let _ = self.fault_tx.send(BinderFault {
                    doc_id: self.document.id.clone(),
                    error,
                });
            }
        }
        self.lifecycle = Lifecycle::Running;
    }

    /// Final flush and eviction of every subscriber. Dropping the outbound
    /// senders is what clients observe as a closed stream.
    pub fn close(&mut self) {
        self.flush();
        self.subscribers.clear();
        self.history.clear();
        self.lifecycle = Lifecycle::Closed;
        tracing::info!(doc = %self.document.id, version = self.version, "binder closed");
    }

    fn note_idle(&mut self) {
        if self.subscribers.is_empty() {
            if self.idle_since.is_none() {
                self.idle_since = Some(Instant::now());
            }
        } else {
            self.idle_since = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel::Receiver;

    use crate::store::MemoryStore;

    use super::*;

    fn edit(position: usize, version: u64, delete: usize, insert: &str) -> OTransform {
        OTransform {
            position,
            version,
            delete,
            insert: insert.to_string(),
        }
    }

    fn state(content: &str, version: u64) -> (BinderState, Receiver<BinderFault>) {
        let (fault_tx, fault_rx) = crossbeam::channel::unbounded();
        let doc = Document::new(DocId::new("doc"), "", "", content);
        let state = BinderState::new(
            doc,
            version,
            BinderConfig::default(),
            Arc::new(MemoryStore::new()),
            fault_tx,
        );
        (state, fault_rx)
    }

    #[test]
    fn concurrent_inserts_at_the_same_position() {
        let (mut state, _) = state("", 0);

        let (v, batch) = state.commit(vec![edit(0, 1, 0, "A")]).unwrap();
        assert_eq!(v, 1);
        assert_eq!(batch, vec![edit(0, 1, 0, "A")]);

        // B authored against version 0 as well; it lands after A.
        let (v, batch) = state.commit(vec![edit(0, 1, 0, "B")]).unwrap();
        assert_eq!(v, 2);
        assert_eq!(batch, vec![edit(1, 2, 0, "B")]);

        assert_eq!(state.document().content, "AB");
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn overlapping_delete_is_absorbed() {
        let (mut state, _) = state("abcdef", 0);

        state.commit(vec![edit(1, 1, 3, "")]).unwrap();
        assert_eq!(state.document().content, "aef");

        let (v, batch) = state.commit(vec![edit(2, 1, 1, "X")]).unwrap();
        assert_eq!(v, 2);
        assert_eq!(batch, vec![edit(1, 2, 0, "X")]);
        assert_eq!(state.document().content, "aXef");
    }

    #[test]
    fn version_ahead_of_the_document_is_rejected() {
        let (mut state, _) = state("", 0);
        let err = state.commit(vec![edit(0, 2, 0, "x")]).unwrap_err();
        assert_eq!(
            err,
            SubmitError::VersionTooNew {
                claimed: 2,
                current: 0
            }
        );
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn batch_is_atomic_on_failure() {
        let (mut state, _) = state("abc", 0);
        // second edit is out of bounds even after the first applies
        let err = state
            .commit(vec![edit(0, 1, 0, "x"), edit(10, 2, 2, "")])
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidEdit { .. }));
        assert_eq!(state.document().content, "abc");
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn batch_versions_are_contiguous() {
        let (mut state, _) = state("", 0);
        let (first, batch) = state
            .commit(vec![edit(0, 1, 0, "a"), edit(1, 2, 0, "b"), edit(2, 3, 0, "c")])
            .unwrap();
        assert_eq!(first, 1);
        let versions: Vec<u64> = batch.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(state.document().content, "abc");
    }

    #[test]
    fn size_limit_rejects_oversized_content() {
        let (fault_tx, _fault_rx) = crossbeam::channel::unbounded();
        let mut config = BinderConfig::default();
        config.max_document_size = Some(4);
        let mut state = BinderState::new(
            Document::new(DocId::new("doc"), "", "", "abc"),
            0,
            config,
            Arc::new(MemoryStore::new()),
            fault_tx,
        );
        let err = state.commit(vec![edit(3, 1, 0, "de")]).unwrap_err();
        assert_eq!(err, SubmitError::SizeLimit { max: 4 });
        assert_eq!(state.document().content, "abc");
    }

    #[test]
    fn versions_below_the_trimmed_window_are_rejected() {
        let (mut state, _) = state("", 0);
        for v in 1..=3 {
            state.commit(vec![edit(0, v, 0, "x")]).unwrap();
        }
        // no subscribers: everything below the current version goes
        state.trim_history();
        let err = state.commit(vec![edit(0, 2, 0, "y")]).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidEdit { .. }));
        // the current version is still transformable
        state.commit(vec![edit(0, 3, 0, "y")]).unwrap();
    }

    #[test]
    fn slow_subscriber_is_evicted_on_full_channel() {
        let (mut state, _) = state("", 0);
        let (slow_tx, slow_rx) = crossbeam::channel::bounded(1);
        let (fast_tx, fast_rx) = crossbeam::channel::bounded(8);
        let slow = state.register_subscriber(slow_tx);
        let fast = state.register_subscriber(fast_tx);

        let (_, batch) = state.commit(vec![edit(0, 1, 0, "a")]).unwrap();
        state.broadcast(&batch);
        let (_, batch) = state.commit(vec![edit(0, 2, 0, "b")]).unwrap();
        state.broadcast(&batch);

        assert!(state.subscribers.contains_key(&fast));
        assert!(!state.subscribers.contains_key(&slow));
        // the slow channel holds the one batch it had room for, then closes
        assert_eq!(slow_rx.iter().count(), 1);
        assert_eq!(fast_rx.try_iter().count(), 2);
    }

    #[test]
    fn delivered_versions_drive_history_trim() {
        let (mut state, _) = state("", 0);
        let (tx, _rx) = crossbeam::channel::bounded(128);
        state.register_subscriber(tx);

        let window = state.config().history_safety_window;
        let commits = window + 20;
        for v in 1..=commits {
            let (_, batch) = state.commit(vec![edit(0, v, 0, "x")]).unwrap();
            state.broadcast(&batch);
        }
        state.trim_history();
        // delivered == commits, so the floor sits a safety window below it
        assert_eq!(state.history_floor(), commits - window);
    }

    #[test]
    fn flush_failure_reports_a_fault_and_stays_dirty() {
        struct FailingStore;
        impl DocumentStore for FailingStore {
            fn fetch(&self, id: &DocId) -> Result<Document, StoreError> {
                Err(StoreError::NotFound(id.clone()))
            }
            fn store(&self, _doc: &Document) -> Result<(), StoreError> {
                Err(StoreError::Io(std::io::Error::other("disk gone")))
            }
        }

        let (fault_tx, fault_rx) = crossbeam::channel::unbounded();
        let mut state = BinderState::new(
            Document::new(DocId::new("doc"), "", "", ""),
            0,
            BinderConfig::default(),
            Arc::new(FailingStore),
            fault_tx,
        );
        state.commit(vec![edit(0, 1, 0, "x")]).unwrap();
        state.flush();

        let fault = fault_rx.try_recv().unwrap();
        assert_eq!(fault.doc_id, DocId::new("doc"));
        assert!(state.dirty);
    }

    #[test]
    fn close_evicts_subscribers_and_flushes() {
        let (fault_tx, _fault_rx) = crossbeam::channel::unbounded();
        let store = Arc::new(MemoryStore::new());
        let mut state = BinderState::new(
            Document::new(DocId::new("doc"), "", "", ""),
            0,
            BinderConfig::default(),
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            fault_tx,
        );
        let (tx, rx) = crossbeam::channel::bounded(4);
        state.register_subscriber(tx);
        state.commit(vec![edit(0, 1, 0, "hi")]).unwrap();

        state.close();
        assert_eq!(state.lifecycle(), Lifecycle::Closed);
        assert!(rx.recv().is_err());
        assert_eq!(store.fetch(&DocId::new("doc")).unwrap().content, "hi");
    }
}
