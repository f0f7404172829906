//! Curator: the process-wide registry mapping document ids to live binders.
//!
//! One registry lock serializes every find/create, which guarantees at
//! most one live binder per document id even when two clients race to open
//! the same absent document. Binders that shut themselves down on idle are
//! reaped lazily and re-bound from the store on the next find.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam::channel::{Receiver, Sender};
use thiserror::Error;

use crate::auth::Authorizer;
use crate::binder::{Binder, BinderConfig, BinderFault, SubscriberPort};
use crate::core::{DocId, Document, Limits};
use crate::store::{DocumentStore, StoreError};

/// Resolve document ids to subscriber ports, materializing binders on
/// demand and tearing them down when the process shuts down.
pub trait Locator: Send + Sync {
    /// A fresh port on an existing document's binder.
    fn find(&self, doc_id: &DocId, token: &str) -> Result<SubscriberPort, LocatorError>;

    /// Instantiate a new document and a binder for it.
    fn create(
        &self,
        doc_id: &DocId,
        token: &str,
        title: &str,
        description: &str,
        content: &str,
    ) -> Result<SubscriberPort, LocatorError>;

    /// Close every binder.
    fn close(&self);
}

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("document not found: {0}")]
    NotFound(DocId),

    #[error("token rejected")]
    Unauthorized,

    #[error("document already exists: {0}")]
    Exists(DocId),

    #[error("binder refused a subscriber while shutting down")]
    BinderClosed,

    #[error(transparent)]
    Store(StoreError),
}

pub struct Curator {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn Authorizer>,
    config: BinderConfig,
    binders: Mutex<HashMap<DocId, Binder>>,
    fault_tx: Sender<BinderFault>,
    fault_rx: Receiver<BinderFault>,
}

impl Curator {
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<dyn Authorizer>, limits: &Limits) -> Self {
        let (fault_tx, fault_rx) = crossbeam::channel::unbounded();
        Self {
            store,
            auth,
            config: BinderConfig::from_limits(limits),
            binders: Mutex::new(HashMap::new()),
            fault_tx,
            fault_rx,
        }
    }

    /// Flush failures reported by binders. Hosts should drain this; the
    /// documents behind these faults keep retrying on their flush ticks.
    pub fn faults(&self) -> &Receiver<BinderFault> {
        &self.fault_rx
    }

    /// Bind `document` and subscribe, registering the binder under its id.
    /// Caller holds the registry lock.
    fn bind_and_subscribe(
        &self,
        binders: &mut HashMap<DocId, Binder>,
        document: Document,
    ) -> Result<SubscriberPort, LocatorError> {
        let doc_id = document.id.clone();
        let binder = Binder::bind(
            document,
            1,
            self.config.clone(),
            Arc::clone(&self.store),
            self.fault_tx.clone(),
        );
        let port = binder
            .subscribe()
            .map_err(|_| LocatorError::BinderClosed)?;
        binders.insert(doc_id, binder);
        Ok(port)
    }
}

impl Locator for Curator {
    fn find(&self, doc_id: &DocId, token: &str) -> Result<SubscriberPort, LocatorError> {
        if !self.auth.authorize_join(token, doc_id) {
            return Err(LocatorError::Unauthorized);
        }

        let mut binders = self.binders.lock().expect("binder registry lock");
        if let Some(binder) = binders.get(doc_id) {
            if !binder.is_closed() {
                if let Ok(port) = binder.subscribe() {
                    return Ok(port);
                }
            }
            // Idle-closed while registered; reap before re-binding.
            if let Some(stale) = binders.remove(doc_id) {
                stale.close();
            }
        }

        let document = self.store.fetch(doc_id).map_err(|err| match err {
            StoreError::NotFound(id) => LocatorError::NotFound(id),
            other => LocatorError::Store(other),
        })?;
        self.bind_and_subscribe(&mut binders, document)
    }

    fn create(
        &self,
        doc_id: &DocId,
        token: &str,
        title: &str,
        description: &str,
        content: &str,
    ) -> Result<SubscriberPort, LocatorError> {
        if !self.auth.authorize_create(token) {
            return Err(LocatorError::Unauthorized);
        }

        let mut binders = self.binders.lock().expect("binder registry lock");
        if binders.get(doc_id).is_some_and(|binder| !binder.is_closed()) {
            return Err(LocatorError::Exists(doc_id.clone()));
        }
        match self.store.fetch(doc_id) {
            Ok(_) => return Err(LocatorError::Exists(doc_id.clone())),
            Err(StoreError::NotFound(_)) => {}
            Err(other) => return Err(LocatorError::Store(other)),
        }

        let document = Document::new(doc_id.clone(), title, description, content);
        self.store
            .store(&document)
            .map_err(LocatorError::Store)?;
        self.bind_and_subscribe(&mut binders, document)
    }

    fn close(&self) {
        let drained: Vec<Binder> = {
            let mut binders = self.binders.lock().expect("binder registry lock");
            binders.drain().map(|(_, binder)| binder).collect()
        };
        for binder in drained {
            binder.close();
        }
    }
}
