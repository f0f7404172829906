#![forbid(unsafe_code)]

//! Real-time collaborative text editing core.
//!
//! Many clients edit one document concurrently; a per-document [`Binder`]
//! serializes their submissions into a single canonical history using
//! operational transformation and fans committed edits out to every
//! subscriber, so every client's view converges to the same text. A
//! [`Curator`] maps document ids to live binders; [`DocumentStore`]
//! implementations persist content behind periodic flushes.

pub mod auth;
pub mod binder;
pub mod config;
pub mod core;
pub mod curator;
pub mod error;
pub mod store;
pub mod telemetry;

pub use error::{Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working set at the crate root for convenience.
pub use crate::binder::{
    Binder, BinderClosed, BinderConfig, BinderFault, Closed, SubmitError, SubscriberId,
    SubscriberPort,
};
pub use crate::core::{
    DocId, Document, Limits, OTransform, TransformError, apply, transform, transform_stack,
};
pub use crate::curator::{Curator, Locator, LocatorError};
pub use crate::store::{DocumentStore, FileStore, MemoryStore, StoreError};
