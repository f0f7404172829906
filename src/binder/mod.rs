//! Per-document coordination.
//!
//! A binder owns the authoritative document, serializes concurrent edit
//! submissions through operational transformation, fans committed edits
//! out to every subscriber, evicts consumers that cannot keep up, flushes
//! dirty state to its store, and shuts itself down when idle.

mod core;
mod port;
mod run;

pub use self::core::{BinderFault, Lifecycle};
pub use port::{BinderClosed, Closed, SubmitError, SubscriberId, SubscriberPort};
pub use run::{Binder, BinderConfig};
