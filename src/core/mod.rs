//! Pure document model and edit algebra.

mod document;
mod limits;
mod transform;

pub use document::{DocId, Document};
pub use limits::Limits;
pub use transform::{OTransform, TransformError, apply, transform, transform_stack};
