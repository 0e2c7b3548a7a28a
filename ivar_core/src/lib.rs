//! Shared vocabulary for the ivar attribute storage engine.
//!
//! This crate provides:
//! - Interned attribute names, including a reserved internal namespace
//! - The `Value` type stored in attribute slots
//! - Object and shape identifiers (`ObjectId`, `ShapeId`) and the reserved shape ids
//! - Isolation contexts and the thread-local current context
//! - The error taxonomy shared by every storage backend

pub mod context;
pub mod error;
pub mod ids;
pub mod name;
pub mod value;

pub use context::ContextId;
pub use error::{IsolationViolation, IvarError, IvarResult};
pub use ids::{ObjectId, ShapeId};
pub use name::Name;
pub use value::{ObjectRef, Value};
