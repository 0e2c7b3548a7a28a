//! Shape-tree based instance variable storage.
//!
//! This crate provides:
//! - The shape tree (hidden classes) with lock-free lookups and id reuse
//! - Embedded/array storage for general instances
//! - Keyed table storage for classes and modules
//! - Generic external storage for objects without a storage field
//! - The attribute access façade with frozen and isolation checks
//! - Mark, move and finalization hooks for the collector
//! - Shape-keyed inline caches
//!
//! # Example
//!
//! ```ignore
//! use ivar_runtime::{Object, Runtime, RuntimeConfig};
//! use ivar_core::{Name, Value};
//!
//! let rt = Runtime::new(RuntimeConfig::default())?;
//! let mut point = Object::new_instance();
//! rt.ivar_set(&mut point, Name::new("x"), Value::Int(1))?;
//! assert_eq!(rt.ivar_get(&point, Name::new("x"), Value::Nil)?, Value::Int(1));
//! ```

#![warn(clippy::all)]

/// Abort on a shape/storage inconsistency.
///
/// Logs at `error` level first so the report survives a caught panic.
macro_rules! invariant_violation {
    ($($arg:tt)+) => {{
        ::tracing::error!($($arg)+);
        panic!("ivar invariant violated: {}", format_args!($($arg)+))
    }};
}

pub mod config;
pub mod gc;
pub mod inline_cache;
pub mod ivar;
pub mod object;
pub mod runtime;

pub use config::{ConfigError, RuntimeConfig};
pub use gc::CollectStats;
pub use inline_cache::{AttrCache, PolyShapeIC, ShapeIC};
pub use object::shape::{Edge, Shape, ShapeStats, ShapeTree};
pub use object::{Object, ObjectFlags, ObjectHeader, ObjectKind};
pub use runtime::{Runtime, runtime};
