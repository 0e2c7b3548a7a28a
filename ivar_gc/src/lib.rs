//! Collector contract for the ivar attribute storage engine.
//!
//! The engine does not own a garbage collector. It exposes two callbacks the
//! collector drives:
//!
//! - **Mark**: every live object reports the values in its occupied slots and
//!   its current shape through a [`Tracer`]. Reporting the shape keeps the
//!   shape and all of its ancestors alive in the shape tree.
//!
//! - **Move**: after compaction, every retained object reference is rewritten
//!   through a [`Mover`], and external tables keyed by object identity are
//!   re-keyed.
//!
//! # Usage
//!
//! ```ignore
//! use ivar_gc::{Trace, Tracer};
//!
//! struct Pair(Value, Value);
//!
//! impl Trace for Pair {
//!     fn trace(&self, tracer: &mut dyn Tracer) {
//!         tracer.trace_value(&self.0);
//!         tracer.trace_value(&self.1);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compact;
pub mod trace;

pub use compact::{Compact, ForwardingTable, IdentityMover, Mover};
pub use trace::{CountingTracer, NullTracer, Trace, Tracer};
