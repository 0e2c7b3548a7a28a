//! Object tracing for garbage collection.
//!
//! The `Trace` trait is the mark-side interface between attribute storage
//! and the collector.

pub mod tracer;

pub use tracer::{CountingTracer, NullTracer, Tracer};

use ivar_core::Value;

/// Trait for types that hold values the collector must see.
///
/// Implementations must:
/// 1. Report ALL values they hold, skipping only unset slots
/// 2. Report the shape they are laid out by, if any
pub trait Trace {
    /// Visit all values (and the shape) held by this object.
    fn trace(&self, tracer: &mut dyn Tracer);

    /// Returns true if this object must run a finalization hook before
    /// its memory is reclaimed.
    ///
    /// Default: false
    #[inline]
    fn needs_finalization(&self) -> bool {
        false
    }

    /// Get the size of the attribute storage in bytes (for statistics).
    ///
    /// Default: size_of::<Self>()
    #[inline]
    fn size_of(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

// =============================================================================
// Trace implementations for values and containers
// =============================================================================

impl Trace for Value {
    #[inline]
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.trace_value(self);
    }
}

impl<T: Trace> Trace for Option<T> {
    #[inline]
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.as_slice().trace(tracer);
    }

    fn size_of(&self) -> usize {
        std::mem::size_of::<Vec<T>>() + self.capacity() * std::mem::size_of::<T>()
    }
}

impl<T: Trace> Trace for Box<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        (**self).trace(tracer);
    }

    fn size_of(&self) -> usize {
        std::mem::size_of::<Box<T>>() + (**self).size_of()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_slots_are_skipped() {
        let mut tracer = CountingTracer::new();
        let slots: Vec<Option<Value>> = vec![Some(Value::Nil), None, Some(Value::Int(42))];
        slots.trace(&mut tracer);
        assert_eq!(tracer.value_count, 2);
        assert_eq!(tracer.shape_count, 0);
    }

    #[test]
    fn test_vec_size_counts_capacity() {
        let slots: Vec<Option<Value>> = Vec::with_capacity(8);
        assert!(slots.size_of() >= 8 * std::mem::size_of::<Option<Value>>());
    }
}
