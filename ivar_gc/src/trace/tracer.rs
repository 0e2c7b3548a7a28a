//! Tracer interface for marking.

use ivar_core::{ShapeId, Value};

/// Tracer interface for visiting references during marking.
///
/// The collector calls the mark callback of each live object, which reports
/// its slot values and its current shape through this interface.
pub trait Tracer {
    /// Trace a value that may contain an object reference.
    fn trace_value(&mut self, value: &Value);

    /// Trace the shape an object is laid out by.
    ///
    /// Marking a shape keeps it and all of its ancestors reachable.
    fn trace_shape(&mut self, shape: ShapeId);
}

/// A null tracer that does nothing (for testing).
pub struct NullTracer;

impl Tracer for NullTracer {
    #[inline]
    fn trace_value(&mut self, _value: &Value) {}

    #[inline]
    fn trace_shape(&mut self, _shape: ShapeId) {}
}

/// A counting tracer for debugging and statistics.
pub struct CountingTracer {
    /// Number of values traced.
    pub value_count: usize,
    /// Number of object references among the traced values.
    pub object_count: usize,
    /// Number of shapes traced.
    pub shape_count: usize,
}

impl CountingTracer {
    /// Create a new counting tracer.
    pub fn new() -> Self {
        Self {
            value_count: 0,
            object_count: 0,
            shape_count: 0,
        }
    }

    /// Get total number of references traced.
    pub fn total(&self) -> usize {
        self.value_count + self.shape_count
    }
}

impl Default for CountingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for CountingTracer {
    fn trace_value(&mut self, value: &Value) {
        self.value_count += 1;
        if value.as_object().is_some() {
            self.object_count += 1;
        }
    }

    fn trace_shape(&mut self, _shape: ShapeId) {
        self.shape_count += 1;
    }
}
