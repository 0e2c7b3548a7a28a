//! The runtime: shape tree plus the VM lock.
//!
//! All shared mutable state (shape transitions, id allocation and the generic
//! external table) sits behind a single mutex. It is held only for the
//! mutation itself; shape lookups read the arena without it.

use crate::config::{ConfigError, RuntimeConfig};
use crate::object::generic::GenericTable;
use crate::object::shape::{ShapeStats, ShapeTree, TransitionTable};
use parking_lot::{Mutex, MutexGuard};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// State guarded by the VM lock.
pub(crate) struct LockedState {
    pub(crate) transitions: TransitionTable,
    pub(crate) generic: GenericTable,
}

/// Attribute storage engine.
///
/// Attribute operations live in [`crate::ivar`], collector hooks in
/// [`crate::gc`].
pub struct Runtime {
    config: RuntimeConfig,
    pub(crate) shapes: ShapeTree,
    vm_lock: Mutex<LockedState>,
}

impl Runtime {
    /// Create a runtime.
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let shapes = ShapeTree::new(config.shape_capacity);
        let transitions = shapes.new_table();
        debug!(
            shape_capacity = config.shape_capacity,
            verify_class_ivars = config.verify_class_ivars,
            "runtime initialized"
        );
        Ok(Self {
            config,
            shapes,
            vm_lock: Mutex::new(LockedState {
                transitions,
                generic: GenericTable::new(),
            }),
        })
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the shape tree.
    #[inline]
    pub fn shapes(&self) -> &ShapeTree {
        &self.shapes
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, LockedState> {
        self.vm_lock.lock()
    }

    /// Get shape registry statistics.
    pub fn shape_stats(&self) -> ShapeStats {
        self.shapes.stats(&self.lock().transitions)
    }

    /// Number of objects with a generic external entry.
    pub fn generic_entries(&self) -> usize {
        self.lock().generic.len()
    }

    /// Render the shape tree as a Graphviz digraph.
    pub fn shape_graph(&self) -> String {
        let _guard = self.lock();
        self.shapes.to_dot()
    }
}

// =============================================================================
// Global Runtime Access
// =============================================================================

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get the process-wide runtime.
///
/// Configured from the environment on first use. An invalid override is
/// reported and the defaults are used instead.
pub fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let config = RuntimeConfig::from_env().unwrap_or_else(|err| {
            warn!(%err, "ignoring runtime configuration from the environment");
            RuntimeConfig::default()
        });
        match Runtime::new(config) {
            Ok(runtime) => runtime,
            Err(err) => invariant_violation!("default runtime configuration rejected: {err}"),
        }
    })
}
