//! Isolation contexts.
//!
//! An isolation context is an independent execution context that may not
//! freely mutate (or, for unshareable state, read) another context's objects.
//! Each thread runs in exactly one context at a time; threads start in
//! [`ContextId::MAIN`]. A thread switches context with [`enter`], which
//! returns a guard restoring the previous context on drop.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of an isolation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ContextId(u32);

impl ContextId {
    /// The main context. Owns class and module state.
    pub const MAIN: Self = Self(0);

    /// Check if this is the main context.
    #[inline]
    pub const fn is_main(self) -> bool {
        self.0 == Self::MAIN.0
    }

    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static CURRENT: Cell<ContextId> = const { Cell::new(ContextId::MAIN) };
}

/// Allocate a new, non-main context.
pub fn new_context() -> ContextId {
    ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
}

/// Get the context the calling thread runs in.
#[inline]
pub fn current() -> ContextId {
    CURRENT.with(Cell::get)
}

/// Check if the calling thread runs in the main context.
#[inline]
pub fn is_main() -> bool {
    current().is_main()
}

/// Run the calling thread in `ctx` until the returned guard is dropped.
pub fn enter(ctx: ContextId) -> ContextGuard {
    let previous = CURRENT.with(|current| current.replace(ctx));
    ContextGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Restores the previous context when dropped.
///
/// Bound to the thread that created it.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: ContextId,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threads_start_in_main() {
        assert!(std::thread::spawn(is_main).join().unwrap());
    }

    #[test]
    fn test_enter_and_restore() {
        let ctx = new_context();
        assert!(!ctx.is_main());
        {
            let _guard = enter(ctx);
            assert_eq!(current(), ctx);
            {
                let _inner = enter(ContextId::MAIN);
                assert!(is_main());
            }
            assert_eq!(current(), ctx);
        }
        assert!(is_main());
    }

    #[test]
    fn test_contexts_are_distinct() {
        assert_ne!(new_context(), new_context());
    }
}
