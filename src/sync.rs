//! Short interrupt-masked sections for state shared with interrupt handlers.

use core::cell::RefCell;

use critical_section::Mutex;

/// Interior-mutable state guarded by a critical section.
///
/// The closure passed to [`Locked::with`] runs with interrupts masked, so a
/// task-context read-modify-write of the guarded state cannot interleave
/// with the interrupt path. Closures must stay short to keep interrupt
/// latency bounded.
pub(crate) struct Locked<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Locked<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
