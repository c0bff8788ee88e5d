//! Channel ownership and interrupt routing.
//!
//! One registry instance tracks, per physical channel number, which single
//! software instance currently owns that channel. Registration is the only
//! admission-control mechanism: it is what prevents two instances from ever
//! programming the same channel concurrently. Firmware typically keeps one
//! registry in a `static`; host tests create one per test.

use core::ptr::NonNull;

use portable_atomic::{AtomicBool, Ordering};

use super::TransferEvent;
use crate::sync::Locked;

/// Interrupt-side handle to an armed channel: the engine's shared state and
/// the monomorphized event handler that interprets it.
pub(crate) struct IsrBinding {
    pub(crate) target: NonNull<()>,
    pub(crate) handler: unsafe fn(NonNull<()>, TransferEvent),
}

// The target pointer is only dereferenced by `dispatch`, inside the
// channel's interrupt handler, and every engine removes its binding before
// it can become stale.
unsafe impl Send for IsrBinding {}

struct Slot {
    claimed: AtomicBool,
    binding: Locked<Option<IsrBinding>>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            binding: Locked::new(None),
        }
    }
}

/// Tracks which software instance owns each physical DMA channel and routes
/// completion interrupts to it.
pub struct ChannelRegistry<const CHANNELS: usize = 8> {
    slots: [Slot; CHANNELS],
}

impl<const CHANNELS: usize> ChannelRegistry<CHANNELS> {
    /// Create a registry with every channel unowned.
    pub const fn new() -> Self {
        const EMPTY: Slot = Slot::new();
        Self {
            slots: [EMPTY; CHANNELS],
        }
    }

    /// Claim `channel` for a new instance.
    ///
    /// Returns `true` only if the slot was empty. Task context only.
    pub fn register(&self, channel: usize) -> bool {
        let Some(slot) = self.slots.get(channel) else {
            return false;
        };

        let claimed = slot
            .claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if claimed {
            debug!("dma channel {} claimed", channel);
        }
        claimed
    }

    /// Release `channel` unconditionally.
    ///
    /// The caller guarantees the channel is not busy. Task context only.
    pub fn unregister(&self, channel: usize) {
        let Some(slot) = self.slots.get(channel) else {
            return;
        };

        slot.binding.with(|binding| *binding = None);
        slot.claimed.store(false, Ordering::Release);
        debug!("dma channel {} released", channel);
    }

    /// Whether `channel` is currently owned.
    pub fn is_registered(&self, channel: usize) -> bool {
        self.slots
            .get(channel)
            .map(|slot| slot.claimed.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Route a channel event to the owning instance.
    ///
    /// Never blocks or allocates; interrupt context. Returns `false` when no
    /// transfer is armed on `channel` (a spurious or late interrupt).
    ///
    /// # Safety
    ///
    /// Every engine with an armed transfer on this registry must still be
    /// live at the address it was armed at. Engines uphold this by removing
    /// their binding on completion, `clear` and drop; the platform's
    /// interrupt adapter must only call this for interrupts belonging to
    /// `channel`.
    pub unsafe fn dispatch(&self, channel: usize, event: TransferEvent) -> bool {
        let Some(slot) = self.slots.get(channel) else {
            return false;
        };

        let Some((target, handler)) = slot
            .binding
            .with(|binding| binding.as_ref().map(|b| (b.target, b.handler)))
        else {
            return false;
        };

        // The handler takes the engine's own lock; invoking it outside the
        // registry's critical section keeps nested masking windows short.
        unsafe { handler(target, event) };
        true
    }

    pub(crate) fn bind(&self, channel: usize, binding: IsrBinding) {
        if let Some(slot) = self.slots.get(channel) {
            slot.binding.with(|slot| *slot = Some(binding));
        }
    }

    pub(crate) fn unbind(&self, channel: usize) {
        if let Some(slot) = self.slots.get(channel) {
            slot.binding.with(|slot| *slot = None);
        }
    }
}

impl<const CHANNELS: usize> Default for ChannelRegistry<CHANNELS> {
    fn default() -> Self {
        Self::new()
    }
}
