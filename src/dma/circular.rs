//! Circular transfers: a descriptor ring the hardware loops through
//! indefinitely.
//!
//! With `silent` off, every completed descriptor raises the callback: the
//! classic multi-buffering scheme where the caller drains one buffer while
//! the hardware fills the next. With `silent` on, only the wrap back to
//! index 0 notifies, trading granularity for interrupt rate.

use core::ptr::NonNull;

use super::{
    block_count, registry::IsrBinding, CallbackEntry, ChannelConfig, ChannelRegistry,
    DescriptorArena, Dma, DmaDescriptor, DmaError, RegisterAccess, TransferConfig, TransferEvent,
    TransferState,
};
use crate::sync::Locked;

/// Ring behavior of a [`CircularChannel`].
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingConfig {
    /// Stop automatically after one full lap instead of looping.
    pub oneshot: bool,
    /// Suppress per-descriptor notification; the callback fires only when
    /// the ring wraps back to index 0.
    pub silent: bool,
}

struct Inner<'d, A, const CHANNELS: usize> {
    regs: A,
    registry: &'d ChannelRegistry<CHANNELS>,
    number: u8,
    arena: DescriptorArena<'d>,
    control: super::DmaDescriptorFlags,
    state: TransferState,
    queued: usize,
    // Ring position the hardware works on next, advanced by the interrupt
    // path. Approximate between interrupts in silent mode.
    index: usize,
    oneshot: bool,
    silent: bool,
    callback: Option<CallbackEntry>,
}

impl<'d, A, const CHANNELS: usize> Inner<'d, A, CHANNELS> {
    fn entry_int_en(&self, index: usize, tail: usize) -> bool {
        if index == tail {
            self.callback.is_some() || self.oneshot
        } else {
            self.callback.is_some() && !self.silent
        }
    }
}

/// A channel looping through a descriptor ring.
///
/// `append` is legal while the ring is running, up to the arena capacity,
/// so a completion callback can refill consumed entries without stopping
/// the hardware. This is the only mutation permitted during `Busy`; it runs
/// under the same critical section as the interrupt path.
pub struct CircularChannel<'d, A: RegisterAccess, const CHANNELS: usize = 8> {
    shared: Locked<Inner<'d, A, CHANNELS>>,
    registry: &'d ChannelRegistry<CHANNELS>,
    number: u8,
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> CircularChannel<'d, A, CHANNELS> {
    /// Claim `config.channel` in `registry`; the ring lives in `arena`.
    pub fn new(
        registry: &'d ChannelRegistry<CHANNELS>,
        mut regs: A,
        config: ChannelConfig,
        ring: RingConfig,
        arena: DescriptorArena<'d>,
    ) -> Result<Self, DmaError> {
        if arena.capacity() == 0 {
            return Err(DmaError::InvalidConfiguration);
        }
        if !registry.register(config.channel as usize) {
            return Err(DmaError::ChannelInUse);
        }

        regs.set_priority(config.priority);
        regs.set_request(config.direction, config.request);

        Ok(Self {
            shared: Locked::new(Inner {
                regs,
                registry,
                number: config.channel,
                arena,
                control: TransferConfig::default().control(),
                state: TransferState::Idle,
                queued: 0,
                index: 0,
                oneshot: ring.oneshot,
                silent: ring.silent,
                callback: None,
            }),
            registry,
            number: config.channel,
        })
    }

    /// Ring position the hardware works on next, modulo the ring length.
    pub fn active_index(&self) -> usize {
        self.shared.with(|ch| ch.index)
    }

    /// Arena capacity, the maximum ring length.
    pub fn capacity(&self) -> usize {
        self.shared.with(|ch| ch.arena.capacity())
    }

    /// Clock feeding the channel's controller.
    pub fn clock(&self) -> fugit::HertzU32 {
        self.shared.with(|ch| ch.regs.clock())
    }
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> crate::private::Sealed
    for CircularChannel<'d, A, CHANNELS>
{
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> Dma for CircularChannel<'d, A, CHANNELS> {
    fn configure(&mut self, config: &TransferConfig) -> Result<(), DmaError> {
        config.validate()?;
        self.shared.with(|ch| {
            if ch.state == TransferState::Busy {
                return Err(DmaError::NotReady);
            }
            ch.control = config.control();
            Ok(())
        })
    }

    fn set_callback(&mut self, callback: fn(*mut ()), argument: *mut ()) {
        self.shared.with(|ch| {
            debug_assert!(
                ch.state != TransferState::Busy,
                "callback changed while the ring is running"
            );
            ch.callback = Some((callback, argument));

            // Rebuilt entries pick the interrupt flags up on append; already
            // built ones are rewritten here.
            if ch.queued > 0 {
                let tail = ch.queued - 1;
                for index in 0..ch.queued {
                    let int_en = ch.entry_int_en(index, tail);
                    ch.arena.entry_mut(index).flags.set_int_en(int_en);
                }
            }
        })
    }

    fn append(
        &mut self,
        destination: *mut u8,
        source: *const u8,
        len: usize,
    ) -> Result<(), DmaError> {
        self.shared.with(|ch| {
            // The one legal mutation during Busy: refilling the ring, up to
            // capacity, without stopping the hardware.
            if matches!(ch.state, TransferState::Done | TransferState::Error) {
                ch.queued = 0;
                ch.index = 0;
            }
            if ch.queued == ch.arena.capacity() {
                return Err(DmaError::OutOfDescriptors);
            }

            let count = block_count(&ch.control, destination, source, len)?;
            let index = ch.queued;

            let mut flags = ch.control;
            flags.set_count(count);
            flags.set_int_en(ch.entry_int_en(index, index));

            *ch.arena.entry_mut(index) = DmaDescriptor {
                flags,
                source: source as usize,
                destination: destination as usize,
                // The ring tail links back to its head unless the ring
                // stops after one lap.
                next: if ch.oneshot { None } else { Some(0) },
            };

            if index > 0 {
                let int_en = ch.entry_int_en(index - 1, index);
                let previous = ch.arena.entry_mut(index - 1);
                previous.next = Some(index as u16);
                previous.flags.set_int_en(int_en);
            }

            ch.queued = index + 1;
            if ch.state != TransferState::Busy {
                ch.state = TransferState::Ready;
            }
            Ok(())
        })
    }

    fn execute(&mut self) -> Result<(), DmaError> {
        self.shared.with(|ch| {
            if matches!(ch.state, TransferState::Ready | TransferState::Done) {
                Ok(())
            } else {
                Err(DmaError::NotReady)
            }
        })?;

        self.registry.bind(
            self.number as usize,
            IsrBinding {
                target: NonNull::from(&self.shared).cast(),
                handler: on_event::<A, CHANNELS>,
            },
        );

        self.shared.with(|ch| {
            ch.state = TransferState::Busy;
            ch.index = 0;
            ch.regs.acknowledge();
            let queued = ch.queued;
            let (regs, arena) = (&mut ch.regs, &ch.arena);
            regs.start(&arena.entries()[..queued], 0);
        });

        Ok(())
    }

    fn halt(&mut self) {
        self.shared.with(|ch| {
            if ch.state == TransferState::Busy {
                ch.regs.stop();
                ch.state = TransferState::Done;
            }
        });
        self.registry.unbind(self.number as usize);
    }

    fn clear(&mut self) {
        self.registry.unbind(self.number as usize);
        self.shared.with(|ch| {
            // Stop the hardware before resetting the ring, so a late wrap
            // cannot run against a stale arena.
            if ch.state == TransferState::Busy {
                ch.regs.stop();
                ch.regs.acknowledge();
            }
            ch.queued = 0;
            ch.index = 0;
            ch.state = TransferState::Idle;
        });
    }

    fn status(&self) -> TransferState {
        self.shared.with(|ch| ch.state)
    }

    fn queued(&self) -> usize {
        self.shared.with(|ch| ch.queued)
    }

    fn residue(&self) -> Option<usize> {
        self.shared.with(|ch| match ch.state {
            TransferState::Idle | TransferState::Ready => None,
            _ => Some(ch.regs.residue() as usize),
        })
    }
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> Drop for CircularChannel<'d, A, CHANNELS> {
    fn drop(&mut self) {
        self.clear();
        self.registry.unregister(self.number as usize);
    }
}

unsafe fn on_event<A: RegisterAccess, const CHANNELS: usize>(
    target: NonNull<()>,
    event: TransferEvent,
) {
    let shared = unsafe { target.cast::<Locked<Inner<'static, A, CHANNELS>>>().as_ref() };

    let callback = shared.with(|ch| {
        if ch.state != TransferState::Busy {
            return None;
        }

        match event {
            TransferEvent::Progress => {
                // In silent mode the only interrupting entry is the tail,
                // so an event means the ring just wrapped.
                ch.index = if ch.silent {
                    0
                } else {
                    (ch.index + 1) % ch.queued
                };
            }
            TransferEvent::Done => {
                ch.registry.unbind(ch.number as usize);
                ch.index = (ch.index + 1) % ch.queued;
                ch.state = TransferState::Done;
                trace!("dma channel {} ring stopped", ch.number);
            }
            TransferEvent::Error => {
                ch.registry.unbind(ch.number as usize);
                ch.state = TransferState::Error;
                trace!("dma channel {} ring fault", ch.number);
            }
        }

        ch.callback
    });

    if let Some((callback, argument)) = callback {
        callback(argument);
    }
}
