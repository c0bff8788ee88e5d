//! Linked-list transfers: a chain of blocks built once, replayed by the
//! hardware in one pass.

use core::ptr::NonNull;

use super::{
    block_count, registry::IsrBinding, CallbackEntry, ChannelConfig, ChannelRegistry,
    DescriptorArena, Dma, DmaDescriptor, DmaError, RegisterAccess, TransferConfig, TransferEvent,
    TransferState,
};
use crate::sync::Locked;

struct Inner<'d, A, const CHANNELS: usize> {
    regs: A,
    registry: &'d ChannelRegistry<CHANNELS>,
    number: u8,
    arena: DescriptorArena<'d>,
    control: super::DmaDescriptorFlags,
    state: TransferState,
    queued: usize,
    // Set by `clear`: the next `append` starts a fresh chain at index 0.
    fresh: bool,
    callback: Option<CallbackEntry>,
}

impl<'d, A, const CHANNELS: usize> Inner<'d, A, CHANNELS> {
    fn cursor_reset_pending(&self) -> bool {
        self.fresh || matches!(self.state, TransferState::Done | TransferState::Error)
    }
}

/// A channel replaying a descriptor chain exactly once per `execute`.
///
/// The chain is built up front with `append` and is not chatty: however
/// long it is, the completion callback fires exactly once, when the last
/// descriptor finishes. `clear` cancels a run but keeps the built chain, so
/// `execute` re-arms the same chain deterministically as long as no
/// `append` happened in between.
pub struct ListChannel<'d, A: RegisterAccess, const CHANNELS: usize = 8> {
    shared: Locked<Inner<'d, A, CHANNELS>>,
    registry: &'d ChannelRegistry<CHANNELS>,
    number: u8,
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> ListChannel<'d, A, CHANNELS> {
    /// Claim `config.channel` in `registry`; the chain lives in `arena`.
    pub fn new(
        registry: &'d ChannelRegistry<CHANNELS>,
        mut regs: A,
        config: ChannelConfig,
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
                fresh: false,
                callback: None,
            }),
            registry,
            number: config.channel,
        })
    }

    /// Arena capacity, the maximum chain length.
    pub fn capacity(&self) -> usize {
        self.shared.with(|ch| ch.arena.capacity())
    }

    /// Clock feeding the channel's controller.
    pub fn clock(&self) -> fugit::HertzU32 {
        self.shared.with(|ch| ch.regs.clock())
    }
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> crate::private::Sealed
    for ListChannel<'d, A, CHANNELS>
{
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> Dma for ListChannel<'d, A, CHANNELS> {
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
        self.shared.with(|ch| ch.callback = Some((callback, argument)));
    }

    fn append(
        &mut self,
        destination: *mut u8,
        source: *const u8,
        len: usize,
    ) -> Result<(), DmaError> {
        self.shared.with(|ch| {
            if ch.state == TransferState::Busy {
                return Err(DmaError::NotReady);
            }

            if ch.cursor_reset_pending() {
                ch.queued = 0;
                ch.fresh = false;
            }
            if ch.queued == ch.arena.capacity() {
                return Err(DmaError::OutOfDescriptors);
            }

            let count = block_count(&ch.control, destination, source, len)?;
            let index = ch.queued;

            let mut flags = ch.control;
            flags.set_count(count);
            // Only the chain tail raises the completion interrupt.
            flags.set_int_en(true);

            if index > 0 {
                let previous = ch.arena.entry_mut(index - 1);
                previous.next = Some(index as u16);
                previous.flags.set_int_en(false);
            }

            *ch.arena.entry_mut(index) = DmaDescriptor {
                flags,
                source: source as usize,
                destination: destination as usize,
                next: None,
            };

            ch.queued = index + 1;
            ch.state = TransferState::Ready;
            Ok(())
        })
    }

    fn execute(&mut self) -> Result<(), DmaError> {
        self.shared.with(|ch| {
            if ch.state == TransferState::Busy || ch.queued == 0 {
                Err(DmaError::NotReady)
            } else {
                Ok(())
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
            ch.fresh = false;
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
            if ch.state == TransferState::Busy {
                ch.regs.stop();
                ch.regs.acknowledge();
            }
            ch.state = TransferState::Idle;
            ch.fresh = true;
        });
    }

    fn status(&self) -> TransferState {
        self.shared.with(|ch| ch.state)
    }

    fn queued(&self) -> usize {
        // After `clear` the cursor is reset: the chain is retained for
        // re-execution but no longer reported.
        self.shared.with(|ch| if ch.fresh { 0 } else { ch.queued })
    }

    fn residue(&self) -> Option<usize> {
        self.shared.with(|ch| match ch.state {
            TransferState::Idle | TransferState::Ready => None,
            _ => Some(ch.regs.residue() as usize),
        })
    }
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> Drop for ListChannel<'d, A, CHANNELS> {
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
        // Mid-chain descriptors do not interrupt; the chain notifies once,
        // at its end.
        if ch.state != TransferState::Busy || event == TransferEvent::Progress {
            return None;
        }

        ch.registry.unbind(ch.number as usize);
        ch.state = match event {
            TransferEvent::Error => TransferState::Error,
            _ => TransferState::Done,
        };
        trace!("dma channel {} chain complete: {:?}", ch.number, ch.state);
        ch.callback
    });

    if let Some((callback, argument)) = callback {
        callback(argument);
    }
}
