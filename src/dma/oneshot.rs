//! One-shot transfers: a single contiguous block, executed once.

use core::ptr::NonNull;
use core::slice;

use super::{
    block_count, registry::IsrBinding, CallbackEntry, ChannelConfig, ChannelRegistry, Dma,
    DmaDescriptor, DmaError, RegisterAccess, TransferConfig, TransferEvent, TransferState,
};
use crate::sync::Locked;

struct Inner<'d, A, const CHANNELS: usize> {
    regs: A,
    registry: &'d ChannelRegistry<CHANNELS>,
    number: u8,
    descriptor: DmaDescriptor,
    control: super::DmaDescriptorFlags,
    state: TransferState,
    callback: Option<CallbackEntry>,
}

/// A channel running single-block transfers.
///
/// `append` loads the block, `execute` arms it, the completion interrupt
/// moves the channel to `Done` or `Error` and runs the registered callback.
pub struct OneShotChannel<'d, A: RegisterAccess, const CHANNELS: usize = 8> {
    shared: Locked<Inner<'d, A, CHANNELS>>,
    registry: &'d ChannelRegistry<CHANNELS>,
    number: u8,
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> OneShotChannel<'d, A, CHANNELS> {
    /// Claim `config.channel` in `registry` and set the back end up.
    ///
    /// Fails with [`DmaError::ChannelInUse`] when the channel is already
    /// owned by another instance.
    pub fn new(
        registry: &'d ChannelRegistry<CHANNELS>,
        mut regs: A,
        config: ChannelConfig,
    ) -> Result<Self, DmaError> {
        if !registry.register(config.channel as usize) {
            return Err(DmaError::ChannelInUse);
        }

        regs.set_priority(config.priority);
        regs.set_request(config.direction, config.request);

        // A single block always raises the terminal interrupt.
        let mut control = TransferConfig::default().control();
        control.set_int_en(true);

        Ok(Self {
            shared: Locked::new(Inner {
                regs,
                registry,
                number: config.channel,
                descriptor: DmaDescriptor::EMPTY,
                control,
                state: TransferState::Idle,
                callback: None,
            }),
            registry,
            number: config.channel,
        })
    }

    /// Clock feeding the channel's controller.
    pub fn clock(&self) -> fugit::HertzU32 {
        self.shared.with(|ch| ch.regs.clock())
    }
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> crate::private::Sealed
    for OneShotChannel<'d, A, CHANNELS>
{
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> Dma for OneShotChannel<'d, A, CHANNELS> {
    fn configure(&mut self, config: &TransferConfig) -> Result<(), DmaError> {
        config.validate()?;
        self.shared.with(|ch| {
            if ch.state == TransferState::Busy {
                return Err(DmaError::NotReady);
            }
            ch.control = config.control();
            ch.control.set_int_en(true);
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

            let count = block_count(&ch.control, destination, source, len)?;
            let mut flags = ch.control;
            flags.set_count(count);

            ch.descriptor = DmaDescriptor {
                flags,
                source: source as usize,
                destination: destination as usize,
                next: None,
            };
            ch.state = TransferState::Ready;
            Ok(())
        })
    }

    fn execute(&mut self) -> Result<(), DmaError> {
        self.shared.with(|ch| {
            if ch.state == TransferState::Ready {
                Ok(())
            } else {
                Err(DmaError::NotReady)
            }
        })?;

        // Bind before starting, so a completion that fires immediately
        // already has somewhere to go.
        self.registry.bind(
            self.number as usize,
            IsrBinding {
                target: NonNull::from(&self.shared).cast(),
                handler: on_event::<A, CHANNELS>,
            },
        );

        self.shared.with(|ch| {
            ch.state = TransferState::Busy;
            ch.regs.acknowledge();
            let descriptor = ch.descriptor;
            ch.regs.start(slice::from_ref(&descriptor), 0);
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
        // Unbinding first discards a completion that is already pending.
        self.registry.unbind(self.number as usize);
        self.shared.with(|ch| {
            if ch.state == TransferState::Busy {
                ch.regs.stop();
                ch.regs.acknowledge();
            }
            ch.state = TransferState::Idle;
        });
    }

    fn status(&self) -> TransferState {
        self.shared.with(|ch| ch.state)
    }

    fn queued(&self) -> usize {
        self.shared.with(|ch| usize::from(ch.state != TransferState::Idle))
    }

    fn residue(&self) -> Option<usize> {
        self.shared.with(|ch| match ch.state {
            TransferState::Idle | TransferState::Ready => None,
            _ => {
                let width = ch.descriptor.flags.dst_width();
                Some((ch.regs.residue() as usize) << width)
            }
        })
    }
}

impl<'d, A: RegisterAccess, const CHANNELS: usize> Drop for OneShotChannel<'d, A, CHANNELS> {
    fn drop(&mut self) {
        self.clear();
        self.registry.unregister(self.number as usize);
    }
}

unsafe fn on_event<A: RegisterAccess, const CHANNELS: usize>(
    target: NonNull<()>,
    event: TransferEvent,
) {
    // Lifetimes are erased at the binding; the engine outlives its binding,
    // so 'static stands in for the erased lifetime.
    let shared = unsafe { target.cast::<Locked<Inner<'static, A, CHANNELS>>>().as_ref() };

    let callback = shared.with(|ch| {
        // A one-shot block is terminal by construction; anything else here
        // is a spurious interrupt.
        if ch.state != TransferState::Busy || event == TransferEvent::Progress {
            return None;
        }

        ch.registry.unbind(ch.number as usize);
        ch.state = match event {
            TransferEvent::Error => TransferState::Error,
            _ => TransferState::Done,
        };
        trace!("dma channel {} one-shot complete: {:?}", ch.number, ch.state);
        ch.callback
    });

    if let Some((callback, argument)) = callback {
        callback(argument);
    }
}
