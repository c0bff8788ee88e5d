//! Software register back end used by the host tests.
//!
//! `SoftChannel` stands in for a chip's channel registers: `start` snapshots
//! the programmed descriptor chain, and `pump` walks that chain delivering
//! completion events through the registry exactly the way a platform
//! interrupt handler would: `Progress` while the channel keeps running,
//! `Done` when it runs off the end of its links.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dmac::dma::{
    ChannelConfig, ChannelRegistry, DmaDescriptor, DmaPriority, RegisterAccess, TransferDirection,
    TransferEvent,
};
use fugit::RateExtU32;

#[derive(Default)]
pub struct SoftState {
    pub running: bool,
    pub chain: Vec<DmaDescriptor>,
    pub cursor: usize,
    pub residue: u32,
    pub starts: usize,
    pub acks: usize,
    pub priority: Option<DmaPriority>,
    pub request: Option<(TransferDirection, u8)>,
}

pub struct SoftChannel(pub Rc<RefCell<SoftState>>);

pub fn soft() -> (SoftChannel, Rc<RefCell<SoftState>>) {
    let state = Rc::new(RefCell::new(SoftState::default()));
    (SoftChannel(state.clone()), state)
}

impl RegisterAccess for SoftChannel {
    fn set_priority(&mut self, priority: DmaPriority) {
        self.0.borrow_mut().priority = Some(priority);
    }

    fn set_request(&mut self, direction: TransferDirection, request: u8) {
        self.0.borrow_mut().request = Some((direction, request));
    }

    fn start(&mut self, arena: &[DmaDescriptor], first: usize) {
        let mut state = self.0.borrow_mut();
        state.chain = arena.to_vec();
        state.cursor = first;
        state.residue = arena[first].count() as u32;
        state.running = true;
        state.starts += 1;
    }

    fn stop(&mut self) {
        self.0.borrow_mut().running = false;
    }

    fn is_running(&self) -> bool {
        self.0.borrow().running
    }

    fn acknowledge(&mut self) {
        self.0.borrow_mut().acks += 1;
    }

    fn residue(&self) -> u32 {
        self.0.borrow().residue
    }

    fn clock(&self) -> fugit::HertzU32 {
        96_000_000u32.Hz()
    }
}

/// Simulate `completions` descriptor completions on `channel`, dispatching
/// an event for each completed descriptor that has its interrupt flag set.
/// Returns the number of events delivered.
pub fn pump(
    registry: &ChannelRegistry<8>,
    channel: usize,
    state: &Rc<RefCell<SoftState>>,
    completions: usize,
) -> usize {
    let mut delivered = 0;

    for _ in 0..completions {
        let entry = {
            let state = state.borrow();
            if !state.running {
                break;
            }
            state.chain[state.cursor]
        };

        // Advance the simulated hardware before raising the interrupt, as
        // real hardware would.
        match entry.next() {
            Some(next) => {
                let mut state = state.borrow_mut();
                state.cursor = next;
                state.residue = state.chain[next].count() as u32;
            }
            None => {
                let mut state = state.borrow_mut();
                state.running = false;
                state.residue = 0;
            }
        }

        if entry.interrupts() {
            let event = if state.borrow().running {
                TransferEvent::Progress
            } else {
                TransferEvent::Done
            };
            unsafe { registry.dispatch(channel, event) };
            delivered += 1;
        }
    }

    delivered
}

/// Simulate a hardware fault on `channel`.
pub fn fault(registry: &ChannelRegistry<8>, channel: usize, state: &Rc<RefCell<SoftState>>) {
    state.borrow_mut().running = false;
    unsafe { registry.dispatch(channel, TransferEvent::Error) };
}

/// Completion callback counting its invocations through the opaque
/// argument.
pub fn bump(argument: *mut ()) {
    let counter = unsafe { &*(argument as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn counter_arg(counter: &AtomicUsize) -> *mut () {
    counter as *const AtomicUsize as *mut ()
}

pub fn config(channel: u8) -> ChannelConfig {
    ChannelConfig {
        channel,
        request: 0,
        direction: TransferDirection::MemoryToMemory,
        priority: DmaPriority::Priority0,
    }
}
