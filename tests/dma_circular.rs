//! Circular engine tests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{bump, config, counter_arg, pump, soft};
use dmac::dma::{
    ChannelRegistry, CircularChannel, DescriptorArena, Dma, DmaError, RingConfig, TransferEvent,
    TransferState,
};
use dmac::dma_descriptors;

fn append_ring(
    channel: &mut CircularChannel<'_, common::SoftChannel>,
    destination: &mut [u8],
    source: &[u8],
    blocks: usize,
    block_len: usize,
) {
    for block in 0..blocks {
        channel
            .append(
                unsafe { destination.as_mut_ptr().add(block * block_len) },
                unsafe { source.as_ptr().add(block * block_len) },
                block_len,
            )
            .unwrap();
    }
}

#[test]
fn every_descriptor_notifies_and_the_index_wraps() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, state) = soft();
    let mut descriptors = dma_descriptors!(4);
    let mut channel = CircularChannel::new(
        &registry,
        regs,
        config(2),
        RingConfig::default(),
        DescriptorArena::new(&mut descriptors),
    )
    .unwrap();

    let hits = AtomicUsize::new(0);
    channel.set_callback(bump, counter_arg(&hits));

    let source = [0u8; 64];
    let mut destination = [0u8; 64];
    append_ring(&mut channel, &mut destination, &source, 4, 16);
    assert_eq!(channel.queued(), 4);

    channel.execute().unwrap();

    // The ring tail links back to the head and every entry interrupts.
    {
        let state = state.borrow();
        assert_eq!(state.chain[3].next(), Some(0));
        assert!(state.chain.iter().all(|entry| entry.interrupts()));
    }

    assert_eq!(pump(&registry, 2, &state, 10), 10);
    assert_eq!(hits.load(Ordering::Relaxed), 10);
    assert_eq!(channel.active_index(), 10 % 4);
    assert_eq!(channel.status(), TransferState::Busy);
}

#[test]
fn silent_ring_notifies_once_per_lap() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, state) = soft();
    let mut descriptors = dma_descriptors!(4);
    let mut channel = CircularChannel::new(
        &registry,
        regs,
        config(2),
        RingConfig {
            oneshot: false,
            silent: true,
        },
        DescriptorArena::new(&mut descriptors),
    )
    .unwrap();

    let hits = AtomicUsize::new(0);
    channel.set_callback(bump, counter_arg(&hits));

    let source = [0u8; 64];
    let mut destination = [0u8; 64];
    append_ring(&mut channel, &mut destination, &source, 4, 16);
    channel.execute().unwrap();

    // Only the wrap point carries an interrupt flag.
    {
        let state = state.borrow();
        assert!(!state.chain[0].interrupts());
        assert!(!state.chain[1].interrupts());
        assert!(!state.chain[2].interrupts());
        assert!(state.chain[3].interrupts());
    }

    assert_eq!(pump(&registry, 2, &state, 4), 1);
    assert_eq!(hits.load(Ordering::Relaxed), 1);
    assert_eq!(channel.active_index(), 0);

    assert_eq!(pump(&registry, 2, &state, 4), 1);
    assert_eq!(hits.load(Ordering::Relaxed), 2);
    assert_eq!(channel.status(), TransferState::Busy);
}

#[test]
fn oneshot_ring_stops_after_one_lap() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, state) = soft();
    let mut descriptors = dma_descriptors!(3);
    let mut channel = CircularChannel::new(
        &registry,
        regs,
        config(2),
        RingConfig {
            oneshot: true,
            silent: false,
        },
        DescriptorArena::new(&mut descriptors),
    )
    .unwrap();

    let hits = AtomicUsize::new(0);
    channel.set_callback(bump, counter_arg(&hits));

    let source = [0u8; 48];
    let mut destination = [0u8; 48];
    append_ring(&mut channel, &mut destination, &source, 3, 16);
    channel.execute().unwrap();

    assert_eq!(state.borrow().chain[2].next(), None);

    assert_eq!(pump(&registry, 2, &state, 3), 3);
    assert_eq!(hits.load(Ordering::Relaxed), 3);
    assert_eq!(channel.status(), TransferState::Done);
    assert!(!state.borrow().running);
    assert_eq!(channel.active_index(), 0);
}

#[test]
fn ring_refills_while_running_up_to_capacity() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, _state) = soft();
    let mut descriptors = dma_descriptors!(4);
    let mut channel = CircularChannel::new(
        &registry,
        regs,
        config(2),
        RingConfig::default(),
        DescriptorArena::new(&mut descriptors),
    )
    .unwrap();

    let hits = AtomicUsize::new(0);
    channel.set_callback(bump, counter_arg(&hits));

    let source = [0u8; 64];
    let mut destination = [0u8; 64];
    append_ring(&mut channel, &mut destination, &source, 2, 16);
    channel.execute().unwrap();
    assert_eq!(channel.status(), TransferState::Busy);

    // Refill while the hardware runs: legal up to capacity.
    channel
        .append(
            unsafe { destination.as_mut_ptr().add(32) },
            unsafe { source.as_ptr().add(32) },
            16,
        )
        .unwrap();
    channel
        .append(
            unsafe { destination.as_mut_ptr().add(48) },
            unsafe { source.as_ptr().add(48) },
            16,
        )
        .unwrap();
    assert_eq!(channel.queued(), 4);
    assert_eq!(channel.status(), TransferState::Busy);

    assert_eq!(
        channel.append(destination.as_mut_ptr(), source.as_ptr(), 16),
        Err(DmaError::OutOfDescriptors)
    );

    // The hardware keeps consuming the grown ring.
    for _ in 0..6 {
        assert!(unsafe { registry.dispatch(2, TransferEvent::Progress) });
    }
    assert_eq!(hits.load(Ordering::Relaxed), 6);
    assert_eq!(channel.active_index(), 6 % 4);
}

#[test]
fn clear_stops_the_ring_before_resetting_it() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, state) = soft();
    let mut descriptors = dma_descriptors!(4);
    let mut channel = CircularChannel::new(
        &registry,
        regs,
        config(2),
        RingConfig::default(),
        DescriptorArena::new(&mut descriptors),
    )
    .unwrap();

    let source = [0u8; 64];
    let mut destination = [0u8; 64];
    append_ring(&mut channel, &mut destination, &source, 4, 16);
    channel.execute().unwrap();

    channel.clear();
    assert!(!state.borrow().running);
    assert_eq!(channel.queued(), 0);
    assert_eq!(channel.status(), TransferState::Idle);
    assert!(!unsafe { registry.dispatch(2, TransferEvent::Progress) });
}

#[test]
fn halt_finishes_the_ring_without_further_callbacks() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, state) = soft();
    let mut descriptors = dma_descriptors!(4);
    let mut channel = CircularChannel::new(
        &registry,
        regs,
        config(2),
        RingConfig::default(),
        DescriptorArena::new(&mut descriptors),
    )
    .unwrap();

    let hits = AtomicUsize::new(0);
    channel.set_callback(bump, counter_arg(&hits));

    let source = [0u8; 64];
    let mut destination = [0u8; 64];
    append_ring(&mut channel, &mut destination, &source, 4, 16);
    channel.execute().unwrap();

    assert_eq!(pump(&registry, 2, &state, 2), 2);
    assert_eq!(hits.load(Ordering::Relaxed), 2);

    channel.halt();
    assert_eq!(channel.status(), TransferState::Done);
    assert!(!state.borrow().running);
    assert!(!unsafe { registry.dispatch(2, TransferEvent::Progress) });
    assert_eq!(hits.load(Ordering::Relaxed), 2);
}

#[test]
fn set_callback_rewrites_the_ring_interrupt_flags() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, state) = soft();
    let mut descriptors = dma_descriptors!(4);
    let mut channel = CircularChannel::new(
        &registry,
        regs,
        config(2),
        RingConfig::default(),
        DescriptorArena::new(&mut descriptors),
    )
    .unwrap();

    let source = [0u8; 64];
    let mut destination = [0u8; 64];
    append_ring(&mut channel, &mut destination, &source, 4, 16);

    // Without a callback nothing interrupts: the ring free-runs.
    channel.execute().unwrap();
    assert!(state.borrow().chain.iter().all(|entry| !entry.interrupts()));
    assert_eq!(pump(&registry, 2, &state, 4), 0);

    channel.halt();

    let hits = AtomicUsize::new(0);
    channel.set_callback(bump, counter_arg(&hits));
    channel.execute().unwrap();
    assert!(state.borrow().chain.iter().all(|entry| entry.interrupts()));
}
