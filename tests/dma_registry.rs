//! Channel registry tests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{bump, config, counter_arg, pump, soft};
use dmac::dma::{ChannelRegistry, Dma, DmaError, OneShotChannel, TransferEvent, TransferState};

#[test]
fn second_registration_fails_until_the_slot_is_released() {
    let registry = ChannelRegistry::<8>::new();

    assert!(registry.register(2));
    assert!(!registry.register(2));
    assert!(registry.is_registered(2));

    registry.unregister(2);
    assert!(!registry.is_registered(2));
    assert!(registry.register(2));
}

#[test]
fn channel_numbers_beyond_the_registry_are_rejected() {
    let registry = ChannelRegistry::<8>::new();

    assert!(!registry.register(8));
    assert!(!registry.is_registered(8));
    assert!(!unsafe { registry.dispatch(8, TransferEvent::Done) });
}

#[test]
fn ownership_conflicts_surface_at_construction() {
    let registry = ChannelRegistry::<8>::new();
    let (first_regs, state) = soft();
    let (second_regs, _) = soft();

    let mut first = OneShotChannel::new(&registry, first_regs, config(2)).unwrap();
    assert!(matches!(
        OneShotChannel::new(&registry, second_regs, config(2)),
        Err(DmaError::ChannelInUse)
    ));

    // The slot still routes to the first instance.
    let hits = AtomicUsize::new(0);
    first.set_callback(bump, counter_arg(&hits));

    let source = [0u8; 16];
    let mut destination = [0u8; 16];
    first
        .append(destination.as_mut_ptr(), source.as_ptr(), source.len())
        .unwrap();
    first.execute().unwrap();

    assert_eq!(pump(&registry, 2, &state, 1), 1);
    assert_eq!(first.status(), TransferState::Done);
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn dropping_an_engine_releases_its_channel() {
    let registry = ChannelRegistry::<8>::new();

    {
        let (regs, _state) = soft();
        let _channel = OneShotChannel::new(&registry, regs, config(4)).unwrap();
        assert!(registry.is_registered(4));
    }

    assert!(!registry.is_registered(4));
    let (regs, _state) = soft();
    assert!(OneShotChannel::new(&registry, regs, config(4)).is_ok());
}

#[test]
fn events_without_an_armed_transfer_are_spurious() {
    let registry = ChannelRegistry::<8>::new();
    let (regs, _state) = soft();
    let channel = OneShotChannel::new(&registry, regs, config(0)).unwrap();

    // Owned but not armed: nothing to notify.
    assert!(!unsafe { registry.dispatch(0, TransferEvent::Done) });
    assert_eq!(channel.status(), TransferState::Idle);
}
