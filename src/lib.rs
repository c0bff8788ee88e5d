//! # Descriptor-based DMA transfer engine
//!
//! ## Overview
//!
//! This crate implements the portable half of a microcontroller DMA driver:
//! the descriptor-chain bookkeeping, the channel-ownership registry and the
//! interrupt-to-callback completion path that are the same on every chip
//! family. The chip-specific half, the actual register pokes, plugs in
//! through the narrow [`dma::RegisterAccess`] trait, so a platform crate
//! only has to describe how its controller is started, stopped and queried.
//!
//! Three transfer engines are provided, all speaking the same [`dma::Dma`]
//! interface:
//!
//! - [`dma::OneShotChannel`]: a single contiguous block, executed once.
//! - [`dma::ListChannel`]: a chain of blocks built up with `append`,
//!   replayed exactly once end-to-end per `execute`.
//! - [`dma::CircularChannel`]: a ring of blocks the hardware loops through
//!   indefinitely, with per-buffer or per-lap completion notification.
//!
//! No operation in this crate blocks. `execute` arms the hardware and
//! returns; completion is delivered through a callback invoked from the
//! platform's interrupt handler via [`dma::ChannelRegistry::dispatch`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use dmac::dma::{
//!     ChannelConfig, ChannelRegistry, DescriptorArena, Dma, DmaDescriptor, DmaPriority,
//!     ListChannel, RegisterAccess, TransferDirection,
//! };
//!
//! // The platform side: how one physical channel is driven. Register
//! // writes omitted here.
//! struct Channel0;
//!
//! impl RegisterAccess for Channel0 {
//!     fn set_priority(&mut self, _priority: DmaPriority) {}
//!     fn set_request(&mut self, _direction: TransferDirection, _request: u8) {}
//!     fn start(&mut self, _arena: &[DmaDescriptor], _first: usize) {}
//!     fn stop(&mut self) {}
//!     fn is_running(&self) -> bool {
//!         false
//!     }
//!     fn acknowledge(&mut self) {}
//!     fn residue(&self) -> u32 {
//!         0
//!     }
//!     fn clock(&self) -> fugit::HertzU32 {
//!         fugit::HertzU32::from_raw(96_000_000)
//!     }
//! }
//!
//! static DMA: ChannelRegistry<8> = ChannelRegistry::new();
//!
//! fn main() -> Result<(), dmac::dma::DmaError> {
//!     let mut descriptors = dmac::dma_descriptors!(4);
//!     let mut channel = ListChannel::new(
//!         &DMA,
//!         Channel0,
//!         ChannelConfig {
//!             channel: 0,
//!             request: 0,
//!             direction: TransferDirection::MemoryToMemory,
//!             priority: DmaPriority::Priority0,
//!         },
//!         DescriptorArena::new(&mut descriptors),
//!     )?;
//!
//!     let source = [0u8; 64];
//!     let mut destination = [0u8; 64];
//!     channel.append(destination.as_mut_ptr(), source.as_ptr(), source.len())?;
//!     channel.execute()?;
//!     // ... the platform interrupt handler calls `DMA.dispatch(...)` on
//!     // completion, which runs the callback registered with
//!     // `set_callback` and moves the channel to `Done`.
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![no_std]
#![warn(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
mod fmt;

pub mod dma;
pub(crate) mod sync;

mod private {
    pub trait Sealed {}
}
