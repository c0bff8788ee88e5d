//! # Direct Memory Access
//!
//! ## Overview
//!
//! The DMA engine moves data between memory regions and peripherals without
//! involving the CPU. This module holds the portable model of that engine:
//! transfer descriptors kept in an indexed [`DescriptorArena`], a
//! [`ChannelRegistry`] that enforces at-most-one-owner per physical channel,
//! and the three transfer engines ([`OneShotChannel`], [`ListChannel`],
//! [`CircularChannel`]) that drive a chip-specific back end through the
//! [`RegisterAccess`] trait.
//!
//! Descriptors reference each other by arena index, never by pointer, so an
//! arena can be bounds-checked and relocated between transfers. A back end
//! that feeds real hardware translates indices into whatever link format its
//! controller consumes when [`RegisterAccess::start`] is called.
#![warn(missing_docs)]

use fugit::HertzU32;

pub use self::{
    arena::DescriptorArena,
    circular::{CircularChannel, RingConfig},
    list::ListChannel,
    oneshot::OneShotChannel,
    registry::ChannelRegistry,
};

mod arena;
mod circular;
mod list;
mod oneshot;
mod registry;

/// Largest number of unit transfers a single descriptor can carry.
///
/// Matches the 16-bit transfer-count field of [`DmaDescriptorFlags`].
pub const MAX_TRANSFER_COUNT: usize = 65_535;

/// A burst may not move more than this many bytes at once in the portable
/// model; wider combinations are rejected at `configure` time.
const MAX_BURST_BYTES: usize = 512;

bitfield::bitfield! {
    /// Control word of a transfer descriptor.
    ///
    /// `count` is expressed in source-width units. `int_en` marks the
    /// descriptors whose completion raises the channel interrupt.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaDescriptorFlags(u32);

    u16;
    count, set_count: 15, 0;
    u8;
    src_width, set_src_width: 17, 16;
    dst_width, set_dst_width: 19, 18;
    src_burst, set_src_burst: 22, 20;
    dst_burst, set_dst_burst: 25, 23;
    src_inc, set_src_inc: 26;
    dst_inc, set_dst_inc: 27;
    int_en, set_int_en: 28;
}

/// A DMA transfer descriptor.
///
/// One hardware-consumable record: a source, a destination, a control word
/// and an optional link to the next descriptor, expressed as an index into
/// the owning arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaDescriptor {
    pub(crate) flags: DmaDescriptorFlags,
    pub(crate) source: usize,
    pub(crate) destination: usize,
    pub(crate) next: Option<u16>,
}

impl DmaDescriptor {
    /// An empty descriptor used to initialize an arena.
    pub const EMPTY: Self = Self {
        flags: DmaDescriptorFlags(0),
        source: 0,
        destination: 0,
        next: None,
    };

    /// Source address of this transfer step.
    pub fn source(&self) -> usize {
        self.source
    }

    /// Destination address of this transfer step.
    pub fn destination(&self) -> usize {
        self.destination
    }

    /// Number of unit transfers, in source-width units.
    pub fn count(&self) -> usize {
        self.flags.count() as usize
    }

    /// Arena index of the next descriptor in the chain, if any.
    pub fn next(&self) -> Option<usize> {
        self.next.map(usize::from)
    }

    /// Whether completing this descriptor raises the channel interrupt.
    pub fn interrupts(&self) -> bool {
        self.flags.int_en()
    }
}

/// DMA errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// The physical channel is already owned by another instance.
    ChannelInUse,
    /// The descriptor arena has no room for another entry.
    OutOfDescriptors,
    /// An address or length is not aligned to the configured transfer width.
    InvalidAlignment,
    /// Zero-length transfer, out-of-range transfer count, or an unsupported
    /// burst/width combination.
    InvalidConfiguration,
    /// The operation is not valid in the channel's current state.
    NotReady,
    /// The heap-backed arena could not be allocated.
    #[cfg(feature = "alloc")]
    AllocationFailed,
}

/// State of a transfer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    /// No transfer prepared.
    Idle,
    /// Descriptors are queued and the channel can be executed.
    Ready,
    /// Hardware is running the transfer program.
    Busy,
    /// The last transfer completed successfully.
    Done,
    /// The last transfer was aborted by a hardware fault.
    Error,
}

/// Interrupt-side classification of a channel event.
///
/// The platform interrupt handler reads its controller's status flags and
/// reduces them to one of these before calling
/// [`ChannelRegistry::dispatch`]: `Progress` when the channel raised an
/// interrupt but is still running (a mid-ring descriptor completion),
/// `Done` when it stopped cleanly, `Error` on a bus fault or descriptor
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferEvent {
    /// A descriptor completed; the channel is still running.
    Progress,
    /// The transfer program finished.
    Done,
    /// The transfer was aborted by the hardware.
    Error,
}

/// Width of a single unit transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferWidth {
    /// 8-bit transfers.
    Byte = 0,
    /// 16-bit transfers.
    HalfWord = 1,
    /// 32-bit transfers.
    Word = 2,
}

/// Number of unit transfers moved per bus grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum TransferBurst {
    Single   = 0,
    Burst4   = 1,
    Burst8   = 2,
    Burst16  = 3,
    Burst32  = 4,
    Burst64  = 5,
    Burst128 = 6,
    Burst256 = 7,
}

impl TransferBurst {
    fn transfers(self) -> usize {
        match self {
            TransferBurst::Single => 1,
            TransferBurst::Burst4 => 4,
            TransferBurst::Burst8 => 8,
            TransferBurst::Burst16 => 16,
            TransferBurst::Burst32 => 32,
            TransferBurst::Burst64 => 64,
            TransferBurst::Burst128 => 128,
            TransferBurst::Burst256 => 256,
        }
    }
}

/// Settings for one side (source or destination) of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferSide {
    /// Unit transfer width.
    pub width: TransferWidth,
    /// Burst length.
    pub burst: TransferBurst,
    /// Whether the address advances after each unit transfer. Peripheral
    /// FIFOs keep this off.
    pub increment: bool,
}

impl TransferSide {
    fn validate(&self) -> Result<(), DmaError> {
        if self.burst.transfers() << (self.width as usize) > MAX_BURST_BYTES {
            return Err(DmaError::InvalidConfiguration);
        }
        Ok(())
    }
}

impl Default for TransferSide {
    fn default() -> Self {
        Self {
            width: TransferWidth::Byte,
            burst: TransferBurst::Single,
            increment: true,
        }
    }
}

/// Runtime transfer settings, compiled into a control-word template by
/// [`Dma::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferConfig {
    /// Source-side settings.
    pub source: TransferSide,
    /// Destination-side settings.
    pub destination: TransferSide,
}

impl TransferConfig {
    pub(crate) fn validate(&self) -> Result<(), DmaError> {
        self.source.validate()?;
        self.destination.validate()
    }

    pub(crate) fn control(&self) -> DmaDescriptorFlags {
        let mut flags = DmaDescriptorFlags(0);
        flags.set_src_width(self.source.width as u8);
        flags.set_dst_width(self.destination.width as u8);
        flags.set_src_burst(self.source.burst as u8);
        flags.set_dst_burst(self.destination.burst as u8);
        flags.set_src_inc(self.source.increment);
        flags.set_dst_inc(self.destination.increment);
        flags
    }
}

/// Direction of a transfer, as seen by the request mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDirection {
    /// Memory to memory, no peripheral request involved.
    MemoryToMemory,
    /// Memory to a peripheral FIFO.
    MemoryToPeripheral,
    /// A peripheral FIFO to memory.
    PeripheralToMemory,
}

/// DMA channel priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum DmaPriority {
    Priority0 = 0,
    Priority1 = 1,
    Priority2 = 2,
    Priority3 = 3,
    Priority4 = 4,
    Priority5 = 5,
    Priority6 = 6,
    Priority7 = 7,
    Priority8 = 8,
    Priority9 = 9,
}

/// Constructor inputs common to every engine.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Physical channel number; the registry slot this instance claims.
    pub channel: u8,
    /// Platform-defined request/event source routed to the channel mux.
    pub request: u8,
    /// Transfer direction.
    pub direction: TransferDirection,
    /// Channel priority.
    pub priority: DmaPriority,
}

/// Completion hook: a function pointer plus the opaque argument it is
/// invoked with. Runs in interrupt context.
pub(crate) type CallbackEntry = (fn(*mut ()), *mut ());

/// The portable capability interface of a DMA channel.
///
/// Implemented by [`OneShotChannel`], [`ListChannel`] and
/// [`CircularChannel`]; call sites drive any of them through this trait
/// without knowing which engine (or which chip family) is behind it.
pub trait Dma: crate::private::Sealed {
    /// Rebuild the control-word template from `config`.
    ///
    /// Rejected with [`DmaError::NotReady`] while a transfer is running.
    fn configure(&mut self, config: &TransferConfig) -> Result<(), DmaError>;

    /// Register a completion hook invoked from interrupt context.
    ///
    /// `argument` is passed to `callback` verbatim; the engine never
    /// dereferences it.
    fn set_callback(&mut self, callback: fn(*mut ()), argument: *mut ());

    /// Queue one transfer block.
    ///
    /// `len` is in bytes and must be a multiple of both configured widths;
    /// both addresses must be aligned to their side's width.
    fn append(&mut self, destination: *mut u8, source: *const u8, len: usize)
        -> Result<(), DmaError>;

    /// Arm the hardware and return immediately.
    fn execute(&mut self) -> Result<(), DmaError>;

    /// Stop the hardware; a running transfer counts as finished.
    fn halt(&mut self);

    /// Cancel and reset the channel to [`TransferState::Idle`], discarding
    /// any pending completion. Valid in every state; the arena may be
    /// reused or freed once this returns.
    fn clear(&mut self);

    /// Current channel state.
    fn status(&self) -> TransferState;

    /// Number of queued descriptors.
    fn queued(&self) -> usize;

    /// Remaining transfer units of the active descriptor, once a transfer
    /// has been armed. The one-shot engine reports bytes.
    fn residue(&self) -> Option<usize>;
}

/// The chip-family side of a channel: how one physical channel is
/// programmed and queried.
///
/// Implementations are thin register adapters; all descriptor and state
/// bookkeeping stays in the portable engines. Every method is called with
/// the channel's interrupt source masked, so implementations need no
/// locking of their own.
pub trait RegisterAccess {
    /// Apply the channel priority.
    fn set_priority(&mut self, priority: DmaPriority);

    /// Route the request/event source to this channel.
    fn set_request(&mut self, direction: TransferDirection, request: u8);

    /// Program the channel from `arena[first]` and enable it. The hardware
    /// follows the descriptors' `next` links on its own.
    fn start(&mut self, arena: &[DmaDescriptor], first: usize);

    /// Force-disable the channel.
    fn stop(&mut self);

    /// Whether the channel is currently enabled and transferring. Interrupt
    /// adapters use this to tell a mid-ring descriptor completion
    /// ([`TransferEvent::Progress`]) from a terminal one
    /// ([`TransferEvent::Done`]).
    fn is_running(&self) -> bool;

    /// Clear the channel's pending interrupt flags.
    fn acknowledge(&mut self);

    /// Remaining transfer count of the descriptor the hardware is working
    /// on.
    fn residue(&self) -> u32;

    /// Clock feeding the controller; transfer-timing queries only, the
    /// engine never configures the clock tree.
    fn clock(&self) -> HertzU32;
}

/// Convenience macro to create a descriptor array for a [`DescriptorArena`].
///
/// ## Usage
/// ```rust,no_run
/// // Backing storage for a chain of up to 8 descriptors.
/// let mut descriptors = dmac::dma_descriptors!(8);
/// let arena = dmac::dma::DescriptorArena::new(&mut descriptors);
/// ```
#[macro_export]
macro_rules! dma_descriptors {
    ($count:expr) => {
        [$crate::dma::DmaDescriptor::EMPTY; $count]
    };
}

/// Validates one transfer block against the control template and returns
/// its transfer count in source-width units.
pub(crate) fn block_count(
    control: &DmaDescriptorFlags,
    destination: *mut u8,
    source: *const u8,
    len: usize,
) -> Result<u16, DmaError> {
    if destination.is_null() || source.is_null() || len == 0 {
        return Err(DmaError::InvalidConfiguration);
    }

    let src_align = 1usize << control.src_width();
    let dst_align = 1usize << control.dst_width();
    if source as usize % src_align != 0 || len % src_align != 0 {
        return Err(DmaError::InvalidAlignment);
    }
    if destination as usize % dst_align != 0 || len % dst_align != 0 {
        return Err(DmaError::InvalidAlignment);
    }

    let count = len >> control.src_width();
    if count > MAX_TRANSFER_COUNT {
        return Err(DmaError::InvalidConfiguration);
    }

    Ok(count as u16)
}
