//! Descriptor storage.
//!
//! An arena is a contiguous run of [`DmaDescriptor`]s exclusively owned by
//! one channel. Entries reference each other by index, so the backing
//! memory can be caller-supplied (a `static` or stack array) or, with the
//! `alloc` feature, a single heap allocation made at construction time.
//! Nothing is allocated on the transfer path.

use super::DmaDescriptor;
#[cfg(feature = "alloc")]
use super::DmaError;

enum Storage<'a> {
    Borrowed(&'a mut [DmaDescriptor]),
    #[cfg(feature = "alloc")]
    Owned(alloc::boxed::Box<[DmaDescriptor]>),
}

/// The descriptor arena backing a list or circular channel.
///
/// Capacity is fixed at construction; the engines guarantee
/// `queued <= capacity` and hardware is never pointed at entries beyond the
/// queued range.
pub struct DescriptorArena<'a> {
    storage: Storage<'a>,
}

impl<'a> DescriptorArena<'a> {
    /// Wrap caller-supplied backing storage. The entries are reset.
    pub fn new(entries: &'a mut [DmaDescriptor]) -> Self {
        debug_assert!(entries.len() <= 1 << 16);
        entries.fill(DmaDescriptor::EMPTY);
        Self {
            storage: Storage::Borrowed(entries),
        }
    }

    /// Allocate backing storage for `capacity` entries on the heap.
    ///
    /// This is the only allocation the engine ever makes; it is freed when
    /// the arena is dropped.
    #[cfg(feature = "alloc")]
    pub fn with_capacity(capacity: usize) -> Result<DescriptorArena<'static>, DmaError> {
        debug_assert!(capacity <= 1 << 16);

        let mut entries = alloc::vec::Vec::new();
        entries
            .try_reserve_exact(capacity)
            .map_err(|_| DmaError::AllocationFailed)?;
        entries.resize(capacity, DmaDescriptor::EMPTY);

        Ok(DescriptorArena {
            storage: Storage::Owned(entries.into_boxed_slice()),
        })
    }

    /// Number of entries the arena can hold.
    pub fn capacity(&self) -> usize {
        self.entries().len()
    }

    pub(crate) fn entries(&self) -> &[DmaDescriptor] {
        match &self.storage {
            Storage::Borrowed(entries) => entries,
            #[cfg(feature = "alloc")]
            Storage::Owned(entries) => entries,
        }
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> &mut DmaDescriptor {
        match &mut self.storage {
            Storage::Borrowed(entries) => &mut entries[index],
            #[cfg(feature = "alloc")]
            Storage::Owned(entries) => &mut entries[index],
        }
    }
}

impl<'a> From<&'a mut [DmaDescriptor]> for DescriptorArena<'a> {
    fn from(entries: &'a mut [DmaDescriptor]) -> Self {
        Self::new(entries)
    }
}
