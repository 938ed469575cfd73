use std::sync::Arc;

use shadowbp_core::{Hypervisor, ThreadId, Va};
use spin::Mutex;

use crate::record::{BreakpointKind, BreakpointRecord};

/// The set of all installed breakpoints.
///
/// A flat sequence scanned under a single spin lock; the population is tens
/// to low hundreds of hooks, so linear lookups beat the bookkeeping of an
/// index. Lookups clone the record handle out of the critical section, so no
/// reference into the sequence outlives the lock.
pub struct BreakpointRegistry<H>
where
    H: Hypervisor,
{
    records: Mutex<Vec<Arc<BreakpointRecord<H>>>>,
}

impl<H> BreakpointRegistry<H>
where
    H: Hypervisor,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Finds the record patched at exactly the given address.
    pub fn find_by_address(&self, va: Va) -> Option<Arc<BreakpointRecord<H>>> {
        self.records
            .lock()
            .iter()
            .find(|record| record.patch_address() == va)
            .cloned()
    }

    /// Finds any record patched on the page containing the given address.
    pub fn find_by_page(&self, va: Va) -> Option<Arc<BreakpointRecord<H>>> {
        self.records
            .lock()
            .iter()
            .find(|record| record.covers_page_of(va))
            .cloned()
    }

    /// Finds the post record already armed for the given thread on the page
    /// containing the given address.
    pub fn find_duplicate_post(&self, va: Va, tid: ThreadId) -> Option<Arc<BreakpointRecord<H>>> {
        self.records
            .lock()
            .iter()
            .find(|record| {
                record.kind() == BreakpointKind::Post
                    && record.covers_page_of(va)
                    && record.target_tid() == Some(tid)
            })
            .cloned()
    }

    /// Adds a record.
    pub fn insert(&self, record: Arc<BreakpointRecord<H>>) {
        let mut records = self.records.lock();
        records.push(record);

        tracing::debug!(total = records.len(), "breakpoint inserted");
    }

    /// Removes the record matching the given one by patch address and
    /// target thread, if present.
    pub fn remove(&self, record: &BreakpointRecord<H>) {
        let mut records = self.records.lock();

        let index = records.iter().position(|other| {
            other.patch_address() == record.patch_address()
                && other.target_tid() == record.target_tid()
        });

        if let Some(index) = index {
            records.remove(index);

            tracing::debug!(
                va = %record.patch_address(),
                total = records.len(),
                "breakpoint removed"
            );
        }
    }

    /// Returns a copy of the current record handles.
    ///
    /// Used by the hypercall targets to walk every record without holding
    /// the lock across EPT updates.
    pub fn snapshot(&self) -> Vec<Arc<BreakpointRecord<H>>> {
        self.records.lock().clone()
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Returns the number of installed records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Checks if no records are installed.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl<H> Default for BreakpointRegistry<H>
where
    H: Hypervisor,
{
    fn default() -> Self {
        Self::new()
    }
}
