use std::time::Duration;

use crate::{
    arch::{EptEntry, VmcsField},
    core::{Irql, Pa, ThreadId, Va, VcpuId, PAGE_SIZE},
    error::HvError,
};

/// Hypercall numbers the embedding hypervisor must route back into the
/// engine while in VMX root mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Hypercall {
    /// Switch every staged breakpoint page to its execute-only shadow view.
    EnablePageShadowing = 1,

    /// Restore the identity mapping of every shadowed page.
    DisablePageShadowing = 2,
}

/// Reasons the engine gives up on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BugCheck {
    /// A breakpoint exit arrived at an IRQL where handlers cannot run.
    IrqlNotLessOrEqual,

    /// A monitor-trap exit arrived with no single-step in flight.
    SpuriousMonitorTrap,
}

/// A trait for embedding the engine into a hypervisor.
///
/// The engine owns no virtualization state of its own; everything it touches
/// (VMCS fields, EPT entries, processor registers, host OS services) goes
/// through this trait. Methods documented as *root mode* are only invoked
/// from VM-exit handlers, with interrupts disabled on the current logical
/// processor; they must complete in bounded time without touching pageable
/// memory. The remaining
/// methods are invoked from host kernel context at or below dispatch IRQL.
pub trait Hypervisor {
    /// Extended page table structures, owned per vCPU by the embedding
    /// hypervisor and handed to the engine at each VM-exit.
    type Ept;

    /// Returns the number of logical processors the guest runs on.
    fn vcpu_count(&self) -> usize;

    /// Returns the vCPU the caller is executing on. *Root mode.*
    fn current_vcpu(&self) -> VcpuId;

    /// Returns the guest thread that was running at the current exit.
    /// *Root mode.*
    fn current_thread(&self) -> ThreadId;

    /// Returns the IRQL the guest was interrupted at. *Root mode.*
    fn current_irql(&self) -> Irql;

    /// Resolves a host-mapped virtual address to its physical address.
    ///
    /// Shadow frames handed to this method must be non-pageable; the result
    /// is cached for the lifetime of the frame.
    fn pa_of(&self, va: Va) -> Pa;

    /// Copies one guest page into `buf`. Host kernel context, below
    /// dispatch IRQL; the page may be paged in on demand.
    fn read_page(&self, base: Va, buf: &mut [u8; PAGE_SIZE]) -> Result<(), HvError>;

    /// Reads the EPT leaf entry mapping the page that contains `pa`.
    /// *Root mode.*
    fn ept_entry(&self, ept: &Self::Ept, pa: Pa) -> Result<EptEntry, HvError>;

    /// Rewrites the EPT leaf entry mapping the page that contains `pa`.
    /// *Root mode.*
    fn set_ept_entry(&self, ept: &mut Self::Ept, pa: Pa, entry: EptEntry) -> Result<(), HvError>;

    /// Invalidates cached EPT translations for all contexts, on all logical
    /// processors. *Root mode.*
    fn invept_all(&self);

    /// Reads a VMCS field of the current vCPU. *Root mode.*
    fn vmcs_read(&self, field: VmcsField) -> u64;

    /// Writes a VMCS field of the current vCPU. *Root mode.*
    fn vmcs_write(&self, field: VmcsField, value: u64);

    /// Reads the CR3 of the current logical processor. *Root mode.*
    fn read_cr3(&self) -> u64;

    /// Writes the CR3 of the current logical processor. *Root mode.*
    fn write_cr3(&self, value: u64);

    /// Writes back and invalidates the processor caches on all logical
    /// processors.
    ///
    /// Required after a shadow frame's bytes change, because the frame is
    /// about to be fetched at a guest physical identity it was not filled
    /// under.
    fn invalidate_caches(&self);

    /// Issues a hypercall from host kernel context, crossing into VMX root
    /// mode on the current processor.
    fn hypercall(&self, call: Hypercall) -> Result<(), HvError>;

    /// Blocks the calling host thread. Host kernel context only.
    fn sleep(&self, duration: Duration);

    /// Halts the machine. The engine calls this when continuing would
    /// corrupt guest state.
    fn bug_check(&self, reason: BugCheck) -> !;
}
