//! Per-vCPU single-step machinery.
//!
//! While the monitor trap flag is armed the guest's interrupt-enable flag is
//! forced clear. MTF fires after one instruction *or* one interrupt-vector
//! dispatch; if the host OS injects a timer interrupt on VM-entry, the trap
//! would fire inside the interrupt handler and the exec view would come back
//! before the patched instruction ran, looping the breakpoint forever.
//! Masking interrupts for the single stepped instruction closes that window.

use std::sync::Arc;

use shadowbp_core::{Hypervisor, ProcessorControls, Rflags, VcpuId, VmcsField};
use spin::Mutex;

use crate::record::BreakpointRecord;

/// A single step in flight on one vCPU.
struct SingleStep<H>
where
    H: Hypervisor,
{
    record: Arc<BreakpointRecord<H>>,
    saved_if: bool,
}

/// Tracks which vCPUs are single-stepping and over which record.
///
/// Each slot is only ever touched from its own vCPU's exit handlers, so the
/// per-slot locks are never contended; they exist to keep the container
/// shareable across the exit entry points.
pub(crate) struct MtfController<H>
where
    H: Hypervisor,
{
    slots: Box<[Mutex<Option<SingleStep<H>>>]>,
}

impl<H> MtfController<H>
where
    H: Hypervisor,
{
    pub fn new(vcpu_count: usize) -> Self {
        let slots = (0..vcpu_count).map(|_| Mutex::new(None)).collect();

        Self { slots }
    }

    /// Arms the monitor trap flag on the current vCPU and stashes the record
    /// to restore at the matching MTF exit.
    pub fn arm(&self, hv: &H, record: Arc<BreakpointRecord<H>>) {
        let vcpu = hv.current_vcpu();

        let controls = ProcessorControls(hv.vmcs_read(VmcsField::PrimaryProcessorControls) as u32)
            .with_monitor_trap_flag(true);
        hv.vmcs_write(VmcsField::PrimaryProcessorControls, controls.0 as u64);

        let rflags = Rflags(hv.vmcs_read(VmcsField::GuestRflags));
        let saved_if = rflags.interrupt_enable();
        hv.vmcs_write(
            VmcsField::GuestRflags,
            rflags.with_interrupt_enable(false).0,
        );

        let mut slot = self.slots[vcpu.index()].lock();
        debug_assert!(slot.is_none(), "single step already in flight");
        *slot = Some(SingleStep { record, saved_if });

        tracing::trace!(%vcpu, "monitor trap armed");
    }

    /// Disarms the monitor trap flag on the current vCPU, restores the
    /// guest's interrupt-enable flag, and yields the stashed record.
    pub fn disarm(&self, hv: &H) -> Option<Arc<BreakpointRecord<H>>> {
        let vcpu = hv.current_vcpu();

        let step = self.slots[vcpu.index()].lock().take()?;

        let controls = ProcessorControls(hv.vmcs_read(VmcsField::PrimaryProcessorControls) as u32)
            .with_monitor_trap_flag(false);
        hv.vmcs_write(VmcsField::PrimaryProcessorControls, controls.0 as u64);

        let rflags = Rflags(hv.vmcs_read(VmcsField::GuestRflags))
            .with_interrupt_enable(step.saved_if);
        hv.vmcs_write(VmcsField::GuestRflags, rflags.0);

        tracing::trace!(%vcpu, "monitor trap disarmed");
        Some(step.record)
    }

    /// Checks if a single step is in flight on the given vCPU.
    pub fn armed(&self, vcpu: VcpuId) -> bool {
        self.slots[vcpu.index()].lock().is_some()
    }
}
