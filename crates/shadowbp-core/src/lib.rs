//! Core model for hypervisor-assisted invisible breakpoints.
//!
//! This crate defines the typed vocabulary shared by the breakpoint engine
//! and the hypervisor it is embedded into: guest address newtypes, VT-x
//! register and structure images, and the [`Hypervisor`] trait through which
//! the engine reaches VMCS fields, EPT entries, and host OS services without
//! owning any of them.

pub mod arch;
mod core;
mod error;
mod hypervisor;

pub use self::{
    arch::{EptEntry, GpRegisters, ProcessorControls, Rflags, VmcsField},
    core::{Irql, MemoryAccess, Pa, Pfn, ThreadId, Va, VcpuId, PAGE_SHIFT, PAGE_SIZE},
    error::HvError,
    hypervisor::{BugCheck, Hypercall, Hypervisor},
};
