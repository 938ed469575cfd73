mod address;
mod irql;
pub(crate) mod macros;
mod memory_access;
mod thread_id;
mod vcpu_id;

pub use self::{
    address::{Pa, Pfn, Va, PAGE_SHIFT, PAGE_SIZE},
    irql::Irql,
    memory_access::MemoryAccess,
    thread_id::ThreadId,
    vcpu_id::VcpuId,
};
