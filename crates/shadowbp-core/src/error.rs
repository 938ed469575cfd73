use crate::core::{Pa, Va};

/// An error that can occur when working with the hypervisor.
#[derive(thiserror::Error, Debug)]
pub enum HvError {
    /// No extended page table leaf maps the given physical address.
    #[error("no EPT leaf entry maps {0}")]
    EptEntryNotFound(Pa),

    /// The guest page backing the given virtual address is not present.
    #[error("guest page not present at {0}")]
    PageNotPresent(Va),

    /// A hypercall returned a failure status.
    #[error("hypercall failed with status {0:#x}")]
    Hypercall(i64),

    /// The engine has been torn down.
    #[error("the engine is not active")]
    NotActive,

    /// Other error.
    #[error("{0}")]
    Other(&'static str),
}
