//! VT-x register and structure images.

mod ept;
mod registers;
mod rflags;
mod vmcs;

pub use self::{
    ept::EptEntry,
    registers::GpRegisters,
    rflags::Rflags,
    vmcs::{ProcessorControls, VmcsField},
};
