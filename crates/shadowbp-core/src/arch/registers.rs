/// Guest general-purpose registers captured at a VM-exit.
///
/// RSP and RIP live in the VMCS guest-state area and are read from there,
/// not from this snapshot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct GpRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}
