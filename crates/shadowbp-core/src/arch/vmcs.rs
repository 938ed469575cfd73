/// VMCS field encodings used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VmcsField {
    /// Primary processor-based VM-execution controls.
    PrimaryProcessorControls = 0x4002,

    /// Guest CR3.
    GuestCr3 = 0x6802,

    /// Guest RSP.
    GuestRsp = 0x681c,

    /// Guest RIP.
    GuestRip = 0x681e,

    /// Guest RFLAGS.
    GuestRflags = 0x6820,
}

/// The primary processor-based VM-execution controls.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorControls(pub u32);

impl ProcessorControls {
    const MONITOR_TRAP_FLAG: u32 = 1 << 27;

    /// Checks if the monitor trap flag is set.
    ///
    /// While set, the processor raises a VM-exit after the next guest
    /// instruction retires (or after an interrupt is delivered).
    pub fn monitor_trap_flag(self) -> bool {
        self.0 & Self::MONITOR_TRAP_FLAG != 0
    }

    /// Returns the controls with the monitor trap flag set or cleared.
    pub fn with_monitor_trap_flag(self, enable: bool) -> Self {
        if enable {
            Self(self.0 | Self::MONITOR_TRAP_FLAG)
        }
        else {
            Self(self.0 & !Self::MONITOR_TRAP_FLAG)
        }
    }
}

impl std::fmt::Debug for ProcessorControls {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ProcessorControls")
            .field("value", &format_args!("{:#x}", self.0))
            .field("monitor_trap_flag", &self.monitor_trap_flag())
            .finish()
    }
}
