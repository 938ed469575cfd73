/// The RFLAGS register.
///
/// Only the flags the engine manipulates are modeled; the rest of the image
/// passes through untouched.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Rflags(pub u64);

impl Rflags {
    const TRAP: u64 = 1 << 8;
    const INTERRUPT_ENABLE: u64 = 1 << 9;

    /// Checks if the Trap Flag (TF) is set.
    ///
    /// Set to enable single-step mode for debugging; clear to disable
    /// single-step mode.
    pub fn trap(self) -> bool {
        self.0 & Self::TRAP != 0
    }

    /// Checks if the Interrupt Enable Flag (IF) is set.
    ///
    /// Controls the response of the processor to maskable interrupt requests.
    pub fn interrupt_enable(self) -> bool {
        self.0 & Self::INTERRUPT_ENABLE != 0
    }

    /// Returns the image with the Interrupt Enable Flag (IF) set or cleared.
    pub fn with_interrupt_enable(self, enable: bool) -> Self {
        if enable {
            Self(self.0 | Self::INTERRUPT_ENABLE)
        }
        else {
            Self(self.0 & !Self::INTERRUPT_ENABLE)
        }
    }
}

impl std::fmt::Debug for Rflags {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Rflags")
            .field("value", &format_args!("{:#x}", self.0))
            .field("trap", &self.trap())
            .field("interrupt_enable", &self.interrupt_enable())
            .finish()
    }
}

impl From<u64> for Rflags {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Rflags> for u64 {
    fn from(value: Rflags) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_enable_toggles_only_if() {
        let flags = Rflags(0x202);
        assert!(flags.interrupt_enable());

        let masked = flags.with_interrupt_enable(false);
        assert!(!masked.interrupt_enable());
        assert_eq!(masked.0, 0x2);

        assert_eq!(masked.with_interrupt_enable(true), flags);
    }
}
