use std::fmt::Write as _;

bitflags::bitflags! {
    /// Memory access permission flags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryAccess: u8 {
        /// Read permission.
        const R = 0b001;

        /// Write permission.
        const W = 0b010;

        /// Execute permission.
        const X = 0b100;

        /// Combined Read and Write permissions.
        const RW = Self::R.bits() | Self::W.bits();

        /// Full access: Read, Write, and Execute permissions.
        const RWX = Self::R.bits() | Self::W.bits() | Self::X.bits();
    }
}

impl std::fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (flag, c) in [
            (MemoryAccess::R, 'r'),
            (MemoryAccess::W, 'w'),
            (MemoryAccess::X, 'x'),
        ] {
            f.write_char(if self.contains(flag) { c } else { '-' })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(MemoryAccess::RWX.to_string(), "rwx");
        assert_eq!(MemoryAccess::X.to_string(), "--x");
        assert_eq!(MemoryAccess::RW.to_string(), "rw-");
    }
}
