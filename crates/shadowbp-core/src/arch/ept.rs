use crate::core::{MemoryAccess, Pfn};

/// A leaf entry of the extended page tables.
///
/// Bits 0..3 carry the read/write/execute permissions; bits 12..48 carry the
/// frame number of the host physical page the guest physical page maps to.
/// Remapping a guest page is a matter of rewriting the frame number while the
/// permissions steer which accesses reach it.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct EptEntry(pub u64);

impl EptEntry {
    const READ: u64 = 1 << 0;
    const WRITE: u64 = 1 << 1;
    const EXECUTE: u64 = 1 << 2;
    const PFN_MASK: u64 = 0x0000_ffff_ffff_f000;

    /// Creates a new entry from a raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Creates an entry mapping a frame onto itself with full access.
    pub fn identity(pfn: Pfn) -> Self {
        Self(Self::READ | Self::WRITE | Self::EXECUTE).with_pfn(pfn)
    }

    /// Checks if read access is allowed.
    pub fn read_access(self) -> bool {
        self.0 & Self::READ != 0
    }

    /// Checks if write access is allowed.
    pub fn write_access(self) -> bool {
        self.0 & Self::WRITE != 0
    }

    /// Checks if instruction fetches are allowed.
    pub fn execute_access(self) -> bool {
        self.0 & Self::EXECUTE != 0
    }

    /// Returns the entry with read access set or cleared.
    pub fn with_read_access(self, allow: bool) -> Self {
        self.with_bit(Self::READ, allow)
    }

    /// Returns the entry with write access set or cleared.
    pub fn with_write_access(self, allow: bool) -> Self {
        self.with_bit(Self::WRITE, allow)
    }

    /// Returns the entry with execute access set or cleared.
    pub fn with_execute_access(self, allow: bool) -> Self {
        self.with_bit(Self::EXECUTE, allow)
    }

    /// Returns the frame number the entry points at.
    pub fn pfn(self) -> Pfn {
        Pfn((self.0 & Self::PFN_MASK) >> 12)
    }

    /// Returns the entry pointing at a different frame.
    pub fn with_pfn(self, pfn: Pfn) -> Self {
        Self((self.0 & !Self::PFN_MASK) | ((pfn.0 << 12) & Self::PFN_MASK))
    }

    /// Returns the permissions as access flags.
    pub fn access(self) -> MemoryAccess {
        let mut access = MemoryAccess::empty();

        if self.read_access() {
            access |= MemoryAccess::R;
        }
        if self.write_access() {
            access |= MemoryAccess::W;
        }
        if self.execute_access() {
            access |= MemoryAccess::X;
        }

        access
    }

    fn with_bit(self, bit: u64, set: bool) -> Self {
        if set {
            Self(self.0 | bit)
        }
        else {
            Self(self.0 & !bit)
        }
    }
}

impl std::fmt::Debug for EptEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EptEntry")
            .field("access", &format_args!("{}", self.access()))
            .field("pfn", &self.pfn())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_bits() {
        let entry = EptEntry::identity(Pfn(0x1234));
        assert_eq!(entry.access(), MemoryAccess::RWX);

        let exec_only = entry.with_read_access(false).with_write_access(false);
        assert_eq!(exec_only.access(), MemoryAccess::X);
        assert_eq!(exec_only.pfn(), Pfn(0x1234));
    }

    #[test]
    fn pfn_rewrite_preserves_permissions() {
        let entry = EptEntry::identity(Pfn(0x1)).with_pfn(Pfn(0xabcde));
        assert_eq!(entry.pfn(), Pfn(0xabcde));
        assert_eq!(entry.access(), MemoryAccess::RWX);
    }
}
