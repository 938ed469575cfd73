use std::sync::atomic::{AtomicU8, Ordering};

use shadowbp_core::{Hypervisor, Pa, Va, PAGE_SIZE};

/// The backing frame of a shadow page.
///
/// Page-aligned so the frame occupies exactly one host physical page; the
/// bytes are atomics because a VM-exit handler may inspect a byte while an
/// install on another processor plants a breakpoint into the same frame.
#[repr(C, align(4096))]
struct PageFrame([AtomicU8; PAGE_SIZE]);

/// A host-private copy of one guest page.
///
/// The frame never moves and must never be paged out: the guest reaches it
/// through its physical address, which is resolved once at allocation and
/// stays valid for the page's lifetime.
pub struct ShadowPage {
    frame: Box<PageFrame>,
    pa: Pa,
}

impl ShadowPage {
    /// Allocates a zeroed shadow page and resolves its physical address.
    pub fn new<H>(hv: &H) -> Self
    where
        H: Hypervisor,
    {
        let frame = Box::new(PageFrame(
            [const { AtomicU8::new(0) }; PAGE_SIZE],
        ));
        let pa = hv.pa_of(Va(frame.0.as_ptr() as u64));

        Self { frame, pa }
    }

    /// Returns the host physical address of the backing frame.
    pub fn pa(&self) -> Pa {
        self.pa
    }

    /// Copies a guest page image into the frame.
    pub fn fill(&self, image: &[u8; PAGE_SIZE]) {
        for (slot, byte) in self.frame.0.iter().zip(image) {
            slot.store(*byte, Ordering::Relaxed);
        }
    }

    /// Reads one byte of the frame.
    pub fn byte(&self, offset: usize) -> u8 {
        self.frame.0[offset].load(Ordering::Relaxed)
    }

    /// Writes one byte of the frame.
    pub fn write_byte(&self, offset: usize, value: u8) {
        self.frame.0[offset].store(value, Ordering::Relaxed);
    }
}
