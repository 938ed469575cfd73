use std::sync::Arc;

use shadowbp_core::{GpRegisters, Hypervisor, Pa, ThreadId, Va};
use smallvec::SmallVec;
use spin::Mutex;

use crate::{engine::ShadowEngine, page::ShadowPage};

/// The breakpoint instruction.
pub const BREAKPOINT_OPCODE: u8 = 0xcc;

/// Where in a routine's lifetime a breakpoint fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    /// At the routine's entry point.
    Pre,

    /// At a return address, for the thread that performed the call.
    Post,
}

/// Integer arguments captured by a pre hook for its post twin.
#[derive(Debug, Default, Clone)]
pub struct CapturedParameters {
    args: SmallVec<[u64; 6]>,
}

impl CapturedParameters {
    /// Captures a snapshot of argument values.
    pub fn capture(args: impl IntoIterator<Item = u64>) -> Self {
        Self {
            args: args.into_iter().collect(),
        }
    }

    /// Returns the captured values.
    pub fn args(&self) -> &[u64] {
        &self.args
    }
}

/// What a breakpoint handler sees when its breakpoint fires.
///
/// Handlers run in VMX root mode with the guest CR3 loaded, so guest
/// pointers found in `regs` can be dereferenced directly. A pre handler
/// plants its return-site hook through [`engine`].
///
/// [`engine`]: Self::engine
pub struct HookContext<'a, H>
where
    H: Hypervisor,
{
    /// The engine that dispatched the breakpoint.
    pub engine: &'a ShadowEngine<H>,

    /// EPT structures of the current vCPU.
    pub ept: &'a mut H::Ept,

    /// The record whose breakpoint fired.
    pub record: &'a Arc<BreakpointRecord<H>>,

    /// Guest general-purpose registers; writes are reflected on VM-entry.
    pub regs: &'a mut GpRegisters,

    /// Guest RSP at the exit.
    pub guest_sp: Va,
}

/// A breakpoint handler.
pub type HookFn<H> = Arc<dyn Fn(&mut HookContext<'_, H>) + Send + Sync>;

/// The handler pair registered for one hooked routine.
pub struct BreakpointTarget<H>
where
    H: Hypervisor,
{
    /// Runs when the routine is entered.
    pub pre_handler: HookFn<H>,

    /// Runs when the routine returns to its caller.
    pub post_handler: HookFn<H>,
}

/// One installed breakpoint.
///
/// Records on the same guest page hold the same two [`ShadowPage`]s, so
/// every patch on the page is present in the one exec copy the guest
/// fetches from.
pub struct BreakpointRecord<H>
where
    H: Hypervisor,
{
    patch_address: Va,
    kind: BreakpointKind,
    target_tid: Option<ThreadId>,
    exec_copy: Arc<ShadowPage>,
    rw_copy: Arc<ShadowPage>,
    handler: HookFn<H>,
    post_handler: Option<HookFn<H>>,
    name: String,
    parameters: Mutex<CapturedParameters>,
}

impl<H> BreakpointRecord<H>
where
    H: Hypervisor,
{
    pub(crate) fn new(
        patch_address: Va,
        kind: BreakpointKind,
        target_tid: Option<ThreadId>,
        exec_copy: Arc<ShadowPage>,
        rw_copy: Arc<ShadowPage>,
        handler: HookFn<H>,
        post_handler: Option<HookFn<H>>,
        name: String,
        parameters: CapturedParameters,
    ) -> Self {
        Self {
            patch_address,
            kind,
            target_tid,
            exec_copy,
            rw_copy,
            handler,
            post_handler,
            name,
            parameters: Mutex::new(parameters),
        }
    }

    /// Returns the patched guest virtual address.
    pub fn patch_address(&self) -> Va {
        self.patch_address
    }

    /// Returns the kind of the breakpoint.
    pub fn kind(&self) -> BreakpointKind {
        self.kind
    }

    /// Returns the thread the breakpoint is armed for, on post records.
    pub fn target_tid(&self) -> Option<ThreadId> {
        self.target_tid
    }

    /// Returns the physical address of the exec copy.
    pub fn pa_exec(&self) -> Pa {
        self.exec_copy.pa()
    }

    /// Returns the physical address of the rw copy.
    pub fn pa_rw(&self) -> Pa {
        self.rw_copy.pa()
    }

    /// Returns the diagnostic name of the breakpoint.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the arguments captured for this record.
    pub fn parameters(&self) -> CapturedParameters {
        self.parameters.lock().clone()
    }

    /// Replaces the captured arguments.
    pub fn set_parameters(&self, parameters: CapturedParameters) {
        *self.parameters.lock() = parameters;
    }

    /// Reads the exec copy byte backing an address on the patched page.
    pub fn exec_byte_at(&self, va: Va) -> u8 {
        self.exec_copy.byte(va.page_offset())
    }

    /// Reads the rw copy byte backing an address on the patched page.
    ///
    /// A breakpoint opcode here belongs to the guest, not the engine: the rw
    /// copy only ever holds the bytes the guest itself put on the page.
    pub fn rw_byte_at(&self, va: Va) -> u8 {
        self.rw_copy.byte(va.page_offset())
    }

    /// Checks if an address lies on the patched page.
    pub fn covers_page_of(&self, va: Va) -> bool {
        self.patch_address.page_base() == va.page_base()
    }

    pub(crate) fn handler(&self) -> HookFn<H> {
        Arc::clone(&self.handler)
    }

    pub(crate) fn post_handler(&self) -> Option<HookFn<H>> {
        self.post_handler.clone()
    }

    pub(crate) fn shadow_pages(&self) -> (Arc<ShadowPage>, Arc<ShadowPage>) {
        (Arc::clone(&self.exec_copy), Arc::clone(&self.rw_copy))
    }
}

impl<H> std::fmt::Debug for BreakpointRecord<H>
where
    H: Hypervisor,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BreakpointRecord")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("patch_address", &self.patch_address)
            .field("target_tid", &self.target_tid)
            .finish()
    }
}
