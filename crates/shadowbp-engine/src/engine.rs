use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use shadowbp_core::{
    BugCheck, GpRegisters, HvError, Hypercall, Hypervisor, Irql, ThreadId, Va, VcpuId, VmcsField,
    PAGE_SIZE,
};

use crate::{
    mtf::MtfController,
    page::ShadowPage,
    record::{
        BreakpointKind, BreakpointRecord, BreakpointTarget, CapturedParameters, HookContext,
        HookFn, BREAKPOINT_OPCODE,
    },
    registry::BreakpointRegistry,
    shadow,
};

/// How long teardown waits for in-flight breakpoint/trap pairs to retire
/// before the records are dropped.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// The breakpoint engine.
///
/// Per vCPU the engine is a two-state machine. In the resting state every
/// patched page shows its exec copy and no single step is in flight; a
/// breakpoint or EPT-violation exit moves the faulting page to its rw copy
/// and arms the monitor trap flag; the matching MTF exit moves it back.
/// The two exits of a pair are never interleaved with other shadowing exits
/// on the same vCPU, because the stepped instruction runs with interrupts
/// masked.
pub struct ShadowEngine<H>
where
    H: Hypervisor,
{
    hv: H,
    registry: BreakpointRegistry<H>,
    mtf: MtfController<H>,
    active: AtomicBool,
}

impl<H> ShadowEngine<H>
where
    H: Hypervisor,
{
    /// Creates an engine with an empty registry.
    pub fn new(hv: H) -> Self {
        let mtf = MtfController::new(hv.vcpu_count());

        Self {
            hv,
            registry: BreakpointRegistry::new(),
            mtf,
            active: AtomicBool::new(true),
        }
    }

    /// Returns the embedding hypervisor.
    pub fn hypervisor(&self) -> &H {
        &self.hv
    }

    /// Returns the breakpoint registry.
    pub fn registry(&self) -> &BreakpointRegistry<H> {
        &self.registry
    }

    /// Checks if a single step is in flight on the given vCPU.
    pub fn is_single_stepping(&self, vcpu: VcpuId) -> bool {
        self.mtf.armed(vcpu)
    }

    /// Stages a pre breakpoint at a routine's entry point.
    ///
    /// The shadow pages are prepared here, but the EPT view is untouched
    /// until [`start`] activates all staged hooks at once.
    ///
    /// [`start`]: Self::start
    pub fn install_pre(
        &self,
        va: Va,
        target: BreakpointTarget<H>,
        name: &str,
    ) -> Result<(), HvError> {
        let record = self.create_breakpoint(
            va,
            BreakpointKind::Pre,
            None,
            target.pre_handler,
            Some(target.post_handler),
            name.to_owned(),
            CapturedParameters::default(),
        )?;
        self.registry.insert(Arc::new(record));

        tracing::debug!(%va, name, "pre breakpoint staged");
        Ok(())
    }

    /// Plants a post breakpoint at a return address, armed for the calling
    /// thread. Called from inside a pre handler, in VMX root mode.
    ///
    /// A recursive call coalesces into the outermost one: when this thread
    /// already has a post breakpoint on the page, only its captured
    /// parameters are refreshed.
    pub fn install_and_enable_post(
        &self,
        ept: &mut H::Ept,
        va: Va,
        pre: &BreakpointRecord<H>,
        parameters: CapturedParameters,
    ) -> Result<(), HvError> {
        let tid = self.hv.current_thread();

        if let Some(duplicate) = self.registry.find_duplicate_post(va, tid) {
            duplicate.set_parameters(parameters);

            tracing::debug!(%va, %tid, "post breakpoint refreshed");
            return Ok(());
        }

        let handler = pre
            .post_handler()
            .ok_or(HvError::Other("record has no post handler"))?;

        let record = Arc::new(self.create_breakpoint(
            va,
            BreakpointKind::Post,
            Some(tid),
            handler,
            None,
            pre.name().to_owned(),
            parameters,
        )?);
        self.registry.insert(Arc::clone(&record));

        // The faulting page is in its rw view right now; the post page must
        // be armed before the trap exit brings the exec views back.
        shadow::show_exec(&self.hv, ept, &record)?;

        tracing::debug!(%va, %tid, "post breakpoint armed");
        Ok(())
    }

    /// Activates every staged breakpoint.
    pub fn start(&self) -> Result<(), HvError> {
        self.hv.hypercall(Hypercall::EnablePageShadowing)
    }

    /// Deactivates the engine and drops every record.
    ///
    /// The grace period lets breakpoint/trap pairs that are mid-flight on
    /// other processors retire before the shadow pages go away.
    pub fn terminate(&self) {
        if let Err(err) = self.hv.hypercall(Hypercall::DisablePageShadowing) {
            tracing::error!(%err, "disable hypercall failed");
        }

        self.hv.sleep(TERMINATE_GRACE);

        self.registry.clear();
        self.active.store(false, Ordering::Release);

        tracing::debug!("engine terminated");
    }

    /// Hypercall target: switches every record's page to its exec view.
    /// VMX root mode.
    pub fn enable_all(&self, ept: &mut H::Ept) {
        for record in self.registry.snapshot() {
            if let Err(err) = shadow::show_exec(&self.hv, ept, &record) {
                tracing::error!(%err, va = %record.patch_address(), "shadowing failed");
            }
        }
    }

    /// Hypercall target: restores the identity mapping of every record's
    /// page. VMX root mode.
    pub fn disable_all(&self, ept: &mut H::Ept) {
        for record in self.registry.snapshot() {
            if let Err(err) = shadow::unshadow(&self.hv, ept, &record) {
                tracing::error!(%err, va = %record.patch_address(), "unshadowing failed");
            }
        }
    }

    /// Handles a `#BP` VM-exit.
    ///
    /// Returns `true` when the exit was consumed; `false` means the
    /// breakpoint belongs to the guest and must be delivered to it.
    pub fn on_breakpoint(&self, ept: &mut H::Ept, guest_ip: Va, regs: &mut GpRegisters) -> bool {
        if !self.is_active() {
            return false;
        }

        let record = match self.registry.find_by_address(guest_ip) {
            Some(record) => record,
            None => return false,
        };

        // The guest had its own 0xcc at this address: the rw copy carries it
        // too, and the exception is the guest's to handle.
        if record.rw_byte_at(guest_ip) == BREAKPOINT_OPCODE {
            return false;
        }

        if self.hv.current_irql() > Irql::DISPATCH_LEVEL {
            self.hv.bug_check(BugCheck::IrqlNotLessOrEqual);
        }

        tracing::trace!(%guest_ip, kind = ?record.kind(), "breakpoint hit");

        match record.kind() {
            BreakpointKind::Pre => {
                self.invoke_handler(ept, &record, regs);
                self.step_over(ept, &record);
            }
            BreakpointKind::Post => {
                if record.target_tid() == Some(self.hv.current_thread()) {
                    self.invoke_handler(ept, &record, regs);
                    self.registry.remove(&record);

                    // Another record may still live on the page; its shadow
                    // must survive this one.
                    if self.registry.find_by_page(guest_ip).is_none() {
                        if let Err(err) = shadow::unshadow(&self.hv, ept, &record) {
                            tracing::error!(%err, %guest_ip, "unshadowing failed");
                        }
                    }
                }
                else {
                    // Not the thread this return site is armed for; let it
                    // run the original instruction and keep the record.
                    self.step_over(ept, &record);
                }
            }
        }

        true
    }

    /// Handles an EPT violation VM-exit.
    ///
    /// A read or write touched an execute-only shadowed page: show the rw
    /// copy for exactly one instruction.
    pub fn on_ept_violation(&self, ept: &mut H::Ept, fault_va: Va) {
        if !self.is_active() {
            return;
        }

        let record = match self.registry.find_by_page(fault_va) {
            Some(record) => record,
            None => return,
        };

        tracing::trace!(%fault_va, "data access on shadowed page");
        self.step_over(ept, &record);
    }

    /// Handles a monitor-trap VM-exit: the stepped instruction has retired,
    /// bring the breakpoint view back.
    pub fn on_mtf(&self, ept: &mut H::Ept) {
        let record = match self.mtf.disarm(&self.hv) {
            Some(record) => record,
            None => self.hv.bug_check(BugCheck::SpuriousMonitorTrap),
        };

        if let Err(err) = shadow::show_exec(&self.hv, ept, &record) {
            tracing::error!(%err, va = %record.patch_address(), "shadowing failed");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Runs a record's handler with the guest's CR3 loaded, so the handler
    /// can dereference guest user-space pointers.
    fn invoke_handler(
        &self,
        ept: &mut H::Ept,
        record: &Arc<BreakpointRecord<H>>,
        regs: &mut GpRegisters,
    ) {
        let guest_sp = Va(self.hv.vmcs_read(VmcsField::GuestRsp));
        let handler = record.handler();

        let _cr3 = GuestCr3Guard::enter(&self.hv);

        let mut ctx = HookContext {
            engine: self,
            ept,
            record,
            regs,
            guest_sp,
        };
        handler(&mut ctx);
    }

    /// Shows the rw copy and arms a single step over the patched page.
    fn step_over(&self, ept: &mut H::Ept, record: &Arc<BreakpointRecord<H>>) {
        if let Err(err) = shadow::show_rw(&self.hv, ept, record) {
            tracing::error!(%err, va = %record.patch_address(), "rw view flip failed");
            return;
        }

        self.mtf.arm(&self.hv, Arc::clone(record));
    }

    /// Builds a record, sharing shadow pages with any sibling on the same
    /// guest page and planting the breakpoint byte in the exec copy.
    fn create_breakpoint(
        &self,
        va: Va,
        kind: BreakpointKind,
        target_tid: Option<ThreadId>,
        handler: HookFn<H>,
        post_handler: Option<HookFn<H>>,
        name: String,
        parameters: CapturedParameters,
    ) -> Result<BreakpointRecord<H>, HvError> {
        let (exec_copy, rw_copy) = self.shadow_pages_for(va)?;

        exec_copy.write_byte(va.page_offset(), BREAKPOINT_OPCODE);
        self.hv.invalidate_caches();

        Ok(BreakpointRecord::new(
            va,
            kind,
            target_tid,
            exec_copy,
            rw_copy,
            handler,
            post_handler,
            name,
            parameters,
        ))
    }

    /// Returns the shadow page pair for the page containing `va`: the pair
    /// of an existing record on the page, or a freshly copied one.
    ///
    /// Sharing is what makes every patch on a page visible in the one exec
    /// copy the guest fetches from.
    fn shadow_pages_for(&self, va: Va) -> Result<(Arc<ShadowPage>, Arc<ShadowPage>), HvError> {
        if let Some(sibling) = self.registry.find_by_page(va) {
            return Ok(sibling.shadow_pages());
        }

        let mut image = [0u8; PAGE_SIZE];
        self.hv.read_page(va.page_base(), &mut image)?;

        let exec_copy = Arc::new(ShadowPage::new(&self.hv));
        exec_copy.fill(&image);

        let rw_copy = Arc::new(ShadowPage::new(&self.hv));
        rw_copy.fill(&image);

        Ok((exec_copy, rw_copy))
    }
}

/// Loads the guest's CR3 for the lifetime of the guard; the host CR3 comes
/// back on drop, on every path out of the handler.
struct GuestCr3Guard<'a, H>
where
    H: Hypervisor,
{
    hv: &'a H,
    host_cr3: u64,
}

impl<'a, H> GuestCr3Guard<'a, H>
where
    H: Hypervisor,
{
    fn enter(hv: &'a H) -> Self {
        let host_cr3 = hv.read_cr3();
        hv.write_cr3(hv.vmcs_read(VmcsField::GuestCr3));

        Self { hv, host_cr3 }
    }
}

impl<H> Drop for GuestCr3Guard<'_, H>
where
    H: Hypervisor,
{
    fn drop(&mut self) {
        self.hv.write_cr3(self.host_cr3);
    }
}
