//! EPT view transitions for a patched page.
//!
//! A patched page is always in one of three views:
//!
//! | view        | access | frame        |
//! |-------------|--------|--------------|
//! | exec        | `--x`  | exec copy    |
//! | rw          | `rwx`  | rw copy      |
//! | unshadowed  | `rwx`  | original     |
//!
//! Every transition ends with a global EPT invalidation. These exits are
//! rare relative to TLB refill cost, and the broad flush keeps the view
//! coherent across vCPUs without tracking which of them cached the page.

use shadowbp_core::{HvError, Hypervisor};

use crate::record::BreakpointRecord;

/// Shows the exec copy to the guest, execute-only.
///
/// Reads and writes now fault into the EPT violation handler, which is what
/// keeps the embedded breakpoint bytes invisible.
pub(crate) fn show_exec<H>(
    hv: &H,
    ept: &mut H::Ept,
    record: &BreakpointRecord<H>,
) -> Result<(), HvError>
where
    H: Hypervisor,
{
    let pa = hv.pa_of(record.patch_address()).page_base();

    let entry = hv
        .ept_entry(ept, pa)?
        .with_read_access(false)
        .with_write_access(false)
        .with_pfn(record.pa_exec().pfn());
    hv.set_ept_entry(ept, pa, entry)?;
    hv.invept_all();

    tracing::trace!(%pa, "exec view");
    Ok(())
}

/// Shows the rw copy to the guest, readable and writable.
///
/// Execute stays as it was; a fetch that slips in simply re-enters the exec
/// view through the next breakpoint exit.
pub(crate) fn show_rw<H>(
    hv: &H,
    ept: &mut H::Ept,
    record: &BreakpointRecord<H>,
) -> Result<(), HvError>
where
    H: Hypervisor,
{
    let pa = hv.pa_of(record.patch_address()).page_base();

    let entry = hv
        .ept_entry(ept, pa)?
        .with_read_access(true)
        .with_write_access(true)
        .with_pfn(record.pa_rw().pfn());
    hv.set_ept_entry(ept, pa, entry)?;
    hv.invept_all();

    tracing::trace!(%pa, "rw view");
    Ok(())
}

/// Restores the identity mapping of the patched page.
pub(crate) fn unshadow<H>(
    hv: &H,
    ept: &mut H::Ept,
    record: &BreakpointRecord<H>,
) -> Result<(), HvError>
where
    H: Hypervisor,
{
    let pa = hv.pa_of(record.patch_address()).page_base();

    let entry = hv
        .ept_entry(ept, pa)?
        .with_read_access(true)
        .with_write_access(true)
        .with_execute_access(true)
        .with_pfn(pa.pfn());
    hv.set_ept_entry(ept, pa, entry)?;
    hv.invept_all();

    tracing::trace!(%pa, "unshadowed");
    Ok(())
}
