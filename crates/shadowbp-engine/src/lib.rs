//! EPT page shadowing and invisible breakpoint dispatch.
//!
//! Lets a monitor intercept execution at arbitrary guest instruction
//! addresses without leaving a byte-level trace the guest can observe. Every
//! patched guest page is backed by two host-private copies:
//!
//! - an *exec copy* carrying an `INT3` at each patch offset, mapped
//!   execute-only, so only instruction fetches see the breakpoint;
//! - an *rw copy* holding the pristine bytes, mapped on demand, so data
//!   reads and writes see the original page.
//!
//! The [`ShadowEngine`] flips the EPT leaf of a patched page between the two
//! copies as the guest alternates between fetching and reading it, and uses
//! the monitor trap flag to run exactly one guest instruction against the rw
//! copy before the breakpoint view is restored:
//!
//! - `#BP` at a patched address runs the hook, switches the page to the rw
//!   copy and arms MTF;
//! - an EPT violation (a read or write hit the execute-only page) switches
//!   to the rw copy and arms MTF;
//! - the MTF exit restores the exec copy and disarms.
//!
//! Hooks come in pairs: a *pre* breakpoint at a routine's entry, and a
//! *post* breakpoint its handler plants at the return address, keyed to the
//! calling thread and consumed by its first hit.

mod engine;
mod mtf;
mod page;
mod record;
mod registry;
mod shadow;


pub use self::{
    engine::ShadowEngine,
    page::ShadowPage,
    record::{
        BreakpointKind, BreakpointRecord, BreakpointTarget, CapturedParameters, HookContext,
        HookFn, BREAKPOINT_OPCODE,
    },
    registry::BreakpointRegistry,
};
