/// A host interrupt request level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Irql(pub u8);

impl Irql {
    /// Normal thread execution.
    pub const PASSIVE_LEVEL: Irql = Irql(0);

    /// Asynchronous procedure calls.
    pub const APC_LEVEL: Irql = Irql(1);

    /// Dispatcher and deferred procedure calls; page faults are forbidden at
    /// or above this level.
    pub const DISPATCH_LEVEL: Irql = Irql(2);
}

impl std::fmt::Display for Irql {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
