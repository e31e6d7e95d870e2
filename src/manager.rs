/// An opaque handle identifying a manager registered with a [`Queue`]. Ids are handed out in
/// increasing order and never reused by the same queue.
///
/// [`Queue`]: crate::Queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagerId(pub(crate) u64);

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a manager.
///
/// ```text
///  new_manager        put / initialize        remove_manager
/// ────────────► Registered ──────────► Initialized ──────────► Detached
///                   │                                              ▲
///                   └──────────────────────────────────────────────┘
///                                 remove_manager
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    /// Registered but not yet eligible to read. Reading from a manager in this state fails.
    Registered,
    /// Eligible to read every value published since its registration.
    Initialized,
    /// Removed from the queue. This state is terminal.
    Detached,
}

/// Per-manager bookkeeping kept by the queue.
#[derive(Clone, Debug)]
pub(crate) struct ManagerRecord {
    pub(crate) initialized: bool,
    /// Sequence number of the next value owed to this manager.
    pub(crate) cursor: u64,
}

impl ManagerRecord {
    pub(crate) fn new(cursor: u64) -> Self {
        Self { initialized: false, cursor }
    }

    pub(crate) fn state(&self) -> ManagerState {
        if self.initialized { ManagerState::Initialized } else { ManagerState::Registered }
    }
}
