use crate::manager::ManagerId;

/// A published value along with the managers which have not received it yet.
pub(crate) struct Envelope<T> {
    seq: u64,
    elem: T,
    pending: std::collections::BTreeSet<ManagerId>,
}

impl<T> Envelope<T> {
    pub(crate) fn new(seq: u64, elem: T, pending: impl IntoIterator<Item = ManagerId>) -> Self {
        Self { seq, elem, pending: pending.into_iter().collect() }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn read(&self) -> &T {
        &self.elem
    }

    pub(crate) fn into_inner(self) -> T {
        self.elem
    }

    pub(crate) fn is_pending(&self, id: ManagerId) -> bool {
        self.pending.contains(&id)
    }

    /// Marks the value as delivered to `id`. Returns `false` if `id` was not owed this value.
    pub(crate) fn release(&mut self, id: ManagerId) -> bool {
        self.pending.remove(&id)
    }

    /// An envelope is consumed once every manager it was published to has received it.
    pub(crate) fn is_consumed(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> std::fmt::Debug for Envelope<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").field("seq", &self.seq).field("pending", &self.pending).finish_non_exhaustive()
    }
}
