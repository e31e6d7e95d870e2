use crate::config::QueueConfig;
use crate::envelope::Envelope;
use crate::error::{PutError, QueueError};
use crate::macros::*;
use crate::manager::{ManagerId, ManagerRecord, ManagerState};

#[cfg(test)]
pub trait TBound: Send + Clone + std::fmt::Debug {}
#[cfg(test)]
impl<T: Send + Clone + std::fmt::Debug> TBound for T {}

#[cfg(not(test))]
pub trait TBound: Send + Clone {}
#[cfg(not(test))]
impl<T: Send + Clone> TBound for T {}

/// A fan-out queue: every value is delivered once to each manager which was registered at the
/// time it was published, in publication order, and is dropped once all of them have received it.
///
/// # Implementation details
///
/// Values are stored in envelopes which keep track of the managers still owed that value. Each
/// manager also keeps a cursor pointing to the sequence number of the next value it is owed.
///
/// ```text
///                 front                                  back
///                ┌─────┬─────┬─────┬─────┬─────┐
///   seq:         │  4  │  5  │  6  │  7  │  8  │   next_seq: 9
///   pending:     │ a   │ a   │ a b │ a b │ a b │
///                └─────┴─────┴─────┴─────┴─────┘
///                   ▲           ▲
///                   │           │
///             cursor(a)     cursor(b)
/// ```
///
/// Since a manager always receives values in order, the set of managers pending on a value is
/// always a subset of those pending on the values which follow it. As a consequence, only the
/// value at the front of the queue can ever be fully consumed, so the queue always holds a
/// contiguous range of sequence numbers and a manager's next value is found in `O(1)` from its
/// cursor.
///
/// Values are cloned for every delivery but the last one, which moves the value out of the queue.
///
/// This type performs no synchronization. See [`SharedQueue`] for a thread-safe version.
///
/// [`SharedQueue`]: crate::SharedQueue
pub struct Queue<T: TBound> {
    items: std::collections::VecDeque<Envelope<T>>,
    managers: std::collections::BTreeMap<ManagerId, ManagerRecord>,
    next_seq: u64,
    next_id: u64,
    config: QueueConfig,
}

/// A lazy iterator over the values pending for a manager, see [`Queue::iter`].
pub struct Pending<'a, T: TBound> {
    queue: &'a mut Queue<T>,
    id: ManagerId,
}

impl<T: TBound> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("items", &self.items)
            .field("managers", &self.managers)
            .field("next_seq", &self.next_seq)
            .field("next_id", &self.next_id)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: TBound> std::fmt::Debug for Pending<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<T: TBound> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TBound> Iterator for Pending<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.get(self.id).ok().flatten()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.queue.qsize(self.id).unwrap_or(0);
        (len, Some(len))
    }
}

impl<T: TBound> Queue<T> {
    /// Creates a new, unbounded queue.
    pub fn new() -> Self {
        Self::from_config(QueueConfig::default())
    }

    /// Creates a new queue with the bounds set in `config`. Fails if any of these bounds is zero.
    #[cfg_attr(test, tracing::instrument)]
    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        let config = config.validate()?;
        debug!(?config, "Creating new queue");
        Ok(Self::from_config(config))
    }

    fn from_config(config: QueueConfig) -> Self {
        Self {
            items: Default::default(),
            managers: Default::default(),
            next_seq: 0,
            next_id: 0,
            config,
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Number of values currently held, across all managers.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    /// Ids of all managers currently registered, in registration order.
    pub fn managers(&self) -> impl Iterator<Item = ManagerId> + '_ {
        self.managers.keys().copied()
    }

    pub fn state(&self, id: ManagerId) -> Result<ManagerState, QueueError> {
        match self.managers.get(&id) {
            Some(record) => Ok(record.state()),
            None => match self.missing(id) {
                QueueError::Detached(_) => Ok(ManagerState::Detached),
                err => Err(err),
            },
        }
    }

    /// Registers a new manager. The manager will only be owed values published after this call
    /// and cannot read until it is [initialized], either explicitly or by the next [`put`].
    ///
    /// [initialized]: Self::initialize
    /// [`put`]: Self::put
    #[cfg_attr(test, tracing::instrument(skip(self)))]
    pub fn new_manager(&mut self) -> Result<ManagerId, QueueError> {
        if let Some(max_managers) = self.config.max_managers.filter(|max| self.managers.len() >= *max) {
            warn!(max_managers, "Failed to register manager, limit reached");
            return Err(QueueError::TooManyManagers { max_managers });
        }

        let id = ManagerId(self.next_id);
        self.next_id += 1;
        self.managers.insert(id, ManagerRecord::new(self.next_seq));

        debug!(%id, managers = self.managers.len(), "Registered manager");
        Ok(id)
    }

    /// Allows a manager to read from the queue without waiting for the next [`put`].
    ///
    /// [`put`]: Self::put
    #[cfg_attr(test, tracing::instrument(skip(self)))]
    pub fn initialize(&mut self, id: ManagerId) -> Result<(), QueueError> {
        let missing = self.missing(id);
        let record = self.managers.get_mut(&id).ok_or(missing)?;
        record.initialized = true;
        Ok(())
    }

    /// Removes a manager from the queue, discarding every value it was still owed. Values which
    /// are no longer owed to any manager as a result are dropped.
    ///
    /// Removing a manager a second time fails with [`QueueError::Detached`].
    #[cfg_attr(test, tracing::instrument(skip(self)))]
    pub fn remove_manager(&mut self, id: ManagerId) -> Result<(), QueueError> {
        let missing = self.missing(id);
        let record = self.managers.remove(&id).ok_or(missing)?;

        let start = self.index_of(record.cursor);
        let drained =
            self.items.range_mut(start..).map(|envelope| envelope.release(id)).filter(|released| *released).count();
        let collected = self.collect();

        debug!(%id, drained, collected, managers = self.managers.len(), "Removed manager");
        Ok(())
    }

    /// Publishes a value to every registered manager, initializing any manager which was not
    /// initialized yet. Returns the sequence number of the value.
    ///
    /// Fails with [`QueueError::NoManager`] if no manager is registered, see [`put_lossy`] to
    /// silently drop the value instead. Fails with [`QueueError::Full`] if the queue is at
    /// capacity. In both cases, the value is handed back and the queue is left untouched.
    ///
    /// [`put_lossy`]: Self::put_lossy
    #[cfg_attr(test, tracing::instrument(skip(self)))]
    pub fn put(&mut self, elem: T) -> Result<u64, PutError<T>> {
        if self.managers.is_empty() {
            debug!("Failed to put value, no manager registered");
            return Err(PutError::new(elem, QueueError::NoManager));
        }

        if let Some(max_size) = self.config.max_size.filter(|max| self.items.len() >= *max) {
            warn!(max_size, "Failed to put value, queue is full");
            return Err(PutError::new(elem, QueueError::Full { max_size }));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        for record in self.managers.values_mut() {
            record.initialized = true;
        }
        self.items.push_back(Envelope::new(seq, elem, self.managers.keys().copied()));

        trace!(seq, pending = self.managers.len(), len = self.items.len(), "Published value");
        Ok(seq)
    }

    /// Same as [`put`], but drops the value and returns `None` if no manager is registered.
    ///
    /// [`put`]: Self::put
    pub fn put_lossy(&mut self, elem: T) -> Result<Option<u64>, PutError<T>> {
        match self.put(elem) {
            Ok(seq) => Ok(Some(seq)),
            Err(err) if err.kind == QueueError::NoManager => {
                debug!("Dropping value, no manager registered");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Retrieves the next value owed to a manager, or `None` if it has received every value
    /// published so far.
    #[cfg_attr(test, tracing::instrument(skip(self)))]
    pub fn get(&mut self, id: ManagerId) -> Result<Option<T>, QueueError> {
        let Some(index) = self.pending_index(id)? else {
            trace!(%id, "No value pending");
            return Ok(None);
        };

        let envelope = &mut self.items[index];
        let seq = envelope.seq();
        let released = envelope.release(id);
        debug_assert!(released, "Manager {id} was not owed value {seq}");

        let elem = if envelope.is_consumed() {
            debug_assert_eq!(index, 0, "Only the front of the queue can be fully consumed");
            trace!(%id, seq, "Last delivery, removing value");
            self.items.remove(index).map(Envelope::into_inner)
        } else {
            trace!(%id, seq, "Delivering value");
            Some(envelope.read().clone())
        };

        if let Some(record) = self.managers.get_mut(&id) {
            record.cursor = seq + 1;
        }

        Ok(elem)
    }

    /// Same as [`get`], but returns `default` if no value is pending.
    ///
    /// [`get`]: Self::get
    pub fn get_or(&mut self, id: ManagerId, default: T) -> Result<T, QueueError> {
        Ok(self.get(id)?.unwrap_or(default))
    }

    /// Number of values still owed to a manager.
    pub fn qsize(&self, id: ManagerId) -> Result<usize, QueueError> {
        let missing = self.missing(id);
        let record = self.managers.get(&id).ok_or(missing)?;
        Ok(self.items.len() - self.index_of(record.cursor))
    }

    pub fn have_values(&self, id: ManagerId) -> Result<bool, QueueError> {
        self.qsize(id).map(|len| len > 0)
    }

    /// Returns an iterator over the values owed to a manager. Each call to [`next`] is a [`get`],
    /// so values are consumed as they are iterated over. The iterator ends once the manager has
    /// caught up, but a new one can be created after more values are published.
    ///
    /// [`next`]: Iterator::next
    /// [`get`]: Self::get
    pub fn iter(&mut self, id: ManagerId) -> Result<Pending<'_, T>, QueueError> {
        match self.state(id)? {
            ManagerState::Initialized => Ok(Pending { queue: self, id }),
            ManagerState::Registered => Err(QueueError::NotInitialized(id)),
            ManagerState::Detached => Err(QueueError::Detached(id)),
        }
    }

    fn pending_index(&self, id: ManagerId) -> Result<Option<usize>, QueueError> {
        let missing = self.missing(id);
        let record = self.managers.get(&id).ok_or(missing)?;
        if !record.initialized {
            return Err(QueueError::NotInitialized(id));
        }

        let index = self.index_of(record.cursor);
        match self.items.get(index) {
            Some(envelope) => {
                debug_assert_eq!(envelope.seq(), record.cursor);
                debug_assert!(envelope.is_pending(id));
                Ok(Some(index))
            }
            None => Ok(None),
        }
    }

    /// Position of `seq` in the queue, clamped to its length. Cursors never point past the back.
    fn index_of(&self, seq: u64) -> usize {
        let front = self.items.front().map_or(self.next_seq, Envelope::seq);
        usize::try_from(seq.saturating_sub(front)).map_or(self.items.len(), |index| index.min(self.items.len()))
    }

    /// Drops every consumed value at the front of the queue.
    fn collect(&mut self) -> usize {
        let mut collected = 0;
        while self.items.front().is_some_and(Envelope::is_consumed) {
            self.items.pop_front();
            collected += 1;
        }
        collected
    }

    /// The error to return for an id which has no record.
    fn missing(&self, id: ManagerId) -> QueueError {
        if id.0 < self.next_id { QueueError::Detached(id) } else { QueueError::UnknownManager(id) }
    }
}
