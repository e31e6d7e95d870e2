use crate::manager::ManagerId;

/// Errors returned by [`Queue`] and [`SharedQueue`] operations.
///
/// [`Queue`]: crate::Queue
/// [`SharedQueue`]: crate::SharedQueue
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid queue configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Queue is full, it cannot hold more than {max_size} items")]
    Full { max_size: usize },
    #[error("Too many managers, the queue cannot register more than {max_managers}")]
    TooManyManagers { max_managers: usize },
    #[error("No manager is registered to receive this value")]
    NoManager,
    #[error("Manager {0} has not been initialized yet")]
    NotInitialized(ManagerId),
    #[error("Manager {0} has been removed from the queue")]
    Detached(ManagerId),
    #[error("Manager {0} was never registered with this queue")]
    UnknownManager(ManagerId),
    #[error("Queue is closed")]
    Closed,
}

/// Invalid bounds passed through a [`QueueConfig`].
///
/// [`QueueConfig`]: crate::QueueConfig
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_size must be a positive integer")]
    ZeroMaxSize,
    #[error("max_managers must be a positive integer")]
    ZeroMaxManagers,
}

/// A value which could not be published. The value is handed back to the caller so it is not lost
/// and the publish can be retried.
pub struct PutError<T> {
    pub(crate) elem: T,
    pub(crate) kind: QueueError,
}

impl<T> PutError<T> {
    pub(crate) fn new(elem: T, kind: QueueError) -> Self {
        Self { elem, kind }
    }

    /// The reason the value was rejected.
    pub fn kind(&self) -> &QueueError {
        &self.kind
    }

    /// Retrieves the rejected value.
    pub fn into_inner(self) -> T {
        self.elem
    }
}

impl<T> std::fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutError").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl<T> std::fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to put value: {}", self.kind)
    }
}

impl<T> std::error::Error for PutError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl<T> From<PutError<T>> for QueueError {
    fn from(err: PutError<T>) -> Self {
        err.kind
    }
}
