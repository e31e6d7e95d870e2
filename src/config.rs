use crate::error::ConfigError;

/// Bounds applied to a [`Queue`]. `None` leaves the corresponding dimension unbounded.
///
/// ```rust
/// use fanout_mq::{Queue, QueueConfig};
///
/// let config = QueueConfig::default().max_size(64).max_managers(4);
/// let queue = Queue::<u32>::with_config(config).unwrap();
/// assert_eq!(queue.config().max_size, Some(64));
/// ```
///
/// [`Queue`]: crate::Queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of items held at once.
    pub max_size: Option<usize>,
    /// Maximum number of registered managers.
    pub max_managers: Option<usize>,
}

impl QueueConfig {
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn max_managers(mut self, max_managers: usize) -> Self {
        self.max_managers = Some(max_managers);
        self
    }

    pub(crate) fn validate(self) -> Result<Self, ConfigError> {
        if self.max_size == Some(0) {
            return Err(ConfigError::ZeroMaxSize);
        }
        if self.max_managers == Some(0) {
            return Err(ConfigError::ZeroMaxManagers);
        }
        Ok(self)
    }
}
