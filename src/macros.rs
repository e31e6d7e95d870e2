// Log events are only emitted in tests or when the `logging` feature is enabled. The condition is
// a constant, so disabled events are compiled out.

#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        if cfg!(any(test, feature = "logging")) {
            tracing::trace!($($arg)+)
        }
    };
}
pub(crate) use crate::trace;

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        if cfg!(any(test, feature = "logging")) {
            tracing::debug!($($arg)+)
        }
    };
}
pub(crate) use crate::debug;

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        if cfg!(any(test, feature = "logging")) {
            tracing::warn!($($arg)+)
        }
    };
}
pub(crate) use crate::warn;
