#[cfg(feature = "loom")]
pub(crate) use loom::sync;
#[cfg(feature = "loom")]
pub(crate) use loom::sync::Notify;

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync;
#[cfg(not(feature = "loom"))]
pub(crate) use tokio::sync::Notify;

use crate::manager::ManagerId;

#[cfg(feature = "loom")]
type Waiters = sync::Mutex<std::collections::BTreeMap<ManagerId, sync::Arc<Notify>>>;
#[cfg(not(feature = "loom"))]
type Waiters = Notify;

/// Wakes up managers waiting on a [`SharedQueue`] whenever a value is published, the queue is
/// closed or its last publisher is dropped.
///
/// [`SharedQueue`]: crate::SharedQueue
pub(crate) struct Waker(Waiters);

/// The per-manager half of a [`Waker`].
#[cfg(feature = "loom")]
pub(crate) struct Waiter(sync::Arc<Notify>);
#[cfg(not(feature = "loom"))]
pub(crate) struct Waiter;

/// Interest in the next notification, registered before the queue is checked so that a put
/// happening in between is not missed.
#[cfg(feature = "loom")]
pub(crate) struct Listener<'a>(&'a Notify);
#[cfg(not(feature = "loom"))]
pub(crate) struct Listener<'a>(std::pin::Pin<Box<tokio::sync::futures::Notified<'a>>>);

// loom's `Notify` wakes a single waiter and keeps the notification until it is consumed, so every
// manager gets its own.
#[cfg(feature = "loom")]
impl Waker {
    pub(crate) fn new() -> Self {
        Self(sync::Mutex::new(std::collections::BTreeMap::new()))
    }

    fn waiters(&self) -> sync::MutexGuard<'_, std::collections::BTreeMap<ManagerId, sync::Arc<Notify>>> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn notify_waiters(&self) {
        for notify in self.waiters().values() {
            notify.notify();
        }
    }

    pub(crate) fn register(&self, id: ManagerId) -> Waiter {
        let notify = sync::Arc::new(Notify::new());
        self.waiters().insert(id, sync::Arc::clone(&notify));
        crate::debug!(%id, "Registered waiter");
        Waiter(notify)
    }

    pub(crate) fn forget(&self, id: ManagerId) {
        self.waiters().remove(&id);
    }

    pub(crate) fn listen<'a>(&'a self, waiter: &'a Waiter) -> Listener<'a> {
        Listener(&waiter.0)
    }
}

#[cfg(feature = "loom")]
impl Listener<'_> {
    pub(crate) async fn wait(self) {
        self.0.wait();
    }
}

#[cfg(not(feature = "loom"))]
impl Waker {
    pub(crate) fn new() -> Self {
        Self(Notify::new())
    }

    pub(crate) fn notify_waiters(&self) {
        self.0.notify_waiters();
    }

    pub(crate) fn register(&self, _id: ManagerId) -> Waiter {
        Waiter
    }

    pub(crate) fn forget(&self, _id: ManagerId) {}

    pub(crate) fn listen<'a>(&'a self, _waiter: &'a Waiter) -> Listener<'a> {
        let mut notified = Box::pin(self.0.notified());
        notified.as_mut().enable();
        Listener(notified)
    }
}

#[cfg(not(feature = "loom"))]
impl Listener<'_> {
    pub(crate) async fn wait(self) {
        self.0.await;
    }
}
