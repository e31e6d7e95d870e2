use crate::config::QueueConfig;
use crate::error::{PutError, QueueError};
use crate::macros::*;
use crate::manager::{ManagerId, ManagerState};
use crate::queue::{Queue, TBound};
use crate::sync::*;

/// A thread-safe [`Queue`] which can be shared between publishers and [`Manager`]s.
///
/// Every operation runs as a single critical section over the underlying queue, so no operation
/// can observe a partially published or partially consumed value. Cloning a [`SharedQueue`] yields
/// a new publisher handle to the same queue.
///
/// Unlike [`Queue`], managers can wait for values to be published with [`Manager::recv`]. Waiting
/// ends once the queue is [closed] or its last publisher handle is dropped, and every value owed
/// to the manager was received.
///
/// [closed]: SharedQueue::close
pub struct SharedQueue<T: TBound> {
    inner: sync::Arc<Inner<T>>,
}

/// A consumer registered with a [`SharedQueue`]. Receives every value published after it was
/// created, in order and exactly once.
///
/// A [`Manager`] does not count as a publisher. Dropping it removes it from the queue, discarding
/// any value it was still owed.
pub struct Manager<T: TBound> {
    id: ManagerId,
    inner: sync::Arc<Inner<T>>,
    waiter: Waiter,
    detached: bool,
}

/// A non-waiting iterator over the values pending for a [`Manager`], see [`Manager::try_iter`].
pub struct TryIter<'a, T: TBound> {
    manager: &'a Manager<T>,
}

struct Inner<T: TBound> {
    state: sync::Mutex<State<T>>,
    waker: Waker,
}

struct State<T: TBound> {
    queue: Queue<T>,
    closed: bool,
    publishers: usize,
}

impl<T: TBound> State<T> {
    /// No more values can be published once the queue is closed or every publisher is gone.
    fn is_done(&self) -> bool {
        self.closed || self.publishers == 0
    }
}

impl<T: TBound> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        let publishers = {
            let mut state = self.inner.lock();
            state.publishers += 1;
            state.publishers
        };
        debug!(publishers, "Increasing publisher count");
        Self { inner: sync::Arc::clone(&self.inner) }
    }
}

impl<T: TBound> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TBound> std::fmt::Debug for SharedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SharedQueue")
            .field("queue", &state.queue)
            .field("closed", &state.closed)
            .field("publishers", &state.publishers)
            .finish()
    }
}

impl<T: TBound> std::fmt::Debug for Manager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").field("id", &self.id).field("detached", &self.detached).finish()
    }
}

impl<T: TBound> std::fmt::Debug for TryIter<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TryIter").field("manager", &self.manager).finish()
    }
}

impl<T: TBound> Drop for SharedQueue<T> {
    fn drop(&mut self) {
        let publishers = {
            let mut state = self.inner.lock();
            debug_assert_ne!(state.publishers, 0);
            state.publishers -= 1;
            state.publishers
        };
        debug!(publishers, "Decreasing publisher count");

        if publishers == 0 {
            self.inner.waker.notify_waiters();
        }
    }
}

impl<T: TBound> Drop for Manager<T> {
    fn drop(&mut self) {
        if !self.detached {
            // The only possible failure is the manager already being gone from the queue.
            let res = self.inner.lock().queue.remove_manager(self.id);
            self.inner.waker.forget(self.id);
            debug!(id = %self.id, ?res, "Dropped manager");
        }
    }
}

impl<T: TBound> Iterator for TryIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.manager.get().ok().flatten()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.manager.len();
        (len, Some(len))
    }
}

impl<T: TBound> Inner<T> {
    fn lock(&self) -> sync::MutexGuard<'_, State<T>> {
        // The queue never panics halfway through an update, so its state is still consistent.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<T: TBound> SharedQueue<T> {
    /// Creates a new, unbounded shared queue.
    pub fn new() -> Self {
        Self::from_queue(Queue::new())
    }

    /// Creates a new shared queue with the bounds set in `config`.
    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        Queue::with_config(config).map(Self::from_queue)
    }

    fn from_queue(queue: Queue<T>) -> Self {
        let state = sync::Mutex::new(State { queue, closed: false, publishers: 1 });
        Self { inner: sync::Arc::new(Inner { state, waker: Waker::new() }) }
    }

    /// Publishes a value to every registered [`Manager`] and wakes up any manager waiting on
    /// [`recv`]. See [`Queue::put`].
    ///
    /// [`recv`]: Manager::recv
    pub fn put(&self, elem: T) -> Result<u64, PutError<T>> {
        let seq = {
            let mut state = self.inner.lock();
            if state.closed {
                debug!("Failed to put value, queue is closed");
                return Err(PutError::new(elem, QueueError::Closed));
            }
            state.queue.put(elem)?
        };

        self.inner.waker.notify_waiters();
        Ok(seq)
    }

    /// Same as [`put`], but drops the value if no manager is registered. See [`Queue::put_lossy`].
    ///
    /// [`put`]: Self::put
    pub fn put_lossy(&self, elem: T) -> Result<Option<u64>, PutError<T>> {
        let seq = {
            let mut state = self.inner.lock();
            if state.closed {
                debug!("Failed to put value, queue is closed");
                return Err(PutError::new(elem, QueueError::Closed));
            }
            state.queue.put_lossy(elem)?
        };

        if seq.is_some() {
            self.inner.waker.notify_waiters();
        }
        Ok(seq)
    }

    /// Registers a new [`Manager`]. Like [`Queue::new_manager`], the manager is not initialized
    /// until the next value is published or [`Manager::initialize`] is called.
    pub fn new_manager(&self) -> Result<Manager<T>, QueueError> {
        let id = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.queue.new_manager()?
        };

        let waiter = self.inner.waker.register(id);
        Ok(Manager { id, inner: sync::Arc::clone(&self.inner), waiter, detached: false })
    }

    /// Registers a new [`Manager`] which is ready to [`recv`] immediately.
    ///
    /// [`recv`]: Manager::recv
    pub fn subscribe(&self) -> Result<Manager<T>, QueueError> {
        let manager = self.new_manager()?;
        manager.initialize()?;
        Ok(manager)
    }

    /// Closes the queue: no more values can be published and no more managers can be registered.
    /// Values which have already been published can still be received, after which [`recv`]
    /// returns `None`.
    ///
    /// [`recv`]: Manager::recv
    pub fn close(&self) {
        warn!("Closing queue");
        self.inner.lock().closed = true;
        self.inner.waker.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of [`SharedQueue`] handles to this queue, including this one.
    pub fn publisher_count(&self) -> usize {
        self.inner.lock().publishers
    }

    /// Number of values currently held, across all managers.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn manager_count(&self) -> usize {
        self.inner.lock().queue.manager_count()
    }
}

impl<T: TBound> Manager<T> {
    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn state(&self) -> ManagerState {
        self.inner.lock().queue.state(self.id).unwrap_or(ManagerState::Detached)
    }

    /// See [`Queue::initialize`].
    pub fn initialize(&self) -> Result<(), QueueError> {
        self.inner.lock().queue.initialize(self.id)
    }

    /// Retrieves the next value owed to this manager without waiting. See [`Queue::get`].
    pub fn get(&self) -> Result<Option<T>, QueueError> {
        self.inner.lock().queue.get(self.id)
    }

    pub fn get_or(&self, default: T) -> Result<T, QueueError> {
        self.inner.lock().queue.get_or(self.id, default)
    }

    /// Number of values still owed to this manager.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.qsize(self.id).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn have_values(&self) -> bool {
        !self.is_empty()
    }

    /// Iterates over the values currently owed to this manager, without waiting for new ones.
    /// Fails if the manager has not been initialized.
    pub fn try_iter(&self) -> Result<TryIter<'_, T>, QueueError> {
        match self.state() {
            ManagerState::Initialized => Ok(TryIter { manager: self }),
            ManagerState::Registered => Err(QueueError::NotInitialized(self.id)),
            ManagerState::Detached => Err(QueueError::Detached(self.id)),
        }
    }

    /// Receives the next value owed to this manager or waits for one to be published. Returns
    /// `None` once every value owed to this manager was received and the queue has either been
    /// [closed] or lost its last publisher.
    ///
    /// [closed]: SharedQueue::close
    #[cfg_attr(test, tracing::instrument(skip(self), fields(id = %self.id)))]
    pub async fn recv(&self) -> Result<Option<T>, QueueError> {
        loop {
            // Interest has to be registered before checking the queue, or a put happening right
            // after the check would not wake us up.
            let listener = self.inner.waker.listen(&self.waiter);

            {
                let mut state = self.inner.lock();
                if let Some(elem) = state.queue.get(self.id)? {
                    trace!("Received value");
                    return Ok(Some(elem));
                }
                if state.is_done() {
                    debug!(closed = state.closed, publishers = state.publishers, "Queue is drained");
                    return Ok(None);
                }
            }

            trace!("Waiting for a put");
            listener.wait().await;
        }
    }

    /// Converts this manager into a [`Stream`] of the values owed to it. The manager is
    /// initialized first, so the stream sees every value published from then on. The stream ends
    /// once the queue is closed or has no publisher left, and every value was received.
    ///
    /// [`Stream`]: futures::Stream
    pub fn into_stream(self) -> impl futures::Stream<Item = T> {
        if let Err(err) = self.initialize() {
            warn!(id = %self.id, %err, "Failed to initialize manager stream");
        }

        futures::stream::unfold(self, |manager| async move {
            let next = manager.recv().await;
            match next {
                Ok(Some(elem)) => Some((elem, manager)),
                Ok(None) => None,
                Err(err) => {
                    warn!(%err, "Ending manager stream");
                    None
                }
            }
        })
    }

    /// Removes this manager from the queue. See [`Queue::remove_manager`].
    pub fn detach(mut self) -> Result<(), QueueError> {
        self.detached = true;
        let res = self.inner.lock().queue.remove_manager(self.id);
        self.inner.waker.forget(self.id);
        debug!(id = %self.id, ?res, "Detached manager");
        res
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod test {
    use super::*;
    use crate::queue::common::*;
    use assert_matches::assert_matches;
    use futures::StreamExt;

    #[rstest::rstest]
    fn recv_wakes_up_on_put(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::new();
        let manager = queue.subscribe().unwrap();

        let mut recv = tokio_test::task::spawn(manager.recv());
        assert!(recv.poll().is_pending());

        queue.put(42).unwrap();
        assert!(recv.is_woken());
        assert_matches!(recv.poll(), std::task::Poll::Ready(Ok(Some(42))));
    }

    #[rstest::rstest]
    fn recv_wakes_up_on_close(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::<u32>::new();
        let manager = queue.subscribe().unwrap();

        let mut recv = tokio_test::task::spawn(manager.recv());
        assert!(recv.poll().is_pending());

        queue.close();
        assert!(recv.is_woken());
        assert_matches!(recv.poll(), std::task::Poll::Ready(Ok(None)));
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn recv_uninitialized(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::<u32>::new();
        let manager = queue.new_manager().unwrap();

        assert_eq!(manager.recv().await, Err(QueueError::NotInitialized(manager.id())));
        assert_matches!(manager.try_iter(), Err(QueueError::NotInitialized(_)));
    }

    #[rstest::rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fan_out(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::new();
        let managers = (0..3).map(|_| queue.subscribe().unwrap()).collect::<Vec<_>>();

        let consumers = managers
            .into_iter()
            .map(|manager| tokio::spawn(manager.into_stream().collect::<Vec<_>>()))
            .collect::<Vec<_>>();

        let sx = queue.clone();
        let producer = tokio::spawn(async move {
            for i in 0..100u32 {
                tracing::info!(i, "Sending element");
                sx.put(i).unwrap();
                tokio::task::yield_now().await;
            }
            sx.close();
        });

        producer.await.unwrap();
        for consumer in consumers {
            assert_eq!(consumer.await.unwrap(), (0..100).collect::<Vec<_>>());
        }

        tracing::info!("Checking every value was collected");
        assert!(queue.is_empty());
        assert_eq!(queue.manager_count(), 0);
    }

    #[rstest::rstest]
    fn closed_queue(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::new();
        let manager = queue.subscribe().unwrap();
        queue.put("a").unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_matches!(queue.put("b"), Err(err) => {
            assert_eq!(err.kind(), &QueueError::Closed);
            assert_eq!(err.into_inner(), "b");
        });
        assert_matches!(queue.put_lossy("b"), Err(_));
        assert_matches!(queue.new_manager(), Err(QueueError::Closed));

        tracing::info!("Checking values published before the close can still be received");
        assert_eq!(manager.get(), Ok(Some("a")));
        assert_eq!(manager.get(), Ok(None));
    }

    #[rstest::rstest]
    fn drop_detaches(#[allow(unused)] log_stdout: ()) {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let queue = SharedQueue::new();
        let m1 = queue.subscribe().unwrap();
        let m2 = queue.subscribe().unwrap();

        queue.put(DropCounter::new(0, &counter)).unwrap();
        assert_eq!(queue.manager_count(), 2);

        drop(m1);
        assert_eq!(queue.manager_count(), 1);
        assert_eq!(queue.len(), 1);

        m2.detach().unwrap();
        assert_eq!(queue.manager_count(), 0);
        assert!(queue.is_empty());
        assert_eq!(counter.load(std::sync::atomic::Ordering::Acquire), 1);
    }

    #[rstest::rstest]
    fn manager_handle(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::with_config(QueueConfig::default().max_size(2)).unwrap();
        let manager = queue.new_manager().unwrap();
        assert_eq!(manager.state(), ManagerState::Registered);

        queue.put(0).unwrap();
        queue.put(1).unwrap();
        assert_matches!(queue.put(2), Err(err) => {
            assert_eq!(err.kind(), &QueueError::Full { max_size: 2 })
        });

        assert_eq!(manager.state(), ManagerState::Initialized);
        assert_eq!(manager.len(), 2);
        assert!(manager.have_values());

        let pending = manager.try_iter().unwrap();
        assert_eq!(pending.size_hint(), (2, Some(2)));
        assert_eq!(pending.collect::<Vec<_>>(), vec![0, 1]);
        assert!(manager.is_empty());
        assert_eq!(manager.get_or(7), Ok(7));
    }

    #[rstest::rstest]
    fn put_lossy_without_manager(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::new();
        assert_matches!(queue.put_lossy(0), Ok(None));
        assert_matches!(queue.put(0), Err(err) => { assert_eq!(err.kind(), &QueueError::NoManager) });
        assert!(queue.is_empty());
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn recv_ends_with_last_publisher(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::new();
        let manager = queue.subscribe().unwrap();

        queue.put(1).unwrap();
        drop(queue);

        tracing::info!("Checking values published before the last publisher was dropped are received");
        assert_eq!(manager.recv().await, Ok(Some(1)));
        assert_eq!(manager.recv().await, Ok(None));
    }

    #[rstest::rstest]
    fn recv_wakes_up_on_last_publisher_drop(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::<u32>::new();
        let sx = queue.clone();
        let manager = queue.subscribe().unwrap();
        assert_eq!(queue.publisher_count(), 2);

        let mut recv = tokio_test::task::spawn(manager.recv());
        assert!(recv.poll().is_pending());

        drop(sx);
        assert_eq!(queue.publisher_count(), 1);
        assert!(recv.poll().is_pending(), "A publisher is still alive");

        drop(queue);
        assert!(recv.is_woken());
        assert_matches!(recv.poll(), std::task::Poll::Ready(Ok(None)));
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn stream_initializes_manager(#[allow(unused)] log_stdout: ()) {
        let queue = SharedQueue::new();
        let manager = queue.new_manager().unwrap();
        assert_eq!(manager.state(), ManagerState::Registered);

        let stream = manager.into_stream();
        queue.put(1).unwrap();
        queue.close();

        assert_eq!(stream.collect::<Vec<_>>().await, vec![1]);
    }
}

/// [loom] is a deterministic concurrent permutation simulator: the tests below are run under every
/// possible interleaving of the threads they spawn.
///
/// ```bash
/// cargo test loom --release --features loom
/// ```
#[cfg(all(test, feature = "loom"))]
mod loom_test {
    use super::*;
    use crate::queue::common::*;

    fn drain(manager: &Manager<u32>, count: usize) -> Vec<u32> {
        let mut seen = Vec::with_capacity(count);
        while seen.len() < count {
            match manager.get().unwrap() {
                Some(elem) => seen.push(elem),
                None => loom::thread::yield_now(),
            }
        }
        seen
    }

    #[rstest::rstest]
    fn loom_fan_out(#[with("loom_fan_out")] model: loom::model::Builder) {
        model.check(|| {
            let queue = SharedQueue::new();
            let m1 = queue.subscribe().unwrap();
            let m2 = queue.subscribe().unwrap();

            let sx = queue.clone();
            let producer = loom::thread::spawn(move || {
                sx.put(0).unwrap();
                sx.put(1).unwrap();
            });
            let consumer = loom::thread::spawn(move || drain(&m2, 2));

            assert_eq!(drain(&m1, 2), vec![0, 1]);
            assert_eq!(consumer.join().unwrap(), vec![0, 1]);
            producer.join().unwrap();

            assert!(queue.is_empty());
        })
    }

    #[rstest::rstest]
    fn loom_detach_while_publishing(#[with("loom_detach_while_publishing")] model: loom::model::Builder) {
        model.check(|| {
            let queue = SharedQueue::new();
            let m1 = queue.subscribe().unwrap();
            let m2 = queue.subscribe().unwrap();

            let sx = queue.clone();
            let producer = loom::thread::spawn(move || {
                sx.put(0).unwrap();
                sx.put(1).unwrap();
            });
            let detach = loom::thread::spawn(move || m2.detach().unwrap());

            assert_eq!(drain(&m1, 2), vec![0, 1]);
            producer.join().unwrap();
            detach.join().unwrap();

            assert!(queue.is_empty());
            assert_eq!(queue.manager_count(), 1);
        })
    }

    fn recv_all(manager: &Manager<u32>) -> Vec<u32> {
        let mut seen = Vec::new();
        while let Some(elem) = loom::future::block_on(manager.recv()).unwrap() {
            seen.push(elem);
        }
        seen
    }

    #[rstest::rstest]
    fn loom_recv_put_close(#[with("loom_recv_put_close")] model: loom::model::Builder) {
        model.check(|| {
            let queue = SharedQueue::new();
            let manager = queue.subscribe().unwrap();

            let sx = queue.clone();
            let producer = loom::thread::spawn(move || {
                sx.put(1).unwrap();
                sx.close();
            });

            assert_eq!(recv_all(&manager), vec![1]);
            producer.join().unwrap();
            assert!(queue.is_empty());
        })
    }

    #[rstest::rstest]
    fn loom_recv_last_publisher(#[with("loom_recv_last_publisher")] model: loom::model::Builder) {
        model.check(|| {
            let queue = SharedQueue::new();
            let manager = queue.subscribe().unwrap();

            let producer = loom::thread::spawn(move || {
                queue.put(1).unwrap();
            });

            assert_eq!(recv_all(&manager), vec![1]);
            producer.join().unwrap();
        })
    }
}
