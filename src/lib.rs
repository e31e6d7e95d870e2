//! `fanout-mq` is a multi-reader fan-out queue: every value published to the queue is delivered
//! to each of its consumers (called _managers_), exactly once and in publication order.
//!
//! # Usage
//!
//! A [`Queue`] is a plain, single-threaded data structure. Managers are registered with
//! [`new_manager`] and identified by an opaque [`ManagerId`]. `fanout-mq` differs from a regular
//! broadcast channel in a few ways:
//!
//! 1. A manager only receives values published _after_ it was registered.
//!
//! 2. A newly registered manager cannot read until it has been initialized. Publishing a value
//!    initializes every registered manager, and a manager can also be [initialized] explicitly.
//!
//! 3. A value is kept in the queue until every manager it was published to has received it, after
//!    which it is dropped. Removing a manager discards every value it was still owed.
//!
//! 4. Publishing a value with no manager registered fails, unless the value is published with
//!    [`put_lossy`], in which case it is silently dropped.
//!
//! ```rust
//! let mut queue = fanout_mq::Queue::new();
//!
//! let m1 = queue.new_manager().unwrap();
//! queue.put("a").unwrap();
//! let m2 = queue.new_manager().unwrap();
//! queue.put("b").unwrap();
//!
//! // Each manager only sees what was published after it was registered.
//! assert_eq!(queue.get(m1), Ok(Some("a")));
//! assert_eq!(queue.get(m1), Ok(Some("b")));
//! assert_eq!(queue.get(m2), Ok(Some("b")));
//! assert_eq!(queue.get(m2), Ok(None));
//!
//! // Every value was received by every manager, so the queue is empty.
//! assert!(queue.is_empty());
//! ```
//!
//! [`SharedQueue`] wraps a [`Queue`] so it can be shared across threads, and hands out [`Manager`]s
//! which can wait for new values to be published:
//!
//! ```rust
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = fanout_mq::SharedQueue::new();
//!     let manager = queue.subscribe().unwrap();
//!
//!     let sx = queue.clone();
//!     tokio::spawn(async move {
//!         for i in 0..100 {
//!             sx.put(i).unwrap();
//!         }
//!         // Managers stop receiving once the queue is closed and they have caught up.
//!         sx.close();
//!     });
//!
//!     let received = manager.into_stream().collect::<Vec<_>>().await;
//!     assert_eq!(received, (0..100).collect::<Vec<_>>());
//! }
//! ```
//!
//! # Testing
//!
//! Known edge cases are tested manually to avoid regressions. On top of this, [`proptest`] is used
//! to check [`Queue`] against a naive reference model under thousands of random sequences of
//! registrations, publishes, reads and removals (`--features proptest`), and [`loom`] is used to
//! check [`SharedQueue`] under every interleaving of concurrent publishers and managers
//! (`--features loom`).
//!
//! # Known limitations
//!
//! ## Memory per value
//!
//! Each value keeps the set of managers it is still owed to, so publishing costs `O(managers)` in
//! both time and memory. A counter would be enough to know when a value can be dropped, but the
//! set makes removing a manager straightforward.
//!
//! ## Contention
//!
//! [`SharedQueue`] serializes every operation behind a single mutex. Publishers and managers
//! therefore contend on the same lock, even though managers never read the same cursor.
//!
//! [`new_manager`]: Queue::new_manager
//! [initialized]: Queue::initialize
//! [`put_lossy`]: Queue::put_lossy
//! [`proptest`]: https://docs.rs/proptest
//! [`loom`]: https://docs.rs/loom

mod config;
mod envelope;
mod error;
mod macros;
mod manager;
mod queue;
mod shared;
mod sync;

pub use config::*;
pub use error::*;
pub use manager::{ManagerId, ManagerState};
pub use queue::{Pending, Queue, TBound};
pub use shared::{Manager, SharedQueue, TryIter};
