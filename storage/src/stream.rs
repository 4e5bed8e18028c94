//! The replication stream sitting on top of a `Persister`: one shared,
//! durable log of `PersistedRecord<M>`s fanned out to any number of
//! subscribers. Appending to the stream is gated behind a `Publisher`
//! capability token -- owned, not `Clone` -- so that at most one storage
//! instance can ever be the authority appending to it at a time, per
//! storage.md §9's redesign note replacing the original's movable-token
//! idiom with an owned Rust value instead of a reference-counted handle.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{CResult, Error};
use crate::persister::{PersistedRecord, Persister};

struct StreamInner<M> {
    persister: Mutex<Box<dyn Persister<M>>>,
    subscribers: RwLock<Vec<Sender<PersistedRecord<M>>>>,
    publisher_issued: std::sync::atomic::AtomicBool,
}

/// A durable record stream. Cheaply `Clone`-able (an `Arc` handle); any
/// number of storages may hold one and subscribe to it, but only one may
/// ever hold its `Publisher`.
pub struct Stream<M> {
    inner: Arc<StreamInner<M>>,
}

impl<M> Clone for Stream<M> {
    fn clone(&self) -> Self {
        Stream { inner: self.inner.clone() }
    }
}

impl<M: Clone + Send + 'static> Stream<M> {
    pub fn new(persister: Box<dyn Persister<M>>) -> Self {
        Stream {
            inner: Arc::new(StreamInner {
                persister: Mutex::new(persister),
                subscribers: RwLock::new(Vec::new()),
                publisher_issued: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Issues the stream's `Publisher` capability. Fails with
    /// `ExternalAuthority` if it has already been issued and not returned
    /// (dropped) by its current holder.
    pub fn take_publisher(&self) -> CResult<Publisher<M>> {
        let already = self.inner.publisher_issued.swap(true, std::sync::atomic::Ordering::SeqCst);
        if already {
            return Err(Error::ExternalAuthority);
        }
        Ok(Publisher { inner: self.inner.clone() })
    }

    /// Registers a new subscriber, returning a cursor over every record
    /// appended from this point on. Existing history must be fetched
    /// separately via the persister's `replay()`.
    pub fn subscribe(&self) -> Subscriber<M> {
        let (tx, rx) = channel();
        self.inner.subscribers.write().expect("subscriber list lock poisoned").push(tx);
        Subscriber { receiver: rx }
    }

    pub fn replay(&self) -> CResult<Vec<PersistedRecord<M>>> {
        self.inner.persister.lock().expect("persister lock poisoned").replay()
    }

    /// Every record from `from_index` onward, restartable from any point.
    /// Used by `flip_to_master` to drain whatever the persister already holds
    /// past a follower's last-applied index before taking over as publisher.
    pub fn iterate(&self, from_index: u64) -> CResult<Vec<PersistedRecord<M>>> {
        self.inner.persister.lock().expect("persister lock poisoned").iterate(from_index, None)
    }

    pub fn status(&self) -> crate::persister::Status {
        self.inner.persister.lock().expect("persister lock poisoned").status()
    }
}

/// The single-holder, movable capability to append to a `Stream`. Dropping
/// it (e.g. during a graceful handoff) releases the slot so a new
/// `Publisher` can be taken via `Stream::take_publisher`.
pub struct Publisher<M> {
    inner: Arc<StreamInner<M>>,
}

impl<M: Clone + Send> Publisher<M> {
    pub fn publish(&self, record: PersistedRecord<M>) -> CResult<()> {
        self.inner
            .persister
            .lock()
            .expect("persister lock poisoned")
            .append(record.clone())
            .map_err(|err| Error::PersisterAppendFailed(err.to_string()))?;

        let subscribers = self.inner.subscribers.read().expect("subscriber list lock poisoned");
        for subscriber in subscribers.iter() {
            // A lagging or dropped subscriber must never block or fail a commit.
            let _ = subscriber.send(record.clone());
        }
        Ok(())
    }

    pub fn next_index(&self) -> u64 {
        self.inner.persister.lock().expect("persister lock poisoned").next_index()
    }
}

impl<M> Drop for Publisher<M> {
    fn drop(&mut self) {
        self.inner.publisher_issued.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

/// A follower's read cursor over a `Stream`.
pub struct Subscriber<M> {
    receiver: Receiver<PersistedRecord<M>>,
}

impl<M> Subscriber<M> {
    /// Blocks until the next record is published, or returns `None` if the
    /// stream's `Publisher` was dropped and no more records will ever arrive.
    pub fn recv(&self) -> Option<PersistedRecord<M>> {
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<PersistedRecord<M>> {
        self.receiver.try_recv().ok()
    }

    /// Like `recv`, but gives up after `timeout` instead of blocking forever,
    /// so a polling loop can check an external stop signal between calls.
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> ControlFlow<M> {
        match self.receiver.recv_timeout(timeout) {
            Ok(record) => ControlFlow::Record(record),
            Err(RecvTimeoutError::Timeout) => ControlFlow::Idle,
            Err(RecvTimeoutError::Disconnected) => ControlFlow::Done,
        }
    }
}

pub(crate) enum ControlFlow<M> {
    Record(PersistedRecord<M>),
    Idle,
    Done,
}
