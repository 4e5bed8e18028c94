//! Background replication for a follower `Storage`: a dedicated thread that
//! drains a `Subscriber` and applies each incoming record, until the handle
//! is dropped or the storage is flipped to master. Grounded on
//! `original_source/Storage/test.cc`'s follower fixtures
//! (`StorageIsAlreadyMasterException`,
//! `UnderlyingStreamHasExternalDataAuthorityException`), which this crate
//! renders as `Error::AlreadyMaster` / `Error::ExternalAuthority` rather
//! than exception types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::schema::SchemaFields;
use crate::stream::{ControlFlow, Subscriber};
use crate::txn::Storage;

/// How long the replication loop waits on the subscriber channel between
/// checks of the stop signal.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns the background thread applying replicated records to a follower
/// `Storage`. Dropping the handle stops the loop at the next received
/// record (or immediately, if the thread is currently blocked in `recv`
/// and the publisher has gone away).
pub struct FollowerReplication {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FollowerReplication {
    /// Spawns the replication loop. `storage` must have been opened with
    /// `Storage::open_follower` and must stay alive at least as long as
    /// this handle.
    pub fn spawn<F, M, U>(storage: Arc<Storage<F, M, U>>, subscriber: Subscriber<M>) -> Self
    where
        F: SchemaFields<M, U> + Send + 'static,
        M: Clone + Serialize + DeserializeOwned + Send + 'static,
        U: Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            while !loop_stop.load(Ordering::SeqCst) {
                match subscriber.recv_timeout(POLL_INTERVAL) {
                    ControlFlow::Record(record) => {
                        if let Err(err) = storage.apply_replicated(record) {
                            log::error!("follower replication stopped: {err}");
                            break;
                        }
                    }
                    ControlFlow::Idle => continue,
                    ControlFlow::Done => break,
                }
            }
        });
        FollowerReplication { stop, handle: Some(handle) }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FollowerReplication {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
