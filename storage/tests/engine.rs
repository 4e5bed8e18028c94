//! End-to-end coverage of the transaction engine against a live `Storage`:
//! commit/rollback atomicity, replay equivalence, follower convergence and
//! promotion, and the control-plane error paths unit tests on the leaf
//! containers/persister/stream pieces can't reach on their own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_derive::{Deserialize, Serialize};

use storage::clock::{ManualClock, Us};
use storage::container::dict::{DictEvent, DictUndo, Dictionary};
use storage::container::DictEntry;
use storage::error::Error;
use storage::follower::FollowerReplication;
use storage::persister::memory::MemoryPersister;
use storage::schema::SchemaFields;
use storage::stream::Stream;
use storage::txn::{Outcome, Storage, TxnContext};
use storage::typeid::{mutation_type_id, ReflectedMutation, TypeId128};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    key: String,
    value: i64,
}

impl DictEntry for Record {
    type Key = String;
    fn key(&self) -> String {
        self.key.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Mutation {
    Updated { us: Us, data: Record },
    Deleted { us: Us, key: String },
}

impl ReflectedMutation for Mutation {
    fn type_id(&self) -> TypeId128 {
        match self {
            Mutation::Updated { .. } => mutation_type_id("Updated", &["us", "data"]),
            Mutation::Deleted { .. } => mutation_type_id("Deleted", &["us", "key"]),
        }
    }
}

enum Undo {
    D(DictUndo<Record>),
}

struct Fields {
    d: Dictionary<Record>,
}

impl Fields {
    fn new() -> Self {
        Fields { d: Dictionary::ordered() }
    }

    fn put(&mut self, ctx: &mut TxnContext<Mutation, Undo>, key: &str, value: i64) {
        let us = ctx.next_us();
        let entry = Record { key: key.to_string(), value };
        let (_event, undo) = self.d.add(entry.clone(), us);
        ctx.record(Mutation::Updated { us, data: entry }, Undo::D(undo));
    }

    fn erase(&mut self, ctx: &mut TxnContext<Mutation, Undo>, key: &str) -> bool {
        let us = ctx.next_us();
        match self.d.erase(&key.to_string(), us) {
            Some((_event, undo)) => {
                ctx.record(Mutation::Deleted { us, key: key.to_string() }, Undo::D(undo));
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Vec<(String, i64)> {
        self.d.iter().map(|r| (r.key.clone(), r.value)).collect()
    }
}

impl SchemaFields<Mutation, Undo> for Fields {
    fn apply_replay(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Updated { us, data } => self.d.apply_event(DictEvent::Updated { us, data }),
            Mutation::Deleted { us, key } => self.d.apply_event(DictEvent::Deleted { us, key }),
        }
    }

    fn apply_undo(&mut self, undo: Undo) {
        match undo {
            Undo::D(undo) => self.d.apply_undo(undo),
        }
    }
}

fn open_master(clock_start: Us) -> Storage<Fields, Mutation, Undo> {
    let stream: Stream<Mutation> = Stream::new(Box::new(MemoryPersister::new()));
    Storage::open_master(Fields::new(), stream, Box::new(ManualClock::new(clock_start))).unwrap()
}

#[test]
fn commit_persists_and_rollback_reverses_uncommitted_state() {
    let storage = open_master(0);

    storage
        .write(|fields, ctx| {
            fields.put(ctx, "one", 1);
            fields.put(ctx, "two", 2);
            fields.erase(ctx, "one");
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();

    storage.read(|fields| {
        assert_eq!(fields.d.size(), 1);
        assert!(!fields.d.has(&"one".to_string()));
        assert_eq!(fields.d.get(&"two".to_string()).unwrap().value, 2);
    });

    let records = storage.replay_log().unwrap();
    assert_eq!(records.len(), 1);
    let stamps: Vec<Us> = records[0]
        .mutations
        .iter()
        .map(|m| match m {
            Mutation::Updated { us, .. } => *us,
            Mutation::Deleted { us, .. } => *us,
        })
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]), "mutation timestamps must be strictly increasing: {stamps:?}");
    assert_eq!(records[0].end_us, *stamps.last().unwrap());

    let before_rollback = storage.read(|fields| fields.snapshot());

    let outcome = storage.write(|fields, ctx| {
        fields.put(ctx, "x", 99);
        Outcome::<(), &'static str>::Rollback(Some("changed my mind"))
    });
    assert!(matches!(outcome.unwrap(), Outcome::Rollback(Some("changed my mind"))));

    // Atomicity: containers are bitwise identical to the pre-transaction
    // snapshot, and no-op elision: no second record was appended.
    let after_rollback = storage.read(|fields| fields.snapshot());
    assert_eq!(before_rollback, after_rollback);
    assert_eq!(storage.replay_log().unwrap().len(), 1);

    // A transaction producing zero mutations also elides a record.
    storage
        .write(|_fields, _ctx| Outcome::<(), ()>::Commit(()))
        .unwrap();
    assert_eq!(storage.replay_log().unwrap().len(), 1);

    // Abort reverses mutations like Rollback, but surfaces as an Err with
    // the closure's reason rather than as Ok(Outcome::Abort(_)).
    let before_abort = storage.read(|fields| fields.snapshot());
    let err = storage
        .write(|fields, ctx| {
            fields.put(ctx, "y", 7);
            Outcome::<(), &'static str>::Abort(Some("validation failed"))
        })
        .unwrap_err();
    assert!(err.to_string().contains("validation failed"));
    assert_eq!(storage.read(|fields| fields.snapshot()), before_abort);
    assert_eq!(storage.replay_log().unwrap().len(), 1);

    // Abort with no reason surfaces as the bare RolledBack error.
    let err = storage.write(|fields, ctx| {
        fields.put(ctx, "z", 9);
        Outcome::<(), ()>::Abort(None)
    });
    assert!(matches!(err, Err(Error::RolledBack)));
    assert_eq!(storage.read(|fields| fields.snapshot()), before_abort);
    assert_eq!(storage.replay_log().unwrap().len(), 1);

    // A later, real commit still gets the next index.
    storage
        .write(|fields, ctx| {
            fields.put(ctx, "three", 3);
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();
    let records = storage.replay_log().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].index, 1);
}

#[test]
fn replaying_the_persisted_log_reproduces_identical_state() {
    let storage = open_master(1_000);

    storage
        .write(|fields, ctx| {
            fields.put(ctx, "a", 1);
            fields.put(ctx, "b", 2);
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();
    storage
        .write(|fields, ctx| {
            fields.erase(ctx, "a");
            fields.put(ctx, "c", 3);
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();

    let mut expected = storage.read(|fields| fields.snapshot());
    expected.sort();

    let mut replayed_fields = Fields::new();
    for record in storage.replay_log().unwrap() {
        for mutation in record.mutations {
            replayed_fields.apply_replay(mutation);
        }
    }
    let mut replayed = replayed_fields.snapshot();
    replayed.sort();

    assert_eq!(expected, replayed);
}

#[test]
fn apply_replicated_rejects_out_of_order_records() {
    let stream: Stream<Mutation> = Stream::new(Box::new(MemoryPersister::new()));
    let storage = Storage::open_follower(Fields::new(), stream, Box::new(ManualClock::new(0))).unwrap();

    let out_of_order = storage::persister::PersistedRecord {
        index: 5,
        begin_us: 100,
        end_us: 100,
        mutations: vec![Mutation::Updated { us: 100, data: Record { key: "x".into(), value: 1 } }],
        meta: Default::default(),
    };
    let result = storage.apply_replicated(out_of_order);
    assert!(matches!(result, Err(Error::ReplayMismatch { expected: 0, found: 5 })));

    let in_order = storage::persister::PersistedRecord {
        index: 0,
        begin_us: 100,
        end_us: 100,
        mutations: vec![Mutation::Updated { us: 100, data: Record { key: "x".into(), value: 1 } }],
        meta: Default::default(),
    };
    storage.apply_replicated(in_order).unwrap();
    storage.read(|fields| assert!(fields.d.has(&"x".to_string())));
}

#[test]
fn follower_converges_with_master_via_background_replication() {
    let stream: Stream<Mutation> = Stream::new(Box::new(MemoryPersister::new()));
    let master = open_master_on(stream.clone(), 0);
    let subscriber = master.subscribe();
    let follower = Arc::new(Storage::open_follower(Fields::new(), stream, Box::new(ManualClock::new(0))).unwrap());

    master
        .write(|fields, ctx| {
            fields.put(ctx, "a", 1);
            fields.put(ctx, "b", 2);
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();

    let replication = FollowerReplication::spawn(follower.clone(), subscriber);

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let caught_up = follower.read(|fields| fields.d.size() == 2);
        if caught_up {
            break;
        }
        assert!(Instant::now() < deadline, "follower never converged with master");
        std::thread::sleep(Duration::from_millis(5));
    }

    let master_state = master.read(|fields| {
        let mut snap = fields.snapshot();
        snap.sort();
        snap
    });
    let follower_state = follower.read(|fields| {
        let mut snap = fields.snapshot();
        snap.sort();
        snap
    });
    assert_eq!(master_state, follower_state);

    replication.stop();
}

fn open_master_on(stream: Stream<Mutation>, clock_start: Us) -> Storage<Fields, Mutation, Undo> {
    Storage::open_master(Fields::new(), stream, Box::new(ManualClock::new(clock_start))).unwrap()
}

#[test]
fn flip_to_master_fails_while_authority_is_held_externally() {
    let stream: Stream<Mutation> = Stream::new(Box::new(MemoryPersister::new()));
    let _master = open_master_on(stream.clone(), 0);
    let follower = Storage::open_follower(Fields::new(), stream, Box::new(ManualClock::new(0))).unwrap();

    assert!(matches!(follower.flip_to_master(), Err(Error::ExternalAuthority)));
}

#[test]
fn flip_to_master_succeeds_once_authority_is_released_and_continues_the_index() {
    let stream: Stream<Mutation> = Stream::new(Box::new(MemoryPersister::new()));
    let master = open_master_on(stream.clone(), 0);
    master
        .write(|fields, ctx| {
            fields.put(ctx, "a", 1);
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();

    let follower = Storage::open_follower(Fields::new(), stream, Box::new(ManualClock::new(0))).unwrap();
    drop(master);

    follower.flip_to_master().unwrap();
    assert!(follower.is_master());

    follower
        .write(|fields, ctx| {
            fields.put(ctx, "b", 2);
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();

    let records = follower.replay_log().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].index, 1);
}

#[test]
fn graceful_shutdown_rejects_new_write_transactions() {
    let storage = open_master(0);
    storage
        .write(|fields, ctx| {
            fields.put(ctx, "a", 1);
            Outcome::<(), ()>::Commit(())
        })
        .unwrap();

    storage.graceful_shutdown();

    let result = storage.write(|fields, ctx| {
        fields.put(ctx, "b", 2);
        Outcome::<(), ()>::Commit(())
    });
    assert!(matches!(result, Err(Error::ShutdownInProgress)));
}
